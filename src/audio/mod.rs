pub mod backend;
pub mod file;
pub mod file_device;
pub mod normalize;

pub use backend::{AudioFrame, CaptureDevice, CaptureDeviceFactory, CaptureRequest, CaptureSource};
pub use file::{AudioDecoder, AudioFile, DecodedAudio, SymphoniaDecoder};
pub use file_device::FileCaptureDevice;
pub use normalize::{
    downmix, normalize_decoded, peak_limit, resample_linear, AudioNormalizer, NormalizedAudio,
    TARGET_SAMPLE_RATE,
};
