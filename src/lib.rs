pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod recording;

pub use audio::{
    AudioDecoder, AudioFile, AudioFrame, AudioNormalizer, CaptureDevice, CaptureDeviceFactory,
    CaptureRequest, CaptureSource, DecodedAudio, FileCaptureDevice, NormalizedAudio,
    SymphoniaDecoder,
};
pub use chat::{
    Attachment, ChatConfig, ChatSession, EngineHandle, InferenceEngine, Message, ModelConfig,
    ModelConfigPatch, PartialResponse, Prompt, PromptBuilder, SendOutcome,
};
pub use config::Config;
pub use error::{AudioError, ChatError, RecorderError};
pub use http::{create_router, AppState};
pub use nats::NatsInferenceEngine;
pub use recording::{RecordedBlob, Recorder, RecorderEvent, RecorderStatus, RecordingState};
