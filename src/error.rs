use thiserror::Error;

/// Audio decoding / normalization errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to read audio source: {0}")]
    Io(#[from] std::io::Error),
}

/// Microphone recording errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Capture permission denied: {0}")]
    Permission(String),

    #[error("Audio capture not supported: {0}")]
    Unsupported(String),

    #[error("Recorder is {0}, cannot {1}")]
    InvalidState(&'static str, &'static str),

    #[error("Capture device failed: {0}")]
    Capture(String),

    #[error("Failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// Chat session errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Model is not loaded, load a model first")]
    NotReady,

    #[error("A generation is already in progress")]
    Busy,

    #[error("No model is loaded to reconfigure")]
    NoModelLoaded,

    #[error("Model initialization failed: {0:#}")]
    ModelInit(#[source] anyhow::Error),

    #[error("Generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),

    #[error("Generation was superseded by a model reload or dispose")]
    Superseded,

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Audio attachment: {0}")]
    Audio(#[from] AudioError),
}
