//! Microphone recording
//!
//! This module provides the `Recorder` that manages:
//! - Exclusive capture device acquisition and guaranteed release
//! - Pause/resume with a duration counter that excludes paused time
//! - Finalizing captured PCM into a single WAV blob
//! - State change / data-available notifications

mod clock;
mod recorder;

pub use recorder::{
    format_duration, RecordedBlob, Recorder, RecorderEvent, RecorderStatus, RecordingState,
};
