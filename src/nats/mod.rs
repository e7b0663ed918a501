//! NATS transport for the inference engine
//!
//! Models are loaded by request/reply; generation output arrives as
//! cumulative chunks on a per-request reply subject.

pub mod client;
pub mod messages;

pub use client::{NatsEngineHandle, NatsInferenceEngine};
pub use messages::{
    reply_subject, AudioEncoding, GenerateChunk, GenerateRequest, LoadModelReply,
    LoadModelRequest, ReleaseModelMessage, WirePart,
};
