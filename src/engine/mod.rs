//! Engine layer: the opaque codec engine surface and its concrete
//! process-backed implementation.
//!
//! An engine image is a pre-built executable (fast native build, or the
//! slower portable build) exposing the same five operations. The runtime
//! never looks inside it; everything it learns comes from the boot handshake
//! (named bit-constants) and the raw listing records.

pub mod discovery;
mod process;
pub mod slot;

pub use process::{ENGINE_PROTOCOL_VERSION, ProcessEngine, cleanup_stale_workdirs};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decode::{CodecCapConstants, OptionFlagConstants};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// High-performance pre-compiled engine build.
    #[default]
    Native,
    /// Slower, more portable build with the same logical capabilities.
    Portable,
}

impl EngineVariant {
    pub const ALL: [EngineVariant; 2] = [EngineVariant::Native, EngineVariant::Portable];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineVariant::Native => "native",
            EngineVariant::Portable => "portable",
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named bit-constant tables the engine exposes in its boot handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConstants {
    pub codec_caps: CodecCapConstants,
    pub option_flags: OptionFlagConstants,
}

/// One raw encoder record as reported by the engine listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCodec {
    pub id: i32,
    pub name: String,
    pub long_name: String,
    #[serde(rename = "type")]
    pub media_type: i64,
    pub capabilities: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMuxer {
    pub name: String,
    pub long_name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub extensions: String,
    pub video_codec: i32,
    pub audio_codec: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOption {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub offset: i32,
    #[serde(rename = "type")]
    pub option_type: i64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub default_value: serde_json::Value,
    pub flags: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("engine image not found: {0}")]
    ImageNotFound(String),

    #[error("engine failed to start: {0}")]
    Boot(String),

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("{summary}")]
    Call { summary: String, detail: String },

    #[error("engine process exited unexpectedly")]
    Died,
}

impl EngineError {
    /// A dead engine process cannot serve further jobs; everything else
    /// leaves the instance usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Died)
    }
}

/// The public surface of one booted engine instance. Non-reentrant: callers
/// must serialize access (the slot guard enforces this).
pub trait CodecEngine: Send {
    fn variant(&self) -> EngineVariant;

    /// Bit-constant tables from the boot handshake.
    fn constants(&self) -> &EngineConstants;

    /// The engine's private staging directory. Input and output files live
    /// here under fixed logical names.
    fn working_dir(&self) -> &Path;

    /// Run one conversion with the fixed positional argument list. Blocks
    /// until the engine returns.
    fn convert(&mut self, args: &[String]) -> Result<(), EngineError>;

    fn list_encoders(&mut self) -> Result<Vec<RawCodec>, EngineError>;

    fn list_muxers(&mut self) -> Result<Vec<RawMuxer>, EngineError>;

    fn list_codec_options(&mut self, codec_id: i32) -> Result<Vec<RawOption>, EngineError>;

    /// Release the engine-held output buffer of the last conversion. Must be
    /// called after every conversion, on success and failure alike, or the
    /// engine leaks the buffer. Safe to call repeatedly.
    fn free_last_result(&mut self);
}

pub type BoxedEngine = Box<dyn CodecEngine>;

/// Boots one engine instance for a variant. Invoked at most once per variant
/// by the slot; a returned error latches the variant as failed.
pub type EngineLoader = Arc<dyn Fn(EngineVariant) -> Result<BoxedEngine, EngineError> + Send + Sync>;
