//! Conversion executor: drives one job against a booted engine.
//!
//! Staging uses fixed logical file names inside the engine's private working
//! directory; a new job's input deliberately overwrites the previous job's
//! leftovers. The engine-held result buffer is freed on every path.

use std::fs;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::engine::{CodecEngine, EngineError, EngineVariant};
use crate::error::AppError;

/// Fixed logical file names inside the engine working directory.
pub const INPUT_FILE_NAME: &str = "input";
pub const OUTPUT_FILE_NAME: &str = "output";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    /// Raw media bytes to convert.
    pub input: Vec<u8>,
    /// Original file name; bookkeeping only, never touches the filesystem.
    pub filename: String,
    #[serde(default)]
    pub variant: EngineVariant,
    pub output_format: String,
    pub video_encoder: String,
    pub audio_encoder: String,
    #[serde(default)]
    pub verbose: bool,
    /// Opaque flags appended verbatim, in order, before the output name.
    #[serde(default)]
    pub extra_options: Vec<String>,
}

impl ConversionRequest {
    /// Reject malformed requests before any engine work happens.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.filename.is_empty() {
            return Err(AppError::invalid_request("filename must not be empty"));
        }
        if self.output_format.is_empty() {
            return Err(AppError::invalid_request("outputFormat must not be empty"));
        }
        if self.video_encoder.is_empty() {
            return Err(AppError::invalid_request("videoEncoder must not be empty"));
        }
        if self.audio_encoder.is_empty() {
            return Err(AppError::invalid_request("audioEncoder must not be empty"));
        }
        Ok(())
    }
}

/// Fixed positional argument list for the engine's conversion entry point.
/// This ordering is a wire protocol with the engine image.
pub fn build_convert_args(req: &ConversionRequest) -> Vec<String> {
    let mut args = vec![
        "-loglevel".to_string(),
        if req.verbose { "verbose" } else { "quiet" }.to_string(),
        "-i".to_string(),
        INPUT_FILE_NAME.to_string(),
        "-c:v".to_string(),
        req.video_encoder.clone(),
        "-c:a".to_string(),
        req.audio_encoder.clone(),
        "-f".to_string(),
        req.output_format.clone(),
    ];
    args.extend(req.extra_options.iter().cloned());
    args.push(OUTPUT_FILE_NAME.to_string());
    args
}

#[derive(Debug)]
pub enum ExecOutcome {
    /// The engine produced output; bytes are executor-owned copies.
    Done { output: Vec<u8>, elapsed: Duration },
    /// The invocation failed or produced nothing; the engine stays usable.
    Failed { reason: String },
    /// The engine process died mid-call. The caller must discard the slot.
    EngineLost { reason: String },
}

pub fn execute(
    engine: &mut dyn CodecEngine,
    req: &ConversionRequest,
) -> Result<ExecOutcome, AppError> {
    let dir = engine.working_dir().to_path_buf();
    fs::create_dir_all(&dir)?;

    // Clear the previous job's output slot so a failed invocation cannot be
    // mistaken for success, then stage the new input over the old one.
    let output_path = dir.join(OUTPUT_FILE_NAME);
    let _ = fs::remove_file(&output_path);
    fs::write(dir.join(INPUT_FILE_NAME), &req.input)?;

    let args = build_convert_args(req);
    log::debug!(
        target: "vidmill::executor",
        "converting {} ({} bytes) via {} engine: {}",
        req.filename,
        req.input.len(),
        engine.variant(),
        args.join(" ")
    );

    let started = Instant::now();
    let invoked = engine.convert(&args);
    let elapsed = started.elapsed();

    let output = match &invoked {
        Ok(()) => fs::read(&output_path).ok(),
        Err(_) => None,
    };
    // The engine holds its last result until told to drop it, success or not.
    engine.free_last_result();

    match invoked {
        Ok(()) => match output {
            Some(bytes) => {
                log::info!(
                    target: "vidmill::executor",
                    "{} converted in {:.3}s ({} -> {} bytes)",
                    req.filename,
                    elapsed.as_secs_f64(),
                    req.input.len(),
                    bytes.len()
                );
                Ok(ExecOutcome::Done {
                    output: bytes,
                    elapsed,
                })
            }
            None => Ok(ExecOutcome::Failed {
                reason: "conversion produced no output".to_string(),
            }),
        },
        Err(e) if e.is_fatal() => {
            log::error!(
                target: "vidmill::executor",
                "{} engine lost while converting {}: {}",
                engine.variant(),
                req.filename,
                e
            );
            Ok(ExecOutcome::EngineLost {
                reason: e.to_string(),
            })
        }
        Err(EngineError::Call { summary, detail }) => {
            log::warn!(
                target: "vidmill::executor",
                "conversion of {} failed: {} {}",
                req.filename,
                summary,
                detail
            );
            Ok(ExecOutcome::Failed { reason: summary })
        }
        Err(e) => {
            log::warn!(
                target: "vidmill::executor",
                "conversion of {} failed: {}",
                req.filename,
                e
            );
            Ok(ExecOutcome::Failed {
                reason: e.to_string(),
            })
        }
    }
}
