//! Boundary worker: newline-delimited JSON RPC over stdio.
//!
//! Requests are `{id, method, params}`; responses are `{id, result}` or
//! `{id, error: {summary, detail}}`, written as jobs complete. Binary
//! payloads cross as base64 so everything on the wire is by-value. Logging
//! goes to stderr; stdout carries nothing but protocol lines.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

use vidmill::engine::cleanup_stale_workdirs;
use vidmill::{AppError, ConversionRequest, ConversionResult, EngineVariant, Gateway};

const STARTUP_CLEANUP_MAX_AGE_HOURS: u64 = 24;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertParams {
    /// Base64-encoded media bytes.
    data: String,
    filename: String,
    #[serde(default)]
    variant: EngineVariant,
    output_format: String,
    video_encoder: String,
    audio_encoder: String,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    extra_options: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodecOptionsParams {
    codec_id: i32,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn error_payload(err: &AppError) -> RpcErrorPayload {
    let summary = match err {
        AppError::EngineInit(_) => "Engine initialization failed".to_string(),
        AppError::EngineCall(_) => "Engine call failed".to_string(),
        AppError::Decode { field, .. } => format!("Engine reported an unknown {}", field),
        AppError::InvalidRequest(_) => "Invalid request".to_string(),
        AppError::Io(_) | AppError::Internal(_) => "Worker error".to_string(),
    };
    RpcErrorPayload {
        summary,
        detail: err.to_string(),
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::invalid_request(format!("bad params payload: {}", e)))
}

fn conversion_request(params: ConvertParams) -> Result<ConversionRequest, AppError> {
    let input = BASE64
        .decode(params.data.as_bytes())
        .map_err(|e| AppError::invalid_request(format!("data is not valid base64: {}", e)))?;
    Ok(ConversionRequest {
        input,
        filename: params.filename,
        variant: params.variant,
        output_format: params.output_format,
        video_encoder: params.video_encoder,
        audio_encoder: params.audio_encoder,
        verbose: params.verbose,
        extra_options: params.extra_options,
    })
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("serialize result: {}", e)))
}

async fn dispatch(gateway: &Gateway, method: &str, params: Value) -> Result<Value, AppError> {
    match method {
        "media.convert" => {
            let parsed: ConvertParams = params_from_value(params)?;
            let request = conversion_request(parsed)?;
            match gateway.convert(request).await? {
                ConversionResult::Completed { output, metric } => Ok(json!({
                    "status": "completed",
                    "output": BASE64.encode(&output),
                    "metric": metric,
                })),
                ConversionResult::Failed { reason } => Ok(json!({
                    "status": "failed",
                    "reason": reason,
                })),
            }
        }
        "caps.encoders" => to_value(gateway.list_encoders().await?),
        "caps.codecOptions" => {
            let parsed: CodecOptionsParams = params_from_value(params)?;
            to_value(gateway.list_codec_options(parsed.codec_id).await?)
        }
        "caps.muxers" => to_value(gateway.list_muxers().await?),
        "app.metrics" => to_value(gateway.metrics().await),
        _ => Err(AppError::invalid_request(format!(
            "unknown method: {}",
            method
        ))),
    }
}

async fn handle_request(gateway: Arc<Gateway>, request: RpcRequest, writer: SharedWriter) {
    let outcome = dispatch(&gateway, &request.method, request.params).await;
    let write_result = match outcome {
        Ok(result) => write_json_line_shared(
            &writer,
            &RpcSuccess {
                id: request.id,
                result,
            },
        ),
        Err(err) => write_json_line_shared(
            &writer,
            &RpcFailure {
                id: request.id,
                error: error_payload(&err),
            },
        ),
    };
    if let Err(e) = write_result {
        log::error!(target: "vidmill::worker", "failed to write response: {}", e);
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    cleanup_stale_workdirs(Duration::from_secs(STARTUP_CLEANUP_MAX_AGE_HOURS * 3600));

    let runtime = tokio::runtime::Runtime::new()?;
    let gateway = Arc::new(Gateway::with_process_engines());
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let stdin = io::stdin();
    let mut workers = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        workers.push(runtime.spawn(handle_request(
            Arc::clone(&gateway),
            request,
            Arc::clone(&stdout),
        )));
    }

    runtime.block_on(async {
        for worker in workers {
            let _ = worker.await;
        }
    });
    Ok(())
}
