//! Process-backed engine: spawns an engine image as a child process with a
//! private working directory and drives it over a JSON-lines protocol.
//!
//! The child announces itself with a `ready` handshake carrying the protocol
//! version and its named bit-constant tables, then answers one request per
//! line. Its stderr is the engine log channel and is captured into a bounded
//! tail for failure diagnostics.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::{
    BoxedEngine, CodecEngine, EngineConstants, EngineError, EngineVariant, RawCodec, RawMuxer,
    RawOption,
};

/// Handshake protocol the runtime understands. A mismatching image is a
/// schema mismatch and must fail loudly, not limp along.
pub const ENGINE_PROTOCOL_VERSION: u8 = 1;

/// Keep only the last N bytes of engine stderr to avoid unbounded growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Prefix of per-instance working directories under the system temp dir.
const WORKDIR_PREFIX: &str = "vidmill-engine-";

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<EngineCallError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineCallError {
    summary: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    event: String,
    protocol: u8,
    constants: EngineConstants,
}

pub struct ProcessEngine {
    variant: EngineVariant,
    constants: EngineConstants,
    workdir: TempDir,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<Vec<u8>>>,
    next_request_id: u64,
}

impl ProcessEngine {
    /// Spawn the given engine image and complete its boot handshake.
    pub fn boot(variant: EngineVariant, image: &Path) -> Result<ProcessEngine, EngineError> {
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", WORKDIR_PREFIX, variant))
            .tempdir()?;

        let mut cmd = Command::new(image);
        cmd.current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        }

        log::debug!(
            target: "vidmill::engine::process",
            "spawning {} engine image: {}",
            variant,
            image.display()
        );
        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Boot(format!("failed to spawn {}: {}", image.display(), e))
        })?;

        let stdin = match child.stdin.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Boot("failed to capture engine stdin".into()));
            }
        };
        let stdout = match child.stdout.take() {
            Some(s) => BufReader::new(s),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Boot("failed to capture engine stdout".into()));
            }
        };
        let stderr_tail = Arc::new(Mutex::new(Vec::new()));
        if let Some(stderr) = child.stderr.take() {
            collect_stderr_tail(stderr, Arc::clone(&stderr_tail));
        }

        let mut stdout = stdout;
        let constants = match read_handshake(&mut stdout, &mut child, &stderr_tail) {
            Ok(constants) => constants,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        log::info!(
            target: "vidmill::engine::process",
            "{} engine ready, workdir {}",
            variant,
            workdir.path().display()
        );
        Ok(ProcessEngine {
            variant,
            constants,
            workdir,
            child,
            stdin,
            stdout,
            stderr_tail,
            next_request_id: 1,
        })
    }

    /// Loader that resolves the image via discovery and boots it.
    pub fn loader() -> super::EngineLoader {
        Arc::new(|variant| {
            let image = super::discovery::engine_image_path(variant)?;
            ProcessEngine::boot(variant, image).map(|e| Box::new(e) as BoxedEngine)
        })
    }

    fn stderr_tail_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr_tail.lock()).trim().to_string()
    }

    /// Turn a pipe failure into Died when the child is gone.
    fn pipe_error(&mut self, e: std::io::Error) -> EngineError {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                log::error!(
                    target: "vidmill::engine::process",
                    "{} engine exited ({}): {}",
                    self.variant,
                    status,
                    self.stderr_tail_string()
                );
                EngineError::Died
            }
            _ => EngineError::Io(e),
        }
    }

    fn request(&mut self, method: &str, params: Value) -> Result<Value, EngineError> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let line = serde_json::to_string(&EngineRequest { id, method, params })
            .map_err(|e| EngineError::Protocol(format!("serialize {} request: {}", method, e)))?;
        if let Err(e) = writeln!(self.stdin, "{}", line).and_then(|_| self.stdin.flush()) {
            return Err(self.pipe_error(e));
        }

        loop {
            let mut buf = String::new();
            match self.stdout.read_line(&mut buf) {
                Ok(0) => {
                    let e = std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "engine closed stdout",
                    );
                    return Err(self.pipe_error(e));
                }
                Ok(_) => {}
                Err(e) => return Err(self.pipe_error(e)),
            }
            if buf.trim().is_empty() {
                continue;
            }
            let response: EngineResponse = serde_json::from_str(&buf)
                .map_err(|e| EngineError::Protocol(format!("bad response line: {}", e)))?;
            // Lines without a matching id are engine events; skip them.
            if response.id != Some(id) {
                continue;
            }
            return match (response.result, response.error) {
                (Some(value), _) => Ok(value),
                (None, Some(err)) => Err(EngineError::Call {
                    summary: err.summary,
                    detail: err.detail,
                }),
                (None, None) => Err(EngineError::Protocol(
                    "response carries neither result nor error".into(),
                )),
            };
        }
    }

    fn request_typed<T: serde::de::DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<T, EngineError> {
        let value = self.request(method, params)?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Protocol(format!("bad {} payload: {}", method, e)))
    }
}

impl CodecEngine for ProcessEngine {
    fn variant(&self) -> EngineVariant {
        self.variant
    }

    fn constants(&self) -> &EngineConstants {
        &self.constants
    }

    fn working_dir(&self) -> &Path {
        self.workdir.path()
    }

    fn convert(&mut self, args: &[String]) -> Result<(), EngineError> {
        self.request("convert", json!({ "args": args })).map(|_| ())
    }

    fn list_encoders(&mut self) -> Result<Vec<RawCodec>, EngineError> {
        self.request_typed("listEncoders", Value::Null)
    }

    fn list_muxers(&mut self) -> Result<Vec<RawMuxer>, EngineError> {
        self.request_typed("listMuxers", Value::Null)
    }

    fn list_codec_options(&mut self, codec_id: i32) -> Result<Vec<RawOption>, EngineError> {
        self.request_typed("listCodecOptions", json!({ "codecId": codec_id }))
    }

    fn free_last_result(&mut self) {
        if let Err(e) = self.request("freeResult", Value::Null) {
            // Best effort: a dead engine has nothing left to free.
            log::warn!(
                target: "vidmill::engine::process",
                "{} engine freeResult failed: {}",
                self.variant,
                e
            );
        }
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_handshake(
    stdout: &mut BufReader<ChildStdout>,
    child: &mut Child,
    stderr_tail: &Arc<Mutex<Vec<u8>>>,
) -> Result<EngineConstants, EngineError> {
    let mut line = String::new();
    match stdout.read_line(&mut line) {
        Ok(0) => {
            let status = child.wait().ok();
            let tail = String::from_utf8_lossy(&stderr_tail.lock()).trim().to_string();
            return Err(EngineError::Boot(format!(
                "engine exited during boot ({}): {}",
                status.map_or_else(|| "unknown status".into(), |s| s.to_string()),
                tail
            )));
        }
        Ok(_) => {}
        Err(e) => return Err(EngineError::Boot(format!("reading handshake: {}", e))),
    }
    let handshake: Handshake = serde_json::from_str(&line)
        .map_err(|e| EngineError::Protocol(format!("bad handshake line: {}", e)))?;
    if handshake.event != "ready" {
        return Err(EngineError::Protocol(format!(
            "expected ready handshake, got event {:?}",
            handshake.event
        )));
    }
    if handshake.protocol != ENGINE_PROTOCOL_VERSION {
        return Err(EngineError::Protocol(format!(
            "engine speaks protocol {}, runtime expects {}",
            handshake.protocol, ENGINE_PROTOCOL_VERSION
        )));
    }
    Ok(handshake.constants)
}

fn collect_stderr_tail<R: Read + Send + 'static>(reader: R, tail: Arc<Mutex<Vec<u8>>>) {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let mut guard = tail.lock();
            guard.extend_from_slice(&line_buf);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            line_buf.clear();
        }
    });
}

/// Remove leftover working directories from past sessions that crashed
/// before cleanup. Called once at worker startup.
pub fn cleanup_stale_workdirs(max_age: Duration) {
    let tmp = std::env::temp_dir();
    let Ok(entries) = std::fs::read_dir(&tmp) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(WORKDIR_PREFIX) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let age = meta
            .modified()
            .ok()
            .and_then(|t| now.duration_since(t).ok())
            .unwrap_or_default();
        if age > max_age {
            log::debug!(
                target: "vidmill::engine::process",
                "removing stale engine workdir {}",
                entry.path().display()
            );
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
}
