#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use vidmill::engine::{BoxedEngine, EngineLoader, ProcessEngine};
use vidmill::{ConversionRequest, EngineVariant, Gateway};

pub fn sim_image() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_vidmill-engine-sim"))
}

/// Loader that boots the simulated engine image for any variant.
pub fn sim_loader() -> EngineLoader {
    Arc::new(|variant| {
        ProcessEngine::boot(variant, sim_image()).map(|e| Box::new(e) as BoxedEngine)
    })
}

pub fn sim_gateway() -> Gateway {
    Gateway::new(sim_loader())
}

/// A 10-byte request, matroska/mpeg4/aac against the native engine.
pub fn request(filename: &str) -> ConversionRequest {
    ConversionRequest {
        input: b"0123456789".to_vec(),
        filename: filename.to_string(),
        variant: EngineVariant::Native,
        output_format: "matroska".to_string(),
        video_encoder: "mpeg4".to_string(),
        audio_encoder: "aac".to_string(),
        verbose: false,
        extra_options: Vec::new(),
    }
}

/// Restores (or removes) an env var when dropped.
pub struct EnvVarGuard {
    key: String,
    previous: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        unsafe { std::env::set_var(key, value) };
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}
