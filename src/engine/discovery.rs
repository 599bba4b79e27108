//! Locates the engine image executable for each variant.
//!
//! Precedence: env override, then a bundled image next to the current
//! executable, then PATH. Resolution is cached for the process lifetime.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use super::{EngineError, EngineVariant};

static NATIVE_IMAGE_CACHE: OnceLock<PathBuf> = OnceLock::new();
static PORTABLE_IMAGE_CACHE: OnceLock<PathBuf> = OnceLock::new();

fn cache_for(variant: EngineVariant) -> &'static OnceLock<PathBuf> {
    match variant {
        EngineVariant::Native => &NATIVE_IMAGE_CACHE,
        EngineVariant::Portable => &PORTABLE_IMAGE_CACHE,
    }
}

/// Env var consulted before any lookup, e.g. `VIDMILL_NATIVE_ENGINE`.
pub fn env_override_name(variant: EngineVariant) -> &'static str {
    match variant {
        EngineVariant::Native => "VIDMILL_NATIVE_ENGINE",
        EngineVariant::Portable => "VIDMILL_PORTABLE_ENGINE",
    }
}

/// Base name of the engine image for a variant.
pub fn image_base_name(variant: EngineVariant) -> &'static str {
    match variant {
        EngineVariant::Native => "vidmill-engine-native",
        EngineVariant::Portable => "vidmill-engine-portable",
    }
}

#[cfg(target_os = "windows")]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("where").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

#[cfg(not(target_os = "windows"))]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

/// Candidate path for an image bundled next to the running executable.
/// Split out so the derivation is unit-testable.
pub fn bundled_candidate(exe_dir: &Path, base_name: &str) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let mut p = exe_dir.join(base_name);
        if !p.extension().is_some_and(|e| e == "exe") {
            p.as_mut_os_string().push(".exe");
        }
        p
    }
    #[cfg(not(target_os = "windows"))]
    {
        exe_dir.join(base_name)
    }
}

fn resolve_bundled(base_name: &str) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let path = bundled_candidate(&exe_dir, base_name);
    if path.exists() {
        log::debug!(
            target: "vidmill::engine::discovery",
            "engine image found bundled: {}",
            path.display()
        );
        Some(path)
    } else {
        None
    }
}

fn resolve_image(variant: EngineVariant) -> Result<PathBuf, EngineError> {
    if let Ok(env_path) = std::env::var(env_override_name(variant)) {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            log::debug!(
                target: "vidmill::engine::discovery",
                "engine image from {}: {}",
                env_override_name(variant),
                p.display()
            );
            return Ok(p);
        }
        log::warn!(
            target: "vidmill::engine::discovery",
            "{} points at a missing file: {}",
            env_override_name(variant),
            env_path
        );
    }

    let base_name = image_base_name(variant);
    if let Some(p) = resolve_bundled(base_name) {
        return Ok(p);
    }

    if let Some(p) = find_in_path(base_name)
        && p.exists()
    {
        log::debug!(
            target: "vidmill::engine::discovery",
            "engine image found in PATH: {}",
            p.display()
        );
        return Ok(p);
    }

    log::error!(
        target: "vidmill::engine::discovery",
        "no {} engine image found (set {} or install {} on PATH)",
        variant,
        env_override_name(variant),
        base_name
    );
    Err(EngineError::ImageNotFound(format!(
        "no {} engine image; set {} or put {} on PATH",
        variant,
        env_override_name(variant),
        base_name
    )))
}

/// Resolve the image path for a variant. Cached for the process lifetime.
pub fn engine_image_path(variant: EngineVariant) -> Result<&'static Path, EngineError> {
    let cache = cache_for(variant);
    if let Some(path) = cache.get() {
        return Ok(path.as_path());
    }
    let path = resolve_image(variant)?;
    // Another thread may have resolved first; either value is equivalent.
    let _ = cache.set(path);
    Ok(cache
        .get()
        .expect("engine image cache populated above")
        .as_path())
}
