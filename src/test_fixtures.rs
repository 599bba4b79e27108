//! Shared in-process fakes for unit tests: a scripted engine with a real
//! staging directory and the constant tables a real image would hand over.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::decode::{CodecCapConstants, OptionFlagConstants};
use crate::engine::{
    CodecEngine, EngineConstants, EngineError, EngineVariant, RawCodec, RawMuxer, RawOption,
};
use crate::executor::{ConversionRequest, INPUT_FILE_NAME, OUTPUT_FILE_NAME};

pub fn engine_constants() -> EngineConstants {
    EngineConstants {
        codec_caps: CodecCapConstants {
            draw_horiz_band: 1 << 0,
            dr1: 1 << 1,
            truncated: 1 << 3,
            delay: 1 << 5,
            small_last_frame: 1 << 6,
            subframes: 1 << 8,
            experimental: 1 << 9,
            channel_conf: 1 << 10,
            frame_threads: 1 << 12,
            slice_threads: 1 << 13,
            param_change: 1 << 14,
            auto_threads: 1 << 15,
            variable_frame_size: 1 << 16,
            avoid_probing: 1 << 17,
            hardware: 1 << 18,
            hybrid: 1 << 19,
            encoder_reordered_opaque: 1 << 20,
            intra_only: 0x4000_0000,
            lossless: 0x8000_0000,
        },
        option_flags: OptionFlagConstants {
            encoding_param: 1,
            decoding_param: 2,
            audio_param: 8,
            video_param: 16,
            subtitle_param: 32,
            export: 64,
            readonly: 128,
            bsf_param: 1 << 8,
            filtering_param: 1 << 16,
            deprecated: 1 << 17,
        },
    }
}

/// A 10-byte request against the native engine, matroska/mpeg4/aac.
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

#[derive(Debug, Clone)]
pub enum ScriptMode {
    /// Write the fake output file and succeed.
    Succeed,
    /// Succeed without producing any output file.
    Silent,
    /// Fail the invocation with this summary; engine stays alive.
    Error(String),
    /// Simulate the engine process dying mid-call.
    Die,
}

pub struct ScriptedEngine {
    variant: EngineVariant,
    constants: EngineConstants,
    workdir: TempDir,
    mode: Arc<Mutex<ScriptMode>>,
    free_calls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(variant: EngineVariant, mode: ScriptMode) -> Self {
        Self::with_shared(
            variant,
            Arc::new(Mutex::new(mode)),
            Arc::new(AtomicUsize::new(0)),
        )
    }

    /// Shared handles let tests steer and observe an engine after it has
    /// been boxed away behind a slot.
    pub fn with_shared(
        variant: EngineVariant,
        mode: Arc<Mutex<ScriptMode>>,
        free_calls: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            variant,
            constants: engine_constants(),
            workdir: tempfile::Builder::new()
                .prefix("vidmill-test-")
                .tempdir()
                .expect("test workdir"),
            mode,
            free_calls,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(EngineVariant::Native, ScriptMode::Succeed)
    }

    pub fn silent() -> Self {
        Self::new(EngineVariant::Native, ScriptMode::Silent)
    }

    pub fn erroring(summary: &str) -> Self {
        Self::new(EngineVariant::Native, ScriptMode::Error(summary.to_string()))
    }

    pub fn dying() -> Self {
        Self::new(EngineVariant::Native, ScriptMode::Die)
    }

    pub fn set_error(&self, summary: &str) {
        *self.mode.lock() = ScriptMode::Error(summary.to_string());
    }

    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }

    pub fn staged_input(&self) -> Vec<u8> {
        std::fs::read(self.workdir.path().join(INPUT_FILE_NAME)).expect("staged input")
    }

    pub fn output_path(&self) -> PathBuf {
        self.workdir.path().join(OUTPUT_FILE_NAME)
    }

    /// Raw encoder fixture; ids 12 appears twice so dedup is exercised.
    pub fn raw_encoders() -> Vec<RawCodec> {
        let caps = engine_constants().codec_caps;
        vec![
            RawCodec {
                id: 12,
                name: "mpeg4".into(),
                long_name: "MPEG-4 part 2".into(),
                media_type: 0,
                capabilities: caps.dr1 | caps.delay | caps.slice_threads,
            },
            RawCodec {
                id: 12,
                name: "libxvid".into(),
                long_name: "libxvidcore MPEG-4 part 2".into(),
                media_type: 0,
                capabilities: caps.dr1,
            },
            RawCodec {
                id: 27,
                name: "libx264".into(),
                long_name: "libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10".into(),
                media_type: 0,
                capabilities: caps.delay | caps.frame_threads | caps.slice_threads,
            },
            RawCodec {
                id: 86018,
                name: "aac".into(),
                long_name: "AAC (Advanced Audio Coding)".into(),
                media_type: 1,
                capabilities: caps.delay | caps.small_last_frame,
            },
        ]
    }

    pub fn raw_muxers() -> Vec<RawMuxer> {
        vec![
            RawMuxer {
                name: "matroska".into(),
                long_name: "Matroska".into(),
                mime_type: "video/x-matroska".into(),
                extensions: "mkv".into(),
                video_codec: 27,
                audio_codec: 86021,
            },
            RawMuxer {
                name: "mp4".into(),
                long_name: "MP4 (MPEG-4 Part 14)".into(),
                mime_type: "video/mp4".into(),
                extensions: "mp4,m4a".into(),
                video_codec: 12,
                audio_codec: 86018,
            },
            RawMuxer {
                name: "null".into(),
                long_name: "raw null video".into(),
                mime_type: String::new(),
                extensions: String::new(),
                video_codec: 0,
                audio_codec: 0,
            },
        ]
    }

    pub fn raw_options_for(codec_id: i32) -> Vec<RawOption> {
        let flags = engine_constants().option_flags;
        if codec_id != 12 {
            return Vec::new();
        }
        vec![RawOption {
            name: "mpeg_quant".into(),
            help: "Use MPEG quantizers instead of H.263".into(),
            unit: None,
            offset: 556,
            option_type: 1,
            min: 0.0,
            max: 1.0,
            default_value: serde_json::json!({ "i64": 0 }),
            flags: flags.encoding_param | flags.video_param,
        }]
    }
}

impl CodecEngine for ScriptedEngine {
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
        let staged = std::fs::read(self.workdir.path().join(INPUT_FILE_NAME))?;
        let mode = self.mode.lock().clone();
        match mode {
            ScriptMode::Succeed => {
                let format = args
                    .iter()
                    .position(|a| a == "-f")
                    .and_then(|i| args.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                let mut output = format!("SIM:{}:", format).into_bytes();
                output.extend_from_slice(&staged);
                std::fs::write(self.output_path(), output)?;
                Ok(())
            }
            ScriptMode::Silent => Ok(()),
            ScriptMode::Error(summary) => Err(EngineError::Call {
                summary,
                detail: String::new(),
            }),
            ScriptMode::Die => Err(EngineError::Died),
        }
    }

    fn list_encoders(&mut self) -> Result<Vec<RawCodec>, EngineError> {
        Ok(Self::raw_encoders())
    }

    fn list_muxers(&mut self) -> Result<Vec<RawMuxer>, EngineError> {
        Ok(Self::raw_muxers())
    }

    fn list_codec_options(&mut self, codec_id: i32) -> Result<Vec<RawOption>, EngineError> {
        Ok(Self::raw_options_for(codec_id))
    }

    fn free_last_result(&mut self) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
    }
}
