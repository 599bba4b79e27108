//! Simulated codec engine image, used by the integration test targets.
//!
//! Speaks the engine child protocol: a `ready` handshake on stdout, then one
//! JSON response per request line. "Conversion" wraps the staged input in a
//! tiny fake container so the runtime's staging/copy/free choreography can be
//! exercised without a real codec build. Fault injection via env:
//!   VIDMILL_SIM_FAIL_BOOT=1    exit before the handshake
//!   VIDMILL_SIM_CRASH_ON=convert   abort mid-convert (simulated native crash)

use std::io::{self, BufRead, Write};
use std::process::exit;

use serde::Deserialize;
use serde_json::{Value, json};

use vidmill::decode::{CodecCapConstants, OptionFlagConstants};
use vidmill::engine::{
    ENGINE_PROTOCOL_VERSION, EngineConstants, RawCodec, RawMuxer, RawOption,
};
use vidmill::executor::{INPUT_FILE_NAME, OUTPUT_FILE_NAME};

fn constants() -> EngineConstants {
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

/// Encoder catalog. Two MPEG-4 part 2 encoders share id 12, as the real
/// iteration does; the runtime is expected to deduplicate.
fn encoders(caps: &CodecCapConstants) -> Vec<RawCodec> {
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
            id: 167,
            name: "libvpx-vp9".into(),
            long_name: "libvpx VP9".into(),
            media_type: 0,
            capabilities: caps.dr1 | caps.delay | caps.auto_threads,
        },
        RawCodec {
            id: 86018,
            name: "aac".into(),
            long_name: "AAC (Advanced Audio Coding)".into(),
            media_type: 1,
            capabilities: caps.delay | caps.small_last_frame,
        },
        RawCodec {
            id: 86021,
            name: "libvorbis".into(),
            long_name: "libvorbis".into(),
            media_type: 1,
            capabilities: caps.delay | caps.small_last_frame,
        },
    ]
}

fn muxers() -> Vec<RawMuxer> {
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
            name: "webm".into(),
            long_name: "WebM".into(),
            mime_type: "video/webm".into(),
            extensions: "webm".into(),
            video_codec: 167,
            audio_codec: 86021,
        },
        RawMuxer {
            name: "mp4".into(),
            long_name: "MP4 (MPEG-4 Part 14)".into(),
            mime_type: "video/mp4".into(),
            extensions: "mp4,m4a,3gp".into(),
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

fn codec_options(codec_id: i32, flags: &OptionFlagConstants) -> Vec<RawOption> {
    match codec_id {
        12 => vec![
            RawOption {
                name: "mpeg_quant".into(),
                help: "Use MPEG quantizers instead of H.263".into(),
                unit: None,
                offset: 556,
                option_type: 1,
                min: 0.0,
                max: 1.0,
                default_value: json!({ "i64": 0 }),
                flags: flags.encoding_param | flags.video_param,
            },
            RawOption {
                name: "mbd".into(),
                help: "macroblock decision algorithm".into(),
                unit: Some("mbd".into()),
                offset: 304,
                option_type: 1,
                min: 0.0,
                max: 2.0,
                default_value: json!({ "i64": 0 }),
                flags: flags.encoding_param | flags.video_param,
            },
        ],
        27 => vec![RawOption {
            name: "crf".into(),
            help: "Select the quality for constant quality mode".into(),
            unit: None,
            offset: 24,
            option_type: 4,
            min: -1.0,
            max: 63.0,
            default_value: json!({ "dbl": -1.0 }),
            flags: flags.encoding_param | flags.video_param,
        }],
        86018 => vec![RawOption {
            name: "aac_coder".into(),
            help: "Coding algorithm".into(),
            unit: Some("coder".into()),
            offset: 160,
            option_type: 1,
            min: 0.0,
            max: 2.0,
            default_value: json!({ "i64": 2 }),
            flags: flags.encoding_param | flags.audio_param,
        }],
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct Request {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

struct Sim {
    constants: EngineConstants,
    /// Engine-held copy of the last conversion output.
    last_result: Option<Vec<u8>>,
    verbose: bool,
}

impl Sim {
    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn convert(&mut self, args: &[String]) -> Result<Value, (String, String)> {
        self.verbose = Self::arg_after(args, "-loglevel") == Some("verbose");
        if self.verbose {
            eprintln!("sim: convert argv: {}", args.join(" "));
        }

        if std::env::var("VIDMILL_SIM_CRASH_ON").as_deref() == Ok("convert") {
            eprintln!("sim: injected crash");
            std::process::abort();
        }

        let input_name = Self::arg_after(args, "-i").unwrap_or(INPUT_FILE_NAME);
        let format = Self::arg_after(args, "-f")
            .ok_or_else(|| ("Missing output format".to_string(), String::new()))?;
        let video_encoder = Self::arg_after(args, "-c:v")
            .ok_or_else(|| ("Missing video encoder".to_string(), String::new()))?;
        let audio_encoder = Self::arg_after(args, "-c:a")
            .ok_or_else(|| ("Missing audio encoder".to_string(), String::new()))?;
        let output_name = args
            .last()
            .map(String::as_str)
            .unwrap_or(OUTPUT_FILE_NAME);

        let catalog = encoders(&self.constants.codec_caps);
        let known_video = catalog
            .iter()
            .any(|c| c.media_type == 0 && c.name == video_encoder);
        let known_audio = catalog
            .iter()
            .any(|c| c.media_type == 1 && c.name == audio_encoder);
        if !known_video {
            return Err((
                format!("Unknown encoder '{}'", video_encoder),
                "no video encoder with that name".to_string(),
            ));
        }
        if !known_audio {
            return Err((
                format!("Unknown encoder '{}'", audio_encoder),
                "no audio encoder with that name".to_string(),
            ));
        }
        if !muxers().iter().any(|m| m.name == format) {
            return Err((
                format!("Unknown output format '{}'", format),
                "no muxer with that name".to_string(),
            ));
        }

        let input = std::fs::read(input_name)
            .map_err(|e| (format!("{}: no staged input", input_name), e.to_string()))?;

        let mut output = format!("VMSIM:{}:{}:{}:", format, video_encoder, audio_encoder)
            .into_bytes();
        output.extend_from_slice(&input);
        std::fs::write(output_name, &output)
            .map_err(|e| ("Failed to write output".to_string(), e.to_string()))?;
        if self.verbose {
            eprintln!("sim: wrote {} bytes to {}", output.len(), output_name);
        }
        self.last_result = Some(output);
        Ok(json!({ "ok": true }))
    }

    fn handle(&mut self, request: Request) -> Value {
        let id = request.id;
        let result = match request.method.as_str() {
            "convert" => {
                let args: Vec<String> = request
                    .params
                    .get("args")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                self.convert(&args)
            }
            "listEncoders" => Ok(serde_json::to_value(encoders(&self.constants.codec_caps))
                .unwrap_or(Value::Null)),
            "listMuxers" => Ok(serde_json::to_value(muxers()).unwrap_or(Value::Null)),
            "listCodecOptions" => {
                let codec_id = request
                    .params
                    .get("codecId")
                    .and_then(Value::as_i64)
                    .unwrap_or(0) as i32;
                Ok(
                    serde_json::to_value(codec_options(codec_id, &self.constants.option_flags))
                        .unwrap_or(Value::Null),
                )
            }
            "freeResult" => {
                self.last_result = None;
                Ok(json!({ "freed": true }))
            }
            other => Err((format!("Unknown method '{}'", other), String::new())),
        };
        match result {
            Ok(value) => json!({ "id": id, "result": value }),
            Err((summary, detail)) => json!({
                "id": id,
                "error": { "summary": summary, "detail": detail }
            }),
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::init();

    if std::env::var("VIDMILL_SIM_FAIL_BOOT").as_deref() == Ok("1") {
        eprintln!("sim: injected boot failure");
        exit(3);
    }

    let mut sim = Sim {
        constants: constants(),
        last_result: None,
        verbose: false,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let handshake = json!({
        "event": "ready",
        "protocol": ENGINE_PROTOCOL_VERSION,
        "constants": &sim.constants,
    });
    writeln!(out, "{}", handshake)?;
    out.flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => sim.handle(request),
            Err(e) => json!({
                "id": 0,
                "error": { "summary": "Invalid request line", "detail": e.to_string() }
            }),
        };
        writeln!(out, "{}", response)?;
        out.flush()?;
    }
    Ok(())
}
