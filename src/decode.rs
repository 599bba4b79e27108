//! Capability decoder: turns the engine's raw listings (opaque records with
//! integer enums and capability bitmasks) into structured descriptors.
//!
//! Bit decoding is table-driven from the constant table the engine hands over
//! in its boot handshake; enum decoding is an exhaustive match where an
//! unknown raw value is an engine/schema mismatch and fails loudly.

use serde::{Deserialize, Serialize};

use crate::engine::{RawCodec, RawMuxer, RawOption};
use crate::error::AppError;

/// Generates the engine-side constant table and the decoded boolean set for
/// one bitmask family, plus the `(raw & constant) != 0` decode between them.
macro_rules! bitflag_set {
    ($consts:ident, $flags:ident, [ $($field:ident),* $(,)? ]) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $consts {
            $(pub $field: i64,)*
        }

        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $flags {
            $(pub $field: bool,)*
        }

        impl $flags {
            pub fn from_raw(raw: i64, consts: &$consts) -> Self {
                Self {
                    $($field: raw & consts.$field != 0,)*
                }
            }
        }
    };
}

bitflag_set!(CodecCapConstants, CodecCapabilities, [
    draw_horiz_band,
    dr1,
    truncated,
    delay,
    small_last_frame,
    subframes,
    experimental,
    channel_conf,
    frame_threads,
    slice_threads,
    param_change,
    auto_threads,
    variable_frame_size,
    avoid_probing,
    intra_only,
    lossless,
    hardware,
    hybrid,
    encoder_reordered_opaque,
]);

bitflag_set!(OptionFlagConstants, OptionFlags, [
    encoding_param,
    decoding_param,
    audio_param,
    video_param,
    subtitle_param,
    export,
    readonly,
    bsf_param,
    filtering_param,
    deprecated,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Unknown,
    Video,
    Audio,
    Data,
    Subtitle,
    Attachment,
}

impl CodecKind {
    pub fn from_raw(raw: i64) -> Result<Self, AppError> {
        match raw {
            -1 => Ok(Self::Unknown),
            0 => Ok(Self::Video),
            1 => Ok(Self::Audio),
            2 => Ok(Self::Data),
            3 => Ok(Self::Subtitle),
            4 => Ok(Self::Attachment),
            value => Err(AppError::Decode {
                field: "codec type",
                value,
            }),
        }
    }
}

/// The engine's option value kinds, raw values 0..=18 in engine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptionKind {
    Flags,
    Int,
    Int64,
    Double,
    Float,
    String,
    Rational,
    Binary,
    Dict,
    UInt64,
    Const,
    ImageSize,
    PixelFmt,
    SampleFmt,
    VideoRate,
    Duration,
    Color,
    ChannelLayout,
    Bool,
}

impl OptionKind {
    pub fn from_raw(raw: i64) -> Result<Self, AppError> {
        match raw {
            0 => Ok(Self::Flags),
            1 => Ok(Self::Int),
            2 => Ok(Self::Int64),
            3 => Ok(Self::Double),
            4 => Ok(Self::Float),
            5 => Ok(Self::String),
            6 => Ok(Self::Rational),
            7 => Ok(Self::Binary),
            8 => Ok(Self::Dict),
            9 => Ok(Self::UInt64),
            10 => Ok(Self::Const),
            11 => Ok(Self::ImageSize),
            12 => Ok(Self::PixelFmt),
            13 => Ok(Self::SampleFmt),
            14 => Ok(Self::VideoRate),
            15 => Ok(Self::Duration),
            16 => Ok(Self::Color),
            17 => Ok(Self::ChannelLayout),
            18 => Ok(Self::Bool),
            value => Err(AppError::Decode {
                field: "option type",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecDescriptor {
    pub id: i32,
    pub name: String,
    pub long_name: String,
    pub kind: CodecKind,
    pub capabilities: CodecCapabilities,
    pub options: Vec<OptionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDescriptor {
    pub name: String,
    pub help: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub offset: i32,
    pub kind: OptionKind,
    pub min: f64,
    pub max: f64,
    pub default_value: serde_json::Value,
    pub flags: OptionFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxerDescriptor {
    pub name: String,
    pub long_name: String,
    pub mime_type: String,
    pub extensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_video_codec_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_audio_codec_id: Option<i32>,
}

/// Decode a raw encoder listing. Entries are kept in engine order and
/// deduplicated by id, first occurrence wins (the raw iteration can yield
/// two encoders for the same codec id). Options start empty; the gateway
/// fills them per codec.
pub fn decode_codecs(
    raw: &[RawCodec],
    consts: &CodecCapConstants,
) -> Result<Vec<CodecDescriptor>, AppError> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for codec in raw {
        if !seen.insert(codec.id) {
            continue;
        }
        out.push(CodecDescriptor {
            id: codec.id,
            name: codec.name.clone(),
            long_name: codec.long_name.clone(),
            kind: CodecKind::from_raw(codec.media_type)?,
            capabilities: CodecCapabilities::from_raw(codec.capabilities, consts),
            options: Vec::new(),
        });
    }
    Ok(out)
}

pub fn decode_options(
    raw: &[RawOption],
    consts: &OptionFlagConstants,
) -> Result<Vec<OptionDescriptor>, AppError> {
    raw.iter()
        .map(|opt| {
            Ok(OptionDescriptor {
                name: opt.name.clone(),
                help: opt.help.clone(),
                unit: opt.unit.clone(),
                offset: opt.offset,
                kind: OptionKind::from_raw(opt.option_type)?,
                min: opt.min,
                max: opt.max,
                default_value: opt.default_value.clone(),
                flags: OptionFlags::from_raw(opt.flags, consts),
            })
        })
        .collect()
}

pub fn decode_muxers(raw: &[RawMuxer]) -> Vec<MuxerDescriptor> {
    raw.iter()
        .map(|muxer| MuxerDescriptor {
            name: muxer.name.clone(),
            long_name: muxer.long_name.clone(),
            mime_type: muxer.mime_type.clone(),
            extensions: split_extensions(&muxer.extensions),
            default_video_codec_id: codec_id_or_none(muxer.video_codec),
            default_audio_codec_id: codec_id_or_none(muxer.audio_codec),
        })
        .collect()
}

/// The raw extensions field is a comma-joined list; empty means none, not one
/// empty-string extension.
pub fn split_extensions(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

fn codec_id_or_none(raw: i32) -> Option<i32> {
    // Id 0 is the engine's "none" sentinel.
    if raw > 0 { Some(raw) } else { None }
}
