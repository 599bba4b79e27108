//! Isolated codec engine runtime: boots opaque converter engine images in
//! worker processes, decodes their capability bitmasks into structured
//! descriptors, and runs metered conversion jobs against a private staging
//! directory.

pub mod decode;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod metrics;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use decode::{CodecDescriptor, MuxerDescriptor, OptionDescriptor};
pub use engine::EngineVariant;
pub use error::AppError;
pub use executor::ConversionRequest;
pub use gateway::{ConversionResult, Gateway};
pub use metrics::Metric;
