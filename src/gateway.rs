//! Boundary gateway: the async surface the caller's execution context talks
//! to. Owns one engine slot per variant and the metrics ledger; every
//! operation is an independent call whose payloads cross by value.

use std::sync::Arc;

use serde::Serialize;
use tokio::task;

use crate::decode;
use crate::decode::{CodecDescriptor, MuxerDescriptor, OptionDescriptor};
use crate::engine::slot::{EngineGuard, EngineSlot};
use crate::engine::{EngineError, EngineLoader, EngineVariant, ProcessEngine};
use crate::error::AppError;
use crate::executor::{self, ConversionRequest, ExecOutcome};
use crate::metrics::{Metric, MetricSample, MetricsLedger};

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConversionResult {
    /// The job produced output (possibly zero-length) and one metric.
    Completed { output: Vec<u8>, metric: Metric },
    /// The job failed; no metric was recorded and the engine stays usable
    /// unless its process died.
    Failed { reason: String },
}

pub struct Gateway {
    native: Arc<EngineSlot>,
    portable: Arc<EngineSlot>,
    ledger: Arc<MetricsLedger>,
}

impl Gateway {
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            native: Arc::new(EngineSlot::new(EngineVariant::Native, Arc::clone(&loader))),
            portable: Arc::new(EngineSlot::new(EngineVariant::Portable, loader)),
            ledger: Arc::new(MetricsLedger::new()),
        }
    }

    /// Gateway backed by real engine images resolved through discovery.
    pub fn with_process_engines() -> Self {
        Self::new(ProcessEngine::loader())
    }

    fn slot(&self, variant: EngineVariant) -> &Arc<EngineSlot> {
        match variant {
            EngineVariant::Native => &self.native,
            EngineVariant::Portable => &self.portable,
        }
    }

    /// Convert one media buffer. Suspends while the job queues behind other
    /// jobs on the same variant; jobs on the other variant run concurrently.
    pub async fn convert(&self, req: ConversionRequest) -> Result<ConversionResult, AppError> {
        req.validate()?;
        let slot = Arc::clone(self.slot(req.variant));
        let ledger = Arc::clone(&self.ledger);

        run_blocking(move || {
            let mut guard = slot.acquire()?;
            let outcome = executor::execute(guard.engine(), &req)?;
            match outcome {
                ExecOutcome::Done { output, elapsed } => {
                    // Recorded while the guard is held so ledger order is
                    // per-variant completion order.
                    let metric = ledger.record(MetricSample {
                        file: req.filename.clone(),
                        elapsed_seconds: elapsed.as_secs_f64(),
                        input_size: req.input.len() as u64,
                        output_size: output.len() as u64,
                        format: req.output_format.clone(),
                        video_codec: req.video_encoder.clone(),
                        audio_codec: req.audio_encoder.clone(),
                        variant: req.variant,
                    });
                    Ok(ConversionResult::Completed { output, metric })
                }
                ExecOutcome::Failed { reason } => Ok(ConversionResult::Failed { reason }),
                ExecOutcome::EngineLost { reason } => {
                    guard.discard(&reason);
                    Ok(ConversionResult::Failed { reason })
                }
            }
        })
        .await
    }

    /// Structured encoder listing, options populated per codec. Served by the
    /// native engine; both variants expose identical capabilities.
    pub async fn list_encoders(&self) -> Result<Vec<CodecDescriptor>, AppError> {
        let slot = Arc::clone(self.slot(EngineVariant::Native));
        run_blocking(move || {
            let mut guard = slot.acquire()?;
            let fetched = fetch_encoder_listing(guard.engine());
            match fetched {
                Ok((raw, raw_options, constants)) => {
                    let mut codecs = decode::decode_codecs(&raw, &constants.codec_caps)?;
                    for codec in &mut codecs {
                        if let Some(opts) = raw_options.get(&codec.id) {
                            codec.options =
                                decode::decode_options(opts, &constants.option_flags)?;
                        }
                    }
                    Ok(codecs)
                }
                Err(e) => Err(listing_error(guard, e)),
            }
        })
        .await
    }

    pub async fn list_codec_options(
        &self,
        codec_id: i32,
    ) -> Result<Vec<OptionDescriptor>, AppError> {
        let slot = Arc::clone(self.slot(EngineVariant::Native));
        run_blocking(move || {
            let mut guard = slot.acquire()?;
            let fetched = {
                let engine = guard.engine();
                engine
                    .list_codec_options(codec_id)
                    .map(|raw| (raw, engine.constants().clone()))
            };
            match fetched {
                Ok((raw, constants)) => decode::decode_options(&raw, &constants.option_flags),
                Err(e) => Err(listing_error(guard, e)),
            }
        })
        .await
    }

    pub async fn list_muxers(&self) -> Result<Vec<MuxerDescriptor>, AppError> {
        let slot = Arc::clone(self.slot(EngineVariant::Native));
        run_blocking(move || {
            let mut guard = slot.acquire()?;
            let fetched = guard.engine().list_muxers();
            match fetched {
                Ok(raw) => Ok(decode::decode_muxers(&raw)),
                Err(e) => Err(listing_error(guard, e)),
            }
        })
        .await
    }

    /// Everything recorded so far, in completion order.
    pub async fn metrics(&self) -> Vec<Metric> {
        self.ledger.snapshot()
    }
}

type EncoderListing = (
    Vec<crate::engine::RawCodec>,
    std::collections::HashMap<i32, Vec<crate::engine::RawOption>>,
    crate::engine::EngineConstants,
);

/// One pass over the engine: the raw encoder records plus the raw option
/// records for every distinct codec id, fetched under the same guard.
fn fetch_encoder_listing(
    engine: &mut dyn crate::engine::CodecEngine,
) -> Result<EncoderListing, EngineError> {
    let raw = engine.list_encoders()?;
    let constants = engine.constants().clone();
    let mut raw_options = std::collections::HashMap::new();
    for codec in &raw {
        if !raw_options.contains_key(&codec.id) {
            raw_options.insert(codec.id, engine.list_codec_options(codec.id)?);
        }
    }
    Ok((raw, raw_options, constants))
}

/// Map a failed listing call; an engine death also poisons the slot.
fn listing_error(guard: EngineGuard<'_>, e: EngineError) -> AppError {
    let message = e.to_string();
    if e.is_fatal() {
        guard.discard(&message);
    }
    AppError::EngineCall(message)
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("engine task failed: {}", e)))?
}
