//! Per-variant engine slot: boots the engine at most once per process
//! lifetime and hands out exclusive guards.
//!
//! All engine operations are non-reentrant, so the guard doubles as the
//! serialization point: while one job holds it, same-variant jobs queue on
//! the slot lock. A boot failure latches; only recreating the gateway (i.e.
//! restarting the worker) recovers the variant.

use parking_lot::{Mutex, MutexGuard};

use super::{BoxedEngine, CodecEngine, EngineLoader, EngineVariant};
use crate::error::AppError;

enum SlotState {
    Idle,
    Ready(BoxedEngine),
    Failed(String),
}

pub struct EngineSlot {
    variant: EngineVariant,
    loader: EngineLoader,
    state: Mutex<SlotState>,
}

impl EngineSlot {
    pub fn new(variant: EngineVariant, loader: EngineLoader) -> Self {
        Self {
            variant,
            loader,
            state: Mutex::new(SlotState::Idle),
        }
    }

    pub fn variant(&self) -> EngineVariant {
        self.variant
    }

    /// Block until the engine is Ready or Failed, booting it on first use.
    /// Concurrent callers queue on the slot lock and observe the single
    /// boot's outcome.
    pub fn acquire(&self) -> Result<EngineGuard<'_>, AppError> {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Idle) {
            log::info!(
                target: "vidmill::engine::slot",
                "booting {} engine",
                self.variant
            );
            match (self.loader)(self.variant) {
                Ok(engine) => *state = SlotState::Ready(engine),
                Err(e) => {
                    let reason = e.to_string();
                    log::error!(
                        target: "vidmill::engine::slot",
                        "{} engine boot failed: {}",
                        self.variant,
                        reason
                    );
                    *state = SlotState::Failed(reason);
                }
            }
        }
        if let SlotState::Failed(reason) = &*state {
            return Err(AppError::EngineInit(reason.clone()));
        }
        // Idle was resolved above, so the guard always covers Ready.
        Ok(EngineGuard {
            variant: self.variant,
            state,
        })
    }
}

/// Exclusive access to one Ready engine.
pub struct EngineGuard<'a> {
    variant: EngineVariant,
    state: MutexGuard<'a, SlotState>,
}

impl std::fmt::Debug for EngineGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineGuard")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl EngineGuard<'_> {
    pub fn engine(&mut self) -> &mut dyn CodecEngine {
        match &mut *self.state {
            SlotState::Ready(engine) => engine.as_mut(),
            _ => unreachable!("engine guard only exists for a Ready slot"),
        }
    }

    /// Drop the engine and latch the slot Failed. Used when the engine
    /// process died mid-call; later acquires report an initialization error.
    pub fn discard(mut self, reason: &str) {
        log::error!(
            target: "vidmill::engine::slot",
            "discarding {} engine: {}",
            self.variant,
            reason
        );
        *self.state = SlotState::Failed(reason.to_string());
    }
}
