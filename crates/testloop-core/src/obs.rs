//! Structured observability hooks for repair cycle lifecycle events.
//!
//! This module provides:
//! - A cycle-scoped tracing span via [`CycleSpan`]
//! - Emission functions for key lifecycle events: cycle start/finish, test
//!   results, confirmation, repair dispatch, checkpoint restore
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{info, warn, Span};

/// Cycle-scoped tracing span.
///
/// The span is attached to the cycle future with `Instrument` rather than
/// entered, so it follows the future across await points.
///
/// ```ignore
/// let span = CycleSpan::new(&cycle_id, "unit-*");
/// run_inner().instrument(span.span()).await;
/// ```
pub struct CycleSpan {
    span: Span,
}

impl CycleSpan {
    pub fn new(cycle_id: &str, selector: &str) -> Self {
        Self {
            span: tracing::info_span!("testloop.cycle", cycle_id = %cycle_id, selector = %selector),
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

/// Emit event: cycle started.
pub fn emit_cycle_started(cycle_id: &str, selector: &str, preapproved: bool) {
    info!(
        event = "cycle.started",
        cycle_id = %cycle_id,
        selector = %selector,
        preapproved = preapproved,
    );
}

/// Emit event: one test finished.
pub fn emit_test_finished(name: &str, status: &str, duration_ms: u64) {
    info!(
        event = "test.finished",
        test = %name,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// Emit event: confirmation resolved (`approved`, `declined`, `timed_out`, `preapproved`).
pub fn emit_confirmation_resolved(cycle_id: &str, resolution: &str, repair_count: u32) {
    info!(
        event = "confirmation.resolved",
        cycle_id = %cycle_id,
        resolution = %resolution,
        repair_count = repair_count,
    );
}

/// Emit event: repair dispatch finished.
pub fn emit_repair_dispatched(cycle_id: &str, modify: &str, success: bool) {
    info!(
        event = "repair.dispatched",
        cycle_id = %cycle_id,
        modify = %modify,
        success = success,
    );
}

/// Emit event: pre-repair checkpoint restored.
pub fn emit_checkpoint_restored(cycle_id: &str, checkpoint_id: &str, digest: &str) {
    info!(
        event = "checkpoint.restored",
        cycle_id = %cycle_id,
        checkpoint_id = %checkpoint_id,
        digest = %digest,
    );
}

/// Emit event: cycle finished with its outcome.
pub fn emit_cycle_finished(cycle_id: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "cycle.finished",
        cycle_id = %cycle_id,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Emit event: repair dispatch failed (warning level).
pub fn emit_repair_failed(cycle_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "repair.failed", cycle_id = %cycle_id, error = %error);
}
