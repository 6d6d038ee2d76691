//! Safety guard — recursion bound and emergency recovery.
//!
//! Plan generation can nest (a todo whose execution asks for a sub-plan).
//! The guard bounds that nesting, and when the bound is hit, runs an
//! emergency recovery that returns the engine to a known-idle state:
//! depth zeroed, mode reset, cleanup flag released, pending inputs
//! dropped, timers aborted, temporary listeners removed. Recovery is
//! idempotent — running it twice leaves the same state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::bus::Subscription;
use crate::errors::RuntimeError;

/// Maximum nested plan-generation depth.
pub const MAX_RECURSION_DEPTH: u32 = 3;

/// Coarse engine mode, reset to `Idle` by emergency recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Nothing running.
    #[default]
    Idle,
    /// Generating a plan.
    Planning,
    /// Executing a plan.
    Executing,
}

/// Mutable state the guard protects. The API is deliberately narrow; no
/// caller can set the depth or the cleanup flag directly.
#[derive(Default)]
pub struct RecoveryState {
    depth: AtomicU32,
    cleanup_in_progress: AtomicBool,
    mode: Mutex<EngineMode>,
    timers: Mutex<Vec<AbortHandle>>,
    pending_inputs: Mutex<Vec<String>>,
    temporary_listeners: Mutex<Vec<Subscription>>,
}

impl RecoveryState {
    /// Fresh idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment recursion depth, returning the new depth.
    pub fn increment(&self) -> u32 {
        self.depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement recursion depth unless already zero. Returns whether a
    /// decrement happened. Never underflows.
    pub fn decrement_if_positive(&self) -> bool {
        self.depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .is_ok()
    }

    /// Current recursion depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    /// Try to take the single-flight cleanup flag. Returns `false` when a
    /// cleanup already holds it — the caller must log and return, not
    /// wait.
    pub fn try_acquire_cleanup(&self) -> bool {
        self.cleanup_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the cleanup flag. Safe to call when not held.
    pub fn release_cleanup(&self) {
        self.cleanup_in_progress.store(false, Ordering::SeqCst);
    }

    /// Whether a cleanup currently holds the flag.
    #[must_use]
    pub fn cleanup_in_progress(&self) -> bool {
        self.cleanup_in_progress.load(Ordering::SeqCst)
    }

    /// Current engine mode.
    #[must_use]
    pub fn mode(&self) -> EngineMode {
        *self.mode.lock()
    }

    /// Set the engine mode.
    pub fn set_mode(&self, mode: EngineMode) {
        *self.mode.lock() = mode;
    }

    /// Track a detached timer or watcher task so recovery can abort it.
    /// Structured waits (`tokio::time::timeout` inside a dispatch) need no
    /// tracking; this registry is for tasks spawned off the control flow,
    /// like the CLI's interrupt watcher.
    pub fn register_timer(&self, handle: AbortHandle) {
        self.timers.lock().push(handle);
    }

    /// Abort and forget all tracked timers. Returns how many were cleared.
    pub fn clear_timers(&self) -> usize {
        let timers: Vec<AbortHandle> = std::mem::take(&mut *self.timers.lock());
        for handle in &timers {
            handle.abort();
        }
        timers.len()
    }

    /// Queue operator input that arrived while busy. The engine itself
    /// never queues; interactive surfaces park mid-run commands here, and
    /// recovery drops whatever is parked.
    pub fn push_pending_input(&self, input: impl Into<String>) {
        self.pending_inputs.lock().push(input.into());
    }

    /// Take all queued inputs.
    pub fn drain_pending_inputs(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending_inputs.lock())
    }

    /// Track a listener that should not survive emergency recovery.
    pub fn register_temporary_listener(&self, sub: Subscription) {
        self.temporary_listeners.lock().push(sub);
    }
}

/// Wraps plan-generation entry points with the recursion bound and owns
/// emergency recovery.
#[derive(Clone, Default)]
pub struct SafetyGuard {
    state: Arc<RecoveryState>,
    max_depth: u32,
}

impl SafetyGuard {
    /// Guard with the default bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_depth(MAX_RECURSION_DEPTH)
    }

    /// Guard with an explicit bound.
    #[must_use]
    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            state: Arc::new(RecoveryState::new()),
            max_depth: max_depth.max(1),
        }
    }

    /// Shared state, for cleanup routines and the orchestrator.
    #[must_use]
    pub fn state(&self) -> &Arc<RecoveryState> {
        &self.state
    }

    /// Enter a plan-generation scope. At the bound, runs emergency
    /// recovery and refuses with [`RuntimeError::RecursionLimit`].
    pub fn enter_generation(&self) -> Result<RecursionScope, RuntimeError> {
        let depth = self.state.increment();
        if depth > self.max_depth {
            warn!(depth, max = self.max_depth, "recursion limit reached");
            // Undo our own increment before recovering.
            let _ = self.state.decrement_if_positive();
            self.emergency_recover();
            return Err(RuntimeError::RecursionLimit {
                depth,
                max: self.max_depth,
            });
        }
        Ok(RecursionScope {
            state: Arc::clone(&self.state),
        })
    }

    /// Reset the engine to a known-idle state. Idempotent; every reset is
    /// unconditional.
    pub fn emergency_recover(&self) {
        let timers = self.state.clear_timers();
        let inputs = self.state.drain_pending_inputs().len();
        let listeners = self.state.temporary_listeners.lock().drain(..).count();
        self.state.depth.store(0, Ordering::SeqCst);
        self.state.set_mode(EngineMode::Idle);
        self.state.release_cleanup();
        info!(
            timers_cleared = timers,
            inputs_dropped = inputs,
            listeners_removed = listeners,
            "emergency recovery complete"
        );
    }
}

/// RAII guard for one level of plan generation. Dropping it decrements
/// the depth, on success and error paths alike.
pub struct RecursionScope {
    state: Arc<RecoveryState>,
}

impl std::fmt::Debug for RecursionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursionScope").finish_non_exhaustive()
    }
}

impl Drop for RecursionScope {
    fn drop(&mut self) {
        let _ = self.state.decrement_if_positive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, EventFilter};
    use assert_matches::assert_matches;

    #[test]
    fn depth_tracks_scopes() {
        let guard = SafetyGuard::new();
        assert_eq!(guard.state().depth(), 0);
        let outer = guard.enter_generation().unwrap();
        let inner = guard.enter_generation().unwrap();
        assert_eq!(guard.state().depth(), 2);
        drop(inner);
        assert_eq!(guard.state().depth(), 1);
        drop(outer);
        assert_eq!(guard.state().depth(), 0);
    }

    #[test]
    fn bound_refuses_fourth_level() {
        let guard = SafetyGuard::new();
        let _s1 = guard.enter_generation().unwrap();
        let _s2 = guard.enter_generation().unwrap();
        let _s3 = guard.enter_generation().unwrap();
        let err = guard.enter_generation().unwrap_err();
        assert_matches!(err, RuntimeError::RecursionLimit { depth: 4, max: 3 });
        // Recovery zeroed the depth even with scopes alive.
        assert_eq!(guard.state().depth(), 0);
    }

    #[test]
    fn decrement_never_underflows() {
        let state = RecoveryState::new();
        assert!(!state.decrement_if_positive());
        assert_eq!(state.depth(), 0);
        let _ = state.increment();
        assert!(state.decrement_if_positive());
        assert!(!state.decrement_if_positive());
    }

    #[test]
    fn cleanup_flag_single_flight() {
        let state = RecoveryState::new();
        assert!(state.try_acquire_cleanup());
        // Second acquirer must observe the flag and back off.
        assert!(!state.try_acquire_cleanup());
        state.release_cleanup();
        assert!(state.try_acquire_cleanup());
    }

    #[test]
    fn release_without_hold_is_safe() {
        let state = RecoveryState::new();
        state.release_cleanup();
        assert!(!state.cleanup_in_progress());
    }

    #[tokio::test]
    async fn recovery_aborts_timers() {
        let guard = SafetyGuard::new();
        let timer = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        guard.state().register_timer(timer.abort_handle());
        guard.emergency_recover();
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn recovery_is_idempotent() {
        let guard = SafetyGuard::new();
        let _ = guard.state().increment();
        let _ = guard.state().increment();
        assert!(guard.state().try_acquire_cleanup());
        guard.state().push_pending_input("queued command");
        guard.state().set_mode(EngineMode::Executing);

        guard.emergency_recover();
        guard.emergency_recover();

        assert_eq!(guard.state().depth(), 0);
        assert_eq!(guard.state().mode(), EngineMode::Idle);
        assert!(!guard.state().cleanup_in_progress());
        assert!(guard.state().drain_pending_inputs().is_empty());
    }

    #[test]
    fn recovery_removes_temporary_listeners() {
        let guard = SafetyGuard::new();
        let bus = EventBus::new();
        let sub = bus.subscribe(EventFilter::All, |_| Ok(()));
        guard.state().register_temporary_listener(sub);
        assert_eq!(bus.subscriber_count(), 1);
        guard.emergency_recover();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn custom_bound() {
        let guard = SafetyGuard::with_max_depth(1);
        let scope = guard.enter_generation().unwrap();
        drop(scope);
        let scope = guard.enter_generation().unwrap();
        drop(scope);
        let _held = guard.enter_generation().unwrap();
        assert!(guard.enter_generation().is_err());
    }
}
