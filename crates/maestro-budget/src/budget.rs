//! Token budgets.
//!
//! Two ledgers with different semantics:
//!
//! - the **toolchain budget** caps accumulated tokens per unit (a tool, a
//!   worker, a provider call site). A charge that would overflow the
//!   ceiling resets the unit's counter to the new charge and reports the
//!   overflow — the unit keeps working, the caller decides what to do;
//! - the **session budget** only ever accumulates (until an explicit
//!   reset) and carries the realtime cost estimate.
//!
//! The manager wraps both and raises a compaction suggestion exactly once
//! per threshold crossing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pricing::estimate_cost;

/// Default per-unit token ceiling.
pub const DEFAULT_UNIT_CEILING: u64 = 150_000;

/// Default session size at which compaction is suggested.
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 100_000;

/// Token usage reported by one provider request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Input plus output.
    #[must_use]
    pub fn total(self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-unit accumulated tokens against a fixed ceiling.
#[derive(Debug)]
pub struct ToolchainBudget {
    ceiling: u64,
    units: HashMap<String, u64>,
}

impl Default for ToolchainBudget {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_CEILING)
    }
}

impl ToolchainBudget {
    /// Create a budget with the given per-unit ceiling.
    #[must_use]
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            units: HashMap::new(),
        }
    }

    /// Charge tokens against a unit.
    ///
    /// Returns `true` when the charge fits (a charge landing exactly on
    /// the ceiling fits). On overflow the unit's counter is reset to the
    /// new charge alone and `false` is returned.
    pub fn charge(&mut self, unit: &str, tokens: u64) -> bool {
        let counter = self.units.entry(unit.to_owned()).or_insert(0);
        let new_total = counter.saturating_add(tokens);
        if new_total > self.ceiling {
            warn!(
                unit,
                accumulated = *counter,
                charge = tokens,
                ceiling = self.ceiling,
                "unit budget overflow, counter reset"
            );
            *counter = tokens;
            false
        } else {
            *counter = new_total;
            true
        }
    }

    /// Accumulated tokens for a unit.
    #[must_use]
    pub fn used(&self, unit: &str) -> u64 {
        self.units.get(unit).copied().unwrap_or(0)
    }

    /// The configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

/// Process-wide token usage and cost.
#[derive(Debug)]
pub struct SessionBudget {
    tokens: u64,
    cost_usd: f64,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Default for SessionBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBudget {
    /// Start an empty session ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: 0,
            cost_usd: 0.0,
            started_at: chrono::Utc::now(),
        }
    }

    /// Record one request's usage against the session.
    pub fn record(&mut self, model: &str, usage: TokenUsage) {
        self.tokens = self.tokens.saturating_add(usage.total());
        self.cost_usd += estimate_cost(usage.input_tokens, usage.output_tokens, model);
        debug!(
            model,
            tokens = usage.total(),
            session_tokens = self.tokens,
            "usage recorded"
        );
    }

    /// Session tokens so far.
    #[must_use]
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Estimated session cost in USD.
    #[must_use]
    pub fn cost_usd(&self) -> f64 {
        self.cost_usd
    }

    /// When the session ledger started.
    #[must_use]
    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Zero the ledger and restart the clock.
    pub fn reset(&mut self) {
        info!(
            tokens = self.tokens,
            cost_usd = self.cost_usd,
            "session budget reset"
        );
        self.tokens = 0;
        self.cost_usd = 0.0;
        self.started_at = chrono::Utc::now();
    }
}

/// Raised when the session crosses the compaction threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionSuggestion {
    /// Session tokens at the moment of crossing.
    pub session_tokens: u64,
    /// The configured threshold.
    pub threshold: u64,
}

/// Wraps the toolchain and session ledgers behind one recording surface.
#[derive(Debug)]
pub struct BudgetManager {
    toolchain: ToolchainBudget,
    session: SessionBudget,
    threshold: u64,
    suggested: bool,
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_CEILING, DEFAULT_COMPACTION_THRESHOLD)
    }
}

impl BudgetManager {
    /// Create a manager with explicit ceilings.
    #[must_use]
    pub fn new(unit_ceiling: u64, compaction_threshold: u64) -> Self {
        Self {
            toolchain: ToolchainBudget::new(unit_ceiling),
            session: SessionBudget::new(),
            threshold: compaction_threshold,
            suggested: false,
        }
    }

    /// Record one request: charges the unit, accumulates the session, and
    /// returns a suggestion the first time the session crosses the
    /// threshold. The unit overflow result is deliberately not surfaced
    /// here; use [`BudgetManager::charge_unit`] when the caller cares.
    pub fn record(
        &mut self,
        unit: &str,
        model: &str,
        usage: TokenUsage,
    ) -> Option<CompactionSuggestion> {
        let _ = self.toolchain.charge(unit, usage.total());
        self.session.record(model, usage);
        self.check_threshold()
    }

    /// Charge a unit directly, surfacing the overflow result.
    pub fn charge_unit(&mut self, unit: &str, tokens: u64) -> bool {
        self.toolchain.charge(unit, tokens)
    }

    /// Notify the manager that a compaction ran, re-arming the suggestion
    /// for the next crossing.
    pub fn compaction_applied(&mut self, remaining_tokens: u64) {
        self.session.tokens = remaining_tokens;
        self.suggested = remaining_tokens >= self.threshold;
    }

    /// Reset the session ledger and re-arm the suggestion.
    pub fn reset_session(&mut self) {
        self.session.reset();
        self.suggested = false;
    }

    /// Session ledger, read-only.
    #[must_use]
    pub fn session(&self) -> &SessionBudget {
        &self.session
    }

    /// Toolchain ledger, read-only.
    #[must_use]
    pub fn toolchain(&self) -> &ToolchainBudget {
        &self.toolchain
    }

    fn check_threshold(&mut self) -> Option<CompactionSuggestion> {
        if self.suggested || self.session.tokens < self.threshold {
            return None;
        }
        self.suggested = true;
        info!(
            session_tokens = self.session.tokens,
            threshold = self.threshold,
            "session crossed compaction threshold"
        );
        Some(CompactionSuggestion {
            session_tokens: self.session.tokens,
            threshold: self.threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    // ── ToolchainBudget ──

    #[test]
    fn charge_accumulates() {
        let mut budget = ToolchainBudget::new(1000);
        assert!(budget.charge("grep", 400));
        assert!(budget.charge("grep", 500));
        assert_eq!(budget.used("grep"), 900);
    }

    #[test]
    fn exact_ceiling_allowed() {
        let mut budget = ToolchainBudget::new(1000);
        assert!(budget.charge("grep", 600));
        assert!(budget.charge("grep", 400));
        assert_eq!(budget.used("grep"), 1000);
    }

    #[test]
    fn overflow_resets_to_new_charge() {
        let mut budget = ToolchainBudget::new(1000);
        assert!(budget.charge("grep", 900));
        assert!(!budget.charge("grep", 200));
        // Counter restarts from the overflowing charge alone.
        assert_eq!(budget.used("grep"), 200);
        assert!(budget.charge("grep", 700));
        assert_eq!(budget.used("grep"), 900);
    }

    #[test]
    fn units_are_independent() {
        let mut budget = ToolchainBudget::new(1000);
        assert!(!budget.charge("a", 2000));
        assert!(budget.charge("b", 10));
        assert_eq!(budget.used("a"), 2000);
        assert_eq!(budget.used("b"), 10);
    }

    #[test]
    fn unknown_unit_zero() {
        let budget = ToolchainBudget::default();
        assert_eq!(budget.used("never-charged"), 0);
        assert_eq!(budget.ceiling(), DEFAULT_UNIT_CEILING);
    }

    // ── SessionBudget ──

    #[test]
    fn session_accumulates_and_resets() {
        let mut session = SessionBudget::new();
        session.record("claude-sonnet-4-5", usage(1000, 500));
        session.record("claude-sonnet-4-5", usage(2000, 1000));
        assert_eq!(session.tokens(), 4500);
        assert!(session.cost_usd() > 0.0);
        session.reset();
        assert_eq!(session.tokens(), 0);
        assert!((session.cost_usd() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        let mut session = SessionBudget::new();
        session.record("some-local-model", usage(1_000_000, 1_000_000));
        assert_eq!(session.tokens(), 2_000_000);
        assert!((session.cost_usd() - 0.0).abs() < f64::EPSILON);
    }

    // ── BudgetManager ──

    #[test]
    fn suggestion_once_per_crossing() {
        let mut manager = BudgetManager::new(DEFAULT_UNIT_CEILING, 1000);
        assert!(manager.record("w", "m", usage(300, 100)).is_none());
        let suggestion = manager.record("w", "m", usage(500, 200)).unwrap();
        assert_eq!(suggestion.session_tokens, 1100);
        assert_eq!(suggestion.threshold, 1000);
        // Still above threshold: no repeat.
        assert!(manager.record("w", "m", usage(100, 0)).is_none());
    }

    #[test]
    fn suggestion_rearms_after_compaction() {
        let mut manager = BudgetManager::new(DEFAULT_UNIT_CEILING, 1000);
        assert!(manager.record("w", "m", usage(1500, 0)).is_some());
        manager.compaction_applied(200);
        assert_eq!(manager.session().tokens(), 200);
        assert!(manager.record("w", "m", usage(900, 0)).is_some());
    }

    #[test]
    fn suggestion_rearms_after_session_reset() {
        let mut manager = BudgetManager::new(DEFAULT_UNIT_CEILING, 1000);
        assert!(manager.record("w", "m", usage(1500, 0)).is_some());
        manager.reset_session();
        assert_eq!(manager.session().tokens(), 0);
        assert!(manager.record("w", "m", usage(2000, 0)).is_some());
    }

    #[test]
    fn exact_threshold_triggers() {
        let mut manager = BudgetManager::new(DEFAULT_UNIT_CEILING, 1000);
        assert!(manager.record("w", "m", usage(600, 400)).is_some());
    }

    #[test]
    fn unit_overflow_does_not_block_recording() {
        let mut manager = BudgetManager::new(100, 1_000_000);
        assert!(manager.record("w", "m", usage(300, 0)).is_none());
        // Session still counted despite unit overflow.
        assert_eq!(manager.session().tokens(), 300);
        assert_eq!(manager.toolchain().used("w"), 300);
    }
}
