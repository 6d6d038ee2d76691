//! Transcript compaction.
//!
//! When the session grows past the threshold, everything before the most
//! recent exchange collapses into one summary entry, and any retained
//! entry over the char ceiling is hard-truncated (UTF-8 safe). Token
//! estimation uses the 4-chars-per-token heuristic; precise counts come
//! from the provider after the fact.

use maestro_core::text::truncate_with_suffix;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Chars per token for estimation.
const CHARS_PER_TOKEN: u64 = 4;

/// Default hard ceiling for a retained entry's content.
pub const DEFAULT_ENTRY_CHAR_CEILING: usize = 8_000;

const TRUNCATION_SUFFIX: &str = "… [truncated]";

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Framework-injected context, including compaction summaries.
    System,
    /// Operator request.
    User,
    /// Model output.
    Assistant,
    /// Tool result fed back to the model.
    Tool,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Producer of this entry.
    pub role: Role,
    /// Entry content.
    pub content: String,
}

impl Entry {
    /// Convenience constructor.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Entries before the pass.
    pub entries_before: usize,
    /// Entries after the pass.
    pub entries_after: usize,
    /// Estimated tokens before the pass.
    pub tokens_before: u64,
    /// Estimated tokens after the pass.
    pub tokens_after: u64,
}

impl CompactionReport {
    /// Estimated tokens reclaimed.
    #[must_use]
    pub fn tokens_reclaimed(&self) -> u64 {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// An ordered conversation transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    /// Empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(Entry::new(role, content));
    }

    /// All entries, in order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated token size at 4 chars per token.
    #[must_use]
    pub fn estimated_tokens(&self) -> u64 {
        let chars: u64 = self
            .entries
            .iter()
            .map(|e| e.content.chars().count() as u64)
            .sum();
        chars / CHARS_PER_TOKEN
    }

    /// Collapse everything before the most recent exchange into one
    /// summary entry and hard-truncate retained entries beyond
    /// `entry_char_ceiling`.
    ///
    /// The most recent exchange starts at the last `User` entry; with no
    /// user entry at all, only the final entry is retained.
    pub fn compact(&mut self, entry_char_ceiling: usize) -> CompactionReport {
        let entries_before = self.entries.len();
        let tokens_before = self.estimated_tokens();

        let cut = self
            .entries
            .iter()
            .rposition(|e| e.role == Role::User)
            .unwrap_or(self.entries.len().saturating_sub(1));

        if cut > 0 {
            let collapsed: Vec<Entry> = self.entries.drain(..cut).collect();
            let summary = summarize(&collapsed);
            self.entries.insert(0, Entry::new(Role::System, summary));
        }

        for entry in &mut self.entries {
            if entry.content.len() > entry_char_ceiling {
                entry.content =
                    truncate_with_suffix(&entry.content, entry_char_ceiling, TRUNCATION_SUFFIX);
            }
        }

        let report = CompactionReport {
            entries_before,
            entries_after: self.entries.len(),
            tokens_before,
            tokens_after: self.estimated_tokens(),
        };
        info!(
            entries_before = report.entries_before,
            entries_after = report.entries_after,
            tokens_before = report.tokens_before,
            tokens_after = report.tokens_after,
            reclaimed = report.tokens_reclaimed(),
            "transcript compacted"
        );
        report
    }
}

fn summarize(collapsed: &[Entry]) -> String {
    let users = collapsed.iter().filter(|e| e.role == Role::User).count();
    let assistants = collapsed
        .iter()
        .filter(|e| e.role == Role::Assistant)
        .count();
    let tools = collapsed.iter().filter(|e| e.role == Role::Tool).count();
    let first_request = collapsed
        .iter()
        .find(|e| e.role == Role::User)
        .map_or_else(String::new, |e| {
            format!(
                " Initial request: {}",
                truncate_with_suffix(&e.content, 200, "…")
            )
        });
    format!(
        "[compacted {} earlier entries: {users} user, {assistants} assistant, {tools} tool]{first_request}",
        collapsed.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript_with_history() -> Transcript {
        let mut t = Transcript::new();
        t.push(Role::User, "refactor the parser");
        t.push(Role::Assistant, "working on it");
        t.push(Role::Tool, "x".repeat(20_000));
        t.push(Role::Assistant, "done");
        t.push(Role::User, "now add tests");
        t.push(Role::Assistant, "adding tests");
        t
    }

    #[test]
    fn estimation_four_chars_per_token() {
        let mut t = Transcript::new();
        t.push(Role::User, "a".repeat(400));
        assert_eq!(t.estimated_tokens(), 100);
    }

    #[test]
    fn compact_keeps_most_recent_exchange() {
        let mut t = transcript_with_history();
        let _ = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        // Summary + last user + trailing assistant.
        assert_eq!(t.len(), 3);
        assert_eq!(t.entries()[0].role, Role::System);
        assert_eq!(t.entries()[1].content, "now add tests");
        assert_eq!(t.entries()[2].content, "adding tests");
    }

    #[test]
    fn compact_reduces_estimate_and_reports_delta() {
        let mut t = transcript_with_history();
        let before = t.estimated_tokens();
        let report = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        assert_eq!(report.tokens_before, before);
        assert_eq!(report.tokens_after, t.estimated_tokens());
        assert!(report.tokens_after < report.tokens_before);
        assert!(report.tokens_reclaimed() > 0);
    }

    #[test]
    fn summary_mentions_collapsed_counts() {
        let mut t = transcript_with_history();
        let _ = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        let summary = &t.entries()[0].content;
        assert!(summary.contains("4 earlier entries"));
        assert!(summary.contains("refactor the parser"));
    }

    #[test]
    fn retained_entries_hard_truncated() {
        let mut t = Transcript::new();
        t.push(Role::User, "q");
        t.push(Role::Tool, "y".repeat(50_000));
        let _ = t.compact(1_000);
        let tool_entry = &t.entries()[1];
        assert!(tool_entry.content.len() <= 1_000);
        assert!(tool_entry.content.ends_with("[truncated]"));
    }

    #[test]
    fn truncation_is_utf8_safe() {
        let mut t = Transcript::new();
        t.push(Role::User, "é".repeat(2_000));
        let _ = t.compact(1_001);
        // Must not panic; content still valid UTF-8 by construction.
        assert!(t.entries()[0].content.len() <= 1_001);
    }

    #[test]
    fn compact_without_user_entries_keeps_last() {
        let mut t = Transcript::new();
        t.push(Role::Assistant, "one");
        t.push(Role::Assistant, "two");
        t.push(Role::Assistant, "three");
        let _ = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        assert_eq!(t.len(), 2);
        assert_eq!(t.entries()[1].content, "three");
    }

    #[test]
    fn compact_single_entry_noop() {
        let mut t = Transcript::new();
        t.push(Role::User, "hello");
        let report = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        assert_eq!(report.entries_before, 1);
        assert_eq!(report.entries_after, 1);
        assert_eq!(t.entries()[0].content, "hello");
    }

    #[test]
    fn compact_empty_noop() {
        let mut t = Transcript::new();
        let report = t.compact(DEFAULT_ENTRY_CHAR_CEILING);
        assert_eq!(report.entries_after, 0);
    }
}
