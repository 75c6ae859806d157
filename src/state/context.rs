//! Context-size accounting over a run's event log.

use serde::Serialize;

use super::RunEvent;

/// Rough characters-per-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Size of the accumulated event history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub num_events: usize,
    pub total_chars: usize,
    pub estimated_tokens: usize,
    pub within_limit: bool,
}

/// Limits applied when deciding how much history to keep in view.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_events: usize,
    pub max_tokens: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_events: 200,
            max_tokens: 100_000,
        }
    }
}

impl ContextBudget {
    pub fn new(max_events: usize, max_tokens: usize) -> Self {
        Self {
            max_events,
            max_tokens,
        }
    }

    pub fn stats(&self, events: &[RunEvent]) -> ContextStats {
        let total_chars: usize = events.iter().map(|e| e.text.chars().count()).sum();
        let estimated_tokens = total_chars / CHARS_PER_TOKEN;
        ContextStats {
            num_events: events.len(),
            total_chars,
            estimated_tokens,
            within_limit: estimated_tokens < self.max_tokens,
        }
    }

    /// True when the history exceeds either the event or the token limit.
    pub fn should_compact(&self, events: &[RunEvent]) -> bool {
        let stats = self.stats(events);
        stats.num_events > self.max_events || !stats.within_limit
    }

    /// The newest events that fit the event limit.
    pub fn window<'a>(&self, events: &'a [RunEvent]) -> &'a [RunEvent] {
        let start = events.len().saturating_sub(self.max_events);
        &events[start..]
    }
}
