//! Outcome aggregation for operator-facing reports

use crate::writer::{WriteOutcome, WriteStatus};
use serde::{Deserialize, Serialize};

/// Counts of write outcomes by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// Total outcomes counted
    pub total: usize,
    pub written: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub preview: usize,
    pub errors: usize,
}

impl OutcomeSummary {
    pub fn from_outcomes(outcomes: &[WriteOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add(outcome.status);
        }
        summary
    }

    pub fn add(&mut self, status: WriteStatus) {
        self.total += 1;
        match status {
            WriteStatus::Written => self.written += 1,
            WriteStatus::Overwritten => self.overwritten += 1,
            WriteStatus::Skipped => self.skipped += 1,
            WriteStatus::Preview => self.preview += 1,
            WriteStatus::Error => self.errors += 1,
        }
    }

    /// Outcomes that changed the filesystem
    pub fn changed(&self) -> usize {
        self.written + self.overwritten
    }

    /// A pass fails only on errors; skipped files are informational
    pub fn is_failed(&self) -> bool {
        self.errors > 0
    }
}
