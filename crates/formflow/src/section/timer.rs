//! Auto-advance scheduling
//!
//! The timer does not run a thread. It records which section should advance
//! and when; the host polls it and the flow re-checks every precondition at
//! fire time.

use chrono::{DateTime, Duration, Utc};
use log::debug;

/// A pending auto-advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAdvance {
    pub section_id: String,
    pub due: DateTime<Utc>,
}

/// Single-slot cancellable timer
#[derive(Debug, Clone, Default)]
pub struct AutoAdvanceTimer {
    pending: Option<ScheduledAdvance>,
}

impl AutoAdvanceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an advance of `section_id`, replacing any pending one.
    /// Delays are capped at `u32::MAX` milliseconds.
    pub fn schedule(&mut self, section_id: impl Into<String>, now: DateTime<Utc>, delay_ms: u64) {
        let delay = Duration::milliseconds(delay_ms.min(u64::from(u32::MAX)) as i64);
        let due = now.checked_add_signed(delay).unwrap_or(now);
        let section_id = section_id.into();
        debug!("auto-advance of {} scheduled for {}", section_id, due);
        self.pending = Some(ScheduledAdvance { section_id, due });
    }

    /// Cancel the pending advance, if any
    pub fn cancel(&mut self) -> Option<ScheduledAdvance> {
        let cancelled = self.pending.take();
        if let Some(advance) = &cancelled {
            debug!("auto-advance of {} cancelled", advance.section_id);
        }
        cancelled
    }

    pub fn pending(&self) -> Option<&ScheduledAdvance> {
        self.pending.as_ref()
    }

    /// Is an advance of `section_id` pending?
    pub fn is_pending_for(&self, section_id: &str) -> bool {
        self.pending
            .as_ref()
            .map_or(false, |advance| advance.section_id == section_id)
    }

    /// Take the pending advance if it is due at `now`
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledAdvance> {
        match &self.pending {
            Some(advance) if advance.due <= now => self.pending.take(),
            _ => None,
        }
    }
}
