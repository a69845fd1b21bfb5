//! Prefix-safe batch results and publish-failure classification.

/// Two-way failure taxonomy for publish attempts.
///
/// Anything a retry might fix is a system failure; anything a retry can
/// never fix is a poison pill. The unknown defaults to system failure
/// because a wasted retry is cheap and a false quarantine is data loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    PoisonPill,
    SystemFailure,
}

/// A permanently-broken outbox entry discovered at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonPill {
    /// Outbox id of the offending entry.
    pub entry_id: i64,
    pub reason: String,
}

/// Result of processing one per-portfolio batch.
///
/// `sent` is always a contiguous prefix of the input id sequence, ending at
/// the first failure or at the end on full success. Entries after the
/// prefix stay PENDING.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Success {
        sent: Vec<i64>,
    },
    /// The pill is quarantined in the same transaction that marks the
    /// prefix as sent; later entries are retried next iteration.
    PoisonPill {
        sent: Vec<i64>,
        pill: PoisonPill,
    },
    /// Publishing must stop immediately to preserve ordering; the worker
    /// backs off before the next iteration.
    SystemFailure {
        sent: Vec<i64>,
        reason: String,
    },
}

impl BatchOutcome {
    /// The successfully published prefix, whatever the outcome.
    pub fn sent(&self) -> &[i64] {
        match self {
            BatchOutcome::Success { sent }
            | BatchOutcome::PoisonPill { sent, .. }
            | BatchOutcome::SystemFailure { sent, .. } => sent,
        }
    }

    pub fn is_system_failure(&self) -> bool {
        matches!(self, BatchOutcome::SystemFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_prefix_is_accessible_for_all_variants() {
        let success = BatchOutcome::Success { sent: vec![1, 2] };
        let pill = BatchOutcome::PoisonPill {
            sent: vec![1],
            pill: PoisonPill {
                entry_id: 2,
                reason: "decode failure".into(),
            },
        };
        let failure = BatchOutcome::SystemFailure {
            sent: vec![],
            reason: "broker down".into(),
        };
        assert_eq!(success.sent(), &[1, 2]);
        assert_eq!(pill.sent(), &[1]);
        assert!(failure.sent().is_empty());
        assert!(failure.is_system_failure());
        assert!(!pill.is_system_failure());
    }
}
