//! Position comparison and conflict arbitration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Threshold below which two positions differ only by reading-time
/// granularity, not by genuine cross-device divergence.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 5.0;

/// One recorded reading position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Content-fragment locator (e.g. CFI or paragraph anchor)
    pub locator: String,
    pub progress_percent: f64,
    /// Unix seconds at which the position was recorded
    pub recorded_at: i64,
}

/// Transient comparison input; produced by external collaborators,
/// never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPair {
    pub server: PositionRecord,
    pub local: PositionRecord,
}

/// Outcome of comparing the two positions of a pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Divergence within the threshold; the more recently recorded
    /// position is authoritative without user involvement.
    InSync { authoritative: PositionRecord },
    /// Genuine divergence; the user must pick a side.
    Conflict(PositionConflict),
}

/// Both positions plus display-ready ages, handed to the UI collaborator.
/// The chosen side becomes authoritative going forward.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionConflict {
    pub server: PositionRecord,
    pub local: PositionRecord,
    /// e.g. "5 minutes ago"
    pub server_age: String,
    pub local_age: String,
}

impl PositionConflict {
    /// Resolve in favor of the server-reported position.
    pub fn choose_server(self) -> PositionRecord {
        self.server
    }

    /// Resolve in favor of the locally saved position.
    pub fn choose_local(self) -> PositionRecord {
        self.local
    }
}

/// Compares position pairs against a divergence threshold.
#[derive(Debug, Clone)]
pub struct PositionReconciler {
    threshold_percent: f64,
}

impl Default for PositionReconciler {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl PositionReconciler {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    /// Compare the pair. Divergence strictly above the threshold is a
    /// conflict; at or below it, the newer position wins silently.
    pub fn reconcile(&self, pair: PositionPair, now: i64) -> Reconciliation {
        let divergence = (pair.server.progress_percent - pair.local.progress_percent).abs();

        if divergence > self.threshold_percent {
            debug!(divergence, threshold = self.threshold_percent, "Position conflict");
            return Reconciliation::Conflict(PositionConflict {
                server_age: format_age(now, pair.server.recorded_at),
                local_age: format_age(now, pair.local.recorded_at),
                server: pair.server,
                local: pair.local,
            });
        }

        let authoritative = if pair.local.recorded_at >= pair.server.recorded_at {
            pair.local
        } else {
            pair.server
        };
        Reconciliation::InSync { authoritative }
    }
}

/// Human-readable age of a timestamp: "X minutes/hours/days ago".
pub fn format_age(now: i64, recorded_at: i64) -> String {
    let elapsed = (now - recorded_at).max(0);
    if elapsed < 60 {
        return "just now".to_string();
    }

    let minutes = elapsed / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }

    plural(hours / 24, "day")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(percent: f64, recorded_at: i64) -> PositionRecord {
        PositionRecord {
            locator: format!("loc-{}", percent),
            progress_percent: percent,
            recorded_at,
        }
    }

    #[test]
    fn divergence_at_threshold_is_in_sync() {
        let reconciler = PositionReconciler::default();
        let pair = PositionPair {
            server: position(50.0, 100),
            local: position(45.0, 200),
        };
        // Exactly 5 points apart: still equivalent
        match reconciler.reconcile(pair, 1_000) {
            Reconciliation::InSync { authoritative } => {
                assert_eq!(authoritative.progress_percent, 45.0);
            }
            other => panic!("expected InSync, got {:?}", other),
        }
    }

    #[test]
    fn divergence_above_threshold_is_a_conflict() {
        let reconciler = PositionReconciler::default();
        let pair = PositionPair {
            server: position(50.0, 100),
            local: position(44.0, 200),
        };
        assert!(matches!(
            reconciler.reconcile(pair, 1_000),
            Reconciliation::Conflict(_)
        ));
    }

    #[test]
    fn in_sync_prefers_newer_position() {
        let reconciler = PositionReconciler::default();
        let pair = PositionPair {
            server: position(51.0, 900),
            local: position(50.0, 200),
        };
        match reconciler.reconcile(pair, 1_000) {
            Reconciliation::InSync { authoritative } => {
                assert_eq!(authoritative.progress_percent, 51.0);
            }
            other => panic!("expected InSync, got {:?}", other),
        }
    }

    #[test]
    fn conflict_resolution_returns_the_chosen_side() {
        let reconciler = PositionReconciler::default();
        let pair = PositionPair {
            server: position(80.0, 100),
            local: position(20.0, 200),
        };
        let Reconciliation::Conflict(conflict) = reconciler.reconcile(pair.clone(), 1_000) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.clone().choose_server(), pair.server);
        assert_eq!(conflict.choose_local(), pair.local);
    }

    #[test]
    fn conflict_carries_display_ages() {
        let reconciler = PositionReconciler::default();
        let now = 100_000;
        let pair = PositionPair {
            server: position(80.0, now - 90),      // 1.5 minutes
            local: position(20.0, now - 7_200),    // 2 hours
        };
        let Reconciliation::Conflict(conflict) = reconciler.reconcile(pair, now) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.server_age, "1 minute ago");
        assert_eq!(conflict.local_age, "2 hours ago");
    }

    #[test]
    fn age_formatting_covers_each_unit() {
        assert_eq!(format_age(1_000, 990), "just now");
        assert_eq!(format_age(1_000, 1_000 - 300), "5 minutes ago");
        assert_eq!(format_age(100_000, 100_000 - 3 * 3_600), "3 hours ago");
        assert_eq!(format_age(1_000_000, 1_000_000 - 5 * 86_400), "5 days ago");
        // Clock skew is clamped rather than reported as negative
        assert_eq!(format_age(100, 500), "just now");
    }
}
