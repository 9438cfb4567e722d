// origin.rs — Two-phase origin detection.
//
// Phase 1 (candidate): strong pool evidence in the trailing window.
// Phase 2 (commit): |displacement| past the step threshold, held for the full
// horizon. Falling under the rebound band while pending restarts the horizon.

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::pool_window::PoolStats;
use crate::TIME_EPS;

const DEG_EPS: f64 = 1e-9;

/// Origin transition produced by one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginEvent {
    Candidate,
    Commit,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OriginSnapshot {
    pub candidate_set: bool,
    pub candidate_time_s: Option<f64>,
    pub commit_set: bool,
    pub commit_time_s: Option<f64>,
    pub commit_pending_since_s: Option<f64>,
    pub time0_s: Option<f64>,
    pub origin_deg: Option<f64>,
    pub origin_conf: f64,
    pub rebound_count: u32,
    pub theta_hat_rot: f64,
}

pub struct OriginTracker {
    // Candidate thresholds
    changes_min: usize,
    unique_min: usize,
    valid_rate_min: f64,

    // Commit thresholds
    step_deg: f64,
    horizon_s: f64,
    rebound_eps_deg: f64,
    commit_conf: f64,

    candidate_set: bool,
    candidate_time_s: Option<f64>,
    commit_set: bool,
    commit_time_s: Option<f64>,
    pending_since_s: Option<f64>,
    rebound_count: u32,

    time0_s: Option<f64>,
    origin_deg: Option<f64>,
    origin_conf: f64,

    disp_acc_deg: f64,
    theta_hat_rot: f64,
}

impl OriginTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            changes_min: config.pool_changes_min,
            unique_min: config.pool_unique_min,
            valid_rate_min: config.pool_valid_rate_min,
            step_deg: config.origin_step_deg,
            horizon_s: config.origin_commit_horizon_s,
            rebound_eps_deg: config.origin_rebound_eps_deg,
            commit_conf: config.origin_commit_conf,
            candidate_set: false,
            candidate_time_s: None,
            commit_set: false,
            commit_time_s: None,
            pending_since_s: None,
            rebound_count: 0,
            time0_s: None,
            origin_deg: None,
            origin_conf: 0.0,
            disp_acc_deg: 0.0,
            theta_hat_rot: 0.0,
        }
    }

    /// Feed the tick's accumulated displacement; `theta_hat_rot` follows the delta.
    pub fn set_displacement(&mut self, disp_acc_deg: f64) {
        self.theta_hat_rot += (disp_acc_deg - self.disp_acc_deg) / 360.0;
        self.disp_acc_deg = disp_acc_deg;
    }

    /// Run both phases for this tick. At most one event is reported; a commit
    /// takes precedence when both happen on the same tick.
    pub fn evaluate(
        &mut self,
        stats: &PoolStats,
        now: f64,
        micro_t0_s: Option<f64>,
    ) -> Option<OriginEvent> {
        let candidate = self.evaluate_candidate(stats, now, micro_t0_s);
        let commit = self.evaluate_commit(now, micro_t0_s);
        commit.or(candidate)
    }

    pub fn evaluate_candidate(
        &mut self,
        stats: &PoolStats,
        now: f64,
        micro_t0_s: Option<f64>,
    ) -> Option<OriginEvent> {
        if self.candidate_set {
            return None;
        }
        let strong = stats.change_count >= self.changes_min
            && stats.unique_values >= self.unique_min
            && stats.valid_rate >= self.valid_rate_min;
        if !strong {
            return None;
        }

        self.candidate_set = true;
        self.candidate_time_s = Some(now);
        self.anchor();
        self.lower_time0(micro_t0_s.unwrap_or(now));

        log::debug!(
            "[ORIGIN] candidate at {:.3}s (changes={}, unique={}, valid={:.2}) time0={:?}",
            now,
            stats.change_count,
            stats.unique_values,
            stats.valid_rate,
            self.time0_s
        );
        Some(OriginEvent::Candidate)
    }

    pub fn evaluate_commit(&mut self, now: f64, micro_t0_s: Option<f64>) -> Option<OriginEvent> {
        if self.commit_set {
            return None;
        }
        let magnitude = self.disp_acc_deg.abs();

        let Some(since) = self.pending_since_s else {
            if magnitude + DEG_EPS >= self.step_deg {
                self.pending_since_s = Some(now);
                log::debug!("[ORIGIN] commit pending at {:.3}s ({:.1} deg)", now, self.disp_acc_deg);
            }
            return None;
        };

        if magnitude < self.rebound_eps_deg {
            self.pending_since_s = None;
            self.rebound_count += 1;
            log::debug!(
                "[ORIGIN] rebound to {:.1} deg, horizon restarted (#{})",
                self.disp_acc_deg,
                self.rebound_count
            );
            return None;
        }
        if now - since + TIME_EPS < self.horizon_s {
            return None;
        }

        self.commit_set = true;
        self.commit_time_s = Some(now);
        self.pending_since_s = None;
        self.theta_hat_rot -= self.disp_acc_deg / 360.0;
        self.origin_conf = self.commit_conf;
        self.anchor();
        // time0 is frozen once a candidate exists.
        if !self.candidate_set {
            self.lower_time0(micro_t0_s.map_or(now, |t| t.min(now)));
        }

        log::debug!(
            "[ORIGIN] commit at {:.3}s ({:.1} deg, candidate={}) time0={:?}",
            now,
            self.disp_acc_deg,
            self.candidate_set,
            self.time0_s
        );
        Some(OriginEvent::Commit)
    }

    /// Drop the origin record and displacement bookkeeping.
    pub fn discard(&mut self) {
        let rebound_count = self.rebound_count;
        *self = Self {
            rebound_count,
            ..Self::from_thresholds(self)
        };
    }

    pub fn has_origin(&self) -> bool {
        self.candidate_set || self.commit_set
    }

    pub fn candidate_set(&self) -> bool {
        self.candidate_set
    }

    pub fn commit_set(&self) -> bool {
        self.commit_set
    }

    pub fn time0_s(&self) -> Option<f64> {
        self.time0_s
    }

    pub fn disp_acc_deg(&self) -> f64 {
        self.disp_acc_deg
    }

    pub fn theta_hat_rot(&self) -> f64 {
        self.theta_hat_rot
    }

    /// Displacement measured from the origin anchor, 0 without an origin.
    pub fn disp_from_origin_deg(&self) -> f64 {
        self.origin_deg
            .map(|origin| self.disp_acc_deg - origin)
            .unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> OriginSnapshot {
        OriginSnapshot {
            candidate_set: self.candidate_set,
            candidate_time_s: self.candidate_time_s,
            commit_set: self.commit_set,
            commit_time_s: self.commit_time_s,
            commit_pending_since_s: self.pending_since_s,
            time0_s: self.time0_s,
            origin_deg: self.origin_deg,
            origin_conf: self.origin_conf,
            rebound_count: self.rebound_count,
            theta_hat_rot: self.theta_hat_rot,
        }
    }

    fn from_thresholds(other: &Self) -> Self {
        Self {
            changes_min: other.changes_min,
            unique_min: other.unique_min,
            valid_rate_min: other.valid_rate_min,
            step_deg: other.step_deg,
            horizon_s: other.horizon_s,
            rebound_eps_deg: other.rebound_eps_deg,
            commit_conf: other.commit_conf,
            candidate_set: false,
            candidate_time_s: None,
            commit_set: false,
            commit_time_s: None,
            pending_since_s: None,
            rebound_count: 0,
            time0_s: None,
            origin_deg: None,
            origin_conf: 0.0,
            disp_acc_deg: 0.0,
            theta_hat_rot: 0.0,
        }
    }

    fn anchor(&mut self) {
        if self.origin_deg.is_none() {
            self.origin_deg = Some(self.disp_acc_deg);
        }
    }

    fn lower_time0(&mut self, witness: f64) {
        self.time0_s = Some(self.time0_s.map_or(witness, |t| t.min(witness)));
    }
}
