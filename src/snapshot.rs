use serde::Serialize;

use crate::awareness::AwarenessSnapshot;
use crate::mdi::MdiSnapshot;
use crate::origin::{OriginEvent, OriginSnapshot};
use crate::pool_window::PoolStats;
use crate::reset_guard::ResetTrigger;
use crate::tactile::TactileSnapshot;
use crate::types::Direction;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplacementSnapshot {
    pub disp_acc_deg: f64,
    pub disp_from_origin_deg: f64,
    pub speed_deg_s: f64,
    pub theta_hat_rot: f64,
    pub direction_hint: Direction,
}

/// Immutable per-tick view of the tracker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub t_s: f64,
    pub dt_s: f64,
    pub hard_reset: bool,

    // Ages / counters
    pub age_since_event_s: f64,
    pub age_since_cycle_s: f64,
    pub cycles_total: f64,
    pub delta_cycles: f64,
    pub activity: f64,
    pub encoder_conf: f64,

    pub awareness: AwarenessSnapshot,
    pub reset: Option<ResetTrigger>,
    /// Origin transition produced by this tick, if any.
    pub origin_event: Option<OriginEvent>,
    pub pool: PoolStats,
    pub mdi: MdiSnapshot,
    pub origin: OriginSnapshot,
    pub displacement: DisplacementSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactile: Option<TactileSnapshot>,
}

impl Snapshot {
    /// One JSONL record. Non-finite floats render as `null`.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
