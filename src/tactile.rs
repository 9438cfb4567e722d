// tactile.rs — Legacy tactile classifier (STILL / FEELING / SCRAPE /
// DISPLACEMENT / MOVING). Kept as an isolated machine next to awareness and
// only stepped when `enable_legacy_tactile` is set.

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::types::LockState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TactileState {
    #[default]
    Still,
    Feeling,
    Scrape,
    Displacement,
    Moving,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TactileReason {
    #[default]
    Init,
    Quiet,
    ActivityLow,
    ActivityHigh,
    DisplacementThreshold,
    CycleConfidence,
    CycleLock,
    Discard,
}

#[derive(Clone, Copy, Debug)]
pub struct TactileInputs {
    pub cycle_advanced: bool,
    pub encoder_conf: f64,
    pub lock_state: LockState,
    pub disp_deg: f64,
    pub activity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TactileSnapshot {
    pub state: TactileState,
    pub reason: TactileReason,
    pub since_s: f64,
}

pub struct TactileMachine {
    direction_conf_threshold: f64,
    displacement_threshold_rot: f64,
    activity_low: f64,
    activity_high: f64,
    state: TactileState,
    reason: TactileReason,
    since_s: f64,
}

impl TactileMachine {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            direction_conf_threshold: config.direction_conf_threshold,
            displacement_threshold_rot: config.displacement_threshold_rot,
            activity_low: config.activity_threshold_low,
            activity_high: config.activity_threshold_high,
            state: TactileState::Still,
            reason: TactileReason::Init,
            since_s: 0.0,
        }
    }

    pub fn step(&mut self, inputs: &TactileInputs, now: f64) -> TactileState {
        let locked = inputs.lock_state != LockState::Unlocked;
        let confident = inputs.encoder_conf >= self.direction_conf_threshold;
        let (next, reason) = if inputs.cycle_advanced && confident {
            (TactileState::Moving, TactileReason::CycleConfidence)
        } else if inputs.cycle_advanced && locked {
            (TactileState::Moving, TactileReason::CycleLock)
        } else if inputs.disp_deg.abs() / 360.0 >= self.displacement_threshold_rot {
            (TactileState::Displacement, TactileReason::DisplacementThreshold)
        } else if inputs.activity >= self.activity_high {
            (TactileState::Scrape, TactileReason::ActivityHigh)
        } else if inputs.activity >= self.activity_low {
            (TactileState::Feeling, TactileReason::ActivityLow)
        } else {
            (TactileState::Still, TactileReason::Quiet)
        };

        if next != self.state {
            log::debug!(
                "[TACTILE] {:?} -> {:?} ({:?}) at {:.3}s",
                self.state,
                next,
                reason,
                now
            );
            self.state = next;
            self.since_s = now;
        }
        self.reason = reason;
        next
    }

    /// Drop back to STILL (reset-guard discard).
    pub fn discard(&mut self, now: f64) {
        self.state = TactileState::Still;
        self.reason = TactileReason::Discard;
        self.since_s = now;
    }

    pub fn state(&self) -> TactileState {
        self.state
    }

    pub fn reason(&self) -> TactileReason {
        self.reason
    }

    pub fn snapshot(&self) -> TactileSnapshot {
        TactileSnapshot {
            state: self.state,
            reason: self.reason,
            since_s: self.since_s,
        }
    }
}
