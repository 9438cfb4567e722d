// reset_guard.rs — Gap / anomaly guards, evaluated once per tick.
//
// Five mutually exclusive triggers, first match wins. The `mdi_active`
// predicate keeps a cycle-layer gap from wiping in-progress MDI evidence.

use serde::Serialize;

use crate::awareness::AwarenessState;
use crate::config::TrackerConfig;
use crate::TIME_EPS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetTrigger {
    StopGapTimeout,
    NoDispActive,
    MdiTremor,
    MdiHoldTimeout,
    CandidateDropped,
}

/// What a fired trigger clears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResetAction {
    /// Drop the origin record, displacement, pool window and tactile state.
    pub discard_origin: bool,
    pub reset_mdi: bool,
}

impl ResetTrigger {
    pub fn action(self) -> ResetAction {
        match self {
            ResetTrigger::StopGapTimeout
            | ResetTrigger::MdiHoldTimeout
            | ResetTrigger::CandidateDropped => ResetAction {
                discard_origin: true,
                reset_mdi: true,
            },
            ResetTrigger::NoDispActive => ResetAction::default(),
            ResetTrigger::MdiTremor => ResetAction {
                discard_origin: false,
                reset_mdi: true,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct GuardInputs {
    pub age_since_cycle_s: f64,
    pub age_since_event_s: f64,
    pub activity: f64,
    pub tremor_exceeded: bool,
    pub mdi_triggered: bool,
    pub latch_set: bool,
    /// Awareness from the previous tick.
    pub awareness: AwarenessState,
    pub candidate_set: bool,
    pub pool_changed: bool,
}

impl GuardInputs {
    pub fn mdi_active(&self) -> bool {
        self.mdi_triggered || self.latch_set || self.awareness == AwarenessState::PreMovement
    }
}

pub struct ResetGuard {
    stop_gap_s: f64,
    noise_gap_s: f64,
    movement_hold_s: f64,
    activity_floor: f64,
    activity_low: f64,
    last_fired: Option<ResetTrigger>,
}

impl ResetGuard {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            stop_gap_s: config.stop_gap_s,
            noise_gap_s: config.noise_gap_s,
            movement_hold_s: config.movement_hold_s,
            activity_floor: config.activity_reset_a0,
            activity_low: config.activity_threshold_low,
            last_fired: None,
        }
    }

    /// Evaluate the triggers in priority order.
    pub fn evaluate(&mut self, inputs: &GuardInputs) -> Option<ResetTrigger> {
        let fired = self.check(inputs);
        if fired != self.last_fired {
            if let Some(trigger) = fired {
                log::debug!(
                    "[GUARD] {:?} (cycle age {:.2}s, event age {:.2}s, activity {:.2})",
                    trigger,
                    inputs.age_since_cycle_s,
                    inputs.age_since_event_s,
                    inputs.activity
                );
            }
        }
        self.last_fired = fired;
        fired
    }

    pub fn check(&self, inputs: &GuardInputs) -> Option<ResetTrigger> {
        let quiet = inputs.activity < self.activity_floor;
        let low = inputs.activity < self.activity_low;
        let pre_movement = inputs.awareness == AwarenessState::PreMovement;

        let gap = reached(inputs.age_since_cycle_s, self.stop_gap_s)
            || reached(inputs.age_since_event_s, self.stop_gap_s);
        if gap && quiet {
            return Some(ResetTrigger::StopGapTimeout);
        }

        if reached(inputs.age_since_cycle_s, self.noise_gap_s) && !quiet && !inputs.mdi_active() {
            return Some(ResetTrigger::NoDispActive);
        }

        if inputs.tremor_exceeded && pre_movement {
            return Some(ResetTrigger::MdiTremor);
        }

        if pre_movement
            && !inputs.candidate_set
            && reached(inputs.age_since_event_s, self.movement_hold_s)
            && low
        {
            return Some(ResetTrigger::MdiHoldTimeout);
        }

        if inputs.candidate_set && !inputs.pool_changed && low {
            return Some(ResetTrigger::CandidateDropped);
        }

        None
    }
}

fn reached(age: f64, limit: f64) -> bool {
    age + TIME_EPS >= limit
}
