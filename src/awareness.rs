// awareness.rs — Five-state awareness classifier.
//
// STILL -> NOISE -> PRE_MOVEMENT -> PRE_ROTATION -> MOVEMENT, with reset-guard
// outcomes taking priority. Every call to `step` yields exactly one state and
// one reason code.

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::reset_guard::ResetTrigger;
use crate::types::LockState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwarenessState {
    #[default]
    Still,
    Noise,
    PreMovement,
    PreRotation,
    Movement,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwarenessReason {
    #[default]
    Init,
    Quiet,
    Activity,
    MdiTrigger,
    MdiLatch,
    MdiHold,
    MdiLatchDropped,
    MdiTremor,
    MdiHoldTimeout,
    CandidatePool,
    CommitAngle,
    MoveDisplacement,
    MoveSpeed,
    MoveLock,
    StopGapTimeout,
    NoDispActive,
    CandidateDropped,
    HardReset,
}

impl From<ResetTrigger> for AwarenessReason {
    fn from(trigger: ResetTrigger) -> Self {
        match trigger {
            ResetTrigger::StopGapTimeout => AwarenessReason::StopGapTimeout,
            ResetTrigger::NoDispActive => AwarenessReason::NoDispActive,
            ResetTrigger::MdiTremor => AwarenessReason::MdiTremor,
            ResetTrigger::MdiHoldTimeout => AwarenessReason::MdiHoldTimeout,
            ResetTrigger::CandidateDropped => AwarenessReason::CandidateDropped,
        }
    }
}

/// Everything the classifier reads on one tick.
#[derive(Clone, Debug, Default)]
pub struct AwarenessInputs {
    pub reset: Option<ResetTrigger>,
    pub mdi_triggered: bool,
    pub latch_set: bool,
    pub latch_dropped: bool,
    pub candidate_set: bool,
    pub commit_set: bool,
    pub disp_from_origin_deg: f64,
    pub speed_deg_s: f64,
    pub lock_state: LockState,
    pub direction_conf: f64,
    pub activity: f64,
    pub age_since_event_s: f64,
    /// The tracker was hard-reset at the start of this tick.
    pub hard_reset: bool,
}

impl AwarenessInputs {
    fn has_origin(&self) -> bool {
        self.candidate_set || self.commit_set
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AwarenessSnapshot {
    pub state: AwarenessState,
    pub reason: AwarenessReason,
    pub speed_deg_s: f64,
    pub entered_s: f64,
}

pub struct AwarenessStateMachine {
    movement_confirm_deg: f64,
    speed_confirm_deg_s: f64,
    direction_conf_threshold: f64,
    activity_low: f64,
    movement_hold_s: f64,

    state: AwarenessState,
    reason: AwarenessReason,
    speed_deg_s: f64,
    entered_s: f64,
}

impl AwarenessStateMachine {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            movement_confirm_deg: config.movement_confirm_deg,
            speed_confirm_deg_s: config.speed_confirm_deg_s,
            direction_conf_threshold: config.direction_conf_threshold,
            activity_low: config.activity_threshold_low,
            movement_hold_s: config.movement_hold_s,
            state: AwarenessState::Still,
            reason: AwarenessReason::Init,
            speed_deg_s: 0.0,
            entered_s: 0.0,
        }
    }

    pub fn state(&self) -> AwarenessState {
        self.state
    }

    pub fn reason(&self) -> AwarenessReason {
        self.reason
    }

    /// Classify this tick and commit the result.
    pub fn step(&mut self, inputs: &AwarenessInputs, now: f64) -> AwarenessState {
        let (state, reason) = self.classify(inputs);
        self.transition(state, reason, now);
        self.speed_deg_s = inputs.speed_deg_s;
        state
    }

    /// Force STILL after a hard reset of the whole tracker.
    pub fn hard_reset(&mut self, now: f64) {
        self.transition(AwarenessState::Still, AwarenessReason::HardReset, now);
        self.speed_deg_s = 0.0;
    }

    pub fn snapshot(&self) -> AwarenessSnapshot {
        AwarenessSnapshot {
            state: self.state,
            reason: self.reason,
            speed_deg_s: self.speed_deg_s,
            entered_s: self.entered_s,
        }
    }

    /// Pure classification against the previous state.
    pub fn classify(&self, inputs: &AwarenessInputs) -> (AwarenessState, AwarenessReason) {
        if let Some(trigger) = inputs.reset {
            return match trigger {
                ResetTrigger::StopGapTimeout => (AwarenessState::Still, trigger.into()),
                ResetTrigger::NoDispActive => {
                    let state = if inputs.has_origin() {
                        AwarenessState::PreRotation
                    } else {
                        AwarenessState::Noise
                    };
                    (state, trigger.into())
                }
                ResetTrigger::MdiTremor
                | ResetTrigger::MdiHoldTimeout
                | ResetTrigger::CandidateDropped => (self.derived_state(inputs), trigger.into()),
            };
        }

        if inputs.has_origin() {
            return self.classify_with_origin(inputs);
        }

        if inputs.mdi_triggered {
            return (AwarenessState::PreMovement, AwarenessReason::MdiTrigger);
        }
        if inputs.latch_set {
            return (AwarenessState::PreMovement, AwarenessReason::MdiLatch);
        }
        if self.state == AwarenessState::PreMovement
            && inputs.age_since_event_s < self.movement_hold_s
        {
            return (AwarenessState::PreMovement, AwarenessReason::MdiHold);
        }

        let state = self.activity_state(inputs);
        let reason = if inputs.hard_reset && state == AwarenessState::Still {
            AwarenessReason::HardReset
        } else if inputs.latch_dropped {
            AwarenessReason::MdiLatchDropped
        } else if state == AwarenessState::Noise {
            AwarenessReason::Activity
        } else {
            AwarenessReason::Quiet
        };
        (state, reason)
    }

    fn classify_with_origin(&self, inputs: &AwarenessInputs) -> (AwarenessState, AwarenessReason) {
        let climbing = matches!(
            self.state,
            AwarenessState::PreRotation | AwarenessState::Movement
        );
        if climbing {
            if inputs.disp_from_origin_deg.abs() >= self.movement_confirm_deg {
                return (AwarenessState::Movement, AwarenessReason::MoveDisplacement);
            }
            if inputs.speed_deg_s.abs() >= self.speed_confirm_deg_s {
                return (AwarenessState::Movement, AwarenessReason::MoveSpeed);
            }
            let locked = match inputs.lock_state {
                LockState::Locked => true,
                LockState::SoftLock => inputs.direction_conf >= self.direction_conf_threshold,
                LockState::Unlocked => false,
            };
            if locked {
                return (AwarenessState::Movement, AwarenessReason::MoveLock);
            }
        }

        let reason = if inputs.commit_set {
            AwarenessReason::CommitAngle
        } else {
            AwarenessReason::CandidatePool
        };
        (AwarenessState::PreRotation, reason)
    }

    fn derived_state(&self, inputs: &AwarenessInputs) -> AwarenessState {
        if inputs.has_origin() {
            AwarenessState::PreRotation
        } else {
            self.activity_state(inputs)
        }
    }

    fn activity_state(&self, inputs: &AwarenessInputs) -> AwarenessState {
        if inputs.activity >= self.activity_low {
            AwarenessState::Noise
        } else {
            AwarenessState::Still
        }
    }

    fn transition(&mut self, state: AwarenessState, reason: AwarenessReason, now: f64) {
        if state != self.state {
            log::debug!(
                "[AWARENESS] {:?} -> {:?} ({:?}) at {:.3}s",
                self.state,
                state,
                reason,
                now
            );
            self.entered_s = now;
        }
        self.state = state;
        self.reason = reason;
    }
}
