// tracker.rs — Tick orchestrator for pre-cycle onset detection.
//
// Pure computation: pool transitions come in through `record_pool`, the
// periodic `update` runs the fixed per-tick pipeline and returns a Snapshot.
// No I/O, no clocks of its own; every timestamp is supplied by the caller.
//
// Per-tick order:
//   dt / hard reset -> counters -> ages -> activity + encoder decay
//   -> pool + MDI window stats -> MDI trigger -> reset guard
//   -> displacement + origin -> awareness -> legacy tactile -> snapshot

use crate::awareness::{AwarenessInputs, AwarenessState, AwarenessStateMachine};
use crate::config::TrackerConfig;
use crate::error::ConfigResult;
use crate::mdi::MicroDisplacementIntegrator;
use crate::origin::{OriginEvent, OriginTracker};
use crate::pool_window::{PoolStats, PoolWindow};
use crate::reset_guard::{GuardInputs, ResetAction, ResetGuard, ResetTrigger};
use crate::snapshot::{DisplacementSnapshot, Snapshot};
use crate::tactile::{TactileInputs, TactileMachine};
use crate::types::{Direction, LockState, PoolEvent, Polarity, Sensor};

// ─── Tick input ──────────────────────────────────────────────────────────────

/// Inputs of one periodic tick, as reported by the upstream cycle pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TickInput {
    pub wall_time: f64,
    pub cycles_physical_total: f64,
    pub events_this_batch: u32,
    pub direction_conf: Option<f64>,
    pub lock_state: Option<LockState>,
    pub direction_effective: Option<Direction>,
}

impl TickInput {
    pub fn at(wall_time: f64, cycles_physical_total: f64) -> Self {
        Self {
            wall_time,
            cycles_physical_total,
            events_this_batch: 0,
            direction_conf: None,
            lock_state: None,
            direction_effective: None,
        }
    }

    pub fn with_events(mut self, events: u32) -> Self {
        self.events_this_batch = events;
        self
    }

    pub fn with_direction(mut self, direction: Direction, conf: f64) -> Self {
        self.direction_effective = Some(direction);
        self.direction_conf = Some(conf);
        self
    }

    pub fn with_lock(mut self, lock_state: LockState) -> Self {
        self.lock_state = Some(lock_state);
        self
    }
}

// ─── The tracker ─────────────────────────────────────────────────────────────

pub struct OnsetTracker {
    config: TrackerConfig,

    pool: PoolWindow,
    mdi: MicroDisplacementIntegrator,
    origin: OriginTracker,
    guard: ResetGuard,
    awareness: AwarenessStateMachine,
    tactile: TactileMachine,

    // Clock
    last_tick_s: Option<f64>,
    last_pool_s: Option<f64>,

    // Counters
    last_cycles_total: Option<f64>,
    last_cycle_s: Option<f64>,
    last_event_s: Option<f64>,
    pool_events_since_tick: u32,
    pool_changes_since_tick: u32,
    last_valid_polarity: Option<Polarity>,

    // Decaying scores
    activity: f64,
    encoder_conf: f64,

    // Displacement
    cycle_disp_deg: f64,
    last_disp_deg: f64,
    speed_deg_s: f64,
}

impl OnsetTracker {
    /// Validates the configuration up front; nothing fails at tick time.
    pub fn new(config: TrackerConfig) -> ConfigResult<Self> {
        config.validate()?;
        log::info!(
            "[TRACKER] init: mdi mode {:?}, stop gap {:.2}s, hard reset {:.2}s, legacy tactile {}",
            config.mdi_mode,
            config.stop_gap_s,
            config.hard_reset_s,
            config.enable_legacy_tactile
        );
        Ok(Self {
            pool: PoolWindow::new(config.pool_window_s),
            mdi: MicroDisplacementIntegrator::new(&config),
            origin: OriginTracker::new(&config),
            guard: ResetGuard::new(&config),
            awareness: AwarenessStateMachine::new(&config),
            tactile: TactileMachine::new(&config),
            last_tick_s: None,
            last_pool_s: None,
            last_cycles_total: None,
            last_cycle_s: None,
            last_event_s: None,
            pool_events_since_tick: 0,
            pool_changes_since_tick: 0,
            last_valid_polarity: None,
            activity: 0.0,
            encoder_conf: 0.0,
            cycle_disp_deg: 0.0,
            last_disp_deg: 0.0,
            speed_deg_s: 0.0,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn awareness_state(&self) -> AwarenessState {
        self.awareness.state()
    }

    // ─── Ingestion ───────────────────────────────────────────────────────────

    /// Record one pool transition. Without a timestamp the latest known time is
    /// used; timestamps older than the previous pool event are clamped to it.
    pub fn record_pool(&mut self, polarity: Polarity, sensor: Sensor, t_s: Option<f64>) {
        let clock = self.clock();
        let mut t = t_s.filter(|t| t.is_finite()).unwrap_or(clock);
        if let Some(last) = self.last_pool_s {
            if t < last {
                log::trace!("[TRACKER] pool event at {:.3}s clamped to {:.3}s", t, last);
                t = last;
            }
        }
        self.last_pool_s = Some(t);

        self.pool.push(PoolEvent {
            polarity,
            sensor,
            t_s: t,
        });
        self.mdi.record(polarity, sensor, t);

        self.pool_events_since_tick += 1;
        self.last_event_s = Some(self.last_event_s.map_or(t, |last| last.max(t)));
        if polarity.is_valid() {
            if self.last_valid_polarity != Some(polarity) {
                self.pool_changes_since_tick += 1;
            }
            self.last_valid_polarity = Some(polarity);
        }
    }

    // ─── Tick ────────────────────────────────────────────────────────────────

    pub fn update(&mut self, input: &TickInput) -> Snapshot {
        // 1. dt, hard reset on large jumps either way
        let dt_raw = self
            .last_tick_s
            .map(|last| input.wall_time - last)
            .unwrap_or(0.0);
        let hard_reset = !dt_raw.is_finite() || dt_raw.abs() > self.config.hard_reset_s;
        let (now, dt) = match self.last_tick_s {
            _ if hard_reset => {
                self.hard_reset(input, dt_raw);
                (input.wall_time, 0.0)
            }
            Some(last) if dt_raw < 0.0 => {
                log::warn!(
                    "[TRACKER] clock went back {:.3}s, holding at {:.3}s",
                    -dt_raw,
                    last
                );
                (last, 0.0)
            }
            _ => (input.wall_time, dt_raw),
        };

        // 2. Counters
        let delta_cycles = self.advance_cycles(input.cycles_physical_total);
        self.last_cycle_s.get_or_insert(now);
        self.last_event_s.get_or_insert(now);
        if delta_cycles > 0.0 {
            self.last_cycle_s = Some(now);
        }
        if input.events_this_batch > 0 {
            self.last_event_s = Some(self.last_event_s.map_or(now, |t| t.max(now)));
        }

        // 3. Ages
        let age_since_event_s = age(now, self.last_event_s);
        let age_since_cycle_s = age(now, self.last_cycle_s);

        // 4. Activity + encoder confidence
        let fresh = input.events_this_batch.max(self.pool_events_since_tick) as f64;
        self.activity = self.activity * (-self.config.activity_decay_rate * dt).exp() + fresh;
        if delta_cycles > 0.0 {
            self.encoder_conf = input.direction_conf.unwrap_or(1.0).clamp(0.0, 1.0);
        } else {
            self.encoder_conf *= (-dt / self.config.encoder_tau_s).exp();
        }

        // 5-6. Window statistics, MDI trigger
        self.pool.evict(now);
        let pool_stats = self.pool.stats();
        self.mdi.absorb_cycles(delta_cycles);
        let mdi_tick = self.mdi.tick(now);

        // 7. Reset guard
        let guard_inputs = GuardInputs {
            age_since_cycle_s,
            age_since_event_s,
            activity: self.activity,
            tremor_exceeded: self.mdi.tremor_exceeded(),
            mdi_triggered: mdi_tick.triggered,
            latch_set: self.mdi.latch_set(),
            awareness: self.awareness.state(),
            candidate_set: self.origin.candidate_set(),
            pool_changed: self.pool_changes_since_tick > 0,
        };
        let reset = self.guard.evaluate(&guard_inputs);
        let action = reset.map(ResetTrigger::action).unwrap_or_default();
        self.apply_reset(action, now);

        // 8. Displacement + origin
        let sign = input
            .direction_effective
            .and_then(Direction::sign)
            .or_else(|| self.mdi.direction_hint().sign())
            .unwrap_or(1.0);
        self.cycle_disp_deg += sign * delta_cycles * self.config.deg_per_cycle();
        let disp_deg = self.cycle_disp_deg + sign * self.mdi.disp_deg();
        if dt > 0.0 {
            let raw_speed = (disp_deg - self.last_disp_deg) / dt;
            let alpha = 1.0 - (-dt / self.config.encoder_tau_s).exp();
            self.speed_deg_s += alpha * (raw_speed - self.speed_deg_s);
        }
        self.last_disp_deg = disp_deg;
        self.origin.set_displacement(disp_deg);
        let origin_event = if action.discard_origin {
            None
        } else {
            self.origin.evaluate(&pool_stats, now, self.mdi.micro_t0_s())
        };
        match origin_event {
            Some(OriginEvent::Candidate) => log::info!(
                "[TRACKER] origin candidate at {:.3}s, time0={:?}",
                now,
                self.origin.time0_s()
            ),
            Some(OriginEvent::Commit) => log::info!(
                "[TRACKER] origin commit at {:.3}s, {:.1} deg, time0={:?}",
                now,
                disp_deg,
                self.origin.time0_s()
            ),
            None => {}
        }

        // 9. Awareness
        let lock_state = input.lock_state.unwrap_or_default();
        let direction_conf = input.direction_conf.unwrap_or(self.encoder_conf);
        let aw_inputs = AwarenessInputs {
            reset,
            mdi_triggered: mdi_tick.triggered && !action.reset_mdi,
            latch_set: self.mdi.latch_set(),
            latch_dropped: mdi_tick.latch_dropped,
            candidate_set: self.origin.candidate_set(),
            commit_set: self.origin.commit_set(),
            disp_from_origin_deg: self.origin.disp_from_origin_deg(),
            speed_deg_s: self.speed_deg_s,
            lock_state,
            direction_conf,
            activity: self.activity,
            age_since_event_s,
            hard_reset,
        };
        self.awareness.step(&aw_inputs, now);

        // 10. Legacy tactile
        if self.config.enable_legacy_tactile {
            let tactile_inputs = TactileInputs {
                cycle_advanced: delta_cycles > 0.0,
                encoder_conf: self.encoder_conf,
                lock_state,
                disp_deg,
                activity: self.activity,
            };
            self.tactile.step(&tactile_inputs, now);
        }

        self.pool_events_since_tick = 0;
        self.pool_changes_since_tick = 0;
        self.last_tick_s = Some(now);

        self.snapshot(TickOutcome {
            now,
            dt,
            hard_reset,
            delta_cycles,
            reset,
            pool: pool_stats,
            origin_event,
        })
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn clock(&self) -> f64 {
        match (self.last_tick_s, self.last_pool_s) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0.0,
        }
    }

    /// Cycle delta since the previous tick. A rollback re-baselines with no delta.
    fn advance_cycles(&mut self, total: f64) -> f64 {
        let delta = match self.last_cycles_total {
            Some(prev) if total < prev => {
                log::warn!(
                    "[TRACKER] cycle counter rolled back {:.1} -> {:.1}, re-baselining",
                    prev,
                    total
                );
                0.0
            }
            Some(prev) => total - prev,
            None => 0.0,
        };
        if total.is_finite() {
            self.last_cycles_total = Some(total);
        }
        if delta.is_finite() {
            delta
        } else {
            0.0
        }
    }

    fn apply_reset(&mut self, action: ResetAction, now: f64) {
        if action.reset_mdi {
            self.mdi.reset();
        }
        if action.discard_origin {
            self.origin.discard();
            self.pool.clear();
            self.cycle_disp_deg = 0.0;
            self.last_disp_deg = 0.0;
            self.speed_deg_s = 0.0;
            self.tactile.discard(now);
        }
    }

    /// Clear every accumulator and re-take baselines at `now`. Pool events
    /// already recorded for this tick and still inside the pool window are
    /// re-ingested, so the rest of the tick sees them.
    fn hard_reset(&mut self, input: &TickInput, dt_raw: f64) {
        let now = input.wall_time;
        let span = self.config.pool_window_s;
        let kept: Vec<PoolEvent> = self
            .pool
            .iter()
            .filter(|e| e.t_s <= now && now - e.t_s <= span)
            .copied()
            .collect();
        log::info!(
            "[TRACKER] hard reset: dt {:.3}s beyond {:.2}s at {:.3}s ({} pool event(s) kept)",
            dt_raw,
            self.config.hard_reset_s,
            now,
            kept.len()
        );

        self.pool.clear();
        self.mdi = MicroDisplacementIntegrator::new(&self.config);
        self.origin = OriginTracker::new(&self.config);
        self.guard = ResetGuard::new(&self.config);
        self.tactile = TactileMachine::new(&self.config);
        self.awareness.hard_reset(now);
        for event in &kept {
            self.pool.push(*event);
            self.mdi.record(event.polarity, event.sensor, event.t_s);
        }

        self.last_tick_s = Some(now);
        self.last_pool_s = kept.last().map(|e| e.t_s);
        self.last_cycles_total = Some(input.cycles_physical_total).filter(|c| c.is_finite());
        self.last_cycle_s = Some(now);
        self.last_event_s = Some(kept.iter().map(|e| e.t_s).fold(now, f64::max));
        self.last_valid_polarity = kept
            .iter()
            .rev()
            .map(|e| e.polarity)
            .find(|p| p.is_valid());
        self.activity = 0.0;
        self.encoder_conf = 0.0;
        self.cycle_disp_deg = 0.0;
        self.last_disp_deg = 0.0;
        self.speed_deg_s = 0.0;
    }

    fn snapshot(&self, tick: TickOutcome) -> Snapshot {
        let now = tick.now;
        Snapshot {
            t_s: now,
            dt_s: tick.dt,
            hard_reset: tick.hard_reset,
            age_since_event_s: age(now, self.last_event_s),
            age_since_cycle_s: age(now, self.last_cycle_s),
            cycles_total: self.last_cycles_total.unwrap_or(0.0),
            delta_cycles: tick.delta_cycles,
            activity: self.activity,
            encoder_conf: self.encoder_conf,
            awareness: self.awareness.snapshot(),
            reset: tick.reset,
            origin_event: tick.origin_event,
            pool: tick.pool,
            mdi: self.mdi.snapshot(),
            origin: self.origin.snapshot(),
            displacement: DisplacementSnapshot {
                disp_acc_deg: self.origin.disp_acc_deg(),
                disp_from_origin_deg: self.origin.disp_from_origin_deg(),
                speed_deg_s: self.speed_deg_s,
                theta_hat_rot: self.origin.theta_hat_rot(),
                direction_hint: self.mdi.direction_hint(),
            },
            tactile: self
                .config
                .enable_legacy_tactile
                .then(|| self.tactile.snapshot()),
        }
    }
}

/// Per-tick facts that are not held in tracker state.
struct TickOutcome {
    now: f64,
    dt: f64,
    hard_reset: bool,
    delta_cycles: f64,
    reset: Option<ResetTrigger>,
    pool: PoolStats,
    origin_event: Option<OriginEvent>,
}

fn age(now: f64, last: Option<f64>) -> f64 {
    last.map(|t| (now - t).max(0.0)).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::AwarenessReason;
    use crate::config::MdiMode;
    use approx::assert_relative_eq;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tracker() -> OnsetTracker {
        init_logs();
        OnsetTracker::new(TrackerConfig::default()).expect("default config is valid")
    }

    fn tick_time(i: usize) -> f64 {
        i as f64 * 0.05
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = TrackerConfig {
            stop_gap_s: -1.0,
            ..TrackerConfig::default()
        };
        assert!(OnsetTracker::new(config).is_err());
    }

    #[test]
    fn test_first_tick_is_still() {
        let mut t = tracker();
        let snap = t.update(&TickInput::at(0.0, 0.0));
        assert_eq!(snap.awareness.state, AwarenessState::Still);
        assert_eq!(snap.awareness.reason, AwarenessReason::Quiet);
        assert_eq!(snap.age_since_cycle_s, 0.0);
        assert_eq!(snap.age_since_event_s, 0.0);
        assert!(snap.reset.is_none());
    }

    #[test]
    fn test_pool_burst_sets_candidate() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.00));
        t.record_pool(Polarity::S, Sensor::B, Some(0.03));
        t.record_pool(Polarity::N, Sensor::A, Some(0.08));

        let snap = t.update(&TickInput::at(0.10, 0.0));
        assert_eq!(snap.pool.change_count, 2);
        assert_eq!(snap.pool.unique_values, 2);
        assert_relative_eq!(snap.pool.valid_rate, 1.0);
        assert!(snap.origin.candidate_set);
        assert_eq!(snap.origin_event, Some(OriginEvent::Candidate));
        assert_relative_eq!(snap.origin.time0_s.unwrap(), 0.10);
        assert_eq!(snap.awareness.state, AwarenessState::PreRotation);
        assert_eq!(snap.awareness.reason, AwarenessReason::CandidatePool);

        // One-shot: the next tick reports no new transition.
        let snap = t.update(&TickInput::at(0.15, 0.0));
        assert!(snap.origin.candidate_set);
        assert_eq!(snap.origin_event, None);
    }

    #[test]
    fn test_stop_gap_timeout_and_idempotence() {
        let mut t = tracker();
        let mut last = None;
        for i in 0..=17 {
            let snap = t.update(&TickInput::at(tick_time(i), 0.0));
            if i < 16 {
                assert!(snap.reset.is_none(), "no reset expected at tick {}", i);
                assert_eq!(snap.awareness.state, AwarenessState::Still);
            }
            if i == 17 {
                assert_eq!(snap.reset, Some(ResetTrigger::StopGapTimeout));
                assert_eq!(snap.awareness.state, AwarenessState::Still);
                assert_eq!(snap.awareness.reason, AwarenessReason::StopGapTimeout);
            }
            last = Some(snap);
        }

        let before = last.expect("ticks ran");
        let after = t.update(&TickInput::at(0.90, 0.0));
        assert_eq!(after.reset, Some(ResetTrigger::StopGapTimeout));
        assert_eq!(after.awareness.state, AwarenessState::Still);
        assert_eq!(after.mdi, before.mdi);
        assert_eq!(after.origin, before.origin);
        assert_eq!(after.displacement, before.displacement);
        assert_eq!(after.pool, before.pool);
    }

    #[test]
    fn test_cycle_displacement_commits_origin() {
        let mut t = tracker();
        t.update(&TickInput::at(0.0, 0.0));
        let snap = t.update(&TickInput::at(0.05, 1.0).with_direction(Direction::Cw, 0.9));
        assert_relative_eq!(snap.displacement.disp_acc_deg, 30.0);
        assert_relative_eq!(snap.origin.commit_pending_since_s.unwrap(), 0.05);
        assert!(!snap.origin.commit_set);

        for i in 2..8 {
            let snap = t.update(&TickInput::at(tick_time(i), 1.0));
            assert!(!snap.origin.commit_set, "commit too early at tick {}", i);
        }

        let snap = t.update(&TickInput::at(tick_time(8), 1.0));
        assert!(snap.origin.commit_set);
        assert_relative_eq!(snap.origin.origin_conf, 0.6);
        assert_relative_eq!(snap.origin.commit_time_s.unwrap(), tick_time(8));
        assert_eq!(snap.awareness.state, AwarenessState::PreRotation);
        assert_eq!(snap.awareness.reason, AwarenessReason::CommitAngle);

        // Two more cycles past the anchor confirm movement.
        let states: Vec<AwarenessState> = [(9, 2.0), (10, 3.0), (11, 4.0)]
            .into_iter()
            .map(|(i, cycles)| {
                t.update(&TickInput::at(tick_time(i), cycles).with_direction(Direction::Cw, 0.9))
                    .awareness
                    .state
            })
            .collect();
        assert_eq!(states.last(), Some(&AwarenessState::Movement));
    }

    #[test]
    fn test_ccw_displacement_is_negative() {
        let mut t = tracker();
        t.update(&TickInput::at(0.0, 0.0));
        let snap = t.update(&TickInput::at(0.05, 2.0).with_direction(Direction::Ccw, 1.0));
        assert_relative_eq!(snap.displacement.disp_acc_deg, -60.0);
        assert!(snap.displacement.speed_deg_s < 0.0);
    }

    #[test]
    fn test_pre_movement_survives_cycle_gap() {
        init_logs();
        let mut t = OnsetTracker::new(TrackerConfig::default().with_mdi_mode(MdiMode::C))
            .expect("valid config");
        let ring = [Polarity::Neu, Polarity::N, Polarity::S];

        for i in 0..=12 {
            let now = tick_time(i);
            if i % 3 == 0 {
                t.record_pool(ring[(i / 3) % 3], Sensor::A, Some(now));
            }
            let snap = t.update(&TickInput::at(now, 0.0));

            if i >= 3 {
                assert_eq!(snap.awareness.state, AwarenessState::PreMovement, "tick {}", i);
            }
            if i >= 10 {
                // Cycle gap with activity above the floor: MDI evidence is kept.
                assert!(snap.age_since_cycle_s >= 0.5);
                assert!(snap.activity >= 0.2);
                assert!(snap.reset.is_none());
                assert!(snap.mdi.micro_acc >= 3.0);
                assert!(snap.mdi.confirmed);
                assert_relative_eq!(snap.mdi.t0_s.unwrap(), 0.15, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_hard_reset_on_large_jump() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.0));
        t.record_pool(Polarity::S, Sensor::A, Some(0.02));
        t.update(&TickInput::at(0.05, 3.0));

        let snap = t.update(&TickInput::at(2.0, 7.0));
        assert!(snap.hard_reset);
        assert_eq!(snap.awareness.state, AwarenessState::Still);
        assert_eq!(snap.awareness.reason, AwarenessReason::HardReset);
        assert_eq!(snap.mdi.micro_acc, 0.0);
        assert!(!snap.origin.candidate_set);

        // Baseline re-taken: no phantom cycles on the next tick.
        let snap = t.update(&TickInput::at(2.05, 7.0));
        assert_eq!(snap.delta_cycles, 0.0);
        assert!(!snap.hard_reset);
    }

    #[test]
    fn test_hard_reset_keeps_this_ticks_events() {
        let mut t = tracker();
        t.update(&TickInput::at(0.0, 0.0));

        // Transitions arriving right before a late tick belong to that tick.
        t.record_pool(Polarity::N, Sensor::A, Some(1.95));
        t.record_pool(Polarity::S, Sensor::B, Some(1.98));
        t.record_pool(Polarity::N, Sensor::A, Some(2.00));
        let snap = t.update(&TickInput::at(2.0, 0.0));

        assert!(snap.hard_reset);
        assert_eq!(snap.dt_s, 0.0);
        assert_eq!(snap.pool.events, 3);
        assert_eq!(snap.pool.change_count, 2);
        assert_relative_eq!(snap.activity, 3.0);
        assert!(snap.origin.candidate_set);
        assert_eq!(snap.origin_event, Some(OriginEvent::Candidate));
        assert_relative_eq!(snap.origin.time0_s.unwrap(), 2.0);
        assert_eq!(snap.awareness.state, AwarenessState::PreRotation);
        assert_eq!(snap.awareness.reason, AwarenessReason::CandidatePool);

        let snap = t.update(&TickInput::at(2.05, 0.0));
        assert!(!snap.hard_reset);
        assert!(snap.reset.is_none());
        assert_eq!(snap.pool.events, 3);
        assert!(snap.origin.candidate_set);
        assert!(snap.activity > 2.0);
    }

    #[test]
    fn test_hard_reset_drops_stale_events_and_counts_batch() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.0));
        t.update(&TickInput::at(0.0, 0.0));

        t.record_pool(Polarity::S, Sensor::A, Some(0.5));
        let snap = t.update(&TickInput::at(3.0, 0.0).with_events(4));
        assert!(snap.hard_reset);
        assert_eq!(snap.pool.events, 0);
        assert_relative_eq!(snap.activity, 4.0);
        assert_relative_eq!(snap.age_since_event_s, 0.0);
        assert_eq!(snap.awareness.state, AwarenessState::Noise);
    }

    #[test]
    fn test_small_backward_step_is_clamped() {
        let mut t = tracker();
        t.update(&TickInput::at(1.0, 0.0));
        let snap = t.update(&TickInput::at(0.9, 0.0));
        assert!(!snap.hard_reset);
        assert_eq!(snap.dt_s, 0.0);
        assert_relative_eq!(snap.t_s, 1.0);
    }

    #[test]
    fn test_cycle_rollback_rebaselines() {
        let mut t = tracker();
        t.update(&TickInput::at(0.0, 5.0));
        let snap = t.update(&TickInput::at(0.05, 2.0));
        assert_eq!(snap.delta_cycles, 0.0);
        let snap = t.update(&TickInput::at(0.10, 3.0));
        assert_relative_eq!(snap.delta_cycles, 1.0);
    }

    #[test]
    fn test_out_of_order_pool_time_clamped() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.10));
        t.record_pool(Polarity::S, Sensor::B, Some(0.05));
        t.record_pool(Polarity::Neu, Sensor::A, None);
        let snap = t.update(&TickInput::at(0.12, 0.0));
        assert_eq!(snap.pool.events, 3);
        assert_relative_eq!(snap.age_since_event_s, 0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds_hold_on_noisy_walk() {
        let mut t = tracker();
        let ring = [Polarity::Neu, Polarity::N, Polarity::S];

        for i in 0..200 {
            let now = i as f64 * 0.02;
            // Forward walk with occasional reversals and dropouts.
            let idx = if i % 17 == 0 { (i + 1) % 3 } else { i % 3 };
            let polarity = if i % 11 == 0 { Polarity::Invalid } else { ring[idx] };
            let sensor = if i % 2 == 0 { Sensor::A } else { Sensor::B };
            if i % 40 < 30 {
                t.record_pool(polarity, sensor, Some(now));
            }
            let snap = t.update(&TickInput::at(now, (i / 25) as f64));

            assert!((0.0..=36.0).contains(&snap.mdi.micro_acc));
            assert!((0.0..=1.0).contains(&snap.mdi.conf_smoothed));
            assert!((0.0..=1.0).contains(&snap.mdi.tremor_score));
            assert!((0.0..=1.0).contains(&snap.mdi.conf_used));
            assert!((0.0..=1.0).contains(&snap.encoder_conf));
        }
    }

    #[test]
    fn test_time0_frozen_after_candidate_despite_earlier_mdi_start() {
        init_logs();
        let mut t = OnsetTracker::new(TrackerConfig::default().with_mdi_mode(MdiMode::A))
            .expect("valid config");
        let ring = [Polarity::Neu, Polarity::N, Polarity::S];
        let mut commit_seen = false;

        for i in 0..=11 {
            let now = tick_time(i);
            t.record_pool(ring[i % 3], Sensor::A, Some(now));
            let snap = t.update(&TickInput::at(now, 0.0));

            if i < 2 {
                assert!(!snap.origin.candidate_set, "tick {}", i);
                continue;
            }
            // Candidate from pool evidence before any MDI trigger.
            assert!(snap.origin.candidate_set, "tick {}", i);
            assert_relative_eq!(snap.origin.candidate_time_s.unwrap(), tick_time(2));
            assert_relative_eq!(snap.origin.time0_s.unwrap(), tick_time(2), epsilon = 1e-9);
            commit_seen |= snap.origin_event == Some(OriginEvent::Commit);

            if i >= 6 {
                // Mode A fires with a run that started before the candidate.
                assert!(snap.mdi.triggered);
                assert_relative_eq!(snap.mdi.t0_s.unwrap(), tick_time(1), epsilon = 1e-9);
            }
        }
        assert!(commit_seen);
    }

    #[test]
    fn test_time0_reanchors_after_candidate_dropped() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.00));
        t.record_pool(Polarity::S, Sensor::B, Some(0.03));
        t.record_pool(Polarity::N, Sensor::A, Some(0.08));
        let snap = t.update(&TickInput::at(0.10, 0.0));
        assert_relative_eq!(snap.origin.time0_s.unwrap(), 0.10);

        // Pool goes quiet; activity decays below the low threshold by 0.35 s.
        for k in 1..=4 {
            let snap = t.update(&TickInput::at(0.10 + k as f64 * 0.05, 0.0));
            assert!(snap.origin.candidate_set, "step {}", k);
            assert_relative_eq!(snap.origin.time0_s.unwrap(), 0.10);
        }
        let snap = t.update(&TickInput::at(0.35, 0.0));
        assert_eq!(snap.reset, Some(ResetTrigger::CandidateDropped));
        assert!(!snap.origin.candidate_set);
        assert_eq!(snap.origin.time0_s, None);
        assert_eq!(snap.origin_event, None);

        t.record_pool(Polarity::N, Sensor::B, Some(0.40));
        t.record_pool(Polarity::S, Sensor::A, Some(0.43));
        t.record_pool(Polarity::N, Sensor::B, Some(0.48));
        let snap = t.update(&TickInput::at(0.50, 0.0));
        assert!(snap.reset.is_none());
        assert!(snap.origin.candidate_set);
        assert_eq!(snap.origin_event, Some(OriginEvent::Candidate));
        assert_relative_eq!(snap.origin.candidate_time_s.unwrap(), 0.50);
        assert_relative_eq!(snap.origin.time0_s.unwrap(), 0.50);
    }

    #[test]
    fn test_rebound_restarts_commit_horizon() {
        let mut t = tracker();
        t.update(&TickInput::at(0.0, 0.0));

        let snap = t.update(&TickInput::at(tick_time(1), 1.0).with_direction(Direction::Cw, 0.9));
        assert_relative_eq!(snap.origin.commit_pending_since_s.unwrap(), tick_time(1));

        // Back to the start: the pending commit is cancelled.
        let snap = t.update(&TickInput::at(tick_time(2), 2.0).with_direction(Direction::Ccw, 0.9));
        assert_relative_eq!(snap.displacement.disp_acc_deg, 0.0);
        assert_eq!(snap.origin.commit_pending_since_s, None);
        assert_eq!(snap.origin.rebound_count, 1);

        let snap = t.update(&TickInput::at(tick_time(3), 3.0).with_direction(Direction::Cw, 0.9));
        assert_relative_eq!(snap.origin.commit_pending_since_s.unwrap(), tick_time(3));

        // The first step's horizon (0.40 s) passes without a commit.
        for i in 4..10 {
            let snap = t.update(&TickInput::at(tick_time(i), 3.0));
            assert!(!snap.origin.commit_set, "commit too early at tick {}", i);
            assert_eq!(snap.origin_event, None);
        }

        let snap = t.update(&TickInput::at(tick_time(10), 3.0));
        assert!(snap.origin.commit_set);
        assert_eq!(snap.origin_event, Some(OriginEvent::Commit));
        assert_relative_eq!(snap.origin.commit_time_s.unwrap(), tick_time(10));
        assert_eq!(snap.origin.rebound_count, 1);
    }

    #[test]
    fn test_legacy_tactile_only_when_enabled() {
        let mut t = tracker();
        assert!(t.update(&TickInput::at(0.0, 0.0)).tactile.is_none());

        init_logs();
        let config = TrackerConfig {
            enable_legacy_tactile: true,
            ..TrackerConfig::default()
        };
        let mut t = OnsetTracker::new(config).expect("valid config");
        t.update(&TickInput::at(0.0, 0.0));
        let snap = t.update(&TickInput::at(0.05, 1.0).with_direction(Direction::Cw, 0.9));
        let tactile = snap.tactile.expect("tactile enabled");
        assert_eq!(tactile.state, crate::tactile::TactileState::Moving);
        assert_eq!(tactile.reason, crate::tactile::TactileReason::CycleConfidence);
    }

    #[test]
    fn test_snapshot_json_line() {
        let mut t = tracker();
        t.record_pool(Polarity::N, Sensor::A, Some(0.0));
        let line = t
            .update(&TickInput::at(0.05, 0.0).with_lock(LockState::Unlocked))
            .to_json_line()
            .expect("snapshot serializes");
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(value["awareness"]["state"], "NOISE");
        assert_eq!(value["mdi"]["mode"], "C");
        assert!(value.get("tactile").is_none());
    }
}
