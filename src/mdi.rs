// mdi.rs — Micro-displacement integrator.
//
// Turns individual pool transitions into a bounded pre-cycle displacement
// signal. Each sensor's polarity walks the NEU -> N -> S ring; one ring step
// is one micro unit (a third of a cycle), so `micro_acc` saturates at one full
// rotation. The integrator never changes awareness itself, it only reports.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::{MdiMode, TrackerConfig};
use crate::types::{Direction, Polarity, Sensor};
use crate::TIME_EPS;

/// Upper bound of `micro_acc` (micro units in one rotation).
pub const MICRO_ACC_MAX: f64 = 36.0;

/// Micro units consumed by one confirmed cycle.
pub const MICRO_UNITS_PER_CYCLE: f64 = 3.0;

#[derive(Clone, Copy, Debug)]
struct MicroStep {
    t_s: f64,
    dir: i8,
}

#[derive(Clone, Debug)]
struct MdiParams {
    mode: MdiMode,
    window_s: f64,
    tremor_max: f64,
    conf_tau_s: f64,
    confirm_s_a: f64,
    min_units: f64,
    b_trigger_units: f64,
    b_ref_events: usize,
    conf_min: f64,
    c_latch_window_s: f64,
    c_confirm_steps: u32,
    deg_per_unit: f64,
}

impl MdiParams {
    fn from_config(config: &TrackerConfig) -> Self {
        Self {
            mode: config.mdi_mode,
            window_s: config.mdi_window_s,
            tremor_max: config.mdi_tremor_max,
            conf_tau_s: config.mdi_conf_tau_s,
            confirm_s_a: config.mdi_confirm_s_a,
            min_units: config.mdi_min_units,
            b_trigger_units: config.mdi_b_trigger_units,
            b_ref_events: config.mdi_b_ref_events,
            conf_min: config.mdi_conf_min,
            c_latch_window_s: config.mdi_c_latch_window_s,
            c_confirm_steps: config.mdi_c_confirm_steps,
            deg_per_unit: config.deg_per_micro_unit(),
        }
    }
}

/// Outcome of the per-tick trigger evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MdiTick {
    pub triggered: bool,
    /// An unconfirmed Mode-C latch expired or was contradicted since the last tick.
    pub latch_dropped: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MdiSnapshot {
    pub mode: MdiMode,
    pub window_len: usize,
    pub micro_acc: f64,
    pub disp_deg: f64,
    pub conf_raw: f64,
    pub conf_smoothed: f64,
    pub conf_used: f64,
    pub tremor_score: f64,
    pub t0_s: Option<f64>,
    pub latch_set: bool,
    pub confirmed: bool,
    pub triggered: bool,
}

pub struct MicroDisplacementIntegrator {
    params: MdiParams,

    window: VecDeque<MicroStep>,
    last_polarity: [Option<Polarity>; 2],

    // Run accumulator
    micro_acc: f64,
    run_dir: i8,
    run_start_s: Option<f64>,

    // Scores
    tremor_score: f64,
    conf_raw: f64,
    conf_acc: f64,
    conf_last_s: Option<f64>,

    // Mode-C latch
    latch_set: bool,
    latch_t_s: Option<f64>,
    latch_dir: i8,
    latch_steps: u32,
    confirmed: bool,
    latch_dropped: bool,

    micro_t0_s: Option<f64>,
    triggered: bool,
}

impl MicroDisplacementIntegrator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            params: MdiParams::from_config(config),
            window: VecDeque::with_capacity(32),
            last_polarity: [None, None],
            micro_acc: 0.0,
            run_dir: 0,
            run_start_s: None,
            tremor_score: 0.0,
            conf_raw: 0.0,
            conf_acc: 0.0,
            conf_last_s: None,
            latch_set: false,
            latch_t_s: None,
            latch_dir: 0,
            latch_steps: 0,
            confirmed: false,
            latch_dropped: false,
            micro_t0_s: None,
            triggered: false,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Ingest one pool transition. INVALID readings are ignored here; the
    /// pool window tallies them for the valid-rate statistic.
    pub fn record(&mut self, polarity: Polarity, sensor: Sensor, t_s: f64) {
        if !polarity.is_valid() {
            return;
        }

        let slot = &mut self.last_polarity[sensor.index()];
        let dir = slot.map(|prev| prev.step_to(polarity)).unwrap_or(0);
        *slot = Some(polarity);

        self.window.push_back(MicroStep { t_s, dir });
        self.evict(t_s);
        self.refresh_scores();

        if dir != 0 {
            self.apply_step(dir, t_s);
            if self.params.mode == MdiMode::C {
                self.update_latch(dir, t_s);
            }
        }
        self.relax_confidence(t_s);

        log::trace!(
            "[MDI] {:?}/{:?} dir={:+} micro={:.2} tremor={:.2} conf={:.2}",
            sensor,
            polarity,
            dir,
            self.micro_acc,
            self.tremor_score,
            self.conf_acc
        );
    }

    /// Consume micro units now represented by confirmed cycles.
    pub fn absorb_cycles(&mut self, delta_cycles: f64) {
        if delta_cycles > 0.0 {
            self.micro_acc = (self.micro_acc - delta_cycles * MICRO_UNITS_PER_CYCLE).max(0.0);
        }
    }

    // ── Per-tick evaluation ──────────────────────────────────────────────

    /// Refresh windowed scores at `now` and evaluate the mode trigger.
    /// A trigger is only possible while tremor is within bound.
    pub fn tick(&mut self, now: f64) -> MdiTick {
        self.evict(now);
        self.refresh_scores();
        self.relax_confidence(now);

        if self.latch_set && !self.confirmed {
            let expired = self
                .latch_t_s
                .map(|t| now - t > self.params.c_latch_window_s + TIME_EPS)
                .unwrap_or(true);
            if expired {
                self.drop_latch();
            }
        }
        let latch_dropped = std::mem::take(&mut self.latch_dropped);

        self.triggered = self.tremor_score <= self.params.tremor_max && self.mode_triggered(now);
        if self.triggered && self.micro_t0_s.is_none() {
            self.micro_t0_s = self.detection_witness();
            log::debug!(
                "[MDI] mode {:?} triggered, micro_t0={:?} micro={:.2}",
                self.params.mode,
                self.micro_t0_s,
                self.micro_acc
            );
        }

        MdiTick {
            triggered: self.triggered,
            latch_dropped,
        }
    }

    /// Clear every accumulator. Per-sensor polarity memory survives so the
    /// next transition still yields a direction.
    pub fn reset(&mut self) {
        let last_polarity = self.last_polarity;
        *self = Self {
            params: self.params.clone(),
            last_polarity,
            ..Self::new_empty()
        };
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn micro_acc(&self) -> f64 {
        self.micro_acc
    }

    pub fn tremor_score(&self) -> f64 {
        self.tremor_score
    }

    pub fn conf_acc(&self) -> f64 {
        self.conf_acc
    }

    pub fn conf_used(&self) -> f64 {
        self.conf_acc * (1.0 - self.tremor_score)
    }

    pub fn tremor_exceeded(&self) -> bool {
        self.tremor_score > self.params.tremor_max
    }

    pub fn latch_set(&self) -> bool {
        self.latch_set
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn micro_t0_s(&self) -> Option<f64> {
        self.micro_t0_s
    }

    pub fn mode(&self) -> MdiMode {
        self.params.mode
    }

    /// Unsigned micro displacement in degrees.
    pub fn disp_deg(&self) -> f64 {
        self.micro_acc * self.params.deg_per_unit
    }

    /// Early direction hint from the current run or latch.
    pub fn direction_hint(&self) -> Direction {
        if self.run_dir != 0 && self.micro_acc > 0.0 {
            Direction::from_sign(self.run_dir)
        } else if self.latch_set {
            Direction::from_sign(self.latch_dir)
        } else {
            Direction::Undecided
        }
    }

    pub fn snapshot(&self) -> MdiSnapshot {
        MdiSnapshot {
            mode: self.params.mode,
            window_len: self.window.len(),
            micro_acc: self.micro_acc,
            disp_deg: self.disp_deg(),
            conf_raw: self.conf_raw,
            conf_smoothed: self.conf_acc,
            conf_used: self.conf_used(),
            tremor_score: self.tremor_score,
            t0_s: self.micro_t0_s,
            latch_set: self.latch_set,
            confirmed: self.confirmed,
            triggered: self.triggered,
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn new_empty() -> Self {
        Self::new(&TrackerConfig::default())
    }

    fn evict(&mut self, now: f64) {
        while let Some(front) = self.window.front() {
            if now - front.t_s > self.params.window_s {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Tremor = direction flips per consecutive pair of non-zero steps;
    /// raw confidence = directional purity of the window.
    fn refresh_scores(&mut self) {
        let mut pairs = 0usize;
        let mut flips = 0usize;
        let mut moving = 0usize;
        let mut net = 0i32;
        let mut prev: i8 = 0;

        for step in self.window.iter().filter(|s| s.dir != 0) {
            moving += 1;
            net += step.dir as i32;
            if prev != 0 {
                pairs += 1;
                if step.dir != prev {
                    flips += 1;
                }
            }
            prev = step.dir;
        }

        self.tremor_score = if pairs == 0 {
            0.0
        } else {
            (flips as f64 / pairs as f64).clamp(0.0, 1.0)
        };
        self.conf_raw = if moving == 0 {
            0.0
        } else {
            (net.unsigned_abs() as f64 / moving as f64).clamp(0.0, 1.0)
        };
    }

    fn relax_confidence(&mut self, t_s: f64) {
        let dt = self
            .conf_last_s
            .map(|last| (t_s - last).max(0.0))
            .unwrap_or(0.0);
        let alpha = 1.0 - (-dt / self.params.conf_tau_s).exp();
        self.conf_acc = (self.conf_acc + alpha * (self.conf_raw - self.conf_acc)).clamp(0.0, 1.0);
        self.conf_last_s = Some(self.conf_last_s.map_or(t_s, |last| last.max(t_s)));
    }

    fn step_size(&self) -> f64 {
        match self.params.mode {
            MdiMode::A | MdiMode::C => 1.0,
            MdiMode::B => {
                let density =
                    (self.window.len() as f64 / self.params.b_ref_events as f64).clamp(0.5, 2.0);
                self.conf_raw * density
            }
        }
    }

    fn apply_step(&mut self, dir: i8, t_s: f64) {
        let size = self.step_size();
        if self.run_dir == 0 {
            self.run_dir = dir;
            self.run_start_s = Some(t_s);
            self.micro_acc += size;
        } else if dir == self.run_dir {
            self.micro_acc += size;
        } else {
            self.micro_acc -= size;
        }

        if self.micro_acc <= 0.0 {
            self.micro_acc = 0.0;
            self.run_dir = 0;
            self.run_start_s = None;
        }
        self.micro_acc = self.micro_acc.min(MICRO_ACC_MAX);
    }

    fn update_latch(&mut self, dir: i8, t_s: f64) {
        if self.latch_set && !self.confirmed {
            let within = self
                .latch_t_s
                .map(|t| t_s - t <= self.params.c_latch_window_s + TIME_EPS)
                .unwrap_or(false);
            if dir == self.latch_dir && within {
                self.latch_steps += 1;
                if self.latch_steps >= self.params.c_confirm_steps {
                    self.confirmed = true;
                    log::debug!("[MDI] latch confirmed after {} steps", self.latch_steps);
                }
                return;
            }
            self.drop_latch();
        }

        if !self.latch_set && self.tremor_score <= self.params.tremor_max {
            self.latch_set = true;
            self.latch_t_s = Some(t_s);
            self.latch_dir = dir;
            self.latch_steps = 1;
            self.confirmed = self.params.c_confirm_steps <= 1;
            log::debug!("[MDI] latch set at {:.3}s dir={:+}", t_s, dir);
        }
    }

    fn drop_latch(&mut self) {
        log::debug!("[MDI] latch dropped after {} step(s)", self.latch_steps);
        self.latch_set = false;
        self.latch_t_s = None;
        self.latch_dir = 0;
        self.latch_steps = 0;
        self.confirmed = false;
        self.latch_dropped = true;
    }

    fn mode_triggered(&self, now: f64) -> bool {
        match self.params.mode {
            MdiMode::A => {
                self.micro_acc >= self.params.min_units
                    && self
                        .run_start_s
                        .map(|start| now - start + TIME_EPS >= self.params.confirm_s_a)
                        .unwrap_or(false)
            }
            MdiMode::B => {
                self.micro_acc >= self.params.b_trigger_units
                    && self.conf_used() >= self.params.conf_min
            }
            MdiMode::C => self.latch_set && self.confirmed,
        }
    }

    fn detection_witness(&self) -> Option<f64> {
        match self.params.mode {
            MdiMode::C => self.latch_t_s.or(self.run_start_s),
            MdiMode::A | MdiMode::B => self.run_start_s,
        }
    }
}
