// config.rs — Tracker configuration, fixed for the lifetime of a tracker.
//
// Defaults match the hand/bench rig; `production()` stretches the gap
// timeouts for the slower production rotor.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Step-sizing strategy of the micro-displacement integrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MdiMode {
    /// Fixed unit step, confirmed after `mdi_confirm_s_a`.
    A,
    /// Step scaled by window purity and event density.
    B,
    /// Latch on the first clean step, confirm on the next ones.
    #[default]
    C,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Gaps / timeouts ──
    pub stop_gap_s: f64,
    pub noise_gap_s: f64,
    pub movement_hold_s: f64,
    pub hard_reset_s: f64,

    // ── Activity ──
    pub activity_reset_a0: f64,
    pub activity_threshold_low: f64,
    pub activity_threshold_high: f64,
    pub activity_decay_rate: f64,

    // ── Encoder confidence ──
    pub encoder_tau_s: f64,
    pub direction_conf_threshold: f64,
    pub displacement_threshold_rot: f64,

    // ── Pool window / candidate ──
    pub pool_window_s: f64,
    pub pool_changes_min: usize,
    pub pool_unique_min: usize,
    pub pool_valid_rate_min: f64,

    // ── Origin commit ──
    pub origin_step_deg: f64,
    pub origin_commit_horizon_s: f64,
    pub origin_rebound_eps_deg: f64,
    pub origin_commit_conf: f64,

    // ── Movement confirmation ──
    pub movement_confirm_deg: f64,
    pub speed_confirm_deg_s: f64,

    // ── MDI ──
    pub mdi_mode: MdiMode,
    pub mdi_window_s: f64,
    pub mdi_tremor_max: f64,
    pub mdi_conf_tau_s: f64,
    pub mdi_confirm_s_a: f64,
    pub mdi_min_units: f64,
    pub mdi_b_trigger_units: f64,
    pub mdi_b_ref_events: usize,
    pub mdi_conf_min: f64,
    pub mdi_c_latch_window_s: f64,
    pub mdi_c_confirm_steps: u32,

    // ── Geometry ──
    pub cycles_per_rot: f64,

    // ── Feature flags ──
    pub enable_legacy_tactile: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stop_gap_s: 0.80,
            noise_gap_s: 0.50,
            movement_hold_s: 0.25,
            hard_reset_s: 1.5,
            activity_reset_a0: 0.20,
            activity_threshold_low: 1.0,
            activity_threshold_high: 5.0,
            activity_decay_rate: 5.0,
            encoder_tau_s: 0.6,
            direction_conf_threshold: 0.5,
            displacement_threshold_rot: 0.005,
            pool_window_s: 0.25,
            pool_changes_min: 2,
            pool_unique_min: 2,
            pool_valid_rate_min: 0.70,
            origin_step_deg: 30.0,
            origin_commit_horizon_s: 0.35,
            origin_rebound_eps_deg: 10.0,
            origin_commit_conf: 0.6,
            movement_confirm_deg: 60.0,
            speed_confirm_deg_s: 180.0,
            mdi_mode: MdiMode::C,
            mdi_window_s: 0.40,
            mdi_tremor_max: 0.60,
            mdi_conf_tau_s: 0.30,
            mdi_confirm_s_a: 0.25,
            mdi_min_units: 1.0,
            mdi_b_trigger_units: 2.0,
            mdi_b_ref_events: 3,
            mdi_conf_min: 0.5,
            mdi_c_latch_window_s: 0.30,
            mdi_c_confirm_steps: 2,
            cycles_per_rot: 12.0,
            enable_legacy_tactile: false,
        }
    }
}

impl TrackerConfig {
    /// Slower production rotor: longer gaps before declaring a stop.
    pub fn production() -> Self {
        Self {
            stop_gap_s: 1.0,
            noise_gap_s: 0.6,
            hard_reset_s: 2.0,
            ..Self::default()
        }
    }

    pub fn with_mdi_mode(mut self, mode: MdiMode) -> Self {
        self.mdi_mode = mode;
        self
    }

    /// Parse a (possibly partial) JSON profile on top of the defaults and validate it.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: TrackerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Degrees per confirmed cycle.
    pub fn deg_per_cycle(&self) -> f64 {
        360.0 / self.cycles_per_rot
    }

    /// Degrees per micro unit: one cycle spans the three pool values.
    pub fn deg_per_micro_unit(&self) -> f64 {
        self.deg_per_cycle() / 3.0
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let durations = [
            ("stop_gap_s", self.stop_gap_s),
            ("noise_gap_s", self.noise_gap_s),
            ("movement_hold_s", self.movement_hold_s),
            ("hard_reset_s", self.hard_reset_s),
            ("activity_decay_rate", self.activity_decay_rate),
            ("encoder_tau_s", self.encoder_tau_s),
            ("pool_window_s", self.pool_window_s),
            ("origin_step_deg", self.origin_step_deg),
            ("origin_commit_horizon_s", self.origin_commit_horizon_s),
            ("origin_rebound_eps_deg", self.origin_rebound_eps_deg),
            ("movement_confirm_deg", self.movement_confirm_deg),
            ("speed_confirm_deg_s", self.speed_confirm_deg_s),
            ("mdi_window_s", self.mdi_window_s),
            ("mdi_conf_tau_s", self.mdi_conf_tau_s),
            ("mdi_confirm_s_a", self.mdi_confirm_s_a),
            ("mdi_min_units", self.mdi_min_units),
            ("mdi_b_trigger_units", self.mdi_b_trigger_units),
            ("mdi_c_latch_window_s", self.mdi_c_latch_window_s),
            ("cycles_per_rot", self.cycles_per_rot),
            ("activity_threshold_low", self.activity_threshold_low),
            ("activity_threshold_high", self.activity_threshold_high),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        let unit_rates = [
            ("pool_valid_rate_min", self.pool_valid_rate_min),
            ("mdi_tremor_max", self.mdi_tremor_max),
            ("mdi_conf_min", self.mdi_conf_min),
            ("origin_commit_conf", self.origin_commit_conf),
            ("direction_conf_threshold", self.direction_conf_threshold),
        ];
        for (field, value) in unit_rates {
            check_range(field, value, 0.0, 1.0)?;
        }
        check_range("activity_reset_a0", self.activity_reset_a0, 0.0, f64::MAX)?;
        check_range(
            "displacement_threshold_rot",
            self.displacement_threshold_rot,
            0.0,
            f64::MAX,
        )?;
        check_range("pool_unique_min", self.pool_unique_min as f64, 1.0, 3.0)?;

        if self.pool_changes_min == 0 {
            return Err(ConfigError::Inconsistent(
                "pool_changes_min must be at least 1".to_string(),
            ));
        }
        if self.mdi_b_ref_events == 0 || self.mdi_c_confirm_steps == 0 {
            return Err(ConfigError::Inconsistent(
                "mdi_b_ref_events and mdi_c_confirm_steps must be at least 1".to_string(),
            ));
        }
        if self.activity_reset_a0 > self.activity_threshold_low {
            return Err(ConfigError::Inconsistent(format!(
                "activity_reset_a0 ({}) above activity_threshold_low ({})",
                self.activity_reset_a0, self.activity_threshold_low
            )));
        }
        if self.activity_threshold_low >= self.activity_threshold_high {
            return Err(ConfigError::Inconsistent(format!(
                "activity_threshold_low ({}) must be below activity_threshold_high ({})",
                self.activity_threshold_low, self.activity_threshold_high
            )));
        }
        if self.origin_rebound_eps_deg >= self.origin_step_deg {
            return Err(ConfigError::Inconsistent(format!(
                "origin_rebound_eps_deg ({}) must be below origin_step_deg ({})",
                self.origin_rebound_eps_deg, self.origin_step_deg
            )));
        }
        if self.noise_gap_s > self.stop_gap_s {
            return Err(ConfigError::Inconsistent(format!(
                "noise_gap_s ({}) exceeds stop_gap_s ({})",
                self.noise_gap_s, self.stop_gap_s
            )));
        }
        if self.stop_gap_s >= self.hard_reset_s {
            return Err(ConfigError::Inconsistent(format!(
                "stop_gap_s ({}) must be below hard_reset_s ({})",
                self.stop_gap_s, self.hard_reset_s
            )));
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
