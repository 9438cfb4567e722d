//! Pre-cycle motion onset detection for a two-sensor rotor rig.
//!
//! Pool transitions feed a micro-displacement integrator and a short pool
//! window; a periodic tick runs reset guards, two-phase origin detection and
//! a five-state awareness machine, and returns a serialisable [`Snapshot`].

pub mod awareness;
pub mod config;
pub mod error;
pub mod mdi;
pub mod origin;
pub mod pool_window;
pub mod reset_guard;
pub mod shared;
pub mod snapshot;
pub mod tactile;
pub mod tracker;
pub mod types;

pub use awareness::{AwarenessReason, AwarenessState};
pub use config::{MdiMode, TrackerConfig};
pub use error::{ConfigError, ConfigResult};
pub use origin::OriginEvent;
pub use reset_guard::ResetTrigger;
pub use shared::{PoolSender, SharedTracker};
pub use snapshot::Snapshot;
pub use tactile::{TactileReason, TactileState};
pub use tracker::{OnsetTracker, TickInput};
pub use types::{Direction, LockState, Polarity, PoolEvent, Sensor};

/// Tolerance for comparing elapsed times against configured durations.
pub(crate) const TIME_EPS: f64 = 1e-9;
