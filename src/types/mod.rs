use serde::{Deserialize, Serialize};

/// Discrete polarity reading reported by a pool sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Neu,
    N,
    S,
    Invalid,
}

impl Polarity {
    /// Position on the NEU -> N -> S -> NEU ring, `None` for `Invalid`.
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Polarity::Neu => Some(0),
            Polarity::N => Some(1),
            Polarity::S => Some(2),
            Polarity::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self != Polarity::Invalid
    }

    /// Signed ring step from `self` to `next`: +1 forward, -1 backward, 0 repeat.
    pub fn step_to(self, next: Polarity) -> i8 {
        match (self.ordinal(), next.ordinal()) {
            (Some(from), Some(to)) => match (to + 3 - from) % 3 {
                1 => 1,
                2 => -1,
                _ => 0,
            },
            _ => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    A,
    B,
}

impl Sensor {
    pub fn index(self) -> usize {
        match self {
            Sensor::A => 0,
            Sensor::B => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolEvent {
    pub polarity: Polarity,
    pub sensor: Sensor,
    pub t_s: f64,
}

/// Direction lock reported by the upstream cycle pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    #[default]
    Unlocked,
    SoftLock,
    Locked,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Cw,
    Ccw,
    #[default]
    Undecided,
}

impl Direction {
    /// +1 for CW, -1 for CCW, `None` while undecided.
    pub fn sign(self) -> Option<f64> {
        match self {
            Direction::Cw => Some(1.0),
            Direction::Ccw => Some(-1.0),
            Direction::Undecided => None,
        }
    }

    pub fn from_sign(sign: i8) -> Self {
        match sign.signum() {
            1 => Direction::Cw,
            -1 => Direction::Ccw,
            _ => Direction::Undecided,
        }
    }
}
