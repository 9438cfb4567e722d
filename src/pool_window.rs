use std::collections::VecDeque;

use serde::Serialize;

use crate::types::{PoolEvent, Polarity};

/// Statistics over the trailing pool window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Events retained (INVALID included).
    pub events: usize,
    /// Polarity changes between consecutive valid events.
    pub change_count: usize,
    /// Distinct valid polarities seen.
    pub unique_values: usize,
    /// Valid events / all events, 0 when empty.
    pub valid_rate: f64,
}

/// Duration-based sliding buffer of recent pool transitions.
///
/// Eviction is by timestamp, never by count: every retained event satisfies
/// `now - t_s <= span_s`.
pub struct PoolWindow {
    events: VecDeque<PoolEvent>,
    span_s: f64,
}

impl PoolWindow {
    pub fn new(span_s: f64) -> Self {
        PoolWindow {
            events: VecDeque::with_capacity(32),
            span_s,
        }
    }

    pub fn push(&mut self, event: PoolEvent) {
        self.events.push_back(event);
        self.evict(event.t_s);
    }

    /// Drop events older than the span relative to `now`.
    pub fn evict(&mut self, now: f64) {
        while let Some(front) = self.events.front() {
            if now - front.t_s > self.span_s {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let total = self.events.len();
        if total == 0 {
            return PoolStats::default();
        }

        let mut seen = [false; 3];
        let mut valid = 0usize;
        let mut changes = 0usize;
        let mut last_valid: Option<Polarity> = None;

        for event in &self.events {
            let Some(ordinal) = event.polarity.ordinal() else {
                continue;
            };
            valid += 1;
            seen[ordinal as usize] = true;
            if let Some(prev) = last_valid {
                if prev != event.polarity {
                    changes += 1;
                }
            }
            last_valid = Some(event.polarity);
        }

        PoolStats {
            events: total,
            change_count: changes,
            unique_values: seen.iter().filter(|s| **s).count(),
            valid_rate: valid as f64 / total as f64,
        }
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PoolEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sensor;
    use approx::assert_relative_eq;

    fn ev(polarity: Polarity, sensor: Sensor, t_s: f64) -> PoolEvent {
        PoolEvent { polarity, sensor, t_s }
    }

    #[test]
    fn test_alternating_events() {
        let mut window = PoolWindow::new(0.25);
        window.push(ev(Polarity::N, Sensor::A, 0.00));
        window.push(ev(Polarity::S, Sensor::B, 0.03));
        window.push(ev(Polarity::N, Sensor::A, 0.08));

        let stats = window.stats();
        assert_eq!(stats.events, 3);
        assert_eq!(stats.change_count, 2);
        assert_eq!(stats.unique_values, 2);
        assert_relative_eq!(stats.valid_rate, 1.0);
    }

    #[test]
    fn test_invalid_tallied_not_counted() {
        let mut window = PoolWindow::new(0.25);
        window.push(ev(Polarity::N, Sensor::A, 0.00));
        window.push(ev(Polarity::Invalid, Sensor::A, 0.01));
        window.push(ev(Polarity::N, Sensor::B, 0.02));
        window.push(ev(Polarity::Invalid, Sensor::B, 0.03));

        let stats = window.stats();
        assert_eq!(stats.change_count, 0);
        assert_eq!(stats.unique_values, 1);
        assert_relative_eq!(stats.valid_rate, 0.5);
    }

    #[test]
    fn test_eviction_by_time() {
        let mut window = PoolWindow::new(0.25);
        window.push(ev(Polarity::N, Sensor::A, 0.00));
        window.push(ev(Polarity::S, Sensor::A, 0.20));
        window.evict(0.30);
        assert_eq!(window.len(), 1);

        window.evict(0.44);
        assert_eq!(window.len(), 1);
        window.evict(0.46);
        assert!(window.is_empty());
        assert_eq!(window.stats(), PoolStats::default());
    }
}
