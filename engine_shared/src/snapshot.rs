//! Snapshot history and time-delayed interpolation.

use std::collections::VecDeque;

use crate::net::PhysState;

/// A timestamped batch of authoritative physics states.
///
/// `reference_time` is the sender's clock at the moment it was built;
/// `receive_time` is the local clock at ingest — the value the buffer
/// orders and brackets on.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub reference_time: f64,
    pub receive_time: f64,
    pub states: Vec<PhysState>,
}

/// Bounded FIFO of snapshots, ordered by (monotone) `receive_time`,
/// supporting a bracketed interpolation query. Capacity 60.
pub struct SnapshotBuffer {
    history: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub const DEFAULT_CAPACITY: usize = 60;

    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Appends a snapshot, evicting the oldest if over capacity.
    pub fn append(&mut self, snap: Snapshot) {
        self.history.push_back(snap);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Finds the bracketing pair `(s1, s2)` with
    /// `s1.receive_time <= render_time <= s2.receive_time` and blends
    /// every entity present in both. Entities present in only one
    /// snapshot are omitted. No extrapolation: returns `None` with
    /// fewer than two snapshots, or when `render_time` falls outside
    /// the buffered range.
    pub fn interpolate(&self, render_time: f64) -> Option<Snapshot> {
        if self.history.len() < 2 {
            return None;
        }

        let mut bracket = None;
        for pair in self.history.iter().collect::<Vec<_>>().windows(2) {
            let (s1, s2) = (pair[0], pair[1]);
            if s1.receive_time <= render_time && render_time <= s2.receive_time {
                bracket = Some((s1, s2));
                break;
            }
        }
        let (s1, s2) = bracket?;

        let span = s2.receive_time - s1.receive_time;
        let t = if span > 0.0 {
            ((render_time - s1.receive_time) / span) as f32
        } else {
            0.0
        };

        let mut states = Vec::new();
        for a in &s1.states {
            if let Some(b) = s2.states.iter().find(|b| b.id == a.id) {
                states.push(PhysState {
                    id: a.id,
                    x: lerp_f64(a.x, b.x, t as f64),
                    y: lerp_f64(a.y, b.y, t as f64),
                    vx: lerp_f32(a.vx, b.vx, t),
                    vy: lerp_f32(a.vy, b.vy, t),
                    rot: lerp_f32(a.rot, b.rot, t),
                    vrot: lerp_f32(a.vrot, b.vrot, t),
                });
            }
        }

        Some(Snapshot {
            reference_time: lerp_f64(s1.reference_time, s2.reference_time, t as f64),
            receive_time: render_time,
            states,
        })
    }
}

fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lerp_f64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: u16, x: f64) -> PhysState {
        PhysState { id, x, y: 0.0, vx: 0.0, vy: 0.0, rot: 0.0, vrot: 0.0 }
    }

    #[test]
    fn buffer_evicts_oldest_past_capacity() {
        let mut buf = SnapshotBuffer::new(2);
        for i in 0..3 {
            buf.append(Snapshot { reference_time: i as f64, receive_time: i as f64, states: vec![] });
        }
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn interpolate_blends_present_entities_only() {
        let mut buf = SnapshotBuffer::new(60);
        buf.append(Snapshot { reference_time: 0.0, receive_time: 0.0, states: vec![state(1, 0.0), state(2, 0.0)] });
        buf.append(Snapshot { reference_time: 1.0, receive_time: 1.0, states: vec![state(1, 10.0)] });

        let blended = buf.interpolate(0.5).unwrap();
        assert_eq!(blended.states.len(), 1);
        assert_eq!(blended.states[0].id, 1);
        assert!((blended.states[0].x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn interpolate_none_below_two_snapshots() {
        let mut buf = SnapshotBuffer::new(60);
        buf.append(Snapshot { reference_time: 0.0, receive_time: 0.0, states: vec![] });
        assert!(buf.interpolate(0.0).is_none());
    }

    #[test]
    fn interpolate_none_outside_range() {
        let mut buf = SnapshotBuffer::new(60);
        buf.append(Snapshot { reference_time: 0.0, receive_time: 0.0, states: vec![] });
        buf.append(Snapshot { reference_time: 1.0, receive_time: 1.0, states: vec![] });
        assert!(buf.interpolate(5.0).is_none());
    }

    #[test]
    fn full_buffer_then_stale_query_returns_none() {
        let mut buf = SnapshotBuffer::new(60);
        for i in 0..61 {
            buf.append(Snapshot { reference_time: i as f64, receive_time: i as f64, states: vec![state(1, i as f64)] });
        }
        assert_eq!(buf.len(), 60);
        // t=0 belonged to the evicted oldest snapshot.
        assert!(buf.interpolate(0.0).is_none());
    }

    #[test]
    fn interpolate_is_monotonic_in_render_time() {
        let mut buf = SnapshotBuffer::new(60);
        buf.append(Snapshot { reference_time: 0.0, receive_time: 0.0, states: vec![state(1, 0.0)] });
        buf.append(Snapshot { reference_time: 1.0, receive_time: 1.0, states: vec![state(1, 10.0)] });
        buf.append(Snapshot { reference_time: 2.0, receive_time: 2.0, states: vec![state(1, 30.0)] });

        let samples: Vec<f64> = [0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0]
            .into_iter()
            .map(|t| buf.interpolate(t).unwrap().states[0].x)
            .collect();
        for pair in samples.windows(2) {
            assert!(pair[1] >= pair[0], "interpolated x regressed: {:?}", samples);
        }
    }
}
