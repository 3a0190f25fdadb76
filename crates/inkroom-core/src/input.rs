//! Input primitives: pointer-move throttling and multi-touch tracking.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// A touch contact in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub id: u64,
    pub position: Point,
}

impl TouchPoint {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self {
            id,
            position: Point::new(x, y),
        }
    }
}

/// Coalesces high-frequency positions to at most one per interval.
///
/// Only the most recent position offered within a window survives.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<Point>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    /// Start a window at `now` without emitting anything.
    pub fn started_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_emit: Some(now),
            pending: None,
        }
    }

    /// Record a position. Returns it back if the window has elapsed and it
    /// should be flushed immediately.
    pub fn offer(&mut self, point: Point, now: Instant) -> Option<Point> {
        self.pending = Some(point);
        self.poll(now)
    }

    /// Flush the pending position if the window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Point> {
        let due = match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            if let Some(point) = self.pending.take() {
                self.last_emit = Some(now);
                return Some(point);
            }
        }
        None
    }

    /// Take the pending position regardless of timing.
    pub fn take_pending(&mut self) -> Option<Point> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Two-finger pinch state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    pub last_distance: f64,
    pub last_midpoint: Point,
}

/// Per-step camera change derived from a pinch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchStep {
    pub anchor: Point,
    pub factor: f64,
    pub pan: Vec2,
}

/// How a contact release affected pinch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchChange {
    Unchanged,
    /// Exactly two contacts remain.
    Started,
    Ended,
}

/// Tracks active touch contacts and arbitrates pinch mode.
#[derive(Debug, Clone, Default)]
pub struct TouchTracker {
    contacts: BTreeMap<u64, Point>,
    pinch: Option<Pinch>,
}

impl TouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    pub fn pinch(&self) -> Option<Pinch> {
        self.pinch
    }

    /// Forget every contact.
    pub fn reset(&mut self) {
        self.contacts.clear();
        self.pinch = None;
    }

    /// Register or update contacts. Returns true when this call entered pinch
    /// mode (exactly two contacts).
    pub fn press(&mut self, touches: &[TouchPoint]) -> bool {
        for t in touches {
            self.contacts.insert(t.id, t.position);
        }
        if self.contacts.len() == 2 && self.pinch.is_none() {
            self.pinch = self.current_pinch();
            return self.pinch.is_some();
        }
        if self.contacts.len() != 2 {
            self.pinch = None;
        }
        false
    }

    /// Update positions. While pinching, returns the zoom/pan step to apply.
    pub fn moved(&mut self, touches: &[TouchPoint]) -> Option<PinchStep> {
        for t in touches {
            if let Some(pos) = self.contacts.get_mut(&t.id) {
                *pos = t.position;
            }
        }
        let previous = self.pinch?;
        let current = self.current_pinch()?;
        self.pinch = Some(current);

        let factor = if previous.last_distance > f64::EPSILON {
            current.last_distance / previous.last_distance
        } else {
            1.0
        };
        Some(PinchStep {
            anchor: current.last_midpoint,
            factor,
            pan: current.last_midpoint - previous.last_midpoint,
        })
    }

    /// Remove ended contacts and report how pinch mode changed.
    pub fn release(&mut self, ended: &[u64]) -> PinchChange {
        for id in ended {
            self.contacts.remove(id);
        }
        match (self.pinch.is_some(), self.contacts.len()) {
            (true, n) if n < 2 => {
                self.pinch = None;
                PinchChange::Ended
            }
            (false, 2) => {
                self.pinch = self.current_pinch();
                PinchChange::Started
            }
            _ => PinchChange::Unchanged,
        }
    }

    /// The single remaining contact, if exactly one is down.
    pub fn sole_contact(&self) -> Option<TouchPoint> {
        if self.contacts.len() != 1 {
            return None;
        }
        self.contacts
            .iter()
            .next()
            .map(|(&id, &position)| TouchPoint { id, position })
    }

    fn current_pinch(&self) -> Option<Pinch> {
        if self.contacts.len() != 2 {
            return None;
        }
        let mut iter = self.contacts.values();
        let a = *iter.next()?;
        let b = *iter.next()?;
        Some(Pinch {
            last_distance: a.distance(b),
            last_midpoint: a.midpoint(b),
        })
    }
}
