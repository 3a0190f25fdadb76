//! Pointer, wheel and touch handling for a [`Session`].
//!
//! Every handler takes screen coordinates. Timestamps are passed in so the
//! stroke throttle can be driven deterministically; hosts call
//! [`Session::tick`] from their frame loop to flush coalesced positions.

use crate::input::{PinchChange, Throttle, TouchPoint};
use crate::operation::{Operation, ShapeKind};
use crate::protocol::{ElementMove, Message};
use crate::render::RenderSurface;
use crate::selection::{MoveState, query_polygon, query_rect};
use crate::session::Session;
use crate::tools::{Gesture, Snip, SnipMode, Tool};
use crate::transport::Transport;
use kurbo::{Point, Rect, Vec2};

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

impl<S: RenderSurface, T: Transport> Session<S, T> {
    pub fn pointer_down(&mut self, screen: Point, now: Instant) {
        if !self.params.is_active {
            return;
        }
        if self.tools.is_active() {
            // A missed release; undo its preview before starting over
            self.cancel_gesture();
        }
        let tool = self.tools.current();
        if tool.requires_permission() && !self.can_mutate() {
            self.deny(&tool.label());
            return;
        }
        let world = self.camera.screen_to_world(screen);

        match tool {
            Tool::Pan => {
                self.tools.begin(Gesture::Panning {
                    last_screen: screen,
                });
            }
            Tool::Pen | Tool::Eraser => {
                let is_eraser = tool == Tool::Eraser;
                // A tap still leaves a dot
                self.emit_stroke(world, world, is_eraser);
                self.tools.begin(Gesture::Streaming {
                    last_flushed: world,
                    throttle: Throttle::started_at(self.config.flush_interval(), now),
                    is_eraser,
                });
            }
            Tool::Shape(kind) => {
                self.tools.begin(Gesture::ShapeDrag {
                    kind,
                    anchor: world,
                    current: world,
                });
                self.render();
            }
            Tool::Select(mode) => {
                if self.selection.hit(world) {
                    let state = MoveState::new(world, &self.history, self.selection.indices());
                    self.tools.begin(Gesture::Moving(state));
                    return;
                }
                self.selection.clear();
                let snip = match mode {
                    SnipMode::Rectangular => Snip::Rect {
                        start: world,
                        current: world,
                    },
                    SnipMode::Freeform => Snip::Freeform {
                        points: vec![world],
                    },
                };
                self.tools.begin(Gesture::Snip(snip));
                self.render();
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Point, now: Instant) {
        if !self.params.is_active {
            return;
        }
        let world = self.camera.screen_to_world(screen);
        let padding = self.padding();

        match self.tools.gesture_mut() {
            Gesture::Streaming { throttle, .. } => {
                if let Some(point) = throttle.offer(world, now) {
                    self.flush_stroke(point);
                }
            }
            Gesture::ShapeDrag { current, .. } => {
                *current = world;
                self.render();
            }
            Gesture::Snip(Snip::Rect { current, .. }) => {
                *current = world;
                self.render();
            }
            Gesture::Snip(Snip::Freeform { points }) => {
                points.push(world);
                self.render();
            }
            Gesture::Moving(state) => {
                state.current = world;
                state.apply_preview(&mut self.history);
                self.selection.recompute(&self.history, padding);
                self.render();
            }
            Gesture::Panning { last_screen } => {
                let delta = screen - *last_screen;
                *last_screen = screen;
                self.camera.pan(delta);
                self.render();
            }
            Gesture::Idle | Gesture::Pinch(_) => {}
        }
    }

    /// Flush a coalesced stroke position whose window has elapsed.
    pub fn tick(&mut self, now: Instant) {
        let due = match self.tools.gesture_mut() {
            Gesture::Streaming { throttle, .. } => throttle.poll(now),
            _ => None,
        };
        if let Some(point) = due {
            self.flush_stroke(point);
        }
    }

    pub fn pointer_up(&mut self, screen: Point, _now: Instant) {
        if !self.params.is_active {
            return;
        }
        let world = self.camera.screen_to_world(screen);

        match self.tools.finish() {
            Gesture::Streaming {
                last_flushed,
                mut throttle,
                is_eraser,
            } => {
                if let Some(tail) = throttle.take_pending() {
                    self.emit_stroke(last_flushed, tail, is_eraser);
                }
            }
            Gesture::ShapeDrag { kind, anchor, .. } => self.emit_shape(kind, anchor, world),
            Gesture::Snip(snip) => self.finish_snip(snip, world),
            Gesture::Moving(mut state) => {
                state.current = world;
                self.finish_move(state);
            }
            Gesture::Panning { .. } | Gesture::Pinch(_) | Gesture::Idle => {}
        }
    }

    /// The pointer left the canvas mid-gesture. Shapes finalize where they
    /// were last seen; everything else is abandoned without a broadcast.
    pub fn pointer_leave(&mut self, _now: Instant) {
        match self.tools.finish() {
            Gesture::ShapeDrag {
                kind,
                anchor,
                current,
            } => self.emit_shape(kind, anchor, current),
            Gesture::Snip(_) => self.render(),
            Gesture::Moving(state) => {
                self.undo_gesture(Gesture::Moving(state));
                self.render();
            }
            _ => {}
        }
    }

    /// Zoom one step per wheel notch, anchored at the pointer. Negative
    /// `delta_y` zooms in.
    pub fn wheel(&mut self, screen: Point, delta_y: f64) {
        if !self.params.is_active || delta_y == 0.0 {
            return;
        }
        let step = self.config.wheel_zoom_step;
        let factor = if delta_y < 0.0 { step } else { 1.0 / step };
        self.camera.zoom_at(screen, factor);
        let padding = self.padding();
        self.selection.recompute(&self.history, padding);
        self.render();
    }

    pub fn touch_start(&mut self, touches: &[TouchPoint], now: Instant) {
        if !self.params.is_active {
            return;
        }
        if self.touches.press(touches) {
            self.begin_pinch();
            return;
        }
        if self.touches.is_pinching() {
            return;
        }
        if let Some(contact) = self.touches.sole_contact() {
            self.pointer_down(contact.position, now);
        } else if self.touches.contact_count() > 2 {
            self.cancel_gesture();
            self.render();
        }
    }

    pub fn touch_move(&mut self, touches: &[TouchPoint], now: Instant) {
        if !self.params.is_active {
            return;
        }
        if let Some(step) = self.touches.moved(touches) {
            self.camera.zoom_at(step.anchor, step.factor);
            self.camera.pan(step.pan);
            let padding = self.padding();
            self.selection.recompute(&self.history, padding);
            self.render();
            return;
        }
        if let Some(contact) = self.touches.sole_contact() {
            self.pointer_move(contact.position, now);
        }
    }

    pub fn touch_end(&mut self, ended: &[u64], now: Instant) {
        let lifted = self.touches.sole_contact().filter(|c| ended.contains(&c.id));
        let crowded = self.touches.contact_count() > 2;
        match self.touches.release(ended) {
            PinchChange::Started => self.begin_pinch(),
            PinchChange::Ended => {
                self.tools.finish();
                log::debug!("Pinch ended");
                self.resume_sole_contact(now);
            }
            // Three or more contacts cancelled the gesture; a lone survivor starts over
            PinchChange::Unchanged if crowded => self.resume_sole_contact(now),
            PinchChange::Unchanged => {
                if let Some(contact) = lifted.filter(|_| self.touches.contact_count() == 0) {
                    self.pointer_up(contact.position, now);
                }
            }
        }
    }

    /// Pinch wins over whatever a single finger was doing.
    fn begin_pinch(&mut self) {
        self.cancel_gesture();
        if let Some(pinch) = self.touches.pinch() {
            self.tools.begin(Gesture::Pinch(pinch));
        }
        log::debug!("Pinch started");
        self.render();
    }

    /// The remaining finger starts over from where it rests.
    fn resume_sole_contact(&mut self, now: Instant) {
        if let Some(contact) = self.touches.sole_contact() {
            self.pointer_down(contact.position, now);
        }
    }

    /// The platform cancelled every contact: drop the gesture without
    /// finalizing anything.
    pub fn touch_cancel(&mut self) {
        self.touches.reset();
        self.cancel_gesture();
        self.render();
    }

    fn flush_stroke(&mut self, to: Point) {
        let Gesture::Streaming {
            last_flushed,
            is_eraser,
            ..
        } = self.tools.gesture_mut()
        else {
            return;
        };
        let from = std::mem::replace(last_flushed, to);
        let is_eraser = *is_eraser;
        self.emit_stroke(from, to, is_eraser);
    }

    fn emit_stroke(&mut self, from: Point, to: Point, is_eraser: bool) {
        let op = Operation::stroke(
            self.params.identity.display_name.clone(),
            from,
            to,
            self.tools.color,
            self.tools.width,
            is_eraser,
        );
        self.commit_local(Message::DrawStroke(op));
    }

    fn emit_shape(&mut self, kind: ShapeKind, start: Point, end: Point) {
        let op = Operation::shape(
            self.params.identity.display_name.clone(),
            kind,
            start,
            end,
            self.tools.color,
            self.tools.width,
        );
        self.commit_local(Message::DrawShape(op));
    }

    fn finish_snip(&mut self, snip: Snip, release: Point) {
        let indices = match snip {
            Snip::Rect { start, .. } => query_rect(&self.history, Rect::from_points(start, release)),
            Snip::Freeform { mut points } => {
                points.push(release);
                query_polygon(&self.history, &points)
            }
        };
        log::debug!("Snip selected {} entries", indices.len());
        let padding = self.padding();
        self.selection.set(indices, &self.history, padding);
        self.render();
    }

    /// Apply the final geometry and send it as one batch.
    fn finish_move(&mut self, state: MoveState) {
        state.apply_preview(&mut self.history);
        let padding = self.padding();
        self.selection.recompute(&self.history, padding);
        self.render();
        if state.delta() == Vec2::ZERO {
            return;
        }
        let moves = state
            .moved_geometries()
            .into_iter()
            .map(|(index, geometry)| ElementMove { index, geometry })
            .collect();
        self.broadcast(Message::MoveElements(moves));
    }
}
