//! The whiteboard session.
//!
//! A [`Session`] owns everything one participant needs: camera, tool state,
//! history log, selection, the rendering surface and the transport. There is
//! no process-wide state, so any number of sessions can live side by side.
//!
//! Pointer and touch handling lives in [`crate::interaction`].

use crate::camera::Camera;
use crate::config::{EngineConfig, Identity, Role, SessionParams};
use crate::error::{EngineError, EngineResult};
use crate::history::HistoryLog;
use crate::input::TouchTracker;
use crate::operation::{Operation, Rgba};
use crate::protocol::{Envelope, LogEffect, Message, apply_to_log};
use crate::render::{Overlays, RenderSurface, render_operation, render_scene};
use crate::selection::Selection;
use crate::tools::{Gesture, Tool, ToolManager};
use crate::transport::Transport;
use kurbo::Size;
use std::collections::HashMap;
use uuid::Uuid;

/// User-facing notifications and confirmations, provided by the host UI.
pub trait Feedback {
    fn notify(&mut self, message: &str);

    /// Ask the user to confirm a destructive action.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Feedback that only logs. Confirmations are accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn notify(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        log::info!("Auto-confirming: {}", prompt);
        true
    }
}

/// One participant's whiteboard.
pub struct Session<S: RenderSurface, T: Transport> {
    pub(crate) config: EngineConfig,
    pub(crate) params: SessionParams,
    pub(crate) camera: Camera,
    pub(crate) tools: ToolManager,
    pub(crate) history: HistoryLog,
    pub(crate) selection: Selection,
    pub(crate) surface: S,
    pub(crate) transport: T,
    pub(crate) feedback: Box<dyn Feedback>,
    pub(crate) touches: TouchTracker,
    /// Last permission this host issued per viewer.
    roster: HashMap<Uuid, bool>,
}

impl<S: RenderSurface, T: Transport> Session<S, T> {
    /// Create a session. Fails without a surface or with a zero-sized one.
    pub fn new(
        config: EngineConfig,
        mut params: SessionParams,
        surface: Option<S>,
        transport: T,
    ) -> EngineResult<Self> {
        config.validate()?;
        let surface = surface.ok_or(EngineError::MissingSurface)?;
        let size = surface.size();
        if !(size.width > 0.0 && size.height > 0.0) {
            return Err(EngineError::SurfaceUnavailable {
                width: size.width,
                height: size.height,
            });
        }

        if params.role == Role::Host {
            params.can_draw = true;
        } else if !params.is_globally_visible {
            params.is_active = false;
        }

        let mut camera = Camera::with_bounds(config.min_scale, config.max_scale);
        camera.center_on_world(size, config.world_size);

        log::info!(
            "Session {} ({:?}) joining room {}",
            params.identity.display_name,
            params.role,
            params.room
        );

        let mut session = Self {
            tools: ToolManager::new(config.default_color, config.default_width),
            history: HistoryLog::new(config.history_capacity),
            selection: Selection::new(),
            camera,
            surface,
            transport,
            feedback: Box::new(LogFeedback),
            touches: TouchTracker::new(),
            roster: HashMap::new(),
            config,
            params,
        };
        session.render();
        Ok(session)
    }

    /// Replace the notification/confirmation handler.
    pub fn with_feedback(mut self, feedback: impl Feedback + 'static) -> Self {
        self.feedback = Box::new(feedback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.params.identity
    }

    pub fn room(&self) -> &str {
        &self.params.room
    }

    pub fn role(&self) -> Role {
        self.params.role
    }

    pub fn can_draw(&self) -> bool {
        self.params.can_draw
    }

    pub fn is_globally_visible(&self) -> bool {
        self.params.is_globally_visible
    }

    /// Whether the local overlay is shown (and accepts input).
    pub fn is_active(&self) -> bool {
        self.params.is_active
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tool(&self) -> Tool {
        self.tools.current()
    }

    pub fn gesture(&self) -> &Gesture {
        self.tools.gesture()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Permission last issued to a viewer by this host.
    pub fn viewer_permission(&self, viewer_id: Uuid) -> Option<bool> {
        self.roster.get(&viewer_id).copied()
    }

    pub(crate) fn can_mutate(&self) -> bool {
        self.params.role == Role::Host || self.params.can_draw
    }

    /// Selection padding in world units, constant on screen.
    pub(crate) fn padding(&self) -> f64 {
        self.camera.screen_len_to_world(self.config.selection_padding_px)
    }

    pub(crate) fn deny(&mut self, action: &str) {
        log::debug!("{} ignored: drawing is not permitted", action);
        self.feedback.notify("You don't have permission to draw");
    }

    pub fn set_tool(&mut self, tool: Tool) {
        let transition = self.tools.set_tool(tool);
        self.undo_gesture(transition.cancelled);
        if transition.clears_selection {
            self.selection.clear();
        }
        if transition.previous != tool {
            self.feedback.notify(&format!("{} tool", tool.label()));
        }
        self.render();
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.tools.color = color;
    }

    pub fn set_width(&mut self, width: f64) {
        self.tools.width = width.max(0.0);
    }

    /// Host only: wipe the board for everyone after confirmation.
    pub fn request_clear(&mut self) -> bool {
        if self.params.role != Role::Host {
            log::debug!("Clear ignored: not the host");
            return false;
        }
        if !self.feedback.confirm("Clear the whiteboard for everyone?") {
            return false;
        }
        let sentinel = Operation::clear(self.params.identity.display_name.clone());
        self.commit_local(Message::Clear(sentinel));
        true
    }

    /// Host only: grant or revoke a viewer's drawing rights.
    pub fn set_viewer_permission(&mut self, viewer_id: Uuid, can_draw: bool) -> bool {
        if self.params.role != Role::Host {
            return false;
        }
        self.roster.insert(viewer_id, can_draw);
        self.broadcast(Message::PermissionUpdate {
            viewer_id,
            can_draw,
        });
        true
    }

    /// Host only: show or hide the board for every viewer. The host's own
    /// overlay is unaffected.
    pub fn set_global_visibility(&mut self, is_visible: bool) -> bool {
        if self.params.role != Role::Host {
            return false;
        }
        self.params.is_globally_visible = is_visible;
        self.broadcast(Message::VisibilityToggle { is_visible });
        true
    }

    /// Show or hide the local overlay. Viewers cannot show it while the
    /// host has hidden the board.
    pub fn set_active(&mut self, active: bool) -> bool {
        if active && self.params.role == Role::Viewer && !self.params.is_globally_visible {
            self.feedback.notify("The host has hidden the whiteboard");
            return false;
        }
        if active {
            self.params.is_active = true;
            self.render();
        } else {
            self.deactivate();
        }
        true
    }

    fn deactivate(&mut self) {
        self.cancel_gesture();
        self.touches.reset();
        self.params.is_active = false;
    }

    /// Ask the room for authoritative state.
    pub fn request_snapshot(&mut self) {
        self.broadcast(Message::RequestSnapshot);
    }

    /// Remove the selected entries locally and broadcast their indices.
    /// Returns the indices that were sent.
    pub fn delete_selection(&mut self) -> Vec<usize> {
        if !self.can_mutate() {
            self.deny("Delete");
            return Vec::new();
        }
        if self.selection.is_empty() {
            return Vec::new();
        }
        self.cancel_gesture();
        let indices = self.selection.to_vec();
        self.commit_local(Message::DeleteElements(indices.clone()));
        indices
    }

    /// Tell the session the surface changed size.
    pub fn resize(&mut self, size: Size) {
        self.surface.resize(size);
        self.render();
    }

    /// Apply everything the transport has delivered. Returns how many
    /// envelopes were processed.
    pub fn poll_transport(&mut self) -> usize {
        let envelopes = self.transport.poll();
        let count = envelopes.len();
        for envelope in envelopes {
            self.handle_envelope(envelope);
        }
        count
    }

    /// Apply one incoming envelope.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        let kind = envelope.message.kind();
        if envelope.room != self.params.room {
            log::debug!("Ignoring {} for room {}", kind, envelope.room);
            return;
        }
        if envelope.is_echo(&self.params.identity, self.config.echo_key) {
            log::debug!("Suppressed echo of {}", kind);
            return;
        }
        if !envelope.is_authorized() {
            log::warn!(
                "Dropped {} from non-host {}",
                kind,
                envelope.sender_name
            );
            return;
        }

        match &envelope.message {
            Message::RequestSnapshot => {
                self.answer_snapshot_request(envelope.sender);
                return;
            }
            Message::Snapshot {
                target: Some(target),
                ..
            } if *target != self.params.identity.session_id => {
                log::debug!("Ignoring snapshot addressed to {}", target);
                return;
            }
            Message::PermissionUpdate {
                viewer_id,
                can_draw,
            } => {
                self.apply_permission(*viewer_id, *can_draw);
                return;
            }
            Message::VisibilityToggle { is_visible } => {
                self.apply_visibility(*is_visible);
                return;
            }
            _ => {}
        }

        let effect = apply_to_log(&mut self.history, &envelope.message);
        log::debug!("Applied {} from {}: {:?}", kind, envelope.sender_name, effect);
        self.after_log_change(&effect, &envelope.message);
    }

    fn answer_snapshot_request(&mut self, requester: Uuid) {
        if self.params.role != Role::Host || !self.config.host_answers_snapshot_requests {
            return;
        }
        log::debug!("Answering snapshot request from {}", requester);
        let message = Message::snapshot(&self.history.snapshot(), Some(requester));
        self.broadcast(message);
    }

    fn apply_permission(&mut self, viewer_id: Uuid, can_draw: bool) {
        if viewer_id != self.params.identity.session_id || self.params.role == Role::Host {
            return;
        }
        self.params.can_draw = can_draw;
        if can_draw {
            self.feedback.notify("The host allowed you to draw");
        } else {
            if self.tools.gesture().needs_permission() {
                self.cancel_gesture();
                self.render();
            }
            self.feedback.notify("The host disabled drawing for you");
        }
    }

    fn apply_visibility(&mut self, is_visible: bool) {
        self.params.is_globally_visible = is_visible;
        if self.params.role == Role::Viewer && !is_visible && self.params.is_active {
            self.deactivate();
            self.feedback.notify("The host has hidden the whiteboard");
        }
    }

    /// Apply a locally authored message, then broadcast it.
    pub(crate) fn commit_local(&mut self, message: Message) {
        let effect = apply_to_log(&mut self.history, &message);
        self.after_log_change(&effect, &message);
        self.broadcast(message);
    }

    pub(crate) fn broadcast(&mut self, message: Message) {
        let kind = message.kind();
        let envelope = Envelope::new(
            self.params.room.clone(),
            &self.params.identity,
            self.params.role,
            message,
        );
        if let Err(e) = self.transport.send(&envelope) {
            log::warn!("Dropped outgoing {}: {}", kind, e);
        }
    }

    /// Keep selection and move indices pointing at the same entries, then
    /// redraw.
    fn after_log_change(&mut self, effect: &LogEffect, message: &Message) {
        let padding = self.padding();
        match effect {
            LogEffect::Unchanged => return,
            LogEffect::Appended { evicted: 0 } => {
                if let Message::DrawStroke(op) = message {
                    render_operation(&mut self.surface, &self.camera, &self.config, op);
                    return;
                }
            }
            LogEffect::Appended { evicted } => {
                self.selection.apply_eviction(*evicted);
                if let Gesture::Moving(state) = self.tools.gesture_mut() {
                    state.apply_eviction(*evicted);
                }
                self.selection.recompute(&self.history, padding);
            }
            LogEffect::Replaced | LogEffect::Cleared => {
                self.selection.clear();
                if matches!(self.tools.gesture(), Gesture::Moving(_)) {
                    self.tools.cancel();
                }
            }
            LogEffect::Moved { .. } => self.selection.recompute(&self.history, padding),
            LogEffect::Removed { removed } => {
                self.selection.apply_removal(removed);
                if let Gesture::Moving(state) = self.tools.gesture_mut() {
                    state.apply_removal(removed);
                }
                self.selection.recompute(&self.history, padding);
            }
        }
        self.render();
    }

    /// Undo the preview side effects of an abandoned gesture.
    pub(crate) fn undo_gesture(&mut self, gesture: Gesture) {
        if let Gesture::Moving(state) = gesture {
            state.restore(&mut self.history);
            let padding = self.padding();
            self.selection.recompute(&self.history, padding);
        }
    }

    pub(crate) fn cancel_gesture(&mut self) {
        let gesture = self.tools.cancel();
        self.undo_gesture(gesture);
    }

    /// Full redraw from history, camera and selection.
    pub fn render(&mut self) {
        let snip = match self.tools.gesture() {
            Gesture::Snip(snip) => Some(snip),
            _ => None,
        };
        let overlays = Overlays {
            shape_preview: self.tools.shape_preview(),
            snip,
            selection: self.selection.bounds(),
            color: self.tools.color,
            width: self.tools.width,
        };
        render_scene(
            &mut self.surface,
            &self.camera,
            &self.config,
            &self.history,
            &overlays,
        );
    }
}
