//! Tool state machine.
//!
//! Exactly one [`Tool`] is active. Pointer interactions in flight are tracked
//! as a [`Gesture`]; switching tools cancels the gesture and hands it back to
//! the caller so preview side effects can be undone.

use crate::input::{Pinch, Throttle};
use crate::operation::{Rgba, ShapeKind};
use crate::selection::MoveState;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Region-selection sub-modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnipMode {
    #[default]
    Rectangular,
    Freeform,
}

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "tool", content = "mode", rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Pan,
    Shape(ShapeKind),
    Select(SnipMode),
}

impl Tool {
    /// Human-readable label for notifications.
    pub fn label(&self) -> String {
        match self {
            Tool::Pen => "Pen".to_string(),
            Tool::Eraser => "Eraser".to_string(),
            Tool::Pan => "Pan".to_string(),
            Tool::Shape(kind) => format!("Shape ({})", kind.name()),
            Tool::Select(SnipMode::Rectangular) => "Select (rectangular)".to_string(),
            Tool::Select(SnipMode::Freeform) => "Select (freeform)".to_string(),
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Tool::Select(_))
    }

    /// Whether using this tool mutates the shared log and so needs permission.
    pub fn requires_permission(&self) -> bool {
        !matches!(self, Tool::Pan)
    }
}

/// An in-progress region selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Snip {
    Rect { start: Point, current: Point },
    Freeform { points: Vec<Point> },
}

impl Snip {
    /// Normalized drag rectangle for rectangular snips.
    pub fn rect(&self) -> Option<Rect> {
        match self {
            Snip::Rect { start, current } => Some(Rect::from_points(*start, *current)),
            Snip::Freeform { .. } => None,
        }
    }
}

/// A pointer interaction in flight.
#[derive(Debug, Clone, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Pen/eraser drawing, flushed through the throttle.
    Streaming {
        last_flushed: Point,
        throttle: Throttle,
        is_eraser: bool,
    },
    /// Shape drag with live preview.
    ShapeDrag {
        kind: ShapeKind,
        anchor: Point,
        current: Point,
    },
    Snip(Snip),
    Moving(MoveState),
    /// Panning, tracked in screen space.
    Panning { last_screen: Point },
    Pinch(Pinch),
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// Gestures that end in a log mutation and so need draw permission.
    pub fn needs_permission(&self) -> bool {
        matches!(
            self,
            Gesture::Streaming { .. } | Gesture::ShapeDrag { .. } | Gesture::Snip(_) | Gesture::Moving(_)
        )
    }
}

/// What a tool switch cancelled.
#[derive(Debug, Clone)]
pub struct ToolTransition {
    pub previous: Tool,
    pub cancelled: Gesture,
    /// True when the new tool is not `Select`: the selection must be cleared.
    pub clears_selection: bool,
}

/// Manages the current tool, its style, and the in-flight gesture.
#[derive(Debug, Clone)]
pub struct ToolManager {
    current: Tool,
    gesture: Gesture,
    /// Color for new strokes and shapes.
    pub color: Rgba,
    /// Width for new strokes and shapes (world units).
    pub width: f64,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new(Rgba::black(), 3.0)
    }
}

impl ToolManager {
    pub fn new(color: Rgba, width: f64) -> Self {
        Self {
            current: Tool::default(),
            gesture: Gesture::Idle,
            color,
            width,
        }
    }

    pub fn current(&self) -> Tool {
        self.current
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn gesture_mut(&mut self) -> &mut Gesture {
        &mut self.gesture
    }

    /// Switch tools. Any in-flight gesture is cancelled (never finalized),
    /// including on a same-tool sub-mode change.
    pub fn set_tool(&mut self, tool: Tool) -> ToolTransition {
        let previous = self.current;
        let cancelled = self.cancel();
        self.current = tool;
        log::debug!("Tool {:?} -> {:?}", previous, tool);
        ToolTransition {
            previous,
            cancelled,
            clears_selection: !tool.is_select(),
        }
    }

    /// Start a gesture, replacing (and returning) whatever was in flight.
    pub fn begin(&mut self, gesture: Gesture) -> Gesture {
        std::mem::replace(&mut self.gesture, gesture)
    }

    /// End the current gesture, returning it.
    pub fn finish(&mut self) -> Gesture {
        std::mem::take(&mut self.gesture)
    }

    /// Cancel the current gesture, returning it so the caller can undo any
    /// preview side effects.
    pub fn cancel(&mut self) -> Gesture {
        self.finish()
    }

    pub fn is_active(&self) -> bool {
        !self.gesture.is_idle()
    }

    /// Preview of the shape being dragged, if any.
    pub fn shape_preview(&self) -> Option<(ShapeKind, Point, Point)> {
        match &self.gesture {
            Gesture::ShapeDrag {
                kind,
                anchor,
                current,
            } => Some((*kind, *anchor, *current)),
            _ => None,
        }
    }
}
