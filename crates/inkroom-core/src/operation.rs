//! Drawing operations stored in the history log.
//!
//! Operations are plain values: once appended they are addressed only by their
//! position in the log, never by an identity of their own.

use kurbo::{Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};

#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};
#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for `created_at` stamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// RGBA8 color, carried on the wire as a `#rrggbb` / `#rrggbbaa` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(input: &str) -> Option<Self> {
        let hex = input.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let mut out = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(Self::new(out[0], out[1], out[2], 255))
            }
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as hex. Opaque colors omit the alpha byte.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::black()
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Rgba> for String {
    fn from(color: Rgba) -> Self {
        color.to_hex()
    }
}

impl From<Color> for Rgba {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<Rgba> for Color {
    fn from(color: Rgba) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Shape sub-modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Rectangle,
    Circle,
    Line,
}

impl ShapeKind {
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
            ShapeKind::Line => "line",
        }
    }
}

/// One freehand segment. Freehand drawing is a run of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: Rgba,
    pub width: f64,
    #[serde(default)]
    pub is_eraser: bool,
}

/// A finalized rectangle, circle or line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeOp {
    pub kind: ShapeKind,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub color: Rgba,
    pub width: f64,
}

/// The variant part of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationKind {
    Stroke(StrokeSegment),
    Shape(ShapeOp),
    Clear,
}

/// A drawing operation as stored in the history log and sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub author_id: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// Two-point geometry shared by strokes (`x0,y0 -> x1,y1`) and shapes
/// (`start -> end`). This is what `move-elements` carries per index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub start: Point,
    pub end: Point,
}

impl Geometry {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn translate(self, delta: Vec2) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    pub fn midpoint(&self) -> Point {
        self.start.midpoint(self.end)
    }

    /// Normalized axis-aligned bounds.
    pub fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }
}

impl Operation {
    pub fn stroke(
        author_id: impl Into<String>,
        from: Point,
        to: Point,
        color: Rgba,
        width: f64,
        is_eraser: bool,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            created_at: now_millis(),
            kind: OperationKind::Stroke(StrokeSegment {
                x0: from.x,
                y0: from.y,
                x1: to.x,
                y1: to.y,
                color,
                width,
                is_eraser,
            }),
        }
    }

    pub fn shape(
        author_id: impl Into<String>,
        kind: ShapeKind,
        start: Point,
        end: Point,
        color: Rgba,
        width: f64,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            created_at: now_millis(),
            kind: OperationKind::Shape(ShapeOp {
                kind,
                start_x: start.x,
                start_y: start.y,
                end_x: end.x,
                end_y: end.y,
                color,
                width,
            }),
        }
    }

    pub fn clear(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            created_at: now_millis(),
            kind: OperationKind::Clear,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self.kind, OperationKind::Clear)
    }

    /// Geometry of a stroke or shape. `Clear` has none.
    pub fn geometry(&self) -> Option<Geometry> {
        match &self.kind {
            OperationKind::Stroke(s) => Some(Geometry::new(
                Point::new(s.x0, s.y0),
                Point::new(s.x1, s.y1),
            )),
            OperationKind::Shape(s) => Some(Geometry::new(
                Point::new(s.start_x, s.start_y),
                Point::new(s.end_x, s.end_y),
            )),
            OperationKind::Clear => None,
        }
    }

    /// Overwrite the geometry. Returns false for `Clear`.
    pub fn set_geometry(&mut self, geometry: Geometry) -> bool {
        match &mut self.kind {
            OperationKind::Stroke(s) => {
                s.x0 = geometry.start.x;
                s.y0 = geometry.start.y;
                s.x1 = geometry.end.x;
                s.y1 = geometry.end.y;
                true
            }
            OperationKind::Shape(s) => {
                s.start_x = geometry.start.x;
                s.start_y = geometry.start.y;
                s.end_x = geometry.end.x;
                s.end_y = geometry.end.y;
                true
            }
            OperationKind::Clear => false,
        }
    }

    /// World-space bounds (unpadded, ignoring stroke width).
    pub fn bounds(&self) -> Option<Rect> {
        self.geometry().map(|g| g.bounds())
    }

    /// Points tested by freeform selection: both endpoints and the midpoint
    /// for strokes, the bounding-box center for shapes.
    pub fn sample_points(&self) -> Vec<Point> {
        match (&self.kind, self.geometry()) {
            (OperationKind::Stroke(_), Some(g)) => vec![g.start, g.end, g.midpoint()],
            (OperationKind::Shape(_), Some(g)) => vec![g.bounds().center()],
            _ => Vec::new(),
        }
    }
}
