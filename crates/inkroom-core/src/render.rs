//! Render orchestration against an abstract 2D surface.
//!
//! The engine never rasterizes by itself. It replays the history log through a
//! [`RenderSurface`] in screen coordinates; backends turn those calls into
//! pixels (see the `inkroom-render` crate for the Vello backend).

use crate::camera::Camera;
use crate::config::EngineConfig;
use crate::history::HistoryLog;
use crate::operation::{Operation, OperationKind, Rgba, ShapeKind};
use crate::tools::Snip;
use kurbo::{Point, Rect, Size};

/// Selection and snip outline color.
pub const SELECTION_COLOR: Rgba = Rgba::new(59, 130, 246, 255);
/// Dash length (screen px) for overlay outlines.
pub const OVERLAY_DASH: f64 = 4.0;

/// Stroke parameters for one draw call. Widths are in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba,
    pub width: f64,
    /// Dash length, or `None` for a solid line.
    pub dash: Option<f64>,
}

impl StrokeStyle {
    pub fn solid(color: Rgba, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(color: Rgba, width: f64, dash: f64) -> Self {
        Self {
            color,
            width,
            dash: Some(dash),
        }
    }
}

/// A 2D drawing context with pixel dimensions. All coordinates are screen
/// space.
pub trait RenderSurface {
    fn size(&self) -> Size;

    /// The host resized the surface.
    fn resize(&mut self, size: Size);

    /// Fill the whole surface.
    fn clear(&mut self, color: Rgba);

    /// Straight segment with round caps.
    fn segment(&mut self, from: Point, to: Point, style: &StrokeStyle);

    /// Outline of an axis-aligned rectangle.
    fn rect(&mut self, rect: Rect, style: &StrokeStyle);

    /// Outline of the ellipse inscribed in `bounds`.
    fn ellipse(&mut self, bounds: Rect, style: &StrokeStyle);

    /// Open polyline through `points`.
    fn polyline(&mut self, points: &[Point], style: &StrokeStyle);
}

/// Transient state drawn over the replayed log.
#[derive(Debug, Clone, Default)]
pub struct Overlays<'a> {
    /// Shape being dragged: kind, anchor, current (world).
    pub shape_preview: Option<(ShapeKind, Point, Point)>,
    pub snip: Option<&'a Snip>,
    /// Padded selection bounds (world).
    pub selection: Option<Rect>,
    /// Style for the shape preview.
    pub color: Rgba,
    pub width: f64,
}

/// Draw one operation incrementally, on top of what is already there.
pub fn render_operation<S: RenderSurface + ?Sized>(
    surface: &mut S,
    camera: &Camera,
    config: &EngineConfig,
    op: &Operation,
) {
    match &op.kind {
        OperationKind::Stroke(s) => {
            let from = camera.world_to_screen(Point::new(s.x0, s.y0));
            let to = camera.world_to_screen(Point::new(s.x1, s.y1));
            // Erasing paints the background over a wider line
            let style = if s.is_eraser {
                StrokeStyle::solid(
                    config.background,
                    (s.width + config.eraser_extra_width) * camera.scale,
                )
            } else {
                StrokeStyle::solid(s.color, s.width * camera.scale)
            };
            surface.segment(from, to, &style);
        }
        OperationKind::Shape(s) => {
            let start = camera.world_to_screen(Point::new(s.start_x, s.start_y));
            let end = camera.world_to_screen(Point::new(s.end_x, s.end_y));
            let style = StrokeStyle::solid(s.color, s.width * camera.scale);
            draw_shape(surface, s.kind, start, end, &style);
        }
        OperationKind::Clear => surface.clear(config.background),
    }
}

fn draw_shape<S: RenderSurface + ?Sized>(
    surface: &mut S,
    kind: ShapeKind,
    start: Point,
    end: Point,
    style: &StrokeStyle,
) {
    match kind {
        ShapeKind::Rectangle => surface.rect(Rect::from_points(start, end), style),
        ShapeKind::Circle => surface.ellipse(Rect::from_points(start, end), style),
        ShapeKind::Line => surface.segment(start, end, style),
    }
}

/// Full, idempotent redraw: background, the log from its last `Clear`
/// onwards, then overlays.
pub fn render_scene<S: RenderSurface + ?Sized>(
    surface: &mut S,
    camera: &Camera,
    config: &EngineConfig,
    history: &HistoryLog,
    overlays: &Overlays<'_>,
) {
    surface.clear(config.background);

    let start = history
        .iter()
        .enumerate()
        .filter(|(_, op)| op.is_clear())
        .map(|(i, _)| i + 1)
        .last()
        .unwrap_or(0);
    for op in history.iter().skip(start) {
        render_operation(surface, camera, config, op);
    }

    if let Some((kind, anchor, current)) = overlays.shape_preview {
        let style = StrokeStyle::solid(overlays.color, overlays.width * camera.scale);
        draw_shape(
            surface,
            kind,
            camera.world_to_screen(anchor),
            camera.world_to_screen(current),
            &style,
        );
    }

    let outline = StrokeStyle::dashed(SELECTION_COLOR, 1.0, OVERLAY_DASH);
    match overlays.snip {
        Some(Snip::Rect { start, current }) => {
            let rect = Rect::from_points(
                camera.world_to_screen(*start),
                camera.world_to_screen(*current),
            );
            surface.rect(rect, &outline);
        }
        Some(Snip::Freeform { points }) => {
            let screen: Vec<Point> = points.iter().map(|p| camera.world_to_screen(*p)).collect();
            if screen.len() > 1 {
                surface.polyline(&screen, &outline);
            }
        }
        None => {}
    }

    if let Some(bounds) = overlays.selection {
        let rect = Rect::from_points(
            camera.world_to_screen(bounds.origin()),
            camera.world_to_screen(Point::new(bounds.x1, bounds.y1)),
        );
        surface.rect(rect, &outline);
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Rgba),
    Segment {
        from: Point,
        to: Point,
        style: StrokeStyle,
    },
    Rect {
        rect: Rect,
        style: StrokeStyle,
    },
    Ellipse {
        bounds: Rect,
        style: StrokeStyle,
    },
    Polyline {
        points: Vec<Point>,
        style: StrokeStyle,
    },
}

/// Surface that records draw calls instead of drawing. Useful for headless
/// sessions and tests.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: Size,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            size: Size::new(width, height),
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands since the last `Clear`, i.e. what is currently visible.
    pub fn visible(&self) -> &[DrawCommand] {
        let start = self
            .commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::Clear(_)))
            .map_or(0, |i| i + 1);
        &self.commands[start..]
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl RenderSurface for RecordingSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
    }

    fn clear(&mut self, color: Rgba) {
        // Everything before a full clear is invisible
        self.commands.clear();
        self.commands.push(DrawCommand::Clear(color));
    }

    fn segment(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Segment {
            from,
            to,
            style: *style,
        });
    }

    fn rect(&mut self, rect: Rect, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Rect {
            rect,
            style: *style,
        });
    }

    fn ellipse(&mut self, bounds: Rect, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Ellipse {
            bounds,
            style: *style,
        });
    }

    fn polyline(&mut self, points: &[Point], style: &StrokeStyle) {
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            style: *style,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(x0: f64, x1: f64, eraser: bool) -> Operation {
        Operation::stroke(
            "a",
            Point::new(x0, 0.0),
            Point::new(x1, 0.0),
            Rgba::new(255, 0, 0, 255),
            2.0,
            eraser,
        )
    }

    #[test]
    fn test_stroke_width_scales_with_zoom() {
        let config = EngineConfig::default();
        let camera = Camera {
            scale: 2.0,
            ..Camera::default()
        };
        let mut surface = RecordingSurface::new(100.0, 100.0);
        render_operation(&mut surface, &camera, &config, &stroke(1.0, 3.0, false));
        assert_eq!(
            surface.commands(),
            &[DrawCommand::Segment {
                from: Point::new(2.0, 0.0),
                to: Point::new(6.0, 0.0),
                style: StrokeStyle::solid(Rgba::new(255, 0, 0, 255), 4.0),
            }]
        );
    }

    #[test]
    fn test_eraser_paints_background_wider() {
        let config = EngineConfig::default();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        render_operation(&mut surface, &Camera::default(), &config, &stroke(0.0, 1.0, true));
        let DrawCommand::Segment { style, .. } = &surface.commands()[0] else {
            panic!("expected segment");
        };
        assert_eq!(style.color, config.background);
        assert_eq!(style.width, 2.0 + config.eraser_extra_width);
    }

    #[test]
    fn test_shapes_map_to_primitives() {
        let config = EngineConfig::default();
        let camera = Camera::default();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        for kind in [ShapeKind::Rectangle, ShapeKind::Circle, ShapeKind::Line] {
            let op = Operation::shape(
                "a",
                kind,
                Point::new(10.0, 10.0),
                Point::new(0.0, 0.0),
                Rgba::black(),
                1.0,
            );
            render_operation(&mut surface, &camera, &config, &op);
        }
        let cmds = surface.commands();
        assert!(matches!(cmds[0], DrawCommand::Rect { rect, .. } if rect == Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(matches!(cmds[1], DrawCommand::Ellipse { .. }));
        assert!(matches!(cmds[2], DrawCommand::Segment { .. }));
    }

    #[test]
    fn test_scene_skips_entries_before_clear() {
        let config = EngineConfig::default();
        let mut history = HistoryLog::default();
        history.push(stroke(0.0, 1.0, false));
        history.push(Operation::clear("host"));
        history.push(stroke(5.0, 6.0, false));

        let mut surface = RecordingSurface::new(100.0, 100.0);
        render_scene(&mut surface, &Camera::default(), &config, &history, &Overlays::default());
        let cmds = surface.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], DrawCommand::Clear(config.background));
        assert!(matches!(cmds[1], DrawCommand::Segment { from, .. } if from == Point::new(5.0, 0.0)));
    }

    #[test]
    fn test_scene_is_idempotent() {
        let config = EngineConfig::default();
        let mut history = HistoryLog::default();
        history.push(stroke(0.0, 1.0, false));
        let mut surface = RecordingSurface::new(100.0, 100.0);
        let camera = Camera::default();

        render_scene(&mut surface, &camera, &config, &history, &Overlays::default());
        let first = surface.commands().to_vec();
        render_scene(&mut surface, &camera, &config, &history, &Overlays::default());
        assert_eq!(surface.commands(), first.as_slice());
    }

    #[test]
    fn test_overlays_drawn_last() {
        let config = EngineConfig::default();
        let history = HistoryLog::default();
        let snip = Snip::Freeform {
            points: vec![Point::ZERO, Point::new(5.0, 0.0), Point::new(5.0, 5.0)],
        };
        let overlays = Overlays {
            shape_preview: Some((ShapeKind::Circle, Point::ZERO, Point::new(4.0, 4.0))),
            snip: Some(&snip),
            selection: Some(Rect::new(-1.0, -1.0, 2.0, 2.0)),
            color: Rgba::black(),
            width: 3.0,
        };
        let mut surface = RecordingSurface::new(100.0, 100.0);
        render_scene(&mut surface, &Camera::default(), &config, &history, &overlays);

        let cmds = surface.visible();
        assert_eq!(cmds.len(), 3);
        assert!(matches!(cmds[0], DrawCommand::Ellipse { .. }));
        assert!(matches!(&cmds[1], DrawCommand::Polyline { points, style } if points.len() == 3 && style.dash.is_some()));
        assert!(matches!(cmds[2], DrawCommand::Rect { rect, .. } if rect == Rect::new(-1.0, -1.0, 2.0, 2.0)));
    }
}
