//! Vello-based rendering surface.

use inkroom_core::render::{RenderSurface, StrokeStyle};
use inkroom_core::Rgba;
use kurbo::{Affine, BezPath, Cap, Circle, Ellipse, Join, Line, Point, Rect, Size, Stroke};
use peniko::{Color, Fill};
use vello::Scene;

/// A [`RenderSurface`] that builds a Vello scene.
///
/// The host owns the GPU side: after the engine renders, hand [`scene`]
/// to a `vello::Renderer` with [`background`] as the base color.
///
/// [`scene`]: VelloSurface::scene
/// [`background`]: VelloSurface::background
pub struct VelloSurface {
    /// The Vello scene being built.
    scene: Scene,
    size: Size,
    /// Color of the last full clear.
    background: Color,
}

impl VelloSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            scene: Scene::new(),
            size: Size::new(width, height),
            background: Color::from_rgba8(255, 255, 255, 255),
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    pub fn background(&self) -> Color {
        self.background
    }

    fn stroke_for(style: &StrokeStyle) -> Stroke {
        let stroke = Stroke::new(style.width)
            .with_caps(Cap::Round)
            .with_join(Join::Round);
        match style.dash {
            Some(dash) => stroke.with_dashes(0.0, &[dash, dash]),
            None => stroke,
        }
    }
}

impl RenderSurface for VelloSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) {
        log::debug!("Surface resized to {}x{}", size.width, size.height);
        self.size = size;
    }

    fn clear(&mut self, color: Rgba) {
        // Nothing drawn before a full clear can show through
        self.scene.reset();
        self.background = color.into();
        self.scene.fill(
            Fill::NonZero,
            Affine::IDENTITY,
            self.background,
            None,
            &self.size.to_rect(),
        );
    }

    fn segment(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        let color: Color = style.color.into();
        if from == to {
            // Zero-length strokes still leave a round dot
            let dot = Circle::new(from, style.width / 2.0);
            self.scene.fill(Fill::NonZero, Affine::IDENTITY, color, None, &dot);
            return;
        }
        self.scene.stroke(
            &Self::stroke_for(style),
            Affine::IDENTITY,
            color,
            None,
            &Line::new(from, to),
        );
    }

    fn rect(&mut self, rect: Rect, style: &StrokeStyle) {
        let color: Color = style.color.into();
        self.scene
            .stroke(&Self::stroke_for(style), Affine::IDENTITY, color, None, &rect);
    }

    fn ellipse(&mut self, bounds: Rect, style: &StrokeStyle) {
        let color: Color = style.color.into();
        self.scene.stroke(
            &Self::stroke_for(style),
            Affine::IDENTITY,
            color,
            None,
            &Ellipse::from_rect(bounds),
        );
    }

    fn polyline(&mut self, points: &[Point], style: &StrokeStyle) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let mut path = BezPath::new();
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        let color: Color = style.color.into();
        self.scene
            .stroke(&Self::stroke_for(style), Affine::IDENTITY, color, None, &path);
    }
}
