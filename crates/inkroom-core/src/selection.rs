//! Region queries, selection state and move staging.

use crate::history::HistoryLog;
use crate::operation::{Geometry, OperationKind};
use kurbo::{Point, Rect, Vec2};
use std::collections::BTreeSet;

/// Inclusive point-in-rect test (kurbo's `contains` excludes the far edges).
fn rect_contains(rect: Rect, p: Point) -> bool {
    p.x >= rect.x0 && p.x <= rect.x1 && p.y >= rect.y0 && p.y <= rect.y1
}

/// Inclusive overlap test; zero-area rects (horizontal lines) still overlap.
fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Indices matched by a rectangular snip.
///
/// A stroke matches when either endpoint or its midpoint is inside; a shape
/// matches when its bounding box overlaps the rectangle.
pub fn query_rect(log: &HistoryLog, rect: Rect) -> BTreeSet<usize> {
    let rect = rect.abs();
    log.iter()
        .enumerate()
        .filter(|(_, op)| match (&op.kind, op.geometry()) {
            (OperationKind::Stroke(_), Some(_)) => {
                op.sample_points().into_iter().any(|p| rect_contains(rect, p))
            }
            (OperationKind::Shape(_), Some(g)) => rects_overlap(rect, g.bounds()),
            _ => false,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Indices matched by a freeform snip. The path is closed by repeating its
/// first point; fewer than three points select nothing.
pub fn query_polygon(log: &HistoryLog, path: &[Point]) -> BTreeSet<usize> {
    if path.len() < 3 {
        return BTreeSet::new();
    }
    let mut polygon = path.to_vec();
    polygon.push(path[0]);

    log.iter()
        .enumerate()
        .filter(|(_, op)| {
            op.sample_points()
                .into_iter()
                .any(|p| point_in_polygon(p, &polygon))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Even-odd ray casting test.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Union of the bounds of the given entries, inflated by `padding` world units.
pub fn padded_bounds(log: &HistoryLog, indices: &BTreeSet<usize>, padding: f64) -> Option<Rect> {
    indices
        .iter()
        .filter_map(|&i| log.get(i).and_then(|op| op.bounds()))
        .reduce(|acc, r| acc.union(r))
        .map(|r| r.inflate(padding, padding))
}

/// Where an index lands after `removed` (ascending) were taken out, or `None`
/// if it was removed itself.
pub fn reindex_after_removal(index: usize, removed_ascending: &[usize]) -> Option<usize> {
    match removed_ascending.binary_search(&index) {
        Ok(_) => None,
        Err(shift) => Some(index - shift),
    }
}

/// Where an index lands after `evicted` entries left the front of the log.
pub fn reindex_after_eviction(index: usize, evicted: usize) -> Option<usize> {
    index.checked_sub(evicted)
}

/// Local, never-synchronized selection: a set of log indices and a cached
/// padded bounding box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    indices: BTreeSet<usize>,
    bounds: Option<Rect>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> &BTreeSet<usize> {
        &self.indices
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether a world point falls inside the padded bounding box.
    pub fn hit(&self, world: Point) -> bool {
        self.bounds.is_some_and(|b| rect_contains(b, world))
    }

    /// Replace membership and recompute bounds. `padding` is in world units.
    pub fn set(&mut self, indices: BTreeSet<usize>, log: &HistoryLog, padding: f64) {
        self.indices = indices;
        self.recompute(log, padding);
    }

    /// Recompute bounds after member geometry changed. Members no longer in
    /// the log are dropped.
    pub fn recompute(&mut self, log: &HistoryLog, padding: f64) {
        self.indices.retain(|&i| i < log.len());
        self.bounds = padded_bounds(log, &self.indices, padding);
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.bounds = None;
    }

    /// Drop removed indices and shift survivors down.
    pub fn apply_removal(&mut self, removed: &[usize]) {
        let mut ascending = removed.to_vec();
        ascending.sort_unstable();
        self.indices = self
            .indices
            .iter()
            .filter_map(|&i| reindex_after_removal(i, &ascending))
            .collect();
    }

    /// Drop evicted indices and shift survivors down.
    pub fn apply_eviction(&mut self, evicted: usize) {
        if evicted == 0 {
            return;
        }
        self.indices = self
            .indices
            .iter()
            .filter_map(|&i| reindex_after_eviction(i, evicted))
            .collect();
    }
}

/// Live move of the selected entries.
///
/// Geometry is previewed locally on every pointer move; only the final
/// geometries are broadcast on release.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveState {
    /// Starting point of the drag (world).
    pub origin: Point,
    /// Current point of the drag (world).
    pub current: Point,
    /// Geometry of each moved index when the drag started.
    pub originals: Vec<(usize, Geometry)>,
}

impl MoveState {
    pub fn new(origin: Point, log: &HistoryLog, indices: &BTreeSet<usize>) -> Self {
        let originals = indices
            .iter()
            .filter_map(|&i| log.get(i).and_then(|op| op.geometry()).map(|g| (i, g)))
            .collect();
        Self {
            origin,
            current: origin,
            originals,
        }
    }

    pub fn delta(&self) -> Vec2 {
        self.current - self.origin
    }

    /// Geometry each index should have at the current pointer position.
    pub fn moved_geometries(&self) -> Vec<(usize, Geometry)> {
        let delta = self.delta();
        self.originals
            .iter()
            .map(|&(i, g)| (i, g.translate(delta)))
            .collect()
    }

    /// Write the current preview into the log.
    pub fn apply_preview(&self, log: &mut HistoryLog) {
        for (index, geometry) in self.moved_geometries() {
            log.apply_geometry(index, geometry);
        }
    }

    /// Put every entry back where it started.
    pub fn restore(&self, log: &mut HistoryLog) {
        for &(index, geometry) in &self.originals {
            log.apply_geometry(index, geometry);
        }
    }

    pub fn apply_removal(&mut self, removed: &[usize]) {
        let mut ascending = removed.to_vec();
        ascending.sort_unstable();
        self.originals = self
            .originals
            .iter()
            .filter_map(|&(i, g)| reindex_after_removal(i, &ascending).map(|i| (i, g)))
            .collect();
    }

    pub fn apply_eviction(&mut self, evicted: usize) {
        self.originals = self
            .originals
            .iter()
            .filter_map(|&(i, g)| reindex_after_eviction(i, evicted).map(|i| (i, g)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, Rgba, ShapeKind};

    fn stroke(x0: f64, y0: f64, x1: f64, y1: f64) -> Operation {
        Operation::stroke("t", Point::new(x0, y0), Point::new(x1, y1), Rgba::black(), 2.0, false)
    }

    fn rect_shape(x0: f64, y0: f64, x1: f64, y1: f64) -> Operation {
        Operation::shape(
            "t",
            ShapeKind::Rectangle,
            Point::new(x0, y0),
            Point::new(x1, y1),
            Rgba::black(),
            2.0,
        )
    }

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_rect_selects_contained_strokes_only() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(10.0, 10.0, 20.0, 20.0)); // A
        log.push(stroke(30.0, 30.0, 40.0, 35.0)); // B
        log.push(stroke(200.0, 200.0, 220.0, 220.0)); // C

        // Drag from bottom-right to top-left: must be normalized.
        let selected = query_rect(&log, Rect::new(50.0, 50.0, 0.0, 0.0));
        assert_eq!(selected, set(&[0, 1]));
    }

    #[test]
    fn test_rect_matches_stroke_by_midpoint() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(-100.0, 5.0, 100.0, 5.0));
        assert_eq!(query_rect(&log, Rect::new(-1.0, 0.0, 1.0, 10.0)), set(&[0]));
    }

    #[test]
    fn test_rect_matches_shape_by_bbox_overlap() {
        let mut log = HistoryLog::new(10);
        log.push(rect_shape(0.0, 0.0, 100.0, 100.0));
        log.push(Operation::shape(
            "t",
            ShapeKind::Line,
            Point::new(150.0, 50.0),
            Point::new(300.0, 50.0),
            Rgba::black(),
            1.0,
        ));
        log.push(Operation::clear("t"));

        assert_eq!(query_rect(&log, Rect::new(90.0, 90.0, 110.0, 110.0)), set(&[0]));
        // Zero-height line still overlaps.
        assert_eq!(query_rect(&log, Rect::new(200.0, 40.0, 210.0, 60.0)), set(&[1]));
    }

    #[test]
    fn test_point_in_polygon() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 5.0), &square));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &square));
        assert!(!point_in_polygon(Point::new(5.0, -1.0), &square));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // U shape: the notch is outside.
        let u = vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 30.0),
            Point::new(20.0, 30.0),
            Point::new(20.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 30.0),
            Point::new(0.0, 30.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 20.0), &u));
        assert!(!point_in_polygon(Point::new(15.0, 20.0), &u));
    }

    #[test]
    fn test_polygon_query() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(5.0, 5.0, 6.0, 6.0));
        log.push(rect_shape(40.0, 40.0, 60.0, 60.0)); // center (50, 50)
        log.push(rect_shape(0.0, 0.0, 200.0, 200.0)); // center (100, 100)

        let path = [Point::new(0.0, 0.0), Point::new(70.0, 0.0), Point::new(70.0, 70.0), Point::new(0.0, 70.0)];
        assert_eq!(query_polygon(&log, &path), set(&[0, 1]));
        assert!(query_polygon(&log, &path[..2]).is_empty());
    }

    #[test]
    fn test_padded_bounds() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(0.0, 0.0, 10.0, 10.0));
        log.push(rect_shape(20.0, 5.0, 30.0, 15.0));
        let b = padded_bounds(&log, &set(&[0, 1]), 2.5).unwrap();
        assert_eq!(b, Rect::new(-2.5, -2.5, 32.5, 17.5));
        assert!(padded_bounds(&log, &set(&[]), 2.5).is_none());
    }

    #[test]
    fn test_selection_hit_and_clear() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(0.0, 0.0, 10.0, 10.0));
        let mut sel = Selection::new();
        sel.set(set(&[0]), &log, 5.0);
        assert!(sel.hit(Point::new(-4.0, 12.0)));
        assert!(!sel.hit(Point::new(-6.0, 0.0)));

        sel.clear();
        assert!(sel.is_empty());
        assert!(sel.bounds().is_none());
    }

    #[test]
    fn test_selection_reindexing() {
        let mut sel = Selection::new();
        let mut log = HistoryLog::new(20);
        for i in 0..10 {
            log.push(stroke(i as f64, 0.0, i as f64, 1.0));
        }
        sel.set(set(&[1, 3, 5, 8]), &log, 0.0);

        sel.apply_removal(&[5, 2]);
        assert_eq!(sel.to_vec(), vec![1, 2, 6]);

        sel.apply_eviction(2);
        assert_eq!(sel.to_vec(), vec![0, 4]);
    }

    #[test]
    fn test_move_preview_and_restore() {
        let mut log = HistoryLog::new(10);
        log.push(stroke(0.0, 0.0, 10.0, 0.0));
        log.push(rect_shape(0.0, 0.0, 5.0, 5.0));

        let mut mv = MoveState::new(Point::new(1.0, 1.0), &log, &set(&[0, 1]));
        mv.current = Point::new(11.0, 6.0);
        mv.apply_preview(&mut log);
        assert_eq!(
            log.get(0).unwrap().geometry().unwrap(),
            Geometry::new(Point::new(10.0, 5.0), Point::new(20.0, 5.0))
        );

        // Previews are relative to the originals, not cumulative.
        mv.current = Point::new(2.0, 1.0);
        mv.apply_preview(&mut log);
        assert_eq!(log.get(1).unwrap().geometry().unwrap().start, Point::new(1.0, 0.0));

        mv.restore(&mut log);
        assert_eq!(log.get(1).unwrap().geometry().unwrap().start, Point::ZERO);
    }
}
