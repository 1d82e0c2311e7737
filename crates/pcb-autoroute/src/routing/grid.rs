//! Cost grid rasterized from board pads.

use crate::types::{BBox, Pad, Point2D};
use serde::Serialize;
use std::ops::Deref;

pub const FREE_COST: f32 = 1.0;
pub const OBSTACLE_COST: f32 = f32::INFINITY;

/// Largest grid [`RoutingGrid::covering`] will allocate.
pub const MAX_CELLS: usize = 1 << 25;

/// Integer cell coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridCell {
    pub cost: f32,
}

impl Default for GridCell {
    fn default() -> Self {
        Self { cost: FREE_COST }
    }
}

/// Dense row-major grid of traversal costs.
///
/// Cell `(x, y)` covers board position `(x + offset.x, y + offset.y) *
/// resolution`. A grid built with [`RoutingGrid::new`] has a zero offset.
#[derive(Debug, Clone)]
pub struct RoutingGrid {
    width: i32,
    height: i32,
    resolution: f64,
    offset: GridPoint,
    cells: Vec<GridCell>,
}

impl RoutingGrid {
    /// Allocate `width * height` free cells, `resolution` board units each.
    pub fn new(width: i32, height: i32, resolution: f64) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            resolution,
            offset: GridPoint::default(),
            cells: vec![GridCell::default(); width as usize * height as usize],
        }
    }

    /// A grid covering `bbox` plus `margin` free cells on every side.
    /// An empty box yields an empty grid.
    ///
    /// Returns `None` when the covered area would exceed [`MAX_CELLS`] or its
    /// cell coordinates would not fit in `i32`.
    pub fn covering(bbox: &BBox, resolution: f64, margin: i32) -> Option<Self> {
        if bbox.is_empty() {
            return Some(Self::new(0, 0, resolution));
        }
        let (min_x, max_x) = cell_span(bbox.minx, bbox.maxx, resolution, margin)?;
        let (min_y, max_y) = cell_span(bbox.miny, bbox.maxy, resolution, margin)?;
        let width = max_x.checked_sub(min_x)?.checked_add(1)?;
        let height = max_y.checked_sub(min_y)?.checked_add(1)?;
        if width.checked_mul(height)? > MAX_CELLS as i64 {
            return None;
        }

        let mut grid = Self::new(
            i32::try_from(width).ok()?,
            i32::try_from(height).ok()?,
            resolution,
        );
        grid.offset = GridPoint::new(i32::try_from(min_x).ok()?, i32::try_from(min_y).ok()?);
        Some(grid)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn offset(&self) -> GridPoint {
        self.offset
    }

    #[inline]
    pub fn in_bounds(&self, p: GridPoint) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    #[inline]
    fn index(&self, p: GridPoint) -> Option<usize> {
        self.in_bounds(p)
            .then(|| p.y as usize * self.width as usize + p.x as usize)
    }

    /// Cost of entering `p`, or `None` outside the grid.
    #[inline]
    pub fn cost(&self, p: GridPoint) -> Option<f32> {
        self.index(p).map(|i| self.cells[i].cost)
    }

    pub fn is_blocked(&self, p: GridPoint) -> bool {
        self.cost(p).map_or(true, f32::is_infinite)
    }

    /// Set the cost of `p`; out-of-bounds points are ignored.
    pub fn set_cost(&mut self, p: GridPoint, cost: f32) {
        if let Some(i) = self.index(p) {
            self.cells[i].cost = cost;
        }
    }

    /// Nearest cell to a board position. Halfway cases round away from zero.
    /// Positions far outside the grid saturate rather than wrap.
    pub fn world_to_grid(&self, pos: Point2D) -> GridPoint {
        GridPoint::new(
            ((pos[0] / self.resolution).round() as i32).saturating_sub(self.offset.x),
            ((pos[1] / self.resolution).round() as i32).saturating_sub(self.offset.y),
        )
    }

    /// Board position of a cell center.
    pub fn grid_to_world(&self, p: GridPoint) -> Point2D {
        [
            (p.x as f64 + self.offset.x as f64) * self.resolution,
            (p.y as f64 + self.offset.y as f64) * self.resolution,
        ]
    }

    /// Set every cell in the pad's axis-aligned footprint to free or
    /// obstacle cost. Cells outside the grid are skipped.
    pub fn mark_pad(&mut self, pad: &Pad, traversable: bool) {
        let center = self.world_to_grid(pad.pos);
        let half_width = ((pad.size[0] / 2.0) / self.resolution).ceil() as i32;
        let half_height = ((pad.size[1] / 2.0) / self.resolution).ceil() as i32;
        let cost = if traversable { FREE_COST } else { OBSTACLE_COST };

        let x_range = (center.x - half_width).max(0)..=(center.x + half_width).min(self.width - 1);
        for y in (center.y - half_height).max(0)..=(center.y + half_height).min(self.height - 1) {
            for x in x_range.clone() {
                self.set_cost(GridPoint::new(x, y), cost);
            }
        }
    }

    /// Make two terminal pads traversable until the returned guard is
    /// dropped, at which point both are obstacles again.
    pub fn open_terminals<'g, 'p>(&'g mut self, pads: [&'p Pad; 2]) -> TerminalGuard<'g, 'p> {
        for pad in pads {
            self.mark_pad(pad, true);
        }
        TerminalGuard { grid: self, pads }
    }
}

/// Cell index range `[floor(min / res) - margin, ceil(max / res) + margin]`
/// along one axis, kept within `i32`.
fn cell_span(min: f64, max: f64, resolution: f64, margin: i32) -> Option<(i64, i64)> {
    let lo = (min / resolution).floor();
    let hi = (max / resolution).ceil();
    let limit = i32::MAX as f64;
    if !(lo.abs() <= limit && hi.abs() <= limit) {
        return None;
    }
    let lo = (lo as i64).checked_sub(margin as i64)?;
    let hi = (hi as i64).checked_add(margin as i64)?;
    let range = i32::MIN as i64..=i32::MAX as i64;
    (range.contains(&lo) && range.contains(&hi)).then_some((lo, hi))
}

/// Exclusive access to a grid whose terminal pads are temporarily open.
pub struct TerminalGuard<'g, 'p> {
    grid: &'g mut RoutingGrid,
    pads: [&'p Pad; 2],
}

impl Deref for TerminalGuard<'_, '_> {
    type Target = RoutingGrid;

    fn deref(&self) -> &RoutingGrid {
        self.grid
    }
}

impl Drop for TerminalGuard<'_, '_> {
    fn drop(&mut self) {
        for pad in self.pads {
            self.grid.mark_pad(pad, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PadShape;

    fn pad(pos: Point2D, size: Point2D) -> Pad {
        Pad {
            pos,
            size,
            shape: PadShape::Rect,
            rotation: 0.0,
            layer: "F.Cu".to_string(),
            net: None,
        }
    }

    fn costs(grid: &RoutingGrid) -> Vec<f32> {
        let mut out = Vec::new();
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                out.push(grid.cost(GridPoint::new(x, y)).unwrap());
            }
        }
        out
    }

    #[test]
    fn test_new_grid_is_free() {
        let grid = RoutingGrid::new(4, 3, 0.5);
        assert_eq!(costs(&grid), vec![FREE_COST; 12]);
        assert_eq!(grid.cost(GridPoint::new(4, 0)), None);
        assert_eq!(grid.cost(GridPoint::new(0, -1)), None);
        assert!(grid.is_blocked(GridPoint::new(-1, 0)));
    }

    #[test]
    fn test_world_to_grid_rounds_half_away_from_zero() {
        let grid = RoutingGrid::new(10, 10, 1.0);
        assert_eq!(grid.world_to_grid([2.5, 3.4]), GridPoint::new(3, 3));
        assert_eq!(grid.world_to_grid([-2.5, 3.6]), GridPoint::new(-3, 4));
        assert_eq!(grid.world_to_grid([1.0, 0.0]), GridPoint::new(1, 0));
    }

    #[test]
    fn test_mark_pad_footprint() {
        let mut grid = RoutingGrid::new(10, 10, 1.0);
        // half extents: ceil(1.0) = 1 in x, ceil(0.25) = 1 in y
        grid.mark_pad(&pad([5.0, 5.0], [2.0, 0.5]), false);
        for y in 0..10 {
            for x in 0..10 {
                let inside = (4..=6).contains(&x) && (4..=6).contains(&y);
                assert_eq!(grid.is_blocked(GridPoint::new(x, y)), inside, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_mark_pad_clips_to_bounds() {
        let mut grid = RoutingGrid::new(3, 3, 1.0);
        grid.mark_pad(&pad([0.0, 0.0], [4.0, 4.0]), false);
        assert!(grid.is_blocked(GridPoint::new(0, 0)));
        assert!(grid.is_blocked(GridPoint::new(2, 2)));
        // Entirely off the grid: no effect, no panic
        grid.mark_pad(&pad([-50.0, 80.0], [1.0, 1.0]), true);
        assert!(grid.is_blocked(GridPoint::new(1, 1)));
    }

    #[test]
    fn test_mark_restore_is_idempotent() {
        let mut grid = RoutingGrid::new(12, 12, 0.5);
        let a = pad([2.0, 2.0], [1.0, 1.5]);
        let b = pad([2.5, 2.0], [0.6, 0.6]);
        grid.mark_pad(&a, false);
        grid.mark_pad(&b, false);
        let before = costs(&grid);

        grid.mark_pad(&b, true);
        assert_ne!(costs(&grid), before);
        grid.mark_pad(&b, false);
        assert_eq!(costs(&grid), before);
    }

    #[test]
    fn test_terminal_guard_restores_on_drop() {
        let mut grid = RoutingGrid::new(20, 20, 1.0);
        let a = pad([3.0, 3.0], [1.0, 1.0]);
        let b = pad([15.0, 15.0], [1.0, 1.0]);
        grid.mark_pad(&a, false);
        grid.mark_pad(&b, false);
        let before = costs(&grid);

        {
            let guard = grid.open_terminals([&a, &b]);
            assert!(!guard.is_blocked(GridPoint::new(3, 3)));
            assert!(!guard.is_blocked(GridPoint::new(15, 15)));
        }
        assert_eq!(costs(&grid), before);
    }

    #[test]
    fn test_covering_offsets_grid() {
        let mut bbox = BBox::empty();
        bbox.expand_point(100.0, 50.0);
        bbox.expand_point(110.0, 55.0);
        let grid = RoutingGrid::covering(&bbox, 0.5, 2).unwrap();
        assert_eq!(grid.offset(), GridPoint::new(198, 98));
        assert_eq!(grid.width(), 25);
        assert_eq!(grid.height(), 15);
        let p = grid.world_to_grid([100.0, 50.0]);
        assert_eq!(p, GridPoint::new(2, 2));
        assert_eq!(grid.grid_to_world(p), [100.0, 50.0]);
    }

    #[test]
    fn test_covering_empty_box() {
        let grid = RoutingGrid::covering(&BBox::empty(), 0.1, 2).unwrap();
        assert_eq!(grid.width(), 0);
        assert_eq!(grid.height(), 0);
    }

    fn bbox(min: Point2D, max: Point2D) -> BBox {
        let mut bbox = BBox::empty();
        bbox.expand_point(min[0], min[1]);
        bbox.expand_point(max[0], max[1]);
        bbox
    }

    #[test]
    fn test_covering_far_coordinates() {
        assert!(RoutingGrid::covering(&bbox([0.0, 0.0], [1e12, 0.0]), 0.1, 2).is_none());
        assert!(RoutingGrid::covering(&bbox([-1e12, 0.0], [0.0, 1.0]), 0.1, 2).is_none());
        assert!(RoutingGrid::covering(&bbox([0.0, 0.0], [f64::MAX, 1.0]), 0.1, 2).is_none());
    }

    #[test]
    fn test_covering_huge_margin() {
        let board = bbox([10.0, 10.0], [12.0, 12.0]);
        assert!(RoutingGrid::covering(&board, 0.1, 2_147_483_000).is_none());
        assert!(RoutingGrid::covering(&board, 0.1, i32::MAX).is_none());
    }

    #[test]
    fn test_covering_cell_limit() {
        let board = bbox([0.0, 0.0], [100.0, 100.0]);
        assert!(RoutingGrid::covering(&board, 1e-7, 2).is_none());

        let grid = RoutingGrid::covering(&board, 0.5, 2).unwrap();
        assert_eq!(grid.width(), 205);
        assert!((grid.width() as usize) * (grid.height() as usize) <= MAX_CELLS);
    }
}
