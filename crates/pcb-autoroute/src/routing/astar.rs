//! A* search over an 8-connected routing grid.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;

use super::grid::{GridPoint, RoutingGrid};

/// 8 directions for octilinear routing
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, -1),  // NE
    (0, -1),  // North
    (-1, -1), // NW
    (-1, 0),  // West
    (-1, 1),  // SW
    (0, 1),   // South
    (1, 1),   // SE
];

/// Octile distance: exact path cost between two cells on an empty grid.
#[inline]
pub fn octile_distance(a: GridPoint, b: GridPoint) -> f64 {
    let dx = (a.x - b.x).abs() as f64;
    let dy = (a.y - b.y).abs() as f64;
    dx.max(dy) + (SQRT_2 - 1.0) * dx.min(dy)
}

/// Euclidean length of a path in grid units.
pub fn path_length(path: &[GridPoint]) -> f64 {
    path.windows(2)
        .map(|w| {
            let dx = (w[1].x - w[0].x) as f64;
            let dy = (w[1].y - w[0].y) as f64;
            dx.hypot(dy)
        })
        .sum()
}

/// A* open set entry with reverse ordering for min-heap
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f_score: f64,
    g_score: f64,
    point: GridPoint,
    counter: u64, // Tie-breaker: earlier discoveries pop first
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Outcome of one search.
#[derive(Debug, Clone, Default)]
pub struct Search {
    /// `start..=end`, or empty when no path exists.
    pub path: Vec<GridPoint>,
    /// Cost of `path` (0 when empty).
    pub cost: f64,
    /// Nodes popped and expanded.
    pub expanded: usize,
}

/// Least-cost path from `start` to `end`, or an empty vector.
pub fn find_path(grid: &RoutingGrid, start: GridPoint, end: GridPoint) -> Vec<GridPoint> {
    search(grid, start, end).path
}

/// Run A* and report the path together with search statistics.
///
/// Orthogonal steps cost 1 and diagonal steps cost √2, scaled by the cost of
/// the cell entered. Cells with infinite cost are never entered. Only the
/// start cell is exempt from that check.
pub fn search(grid: &RoutingGrid, start: GridPoint, end: GridPoint) -> Search {
    if !grid.in_bounds(start) || !grid.in_bounds(end) {
        return Search::default();
    }
    if start == end {
        return Search {
            path: vec![start],
            ..Search::default()
        };
    }

    let mut open_set = BinaryHeap::new();
    let mut g_scores: FxHashMap<GridPoint, f64> = FxHashMap::default();
    let mut came_from: FxHashMap<GridPoint, GridPoint> = FxHashMap::default();
    let mut counter: u64 = 0;
    let mut expanded = 0;

    g_scores.insert(start, 0.0);
    open_set.push(OpenEntry {
        f_score: octile_distance(start, end),
        g_score: 0.0,
        point: start,
        counter,
    });

    while let Some(current) = open_set.pop() {
        // A better route to this cell was queued after this entry
        if g_scores
            .get(&current.point)
            .is_some_and(|&best| current.g_score > best)
        {
            continue;
        }

        if current.point == end {
            return Search {
                path: reconstruct_path(&came_from, end),
                cost: current.g_score,
                expanded,
            };
        }
        expanded += 1;

        for (dx, dy) in DIRECTIONS {
            let neighbor = GridPoint::new(current.point.x + dx, current.point.y + dy);
            let cell_cost = match grid.cost(neighbor) {
                Some(c) if c.is_finite() => c as f64,
                _ => continue,
            };
            let step = if dx != 0 && dy != 0 { SQRT_2 } else { 1.0 };
            let tentative = current.g_score + step * cell_cost;

            let improves = g_scores
                .get(&neighbor)
                .map_or(true, |&best| tentative < best);
            if improves {
                came_from.insert(neighbor, current.point);
                g_scores.insert(neighbor, tentative);
                counter += 1;
                open_set.push(OpenEntry {
                    f_score: tentative + octile_distance(neighbor, end),
                    g_score: tentative,
                    point: neighbor,
                    counter,
                });
            }
        }
    }

    Search {
        expanded,
        ..Search::default()
    }
}

fn reconstruct_path(came_from: &FxHashMap<GridPoint, GridPoint>, end: GridPoint) -> Vec<GridPoint> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: i32, y: i32) -> GridPoint {
        GridPoint::new(x, y)
    }

    fn block(grid: &mut RoutingGrid, cells: &[(i32, i32)]) {
        for &(x, y) in cells {
            grid.set_cost(p(x, y), f32::INFINITY);
        }
    }

    fn assert_valid_path(grid: &RoutingGrid, path: &[GridPoint], start: GridPoint, end: GridPoint) {
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&end));
        for w in path.windows(2) {
            let (dx, dy) = ((w[1].x - w[0].x).abs(), (w[1].y - w[0].y).abs());
            assert!(dx <= 1 && dy <= 1 && (dx, dy) != (0, 0), "bad step {:?}", w);
        }
        for cell in &path[1..] {
            assert!(!grid.is_blocked(*cell), "path crosses obstacle at {cell:?}");
        }
    }

    #[test]
    fn test_octile_distance() {
        assert_abs_diff_eq!(octile_distance(p(0, 0), p(3, 0)), 3.0);
        assert_abs_diff_eq!(octile_distance(p(0, 0), p(3, 3)), 3.0 * SQRT_2, epsilon = 1e-12);
        assert_abs_diff_eq!(octile_distance(p(5, 1), p(1, 3)), 4.0 + 2.0 * (SQRT_2 - 1.0));
    }

    #[test]
    fn test_straight_line() {
        let grid = RoutingGrid::new(10, 10, 1.0);
        let result = search(&grid, p(0, 0), p(3, 0));
        assert_eq!(result.path, vec![p(0, 0), p(1, 0), p(2, 0), p(3, 0)]);
        assert_abs_diff_eq!(result.cost, 3.0);
        assert_abs_diff_eq!(path_length(&result.path), 3.0);
    }

    #[test]
    fn test_diagonal() {
        let grid = RoutingGrid::new(10, 10, 1.0);
        let result = search(&grid, p(1, 1), p(4, 4));
        assert_eq!(result.path.len(), 4);
        assert_abs_diff_eq!(result.cost, 3.0 * SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_start_equals_end() {
        let grid = RoutingGrid::new(5, 5, 1.0);
        assert_eq!(find_path(&grid, p(2, 2), p(2, 2)), vec![p(2, 2)]);
    }

    #[test]
    fn test_detour_around_wall() {
        let mut grid = RoutingGrid::new(5, 5, 1.0);
        // Wall at x = 2 with a single gap at y = 4
        block(&mut grid, &[(2, 0), (2, 1), (2, 2), (2, 3)]);

        let result = search(&grid, p(0, 0), p(4, 0));
        assert_valid_path(&grid, &result.path, p(0, 0), p(4, 0));
        assert!(result.path.contains(&p(2, 4)));
        assert_abs_diff_eq!(result.cost, 4.0 + 4.0 * SQRT_2, epsilon = 1e-9);
        assert_abs_diff_eq!(path_length(&result.path), result.cost, epsilon = 1e-9);
    }

    #[test]
    fn test_no_path_when_enclosed() {
        let mut grid = RoutingGrid::new(7, 7, 1.0);
        block(
            &mut grid,
            &[(2, 2), (3, 2), (4, 2), (2, 3), (4, 3), (2, 4), (3, 4), (4, 4)],
        );
        let result = search(&grid, p(0, 0), p(3, 3));
        assert!(result.path.is_empty());
        assert!(result.expanded > 0);
    }

    #[test]
    fn test_blocked_end_is_unreachable() {
        let mut grid = RoutingGrid::new(5, 5, 1.0);
        block(&mut grid, &[(4, 4)]);
        assert!(find_path(&grid, p(0, 0), p(4, 4)).is_empty());
    }

    #[test]
    fn test_out_of_bounds_endpoints() {
        let grid = RoutingGrid::new(5, 5, 1.0);
        assert!(find_path(&grid, p(-1, 0), p(3, 3)).is_empty());
        assert!(find_path(&grid, p(0, 0), p(5, 3)).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let mut grid = RoutingGrid::new(30, 30, 1.0);
        block(&mut grid, &[(10, 5), (10, 6), (10, 7), (11, 7), (12, 7)]);
        let first = find_path(&grid, p(2, 2), p(25, 20));
        for _ in 0..5 {
            assert_eq!(find_path(&grid, p(2, 2), p(25, 20)), first);
        }
    }

    #[test]
    fn test_matches_octile_on_open_grid() {
        let grid = RoutingGrid::new(40, 40, 1.0);
        let (start, end) = (p(3, 7), p(31, 18));
        let result = search(&grid, start, end);
        assert_valid_path(&grid, &result.path, start, end);
        assert_abs_diff_eq!(result.cost, octile_distance(start, end), epsilon = 1e-9);
    }
}
