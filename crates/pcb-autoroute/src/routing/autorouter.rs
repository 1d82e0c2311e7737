use super::astar;
use super::grid::{RoutingGrid, MAX_CELLS};
use super::RoutingSettings;
use crate::types::{round_f64, serialize_points, Board, NetIndex, Point2D};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

fn serialize_rounded<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_f64(*v, 6))
}

/// One net connected by the router.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedNet {
    pub net: NetIndex,
    pub name: String,
    /// Track centerline in board coordinates, start pad to end pad.
    #[serde(serialize_with = "serialize_points")]
    pub path: Vec<Point2D>,
    #[serde(serialize_with = "serialize_rounded")]
    pub length: f64,
}

/// Summary of a routing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingResult {
    pub success: bool,
    #[serde(serialize_with = "serialize_rounded")]
    pub time_ms: f64,
    pub nets_total: usize,
    pub nets_routed: usize,
    #[serde(serialize_with = "serialize_rounded")]
    pub total_track_length: f64,
    /// Always 0: the router does not place vias yet.
    pub via_count: usize,
    pub routes: Vec<RoutedNet>,
}

/// Route each net in `net_ids` between its first two pads.
///
/// Every pad on the board starts out as an obstacle. For each net the two
/// terminal pads are opened, searched between, and closed again before the
/// next net is visited. A net with fewer than two pads counts toward
/// `nets_total` but is never routed.
pub fn route(board: &Board, settings: &RoutingSettings, net_ids: &[NetIndex]) -> RoutingResult {
    let started = Instant::now();
    let deadline = settings
        .time_budget_ms
        .map(|ms| started + Duration::from_millis(ms));
    route_until(board, settings, net_ids, started, || {
        deadline.is_some_and(|d| Instant::now() >= d)
    })
}

/// Routing loop behind [`route`]. `expired` is asked before each net; once it
/// answers `true` no further nets are visited.
fn route_until(
    board: &Board,
    settings: &RoutingSettings,
    net_ids: &[NetIndex],
    started: Instant,
    mut expired: impl FnMut() -> bool,
) -> RoutingResult {
    let mut result = RoutingResult::default();

    if let Err(e) = settings.validate() {
        warn!("Not routing: {e}");
        return unrouted(result, net_ids, started);
    }
    let Some(mut grid) = RoutingGrid::covering(
        &board.bounding_box(),
        settings.resolution,
        settings.margin_cells,
    ) else {
        warn!(
            "Not routing: board does not fit a grid of at most {} cells at {} mm/cell",
            MAX_CELLS, settings.resolution
        );
        return unrouted(result, net_ids, started);
    };

    for pad in board.pads() {
        grid.mark_pad(pad, false);
    }
    info!(
        "Routing grid {}x{} at {} mm/cell",
        grid.width(),
        grid.height(),
        settings.resolution
    );

    for &net in net_ids {
        if expired() {
            warn!(
                "Time budget exhausted after {} of {} nets",
                result.nets_total,
                net_ids.len()
            );
            break;
        }
        result.nets_total += 1;

        let name = board.net_name(net).unwrap_or_default();
        let mut pads = board.pads_in_net(net);
        let (Some(a), Some(b)) = (pads.next(), pads.next()) else {
            debug!("Net {net} ({name:?}) has fewer than two pads, skipping");
            continue;
        };

        let start = grid.world_to_grid(a.pos);
        let end = grid.world_to_grid(b.pos);
        let search = {
            let open = grid.open_terminals([a, b]);
            astar::search(&open, start, end)
        };

        if search.path.is_empty() {
            debug!(
                "Net {net} ({name:?}): no path after expanding {} cells",
                search.expanded
            );
            continue;
        }

        let length = astar::path_length(&search.path) * grid.resolution();
        debug!(
            "Net {net} ({name:?}): {} cells, {length:.3} mm",
            search.path.len()
        );
        result.nets_routed += 1;
        result.total_track_length += length;
        result.routes.push(RoutedNet {
            net,
            name: name.to_string(),
            path: search.path.iter().map(|&p| grid.grid_to_world(p)).collect(),
            length,
        });
    }

    result.success = result.nets_routed == result.nets_total;
    result.time_ms = elapsed_ms(started);
    info!(
        "Routed {}/{} nets, {:.3} mm of track in {:.1} ms",
        result.nets_routed, result.nets_total, result.total_track_length, result.time_ms
    );
    result
}

/// Every requested net counted, none routed.
fn unrouted(mut result: RoutingResult, net_ids: &[NetIndex], started: Instant) -> RoutingResult {
    result.nets_total = net_ids.len();
    result.success = net_ids.is_empty();
    result.time_ms = elapsed_ms(started);
    result
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
