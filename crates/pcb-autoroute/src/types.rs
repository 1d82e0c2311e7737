use log::warn;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// Round a float to N decimal places.
pub fn round_f64(v: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (v * factor).round() / factor
}

/// Wrapper that rounds f64 to 6 decimal places on serialization.
fn serialize_f64_rounded<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_f64(*v, 6))
}

fn serialize_point<S: Serializer>(p: &Point2D, s: S) -> Result<S::Ok, S::Error> {
    let rounded = [round_f64(p[0], 6), round_f64(p[1], 6)];
    rounded.serialize(s)
}

#[allow(clippy::ptr_arg)]
pub(crate) fn serialize_points<S: Serializer>(
    points: &Vec<Point2D>,
    s: S,
) -> Result<S::Ok, S::Error> {
    let rounded: Vec<Point2D> = points
        .iter()
        .map(|p| [round_f64(p[0], 6), round_f64(p[1], 6)])
        .collect();
    rounded.serialize(s)
}

/// Board coordinates in millimetres, `[x, y]`.
pub type Point2D = [f64; 2];

/// Position of a net in [`Board::nets`]. Entities use `Option<NetIndex>`,
/// where `None` means "not assigned to any net".
pub type NetIndex = usize;

// ─── Bounding Box ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub minx: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub miny: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub maxx: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub maxy: f64,
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            minx: f64::INFINITY,
            miny: f64::INFINITY,
            maxx: f64::NEG_INFINITY,
            maxy: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.minx > self.maxx || self.miny > self.maxy
    }

    pub fn expand_point(&mut self, x: f64, y: f64) {
        self.minx = self.minx.min(x);
        self.miny = self.miny.min(y);
        self.maxx = self.maxx.max(x);
        self.maxy = self.maxy.max(y);
    }

    /// Expand by an axis-aligned box given by its center and full size.
    pub fn expand_centered(&mut self, center: Point2D, size: Point2D) {
        self.expand_point(center[0] - size[0] / 2.0, center[1] - size[1] / 2.0);
        self.expand_point(center[0] + size[0] / 2.0, center[1] + size[1] / 2.0);
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.maxx - self.minx
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.maxy - self.miny
        }
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Board entities ──────────────────────────────────────────────────

/// A straight copper run, or a board outline edge on `Edge.Cuts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    #[serde(serialize_with = "serialize_point")]
    pub start: Point2D,
    #[serde(serialize_with = "serialize_point")]
    pub end: Point2D,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub width: f64,
    pub layer: String,
    pub net: Option<NetIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PadShape {
    Rect,
    Circle,
    Oval,
    NonPlatedHole,
}

impl PadShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PadShape::Rect => "rect",
            PadShape::Circle => "circle",
            PadShape::Oval => "oval",
            PadShape::NonPlatedHole => "np_thru_hole",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pad {
    /// Absolute center.
    #[serde(serialize_with = "serialize_point")]
    pub pos: Point2D,
    /// Full width and height.
    #[serde(serialize_with = "serialize_point")]
    pub size: Point2D,
    pub shape: PadShape,
    /// Degrees; informational only, rasterization treats pads as axis-aligned.
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    /// Empty for non-plated holes.
    pub layer: String,
    pub net: Option<NetIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Via {
    #[serde(serialize_with = "serialize_point")]
    pub pos: Point2D,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub size: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub drill: f64,
    pub from_layer: String,
    pub to_layer: String,
    pub net: Option<NetIndex>,
}

/// A filled copper polygon. The ring is implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub layer: String,
    pub net: Option<NetIndex>,
    #[serde(serialize_with = "serialize_points")]
    pub polygon: Vec<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Net {
    pub index: NetIndex,
    pub name: String,
}

// ─── Board ───────────────────────────────────────────────────────────

/// In-memory board model.
///
/// Entity collections only grow while loading; [`Board::clear`] resets all of
/// them together with the bounding box. Every net reference held by an entity
/// points at a registered [`Net`] or is `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Board {
    segments: Vec<Segment>,
    pads: Vec<Pad>,
    vias: Vec<Via>,
    zones: Vec<Zone>,
    nets: Vec<Net>,
    bounding_box: BBox,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.pads.clear();
        self.vias.clear();
        self.zones.clear();
        self.nets.clear();
        self.bounding_box = BBox::empty();
    }

    /// Register a net by name and return its index. Registering a name that
    /// is already known returns the existing index. The empty name is the
    /// "no net" placeholder and is never registered.
    pub fn add_net(&mut self, name: &str) -> Option<NetIndex> {
        if name.is_empty() {
            return None;
        }
        if let Some(index) = self.net_index_of(name) {
            return Some(index);
        }
        let index = self.nets.len();
        self.nets.push(Net {
            index,
            name: name.to_string(),
        });
        Some(index)
    }

    fn checked_net(&self, net: Option<NetIndex>, what: &str) -> Option<NetIndex> {
        match net {
            Some(index) if index >= self.nets.len() => {
                warn!("{what} references unregistered net {index}, leaving it unassigned");
                None
            }
            other => other,
        }
    }

    pub fn add_segment(&mut self, mut segment: Segment) {
        segment.net = self.checked_net(segment.net, "segment");
        self.bounding_box
            .expand_point(segment.start[0], segment.start[1]);
        self.bounding_box.expand_point(segment.end[0], segment.end[1]);
        self.segments.push(segment);
    }

    pub fn add_pad(&mut self, mut pad: Pad) {
        pad.net = self.checked_net(pad.net, "pad");
        self.bounding_box.expand_centered(pad.pos, pad.size);
        self.pads.push(pad);
    }

    pub fn add_via(&mut self, mut via: Via) {
        via.net = self.checked_net(via.net, "via");
        self.bounding_box
            .expand_centered(via.pos, [via.size, via.size]);
        self.vias.push(via);
    }

    /// Add a zone. Zones without polygon points are rejected and `false` is
    /// returned.
    pub fn add_zone(&mut self, mut zone: Zone) -> bool {
        if zone.polygon.is_empty() {
            return false;
        }
        zone.net = self.checked_net(zone.net, "zone");
        for pt in &zone.polygon {
            self.bounding_box.expand_point(pt[0], pt[1]);
        }
        self.zones.push(zone);
        true
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn vias(&self) -> &[Via] {
        &self.vias
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Nets in registration order.
    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn net_index_of(&self, name: &str) -> Option<NetIndex> {
        self.nets.iter().position(|n| n.name == name)
    }

    pub fn net_name(&self, index: NetIndex) -> Option<&str> {
        self.nets.get(index).map(|n| n.name.as_str())
    }

    /// Pads belonging to `net`, in load order.
    pub fn pads_in_net(&self, net: NetIndex) -> impl Iterator<Item = &Pad> {
        self.pads.iter().filter(move |p| p.net == Some(net))
    }

    /// Union of all loaded geometry; empty until something is added.
    pub fn bounding_box(&self) -> BBox {
        self.bounding_box
    }

    /// Sorted, de-duplicated layer names used by the board's geometry.
    /// Non-plated holes report as `Hole`, and any via contributes `Via`.
    pub fn unique_layers(&self) -> Vec<String> {
        let mut layers: BTreeSet<&str> = BTreeSet::new();
        layers.extend(self.segments.iter().map(|s| s.layer.as_str()));
        layers.extend(self.pads.iter().map(|p| match p.shape {
            PadShape::NonPlatedHole => "Hole",
            _ => p.layer.as_str(),
        }));
        if !self.vias.is_empty() {
            layers.insert("Via");
        }
        layers.extend(self.zones.iter().map(|z| z.layer.as_str()));
        layers.into_iter().map(str::to_string).collect()
    }
}
