use crate::error::SyntaxError;
use crate::parsers::kicad_sexpr::{self, SExpr};
use crate::types::*;
use log::{info, warn};
use std::collections::HashMap;
use std::f64::consts::PI;
use thiserror::Error;

/// Why a single board element was dropped. Never fatal to the load.
#[derive(Error, Debug)]
enum ElementError {
    #[error("missing ({0})")]
    Missing(&'static str),

    #[error("invalid number {value:?} in ({field})")]
    BadNumber { field: &'static str, value: String },

    #[error("polygon has no points")]
    EmptyPolygon,

    #[error("via needs at least two layers")]
    TooFewLayers,
}

/// Element tags whose bodies are consumed whole and never searched for
/// nested elements.
const ELEMENT_TAGS: &[&str] = &["net", "gr_line", "segment", "pad", "via", "zone"];

/// Parse a KiCad .kicad_pcb document from bytes into a Board.
pub fn parse(data: &[u8]) -> Result<Board, SyntaxError> {
    let root = kicad_sexpr::parse(data)?;
    Ok(extract(&root))
}

/// Build a Board from a parsed document.
///
/// Extraction is best-effort: malformed elements are logged and skipped.
/// Nets are collected in a first pass so that elements may reference a net
/// declared later in the document.
pub fn extract(root: &SExpr) -> Board {
    let mut extractor = Extractor::default();
    extractor.collect_nets(root);
    extractor.collect_elements(root, Placement::ORIGIN);

    let board = extractor.board;
    info!(
        "Loaded board: {} segments, {} pads, {} vias, {} zones, {} nets ({} elements skipped)",
        board.segments().len(),
        board.pads().len(),
        board.vias().len(),
        board.zones().len(),
        board.nets().len(),
        extractor.skipped,
    );
    board
}

// ─── Footprint placement ─────────────────────────────────────────────

/// Transform from footprint-local to board coordinates.
#[derive(Debug, Clone, Copy)]
struct Placement {
    origin: Point2D,
    angle: f64,
}

impl Placement {
    const ORIGIN: Placement = Placement {
        origin: [0.0, 0.0],
        angle: 0.0,
    };

    fn of_footprint(node: &SExpr) -> Self {
        let at_node = node.find("at");
        Self {
            origin: [
                at_node.and_then(|n| n.f64_at(0)).unwrap_or(0.0),
                at_node.and_then(|n| n.f64_at(1)).unwrap_or(0.0),
            ],
            angle: at_node.and_then(|n| n.f64_at(2)).unwrap_or(0.0),
        }
    }

    fn apply(&self, local: Point2D) -> Point2D {
        rotate_and_translate(local, self.origin, self.angle)
    }
}

/// Rotate a point by angle degrees (KiCad's clockwise-positive convention)
/// and translate it to `origin`.
fn rotate_and_translate(local: Point2D, origin: Point2D, angle_deg: f64) -> Point2D {
    if angle_deg == 0.0 {
        return [local[0] + origin[0], local[1] + origin[1]];
    }
    let angle_rad = -angle_deg * PI / 180.0;
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();
    let rx = local[0] * cos_a - local[1] * sin_a;
    let ry = local[0] * sin_a + local[1] * cos_a;
    [rx + origin[0], ry + origin[1]]
}

// ─── Field helpers ───────────────────────────────────────────────────

fn number(node: &SExpr, index: usize, field: &'static str) -> Result<f64, ElementError> {
    let text = node.atom_at(index).ok_or(ElementError::Missing(field))?;
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ElementError::BadNumber {
            field,
            value: text.to_string(),
        })
}

fn child<'a>(node: &'a SExpr, tag: &'static str) -> Result<&'a SExpr, ElementError> {
    node.find(tag).ok_or(ElementError::Missing(tag))
}

fn scalar(node: &SExpr, tag: &'static str) -> Result<f64, ElementError> {
    number(child(node, tag)?, 0, tag)
}

fn xy(node: &SExpr, tag: &'static str) -> Result<Point2D, ElementError> {
    let n = child(node, tag)?;
    Ok([number(n, 0, tag)?, number(n, 1, tag)?])
}

fn layer_name(node: &SExpr) -> Result<String, ElementError> {
    node.value("layer")
        .map(str::to_string)
        .ok_or(ElementError::Missing("layer"))
}

/// Line width as `(width w)`, or `(stroke (width w))` in KiCad 7+.
fn stroke_width(node: &SExpr) -> Result<f64, ElementError> {
    match node.find("stroke") {
        Some(stroke) if node.find("width").is_none() => scalar(stroke, "width"),
        _ => scalar(node, "width"),
    }
}

/// The copper layer a pad sits on. Wildcard and front+back layer names such as
/// `*.Cu` report the front layer.
fn pad_layer(layers: &SExpr) -> Option<String> {
    let names: Vec<&str> = layers.children().iter().filter_map(|c| c.as_atom()).collect();
    let name = names
        .iter()
        .find(|n| n.ends_with(".Cu"))
        .or_else(|| names.first())?;
    if name.starts_with('*') || name.starts_with("F&B") {
        Some("F.Cu".to_string())
    } else {
        Some(name.to_string())
    }
}

// ─── Extractor ───────────────────────────────────────────────────────

#[derive(Default)]
struct Extractor {
    board: Board,
    /// The file's own net numbers mapped to board net indices.
    nets_by_id: HashMap<i64, NetIndex>,
    skipped: usize,
}

impl Extractor {
    fn collect_nets(&mut self, node: &SExpr) {
        match node.tag() {
            Some("net") => self.declare_net(node),
            Some(tag) if ELEMENT_TAGS.contains(&tag) => {}
            _ => {
                for child in node.items() {
                    self.collect_nets(child);
                }
            }
        }
    }

    /// `(net <id> "<name>")`. A net list without a name is a reference, not a
    /// declaration, and is ignored here. `(net 0 "")` declares nothing, so
    /// references to its id stay unassigned.
    fn declare_net(&mut self, node: &SExpr) {
        let Some(index) = node.atom_at(1).and_then(|name| self.board.add_net(name)) else {
            return;
        };
        if let Some(id) = node.atom_at(0).and_then(|v| v.parse::<i64>().ok()) {
            self.nets_by_id.insert(id, index);
        }
    }

    fn collect_elements(&mut self, node: &SExpr, placement: Placement) {
        let tag = match node.tag() {
            Some(t) => t,
            None => {
                for child in node.items() {
                    self.collect_elements(child, placement);
                }
                return;
            }
        };

        match tag {
            "net" => {}
            "gr_line" => match parse_gr_line(node) {
                Ok(Some(segment)) => self.board.add_segment(segment),
                Ok(None) => {}
                Err(e) => self.skip(tag, e),
            },
            "segment" => match self.parse_segment(node) {
                Ok(segment) => self.board.add_segment(segment),
                Err(e) => self.skip(tag, e),
            },
            "pad" => match self.parse_pad(node, placement) {
                Ok(pad) => self.board.add_pad(pad),
                Err(e) => self.skip(tag, e),
            },
            "via" => match self.parse_via(node) {
                Ok(via) => self.board.add_via(via),
                Err(e) => self.skip(tag, e),
            },
            "zone" => match self.parse_zone(node) {
                Ok(zone) => {
                    if !self.board.add_zone(zone) {
                        self.skip(tag, ElementError::EmptyPolygon);
                    }
                }
                Err(e) => self.skip(tag, e),
            },
            "footprint" | "module" => {
                let placement = Placement::of_footprint(node);
                for child in node.children() {
                    self.collect_elements(child, placement);
                }
            }
            _ => {
                for child in node.children() {
                    self.collect_elements(child, placement);
                }
            }
        }
    }

    fn skip(&mut self, tag: &str, err: ElementError) {
        warn!("Skipping {tag}: {err}");
        self.skipped += 1;
    }

    /// Resolve `(net <id> ["<name>"])`. A name wins over the number; numbers
    /// go through the declaration table. Unknown numbers and the empty name
    /// leave the element unassigned.
    fn resolve_net(&mut self, net: &SExpr) -> Result<Option<NetIndex>, ElementError> {
        if let Some(name) = net.atom_at(1) {
            return Ok(self.board.add_net(name));
        }
        let id = net.atom_at(0).ok_or(ElementError::Missing("net"))?;
        match id.parse::<i64>() {
            Ok(id) => Ok(self.nets_by_id.get(&id).copied()),
            // Newer files reference nets by name only: (net "GND")
            Err(_) => Ok(self.board.add_net(id)),
        }
    }

    fn parse_segment(&mut self, node: &SExpr) -> Result<Segment, ElementError> {
        let layer = layer_name(node)?;
        let start = xy(node, "start")?;
        let end = xy(node, "end")?;
        let width = scalar(node, "width")?;
        let net = self.resolve_net(child(node, "net")?)?;
        Ok(Segment {
            start,
            end,
            width,
            layer,
            net,
        })
    }

    /// `(pad "<number>" <type> <shape> (at x y [angle]) (size w h) (layers ...) (net ...))`
    fn parse_pad(&mut self, node: &SExpr, placement: Placement) -> Result<Pad, ElementError> {
        let pad_type = node.atom_at(1).ok_or(ElementError::Missing("pad type"))?;

        let at = child(node, "at")?;
        let local = [number(at, 0, "at")?, number(at, 1, "at")?];
        let rotation = match at.atom_at(2) {
            Some(_) => number(at, 2, "at")?,
            None => placement.angle,
        };
        let size = xy(node, "size")?;
        let pos = placement.apply(local);

        if pad_type == "np_thru_hole" {
            return Ok(Pad {
                pos,
                size,
                shape: PadShape::NonPlatedHole,
                rotation,
                layer: String::new(),
                net: None,
            });
        }

        let shape = match node.atom_at(2) {
            Some("circle") => PadShape::Circle,
            Some("oval") => PadShape::Oval,
            _ => PadShape::Rect,
        };
        let layer = pad_layer(child(node, "layers")?).ok_or(ElementError::Missing("layers"))?;
        let net = self.resolve_net(child(node, "net")?)?;

        Ok(Pad {
            pos,
            size,
            shape,
            rotation,
            layer,
            net,
        })
    }

    fn parse_via(&mut self, node: &SExpr) -> Result<Via, ElementError> {
        let pos = xy(node, "at")?;
        let size = scalar(node, "size")?;
        let drill = scalar(node, "drill")?;
        let layers: Vec<&str> = child(node, "layers")?
            .children()
            .iter()
            .filter_map(|c| c.as_atom())
            .collect();
        let [from_layer, to_layer] = match layers.as_slice() {
            [from, .., to] => [from.to_string(), to.to_string()],
            _ => return Err(ElementError::TooFewLayers),
        };
        let net = self.resolve_net(child(node, "net")?)?;
        Ok(Via {
            pos,
            size,
            drill,
            from_layer,
            to_layer,
            net,
        })
    }

    /// `(zone (net 1) (net_name "GND") (layer "F.Cu") ... (polygon (pts (xy x y) ...)))`
    fn parse_zone(&mut self, node: &SExpr) -> Result<Zone, ElementError> {
        let layer = layer_name(node).or_else(|_| {
            node.find("layers")
                .and_then(|l| l.atom_at(0))
                .map(str::to_string)
                .ok_or(ElementError::Missing("layer"))
        })?;

        let net_node = child(node, "net")?;
        let net = match node.value("net_name") {
            Some(name) => self.board.add_net(name),
            None => self.resolve_net(net_node)?,
        };

        let pts = child(child(node, "polygon")?, "pts")?;
        let polygon = pts
            .find_all("xy")
            .into_iter()
            .map(|pt| Ok([number(pt, 0, "xy")?, number(pt, 1, "xy")?]))
            .collect::<Result<Vec<Point2D>, ElementError>>()?;

        Ok(Zone {
            layer,
            net,
            polygon,
        })
    }
}

/// Board outline edges only; graphic lines on other layers are ignored.
fn parse_gr_line(node: &SExpr) -> Result<Option<Segment>, ElementError> {
    let layer = layer_name(node)?;
    if layer != "Edge.Cuts" {
        return Ok(None);
    }
    let start = xy(node, "start")?;
    let end = xy(node, "end")?;
    let width = stroke_width(node)?;
    Ok(Some(Segment {
        start,
        end,
        width,
        layer,
        net: None,
    }))
}
