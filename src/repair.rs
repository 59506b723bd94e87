//! Self-intersection repair of grown rings.
//!
//! A grown ring is noded at its self-intersections and split into simple
//! loops. Loops wound like the source ring (clockwise) are kept as shells.
//! Loops wound the other way are either swallowtails at concave corners,
//! which lie within the growth distance of the source and are dropped, or
//! pockets the grown outline closes around, which lie farther away and are
//! cut out as holes. Loops that are still not simple are repaired again,
//! up to a bounded depth.

use std::collections::HashMap;

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon, Winding};
use tracing::trace;

use crate::error::{CsfdError, Result};
use crate::geodesic::GeodesicSolver;
use crate::geometry::{close_ring, interior_point, nearest_on_ring, union_all};

/// Coordinates closer than this (degrees) are merged while cleaning rings.
const MERGE_EPSILON: f64 = 1e-12;
/// Loops with a smaller planar area (degrees²) are noise from noding.
const MIN_LOOP_AREA: f64 = 1e-18;

/// Inputs shared by every repair call of one grown ring.
pub struct RingRepair<'a> {
    pub solver: &'a GeodesicSolver,
    /// Ring the candidate was grown from, local frame.
    pub source: &'a LineString<f64>,
    /// Growth distance in metres.
    pub distance: f64,
    pub max_depth: usize,
    pub feature: &'a str,
}

impl RingRepair<'_> {
    /// Turns a possibly self-intersecting grown ring into valid polygons.
    pub fn repair(&self, candidate: &[Coord<f64>]) -> Result<MultiPolygon<f64>> {
        self.repair_at(candidate, 0)
    }

    fn repair_at(&self, candidate: &[Coord<f64>], depth: usize) -> Result<MultiPolygon<f64>> {
        let ring = clean_ring(candidate);
        if ring.len() < 4 {
            return Ok(MultiPolygon::new(vec![]));
        }
        let crossings = find_crossings(&ring);
        if crossings.is_empty() {
            return self.classify_loop(ring);
        }
        if depth >= self.max_depth {
            return Err(CsfdError::UngeometrizableSelfIntersection {
                feature: self.feature.to_string(),
                depth,
            });
        }

        let loops = split_loops(&ring, &crossings);
        trace!(
            feature = self.feature,
            depth,
            crossings = crossings.len(),
            loops = loops.len(),
            "splitting grown ring"
        );

        let mut shells = Vec::new();
        let mut holes = Vec::new();
        for lp in loops {
            let lp = clean_ring(&lp);
            if lp.len() < 4 {
                continue;
            }
            if !find_crossings(&lp).is_empty() {
                shells.push(self.repair_at(&lp, depth + 1)?);
                continue;
            }
            let line = LineString::new(lp);
            if Polygon::new(line.clone(), vec![]).unsigned_area() < MIN_LOOP_AREA {
                continue;
            }
            if line.is_cw() {
                shells.push(MultiPolygon::new(vec![Polygon::new(line, vec![])]));
            } else if self.is_pocket(&line)? {
                holes.push(MultiPolygon::new(vec![Polygon::new(line, vec![])]));
            }
        }

        let shells = union_all(shells);
        if holes.is_empty() {
            return Ok(shells);
        }
        Ok(shells.difference(&union_all(holes)))
    }

    fn classify_loop(&self, ring: Vec<Coord<f64>>) -> Result<MultiPolygon<f64>> {
        let line = LineString::new(ring);
        if line.is_cw() {
            Ok(MultiPolygon::new(vec![Polygon::new(line, vec![])]))
        } else {
            // an inverted outline encloses nothing
            Ok(MultiPolygon::new(vec![]))
        }
    }

    /// A counter-clockwise loop is a genuine hole if its inside lies farther
    /// from the source ring than the growth distance.
    fn is_pocket(&self, line: &LineString<f64>) -> Result<bool> {
        let Some(inside) = interior_point(line) else {
            return Ok(false);
        };
        let Some(nearest) = nearest_on_ring(self.source, inside) else {
            return Ok(false);
        };
        let distance = self
            .solver
            .distance(inside.y, inside.x, nearest.y, nearest.x)?;
        Ok(distance > self.distance)
    }
}

/// Drops repeated coordinates and closes the ring.
fn clean_ring(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if !(c.x.is_finite() && c.y.is_finite()) {
            continue;
        }
        match out.last() {
            Some(last) if near(*last, *c) => {}
            _ => out.push(*c),
        }
    }
    while out.len() > 1 && near(out[0], out[out.len() - 1]) {
        out.pop();
    }
    close_ring(out).0
}

#[inline]
fn near(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() <= MERGE_EPSILON && (a.y - b.y).abs() <= MERGE_EPSILON
}

/// Intersection of two non-adjacent segments, with its position along each.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    first: usize,
    t: f64,
    second: usize,
    u: f64,
    at: Coord<f64>,
}

/// All crossings between non-adjacent segments of a closed ring.
///
/// Segments are swept in order of their smallest x. A touch at a vertex is
/// reported once, on the segment starting at that vertex.
fn find_crossings(ring: &[Coord<f64>]) -> Vec<Crossing> {
    let n = ring.len().saturating_sub(1);
    if n < 4 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..n).collect();
    let min_x = |i: usize| ring[i].x.min(ring[i + 1].x);
    order.sort_by(|&a, &b| min_x(a).total_cmp(&min_x(b)));

    let mut crossings = Vec::new();
    for (k, &i) in order.iter().enumerate() {
        let (a0, a1) = (ring[i], ring[i + 1]);
        let a_max_x = a0.x.max(a1.x);
        let (a_min_y, a_max_y) = (a0.y.min(a1.y), a0.y.max(a1.y));
        for &j in &order[k + 1..] {
            if min_x(j) > a_max_x {
                break;
            }
            if adjacent(i, j, n) {
                continue;
            }
            let (b0, b1) = (ring[j], ring[j + 1]);
            if b0.y.max(b1.y) < a_min_y || b0.y.min(b1.y) > a_max_y {
                continue;
            }
            if let Some((t, u)) = segment_intersection(a0, a1, b0, b1) {
                let at = Coord {
                    x: a0.x + t * (a1.x - a0.x),
                    y: a0.y + t * (a1.y - a0.y),
                };
                let (first, t, second, u) = if i < j { (i, t, j, u) } else { (j, u, i, t) };
                crossings.push(Crossing {
                    first,
                    t,
                    second,
                    u,
                    at,
                });
            }
        }
    }
    crossings
}

#[inline]
fn adjacent(i: usize, j: usize, n: usize) -> bool {
    i.abs_diff(j) == 1 || (i == 0 && j == n - 1) || (j == 0 && i == n - 1)
}

/// Parameters `(t, u)` in `[0, 1)` of the intersection of `a0a1` and `b0b1`.
/// Parallel segments never intersect here.
fn segment_intersection(
    a0: Coord<f64>,
    a1: Coord<f64>,
    b0: Coord<f64>,
    b1: Coord<f64>,
) -> Option<(f64, f64)> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = r.x * s.y - r.y * s.x;
    let scale = (r.x.abs() + r.y.abs()) * (s.x.abs() + s.y.abs());
    if denom.abs() <= scale * 1e-14 {
        return None;
    }
    let q = b0 - a0;
    let t = (q.x * s.y - q.y * s.x) / denom;
    let u = (q.x * r.y - q.y * r.x) / denom;
    if (0.0..1.0).contains(&t) && (0.0..1.0).contains(&u) {
        Some((t, u))
    } else {
        None
    }
}

/// Splits a noded ring into loops by walking it with a stack and closing a
/// loop whenever a crossing node is met for the second time.
fn split_loops(ring: &[Coord<f64>], crossings: &[Crossing]) -> Vec<Vec<Coord<f64>>> {
    let n = ring.len() - 1;
    let mut on_segment: Vec<Vec<(f64, usize)>> = vec![Vec::new(); n];
    for (id, c) in crossings.iter().enumerate() {
        on_segment[c.first].push((c.t, id));
        on_segment[c.second].push((c.u, id));
    }

    let mut stack: Vec<(Coord<f64>, Option<usize>)> = Vec::with_capacity(ring.len() + 2 * crossings.len());
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut loops = Vec::new();

    for (i, nodes) in on_segment.iter_mut().enumerate() {
        stack.push((ring[i], None));
        nodes.sort_by(|a, b| a.0.total_cmp(&b.0));
        for &(_, id) in nodes.iter() {
            let at = crossings[id].at;
            match position.get(&id).copied() {
                Some(start) => {
                    let mut lp: Vec<Coord<f64>> = Vec::with_capacity(stack.len() - start + 1);
                    for (coord, node) in stack.drain(start + 1..) {
                        if let Some(node) = node {
                            position.remove(&node);
                        }
                        lp.push(coord);
                    }
                    lp.insert(0, at);
                    lp.push(at);
                    loops.push(lp);
                }
                None => {
                    position.insert(id, stack.len());
                    stack.push((at, Some(id)));
                }
            }
        }
    }
    let mut last: Vec<Coord<f64>> = stack.into_iter().map(|(c, _)| c).collect();
    last.push(ring[0]);
    loops.push(last);
    loops
}
