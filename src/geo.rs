//! Tile coordinates, viewport bounds, and the Web Mercator <-> WGS84 projection.
//!
//! The projection math is inlined rather than pulled in from a general
//! reprojection crate: the core only ever needs the one EPSG:3857/EPSG:4326
//! pair, and a closed-form transform avoids both the dependency and a
//! network round trip to resolve authority codes.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileCoreError};

/// WGS84 equatorial radius, in meters. Also the semi-axis of the
/// spherical Web Mercator projection used by slippy tiles.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Web Mercator is undefined past this latitude; tile math clamps to it.
pub const MAX_LATITUDE: f64 = 85.0511287798;

const S: f64 = PI * EARTH_RADIUS;

/// Normalized EPSG:3857 projection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDef {
    pub name: &'static str,
    pub unit: &'static str,
    pub semi_major_axis: f64,
    pub semi_minor_axis: f64,
    pub origin: (f64, f64),
    pub scale: f64,
}

impl Default for ProjectionDef {
    fn default() -> Self {
        Self {
            name: "merc",
            unit: "meter",
            semi_major_axis: EARTH_RADIUS,
            semi_minor_axis: EARTH_RADIUS,
            origin: (0.0, 0.0),
            scale: 1.0,
        }
    }
}

/// Converts Web Mercator meters to WGS84 degrees.
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lng = x / S * 180.0;
    let lat = (y / S * PI).exp().atan() * 360.0 / PI - 90.0;
    (lng, lat)
}

/// Converts WGS84 degrees to Web Mercator meters.
pub fn wgs84_to_web_mercator(lng: f64, lat: f64) -> (f64, f64) {
    let x = lng * S / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() * S / 180.0 * (180.0 / PI);
    (x, y)
}

type Converter = fn(f64, f64) -> (f64, f64);

/// A forward/inverse pair of coordinate transforms between two EPSG codes.
pub struct ProjectionConverter {
    pub forward: Converter,
    pub inverse: Converter,
}

fn extract_epsg_code(spec: &str) -> Option<u32> {
    spec.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()
}

/// Builds a converter between two EPSG-like identifiers.
///
/// Accepts plain codes (`"3857"`) or `"EPSG:3857"`-style strings. Only the
/// `(3857, 4326)` pair and identity conversions are supported.
pub fn create_converter(src: &str, tgt: &str) -> Result<ProjectionConverter> {
    let from = extract_epsg_code(src)
        .ok_or_else(|| TileCoreError::UnsupportedProjection { from: src.into(), to: tgt.into() })?;
    let to = extract_epsg_code(tgt)
        .ok_or_else(|| TileCoreError::UnsupportedProjection { from: src.into(), to: tgt.into() })?;

    match (from, to) {
        (3857, 4326) => Ok(ProjectionConverter { forward: web_mercator_to_wgs84, inverse: wgs84_to_web_mercator }),
        (4326, 3857) => Ok(ProjectionConverter { forward: wgs84_to_web_mercator, inverse: web_mercator_to_wgs84 }),
        (a, b) if a == b => Ok(ProjectionConverter { forward: |x, y| (x, y), inverse: |x, y| (x, y) }),
        _ => Err(TileCoreError::UnsupportedProjection { from: src.into(), to: tgt.into() }),
    }
}

/// A viewport's visible extent in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl ViewportBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, east, north, south }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.west + self.east) / 2.0, (self.north + self.south) / 2.0)
    }
}

/// A slippy-map tile coordinate, `0 <= x,y < 2^z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// `lng/lat -> (z, x, y)` via the standard slippy-map formula. Does not
    /// clamp `lat` to the Web Mercator validity range or validate the
    /// result against `2^z`; callers that need either check `is_valid()` or
    /// clamp `lat` themselves before calling this.
    pub fn from_lng_lat(lng: f64, lat: f64, z: u8) -> Self {
        let n = 2_f64.powi(z as i32);
        let lat_rad = lat.to_radians();
        let x = ((lng + 180.0) / 360.0 * n).floor() as u32;
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor() as u32;
        Self::new(z, x, y)
    }

    /// Canonical `"z/x/y"` wire form.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Parses a canonical `"z/x/y"` tile key. Returns `None` on any
    /// malformed input rather than an error.
    pub fn parse_key(key: &str) -> Option<Self> {
        let mut parts = key.split('/');
        let z: u8 = parts.next()?.parse().ok()?;
        let x: u32 = parts.next()?.parse().ok()?;
        let y: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(z, x, y))
    }

    pub fn is_valid(&self) -> bool {
        let max = 2_u32.pow(self.z as u32);
        self.x < max && self.y < max
    }

    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.z - 1, self.x >> 1, self.y >> 1))
        }
    }

    /// Walks ancestors up to (and including) `min_zoom`, nearest first.
    pub fn parents(&self, min_zoom: Option<u8>) -> Vec<TileCoord> {
        let floor = min_zoom.unwrap_or(0);
        let mut out = Vec::new();
        let mut cur = *self;
        while cur.z > floor {
            match cur.parent() {
                Some(p) => {
                    out.push(p);
                    cur = p;
                }
                None => break,
            }
        }
        out
    }

    pub fn children(&self) -> [TileCoord; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            TileCoord::new(z, x, y),
            TileCoord::new(z, x + 1, y),
            TileCoord::new(z, x, y + 1),
            TileCoord::new(z, x + 1, y + 1),
        ]
    }
}

/// Placement of `child` within `parent`'s unit square, in parent-grid units
/// at the child's resolution. `None` if `parent` is not an ancestor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn child_region_in_parent(child: TileCoord, parent: TileCoord) -> Option<ChildRegion> {
    if parent.z >= child.z {
        return None;
    }
    let shift = child.z - parent.z;
    let side = 1u32 << shift;
    if (child.x >> shift, child.y >> shift) != (parent.x, parent.y) {
        return None;
    }
    let mask = side - 1;
    Some(ChildRegion { x: child.x & mask, y: child.y & mask, width: side, height: side })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_round_trip() {
        let (lng, lat) = (-73.9857, 40.7484);
        let (x, y) = wgs84_to_web_mercator(lng, lat);
        let (lng2, lat2) = web_mercator_to_wgs84(x, y);
        assert!((lng - lng2).abs() < 1e-7);
        assert!((lat - lat2).abs() < 1e-7);
    }

    #[test]
    fn converter_identity() {
        let conv = create_converter("EPSG:4326", "4326").unwrap();
        assert_eq!((conv.forward)(1.0, 2.0), (1.0, 2.0));
    }

    #[test]
    fn converter_unsupported_pair() {
        assert!(create_converter("3857", "2154").is_err());
    }

    #[test]
    fn tile_key_round_trip() {
        let coord = TileCoord::new(5, 12, 9);
        assert_eq!(TileCoord::parse_key(&coord.key()), Some(coord));
    }

    #[test]
    fn tile_key_malformed() {
        assert_eq!(TileCoord::parse_key("not-a-key"), None);
        assert_eq!(TileCoord::parse_key("5/12"), None);
        assert_eq!(TileCoord::parse_key("5/12/9/1"), None);
    }

    #[test]
    fn parent_and_children() {
        let coord = TileCoord::new(5, 12, 9);
        let parent = coord.parent().unwrap();
        assert_eq!(parent, TileCoord::new(4, 6, 4));
        assert!(coord.children().contains(&TileCoord::new(6, 24, 18)));
    }

    #[test]
    fn child_region_placement() {
        let parent = TileCoord::new(4, 6, 4);
        let child = TileCoord::new(6, 24, 18);
        let region = child_region_in_parent(child, parent).unwrap();
        assert_eq!(region.width, 4);
        assert_eq!(region.height, 4);
    }

    #[test]
    fn child_region_non_ancestor() {
        let parent = TileCoord::new(4, 6, 4);
        let unrelated = TileCoord::new(6, 0, 0);
        assert_eq!(child_region_in_parent(unrelated, parent), None);
    }
}
