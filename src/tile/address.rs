//! Tile addressing and slippy-map projection.
//!
//! A [`TileAddress`] identifies one tile of the standard OSM/Web Mercator tile
//! pyramid by `(zoom, x, y)`. It is the memory cache key, the disk path
//! fragment and the URL path fragment, so equal triples always resolve to the
//! same cache slot and the same file.
//!
//! # Projection
//!
//! ```text
//! x = floor((lon + 180) / 360 * 2^zoom)
//! y = floor((1 - ln(tan(lat) + sec(lat)) / π) / 2 * 2^zoom)
//! ```
//!
//! The inverse functions [`tile_to_lon`] and [`tile_to_lat`] return the
//! north-west corner of a tile, which is what the renderer needs to place it
//! on screen.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt;

use serde::Serialize;

use crate::error::CoordError;

/// Highest supported zoom level.
pub const MAX_ZOOM: u8 = 24;

/// Latitude limit of the Web Mercator projection in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// =============================================================================
// Tile Address
// =============================================================================

/// Immutable `(zoom, x, y)` tile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileAddress {
    /// Zoom level (0 = whole world in one tile)
    pub zoom: u8,

    /// Column, 0 at the antimeridian, growing eastwards
    pub x: u32,

    /// Row, 0 at the north edge, growing southwards
    pub y: u32,
}

impl TileAddress {
    /// Create an address. No range checking is done here; see [`Self::is_valid`].
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// The `/{zoom}/{x}/{y}` path fragment shared by the disk and URL layouts.
    pub fn key(&self) -> String {
        format!("/{}/{}/{}", self.zoom, self.x, self.y)
    }

    /// Whether this address exists in the tile grid.
    pub fn is_valid(&self) -> bool {
        if self.zoom > MAX_ZOOM {
            return false;
        }
        let n = tiles_per_side(self.zoom);
        u64::from(self.x) < n && u64::from(self.y) < n
    }

    /// Tile containing the given geographic position.
    ///
    /// Positions on the east edge (`lon == 180`) or the south limit map to the
    /// last column/row instead of falling off the grid.
    pub fn containing(lat: f64, lon: f64, zoom: u8) -> Result<Self, CoordError> {
        if !lat.is_finite() || !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(CoordError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(CoordError::InvalidLongitude(lon));
        }
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom {
                zoom,
                max: MAX_ZOOM,
            });
        }

        let n = tiles_per_side(zoom) as f64;
        let lat_rad = lat.to_radians();

        let x = ((lon + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

        let last = n - 1.0;
        Ok(Self {
            zoom,
            x: x.clamp(0.0, last) as u32,
            y: y.clamp(0.0, last) as u32,
        })
    }

    /// Geographic bounding box of this tile.
    pub fn bounds(&self) -> GeoBounds {
        GeoBounds {
            north: tile_to_lat(self.y, self.zoom),
            south: tile_to_lat(self.y.saturating_add(1), self.zoom),
            west: tile_to_lon(self.x, self.zoom),
            east: tile_to_lon(self.x.saturating_add(1), self.zoom),
        }
    }

    /// Neighbouring address, `None` when it falls outside the grid.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<Self> {
        let x = u32::try_from(i64::from(self.x) + dx).ok()?;
        let y = u32::try_from(i64::from(self.y) + dy).ok()?;
        let neighbour = Self::new(self.zoom, x, y);
        neighbour.is_valid().then_some(neighbour)
    }

    /// The 3×3 block around this tile: the centre first, then the valid
    /// neighbours row by row.
    pub fn neighborhood(&self) -> Vec<Self> {
        let mut tiles = Vec::with_capacity(9);
        if self.is_valid() {
            tiles.push(*self);
        }
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if let Some(t) = self.offset(dx, dy) {
                    tiles.push(t);
                }
            }
        }
        tiles
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.zoom, self.x, self.y)
    }
}

// =============================================================================
// Geographic Bounds
// =============================================================================

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

// =============================================================================
// Projection Helpers
// =============================================================================

/// Number of tiles along one side of the grid at `zoom`.
#[inline]
pub fn tiles_per_side(zoom: u8) -> u64 {
    1u64 << zoom.min(63)
}

/// Longitude of the west edge of column `x`.
pub fn tile_to_lon(x: u32, zoom: u8) -> f64 {
    f64::from(x) / tiles_per_side(zoom) as f64 * 360.0 - 180.0
}

/// Latitude of the north edge of row `y`.
pub fn tile_to_lat(y: u32, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * f64::from(y) / tiles_per_side(zoom) as f64;
    n.sinh().atan().to_degrees()
}

/// Number of tiles [`tiles_in_bounds`] would return, without enumerating them.
pub fn tile_count_in_bounds(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    zooms: &[u8],
) -> Result<u64, CoordError> {
    let mut seen = BTreeSet::new();
    let mut count = 0u64;
    for &zoom in zooms {
        if !seen.insert(zoom) {
            continue;
        }
        let (top_left, bottom_right) = corner_tiles(west, south, east, north, zoom)?;
        let columns = u64::from(bottom_right.x - top_left.x) + 1;
        let rows = u64::from(bottom_right.y - top_left.y) + 1;
        count = count.saturating_add(columns * rows);
    }
    Ok(count)
}

/// Every tile intersecting the box, across all requested zoom levels.
///
/// The set is ordered by zoom, then column, then row.
pub fn tiles_in_bounds(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    zooms: &[u8],
) -> Result<BTreeSet<TileAddress>, CoordError> {
    let mut tiles = BTreeSet::new();
    for &zoom in zooms {
        let (top_left, bottom_right) = corner_tiles(west, south, east, north, zoom)?;

        for x in top_left.x..=bottom_right.x {
            for y in top_left.y..=bottom_right.y {
                tiles.insert(TileAddress::new(zoom, x, y));
            }
        }
    }
    Ok(tiles)
}

fn corner_tiles(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    zoom: u8,
) -> Result<(TileAddress, TileAddress), CoordError> {
    if !(west <= east && south <= north) {
        return Err(CoordError::InvalidBounds {
            west,
            south,
            east,
            north,
        });
    }
    let top_left = TileAddress::containing(north, west, zoom)?;
    let bottom_right = TileAddress::containing(south, east, zoom)?;
    Ok((top_left, bottom_right))
}
