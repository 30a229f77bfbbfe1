//! Utility functions for coordinate conversions and grid addressing

use geo::Point;

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;
pub const EARTH_SIZE_METERS: f64 = EARTH_MERCATOR_MAX - EARTH_MERCATOR_MIN;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Side of one map tile in screen pixels at every zoom level
pub const TILE_SIZE_PIXELS: f64 = 256.0;

/// Positions are snapped to this many units per degree before projection
pub const MICRODEGREES_PER_DEGREE: f64 = 1_000_000.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Build a position from latitude and longitude in degrees.
///
/// Positions follow the `geo` convention: x is longitude, y is latitude.
#[inline(always)]
pub fn lat_lon(lat: f64, lon: f64) -> Point<f64> {
    Point::new(lon, lat)
}

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// # Arguments
/// * `lat` - Latitude in degrees (clamped to -85.05 to 85.05)
/// * `lon` - Longitude in degrees (-180 to 180)
///
/// # Returns
/// A `Point<f64>` with x (easting) and y (northing) in meters
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;

    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Check that a position is a finite WGS84 coordinate in range
#[inline]
pub fn is_valid_position(position: &Point<f64>) -> bool {
    let (lat, lon) = (position.y(), position.x());
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Snap a coordinate in degrees to integer microdegrees.
///
/// Two inputs that differ only by float noise below a microdegree map to the same value,
/// which keeps grid assignment stable at cell boundaries.
#[inline(always)]
pub fn quantize_degrees(degrees: f64) -> i64 {
    (degrees * MICRODEGREES_PER_DEGREE).round() as i64
}

/// Number of grid cells along one side of the world at `zoom`
#[inline]
pub fn cells_per_side(zoom: f64, grid_size: u32) -> f64 {
    TILE_SIZE_PIXELS * zoom.exp2() / grid_size as f64
}

/// Side of one grid cell in Web Mercator meters at `zoom`
#[inline]
pub fn cell_size_meters(zoom: f64, grid_size: u32) -> f64 {
    EARTH_SIZE_METERS / cells_per_side(zoom, grid_size)
}

/// Map a position to its `(cell_x, cell_y)` grid cell at `zoom`.
///
/// The position is quantized to microdegrees, projected to Web Mercator and floor-divided by
/// the cell size, so the lower/left cell owns shared edges. Longitude 180 is the same meridian
/// as -180 and lands in the first column; the northern edge belongs to the last row.
pub fn grid_cell(position: &Point<f64>, zoom: f64, grid_size: u32) -> (i64, i64) {
    let lat = quantize_degrees(position.y()) as f64 / MICRODEGREES_PER_DEGREE;
    let mut lon = quantize_degrees(position.x()) as f64 / MICRODEGREES_PER_DEGREE;
    if lon >= 180.0 {
        lon -= 360.0;
    }
    let mercator = wgs84_to_mercator(lat, lon);
    let cell_size = cell_size_meters(zoom, grid_size);
    let last = cells_per_side(zoom, grid_size).ceil() as i64 - 1;
    let cell_x = ((mercator.x() - EARTH_MERCATOR_MIN) / cell_size).floor() as i64;
    let cell_y = ((mercator.y() - EARTH_MERCATOR_MIN) / cell_size).floor() as i64;
    (cell_x.clamp(0, last), cell_y.clamp(0, last))
}
