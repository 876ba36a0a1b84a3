//! # Tiles
//!
//! A generic rectangular grid over a bounding region,
//! with each tile further divided into `n × n` bins ("subdivisions").
//!
//! Tile IDs are assigned in row-major order starting from the minimum corner,
//! so `id = row * ncolumns + column`.
//! Bins within a tile use the same convention relative to the tile's base corner.
//!
//! The grid is parameterized over a [`CoordinateSystem`].
//! [`Planar`] grids use Euclidean distances and never wrap.
//! [`Geographic`] grids use Haversine distances (in meters),
//! and when they span 360° of longitude they wrap horizontally at the antimeridian.

use bit_set::BitSet;
use geo::{Coord, Distance, Euclidean, Haversine, Point, Rect, coord};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt::Debug;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use thiserror::Error;

/// Tolerance (in bin units) used when deciding whether a segment touches a grid line.
const GRID_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum TilesError {
    #[error("Tile size must be a positive, finite number (got {0}).")]
    InvalidTileSize(f64),
    #[error("Tiles must have between 1 and 255 subdivisions per side.")]
    InvalidSubdivisions,
    #[error("The bounding region is empty or not finite.")]
    InvalidBounds,
    #[error("The grid has too many tiles to be addressed with 32-bit IDs.")]
    TooManyTiles,
}

/// The coordinate space a [`Tiles`] grid is defined over.
pub trait CoordinateSystem: Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// True for longitude/latitude coordinates.
    const IS_SPHERICAL: bool;

    /// The distance between two points in this coordinate system.
    fn distance(a: Point<f64>, b: Point<f64>) -> f64;
}

/// Cartesian coordinates with Euclidean distance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Planar;

impl CoordinateSystem for Planar {
    const IS_SPHERICAL: bool = false;

    #[inline]
    fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
        Euclidean.distance(a, b)
    }
}

/// Longitude (x) / latitude (y) in degrees, with great circle distances in meters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Geographic;

impl CoordinateSystem for Geographic {
    const IS_SPHERICAL: bool = true;

    #[inline]
    fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
        Haversine.distance(a, b)
    }
}

/// A rectangular grid of square tiles, each split into square bins.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tiles<C: CoordinateSystem> {
    bounds: Rect<f64>,
    tile_size: f64,
    n_subdivisions: u8,
    subdivision_size: f64,
    ncolumns: u32,
    nrows: u32,
    wraps: bool,
    _coordinates: PhantomData<C>,
}

impl<C: CoordinateSystem> Tiles<C> {
    /// Creates a grid over `bounds` with square tiles of `tile_size`,
    /// each divided into `n_subdivisions` bins per side.
    ///
    /// The number of rows and columns is rounded up,
    /// so the last row/column may extend past the bounds.
    pub fn new(bounds: Rect<f64>, tile_size: f64, n_subdivisions: u8) -> Result<Self, TilesError> {
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(TilesError::InvalidTileSize(tile_size));
        }
        if n_subdivisions == 0 {
            return Err(TilesError::InvalidSubdivisions);
        }
        let (width, height) = (bounds.width(), bounds.height());
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(TilesError::InvalidBounds);
        }

        let ncolumns = (width / tile_size).ceil();
        let nrows = (height / tile_size).ceil();
        if ncolumns * nrows > f64::from(u32::MAX) {
            return Err(TilesError::TooManyTiles);
        }

        Ok(Self {
            bounds,
            tile_size,
            n_subdivisions,
            subdivision_size: tile_size / f64::from(n_subdivisions),
            ncolumns: ncolumns as u32,
            nrows: nrows as u32,
            wraps: C::IS_SPHERICAL && (width - 360.0).abs() < 1e-9,
            _coordinates: PhantomData,
        })
    }

    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    #[inline]
    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    #[inline]
    pub fn n_subdivisions(&self) -> u8 {
        self.n_subdivisions
    }

    /// The width (and height) of a single bin.
    #[inline]
    pub fn subdivision_size(&self) -> f64 {
        self.subdivision_size
    }

    #[inline]
    pub fn ncolumns(&self) -> u32 {
        self.ncolumns
    }

    #[inline]
    pub fn nrows(&self) -> u32 {
        self.nrows
    }

    /// The total number of tiles in the grid.
    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.ncolumns * self.nrows
    }

    /// The highest valid tile ID.
    #[inline]
    pub fn max_tile_id(&self) -> u32 {
        self.tile_count() - 1
    }

    /// True if the grid wraps horizontally (a geographic grid spanning 360°).
    #[inline]
    pub fn wraps_horizontally(&self) -> bool {
        self.wraps
    }

    /// The row containing `y`, or `None` if it lies outside the bounds.
    ///
    /// A coordinate exactly on the maximum edge belongs to the last row.
    pub fn row(&self, y: f64) -> Option<u32> {
        if y < self.bounds.min().y || y > self.bounds.max().y {
            return None;
        }
        Some(self.clamped_row(y))
    }

    /// The column containing `x`, or `None` if it lies outside the bounds.
    ///
    /// For wrapping grids, the longitude is normalized first,
    /// so every finite value has a column.
    pub fn col(&self, x: f64) -> Option<u32> {
        let x = if self.wraps {
            self.normalize_x(x)
        } else if x < self.bounds.min().x || x > self.bounds.max().x {
            return None;
        } else {
            x
        };
        Some(self.clamped_col(x))
    }

    /// The ID of the tile containing `coord`, or `None` outside the bounds.
    pub fn tile_id(&self, coord: Coord<f64>) -> Option<u32> {
        if !coord.x.is_finite() {
            return None;
        }
        let row = self.row(coord.y)?;
        let col = self.col(coord.x)?;
        Some(row * self.ncolumns + col)
    }

    /// The ID of the tile at the given row and column.
    pub fn tile_id_from_row_col(&self, row: u32, col: u32) -> Option<u32> {
        (row < self.nrows && col < self.ncolumns).then(|| row * self.ncolumns + col)
    }

    /// The (row, column) of a tile; the inverse of [`Tiles::tile_id_from_row_col`].
    pub fn row_column(&self, tile_id: u32) -> Option<(u32, u32)> {
        (tile_id < self.tile_count()).then(|| (tile_id / self.ncolumns, tile_id % self.ncolumns))
    }

    /// The minimum (south-west) corner of a tile.
    pub fn base(&self, tile_id: u32) -> Option<Coord<f64>> {
        let (row, col) = self.row_column(tile_id)?;
        Some(coord! {
            x: self.bounds.min().x + f64::from(col) * self.tile_size,
            y: self.bounds.min().y + f64::from(row) * self.tile_size,
        })
    }

    /// The full extent of a tile.
    pub fn tile_bounds(&self, tile_id: u32) -> Option<Rect<f64>> {
        let base = self.base(tile_id)?;
        Some(Rect::new(
            base,
            coord! { x: base.x + self.tile_size, y: base.y + self.tile_size },
        ))
    }

    /// The center of a tile.
    pub fn center(&self, tile_id: u32) -> Option<Coord<f64>> {
        self.tile_bounds(tile_id).map(|bounds| bounds.center())
    }

    /// The tile to the left (west), wrapping around for 360° geographic grids.
    pub fn left_neighbor(&self, tile_id: u32) -> Option<u32> {
        let (row, col) = self.row_column(tile_id)?;
        if col > 0 {
            Some(tile_id - 1)
        } else if self.wraps {
            Some(row * self.ncolumns + self.ncolumns - 1)
        } else {
            None
        }
    }

    /// The tile to the right (east), wrapping around for 360° geographic grids.
    pub fn right_neighbor(&self, tile_id: u32) -> Option<u32> {
        let (row, col) = self.row_column(tile_id)?;
        if col + 1 < self.ncolumns {
            Some(tile_id + 1)
        } else if self.wraps {
            Some(row * self.ncolumns)
        } else {
            None
        }
    }

    /// The tile above (north). There is never any vertical wrapping.
    pub fn top_neighbor(&self, tile_id: u32) -> Option<u32> {
        let (row, _) = self.row_column(tile_id)?;
        (row + 1 < self.nrows).then(|| tile_id + self.ncolumns)
    }

    /// The tile below (south). There is never any vertical wrapping.
    pub fn bottom_neighbor(&self, tile_id: u32) -> Option<u32> {
        let (row, _) = self.row_column(tile_id)?;
        (row > 0).then(|| tile_id - self.ncolumns)
    }

    /// True if `b` shares an edge with `a`.
    pub fn are_neighbors(&self, a: u32, b: u32) -> bool {
        a != b
            && [
                self.left_neighbor(a),
                self.right_neighbor(a),
                self.top_neighbor(a),
                self.bottom_neighbor(a),
            ]
            .contains(&Some(b))
    }

    /// Lists every tile whose (closed) area intersects `bbox`, in ascending order.
    pub fn tile_list(&self, bbox: Rect<f64>) -> Vec<u32> {
        let (min, max) = (bbox.min(), bbox.max());
        let (grid_min, grid_max) = (self.bounds.min(), self.bounds.max());
        if max.x < grid_min.x || min.x > grid_max.x || max.y < grid_min.y || min.y > grid_max.y {
            return Vec::new();
        }

        let (min_col, max_col) = (self.clamped_col(min.x), self.clamped_col(max.x));
        let (min_row, max_row) = (self.clamped_row(min.y), self.clamped_row(max.y));

        let mut tiles = Vec::with_capacity(
            ((max_col - min_col + 1) as usize) * ((max_row - min_row + 1) as usize),
        );
        for row in min_row..=max_row {
            tiles.extend((min_col..=max_col).map(|col| row * self.ncolumns + col));
        }
        tiles
    }

    /// Like [`Tiles::tile_list`], but for a box given by its south-west and north-east corners,
    /// which may cross the antimeridian (`south_west.x > north_east.x`) on wrapping grids.
    pub fn tile_list_between(&self, south_west: Coord<f64>, north_east: Coord<f64>) -> Vec<u32> {
        if !(self.wraps && south_west.x > north_east.x) {
            return self.tile_list(Rect::new(south_west, north_east));
        }

        let (grid_min, grid_max) = (self.bounds.min(), self.bounds.max());
        let mut tiles = self.tile_list(Rect::new(
            south_west,
            coord! { x: grid_max.x, y: north_east.y },
        ));
        tiles.extend(self.tile_list(Rect::new(
            coord! { x: grid_min.x, y: south_west.y },
            north_east,
        )));
        tiles.sort_unstable();
        tiles.dedup();
        tiles
    }

    /// Finds every (tile, bin) cell touched by the polyline through `points`.
    ///
    /// A single point (or a zero-length segment) yields the bin containing it.
    /// Segments are clipped to the grid.
    /// On geographic grids, a segment whose endpoints are more than 180° apart in longitude
    /// is taken to cross the antimeridian (the shorter way around).
    ///
    /// A bin is reported if and only if the closed segment touches the closed bin,
    /// so a segment passing exactly through a corner touches all bins sharing that corner.
    pub fn intersect(&self, points: &[Coord<f64>]) -> HashMap<u32, HashSet<u16>> {
        let mut bins = HashMap::new();
        match points {
            [] => {}
            [point] => self.mark_point(&mut bins, *point),
            _ => {
                for segment in points.windows(2) {
                    let (u, v) = (segment[0], segment[1]);
                    if u == v {
                        self.mark_point(&mut bins, u);
                    } else {
                        self.mark_segment(&mut bins, u, v);
                    }
                }
            }
        }
        bins
    }

    /// Enumerates every bin in the grid in order of increasing distance from `point`.
    ///
    /// The distance to a bin is the distance to the nearest point of its rectangle,
    /// so every bin containing (or touching) the point comes first at distance zero.
    /// The sequence is finite; once every bin has been produced it returns `None`.
    pub fn closest_first(&self, point: Coord<f64>) -> ClosestFirst<C> {
        ClosestFirst::new(*self, point)
    }

    fn bin_columns(&self) -> i64 {
        i64::from(self.ncolumns) * i64::from(self.n_subdivisions)
    }

    fn bin_rows(&self) -> i64 {
        i64::from(self.nrows) * i64::from(self.n_subdivisions)
    }

    fn clamped_row(&self, y: f64) -> u32 {
        let row = ((y - self.bounds.min().y) / self.tile_size).floor();
        row.clamp(0.0, f64::from(self.nrows - 1)) as u32
    }

    fn clamped_col(&self, x: f64) -> u32 {
        let col = ((x - self.bounds.min().x) / self.tile_size).floor();
        col.clamp(0.0, f64::from(self.ncolumns - 1)) as u32
    }

    /// Normalizes a longitude into `[min_x, min_x + 360)`.
    fn normalize_x(&self, x: f64) -> f64 {
        let min_x = self.bounds.min().x;
        let normalized = min_x + (x - min_x).rem_euclid(360.0);
        // rem_euclid can round up to exactly 360 for tiny negative offsets
        if normalized >= min_x + 360.0 {
            min_x
        } else {
            normalized
        }
    }

    /// Converts a coordinate to fractional global bin units.
    fn to_bin_units(&self, coord: Coord<f64>) -> (f64, f64) {
        (
            (coord.x - self.bounds.min().x) / self.subdivision_size,
            (coord.y - self.bounds.min().y) / self.subdivision_size,
        )
    }

    /// Splits a global bin position into its tile and bin index.
    fn tile_and_bin(&self, bin_x: i64, bin_y: i64) -> (u32, u16) {
        let n = i64::from(self.n_subdivisions);
        let tile = (bin_y / n) * i64::from(self.ncolumns) + bin_x / n;
        let bin = (bin_y % n) * n + bin_x % n;
        (tile as u32, bin as u16)
    }

    fn mark(&self, bins: &mut HashMap<u32, HashSet<u16>>, bin_x: i64, bin_y: i64) {
        let bin_x = if self.wraps {
            bin_x.rem_euclid(self.bin_columns())
        } else {
            bin_x
        };
        if bin_x < 0 || bin_y < 0 || bin_x >= self.bin_columns() || bin_y >= self.bin_rows() {
            return;
        }
        let (tile, bin) = self.tile_and_bin(bin_x, bin_y);
        bins.entry(tile).or_default().insert(bin);
    }

    fn mark_point(&self, bins: &mut HashMap<u32, HashSet<u16>>, point: Coord<f64>) {
        let (x, y) = self.to_bin_units(point);
        let (width, height) = (self.bin_columns(), self.bin_rows());
        if !(x >= 0.0 && y >= 0.0 && x <= width as f64 && y <= height as f64) {
            return;
        }
        let bin_x = (x.floor() as i64).min(width - 1);
        let bin_y = (y.floor() as i64).min(height - 1);
        self.mark(bins, bin_x, bin_y);
    }

    fn mark_segment(&self, bins: &mut HashMap<u32, HashSet<u16>>, u: Coord<f64>, v: Coord<f64>) {
        if ![u.x, u.y, v.x, v.y].iter().all(|value| value.is_finite()) {
            return;
        }
        let (mut u, mut v) = (u, v);
        if self.wraps {
            u.x = self.normalize_x(u.x);
            v.x = self.normalize_x(v.x);
        }
        if C::IS_SPHERICAL && (u.x - v.x).abs() > 180.0 {
            if u.x < v.x {
                u.x += 360.0;
            } else {
                v.x += 360.0;
            }
        }

        let (mut x0, mut y0) = self.to_bin_units(u);
        let (mut x1, mut y1) = self.to_bin_units(v);
        if x0 > x1 {
            (x0, y0, x1, y1) = (x1, y1, x0, y0);
        }

        let (width, height) = (self.bin_columns(), self.bin_rows());
        let mut first_col = (x0 - GRID_EPSILON).ceil() as i64 - 1;
        let mut last_col = (x1 + GRID_EPSILON).floor() as i64;
        if !self.wraps {
            first_col = first_col.max(0);
            last_col = last_col.min(width - 1);
        }

        let y_at = |x: f64| {
            if x == x0 {
                y0
            } else if x == x1 {
                y1
            } else {
                y0 + (x - x0) * (y1 - y0) / (x1 - x0)
            }
        };

        for col in first_col..=last_col {
            // The part of the segment within this column
            let (ya, yb) = if x0 == x1 {
                (y0, y1)
            } else {
                let xa = (col as f64).clamp(x0, x1);
                let xb = ((col + 1) as f64).clamp(x0, x1);
                (y_at(xa), y_at(xb))
            };
            let (lo, hi) = (ya.min(yb), ya.max(yb));

            let first_row = ((lo - GRID_EPSILON).ceil() as i64 - 1).max(0);
            let last_row = ((hi + GRID_EPSILON).floor() as i64).min(height - 1);
            for row in first_row..=last_row {
                self.mark(bins, col, row);
            }
        }
    }

    /// The distance from `point` to the nearest point of the bin at a global bin position.
    fn bin_distance(&self, point: Coord<f64>, bin_x: i64, bin_y: i64) -> f64 {
        let min = self.bounds.min();
        let x0 = min.x + bin_x as f64 * self.subdivision_size;
        let y0 = min.y + bin_y as f64 * self.subdivision_size;
        let y = point.y.clamp(y0, y0 + self.subdivision_size);

        let x = if self.wraps {
            // Compare longitudes the short way round, relative to the bin center
            let half = self.subdivision_size / 2.0;
            let center = x0 + half;
            let delta = (point.x - center + 180.0).rem_euclid(360.0) - 180.0;
            if delta.abs() <= half {
                point.x
            } else {
                center + half * delta.signum()
            }
        } else {
            point.x.clamp(x0, x0 + self.subdivision_size)
        };

        C::distance(Point::from(point), Point::new(x, y))
    }
}

impl Tiles<Geographic> {
    /// A geographic grid covering the whole world.
    pub fn world(tile_size: f64, n_subdivisions: u8) -> Result<Self, TilesError> {
        Self::new(
            Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 }),
            tile_size,
            n_subdivisions,
        )
    }
}

/// A bin produced by [`ClosestFirst`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClosestBin {
    pub tile_id: u32,
    pub bin: u16,
    /// Distance from the query point to the nearest point of the bin,
    /// in the units of the grid's [`CoordinateSystem`].
    pub distance: f64,
}

#[derive(Copy, Clone, Debug)]
struct Candidate {
    distance: f64,
    /// Global bin index (`bin_y * bin_columns + bin_x`); breaks distance ties.
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

/// A lazy, distance-ordered enumeration of every bin in a [`Tiles`] grid.
///
/// Created by [`Tiles::closest_first`].
/// The search expands outward from the bins touching the query point,
/// so consumers that only need nearby bins pay only for what they consume.
/// Once exhausted, the iterator keeps returning `None`;
/// a new search requires constructing a new iterator.
#[derive(Debug)]
pub struct ClosestFirst<C: CoordinateSystem> {
    tiles: Tiles<C>,
    point: Coord<f64>,
    queue: BinaryHeap<Reverse<Candidate>>,
    visited: BitSet,
}

impl<C: CoordinateSystem> ClosestFirst<C> {
    fn new(tiles: Tiles<C>, point: Coord<f64>) -> Self {
        let point = if tiles.wraps {
            coord! { x: tiles.normalize_x(point.x), y: point.y }
        } else {
            point
        };

        let width = tiles.bin_columns();
        let height = tiles.bin_rows();
        let mut search = Self {
            tiles,
            point,
            queue: BinaryHeap::new(),
            visited: BitSet::with_capacity((width * height) as usize),
        };

        // Seed with every bin touching the (clamped) point
        let (x, y) = tiles.to_bin_units(point);
        let x = x.clamp(0.0, width as f64);
        let y = y.clamp(0.0, height as f64);
        let floor_x = (x.floor() as i64).min(width - 1);
        let floor_y = (y.floor() as i64).min(height - 1);

        let mut columns = vec![floor_x];
        if x == floor_x as f64 {
            if floor_x > 0 {
                columns.push(floor_x - 1);
            } else if tiles.wraps {
                columns.push(width - 1);
            }
        }
        let mut rows = vec![floor_y];
        if y == floor_y as f64 && floor_y > 0 {
            rows.push(floor_y - 1);
        }

        for &bin_y in &rows {
            for &bin_x in &columns {
                search.enqueue(bin_x, bin_y);
            }
        }
        search
    }

    fn enqueue(&mut self, bin_x: i64, bin_y: i64) {
        let index = (bin_y * self.tiles.bin_columns() + bin_x) as usize;
        if self.visited.insert(index) {
            let distance = self.tiles.bin_distance(self.point, bin_x, bin_y);
            self.queue.push(Reverse(Candidate { distance, index }));
        }
    }
}

impl<C: CoordinateSystem> Iterator for ClosestFirst<C> {
    type Item = ClosestBin;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(Candidate { distance, index }) = self.queue.pop()?;

        let width = self.tiles.bin_columns();
        let height = self.tiles.bin_rows();
        let bin_x = index as i64 % width;
        let bin_y = index as i64 / width;

        if bin_x > 0 {
            self.enqueue(bin_x - 1, bin_y);
        } else if self.tiles.wraps {
            self.enqueue(width - 1, bin_y);
        }
        if bin_x + 1 < width {
            self.enqueue(bin_x + 1, bin_y);
        } else if self.tiles.wraps {
            self.enqueue(0, bin_y);
        }
        if bin_y > 0 {
            self.enqueue(bin_x, bin_y - 1);
        }
        if bin_y + 1 < height {
            self.enqueue(bin_x, bin_y + 1);
        }

        let (tile_id, bin) = self.tiles.tile_and_bin(bin_x, bin_y);
        Some(ClosestBin {
            tile_id,
            bin,
            distance,
        })
    }
}

impl<C: CoordinateSystem> FusedIterator for ClosestFirst<C> {}
