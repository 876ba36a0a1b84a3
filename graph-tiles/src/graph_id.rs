//! # Graph IDs
//!
//! A [`GraphId`] addresses a tile, or a node or directed edge within a tile,
//! as a (level, tile, index) triple packed into 46 bits of a `u64`.
//!
//! | Component | Bits     | Range                 |
//! |-----------|----------|-----------------------|
//! | index     | 0..21    | `0..=2_097_151`       |
//! | tile      | 21..43   | `0..=4_194_303`       |
//! | level     | 43..46   | `0..=7`               |
//!
//! The level occupies the most significant bits and the index the least,
//! so the numeric order of IDs groups everything in a tile together
//! (sorted by level, then tile, then index).

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

const INDEX_BITS: u32 = 21;
const TILE_BITS: u32 = 22;
const LEVEL_BITS: u32 = 3;

const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const TILE_MASK: u64 = (1 << TILE_BITS) - 1;
const LEVEL_MASK: u64 = (1 << LEVEL_BITS) - 1;

const TILE_SHIFT: u32 = INDEX_BITS;
const LEVEL_SHIFT: u32 = INDEX_BITS + TILE_BITS;

/// All 46 significant bits.
const VALUE_MASK: u64 = (1 << (LEVEL_SHIFT + LEVEL_BITS)) - 1;

/// The largest representable hierarchy level.
pub const MAX_LEVEL: u8 = LEVEL_MASK as u8;
/// The largest representable tile ID within a level.
pub const MAX_TILE_ID: u64 = TILE_MASK;
/// The largest representable index within a tile.
pub const MAX_INDEX: u64 = INDEX_MASK;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidGraphIdError {
    #[error("Level {0} is larger than the maximum ({MAX_LEVEL}).")]
    Level(u8),
    #[error("Tile ID {0} is larger than the maximum ({MAX_TILE_ID}).")]
    TileId(u64),
    #[error("Index {0} is larger than the maximum ({MAX_INDEX}).")]
    Index(u64),
    #[error("Raw value {0:#x} has bits set outside the 46-bit range.")]
    Value(u64),
    #[error("Unable to parse a graph ID from {0:?}; expected level/tile/index.")]
    Parse(String),
}

/// An identifier of a tile, node or directed edge in the tiled graph.
///
/// Equality is over all three components.
/// Use [`GraphId::tile_base_id`] (or [`GraphId::same_tile`]) when you care about the tile only.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct GraphId(u64);

impl GraphId {
    /// The sentinel used for "no such node/edge".
    ///
    /// All 46 bits are set, so the level is [`MAX_LEVEL`],
    /// which no tile hierarchy uses.
    pub const INVALID: GraphId = GraphId(VALUE_MASK);

    /// Creates a graph ID from its components.
    ///
    /// # Errors
    ///
    /// Fails if any component is out of range for its bit width.
    pub const fn try_from_components(
        level: u8,
        tile_id: u64,
        index: u64,
    ) -> Result<Self, InvalidGraphIdError> {
        if level > MAX_LEVEL {
            Err(InvalidGraphIdError::Level(level))
        } else if tile_id > MAX_TILE_ID {
            Err(InvalidGraphIdError::TileId(tile_id))
        } else if index > MAX_INDEX {
            Err(InvalidGraphIdError::Index(index))
        } else {
            // SAFETY: Every component was range checked above.
            Ok(unsafe { Self::from_components_unchecked(level, tile_id, index) })
        }
    }

    /// Creates a graph ID from its components without range checks.
    ///
    /// # Safety
    ///
    /// The caller must ensure that every component fits its bit width.
    /// Out-of-range values silently corrupt the neighboring components.
    #[inline]
    pub const unsafe fn from_components_unchecked(level: u8, tile_id: u64, index: u64) -> Self {
        Self(((level as u64) << LEVEL_SHIFT) | (tile_id << TILE_SHIFT) | index)
    }

    /// Creates a graph ID from its raw 46-bit value.
    ///
    /// # Errors
    ///
    /// Fails if bits above the 46th are set.
    pub const fn try_from_id(value: u64) -> Result<Self, InvalidGraphIdError> {
        if value & !VALUE_MASK == 0 {
            Ok(Self(value))
        } else {
            Err(InvalidGraphIdError::Value(value))
        }
    }

    /// The raw packed value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The hierarchy level.
    #[inline]
    pub const fn level(&self) -> u8 {
        ((self.0 >> LEVEL_SHIFT) & LEVEL_MASK) as u8
    }

    /// The tile number within the level.
    #[inline]
    pub const fn tile_id(&self) -> u64 {
        (self.0 >> TILE_SHIFT) & TILE_MASK
    }

    /// The index of the node or edge within the tile.
    #[inline]
    pub const fn index(&self) -> u64 {
        self.0 & INDEX_MASK
    }

    /// The ID of the tile containing this feature (same level and tile, index zero).
    #[inline]
    pub const fn tile_base_id(&self) -> GraphId {
        GraphId(self.0 & !INDEX_MASK)
    }

    /// Returns true if both IDs address the same tile.
    #[inline]
    pub const fn same_tile(&self, other: GraphId) -> bool {
        self.tile_base_id().0 == other.tile_base_id().0
    }

    /// Returns a new ID in the same tile with a different index.
    ///
    /// # Errors
    ///
    /// Fails if the index does not fit in 21 bits.
    pub const fn with_index(&self, index: u64) -> Result<Self, InvalidGraphIdError> {
        if index > MAX_INDEX {
            Err(InvalidGraphIdError::Index(index))
        } else {
            Ok(GraphId(self.tile_base_id().0 | index))
        }
    }

    /// Returns false for the [`GraphId::INVALID`] sentinel.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 != VALUE_MASK
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl TryFrom<u64> for GraphId {
    type Error = InvalidGraphIdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::try_from_id(value)
    }
}

impl From<GraphId> for u64 {
    fn from(value: GraphId) -> Self {
        value.0
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level(), self.tile_id(), self.index())
    }
}

impl Debug for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "GraphId({self})")
        } else {
            f.write_str("GraphId(INVALID)")
        }
    }
}

impl FromStr for GraphId {
    type Err = InvalidGraphIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || InvalidGraphIdError::Parse(s.to_string());
        let mut parts = s.trim().split('/');
        let (Some(level), Some(tile_id), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(parse_error());
        };

        let level = level.parse::<u8>().map_err(|_| parse_error())?;
        let tile_id = tile_id.parse::<u64>().map_err(|_| parse_error())?;
        let index = index.parse::<u64>().map_err(|_| parse_error())?;
        Self::try_from_components(level, tile_id, index)
    }
}
