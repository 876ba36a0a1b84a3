use super::builder::NewEdge;
use crate::Access;
use crate::graph_id::GraphId;
use bitfield_struct::bitfield;
use enumset::EnumSet;
use std::fmt::{Debug, Formatter};
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The use (category) of an edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EdgeUse {
    Road = 0,
    Ramp = 1,
    TurnChannel = 2,
    Track = 3,
    Driveway = 4,
    Alley = 5,
    ParkingAisle = 6,
    EmergencyAccess = 7,
    DriveThru = 8,
    Culdesac = 9,
    LivingStreet = 10,
    ServiceRoad = 11,
    Cycleway = 20,
    MountainBike = 21,
    Sidewalk = 24,
    Footway = 25,
    Steps = 26,
    Path = 27,
    Pedestrian = 28,
    Bridleway = 29,
    RestArea = 30,
    ServiceArea = 31,
    Other = 40,
    Ferry = 41,
    RailFerry = 42,
    Construction = 43,
    Rail = 50,
    Bus = 51,
    EgressConnection = 52,
    PlatformConnection = 53,
    TransitConnection = 54,
}

impl EdgeUse {
    pub const fn from_repr(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Road,
            1 => Self::Ramp,
            2 => Self::TurnChannel,
            3 => Self::Track,
            4 => Self::Driveway,
            5 => Self::Alley,
            6 => Self::ParkingAisle,
            7 => Self::EmergencyAccess,
            8 => Self::DriveThru,
            9 => Self::Culdesac,
            10 => Self::LivingStreet,
            11 => Self::ServiceRoad,
            20 => Self::Cycleway,
            21 => Self::MountainBike,
            24 => Self::Sidewalk,
            25 => Self::Footway,
            26 => Self::Steps,
            27 => Self::Path,
            28 => Self::Pedestrian,
            29 => Self::Bridleway,
            30 => Self::RestArea,
            31 => Self::ServiceArea,
            40 => Self::Other,
            41 => Self::Ferry,
            42 => Self::RailFerry,
            43 => Self::Construction,
            50 => Self::Rail,
            51 => Self::Bus,
            52 => Self::EgressConnection,
            53 => Self::PlatformConnection,
            54 => Self::TransitConnection,
            _ => return None,
        })
    }

    /// Edges along a scheduled transit line.
    #[inline]
    pub const fn is_transit_line(self) -> bool {
        matches!(self, Self::Rail | Self::Bus)
    }

    /// Connections between the road network and transit stops/stations.
    #[inline]
    pub const fn is_transit_connection(self) -> bool {
        matches!(
            self,
            Self::TransitConnection | Self::EgressConnection | Self::PlatformConnection
        )
    }
}

/// Road importance, from most to least important.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RoadClass {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    Unclassified = 5,
    Residential = 6,
    ServiceOther = 7,
}

impl RoadClass {
    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Motorway,
            1 => Self::Trunk,
            2 => Self::Primary,
            3 => Self::Secondary,
            4 => Self::Tertiary,
            5 => Self::Unclassified,
            6 => Self::Residential,
            _ => Self::ServiceOther,
        }
    }
}

/// Surface quality, from best to worst.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Surface {
    PavedSmooth = 0,
    Paved = 1,
    PavedRough = 2,
    Compacted = 3,
    Dirt = 4,
    Gravel = 5,
    Path = 6,
    Impassable = 7,
}

impl Surface {
    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::PavedSmooth,
            1 => Self::Paved,
            2 => Self::PavedRough,
            3 => Self::Compacted,
            4 => Self::Dirt,
            5 => Self::Gravel,
            6 => Self::Path,
            _ => Self::Impassable,
        }
    }
}

/// The descriptive attributes of a directed edge.
///
/// This is what a tile builder supplies per edge;
/// topology (end node, opposing index, shortcut masks) is supplied separately.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EdgeAttributes {
    /// Length in meters.
    pub length: u32,
    /// Speed in kph.
    pub speed: u8,
    pub edge_use: EdgeUse,
    pub classification: RoadClass,
    pub surface: Surface,
    pub forward_access: EnumSet<Access>,
    pub reverse_access: EnumSet<Access>,
    /// The edge has exit sign information.
    pub sign: bool,
    pub roundabout: bool,
    /// Ramp or turn channel.
    pub link: bool,
    pub toll: bool,
    pub destination_only: bool,
}

impl Default for EdgeAttributes {
    fn default() -> Self {
        Self {
            length: 0,
            speed: 50,
            edge_use: EdgeUse::Road,
            classification: RoadClass::Residential,
            surface: Surface::Paved,
            forward_access: EnumSet::all(),
            reverse_access: EnumSet::all(),
            sign: false,
            roundabout: false,
            link: false,
            toll: false,
            destination_only: false,
        }
    }
}

#[bitfield(u64)]
struct EdgeTopology {
    #[bits(46)]
    end_node: u64,
    #[bits(7)]
    opp_index: u8,
    leaves_tile: bool,
    forward: bool,
    is_shortcut: bool,
    #[bits(7)]
    shortcut_mask: u8,
    #[bits(1)]
    __: u8,
}

#[bitfield(u64)]
struct EdgeDescription {
    #[bits(7)]
    superseded_mask: u8,
    #[bits(6)]
    edge_use: u8,
    #[bits(3)]
    classification: u8,
    #[bits(3)]
    surface: u8,
    sign: bool,
    roundabout: bool,
    link: bool,
    toll: bool,
    destination_only: bool,
    #[bits(24)]
    length: u32,
    #[bits(8)]
    speed: u8,
    #[bits(8)]
    __: u8,
}

#[bitfield(u64)]
struct EdgeAccess {
    #[bits(12)]
    forward_access: u16,
    #[bits(12)]
    reverse_access: u16,
    #[bits(25)]
    edge_info_offset: u32,
    #[bits(15)]
    __: u16,
}

/// A directed edge within a graph tile.
///
/// Edges are stored in pairs; the opposing edge lives at
/// `end node's edge_index + opposing_edge_index`, possibly in another tile.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
#[repr(C)]
pub struct DirectedEdge {
    topology: U64<LE>,
    description: U64<LE>,
    access: U64<LE>,
}

impl DirectedEdge {
    pub(crate) const MAX_OPP_INDEX: u8 = (1 << 7) - 1;
    pub(crate) const MAX_SHORTCUT_BIT: u8 = 6;
    pub(crate) const MAX_LENGTH: u32 = (1 << 24) - 1;
    pub(crate) const MAX_EDGE_INFO_OFFSET: u32 = (1 << 25) - 1;

    /// Packs an edge. The builder range checks the edge before calling this.
    pub(crate) fn pack(edge: &NewEdge, leaves_tile: bool, edge_info_offset: u32) -> Self {
        let attributes = &edge.attributes;
        let topology = EdgeTopology::new()
            .with_end_node(edge.end_node.value())
            .with_opp_index(edge.opposing_edge_index)
            .with_leaves_tile(leaves_tile)
            .with_forward(edge.forward)
            .with_is_shortcut(edge.shortcut_mask != 0)
            .with_shortcut_mask(edge.shortcut_mask);
        let description = EdgeDescription::new()
            .with_superseded_mask(edge.superseded_mask)
            .with_edge_use(attributes.edge_use as u8)
            .with_classification(attributes.classification as u8)
            .with_surface(attributes.surface as u8)
            .with_sign(attributes.sign)
            .with_roundabout(attributes.roundabout)
            .with_link(attributes.link)
            .with_toll(attributes.toll)
            .with_destination_only(attributes.destination_only)
            .with_length(attributes.length)
            .with_speed(attributes.speed);
        let access = EdgeAccess::new()
            .with_forward_access(attributes.forward_access.as_repr())
            .with_reverse_access(attributes.reverse_access.as_repr())
            .with_edge_info_offset(edge_info_offset);
        Self {
            topology: U64::new(topology.into_bits()),
            description: U64::new(description.into_bits()),
            access: U64::new(access.into_bits()),
        }
    }

    #[inline]
    fn topology(&self) -> EdgeTopology {
        EdgeTopology::from_bits(self.topology.get())
    }

    #[inline]
    fn description(&self) -> EdgeDescription {
        EdgeDescription::from_bits(self.description.get())
    }

    #[inline]
    fn access_bits(&self) -> EdgeAccess {
        EdgeAccess::from_bits(self.access.get())
    }

    /// The node this edge leads to.
    #[inline]
    pub fn end_node_id(&self) -> GraphId {
        GraphId::try_from_id(self.topology().end_node()).unwrap_or(GraphId::INVALID)
    }

    /// The index of the opposing edge among the end node's outbound edges.
    #[inline]
    pub fn opposing_edge_index(&self) -> u32 {
        u32::from(self.topology().opp_index())
    }

    /// True if the end node is in a different tile.
    #[inline]
    pub fn leaves_tile(&self) -> bool {
        self.topology().leaves_tile()
    }

    /// True if the edge info shape is stored in this edge's direction of travel.
    #[inline]
    pub fn forward(&self) -> bool {
        self.topology().forward()
    }

    #[inline]
    pub fn is_shortcut(&self) -> bool {
        self.topology().is_shortcut()
    }

    /// The bit identifying this shortcut among those leaving its start node (zero otherwise).
    #[inline]
    pub fn shortcut_mask(&self) -> u8 {
        self.topology().shortcut_mask()
    }

    /// The bits of the shortcuts (leaving the same node) that supersede this edge.
    #[inline]
    pub fn superseded_mask(&self) -> u8 {
        self.description().superseded_mask()
    }

    /// The position, among the start node's outbound edges, of the shortcut
    /// that supersedes this edge.
    #[inline]
    pub fn superseded_index(&self) -> Option<u32> {
        match self.superseded_mask() {
            0 => None,
            mask => Some(mask.trailing_zeros()),
        }
    }

    #[inline]
    pub(crate) fn raw_use(&self) -> u8 {
        self.description().edge_use()
    }

    /// The edge use.
    ///
    /// Tile views validate every use value when they are constructed.
    #[inline]
    pub fn edge_use(&self) -> EdgeUse {
        EdgeUse::from_repr(self.raw_use()).unwrap_or(EdgeUse::Other)
    }

    #[inline]
    pub fn classification(&self) -> RoadClass {
        RoadClass::from_bits(self.description().classification())
    }

    #[inline]
    pub fn surface(&self) -> Surface {
        Surface::from_bits(self.description().surface())
    }

    /// Compacted or worse.
    #[inline]
    pub fn unpaved(&self) -> bool {
        self.surface() >= Surface::Compacted
    }

    #[inline]
    pub fn sign(&self) -> bool {
        self.description().sign()
    }

    #[inline]
    pub fn roundabout(&self) -> bool {
        self.description().roundabout()
    }

    #[inline]
    pub fn link(&self) -> bool {
        self.description().link()
    }

    #[inline]
    pub fn toll(&self) -> bool {
        self.description().toll()
    }

    #[inline]
    pub fn destination_only(&self) -> bool {
        self.description().destination_only()
    }

    /// Length in meters.
    #[inline]
    pub fn length(&self) -> u32 {
        self.description().length()
    }

    /// Speed in kph.
    #[inline]
    pub fn speed(&self) -> u32 {
        u32::from(self.description().speed())
    }

    #[inline]
    pub fn forward_access(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.access_bits().forward_access())
    }

    #[inline]
    pub fn reverse_access(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.access_bits().reverse_access())
    }

    /// Byte offset of this edge's info within the tile's edge info region.
    #[inline]
    pub fn edge_info_offset(&self) -> u32 {
        self.access_bits().edge_info_offset()
    }

    /// True for edges that may be part of a contracted chain under a shortcut
    /// (everything except shortcuts themselves and transit connections).
    #[inline]
    pub fn can_form_shortcut(&self) -> bool {
        !self.is_shortcut() && !self.edge_use().is_transit_connection()
    }

    /// The descriptive attributes of this edge.
    pub fn attributes(&self) -> EdgeAttributes {
        EdgeAttributes {
            length: self.length(),
            speed: self.description().speed(),
            edge_use: self.edge_use(),
            classification: self.classification(),
            surface: self.surface(),
            forward_access: self.forward_access(),
            reverse_access: self.reverse_access(),
            sign: self.sign(),
            roundabout: self.roundabout(),
            link: self.link(),
            toll: self.toll(),
            destination_only: self.destination_only(),
        }
    }
}

impl Debug for DirectedEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectedEdge")
            .field("end_node_id", &self.end_node_id())
            .field("opposing_edge_index", &self.opposing_edge_index())
            .field("leaves_tile", &self.leaves_tile())
            .field("forward", &self.forward())
            .field("shortcut_mask", &self.shortcut_mask())
            .field("superseded_mask", &self.superseded_mask())
            .field("edge_use", &self.edge_use())
            .field("classification", &self.classification())
            .field("length", &self.length())
            .field("edge_info_offset", &self.edge_info_offset())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<DirectedEdge>(), 24);
    }

    #[test]
    fn pack_and_read_back() {
        let end_node = GraphId::try_from_components(0, 3015, 77).unwrap();
        let attributes = EdgeAttributes {
            length: DirectedEdge::MAX_LENGTH,
            speed: 90,
            edge_use: EdgeUse::Ramp,
            classification: RoadClass::Trunk,
            surface: Surface::Gravel,
            forward_access: Access::Auto | Access::Truck,
            reverse_access: EnumSet::empty(),
            sign: true,
            roundabout: false,
            link: true,
            toll: true,
            destination_only: false,
        };
        let mut edge = NewEdge::new(end_node, 5, attributes.clone()).reversed();
        edge.superseded_mask = 0b100;

        let packed = DirectedEdge::pack(&edge, true, 1_000);
        assert_eq!(packed.end_node_id(), end_node);
        assert_eq!(packed.opposing_edge_index(), 5);
        assert!(packed.leaves_tile());
        assert!(!packed.forward());
        assert!(!packed.is_shortcut());
        assert_eq!(packed.superseded_index(), Some(2));
        assert!(packed.unpaved());
        assert_eq!(packed.edge_info_offset(), 1_000);
        assert_eq!(packed.attributes(), attributes);
        assert!(packed.can_form_shortcut());
    }

    #[test]
    fn shortcut_flags() {
        let end_node = GraphId::try_from_components(1, 10, 0).unwrap();
        let edge = NewEdge::new(end_node, 0, EdgeAttributes::default()).shortcut(3);
        let packed = DirectedEdge::pack(&edge, false, 0);
        assert!(packed.is_shortcut());
        assert_eq!(packed.shortcut_mask(), 0b1000);
        assert_eq!(packed.superseded_index(), None);
        assert!(!packed.can_form_shortcut());
        assert!(!packed.unpaved());
    }

    #[test]
    fn edge_use_categories() {
        assert!(EdgeUse::Rail.is_transit_line());
        assert!(!EdgeUse::Road.is_transit_line());
        assert!(EdgeUse::PlatformConnection.is_transit_connection());
        assert_eq!(EdgeUse::from_repr(54), Some(EdgeUse::TransitConnection));
        assert_eq!(EdgeUse::from_repr(63), None);
    }
}
