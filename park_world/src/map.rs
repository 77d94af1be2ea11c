//! Persistent world tile storage for placed track. Elements are keyed by
//! their origin tile and base height; multi-tile pieces are registered at
//! their origin only, with the geometric span described by `TrackDef`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coords::{CoordsXYZ, Direction, COORDS_XY_STEP};
use crate::ride::{RideId, StationIndex};
use crate::track::TrackType;

/// Animation state of a scenery/landscape door sitting over a track piece.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackElement {
    pub track_type: TrackType,
    pub direction: Direction,
    pub ride: RideId,
    pub station: Option<StationIndex>,
    /// Chain lift present on this piece.
    pub has_chain: bool,
    pub is_inverted: bool,
    /// Block-section brake state. Closed holds an approaching train.
    pub brake_closed: bool,
    /// Brake or booster speed limit stored on the element.
    pub brake_booster_speed: u8,
    pub seat_rotation: u8,
    pub door_entry: DoorState,
    pub door_exit: DoorState,
    /// Covered pieces may carry doors at their portals.
    pub has_doors: bool,
}

impl TrackElement {
    pub fn new(track_type: TrackType, direction: Direction, ride: RideId) -> Self {
        Self {
            track_type,
            direction,
            ride,
            station: None,
            has_chain: false,
            is_inverted: false,
            brake_closed: false,
            brake_booster_speed: 0,
            seat_rotation: 4,
            door_entry: DoorState::Closed,
            door_exit: DoorState::Closed,
            has_doors: false,
        }
    }

    pub fn with_station(mut self, station: StationIndex) -> Self {
        self.station = Some(station);
        self
    }

    pub fn with_chain(mut self) -> Self {
        self.has_chain = true;
        self
    }

    pub fn with_brake_speed(mut self, speed: u8) -> Self {
        self.brake_booster_speed = speed;
        self
    }

    /// A block section starts at stations, block brakes, the cable lift
    /// hill, and chained lift crests.
    pub fn is_block_start(&self) -> bool {
        match self.track_type {
            TrackType::EndStation | TrackType::BlockBrakes | TrackType::CableLiftHill => true,
            TrackType::Up25ToFlat => self.has_chain,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct TileKey {
    x: i32,
    y: i32,
    z: i32,
}

impl TileKey {
    fn from_coords(pos: CoordsXYZ) -> Self {
        Self {
            x: pos.x.div_euclid(COORDS_XY_STEP),
            y: pos.y.div_euclid(COORDS_XY_STEP),
            z: pos.z,
        }
    }
}

/// The map: a sparse set of placed track elements. Multiple elements may
/// share a tile at different heights (the key includes the base z).
#[derive(Debug, Default, Clone)]
pub struct TileMap {
    elements: BTreeMap<TileKey, TrackElement>,
    pub size_tiles: i32,
}

impl TileMap {
    pub fn new(size_tiles: i32) -> Self {
        Self {
            elements: BTreeMap::new(),
            size_tiles,
        }
    }

    pub fn is_location_valid(&self, pos: CoordsXYZ) -> bool {
        let limit = self.size_tiles * COORDS_XY_STEP;
        pos.x >= 0 && pos.y >= 0 && pos.x < limit && pos.y < limit
    }

    pub fn place(&mut self, pos: CoordsXYZ, element: TrackElement) {
        self.elements.insert(TileKey::from_coords(pos), element);
    }

    pub fn remove(&mut self, pos: CoordsXYZ) -> Option<TrackElement> {
        self.elements.remove(&TileKey::from_coords(pos))
    }

    /// The element of the given type at a tile, if present. Returns `None`
    /// at track graph boundaries; callers branch on it rather than failing.
    pub fn track_element_at(&self, pos: CoordsXYZ, track_type: TrackType) -> Option<&TrackElement> {
        self.elements
            .get(&TileKey::from_coords(pos))
            .filter(|element| element.track_type == track_type)
    }

    pub fn track_element_at_mut(
        &mut self,
        pos: CoordsXYZ,
        track_type: TrackType,
    ) -> Option<&mut TrackElement> {
        self.elements
            .get_mut(&TileKey::from_coords(pos))
            .filter(|element| element.track_type == track_type)
    }

    pub fn any_track_element_at(&self, pos: CoordsXYZ) -> Option<&TrackElement> {
        self.elements.get(&TileKey::from_coords(pos))
    }

    pub fn any_track_element_at_mut(&mut self, pos: CoordsXYZ) -> Option<&mut TrackElement> {
        self.elements.get_mut(&TileKey::from_coords(pos))
    }

    /// Find an element at the tile within a small vertical tolerance, used
    /// by the station-platform scan of the synchronised-departure search.
    pub fn station_element_near(&self, pos: CoordsXYZ, tolerance: i32) -> Option<&TrackElement> {
        self.elements
            .range(
                TileKey {
                    x: pos.x.div_euclid(COORDS_XY_STEP),
                    y: pos.y.div_euclid(COORDS_XY_STEP),
                    z: i32::MIN,
                }..=TileKey {
                    x: pos.x.div_euclid(COORDS_XY_STEP),
                    y: pos.y.div_euclid(COORDS_XY_STEP),
                    z: i32::MAX,
                },
            )
            .find(|(key, element)| {
                (key.z - pos.z).abs() <= tolerance && element.track_type.is_station()
            })
            .map(|(_, element)| element)
    }

    /// Every element on a tile, ascending by base height.
    pub fn elements_at_tile(
        &self,
        pos: crate::coords::CoordsXY,
    ) -> impl Iterator<Item = (i32, &TrackElement)> {
        let x = pos.x.div_euclid(COORDS_XY_STEP);
        let y = pos.y.div_euclid(COORDS_XY_STEP);
        self.elements
            .range(TileKey { x, y, z: i32::MIN }..=TileKey { x, y, z: i32::MAX })
            .map(|(key, element)| (key.z, element))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoordsXYZ, &TrackElement)> {
        self.elements.iter().map(|(key, element)| {
            (
                CoordsXYZ::new(key.x * COORDS_XY_STEP, key.y * COORDS_XY_STEP, key.z),
                element,
            )
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::RideId;

    #[test]
    fn lookup_is_type_filtered() {
        let mut map = TileMap::new(16);
        let pos = CoordsXYZ::new(64, 32, 16);
        map.place(pos, TrackElement::new(TrackType::Flat, 0, RideId(0)));

        assert!(map.track_element_at(pos, TrackType::Flat).is_some());
        assert!(map.track_element_at(pos, TrackType::Brakes).is_none());
        assert!(map.track_element_at(CoordsXYZ::new(96, 32, 16), TrackType::Flat).is_none());
    }

    #[test]
    fn block_start_requires_chain_on_lift_crest() {
        let mut element = TrackElement::new(TrackType::Up25ToFlat, 0, RideId(0));
        assert!(!element.is_block_start());
        element.has_chain = true;
        assert!(element.is_block_start());
        assert!(TrackElement::new(TrackType::BlockBrakes, 0, RideId(0)).is_block_start());
    }

    #[test]
    fn station_scan_tolerates_platform_height() {
        let mut map = TileMap::new(16);
        let pos = CoordsXYZ::new(32, 32, 16);
        map.place(
            pos,
            TrackElement::new(TrackType::EndStation, 0, RideId(1)).with_station(StationIndex(0)),
        );
        assert!(map
            .station_element_near(CoordsXYZ::new(32, 32, 12), 16)
            .is_some());
        assert!(map
            .station_element_near(CoordsXYZ::new(32, 32, 80), 16)
            .is_none());
    }
}
