//! Ride bookkeeping and the static per-ride-type / per-car metadata the
//! integrator consumes read-only.

use serde::{Deserialize, Serialize};

use crate::coords::{CoordsXYZ, CoordsXYZD};
use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RideId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationIndex(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideMode {
    ContinuousCircuit,
    ContinuousCircuitBlockSectioned,
    Shuttle,
    ReverseInclineLaunchedShuttle,
    PoweredLaunch,
    PoweredLaunchPasstrough,
    PoweredLaunchBlockSectioned,
    LimPoweredLaunch,
    UpwardLaunch,
    DownwardLaunch,
    RotatingLift,
    FreefallDrop,
    BoatHire,
    Race,
    Dodgems,
    Swing,
    Rotation,
    ForwardRotation,
    BackwardRotation,
    FilmShow,
    Circus,
    SpaceRings,
    HauntedHouse,
    CrookedHouse,
    MiniGolf,
}

impl RideMode {
    pub fn is_block_sectioned(self) -> bool {
        matches!(
            self,
            RideMode::ContinuousCircuitBlockSectioned | RideMode::PoweredLaunchBlockSectioned
        )
    }

    /// Flat rides run a self-contained operating loop instead of the track
    /// integrator.
    pub fn is_flat_ride_cycle(self) -> bool {
        matches!(
            self,
            RideMode::Swing
                | RideMode::Rotation
                | RideMode::ForwardRotation
                | RideMode::BackwardRotation
                | RideMode::FilmShow
                | RideMode::Circus
                | RideMode::SpaceRings
                | RideMode::HauntedHouse
                | RideMode::CrookedHouse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideStatus {
    Closed,
    Open,
    Testing,
    Simulating,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartFlags(pub u8);

impl DepartFlags {
    pub const WAIT_FOR_LOAD_MASK: u8 = 7;
    pub const WAIT_FOR_LOAD: DepartFlags = DepartFlags(1 << 3);
    pub const LEAVE_WHEN_ANOTHER_ARRIVES: DepartFlags = DepartFlags(1 << 4);
    pub const SYNCHRONISE_WITH_ADJACENT_STATIONS: DepartFlags = DepartFlags(1 << 5);
    pub const WAIT_FOR_MINIMUM_LENGTH: DepartFlags = DepartFlags(1 << 6);
    pub const WAIT_FOR_MAXIMUM_LENGTH: DepartFlags = DepartFlags(1 << 7);

    pub fn contains(self, other: DepartFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn load_value(self) -> u8 {
        self.0 & Self::WAIT_FOR_LOAD_MASK
    }

    pub fn with(self, other: DepartFlags) -> DepartFlags {
        DepartFlags(self.0 | other.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideLifecycle(pub u32);

impl RideLifecycle {
    pub const ON_TRACK: RideLifecycle = RideLifecycle(1 << 0);
    pub const TESTED: RideLifecycle = RideLifecycle(1 << 1);
    pub const TEST_IN_PROGRESS: RideLifecycle = RideLifecycle(1 << 2);
    pub const BREAKDOWN_PENDING: RideLifecycle = RideLifecycle(1 << 3);
    pub const BROKEN_DOWN: RideLifecycle = RideLifecycle(1 << 4);
    pub const CRASHED: RideLifecycle = RideLifecycle(1 << 5);
    pub const HAS_STALLED_VEHICLE: RideLifecycle = RideLifecycle(1 << 6);
    pub const PASS_STATION_NO_STOPPING: RideLifecycle = RideLifecycle(1 << 7);

    pub fn contains(self, other: RideLifecycle) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: RideLifecycle) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: RideLifecycle) {
        self.0 &= !other.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakdownReason {
    None,
    SafetyCutOut,
    RestraintsStuckClosed,
    RestraintsStuckOpen,
    DoorsStuckClosed,
    VehicleMalfunction,
    BrakesFailure,
    ControlFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MechanicStatus {
    Undefined,
    Calling,
    Heading,
    Fixing,
    HasFixedStationBrakes,
}

pub const STATION_DEPART_FLAG: u8 = 1 << 7;
pub const STATION_DEPART_MASK: u8 = STATION_DEPART_FLAG;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub start: CoordsXYZD,
    pub length: u8,
    /// High bit: trains may depart. Low bits: reload countdown.
    pub depart: u8,
    pub train_at_station: Option<u8>,
    pub has_entrance: bool,
}

impl Station {
    pub fn new(start: CoordsXYZD) -> Self {
        Self {
            start,
            length: 1,
            depart: 0,
            train_at_station: None,
            has_entrance: true,
        }
    }

    pub fn depart_flag(&self) -> bool {
        self.depart & STATION_DEPART_FLAG != 0
    }

    pub fn start_coords(&self) -> CoordsXYZ {
        self.start.coords()
    }
}

/// Per-ride-type behaviour the integrator reads. The original keeps these
/// in a ride-type descriptor table; rides here embed a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideTypeInfo {
    pub has_load_options: bool,
    pub no_test_mode: bool,
    pub check_for_stalling: bool,
    pub allow_multiple_circuits: bool,
    pub has_lsm_behaviour_on_flat: bool,
    pub has_inverted_variant: bool,
    /// Shift applied to the launch speed when deriving launch acceleration.
    pub launch_acceleration_factor: u8,
    pub booster_acceleration: i32,
    pub powered_lift_acceleration: i32,
    /// Multiplier applied to the booster element speed setting.
    pub booster_speed_factor: i32,
    pub vehicle_z_offset: i32,
}

impl Default for RideTypeInfo {
    fn default() -> Self {
        Self {
            has_load_options: true,
            no_test_mode: false,
            check_for_stalling: true,
            allow_multiple_circuits: false,
            has_lsm_behaviour_on_flat: false,
            has_inverted_variant: false,
            launch_acceleration_factor: 12,
            booster_acceleration: 8,
            powered_lift_acceleration: 9,
            booster_speed_factor: 2,
            vehicle_z_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub mode: RideMode,
    pub status: RideStatus,
    pub type_info: RideTypeInfo,
    pub depart_flags: DepartFlags,
    pub min_waiting_time: u8,
    pub max_waiting_time: u8,
    pub stations: Vec<Station>,
    /// Train heads, in ride order. The trains themselves form a ring via
    /// the vehicles' prev/next-on-ride links.
    pub vehicles: Vec<EntityId>,
    pub num_circuits: u8,
    pub launch_speed: u8,
    pub lift_hill_speed: u8,
    /// Chairlift / powered-vehicle target speed.
    pub speed: u8,
    pub lifecycle: RideLifecycle,
    pub breakdown_reason_pending: BreakdownReason,
    pub breakdown_reason: BreakdownReason,
    pub mechanic_status: MechanicStatus,
    pub inspection_station: StationIndex,
    pub chairlift_bullwheel: [CoordsXYZ; 2],
    pub current_test_segment: u8,
    pub current_test_station: StationIndex,
    pub cable_lift: Option<EntityId>,
}

impl Ride {
    pub fn new(id: RideId, mode: RideMode) -> Self {
        Self {
            id,
            mode,
            status: RideStatus::Closed,
            type_info: RideTypeInfo::default(),
            depart_flags: DepartFlags::default(),
            min_waiting_time: 10,
            max_waiting_time: 60,
            stations: Vec::new(),
            vehicles: Vec::new(),
            num_circuits: 1,
            launch_speed: 20,
            lift_hill_speed: 5,
            speed: 5,
            lifecycle: RideLifecycle::default(),
            breakdown_reason_pending: BreakdownReason::None,
            breakdown_reason: BreakdownReason::None,
            mechanic_status: MechanicStatus::Undefined,
            inspection_station: StationIndex(0),
            chairlift_bullwheel: [CoordsXYZ::default(); 2],
            current_test_segment: 0,
            current_test_station: StationIndex(0),
            cable_lift: None,
        }
    }

    pub fn is_block_sectioned(&self) -> bool {
        self.mode.is_block_sectioned()
    }

    pub fn station(&self, index: StationIndex) -> &Station {
        &self.stations[index.0 as usize]
    }

    pub fn station_mut(&mut self, index: StationIndex) -> &mut Station {
        &mut self.stations[index.0 as usize]
    }

    pub fn num_trains(&self) -> usize {
        self.vehicles.len()
    }

    pub fn train_index_of(&self, head: EntityId) -> Option<usize> {
        self.vehicles.iter().position(|&id| id == head)
    }
}

/// Flags on the ride object (shared by all cars of the entry).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideEntryFlags(pub u32);

impl RideEntryFlags {
    pub const PLAY_DEPART_SOUND: RideEntryFlags = RideEntryFlags(1 << 0);
    pub const PLAY_SPLASH_SOUND: RideEntryFlags = RideEntryFlags(1 << 1);
    pub const PLAY_SPLASH_SOUND_SLIDE: RideEntryFlags = RideEntryFlags(1 << 2);
    pub const RIDER_CONTROLS_SPEED: RideEntryFlags = RideEntryFlags(1 << 3);
    pub const DISABLE_COLLISION_CRASHES: RideEntryFlags = RideEntryFlags(1 << 4);

    pub fn contains(self, other: RideEntryFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarFlags(pub u32);

impl CarFlags {
    pub const POWERED: CarFlags = CarFlags(1 << 0);
    pub const SWINGING: CarFlags = CarFlags(1 << 1);
    pub const SPINNING: CarFlags = CarFlags(1 << 2);
    pub const NO_UPSTOP_WHEELS: CarFlags = CarFlags(1 << 3);
    pub const NO_UPSTOP_BOBSLEIGH: CarFlags = CarFlags(1 << 4);
    pub const CHAIRLIFT: CarFlags = CarFlags(1 << 5);
    pub const GO_KART: CarFlags = CarFlags(1 << 6);
    pub const WATER_RIDE: CarFlags = CarFlags(1 << 7);
    pub const BOAT_HIRE_COLLISION_DETECTION: CarFlags = CarFlags(1 << 8);
    pub const MINI_GOLF: CarFlags = CarFlags(1 << 9);
    pub const SUSPENDED_SWING: CarFlags = CarFlags(1 << 10);
    pub const WOODEN_WILD_MOUSE_SWING: CarFlags = CarFlags(1 << 11);
    pub const SLIDE_SWING: CarFlags = CarFlags(1 << 12);
    pub const LIFT: CarFlags = CarFlags(1 << 13);
    pub const POWERED_RIDE_UNRESTRICTED_GRAVITY: CarFlags = CarFlags(1 << 14);
    pub const VEHICLE_ANIMATION: CarFlags = CarFlags(1 << 15);
    pub const RIDER_ANIMATION: CarFlags = CarFlags(1 << 16);

    pub const fn union_with(self, other: CarFlags) -> CarFlags {
        CarFlags(self.0 | other.0)
    }

    pub fn contains(self, other: CarFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarEntry {
    pub flags: CarFlags,
    /// Contribution to the train's friction mass.
    pub mass: u16,
    pub num_seats: u8,
    pub powered_acceleration: u8,
    pub powered_max_speed: u8,
    pub spinning_inertia: u8,
    pub spinning_friction: u8,
    /// Entry index drawn when the car runs reversed (log flume reverser).
    pub reversed_car_index: u8,
    /// Half-length used by the collision scan.
    pub collision_radius: u16,
    pub base_image: u32,
    pub sprite_width: u8,
    pub sprite_height: u8,
    pub sound_range: u8,
}

impl Default for CarEntry {
    fn default() -> Self {
        Self {
            flags: CarFlags::default(),
            mass: 100,
            num_seats: 4,
            powered_acceleration: 0,
            powered_max_speed: 0,
            spinning_inertia: 5,
            spinning_friction: 4,
            reversed_car_index: 0,
            collision_radius: 80,
            base_image: 0,
            sprite_width: 24,
            sprite_height: 16,
            sound_range: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEntry {
    pub flags: RideEntryFlags,
    pub cars: Vec<CarEntry>,
}

impl RideEntry {
    pub fn car(&self, index: usize) -> &CarEntry {
        &self.cars[index.min(self.cars.len() - 1)]
    }
}

/// All rides in the park, indexed by `RideId`.
#[derive(Debug, Default, Clone)]
pub struct RideList {
    rides: Vec<(Ride, RideEntry)>,
}

impl RideList {
    pub fn add(&mut self, mut ride: Ride, entry: RideEntry) -> RideId {
        let id = RideId(self.rides.len() as u16);
        ride.id = id;
        self.rides.push((ride, entry));
        id
    }

    pub fn get(&self, id: RideId) -> Option<&Ride> {
        self.rides.get(id.0 as usize).map(|(ride, _)| ride)
    }

    pub fn get_mut(&mut self, id: RideId) -> Option<&mut Ride> {
        self.rides.get_mut(id.0 as usize).map(|(ride, _)| ride)
    }

    pub fn entry(&self, id: RideId) -> Option<&RideEntry> {
        self.rides.get(id.0 as usize).map(|(_, entry)| entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ride> {
        self.rides.iter().map(|(ride, _)| ride)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ride> {
        self.rides.iter_mut().map(|(ride, _)| ride)
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depart_flag_composition() {
        let flags = DepartFlags(2)
            .with(DepartFlags::WAIT_FOR_LOAD)
            .with(DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS);
        assert!(flags.contains(DepartFlags::WAIT_FOR_LOAD));
        assert!(flags.contains(DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS));
        assert!(!flags.contains(DepartFlags::WAIT_FOR_MAXIMUM_LENGTH));
        assert_eq!(flags.load_value(), 2);
    }

    #[test]
    fn block_sectioned_modes() {
        assert!(RideMode::ContinuousCircuitBlockSectioned.is_block_sectioned());
        assert!(RideMode::PoweredLaunchBlockSectioned.is_block_sectioned());
        assert!(!RideMode::ContinuousCircuit.is_block_sectioned());
    }

    #[test]
    fn ride_list_assigns_ids_in_order() {
        let mut rides = RideList::default();
        let entry = RideEntry {
            flags: RideEntryFlags::default(),
            cars: vec![CarEntry::default()],
        };
        let a = rides.add(Ride::new(RideId(0), RideMode::ContinuousCircuit), entry.clone());
        let b = rides.add(Ride::new(RideId(0), RideMode::BoatHire), entry);
        assert_eq!(a, RideId(0));
        assert_eq!(b, RideId(1));
        assert_eq!(rides.get(b).unwrap().mode, RideMode::BoatHire);
    }
}
