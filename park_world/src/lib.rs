pub mod coords;
pub mod entity;
pub mod map;
pub mod ride;
pub mod track;

pub use coords::{
    coords_3d_to_2d, direction_next, direction_reverse, CoordsXY, CoordsXYZ, CoordsXYZD,
    Direction, COORDS_XY_STEP, COORDS_Z_STEP, DIRECTION_DELTA,
};
pub use entity::{
    CarSubposition, Effect, EffectKind, Entity, EntityArena, EntityId, Litter, Peep, Vehicle,
    VehicleFlags, VehicleStatus,
};
pub use map::{DoorState, TileMap, TrackElement};
pub use ride::{
    BreakdownReason, CarEntry, CarFlags, DepartFlags, MechanicStatus, Ride, RideEntry,
    RideEntryFlags, RideId, RideLifecycle, RideList, RideMode, RideStatus, RideTypeInfo, Station,
    StationIndex, STATION_DEPART_FLAG,
};
pub use track::{SpinFunction, TrackDef, TrackFlags, TrackPitch, TrackRoll, TrackType};
