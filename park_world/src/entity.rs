//! The entity pool. Everything that moves lives in one arena addressed by
//! generational ids, so stale references from train links or ride lists are
//! caught as `None` instead of silently aliasing a recycled slot. A spatial
//! index over 32x32-unit tiles backs both the collision scan and the
//! painter's per-tile dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coords::{CoordsXY, CoordsXYZ, Direction, COORDS_XY_STEP};
use crate::ride::{RideId, StationIndex};
use crate::track::TrackType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

/// Which lane of the move-info tables a car follows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CarSubposition {
    #[default]
    Default,
    ChairliftGoingOut,
    ChairliftGoingBack,
    ChairliftEndBullwheel,
    ChairliftStartBullwheel,
    GoKartsLeftLane,
    GoKartsRightLane,
    GoKartsMovingToRightLane,
    GoKartsMovingToLeftLane,
    MiniGolfPathA,
    MiniGolfBallPathA,
    MiniGolfPathB,
    MiniGolfBallPathB,
    MiniGolfPathC,
    MiniGolfBallPathC,
    ReverserFrontBogie,
    ReverserRearBogie,
}

impl CarSubposition {
    pub fn is_chairlift(self) -> bool {
        matches!(
            self,
            CarSubposition::ChairliftGoingOut
                | CarSubposition::ChairliftGoingBack
                | CarSubposition::ChairliftEndBullwheel
                | CarSubposition::ChairliftStartBullwheel
        )
    }

    pub fn is_go_kart_lane(self) -> bool {
        matches!(
            self,
            CarSubposition::GoKartsLeftLane
                | CarSubposition::GoKartsRightLane
                | CarSubposition::GoKartsMovingToRightLane
                | CarSubposition::GoKartsMovingToLeftLane
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    MovingToEndOfStation,
    WaitingForPassengers,
    WaitingToDepart,
    Departing,
    Travelling,
    Arriving,
    UnloadingPassengers,
    TravellingBoat,
    TravellingDodgems,
    TravellingCableLift,
    WaitingForCableLift,
    Swinging,
    Rotating,
    FerrisWheelRotating,
    SimulatorOperating,
    SpaceRingsOperating,
    TopSpinOperating,
    HauntedHouseOperating,
    CrookedHouseOperating,
    ShowingFilm,
    DoingCircusShow,
    Crashing,
    Crashed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleFlags(pub u32);

impl VehicleFlags {
    pub const ON_LIFT_HILL: VehicleFlags = VehicleFlags(1 << 0);
    pub const COLLISION_DISABLED: VehicleFlags = VehicleFlags(1 << 1);
    pub const MOVE_SINGLE_CAR: VehicleFlags = VehicleFlags(1 << 2);
    pub const CRASHED: VehicleFlags = VehicleFlags(1 << 3);
    pub const TESTING: VehicleFlags = VehicleFlags(1 << 4);
    pub const TRAIN_IS_BROKEN: VehicleFlags = VehicleFlags(1 << 5);
    pub const STOPPED_ON_LIFT: VehicleFlags = VehicleFlags(1 << 6);
    pub const STOPPED_ON_HOLDING_BRAKE: VehicleFlags = VehicleFlags(1 << 7);
    pub const CURRENTLY_COLLIDING: VehicleFlags = VehicleFlags(1 << 8);
    pub const WAITING_ON_ADJACENT_STATION: VehicleFlags = VehicleFlags(1 << 9);
    pub const POWERED_CAR_IN_REVERSE: VehicleFlags = VehicleFlags(1 << 10);
    pub const REVERSE_INCLINE_COMPLETED_LAP: VehicleFlags = VehicleFlags(1 << 11);
    pub const CAR_IS_REVERSED: VehicleFlags = VehicleFlags(1 << 12);
    pub const CAR_IS_INVERTED: VehicleFlags = VehicleFlags(1 << 13);
    pub const SPINNING_IS_LOCKED: VehicleFlags = VehicleFlags(1 << 14);
    pub const READY_TO_DEPART: VehicleFlags = VehicleFlags(1 << 15);

    pub fn contains(self, other: VehicleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: VehicleFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: VehicleFlags) {
        self.0 &= !other.0;
    }

    pub fn toggle(&mut self, other: VehicleFlags) {
        self.0 ^= other.0;
    }
}

/// One car of a train. Train topology is the `next_vehicle_on_train` chain
/// (head to tail) plus the ride-wide ring through
/// `prev_vehicle_on_ride`/`next_vehicle_on_ride`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub ride: RideId,
    pub car_entry_index: usize,
    pub is_head: bool,
    pub position: CoordsXYZ,
    /// 5-bit compass sprite direction.
    pub orientation: u8,
    pub pitch: u8,
    pub bank_rotation: u8,
    pub velocity: i32,
    pub acceleration: i32,
    pub mass: u16,
    pub remaining_distance: i32,
    pub track_location: CoordsXYZ,
    pub track_type: TrackType,
    pub track_direction: Direction,
    pub track_progress: u16,
    pub subposition: CarSubposition,
    pub status: VehicleStatus,
    pub sub_state: u8,
    pub flags: VehicleFlags,
    pub swing_position: i16,
    pub swing_speed: i16,
    pub swing_sprite: u8,
    pub spin_speed: i16,
    pub spin_sprite: u8,
    pub num_peeps: u8,
    pub next_free_seat: u8,
    pub num_seats: u8,
    pub peeps: Vec<EntityId>,
    pub next_vehicle_on_train: Option<EntityId>,
    pub prev_vehicle_on_ride: Option<EntityId>,
    pub next_vehicle_on_ride: Option<EntityId>,
    pub current_station: StationIndex,
    pub num_laps: u8,
    pub num_launches: u8,
    pub lost_time_out: u16,
    /// Ticks spent in the current waiting/arrival phase.
    pub time_waiting: u16,
    pub brake_speed: u8,
    pub block_brake_speed: u8,
    pub vertical_drop_countdown: i16,
    pub collision_detection_timer: u16,
    /// Half-length for the collision scan, from the car entry.
    pub collision_radius: u16,
    pub animation_state: u32,
    pub animation_frame: u8,
    pub crash_velocity: CoordsXYZ,
    pub seat_rotation: u8,
    pub target_seat_rotation: u8,
    pub speed: u8,
    pub powered_acceleration: u8,
    pub boat_target: CoordsXY,
    pub mini_golf_hold: u8,
    pub restraints_position: u8,
    pub colours: [u8; 2],
}

impl Vehicle {
    pub fn new(ride: RideId, car_entry_index: usize, position: CoordsXYZ) -> Self {
        Self {
            ride,
            car_entry_index,
            is_head: false,
            position,
            orientation: 0,
            pitch: 0,
            bank_rotation: 0,
            velocity: 0,
            acceleration: 0,
            mass: 100,
            remaining_distance: 0,
            track_location: position,
            track_type: TrackType::Flat,
            track_direction: 0,
            track_progress: 0,
            subposition: CarSubposition::Default,
            status: VehicleStatus::MovingToEndOfStation,
            sub_state: 0,
            flags: VehicleFlags::default(),
            swing_position: 0,
            swing_speed: 0,
            swing_sprite: 0,
            spin_speed: 0,
            spin_sprite: 0,
            num_peeps: 0,
            next_free_seat: 0,
            num_seats: 0,
            peeps: Vec::new(),
            next_vehicle_on_train: None,
            prev_vehicle_on_ride: None,
            next_vehicle_on_ride: None,
            current_station: StationIndex(0),
            num_laps: 0,
            num_launches: 0,
            lost_time_out: 0,
            time_waiting: 0,
            brake_speed: 0,
            block_brake_speed: 0,
            vertical_drop_countdown: 0,
            collision_detection_timer: 0,
            collision_radius: 80,
            animation_state: 0,
            animation_frame: 0,
            crash_velocity: CoordsXYZ::default(),
            seat_rotation: 4,
            target_seat_rotation: 4,
            speed: 0,
            powered_acceleration: 0,
            boat_target: CoordsXY::default(),
            mini_golf_hold: 0,
            restraints_position: 0,
            colours: [0, 0],
        }
    }

    pub fn has_flag(&self, flag: VehicleFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_state(&mut self, status: VehicleStatus, sub_state: u8) {
        self.status = status;
        self.sub_state = sub_state;
    }

    /// Packed type-and-direction key into the move-info tables.
    pub fn track_type_and_direction(&self) -> (TrackType, Direction) {
        (self.track_type, self.track_direction)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peep {
    pub position: CoordsXYZ,
    pub direction: u8,
    pub animation_frame: u8,
    pub tshirt_colour: u8,
    pub trousers_colour: u8,
    /// Seat in the vehicle the peep is riding, if any.
    pub riding: Option<EntityId>,
}

impl Peep {
    pub fn new(position: CoordsXYZ) -> Self {
        Self {
            position,
            direction: 0,
            animation_frame: 0,
            tshirt_colour: 0,
            trousers_colour: 0,
            riding: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Litter {
    pub position: CoordsXYZ,
    pub kind: u8,
    pub creation_tick: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EffectKind {
    CrashParticle {
        time_to_live: u16,
        velocity: CoordsXYZ,
        colours: [u8; 2],
        frame: u8,
    },
    ExplosionCloud {
        frame: u8,
    },
    ExplosionFlare {
        frame: u8,
    },
    CrashSplash {
        frame: u8,
    },
    SteamParticle {
        time_to_move: u8,
        frame: u8,
    },
    MoneyEffect {
        value: i32,
        vertical_progress: i16,
        offset_x: i16,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub position: CoordsXYZ,
    pub kind: EffectKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Vehicle(Vehicle),
    Peep(Peep),
    Litter(Litter),
    Effect(Effect),
}

impl Entity {
    pub fn position(&self) -> CoordsXYZ {
        match self {
            Entity::Vehicle(vehicle) => vehicle.position,
            Entity::Peep(peep) => peep.position,
            Entity::Litter(litter) => litter.position,
            Entity::Effect(effect) => effect.position,
        }
    }

    fn set_position(&mut self, position: CoordsXYZ) {
        match self {
            Entity::Vehicle(vehicle) => vehicle.position = position,
            Entity::Peep(peep) => peep.position = position,
            Entity::Litter(litter) => litter.position = position,
            Entity::Effect(effect) => effect.position = position,
        }
    }

    pub fn as_vehicle(&self) -> Option<&Vehicle> {
        match self {
            Entity::Vehicle(vehicle) => Some(vehicle),
            _ => None,
        }
    }

    pub fn as_vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        match self {
            Entity::Vehicle(vehicle) => Some(vehicle),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

fn tile_key(pos: CoordsXYZ) -> (i32, i32) {
    (
        pos.x.div_euclid(COORDS_XY_STEP),
        pos.y.div_euclid(COORDS_XY_STEP),
    )
}

#[derive(Debug, Default, Clone)]
pub struct EntityArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    spatial: BTreeMap<(i32, i32), Vec<EntityId>>,
    len: usize,
}

impl EntityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let pos = entity.position();
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entity = Some(entity);
                EntityId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                EntityId {
                    index,
                    generation: 0,
                }
            }
        };
        self.spatial.entry(tile_key(pos)).or_default().push(id);
        self.len += 1;
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;

        let key = tile_key(entity.position());
        if let Some(bucket) = self.spatial.get_mut(&key) {
            if let Some(at) = bucket.iter().position(|&other| other == id) {
                bucket.swap_remove(at);
            }
        }
        Some(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entity.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entity.as_mut()
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.get(id).and_then(Entity::as_vehicle)
    }

    pub fn vehicle_mut(&mut self, id: EntityId) -> Option<&mut Vehicle> {
        self.get_mut(id).and_then(Entity::as_vehicle_mut)
    }

    /// Distinct mutable access to two entities, for pairwise updates such
    /// as the collision velocity exchange.
    pub fn get2_mut(
        &mut self,
        a: EntityId,
        b: EntityId,
    ) -> (Option<&mut Entity>, Option<&mut Entity>) {
        if a.index == b.index {
            return (None, None);
        }
        let (low, high, swapped) = if a.index < b.index {
            (a, b, false)
        } else {
            (b, a, true)
        };
        let (head, tail) = self.slots.split_at_mut(high.index as usize);
        let low_slot = head.get_mut(low.index as usize);
        let high_slot = tail.first_mut();

        let low_entity = low_slot.and_then(|slot| {
            if slot.generation == low.generation {
                slot.entity.as_mut()
            } else {
                None
            }
        });
        let high_entity = high_slot.and_then(|slot| {
            if slot.generation == high.generation {
                slot.entity.as_mut()
            } else {
                None
            }
        });

        if swapped {
            (high_entity, low_entity)
        } else {
            (low_entity, high_entity)
        }
    }

    /// Move an entity, keeping the spatial index current.
    pub fn move_entity(&mut self, id: EntityId, position: CoordsXYZ) {
        let Some(old_pos) = self.get(id).map(Entity::position) else {
            return;
        };
        let old_key = tile_key(old_pos);
        let new_key = tile_key(position);
        if old_key != new_key {
            if let Some(bucket) = self.spatial.get_mut(&old_key) {
                if let Some(at) = bucket.iter().position(|&other| other == id) {
                    bucket.swap_remove(at);
                }
            }
            self.spatial.entry(new_key).or_default().push(id);
        }
        if let Some(entity) = self.get_mut(id) {
            entity.set_position(position);
        }
    }

    /// Entities registered on the tile containing `pos`, in insertion order.
    pub fn ids_at_tile(&self, pos: CoordsXY) -> &[EntityId] {
        self.spatial
            .get(&tile_key(pos.with_z(0)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|_| EntityId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle_at(x: i32, y: i32) -> Entity {
        Entity::Vehicle(Vehicle::new(RideId(0), 0, CoordsXYZ::new(x, y, 0)))
    }

    #[test]
    fn stale_ids_do_not_alias_recycled_slots() {
        let mut arena = EntityArena::new();
        let first = arena.spawn(vehicle_at(0, 0));
        arena.despawn(first).expect("first despawn");

        let second = arena.spawn(vehicle_at(32, 0));
        assert_eq!(first.index, second.index, "slot should be recycled");
        assert!(arena.get(first).is_none(), "stale id must not resolve");
        assert!(arena.get(second).is_some());
    }

    #[test]
    fn spatial_index_follows_moves() {
        let mut arena = EntityArena::new();
        let id = arena.spawn(vehicle_at(16, 16));
        assert_eq!(arena.ids_at_tile(CoordsXY::new(0, 0)), &[id]);

        arena.move_entity(id, CoordsXYZ::new(70, 16, 0));
        assert!(arena.ids_at_tile(CoordsXY::new(0, 0)).is_empty());
        assert_eq!(arena.ids_at_tile(CoordsXY::new(64, 0)), &[id]);
        assert_eq!(arena.vehicle(id).unwrap().position.x, 70);
    }

    #[test]
    fn pairwise_mutation_reaches_both() {
        let mut arena = EntityArena::new();
        let a = arena.spawn(vehicle_at(0, 0));
        let b = arena.spawn(vehicle_at(32, 0));

        let (first, second) = arena.get2_mut(a, b);
        let first = first.unwrap().as_vehicle_mut().unwrap();
        let second = second.unwrap().as_vehicle_mut().unwrap();
        first.velocity = 100;
        second.velocity = -100;

        assert_eq!(arena.vehicle(a).unwrap().velocity, 100);
        assert_eq!(arena.vehicle(b).unwrap().velocity, -100);
    }

    #[test]
    fn despawn_removes_from_spatial_bucket() {
        let mut arena = EntityArena::new();
        let a = arena.spawn(vehicle_at(16, 16));
        let b = arena.spawn(vehicle_at(20, 20));
        arena.despawn(a);
        assert_eq!(arena.ids_at_tile(CoordsXY::new(0, 0)), &[b]);
        assert_eq!(arena.len(), 1);
    }
}
