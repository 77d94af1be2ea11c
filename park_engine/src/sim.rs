//! The simulation context: world, rides, entities and per-tick outputs in
//! one place, threaded by reference through the integrator and the state
//! machine instead of living in globals.

use serde::Serialize;

use park_world::coords::CoordsXYZ;
use park_world::entity::{
    CarSubposition, Effect, EffectKind, Entity, EntityArena, EntityId, Vehicle, VehicleStatus,
};
use park_world::map::TileMap;
use park_world::ride::{CarEntry, Ride, RideEntry, RideId, RideList};

use crate::events::TickEvents;
use crate::status;
use crate::util::Rng;

pub struct Simulation {
    pub world: TileMap,
    pub rides: RideList,
    pub entities: EntityArena,
    pub events: TickEvents,
    pub rng: Rng,
    pub current_tick: u32,
}

/// One vehicle's state sampled for logs and regression tests.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleSample {
    pub tick: u32,
    pub train: usize,
    pub position: [i32; 3],
    pub velocity: i32,
    pub status: String,
    pub track_progress: u16,
}

impl Simulation {
    pub fn new(world: TileMap) -> Self {
        Self {
            world,
            rides: RideList::default(),
            entities: EntityArena::new(),
            events: TickEvents::default(),
            rng: Rng::new(0x600D5EED),
            current_tick: 0,
        }
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.entities.vehicle(id)
    }

    pub fn vehicle_mut(&mut self, id: EntityId) -> Option<&mut Vehicle> {
        self.entities.vehicle_mut(id)
    }

    pub fn ride(&self, id: RideId) -> Option<&Ride> {
        self.rides.get(id)
    }

    pub fn ride_mut(&mut self, id: RideId) -> Option<&mut Ride> {
        self.rides.get_mut(id)
    }

    pub fn ride_entry(&self, id: RideId) -> Option<&RideEntry> {
        self.rides.entry(id)
    }

    pub fn car_entry(&self, vehicle: &Vehicle) -> Option<&CarEntry> {
        self.rides
            .entry(vehicle.ride)
            .map(|entry| entry.car(vehicle.car_entry_index))
    }

    /// The cars of a train from head to tail.
    pub fn train_cars(&self, head: EntityId) -> Vec<EntityId> {
        let mut cars = Vec::new();
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            let Some(vehicle) = self.vehicle(id) else {
                break;
            };
            cars.push(id);
            cursor = vehicle.next_vehicle_on_train;
        }
        cars
    }

    pub fn train_tail(&self, head: EntityId) -> EntityId {
        *self.train_cars(head).last().unwrap_or(&head)
    }

    /// Walk to the head of the train a car belongs to.
    pub fn train_head_of(&self, car: EntityId) -> EntityId {
        let mut cursor = car;
        for _ in 0..1024 {
            let Some(vehicle) = self.vehicle(cursor) else {
                return cursor;
            };
            if vehicle.is_head {
                return cursor;
            }
            let Some(previous) = vehicle.prev_vehicle_on_ride else {
                return cursor;
            };
            cursor = previous;
        }
        cursor
    }

    /// Move a vehicle and keep the spatial index current.
    pub fn move_vehicle_to(&mut self, id: EntityId, position: CoordsXYZ) {
        self.entities.move_entity(id, position);
    }

    /// Station depart gates reload on a 32-tick cadence; when the
    /// countdown written at departure expires the gate reopens.
    fn update_station_gates(&mut self) {
        if self.current_tick & 31 != 0 {
            return;
        }
        for ride in self.rides.iter_mut() {
            for station in &mut ride.stations {
                let countdown = station.depart & !park_world::ride::STATION_DEPART_FLAG;
                if countdown > 0 {
                    station.depart -= 1;
                } else {
                    station.depart |= park_world::ride::STATION_DEPART_FLAG;
                }
            }
        }
    }

    /// Advance the whole park one tick: every train's head runs its status
    /// update, then the ambient effect entities animate. Painting reads the
    /// world strictly after this returns.
    pub fn update_all_vehicles(&mut self) {
        self.current_tick = self.current_tick.wrapping_add(1);
        self.update_station_gates();

        let mut heads: Vec<EntityId> = Vec::new();
        let ride_ids: Vec<RideId> = self.rides.iter().map(|ride| ride.id).collect();
        for ride_id in ride_ids {
            if let Some(ride) = self.rides.get(ride_id) {
                heads.extend(ride.vehicles.iter().copied());
                if let Some(cable_lift) = ride.cable_lift {
                    heads.push(cable_lift);
                }
            }
        }
        for head in heads {
            status::update_vehicle(self, head);
        }

        self.update_effects();
    }

    /// Crash particles fall and fade, clouds and splashes play out their
    /// frame sequences, money effects float up.
    fn update_effects(&mut self) {
        let ids: Vec<EntityId> = self
            .entities
            .iter_ids()
            .filter(|&id| matches!(self.entities.get(id), Some(Entity::Effect(_))))
            .collect();

        for id in ids {
            let Some(Entity::Effect(effect)) = self.entities.get(id) else {
                continue;
            };
            let mut position = effect.position;
            let mut despawn = false;
            let mut kind = effect.kind.clone();

            match &mut kind {
                EffectKind::CrashParticle {
                    time_to_live,
                    velocity,
                    frame,
                    ..
                } => {
                    if *time_to_live == 0 {
                        despawn = true;
                    } else {
                        *time_to_live -= 1;
                        *frame = (*frame + 1) % 12;
                        velocity.z -= 2;
                        position.x += velocity.x / 16;
                        position.y += velocity.y / 16;
                        position.z = (position.z + velocity.z / 16).max(0);
                    }
                }
                EffectKind::ExplosionCloud { frame } | EffectKind::ExplosionFlare { frame } => {
                    *frame += 1;
                    if *frame >= 12 {
                        despawn = true;
                    }
                }
                EffectKind::CrashSplash { frame } => {
                    *frame += 1;
                    if *frame >= 10 {
                        despawn = true;
                    }
                }
                EffectKind::SteamParticle { time_to_move, frame } => {
                    *time_to_move += 1;
                    if *time_to_move >= 4 {
                        *time_to_move = 0;
                        position.z += 1;
                        *frame += 1;
                        if *frame >= 10 {
                            despawn = true;
                        }
                    }
                }
                EffectKind::MoneyEffect {
                    vertical_progress, ..
                } => {
                    *vertical_progress += 1;
                    if *vertical_progress > 110 {
                        despawn = true;
                    }
                }
            }

            if despawn {
                self.entities.despawn(id);
            } else {
                if let Some(Entity::Effect(effect)) = self.entities.get_mut(id) {
                    effect.kind = kind;
                }
                self.entities.move_entity(id, position);
            }
        }
    }

    pub fn spawn_effect(&mut self, position: CoordsXYZ, kind: EffectKind) -> EntityId {
        self.entities
            .spawn(Entity::Effect(Effect { position, kind }))
    }

    /// Per-tick log samples for every train of every ride.
    pub fn sample_vehicles(&self) -> Vec<VehicleSample> {
        let mut samples = Vec::new();
        for ride in self.rides.iter() {
            for (train, &head) in ride.vehicles.iter().enumerate() {
                if let Some(vehicle) = self.vehicle(head) {
                    samples.push(VehicleSample {
                        tick: self.current_tick,
                        train,
                        position: [vehicle.position.x, vehicle.position.y, vehicle.position.z],
                        velocity: vehicle.velocity,
                        status: format!("{:?}", vehicle.status),
                        track_progress: vehicle.track_progress,
                    });
                }
            }
        }
        samples
    }
}

/// Spawn one train on a ride: `car_count` cars chained head to tail, the
/// head linked into the ride's train ring.
pub fn spawn_train(
    sim: &mut Simulation,
    ride_id: RideId,
    car_count: usize,
    start: CoordsXYZ,
    subposition: CarSubposition,
) -> Option<EntityId> {
    let entry = sim.rides.entry(ride_id)?.clone();
    let mut ids: Vec<EntityId> = Vec::with_capacity(car_count);

    for index in 0..car_count {
        let car_entry = entry.car(index);
        let mut vehicle = Vehicle::new(ride_id, index.min(entry.cars.len() - 1), start);
        vehicle.is_head = index == 0;
        vehicle.mass = car_entry.mass;
        vehicle.num_seats = car_entry.num_seats;
        vehicle.collision_radius = car_entry.collision_radius;
        vehicle.speed = car_entry.powered_max_speed;
        vehicle.powered_acceleration = car_entry.powered_acceleration;
        vehicle.subposition = subposition;
        vehicle.status = VehicleStatus::MovingToEndOfStation;
        if let Some(element) = sim.world.any_track_element_at(start) {
            vehicle.track_type = element.track_type;
            vehicle.track_direction = element.direction;
        }
        vehicle.track_location = start;
        ids.push(sim.entities.spawn(Entity::Vehicle(vehicle)));
    }

    // Chain the cars, then splice the train into the ride ring.
    for window in ids.windows(2) {
        if let Some(car) = sim.entities.vehicle_mut(window[0]) {
            car.next_vehicle_on_train = Some(window[1]);
        }
        if let Some(car) = sim.entities.vehicle_mut(window[1]) {
            car.prev_vehicle_on_ride = Some(window[0]);
        }
        if let Some(car) = sim.entities.vehicle_mut(window[0]) {
            car.next_vehicle_on_ride = Some(window[1]);
        }
    }

    let head = *ids.first()?;
    let tail = *ids.last()?;

    let ride = sim.rides.get_mut(ride_id)?;
    ride.vehicles.push(head);
    let trains: Vec<EntityId> = ride.vehicles.clone();

    // Close the ring: each tail points at the next train's head.
    if trains.len() == 1 {
        if let Some(car) = sim.entities.vehicle_mut(tail) {
            car.next_vehicle_on_ride = Some(head);
        }
        if let Some(car) = sim.entities.vehicle_mut(head) {
            car.prev_vehicle_on_ride = Some(tail);
        }
    } else {
        let first_head = trains[0];
        let previous_head = trains[trains.len() - 2];
        let previous_tail = sim.train_tail(previous_head);
        if let Some(car) = sim.entities.vehicle_mut(previous_tail) {
            car.next_vehicle_on_ride = Some(head);
        }
        if let Some(car) = sim.entities.vehicle_mut(head) {
            car.prev_vehicle_on_ride = Some(previous_tail);
        }
        if let Some(car) = sim.entities.vehicle_mut(tail) {
            car.next_vehicle_on_ride = Some(first_head);
        }
        if let Some(car) = sim.entities.vehicle_mut(first_head) {
            car.prev_vehicle_on_ride = Some(tail);
        }
    }

    Some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::ride::{RideEntryFlags, RideMode};

    fn basic_ride(sim: &mut Simulation) -> RideId {
        sim.rides.add(
            Ride::new(RideId(0), RideMode::ContinuousCircuit),
            RideEntry {
                flags: RideEntryFlags::default(),
                cars: vec![CarEntry::default()],
            },
        )
    }

    #[test]
    fn trains_chain_and_close_the_ride_ring() {
        let mut sim = Simulation::new(TileMap::new(32));
        let ride = basic_ride(&mut sim);
        let head_a = spawn_train(&mut sim, ride, 3, CoordsXYZ::new(64, 0, 0), CarSubposition::Default)
            .expect("train a");
        let head_b = spawn_train(&mut sim, ride, 2, CoordsXYZ::new(128, 0, 0), CarSubposition::Default)
            .expect("train b");

        let cars_a = sim.train_cars(head_a);
        assert_eq!(cars_a.len(), 3);
        let tail_a = sim.train_tail(head_a);
        assert_eq!(sim.vehicle(tail_a).unwrap().next_vehicle_on_ride, Some(head_b));
        let tail_b = sim.train_tail(head_b);
        assert_eq!(sim.vehicle(tail_b).unwrap().next_vehicle_on_ride, Some(head_a));
        assert_eq!(sim.vehicle(head_a).unwrap().prev_vehicle_on_ride, Some(tail_b));

        // Any car resolves its own head.
        assert_eq!(sim.train_head_of(cars_a[2]), head_a);
    }

    #[test]
    fn effects_despawn_when_played_out() {
        let mut sim = Simulation::new(TileMap::new(32));
        let cloud = sim.spawn_effect(
            CoordsXYZ::new(64, 64, 16),
            EffectKind::ExplosionCloud { frame: 0 },
        );
        for _ in 0..12 {
            sim.update_effects();
        }
        assert!(sim.entities.get(cloud).is_none());
    }
}
