//! The cable lift: a catch-car chain that hauls a coaster train up the
//! cable hill and returns for the next one. It runs its own small state
//! loop on the lift head and borrows the track integrator's primitives for
//! movement along the hill.

use park_world::coords::CoordsXYZ;
use park_world::entity::{Entity, EntityId, Vehicle, VehicleFlags, VehicleStatus};
use park_world::ride::RideId;
use park_world::track::TrackType;

use crate::motion::move_relative_distance;
use crate::move_info::DISTANCE_UNIT;
use crate::sim::Simulation;
use crate::track_iter::next_track_block;

/// Spacing between catch-car segments in distance units.
const SEGMENT_SPACING: i32 = 3;

/// Build the cable-lift chain at the foot of the cable hill and register
/// it on the ride. The head owns the state loop.
pub fn create_cable_lift(
    sim: &mut Simulation,
    ride_id: RideId,
    base: CoordsXYZ,
    segment_count: usize,
) -> Option<EntityId> {
    let element = sim.world.any_track_element_at(base)?.clone();
    if element.track_type != TrackType::CableLiftHill {
        return None;
    }

    let mut ids = Vec::with_capacity(segment_count);
    for index in 0..segment_count {
        let mut vehicle = Vehicle::new(ride_id, 0, base);
        vehicle.is_head = index == 0;
        vehicle.track_location = base;
        vehicle.track_type = element.track_type;
        vehicle.track_direction = element.direction;
        vehicle.mass = 100;
        vehicle.collision_radius = 80;
        vehicle.status = VehicleStatus::MovingToEndOfStation;
        vehicle.flags.set(VehicleFlags::COLLISION_DISABLED);
        ids.push(sim.entities.spawn(Entity::Vehicle(vehicle)));
    }
    for window in ids.windows(2) {
        if let Some(vehicle) = sim.entities.vehicle_mut(window[0]) {
            vehicle.next_vehicle_on_train = Some(window[1]);
        }
        if let Some(vehicle) = sim.entities.vehicle_mut(window[1]) {
            vehicle.prev_vehicle_on_ride = Some(window[0]);
        }
    }

    let head = *ids.first()?;
    // Fan the segments out along the hill.
    for (index, &id) in ids.iter().enumerate() {
        move_relative_distance(sim, id, SEGMENT_SPACING * DISTANCE_UNIT * index as i32);
    }

    if let Some(ride) = sim.ride_mut(ride_id) {
        ride.cable_lift = Some(head);
    }
    Some(head)
}

/// Is the lift head still on cable-hill track?
fn on_cable_hill(sim: &Simulation, id: EntityId) -> bool {
    sim.vehicle(id)
        .map(|vehicle| vehicle.track_type == TrackType::CableLiftHill)
        .unwrap_or(false)
}

fn at_hill_top(sim: &Simulation, id: EntityId) -> bool {
    let Some(vehicle) = sim.vehicle(id) else {
        return false;
    };
    let Some(element) = sim
        .world
        .track_element_at(vehicle.track_location, vehicle.track_type)
    else {
        return true;
    };
    match next_track_block(&sim.world, vehicle.track_location, element) {
        Some(next) => next.element.track_type != TrackType::CableLiftHill,
        None => true,
    }
}

/// The lift's own state loop, dispatched from the vehicle updater.
pub fn update_cable_lift(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let status = vehicle.status;
    let lift_speed = sim
        .ride(ride_id)
        .map(|ride| i32::from(ride.lift_hill_speed) * 31079)
        .unwrap_or(31079);

    match status {
        // Settle to the foot of the hill after creation.
        VehicleStatus::MovingToEndOfStation => {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.velocity = 0;
                vehicle.set_state(VehicleStatus::WaitingToDepart, 0);
            }
        }
        // Idle at the bottom until a train is coupled by the state
        // machine (which flips the lift to Departing).
        VehicleStatus::WaitingToDepart => {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.velocity = 0;
                vehicle.acceleration = 0;
            }
        }
        // Hauling: crawl up the hill at the lift speed.
        VehicleStatus::Departing => {
            move_relative_distance(sim, id, (lift_speed >> 10) * 42);
            if at_hill_top(sim, id) || !on_cable_hill(sim, id) {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.set_state(VehicleStatus::Travelling, 0);
                }
            }
        }
        // Released the train at the crest: run back down for the next.
        VehicleStatus::Travelling => {
            move_relative_distance(sim, id, -(lift_speed >> 10) * 42);
            let at_bottom = sim
                .vehicle(id)
                .map(|vehicle| vehicle.track_progress == 0)
                .unwrap_or(true);
            if at_bottom || !on_cable_hill(sim, id) {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.velocity = 0;
                    vehicle.set_state(VehicleStatus::WaitingToDepart, 0);
                }
            }
        }
        _ => {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.set_state(VehicleStatus::WaitingToDepart, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::map::{TileMap, TrackElement};
    use park_world::ride::{CarEntry, Ride, RideEntry, RideEntryFlags, RideMode};

    fn cable_hill_sim() -> (Simulation, RideId) {
        let mut world = TileMap::new(64);
        world.place(
            CoordsXYZ::new(0, 0, 0),
            TrackElement::new(TrackType::Flat, 0, RideId(0)),
        );
        for i in 0..4 {
            world.place(
                CoordsXYZ::new(32 + i * 32, 0, i * 16),
                TrackElement::new(TrackType::CableLiftHill, 0, RideId(0)).with_chain(),
            );
        }
        world.place(
            CoordsXYZ::new(160, 0, 64),
            TrackElement::new(TrackType::Up25ToFlat, 0, RideId(0)),
        );
        let mut sim = Simulation::new(world);
        let ride_id = sim.rides.add(
            Ride::new(RideId(0), RideMode::ContinuousCircuit),
            RideEntry {
                flags: RideEntryFlags::default(),
                cars: vec![CarEntry::default()],
            },
        );
        (sim, ride_id)
    }

    #[test]
    fn cable_lift_builds_and_registers_on_the_ride() {
        let (mut sim, ride_id) = cable_hill_sim();
        let head = create_cable_lift(&mut sim, ride_id, CoordsXYZ::new(32, 0, 0), 3)
            .expect("cable lift");
        assert_eq!(sim.ride(ride_id).and_then(|ride| ride.cable_lift), Some(head));
        assert_eq!(sim.train_cars(head).len(), 3);
    }

    #[test]
    fn cable_lift_refuses_non_hill_track() {
        let (mut sim, ride_id) = cable_hill_sim();
        assert!(create_cable_lift(&mut sim, ride_id, CoordsXYZ::new(0, 0, 0), 3).is_none());
    }

    #[test]
    fn lift_cycles_up_and_returns_to_waiting() {
        let (mut sim, ride_id) = cable_hill_sim();
        let head = create_cable_lift(&mut sim, ride_id, CoordsXYZ::new(32, 0, 0), 1)
            .expect("cable lift");

        update_cable_lift(&mut sim, head);
        assert_eq!(
            sim.vehicle(head).expect("lift").status,
            VehicleStatus::WaitingToDepart
        );

        // Couple a phantom train: the state machine would do this.
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.set_state(VehicleStatus::Departing, 0);
        }
        let mut returned = false;
        for _ in 0..4000 {
            update_cable_lift(&mut sim, head);
            if sim.vehicle(head).expect("lift").status == VehicleStatus::WaitingToDepart {
                returned = true;
                break;
            }
        }
        assert!(returned, "the lift must climb, release and return");
    }
}
