//! Demo park builders used by the CLI host and the regression tests: a
//! block-sectioned coaster circuit, a boat-hire lake, a dodgems arena and
//! a swinging-ship pad.

use park_world::coords::{CoordsXYZ, CoordsXYZD};
use park_world::entity::{CarSubposition, Entity, EntityId, Peep};
use park_world::map::{TileMap, TrackElement};
use park_world::ride::{
    CarEntry, CarFlags, DepartFlags, Ride, RideEntry, RideEntryFlags, RideId, RideLifecycle,
    RideMode, RideStatus, Station, StationIndex, STATION_DEPART_FLAG,
};
use park_world::track::TrackType;

use crate::sim::{spawn_train, Simulation};

pub const SCENARIO_NAMES: &[&str] = &["coaster", "boats", "dodgems", "swing"];

#[derive(Debug, thiserror::Error)]
#[error("unknown scenario {0:?}")]
pub struct UnknownScenario(pub String);

pub fn build(name: &str) -> Result<Simulation, UnknownScenario> {
    match name {
        "coaster" => Ok(coaster_circuit()),
        "boats" => Ok(boat_hire_lake()),
        "dodgems" => Ok(dodgems_arena()),
        "swing" => Ok(swinging_ship()),
        _ => Err(UnknownScenario(name.to_string())),
    }
}

fn open_ride(ride: &mut Ride) {
    ride.status = RideStatus::Open;
    ride.lifecycle.set(RideLifecycle::ON_TRACK);
    for station in &mut ride.stations {
        station.depart = STATION_DEPART_FLAG;
    }
}

fn spawn_watchers(sim: &mut Simulation, around: CoordsXYZ, count: u32) {
    for index in 0..count {
        let offset = CoordsXYZ::new(
            (sim.rng.next_bounded(48) as i32) - 24,
            32 + (sim.rng.next_bounded(24) as i32),
            0,
        );
        let mut peep = Peep::new(around + offset);
        peep.tshirt_colour = (index % 28) as u8;
        peep.trousers_colour = ((index * 5) % 28) as u8;
        sim.entities.spawn(Entity::Peep(peep));
    }
}

/// A block-sectioned coaster: station, chained lift, drop, brake run and
/// block brakes, closed into an oval with one-tile turns.
pub fn coaster_circuit() -> Simulation {
    let ride_id = RideId(0);
    let mut world = TileMap::new(64);

    world.place(
        CoordsXYZ::new(32, 0, 0),
        TrackElement::new(TrackType::EndStation, 0, ride_id).with_station(StationIndex(0)),
    );
    world.place(
        CoordsXYZ::new(64, 0, 0),
        TrackElement::new(TrackType::FlatToUp25, 0, ride_id).with_chain(),
    );
    world.place(
        CoordsXYZ::new(96, 0, 8),
        TrackElement::new(TrackType::Up25, 0, ride_id).with_chain(),
    );
    world.place(
        CoordsXYZ::new(128, 0, 24),
        TrackElement::new(TrackType::Up25ToFlat, 0, ride_id).with_chain(),
    );
    world.place(
        CoordsXYZ::new(160, 0, 32),
        TrackElement::new(TrackType::FlatToDown25, 0, ride_id),
    );
    world.place(
        CoordsXYZ::new(192, 0, 24),
        TrackElement::new(TrackType::Down25, 0, ride_id),
    );
    world.place(
        CoordsXYZ::new(224, 0, 8),
        TrackElement::new(TrackType::Down25ToFlat, 0, ride_id),
    );
    world.place(
        CoordsXYZ::new(256, 0, 0),
        TrackElement::new(TrackType::Brakes, 0, ride_id).with_brake_speed(9),
    );
    world.place(
        CoordsXYZ::new(288, 0, 0),
        TrackElement::new(TrackType::BlockBrakes, 0, ride_id).with_brake_speed(5),
    );
    world.place(
        CoordsXYZ::new(320, 0, 0),
        TrackElement::new(TrackType::LeftQuarterTurn1Tile, 0, ride_id),
    );
    world.place(
        CoordsXYZ::new(320, 32, 0),
        TrackElement::new(TrackType::LeftQuarterTurn1Tile, 1, ride_id),
    );
    for i in 1..10 {
        world.place(
            CoordsXYZ::new(i * 32, 32, 0),
            TrackElement::new(TrackType::Flat, 2, ride_id),
        );
    }
    world.place(
        CoordsXYZ::new(0, 32, 0),
        TrackElement::new(TrackType::LeftQuarterTurn1Tile, 2, ride_id),
    );
    world.place(
        CoordsXYZ::new(0, 0, 0),
        TrackElement::new(TrackType::LeftQuarterTurn1Tile, 3, ride_id),
    );

    let mut sim = Simulation::new(world);
    let mut ride = Ride::new(ride_id, RideMode::ContinuousCircuitBlockSectioned);
    ride.stations
        .push(Station::new(CoordsXYZD::new(32, 0, 0, 0)));
    ride.lift_hill_speed = 5;
    ride.depart_flags = DepartFlags(0).with(DepartFlags::WAIT_FOR_LOAD);
    open_ride(&mut ride);

    let ride_id = sim.rides.add(
        ride,
        RideEntry {
            flags: RideEntryFlags::PLAY_DEPART_SOUND,
            cars: vec![
                CarEntry {
                    flags: CarFlags::NO_UPSTOP_WHEELS,
                    mass: 180,
                    num_seats: 4,
                    collision_radius: 220,
                    base_image: 64,
                    ..CarEntry::default()
                };
                2
            ],
        },
    );
    spawn_train(&mut sim, ride_id, 3, CoordsXYZ::new(32, 0, 0), CarSubposition::Default);
    spawn_watchers(&mut sim, CoordsXYZ::new(32, 0, 0), 6);
    sim
}

/// A boat-hire dock on an open lake.
pub fn boat_hire_lake() -> Simulation {
    let ride_id = RideId(0);
    let mut world = TileMap::new(32);
    world.place(
        CoordsXYZ::new(64, 64, 0),
        TrackElement::new(TrackType::EndStation, 0, ride_id).with_station(StationIndex(0)),
    );

    let mut sim = Simulation::new(world);
    let mut ride = Ride::new(ride_id, RideMode::BoatHire);
    ride.stations
        .push(Station::new(CoordsXYZD::new(64, 64, 0, 0)));
    ride.speed = 4;
    open_ride(&mut ride);

    let ride_id = sim.rides.add(
        ride,
        RideEntry {
            flags: RideEntryFlags::default(),
            cars: vec![CarEntry {
                flags: CarFlags::BOAT_HIRE_COLLISION_DETECTION
                    .union_with(CarFlags::POWERED)
                    .union_with(CarFlags::WATER_RIDE),
                mass: 60,
                num_seats: 2,
                collision_radius: 120,
                powered_acceleration: 10,
                powered_max_speed: 12,
                base_image: 256,
                ..CarEntry::default()
            }],
        },
    );
    for index in 0..3 {
        spawn_train(
            &mut sim,
            ride_id,
            1,
            CoordsXYZ::new(64 + index * 16, 64, 0),
            CarSubposition::Default,
        );
    }
    sim
}

/// A dodgems pad: free-roaming cars in a fenced arena.
pub fn dodgems_arena() -> Simulation {
    let ride_id = RideId(0);
    let mut world = TileMap::new(16);
    world.place(
        CoordsXYZ::new(64, 64, 0),
        TrackElement::new(TrackType::EndStation, 0, ride_id).with_station(StationIndex(0)),
    );

    let mut sim = Simulation::new(world);
    let mut ride = Ride::new(ride_id, RideMode::Dodgems);
    ride.stations
        .push(Station::new(CoordsXYZD::new(64, 64, 0, 0)));
    ride.speed = 15;
    open_ride(&mut ride);

    let ride_id = sim.rides.add(
        ride,
        RideEntry {
            flags: RideEntryFlags::default(),
            cars: vec![CarEntry {
                flags: CarFlags::BOAT_HIRE_COLLISION_DETECTION.union_with(CarFlags::POWERED),
                mass: 30,
                num_seats: 2,
                collision_radius: 60,
                powered_acceleration: 20,
                powered_max_speed: 8,
                base_image: 320,
                ..CarEntry::default()
            }],
        },
    );
    for index in 0..4i32 {
        spawn_train(
            &mut sim,
            ride_id,
            1,
            CoordsXYZ::new(64 + (index % 2) * 48, 64 + (index / 2) * 48, 0),
            CarSubposition::Default,
        );
    }
    sim
}

/// A swinging ship on its pad.
pub fn swinging_ship() -> Simulation {
    let ride_id = RideId(0);
    let mut world = TileMap::new(16);
    world.place(
        CoordsXYZ::new(96, 96, 0),
        TrackElement::new(TrackType::EndStation, 0, ride_id).with_station(StationIndex(0)),
    );

    let mut sim = Simulation::new(world);
    let mut ride = Ride::new(ride_id, RideMode::Swing);
    ride.stations
        .push(Station::new(CoordsXYZD::new(96, 96, 0, 0)));
    ride.speed = 3;
    open_ride(&mut ride);

    let ride_id = sim.rides.add(
        ride,
        RideEntry {
            flags: RideEntryFlags::default(),
            cars: vec![CarEntry {
                flags: CarFlags::SWINGING,
                mass: 500,
                num_seats: 20,
                base_image: 400,
                ..CarEntry::default()
            }],
        },
    );
    spawn_train(&mut sim, ride_id, 1, CoordsXYZ::new(96, 96, 0), CarSubposition::Default);
    spawn_watchers(&mut sim, CoordsXYZ::new(96, 96, 0), 10);
    sim
}

/// A convenience used by tests that need a head id back.
pub fn first_train(sim: &Simulation) -> Option<EntityId> {
    sim.rides.iter().next()?.vehicles.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::entity::VehicleStatus;

    #[test]
    fn all_scenarios_build() {
        for name in SCENARIO_NAMES {
            let sim = build(name).expect("known scenario");
            assert!(sim.rides.len() > 0);
            assert!(first_train(&sim).is_some());
        }
    }

    #[test]
    fn coaster_track_is_a_closed_loop() {
        let sim = coaster_circuit();
        let start = CoordsXYZ::new(32, 0, 0);
        let mut element = sim
            .world
            .track_element_at(start, TrackType::EndStation)
            .expect("station")
            .clone();
        let mut position = start;
        for _ in 0..64 {
            let next = crate::track_iter::next_track_block(&sim.world, position, &element)
                .expect("continuous track");
            position = next.position;
            element = next.element;
            if position == start {
                return;
            }
        }
        panic!("circuit did not close");
    }

    #[test]
    fn coaster_runs_a_full_service_cycle() {
        let mut sim = coaster_circuit();
        let head = first_train(&sim).expect("train");

        let mut seen_travelling = false;
        let mut seen_arrived = false;
        for _ in 0..20_000 {
            sim.update_all_vehicles();
            let status = sim.vehicle(head).expect("vehicle").status;
            if status == VehicleStatus::Travelling {
                seen_travelling = true;
            }
            if seen_travelling
                && (status == VehicleStatus::UnloadingPassengers
                    || status == VehicleStatus::WaitingForPassengers)
            {
                seen_arrived = true;
                break;
            }
        }
        assert!(seen_travelling, "train must leave the station");
        assert!(seen_arrived, "train must come back around");
        assert_eq!(sim.events.park_rating_penalty, 0, "no crash on a healthy circuit");
    }
}
