//! The per-vehicle high-level behaviour: loading, departure (including the
//! synchronised multi-station consensus), travel, arrival, unloading, the
//! crash pathway and the self-contained flat-ride operating cycles. Each
//! state has its own update function dispatched from `update_vehicle`,
//! mirroring the structure of the original loop.

use park_world::coords::{CoordsXYZ, DIRECTION_DELTA};
use park_world::entity::{EffectKind, EntityId, VehicleFlags, VehicleStatus};
use park_world::ride::{
    BreakdownReason, CarFlags, DepartFlags, MechanicStatus, RideEntryFlags, RideId, RideLifecycle,
    RideMode, RideStatus, StationIndex, STATION_DEPART_FLAG,
};
use park_world::track::TrackType;

use crate::cable_lift;
use crate::events::{NewsKind, SoundId};
use crate::motion::{update_track_motion, MotionFlags};
use crate::sim::Simulation;
use crate::util::mph;

/// Restraint animation increment per tick.
const RESTRAINT_STEP: u8 = 51;
/// Stall news threshold in ticks; boats get a longer leash.
const STALL_LIMIT: u16 = 9600;
const STALL_LIMIT_BOAT: u16 = 15360;
/// Sibling-station cap for the synchronised departure search.
const SYNCHRONISED_COUNT: usize = 8;
/// How many empty tiles the sibling search tolerates between platforms.
const ADJACENCY_GAP: u8 = 5;

pub fn update_vehicle(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    if ride.cable_lift == Some(id) {
        cable_lift::update_cable_lift(sim, id);
        return;
    }
    if sim.ride_entry(ride_id).is_none() {
        return;
    }

    let status = vehicle.status;
    match status {
        VehicleStatus::MovingToEndOfStation => update_moving_to_end_of_station(sim, id),
        VehicleStatus::WaitingForPassengers => update_waiting_for_passengers(sim, id),
        VehicleStatus::WaitingToDepart => update_waiting_to_depart(sim, id),
        VehicleStatus::Departing => update_departing(sim, id),
        VehicleStatus::Travelling => update_travelling(sim, id),
        VehicleStatus::Arriving => update_arriving(sim, id),
        VehicleStatus::UnloadingPassengers => update_unloading_passengers(sim, id),
        VehicleStatus::TravellingBoat => update_travelling_boat(sim, id),
        VehicleStatus::TravellingDodgems => update_dodgems(sim, id),
        VehicleStatus::TravellingCableLift => update_travelling_cable_lift(sim, id),
        VehicleStatus::WaitingForCableLift => update_waiting_for_cable_lift(sim, id),
        VehicleStatus::Swinging => update_swinging(sim, id),
        VehicleStatus::Rotating => update_rotating(sim, id, 286),
        VehicleStatus::FerrisWheelRotating => update_rotating(sim, id, 384),
        VehicleStatus::SimulatorOperating => update_timed_operation(sim, id, 800),
        VehicleStatus::SpaceRingsOperating => update_timed_operation(sim, id, 464),
        VehicleStatus::TopSpinOperating => update_timed_operation(sim, id, 600),
        VehicleStatus::HauntedHouseOperating => update_haunted_house(sim, id),
        VehicleStatus::CrookedHouseOperating => update_timed_operation(sim, id, 600),
        VehicleStatus::ShowingFilm => update_timed_operation(sim, id, 1200),
        VehicleStatus::DoingCircusShow => update_timed_operation(sim, id, 900),
        VehicleStatus::Crashing | VehicleStatus::Crashed => update_crash(sim, id),
    }
}

fn set_state(sim: &mut Simulation, id: EntityId, status: VehicleStatus, sub_state: u8) {
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.set_state(status, sub_state);
    }
}

// ---------------------------------------------------------------------
// Station approach and loading

fn update_moving_to_end_of_station(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };

    if ride.mode.is_flat_ride_cycle() || ride.mode == RideMode::Dodgems {
        // Flat rides are already "at" their station.
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
        }
        set_state(sim, id, VehicleStatus::WaitingForPassengers, 0);
        return;
    }

    if let Some(vehicle) = sim.vehicle_mut(id) {
        if vehicle.velocity <= 131940 {
            vehicle.acceleration = 3298;
        }
    }
    let (flags, station) = update_track_motion(sim, id);

    if flags.contains(MotionFlags::AT_BLOCK_BRAKE) || flags.contains(MotionFlags::AT_STATION) {
        if let Some(station) = station {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.current_station = station;
            }
        }
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
            vehicle.time_waiting = 0;
        }
        set_state(sim, id, VehicleStatus::WaitingForPassengers, 0);
    } else if flags.contains(MotionFlags::REACHED_TRACK_END) {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
        }
    }
}

/// Open every car's restraints a step; true once fully open.
fn open_restraints(sim: &mut Simulation, head: EntityId) -> bool {
    let mut all_open = true;
    for car in sim.train_cars(head) {
        if let Some(vehicle) = sim.vehicle_mut(car) {
            if vehicle.restraints_position < 255 {
                vehicle.restraints_position = vehicle.restraints_position.saturating_add(RESTRAINT_STEP);
                all_open = false;
            }
        }
    }
    all_open
}

/// Close every car's restraints a step; true once fully closed. A ride
/// broken down with stuck restraints never finishes closing.
fn close_restraints(sim: &mut Simulation, head: EntityId) -> bool {
    let Some(vehicle) = sim.vehicle(head) else {
        return false;
    };
    let ride_id = vehicle.ride;
    let stuck = sim
        .ride(ride_id)
        .map(|ride| {
            ride.lifecycle.contains(RideLifecycle::BROKEN_DOWN)
                && ride.breakdown_reason_pending == BreakdownReason::RestraintsStuckOpen
        })
        .unwrap_or(false);
    if stuck {
        return false;
    }

    let mut all_closed = true;
    for car in sim.train_cars(head) {
        if let Some(vehicle) = sim.vehicle_mut(car) {
            if vehicle.restraints_position > 0 {
                vehicle.restraints_position = vehicle.restraints_position.saturating_sub(RESTRAINT_STEP);
                all_closed = false;
            }
        }
    }
    all_closed
}

fn train_totals(sim: &Simulation, head: EntityId) -> (u8, u8, u8) {
    let mut num_peeps = 0u8;
    let mut num_used_seats = 0u8;
    let mut num_seats = 0u8;
    for car in sim.train_cars(head) {
        if let Some(vehicle) = sim.vehicle(car) {
            num_peeps = num_peeps.saturating_add(vehicle.num_peeps);
            num_used_seats = num_used_seats.saturating_add(vehicle.next_free_seat);
            num_seats = num_seats.saturating_add(vehicle.num_seats);
        }
    }
    (num_peeps, num_used_seats, num_seats & 0x7F)
}

/// Boarding has settled when every claimed seat is occupied; the train is
/// then allowed to move on to restraint closing.
fn train_ready_to_depart(sim: &mut Simulation, id: EntityId, num_peeps: u8, num_used_seats: u8) {
    if num_peeps != num_used_seats {
        return;
    }
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.sub_state = 2;
    }
}

fn update_waiting_for_passengers(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let current_station = vehicle.current_station;
    let sub_state = vehicle.sub_state;

    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.velocity = 0;
    }

    if sub_state == 0 {
        if !open_restraints(sim, id) {
            return;
        }
        let Some(ride) = sim.ride_mut(ride_id) else {
            return;
        };
        if !ride.station(current_station).has_entrance {
            ride.station_mut(current_station).train_at_station = None;
            set_state(sim, id, VehicleStatus::WaitingForPassengers, 2);
            return;
        }
        if ride.station(current_station).train_at_station.is_some() {
            return;
        }
        let train_index = ride.train_index_of(id).map(|index| index as u8);
        ride.station_mut(current_station).train_at_station = train_index;
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.sub_state = 1;
            vehicle.time_waiting = 0;
        }
        return;
    }

    if sub_state == 1 {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            if vehicle.time_waiting != 0xFFFF {
                vehicle.time_waiting += 1;
            }
            vehicle.flags.clear(VehicleFlags::READY_TO_DEPART);
        }

        let (num_peeps, num_used_seats, num_seats) = train_totals(sim, id);
        let Some(ride) = sim.ride(ride_id) else {
            return;
        };
        let depart_flags = ride.depart_flags;
        let min_waiting_time = ride.min_waiting_time;
        let max_waiting_time = ride.max_waiting_time;
        let no_test_mode = ride.type_info.no_test_mode;
        let has_load_options = ride.type_info.has_load_options;
        let time_waiting = sim.vehicle(id).map(|v| v.time_waiting).unwrap_or(0);

        if !no_test_mode {
            if time_waiting < 20 {
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
        } else if num_peeps == 0 {
            train_ready_to_depart(sim, id, num_peeps, num_used_seats);
            return;
        }

        if has_load_options {
            if depart_flags.contains(DepartFlags::WAIT_FOR_MINIMUM_LENGTH)
                && u32::from(min_waiting_time) * 32 > u32::from(time_waiting)
            {
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if depart_flags.contains(DepartFlags::WAIT_FOR_MAXIMUM_LENGTH)
                && u32::from(max_waiting_time) * 32 < u32::from(time_waiting)
            {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
        }

        if depart_flags.contains(DepartFlags::LEAVE_WHEN_ANOTHER_ARRIVES) {
            let trains: Vec<EntityId> = sim
                .ride(ride_id)
                .map(|ride| ride.vehicles.clone())
                .unwrap_or_default();
            for train in trains {
                if train == id {
                    continue;
                }
                let Some(other) = sim.vehicle(train) else {
                    continue;
                };
                if (other.status == VehicleStatus::UnloadingPassengers
                    || other.status == VehicleStatus::MovingToEndOfStation)
                    && other.current_station == current_station
                {
                    if let Some(vehicle) = sim.vehicle_mut(id) {
                        vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                    }
                    train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                    return;
                }
            }
        }

        if has_load_options && depart_flags.contains(DepartFlags::WAIT_FOR_LOAD) {
            if num_peeps == num_seats {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            // The load ladder: full, three quarters, half, a quarter, any.
            let load = depart_flags.load_value();
            if load == 3 {
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            let three_quarter_seats = (3 * num_seats) / 4;
            if three_quarter_seats != 0 && num_peeps >= three_quarter_seats {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if load == 2 {
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if num_seats / 2 != 0 && num_peeps >= num_seats / 2 {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if load == 1 {
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if num_seats / 4 != 0 && num_peeps >= num_seats / 4 {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if load == 0 {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
                train_ready_to_depart(sim, id, num_peeps, num_used_seats);
                return;
            }
            if num_peeps != 0 {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
                }
            }
            train_ready_to_depart(sim, id, num_peeps, num_used_seats);
            return;
        }

        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.flags.set(VehicleFlags::READY_TO_DEPART);
        }
        train_ready_to_depart(sim, id, num_peeps, num_used_seats);
        return;
    }

    // sub_state 2: close up and hand over to the departure gate.
    if !close_restraints(sim, id) {
        return;
    }
    let synchronised = sim
        .ride(ride_id)
        .map(|ride| {
            ride.depart_flags
                .contains(DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS)
        })
        .unwrap_or(false);
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.velocity = 0;
        vehicle.status = VehicleStatus::WaitingToDepart;
        vehicle.sub_state = 0;
        vehicle.flags.clear(VehicleFlags::WAITING_ON_ADJACENT_STATION);
        if synchronised {
            vehicle.flags.set(VehicleFlags::WAITING_ON_ADJACENT_STATION);
        }
    }
}

// ---------------------------------------------------------------------
// Synchronised departure

struct SynchronisedStation {
    ride: RideId,
    station: StationIndex,
    vehicle: Option<EntityId>,
}

/// Probe one tile for a synchronising station platform; `Some` when a
/// platform of a sync-flagged ride is there (its waiting train attached
/// when one is ready).
fn try_add_synchronised_station(sim: &Simulation, position: CoordsXYZ) -> Option<SynchronisedStation> {
    if !sim.world.is_location_valid(position) {
        return None;
    }
    let element = sim.world.station_element_near(position, 16)?;
    let ride_id = element.ride;
    let station_index = element.station?;
    let ride = sim.ride(ride_id)?;
    if !ride
        .depart_flags
        .contains(DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS)
    {
        return None;
    }

    let mut entry = SynchronisedStation {
        ride: ride_id,
        station: station_index,
        vehicle: None,
    };
    if !ride.lifecycle.contains(RideLifecycle::ON_TRACK) {
        return Some(entry);
    }
    if ride.station(station_index).depart & STATION_DEPART_FLAG == 0 {
        return Some(entry);
    }

    for &train in &ride.vehicles {
        let Some(vehicle) = sim.vehicle(train) else {
            continue;
        };
        if vehicle.status != VehicleStatus::WaitingToDepart {
            continue;
        }
        if vehicle.sub_state != 0 {
            continue;
        }
        if !vehicle.has_flag(VehicleFlags::WAITING_ON_ADJACENT_STATION) {
            continue;
        }
        if vehicle.current_station != station_index {
            continue;
        }
        entry.vehicle = Some(train);
        break;
    }
    Some(entry)
}

/// The multi-station consensus: collect sibling stations outward in both
/// track directions (bounded by the gap budget and the sibling cap), then
/// permit departure only when every sibling is broken down, trainless, or
/// itself ready.
fn can_depart_synchronised(sim: &Simulation, ride_id: RideId, station_index: StationIndex) -> (bool, Vec<EntityId>) {
    let Some(ride) = sim.ride(ride_id) else {
        return (false, Vec::new());
    };
    let station = ride.station(station_index);
    let start = station.start_coords();
    let direction = (station.start.direction + 1) & 3;

    let mut siblings: Vec<SynchronisedStation> = Vec::new();

    for probe_direction in [direction, (direction + 2) & 3] {
        let mut location = start;
        let mut space_between = ADJACENCY_GAP;
        while siblings.len() < SYNCHRONISED_COUNT - 1 {
            let delta = DIRECTION_DELTA[probe_direction as usize];
            location = location + delta;
            match try_add_synchronised_station(sim, location) {
                Some(entry) => {
                    siblings.push(entry);
                    space_between = ADJACENCY_GAP;
                }
                None => {
                    if space_between == 0 {
                        break;
                    }
                    space_between -= 1;
                }
            }
        }
    }

    if siblings.is_empty() {
        return (true, Vec::new());
    }

    for sibling in &siblings {
        let Some(sibling_ride) = sim.ride(sibling.ride) else {
            continue;
        };
        if sibling_ride.lifecycle.contains(RideLifecycle::BROKEN_DOWN) {
            continue;
        }
        if sibling_ride.status == RideStatus::Closed {
            continue;
        }

        if sibling_ride.is_block_sectioned()
            && sibling_ride.station(sibling.station).depart & STATION_DEPART_FLAG == 0
        {
            // Block-sectioned sibling not ready: departure is only allowed
            // when every synchronised station is this same ride and none of
            // its trains are moving.
            let first_ride = siblings[0].ride;
            if siblings.iter().any(|other| other.ride != first_ride) {
                return (false, Vec::new());
            }
            if let Some(shared_ride) = sim.ride(first_ride) {
                for &train in &shared_ride.vehicles {
                    if let Some(vehicle) = sim.vehicle(train) {
                        if vehicle.status != VehicleStatus::WaitingToDepart && vehicle.velocity != 0 {
                            return (false, Vec::new());
                        }
                    }
                }
            }
            return (true, Vec::new());
        }

        if sibling.vehicle.is_none() {
            // No waiting train at this sibling; depart without full sync
            // only in the narrow single-sibling same-ride case.
            if siblings.len() > 1 {
                return (false, Vec::new());
            }
            if siblings[0].ride != ride_id {
                return (false, Vec::new());
            }

            let mut trains_at_station = 0usize;
            let mut travelling_trains = 0usize;
            for &train in &sibling_ride.vehicles {
                let Some(vehicle) = sim.vehicle(train) else {
                    continue;
                };
                if vehicle.status == VehicleStatus::Travelling {
                    travelling_trains += 1;
                } else if vehicle.current_station == sibling.station
                    && (vehicle.status == VehicleStatus::WaitingToDepart
                        || vehicle.status == VehicleStatus::MovingToEndOfStation)
                {
                    trains_at_station += 1;
                }
            }
            let total = trains_at_station + travelling_trains;
            if total != sibling_ride.num_trains()
                || travelling_trains >= sibling_ride.num_trains() / 2
            {
                return (false, Vec::new());
            }
        }
    }

    let ready: Vec<EntityId> = siblings.iter().filter_map(|entry| entry.vehicle).collect();
    (true, ready)
}

fn update_waiting_to_depart(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let current_station = vehicle.current_station;
    let waiting_on_adjacent = vehicle.has_flag(VehicleFlags::WAITING_ON_ADJACENT_STATION);
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };

    // The station gate itself.
    if ride.station(current_station).depart & STATION_DEPART_FLAG == 0 {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
        }
        return;
    }

    if ride
        .depart_flags
        .contains(DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS)
        && waiting_on_adjacent
    {
        let (can_depart, partners) = can_depart_synchronised(sim, ride_id, current_station);
        if !can_depart {
            return;
        }
        for partner in partners {
            if let Some(vehicle) = sim.vehicle_mut(partner) {
                vehicle.flags.clear(VehicleFlags::WAITING_ON_ADJACENT_STATION);
            }
        }
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.flags.clear(VehicleFlags::WAITING_ON_ADJACENT_STATION);
        }
    }

    let mode = sim.ride(ride_id).map(|ride| ride.mode);
    match mode {
        Some(RideMode::Dodgems) => {
            let operating_ticks = sim
                .ride(ride_id)
                .map(|ride| u16::from(ride.speed) * 32)
                .unwrap_or(480);
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.time_waiting = operating_ticks;
            }
            set_state(sim, id, VehicleStatus::TravellingDodgems, 0);
        }
        Some(RideMode::Swing) => set_state(sim, id, VehicleStatus::Swinging, 0),
        Some(RideMode::Rotation) => set_state(sim, id, VehicleStatus::Rotating, 0),
        Some(RideMode::ForwardRotation) | Some(RideMode::BackwardRotation) => {
            set_state(sim, id, VehicleStatus::FerrisWheelRotating, 0)
        }
        Some(RideMode::FilmShow) => set_state(sim, id, VehicleStatus::ShowingFilm, 0),
        Some(RideMode::Circus) => set_state(sim, id, VehicleStatus::DoingCircusShow, 0),
        Some(RideMode::SpaceRings) => set_state(sim, id, VehicleStatus::SpaceRingsOperating, 0),
        Some(RideMode::HauntedHouse) => {
            set_state(sim, id, VehicleStatus::HauntedHouseOperating, 0)
        }
        Some(RideMode::CrookedHouse) => {
            set_state(sim, id, VehicleStatus::CrookedHouseOperating, 0)
        }
        Some(RideMode::BoatHire) => {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.time_waiting = 0;
            }
            set_state(sim, id, VehicleStatus::Departing, 0);
        }
        _ => {
            set_state(sim, id, VehicleStatus::Departing, 0);
        }
    }
}

// ---------------------------------------------------------------------
// Departure and travel

fn update_departing(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let sub_state = vehicle.sub_state;
    let position = vehicle.position;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    let mode = ride.mode;
    let launch_speed = ride.launch_speed;
    let lift_hill_speed = ride.lift_hill_speed;
    let launch_factor = ride.type_info.launch_acceleration_factor;
    let broken_down = ride.lifecycle.contains(RideLifecycle::BROKEN_DOWN);
    let play_depart_sound = sim
        .ride_entry(ride_id)
        .map(|entry| entry.flags.contains(RideEntryFlags::PLAY_DEPART_SOUND))
        .unwrap_or(false);
    let tram_sound = sim
        .ride_entry(ride_id)
        .map(|entry| entry.cars[0].sound_range == 4)
        .unwrap_or(false);
    let powered = sim
        .ride_entry(ride_id)
        .map(|entry| {
            sim.vehicle(id)
                .map(|v| entry.car(v.car_entry_index).flags.contains(CarFlags::POWERED))
                .unwrap_or(false)
        })
        .unwrap_or(false);

    if sub_state == 0 {
        let train_broken = sim
            .vehicle(id)
            .map(|v| v.has_flag(VehicleFlags::TRAIN_IS_BROKEN))
            .unwrap_or(false);
        if train_broken {
            if !broken_down {
                if let Some(ride) = sim.ride_mut(ride_id) {
                    ride.lifecycle.set(RideLifecycle::BROKEN_DOWN);
                    ride.mechanic_status = MechanicStatus::Calling;
                    ride.breakdown_reason = ride.breakdown_reason_pending;
                }
                let station = sim.vehicle(id).map(|v| v.current_station).unwrap_or(StationIndex(0));
                if let Some(ride) = sim.ride_mut(ride_id) {
                    ride.inspection_station = station;
                }
                sim.events
                    .add_news(NewsKind::RideBreakdown, ride_id, "ride has broken down");
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.velocity = 0;
                }
            }
            return;
        }

        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.sub_state = 1;
        }
        if play_depart_sound {
            let sound = if tram_sound {
                SoundId::Tram
            } else {
                SoundId::TrainDeparting
            };
            sim.events.play_sound(sound, position);
        }
        let launches = sim.vehicle(id).map(|v| v.num_launches).unwrap_or(0);
        if mode == RideMode::UpwardLaunch || (mode == RideMode::DownwardLaunch && launches > 1) {
            sim.events.play_sound(SoundId::RideLaunch2, position);
        }
    }

    // Mode-specific launch shaping.
    if let Some(vehicle) = sim.vehicle_mut(id) {
        match mode {
            RideMode::ReverseInclineLaunchedShuttle => {
                if vehicle.velocity >= -131940 {
                    vehicle.acceleration = -3298;
                }
            }
            RideMode::PoweredLaunchPasstrough
            | RideMode::PoweredLaunch
            | RideMode::PoweredLaunchBlockSectioned
            | RideMode::LimPoweredLaunch
            | RideMode::UpwardLaunch => {
                if (i32::from(launch_speed) << 16) > vehicle.velocity {
                    vehicle.acceleration = i32::from(launch_speed) << launch_factor;
                }
            }
            RideMode::DownwardLaunch => {
                if vehicle.num_launches >= 1 {
                    if (14 << 16) > vehicle.velocity {
                        vehicle.acceleration = 14 << 12;
                    }
                } else if !powered && vehicle.velocity <= 131940 {
                    vehicle.acceleration = 3298;
                }
            }
            RideMode::ContinuousCircuit
            | RideMode::ContinuousCircuitBlockSectioned
            | RideMode::RotatingLift
            | RideMode::FreefallDrop
            | RideMode::BoatHire => {
                if !powered && vehicle.velocity <= 131940 {
                    vehicle.acceleration = 3298;
                }
            }
            _ => {}
        }
    }

    let (flags, motion_station) = update_track_motion(sim, id);

    if flags.contains(MotionFlags::CHAIN_RELEASED_BACKWARD)
        && mode == RideMode::ReverseInclineLaunchedShuttle
    {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = -vehicle.velocity;
        }
        finish_departing(sim, id);
        return;
    }

    if flags.contains(MotionFlags::REACHED_TRACK_END) || flags.contains(MotionFlags::TOWER_TOP_REACHED)
    {
        match mode {
            RideMode::BoatHire => {
                update_departing_boat_hire(sim, id);
                return;
            }
            RideMode::ReverseInclineLaunchedShuttle => {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.velocity = -vehicle.velocity;
                }
                finish_departing(sim, id);
                return;
            }
            RideMode::Shuttle => {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.flags.toggle(VehicleFlags::POWERED_CAR_IN_REVERSE);
                    vehicle.velocity = 0;
                }
            }
            _ => {}
        }
    }

    if flags.contains(MotionFlags::ON_LIFT_HILL) {
        if mode != RideMode::ReverseInclineLaunchedShuttle {
            let speed = i32::from(lift_hill_speed) * 31079;
            if let Some(vehicle) = sim.vehicle_mut(id) {
                if vehicle.velocity <= speed {
                    vehicle.acceleration = 15539;
                }
            }
        } else {
            let speed = i32::from(lift_hill_speed) * -31079;
            if let Some(vehicle) = sim.vehicle_mut(id) {
                if vehicle.velocity >= speed {
                    vehicle.acceleration = -15539;
                }
            }
        }
    }

    if mode == RideMode::FreefallDrop {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.animation_frame += 1;
        }
    } else {
        let mut should_launch = true;
        if mode == RideMode::DownwardLaunch {
            if sim.vehicle(id).map(|v| v.num_launches).unwrap_or(0) < 1 {
                should_launch = false;
            }
        }
        if should_launch {
            let current_station = sim.vehicle(id).map(|v| v.current_station);
            if !flags.contains(MotionFlags::ON_ORIGIN_PIECE)
                || motion_station.is_none()
                || motion_station != current_station
            {
                finish_departing(sim, id);
                return;
            }
            if !flags.contains(MotionFlags::REACHED_TRACK_END) {
                return;
            }
            if mode == RideMode::BoatHire || mode == RideMode::RotatingLift || mode == RideMode::Shuttle
            {
                return;
            }
            update_crash_setup(sim, id);
            return;
        }
    }

    if !current_tower_element_is_top(sim, id) {
        return;
    }
    finish_departing(sim, id);
}

fn current_tower_element_is_top(sim: &Simulation, id: EntityId) -> bool {
    let Some(vehicle) = sim.vehicle(id) else {
        return true;
    };
    if vehicle.track_type != TrackType::TowerBase && vehicle.track_type != TrackType::TowerSection {
        return true;
    }
    let Some(element) = sim
        .world
        .track_element_at(vehicle.track_location, vehicle.track_type)
    else {
        return true;
    };
    crate::track_iter::next_track_block(&sim.world, vehicle.track_location, element).is_none()
}

fn finish_departing(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let position = vehicle.position;
    let current_station = vehicle.current_station;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    let mode = ride.mode;
    let launch_speed = ride.launch_speed;

    if mode == RideMode::DownwardLaunch {
        let (launches, velocity) = sim
            .vehicle(id)
            .map(|v| (v.num_launches, v.velocity))
            .unwrap_or((0, 0));
        if launches >= 1 && (14 << 16) > velocity {
            return;
        }
        sim.events.play_sound(SoundId::RideLaunch1, position);
    }

    if mode == RideMode::UpwardLaunch {
        let velocity = sim.vehicle(id).map(|v| v.velocity).unwrap_or(0);
        if (i32::from(launch_speed) << 16) > velocity {
            return;
        }
        sim.events.play_sound(SoundId::RideLaunch1, position);
    }

    let is_block_sectioned = sim
        .ride(ride_id)
        .map(|ride| ride.is_block_sectioned())
        .unwrap_or(false);
    if mode != RideMode::Race && !is_block_sectioned {
        let (min_waiting_time, wait_for_minimum) = sim
            .ride(ride_id)
            .map(|ride| {
                (
                    ride.min_waiting_time,
                    ride.depart_flags
                        .contains(DepartFlags::WAIT_FOR_MINIMUM_LENGTH),
                )
            })
            .unwrap_or((3, false));
        if let Some(ride) = sim.ride_mut(ride_id) {
            let station = ride.station_mut(current_station);
            station.depart &= STATION_DEPART_FLAG;
            let mut waiting_time = 3u8;
            if wait_for_minimum {
                waiting_time = min_waiting_time.max(3).min(127);
            }
            station.depart |= waiting_time;
        }
    }
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.lost_time_out = 0;
        vehicle.set_state(VehicleStatus::Travelling, 1);
        if vehicle.velocity < 0 {
            vehicle.sub_state = 0;
        }
    }
}

/// A stalled train (no progress for too long) surfaces once per ride as a
/// news item.
fn check_if_missing(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    if ride
        .lifecycle
        .contains(RideLifecycle::BROKEN_DOWN)
        || ride.lifecycle.contains(RideLifecycle::CRASHED)
    {
        return;
    }
    if ride.is_block_sectioned() {
        return;
    }
    if !ride.type_info.check_for_stalling {
        return;
    }
    let is_boat = ride.mode == RideMode::BoatHire;

    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.lost_time_out = vehicle.lost_time_out.saturating_add(1);
    }
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    if ride.lifecycle.contains(RideLifecycle::HAS_STALLED_VEHICLE) {
        return;
    }
    let limit = if is_boat { STALL_LIMIT_BOAT } else { STALL_LIMIT };
    let lost = sim.vehicle(id).map(|v| v.lost_time_out).unwrap_or(0);
    if lost <= limit {
        return;
    }
    if let Some(ride) = sim.ride_mut(ride_id) {
        ride.lifecycle.set(RideLifecycle::HAS_STALLED_VEHICLE);
    }
    sim.events
        .add_news(NewsKind::VehicleStalled, ride_id, "vehicle has stalled");
}

fn update_travelling(sim: &mut Simulation, id: EntityId) {
    check_if_missing(sim, id);

    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let sub_state = vehicle.sub_state;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    let mode = ride.mode;
    let lift_hill_speed = ride.lift_hill_speed;

    if sub_state == 2 {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
            vehicle.time_waiting = vehicle.time_waiting.saturating_sub(1);
            if vehicle.time_waiting == 0 {
                vehicle.sub_state = 0;
            }
        }
    }

    if mode == RideMode::FreefallDrop && sim.vehicle(id).map(|v| v.animation_frame).unwrap_or(0) != 0
    {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.animation_frame += 1;
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
        }
        return;
    }

    let (flags, motion_station) = update_track_motion(sim, id);

    let mut skip_check = false;
    if (flags.contains(MotionFlags::CHAIN_RELEASED_BACKWARD)
        || flags.contains(MotionFlags::CHAIN_HOLDS_BACKWARD))
        && mode == RideMode::ReverseInclineLaunchedShuttle
        && sub_state == 0
    {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.sub_state = 1;
            vehicle.velocity = 0;
        }
        skip_check = true;
    }

    if !skip_check {
        if flags.contains(MotionFlags::DERAILED) {
            update_crash_setup(sim, id);
            return;
        }
        if flags.contains(MotionFlags::COLLISION) {
            update_collision_setup(sim, id);
            return;
        }
        if flags.contains(MotionFlags::REACHED_TRACK_END)
            || flags.contains(MotionFlags::TOWER_TOP_REACHED)
        {
            match mode {
                RideMode::RotatingLift => {
                    if sim.vehicle(id).map(|v| v.sub_state).unwrap_or(0) <= 1 {
                        set_state(sim, id, VehicleStatus::Arriving, 1);
                        if let Some(vehicle) = sim.vehicle_mut(id) {
                            vehicle.time_waiting = 0;
                        }
                        return;
                    }
                }
                RideMode::BoatHire => {
                    update_travelling_boat_hire_setup(sim, id);
                    return;
                }
                RideMode::Shuttle => {
                    if let Some(vehicle) = sim.vehicle_mut(id) {
                        vehicle.flags.toggle(VehicleFlags::POWERED_CAR_IN_REVERSE);
                        vehicle.velocity = 0;
                    }
                }
                _ => {
                    if sub_state != 0 {
                        update_crash_setup(sim, id);
                        return;
                    }
                    if let Some(vehicle) = sim.vehicle_mut(id) {
                        vehicle.sub_state = 1;
                        vehicle.velocity = 0;
                    }
                }
            }
        }
    }

    if mode == RideMode::RotatingLift && sub_state <= 1 {
        if sub_state == 0 {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                if vehicle.velocity >= -131940 {
                    vehicle.acceleration = -3298;
                }
                vehicle.velocity = vehicle.velocity.max(-131940);
            }
        } else if current_tower_element_is_top(sim, id) {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.velocity = 0;
                vehicle.sub_state = 2;
                vehicle.time_waiting = 150;
            }
        } else if let Some(vehicle) = sim.vehicle_mut(id) {
            if vehicle.velocity <= 131940 {
                vehicle.acceleration = 3298;
            }
        }
    }

    if flags.contains(MotionFlags::ON_LIFT_HILL) {
        if mode == RideMode::ReverseInclineLaunchedShuttle {
            if sub_state == 0 {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    if !vehicle.has_flag(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP)
                        && vehicle.velocity >= i32::from(lift_hill_speed) * -31079
                    {
                        vehicle.acceleration = -15539;
                    }
                }
            }
        } else if let Some(vehicle) = sim.vehicle_mut(id) {
            if vehicle.velocity <= i32::from(lift_hill_speed) * 31079 {
                vehicle.acceleration = 15539;
            }
        }
    }

    // Rolling onto the cable hill: stop and wait for the catch car.
    if flags.contains(MotionFlags::ON_CABLE_LIFT_HILL) {
        let has_lift = sim
            .ride(ride_id)
            .map(|ride| ride.cable_lift.is_some())
            .unwrap_or(false);
        if has_lift {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.velocity = 0;
                vehicle.acceleration = 0;
                vehicle.set_state(VehicleStatus::WaitingForCableLift, 0);
            }
            return;
        }
    }

    if !flags.contains(MotionFlags::ON_ORIGIN_PIECE) || motion_station.is_none() {
        return;
    }
    if !flags.contains(MotionFlags::AT_STATION) {
        return;
    }

    let velocity = sim.vehicle(id).map(|v| v.velocity).unwrap_or(0);
    let completed_lap = sim
        .vehicle(id)
        .map(|v| v.has_flag(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP))
        .unwrap_or(false);
    if mode == RideMode::ReverseInclineLaunchedShuttle && velocity >= 0 && !completed_lap {
        return;
    }
    if mode == RideMode::PoweredLaunchPasstrough && velocity < 0 {
        return;
    }

    set_state(sim, id, VehicleStatus::Arriving, 0);
    if let Some(vehicle) = sim.vehicle_mut(id) {
        if let Some(station) = motion_station {
            vehicle.current_station = station;
        }
        vehicle.time_waiting = 0;
        if vehicle.velocity < 0 {
            vehicle.sub_state = 1;
        }
    }
}

// ---------------------------------------------------------------------
// Arrival and unloading

fn update_arriving_pass_through_station(sim: &mut Simulation, id: EntityId, station_brakes_work: bool) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let sub_state = vehicle.sub_state;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    let mode = ride.mode;
    let num_circuits = ride.num_circuits;
    let pass_no_stopping = ride
        .lifecycle
        .contains(RideLifecycle::PASS_STATION_NO_STOPPING);
    let allow_multiple = ride.type_info.allow_multiple_circuits;
    let powered = sim
        .ride_entry(ride_id)
        .and_then(|entry| {
            sim.vehicle(id)
                .map(|v| entry.car(v.car_entry_index).flags.contains(CarFlags::POWERED))
        })
        .unwrap_or(false);

    if sub_state == 0 {
        if mode == RideMode::Race && pass_no_stopping {
            return;
        }
        let Some(vehicle) = sim.vehicle_mut(id) else {
            return;
        };
        if vehicle.velocity <= 131940 {
            vehicle.acceleration = 3298;
            return;
        }
        let velocity_diff = if vehicle.velocity >= mph(24) {
            vehicle.velocity / 8
        } else {
            vehicle.velocity / 16
        };
        if !station_brakes_work {
            return;
        }
        if num_circuits != 1 && vehicle.num_laps + 1 < num_circuits {
            return;
        }
        vehicle.velocity -= velocity_diff;
        vehicle.acceleration = 0;
    } else {
        let Some(vehicle) = sim.vehicle_mut(id) else {
            return;
        };
        if !powered && vehicle.velocity >= -131940 {
            vehicle.acceleration = -3298;
        }
        if vehicle.velocity >= -131940 {
            return;
        }
        let velocity_diff = if vehicle.velocity < -mph(24) {
            vehicle.velocity / 8
        } else {
            vehicle.velocity / 16
        };
        if !station_brakes_work {
            return;
        }
        if vehicle.num_laps + 1 < num_circuits {
            return;
        }
        if vehicle.num_laps + 1 != num_circuits {
            vehicle.velocity -= velocity_diff;
            vehicle.acceleration = 0;
            return;
        }
        if allow_multiple && mode != RideMode::Shuttle && mode != RideMode::PoweredLaunch {
            vehicle.flags.set(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP);
        } else {
            vehicle.velocity -= velocity_diff;
            vehicle.acceleration = 0;
        }
    }
}

fn update_arriving(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let Some(ride) = sim.ride(ride_id) else {
        return;
    };
    let mode = ride.mode;

    if mode.is_flat_ride_cycle() {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.flags.clear(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP);
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
            vehicle.set_state(VehicleStatus::UnloadingPassengers, 0);
        }
        return;
    }

    let mut station_brakes_work = true;
    let inspection_station = ride.inspection_station;
    let current_station = vehicle.current_station;
    if ride.lifecycle.contains(RideLifecycle::BROKEN_DOWN)
        && ride.breakdown_reason_pending == BreakdownReason::BrakesFailure
        && inspection_station == current_station
        && ride.mechanic_status != MechanicStatus::HasFixedStationBrakes
    {
        station_brakes_work = false;
    }

    update_arriving_pass_through_station(sim, id, station_brakes_work);

    let (flags, _) = update_track_motion(sim, id);

    if flags.contains(MotionFlags::COLLISION) && !station_brakes_work {
        update_collision_setup(sim, id);
        return;
    }
    if flags.contains(MotionFlags::AT_STATION) && !station_brakes_work {
        set_state(sim, id, VehicleStatus::Departing, 1);
        return;
    }

    if !(flags.contains(MotionFlags::AT_STATION)
        || flags.contains(MotionFlags::COLLIDED_AHEAD)
        || flags.contains(MotionFlags::REACHED_TRACK_END))
    {
        if sim.vehicle(id).map(|v| v.velocity).unwrap_or(0) > 98955 {
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.time_waiting = 0;
            }
        }
        return;
    }

    let go_kart = sim
        .ride_entry(ride_id)
        .and_then(|entry| {
            sim.vehicle(id)
                .map(|v| entry.car(v.car_entry_index).flags.contains(CarFlags::GO_KART))
        })
        .unwrap_or(false);
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.time_waiting += 1;
    }
    if flags.contains(MotionFlags::COLLIDED_AHEAD)
        && go_kart
        && sim.vehicle(id).map(|v| v.time_waiting).unwrap_or(0) < 40
    {
        return;
    }

    let (track_location, track_type, sub_state) = match sim.vehicle(id) {
        Some(vehicle) => (vehicle.track_location, vehicle.track_type, vehicle.sub_state),
        None => return,
    };
    let station = sim
        .world
        .track_element_at(track_location, track_type)
        .and_then(|element| element.station);
    if let Some(station) = station {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.current_station = station;
        }
    }
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.num_laps += 1;
    }

    let (num_laps, completed_lap) = sim
        .vehicle(id)
        .map(|v| (v.num_laps, v.has_flag(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP)))
        .unwrap_or((0, false));
    let (num_circuits, pass_no_stopping) = sim
        .ride(ride_id)
        .map(|ride| {
            (
                ride.num_circuits,
                ride.lifecycle
                    .contains(RideLifecycle::PASS_STATION_NO_STOPPING),
            )
        })
        .unwrap_or((1, false));

    if sub_state != 0 {
        if num_laps < num_circuits {
            set_state(sim, id, VehicleStatus::Departing, 1);
            return;
        }
        if num_laps == num_circuits && completed_lap {
            set_state(sim, id, VehicleStatus::Departing, 1);
            return;
        }
    }
    if num_circuits != 1 && num_laps < num_circuits {
        set_state(sim, id, VehicleStatus::Departing, 1);
        return;
    }

    let launches = sim.vehicle(id).map(|v| v.num_launches).unwrap_or(0);
    if (mode == RideMode::UpwardLaunch || mode == RideMode::DownwardLaunch) && launches < 2 {
        let position = sim.vehicle(id).map(|v| v.position).unwrap_or_default();
        sim.events.play_sound(SoundId::RideLaunch2, position);
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
            vehicle.num_launches += 1;
        }
        set_state(sim, id, VehicleStatus::Departing, 1);
        return;
    }

    if mode == RideMode::Race && pass_no_stopping {
        set_state(sim, id, VehicleStatus::Departing, 1);
        return;
    }

    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.flags.clear(VehicleFlags::REVERSE_INCLINE_COMPLETED_LAP);
        vehicle.velocity = 0;
        vehicle.acceleration = 0;
        vehicle.set_state(VehicleStatus::UnloadingPassengers, 0);
    }
}

fn update_unloading_passengers(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let current_station = vehicle.current_station;
    let sub_state = vehicle.sub_state;

    if sub_state == 0 {
        if !open_restraints(sim, id) {
            return;
        }
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.sub_state = 1;
        }
        return;
    }

    // Unload one car's riders per tick; peeps rejoin the park at the exit.
    let cars = sim.train_cars(id);
    let mut any_left = false;
    for car in cars {
        let riders: Vec<EntityId> = match sim.vehicle_mut(car) {
            Some(vehicle) if vehicle.num_peeps > 0 => {
                let riders = vehicle.peeps.drain(..).collect();
                vehicle.num_peeps = 0;
                vehicle.next_free_seat = 0;
                riders
            }
            _ => Vec::new(),
        };
        for rider in riders {
            sim.entities.despawn(rider);
            any_left = true;
        }
    }
    if any_left {
        return;
    }

    // Everyone is off: release the platform claim if this train holds it.
    if let Some(ride) = sim.ride_mut(ride_id) {
        let train_index = ride.train_index_of(id).map(|index| index as u8);
        let station = ride.station_mut(current_station);
        if station.train_at_station == train_index {
            station.train_at_station = None;
        }
    }
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.num_laps = 0;
        vehicle.num_launches = 0;
        vehicle.time_waiting = 0;
        vehicle.set_state(VehicleStatus::MovingToEndOfStation, 0);
    }
}

// ---------------------------------------------------------------------
// Crashes

fn kill_all_passengers(sim: &mut Simulation, head: EntityId) -> u16 {
    let mut fatalities = 0u16;
    for car in sim.train_cars(head) {
        let riders: Vec<EntityId> = match sim.vehicle_mut(car) {
            Some(vehicle) => {
                let riders = vehicle.peeps.drain(..).collect();
                fatalities += u16::from(vehicle.num_peeps);
                vehicle.num_peeps = 0;
                vehicle.next_free_seat = 0;
                riders
            }
            None => Vec::new(),
        };
        for rider in riders {
            sim.entities.despawn(rider);
        }
    }
    fatalities
}

fn unlink_train_from_ride_ring(sim: &mut Simulation, head: EntityId) {
    let tail = sim.train_tail(head);
    let previous = sim.vehicle(head).and_then(|v| v.prev_vehicle_on_ride);
    let next = sim.vehicle(tail).and_then(|v| v.next_vehicle_on_ride);
    match (previous, next) {
        (Some(previous), Some(next)) => {
            if let Some(vehicle) = sim.vehicle_mut(previous) {
                vehicle.next_vehicle_on_ride = Some(next);
            }
            if let Some(vehicle) = sim.vehicle_mut(next) {
                vehicle.prev_vehicle_on_ride = Some(previous);
            }
        }
        _ => log::warn!("corrupted vehicle list for ride while unlinking crashed train"),
    }
}

fn ride_train_crash(sim: &mut Simulation, ride_id: RideId, fatalities: u16) {
    if let Some(ride) = sim.ride_mut(ride_id) {
        ride.lifecycle.set(RideLifecycle::CRASHED);
        ride.status = RideStatus::Closed;
    }
    sim.events.add_news(
        NewsKind::RideCrashed,
        ride_id,
        format!("ride has crashed ({fatalities} casualties)"),
    );
    sim.events.apply_park_rating_penalty(-200);
}

/// A collision crash: the train stays on its track position, burns, and
/// the ride closes.
fn update_collision_setup(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    if sim.ride(ride_id).map(|ride| ride.status) == Some(RideStatus::Simulating) {
        return;
    }

    set_state(sim, id, VehicleStatus::Crashed, 0);
    let fatalities = kill_all_passengers(sim, id);
    let already_crashed = sim
        .ride(ride_id)
        .map(|ride| ride.lifecycle.contains(RideLifecycle::CRASHED))
        .unwrap_or(false);
    if !already_crashed {
        ride_train_crash(sim, ride_id, fatalities);
    }

    let cars = sim.train_cars(id);
    for car in cars {
        let position = sim.vehicle(car).map(|v| v.position).unwrap_or_default();
        sim.events.play_sound(SoundId::Crash, position);
        sim.spawn_effect(position, EffectKind::ExplosionCloud { frame: 0 });
        for _ in 0..10 {
            let scatter = CoordsXYZ::new(
                (sim.rng.next_bounded(9) as i32) - 4,
                (sim.rng.next_bounded(9) as i32) - 4,
                sim.rng.next_bounded(6) as i32,
            );
            let colours = sim.vehicle(car).map(|v| v.colours).unwrap_or([0, 0]);
            sim.spawn_effect(
                position,
                EffectKind::CrashParticle {
                    time_to_live: 120,
                    velocity: CoordsXYZ::new(scatter.x * 8, scatter.y * 8, scatter.z * 8),
                    colours,
                    frame: 0,
                },
            );
        }
        if let Some(vehicle) = sim.vehicle_mut(car) {
            vehicle.sub_state = 2;
            vehicle.flags.set(VehicleFlags::CRASHED);
            vehicle.swing_speed = 0;
            vehicle.velocity = 0;
            vehicle.status = VehicleStatus::Crashed;
        }
    }
    unlink_train_from_ride_ring(sim, id);
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.velocity = 0;
    }
}

/// Launch trajectory per compass sixteenth, scaled by pitch and speed.
const CRASH_LAUNCH_XY: [(i32, i32); 16] = [
    (-256, 0),
    (-236, 98),
    (-181, 181),
    (-98, 236),
    (0, 256),
    (98, 236),
    (181, 181),
    (236, 98),
    (256, 0),
    (236, -98),
    (181, -181),
    (98, -236),
    (0, -256),
    (-98, -236),
    (-181, -181),
    (-236, -98),
];

/// A derailment: every car is thrown off the track on a ballistic arc.
fn update_crash_setup(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    if sim.ride(ride_id).map(|ride| ride.status) == Some(RideStatus::Simulating) {
        return;
    }
    set_state(sim, id, VehicleStatus::Crashing, 0);

    let has_passengers = sim
        .train_cars(id)
        .iter()
        .any(|&car| sim.vehicle(car).map(|v| v.num_peeps > 0).unwrap_or(false));
    if has_passengers {
        let position = sim.vehicle(id).map(|v| v.position).unwrap_or_default();
        sim.events.play_sound(SoundId::HauntedHouseScream, position);
    }

    let speed = sim.vehicle(id).map(|v| v.velocity >> 10).unwrap_or(0);
    let cars = sim.train_cars(id);
    for car in cars {
        let Some(vehicle) = sim.vehicle(car) else {
            continue;
        };
        let (launch_x, launch_y) = CRASH_LAUNCH_XY[(vehicle.orientation / 2) as usize];
        let pitch_scale = match vehicle.pitch {
            0 => 256,
            1 | 2 | 5 | 6 => 236,
            _ => 128,
        };
        let jitter_x = (sim.rng.next_bounded(16) as i32) - 8;
        let jitter_y = (sim.rng.next_bounded(16) as i32) - 8;
        let jitter_z = (sim.rng.next_bounded(16) as i32) - 8;
        if let Some(vehicle) = sim.vehicle_mut(car) {
            vehicle.sub_state = 0;
            vehicle.status = VehicleStatus::Crashing;
            vehicle.crash_velocity = CoordsXYZ::new(
                ((launch_x * pitch_scale) >> 8) * speed / 256 + jitter_x,
                ((launch_y * pitch_scale) >> 8) * speed / 256 + jitter_y,
                speed / 8 + jitter_z,
            );
            vehicle.track_location = CoordsXYZ::default();
        }
    }
    unlink_train_from_ride_ring(sim, id);
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.velocity = 0;
    }
}

fn update_crash(sim: &mut Simulation, id: EntityId) {
    let cars = sim.train_cars(id);
    for car in cars {
        let Some(vehicle) = sim.vehicle(car) else {
            continue;
        };
        if vehicle.status == VehicleStatus::Crashed {
            // Burnt out: occasionally puff smoke.
            if sim.rng.next_bounded(32) == 0 {
                let position = sim.vehicle(car).map(|v| v.position).unwrap_or_default();
                sim.spawn_effect(
                    position,
                    EffectKind::SteamParticle {
                        time_to_move: 0,
                        frame: 0,
                    },
                );
            }
            continue;
        }

        // Ballistic freefall until the ground plane.
        let (position, velocity) = (vehicle.position, vehicle.crash_velocity);
        let next = CoordsXYZ::new(
            position.x + velocity.x / 64,
            position.y + velocity.y / 64,
            position.z + velocity.z / 16,
        );
        if next.z <= 0 {
            let ground = CoordsXYZ::new(next.x, next.y, 0);
            let ride_id = sim.vehicle(car).map(|v| v.ride);
            sim.events.play_sound(SoundId::Crash, ground);
            sim.spawn_effect(ground, EffectKind::ExplosionCloud { frame: 0 });
            sim.spawn_effect(ground, EffectKind::ExplosionFlare { frame: 0 });
            let fatalities = u16::from(sim.vehicle(car).map(|v| v.num_peeps).unwrap_or(0));
            if let Some(vehicle) = sim.vehicle_mut(car) {
                vehicle.status = VehicleStatus::Crashed;
                vehicle.sub_state = 2;
                vehicle.flags.set(VehicleFlags::CRASHED);
                vehicle.num_peeps = 0;
                vehicle.peeps.clear();
            }
            sim.move_vehicle_to(car, ground);
            if let Some(ride_id) = ride_id {
                let already_crashed = sim
                    .ride(ride_id)
                    .map(|ride| ride.lifecycle.contains(RideLifecycle::CRASHED))
                    .unwrap_or(false);
                if !already_crashed {
                    ride_train_crash(sim, ride_id, fatalities);
                }
            }
        } else {
            if let Some(vehicle) = sim.vehicle_mut(car) {
                vehicle.crash_velocity.z -= 8;
                vehicle.animation_frame = vehicle.animation_frame.wrapping_add(1);
            }
            sim.move_vehicle_to(car, next);
        }
    }
}

// ---------------------------------------------------------------------
// Boat hire

fn update_travelling_boat_hire_setup(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle_mut(id) else {
        return;
    };
    // Remember where to come back to, then cast off.
    vehicle.boat_target = vehicle.track_location.xy();
    vehicle.set_state(VehicleStatus::TravellingBoat, 0);
    vehicle.time_waiting = 0;
}

fn update_departing_boat_hire(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle_mut(id) else {
        return;
    };
    vehicle.restraints_position = 0;
    let station = vehicle.current_station;
    let ride_id = vehicle.ride;
    if let Some(ride) = sim.ride_mut(ride_id) {
        ride.station_mut(station).train_at_station = None;
    }
    update_travelling_boat_hire_setup(sim, id);
}

fn update_travelling_boat(sim: &mut Simulation, id: EntityId) {
    check_if_missing(sim, id);
    update_motion_boat_hire(sim, id);
}

/// Free-roaming boat motion: steer toward the current target, wander while
/// the hire time runs, then home in on the dock and reconnect.
fn update_motion_boat_hire(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let hire_ticks = sim
        .ride(ride_id)
        .map(|ride| u16::from(ride.speed) * 64)
        .unwrap_or(1280);

    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.time_waiting = vehicle.time_waiting.saturating_add(1);

        // Powered paddling toward the target heading.
        let target = vehicle.boat_target;
        let dx = target.x - vehicle.position.x;
        let dy = target.y - vehicle.position.y;
        let heading_home = vehicle.time_waiting > hire_ticks;

        if heading_home && dx.abs() < 24 && dy.abs() < 24 {
            // Back at the dock: snap to the platform and walk in.
            let dock = CoordsXYZ::new(target.x, target.y, vehicle.position.z);
            vehicle.track_location = dock;
            vehicle.velocity = 0;
            vehicle.acceleration = 0;
            vehicle.set_state(VehicleStatus::Arriving, 0);
            return;
        }

        // Quantised steering toward the target, one compass step per tick.
        let desired = direction_towards(dx, dy);
        let diff = ((desired as i32 - vehicle.orientation as i32 + 48) % 32) - 16;
        if diff > 0 {
            vehicle.orientation = (vehicle.orientation + 1) & 31;
        } else if diff < 0 {
            vehicle.orientation = (vehicle.orientation + 31) & 31;
        }

        let speed = i32::from(vehicle.speed) << 13;
        if vehicle.velocity < speed {
            vehicle.velocity += speed / 16 + 1;
        }
    }

    // Move along the current heading; collisions stall the boat.
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let step = vehicle.velocity >> 14;
    let heading = vehicle.orientation;
    let position = vehicle.position;
    let (dx, dy) = compass_delta(heading);
    let next = CoordsXYZ::new(position.x + dx * step, position.y + dy * step, position.z);

    let collided = {
        let Simulation {
            entities, rides, ..
        } = sim;
        crate::motion::boat_collision(entities, rides, id, next)
    };
    if collided {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = -vehicle.velocity / 2;
        }
        return;
    }
    if !sim.world.is_location_valid(next) {
        // Bounce off the lake edge.
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.orientation = (vehicle.orientation + 16) & 31;
            vehicle.velocity /= 2;
        }
        return;
    }
    sim.move_vehicle_to(id, next);

    // Wandering boats pick a new target when they reach the old one.
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    if vehicle.time_waiting <= hire_ticks {
        let target = vehicle.boat_target;
        if (target.x - vehicle.position.x).abs() < 24 && (target.y - vehicle.position.y).abs() < 24 {
            let limit = sim.world.size_tiles * 32;
            let new_target = park_world::coords::CoordsXY::new(
                32 + sim.rng.next_bounded((limit - 64).max(32) as u32) as i32,
                32 + sim.rng.next_bounded((limit - 64).max(32) as u32) as i32,
            );
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.boat_target = new_target;
            }
        }
    } else if let Some(station_target) = sim.ride(ride_id).map(|ride| {
        let station = sim
            .vehicle(id)
            .map(|v| v.current_station)
            .unwrap_or(StationIndex(0));
        ride.station(station).start_coords().xy()
    }) {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.boat_target = station_target;
        }
    }
}

fn direction_towards(dx: i32, dy: i32) -> u8 {
    // Coarse 32-direction compass from the dominant axis mix.
    let angle = (dy as f64).atan2(dx as f64);
    let steps = (angle / (std::f64::consts::TAU / 32.0)).round() as i32;
    steps.rem_euclid(32) as u8
}

fn compass_delta(orientation: u8) -> (i32, i32) {
    let angle = f64::from(orientation) * std::f64::consts::TAU / 32.0;
    let dx = (angle.cos() * 4.0).round() as i32;
    let dy = (angle.sin() * 4.0).round() as i32;
    (dx.signum(), dy.signum())
}

// ---------------------------------------------------------------------
// Dodgems

fn update_dodgems(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;

    // Session over: park the car where it is and unload.
    if vehicle.time_waiting == 0 {
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.velocity = 0;
            vehicle.set_state(VehicleStatus::UnloadingPassengers, 0);
        }
        return;
    }
    if let Some(vehicle) = sim.vehicle_mut(id) {
        vehicle.time_waiting -= 1;
    }

    // Random jinking plus collision bounces inside the arena.
    if sim.rng.next_bounded(8) == 0 {
        let turn = (sim.rng.next_bounded(3) as i32) - 1;
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.orientation = ((vehicle.orientation as i32 + turn).rem_euclid(32)) as u8;
        }
    }

    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let heading = vehicle.orientation;
    let position = vehicle.position;
    let (dx, dy) = compass_delta(heading);
    let next = CoordsXYZ::new(position.x + dx * 2, position.y + dy * 2, position.z);

    let collided = {
        let Simulation {
            entities, rides, ..
        } = sim;
        crate::motion::boat_collision(entities, rides, id, next)
    };
    if collided || !sim.world.is_location_valid(next) {
        let bounce = 8 + sim.rng.next_bounded(16) as u8;
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.orientation = (vehicle.orientation + bounce) & 31;
            vehicle.velocity = 0;
        }
        return;
    }
    let _ = ride_id;
    sim.move_vehicle_to(id, next);
}

// ---------------------------------------------------------------------
// Cable lift coupling (vehicle side)

fn update_waiting_for_cable_lift(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let Some(cable_lift) = sim.ride(ride_id).and_then(|ride| ride.cable_lift) else {
        return;
    };
    // The lift must be idle at the bottom before it takes the train.
    let ready = sim
        .vehicle(cable_lift)
        .map(|lift| lift.status == VehicleStatus::WaitingToDepart)
        .unwrap_or(false);
    if !ready {
        return;
    }
    if let Some(lift) = sim.vehicle_mut(cable_lift) {
        lift.set_state(VehicleStatus::Departing, 0);
    }
    set_state(sim, id, VehicleStatus::TravellingCableLift, 0);
}

fn update_travelling_cable_lift(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let lift_speed = sim
        .ride(ride_id)
        .map(|ride| i32::from(ride.lift_hill_speed) * 31079)
        .unwrap_or(31079);

    if let Some(vehicle) = sim.vehicle_mut(id) {
        if vehicle.velocity < lift_speed {
            vehicle.acceleration = 15539;
        } else {
            vehicle.acceleration = 0;
        }
    }

    let (flags, _) = update_track_motion(sim, id);
    if flags.contains(MotionFlags::DERAILED) {
        update_crash_setup(sim, id);
        return;
    }
    if flags.contains(MotionFlags::COLLISION) {
        update_collision_setup(sim, id);
        return;
    }

    // Off the cable hill: release and freewheel.
    if !flags.contains(MotionFlags::ON_CABLE_LIFT_HILL) {
        if let Some(cable_lift) = sim.ride(ride_id).and_then(|ride| ride.cable_lift) {
            if let Some(lift) = sim.vehicle_mut(cable_lift) {
                if lift.status == VehicleStatus::Departing {
                    lift.set_state(VehicleStatus::Travelling, 0);
                }
            }
        }
        set_state(sim, id, VehicleStatus::Travelling, 1);
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.lost_time_out = 0;
        }
    }
}

// ---------------------------------------------------------------------
// Flat-ride operating cycles

/// A generic timed operating cycle: spin the animation for `duration`
/// ticks, then arrive.
fn update_timed_operation(sim: &mut Simulation, id: EntityId, duration: u16) {
    let Some(vehicle) = sim.vehicle_mut(id) else {
        return;
    };
    vehicle.time_waiting = vehicle.time_waiting.saturating_add(1);
    vehicle.animation_state = vehicle.animation_state.wrapping_add(1);
    vehicle.animation_frame = (vehicle.animation_state >> 2) as u8;
    if vehicle.time_waiting >= duration {
        vehicle.time_waiting = 0;
        vehicle.animation_frame = 0;
        vehicle.set_state(VehicleStatus::Arriving, 0);
    }
}

/// The swing boat: the pendulum builds through the sprite fan and winds
/// back down before arrival.
fn update_swinging(sim: &mut Simulation, id: EntityId) {
    let Some(vehicle) = sim.vehicle(id) else {
        return;
    };
    let ride_id = vehicle.ride;
    let cycles = sim.ride(ride_id).map(|ride| ride.speed.max(1)).unwrap_or(1);
    let duration = u16::from(cycles) * 96;

    let Some(vehicle) = sim.vehicle_mut(id) else {
        return;
    };
    vehicle.time_waiting = vehicle.time_waiting.saturating_add(1);
    let time = vehicle.time_waiting;

    // Build amplitude through the middle of the program, ease out at the
    // ends, quantised through the same sprite fan as the swinging cars.
    let ramp = if time < duration / 2 {
        time
    } else {
        duration.saturating_sub(time)
    };
    let amplitude = i32::from(ramp.min(96)) * 110;
    let phase = (time % 64) as i32 - 32;
    let swing = amplitude * phase / 32;
    vehicle.swing_position = swing.clamp(-10013, 10013) as i16;
    vehicle.swing_sprite = crate::subphysics::swing_sprite(vehicle.swing_position);

    if time >= duration {
        vehicle.time_waiting = 0;
        vehicle.swing_position = 0;
        vehicle.swing_sprite = 0;
        vehicle.set_state(VehicleStatus::Arriving, 0);
    }
}

/// Rotation rides share a cycle with a mode-specific length.
fn update_rotating(sim: &mut Simulation, id: EntityId, duration: u16) {
    let Some(vehicle) = sim.vehicle_mut(id) else {
        return;
    };
    vehicle.time_waiting = vehicle.time_waiting.saturating_add(1);
    vehicle.spin_sprite = vehicle.spin_sprite.wrapping_add(1);
    if vehicle.time_waiting >= duration {
        vehicle.time_waiting = 0;
        vehicle.set_state(VehicleStatus::Arriving, 0);
    }
}

fn update_haunted_house(sim: &mut Simulation, id: EntityId) {
    let position = sim.vehicle(id).map(|v| v.position).unwrap_or_default();
    let time = sim.vehicle(id).map(|v| v.time_waiting).unwrap_or(0);
    // Screams at fixed points of the program.
    if time == 46 || time == 112 {
        sim.events.play_sound(SoundId::HauntedHouseScream, position);
    }
    update_timed_operation(sim, id, 160);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{spawn_train, Simulation};
    use park_world::coords::CoordsXYZD;
    use park_world::entity::CarSubposition;
    use park_world::map::{TileMap, TrackElement};
    use park_world::ride::{CarEntry, Ride, RideEntry, Station};

    fn circuit_world(ride_id: RideId) -> TileMap {
        // A closed oval: an eastbound straight with the station, one-tile
        // left turns at both ends, and the westbound return straight.
        let mut world = TileMap::new(64);
        world.place(
            CoordsXYZ::new(32, 0, 0),
            TrackElement::new(TrackType::EndStation, 0, ride_id).with_station(StationIndex(0)),
        );
        for i in 2..10 {
            world.place(
                CoordsXYZ::new(i * 32, 0, 0),
                TrackElement::new(TrackType::Flat, 0, ride_id),
            );
        }
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
        world
    }

    fn station_ride(mode: RideMode) -> (Simulation, RideId, EntityId) {
        let ride_id = RideId(0);
        let world = circuit_world(ride_id);
        let mut sim = Simulation::new(world);
        let mut ride = Ride::new(ride_id, mode);
        ride.stations
            .push(Station::new(CoordsXYZD::new(32, 0, 0, 0)));
        ride.lifecycle.set(RideLifecycle::ON_TRACK);
        let ride_id = sim.rides.add(
            ride,
            RideEntry {
                flags: RideEntryFlags::default(),
                cars: vec![CarEntry::default()],
            },
        );
        let head = spawn_train(&mut sim, ride_id, 1, CoordsXYZ::new(32, 0, 0), CarSubposition::Default)
            .expect("train");
        (sim, ride_id, head)
    }

    #[test]
    fn waiting_train_with_open_gate_departs_within_bounded_ticks() {
        let (mut sim, ride_id, head) = station_ride(RideMode::ContinuousCircuit);
        if let Some(ride) = sim.ride_mut(ride_id) {
            // Any-load policy, no waiting-time gates, gate open.
            ride.depart_flags = DepartFlags(0);
            ride.station_mut(StationIndex(0)).depart = STATION_DEPART_FLAG;
        }
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.status = VehicleStatus::WaitingForPassengers;
            vehicle.sub_state = 0;
        }

        let mut departed = false;
        for _ in 0..200 {
            update_vehicle(&mut sim, head);
            let status = sim.vehicle(head).expect("vehicle").status;
            if status == VehicleStatus::Departing || status == VehicleStatus::Travelling {
                departed = true;
                break;
            }
        }
        assert!(departed, "load policy with no gates must release the train");
    }

    #[test]
    fn closed_gate_holds_the_train() {
        let (mut sim, ride_id, head) = station_ride(RideMode::ContinuousCircuit);
        if let Some(ride) = sim.ride_mut(ride_id) {
            ride.station_mut(StationIndex(0)).depart = 0;
        }
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.status = VehicleStatus::WaitingToDepart;
        }
        for _ in 0..64 {
            update_vehicle(&mut sim, head);
        }
        assert_eq!(
            sim.vehicle(head).expect("vehicle").status,
            VehicleStatus::WaitingToDepart
        );
    }

    #[test]
    fn crashed_is_terminal_and_unlinks_the_train() {
        let (mut sim, ride_id, head) = station_ride(RideMode::ContinuousCircuit);
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.status = VehicleStatus::Travelling;
        }
        update_collision_setup(&mut sim, head);

        let vehicle = sim.vehicle(head).expect("vehicle");
        assert_eq!(vehicle.status, VehicleStatus::Crashed);
        assert!(vehicle.has_flag(VehicleFlags::CRASHED));

        let ride = sim.ride(ride_id).expect("ride");
        assert!(ride.lifecycle.contains(RideLifecycle::CRASHED));
        assert_eq!(ride.status, RideStatus::Closed);

        let events = sim.events.drain();
        assert!(events
            .news
            .iter()
            .any(|item| item.kind == NewsKind::RideCrashed));
        assert!(events.park_rating_penalty < 0);

        // Stays crashed.
        for _ in 0..32 {
            update_vehicle(&mut sim, head);
        }
        assert_eq!(
            sim.vehicle(head).expect("vehicle").status,
            VehicleStatus::Crashed
        );
    }

    #[test]
    fn flat_ride_cycle_returns_to_unloading() {
        let (mut sim, ride_id, head) = station_ride(RideMode::Swing);
        if let Some(ride) = sim.ride_mut(ride_id) {
            ride.speed = 1;
            ride.station_mut(StationIndex(0)).depart = STATION_DEPART_FLAG;
        }
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.status = VehicleStatus::WaitingToDepart;
        }

        update_vehicle(&mut sim, head);
        assert_eq!(
            sim.vehicle(head).expect("vehicle").status,
            VehicleStatus::Swinging
        );

        let mut reached_unloading = false;
        for _ in 0..500 {
            update_vehicle(&mut sim, head);
            if sim.vehicle(head).expect("vehicle").status == VehicleStatus::UnloadingPassengers {
                reached_unloading = true;
                break;
            }
        }
        assert!(reached_unloading, "swing cycle must complete and unload");
    }

    #[test]
    fn synchronised_station_scan_is_bounded() {
        // A long row of synchronised stations: the scan must cap at the
        // sibling limit rather than walking the whole row.
        let mut sim = Simulation::new(TileMap::new(64));
        let mut ids = Vec::new();
        for i in 0..16 {
            let mut ride = Ride::new(RideId(0), RideMode::Race);
            ride.status = RideStatus::Open;
            ride.depart_flags = DepartFlags::SYNCHRONISE_WITH_ADJACENT_STATIONS;
            ride.stations
                .push(Station::new(CoordsXYZD::new(0, i * 32, 0, 0)));
            let id = sim.rides.add(
                ride,
                RideEntry {
                    flags: RideEntryFlags::default(),
                    cars: vec![CarEntry::default()],
                },
            );
            sim.world.place(
                CoordsXYZ::new(0, i * 32, 0),
                TrackElement::new(TrackType::EndStation, 0, id).with_station(StationIndex(0)),
            );
            ids.push(id);
        }

        let (can_depart, partners) = can_depart_synchronised(&sim, ids[8], StationIndex(0));
        // Not all siblings have waiting trains, so departure is refused,
        // and no more than the cap were ever considered.
        assert!(!can_depart);
        assert!(partners.len() < SYNCHRONISED_COUNT);
    }
}
