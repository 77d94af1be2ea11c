//! Mini-golf track motion. Unlike the general integrator this is a
//! forward-only traversal with independent per-ball progress: a ball may
//! not enter a hole cell until the ball ahead of it has cleared, and a
//! playing animation holds the ball in place while it consumes distance.
//! It shares the move-info and track-graph primitives with the main loop.

use park_world::coords::CoordsXYZ;
use park_world::entity::{EntityId, VehicleFlags};
use park_world::ride::StationIndex;
use park_world::track::TrackType;

use crate::motion::{update_velocity_for_mini_golf, MotionFlags};
use crate::move_info::{move_info, move_info_size, DISTANCE_UNIT};
use crate::sim::Simulation;
use crate::track_iter::next_track_block;
use crate::util::mph;

/// Ticks a ball is held while the player swings at a hole.
const HOLE_PLAY_TICKS: u8 = 32;

fn blocked_by_preceding_ball(sim: &Simulation, id: EntityId, next_position: CoordsXYZ) -> bool {
    let Some(vehicle) = sim.vehicle(id) else {
        return false;
    };
    let ride = vehicle.ride;
    for other_id in sim.entities.iter_ids() {
        if other_id == id {
            continue;
        }
        let Some(other) = sim.entities.vehicle(other_id) else {
            continue;
        };
        if other.ride == ride && other.track_location == next_position {
            return true;
        }
    }
    false
}

fn advance_ball(sim: &mut Simulation, ctx_velocity_delta: i32, id: EntityId) -> MotionFlags {
    let mut flags = MotionFlags::default();

    // A playing animation consumes whole distance units while the ball
    // waits at the hole.
    if let Some(vehicle) = sim.vehicle_mut(id) {
        if vehicle.mini_golf_hold != 0 {
            vehicle.mini_golf_hold -= 1;
            vehicle.remaining_distance -= DISTANCE_UNIT;
            if vehicle.remaining_distance < 0 {
                vehicle.remaining_distance = 0;
            }
            return flags;
        }
        if !vehicle.has_flag(VehicleFlags::MOVE_SINGLE_CAR) {
            vehicle.remaining_distance += ctx_velocity_delta;
        }
    }

    loop {
        let Some((remaining, subposition, track_type, direction, progress, track_location)) =
            sim.vehicle(id).map(|v| {
                (
                    v.remaining_distance,
                    v.subposition,
                    v.track_type,
                    v.track_direction,
                    v.track_progress,
                    v.track_location,
                )
            })
        else {
            return flags;
        };
        if remaining < DISTANCE_UNIT {
            break;
        }

        let total = move_info_size(subposition, track_type, direction);
        let mut new_progress = progress + 1;
        if new_progress >= total {
            // Piece boundary: respect the turn-taking rule before entering
            // the next cell.
            let Some(element) = sim
                .world
                .track_element_at(track_location, track_type)
                .cloned()
            else {
                flags.set(MotionFlags::REACHED_TRACK_END);
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.remaining_distance = 0;
                }
                break;
            };
            let Some(next) = next_track_block(&sim.world, track_location, &element) else {
                flags.set(MotionFlags::REACHED_TRACK_END);
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.remaining_distance = 0;
                }
                break;
            };
            if blocked_by_preceding_ball(sim, id, next.position) {
                if let Some(vehicle) = sim.vehicle_mut(id) {
                    vehicle.remaining_distance = 0;
                    vehicle.velocity = 0;
                }
                break;
            }
            let entering_hole = next.element.track_type.is_mini_golf_hole();
            if let Some(vehicle) = sim.vehicle_mut(id) {
                vehicle.track_location = next.position;
                vehicle.track_direction = next.direction;
                vehicle.track_type = next.element.track_type;
                if entering_hole {
                    vehicle.mini_golf_hold = HOLE_PLAY_TICKS;
                }
            }
            new_progress = 0;
        }

        let Some((subposition, track_type, direction, track_location)) = sim
            .vehicle(id)
            .map(|v| (v.subposition, v.track_type, v.track_direction, v.track_location))
        else {
            return flags;
        };
        let info = move_info(subposition, track_type, direction, new_progress as i32);
        let position = CoordsXYZ::new(
            track_location.x + info.x,
            track_location.y + info.y,
            track_location.z + info.z,
        );
        if let Some(vehicle) = sim.vehicle_mut(id) {
            vehicle.track_progress = new_progress;
            vehicle.orientation = info.direction;
            vehicle.pitch = info.pitch;
            vehicle.bank_rotation = info.bank_rotation;
            vehicle.remaining_distance -= DISTANCE_UNIT;
        }
        sim.move_vehicle_to(id, position);
    }
    flags
}

/// The mini-golf variant of `update_track_motion`.
pub fn update_track_motion_mini_golf(
    sim: &mut Simulation,
    head_id: EntityId,
) -> (MotionFlags, Option<StationIndex>) {
    let mut flags = MotionFlags::default();
    let mut station = None;

    let velocity_delta = update_velocity_for_mini_golf(sim, head_id);

    let cars = sim.train_cars(head_id);
    for &id in &cars {
        flags.0 |= advance_ball(sim, velocity_delta, id).0;
        let Some(vehicle) = sim.vehicle(id) else {
            continue;
        };
        if vehicle.has_flag(VehicleFlags::ON_LIFT_HILL) {
            flags.set(MotionFlags::ON_LIFT_HILL);
        }
    }

    // Station resolution for the head.
    if let Some(vehicle) = sim.vehicle(head_id) {
        flags.set(MotionFlags::ON_ORIGIN_PIECE);
        if vehicle.track_type == TrackType::EndStation {
            if vehicle.track_progress > 17 {
                flags.set(MotionFlags::AT_STATION);
            }
            if let Some(element) = sim
                .world
                .track_element_at(vehicle.track_location, vehicle.track_type)
            {
                station = element.station;
            }
        }
    }

    // The mini-golf acceleration formula: chain average, drag, and the
    // powered term that dominates below walking pace.
    let mut sum_acceleration = 0i64;
    let mut num_vehicles = 0i64;
    let mut total_mass = 0i32;
    for &id in &cars {
        if let Some(vehicle) = sim.vehicle(id) {
            num_vehicles += 1;
            total_mass += vehicle.mass as i32;
            sum_acceleration += vehicle.acceleration as i64;
        }
    }
    if num_vehicles == 0 {
        return (flags, station);
    }

    let Some(head) = sim.vehicle(head_id) else {
        return (flags, station);
    };
    let velocity = head.velocity;
    let speed = head.speed as i32;
    let powered_acceleration_setting = head.powered_acceleration as i32;
    let in_reverse = head.has_flag(VehicleFlags::POWERED_CAR_IN_REVERSE);

    let mut new_acceleration = ((sum_acceleration / num_vehicles) * 21) as i32 >> 9;
    new_acceleration -= velocity >> 12;
    new_acceleration -= drag_decrease(velocity, total_mass);

    let mut powered = speed << 14;
    let quarter_force = (speed * total_mass) >> 2;
    if in_reverse {
        powered = -powered;
    }
    powered -= velocity;
    powered *= powered_acceleration_setting << 1;
    if quarter_force != 0 {
        powered /= quarter_force;
    }
    if velocity.abs() > mph(1) {
        new_acceleration = 0;
    }
    new_acceleration += powered;

    if let Some(vehicle) = sim.vehicle_mut(head_id) {
        vehicle.acceleration = new_acceleration;
    }

    (flags, station)
}

fn drag_decrease(velocity: i32, total_mass: i32) -> i32 {
    let mut decrease = velocity >> 8;
    decrease *= decrease;
    if velocity < 0 {
        decrease = -decrease;
    }
    decrease >>= 4;
    if total_mass != 0 {
        decrease / total_mass
    } else {
        decrease
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::spawn_train;
    use park_world::entity::CarSubposition;
    use park_world::map::{TileMap, TrackElement};
    use park_world::ride::{CarEntry, CarFlags, Ride, RideEntry, RideEntryFlags, RideId, RideMode};

    fn mini_golf_sim() -> (Simulation, RideId) {
        let mut world = TileMap::new(64);
        for i in 0..4 {
            world.place(
                CoordsXYZ::new(i * 32, 0, 0),
                TrackElement::new(TrackType::Flat, 0, RideId(0)),
            );
        }
        world.place(
            CoordsXYZ::new(128, 0, 0),
            TrackElement::new(TrackType::MinigolfHoleA, 0, RideId(0)),
        );
        let mut sim = Simulation::new(world);
        let ride = sim.rides.add(
            Ride::new(RideId(0), RideMode::MiniGolf),
            RideEntry {
                flags: RideEntryFlags::default(),
                cars: vec![CarEntry {
                    flags: CarFlags::MINI_GOLF,
                    powered_acceleration: 10,
                    powered_max_speed: 10,
                    ..CarEntry::default()
                }],
            },
        );
        (sim, ride)
    }

    #[test]
    fn balls_advance_independently_and_hold_at_holes() {
        let (mut sim, ride) = mini_golf_sim();
        let head = spawn_train(
            &mut sim,
            ride,
            1,
            CoordsXYZ::new(0, 0, 0),
            CarSubposition::MiniGolfBallPathA,
        )
        .expect("ball");
        if let Some(vehicle) = sim.vehicle_mut(head) {
            vehicle.speed = 10;
            vehicle.powered_acceleration = 10;
        }

        let mut reached_hole = false;
        for _ in 0..4000 {
            update_track_motion_mini_golf(&mut sim, head);
            let vehicle = sim.vehicle(head).expect("ball");
            if vehicle.track_type.is_mini_golf_hole() {
                reached_hole = true;
                assert!(vehicle.mini_golf_hold <= HOLE_PLAY_TICKS);
                break;
            }
        }
        assert!(reached_hole, "ball must reach the hole piece");
    }

    #[test]
    fn a_ball_waits_for_the_cell_ahead_to_clear() {
        let (mut sim, ride) = mini_golf_sim();
        let front = spawn_train(
            &mut sim,
            ride,
            1,
            CoordsXYZ::new(64, 0, 0),
            CarSubposition::MiniGolfBallPathA,
        )
        .expect("front ball");
        let back = spawn_train(
            &mut sim,
            ride,
            1,
            CoordsXYZ::new(32, 0, 0),
            CarSubposition::MiniGolfBallPathA,
        )
        .expect("back ball");

        // Freeze the front ball at its cell; the back ball must stall at
        // the boundary instead of entering the occupied cell.
        if let Some(vehicle) = sim.vehicle_mut(back) {
            vehicle.speed = 10;
            vehicle.powered_acceleration = 10;
        }
        for _ in 0..2000 {
            update_track_motion_mini_golf(&mut sim, back);
        }
        let front_location = sim.vehicle(front).expect("front").track_location;
        let back_vehicle = sim.vehicle(back).expect("back");
        assert_ne!(back_vehicle.track_location, front_location);
    }
}
