//! Secondary car motion layered on top of track following: the swing
//! pendulum for swinging cars and the spin accumulator for spinning cars.
//! Every limit and shift in here is a tuned game-feel constant.

use park_world::entity::{Vehicle, VehicleFlags};
use park_world::ride::{CarEntry, CarFlags};
use park_world::track::{SpinFunction, TrackType};

pub const VEHICLE_MAX_SPIN_SPEED: i16 = 0x600;
pub const VEHICLE_MIN_SPIN_SPEED: i16 = -VEHICLE_MAX_SPIN_SPEED;
pub const VEHICLE_MAX_SPIN_SPEED_WATER_RIDE: i16 = 0x200;
pub const VEHICLE_MIN_SPIN_SPEED_WATER_RIDE: i16 = -VEHICLE_MAX_SPIN_SPEED_WATER_RIDE;

/// Quantise the swing position into the 13-step sprite fan.
pub fn swing_sprite(swing_position: i16) -> u8 {
    if swing_position < -10012 {
        return 11;
    }
    if swing_position > 10012 {
        return 12;
    }
    if swing_position < -8191 {
        return 9;
    }
    if swing_position > 8191 {
        return 10;
    }
    if swing_position < -6371 {
        return 7;
    }
    if swing_position > 6371 {
        return 8;
    }
    if swing_position < -4550 {
        return 5;
    }
    if swing_position > 4550 {
        return 6;
    }
    if swing_position < -2730 {
        return 3;
    }
    if swing_position > 2730 {
        return 4;
    }
    if swing_position < -910 {
        return 1;
    }
    if swing_position > 910 {
        return 2;
    }
    0
}

/// Advance the swing pendulum for one tick. `train_velocity` is the
/// signed chain velocity the integrator computed for this tick.
pub fn update_swinging_car(vehicle: &mut Vehicle, car: &CarEntry, train_velocity: i32) {
    let mut speed = train_velocity.abs();
    if vehicle.has_flag(VehicleFlags::CAR_IS_REVERSED) {
        speed = -speed;
    }

    vehicle.swing_speed += (-vehicle.swing_position) >> 6;
    let swing_amount = vehicle.track_type.swing_amount(vehicle.track_progress);
    if swing_amount < 0 {
        vehicle.swing_speed -= (speed >> (-swing_amount)) as i16;
    } else if swing_amount > 0 {
        vehicle.swing_speed += (speed >> swing_amount) as i16;
    }

    let mut upper: i16 = 3185;
    if car.flags.contains(CarFlags::SUSPENDED_SWING) {
        upper = 5006;
    }
    if car.flags.contains(CarFlags::WOODEN_WILD_MOUSE_SWING) {
        upper = 1820;
    }
    let mut lower = -upper;

    if car.flags.contains(CarFlags::SLIDE_SWING) {
        upper = 5370;
        lower = -5370;

        match vehicle.track_type {
            TrackType::BankedLeftQuarterTurn5Tiles
            | TrackType::LeftBank
            | TrackType::LeftBankedQuarterTurn3Tiles => {
                upper = 10831;
                lower = -819;
            }
            TrackType::BankedRightQuarterTurn5Tiles
            | TrackType::RightBank
            | TrackType::RightBankedQuarterTurn3Tiles => {
                upper = 819;
                lower = -10831;
            }
            _ => {}
        }

        let track_type = vehicle.track_type;
        if track_type.is_station() || track_type.is_brakes() || track_type.is_block_brakes() {
            upper = 0;
            lower = 0;
        }
        if vehicle.has_flag(VehicleFlags::ON_LIFT_HILL) {
            upper = 0;
            lower = 0;
        }
    }

    vehicle.swing_position = vehicle.swing_position.saturating_add(vehicle.swing_speed);
    vehicle.swing_speed -= vehicle.swing_speed >> 5;

    if vehicle.swing_position > upper {
        vehicle.swing_position = upper;
        vehicle.swing_speed = 0;
    }
    if vehicle.swing_position < lower {
        vehicle.swing_position = lower;
        vehicle.swing_speed = 0;
    }

    vehicle.swing_sprite = swing_sprite(vehicle.swing_position);
}

/// Advance the spin accumulator for one tick.
pub fn update_spinning_car(vehicle: &mut Vehicle, car: &CarEntry, train_velocity: i32) {
    if vehicle.has_flag(VehicleFlags::SPINNING_IS_LOCKED) {
        vehicle.spin_speed = 0;
        return;
    }

    let spinning_inertia = car.spinning_inertia as i32;
    let def = vehicle.track_type.def();

    // An L spin category adds to the spin speed, R subtracts; the digit is
    // the extra right-shift on the velocity, so bigger digits spin less.
    match def.spin {
        SpinFunction::Rc => {
            let shift = spinning_inertia + 6;
            let delta = (train_velocity >> shift) as i16;
            // Alternate the direction per car so paired cars counter-spin.
            if vehicle.car_entry_index & 1 != 0 {
                vehicle.spin_speed -= delta;
            } else {
                vehicle.spin_speed += delta;
            }
        }
        SpinFunction::R5 => vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 5)) as i16,
        SpinFunction::L5 => vehicle.spin_speed += (train_velocity >> (spinning_inertia + 5)) as i16,
        SpinFunction::R7 => vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 7)) as i16,
        SpinFunction::L7 => vehicle.spin_speed += (train_velocity >> (spinning_inertia + 7)) as i16,
        SpinFunction::Rl => {
            if vehicle.track_progress < 48 {
                vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 8)) as i16;
            } else {
                vehicle.spin_speed += (train_velocity >> (spinning_inertia + 9)) as i16;
            }
        }
        SpinFunction::Lr => {
            if vehicle.track_progress < 48 {
                vehicle.spin_speed += (train_velocity >> (spinning_inertia + 8)) as i16;
            } else {
                vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 9)) as i16;
            }
        }
        SpinFunction::L8 => vehicle.spin_speed += (train_velocity >> (spinning_inertia + 8)) as i16,
        SpinFunction::R8 => vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 8)) as i16,
        SpinFunction::L9 => vehicle.spin_speed += (train_velocity >> (spinning_inertia + 9)) as i16,
        SpinFunction::R9 => vehicle.spin_speed -= (train_velocity >> (spinning_inertia + 9)) as i16,
        SpinFunction::Sp => {
            // Rapids only spin once the car is fully on them.
            if vehicle.track_progress > 22 {
                vehicle.spin_speed += (train_velocity >> (spinning_inertia + 5)) as i16;
            }
        }
        SpinFunction::None => {}
    }

    let clamped = vehicle
        .spin_speed
        .clamp(VEHICLE_MIN_SPIN_SPEED, VEHICLE_MAX_SPIN_SPEED);
    vehicle.spin_speed = clamped;
    vehicle.spin_sprite = vehicle.spin_sprite.wrapping_add((clamped >> 8) as u8);
    vehicle.spin_speed -= clamped >> car.spinning_friction;
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::coords::CoordsXYZ;
    use park_world::ride::RideId;

    fn vehicle_on(track_type: TrackType) -> Vehicle {
        let mut vehicle = Vehicle::new(RideId(0), 0, CoordsXYZ::default());
        vehicle.track_type = track_type;
        vehicle
    }

    #[test]
    fn swing_sprite_thresholds() {
        assert_eq!(swing_sprite(0), 0);
        assert_eq!(swing_sprite(911), 2);
        assert_eq!(swing_sprite(-911), 1);
        assert_eq!(swing_sprite(2731), 4);
        assert_eq!(swing_sprite(-10013), 11);
        assert_eq!(swing_sprite(10013), 12);
    }

    #[test]
    fn straight_track_damps_the_swing() {
        let mut vehicle = vehicle_on(TrackType::Flat);
        vehicle.swing_position = 3000;
        let car = CarEntry::default();
        for _ in 0..600 {
            update_swinging_car(&mut vehicle, &car, 0);
        }
        assert!(vehicle.swing_position.abs() < 200, "pendulum settles");
    }

    #[test]
    fn turns_drive_the_swing_outwards() {
        let mut vehicle = vehicle_on(TrackType::LeftQuarterTurn3Tiles);
        let car = CarEntry::default();
        update_swinging_car(&mut vehicle, &car, 0x50000);
        assert!(vehicle.swing_speed > 0);

        let mut vehicle = vehicle_on(TrackType::RightQuarterTurn3Tiles);
        update_swinging_car(&mut vehicle, &car, 0x50000);
        assert!(vehicle.swing_speed < 0);
    }

    #[test]
    fn swing_clamps_at_the_entry_limit() {
        let mut vehicle = vehicle_on(TrackType::LeftQuarterTurn1Tile);
        let car = CarEntry::default();
        for _ in 0..200 {
            update_swinging_car(&mut vehicle, &car, 0x80000);
        }
        assert!(vehicle.swing_position <= 3185);
    }

    #[test]
    fn spin_is_clamped_and_decays() {
        let mut vehicle = vehicle_on(TrackType::LeftQuarterTurn3Tiles);
        let car = CarEntry {
            flags: CarFlags::SPINNING,
            ..CarEntry::default()
        };
        for _ in 0..100 {
            update_spinning_car(&mut vehicle, &car, 0x100000);
        }
        assert!(vehicle.spin_speed <= VEHICLE_MAX_SPIN_SPEED);

        vehicle.spin_speed = VEHICLE_MAX_SPIN_SPEED;
        update_spinning_car(&mut vehicle, &car, 0);
        assert!(vehicle.spin_speed < VEHICLE_MAX_SPIN_SPEED, "friction decays spin");
    }

    #[test]
    fn locked_spin_zeroes_the_rate() {
        let mut vehicle = vehicle_on(TrackType::LeftQuarterTurn3Tiles);
        vehicle.spin_speed = 500;
        vehicle.flags.set(VehicleFlags::SPINNING_IS_LOCKED);
        let car = CarEntry::default();
        update_spinning_car(&mut vehicle, &car, 0x100000);
        assert_eq!(vehicle.spin_speed, 0);
    }
}
