//! Pitch gravity and rider g-force estimation. The derailment cutoffs are
//! tuned values carried over unchanged; the pitch table is a scaled sine
//! with the flat entry exactly zero.

use park_world::entity::Vehicle;
use park_world::ride::{CarEntry, CarFlags};

/// Gravity component of acceleration per pitch id. Uphill entries are
/// negative. Indexed by the same pitch ids the move-info tables emit.
pub const ACCELERATION_FROM_PITCH: [i32; 12] = [
    0,       // flat
    -63787,  // up 12
    -124548, // up 25
    -197155, // up 42
    -255232, // up 60
    63787,   // down 12
    124548,  // down 25
    197155,  // down 42
    255232,  // down 60
    -282345, // up 75
    -294715, // vertical up
    294715,  // vertical down
];

pub fn acceleration_from_pitch(pitch: u8) -> i32 {
    ACCELERATION_FROM_PITCH
        .get(pitch as usize)
        .copied()
        .unwrap_or(0)
}

/// Static vertical-g baseline per pitch (the cosine of the slope).
const PITCH_BASE_VERTICAL_G: [i32; 12] = [100, 97, 90, 74, 50, 97, 90, 74, 50, 25, 0, 0];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GForces {
    pub vertical: i32,
    pub lateral: i32,
}

/// Rider-felt g estimate from the pitch baseline plus a speed-squared
/// curvature term taken from the track piece's data table.
pub fn g_forces(vehicle: &Vehicle) -> GForces {
    let def = vehicle.track_type.def();
    let speed = vehicle.velocity >> 10;
    let speed_sq = (speed * speed) >> 10;

    let base = PITCH_BASE_VERTICAL_G
        .get(vehicle.pitch as usize)
        .copied()
        .unwrap_or(100);

    GForces {
        vertical: base + speed_sq * def.vertical_g_factor,
        lateral: speed_sq * def.lateral_g_factor,
    }
}

/// Per-car derailment check for cars without up-stop wheels; sets no state,
/// only reports. The cutoffs are calibration constants.
pub fn up_stop_derailment(vehicle: &Vehicle, car: &CarEntry, on_covered_track: bool) -> bool {
    if on_covered_track {
        return false;
    }

    if car.flags.contains(CarFlags::NO_UPSTOP_WHEELS) {
        let forces = g_forces(vehicle);
        let lateral = forces.lateral.abs();
        if lateral <= 150 {
            if acceleration_from_pitch(vehicle.pitch) < 0 {
                if forces.vertical > -40 {
                    return false;
                }
            } else if forces.vertical > -80 {
                return false;
            }
        }
        return vehicle.pitch != 8;
    }

    if car.flags.contains(CarFlags::NO_UPSTOP_BOBSLEIGH) {
        let forces = g_forces(vehicle);
        if acceleration_from_pitch(vehicle.pitch) < 0 {
            if forces.vertical > -45 {
                return false;
            }
        } else if forces.vertical > -80 {
            return false;
        }
        return vehicle.pitch != 8;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::coords::CoordsXYZ;
    use park_world::ride::RideId;
    use park_world::track::TrackType;

    fn coaster_car() -> CarEntry {
        CarEntry {
            flags: CarFlags::NO_UPSTOP_WHEELS,
            ..CarEntry::default()
        }
    }

    #[test]
    fn flat_track_at_speed_keeps_positive_vertical_g() {
        let mut vehicle = Vehicle::new(RideId(0), 0, CoordsXYZ::default());
        vehicle.track_type = TrackType::Flat;
        vehicle.velocity = 0x50000;
        let forces = g_forces(&vehicle);
        assert!(forces.vertical > 0);
        assert_eq!(forces.lateral, 0);
        assert!(!up_stop_derailment(&vehicle, &coaster_car(), false));
    }

    #[test]
    fn fast_crest_without_upstops_derails() {
        let mut vehicle = Vehicle::new(RideId(0), 0, CoordsXYZ::default());
        vehicle.track_type = TrackType::FlatToDown25;
        vehicle.velocity = 0x50000;
        let forces = g_forces(&vehicle);
        assert!(forces.vertical < -80);
        assert!(up_stop_derailment(&vehicle, &coaster_car(), false));
        // A covered section is exempt from the check.
        assert!(!up_stop_derailment(&vehicle, &coaster_car(), true));
    }

    #[test]
    fn pitch_eight_is_exempt_from_derailment() {
        let mut vehicle = Vehicle::new(RideId(0), 0, CoordsXYZ::default());
        vehicle.track_type = TrackType::FlatToDown25;
        vehicle.velocity = 0x50000;
        vehicle.pitch = 8;
        assert!(!up_stop_derailment(&vehicle, &coaster_car(), false));
    }

    #[test]
    fn pitch_table_is_antisymmetric() {
        assert_eq!(ACCELERATION_FROM_PITCH[0], 0);
        for (up, down) in [(1usize, 5usize), (2, 6), (3, 7), (4, 8)] {
            assert_eq!(ACCELERATION_FROM_PITCH[up], -ACCELERATION_FROM_PITCH[down]);
        }
    }
}
