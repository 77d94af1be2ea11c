//! Per-track-piece pose tables. Each (subposition, piece type, direction)
//! triple maps to a sequence of samples, one per progress step, giving the
//! car's position delta, compass orientation, bank and pitch along the
//! piece. Tables are derived from the piece geometry on first use and are
//! read-only afterwards; out-of-range queries return a zeroed sentinel
//! rather than faulting.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use park_world::coords::{CoordsXY, Direction};
use park_world::entity::CarSubposition;
use park_world::track::{TrackPitch, TrackRoll, TrackType};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MoveInfo {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// 5-bit compass sprite direction.
    pub direction: u8,
    pub bank_rotation: u8,
    pub pitch: u8,
}

static MOVE_INFO_ZERO: MoveInfo = MoveInfo {
    x: 0,
    y: 0,
    z: 0,
    direction: 0,
    bank_rotation: 0,
    pitch: 0,
};

/// Distance consumed per progress step, indexed by which axes changed
/// (bit 0 x, bit 1 y, bit 2 z, bit 3 forced for reverser bogies).
pub const SUBPOSITION_TRANSLATION_DISTANCES: [i32; 16] = [
    0, 13962, 13962, 19745, 13962, 19745, 19745, 24177, //
    13962, 13962, 13962, 19745, 13962, 19745, 19745, 24177,
];

/// One track-subdivision unit of travel distance, the loop threshold of
/// the integrator.
pub const DISTANCE_UNIT: i32 = 0x368A;

pub fn pitch_id(pitch: TrackPitch) -> u8 {
    match pitch {
        TrackPitch::Flat => 0,
        TrackPitch::Up25 => 2,
        TrackPitch::Up60 => 4,
        TrackPitch::Down25 => 6,
        TrackPitch::Down60 => 8,
        TrackPitch::Vertical => 10,
    }
}

fn bank_id(roll: TrackRoll) -> u8 {
    match roll {
        TrackRoll::None => 0,
        TrackRoll::Left => 2,
        TrackRoll::Right => 4,
    }
}

/// Subpositions sharing a table lane. Lanes shift the car sideways on the
/// shared geometry (go-kart lanes); the chairlift/reverser/mini-golf
/// classes reuse the default lane.
fn lane_offset(subposition: CarSubposition) -> i32 {
    match subposition {
        CarSubposition::GoKartsLeftLane => 6,
        CarSubposition::GoKartsRightLane => -6,
        CarSubposition::GoKartsMovingToRightLane => -3,
        CarSubposition::GoKartsMovingToLeftLane => 3,
        _ => 0,
    }
}

fn lane_class(subposition: CarSubposition) -> u8 {
    match subposition {
        CarSubposition::Default => 0,
        CarSubposition::ChairliftGoingOut
        | CarSubposition::ChairliftGoingBack
        | CarSubposition::ChairliftEndBullwheel
        | CarSubposition::ChairliftStartBullwheel => 1,
        CarSubposition::GoKartsLeftLane => 2,
        CarSubposition::GoKartsRightLane => 3,
        CarSubposition::GoKartsMovingToRightLane => 4,
        CarSubposition::GoKartsMovingToLeftLane => 5,
        CarSubposition::MiniGolfPathA
        | CarSubposition::MiniGolfPathB
        | CarSubposition::MiniGolfPathC => 6,
        CarSubposition::MiniGolfBallPathA
        | CarSubposition::MiniGolfBallPathB
        | CarSubposition::MiniGolfBallPathC => 7,
        CarSubposition::ReverserFrontBogie | CarSubposition::ReverserRearBogie => 8,
    }
}

/// Rotate a point expressed in the piece's direction-0 frame into the
/// element direction's frame. Tile-local points rotate about the tile grid,
/// which adds a per-direction translation on top of the vector rotation.
fn transform_point(point: CoordsXY, direction: Direction) -> CoordsXY {
    let translation = match direction & 3 {
        0 => CoordsXY::new(0, 0),
        1 => CoordsXY::new(32, 0),
        2 => CoordsXY::new(32, 32),
        _ => CoordsXY::new(0, 32),
    };
    point.rotated(direction) + translation
}

/// Entry point of a piece in its own frame: the centre of the west edge.
const PIECE_ENTRY: CoordsXY = CoordsXY::new(0, 16);

fn generate_piece(track_type: TrackType, direction: Direction, lane: i32) -> Vec<MoveInfo> {
    let def = track_type.def();
    let length = def.length.max(1) as i32;

    // Path endpoints in the direction-0 frame: from the entry edge to the
    // succeeding piece's entry point.
    let start = PIECE_ENTRY;
    let end = CoordsXY::new(def.exit_offset.x, def.exit_offset.y)
        + transform_point(PIECE_ENTRY, def.exit_rotation);

    let start_orientation = 0i32;
    let end_orientation = match def.exit_rotation {
        1 => 8,
        2 => 16,
        3 => -8,
        _ => 0,
    };

    let pitch_start = pitch_id(def.pitch_start);
    let pitch_end = pitch_id(def.pitch_end);
    let bank_start = bank_id(def.roll_start);
    let bank_end = bank_id(def.roll_end);

    let mut samples = Vec::with_capacity(length as usize);
    for step in 0..length {
        let local = CoordsXY::new(
            start.x + (end.x - start.x) * step / length,
            start.y + (end.y - start.y) * step / length,
        );
        let z = def.exit_offset.z * step / length;

        let orientation =
            (start_orientation + (end_orientation - start_orientation) * step / length).rem_euclid(32);
        let rotated_orientation = (orientation + direction as i32 * 8).rem_euclid(32) as u8;

        // Perpendicular lane shift, in the pre-rotation frame.
        let shifted = CoordsXY::new(local.x, local.y + lane);
        let world = transform_point(shifted, direction);

        samples.push(MoveInfo {
            x: world.x,
            y: world.y,
            z,
            direction: rotated_orientation,
            bank_rotation: if step * 2 < length { bank_start } else { bank_end },
            pitch: if step * 2 < length { pitch_start } else { pitch_end },
        });
    }
    samples
}

type TableKey = (u8, TrackType, Direction);

static TABLES: Lazy<HashMap<TableKey, Vec<MoveInfo>>> = Lazy::new(|| {
    let mut tables = HashMap::new();
    let lanes: &[CarSubposition] = &[
        CarSubposition::Default,
        CarSubposition::ChairliftGoingOut,
        CarSubposition::GoKartsLeftLane,
        CarSubposition::GoKartsRightLane,
        CarSubposition::GoKartsMovingToRightLane,
        CarSubposition::GoKartsMovingToLeftLane,
        CarSubposition::MiniGolfPathA,
        CarSubposition::MiniGolfBallPathA,
        CarSubposition::ReverserFrontBogie,
    ];
    for &subposition in lanes {
        let class = lane_class(subposition);
        let lane = lane_offset(subposition);
        for track_type in TrackType::ALL {
            for direction in 0..4u8 {
                tables.insert(
                    (class, track_type, direction),
                    generate_piece(track_type, direction, lane),
                );
            }
        }
    }
    tables
});

fn table(
    subposition: CarSubposition,
    track_type: TrackType,
    direction: Direction,
) -> Option<&'static [MoveInfo]> {
    TABLES
        .get(&(lane_class(subposition), track_type, direction & 3))
        .map(Vec::as_slice)
}

pub fn move_info_valid(
    subposition: CarSubposition,
    track_type: TrackType,
    direction: Direction,
    progress: i32,
) -> bool {
    match table(subposition, track_type, direction) {
        Some(samples) => progress >= 0 && (progress as usize) < samples.len(),
        None => false,
    }
}

/// The pose sample at a progress step; the zero sentinel out of range.
pub fn move_info(
    subposition: CarSubposition,
    track_type: TrackType,
    direction: Direction,
    progress: i32,
) -> &'static MoveInfo {
    match table(subposition, track_type, direction) {
        Some(samples) if progress >= 0 && (progress as usize) < samples.len() => {
            &samples[progress as usize]
        }
        _ => &MOVE_INFO_ZERO,
    }
}

/// Total number of progress steps for the piece.
pub fn move_info_size(
    subposition: CarSubposition,
    track_type: TrackType,
    direction: Direction,
) -> u16 {
    match table(subposition, track_type, direction) {
        Some(samples) => samples.len() as u16,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_queries_return_the_zero_sentinel() {
        let size = move_info_size(CarSubposition::Default, TrackType::Flat, 0);
        assert!(size > 0);
        let sentinel = move_info(CarSubposition::Default, TrackType::Flat, 0, size as i32);
        assert_eq!(*sentinel, MOVE_INFO_ZERO);
        let negative = move_info(CarSubposition::Default, TrackType::Flat, 0, -1);
        assert_eq!(*negative, MOVE_INFO_ZERO);
    }

    #[test]
    fn flat_piece_advances_one_unit_per_step() {
        let size = move_info_size(CarSubposition::Default, TrackType::Flat, 0) as i32;
        assert_eq!(size, 32);
        for progress in 1..size {
            let prev = move_info(CarSubposition::Default, TrackType::Flat, 0, progress - 1);
            let here = move_info(CarSubposition::Default, TrackType::Flat, 0, progress);
            assert_eq!(here.x - prev.x, 1);
            assert_eq!(here.y, prev.y);
            assert_eq!(here.z, prev.z);
        }
    }

    #[test]
    fn rotated_pieces_stay_on_the_rotated_rail() {
        // A flat piece facing +y runs along the x = 16 rail.
        let size = move_info_size(CarSubposition::Default, TrackType::Flat, 1) as i32;
        for progress in 0..size {
            let sample = move_info(CarSubposition::Default, TrackType::Flat, 1, progress);
            assert_eq!(sample.x, 16);
            assert_eq!(sample.y, progress);
            assert_eq!(sample.direction, 8);
        }
    }

    #[test]
    fn piece_exit_meets_the_next_entry() {
        // The last sample of a flat piece is one unit short of the next
        // piece's first sample, for every direction.
        for direction in 0..4u8 {
            let size = move_info_size(CarSubposition::Default, TrackType::Flat, direction) as i32;
            let last = move_info(CarSubposition::Default, TrackType::Flat, direction, size - 1);
            let first = move_info(CarSubposition::Default, TrackType::Flat, direction, 0);
            let dx = (last.x - first.x).abs();
            let dy = (last.y - first.y).abs();
            assert_eq!(dx + dy, size - 1);
        }
    }

    #[test]
    fn go_kart_lanes_are_offset_sideways() {
        let left = move_info(CarSubposition::GoKartsLeftLane, TrackType::Flat, 0, 4);
        let right = move_info(CarSubposition::GoKartsRightLane, TrackType::Flat, 0, 4);
        let center = move_info(CarSubposition::Default, TrackType::Flat, 0, 4);
        assert_eq!(left.y - center.y, 6);
        assert_eq!(center.y - right.y, 6);
    }

    #[test]
    fn slope_pitch_changes_at_the_transition_midpoint() {
        let size = move_info_size(CarSubposition::Default, TrackType::FlatToUp25, 0) as i32;
        let early = move_info(CarSubposition::Default, TrackType::FlatToUp25, 0, 0);
        let late = move_info(CarSubposition::Default, TrackType::FlatToUp25, 0, size - 1);
        assert_eq!(early.pitch, 0);
        assert_eq!(late.pitch, 2);
        assert!(late.z > early.z);
    }
}
