//! Track piece catalogue. The physics integrator, the move-info generator
//! and the painter all read piece behaviour from `TrackDef` data tables
//! instead of dispatching on the piece type in code; the tuned values in
//! these tables (swing shifts, spin categories, g-force factors) are
//! calibration constants and must not be re-derived.

use serde::{Deserialize, Serialize};

use crate::coords::{CoordsXYZ, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    Flat,
    EndStation,
    BeginStation,
    MiddleStation,
    FlatToUp25,
    Up25,
    Up25ToUp60,
    Up60,
    Up60ToUp25,
    Up25ToFlat,
    FlatToDown25,
    Down25,
    Down25ToDown60,
    Down60,
    Down60ToDown25,
    Down25ToFlat,
    FlatToLeftBank,
    FlatToRightBank,
    LeftBankToFlat,
    RightBankToFlat,
    LeftBank,
    RightBank,
    LeftQuarterTurn5Tiles,
    RightQuarterTurn5Tiles,
    BankedLeftQuarterTurn5Tiles,
    BankedRightQuarterTurn5Tiles,
    LeftQuarterTurn5TilesUp25,
    RightQuarterTurn5TilesUp25,
    LeftQuarterTurn5TilesDown25,
    RightQuarterTurn5TilesDown25,
    LeftQuarterTurn5TilesCovered,
    RightQuarterTurn5TilesCovered,
    LeftQuarterTurn3Tiles,
    RightQuarterTurn3Tiles,
    LeftBankedQuarterTurn3Tiles,
    RightBankedQuarterTurn3Tiles,
    LeftQuarterTurn3TilesUp25,
    RightQuarterTurn3TilesUp25,
    LeftQuarterTurn3TilesDown25,
    RightQuarterTurn3TilesDown25,
    LeftQuarterTurn3TilesCovered,
    RightQuarterTurn3TilesCovered,
    LeftQuarterTurn1Tile,
    RightQuarterTurn1Tile,
    LeftHalfBankedHelixUpSmall,
    RightHalfBankedHelixUpSmall,
    LeftHalfBankedHelixDownSmall,
    RightHalfBankedHelixDownSmall,
    LeftHalfBankedHelixUpLarge,
    RightHalfBankedHelixUpLarge,
    LeftHalfBankedHelixDownLarge,
    RightHalfBankedHelixDownLarge,
    LeftCurvedLiftHill,
    RightCurvedLiftHill,
    SBendLeft,
    SBendRight,
    SBendLeftCovered,
    SBendRightCovered,
    LeftEighthToDiag,
    RightEighthToDiag,
    LeftEighthToOrthogonal,
    RightEighthToOrthogonal,
    LeftEighthBankToDiag,
    RightEighthBankToDiag,
    LeftEighthBankToOrthogonal,
    RightEighthBankToOrthogonal,
    FlatCovered,
    Brakes,
    BlockBrakes,
    Booster,
    OnRidePhoto,
    Watersplash,
    LogFlumeReverser,
    HeartlineTransferUp,
    HeartlineTransferDown,
    BrakeForDrop,
    PoweredLift,
    CableLiftHill,
    TowerBase,
    TowerSection,
    LeftReverser,
    RightReverser,
    RotationControlToggle,
    MinigolfHoleA,
    MinigolfHoleB,
    MinigolfHoleC,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackPitch {
    #[default]
    Flat,
    Up25,
    Up60,
    Down25,
    Down60,
    Vertical,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackRoll {
    #[default]
    None,
    Left,
    Right,
}

/// How a track piece feeds a spinning car. The letter is the direction the
/// spin is driven (L adds, R subtracts), the digit is the right-shift applied
/// to the train velocity on top of the car's spinning inertia; bigger means
/// less spin. RC is the rotation-control toggle piece, SP the rapids.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinFunction {
    #[default]
    None,
    Rc,
    R5,
    L5,
    R7,
    L7,
    R8,
    L8,
    R9,
    L9,
    Rl,
    Lr,
    Sp,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFlags(pub u16);

impl TrackFlags {
    pub const NONE: TrackFlags = TrackFlags(0);
    pub const STATION: TrackFlags = TrackFlags(1 << 0);
    pub const BRAKES: TrackFlags = TrackFlags(1 << 1);
    pub const BLOCK_BRAKES: TrackFlags = TrackFlags(1 << 2);
    pub const BOOSTER: TrackFlags = TrackFlags(1 << 3);
    pub const COVERED: TrackFlags = TrackFlags(1 << 4);
    pub const DOWN: TrackFlags = TrackFlags(1 << 5);
    /// Lift-to-flat pieces that can head a block section when chained.
    pub const BLOCK_START_ON_CHAIN: TrackFlags = TrackFlags(1 << 6);

    pub const fn union(self, other: TrackFlags) -> TrackFlags {
        TrackFlags(self.0 | other.0)
    }

    pub fn contains(self, other: TrackFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Static geometry and behaviour of one track piece, in the direction-0
/// frame: the piece is entered travelling +x at the centre of the west edge
/// of its origin tile.
#[derive(Debug, Clone, Copy)]
pub struct TrackDef {
    pub pitch_start: TrackPitch,
    pub pitch_end: TrackPitch,
    pub roll_start: TrackRoll,
    pub roll_end: TrackRoll,
    /// Origin of the succeeding element relative to this one.
    pub exit_offset: CoordsXYZ,
    /// Rotation added to the element direction on exit.
    pub exit_rotation: Direction,
    /// Number of move-info progress steps along the piece.
    pub length: u16,
    pub spin: SpinFunction,
    pub flags: TrackFlags,
    /// Speed-squared vertical g contribution (negative on crests).
    pub vertical_g_factor: i32,
    /// Speed-squared lateral g contribution (signed by turn direction).
    pub lateral_g_factor: i32,
}

const fn straight(length: u16) -> TrackDef {
    TrackDef {
        pitch_start: TrackPitch::Flat,
        pitch_end: TrackPitch::Flat,
        roll_start: TrackRoll::None,
        roll_end: TrackRoll::None,
        exit_offset: CoordsXYZ::new(32, 0, 0),
        exit_rotation: 0,
        length,
        spin: SpinFunction::None,
        flags: TrackFlags::NONE,
        vertical_g_factor: 0,
        lateral_g_factor: 0,
    }
}

const fn sloped(pitch_start: TrackPitch, pitch_end: TrackPitch, rise: i32, vg: i32) -> TrackDef {
    TrackDef {
        pitch_start,
        pitch_end,
        exit_offset: CoordsXYZ::new(32, 0, rise),
        vertical_g_factor: vg,
        ..straight(32)
    }
}

const fn banked(roll_start: TrackRoll, roll_end: TrackRoll) -> TrackDef {
    TrackDef {
        roll_start,
        roll_end,
        ..straight(32)
    }
}

/// Quarter turns. `left` decides the exit rotation (+1 for left, +3 for
/// right) and the sign of the lateral factor.
const fn turn(tiles: i32, left: bool, rise: i32, lat: i32, spin: SpinFunction) -> TrackDef {
    let span = 32 * tiles;
    TrackDef {
        exit_offset: if left {
            CoordsXYZ::new(span - 32, span, rise)
        } else {
            CoordsXYZ::new(span - 32, -span, rise)
        },
        exit_rotation: if left { 1 } else { 3 },
        length: (tiles * 40) as u16,
        spin,
        lateral_g_factor: if left { lat } else { -lat },
        ..straight(32)
    }
}

impl TrackType {
    /// Every piece type, for table builders.
    pub const ALL: [TrackType; 86] = [
        TrackType::Flat,
        TrackType::EndStation,
        TrackType::BeginStation,
        TrackType::MiddleStation,
        TrackType::FlatToUp25,
        TrackType::Up25,
        TrackType::Up25ToUp60,
        TrackType::Up60,
        TrackType::Up60ToUp25,
        TrackType::Up25ToFlat,
        TrackType::FlatToDown25,
        TrackType::Down25,
        TrackType::Down25ToDown60,
        TrackType::Down60,
        TrackType::Down60ToDown25,
        TrackType::Down25ToFlat,
        TrackType::FlatToLeftBank,
        TrackType::FlatToRightBank,
        TrackType::LeftBankToFlat,
        TrackType::RightBankToFlat,
        TrackType::LeftBank,
        TrackType::RightBank,
        TrackType::LeftQuarterTurn5Tiles,
        TrackType::RightQuarterTurn5Tiles,
        TrackType::BankedLeftQuarterTurn5Tiles,
        TrackType::BankedRightQuarterTurn5Tiles,
        TrackType::LeftQuarterTurn5TilesUp25,
        TrackType::RightQuarterTurn5TilesUp25,
        TrackType::LeftQuarterTurn5TilesDown25,
        TrackType::RightQuarterTurn5TilesDown25,
        TrackType::LeftQuarterTurn5TilesCovered,
        TrackType::RightQuarterTurn5TilesCovered,
        TrackType::LeftQuarterTurn3Tiles,
        TrackType::RightQuarterTurn3Tiles,
        TrackType::LeftBankedQuarterTurn3Tiles,
        TrackType::RightBankedQuarterTurn3Tiles,
        TrackType::LeftQuarterTurn3TilesUp25,
        TrackType::RightQuarterTurn3TilesUp25,
        TrackType::LeftQuarterTurn3TilesDown25,
        TrackType::RightQuarterTurn3TilesDown25,
        TrackType::LeftQuarterTurn3TilesCovered,
        TrackType::RightQuarterTurn3TilesCovered,
        TrackType::LeftQuarterTurn1Tile,
        TrackType::RightQuarterTurn1Tile,
        TrackType::LeftHalfBankedHelixUpSmall,
        TrackType::RightHalfBankedHelixUpSmall,
        TrackType::LeftHalfBankedHelixDownSmall,
        TrackType::RightHalfBankedHelixDownSmall,
        TrackType::LeftHalfBankedHelixUpLarge,
        TrackType::RightHalfBankedHelixUpLarge,
        TrackType::LeftHalfBankedHelixDownLarge,
        TrackType::RightHalfBankedHelixDownLarge,
        TrackType::LeftCurvedLiftHill,
        TrackType::RightCurvedLiftHill,
        TrackType::SBendLeft,
        TrackType::SBendRight,
        TrackType::SBendLeftCovered,
        TrackType::SBendRightCovered,
        TrackType::LeftEighthToDiag,
        TrackType::RightEighthToDiag,
        TrackType::LeftEighthToOrthogonal,
        TrackType::RightEighthToOrthogonal,
        TrackType::LeftEighthBankToDiag,
        TrackType::RightEighthBankToDiag,
        TrackType::LeftEighthBankToOrthogonal,
        TrackType::RightEighthBankToOrthogonal,
        TrackType::FlatCovered,
        TrackType::Brakes,
        TrackType::BlockBrakes,
        TrackType::Booster,
        TrackType::OnRidePhoto,
        TrackType::Watersplash,
        TrackType::LogFlumeReverser,
        TrackType::HeartlineTransferUp,
        TrackType::HeartlineTransferDown,
        TrackType::BrakeForDrop,
        TrackType::PoweredLift,
        TrackType::CableLiftHill,
        TrackType::TowerBase,
        TrackType::TowerSection,
        TrackType::LeftReverser,
        TrackType::RightReverser,
        TrackType::RotationControlToggle,
        TrackType::MinigolfHoleA,
        TrackType::MinigolfHoleB,
        TrackType::MinigolfHoleC,
    ];

    pub fn def(self) -> &'static TrackDef {
        use TrackType::*;
        macro_rules! defs {
            ($($name:ident => $def:expr;)*) => {
                match self {
                    $($name => {
                        static DEF: TrackDef = $def;
                        &DEF
                    })*
                }
            };
        }
        defs! {
            Flat => straight(32);
            FlatCovered => TrackDef { flags: TrackFlags::COVERED, ..straight(32) };
            EndStation => TrackDef { flags: TrackFlags::STATION, ..straight(32) };
            BeginStation => TrackDef { flags: TrackFlags::STATION, ..straight(32) };
            MiddleStation => TrackDef { flags: TrackFlags::STATION, ..straight(32) };

            FlatToUp25 => sloped(TrackPitch::Flat, TrackPitch::Up25, 8, 2);
            Up25 => sloped(TrackPitch::Up25, TrackPitch::Up25, 16, 0);
            Up25ToUp60 => sloped(TrackPitch::Up25, TrackPitch::Up60, 24, 1);
            Up60 => sloped(TrackPitch::Up60, TrackPitch::Up60, 64, 0);
            Up60ToUp25 => sloped(TrackPitch::Up60, TrackPitch::Up25, 24, -1);
            Up25ToFlat => TrackDef {
                flags: TrackFlags::BLOCK_START_ON_CHAIN,
                ..sloped(TrackPitch::Up25, TrackPitch::Flat, 8, -2)
            };
            FlatToDown25 => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Flat, TrackPitch::Down25, -8, -2)
            };
            Down25 => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Down25, TrackPitch::Down25, -16, 0)
            };
            Down25ToDown60 => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Down25, TrackPitch::Down60, -24, -2)
            };
            Down60 => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Down60, TrackPitch::Down60, -64, 0)
            };
            Down60ToDown25 => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Down60, TrackPitch::Down25, -24, 2)
            };
            Down25ToFlat => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Down25, TrackPitch::Flat, -8, 2)
            };

            FlatToLeftBank => banked(TrackRoll::None, TrackRoll::Left);
            FlatToRightBank => banked(TrackRoll::None, TrackRoll::Right);
            LeftBankToFlat => banked(TrackRoll::Left, TrackRoll::None);
            RightBankToFlat => banked(TrackRoll::Right, TrackRoll::None);
            LeftBank => banked(TrackRoll::Left, TrackRoll::Left);
            RightBank => banked(TrackRoll::Right, TrackRoll::Right);

            LeftQuarterTurn5Tiles => turn(3, true, 0, 1, SpinFunction::L5);
            RightQuarterTurn5Tiles => turn(3, false, 0, 1, SpinFunction::R5);
            BankedLeftQuarterTurn5Tiles => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                ..turn(3, true, 0, 1, SpinFunction::L5)
            };
            BankedRightQuarterTurn5Tiles => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                ..turn(3, false, 0, 1, SpinFunction::R5)
            };
            LeftQuarterTurn5TilesUp25 => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(3, true, 48, 1, SpinFunction::L5)
            };
            RightQuarterTurn5TilesUp25 => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(3, false, 48, 1, SpinFunction::R5)
            };
            LeftQuarterTurn5TilesDown25 => TrackDef {
                pitch_start: TrackPitch::Down25,
                pitch_end: TrackPitch::Down25,
                flags: TrackFlags::DOWN,
                ..turn(3, true, -48, 1, SpinFunction::L5)
            };
            RightQuarterTurn5TilesDown25 => TrackDef {
                pitch_start: TrackPitch::Down25,
                pitch_end: TrackPitch::Down25,
                flags: TrackFlags::DOWN,
                ..turn(3, false, -48, 1, SpinFunction::R5)
            };
            LeftQuarterTurn5TilesCovered => TrackDef {
                flags: TrackFlags::COVERED,
                ..turn(3, true, 0, 1, SpinFunction::L5)
            };
            RightQuarterTurn5TilesCovered => TrackDef {
                flags: TrackFlags::COVERED,
                ..turn(3, false, 0, 1, SpinFunction::R5)
            };

            LeftQuarterTurn3Tiles => turn(2, true, 0, 2, SpinFunction::L7);
            RightQuarterTurn3Tiles => turn(2, false, 0, 2, SpinFunction::R7);
            LeftBankedQuarterTurn3Tiles => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                ..turn(2, true, 0, 2, SpinFunction::L7)
            };
            RightBankedQuarterTurn3Tiles => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                ..turn(2, false, 0, 2, SpinFunction::R7)
            };
            LeftQuarterTurn3TilesUp25 => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(2, true, 32, 2, SpinFunction::L7)
            };
            RightQuarterTurn3TilesUp25 => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(2, false, 32, 2, SpinFunction::R7)
            };
            LeftQuarterTurn3TilesDown25 => TrackDef {
                pitch_start: TrackPitch::Down25,
                pitch_end: TrackPitch::Down25,
                flags: TrackFlags::DOWN,
                ..turn(2, true, -32, 2, SpinFunction::L7)
            };
            RightQuarterTurn3TilesDown25 => TrackDef {
                pitch_start: TrackPitch::Down25,
                pitch_end: TrackPitch::Down25,
                flags: TrackFlags::DOWN,
                ..turn(2, false, -32, 2, SpinFunction::R7)
            };
            LeftQuarterTurn3TilesCovered => TrackDef {
                flags: TrackFlags::COVERED,
                ..turn(2, true, 0, 2, SpinFunction::L7)
            };
            RightQuarterTurn3TilesCovered => TrackDef {
                flags: TrackFlags::COVERED,
                ..turn(2, false, 0, 2, SpinFunction::R7)
            };

            LeftQuarterTurn1Tile => turn(1, true, 0, 3, SpinFunction::L8);
            RightQuarterTurn1Tile => turn(1, false, 0, 3, SpinFunction::R8);

            LeftHalfBankedHelixUpSmall => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                ..turn(2, true, 16, 2, SpinFunction::L7)
            };
            RightHalfBankedHelixUpSmall => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                ..turn(2, false, 16, 2, SpinFunction::R7)
            };
            LeftHalfBankedHelixDownSmall => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                flags: TrackFlags::DOWN,
                ..turn(2, true, -16, 2, SpinFunction::L7)
            };
            RightHalfBankedHelixDownSmall => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                flags: TrackFlags::DOWN,
                ..turn(2, false, -16, 2, SpinFunction::R7)
            };
            LeftHalfBankedHelixUpLarge => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                ..turn(3, true, 16, 1, SpinFunction::L5)
            };
            RightHalfBankedHelixUpLarge => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                ..turn(3, false, 16, 1, SpinFunction::R5)
            };
            LeftHalfBankedHelixDownLarge => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                flags: TrackFlags::DOWN,
                ..turn(3, true, -16, 1, SpinFunction::L5)
            };
            RightHalfBankedHelixDownLarge => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                flags: TrackFlags::DOWN,
                ..turn(3, false, -16, 1, SpinFunction::R5)
            };
            LeftCurvedLiftHill => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(2, true, 32, 2, SpinFunction::None)
            };
            RightCurvedLiftHill => TrackDef {
                pitch_start: TrackPitch::Up25,
                pitch_end: TrackPitch::Up25,
                ..turn(2, false, 32, 2, SpinFunction::None)
            };

            SBendLeft => TrackDef {
                exit_offset: CoordsXYZ::new(64, 32, 0),
                length: 96,
                spin: SpinFunction::Lr,
                lateral_g_factor: 2,
                ..straight(32)
            };
            SBendRight => TrackDef {
                exit_offset: CoordsXYZ::new(64, -32, 0),
                length: 96,
                spin: SpinFunction::Rl,
                lateral_g_factor: -2,
                ..straight(32)
            };
            SBendLeftCovered => TrackDef {
                exit_offset: CoordsXYZ::new(64, 32, 0),
                length: 96,
                spin: SpinFunction::Lr,
                lateral_g_factor: 2,
                flags: TrackFlags::COVERED,
                ..straight(32)
            };
            SBendRightCovered => TrackDef {
                exit_offset: CoordsXYZ::new(64, -32, 0),
                length: 96,
                spin: SpinFunction::Rl,
                lateral_g_factor: -2,
                flags: TrackFlags::COVERED,
                ..straight(32)
            };

            LeftEighthToDiag => TrackDef {
                exit_offset: CoordsXYZ::new(64, 32, 0),
                length: 80,
                spin: SpinFunction::L9,
                lateral_g_factor: 1,
                ..straight(32)
            };
            RightEighthToDiag => TrackDef {
                exit_offset: CoordsXYZ::new(64, -32, 0),
                length: 80,
                spin: SpinFunction::R9,
                lateral_g_factor: -1,
                ..straight(32)
            };
            LeftEighthToOrthogonal => TrackDef {
                exit_offset: CoordsXYZ::new(64, 32, 0),
                exit_rotation: 1,
                length: 80,
                spin: SpinFunction::L9,
                lateral_g_factor: 1,
                ..straight(32)
            };
            RightEighthToOrthogonal => TrackDef {
                exit_offset: CoordsXYZ::new(64, -32, 0),
                exit_rotation: 3,
                length: 80,
                spin: SpinFunction::R9,
                lateral_g_factor: -1,
                ..straight(32)
            };
            LeftEighthBankToDiag => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                exit_offset: CoordsXYZ::new(64, 32, 0),
                length: 80,
                spin: SpinFunction::L9,
                lateral_g_factor: 1,
                ..straight(32)
            };
            RightEighthBankToDiag => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                exit_offset: CoordsXYZ::new(64, -32, 0),
                length: 80,
                spin: SpinFunction::R9,
                lateral_g_factor: -1,
                ..straight(32)
            };
            LeftEighthBankToOrthogonal => TrackDef {
                roll_start: TrackRoll::Left,
                roll_end: TrackRoll::Left,
                exit_offset: CoordsXYZ::new(64, 32, 0),
                exit_rotation: 1,
                length: 80,
                spin: SpinFunction::L9,
                lateral_g_factor: 1,
                ..straight(32)
            };
            RightEighthBankToOrthogonal => TrackDef {
                roll_start: TrackRoll::Right,
                roll_end: TrackRoll::Right,
                exit_offset: CoordsXYZ::new(64, -32, 0),
                exit_rotation: 3,
                length: 80,
                spin: SpinFunction::R9,
                lateral_g_factor: -1,
                ..straight(32)
            };

            Brakes => TrackDef { flags: TrackFlags::BRAKES, ..straight(32) };
            BlockBrakes => TrackDef { flags: TrackFlags::BLOCK_BRAKES, ..straight(32) };
            Booster => TrackDef { flags: TrackFlags::BOOSTER, ..straight(32) };
            OnRidePhoto => straight(32);
            Watersplash => TrackDef {
                exit_offset: CoordsXYZ::new(160, 0, 0),
                length: 160,
                spin: SpinFunction::Sp,
                ..straight(32)
            };
            LogFlumeReverser => straight(32);
            HeartlineTransferUp => sloped(TrackPitch::Flat, TrackPitch::Flat, 32, 0);
            HeartlineTransferDown => TrackDef {
                flags: TrackFlags::DOWN,
                ..sloped(TrackPitch::Flat, TrackPitch::Flat, -32, 0)
            };
            BrakeForDrop => TrackDef {
                pitch_start: TrackPitch::Flat,
                pitch_end: TrackPitch::Down60,
                flags: TrackFlags::DOWN,
                vertical_g_factor: -2,
                exit_offset: CoordsXYZ::new(32, 0, -24),
                ..straight(32)
            };
            PoweredLift => sloped(TrackPitch::Up25, TrackPitch::Up25, 16, 0);
            CableLiftHill => TrackDef {
                flags: TrackFlags::BLOCK_START_ON_CHAIN,
                ..sloped(TrackPitch::Up25, TrackPitch::Up25, 16, 0)
            };
            TowerBase => TrackDef {
                pitch_start: TrackPitch::Vertical,
                pitch_end: TrackPitch::Vertical,
                exit_offset: CoordsXYZ::new(0, 0, 48),
                length: 48,
                ..straight(32)
            };
            TowerSection => TrackDef {
                pitch_start: TrackPitch::Vertical,
                pitch_end: TrackPitch::Vertical,
                exit_offset: CoordsXYZ::new(0, 0, 16),
                length: 16,
                ..straight(32)
            };
            LeftReverser => TrackDef {
                exit_offset: CoordsXYZ::new(96, 0, 0),
                length: 192,
                ..straight(32)
            };
            RightReverser => TrackDef {
                exit_offset: CoordsXYZ::new(96, 0, 0),
                length: 192,
                ..straight(32)
            };
            RotationControlToggle => TrackDef { spin: SpinFunction::Rc, ..straight(32) };
            MinigolfHoleA => TrackDef {
                exit_offset: CoordsXYZ::new(64, 0, 0),
                length: 64,
                ..straight(32)
            };
            MinigolfHoleB => TrackDef {
                exit_offset: CoordsXYZ::new(64, 0, 0),
                length: 64,
                ..straight(32)
            };
            MinigolfHoleC => TrackDef {
                exit_offset: CoordsXYZ::new(64, 0, 0),
                length: 64,
                ..straight(32)
            };
        }
    }

    pub fn is_station(self) -> bool {
        self.def().flags.contains(TrackFlags::STATION)
    }

    pub fn is_brakes(self) -> bool {
        self.def().flags.contains(TrackFlags::BRAKES)
    }

    pub fn is_block_brakes(self) -> bool {
        self.def().flags.contains(TrackFlags::BLOCK_BRAKES)
    }

    pub fn is_booster(self) -> bool {
        self.def().flags.contains(TrackFlags::BOOSTER)
    }

    pub fn is_covered(self) -> bool {
        self.def().flags.contains(TrackFlags::COVERED)
    }

    pub fn is_reverser(self) -> bool {
        matches!(self, TrackType::LeftReverser | TrackType::RightReverser)
    }

    pub fn is_mini_golf_hole(self) -> bool {
        matches!(
            self,
            TrackType::MinigolfHoleA | TrackType::MinigolfHoleB | TrackType::MinigolfHoleC
        )
    }

    /// Swing drive for swinging cars on this piece. The magnitude is the
    /// right-shift applied to the train speed, the sign is the swing
    /// direction; zero means the piece does not drive the swing.
    pub fn swing_amount(self, track_progress: u16) -> i32 {
        use TrackType::*;
        match self {
            LeftQuarterTurn5Tiles
            | BankedLeftQuarterTurn5Tiles
            | LeftQuarterTurn5TilesUp25
            | LeftQuarterTurn5TilesDown25
            | LeftQuarterTurn5TilesCovered
            | LeftHalfBankedHelixUpLarge
            | LeftHalfBankedHelixDownLarge => 14,

            RightQuarterTurn5Tiles
            | BankedRightQuarterTurn5Tiles
            | RightQuarterTurn5TilesUp25
            | RightQuarterTurn5TilesDown25
            | RightQuarterTurn5TilesCovered
            | RightHalfBankedHelixUpLarge
            | RightHalfBankedHelixDownLarge => -14,

            SBendLeft | SBendLeftCovered => {
                if track_progress < 48 {
                    14
                } else {
                    -15
                }
            }
            SBendRight | SBendRightCovered => {
                if track_progress < 48 {
                    -14
                } else {
                    15
                }
            }

            LeftQuarterTurn3Tiles
            | LeftBankedQuarterTurn3Tiles
            | LeftQuarterTurn3TilesUp25
            | LeftQuarterTurn3TilesDown25
            | LeftQuarterTurn3TilesCovered
            | LeftHalfBankedHelixUpSmall
            | LeftHalfBankedHelixDownSmall
            | LeftCurvedLiftHill => 13,

            RightQuarterTurn3Tiles
            | RightBankedQuarterTurn3Tiles
            | RightQuarterTurn3TilesUp25
            | RightQuarterTurn3TilesDown25
            | RightQuarterTurn3TilesCovered
            | RightHalfBankedHelixUpSmall
            | RightHalfBankedHelixDownSmall
            | RightCurvedLiftHill => -13,

            LeftQuarterTurn1Tile => 12,
            RightQuarterTurn1Tile => -12,

            LeftEighthToDiag | LeftEighthToOrthogonal | LeftEighthBankToDiag
            | LeftEighthBankToOrthogonal => 15,
            RightEighthToDiag | RightEighthToOrthogonal | RightEighthBankToDiag
            | RightEighthBankToOrthogonal => -15,

            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stations_are_flagged() {
        assert!(TrackType::EndStation.is_station());
        assert!(TrackType::BeginStation.is_station());
        assert!(!TrackType::Flat.is_station());
    }

    #[test]
    fn swing_amounts_match_turn_radius() {
        assert_eq!(TrackType::LeftQuarterTurn5Tiles.swing_amount(0), 14);
        assert_eq!(TrackType::RightQuarterTurn3Tiles.swing_amount(0), -13);
        assert_eq!(TrackType::LeftQuarterTurn1Tile.swing_amount(0), 12);
        assert_eq!(TrackType::Flat.swing_amount(0), 0);
    }

    #[test]
    fn s_bend_swing_flips_mid_piece() {
        assert_eq!(TrackType::SBendLeft.swing_amount(0), 14);
        assert_eq!(TrackType::SBendLeft.swing_amount(48), -15);
        assert_eq!(TrackType::SBendRight.swing_amount(47), -14);
        assert_eq!(TrackType::SBendRight.swing_amount(48), 15);
    }

    #[test]
    fn slope_exits_rise_by_piece_height() {
        assert_eq!(TrackType::Up25.def().exit_offset.z, 16);
        assert_eq!(TrackType::Down60.def().exit_offset.z, -64);
        assert_eq!(TrackType::FlatToUp25.def().exit_offset.z, 8);
    }
}
