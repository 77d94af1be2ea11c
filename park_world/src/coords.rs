//! Integer map coordinates and the isometric projection shared by the
//! simulation and the painter. One map tile is 32 x 32 world units; one
//! height step is 8 units.

use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};

pub const COORDS_XY_STEP: i32 = 32;
pub const COORDS_Z_STEP: i32 = 8;

/// One of the four cardinal track directions / view rotations.
pub type Direction = u8;

pub const DIRECTION_COUNT: u8 = 4;

/// Tile delta for a step in the given direction.
pub const DIRECTION_DELTA: [CoordsXY; 4] = [
    CoordsXY { x: COORDS_XY_STEP, y: 0 },
    CoordsXY { x: 0, y: COORDS_XY_STEP },
    CoordsXY { x: -COORDS_XY_STEP, y: 0 },
    CoordsXY { x: 0, y: -COORDS_XY_STEP },
];

pub fn direction_reverse(direction: Direction) -> Direction {
    (direction + 2) & 3
}

pub fn direction_next(direction: Direction, offset: u8) -> Direction {
    (direction + offset) & 3
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordsXY {
    pub x: i32,
    pub y: i32,
}

impl CoordsXY {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Rotate a vector a quarter turn at a time. Rotation 1 maps +x onto +y,
    /// so four applications return the input.
    pub fn rotated(self, rotation: Direction) -> Self {
        match rotation & 3 {
            0 => self,
            1 => Self { x: -self.y, y: self.x },
            2 => Self { x: -self.x, y: -self.y },
            _ => Self { x: self.y, y: -self.x },
        }
    }

    pub fn to_tile_start(self) -> Self {
        Self {
            x: self.x & !(COORDS_XY_STEP - 1),
            y: self.y & !(COORDS_XY_STEP - 1),
        }
    }

    pub fn with_z(self, z: i32) -> CoordsXYZ {
        CoordsXYZ { x: self.x, y: self.y, z }
    }
}

impl Add for CoordsXY {
    type Output = CoordsXY;
    fn add(self, rhs: CoordsXY) -> CoordsXY {
        CoordsXY { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl AddAssign for CoordsXY {
    fn add_assign(&mut self, rhs: CoordsXY) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for CoordsXY {
    type Output = CoordsXY;
    fn sub(self, rhs: CoordsXY) -> CoordsXY {
        CoordsXY { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl Neg for CoordsXY {
    type Output = CoordsXY;
    fn neg(self) -> CoordsXY {
        CoordsXY { x: -self.x, y: -self.y }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordsXYZ {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CoordsXYZ {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> CoordsXY {
        CoordsXY { x: self.x, y: self.y }
    }

    pub fn rotated(self, rotation: Direction) -> Self {
        let xy = self.xy().rotated(rotation);
        Self { x: xy.x, y: xy.y, z: self.z }
    }

    pub fn with_direction(self, direction: Direction) -> CoordsXYZD {
        CoordsXYZD { x: self.x, y: self.y, z: self.z, direction }
    }

    pub fn manhattan_xy(self, other: CoordsXYZ) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl Add for CoordsXYZ {
    type Output = CoordsXYZ;
    fn add(self, rhs: CoordsXYZ) -> CoordsXYZ {
        CoordsXYZ {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for CoordsXYZ {
    fn add_assign(&mut self, rhs: CoordsXYZ) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for CoordsXYZ {
    type Output = CoordsXYZ;
    fn sub(self, rhs: CoordsXYZ) -> CoordsXYZ {
        CoordsXYZ {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Add<CoordsXY> for CoordsXYZ {
    type Output = CoordsXYZ;
    fn add(self, rhs: CoordsXY) -> CoordsXYZ {
        CoordsXYZ { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordsXYZD {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub direction: Direction,
}

impl CoordsXYZD {
    pub const fn new(x: i32, y: i32, z: i32, direction: Direction) -> Self {
        Self { x, y, z, direction }
    }

    pub fn coords(self) -> CoordsXYZ {
        CoordsXYZ { x: self.x, y: self.y, z: self.z }
    }
}

/// Project a world position into screen space for one of the four view
/// rotations.
pub fn coords_3d_to_2d(pos: CoordsXYZ, rotation: Direction) -> CoordsXY {
    match rotation & 3 {
        0 => CoordsXY {
            x: pos.y - pos.x,
            y: ((pos.y + pos.x) >> 1) - pos.z,
        },
        1 => CoordsXY {
            x: -pos.x - pos.y,
            y: ((pos.y - pos.x) >> 1) - pos.z,
        },
        2 => CoordsXY {
            x: pos.x - pos.y,
            y: ((-pos.y - pos.x) >> 1) - pos.z,
        },
        _ => CoordsXY {
            x: pos.x + pos.y,
            y: ((pos.x - pos.y) >> 1) - pos.z,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_round_trips() {
        let v = CoordsXY::new(7, -13);
        let mut rotated = v;
        for _ in 0..4 {
            rotated = rotated.rotated(1);
        }
        assert_eq!(rotated, v);
        assert_eq!(v.rotated(2), -v);
        assert_eq!(v.rotated(3), v.rotated(1).rotated(1).rotated(1));
    }

    #[test]
    fn direction_deltas_cancel() {
        for direction in 0..DIRECTION_COUNT {
            let there = DIRECTION_DELTA[direction as usize];
            let back = DIRECTION_DELTA[direction_reverse(direction) as usize];
            assert_eq!(there + back, CoordsXY::default());
        }
    }

    #[test]
    fn projection_moves_back_tiles_up_screen() {
        // Walking one tile "into" the scene must raise the screen y for the
        // standard rotation, which is what the painter's ordering relies on.
        let near = coords_3d_to_2d(CoordsXYZ::new(0, 0, 0), 0);
        let far = coords_3d_to_2d(CoordsXYZ::new(COORDS_XY_STEP, COORDS_XY_STEP, 0), 0);
        assert!(far.y > near.y);
        assert_eq!(far.x, near.x);
    }
}
