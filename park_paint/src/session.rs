//! The per-frame paint session: a bump arena of drawable primitives,
//! bucketed into spatial quadrants whose order approximates a back-to-front
//! painter's sweep. Only one session may be alive at a time; the arena is
//! reset by beginning the next session, never freed piecewise.

use std::sync::atomic::{AtomicBool, Ordering};

use park_world::coords::{coords_3d_to_2d, CoordsXY, CoordsXYZ};
use thiserror::Error;

use crate::target::{ImageTable, RenderTarget};

pub const MAX_PAINT_STRUCTS: usize = 4000;
pub const MAX_PAINT_QUADRANTS: usize = 512;

pub const QUADRANT_FLAG_IDENTICAL: u8 = 1 << 0;
pub const QUADRANT_FLAG_NEXT: u8 = 1 << 1;
pub const QUADRANT_FLAG_BIGGER: u8 = 1 << 7;

static SESSION_IN_USE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaintError {
    #[error("a paint session is already in use")]
    SessionInUse,
}

/// What a primitive represents for mouse picking and the see-through view
/// modes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InteractionItem {
    #[default]
    None,
    Terrain,
    Sprite,
    Ride,
    Water,
    Scenery,
    Footpath,
    FootpathItem,
    Park,
    Wall,
    LargeScenery,
    Label,
    Banner,
}

impl InteractionItem {
    pub fn debug_colour(self) -> u8 {
        match self {
            InteractionItem::None => 0,
            InteractionItem::Terrain => 102,
            InteractionItem::Sprite => 114,
            InteractionItem::Ride => 229,
            InteractionItem::Water => 126,
            InteractionItem::Scenery => 138,
            InteractionItem::Footpath => 150,
            InteractionItem::FootpathItem => 162,
            InteractionItem::Park => 174,
            InteractionItem::Wall => 186,
            InteractionItem::LargeScenery => 198,
            InteractionItem::Label => 210,
            InteractionItem::Banner => 222,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BoundBox {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub x_end: i32,
    pub y_end: i32,
    pub z_end: i32,
}

/// A root drawable primitive with its own bounding box and quadrant slot.
#[derive(Debug, Clone)]
pub struct PaintStruct {
    pub image_id: u32,
    pub screen_pos: CoordsXY,
    pub bounds: BoundBox,
    pub quadrant_index: u32,
    pub quadrant_flags: u8,
    pub next_quadrant: Option<u32>,
    /// Primitives drawn immediately after this one, before the draw walk
    /// returns to the quadrant list.
    pub children: Option<u32>,
    /// Head of the attachment chain.
    pub attached: Option<u32>,
    pub interaction: InteractionItem,
    pub map_pos: CoordsXY,
    pub is_masked: bool,
    pub colour_image_id: u32,
}

/// A primitive drawn flush against its parent; no independent bounds.
#[derive(Debug, Clone)]
pub struct AttachedPaintStruct {
    pub image_id: u32,
    pub x: i32,
    pub y: i32,
    pub next: Option<u32>,
    pub is_masked: bool,
    pub colour_image_id: u32,
}

/// Floating text (the money effect) drawn after all sprites.
#[derive(Debug, Clone)]
pub struct PaintStringStruct {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub next: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum PaintNode {
    Root(PaintStruct),
    Attached(AttachedPaintStruct),
    Text(PaintStringStruct),
}

#[derive(Debug, Clone, Copy)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub zoom_level: u8,
}

pub struct PaintSession<'a> {
    pub images: &'a ImageTable,
    pub clip: ClipRect,
    pub rotation: u8,
    pub view_flags: u32,
    pub(crate) nodes: Vec<PaintNode>,
    pub(crate) quadrants: [Option<u32>; MAX_PAINT_QUADRANTS],
    pub(crate) quadrant_back_index: u32,
    pub(crate) quadrant_front_index: u32,
    pub(crate) last_root: Option<u32>,
    pub(crate) last_attached: Option<u32>,
    pub(crate) string_head: Option<u32>,
    pub(crate) last_string: Option<u32>,
    pub(crate) sorted_head: Option<u32>,
    /// World position of the primitive source currently being painted.
    pub sprite_position: CoordsXY,
    pub map_position: CoordsXY,
    pub interaction: InteractionItem,
    /// Sprites above this height step are skipped by the dispatcher.
    pub height_clip: u8,
    pub paint_bounding_boxes: bool,
}

impl<'a> PaintSession<'a> {
    /// Acquire the single paint session for one frame.
    pub fn begin(
        images: &'a ImageTable,
        target: &RenderTarget,
        rotation: u8,
        view_flags: u32,
    ) -> Result<Self, PaintError> {
        Self::begin_clipped(
            images,
            ClipRect {
                x: target.x,
                y: target.y,
                width: target.width,
                height: target.height,
                zoom_level: target.zoom_level,
            },
            rotation,
            view_flags,
        )
    }

    /// Acquire the session for one clip column of a larger target; the
    /// full-frame renderer runs one session per 32-pixel column.
    pub fn begin_clipped(
        images: &'a ImageTable,
        clip: ClipRect,
        rotation: u8,
        view_flags: u32,
    ) -> Result<Self, PaintError> {
        if SESSION_IN_USE.swap(true, Ordering::Acquire) {
            return Err(PaintError::SessionInUse);
        }
        Ok(Self {
            images,
            clip,
            rotation: rotation & 3,
            view_flags,
            nodes: Vec::with_capacity(256),
            quadrants: [None; MAX_PAINT_QUADRANTS],
            quadrant_back_index: u32::MAX,
            quadrant_front_index: 0,
            last_root: None,
            last_attached: None,
            string_head: None,
            last_string: None,
            sorted_head: None,
            sprite_position: CoordsXY::default(),
            map_position: CoordsXY::default(),
            interaction: InteractionItem::None,
            height_clip: 128,
            paint_bounding_boxes: false,
        })
    }

    pub(crate) fn root(&self, index: u32) -> &PaintStruct {
        match &self.nodes[index as usize] {
            PaintNode::Root(ps) => ps,
            _ => panic!("paint node {index} is not a root primitive"),
        }
    }

    pub(crate) fn root_mut(&mut self, index: u32) -> &mut PaintStruct {
        match &mut self.nodes[index as usize] {
            PaintNode::Root(ps) => ps,
            _ => panic!("paint node {index} is not a root primitive"),
        }
    }

    pub(crate) fn attached_node(&self, index: u32) -> &AttachedPaintStruct {
        match &self.nodes[index as usize] {
            PaintNode::Attached(ps) => ps,
            _ => panic!("paint node {index} is not an attached primitive"),
        }
    }

    pub(crate) fn string_node(&self, index: u32) -> &PaintStringStruct {
        match &self.nodes[index as usize] {
            PaintNode::Text(ps) => ps,
            _ => panic!("paint node {index} is not a string primitive"),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn quadrant_head(&self, index: usize) -> Option<u32> {
        self.quadrants[index]
    }

    pub fn quadrant_bounds(&self) -> (u32, u32) {
        (self.quadrant_back_index, self.quadrant_front_index)
    }

    fn arena_full(&self) -> bool {
        self.nodes.len() >= MAX_PAINT_STRUCTS - 1
    }

    fn add_to_quadrant(&mut self, index: u32, position_hash: i32) {
        let quadrant_index = (position_hash / 32).clamp(0, MAX_PAINT_QUADRANTS as i32 - 1) as u32;
        {
            let ps = self.root_mut(index);
            ps.quadrant_index = quadrant_index;
        }
        let old_head = self.quadrants[quadrant_index as usize];
        self.root_mut(index).next_quadrant = old_head;
        self.quadrants[quadrant_index as usize] = Some(index);

        self.quadrant_back_index = self.quadrant_back_index.min(quadrant_index);
        self.quadrant_front_index = self.quadrant_front_index.max(quadrant_index);
    }

    /// Rotate, project and clip one primitive; `None` without any session
    /// mutation if it is rejected or the arena is exhausted.
    fn build_primitive(
        &self,
        image_id: u32,
        mut offset: CoordsXYZ,
        mut bb_size: CoordsXYZ,
        mut bb_offset: CoordsXYZ,
    ) -> Option<PaintStruct> {
        if self.arena_full() {
            return None;
        }
        let entry = self.images.get(image_id)?;

        // Bring the offsets into the rotation-0 frame. The bound box is
        // shortened by one unit on the axes that gain a unit when rotated.
        let inverse = (4 - self.rotation) & 3;
        match self.rotation {
            0 => {
                bb_size.x -= 1;
                bb_size.y -= 1;
            }
            1 => {
                bb_size.x -= 1;
            }
            3 => {
                bb_size.y -= 1;
            }
            _ => {}
        }
        offset = offset.rotated(inverse);
        bb_size = bb_size.rotated(inverse);
        bb_offset = bb_offset.rotated(inverse);

        let world = CoordsXYZ::new(
            offset.x + self.sprite_position.x,
            offset.y + self.sprite_position.y,
            offset.z,
        );
        let screen = coords_3d_to_2d(world, self.rotation);

        let left = screen.x + entry.x_offset;
        let bottom = screen.y + entry.y_offset;
        let right = left + entry.width;
        let top = bottom + entry.height;

        if right <= self.clip.x {
            return None;
        }
        if top <= self.clip.y {
            return None;
        }
        if left >= self.clip.x + self.clip.width {
            return None;
        }
        if bottom >= self.clip.y + self.clip.height {
            return None;
        }

        let bounds = BoundBox {
            x: bb_offset.x + self.sprite_position.x,
            y: bb_offset.y + self.sprite_position.y,
            z: bb_offset.z,
            x_end: bb_size.x + bb_offset.x + self.sprite_position.x,
            y_end: bb_size.y + bb_offset.y + self.sprite_position.y,
            z_end: bb_offset.z + bb_size.z,
        };

        Some(PaintStruct {
            image_id,
            screen_pos: screen,
            bounds,
            quadrant_index: 0,
            quadrant_flags: 0,
            next_quadrant: None,
            children: None,
            attached: None,
            interaction: self.interaction,
            map_pos: self.map_position,
            is_masked: false,
            colour_image_id: 0,
        })
    }

    /// Primitive whose bounding box starts at its own offset.
    pub fn add_sprite(
        &mut self,
        image_id: u32,
        offset: CoordsXYZ,
        bb_size: CoordsXYZ,
    ) -> Option<u32> {
        self.last_root = None;
        self.last_attached = None;

        let ps = self.build_primitive(image_id, offset, bb_size, offset)?;

        // The quadrant hash orders primitives along the view's back-to-front
        // sweep; each rotation has its own linear form.
        let world = CoordsXY::new(ps.bounds.x, ps.bounds.y);
        let position_hash = match self.rotation {
            0 => world.y + world.x,
            1 => world.y - world.x + 0x2000,
            2 => -(world.y + world.x) + 0x4000,
            _ => world.x - world.y + 0x2000,
        };

        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Root(ps));
        self.last_root = Some(index);
        self.add_to_quadrant(index, position_hash);
        Some(index)
    }

    /// Primitive with an independent bounding-box offset.
    pub fn add_sprite_bb(
        &mut self,
        image_id: u32,
        offset: CoordsXYZ,
        bb_size: CoordsXYZ,
        bb_offset: CoordsXYZ,
    ) -> Option<u32> {
        self.last_root = None;
        self.last_attached = None;

        let ps = self.build_primitive(image_id, offset, bb_size, bb_offset)?;

        let mut attach = CoordsXY::new(ps.bounds.x, ps.bounds.y).rotated(self.rotation);
        match self.rotation {
            1 | 3 => attach.x += 0x2000,
            2 => attach.x += 0x4000,
            _ => {}
        }
        let position_hash = attach.x + attach.y;

        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Root(ps));
        self.last_root = Some(index);
        self.add_to_quadrant(index, position_hash);
        Some(index)
    }

    /// Like `add_sprite_bb` but never enters the quadrant ordering; used
    /// for primitives whose order is fixed by their parent.
    pub fn add_sprite_bb_unsorted(
        &mut self,
        image_id: u32,
        offset: CoordsXYZ,
        bb_size: CoordsXYZ,
        bb_offset: CoordsXYZ,
    ) -> Option<u32> {
        self.last_root = None;
        self.last_attached = None;

        let ps = self.build_primitive(image_id, offset, bb_size, bb_offset)?;
        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Root(ps));
        self.last_root = Some(index);
        Some(index)
    }

    /// Chain a primitive to be drawn straight after the previous root.
    pub fn add_sprite_bb_chain(
        &mut self,
        image_id: u32,
        offset: CoordsXYZ,
        bb_size: CoordsXYZ,
        bb_offset: CoordsXYZ,
    ) -> Option<u32> {
        let Some(parent) = self.last_root else {
            return self.add_sprite_bb(image_id, offset, bb_size, bb_offset);
        };

        let ps = self.build_primitive(image_id, offset, bb_size, bb_offset)?;
        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Root(ps));
        self.root_mut(parent).children = Some(index);
        self.last_root = Some(index);
        Some(index)
    }

    /// Attach a secondary image to the most recent root primitive.
    pub fn attach_to_previous(&mut self, image_id: u32, x: i32, y: i32) -> bool {
        if self.arena_full() {
            return false;
        }
        let Some(parent) = self.last_root else {
            return false;
        };

        let index = self.nodes.len() as u32;
        let old_head = self.root(parent).attached;
        self.nodes.push(PaintNode::Attached(AttachedPaintStruct {
            image_id,
            x,
            y,
            next: old_head,
            is_masked: false,
            colour_image_id: 0,
        }));
        self.root_mut(parent).attached = Some(index);
        self.last_attached = Some(index);
        true
    }

    /// Append to the current attachment chain instead of pushing a new
    /// head, so stacked attachments keep their call order.
    pub fn attach_to_previous_attach(&mut self, image_id: u32, x: i32, y: i32) -> bool {
        let Some(last) = self.last_attached else {
            return self.attach_to_previous(image_id, x, y);
        };
        if self.arena_full() {
            return false;
        }

        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Attached(AttachedPaintStruct {
            image_id,
            x,
            y,
            next: None,
            is_masked: false,
            colour_image_id: 0,
        }));
        match &mut self.nodes[last as usize] {
            PaintNode::Attached(prev) => prev.next = Some(index),
            _ => unreachable!("last_attached always points at an attached node"),
        }
        self.last_attached = Some(index);
        true
    }

    /// Floating text drawn after every sprite (the money effect).
    pub fn add_floating_text(&mut self, text: String, y: i32, z: i32, offset_x: i32) {
        if self.arena_full() {
            return;
        }
        let world = CoordsXYZ::new(self.sprite_position.x, self.sprite_position.y, z);
        let screen = coords_3d_to_2d(world, self.rotation);

        let index = self.nodes.len() as u32;
        self.nodes.push(PaintNode::Text(PaintStringStruct {
            text,
            x: screen.x + offset_x,
            y: screen.y + y,
            next: None,
        }));
        match self.last_string {
            None => self.string_head = Some(index),
            Some(last) => match &mut self.nodes[last as usize] {
                PaintNode::Text(prev) => prev.next = Some(index),
                _ => unreachable!("last_string always points at a string node"),
            },
        }
        self.last_string = Some(index);
    }

    pub fn string_list_head(&self) -> Option<u32> {
        self.string_head
    }
}

impl Drop for PaintSession<'_> {
    fn drop(&mut self) {
        SESSION_IN_USE.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::ImageEntry;

    fn images() -> ImageTable {
        ImageTable::uniform(
            64,
            ImageEntry {
                width: 10,
                height: 10,
                x_offset: -5,
                y_offset: -5,
            },
        )
    }

    fn target() -> RenderTarget {
        RenderTarget::with_origin(-256, -256, 512, 512)
    }

    // The session guard is process-wide, so every test that needs a session
    // funnels through this helper; cargo runs tests in threads and two live
    // sessions must fail.
    fn with_session<R>(f: impl FnOnce(&mut PaintSession) -> R) -> R {
        let images = images();
        let target = target();
        loop {
            match PaintSession::begin(&images, &target, 0, 0) {
                Ok(mut session) => return f(&mut session),
                Err(PaintError::SessionInUse) => std::thread::yield_now(),
            }
        }
    }

    #[test]
    fn second_session_is_rejected() {
        with_session(|_session| {
            let images = images();
            let target = target();
            assert_eq!(
                PaintSession::begin(&images, &target, 0, 0).err(),
                Some(PaintError::SessionInUse)
            );
        });
    }

    #[test]
    fn clip_rejection_leaves_session_untouched() {
        with_session(|session| {
            session.sprite_position = CoordsXY::new(100_000, 100_000);
            let before_bounds = session.quadrant_bounds();
            let result = session.add_sprite(
                1,
                CoordsXYZ::new(0, 0, 0),
                CoordsXYZ::new(32, 32, 8),
            );
            assert!(result.is_none());
            assert_eq!(session.node_count(), 0);
            assert_eq!(session.quadrant_bounds(), before_bounds);
            assert!(session.quadrants.iter().all(Option::is_none));
        });
    }

    #[test]
    fn same_quadrant_inserts_at_bucket_head() {
        with_session(|session| {
            session.sprite_position = CoordsXY::new(64, 64);
            let first = session
                .add_sprite(1, CoordsXYZ::default(), CoordsXYZ::new(4, 4, 4))
                .unwrap();
            let second = session
                .add_sprite(2, CoordsXYZ::default(), CoordsXYZ::new(4, 4, 4))
                .unwrap();

            let quadrant = session.root(first).quadrant_index;
            assert_eq!(session.root(second).quadrant_index, quadrant);
            assert_eq!(session.quadrant_head(quadrant as usize), Some(second));
            assert_eq!(session.root(second).next_quadrant, Some(first));
        });
    }

    #[test]
    fn quadrant_hash_is_monotonic_towards_the_front() {
        // Moving one tile further "back" never decreases the quadrant
        // index, for any rotation.
        let images = images();
        let target = target();
        for rotation in 0..4 {
            loop {
                match PaintSession::begin(&images, &target, rotation, 0) {
                    Ok(mut session) => {
                        let step = match rotation {
                            0 => CoordsXY::new(32, 32),
                            1 => CoordsXY::new(-32, 32),
                            2 => CoordsXY::new(-32, -32),
                            _ => CoordsXY::new(32, -32),
                        };
                        let mut pos = CoordsXY::new(2048, 2048);
                        let mut last_quadrant = None;
                        for _ in 0..8 {
                            session.sprite_position = pos;
                            if let Some(index) = session.add_sprite(
                                1,
                                CoordsXYZ::default(),
                                CoordsXYZ::new(4, 4, 4),
                            ) {
                                let quadrant = session.root(index).quadrant_index;
                                if let Some(previous) = last_quadrant {
                                    assert!(
                                        quadrant >= previous,
                                        "rotation {rotation}: quadrant went backwards"
                                    );
                                }
                                last_quadrant = Some(quadrant);
                            }
                            pos += step;
                        }
                        break;
                    }
                    Err(PaintError::SessionInUse) => std::thread::yield_now(),
                }
            }
        }
    }

    #[test]
    fn attachments_chain_in_call_order() {
        with_session(|session| {
            session.sprite_position = CoordsXY::new(64, 64);
            let root = session
                .add_sprite(1, CoordsXYZ::default(), CoordsXYZ::new(4, 4, 4))
                .unwrap();
            assert!(session.attach_to_previous(10, 0, 0));
            assert!(session.attach_to_previous_attach(11, 1, 1));
            assert!(session.attach_to_previous_attach(12, 2, 2));

            let head = session.root(root).attached.unwrap();
            let a = session.attached_node(head);
            assert_eq!(a.image_id, 10);
            let b = session.attached_node(a.next.unwrap());
            assert_eq!(b.image_id, 11);
            let c = session.attached_node(b.next.unwrap());
            assert_eq!(c.image_id, 12);
            assert!(c.next.is_none());
        });
    }

    #[test]
    fn attach_without_root_fails() {
        with_session(|session| {
            assert!(!session.attach_to_previous(10, 0, 0));
        });
    }
}
