//! Draw-order resolution. Quadrant buckets are concatenated back to front,
//! then a windowed pairwise pass walks adjacent-quadrant pairs and relinks
//! any later primitive whose bounding box sits behind an earlier one. Ties
//! and cyclic overlaps keep their first-found order; that mirrors the
//! original painter and is not corrected into a full topological sort.

use crate::session::{
    BoundBox, PaintSession, QUADRANT_FLAG_BIGGER, QUADRANT_FLAG_IDENTICAL, QUADRANT_FLAG_NEXT,
};

/// A position in the sorted list: either the virtual head or a node, so the
/// relink steps can treat both uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Head,
    Node(u32),
}

fn bbox_intersects(rotation: u8, initial: &BoundBox, current: &BoundBox) -> bool {
    match rotation {
        0 => {
            initial.z_end >= current.z
                && initial.y_end >= current.y
                && initial.x_end >= current.x
                && !(initial.z < current.z_end
                    && initial.y < current.y_end
                    && initial.x < current.x_end)
        }
        1 => {
            initial.z_end >= current.z
                && initial.y_end >= current.y
                && initial.x_end < current.x
                && !(initial.z < current.z_end
                    && initial.y < current.y_end
                    && initial.x >= current.x_end)
        }
        2 => {
            initial.z_end >= current.z
                && initial.y_end < current.y
                && initial.x_end < current.x
                && !(initial.z < current.z_end
                    && initial.y >= current.y_end
                    && initial.x >= current.x_end)
        }
        _ => {
            initial.z_end >= current.z
                && initial.y_end < current.y
                && initial.x_end >= current.x
                && !(initial.z < current.z_end
                    && initial.y >= current.y_end
                    && initial.x < current.x_end)
        }
    }
}

impl PaintSession<'_> {
    fn next_of(&self, link: Link) -> Option<u32> {
        match link {
            Link::Head => self.sorted_head,
            Link::Node(index) => self.root(index).next_quadrant,
        }
    }

    fn set_next_of(&mut self, link: Link, value: Option<u32>) {
        match link {
            Link::Head => self.sorted_head = value,
            Link::Node(index) => self.root_mut(index).next_quadrant = value,
        }
    }

    /// One pass of the pairwise resolver over the window starting at
    /// `quadrant_index`. Returns the link from which the next window scan
    /// should start.
    fn arrange_window(&mut self, start: Link, quadrant_index: u32, flag: u8) -> Link {
        // Skip ahead until the next node belongs to this window.
        let mut ps = start;
        let mut ps_next;
        loop {
            ps_next = match self.next_of(ps) {
                Some(next) => next,
                None => return ps,
            };
            if quadrant_index <= self.root(ps_next).quadrant_index {
                break;
            }
            ps = Link::Node(ps_next);
        }

        let ps_cache = ps;
        let ps_temp_start = ps;

        // Mark every node of the window with its role relative to the
        // current quadrant.
        let mut cursor = ps;
        loop {
            let Some(node) = self.next_of(cursor) else {
                break;
            };
            let node_quadrant = self.root(node).quadrant_index;
            if node_quadrant > quadrant_index + 1 {
                self.root_mut(node).quadrant_flags = QUADRANT_FLAG_BIGGER;
            } else if node_quadrant == quadrant_index + 1 {
                self.root_mut(node).quadrant_flags = QUADRANT_FLAG_NEXT | QUADRANT_FLAG_IDENTICAL;
            } else if node_quadrant == quadrant_index {
                self.root_mut(node).quadrant_flags = flag | QUADRANT_FLAG_IDENTICAL;
            }
            cursor = Link::Node(node);
            if node_quadrant > quadrant_index + 1 {
                break;
            }
        }

        let mut ps = ps_temp_start;
        let rotation = self.rotation;
        loop {
            // Find the next unprocessed primitive of this window.
            let mut ps_next;
            loop {
                ps_next = match self.next_of(ps) {
                    Some(next) => next,
                    None => return ps_cache,
                };
                let flags = self.root(ps_next).quadrant_flags;
                if flags & QUADRANT_FLAG_BIGGER != 0 {
                    return ps_cache;
                }
                if flags & QUADRANT_FLAG_IDENTICAL != 0 {
                    break;
                }
                ps = Link::Node(ps_next);
            }

            self.root_mut(ps_next).quadrant_flags &= !QUADRANT_FLAG_IDENTICAL;
            let ps_temp = ps;
            let initial_bounds = self.root(ps_next).bounds;

            // Pull everything the initial box occludes to directly after it.
            let mut ps_next = ps_next;
            loop {
                ps = Link::Node(ps_next);
                ps_next = match self.next_of(Link::Node(ps_next)) {
                    Some(next) => next,
                    None => break,
                };
                let flags = self.root(ps_next).quadrant_flags;
                if flags & QUADRANT_FLAG_BIGGER != 0 {
                    break;
                }
                if flags & QUADRANT_FLAG_NEXT == 0 {
                    continue;
                }

                let current_bounds = self.root(ps_next).bounds;
                if bbox_intersects(rotation, &initial_bounds, &current_bounds) {
                    let after = self.root(ps_next).next_quadrant;
                    self.set_next_of(ps, after);
                    let displaced = self.next_of(ps_temp);
                    self.set_next_of(ps_temp, Some(ps_next));
                    self.set_next_of(Link::Node(ps_next), displaced);
                    ps_next = match ps {
                        Link::Node(index) => index,
                        Link::Head => unreachable!("relink scan starts past the head"),
                    };
                }
            }

            ps = ps_temp;
        }
    }

    /// Produce the sorted draw list: quadrants concatenated back to front,
    /// then the pairwise overlap resolution across each adjacent window.
    pub fn arrange(&mut self) -> Option<u32> {
        self.sorted_head = None;
        let back_index = self.quadrant_back_index;
        if back_index == u32::MAX {
            return None;
        }

        // Concatenate the buckets, preserving in-bucket order.
        let mut tail = Link::Head;
        let mut quadrant_index = back_index;
        while quadrant_index <= self.quadrant_front_index {
            if let Some(head) = self.quadrants[quadrant_index as usize] {
                self.set_next_of(tail, Some(head));
                let mut node = head;
                while let Some(next) = self.root(node).next_quadrant {
                    node = next;
                }
                tail = Link::Node(node);
            }
            quadrant_index += 1;
        }

        let mut cache = self.arrange_window(Link::Head, back_index, QUADRANT_FLAG_NEXT);
        let mut quadrant_index = back_index;
        loop {
            quadrant_index += 1;
            if quadrant_index >= self.quadrant_front_index {
                break;
            }
            cache = self.arrange_window(cache, quadrant_index, 0);
        }

        self.sorted_head
    }

    pub fn sorted_list_head(&self) -> Option<u32> {
        self.sorted_head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PaintError, PaintSession};
    use crate::target::{ImageEntry, ImageTable, RenderTarget};
    use park_world::coords::{CoordsXY, CoordsXYZ};

    fn images() -> ImageTable {
        ImageTable::uniform(
            64,
            ImageEntry {
                width: 8,
                height: 8,
                x_offset: -4,
                y_offset: -4,
            },
        )
    }

    fn with_session<R>(rotation: u8, f: impl FnOnce(&mut PaintSession) -> R) -> R {
        let images = images();
        let target = RenderTarget::with_origin(-4096, -4096, 8192, 8192);
        loop {
            match PaintSession::begin(&images, &target, rotation, 0) {
                Ok(mut session) => return f(&mut session),
                Err(PaintError::SessionInUse) => std::thread::yield_now(),
            }
        }
    }

    fn collect_order(session: &PaintSession, head: Option<u32>) -> Vec<u32> {
        let mut order = Vec::new();
        let mut cursor = head;
        while let Some(index) = cursor {
            order.push(session.root(index).image_id);
            cursor = session.root(index).next_quadrant;
        }
        order
    }

    #[test]
    fn empty_session_arranges_to_nothing() {
        with_session(0, |session| {
            assert_eq!(session.arrange(), None);
        });
    }

    #[test]
    fn same_quadrant_non_overlapping_keeps_reverse_allocation_order() {
        // Insertion is at the bucket head, so within a quadrant the later
        // allocation comes back first. This is a literal ordering contract.
        with_session(0, |session| {
            session.sprite_position = CoordsXY::new(512, 512);
            session
                .add_sprite(1, CoordsXYZ::new(0, 0, 0), CoordsXYZ::new(2, 2, 2))
                .unwrap();
            session
                .add_sprite(2, CoordsXYZ::new(8, -8, 0), CoordsXYZ::new(2, 2, 2))
                .unwrap();

            let head = session.arrange();
            assert_eq!(collect_order(session, head), vec![2, 1]);
        });
    }

    #[test]
    fn no_overlap_preserves_quadrant_then_allocation_order() {
        with_session(0, |session| {
            // Three primitives in strictly increasing quadrants.
            for (step, image) in [(0, 1u32), (64, 2), (128, 3)] {
                session.sprite_position = CoordsXY::new(512 + step, 512 + step);
                session
                    .add_sprite(image, CoordsXYZ::default(), CoordsXYZ::new(2, 2, 2))
                    .unwrap();
            }
            let head = session.arrange();
            assert_eq!(collect_order(session, head), vec![1, 2, 3]);
        });
    }

    #[test]
    fn front_overlap_in_later_quadrant_keeps_its_slot() {
        with_session(0, |session| {
            // The later-quadrant box overlaps in x/y but is genuinely in
            // front, so the resolver leaves the concatenation order alone.
            session.sprite_position = CoordsXY::new(512, 512);
            session
                .add_sprite(1, CoordsXYZ::new(0, 0, 0), CoordsXYZ::new(40, 40, 8))
                .unwrap();
            session.sprite_position = CoordsXY::new(512 + 16, 512 + 16);
            session
                .add_sprite(2, CoordsXYZ::new(0, 0, 0), CoordsXYZ::new(40, 40, 8))
                .unwrap();

            let head = session.arrange();
            assert_eq!(collect_order(session, head), vec![1, 2]);
        });
    }

    #[test]
    fn occluded_later_quadrant_primitive_is_pulled_behind() {
        with_session(0, |session| {
            // The later-quadrant box sits entirely below the earlier one,
            // so it must be relinked to draw first.
            session.sprite_position = CoordsXY::new(512, 512);
            session
                .add_sprite(1, CoordsXYZ::new(0, 0, 10), CoordsXYZ::new(40, 40, 10))
                .unwrap();
            session.sprite_position = CoordsXY::new(512 + 16, 512 + 16);
            session
                .add_sprite(2, CoordsXYZ::new(0, 0, 0), CoordsXYZ::new(40, 40, 5))
                .unwrap();

            let head = session.arrange();
            assert_eq!(collect_order(session, head), vec![2, 1]);
        });
    }

    #[test]
    fn bbox_half_space_test_matches_rotation() {
        let behind = BoundBox {
            x: 0,
            y: 0,
            z: 0,
            x_end: 10,
            y_end: 10,
            z_end: 10,
        };
        let in_front = BoundBox {
            x: 20,
            y: 20,
            z: 0,
            x_end: 30,
            y_end: 30,
            z_end: 10,
        };
        // Rotation 0 considers larger x/y to be in front; `behind` does not
        // reach `in_front`, so there is nothing to reorder.
        assert!(!bbox_intersects(0, &behind, &in_front));
        // But the reverse pair does claim an ordering dependency.
        assert!(bbox_intersects(0, &in_front, &behind));
    }
}
