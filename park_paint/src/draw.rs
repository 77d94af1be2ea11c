//! Consume the sorted draw list: zoom quantisation for sprites, see-through
//! recolouring from the view flags, the optional bounding-box wireframes,
//! attachment chains, and the trailing floating-text pass.

use park_world::coords::{coords_3d_to_2d, CoordsXYZ};

use crate::session::{InteractionItem, PaintSession, PaintStruct};
use crate::target::{
    RenderTarget, IMAGE_INDEX_MASK, IMAGE_TYPE_TRANSPARENT, SEE_THROUGH_IMAGE_FLAGS,
};
use crate::{
    VIEW_FLAG_SEETHROUGH_PATHS, VIEW_FLAG_SEETHROUGH_RIDES, VIEW_FLAG_SEETHROUGH_SCENERY,
    VIEW_FLAG_UNDERGROUND_INSIDE,
};

fn floor2(value: i32, alignment: i32) -> i32 {
    value & !(alignment - 1)
}

fn colourify_image(image_id: u32, interaction: InteractionItem, view_flags: u32) -> u32 {
    let ghost = |image_id: u32| {
        if image_id & IMAGE_TYPE_TRANSPARENT == 0 {
            (image_id & IMAGE_INDEX_MASK) | SEE_THROUGH_IMAGE_FLAGS
        } else {
            image_id
        }
    };

    let mut image_id = image_id;
    if view_flags & VIEW_FLAG_SEETHROUGH_RIDES != 0 && interaction == InteractionItem::Ride {
        image_id = ghost(image_id);
    }
    if view_flags & VIEW_FLAG_UNDERGROUND_INSIDE != 0 && interaction == InteractionItem::Wall {
        image_id = ghost(image_id);
    }
    if view_flags & VIEW_FLAG_SEETHROUGH_PATHS != 0 {
        if matches!(
            interaction,
            InteractionItem::Footpath | InteractionItem::FootpathItem | InteractionItem::Banner
        ) {
            image_id = ghost(image_id);
        }
    }
    if view_flags & VIEW_FLAG_SEETHROUGH_SCENERY != 0 {
        if matches!(
            interaction,
            InteractionItem::Scenery | InteractionItem::LargeScenery | InteractionItem::Wall
        ) {
            image_id = ghost(image_id);
        }
    }
    image_id
}

fn draw_ps_image(
    session: &PaintSession,
    target: &mut RenderTarget,
    ps: &PaintStruct,
    image_id: u32,
    x: i32,
    y: i32,
) {
    if ps.is_masked {
        target.blit_sprite_masked(session.images, image_id, ps.colour_image_id, x, y);
    } else {
        target.blit_sprite(session.images, image_id, x, y);
    }
}

fn draw_ps_image_with_bounding_box(
    session: &PaintSession,
    target: &mut RenderTarget,
    ps: &PaintStruct,
    image_id: u32,
    x: i32,
    y: i32,
) {
    let colour = ps.interaction.debug_colour();
    let rotation = session.rotation;
    let bb = &ps.bounds;

    let project = |x: i32, y: i32, z: i32| coords_3d_to_2d(CoordsXYZ::new(x, y, z), rotation);
    let front_top = project(bb.x_end, bb.y_end, bb.z_end);
    let front_bottom = project(bb.x_end, bb.y_end, bb.z);
    let left_top = project(bb.x, bb.y_end, bb.z_end);
    let left_bottom = project(bb.x, bb.y_end, bb.z);
    let right_top = project(bb.x_end, bb.y, bb.z_end);
    let right_bottom = project(bb.x_end, bb.y, bb.z);
    let back_top = project(bb.x, bb.y, bb.z_end);
    let back_bottom = project(bb.x, bb.y, bb.z);

    // Bottom square.
    target.draw_line(front_bottom.x, front_bottom.y, left_bottom.x, left_bottom.y, colour);
    target.draw_line(back_bottom.x, back_bottom.y, left_bottom.x, left_bottom.y, colour);
    target.draw_line(back_bottom.x, back_bottom.y, right_bottom.x, right_bottom.y, colour);
    target.draw_line(front_bottom.x, front_bottom.y, right_bottom.x, right_bottom.y, colour);

    // Vertical back and sides.
    target.draw_line(back_top.x, back_top.y, back_bottom.x, back_bottom.y, colour);
    target.draw_line(left_top.x, left_top.y, left_bottom.x, left_bottom.y, colour);
    target.draw_line(right_top.x, right_top.y, right_bottom.x, right_bottom.y, colour);

    // Top square, back half before the image.
    target.draw_line(back_top.x, back_top.y, left_top.x, left_top.y, colour);
    target.draw_line(back_top.x, back_top.y, right_top.x, right_top.y, colour);

    draw_ps_image(session, target, ps, image_id, x, y);

    // Vertical front, then the front of the top square over the image.
    target.draw_line(front_top.x, front_top.y, front_bottom.x, front_bottom.y, colour);
    target.draw_line(front_top.x, front_top.y, left_top.x, left_top.y, colour);
    target.draw_line(front_top.x, front_top.y, right_top.x, right_top.y, colour);
}

fn draw_attached(
    session: &PaintSession,
    target: &mut RenderTarget,
    ps: &PaintStruct,
    view_flags: u32,
) {
    let mut cursor = ps.attached;
    while let Some(index) = cursor {
        let attached = session.attached_node(index);
        let x = attached.x + ps.screen_pos.x;
        let y = attached.y + ps.screen_pos.y;
        let image_id = colourify_image(attached.image_id, ps.interaction, view_flags);
        if attached.is_masked {
            target.blit_sprite_masked(session.images, image_id, attached.colour_image_id, x, y);
        } else {
            target.blit_sprite(session.images, image_id, x, y);
        }
        cursor = attached.next;
    }
}

/// Walk the sorted list and draw every primitive, its chained children and
/// its attachments.
pub fn draw_sorted(session: &PaintSession, target: &mut RenderTarget, head: Option<u32>) {
    let view_flags = session.view_flags;
    let mut previous = head;
    let mut cursor = head;
    while let Some(index) = cursor {
        let ps = session.root(index);
        let mut x = ps.screen_pos.x;
        let mut y = ps.screen_pos.y;
        if ps.interaction == InteractionItem::Sprite && target.zoom_level >= 1 {
            x = floor2(x, 2);
            y = floor2(y, 2);
            if target.zoom_level >= 2 {
                x = floor2(x, 4);
                y = floor2(y, 4);
            }
        }

        let image_id = colourify_image(ps.image_id, ps.interaction, view_flags);
        if session.paint_bounding_boxes && target.zoom_level == 0 {
            draw_ps_image_with_bounding_box(session, target, ps, image_id, x, y);
        } else {
            draw_ps_image(session, target, ps, image_id, x, y);
        }

        if let Some(child) = ps.children {
            cursor = Some(child);
        } else {
            draw_attached(session, target, ps, view_flags);
            cursor = previous.and_then(|at| session.root(at).next_quadrant);
            previous = cursor;
        }
    }
}

/// Summary of a full-frame render, for reports and regression logs.
#[derive(Debug, Default, serde::Serialize)]
pub struct FrameReport {
    pub columns: u32,
    pub primitives: u32,
    pub quadrants_used: u32,
}

/// Render a whole frame: one paint session per 32-pixel clip column, each
/// generated, arranged and drawn in turn.
pub fn render_frame(
    target: &mut RenderTarget,
    images: &crate::target::ImageTable,
    world: &park_world::map::TileMap,
    arena: &park_world::entity::EntityArena,
    rides: &park_world::ride::RideList,
    rotation: u8,
    view_flags: u32,
    paint_bounding_boxes: bool,
) -> Result<FrameReport, crate::session::PaintError> {
    use crate::session::ClipRect;

    let mut report = FrameReport::default();
    let mut column_x = target.x;
    let right = target.x + target.width;
    while column_x < right {
        let column_width = (right - column_x).min(32);
        let clip = ClipRect {
            x: column_x,
            y: target.y,
            width: column_width,
            height: target.height,
            zoom_level: target.zoom_level,
        };
        let mut session = PaintSession::begin_clipped(images, clip, rotation, view_flags)?;
        session.paint_bounding_boxes = paint_bounding_boxes;
        crate::dispatch::generate(&mut session, world, arena, rides);
        let head = session.arrange();
        draw_sorted(&session, target, head);
        draw_strings(&session, target);

        report.columns += 1;
        report.primitives += session.node_count() as u32;
        let (back, front) = session.quadrant_bounds();
        if back != u32::MAX {
            report.quadrants_used += front - back + 1;
        }
        column_x += column_width;
    }
    Ok(report)
}

/// Draw the floating-text chain collected during the frame.
pub fn draw_strings(session: &PaintSession, target: &mut RenderTarget) {
    let mut cursor = session.string_list_head();
    while let Some(index) = cursor {
        let node = session.string_node(index);
        let zoom = target.zoom_level as i32;
        target.draw_text_marker(node.x >> zoom, node.y >> zoom, node.text.len() as i32, 26);
        cursor = node.next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PaintError;
    use crate::target::{ImageEntry, ImageTable};
    use park_world::coords::CoordsXY;

    fn with_session<R>(view_flags: u32, f: impl FnOnce(&mut PaintSession, RenderTarget) -> R) -> R {
        let images = ImageTable::uniform(
            64,
            ImageEntry {
                width: 8,
                height: 8,
                x_offset: -4,
                y_offset: -4,
            },
        );
        let target = RenderTarget::with_origin(-1024, -1024, 2048, 2048);
        loop {
            match PaintSession::begin(&images, &target, 0, view_flags) {
                Ok(mut session) => {
                    let target = RenderTarget::with_origin(-1024, -1024, 2048, 2048);
                    return f(&mut session, target);
                }
                Err(PaintError::SessionInUse) => std::thread::yield_now(),
            }
        }
    }

    #[test]
    fn see_through_rides_rebuilds_the_image_id() {
        let ghosted = colourify_image(123, InteractionItem::Ride, VIEW_FLAG_SEETHROUGH_RIDES);
        assert_eq!(ghosted, 123 | SEE_THROUGH_IMAGE_FLAGS);
        // Already-transparent images pass through untouched.
        let transparent = 123 | IMAGE_TYPE_TRANSPARENT;
        assert_eq!(
            colourify_image(transparent, InteractionItem::Ride, VIEW_FLAG_SEETHROUGH_RIDES),
            transparent
        );
        // Other interaction types are unaffected.
        assert_eq!(
            colourify_image(123, InteractionItem::Scenery, VIEW_FLAG_SEETHROUGH_RIDES),
            123
        );
    }

    #[test]
    fn draw_walk_covers_children_and_attachments() {
        with_session(0, |session, mut target| {
            session.sprite_position = CoordsXY::new(64, 64);
            session
                .add_sprite(1, CoordsXYZ::default(), CoordsXYZ::new(4, 4, 4))
                .unwrap();
            session
                .add_sprite_bb_chain(
                    2,
                    CoordsXYZ::new(2, 2, 0),
                    CoordsXYZ::new(4, 4, 4),
                    CoordsXYZ::new(2, 2, 0),
                )
                .unwrap();
            assert!(session.attach_to_previous(3, 1, 1));

            let head = session.arrange();
            draw_sorted(session, &mut target, head);

            // All three image footprints must have landed in the target.
            assert!(target.count_pixels(1) > 0);
            assert!(target.count_pixels(2) > 0);
            assert!(target.count_pixels(3) > 0);
        });
    }
}
