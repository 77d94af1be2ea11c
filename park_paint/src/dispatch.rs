//! Scene traversal: walk the visible map quadrants in rotation order,
//! paint the track elements on each tile, then dispatch every entity on
//! the tile's spatial bucket to its type-specific paint routine.

use park_world::coords::{coords_3d_to_2d, CoordsXY, CoordsXYZ, COORDS_Z_STEP};
use park_world::entity::{Effect, EffectKind, Entity, EntityArena, Litter, Peep, Vehicle,
    VehicleFlags};
use park_world::map::TileMap;
use park_world::ride::RideList;

use crate::session::{InteractionItem, PaintSession};

/// Image ids are laid out in coarse banks; real art tables would replace
/// these bases.
pub const TRACK_IMAGE_BASE: u32 = 1024;
pub const PEEP_IMAGE_BASE: u32 = 512;
pub const LITTER_IMAGE_BASE: u32 = 768;
pub const EFFECT_IMAGE_BASE: u32 = 896;

/// Generate the frame: the four traversal patterns interleave tile and
/// entity painting so that neighbouring quadrants land in the right
/// buckets for the arrange pass.
pub fn generate(
    session: &mut PaintSession,
    world: &TileMap,
    arena: &EntityArena,
    rides: &RideList,
) {
    let clip = session.clip;
    let mut map_tile = CoordsXY::new(clip.x & !0x1F, (clip.y - 16) & !0x1F);
    let half_x = map_tile.x >> 1;
    let mut num_vertical_quadrants = (clip.height + 2128) >> 5;

    match session.rotation {
        0 => {
            map_tile = CoordsXY::new(map_tile.y - half_x, map_tile.y + half_x);
            map_tile.x &= !0x1F;
            map_tile.y &= !0x1F;
            while num_vertical_quadrants > 0 {
                tile_paint(session, world, map_tile);
                entity_paint(session, arena, rides, map_tile);
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(-32, 32));
                tile_paint(session, world, map_tile + CoordsXY::new(0, 32));
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(0, 32));
                map_tile.x += 32;
                entity_paint(session, arena, rides, map_tile);
                map_tile.y += 32;
                num_vertical_quadrants -= 1;
            }
        }
        1 => {
            map_tile = CoordsXY::new(-map_tile.y - half_x, map_tile.y - half_x - 16);
            map_tile.x &= !0x1F;
            map_tile.y &= !0x1F;
            while num_vertical_quadrants > 0 {
                tile_paint(session, world, map_tile);
                entity_paint(session, arena, rides, map_tile);
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(-32, -32));
                tile_paint(session, world, map_tile + CoordsXY::new(-32, 0));
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(-32, 0));
                map_tile.y += 32;
                entity_paint(session, arena, rides, map_tile);
                map_tile.x -= 32;
                num_vertical_quadrants -= 1;
            }
        }
        2 => {
            map_tile = CoordsXY::new(-map_tile.y + half_x, -map_tile.y - half_x);
            map_tile.x &= !0x1F;
            map_tile.y &= !0x1F;
            while num_vertical_quadrants > 0 {
                tile_paint(session, world, map_tile);
                entity_paint(session, arena, rides, map_tile);
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(32, -32));
                tile_paint(session, world, map_tile + CoordsXY::new(0, -32));
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(0, -32));
                map_tile.x -= 32;
                entity_paint(session, arena, rides, map_tile);
                map_tile.y -= 32;
                num_vertical_quadrants -= 1;
            }
        }
        _ => {
            map_tile = CoordsXY::new(map_tile.y + half_x, -map_tile.y + half_x - 16);
            map_tile.x &= !0x1F;
            map_tile.y &= !0x1F;
            while num_vertical_quadrants > 0 {
                tile_paint(session, world, map_tile);
                entity_paint(session, arena, rides, map_tile);
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(32, 32));
                tile_paint(session, world, map_tile + CoordsXY::new(32, 0));
                entity_paint(session, arena, rides, map_tile + CoordsXY::new(32, 0));
                map_tile.y -= 32;
                entity_paint(session, arena, rides, map_tile);
                map_tile.x += 32;
                num_vertical_quadrants -= 1;
            }
        }
    }
}

fn tile_paint(session: &mut PaintSession, world: &TileMap, tile: CoordsXY) {
    session.map_position = tile;
    session.sprite_position = tile;
    session.interaction = InteractionItem::Ride;
    let elements: Vec<(i32, u32)> = world
        .elements_at_tile(tile)
        .map(|(z, element)| {
            let image = TRACK_IMAGE_BASE
                + (element.track_type as u32) * 4
                + element.direction as u32;
            (z, image)
        })
        .collect();
    for (z, image) in elements {
        session.add_sprite_bb(
            image,
            CoordsXYZ::new(0, 0, z),
            CoordsXYZ::new(32, 32, 2),
            CoordsXYZ::new(0, 0, z),
        );
    }
}

/// Cheap screen-footprint rejection before dispatching to a paint routine.
fn entity_on_screen(session: &PaintSession, pos: CoordsXYZ) -> bool {
    let screen = coords_3d_to_2d(pos, session.rotation);
    let clip = session.clip;
    screen.x + 64 > clip.x
        && screen.x - 64 < clip.x + clip.width
        && screen.y + 64 > clip.y
        && screen.y - 64 < clip.y + clip.height
}

fn entity_paint(session: &mut PaintSession, arena: &EntityArena, rides: &RideList, tile: CoordsXY) {
    if session.clip.zoom_level > 2 {
        return;
    }
    // The bucket is copied out so paint routines can allocate through the
    // session while the walk continues.
    let ids: Vec<_> = arena.ids_at_tile(tile).to_vec();
    for id in ids {
        let Some(entity) = arena.get(id) else {
            continue;
        };
        let pos = entity.position();
        if pos.z > session.height_clip as i32 * COORDS_Z_STEP {
            continue;
        }
        if !entity_on_screen(session, pos) {
            continue;
        }
        match entity {
            Entity::Vehicle(vehicle) => paint_vehicle(session, rides, vehicle),
            Entity::Peep(peep) => paint_peep(session, peep),
            Entity::Litter(litter) => {
                if session.clip.zoom_level < 1 {
                    paint_litter(session, litter);
                }
            }
            Entity::Effect(effect) => paint_effect(session, effect),
        }
    }
}

fn paint_vehicle(session: &mut PaintSession, rides: &RideList, vehicle: &Vehicle) {
    session.interaction = InteractionItem::Sprite;
    session.sprite_position = vehicle.position.xy();

    let Some(entry) = rides.entry(vehicle.ride) else {
        return;
    };
    let car = entry.car(vehicle.car_entry_index);

    let image = if vehicle.has_flag(VehicleFlags::CRASHED) {
        car.base_image + 28 + (vehicle.animation_frame & 7) as u32
    } else {
        let pose = vehicle.pitch as u32 * 32
            + vehicle.swing_sprite as u32
            + vehicle.spin_sprite as u32;
        car.base_image + pose + (vehicle.orientation >> 3) as u32 * 4 + vehicle.bank_rotation as u32
    };

    let size = car.sprite_width as i32;
    let height = car.sprite_height as i32;
    session.add_sprite_bb(
        image,
        CoordsXYZ::new(0, 0, vehicle.position.z),
        CoordsXYZ::new(size, size, height),
        CoordsXYZ::new(-(size / 2), -(size / 2), vehicle.position.z + 2),
    );
}

fn paint_peep(session: &mut PaintSession, peep: &Peep) {
    session.interaction = InteractionItem::Sprite;
    session.sprite_position = peep.position.xy();
    let image = PEEP_IMAGE_BASE + peep.animation_frame as u32 * 4 + (peep.direction >> 3) as u32;
    let allocated = session.add_sprite_bb(
        image,
        CoordsXYZ::new(0, 0, peep.position.z),
        CoordsXYZ::new(1, 1, 11),
        CoordsXYZ::new(0, 0, peep.position.z + 3),
    );
    if allocated.is_some() {
        // Shirt and trousers recolours stack flush on the body sprite.
        session.attach_to_previous(image + peep.tshirt_colour as u32, 0, 0);
    }
}

fn paint_litter(session: &mut PaintSession, litter: &Litter) {
    session.interaction = InteractionItem::Sprite;
    session.sprite_position = litter.position.xy();
    session.add_sprite(
        LITTER_IMAGE_BASE + litter.kind as u32,
        CoordsXYZ::new(0, 0, litter.position.z),
        CoordsXYZ::new(4, 4, -1),
    );
}

fn paint_effect(session: &mut PaintSession, effect: &Effect) {
    session.interaction = InteractionItem::Sprite;
    session.sprite_position = effect.position.xy();
    let z = effect.position.z;
    match &effect.kind {
        EffectKind::CrashParticle { frame, .. } => {
            session.add_sprite(
                EFFECT_IMAGE_BASE + *frame as u32,
                CoordsXYZ::new(0, 0, z),
                CoordsXYZ::new(1, 1, 1),
            );
        }
        EffectKind::ExplosionCloud { frame } => {
            session.add_sprite(
                EFFECT_IMAGE_BASE + 16 + *frame as u32,
                CoordsXYZ::new(0, 0, z),
                CoordsXYZ::new(1, 1, 1),
            );
        }
        EffectKind::ExplosionFlare { frame } => {
            session.add_sprite(
                EFFECT_IMAGE_BASE + 32 + *frame as u32,
                CoordsXYZ::new(0, 0, z),
                CoordsXYZ::new(1, 1, 1),
            );
        }
        EffectKind::CrashSplash { frame } => {
            session.add_sprite(
                EFFECT_IMAGE_BASE + 48 + *frame as u32,
                CoordsXYZ::new(0, 0, z),
                CoordsXYZ::new(1, 1, 1),
            );
        }
        EffectKind::SteamParticle { frame, .. } => {
            session.add_sprite(
                EFFECT_IMAGE_BASE + 64 + *frame as u32,
                CoordsXYZ::new(0, 0, z),
                CoordsXYZ::new(1, 1, 1),
            );
        }
        EffectKind::MoneyEffect {
            value,
            vertical_progress,
            offset_x,
        } => {
            session.add_floating_text(
                format!("{value}"),
                -*vertical_progress as i32,
                z,
                *offset_x as i32,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PaintError;
    use crate::target::{ImageEntry, ImageTable, RenderTarget};
    use park_world::ride::{CarEntry, Ride, RideEntry, RideEntryFlags, RideId, RideMode};

    fn setup() -> (ImageTable, TileMap, EntityArena, RideList) {
        let images = ImageTable::uniform(
            8192,
            ImageEntry {
                width: 16,
                height: 16,
                x_offset: -8,
                y_offset: -8,
            },
        );
        let world = TileMap::new(64);
        let mut rides = RideList::default();
        rides.add(
            Ride::new(RideId(0), RideMode::ContinuousCircuit),
            RideEntry {
                flags: RideEntryFlags::default(),
                cars: vec![CarEntry {
                    base_image: 64,
                    ..CarEntry::default()
                }],
            },
        );
        (images, world, EntityArena::new(), rides)
    }

    // Sessions paint one 32-pixel screen column, so tests aim the target's
    // clip column at the entity's projected position.
    fn run_column<R>(
        images: &ImageTable,
        target: &RenderTarget,
        f: impl FnOnce(&mut PaintSession) -> R,
    ) -> R {
        loop {
            match PaintSession::begin(images, target, 0, 0) {
                Ok(mut session) => return f(&mut session),
                Err(PaintError::SessionInUse) => std::thread::yield_now(),
            }
        }
    }

    #[test]
    fn vehicles_in_view_are_painted() {
        let (images, world, mut arena, rides) = setup();
        arena.spawn(Entity::Vehicle(Vehicle::new(
            RideId(0),
            0,
            CoordsXYZ::new(512, 512, 16),
        )));

        // Screen position for rotation 0 is (0, 496).
        let target = RenderTarget::with_origin(-16, 0, 32, 1024);
        run_column(&images, &target, |session| {
            generate(session, &world, &arena, &rides);
            assert!(
                session.node_count() > 0,
                "a vehicle in view must allocate a primitive"
            );
        });
    }

    #[test]
    fn height_clipped_entities_are_skipped() {
        let (images, world, mut arena, rides) = setup();
        arena.spawn(Entity::Vehicle(Vehicle::new(
            RideId(0),
            0,
            CoordsXYZ::new(512, 512, 600),
        )));

        let target = RenderTarget::with_origin(-16, -1200, 32, 2400);
        run_column(&images, &target, |session| {
            session.height_clip = 64;
            generate(session, &world, &arena, &rides);
            assert_eq!(session.node_count(), 0, "above the clip plane: skipped");
        });
        run_column(&images, &target, |session| {
            session.height_clip = 128;
            generate(session, &world, &arena, &rides);
            assert!(session.node_count() > 0, "below the clip plane: painted");
        });
    }

    #[test]
    fn track_elements_on_visible_tiles_are_painted() {
        let (images, mut world, arena, rides) = setup();
        world.place(
            CoordsXYZ::new(512, 512, 0),
            park_world::map::TrackElement::new(
                park_world::track::TrackType::Flat,
                0,
                RideId(0),
            ),
        );
        let target = RenderTarget::with_origin(-16, 0, 32, 1024);
        run_column(&images, &target, |session| {
            generate(session, &world, &arena, &rides);
            assert!(session.node_count() > 0);
        });
    }
}
