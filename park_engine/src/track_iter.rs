//! The track graph accessor: pure lookups that resolve a placed track
//! element to its successor or predecessor. Failure is an expected
//! negative result at graph boundaries, never an error.

use park_world::coords::{CoordsXYZ, Direction};
use park_world::map::{TileMap, TrackElement};

#[derive(Debug, Clone)]
pub struct NextTrack {
    pub position: CoordsXYZ,
    pub direction: Direction,
    pub element: TrackElement,
}

#[derive(Debug, Clone)]
pub struct TrackBeginEnd {
    pub begin_position: CoordsXYZ,
    pub begin_direction: Direction,
    pub begin_element: TrackElement,
}

fn exit_of(position: CoordsXYZ, element: &TrackElement) -> (CoordsXYZ, Direction) {
    let def = element.track_type.def();
    let offset = def.exit_offset.rotated(element.direction);
    (
        position + offset,
        (element.direction + def.exit_rotation) & 3,
    )
}

/// The element this one leads into, if the graph continues there.
pub fn next_track_block(
    world: &TileMap,
    position: CoordsXYZ,
    element: &TrackElement,
) -> Option<NextTrack> {
    let (next_position, next_direction) = exit_of(position, element);
    if !world.is_location_valid(next_position) {
        return None;
    }
    let next = world.any_track_element_at(next_position)?;
    if next.direction != next_direction {
        return None;
    }
    Some(NextTrack {
        position: next_position,
        direction: next_direction,
        element: next.clone(),
    })
}

/// The element that leads into this one. The graph stores no back links,
/// so this scans the placed elements for the unique predecessor.
pub fn previous_track_block(
    world: &TileMap,
    position: CoordsXYZ,
    element: &TrackElement,
) -> Option<TrackBeginEnd> {
    for (candidate_position, candidate) in world.iter() {
        let (exit_position, exit_direction) = exit_of(candidate_position, candidate);
        if exit_position == position && exit_direction == element.direction {
            return Some(TrackBeginEnd {
                begin_position: candidate_position,
                begin_direction: candidate.direction,
                begin_element: candidate.clone(),
            });
        }
    }
    None
}

/// Walk backwards to the block-start element guarding the section behind
/// `position`. Returns `None` when the walk leaves the graph or, on looped
/// layouts, when the tortoise/hare guard detects a cycle.
pub fn previous_block_start(
    world: &TileMap,
    position: CoordsXYZ,
    element: &TrackElement,
) -> Option<(CoordsXYZ, TrackElement)> {
    let mut location = position;
    let mut current = element.clone();
    let mut slow_location = position;
    let mut slow_element = element.clone();
    let mut counter = true;

    loop {
        let previous = previous_track_block(world, location, &current)?;
        if previous.begin_position == position && previous.begin_element.track_type == element.track_type
        {
            return None;
        }
        location = previous.begin_position;
        current = previous.begin_element;

        if current.is_block_start() {
            return Some((location, current));
        }

        counter = !counter;
        if counter {
            let slow_previous = previous_track_block(world, slow_location, &slow_element)?;
            slow_location = slow_previous.begin_position;
            slow_element = slow_previous.begin_element;
            if slow_location == location
                && slow_element.track_type == current.track_type
                && slow_element.direction == current.direction
            {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_world::coords::CoordsXY;
    use park_world::ride::RideId;
    use park_world::track::TrackType;

    fn straight_run(world: &mut TileMap, tiles: i32) {
        for i in 0..tiles {
            world.place(
                CoordsXYZ::new(i * 32, 0, 0),
                TrackElement::new(TrackType::Flat, 0, RideId(0)),
            );
        }
    }

    #[test]
    fn next_follows_a_straight_run() {
        let mut world = TileMap::new(32);
        straight_run(&mut world, 3);

        let first = world
            .track_element_at(CoordsXYZ::new(0, 0, 0), TrackType::Flat)
            .expect("first element")
            .clone();
        let next = next_track_block(&world, CoordsXYZ::new(0, 0, 0), &first).expect("next");
        assert_eq!(next.position, CoordsXYZ::new(32, 0, 0));
        assert_eq!(next.direction, 0);
    }

    #[test]
    fn next_fails_at_the_end_of_track() {
        let mut world = TileMap::new(32);
        straight_run(&mut world, 2);
        let last = world
            .track_element_at(CoordsXYZ::new(32, 0, 0), TrackType::Flat)
            .expect("last element")
            .clone();
        assert!(next_track_block(&world, CoordsXYZ::new(32, 0, 0), &last).is_none());
    }

    #[test]
    fn previous_inverts_next() {
        let mut world = TileMap::new(32);
        straight_run(&mut world, 3);
        let middle = world
            .track_element_at(CoordsXYZ::new(32, 0, 0), TrackType::Flat)
            .expect("middle element")
            .clone();
        let previous =
            previous_track_block(&world, CoordsXYZ::new(32, 0, 0), &middle).expect("previous");
        assert_eq!(previous.begin_position, CoordsXYZ::new(0, 0, 0));
    }

    #[test]
    fn turns_change_direction() {
        let mut world = TileMap::new(32);
        world.place(
            CoordsXYZ::new(0, 0, 0),
            TrackElement::new(TrackType::LeftQuarterTurn1Tile, 0, RideId(0)),
        );
        world.place(
            CoordsXYZ::new(0, 32, 0),
            TrackElement::new(TrackType::Flat, 1, RideId(0)),
        );
        let turn = world
            .track_element_at(CoordsXYZ::new(0, 0, 0), TrackType::LeftQuarterTurn1Tile)
            .expect("turn")
            .clone();
        let next = next_track_block(&world, CoordsXYZ::new(0, 0, 0), &turn).expect("next");
        assert_eq!(next.direction, 1);
        assert_eq!(next.position.xy(), CoordsXY::new(0, 32));
    }

    #[test]
    fn block_start_walk_terminates_on_loops_without_one() {
        // Closed 2x2 loop of one-tile turns: no block start anywhere, and
        // the walk must still terminate.
        let mut world = TileMap::new(32);
        world.place(
            CoordsXYZ::new(32, 0, 0),
            TrackElement::new(TrackType::LeftQuarterTurn1Tile, 0, RideId(0)),
        );
        world.place(
            CoordsXYZ::new(32, 32, 0),
            TrackElement::new(TrackType::LeftQuarterTurn1Tile, 1, RideId(0)),
        );
        world.place(
            CoordsXYZ::new(0, 32, 0),
            TrackElement::new(TrackType::LeftQuarterTurn1Tile, 2, RideId(0)),
        );
        world.place(
            CoordsXYZ::new(0, 0, 0),
            TrackElement::new(TrackType::LeftQuarterTurn1Tile, 3, RideId(0)),
        );

        let start = world
            .track_element_at(CoordsXYZ::new(32, 0, 0), TrackType::LeftQuarterTurn1Tile)
            .expect("start")
            .clone();
        assert!(previous_block_start(&world, CoordsXYZ::new(32, 0, 0), &start).is_none());
    }
}
