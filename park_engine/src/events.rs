//! Fire-and-forget outputs of a simulation tick: positional audio, the
//! news queue and the park-rating penalty. Consumers drain these between
//! ticks; nothing in the integrator ever reads them back.

use serde::Serialize;

use park_world::coords::CoordsXYZ;
use park_world::ride::RideId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SoundId {
    BlockBrakeClose,
    BlockBrakeRelease,
    BrakeRelease,
    Crash,
    TrainDeparting,
    Tram,
    RideLaunch1,
    RideLaunch2,
    WaterSplash,
    DoorOpen,
    DoorClose,
    OnRidePhoto,
    HauntedHouseScream,
    BoatHireHorn,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioEvent {
    pub sound: SoundId,
    pub position: CoordsXYZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NewsKind {
    RideCrashed,
    VehicleStalled,
    RideBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    pub kind: NewsKind,
    pub ride: RideId,
    pub text: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TickEvents {
    pub audio: Vec<AudioEvent>,
    pub news: Vec<NewsItem>,
    pub park_rating_penalty: i32,
}

impl TickEvents {
    pub fn play_sound(&mut self, sound: SoundId, position: CoordsXYZ) {
        self.audio.push(AudioEvent { sound, position });
    }

    pub fn add_news(&mut self, kind: NewsKind, ride: RideId, text: impl Into<String>) {
        self.news.push(NewsItem {
            kind,
            ride,
            text: text.into(),
        });
    }

    pub fn apply_park_rating_penalty(&mut self, penalty: i32) {
        self.park_rating_penalty += penalty;
    }

    pub fn drain(&mut self) -> TickEvents {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_resets_the_queues() {
        let mut events = TickEvents::default();
        events.play_sound(SoundId::Crash, CoordsXYZ::new(1, 2, 3));
        events.add_news(NewsKind::RideCrashed, RideId(0), "ride crashed");
        events.apply_park_rating_penalty(-200);

        let drained = events.drain();
        assert_eq!(drained.audio.len(), 1);
        assert_eq!(drained.news.len(), 1);
        assert_eq!(drained.park_rating_penalty, -200);
        assert!(events.audio.is_empty());
        assert!(events.news.is_empty());
        assert_eq!(events.park_rating_penalty, 0);
    }
}
