use std::fs;

use anyhow::{Context, Result};

mod cable_lift;
mod cli;
mod events;
mod gforce;
mod mini_golf;
mod motion;
mod move_info;
mod scenario;
mod sim;
mod status;
mod subphysics;
mod track_iter;
mod util;

use park_paint::{ImageEntry, ImageTable, RenderTarget};
use sim::VehicleSample;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::parse()?;

    let mut sim = scenario::build(&args.scenario)?;

    println!(
        "Running scenario {:?}: {} rides, {} entities, {} track elements",
        args.scenario,
        sim.rides.len(),
        sim.entities.len(),
        sim.world.len()
    );

    let mut samples: Vec<VehicleSample> = Vec::new();
    let mut news_count = 0usize;
    let mut audio_count = 0usize;
    let mut rating_penalty = 0i32;

    for tick in 0..args.ticks {
        sim.update_all_vehicles();
        if tick % args.sample_interval.max(1) == 0 {
            samples.extend(sim.sample_vehicles());
        }
        let events = sim.events.drain();
        audio_count += events.audio.len();
        rating_penalty += events.park_rating_penalty;
        for item in &events.news {
            news_count += 1;
            println!("[news] {:?}: {}", item.kind, item.text);
        }
        if args.verbose {
            for event in &events.audio {
                println!(
                    "[audio] {:?} at {},{},{}",
                    event.sound, event.position.x, event.position.y, event.position.z
                );
            }
        }
    }

    if let Some(path) = args.tick_log_json.as_ref() {
        let json =
            serde_json::to_string_pretty(&samples).context("serializing tick log to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("writing tick log to {}", path.display()))?;
        println!("Saved tick log to {}", path.display());
    }

    if let Some(path) = args.frame_png.as_ref() {
        let images = ImageTable::uniform(
            8192,
            ImageEntry {
                width: 16,
                height: 16,
                x_offset: -8,
                y_offset: -8,
            },
        );
        // Centre the viewport on the built content so small parks fill
        // the frame.
        let mut sum = park_world::coords::CoordsXY::default();
        let mut count = 0i32;
        for (pos, _) in sim.world.iter() {
            sum += park_world::coords::coords_3d_to_2d(pos, args.rotation);
            count += 1;
        }
        let centre = if count > 0 {
            park_world::coords::CoordsXY::new(sum.x / count, sum.y / count)
        } else {
            park_world::coords::CoordsXY::default()
        };
        let mut target =
            RenderTarget::with_origin(centre.x - 320, centre.y - 240, 640, 480);
        let report = park_paint::render_frame(
            &mut target,
            &images,
            &sim.world,
            &sim.entities,
            &sim.rides,
            args.rotation,
            0,
            args.bounding_boxes,
        )
        .context("paint session already in use")?;
        target
            .write_png(path)
            .with_context(|| format!("writing frame to {}", path.display()))?;
        println!(
            "Saved frame to {} ({} primitives over {} columns)",
            path.display(),
            report.primitives,
            report.columns
        );

        if let Some(report_path) = args.paint_report_json.as_ref() {
            let json =
                serde_json::to_string_pretty(&report).context("serializing paint report")?;
            fs::write(report_path, json)
                .with_context(|| format!("writing paint report to {}", report_path.display()))?;
            println!("Saved paint report to {}", report_path.display());
        }
    }

    println!("\nAfter {} ticks:", args.ticks);
    for ride in sim.rides.iter() {
        for (index, &head) in ride.vehicles.iter().enumerate() {
            if let Some(vehicle) = sim.vehicle(head) {
                println!(
                    "  train {index}: {:?} at {},{},{} velocity {}",
                    vehicle.status,
                    vehicle.position.x,
                    vehicle.position.y,
                    vehicle.position.z,
                    vehicle.velocity
                );
            }
        }
    }
    println!(
        "Events: {news_count} news items, {audio_count} sounds, park rating penalty {rating_penalty}"
    );

    Ok(())
}
