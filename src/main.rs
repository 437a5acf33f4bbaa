mod automation;
mod core;
mod error;
mod media;
mod upload;

use crate::automation::{CycleController, UploadPipeline};
use crate::core::{AppConfig, ProjectPaths};
use crate::media::FfmpegEncoder;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let root = std::env::current_dir()?;
    let mut config = AppConfig::load(&root)?;

    // Optional override: mixloop [video_duration_secs]
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<u32>() {
            Ok(secs) if secs > 0 => config.video_duration_secs = secs,
            _ => anyhow::bail!(
                "video duration must be a positive number of seconds, got {:?}",
                arg
            ),
        }
    }

    let paths = ProjectPaths::new(&root);
    paths.ensure_directories()?;

    log::info!(
        "Automating channel {} ({}s videos, {} cycles max)",
        config.channel_name,
        config.video_duration_secs,
        config.max_cycles
    );

    let encoder = Arc::new(FfmpegEncoder::new(config.render.clone()));
    let max_cycles = config.max_cycles;
    let cycle_delay_secs = config.cycle_delay_secs;
    let pipeline = Arc::new(UploadPipeline::new(config, paths, encoder));
    let controller = CycleController::new(pipeline, max_cycles, cycle_delay_secs);

    controller.start();

    // Observer role: poll the shared state once per second and print
    // transitions. Never blocks the worker.
    let mut last_status = String::new();
    loop {
        let snapshot = controller.status();
        if snapshot.status != last_status {
            println!(
                "[cycle {}] {} ({}%)",
                snapshot.cycle_count, snapshot.status, snapshot.progress
            );
            last_status = snapshot.status;
        }
        if !snapshot.running {
            break;
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
    controller.join();

    Ok(())
}
