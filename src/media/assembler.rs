use crate::core::{ProjectPaths, RenderSettings};
use crate::error::AssemblyError;
use crate::media::encoder::{EncodeTask, MediaEncoder};
use chrono::Local;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a job currently is. Terminal states are `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Init,
    AudioMixing,
    ImageSlideshow,
    Merging,
    Done,
    Failed,
}

/// One video-build request. The id names every intermediate and the final
/// artifact, so concurrent leftovers from crashed runs never collide.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub id: String,
    pub requested_duration_secs: u32,
    pub audio_pool: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl AssemblyJob {
    pub fn new(requested_duration_secs: u32, audio_pool: Vec<PathBuf>, images: Vec<PathBuf>) -> Self {
        Self {
            id: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            requested_duration_secs,
            audio_pool,
            images,
        }
    }
}

/// Intermediate files of one job. Removed unconditionally when the job
/// reaches a terminal phase.
struct TempArtifacts {
    audio_list: PathBuf,
    image_list: PathBuf,
    audio: PathBuf,
    video: PathBuf,
}

impl TempArtifacts {
    fn new(temp_dir: &Path, job_id: &str) -> Self {
        Self {
            audio_list: temp_dir.join(format!("concat_audio_{}.txt", job_id)),
            image_list: temp_dir.join(format!("image_list_{}.txt", job_id)),
            audio: temp_dir.join(format!("temp_audio_{}.m4a", job_id)),
            video: temp_dir.join(format!("temp_video_{}.mp4", job_id)),
        }
    }

    fn cleanup(&self) {
        for path in [&self.audio_list, &self.image_list, &self.audio, &self.video] {
            if path.exists() {
                match std::fs::remove_file(path) {
                    Ok(()) => log::debug!("Cleaned up temporary file {}", path.display()),
                    Err(e) => log::warn!("Could not delete {}: {}", path.display(), e),
                }
            }
        }
    }
}

pub struct MediaAssembler {
    encoder: Arc<dyn MediaEncoder>,
    paths: ProjectPaths,
    settings: RenderSettings,
}

impl MediaAssembler {
    pub fn new(encoder: Arc<dyn MediaEncoder>, paths: ProjectPaths, settings: RenderSettings) -> Self {
        Self {
            encoder,
            paths,
            settings,
        }
    }

    /// Build one video from the job's asset pools. Returns the path of the
    /// finished artifact in the final-videos directory. Intermediates are
    /// removed whether the job succeeds or fails.
    pub fn assemble<R: Rng + ?Sized>(
        &self,
        job: &AssemblyJob,
        rng: &mut R,
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<PathBuf, AssemblyError> {
        log_phase(&job.id, JobPhase::Init);
        let temps = TempArtifacts::new(&self.paths.temp_files, &job.id);

        let result = self.run_stages(job, rng, progress, &temps);

        temps.cleanup();
        match &result {
            Ok(path) => {
                log_phase(&job.id, JobPhase::Done);
                log::info!("Job {}: final video at {}", job.id, path.display());
            }
            Err(e) => {
                log_phase(&job.id, JobPhase::Failed);
                log::error!("Job {} failed: {}", job.id, e);
            }
        }
        result
    }

    fn run_stages<R: Rng + ?Sized>(
        &self,
        job: &AssemblyJob,
        rng: &mut R,
        progress: &mut dyn FnMut(u8, &str),
        temps: &TempArtifacts,
    ) -> Result<PathBuf, AssemblyError> {
        if job.images.is_empty() {
            return Err(AssemblyError::NoValidImages);
        }

        // Audio accumulates against the original request; the slideshow is
        // capped at what the image pool can fill. The merge stream-copies
        // both, so the container may carry audio past the video track.
        let effective_secs = effective_duration_secs(
            job.requested_duration_secs,
            job.images.len(),
            self.settings.image_duration_secs,
        );
        if effective_secs < job.requested_duration_secs {
            log::warn!(
                "Job {}: image content covers {}s of the requested {}s, clamping output length",
                job.id,
                effective_secs,
                job.requested_duration_secs
            );
        }

        log_phase(&job.id, JobPhase::AudioMixing);
        progress(10, "Creating audio mix");
        let tracks = self.select_audio_tracks(&job.audio_pool, job.requested_duration_secs, rng);
        if tracks.is_empty() {
            return Err(AssemblyError::NoValidAudio);
        }

        write_concat_list(&temps.audio_list, &tracks).map_err(|e| encode_failed(
            "audio",
            &temps.audio,
            format!("could not write concat list: {}", e),
        ))?;
        self.encoder
            .run(EncodeTask::AudioConcat {
                list_file: &temps.audio_list,
                output: &temps.audio,
            })
            .map_err(|e| encode_failed("audio", &temps.audio, e.to_string()))?;
        verify_nonempty(&temps.audio)
            .map_err(|detail| encode_failed("audio", &temps.audio, detail))?;

        log_phase(&job.id, JobPhase::ImageSlideshow);
        progress(30, "Creating image slideshow");
        write_image_list(&temps.image_list, &job.images, self.settings.image_duration_secs)
            .map_err(|e| encode_failed(
                "slideshow",
                &temps.video,
                format!("could not write image list: {}", e),
            ))?;
        self.encoder
            .run(EncodeTask::Slideshow {
                list_file: &temps.image_list,
                max_duration_secs: effective_secs,
                output: &temps.video,
            })
            .map_err(|e| encode_failed("slideshow", &temps.video, e.to_string()))?;
        verify_nonempty(&temps.video)
            .map_err(|detail| encode_failed("slideshow", &temps.video, detail))?;

        log_phase(&job.id, JobPhase::Merging);
        progress(70, "Merging audio and video streams");
        let final_path = self.paths.final_videos.join(format!("video_{}.mp4", job.id));
        self.encoder
            .run(EncodeTask::Merge {
                video: &temps.video,
                audio: &temps.audio,
                output: &final_path,
            })
            .map_err(|e| AssemblyError::MergeFailed {
                output: final_path.clone(),
                detail: e.to_string(),
            })?;
        verify_nonempty(&final_path).map_err(|detail| AssemblyError::MergeFailed {
            output: final_path.clone(),
            detail,
        })?;

        progress(100, "Video assembly completed");
        Ok(final_path)
    }

    /// Draw random tracks from the pool without replacement until their
    /// probed durations reach the target or the pool runs out. Tracks whose
    /// duration cannot be probed are dropped and skipped.
    fn select_audio_tracks<R: Rng + ?Sized>(
        &self,
        pool: &[PathBuf],
        target_secs: u32,
        rng: &mut R,
    ) -> Vec<PathBuf> {
        let mut available: Vec<PathBuf> = pool.to_vec();
        let mut selected = Vec::new();
        let mut total = 0.0_f64;

        while total < target_secs as f64 && !available.is_empty() {
            let index = rng.random_range(0..available.len());
            let candidate = available.swap_remove(index);
            match self.encoder.probe_duration(&candidate) {
                Ok(duration) => {
                    total += duration;
                    selected.push(candidate);
                }
                Err(e) => {
                    log::warn!(
                        "Skipping {}: duration probe failed: {}",
                        candidate.display(),
                        e
                    );
                }
            }
        }

        if total < target_secs as f64 && !selected.is_empty() {
            log::warn!(
                "Audio pool exhausted at {:.1}s of the requested {}s, continuing with what was gathered",
                total,
                target_secs
            );
        }
        selected
    }
}

fn log_phase(job_id: &str, phase: JobPhase) {
    log::info!("Job {}: phase {:?}", job_id, phase);
}

fn encode_failed(stage: &'static str, output: &Path, detail: String) -> AssemblyError {
    AssemblyError::EncodeFailed {
        stage,
        output: output.to_path_buf(),
        detail,
    }
}

/// Output length is bounded by how long the image pool can stay on screen.
pub(crate) fn effective_duration_secs(
    requested_secs: u32,
    image_count: usize,
    image_duration_secs: u32,
) -> u32 {
    let available = u32::try_from(image_count as u64 * image_duration_secs as u64)
        .unwrap_or(u32::MAX);
    requested_secs.min(available)
}

fn verify_nonempty(path: &Path) -> Result<(), String> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err("output file is empty".to_string()),
        Err(_) => Err("output file was not created".to_string()),
    }
}

fn write_concat_list(path: &Path, files: &[PathBuf]) -> std::io::Result<()> {
    let mut content = String::new();
    for file in files {
        content.push_str(&format!("file '{}'\n", file.display()));
    }
    std::fs::write(path, content)
}

/// Concat-demuxer list with a display duration per image. The demuxer needs
/// the final entry repeated without a duration line.
fn write_image_list(path: &Path, images: &[PathBuf], duration_secs: u32) -> std::io::Result<()> {
    let mut content = String::new();
    for image in images {
        content.push_str(&format!("file '{}'\n", image.display()));
        content.push_str(&format!("duration {}\n", duration_secs));
    }
    if let Some(last) = images.last() {
        content.push_str(&format!("file '{}'\n", last.display()));
    }
    std::fs::write(path, content)
}
