use crate::core::RenderSettings;
use std::path::Path;
use std::process::Command;

/// One external encoder invocation. Inputs are prepared by the assembler;
/// outputs are verified by it as well, so a substitute encoder in tests only
/// has to produce (or not produce) files.
#[derive(Debug)]
pub enum EncodeTask<'a> {
    /// Concatenate the files listed in `list_file` into one encoded audio
    /// stream at the project's fixed bitrate and sample rate.
    AudioConcat {
        list_file: &'a Path,
        output: &'a Path,
    },
    /// Render the images listed in `list_file` (with per-item durations) into
    /// a video stream, capped at `max_duration_secs`.
    Slideshow {
        list_file: &'a Path,
        max_duration_secs: u32,
        output: &'a Path,
    },
    /// Combine one video and one audio stream into a container without
    /// re-encoding.
    Merge {
        video: &'a Path,
        audio: &'a Path,
        output: &'a Path,
    },
}

pub trait MediaEncoder: Send + Sync {
    fn run(&self, task: EncodeTask<'_>) -> anyhow::Result<()>;

    /// Duration of a media file in seconds.
    fn probe_duration(&self, path: &Path) -> anyhow::Result<f64>;
}

/// Production encoder shelling out to ffmpeg/ffprobe.
pub struct FfmpegEncoder {
    settings: RenderSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn scale_pad_filter(&self) -> String {
        let w = self.settings.output_width;
        let h = self.settings.output_height;
        format!(
            "scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:(oh-ih)/2",
            w, h, w, h
        )
    }

    fn execute(&self, mut cmd: Command, what: &str) -> anyhow::Result<()> {
        log::debug!("Running ffmpeg for {}: {:?}", what, cmd);
        let output = cmd.output()?;
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("FFmpeg {} failed: {}", what, error));
        }
        Ok(())
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn run(&self, task: EncodeTask<'_>) -> anyhow::Result<()> {
        match task {
            EncodeTask::AudioConcat { list_file, output } => {
                let mut cmd = Command::new("ffmpeg");
                cmd.arg("-f").arg("concat")
                    .arg("-safe").arg("0")
                    .arg("-i").arg(list_file)
                    .arg("-c:a").arg("aac")
                    .arg("-ar").arg(self.settings.audio_sample_rate.to_string())
                    .arg("-b:a").arg(&self.settings.audio_bitrate)
                    .arg("-y")
                    .arg(output);
                self.execute(cmd, "audio concat")
            }
            EncodeTask::Slideshow {
                list_file,
                max_duration_secs,
                output,
            } => {
                let mut cmd = Command::new("ffmpeg");
                cmd.arg("-f").arg("concat")
                    .arg("-safe").arg("0")
                    .arg("-t").arg(max_duration_secs.to_string())
                    .arg("-i").arg(list_file)
                    .arg("-vf").arg(self.scale_pad_filter())
                    .arg("-c:v").arg("libx264")
                    .arg("-pix_fmt").arg("yuv420p")
                    .arg("-preset").arg(&self.settings.video_preset)
                    .arg("-r").arg(self.settings.video_fps.to_string())
                    .arg("-y")
                    .arg(output);
                self.execute(cmd, "slideshow")
            }
            EncodeTask::Merge {
                video,
                audio,
                output,
            } => {
                // Stream copy only; the container decides how the stream
                // lengths line up.
                let mut cmd = Command::new("ffmpeg");
                cmd.arg("-i").arg(video)
                    .arg("-i").arg(audio)
                    .arg("-c:v").arg("copy")
                    .arg("-c:a").arg("copy")
                    .arg("-y")
                    .arg(output);
                self.execute(cmd, "merge")
            }
        }
    }

    fn probe_duration(&self, path: &Path) -> anyhow::Result<f64> {
        let output = Command::new("ffprobe")
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: serde_json::Value = serde_json::from_str(&json_str)?;

        info["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| anyhow::anyhow!("ffprobe reported no duration for {}", path.display()))
    }
}
