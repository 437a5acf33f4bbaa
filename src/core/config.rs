use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "automation_config.json";

/// Fixed encoder settings shared by every assembly job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Seconds each image stays on screen in the slideshow.
    pub image_duration_secs: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub video_fps: u32,
    pub video_preset: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            image_duration_secs: 10,
            output_width: 1280,
            output_height: 720,
            video_fps: 24,
            video_preset: "ultrafast".to_string(),
            audio_bitrate: "256k".to_string(),
            audio_sample_rate: 44100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub channel_name: String,
    /// Target length of each produced video, in seconds.
    pub video_duration_secs: u32,
    /// Seconds to wait between cycles.
    pub cycle_delay_secs: u64,
    pub max_cycles: u32,
    /// How many tags to sample from the vocabulary per upload.
    pub tag_sample_size: usize,
    pub audio_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    #[serde(default)]
    pub render: RenderSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channel_name: "SleepRelaxAndMeditates".to_string(),
            video_duration_secs: 300,
            cycle_delay_secs: 30,
            max_cycles: 10,
            tag_sample_size: 30,
            audio_extensions: ["mp3", "wav", "m4a", "aac", "flac", "ogg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            image_extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            render: RenderSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let config_path = project_root.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e)
            })?;

            // Missing keys fall back to serde defaults; an unparseable file is
            // rewritten with a fresh default config.
            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Config file exists but has issues ({}), creating new one with defaults", e);
                    let new_config = Self::default();
                    new_config.save(project_root)?;
                    log::info!("Created new config file at {}", config_path.display());
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save(project_root)?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self, project_root: &Path) -> anyhow::Result<()> {
        let config_path = project_root.join(CONFIG_FILE_NAME);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

/// Fixed directory layout relative to the project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub music: PathBuf,
    pub images: PathBuf,
    pub final_videos: PathBuf,
    pub temp_files: PathBuf,
    pub credentials: PathBuf,
    pub client_secret: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            music: root.join("music"),
            images: root.join("images"),
            final_videos: root.join("finalvideos"),
            temp_files: root.join("tempFiles"),
            credentials: root.join("credentials"),
            client_secret: root.join("client.json"),
        }
    }

    /// Create every directory the pipeline writes into. Asset pools are only
    /// read, so their absence is left for scanning to report.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.final_videos, &self.temp_files, &self.credentials] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::error!("Failed to create directory {}: {}", dir.display(), e);
                return Err(anyhow::anyhow!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ));
            }
            log::debug!("Directory ensured: {}", dir.display());
        }
        Ok(())
    }
}
