use crate::automation::controller::StatusHandle;
use crate::core::{scan_pool, AppConfig, MediaKind, ProjectPaths};
use crate::error::CycleError;
use crate::media::{AssemblyJob, MediaAssembler, MediaEncoder};
use crate::upload::{CredentialStore, UploadClient, UploadMetadata};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// The two phases the controller drives per cycle. Substituted in controller
/// tests so scheduling can be exercised without an encoder or network.
pub trait CycleTasks: Send + Sync {
    fn assemble(&self, status: &StatusHandle) -> Result<PathBuf, CycleError>;
    fn upload(&self, artifact: &Path, status: &StatusHandle) -> Result<String, CycleError>;
}

/// Production cycle unit: scan the asset pools, assemble one video, then
/// push it to the channel under its own credentials.
pub struct UploadPipeline {
    config: AppConfig,
    paths: ProjectPaths,
    assembler: MediaAssembler,
    credentials: CredentialStore,
    uploader: UploadClient,
    rng: Mutex<StdRng>,
}

impl UploadPipeline {
    pub fn new(config: AppConfig, paths: ProjectPaths, encoder: Arc<dyn MediaEncoder>) -> Self {
        let assembler = MediaAssembler::new(encoder, paths.clone(), config.render.clone());
        let credentials =
            CredentialStore::new(paths.credentials.clone(), paths.client_secret.clone());
        Self {
            config,
            paths,
            assembler,
            credentials,
            uploader: UploadClient::new(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl CycleTasks for UploadPipeline {
    fn assemble(&self, status: &StatusHandle) -> Result<PathBuf, CycleError> {
        let audio = scan_pool(MediaKind::Audio, &self.paths, &self.config);
        let images = scan_pool(MediaKind::Image, &self.paths, &self.config);
        log::info!(
            "Found {} audio files and {} image files",
            audio.len(),
            images.len()
        );

        let job = AssemblyJob::new(self.config.video_duration_secs, audio, images);
        let mut rng = self.rng.lock().unwrap();
        let artifact = self.assembler.assemble(&job, &mut *rng, &mut |p, message| {
            status.update(scale_assembly_progress(p), message);
        })?;
        Ok(artifact)
    }

    fn upload(&self, artifact: &Path, status: &StatusHandle) -> Result<String, CycleError> {
        let metadata = {
            let mut rng = self.rng.lock().unwrap();
            UploadMetadata::generate(&mut *rng, self.config.tag_sample_size)
        };

        let credential = self.credentials.obtain(&self.config.channel_name)?;
        let video_id = self
            .uploader
            .upload(artifact, &metadata, &credential, &mut |fraction| {
                status.update(scale_upload_progress(fraction), "Uploading video");
            })?;
        Ok(video_id)
    }
}

/// Assembly owns the 0-70 band of a cycle's progress bar.
pub(crate) fn scale_assembly_progress(assembly_percent: u8) -> u8 {
    (assembly_percent.min(100) as u32 * 70 / 100) as u8
}

/// Upload owns the 70-100 band.
pub(crate) fn scale_upload_progress(fraction: f64) -> u8 {
    70 + (fraction.clamp(0.0, 1.0) * 30.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblyError;
    use crate::media::EncodeTask;

    struct NoopEncoder;

    impl MediaEncoder for NoopEncoder {
        fn run(&self, _task: EncodeTask<'_>) -> anyhow::Result<()> {
            Ok(())
        }

        fn probe_duration(&self, _path: &Path) -> anyhow::Result<f64> {
            Err(anyhow::anyhow!("no media in this test"))
        }
    }

    #[test]
    fn test_assembly_band_mapping() {
        assert_eq!(scale_assembly_progress(0), 0);
        assert_eq!(scale_assembly_progress(10), 7);
        assert_eq!(scale_assembly_progress(100), 70);
        assert_eq!(scale_assembly_progress(200), 70);
    }

    #[test]
    fn test_upload_band_mapping() {
        assert_eq!(scale_upload_progress(0.0), 70);
        assert_eq!(scale_upload_progress(0.5), 85);
        assert_eq!(scale_upload_progress(1.0), 100);
        assert_eq!(scale_upload_progress(7.0), 100);
    }

    #[test]
    fn test_empty_pools_surface_as_cycle_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        paths.ensure_directories().unwrap();

        let pipeline = UploadPipeline::new(AppConfig::default(), paths, Arc::new(NoopEncoder));
        let state = Arc::new(Mutex::new(
            crate::automation::controller::CycleState::new(),
        ));
        let status = StatusHandle::new(state);

        let result = pipeline.assemble(&status);
        assert!(matches!(
            result,
            Err(CycleError::Assembly(AssemblyError::NoValidImages))
        ));
    }
}
