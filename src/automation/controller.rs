use crate::automation::pipeline::CycleTasks;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Granularity of every cooperative wait (pause gate, inter-cycle delay).
const TICK: Duration = Duration::from_secs(1);

/// Shared automation state. Mutated only under the mutex, read as cloned
/// snapshots; the guard is never held across an external call or a sleep.
#[derive(Debug)]
pub(crate) struct CycleState {
    pub(crate) running: bool,
    pub(crate) paused: bool,
    pub(crate) status: String,
    pub(crate) progress: u8,
    pub(crate) cycle_count: u32,
    pub(crate) start_time: Option<DateTime<Local>>,
}

impl CycleState {
    pub(crate) fn new() -> Self {
        Self {
            running: false,
            paused: false,
            status: "Ready".to_string(),
            progress: 0,
            cycle_count: 0,
            start_time: None,
        }
    }
}

/// Atomic read of the automation state, safe to take from any thread.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub running: bool,
    pub paused: bool,
    pub status: String,
    pub progress: u8,
    pub cycle_count: u32,
    pub start_time: Option<DateTime<Local>>,
}

/// Write half handed to the cycle tasks so they can publish progress without
/// seeing the rest of the controller.
#[derive(Clone)]
pub struct StatusHandle {
    state: Arc<Mutex<CycleState>>,
}

impl StatusHandle {
    pub(crate) fn new(state: Arc<Mutex<CycleState>>) -> Self {
        Self { state }
    }

    pub fn update(&self, progress: u8, status: &str) {
        let mut state = self.state.lock().unwrap();
        state.progress = progress;
        state.status = status.to_string();
    }
}

/// Drives repeated assemble-upload cycles on a background worker thread.
/// `start`, `stop`, `pause`, `resume` and `status` are safe from any thread
/// and never block beyond the state mutex.
pub struct CycleController {
    state: Arc<Mutex<CycleState>>,
    tasks: Arc<dyn CycleTasks>,
    max_cycles: u32,
    cycle_delay_secs: u64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CycleController {
    pub fn new(tasks: Arc<dyn CycleTasks>, max_cycles: u32, cycle_delay_secs: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(CycleState::new())),
            tasks,
            max_cycles,
            cycle_delay_secs,
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.running {
                log::warn!("Automation is already running");
                return;
            }
            state.running = true;
            state.paused = false;
            state.cycle_count = 0;
            state.progress = 0;
            state.status = "Starting automation".to_string();
            state.start_time = Some(Local::now());
        }
        log::info!("Automation started");

        let worker = WorkerLoop {
            state: self.state.clone(),
            tasks: self.tasks.clone(),
            max_cycles: self.max_cycles,
            cycle_delay_secs: self.cycle_delay_secs,
        };
        let handle = std::thread::spawn(move || worker.run());
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Request a stop. Honored at the next checkpoint; an in-flight assembly
    /// or chunk transfer always completes first.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.paused = false;
        log::info!("Automation stop requested");
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if state.running {
            state.paused = true;
            log::info!("Automation paused");
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            state.paused = false;
            log::info!("Automation resumed");
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap();
        StatusSnapshot {
            running: state.running,
            paused: state.paused,
            status: state.status.clone(),
            progress: state.progress,
            cycle_count: state.cycle_count,
            start_time: state.start_time,
        }
    }

    /// Wait for the worker thread to finish. Intended for shutdown paths;
    /// observers should poll `status` instead.
    pub fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Automation worker panicked");
            }
        }
    }
}

struct WorkerLoop {
    state: Arc<Mutex<CycleState>>,
    tasks: Arc<dyn CycleTasks>,
    max_cycles: u32,
    cycle_delay_secs: u64,
}

impl WorkerLoop {
    fn run(self) {
        let max_cycles_reached = self.cycle_loop();

        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.paused = false;
        if max_cycles_reached {
            state.status = "Maximum cycles reached".to_string();
            state.progress = 100;
            log::info!("Automation completed after {} cycles", state.cycle_count);
        } else {
            state.status = "Automation stopped".to_string();
            log::info!("Automation stopped after {} cycles", state.cycle_count);
        }
    }

    /// Returns true when the loop ended because the configured cycle count
    /// was reached, false when it ended on a stop request.
    fn cycle_loop(&self) -> bool {
        loop {
            // Pause gate between cycles. Never entered mid-phase.
            loop {
                let (running, paused) = {
                    let state = self.state.lock().unwrap();
                    (state.running, state.paused)
                };
                if !running {
                    return false;
                }
                if !paused {
                    break;
                }
                self.handle().update(0, "Paused");
                std::thread::sleep(TICK);
            }

            let completed = self.state.lock().unwrap().cycle_count;
            if completed >= self.max_cycles {
                return true;
            }

            let cycle = {
                let mut state = self.state.lock().unwrap();
                state.cycle_count += 1;
                state.progress = 0;
                state.status = format!("Starting cycle {}", state.cycle_count);
                state.cycle_count
            };
            log::info!("Starting cycle {}/{}", cycle, self.max_cycles);

            self.run_cycle(cycle);

            // Inter-cycle delay, interruptible second by second.
            for _ in 0..self.cycle_delay_secs {
                if !self.is_running() {
                    return false;
                }
                std::thread::sleep(TICK);
            }
            if !self.is_running() {
                return false;
            }
        }
    }

    fn run_cycle(&self, cycle: u32) {
        let handle = self.handle();
        handle.update(5, "Assembling video");

        let artifact = match self.tasks.assemble(&handle) {
            Ok(artifact) => artifact,
            Err(e) => {
                log::error!("Cycle {} failed during assembly: {}", cycle, e);
                handle.update(0, &format!("Cycle {} failed: {}", cycle, e));
                return;
            }
        };

        // Stop checkpoint between the assembly and upload phases.
        if !self.is_running() {
            log::info!("Stop requested, skipping upload of {}", artifact.display());
            return;
        }

        handle.update(70, "Uploading video");
        match self.tasks.upload(&artifact, &handle) {
            Ok(video_id) => {
                log::info!("Cycle {} uploaded video {}", cycle, video_id);
                if let Err(e) = std::fs::remove_file(&artifact) {
                    log::warn!(
                        "Could not delete uploaded artifact {}: {}",
                        artifact.display(),
                        e
                    );
                }
                handle.update(100, &format!("Cycle {} completed", cycle));
            }
            Err(e) => {
                log::error!("Cycle {} failed during upload: {}", cycle, e);
                handle.update(0, &format!("Cycle {} failed: {}", cycle, e));
            }
        }
    }

    fn handle(&self) -> StatusHandle {
        StatusHandle::new(self.state.clone())
    }

    fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CycleError, UploadError};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    struct FakeTasks {
        artifact_dir: PathBuf,
        assemble_calls: AtomicU32,
        upload_calls: AtomicU32,
        fail_upload: bool,
        // When present, assemble blocks until the test sends a permit.
        gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl FakeTasks {
        fn new(artifact_dir: &Path) -> Self {
            Self {
                artifact_dir: artifact_dir.to_path_buf(),
                assemble_calls: AtomicU32::new(0),
                upload_calls: AtomicU32::new(0),
                fail_upload: false,
                gate: None,
            }
        }

        fn gated(artifact_dir: &Path) -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let mut tasks = Self::new(artifact_dir);
            tasks.gate = Some(Mutex::new(rx));
            (tasks, tx)
        }
    }

    impl CycleTasks for FakeTasks {
        fn assemble(&self, _status: &StatusHandle) -> Result<PathBuf, CycleError> {
            if let Some(gate) = &self.gate {
                gate.lock().unwrap().recv().ok();
            }
            let n = self.assemble_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let path = self.artifact_dir.join(format!("video_{}.mp4", n));
            std::fs::write(&path, b"video").unwrap();
            Ok(path)
        }

        fn upload(&self, _artifact: &Path, _status: &StatusHandle) -> Result<String, CycleError> {
            let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_upload {
                return Err(CycleError::Upload(UploadError::Rejected {
                    status: 500,
                    body: "canned failure".to_string(),
                }));
            }
            Ok(format!("vid-{}", n))
        }
    }

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while !condition() {
            if Instant::now() > deadline {
                panic!("timed out waiting for {}", what);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_runs_exactly_max_cycles_then_idles() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = Arc::new(FakeTasks::new(dir.path()));
        let controller = CycleController::new(tasks.clone(), 3, 0);

        controller.start();
        wait_until("automation to finish", || !controller.status().running);
        controller.join();

        let snapshot = controller.status();
        assert_eq!(snapshot.cycle_count, 3);
        assert_eq!(snapshot.status, "Maximum cycles reached");
        assert!(!snapshot.paused);
        assert_eq!(tasks.assemble_calls.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.upload_calls.load(Ordering::SeqCst), 3);
        // Successful cycles delete their artifacts.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_upload_counts_cycle_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = FakeTasks::new(dir.path());
        tasks.fail_upload = true;
        let tasks = Arc::new(tasks);
        let controller = CycleController::new(tasks.clone(), 2, 0);

        controller.start();
        wait_until("automation to finish", || !controller.status().running);
        controller.join();

        // Both cycles ran despite every upload failing.
        assert_eq!(controller.status().cycle_count, 2);
        assert_eq!(tasks.upload_calls.load(Ordering::SeqCst), 2);
        // Failed cycles keep their artifacts on disk.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_stop_while_paused_goes_idle_without_new_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (tasks, permits) = FakeTasks::gated(dir.path());
        let tasks = Arc::new(tasks);
        let controller = CycleController::new(tasks.clone(), 99, 5);

        controller.start();
        permits.send(()).unwrap();
        wait_until("first cycle to complete", || {
            controller.status().progress == 100 && controller.status().cycle_count == 1
        });

        // Pause lands during the inter-cycle delay; the worker parks in the
        // pause gate before cycle 2.
        controller.pause();
        wait_until("pause gate", || controller.status().status == "Paused");

        controller.stop();
        wait_until("automation to finish", || !controller.status().running);
        controller.join();

        let snapshot = controller.status();
        assert_eq!(snapshot.cycle_count, 1);
        assert_eq!(snapshot.status, "Automation stopped");
        assert!(!snapshot.paused);
        assert_eq!(tasks.assemble_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_then_resume_continues_where_left_off() {
        let dir = tempfile::tempdir().unwrap();
        let (tasks, permits) = FakeTasks::gated(dir.path());
        let tasks = Arc::new(tasks);
        let controller = CycleController::new(tasks.clone(), 2, 3);

        controller.start();
        permits.send(()).unwrap();
        wait_until("first cycle to complete", || {
            controller.status().progress == 100 && controller.status().cycle_count == 1
        });

        controller.pause();
        wait_until("pause gate", || controller.status().status == "Paused");
        assert_eq!(tasks.assemble_calls.load(Ordering::SeqCst), 1);

        controller.resume();
        permits.send(()).unwrap();
        wait_until("automation to finish", || !controller.status().running);
        controller.join();

        // Exactly one more cycle ran; nothing was skipped or repeated.
        assert_eq!(controller.status().cycle_count, 2);
        assert_eq!(controller.status().status, "Maximum cycles reached");
        assert_eq!(tasks.assemble_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_while_running_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (tasks, permits) = FakeTasks::gated(dir.path());
        let tasks = Arc::new(tasks);
        let controller = CycleController::new(tasks.clone(), 5, 0);

        controller.start();
        let first_start = controller.status().start_time;
        controller.start();
        assert_eq!(controller.status().start_time, first_start);
        assert_eq!(controller.status().cycle_count, 0);

        // Unblock the worker and shut down cleanly.
        controller.stop();
        permits.send(()).unwrap();
        wait_until("automation to finish", || !controller.status().running);
        controller.join();
    }

    #[test]
    fn test_status_snapshot_reflects_progress_updates() {
        let state = Arc::new(Mutex::new(CycleState::new()));
        let handle = StatusHandle::new(state.clone());
        handle.update(42, "halfway there");

        let guard = state.lock().unwrap();
        assert_eq!(guard.progress, 42);
        assert_eq!(guard.status, "halfway there");
    }
}
