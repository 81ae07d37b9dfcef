//! Background heat map generation.
//!
//! One job at a time. The worker owns a snapshot of the table, reports
//! progress through a shared atomic, checks its cancel token between stages,
//! and announces completion on a channel. The last finished result is kept
//! in a single slot tagged with its job id.

use crate::dataset::HardnessDataRow;
use crate::heatmap::{build_field_with, FieldParams, HeatMapError, HeatMapField};
use crate::render::{render_field, RenderError, RenderOptions};
use crossbeam_channel::{Receiver, Sender};
use durometer_core::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

pub type JobId = u64;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("a heat map is already being generated")]
    Busy,
    #[error("heat map job cancelled")]
    Cancelled,
    #[error("heat map job failed: {0}")]
    Failed(#[from] HeatMapError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("could not start worker thread: {0}")]
    Spawn(String),
}

/// Cooperative cancellation flag shared with a running job.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a worker needs; built from a snapshot of the table.
#[derive(Clone, Debug)]
pub struct HeatMapRequest {
    pub rows: Vec<HardnessDataRow>,
    pub params: FieldParams,
    /// Also rasterize the field when set.
    pub render: Option<RenderOptions>,
}

#[derive(Clone, Debug)]
pub struct HeatMapOutput {
    pub field: HeatMapField,
    pub image: Option<RgbaImage>,
}

#[derive(Clone, Debug)]
pub struct JobEvent {
    pub job: JobId,
    pub result: Result<Arc<HeatMapOutput>, JobError>,
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    progress: AtomicU32,
    latest_requested: AtomicU64,
    latest: Mutex<Option<(JobId, Arc<HeatMapOutput>)>>,
}

impl Shared {
    fn set_progress(&self, p: f32) {
        self.progress.store(p.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Store `output` unless a newer request exists or a newer result is
    /// already in the slot.
    fn publish(&self, job: JobId, output: &Arc<HeatMapOutput>) -> bool {
        if job < self.latest_requested.load(Ordering::SeqCst) {
            return false;
        }
        let mut slot = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(id, _)| *id > job) {
            return false;
        }
        *slot = Some((job, Arc::clone(output)));
        true
    }
}

/// Clears the running flag even when the worker unwinds.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

pub struct HeatMapJobs {
    shared: Arc<Shared>,
    next_id: JobId,
    token: Option<CancelToken>,
    worker: Option<(JobId, JoinHandle<()>)>,
    events_tx: Sender<JobEvent>,
    events_rx: Receiver<JobEvent>,
}

impl Default for HeatMapJobs {
    fn default() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared::default()),
            next_id: 1,
            token: None,
            worker: None,
            events_tx,
            events_rx,
        }
    }
}

impl HeatMapJobs {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Progress of the current (or last) job in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    /// Completion events, one per started job.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events_rx
    }

    /// Most recent published result.
    pub fn latest(&self) -> Option<(JobId, Arc<HeatMapOutput>)> {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask the running job to stop at its next checkpoint.
    pub fn cancel(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    /// Spawn a worker for `request`. Fails with [`JobError::Busy`] while a
    /// job is running.
    pub fn start(&mut self, request: HeatMapRequest) -> Result<JobId, JobError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("heat map generation already in progress");
            return Err(JobError::Busy);
        }
        if let Some((_, old)) = self.worker.take() {
            let _ = old.join();
        }

        let job = self.next_id;
        self.next_id += 1;
        self.shared.latest_requested.store(job, Ordering::SeqCst);
        self.shared.set_progress(0.0);

        let token = CancelToken::default();
        self.token = Some(token.clone());
        let guard = RunningGuard(Arc::clone(&self.shared));
        let shared = Arc::clone(&self.shared);
        let tx = self.events_tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("heatmap-{job}"))
            .spawn(move || {
                let _guard = guard;
                let result = run_job(&request, &shared, &token).map(Arc::new);
                if let Ok(output) = &result {
                    if !shared.publish(job, output) {
                        log::debug!("heat map job {job} superseded, result discarded");
                    }
                }
                match &result {
                    Ok(_) => log::info!("heat map job {job} done"),
                    Err(e) => log::warn!("heat map job {job}: {e}"),
                }
                let _ = tx.send(JobEvent { job, result });
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some((job, handle));
                Ok(job)
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(JobError::Spawn(e.to_string()))
            }
        }
    }

    /// Block until the current worker exits and return its event. Unread
    /// events of earlier jobs are dropped.
    pub fn wait(&mut self) -> Option<JobEvent> {
        let (job, handle) = self.worker.take()?;
        let _ = handle.join();
        self.events_rx.try_iter().find(|event| event.job == job)
    }
}

impl Drop for HeatMapJobs {
    fn drop(&mut self) {
        self.cancel();
        if let Some((_, handle)) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_job(
    request: &HeatMapRequest,
    shared: &Shared,
    token: &CancelToken,
) -> Result<HeatMapOutput, JobError> {
    let field = build_field_with(&request.rows, &request.params, |stage| {
        shared.set_progress(stage.progress());
        !token.is_cancelled()
    })
    .map_err(|e| match e {
        HeatMapError::Cancelled => JobError::Cancelled,
        other => JobError::Failed(other),
    })?;

    let image = match &request.render {
        Some(opts) => Some(render_field(&field, opts)?),
        None => None,
    };
    if token.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    shared.set_progress(1.0);
    Ok(HeatMapOutput { field, image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::InterpolationMethod;
    use std::path::PathBuf;
    use std::time::Duration;

    fn rows() -> Vec<HardnessDataRow> {
        [(0.0, 0.0, 200.0), (10.0, 0.0, 300.0), (0.0, 10.0, 250.0), (10.0, 10.0, 280.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y, hv))| HardnessDataRow {
                id: format!("P{}", i + 1),
                x,
                y,
                hv: Some(hv),
                std_dev: Some(0.0),
                image_path: PathBuf::new(),
            })
            .collect()
    }

    fn request(resolution: usize) -> HeatMapRequest {
        HeatMapRequest {
            rows: rows(),
            params: FieldParams {
                grid_resolution: resolution,
                method: InterpolationMethod::Linear,
                ..FieldParams::default()
            },
            render: Some(RenderOptions::default()),
        }
    }

    #[test]
    fn job_publishes_latest_result() {
        let mut jobs = HeatMapJobs::default();
        let id = jobs.start(request(20)).expect("starts");
        let event = jobs.wait().expect("event");
        assert_eq!(event.job, id);
        let output = event.result.expect("succeeds");
        assert_eq!(output.field.grid_x.len(), 20);
        assert!(output.image.is_some());
        assert_eq!(jobs.latest().map(|(j, _)| j), Some(id));
        assert_eq!(jobs.progress(), 1.0);
        assert!(!jobs.is_running());
    }

    #[test]
    fn second_start_while_running_is_busy() {
        let mut jobs = HeatMapJobs::default();
        // hold the flag as a running worker would
        jobs.shared.running.store(true, Ordering::SeqCst);
        assert_eq!(jobs.start(request(5)).unwrap_err(), JobError::Busy);
        jobs.shared.running.store(false, Ordering::SeqCst);
        assert!(jobs.start(request(5)).is_ok());
        jobs.wait();
    }

    #[test]
    fn insufficient_data_is_reported_as_failure() {
        let mut jobs = HeatMapJobs::default();
        let mut req = request(5);
        req.rows.truncate(2);
        jobs.start(req).expect("starts");
        let event = jobs.wait().expect("event");
        assert_eq!(
            event.result.unwrap_err(),
            JobError::Failed(HeatMapError::InsufficientData { available: 2 })
        );
        assert!(jobs.latest().is_none());
    }

    #[test]
    fn cancelled_token_stops_at_first_checkpoint() {
        let shared = Shared::default();
        let token = CancelToken::default();
        token.cancel();
        let err = run_job(&request(5), &shared, &token).unwrap_err();
        assert_eq!(err, JobError::Cancelled);
        assert!(f32::from_bits(shared.progress.load(Ordering::Relaxed)) < 1.0);
    }

    #[test]
    fn superseded_results_are_discarded() {
        let shared = Shared::default();
        let out = |n| {
            let req = request(n);
            Arc::new(run_job(&req, &Shared::default(), &CancelToken::default()).expect("runs"))
        };
        shared.latest_requested.store(2, Ordering::SeqCst);
        assert!(!shared.publish(1, &out(3)));
        assert!(shared.publish(2, &out(4)));
        shared.latest_requested.store(3, Ordering::SeqCst);
        assert!(!shared.publish(2, &out(5)));
        let slot = shared.latest.lock().expect("lock");
        assert_eq!(slot.as_ref().map(|(id, o)| (*id, o.field.grid_x.len())), Some((2, 4)));
    }

    #[test]
    fn events_arrive_on_channel() {
        let mut jobs = HeatMapJobs::default();
        let id = jobs.start(request(8)).expect("starts");
        let event = jobs
            .events()
            .recv_timeout(Duration::from_secs(30))
            .expect("event within timeout");
        assert_eq!(event.job, id);
    }

    #[test]
    fn wait_skips_unread_events_of_earlier_jobs() {
        let mut jobs = HeatMapJobs::default();
        let first = jobs.start(request(6)).expect("starts");
        while jobs.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        let second = jobs.start(request(9)).expect("starts");
        assert_ne!(first, second);
        let event = jobs.wait().expect("event");
        assert_eq!(event.job, second);
        let output = event.result.expect("succeeds");
        assert_eq!(output.field.grid_x.len(), 9);
        assert!(jobs.events().try_recv().is_err());
        assert!(jobs.wait().is_none());
    }
}
