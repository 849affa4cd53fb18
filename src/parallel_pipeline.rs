// THEORY:
// Position extraction for one region depends only on the difference image, the
// region and a few fixed settings. That makes the per-region work independent, so the
// pool fans regions out to a set of long-lived tokio workers and collects the answers.
//
// Shape:
// - One dispatcher task receives every `RegionTask` and hands them to the workers
//   round-robin.
// - Each worker owns its receiver and processes its queue in order.
// - Every task carries a `oneshot` sender; the caller awaits all replies together.
//
// The difference frame is shared between tasks through its `Arc`-backed storage and
// each task receives its own copy of the `CropRegion`, so the caller's `RegionSet` is
// never touched while the pool runs. Results are keyed by region index, so the order
// in which workers finish does not matter.

use crate::core_modules::clustering::Clusterer;
use crate::core_modules::frame::Frame;
use crate::core_modules::geometry::{CoordinateSpace, Point};
use crate::core_modules::pixel::pixel::ChannelMode;
use crate::core_modules::position_extractor::position_extractor;
use crate::core_modules::region::CropRegion;
use crate::error::{MonitorError, Result};
use crate::pipeline::Extraction;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct RegionTask {
    pub index: usize,
    pub region: CropRegion,
    pub difference: Frame,
    pub space: CoordinateSpace,
    pub result_sender: oneshot::Sender<Result<Vec<Point>>>,
}

/// Settings every worker extracts with.
#[derive(Clone)]
struct WorkerSettings {
    threshold: u8,
    channel: ChannelMode,
    clusterer: Arc<dyn Clusterer>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<RegionTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns one worker per CPU. Must be called from within a tokio runtime.
    pub fn new(threshold: u8, channel: ChannelMode, clusterer: Arc<dyn Clusterer>) -> Self {
        Self::with_workers(num_cpus::get(), threshold, channel, clusterer)
    }

    pub fn with_workers(
        worker_count: usize,
        threshold: u8,
        channel: ChannelMode,
        clusterer: Arc<dyn Clusterer>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let settings = WorkerSettings {
            threshold,
            channel,
            clusterer,
        };
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<RegionTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<RegionTask>())
            .unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    log::error!("worker pool: worker {worker_idx} is gone");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for mut worker_receiver in worker_receivers {
            let worker_settings = settings.clone();
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let result = Self::process_region(&worker_settings, &task);
                    // The caller may have stopped waiting; nothing to do then.
                    let _ = task.result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        log::debug!("worker pool: started {worker_count} workers");
        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn process_region(settings: &WorkerSettings, task: &RegionTask) -> Result<Vec<Point>> {
        position_extractor::extract_in_space(
            &task.difference,
            &task.region,
            settings.threshold,
            settings.channel,
            settings.clusterer.as_ref(),
            task.space,
        )
    }

    /// Extracts positions for every region concurrently.
    pub async fn extract(
        &self,
        difference: &Frame,
        regions: &[CropRegion],
        space: CoordinateSpace,
    ) -> Extraction {
        let pending = regions.iter().enumerate().map(|(index, region)| {
            let (result_sender, result_receiver) = oneshot::channel();
            let task = RegionTask {
                index,
                region: *region,
                difference: difference.clone(),
                space,
                result_sender,
            };
            let sent = self.task_sender.send(task).is_ok();
            async move {
                if !sent {
                    return (index, Err(MonitorError::PoolClosed));
                }
                let result = result_receiver
                    .await
                    .unwrap_or(Err(MonitorError::PoolClosed));
                (index, result)
            }
        });

        let mut extraction = Extraction::default();
        for (index, result) in join_all(pending).await {
            extraction.record(index, result);
        }
        extraction
    }

    /// Stops accepting work and waits for the workers to drain their queues.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                log::error!("worker pool: worker panicked: {e}");
            }
        }
        log::debug!("worker pool: stopped");
    }
}
