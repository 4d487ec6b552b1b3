//! Bounded worker pool for conversion batches (made by FontLab https://www.fontlab.com/)
//!
//! A batch is a fixed list of jobs. The list goes into a pre-filled, closed
//! queue and a fixed number of workers on a dedicated rayon pool drain it.
//! `run` returns once every worker has returned.
//!
//! Cancellation is cooperative: workers look at the token before taking a
//! job and before reporting one. A tool that is already running is left to
//! finish (or to hit its own timeout).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::Dispatch;

use crate::cancel::CancelToken;
use crate::convert::Converter;
use crate::error::{Error, Kind, Result};
use crate::location::LocationCodec;
use crate::plan::ConversionJob;
use crate::progress::{ConversionProgress, ProgressSender, Stage};
use crate::variant::lock;

/// Half the machine's parallelism, at least one, at most `max_concurrent`.
pub fn default_worker_count(max_concurrent: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).clamp(1, max_concurrent.max(1))
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    /// `false` when cancellation left jobs untouched.
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Runs conversion batches with at most `worker_count()` jobs in flight.
#[derive(Debug, Clone)]
pub struct ConversionPool {
    workers: usize,
    cancel: CancelToken,
    dispatch: Dispatch,
}

/// Shared state for the workers of one batch.
struct Batch<'a> {
    stage: Stage,
    total: usize,
    converter: &'a dyn Converter,
    codec: &'a dyn LocationCodec,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    /// Keeps count-then-send atomic so subscribers see `current` in order.
    report_lock: Mutex<()>,
}

impl ConversionPool {
    pub fn new(max_concurrent: usize, cancel: CancelToken) -> Self {
        Self::with_workers(default_worker_count(max_concurrent), cancel)
    }

    pub fn with_workers(workers: usize, cancel: CancelToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Route worker logs to `dispatch` instead of the creating thread's default.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Run one batch to completion (or cancellation).
    ///
    /// Failed jobs are logged and counted; they never stop their siblings.
    /// Each successful job records its output on its variant.
    pub fn run(
        &self,
        stage: Stage,
        jobs: Vec<ConversionJob>,
        converter: &dyn Converter,
        codec: &dyn LocationCodec,
        progress: Option<&ProgressSender>,
    ) -> Result<BatchReport> {
        let total = jobs.len();
        if total == 0 {
            return Ok(BatchReport::default());
        }
        self.cancel.check("run_batch")?;

        let (queue_tx, queue) = async_channel::bounded(total);
        for job in jobs {
            // capacity equals job count, so this never hits a full queue
            if queue_tx.try_send(job).is_err() {
                return Err(Error::new(Kind::WorkerPool, "fill_queue"));
            }
        }
        queue_tx.close();

        let workers = self.workers.min(total);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("fontfill-{}-{i}", stage.label()))
            .build()
            .map_err(|err| Error::new(Kind::WorkerPool, "build_pool").with_cause(err))?;

        tracing::info!(stage = stage.label(), jobs = total, workers, "starting conversion batch");

        let batch = Batch {
            stage,
            total,
            converter,
            codec,
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            report_lock: Mutex::new(()),
        };

        pool.scope(|scope| {
            for _ in 0..workers {
                let queue = queue.clone();
                let progress = progress.cloned();
                let batch = &batch;
                let cancel = &self.cancel;
                let dispatch = &self.dispatch;
                scope.spawn(move |_| {
                    tracing::dispatcher::with_default(dispatch, || {
                        work(&queue, batch, progress.as_ref(), cancel)
                    });
                });
            }
        });

        let completed = batch.completed.load(Ordering::SeqCst);
        let succeeded = batch.succeeded.load(Ordering::SeqCst);
        let report = BatchReport {
            total,
            completed,
            succeeded,
            failed: completed - succeeded,
        };

        if self.cancel.is_cancelled() {
            tracing::warn!(stage = stage.label(), ?report, "conversion batch cancelled");
        } else {
            tracing::info!(stage = stage.label(), ?report, "conversion batch finished");
        }
        Ok(report)
    }
}

fn work(
    queue: &async_channel::Receiver<ConversionJob>,
    batch: &Batch<'_>,
    progress: Option<&ProgressSender>,
    cancel: &CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!("worker stopping: cancelled");
            return;
        }
        let Ok(job) = queue.try_recv() else {
            return;
        };

        match batch.converter.convert(&job.source, &job.output) {
            Ok(written) => {
                let file_name = format!("{}{}", job.name, job.target.ext());
                let location = batch.codec.encode(&written, Some(&file_name));
                lock(&job.variant).add_converted(job.target, location);
                batch.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                tracing::warn!(font = %job.name, error = %err, "conversion failed");
            }
        }

        let _order = batch
            .report_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = batch.completed.fetch_add(1, Ordering::SeqCst) + 1;

        if cancel.is_cancelled() {
            tracing::debug!("worker stopping: cancelled");
            return;
        }
        if let Some(progress) = progress {
            progress.progress(ConversionProgress {
                total: batch.total,
                current,
                current_font: job.name,
                stage: batch.stage,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FontFormat;
    use crate::location::{DownloadLinks, Location};
    use crate::progress::{self, Notice};
    use crate::variant::{share, FontVariant, SharedVariant};
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::Receiver;
    use std::thread;
    use std::time::Duration;

    /// Records concurrency and fails for sources whose name starts with "bad".
    #[derive(Default)]
    struct MockConverter {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl Converter for MockConverter {
        fn convert(&self, source: &Path, output: &Path) -> Result<PathBuf> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some((after, cancel)) = &self.cancel_after {
                if call >= *after {
                    cancel.cancel();
                }
            }
            let bad = source
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("bad"));
            if bad {
                return Err(Error::new(Kind::ConvertInvoke, "mock").with_path(source));
            }
            Ok(output.to_path_buf())
        }
    }

    fn job(name: &str) -> (ConversionJob, SharedVariant) {
        let variant = share(FontVariant::new(
            name,
            FontFormat::Ttf,
            Location::new(format!("/src/{name}.ttf")),
        ));
        let job = ConversionJob {
            variant: variant.clone(),
            name: name.to_string(),
            source: PathBuf::from(format!("/src/{name}.ttf")),
            source_format: FontFormat::Ttf,
            output: PathBuf::from(format!("/out/{name}.woff2")),
            target: FontFormat::Woff2,
        };
        (job, variant)
    }

    fn jobs(names: &[&str]) -> (Vec<ConversionJob>, Vec<SharedVariant>) {
        names.iter().map(|n| job(n)).unzip()
    }

    fn drain(rx: &Receiver<Notice>) -> Vec<ConversionProgress> {
        rx.try_iter()
            .filter_map(|n| match n {
                Notice::Progress(p) => Some(p),
                Notice::Status(_) => None,
            })
            .collect()
    }

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(default_worker_count(1), 1);
        assert!(default_worker_count(4) <= 4);
        assert!(default_worker_count(0) >= 1);
        assert_eq!(ConversionPool::with_workers(0, CancelToken::new()).worker_count(), 1);
    }

    #[test]
    fn never_exceeds_worker_count_in_flight() {
        let pool = ConversionPool::with_workers(3, CancelToken::new());
        let names: Vec<String> = (0..12).map(|i| format!("Font{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (batch, _) = jobs(&refs);
        let converter = MockConverter {
            delay: Duration::from_millis(20),
            ..Default::default()
        };

        let report = pool
            .run(Stage::WebFormat, batch, &converter, &DownloadLinks::default(), None)
            .expect("run");

        assert_eq!(report.completed, 12);
        assert!(converter.peak.load(Ordering::SeqCst) <= pool.worker_count());
        assert_eq!(converter.calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn success_records_output_on_variant() {
        let pool = ConversionPool::with_workers(2, CancelToken::new());
        let (batch, variants) = jobs(&["Arial"]);
        let codec = DownloadLinks::default();

        pool.run(Stage::WebFormat, batch, &MockConverter::default(), &codec, None)
            .expect("run");

        let arial = lock(&variants[0]);
        let expected = codec.encode(Path::new("/out/Arial.woff2"), Some("Arial.woff2"));
        assert_eq!(arial.location(FontFormat::Woff2), Some(&expected));
        assert_eq!(arial.preview(), &expected);
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let pool = ConversionPool::with_workers(2, CancelToken::new());
        let (batch, variants) = jobs(&["bad1", "Good", "bad2", "Fine"]);

        let report = pool
            .run(
                Stage::WebFormat,
                batch,
                &MockConverter::default(),
                &DownloadLinks::default(),
                None,
            )
            .expect("run");

        assert_eq!(
            report,
            BatchReport {
                total: 4,
                completed: 4,
                succeeded: 2,
                failed: 2
            }
        );
        assert!(!lock(&variants[0]).has(FontFormat::Woff2));
        assert!(lock(&variants[1]).has(FontFormat::Woff2));
    }

    #[test]
    fn progress_is_ordered_and_ends_at_total() {
        let cancel = CancelToken::new();
        let pool = ConversionPool::with_workers(4, cancel.clone());
        let (tx, rx) = progress::channel(64, cancel);
        let (batch, _) = jobs(&["A", "B", "C", "D", "E", "F"]);

        pool.run(
            Stage::WebFormat,
            batch,
            &MockConverter::default(),
            &DownloadLinks::default(),
            Some(&tx),
        )
        .expect("run");

        let events = drain(&rx);
        let seen: Vec<usize> = events.iter().map(|p| p.current).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
        assert!(events.iter().all(|p| p.total == 6 && p.stage == Stage::WebFormat));
        assert_eq!(events.iter().filter(|p| p.is_final()).count(), 1);
    }

    #[test]
    fn slow_subscriber_loses_updates_but_not_work() {
        let cancel = CancelToken::new();
        let pool = ConversionPool::with_workers(2, cancel.clone());
        let (tx, rx) = progress::channel(1, cancel);
        let (batch, variants) = jobs(&["A", "B", "C", "D", "E"]);

        // the reader wakes up late, then keeps up so the final event fits
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut seen = Vec::new();
            while let Ok(Notice::Progress(p)) = rx.recv_timeout(Duration::from_secs(3)) {
                let last = p.is_final();
                seen.push(p.current);
                if last {
                    break;
                }
            }
            seen
        });

        let report = pool
            .run(
                Stage::DesktopFormat,
                batch,
                &MockConverter::default(),
                &DownloadLinks::default(),
                Some(&tx),
            )
            .expect("run");
        drop(tx);

        let seen = reader.join().unwrap();
        assert_eq!(report.completed, 5);
        assert!(variants.iter().all(|v| lock(v).has(FontFormat::Woff2)));
        assert!(seen.len() < 5, "some updates were dropped: {seen:?}");
        assert_eq!(seen.last(), Some(&5));
    }

    #[test]
    fn cancellation_stops_remaining_jobs() {
        let cancel = CancelToken::new();
        let pool = ConversionPool::with_workers(1, cancel.clone());
        let (batch, _) = jobs(&["A", "B", "C", "D"]);
        let converter = MockConverter {
            cancel_after: Some((2, cancel.clone())),
            ..Default::default()
        };

        let report = pool
            .run(Stage::WebFormat, batch, &converter, &DownloadLinks::default(), None)
            .expect("run");

        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.completed, 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn cancelled_before_start_is_an_error() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = ConversionPool::with_workers(2, cancel);
        let (batch, _) = jobs(&["A"]);

        let err = pool
            .run(
                Stage::WebFormat,
                batch,
                &MockConverter::default(),
                &DownloadLinks::default(),
                None,
            )
            .expect_err("cancelled");
        assert_eq!(err.kind(), Kind::Cancelled);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let pool = ConversionPool::with_workers(2, CancelToken::new());
        let report = pool
            .run(
                Stage::WebFormat,
                Vec::new(),
                &MockConverter::default(),
                &DownloadLinks::default(),
                None,
            )
            .expect("run");
        assert_eq!(report, BatchReport::default());
        assert!(report.is_complete());
    }
}
