use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use crate::decode::{catch_decode_panic, DecodeFn, DecodedImage, Metadata};
use crate::error::Result;
use crate::worker::{recv_job, Worker, QUEUE_POLL};

/// Called once with the decoded image when a display request is satisfied.
pub type DisplayCallback = Box<dyn FnOnce(Arc<DecodedImage>, Metadata)>;

/// What happens to an unresolved display request when another one arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Keep only the newest request. The older caller is never notified.
    #[default]
    Replace,
    /// Keep every request and resolve each as its file arrives.
    Queue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub enqueued: u64,
    /// Results stored in the cache.
    pub decoded: u64,
    /// Jobs dropped by the wanted-check before decoding.
    pub skipped: u64,
    /// Results that arrived after their file stopped being wanted.
    pub discarded: u64,
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// Messages between the foreground and the decode worker
// ---------------------------------------------------------------------------

struct Job {
    generation: u64,
    filename: String,
    path: PathBuf,
}

enum WorkerEvent {
    /// The worker dequeued a job and waits for a yes/no on the answer
    /// channel before decoding it.
    WantedCheck { generation: u64, filename: String },
    Decoded {
        generation: u64,
        filename: String,
        result: Result<(DecodedImage, Metadata)>,
    },
}

struct CachedImage {
    image: Arc<DecodedImage>,
    metadata: Metadata,
}

// ---------------------------------------------------------------------------
// Prefetch cache (foreground side)
// ---------------------------------------------------------------------------

/// Decoded images for a window of filenames in one directory.
///
/// All state lives on the thread that owns the cache. The worker only sees
/// jobs and answers, and hands results back through a channel that
/// [`poll`](Self::poll) drains, so `poll` has to be called regularly for
/// anything to arrive.
pub struct PrefetchCache {
    directory: Option<PathBuf>,
    /// Bumped by `reset`; results tagged with an older value are stale.
    generation: u64,
    images: HashMap<String, CachedImage>,
    resident: HashSet<String>,
    /// Enqueued and not yet skipped, stored or failed.
    queued: HashSet<String>,
    failures: HashMap<String, String>,
    pending: Vec<(String, DisplayCallback)>,
    policy: PendingPolicy,
    stats: CacheStats,

    job_tx: Sender<Job>,
    event_rx: Receiver<WorkerEvent>,
    answer_tx: SyncSender<bool>,
    // Declared last: the channels above close before the worker is joined.
    worker: Worker,
}

impl PrefetchCache {
    pub fn start(decoder: DecodeFn, policy: PendingPolicy) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let (answer_tx, answer_rx) = mpsc::sync_channel(1);

        let worker = Worker::spawn("prefetch", move |running| {
            run_worker(job_rx, event_tx, answer_rx, decoder, running)
        })?;

        Ok(Self {
            directory: None,
            generation: 0,
            images: HashMap::new(),
            resident: HashSet::new(),
            queued: HashSet::new(),
            failures: HashMap::new(),
            pending: Vec::new(),
            policy,
            stats: CacheStats::default(),
            job_tx,
            event_rx,
            answer_tx,
            worker,
        })
    }

    /// Stop the worker and wait for it. A decode already running finishes
    /// first.
    pub fn stop(&mut self) {
        self.worker.stop();
    }

    /// Forget everything and switch to `directory`. Results still in flight
    /// for the previous context are dropped when they arrive.
    pub fn reset(&mut self, directory: impl Into<PathBuf>) {
        self.generation += 1;
        self.directory = Some(directory.into());
        self.images.clear();
        self.resident.clear();
        self.queued.clear();
        self.failures.clear();
        if !self.pending.is_empty() {
            log::debug!("Dropping {} pending display request(s) on reset", self.pending.len());
        }
        self.pending.clear();
        log::info!(
            "Cache reset to {:?} (generation {})",
            self.directory.as_deref().unwrap_or(Path::new("")),
            self.generation
        );
    }

    /// Make `desired` the resident set: evict everything else and enqueue
    /// the files that are neither decoded nor already queued, in order. A
    /// file that failed before is tried again.
    /// Returns the number of jobs enqueued.
    pub fn reconcile<S: AsRef<str>>(&mut self, desired: &[S]) -> usize {
        let Some(dir) = self.directory.clone() else {
            log::warn!("reconcile called before reset; nothing to load from");
            return 0;
        };

        let wanted: HashSet<String> = desired.iter().map(|s| s.as_ref().to_string()).collect();
        self.images.retain(|name, _| {
            let keep = wanted.contains(name);
            if !keep {
                log::debug!("Evicting {}", name);
            }
            keep
        });
        self.resident = wanted;

        let mut enqueued = 0;
        for name in desired {
            let name = name.as_ref();
            if self.images.contains_key(name) || self.queued.contains(name) {
                continue;
            }
            let job = Job {
                generation: self.generation,
                filename: name.to_string(),
                path: dir.join(name),
            };
            if self.job_tx.send(job).is_err() {
                log::warn!("Prefetch worker is gone; cannot enqueue {}", name);
                break;
            }
            if self.failures.remove(name).is_some() {
                log::debug!("Retrying {} after an earlier failure", name);
            }
            log::debug!("Enqueued {}", name);
            self.queued.insert(name.to_string());
            enqueued += 1;
        }

        self.stats.enqueued += enqueued as u64;
        enqueued
    }

    /// Show `filename` as soon as it is decoded. Already cached means
    /// `on_ready` runs before this returns.
    pub fn request_display<F>(&mut self, filename: &str, on_ready: F)
    where
        F: FnOnce(Arc<DecodedImage>, Metadata) + 'static,
    {
        if let Some(cached) = self.images.get(filename) {
            log::debug!("Display {} from cache", filename);
            on_ready(Arc::clone(&cached.image), cached.metadata.clone());
            return;
        }

        if self.policy == PendingPolicy::Replace {
            for (old, _) in self.pending.drain(..) {
                log::debug!("Display request for {} replaced by {}", old, filename);
            }
        }
        log::debug!("Waiting for {}", filename);
        self.pending.push((filename.to_string(), Box::new(on_ready)));
    }

    /// Handle every event the worker has sent so far. Returns how many.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Like [`poll`](Self::poll) but waits up to `timeout` for the first event.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.poll()
            }
            Err(_) => 0,
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::WantedCheck {
                generation,
                filename,
            } => {
                let current = generation == self.generation;
                let wanted = current
                    && self.resident.contains(&filename)
                    && !self.images.contains_key(&filename);
                if !wanted {
                    if current {
                        self.queued.remove(&filename);
                    }
                    self.stats.skipped += 1;
                    log::debug!("{} no longer wanted, skipping", filename);
                }
                // One slot and one question at a time, so this never blocks.
                let _ = self.answer_tx.try_send(wanted);
            }
            WorkerEvent::Decoded {
                generation,
                filename,
                result,
            } => self.on_decoded(generation, filename, result),
        }
    }

    fn on_decoded(
        &mut self,
        generation: u64,
        filename: String,
        result: Result<(DecodedImage, Metadata)>,
    ) {
        if generation != self.generation {
            log::debug!("Dropping stale result for {}", filename);
            self.stats.discarded += 1;
            return;
        }
        self.queued.remove(&filename);

        let (image, metadata) = match result {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Could not load {}: {}", filename, e);
                self.failures.insert(filename, e.to_string());
                self.stats.failed += 1;
                return;
            }
        };

        if !self.resident.contains(&filename) || self.images.contains_key(&filename) {
            log::debug!("Dropping unwanted result for {}", filename);
            self.stats.discarded += 1;
            return;
        }

        let image = Arc::new(image);
        log::debug!("Cached {} ({}x{})", filename, image.width, image.height);
        self.images.insert(
            filename.clone(),
            CachedImage {
                image: Arc::clone(&image),
                metadata: metadata.clone(),
            },
        );
        self.stats.decoded += 1;

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(name, _)| *name == filename);
        self.pending = waiting;
        for (_, on_ready) in ready {
            log::debug!("Display {} after decode", filename);
            on_ready(Arc::clone(&image), metadata.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, filename: &str) -> Option<(Arc<DecodedImage>, &Metadata)> {
        self.images
            .get(filename)
            .map(|c| (Arc::clone(&c.image), &c.metadata))
    }

    pub fn is_cached(&self, filename: &str) -> bool {
        self.images.contains_key(filename)
    }

    pub fn cached_len(&self) -> usize {
        self.images.len()
    }

    pub fn used_bytes(&self) -> u64 {
        self.images.values().map(|c| c.image.mem_size()).sum()
    }

    pub fn is_resident(&self, filename: &str) -> bool {
        self.resident.contains(filename)
    }

    pub fn is_queued(&self, filename: &str) -> bool {
        self.queued.contains(filename)
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Filenames with an unresolved display request, oldest first.
    pub fn pending_filenames(&self) -> Vec<&str> {
        self.pending.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn failure(&self, filename: &str) -> Option<&str> {
        self.failures.get(filename).map(|s| s.as_str())
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Background decode worker
// ---------------------------------------------------------------------------

fn run_worker(
    jobs: Receiver<Job>,
    events: Sender<WorkerEvent>,
    answers: Receiver<bool>,
    decoder: DecodeFn,
    running: Arc<AtomicBool>,
) {
    while let Some(job) = recv_job(&jobs, &running) {
        let check = WorkerEvent::WantedCheck {
            generation: job.generation,
            filename: job.filename.clone(),
        };
        if events.send(check).is_err() {
            break;
        }
        let Some(wanted) = await_answer(&answers, &running) else {
            break;
        };
        if !wanted {
            continue;
        }

        log::debug!("Decoding {}", job.path.display());
        let result = catch_decode_panic(&job.path, || decoder(&job.path));
        let done = WorkerEvent::Decoded {
            generation: job.generation,
            filename: job.filename,
            result,
        };
        if events.send(done).is_err() {
            break;
        }
    }
}

fn await_answer(answers: &Receiver<bool>, running: &AtomicBool) -> Option<bool> {
    while running.load(Ordering::SeqCst) {
        match answers.recv_timeout(QUEUE_POLL) {
            Ok(wanted) => return Some(wanted),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
    None
}
