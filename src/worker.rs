//! A single owned background thread with an explicit start/stop lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// How long a worker blocks on an empty queue before re-checking the
/// running flag.
pub const QUEUE_POLL: Duration = Duration::from_millis(250);

pub struct Worker {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(Error::Spawn)?;

        log::info!("Started {} worker", name);
        Ok(Self {
            name: name.to_string(),
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Ask the thread to finish and wait for it. Safe to call twice.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} worker panicked", self.name);
            }
            log::info!("Stopped {} worker", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait for the next item, waking every `QUEUE_POLL` to honour shutdown.
/// `None` means stop: the flag was cleared or every sender is gone.
pub fn recv_job<T>(rx: &Receiver<T>, running: &AtomicBool) -> Option<T> {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(QUEUE_POLL) {
            Ok(job) => return Some(job),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn stop_joins_idle_worker() {
        let (_tx, rx) = mpsc::channel::<u32>();
        let mut worker = Worker::spawn("idle", move |running| {
            while recv_job(&rx, &running).is_some() {}
        })
        .unwrap();
        assert!(worker.is_running());
        worker.stop();
        assert!(!worker.is_running());
        worker.stop();
    }

    #[test]
    fn recv_job_returns_queued_items_then_none_on_disconnect() {
        let (tx, rx) = mpsc::channel();
        let running = AtomicBool::new(true);
        tx.send(7).unwrap();
        drop(tx);
        assert_eq!(recv_job(&rx, &running), Some(7));
        assert_eq!(recv_job(&rx, &running), None);
    }

    #[test]
    fn recv_job_honours_cleared_flag() {
        let (_tx, rx) = mpsc::channel::<u32>();
        let running = AtomicBool::new(false);
        assert_eq!(recv_job(&rx, &running), None);
    }
}
