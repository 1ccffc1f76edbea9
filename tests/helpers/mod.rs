#![allow(dead_code)]

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use picv::decode::{self, DecodeFn};
use picv::PrefetchCache;

const DEADLINE: Duration = Duration::from_secs(10);
const TICK: Duration = Duration::from_millis(10);

pub fn write_png(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(24, 16, Rgb(color)).save(&path).unwrap();
    path
}

/// Run foreground ticks until `done` holds. False on timeout.
pub fn pump_until(cache: &mut PrefetchCache, mut done: impl FnMut(&PrefetchCache) -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if done(cache) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        cache.poll_timeout(TICK);
    }
}

/// Keep ticking for a short while so late events get a chance to arrive.
pub fn settle(cache: &mut PrefetchCache) {
    let until = Instant::now() + Duration::from_millis(200);
    while Instant::now() < until {
        cache.poll_timeout(TICK);
    }
}

/// Counts invocations of a display callback.
#[derive(Clone, Default)]
pub struct Calls(Rc<Cell<usize>>);

impl Calls {
    pub fn count(&self) -> usize {
        self.0.get()
    }

    pub fn hit(&self) {
        self.0.set(self.0.get() + 1);
    }
}

/// Holds the first decode of one file until released.
pub struct Gate {
    started: Receiver<PathBuf>,
    release: Sender<()>,
}

impl Gate {
    pub fn has_started(&self) -> bool {
        self.started.try_recv().is_ok()
    }

    pub fn release(&self) {
        self.release.send(()).unwrap();
    }
}

pub fn gated_decoder(gated: &str) -> (DecodeFn, Gate) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);
    let armed = AtomicBool::new(true);
    let gated = gated.to_string();

    let decoder: DecodeFn = Arc::new(move |path: &Path| {
        let is_gated = path.file_name().and_then(|n| n.to_str()) == Some(gated.as_str());
        if is_gated && armed.swap(false, Ordering::SeqCst) {
            started_tx.lock().unwrap().send(path.to_path_buf()).unwrap();
            let _ = release_rx.lock().unwrap().recv();
        }
        decode::decode(path)
    });

    (
        decoder,
        Gate {
            started: started_rx,
            release: release_tx,
        },
    )
}
