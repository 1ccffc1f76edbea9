use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{self, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::decode::{self, catch_decode_panic, DecodedImage};
use crate::error::{Error, Result};
use crate::worker::{recv_job, Worker};

pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 80;

pub type ThumbnailCallback = Box<dyn FnOnce(Arc<DecodedImage>)>;

struct ThumbnailJob {
    source: PathBuf,
    cache_path: PathBuf,
}

struct ThumbnailDone {
    cache_path: PathBuf,
    result: Result<DecodedImage>,
}

/// Small previews persisted on disk, generated on a single background
/// worker. Results are delivered by [`poll`](Self::poll).
pub struct ThumbnailCache {
    dir: PathBuf,
    pending: HashMap<PathBuf, ThumbnailCallback>,
    job_tx: Sender<ThumbnailJob>,
    done_rx: Receiver<ThumbnailDone>,
    worker: Worker,
}

impl ThumbnailCache {
    pub fn start(dir: impl Into<PathBuf>, height: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let height = height.max(1);

        let (job_tx, job_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker::spawn("thumbnail", move |running| {
            run_worker(job_rx, done_tx, height, running)
        })?;

        Ok(Self {
            dir,
            pending: HashMap::new(),
            job_tx,
            done_rx,
            worker,
        })
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the thumbnail for `image_path` lives: the SHA-256 of the
    /// absolute source path, hex encoded.
    pub fn cache_path(&self, image_path: &Path) -> PathBuf {
        let absolute = path::absolute(image_path).unwrap_or_else(|_| image_path.to_path_buf());
        let mut hasher = Sha256::new();
        hasher.update(absolute.as_os_str().as_encoded_bytes());
        self.dir.join(format!("{:x}.png", hasher.finalize()))
    }

    /// Deliver the thumbnail of `image_path` to `callback`: right away if it
    /// is already on disk, otherwise from [`poll`](Self::poll) once built.
    /// A later request for the same path replaces an earlier waiting one.
    pub fn get_thumbnail<F>(&mut self, image_path: &Path, callback: F)
    where
        F: FnOnce(Arc<DecodedImage>) + 'static,
    {
        let cache_path = self.cache_path(image_path);

        if cache_path.is_file() {
            match load_thumbnail(&cache_path) {
                Ok(thumb) => {
                    if self.pending.remove(&cache_path).is_some() {
                        log::debug!("Dropped older thumbnail request for {}", image_path.display());
                    }
                    callback(Arc::new(thumb));
                    return;
                }
                Err(e) => log::warn!("Rebuilding unreadable thumbnail: {}", e),
            }
        }

        let outstanding = self
            .pending
            .insert(cache_path.clone(), Box::new(callback))
            .is_some();
        if outstanding {
            log::debug!("Replaced thumbnail request for {}", image_path.display());
            return;
        }

        let job = ThumbnailJob {
            source: image_path.to_path_buf(),
            cache_path: cache_path.clone(),
        };
        if self.job_tx.send(job).is_err() {
            log::warn!("Thumbnail worker is gone; cannot build {}", image_path.display());
            self.pending.remove(&cache_path);
        }
    }

    /// Deliver every finished thumbnail. Returns how many results were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(done) = self.done_rx.try_recv() {
            self.on_done(done);
            handled += 1;
        }
        handled
    }

    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        match self.done_rx.recv_timeout(timeout) {
            Ok(done) => {
                self.on_done(done);
                1 + self.poll()
            }
            Err(_) => 0,
        }
    }

    fn on_done(&mut self, done: ThumbnailDone) {
        let callback = self.pending.remove(&done.cache_path);
        match (done.result, callback) {
            (Ok(thumb), Some(callback)) => callback(Arc::new(thumb)),
            (Ok(_), None) => {
                log::debug!("No one waiting for {}", done.cache_path.display())
            }
            (Err(e), _) => log::warn!("Thumbnail failed: {}", e),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn load_thumbnail(path: &Path) -> Result<DecodedImage> {
    let file_size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
    let img = image::open(path).map_err(|e| Error::image(path, e))?;
    Ok(DecodedImage::from_dynamic(&img, file_size, "PNG".to_string()))
}

/// Downsize `source` to `height` (never upscaling) and write it as PNG to
/// `cache_path`. The file appears atomically.
pub fn build_thumbnail(source: &Path, cache_path: &Path, height: u32) -> Result<DecodedImage> {
    let img = decode::open_image(source)?;
    let thumb = if img.height() > height {
        img.resize(u32::MAX, height, FilterType::Triangle)
    } else {
        img
    };
    // PNG takes 8 or 16 bit samples only; HDR and EXR decode to floats.
    let thumb = DynamicImage::ImageRgba8(thumb.to_rgba8());

    let tmp = cache_path.with_extension("png.tmp");
    thumb
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|e| Error::image(&tmp, e))?;
    fs::rename(&tmp, cache_path).map_err(|e| Error::io(cache_path, e))?;

    let file_size = fs::metadata(cache_path).map(|m| m.len()).unwrap_or(0);
    Ok(DecodedImage::from_dynamic(&thumb, file_size, "PNG".to_string()))
}

fn run_worker(
    jobs: Receiver<ThumbnailJob>,
    done: Sender<ThumbnailDone>,
    height: u32,
    running: Arc<AtomicBool>,
) {
    while let Some(job) = recv_job(&jobs, &running) {
        log::debug!("Building thumbnail for {}", job.source.display());
        let result = catch_decode_panic(&job.source, || {
            build_thumbnail(&job.source, &job.cache_path, height)
        });
        let msg = ThumbnailDone {
            cache_path: job.cache_path,
            result,
        };
        if done.send(msg).is_err() {
            break;
        }
    }
}
