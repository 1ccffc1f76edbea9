mod cli;

use clap::Parser;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use picv::decode::default_decoder;
use picv::{Config, DecodedImage, LastOpened, Metadata, PrefetchCache, ThumbnailCache, Viewer};

use crate::cli::Cli;

/// Longest the foreground blocks waiting for worker events in one tick.
const TICK: Duration = Duration::from_millis(20);

/// The last image delivered to the display, tagged with its filename.
type Shown = Rc<RefCell<Option<(String, Arc<DecodedImage>, Metadata)>>>;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> picv::Result<()> {
    let config = cli.config();
    let marker = LastOpened::new(config.marker_path()?);
    let Some(target) = cli.path.clone().or_else(|| marker.load()) else {
        log::error!("No path given and nothing opened before.");
        return Ok(());
    };

    let cache = PrefetchCache::start(default_decoder(), config.pending_policy)?;
    let mut viewer = Viewer::new(cache, config.radius, Some(marker));
    let timeout = Duration::from_secs(cli.timeout);
    let shown: Shown = Rc::new(RefCell::new(None));

    if target.is_dir() {
        if viewer.open_dir(&target)? == 0 {
            log::error!("No image files found.");
            return Ok(());
        }
        let name = viewer.files()[0].clone();
        viewer.select(&name, store_into(&shown, &name));
    } else if !viewer.open_file(&target, store_into(&shown, &file_name(&target)))? {
        log::error!("{} is not a supported image", target.display());
        return Ok(());
    }

    let first = viewer.selected().unwrap_or_default().to_string();
    show(&mut viewer, &first, &shown, timeout);

    if cli.walk {
        let start = viewer.index_of(&first).unwrap_or(0);
        for idx in start + 1..viewer.files().len() {
            let name = viewer.files()[idx].clone();
            viewer.select(&name, store_into(&shown, &name));
            show(&mut viewer, &name, &shown, timeout);
        }
    }

    if cli.thumbnails {
        build_thumbnails(&viewer, &config, timeout)?;
    }

    log::info!("{:?}", viewer.cache().stats());
    Ok(())
}

fn store_into(shown: &Shown, name: &str) -> impl FnOnce(Arc<DecodedImage>, Metadata) + 'static {
    let shown = Rc::clone(shown);
    let name = name.to_string();
    move |img, meta| *shown.borrow_mut() = Some((name, img, meta))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Run foreground ticks until `name` is delivered, fails or times out.
fn show(viewer: &mut Viewer, name: &str, shown: &Shown, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let delivered = shown.borrow_mut().take();
        if let Some((shown_name, img, meta)) = delivered {
            if shown_name == name {
                print_info(viewer, name, &img, &meta);
                return;
            }
            log::debug!("Ignoring late delivery of {}", shown_name);
        }
        if let Some(err) = viewer.cache().failure(name) {
            println!("Could not load: {}", err);
            return;
        }
        if Instant::now() >= deadline {
            println!("Could not load: {} (timed out)", name);
            return;
        }
        viewer.poll_timeout(TICK);
    }
}

fn print_info(viewer: &Viewer, name: &str, img: &DecodedImage, meta: &Metadata) {
    let idx = viewer.index_of(name).map(|i| i + 1).unwrap_or(0);
    let cache = viewer.cache();
    println!(
        "[{}/{}] {} {}x{} {} {} | cache: {} images, {:.0} MB",
        idx,
        viewer.files().len(),
        name,
        img.width,
        img.height,
        img.format_name,
        meta.summary(),
        cache.cached_len(),
        cache.used_bytes() as f64 / (1024.0 * 1024.0),
    );
}

fn build_thumbnails(viewer: &Viewer, config: &Config, timeout: Duration) -> picv::Result<()> {
    let Some(dir) = viewer.dir() else {
        return Ok(());
    };
    let mut thumbs = ThumbnailCache::start(config.thumbnail_dir()?, config.thumbnail_height)?;
    let built = Rc::new(Cell::new(0usize));

    for name in viewer.files() {
        let built = Rc::clone(&built);
        let label = name.clone();
        thumbs.get_thumbnail(&dir.join(name), move |thumb| {
            println!("thumbnail {} {}x{}", label, thumb.width, thumb.height);
            built.set(built.get() + 1);
        });
    }

    let deadline = Instant::now() + timeout;
    while thumbs.pending_len() > 0 && Instant::now() < deadline {
        thumbs.poll_timeout(TICK);
    }

    log::info!(
        "{} of {} thumbnails ready in {}",
        built.get(),
        viewer.files().len(),
        thumbs.dir().display()
    );
    if thumbs.pending_len() > 0 {
        log::warn!("{} thumbnails still pending", thumbs.pending_len());
    }
    Ok(())
}
