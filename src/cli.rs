use clap::Parser;
use std::path::PathBuf;

use picv::config::DEFAULT_RADIUS;
use picv::thumbnail::DEFAULT_THUMBNAIL_HEIGHT;
use picv::{Config, PendingPolicy};

pub const HELP_NOTES: &str = "\
Without PATH the last opened file is shown again.
Set RUST_LOG=debug to watch the cache enqueue, skip and evict files.
";

#[derive(Parser)]
#[command(name = "picv", about = "A picture viewer with background prefetching", after_help = HELP_NOTES)]
pub struct Cli {
    /// Image file or image directory
    pub path: Option<PathBuf>,

    /// Images kept decoded on each side of the selection
    #[arg(short, long, default_value_t = DEFAULT_RADIUS)]
    pub radius: usize,

    /// Directory for thumbnails and the last-opened marker (default: user cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Thumbnail height in pixels
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_HEIGHT)]
    pub thumbnail_height: u32,

    /// Keep every unresolved display request instead of only the newest
    #[arg(long)]
    pub queue_pending: bool,

    /// Step through the rest of the directory after the first image
    #[arg(short, long)]
    pub walk: bool,

    /// Build thumbnails for every image in the directory
    #[arg(short, long)]
    pub thumbnails: bool,

    /// Seconds to wait for one image before giving up (default: 30)
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            radius: self.radius,
            cache_dir: self.cache_dir.clone(),
            thumbnail_height: self.thumbnail_height,
            pending_policy: if self.queue_pending {
                PendingPolicy::Queue
            } else {
                PendingPolicy::Replace
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_to_config() {
        let cli = Cli::parse_from(["picv", "photos"]);
        let config = cli.config();
        assert_eq!(cli.path, Some(PathBuf::from("photos")));
        assert_eq!(config.radius, DEFAULT_RADIUS);
        assert_eq!(config.pending_policy, PendingPolicy::Replace);
        assert_eq!(cli.timeout, 30);
    }

    #[test]
    fn flags_map_to_config() {
        let cli = Cli::parse_from([
            "picv",
            "--radius",
            "3",
            "--queue-pending",
            "--cache-dir",
            "/tmp/c",
            "--thumbnail-height",
            "64",
        ]);
        let config = cli.config();
        assert_eq!(cli.path, None);
        assert_eq!(config.radius, 3);
        assert_eq!(config.thumbnail_height, 64);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(config.pending_policy, PendingPolicy::Queue);
    }
}
