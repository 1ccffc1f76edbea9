//! Background image prefetching for a directory-based image viewer.
//!
//! [`PrefetchCache`] keeps a window of decoded images around the selection,
//! [`ThumbnailCache`] keeps small previews on disk, and [`Viewer`] wires both
//! to a directory listing the way a UI would.

pub mod config;
pub mod decode;
pub mod error;
pub mod files;
pub mod marker;
pub mod prefetch;
pub mod thumbnail;
pub mod viewer;
pub mod window;
pub mod worker;

pub use config::Config;
pub use decode::{DecodedImage, ExposureTime, Metadata};
pub use error::{Error, Result};
pub use marker::LastOpened;
pub use prefetch::{CacheStats, PendingPolicy, PrefetchCache};
pub use thumbnail::ThumbnailCache;
pub use viewer::Viewer;
pub use window::compute_window;
