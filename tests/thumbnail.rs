//! Integration tests for the on-disk thumbnail cache

mod helpers;

use std::time::{Duration, Instant};

use helpers::{write_png, Calls};
use picv::ThumbnailCache;
use tempfile::TempDir;

fn pump_until(cache: &mut ThumbnailCache, mut done: impl FnMut(&ThumbnailCache) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(cache) {
        if Instant::now() >= deadline {
            return false;
        }
        cache.poll_timeout(Duration::from_millis(10));
    }
    true
}

#[test]
fn miss_builds_then_hit_is_synchronous() {
    let dir = TempDir::new().unwrap();
    let src = write_png(dir.path(), "photo.png", [10, 200, 30]);
    let mut cache = ThumbnailCache::start(dir.path().join("thumbs"), 8).unwrap();

    let calls = Calls::default();
    let seen = calls.clone();
    cache.get_thumbnail(&src, move |thumb| {
        assert_eq!((thumb.width, thumb.height), (12, 8));
        seen.hit();
    });
    assert_eq!(calls.count(), 0);
    assert_eq!(cache.pending_len(), 1);

    assert!(pump_until(&mut cache, |_| calls.count() == 1));
    assert_eq!(cache.pending_len(), 0);
    assert!(cache.cache_path(&src).is_file());

    let again = Calls::default();
    let seen = again.clone();
    cache.get_thumbnail(&src, move |thumb| {
        assert_eq!(thumb.height, 8);
        seen.hit();
    });
    assert_eq!(again.count(), 1);
    assert_eq!(cache.pending_len(), 0);
}

#[test]
fn thumbnails_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let src = write_png(dir.path(), "photo.png", [1, 2, 3]);
    let thumbs = dir.path().join("thumbs");

    {
        let mut cache = ThumbnailCache::start(&thumbs, 8).unwrap();
        let calls = Calls::default();
        let seen = calls.clone();
        cache.get_thumbnail(&src, move |_| seen.hit());
        assert!(pump_until(&mut cache, |_| calls.count() == 1));
    }

    let mut cache = ThumbnailCache::start(&thumbs, 8).unwrap();
    let calls = Calls::default();
    let seen = calls.clone();
    cache.get_thumbnail(&src, move |_| seen.hit());
    assert_eq!(calls.count(), 1);
}

#[test]
fn second_request_before_completion_wins() {
    let dir = TempDir::new().unwrap();
    let src = write_png(dir.path(), "photo.png", [50, 60, 70]);
    let mut cache = ThumbnailCache::start(dir.path().join("thumbs"), 8).unwrap();

    let first = Calls::default();
    let second = Calls::default();
    let f = first.clone();
    let s = second.clone();
    cache.get_thumbnail(&src, move |_| f.hit());
    cache.get_thumbnail(&src, move |_| s.hit());

    assert!(pump_until(&mut cache, |c| c.pending_len() == 0));
    // Give a stray second completion time to show up.
    let until = Instant::now() + Duration::from_millis(200);
    while Instant::now() < until {
        cache.poll_timeout(Duration::from_millis(10));
    }
    assert_eq!(first.count(), 0);
    assert_eq!(second.count(), 1);
}

#[test]
fn failed_build_drops_the_request() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("broken.jpg");
    std::fs::write(&src, b"garbage").unwrap();
    let mut cache = ThumbnailCache::start(dir.path().join("thumbs"), 8).unwrap();

    let calls = Calls::default();
    let seen = calls.clone();
    cache.get_thumbnail(&src, move |_| seen.hit());

    assert!(pump_until(&mut cache, |c| c.pending_len() == 0));
    assert_eq!(calls.count(), 0);
    assert!(!cache.cache_path(&src).exists());
}

#[test]
fn distinct_sources_get_distinct_files() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("x_y")).unwrap();
    std::fs::create_dir_all(dir.path().join("x")).unwrap();
    let a = write_png(&dir.path().join("x_y"), "z.png", [0, 0, 0]);
    let b = write_png(&dir.path().join("x"), "y_z.png", [255, 255, 255]);
    let mut cache = ThumbnailCache::start(dir.path().join("thumbs"), 8).unwrap();

    assert_ne!(cache.cache_path(&a), cache.cache_path(&b));

    let calls = Calls::default();
    for src in [&a, &b] {
        let seen = calls.clone();
        cache.get_thumbnail(src, move |_| seen.hit());
    }
    assert!(pump_until(&mut cache, |_| calls.count() == 2));
}

#[test]
fn float_sources_get_thumbnails() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("sky.hdr");
    image::Rgb32FImage::from_pixel(40, 20, image::Rgb([0.2, 0.5, 1.0]))
        .save(&src)
        .unwrap();
    let mut cache = ThumbnailCache::start(dir.path().join("thumbs"), 8).unwrap();

    let calls = Calls::default();
    let seen = calls.clone();
    cache.get_thumbnail(&src, move |thumb| {
        assert_eq!((thumb.width, thumb.height), (16, 8));
        seen.hit();
    });
    assert!(pump_until(&mut cache, |_| calls.count() == 1));
    assert!(cache.cache_path(&src).is_file());
}
