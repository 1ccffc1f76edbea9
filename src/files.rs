use std::fs;
use std::io;
use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "pam", "dds", "hdr", "exr", "ff", "qoi",
];

pub const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "raf", "pef", "srw",
    "erf", "kdc", "mrw", "3fr",
];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn is_standard_image(path: &Path) -> bool {
    extension(path)
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

pub fn is_raw_image(path: &Path) -> bool {
    extension(path)
        .map(|e| RAW_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

pub fn is_image_file(path: &Path) -> bool {
    is_standard_image(path) || is_raw_image(path)
}

/// Sorted names of the supported image files directly inside `dir`.
pub fn list_images(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let Ok(ft) = entry.file_type() else { continue };
        let p = entry.path();
        // Symlinks are followed here; a dangling one fails is_file().
        if !(ft.is_file() || (ft.is_symlink() && p.is_file())) {
            continue;
        }
        if !is_image_file(&p) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        } else {
            log::debug!("Skipping non UTF-8 file name {:?}", entry.file_name());
        }
    }

    names.sort();
    log::info!("Listed {:?}: {} images", dir, names.len());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_image_file(Path::new("a/B.JPG")));
        assert!(is_image_file(Path::new("photo.Nef")));
        assert!(is_raw_image(Path::new("photo.dng")));
        assert!(!is_raw_image(Path::new("photo.png")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn list_images_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["c.jpg", "a.png", "readme.md", "b.NEF"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let names = list_images(dir.path()).unwrap();
        assert_eq!(names, vec!["a.png", "b.NEF", "c.jpg"]);
    }

    #[test]
    fn list_images_missing_dir_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_images(&dir.path().join("gone")).is_err());
    }
}
