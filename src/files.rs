use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LoadError;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "pam", "dds", "hdr", "exr", "ff", "qoi", "avif",
];

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn is_image_file(path: &Path) -> bool {
    extension_of(path)
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Numeric-aware ordering over whole paths, one component at a time, so
/// `page2` sorts before `page10` and `ch1/..` stays ahead of `ch2/..`.
/// A path sorts before any path it is a prefix of.
pub fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    let mut left = a.components();
    let mut right = b.components();
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => {
                let x = x.as_os_str().to_string_lossy();
                let y = y.as_os_str().to_string_lossy();
                match natord::compare_ignore_case(&x, &y) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => break,
        }
    }
    natord::compare(&a.to_string_lossy(), &b.to_string_lossy())
}

pub fn natural_sort(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(a, b));
}

/// Image files inside `dir`, optionally descending into subdirectories.
/// Each directory's files are naturally sorted and listed before its
/// subdirectories.
pub fn collect_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, LoadError> {
    let mut out = Vec::new();
    scan_dir(dir, recursive, &mut out)?;
    log::info!("found {} images under {}", out.len(), dir.display());
    Ok(out)
}

fn scan_dir(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let entries = fs::read_dir(dir).map_err(|e| LoadError::io(dir, e))?;
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(|e| e.ok()) {
        let p = entry.path();
        if p.is_file() && is_image_file(&p) {
            files.push(p);
        } else if recursive && p.is_dir() {
            subdirs.push(p);
        }
    }

    natural_sort(&mut files);
    out.extend(files);

    if recursive {
        natural_sort(&mut subdirs);
        for sub in subdirs {
            scan_dir(&sub, true, out)?;
        }
    }
    Ok(())
}
