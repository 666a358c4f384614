//! Extraction of image archives (CBZ/ZIP, RAR) into private temp directories.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use zip::ZipArchive;

use crate::error::ExtractError;
use crate::files::{extension_of, is_image_file, natural_sort};

/// Result of extracting an archive: the private directory holding the pages
/// and the naturally ordered page paths inside it.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub dir: PathBuf,
    pub paths: Vec<PathBuf>,
}

/// Service that unpacks archives for the archive adapter and later removes
/// what it unpacked.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path) -> Result<Extracted, ExtractError>;
    fn delete(&self, dir: &Path) -> Result<(), ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    pub fn of(path: &Path) -> Option<Self> {
        match extension_of(path)?.as_str() {
            "zip" | "cbz" => Some(ArchiveFormat::Zip),
            "rar" | "cbr" => Some(ArchiveFormat::Rar),
            _ => None,
        }
    }
}

/// Extracts ZIP archives in-process and RAR archives through a `7z`
/// executable on `PATH`. Every extraction gets its own directory under
/// `root`, and only directories under `root` are ever deleted.
#[derive(Debug, Clone)]
pub struct SystemExtractor {
    root: PathBuf,
}

impl Default for SystemExtractor {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("leaf"))
    }
}

impl SystemExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fresh_dir(&self, prefix: &str) -> Result<PathBuf, ExtractError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = self
            .root
            .join(format!("{prefix}{}-{nanos:x}", std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn extract_zip(&self, archive: &Path, dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        let mut paths = Vec::new();

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            // Entries with absolute or `..` paths are skipped.
            let Some(name) = entry.enclosed_name().map(Path::to_path_buf) else {
                log::warn!("skipping unsafe archive entry {:?}", entry.name());
                continue;
            };
            if !is_image_file(&name) {
                continue;
            }
            let out_path = dir.join(&name);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;
            paths.push(out_path);
        }
        Ok(paths)
    }

    fn extract_rar(&self, archive: &Path, dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let exe = find_7z().ok_or(ExtractError::MissingTool)?;
        let out = Command::new(&exe)
            .arg("x")
            .arg(archive)
            .arg(format!("-o{}", dir.display()))
            .arg("-y")
            .output()?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ExtractError::ToolFailed(stderr.trim().to_string()));
        }
        let mut paths = Vec::new();
        walk_images(dir, &mut paths)?;
        Ok(paths)
    }
}

impl ArchiveExtractor for SystemExtractor {
    fn extract(&self, archive: &Path) -> Result<Extracted, ExtractError> {
        if !archive.is_file() {
            return Err(ExtractError::NotFound(archive.to_path_buf()));
        }
        let format = ArchiveFormat::of(archive).ok_or_else(|| {
            ExtractError::UnsupportedFormat(archive.display().to_string())
        })?;

        let dir = self.fresh_dir(match format {
            ArchiveFormat::Zip => "",
            ArchiveFormat::Rar => "rar_",
        })?;
        let result = match format {
            ArchiveFormat::Zip => self.extract_zip(archive, &dir),
            ArchiveFormat::Rar => self.extract_rar(archive, &dir),
        };

        let mut paths = match result {
            Ok(paths) if !paths.is_empty() => paths,
            Ok(_) => {
                discard_dir(&dir);
                return Err(ExtractError::NoImages(archive.to_path_buf()));
            }
            Err(e) => {
                discard_dir(&dir);
                return Err(e);
            }
        };
        natural_sort(&mut paths);
        log::info!(
            "extracted {} pages from {} into {}",
            paths.len(),
            archive.display(),
            dir.display()
        );
        Ok(Extracted { dir, paths })
    }

    fn delete(&self, dir: &Path) -> Result<(), ExtractError> {
        if !dir.starts_with(&self.root) || dir == self.root {
            return Err(ExtractError::OutsideTempRoot(dir.to_path_buf()));
        }
        if dir.exists() {
            fs::remove_dir_all(dir)?;
            log::debug!("removed {}", dir.display());
        }
        Ok(())
    }
}

/// Remove a half-filled extraction directory. Failures are only logged so
/// the extraction error reaches the caller.
fn discard_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        log::warn!("failed to remove {}: {e}", dir.display());
    }
}

fn find_7z() -> Option<PathBuf> {
    let names: &[&str] = if cfg!(target_os = "windows") {
        &["7z.exe", "7za.exe"]
    } else {
        &["7z", "7za"]
    };
    names
        .iter()
        .find(|name| {
            Command::new(name)
                .arg("--help")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
        .map(PathBuf::from)
}

fn walk_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ExtractError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_images(&path, out)?;
        } else if path.is_file() && is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn zip_extraction_keeps_only_images_in_natural_order() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("vol.cbz");
        write_zip(
            &archive,
            &[
                ("p10.png", b"a"),
                ("ComicInfo.xml", b"<x/>"),
                ("p2.png", b"b"),
                ("p1.jpg", b"c"),
            ],
        );

        let extractor = SystemExtractor::new(scratch.path().join("tmp"));
        let extracted = extractor.extract(&archive).unwrap();
        let names: Vec<_> = extracted
            .paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["p1.jpg", "p2.png", "p10.png"]);
        assert!(extracted.dir.starts_with(extractor.root()));

        extractor.delete(&extracted.dir).unwrap();
        assert!(!extracted.dir.exists());
    }

    #[test]
    fn nested_chapters_extract_chapter_by_chapter() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("omnibus.cbz");
        write_zip(
            &archive,
            &[
                ("ch2/002.png", b"d"),
                ("ch1/002.png", b"b"),
                ("ch2/001.png", b"c"),
                ("ch1/001.png", b"a"),
            ],
        );

        let extractor = SystemExtractor::new(scratch.path().join("tmp"));
        let extracted = extractor.extract(&archive).unwrap();
        let names: Vec<_> = extracted
            .paths
            .iter()
            .map(|p| {
                p.strip_prefix(&extracted.dir)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect();
        assert_eq!(
            names,
            ["ch1/001.png", "ch1/002.png", "ch2/001.png", "ch2/002.png"]
        );
        extractor.delete(&extracted.dir).unwrap();
    }

    #[test]
    fn failed_extraction_cleanup_tolerates_a_missing_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let gone = scratch.path().join("never-created");
        discard_dir(&gone);
        assert!(!gone.exists());
    }

    #[test]
    fn archive_without_images_is_an_error_and_leaves_nothing_behind() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("empty.zip");
        write_zip(&archive, &[("notes.txt", b"hello")]);

        let extractor = SystemExtractor::new(scratch.path().join("tmp"));
        let err = extractor.extract(&archive).unwrap_err();
        assert!(matches!(err, ExtractError::NoImages(_)));
        let leftovers = fs::read_dir(extractor.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn delete_refuses_paths_outside_root() {
        let scratch = tempfile::tempdir().unwrap();
        let extractor = SystemExtractor::new(scratch.path().join("tmp"));
        let outside = scratch.path().join("keep");
        fs::create_dir_all(&outside).unwrap();
        assert!(matches!(
            extractor.delete(&outside),
            Err(ExtractError::OutsideTempRoot(_))
        ));
        assert!(outside.exists());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("book.7z");
        fs::write(&archive, b"x").unwrap();
        let extractor = SystemExtractor::new(scratch.path().join("tmp"));
        assert!(matches!(
            extractor.extract(&archive),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }
}
