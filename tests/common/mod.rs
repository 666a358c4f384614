//! Fixture documents built on the fly in temp directories.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use leaf::archive::SystemExtractor;
use leaf::{RenderTarget, Services, Surface};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Write one PNG per size, named so that plain string order differs from
/// natural order.
pub fn write_pages(dir: &Path, sizes: &[(u32, u32)]) -> Vec<PathBuf> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &(w, h))| {
            let path = dir.join(format!("p{}.png", i + 1));
            png(w, h).save(&path).unwrap();
            path
        })
        .collect()
}

pub fn png(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([200, 180, 160, 255]))
}

/// A comic archive holding `sizes` as `001.png`, `002.png`, ... plus a
/// stray text file that must be ignored.
pub fn write_cbz(path: &Path, sizes: &[(u32, u32)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (i, &(w, h)) in sizes.iter().enumerate() {
        let mut bytes = Vec::new();
        png(w, h)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        zip.start_file(format!("pages/{:03}.png", i + 1), options).unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.start_file("ComicInfo.txt", options).unwrap();
    zip.write_all(b"credits").unwrap();
    zip.finish().unwrap();
}

/// Space separated words `w0000 w0001 ...` starting at `from`.
pub fn words(from: usize, n: usize) -> String {
    (from..from + n)
        .map(|i| format!("w{i:04}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A minimal EPUB 3 with one XHTML document per chapter.
pub fn write_epub(path: &Path, title: &str, chapters: &[String]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("mimetype", options).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    )
    .unwrap();

    let manifest: String = (1..=chapters.len())
        .map(|i| {
            format!(r#"<item id="ch{i}" href="ch{i}.xhtml" media-type="application/xhtml+xml"/>"#)
        })
        .collect();
    let spine: String = (1..=chapters.len())
        .map(|i| format!(r#"<itemref idref="ch{i}"/>"#))
        .collect();
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">leaf-fixture</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
    );
    zip.start_file("OEBPS/content.opf", options).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();

    for (i, body) in chapters.iter().enumerate() {
        let n = i + 1;
        let xhtml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter {n}</title></head>
<body><p>{body}</p></body>
</html>"#
        );
        zip.start_file(format!("OEBPS/ch{n}.xhtml"), options).unwrap();
        zip.write_all(xhtml.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Services whose archive extractor unpacks under `root`.
pub fn services(root: &Path) -> Services {
    Services {
        extractor: Arc::new(SystemExtractor::new(root)),
        ..Services::default()
    }
}

pub fn target() -> (Surface, Arc<dyn RenderTarget>) {
    let surface = Surface::new();
    let target: Arc<dyn RenderTarget> = Arc::new(surface.clone());
    (surface, target)
}
