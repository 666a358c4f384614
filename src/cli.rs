use std::path::PathBuf;

use clap::Parser;
use leaf::engine::EngineConfig;
use leaf::settings::{Direction, EpubTheme, Preset, ReaderSettings, ViewMode};

pub const HELP_KEYS: &str = "\
Key Bindings:
  Esc / q         : Quit
  Left / h        : Previous page (next when right-to-left)
  Right / l       : Next page (previous when right-to-left)
  Space / PgDn    : Next page
  Backspace / PgUp: Previous page
  Home / End      : First / last page
  Click edges     : Previous / next page
  v               : Cycle view (single, dual, scroll)
  d               : Toggle reading direction
  + / -           : Zoom in / out
  0               : Reset zoom
  ] / [           : Font size up / down (EPUB)
  t               : Cycle EPUB theme
  p               : Toggle pre-rendering
  f               : Toggle fullscreen
  i               : Toggle info overlay
  ?               : Toggle help overlay
  Wheel           : Scroll (scroll view) or turn pages
";

const LOW_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Parser)]
#[command(
    name = "leaf",
    version,
    about = "Reader for image folders, comic archives, PDF and EPUB",
    after_help = HELP_KEYS
)]
pub struct Cli {
    /// Document, image files or a folder of images
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Page to open at (restored progress). Ignored when out of range.
    #[arg(short, long)]
    pub page: Option<usize>,

    /// View mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ViewMode>,

    /// Read right to left
    #[arg(long)]
    pub rtl: bool,

    /// Zoom in percent (25-400)
    #[arg(short, long)]
    pub zoom: Option<u32>,

    /// EPUB font size in pixels (8-48)
    #[arg(long)]
    pub font_size: Option<u32>,

    /// EPUB colour theme
    #[arg(long, value_enum)]
    pub theme: Option<EpubTheme>,

    /// Apply a reading profile before the other flags
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Disable background pre-rendering and caching
    #[arg(long)]
    pub no_prerender: bool,

    /// Pages kept rendered on each side of the current one.
    /// Default: 3, or 1 on machines with less than 4 GiB of RAM.
    #[arg(short, long)]
    pub radius: Option<usize>,

    /// Aspect difference (0-1) at which a page of a pair is shown alone
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Recurse into subfolders of an image folder
    #[arg(long)]
    pub recursive: bool,

    /// Settings file (TOML). Read at start, written on exit from the viewer.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print format, title and page count, then exit
    #[arg(long)]
    pub info: bool,

    /// Render one page and write it to --out (PNG for images, text for EPUB)
    #[arg(long, value_name = "PAGE", requires = "out")]
    pub export: Option<usize>,

    /// Output file for --export
    #[arg(short, long, value_name = "FILE", requires = "export")]
    pub out: Option<PathBuf>,

    /// Print the dual-page layout chosen for every pair, then exit
    #[arg(long)]
    pub spreads: bool,

    /// Initial delay in ms before key-hold repeat begins (default: 500)
    #[arg(long, default_value = "500")]
    pub initial_delay: u64,

    /// Key-hold repeat interval in milliseconds for navigation (default: 60)
    #[arg(long, default_value = "60")]
    pub repeat_delay: u64,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.info || self.spreads || self.export.is_some()
    }

    /// Settings from the settings file (if it exists), with the preset and
    /// then individual flags layered on top.
    pub fn reader_settings(&self) -> anyhow::Result<ReaderSettings> {
        let mut settings = match &self.settings {
            Some(path) if path.exists() => ReaderSettings::load(path)?,
            _ => ReaderSettings::default(),
        };
        if let Some(preset) = self.preset {
            settings.apply_preset(preset);
        }
        if let Some(mode) = self.mode {
            settings.view_mode = mode;
        }
        if self.rtl {
            settings.direction = Direction::Rtl;
        }
        if let Some(zoom) = self.zoom {
            settings.zoom = zoom;
        }
        if let Some(size) = self.font_size {
            settings.font_size = size;
        }
        if let Some(theme) = self.theme {
            settings.epub_theme = theme;
        }
        if self.no_prerender {
            settings.prerender = false;
        }
        Ok(settings.normalized())
    }

    pub fn radius(&self) -> usize {
        self.radius.unwrap_or_else(default_radius)
    }
}

/// Cache radius for this machine: a narrower window when memory is short.
pub fn default_radius() -> usize {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total > 0 && total < LOW_MEMORY_BYTES {
        log::info!("{} MiB of RAM, using cache radius 1", total / (1024 * 1024));
        1
    } else {
        EngineConfig::DEFAULT_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("leaf").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_preset() {
        let cli = parse(&["book.cbz", "--preset", "manga", "--zoom", "900", "--mode", "scroll"]);
        let settings = cli.reader_settings().unwrap();
        assert_eq!(settings.direction, Direction::Rtl);
        assert_eq!(settings.view_mode, ViewMode::Scroll);
        assert_eq!(settings.zoom, 400);
    }

    #[test]
    fn settings_file_is_the_base_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.toml");
        std::fs::write(&path, "font_size = 20\nepub_theme = \"sepia\"\n").unwrap();
        let arg = path.to_string_lossy().into_owned();
        let cli = parse(&["a.epub", "--settings", &arg, "--no-prerender"]);
        let settings = cli.reader_settings().unwrap();
        assert_eq!(settings.font_size, 20);
        assert_eq!(settings.epub_theme, EpubTheme::Sepia);
        assert!(!settings.prerender);
    }

    #[test]
    fn export_needs_an_output() {
        assert!(Cli::try_parse_from(["leaf", "a.pdf", "--export", "3"]).is_err());
        let cli = parse(&["a.pdf", "--export", "3", "--out", "p3.png"]);
        assert!(cli.is_headless());
        assert_eq!(parse(&["a.pdf", "--radius", "5"]).radius(), 5);
    }
}
