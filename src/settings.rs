use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::surface::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Single,
    Dual,
    Scroll,
}

impl ViewMode {
    pub fn cycle(self) -> Self {
        match self {
            ViewMode::Single => ViewMode::Dual,
            ViewMode::Dual => ViewMode::Scroll,
            ViewMode::Scroll => ViewMode::Single,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EpubTheme {
    #[default]
    Light,
    Dark,
    Sepia,
    /// Follows the host's dark-mode preference.
    System,
}

impl EpubTheme {
    pub fn palette(self, prefers_dark: bool) -> Palette {
        match self {
            EpubTheme::Light => Palette {
                background: [0xff, 0xff, 0xff],
                foreground: [0x1a, 0x1a, 0x1a],
                link: [0x25, 0x63, 0xeb],
            },
            EpubTheme::Dark => Palette {
                background: [0x1a, 0x1a, 0x1a],
                foreground: [0xe0, 0xe0, 0xe0],
                link: [0x60, 0xa5, 0xfa],
            },
            EpubTheme::Sepia => Palette {
                background: [0xf4, 0xec, 0xd8],
                foreground: [0x5b, 0x46, 0x36],
                link: [0x8b, 0x45, 0x13],
            },
            EpubTheme::System if prefers_dark => EpubTheme::Dark.palette(false),
            EpubTheme::System => EpubTheme::Light.palette(false),
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            EpubTheme::Light => EpubTheme::Dark,
            EpubTheme::Dark => EpubTheme::Sepia,
            EpubTheme::Sepia => EpubTheme::System,
            EpubTheme::System => EpubTheme::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Book,
    Manga,
    Comic,
    Pdf,
}

pub const MIN_ZOOM: u32 = 25;
pub const MAX_ZOOM: u32 = 400;
pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 48;
pub const ZOOM_STEP: u32 = 10;
pub const FONT_STEP: u32 = 2;

/// User-facing reader settings, passed explicitly into the reader's
/// mutation entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub view_mode: ViewMode,
    pub direction: Direction,
    /// Percentage, 100 = fit.
    pub zoom: u32,
    /// Pixels.
    pub font_size: u32,
    pub epub_theme: EpubTheme,
    pub prerender: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::Single,
            direction: Direction::Ltr,
            zoom: 100,
            font_size: 16,
            epub_theme: EpubTheme::Light,
            prerender: true,
        }
    }
}

impl ReaderSettings {
    pub fn apply_preset(&mut self, preset: Preset) {
        let (view_mode, direction) = match preset {
            Preset::Book | Preset::Pdf => (ViewMode::Single, Direction::Ltr),
            Preset::Manga => (ViewMode::Dual, Direction::Rtl),
            Preset::Comic => (ViewMode::Dual, Direction::Ltr),
        };
        self.view_mode = view_mode;
        self.direction = direction;
        self.zoom = 100;
        self.font_size = 16;
    }

    pub fn with_preset(preset: Preset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    /// Clamp numeric fields into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.zoom = self.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom as f32 / 100.0
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: ReaderSettings = toml::from_str(&text)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(self).context("serializing settings")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, text).with_context(|| format!("writing settings to {}", path.display()))?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manga_preset_reads_right_to_left_in_pairs() {
        let settings = ReaderSettings::with_preset(Preset::Manga);
        assert_eq!(settings.view_mode, ViewMode::Dual);
        assert_eq!(settings.direction, Direction::Rtl);
        assert_eq!(settings.zoom, 100);
        assert_eq!(settings.font_size, 16);
    }

    #[test]
    fn preset_keeps_unrelated_fields() {
        let mut settings = ReaderSettings {
            epub_theme: EpubTheme::Sepia,
            prerender: false,
            zoom: 150,
            ..Default::default()
        };
        settings.apply_preset(Preset::Comic);
        assert_eq!(settings.epub_theme, EpubTheme::Sepia);
        assert!(!settings.prerender);
        assert_eq!(settings.zoom, 100);
    }

    #[test]
    fn settings_file_round_trip_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf").join("settings.toml");
        let settings = ReaderSettings {
            view_mode: ViewMode::Scroll,
            epub_theme: EpubTheme::Dark,
            font_size: 20,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(ReaderSettings::load(&path).unwrap(), settings);

        fs::write(&path, "direction = \"rtl\"\nzoom = 9000\n").unwrap();
        let partial = ReaderSettings::load(&path).unwrap();
        assert_eq!(partial.direction, Direction::Rtl);
        assert_eq!(partial.zoom, MAX_ZOOM);
        assert_eq!(partial.font_size, 16);
    }

    #[test]
    fn system_theme_follows_host_preference() {
        assert_eq!(
            EpubTheme::System.palette(true),
            EpubTheme::Dark.palette(false)
        );
        assert_eq!(
            EpubTheme::System.palette(false),
            EpubTheme::Light.palette(false)
        );
    }
}
