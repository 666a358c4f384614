mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use leaf::adapter::{AdapterConfig, Services};
use leaf::engine::EngineConfig;
use leaf::surface::{PageContent, RenderTarget, Surface};
use leaf::Reader;
use winit::event_loop::EventLoop;

use crate::cli::Cli;
use crate::ui::App;
use crate::ui::state::ViewerState;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = cli.reader_settings()?;
    let config = AdapterConfig {
        engine: EngineConfig::with_radius(cli.radius()),
        recursive: cli.recursive,
        ..AdapterConfig::default()
    };
    let mut reader = Reader::with_services(Services::default(), config, settings);
    if let Some(threshold) = cli.threshold {
        reader = reader.with_spread_threshold(threshold);
    }

    let opened = reader.open(cli.paths.clone(), cli.page);
    if cli.is_headless() {
        opened.with_context(|| format!("could not open {}", describe(&cli.paths)))?;
        return run_headless(&cli, &mut reader);
    }
    if let Err(e) = opened {
        // The viewer still starts and shows the error.
        log::error!("could not open {}: {e}", describe(&cli.paths));
    }

    let initial_delay = cli.initial_delay as f64 / 1000.0;
    let repeat_delay = cli.repeat_delay as f64 / 1000.0;
    let state = ViewerState::new(reader, cli.settings.clone(), initial_delay, repeat_delay);
    let mut app = App::new(state);

    let event_loop = EventLoop::new().context("create event loop")?;
    event_loop.run_app(&mut app).context("run event loop")?;
    Ok(())
}

fn describe(paths: &[std::path::PathBuf]) -> String {
    match paths {
        [one] => one.display().to_string(),
        many => format!("{} files", many.len()),
    }
}

// ---------------------------------------------------------------------------
// Headless commands
// ---------------------------------------------------------------------------

fn run_headless(cli: &Cli, reader: &mut Reader) -> anyhow::Result<()> {
    if cli.info {
        print_info(reader);
    }
    if let (Some(page), Some(out)) = (cli.export, cli.out.as_deref()) {
        export_page(reader, page, out)?;
    }
    if cli.spreads {
        print_spreads(reader)?;
    }
    Ok(())
}

fn print_info(reader: &Reader) {
    let kind = reader.kind().map_or_else(|| "-".to_string(), |k| k.to_string());
    println!("format: {kind}");
    println!("title:  {}", reader.title().unwrap_or("-"));
    println!("pages:  {}", reader.total_pages());
    if let Some(ratio) = reader.aspect_ratio(reader.current_page()) {
        println!("aspect: {ratio:.3} (page {})", reader.current_page());
    }
}

fn export_page(reader: &mut Reader, page: usize, out: &Path) -> anyhow::Result<()> {
    let total = reader.total_pages();
    if !(1..=total).contains(&page) {
        bail!("page {page} is outside 1..={total}");
    }
    reader.go_to(page);

    let target: Arc<dyn RenderTarget> = Arc::new(Surface::new());
    let rendered = reader
        .render_single(&target)
        .with_context(|| format!("render page {page}"))?;

    match &rendered.content {
        PageContent::Raster(img) => img
            .save(out)
            .with_context(|| format!("write {}", out.display()))?,
        PageContent::Text(text) => {
            let body = format!("{}\n\n{}\n", text.chapter_title, text.text);
            std::fs::write(out, body).with_context(|| format!("write {}", out.display()))?;
        }
    }
    println!(
        "page {page}: {}x{} -> {}",
        rendered.width,
        rendered.height,
        out.display()
    );
    Ok(())
}

fn print_spreads(reader: &mut Reader) -> anyhow::Result<()> {
    for (pair, mode) in reader.survey_spreads()? {
        let pages = match pair.second {
            Some(second) => format!("{}-{}", pair.first, second),
            None => pair.first.to_string(),
        };
        println!("{pages:>9}  {mode:?}");
    }
    Ok(())
}
