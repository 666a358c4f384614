use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leaf::adapter::AdapterKind;
use leaf::layout::{DisplayMode, Slide};
use leaf::reader::{Reader, Status};
use leaf::settings::{Direction, FONT_STEP, ReaderSettings, ViewMode, ZOOM_STEP};
use leaf::surface::{Flow, PageContent, RenderTarget, RenderedPage, Surface, TextPage};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window};

use crate::cli::HELP_KEYS;
use crate::ui::render::{ADVANCE, BG_COLOR, Frame, GLYPH_H, Rect, fit_scale, wrap_text};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const SLIDE_TIME: Duration = Duration::from_millis(180);
const SLIDE_DISTANCE: f32 = 48.0;
const WHEEL_PIXELS: f32 = 60.0;
/// Share of the window width on each side that turns pages when clicked.
const TAP_ZONE: f64 = 0.25;
const TEXT_MARGIN: f32 = 32.0;

/// A page slot: the surface the reader renders into, plus the handle it is
/// given as a render target.
struct Slot {
    surface: Surface,
    target: Arc<dyn RenderTarget>,
}

impl Slot {
    fn new() -> Self {
        let surface = Surface::new();
        let target: Arc<dyn RenderTarget> = Arc::new(surface.clone());
        Self { surface, target }
    }

    fn page(&self) -> Option<RenderedPage> {
        self.surface.page()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum View {
    Nothing,
    Single,
    Spread {
        mode: DisplayMode,
        show_left: bool,
        show_right: bool,
        has_left: bool,
        has_right: bool,
    },
    Scroll,
}

#[derive(Clone, Copy)]
enum Align {
    Center,
    /// Hug the spine: push the page against the right edge of its box.
    End,
    Start,
}

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

pub struct ViewerState {
    pub reader: Reader,
    settings_path: Option<PathBuf>,
    main: Slot,
    left: Slot,
    right: Slot,
    scroll_slots: HashMap<usize, Slot>,
    view: View,
    dirty: bool,
    size: (u32, u32),
    pub error_message: Option<String>,
    text_scroll: f32,
    text_extent: f32,
    slide: Option<(Slide, Instant)>,

    pub show_info: bool,
    pub show_help: bool,
    pub is_fullscreen: bool,
    pub mouse_pos: (f64, f64),
    pub clicked: bool,

    // Key-hold repeat state
    pub initial_delay: f64,
    pub repeat_delay: f64,
    pub nav_hold_timer: f64,
    pub nav_past_initial: bool,
    pub last_frame: Instant,

    pub keys_down: HashSet<NamedKey>,
    pub chars_down: HashSet<char>,
    pub keys_pressed: HashSet<NamedKey>,
    pub chars_pressed: HashSet<char>,
    pub wheel_y: f32,
}

impl ViewerState {
    pub fn new(
        reader: Reader,
        settings_path: Option<PathBuf>,
        initial_delay: f64,
        repeat_delay: f64,
    ) -> Self {
        Self {
            reader,
            settings_path,
            main: Slot::new(),
            left: Slot::new(),
            right: Slot::new(),
            scroll_slots: HashMap::new(),
            view: View::Nothing,
            dirty: true,
            size: (0, 0),
            error_message: None,
            text_scroll: 0.0,
            text_extent: 0.0,
            slide: None,
            show_info: false,
            show_help: false,
            is_fullscreen: false,
            mouse_pos: (0.0, 0.0),
            clicked: false,
            initial_delay,
            repeat_delay,
            nav_hold_timer: 0.0,
            nav_past_initial: false,
            last_frame: Instant::now(),
            keys_down: HashSet::new(),
            chars_down: HashSet::new(),
            keys_pressed: HashSet::new(),
            chars_pressed: HashSet::new(),
            wheel_y: 0.0,
        }
    }

    pub fn window_title(&self) -> String {
        match self.reader.title() {
            Some(title) => format!("{title} - leaf"),
            None => "leaf".to_string(),
        }
    }

    /// Record a key transition. Characters are folded to lower case and
    /// auto-repeat events only count as held keys.
    pub fn on_key(&mut self, key: &Key, pressed: bool, repeat: bool) {
        match key {
            Key::Named(named) if pressed => {
                if !repeat {
                    self.keys_pressed.insert(*named);
                }
                self.keys_down.insert(*named);
            }
            Key::Named(named) => {
                self.keys_down.remove(named);
            }
            Key::Character(s) => {
                let Some(c) = s.chars().next().map(|c| c.to_ascii_lowercase()) else {
                    return;
                };
                if !pressed {
                    self.chars_down.remove(&c);
                    return;
                }
                if !repeat {
                    self.chars_pressed.insert(c);
                }
                self.chars_down.insert(c);
            }
            _ => {}
        }
    }

    pub fn is_key_pressed_named(&self, k: NamedKey) -> bool {
        self.keys_pressed.contains(&k)
    }

    pub fn is_char_pressed(&self, c: char) -> bool {
        self.chars_pressed.contains(&c)
    }

    pub fn is_key_down_named(&self, k: NamedKey) -> bool {
        self.keys_down.contains(&k)
    }

    pub fn is_char_down(&self, c: char) -> bool {
        self.chars_down.contains(&c)
    }

    pub fn nav_keys_held(&self) -> bool {
        [
            NamedKey::ArrowRight,
            NamedKey::ArrowLeft,
            NamedKey::Space,
            NamedKey::PageDown,
            NamedKey::PageUp,
        ]
        .iter()
        .any(|k| self.is_key_down_named(*k))
            || self.is_char_down('l')
            || self.is_char_down('h')
    }

    /// Still inside a page slide animation.
    pub fn animating(&self) -> bool {
        self.slide
            .is_some_and(|(_, started)| started.elapsed() < SLIDE_TIME)
    }

    /// Write the current settings back to the settings file, if one was
    /// given.
    pub fn save_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.reader.settings().save(path) {
                log::error!("could not save settings: {e:#}");
            }
        }
    }

    fn scroll_view(&self) -> bool {
        self.reader.view_mode() == ViewMode::Scroll
    }

    fn text_scroll_view(&self) -> bool {
        self.scroll_view() && self.reader.kind() == Some(AdapterKind::Epub)
    }

    /// Run the per-frame logic: input handling and re-rendering.
    /// Returns true if the app should quit.
    pub fn update(&mut self, window: &Window) -> bool {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;

        // ------------------------------------------------------------------
        // Quit
        // ------------------------------------------------------------------
        if self.is_key_pressed_named(NamedKey::Escape) || self.is_char_pressed('q') {
            self.save_settings();
            return true;
        }

        // ------------------------------------------------------------------
        // Navigation
        // ------------------------------------------------------------------
        let rtl = self.reader.settings().direction == Direction::Rtl && !self.scroll_view();
        let (right_key, left_key) = if rtl { (-1, 1) } else { (1, -1) };

        let step_of = |down: &dyn Fn(NamedKey) -> bool, ch: &dyn Fn(char) -> bool| -> i32 {
            if down(NamedKey::ArrowRight) || ch('l') {
                right_key
            } else if down(NamedKey::ArrowLeft) || ch('h') {
                left_key
            } else if down(NamedKey::Space) || down(NamedKey::PageDown) {
                1
            } else if down(NamedKey::PageUp) || down(NamedKey::Backspace) {
                -1
            } else {
                0
            }
        };
        let pressed = step_of(&|k: NamedKey| self.is_key_pressed_named(k), &|c: char| self.is_char_pressed(c));
        let held = step_of(&|k: NamedKey| self.is_key_down_named(k), &|c: char| self.is_char_down(c));

        let mut nav = 0i32;
        if pressed != 0 {
            nav = pressed;
            self.nav_hold_timer = 0.0;
            self.nav_past_initial = false;
        } else if held != 0 {
            self.nav_hold_timer += dt;
            if !self.nav_past_initial {
                if self.nav_hold_timer >= self.initial_delay {
                    nav = held;
                    self.nav_hold_timer = 0.0;
                    self.nav_past_initial = true;
                }
            } else if self.nav_hold_timer >= self.repeat_delay {
                nav = held;
                self.nav_hold_timer -= self.repeat_delay;
            }
        } else {
            self.nav_hold_timer = 0.0;
            self.nav_past_initial = false;
        }

        // Clicks on the outer quarters turn pages, mirrored for right-to-left.
        if self.clicked && !self.scroll_view() {
            let width = window.inner_size().width.max(1) as f64;
            let pct = self.mouse_pos.0 / width;
            if pct < TAP_ZONE {
                nav = left_key;
            } else if pct > 1.0 - TAP_ZONE {
                nav = right_key;
            }
        }

        let wheel = self.wheel_y;
        if wheel.abs() > 0.1 {
            if self.text_scroll_view() {
                let max = (self.text_extent - self.size.1 as f32).max(0.0);
                self.text_scroll = (self.text_scroll - wheel * WHEEL_PIXELS).clamp(0.0, max);
            } else if self.scroll_view() {
                if let Some(page) = self.reader.scroll_by(-wheel * WHEEL_PIXELS) {
                    log::debug!("[scroll] now on page {page}");
                }
                self.dirty = true;
            } else {
                nav = if wheel > 0.0 { -1 } else { 1 };
            }
        }

        let moved = match nav {
            n if n > 0 => self.reader.next(),
            n if n < 0 => self.reader.prev(),
            _ => false,
        };
        let jumped = if self.is_key_pressed_named(NamedKey::Home) {
            self.reader.go_to(1);
            true
        } else if self.is_key_pressed_named(NamedKey::End) {
            self.reader.go_to(self.reader.total_pages());
            true
        } else {
            false
        };
        if moved || jumped {
            log::debug!("[nav] page {}", self.reader.current_page());
            self.text_scroll = 0.0;
            self.dirty = true;
        }

        // ------------------------------------------------------------------
        // Settings
        // ------------------------------------------------------------------
        let mut next = self.reader.settings().clone();
        if self.is_char_pressed('v') {
            next.view_mode = next.view_mode.cycle();
        }
        if self.is_char_pressed('d') {
            next.direction = match next.direction {
                Direction::Ltr => Direction::Rtl,
                Direction::Rtl => Direction::Ltr,
            };
        }
        if self.is_char_pressed('=') || self.is_char_pressed('+') {
            next.zoom += ZOOM_STEP;
        }
        if self.is_char_pressed('-') {
            next.zoom = next.zoom.saturating_sub(ZOOM_STEP);
        }
        if self.is_char_pressed('0') {
            next.zoom = 100;
        }
        if self.is_char_pressed(']') {
            next.font_size += FONT_STEP;
        }
        if self.is_char_pressed('[') {
            next.font_size = next.font_size.saturating_sub(FONT_STEP);
        }
        if self.is_char_pressed('t') {
            next.epub_theme = next.epub_theme.cycle();
        }
        if self.is_char_pressed('p') {
            next.prerender = !next.prerender;
        }
        self.apply_settings(next);

        if self.is_char_pressed('i') {
            self.show_info = !self.show_info;
        }
        if self.is_char_pressed('?') {
            self.show_help = !self.show_help;
        }
        if self.is_char_pressed('f') {
            self.is_fullscreen = !self.is_fullscreen;
            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            } else {
                window.set_fullscreen(None);
            }
        }

        // ------------------------------------------------------------------
        // Render pages that changed
        // ------------------------------------------------------------------
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));
        if size != self.size {
            self.size = size;
            self.dirty = true;
        }
        if self.dirty {
            self.dirty = false;
            self.refresh();
        }

        // Clear per-frame input state
        self.keys_pressed.clear();
        self.chars_pressed.clear();
        self.wheel_y = 0.0;
        self.clicked = false;

        false
    }

    fn apply_settings(&mut self, next: ReaderSettings) {
        let next = next.normalized();
        if &next == self.reader.settings() {
            return;
        }
        let mode_changed = next.view_mode != self.reader.settings().view_mode;
        if let Err(e) = self.reader.apply_settings(next) {
            log::error!("applying settings failed: {e}");
            self.error_message = Some(e.to_string());
        }
        if mode_changed {
            self.scroll_slots.clear();
            self.text_scroll = 0.0;
        }
        self.dirty = true;
    }

    /// Render whatever the current view shows into the page slots.
    fn refresh(&mut self) {
        self.error_message = None;
        match self.reader.status() {
            Status::Ready => {}
            Status::Error(e) => {
                self.error_message = Some(e.clone());
                self.view = View::Nothing;
                return;
            }
            Status::Empty | Status::Loading => {
                self.view = View::Nothing;
                return;
            }
        }

        let result = match self.reader.view_mode() {
            ViewMode::Scroll if !self.text_scroll_view() => {
                self.refresh_scroll();
                Ok(View::Scroll)
            }
            ViewMode::Single | ViewMode::Scroll => self
                .reader
                .render_single(&self.main.target)
                .map(|_| View::Single),
            ViewMode::Dual => self
                .reader
                .render_spread(&self.left.target, &self.right.target)
                .map(|v| View::Spread {
                    mode: v.mode,
                    show_left: v.show_left,
                    show_right: v.show_right,
                    has_left: v.pair.left().is_some(),
                    has_right: v.pair.right().is_some(),
                }),
        };
        match result {
            Ok(view) => {
                self.view = view;
                self.slide = self.reader.slide().map(|s| (s, Instant::now()));
                self.text_extent = self.measure_text();
            }
            Err(e) => {
                log::error!("page {}: {e}", self.reader.current_page());
                self.error_message = Some(format!("Could not render: {e}"));
                self.view = View::Nothing;
            }
        }
    }

    fn refresh_scroll(&mut self) {
        let (w, h) = self.size;
        self.reader.layout_scroll(w as f32, h as f32);
        let pages: Vec<usize> = self
            .reader
            .scroll_layout()
            .visible_items()
            .iter()
            .map(|item| item.page)
            .collect();
        self.scroll_slots.retain(|page, _| pages.contains(page));

        // The current page goes last so the cache window centres on it.
        let current = self.reader.current_page();
        let mut order: Vec<usize> = pages.iter().copied().filter(|&p| p != current).collect();
        if pages.contains(&current) {
            order.push(current);
        }
        for page in order {
            let slot = self.scroll_slots.entry(page).or_insert_with(Slot::new);
            let target = Arc::clone(&slot.target);
            if let Err(e) = self.reader.render_page(&target, page) {
                log::debug!("scroll item {page}: {e}");
            }
        }
    }

    /// Height of the laid-out text of the main slot, for scroll limits.
    fn measure_text(&self) -> f32 {
        let Some(page) = self.main.page() else {
            return 0.0;
        };
        let Some(text) = page.as_text() else {
            return 0.0;
        };
        let rect = Rect::new(0.0, 0.0, self.size.0 as f32, self.size.1 as f32);
        let (lines, line_h) = layout_text(text, rect);
        lines.len() as f32 * line_h + TEXT_MARGIN * 2.0
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn slide_offset(&self) -> f32 {
        let Some((slide, started)) = self.slide else {
            return 0.0;
        };
        let t = started.elapsed().as_secs_f32() / SLIDE_TIME.as_secs_f32();
        if t >= 1.0 {
            return 0.0;
        }
        let forward = matches!(slide, Slide::Forward);
        let rtl = self.reader.settings().direction == Direction::Rtl;
        let sign = if forward != rtl { 1.0 } else { -1.0 };
        sign * SLIDE_DISTANCE * (1.0 - t) * (1.0 - t)
    }

    /// Render into the softbuffer framebuffer (u32 per pixel, 0x00RRGGBB).
    pub fn render(&self, buf: &mut [u32], fb_w: u32, fb_h: u32) {
        let mut frame = Frame::new(buf, fb_w, fb_h);
        frame.clear(BG_COLOR);
        let (sw, sh) = (fb_w as f32, fb_h as f32);
        let zoom = self.reader.settings().zoom_factor();
        let dx = self.slide_offset();

        match self.view {
            View::Nothing => {}
            View::Single => {
                if let Some(page) = self.main.page() {
                    let rect = Rect::new(dx, 0.0, sw, sh);
                    draw_page(&mut frame, &page, rect, zoom, Align::Center, self.text_scroll);
                }
            }
            View::Spread {
                mode,
                show_left,
                show_right,
                has_left,
                has_right,
            } => {
                if show_left && show_right {
                    let half = sw / 2.0;
                    let left_box = Rect::new(dx, 0.0, half, sh);
                    let right_box = Rect::new(half + dx, 0.0, half, sh);
                    match self.left.page() {
                        Some(page) => draw_page(&mut frame, &page, left_box, zoom, Align::End, 0.0),
                        None if !has_left => draw_blank(&mut frame, left_box),
                        None => {}
                    }
                    match self.right.page() {
                        Some(page) => draw_page(&mut frame, &page, right_box, zoom, Align::Start, 0.0),
                        None if !has_right => draw_blank(&mut frame, right_box),
                        None => {}
                    }
                    if mode == DisplayMode::Spread && has_left && has_right {
                        draw_spine(&mut frame, half, sh);
                    }
                } else {
                    let slot = if show_left { &self.left } else { &self.right };
                    if let Some(page) = slot.page() {
                        let rect = Rect::new(dx, 0.0, sw, sh);
                        draw_page(&mut frame, &page, rect, zoom, Align::Center, 0.0);
                    }
                }
            }
            View::Scroll => {
                let layout = self.reader.scroll_layout();
                let top = layout.scroll_top();
                for item in layout.visible_items() {
                    let rect = Rect::new((sw - item.width) / 2.0, item.top - top, item.width, item.height);
                    if rect.y > sh || rect.y + rect.h < 0.0 {
                        continue;
                    }
                    frame.fill_rect(rect, (255, 255, 255, 255));
                    if let Some(page) = self.scroll_slots.get(&item.page).and_then(Slot::page) {
                        draw_page(&mut frame, &page, rect, 1.0, Align::Center, 0.0);
                    }
                    let label = format!("{}", item.page);
                    let lx = (rect.x + rect.w) as i32 - (label.len() as i32 * 12) - 12;
                    frame.draw_text(&label, lx, (rect.y + rect.h) as i32 - 26, 2, (90, 90, 90, 255));
                }
            }
        }

        if self.show_info {
            self.draw_info(&mut frame);
        }

        if let Some(ref err) = self.error_message {
            frame.draw_text(err, 20, fb_h as i32 / 2, 2, (255, 80, 80, 255));
        } else if self.view == View::Nothing {
            let msg = match self.reader.status() {
                Status::Loading => "Loading...",
                _ => "No document",
            };
            frame.draw_text(msg, fb_w as i32 / 2 - 60, fb_h as i32 / 2, 2, (255, 255, 255, 255));
        }

        if self.show_help {
            frame.fill_rect(Rect::new(0.0, 0.0, sw, sh), (0, 0, 0, 200));
            let mut y = 20;
            for line in HELP_KEYS.lines() {
                frame.draw_text(line, 20, y, 2, (255, 255, 255, 255));
                y += 24;
            }
        }
    }

    fn draw_info(&self, frame: &mut Frame<'_>) {
        let settings = self.reader.settings();
        let kind = self
            .reader
            .kind()
            .map_or_else(|| "-".to_string(), |k| k.to_string());
        let line1 = format!(
            "[{}/{}] {}",
            self.reader.current_page(),
            self.reader.total_pages(),
            self.reader.title().unwrap_or("")
        );
        let line2 = format!(
            "{kind} | {:?} | {:?} | zoom {}% | font {}px | {:?} | prerender {}",
            self.reader.view_mode(),
            settings.direction,
            settings.zoom,
            settings.font_size,
            settings.epub_theme,
            if settings.prerender { "on" } else { "off" },
        );
        let line3 = match self.view {
            View::Spread { mode, .. } => format!("layout: {mode:?}"),
            View::Scroll => format!("scroll: {:.0}px", self.reader.scroll_layout().scroll_top()),
            _ => String::new(),
        };

        let text_scale: u32 = 2;
        let line_h = (7 * text_scale + 4) as i32;
        let bar_h = (line_h * 3 + 8) as f32;
        frame.fill_rect(Rect::new(0.0, 0.0, frame.width as f32, bar_h), (0, 0, 0, 178));
        let white = (255, 255, 255, 255);
        frame.draw_text(&line1, 10, 4, text_scale, white);
        frame.draw_text(&line2, 10, 4 + line_h, text_scale, white);
        frame.draw_text(&line3, 10, 4 + line_h * 2, text_scale, white);
    }
}

// ---------------------------------------------------------------------------
// Page drawing
// ---------------------------------------------------------------------------

fn draw_page(frame: &mut Frame<'_>, page: &RenderedPage, rect: Rect, zoom: f32, align: Align, scroll: f32) {
    match &page.content {
        PageContent::Raster(img) => {
            let (disp_w, disp_h) = page.display_size();
            let (disp_w, disp_h) = (disp_w.max(1) as f32, disp_h.max(1) as f32);
            let scale = fit_scale(disp_w, disp_h, rect.w, rect.h) * zoom;
            let (w, h) = (disp_w * scale, disp_h * scale);
            let x0 = match align {
                Align::Center => rect.x + (rect.w - w) / 2.0,
                Align::End => rect.x + rect.w - w,
                Align::Start => rect.x,
            };
            let y0 = rect.y + (rect.h - h) / 2.0;
            let pixel_scale = w / img.width().max(1) as f32;
            frame.blit(img, x0, y0, pixel_scale, rect);
        }
        PageContent::Text(text) => draw_text_page(frame, text, rect, scroll),
    }
}

/// Text scale and wrapped lines for a text page inside `rect`.
fn layout_text(page: &TextPage, rect: Rect) -> (Vec<String>, f32) {
    let scale = (page.font_size / 8).max(1);
    let cols = ((rect.w - TEXT_MARGIN * 2.0) / (ADVANCE * scale) as f32).max(1.0) as usize;
    let mut lines = vec![page.chapter_title.clone(), String::new()];
    lines.extend(wrap_text(&page.text, cols));
    (lines, ((GLYPH_H + 4) * scale) as f32)
}

fn draw_text_page(frame: &mut Frame<'_>, page: &TextPage, rect: Rect, scroll: f32) {
    let [br, bg, bb] = page.palette.background;
    let [fr, fg, fb] = page.palette.foreground;
    let [lr, lg, lb] = page.palette.link;
    frame.fill_rect(rect, (br, bg, bb, 255));

    let scale = (page.font_size / 8).max(1);
    let (lines, line_h) = layout_text(page, rect);
    let scroll = if page.flow == Flow::Scrolled { scroll } else { 0.0 };
    let mut y = rect.y + TEXT_MARGIN - scroll;
    for (i, line) in lines.iter().enumerate() {
        if y > rect.y + rect.h {
            break;
        }
        if y + line_h >= rect.y {
            let width = (line.chars().count() as u32 * ADVANCE * scale) as f32;
            let x = match page.direction {
                Direction::Ltr => rect.x + TEXT_MARGIN,
                Direction::Rtl => rect.x + rect.w - TEXT_MARGIN - width,
            };
            let color = if i == 0 { (lr, lg, lb, 255) } else { (fr, fg, fb, 255) };
            frame.draw_text(line, x as i32, y as i32, scale, color);
        }
        y += line_h;
    }
}

fn draw_blank(frame: &mut Frame<'_>, rect: Rect) {
    let slot = rect.fit(1.0, leaf::layout::spread::SLOT_ASPECT);
    frame.fill_rect(slot, (48, 48, 48, 255));
    let x = (slot.x + slot.w / 2.0) as i32 - 30;
    frame.draw_text("blank", x, (slot.y + slot.h / 2.0) as i32, 2, (110, 110, 110, 255));
}

/// Shading down the middle of a two-page spread.
fn draw_spine(frame: &mut Frame<'_>, center: f32, height: f32) {
    let width = (frame.width as f32 * 0.03).clamp(4.0, 12.0);
    let bands = 4;
    for i in 0..bands {
        let w = width * (bands - i) as f32 / bands as f32;
        let alpha = 20 + 12 * i as u8;
        frame.fill_rect(Rect::new(center - w / 2.0, 0.0, w, height), (0, 0, 0, alpha));
    }
}
