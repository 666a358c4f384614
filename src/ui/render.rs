use image::RgbaImage;

pub const BG_COLOR: [u8; 3] = [31, 31, 31];

/// 5x7 bitmap glyphs for ASCII 32..=127, four per line. One byte per
/// column, least significant bit at the top.
static FONT_5X7: [[u8; 5]; 96] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], [0x00, 0x00, 0x5f, 0x00, 0x00], [0x00, 0x07, 0x00, 0x07, 0x00], [0x14, 0x7f, 0x14, 0x7f, 0x14],
    [0x24, 0x2a, 0x7f, 0x2a, 0x12], [0x23, 0x13, 0x08, 0x64, 0x62], [0x36, 0x49, 0x55, 0x22, 0x50], [0x00, 0x05, 0x03, 0x00, 0x00],
    [0x00, 0x1c, 0x22, 0x41, 0x00], [0x00, 0x41, 0x22, 0x1c, 0x00], [0x14, 0x08, 0x3e, 0x08, 0x14], [0x08, 0x08, 0x3e, 0x08, 0x08],
    [0x00, 0x50, 0x30, 0x00, 0x00], [0x08, 0x08, 0x08, 0x08, 0x08], [0x00, 0x60, 0x60, 0x00, 0x00], [0x20, 0x10, 0x08, 0x04, 0x02],
    [0x3e, 0x51, 0x49, 0x45, 0x3e], [0x00, 0x42, 0x7f, 0x40, 0x00], [0x42, 0x61, 0x51, 0x49, 0x46], [0x21, 0x41, 0x45, 0x4b, 0x31],
    [0x18, 0x14, 0x12, 0x7f, 0x10], [0x27, 0x45, 0x45, 0x45, 0x39], [0x3c, 0x4a, 0x49, 0x49, 0x30], [0x01, 0x71, 0x09, 0x05, 0x03],
    [0x36, 0x49, 0x49, 0x49, 0x36], [0x06, 0x49, 0x49, 0x29, 0x1e], [0x00, 0x36, 0x36, 0x00, 0x00], [0x00, 0x56, 0x36, 0x00, 0x00],
    [0x08, 0x14, 0x22, 0x41, 0x00], [0x14, 0x14, 0x14, 0x14, 0x14], [0x00, 0x41, 0x22, 0x14, 0x08], [0x02, 0x01, 0x51, 0x09, 0x06],
    [0x3e, 0x41, 0x5d, 0x55, 0x1e], [0x7e, 0x11, 0x11, 0x11, 0x7e], [0x7f, 0x49, 0x49, 0x49, 0x36], [0x3e, 0x41, 0x41, 0x41, 0x22],
    [0x7f, 0x41, 0x41, 0x22, 0x1c], [0x7f, 0x49, 0x49, 0x49, 0x41], [0x7f, 0x09, 0x09, 0x09, 0x01], [0x3e, 0x41, 0x49, 0x49, 0x7a],
    [0x7f, 0x08, 0x08, 0x08, 0x7f], [0x00, 0x41, 0x7f, 0x41, 0x00], [0x20, 0x40, 0x41, 0x3f, 0x01], [0x7f, 0x08, 0x14, 0x22, 0x41],
    [0x7f, 0x40, 0x40, 0x40, 0x40], [0x7f, 0x02, 0x0c, 0x02, 0x7f], [0x7f, 0x04, 0x08, 0x10, 0x7f], [0x3e, 0x41, 0x41, 0x41, 0x3e],
    [0x7f, 0x09, 0x09, 0x09, 0x06], [0x3e, 0x41, 0x51, 0x21, 0x5e], [0x7f, 0x09, 0x19, 0x29, 0x46], [0x46, 0x49, 0x49, 0x49, 0x31],
    [0x01, 0x01, 0x7f, 0x01, 0x01], [0x3f, 0x40, 0x40, 0x40, 0x3f], [0x1f, 0x20, 0x40, 0x20, 0x1f], [0x3f, 0x40, 0x38, 0x40, 0x3f],
    [0x63, 0x14, 0x08, 0x14, 0x63], [0x07, 0x08, 0x70, 0x08, 0x07], [0x61, 0x51, 0x49, 0x45, 0x43], [0x00, 0x7f, 0x41, 0x41, 0x00],
    [0x02, 0x04, 0x08, 0x10, 0x20], [0x00, 0x41, 0x41, 0x7f, 0x00], [0x04, 0x02, 0x01, 0x02, 0x04], [0x40, 0x40, 0x40, 0x40, 0x40],
    [0x00, 0x01, 0x02, 0x04, 0x00], [0x20, 0x54, 0x54, 0x54, 0x78], [0x7f, 0x48, 0x44, 0x44, 0x38], [0x38, 0x44, 0x44, 0x44, 0x20],
    [0x38, 0x44, 0x44, 0x48, 0x7f], [0x38, 0x54, 0x54, 0x54, 0x18], [0x08, 0x7e, 0x09, 0x01, 0x02], [0x0c, 0x52, 0x52, 0x52, 0x3e],
    [0x7f, 0x08, 0x04, 0x04, 0x78], [0x00, 0x44, 0x7d, 0x40, 0x00], [0x20, 0x40, 0x44, 0x3d, 0x00], [0x7f, 0x10, 0x28, 0x44, 0x00],
    [0x00, 0x41, 0x7f, 0x40, 0x00], [0x7c, 0x04, 0x18, 0x04, 0x78], [0x7c, 0x08, 0x04, 0x04, 0x78], [0x38, 0x44, 0x44, 0x44, 0x38],
    [0x7c, 0x14, 0x14, 0x14, 0x08], [0x08, 0x14, 0x14, 0x18, 0x7c], [0x7c, 0x08, 0x04, 0x04, 0x08], [0x48, 0x54, 0x54, 0x54, 0x20],
    [0x04, 0x3f, 0x44, 0x40, 0x20], [0x3c, 0x40, 0x40, 0x20, 0x7c], [0x1c, 0x20, 0x40, 0x20, 0x1c], [0x3c, 0x40, 0x30, 0x40, 0x3c],
    [0x44, 0x28, 0x10, 0x28, 0x44], [0x0c, 0x50, 0x50, 0x50, 0x3c], [0x44, 0x64, 0x54, 0x4c, 0x44], [0x00, 0x08, 0x36, 0x41, 0x00],
    [0x00, 0x00, 0x7f, 0x00, 0x00], [0x00, 0x41, 0x36, 0x08, 0x00], [0x10, 0x08, 0x08, 0x10, 0x08], [0x00, 0x00, 0x00, 0x00, 0x00],
];

pub const GLYPH_W: u32 = 5;
pub const GLYPH_H: u32 = 7;
/// Horizontal advance per character at scale 1.
pub const ADVANCE: u32 = GLYPH_W + 1;

/// Pack RGB into the softbuffer pixel format `0x00RRGGBB`.
pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn unpack_rgb(v: u32) -> (u8, u8, u8) {
    ((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

fn blend(dst: u32, r: u8, g: u8, b: u8, a: u8) -> u32 {
    if a == 255 {
        return rgb(r, g, b);
    }
    let a = a as u32;
    let inv = 255 - a;
    let (dr, dg, db) = unpack_rgb(dst);
    rgb(
        ((r as u32 * a + dr as u32 * inv) / 255) as u8,
        ((g as u32 * a + dg as u32 * inv) / 255) as u8,
        ((b as u32 * a + db as u32 * inv) / 255) as u8,
    )
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Largest rectangle of the given size ratio centred in `self`.
    pub fn fit(&self, content_w: f32, content_h: f32) -> Rect {
        let scale = fit_scale(content_w, content_h, self.w, self.h);
        let (w, h) = (content_w * scale, content_h * scale);
        Rect::new(self.x + (self.w - w) / 2.0, self.y + (self.h - h) / 2.0, w, h)
    }
}

pub fn fit_scale(img_w: f32, img_h: f32, win_w: f32, win_h: f32) -> f32 {
    if img_w <= 0.0 || img_h <= 0.0 {
        return 1.0;
    }
    (win_w / img_w).min(win_h / img_h)
}

/// A softbuffer framebuffer being drawn into.
pub struct Frame<'a> {
    pub buf: &'a mut [u32],
    pub width: u32,
    pub height: u32,
}

impl<'a> Frame<'a> {
    pub fn new(buf: &'a mut [u32], width: u32, height: u32) -> Self {
        Self { buf, width, height }
    }

    pub fn clear(&mut self, color: [u8; 3]) {
        self.buf.fill(rgb(color[0], color[1], color[2]));
    }

    fn blend_at(&mut self, x: i32, y: i32, color: (u8, u8, u8, u8)) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let off = (y as u32 * self.width + x as u32) as usize;
        if let Some(px) = self.buf.get_mut(off) {
            *px = blend(*px, color.0, color.1, color.2, color.3);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: (u8, u8, u8, u8)) {
        let x0 = rect.x.max(0.0) as i32;
        let y0 = rect.y.max(0.0) as i32;
        let x1 = (rect.x + rect.w).min(self.width as f32) as i32;
        let y1 = (rect.y + rect.h).min(self.height as f32) as i32;
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_at(x, y, color);
            }
        }
    }

    fn draw_char(&mut self, ch: char, px: i32, py: i32, scale: u32, color: (u8, u8, u8, u8)) {
        let ch = if ch.is_ascii() && !ch.is_ascii_control() { ch } else { '?' };
        let glyph = &FONT_5X7[(ch as usize).saturating_sub(32).min(95)];
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..GLYPH_H {
                if bits & (1 << row) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let x = px + (col as u32 * scale + sx) as i32;
                        let y = py + (row * scale + sy) as i32;
                        self.blend_at(x, y, color);
                    }
                }
            }
        }
    }

    /// Draw a line of text. Returns the x position after the last character.
    pub fn draw_text(&mut self, text: &str, px: i32, py: i32, scale: u32, color: (u8, u8, u8, u8)) -> i32 {
        let mut x = px;
        for ch in text.chars() {
            self.draw_char(ch, x, py, scale, color);
            x += (ADVANCE * scale) as i32;
        }
        x
    }

    /// Scale `src` by `scale` with its top-left corner at (`x0`, `y0`),
    /// touching only pixels inside `clip`. Nearest-neighbour sampling.
    pub fn blit(&mut self, src: &RgbaImage, x0: f32, y0: f32, scale: f32, clip: Rect) {
        if scale <= 0.0 {
            return;
        }
        let (src_w, src_h) = src.dimensions();
        let draw_w = src_w as f32 * scale;
        let draw_h = src_h as f32 * scale;

        let dx_start = x0.max(clip.x).max(0.0) as u32;
        let dy_start = y0.max(clip.y).max(0.0) as u32;
        let dx_end = ((x0 + draw_w).min(clip.x + clip.w).ceil().max(0.0) as u32).min(self.width);
        let dy_end = ((y0 + draw_h).min(clip.y + clip.h).ceil().max(0.0) as u32).min(self.height);

        let raw = src.as_raw();
        let inv_scale = 1.0 / scale;
        for dy in dy_start..dy_end {
            let sy = ((dy as f32 - y0) * inv_scale) as u32;
            if sy >= src_h {
                continue;
            }
            for dx in dx_start..dx_end {
                let sx = ((dx as f32 - x0) * inv_scale) as u32;
                if sx >= src_w {
                    continue;
                }
                let si = (sy as usize * src_w as usize + sx as usize) * 4;
                let di = dy as usize * self.width as usize + dx as usize;
                let a = raw[si + 3];
                if a > 0 {
                    self.buf[di] = blend(self.buf[di], raw[si], raw[si + 1], raw[si + 2], a);
                }
            }
        }
    }
}

/// Break `text` into lines of at most `max_cols` characters, on word
/// boundaries where possible. Paragraph breaks are kept as empty lines.
pub fn wrap_text(text: &str, max_cols: usize) -> Vec<String> {
    let max_cols = max_cols.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_cols {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(max_cols);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > max_cols {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_words_and_keeps_paragraphs() {
        let lines = wrap_text("the quick brown fox\n\njumps", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "", "jumps"]);
    }

    #[test]
    fn long_words_are_split() {
        assert_eq!(wrap_text("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
    }

    #[test]
    fn fit_keeps_aspect_and_centres() {
        let slot = Rect::new(0.0, 0.0, 200.0, 100.0);
        let r = slot.fit(50.0, 100.0);
        assert_eq!((r.x, r.y, r.w, r.h), (75.0, 0.0, 50.0, 100.0));
    }

    #[test]
    fn blit_respects_clip() {
        let mut buf = vec![0u32; 4 * 2];
        let mut frame = Frame::new(&mut buf, 4, 2);
        let src = RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 0, 255]));
        frame.blit(&src, 0.0, 0.0, 2.0, Rect::new(0.0, 0.0, 2.0, 2.0));
        let red = rgb(255, 0, 0);
        assert_eq!(buf, vec![red, red, 0, 0, red, red, 0, 0]);
    }
}
