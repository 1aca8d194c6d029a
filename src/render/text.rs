//! Bitmap text drawing with the built-in 8x8 glyph set.
//!
//! No font file is loaded at runtime, so text output depends only on the
//! string, scale and position.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

pub const GLYPH_PX: u32 = 8;

/// Pixel extent of `text` at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let scale = scale.max(1);
    let chars = text.chars().count() as u32;
    (chars * GLYPH_PX * scale, GLYPH_PX * scale)
}

/// Draws `text` with its top-left corner at `(x, y)`. Pixels outside the
/// image are clipped; unknown characters render as `?`.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, scale: u32, color: Rgb<u8>, text: &str) {
    let scale = scale.max(1);
    let step = (GLYPH_PX * scale) as i64;
    let (width, height) = (image.width() as i64, image.height() as i64);
    let (x, y) = (x as i64, y as i64);
    if y >= height || y + step <= 0 {
        return;
    }
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let gx = x + i as i64 * step;
        if gx >= width {
            break;
        }
        if gx + step <= 0 {
            continue;
        }
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_PX {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = gx + (col * scale) as i64;
                let py = y + row as i64 * scale as i64;
                if px >= width || py >= height || px + (scale as i64) <= 0 || py + (scale as i64) <= 0 {
                    continue;
                }
                if scale == 1 {
                    image.put_pixel(px as u32, py as u32, color);
                } else {
                    // Both corners lie within one glyph cell of the image, so they fit in i32.
                    draw_filled_rect_mut(image, Rect::at(px as i32, py as i32).of_size(scale, scale), color);
                }
            }
        }
    }
}
