//! Deterministic overlay rendering.
//!
//! [`OverlayRenderer::render`] draws, in order:
//! 1. every detection box with a filled caption background,
//! 2. a semi-transparent statistics panel in the top-right corner,
//! 3. the frame counter in the top-left corner.
//!
//! Output depends only on the arguments and the renderer's configuration.

mod text;

pub use text::{draw_text, text_size};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::classify::StateClassifier;
use crate::detect::Detection;
use crate::dwell::DwellStats;

const CAPTION_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const COUNTER_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_EMPTY: Rgb<u8> = Rgb([90, 90, 90]);

/// Layout and color knobs for the overlay.
#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub panel_width: u32,
    pub panel_margin: u32,
    pub panel_padding: u32,
    pub panel_color: Rgb<u8>,
    /// Weight of the panel color in the blend, in tenths (7 => 0.7).
    pub panel_alpha_tenths: u16,
    pub border_color: Rgb<u8>,
    pub title: String,
    pub text_scale: u32,
    pub caption_scale: u32,
    pub counter_scale: u32,
    pub bar_height: u32,
    pub box_thickness: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            panel_width: 360,
            panel_margin: 10,
            panel_padding: 10,
            panel_color: Rgb([32, 32, 32]),
            panel_alpha_tenths: 7,
            border_color: Rgb([200, 200, 200]),
            title: "ACTIVITY DWELL".to_string(),
            text_scale: 2,
            caption_scale: 2,
            counter_scale: 3,
            bar_height: 24,
            box_thickness: 2,
        }
    }
}

/// Result of drawing one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub boxes_drawn: usize,
    /// Detections skipped for degenerate geometry.
    pub boxes_skipped: usize,
}

pub struct OverlayRenderer {
    classifier: StateClassifier,
    frame_rate: f64,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(classifier: StateClassifier, frame_rate: f64) -> Self {
        Self::with_style(classifier, frame_rate, OverlayStyle::default())
    }

    pub fn with_style(classifier: StateClassifier, frame_rate: f64, style: OverlayStyle) -> Self {
        Self {
            classifier,
            frame_rate,
            style,
        }
    }

    pub fn classifier(&self) -> &StateClassifier {
        &self.classifier
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Annotates `image` in place. `frame_counter` is the 0-based index of
    /// the frame in playback order.
    pub fn render(
        &self,
        image: &mut RgbImage,
        detections: &[Detection],
        stats: &DwellStats,
        frame_counter: u64,
    ) -> RenderSummary {
        let mut summary = RenderSummary::default();
        for det in detections {
            if self.draw_detection(image, det) {
                summary.boxes_drawn += 1;
            } else {
                summary.boxes_skipped += 1;
                log::debug!(
                    "skipping detection '{}' with malformed or off-frame geometry \
                     (x={}, y={}, w={}, h={})",
                    det.class,
                    det.x,
                    det.y,
                    det.width,
                    det.height
                );
            }
        }
        self.draw_panel(image, stats, frame_counter);
        self.draw_frame_counter(image, frame_counter);
        summary
    }

    /// Copying variant of [`render`](Self::render).
    pub fn render_copy(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        stats: &DwellStats,
        frame_counter: u64,
    ) -> RgbImage {
        let mut out = image.clone();
        self.render(&mut out, detections, stats, frame_counter);
        out
    }

    fn draw_detection(&self, image: &mut RgbImage, det: &Detection) -> bool {
        let Some(c) = det.corners() else {
            return false;
        };
        let margin = self.style.box_thickness + 1;
        let Some(c) = c.clip_to(image.width(), image.height(), margin) else {
            return false;
        };
        if c.width() == 0 || c.height() == 0 {
            return false;
        }
        let color = self.classifier.color_for_class(&det.class);

        for inset in 0..self.style.box_thickness {
            let w = c.width().saturating_sub(2 * inset);
            let h = c.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at(c.x1 + inset as i32, c.y1 + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(image, rect, color);
        }

        let caption = det.caption();
        let (tw, th) = text_size(&caption, self.style.caption_scale);
        let bg = Rect::at(c.x1, c.y1 - th as i32 - 10).of_size(tw + 10, th + 10);
        draw_filled_rect_mut(image, bg, color);
        draw_text(
            image,
            c.x1 + 5,
            c.y1 - th as i32 - 5,
            self.style.caption_scale,
            CAPTION_TEXT,
            &caption,
        );
        true
    }

    fn panel_height(&self) -> u32 {
        let line = GLYPH_LINE * self.style.text_scale;
        let rows = 2 + self.classifier.label_count() as u32;
        self.style.panel_padding * 2 + rows * (line + LINE_GAP) + self.style.bar_height
    }

    fn draw_panel(&self, image: &mut RgbImage, stats: &DwellStats, frame_counter: u64) {
        let style = &self.style;
        let width = style.panel_width;
        let height = self.panel_height();
        let x0 = image.width() as i32 - (width + style.panel_margin) as i32;
        let y0 = style.panel_margin as i32;
        let x0 = x0.max(0);

        blend_rect(image, x0, y0, width, height, style.panel_color, style.panel_alpha_tenths);
        draw_hollow_rect_mut(image, Rect::at(x0, y0).of_size(width, height), style.border_color);

        let line = (GLYPH_LINE * style.text_scale + LINE_GAP) as i32;
        let tx = x0 + style.panel_padding as i32;
        let mut ty = y0 + style.panel_padding as i32;

        draw_text(image, tx, ty, style.text_scale, COUNTER_TEXT, &style.title);
        ty += line;

        let playback = if self.frame_rate > 0.0 {
            frame_counter as f64 / self.frame_rate
        } else {
            0.0
        };
        draw_text(
            image,
            tx,
            ty,
            style.text_scale,
            COUNTER_TEXT,
            &format!("Time: {:.1}s", playback),
        );
        ty += line;

        for (label, secs) in stats.iter() {
            let color = self.classifier.color_of(label);
            draw_text(
                image,
                tx,
                ty,
                style.text_scale,
                color,
                &format!("{}: {:.1}s", label, secs),
            );
            ty += line;
        }

        let bar_w = width.saturating_sub(2 * style.panel_padding);
        if bar_w == 0 {
            return;
        }
        draw_filled_rect_mut(image, Rect::at(tx, ty).of_size(bar_w, style.bar_height), BAR_EMPTY);
        if stats.total_seconds() <= 0.0 {
            return;
        }

        let mut cumulative = 0.0;
        let mut seg_start = 0u32;
        for (label, pct) in stats.percentages() {
            cumulative += pct;
            let seg_end = ((bar_w as f64 * cumulative / 100.0).round() as u32).min(bar_w);
            let seg_w = seg_end.saturating_sub(seg_start);
            if seg_w > 0 {
                let sx = tx + seg_start as i32;
                let color = self.classifier.color_of(&label);
                draw_filled_rect_mut(image, Rect::at(sx, ty).of_size(seg_w, style.bar_height), color);
                let text = format!("{:.0}%", pct);
                let (pw, ph) = text_size(&text, 1);
                if pw + 4 <= seg_w {
                    let px = sx + ((seg_w - pw) / 2) as i32;
                    let py = ty + (style.bar_height.saturating_sub(ph) / 2) as i32;
                    draw_text(image, px, py, 1, CAPTION_TEXT, &text);
                }
            }
            seg_start = seg_end;
        }
    }

    fn draw_frame_counter(&self, image: &mut RgbImage, frame_counter: u64) {
        draw_text(
            image,
            10,
            10,
            self.style.counter_scale,
            COUNTER_TEXT,
            &format!("Frame: {}", frame_counter + 1),
        );
    }
}

const GLYPH_LINE: u32 = 8;
const LINE_GAP: u32 = 8;

/// `out = alpha * color + (1 - alpha) * pixel` per channel, clipped to the image.
fn blend_rect(image: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>, alpha_tenths: u16) {
    let alpha = alpha_tenths.min(10);
    let x_start = x.max(0) as u32;
    let y_start = y.max(0) as u32;
    let x_end = ((x as i64 + w as i64).min(image.width() as i64)).max(0) as u32;
    let y_end = ((y as i64 + h as i64).min(image.height() as i64)).max(0) as u32;
    for py in y_start..y_end {
        for px in x_start..x_end {
            let pixel = image.get_pixel_mut(px, py);
            for ch in 0..3 {
                let panel = color.0[ch] as u16 * alpha;
                let orig = pixel.0[ch] as u16 * (10 - alpha);
                pixel.0[ch] = ((panel + orig + 5) / 10) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ActivityLabel;
    use crate::frame::frame_digest;
    use std::collections::BTreeSet;

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(StateClassifier::default(), 30.0)
    }

    fn sample_detections() -> Vec<Detection> {
        vec![
            Detection::new("Standing_guard", 0.9, 200.0, 300.0, 120.0, 200.0),
            Detection::new("Ground_control", 0.8, 420.0, 380.0, 160.0, 90.0),
        ]
    }

    fn sample_stats() -> DwellStats {
        let mut stats = DwellStats::new(&StateClassifier::default());
        let labels: BTreeSet<_> = [ActivityLabel::new("standing"), ActivityLabel::new("ground")]
            .into_iter()
            .collect();
        stats.accumulate(&labels, 0.033);
        stats
    }

    #[test]
    fn identical_inputs_render_identically() {
        let r = renderer();
        let base = RgbImage::from_pixel(640, 480, Rgb([10, 60, 110]));
        let dets = sample_detections();
        let stats = sample_stats();
        let a = r.render_copy(&base, &dets, &stats, 41);
        let b = r.render_copy(&base, &dets, &stats, 41);
        assert_eq!(frame_digest(&a), frame_digest(&b));
        assert_ne!(frame_digest(&a), frame_digest(&base));
    }

    #[test]
    fn detections_are_left_untouched() {
        let r = renderer();
        let mut img = RgbImage::new(640, 480);
        let dets = sample_detections();
        let before = dets.clone();
        r.render(&mut img, &dets, &sample_stats(), 0);
        assert_eq!(dets, before);
    }

    #[test]
    fn malformed_box_is_skipped_not_fatal() {
        let r = renderer();
        let mut img = RgbImage::new(640, 480);
        let mut dets = sample_detections();
        dets.insert(0, Detection::new("Clinch", 0.5, 100.0, 100.0, -5.0, 40.0));
        let summary = r.render(&mut img, &dets, &sample_stats(), 3);
        assert_eq!(summary.boxes_drawn, 2);
        assert_eq!(summary.boxes_skipped, 1);
    }

    #[test]
    fn far_off_frame_box_is_skipped_not_fatal() {
        let r = renderer();
        let mut img = RgbImage::new(64, 64);
        let dets = vec![
            Detection::new(
                "Standing_guard_with_a_long_class_name",
                0.9,
                2_147_483_520.0,
                10.0,
                256.0,
                10.0,
            ),
            Detection::new("Ground", 0.7, -1.0e12, -1.0e12, 50.0, 50.0),
            Detection::new("Clinch", 0.6, 32.0, 32.0, 10.0, 10.0),
        ];
        let summary = r.render(&mut img, &dets, &sample_stats(), 0);
        assert_eq!(summary.boxes_drawn, 1);
        assert_eq!(summary.boxes_skipped, 2);
    }

    #[test]
    fn oversized_box_is_clipped_and_drawn() {
        let r = renderer();
        let mut img = RgbImage::new(640, 480);
        // Left edge inside the frame, the rest extends far past every border.
        let det = Detection::new("Standing", 0.9, 1.0e9 + 100.0, 240.0, 2.0e9, 4.0e9);
        let summary = r.render(&mut img, &[det], &DwellStats::new(r.classifier()), 0);
        assert_eq!(summary.boxes_drawn, 1);
        // x1 = 1e9 + 128 - 1e9 after f32 rounding.
        assert_eq!(*img.get_pixel(128, 240), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(639, 240), Rgb([0, 0, 0]));
    }

    #[test]
    fn box_outline_uses_label_color() {
        let r = renderer();
        let mut img = RgbImage::new(640, 480);
        let det = Detection::new("Standing", 0.9, 200.0, 300.0, 100.0, 100.0);
        r.render(&mut img, &[det], &DwellStats::new(r.classifier()), 0);
        // Left edge of the box, below the caption background.
        assert_eq!(*img.get_pixel(150, 320), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(151, 320), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(200, 300), Rgb([0, 0, 0]));
    }

    #[test]
    fn panel_blends_seventy_thirty() {
        let r = renderer();
        let mut img = RgbImage::from_pixel(640, 480, Rgb([100, 100, 100]));
        r.render(&mut img, &[], &DwellStats::new(r.classifier()), 0);
        // Inside the panel, right of any text: 0.7 * 32 + 0.3 * 100 = 52.4
        let x = 640 - 10 - 3;
        let y = 10 + 12;
        assert_eq!(*img.get_pixel(x, y), Rgb([52, 52, 52]));
    }

    #[test]
    fn zero_totals_render_without_segments() {
        let r = renderer();
        let mut img = RgbImage::new(640, 480);
        let stats = DwellStats::new(r.classifier());
        r.render(&mut img, &[], &stats, 0);
        let style = r.style();
        let bar_y = 10 + r.panel_height() - style.panel_padding - style.bar_height / 2;
        let bar_x = 640 - 10 - style.panel_width + style.panel_padding + 2;
        assert_eq!(*img.get_pixel(bar_x, bar_y), BAR_EMPTY);
    }

    #[test]
    fn small_frames_do_not_panic() {
        let r = renderer();
        let mut img = RgbImage::new(32, 24);
        r.render(&mut img, &sample_detections(), &sample_stats(), 9);
    }
}
