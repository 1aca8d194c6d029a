use serde::{Deserialize, Serialize};

/// A single labeled bounding box produced by an external detector.
///
/// Geometry is center-format in image-space pixels. Detections are never
/// mutated after they are produced; every consumer takes them by reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box center x.
    pub x: f32,
    /// Box center y.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Free-form class text from the model (e.g. "Standing_guard").
    pub class: String,
    /// Confidence in 0..=1.
    pub confidence: f32,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            width: w,
            height: h,
            class: class.into(),
            confidence,
        }
    }

    /// Corner geometry, or `None` if the box is degenerate or non-finite.
    pub fn corners(&self) -> Option<BoxCorners> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        Some(BoxCorners {
            x1: (self.x - half_w) as i32,
            y1: (self.y - half_h) as i32,
            x2: (self.x + half_w) as i32,
            y2: (self.y + half_h) as i32,
        })
    }

    /// Label text drawn above the box: `"<class>: <confidence>"`.
    pub fn caption(&self) -> String {
        format!("{}: {:.2}", self.class, self.confidence)
    }
}

/// Integer corner coordinates (truncated toward zero).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxCorners {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoxCorners {
    pub fn width(&self) -> u32 {
        (self.x2 as i64 - self.x1 as i64).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 as i64 - self.y1 as i64).max(0) as u32
    }

    /// Corners clamped to `[-margin, dim + margin]`, or `None` when the box
    /// does not overlap a `width` x `height` image at all. Clamped edges sit
    /// outside the visible area, so only edges that really fall inside the
    /// image are drawn.
    pub fn clip_to(&self, width: u32, height: u32, margin: u32) -> Option<BoxCorners> {
        let (w, h) = (width as i64, height as i64);
        let (x1, y1, x2, y2) = (self.x1 as i64, self.y1 as i64, self.x2 as i64, self.y2 as i64);
        if x2 < 0 || y2 < 0 || x1 >= w || y1 >= h {
            return None;
        }
        let m = margin as i64;
        let clamp = |v: i64, max: i64| v.clamp(-m, max + m) as i32;
        Some(BoxCorners {
            x1: clamp(x1, w),
            y1: clamp(y1, h),
            x2: clamp(x2, w),
            y2: clamp(y2, h),
        })
    }
}
