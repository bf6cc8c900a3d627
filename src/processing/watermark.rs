//! Watermark compositing at one of nine anchor positions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::core::Image;
use crate::pipeline::Job;
use crate::utils::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Position {
    pub const ALL: [Position; 9] = [
        Self::TopLeft,
        Self::Top,
        Self::TopRight,
        Self::Left,
        Self::Center,
        Self::Right,
        Self::BottomLeft,
        Self::Bottom,
        Self::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "topLeft",
            Self::Top => "top",
            Self::TopRight => "topRight",
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::BottomLeft => "bottomLeft",
            Self::Bottom => "bottom",
            Self::BottomRight => "bottomRight",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|position| position.as_str() == name)
            .ok_or_else(|| PipelineError::argument(format!("Unknown watermark position: {}", name)))
    }
}

/// Top-left corner of a `mark_w`×`mark_h` watermark on a `w`×`h` base.
///
/// Offsets go negative when the watermark is larger than the base.
pub fn anchor(position: Position, w: i64, h: i64, mark_w: i64, mark_h: i64) -> (i64, i64) {
    let center_x = (w - mark_w) / 2;
    let center_y = (h - mark_h) / 2;
    match position {
        Position::TopLeft => (0, 0),
        Position::Top => (center_x, 0),
        Position::TopRight => (w - mark_w, 0),
        Position::Left => (0, center_y),
        Position::Center => (center_x, center_y),
        Position::Right => (w - mark_w, center_y),
        Position::BottomLeft => (0, h - mark_h),
        Position::Bottom => (center_x, h - mark_h),
        Position::BottomRight => (w - mark_w, h - mark_h),
    }
}

/// Rotates counter-clockwise by `degrees`, growing the canvas so nothing is
/// clipped. Uncovered corners are transparent.
pub fn rotate(mark: &RgbaImage, degrees: f64) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return mark.clone();
    }
    if normalized == 90.0 {
        return imageops::rotate270(mark);
    }
    if normalized == 180.0 {
        return imageops::rotate180(mark);
    }
    if normalized == 270.0 {
        return imageops::rotate90(mark);
    }

    let radians = normalized.to_radians();
    let (w, h) = (mark.width() as f64, mark.height() as f64);
    let bound_w = (w * radians.cos().abs() + h * radians.sin().abs()).ceil() as u32;
    let bound_h = (w * radians.sin().abs() + h * radians.cos().abs()).ceil() as u32;
    let (canvas_w, canvas_h) = (bound_w.max(mark.width()), bound_h.max(mark.height()));

    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    imageops::replace(
        &mut canvas,
        mark,
        i64::from((canvas_w - mark.width()) / 2),
        i64::from((canvas_h - mark.height()) / 2),
    );
    // imageproc rotates clockwise for positive angles
    rotate_about_center(&canvas, -radians as f32, Interpolation::Bilinear, Rgba([0, 0, 0, 0]))
}

/// Pastes a fixed watermark over every image it runs on.
pub struct WatermarkJob {
    mark: Arc<RgbaImage>,
    position: Position,
    name: String,
}

impl WatermarkJob {
    /// `angle` is in degrees, counter-clockwise; the rotation happens once here.
    pub fn new(mark: &DynamicImage, position: Position, angle: f64) -> Self {
        let upright = mark.to_rgba8();
        let mark = if angle != 0.0 { rotate(&upright, angle) } else { upright };
        Self {
            name: format!("watermark/{}", position),
            mark: Arc::new(mark),
            position,
        }
    }

    pub fn mark_dimensions(&self) -> (u32, u32) {
        self.mark.dimensions()
    }
}

#[async_trait]
impl Job for WatermarkJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        let (x, y) = anchor(
            self.position,
            i64::from(image.width()),
            i64::from(image.height()),
            i64::from(self.mark.width()),
            i64::from(self.mark.height()),
        );
        debug!("Placing {}×{} watermark at ({}, {})", self.mark.width(), self.mark.height(), x, y);

        let mark = Arc::clone(&self.mark);
        let base = Arc::clone(&image);
        let grid = tokio::task::spawn_blocking(move || {
            let mut canvas = base.grid().to_rgba8();
            imageops::overlay(&mut canvas, &*mark, x, y);
            DynamicImage::ImageRgba8(canvas)
        })
        .await?;

        Ok(Arc::new(image.with_grid(grid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::png_data;

    #[test]
    fn anchors_for_800_by_600() {
        let expected = [
            (Position::TopLeft, (0, 0)),
            (Position::Top, (370, 0)),
            (Position::TopRight, (740, 0)),
            (Position::Left, (0, 280)),
            (Position::Center, (370, 280)),
            (Position::Right, (740, 280)),
            (Position::BottomLeft, (0, 560)),
            (Position::Bottom, (370, 560)),
            (Position::BottomRight, (740, 560)),
        ];
        for (position, point) in expected {
            assert_eq!(anchor(position, 800, 600, 60, 40), point, "{}", position);
        }
    }

    #[test]
    fn positions_parse_by_name() {
        for position in Position::ALL {
            assert_eq!(position.as_str().parse::<Position>(), Ok(position));
        }
        assert!(matches!("middle".parse::<Position>(), Err(PipelineError::Argument(_))));
    }

    #[test]
    fn right_angles_swap_dimensions() {
        let mark = RgbaImage::from_pixel(20, 10, Rgba([0, 0, 255, 255]));
        assert_eq!(rotate(&mark, 90.0).dimensions(), (10, 20));
        assert_eq!(rotate(&mark, -90.0).dimensions(), (10, 20));
        assert_eq!(rotate(&mark, 180.0).dimensions(), (20, 10));
        assert_eq!(rotate(&mark, 360.0).dimensions(), (20, 10));
    }

    #[test]
    fn arbitrary_angles_grow_the_canvas() {
        let mark = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]));
        let rotated = rotate(&mark, 45.0);
        assert!(rotated.width() > 20 && rotated.height() > 20);
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
    }

    #[tokio::test]
    async fn composites_at_anchor() {
        let base = Arc::new(Image::from_bytes(png_data(100, 80)).unwrap());
        let mark = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255])));
        let job = WatermarkJob::new(&mark, Position::BottomRight, 0.0);

        let out = job.run(Arc::clone(&base)).await.unwrap();
        assert_eq!((out.width(), out.height()), (100, 80));
        assert!(Arc::ptr_eq(out.previous().unwrap(), &base));

        let pixels = out.grid().to_rgba8();
        assert_eq!(pixels.get_pixel(95, 75), &Rgba([0, 255, 0, 255]));
        assert_eq!(pixels.get_pixel(5, 5), &Rgba([200, 80, 40, 255]));
    }
}
