//! Fit and fill resizing with Lanczos3 resampling.

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::core::Image;
use crate::pipeline::Job;
use crate::utils::PipelineResult;

/// Largest width or height a resize may ask for.
pub const MAX_RESIZE_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Scale down or up to fit inside the box, keeping the aspect ratio
    Fit,
    /// Scale to cover the box, then crop the centre to exactly its size
    Fill,
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fit => f.write_str("fitResize"),
            Self::Fill => f.write_str("fillResize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeJob {
    mode: ResizeMode,
    width: u32,
    height: u32,
    name: String,
}

impl ResizeJob {
    pub fn new(mode: ResizeMode, width: u32, height: u32) -> Self {
        Self {
            mode,
            width,
            height,
            name: format!("{}/{}/{}", mode, width, height),
        }
    }

    pub fn fit(width: u32, height: u32) -> Self {
        Self::new(ResizeMode::Fit, width, height)
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Self::new(ResizeMode::Fill, width, height)
    }

    pub fn mode(&self) -> ResizeMode {
        self.mode
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Resamples `grid` for `mode`; a zero target or source dimension gives an
/// empty grid.
pub fn apply_resize(grid: &DynamicImage, mode: ResizeMode, width: u32, height: u32) -> DynamicImage {
    if width == 0 || height == 0 || grid.width() == 0 || grid.height() == 0 {
        return DynamicImage::new_rgba8(0, 0);
    }
    match mode {
        ResizeMode::Fit => grid.resize(width, height, FilterType::Lanczos3),
        ResizeMode::Fill => grid.resize_to_fill(width, height, FilterType::Lanczos3),
    }
}

#[async_trait]
impl Job for ResizeJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        if self.mode == ResizeMode::Fit && image.width() <= self.width && image.height() <= self.height {
            debug!("{}×{} already fits {}×{}", image.width(), image.height(), self.width, self.height);
            return Ok(image);
        }

        let (mode, width, height) = (self.mode, self.width, self.height);
        let source = Arc::clone(&image);
        let grid =
            tokio::task::spawn_blocking(move || apply_resize(source.grid(), mode, width, height)).await?;

        Ok(Arc::new(image.with_grid(grid)))
    }
}
