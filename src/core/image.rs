//! The image value threaded through a pipeline.
//!
//! An [`Image`] is never mutated once built. Steps that change pixels call
//! [`Image::with_grid`], which produces a successor linked to its predecessor,
//! so the history of a chain is a singly linked list of `Arc<Image>` where each
//! node is owned by the one after it.

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::utils::{ImageFormat, PipelineError, PipelineResult};

pub struct Image {
    /// State before the last pixel change
    previous: Option<Arc<Image>>,
    /// Byte length of the data the chain was decoded from
    original_size: usize,
    grid: Arc<DynamicImage>,
    /// Encoded form of `grid` in `format`, filled lazily
    encoded: OnceCell<Vec<u8>>,
    format: Option<ImageFormat>,
}

impl Image {
    /// Decodes raw bytes, keeping them as the encoded cache.
    pub fn from_bytes(data: Vec<u8>) -> PipelineResult<Self> {
        let detected = image::guess_format(&data)?;
        let format = ImageFormat::from_codec(detected).ok_or_else(|| {
            PipelineError::backend(format!("Unsupported image format: {:?}", detected))
        })?;
        let grid = image::load_from_memory_with_format(&data, detected)?;

        debug!("Decoded {} image: {}×{} ({} bytes)", format, grid.width(), grid.height(), data.len());

        Ok(Self {
            previous: None,
            original_size: data.len(),
            grid: Arc::new(grid),
            encoded: OnceCell::with_value(data),
            format: Some(format),
        })
    }

    /// Decodes on the blocking pool so large images never stall the runtime.
    pub async fn decode(data: Vec<u8>) -> PipelineResult<Arc<Self>> {
        let image = tokio::task::spawn_blocking(move || Self::from_bytes(data)).await??;
        Ok(Arc::new(image))
    }

    /// Empty 0×0 image without a format; the starting value of a chain.
    pub fn blank() -> Self {
        Self {
            previous: None,
            original_size: 0,
            grid: Arc::new(DynamicImage::new_rgba8(0, 0)),
            encoded: OnceCell::new(),
            format: None,
        }
    }

    /// Returns a successor holding `grid`; the encoded cache starts empty.
    pub fn with_grid(self: &Arc<Self>, grid: DynamicImage) -> Self {
        Self {
            previous: Some(Arc::clone(self)),
            original_size: self.original_size,
            grid: Arc::new(grid),
            encoded: OnceCell::new(),
            format: self.format,
        }
    }

    /// Same pixels, with `data` as the encoded form in `format`.
    ///
    /// Used for optimizer replies: the grid is not re-decoded and no history
    /// entry is added.
    pub fn with_encoded(&self, data: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            previous: self.previous.clone(),
            original_size: self.original_size,
            grid: Arc::clone(&self.grid),
            encoded: OnceCell::with_value(data),
            format: Some(format),
        }
    }

    pub fn previous(&self) -> Option<&Arc<Image>> {
        self.previous.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn grid(&self) -> &DynamicImage {
        &self.grid
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Whether an encoded form is currently cached
    pub fn is_encoded(&self) -> bool {
        self.encoded.get().is_some()
    }

    /// PNG bytes, reusing the cache when it already holds PNG.
    pub fn png(&self) -> PipelineResult<Cow<'_, [u8]>> {
        self.encoded_as(ImageFormat::PNG)
    }

    /// JPEG bytes, reusing the cache when it already holds JPEG.
    pub fn jpeg(&self) -> PipelineResult<Cow<'_, [u8]>> {
        self.encoded_as(ImageFormat::JPEG)
    }

    /// Encoded bytes and format, encoding in the current format if the cache
    /// was invalidated by a pixel change.
    pub fn bytes(&self) -> PipelineResult<(&[u8], ImageFormat)> {
        let format = self
            .format
            .ok_or_else(|| PipelineError::backend("Image has no format to encode"))?;
        let data = self.encoded.get_or_try_init(|| encode_grid(&self.grid, format))?;
        Ok((data.as_slice(), format))
    }

    fn encoded_as(&self, format: ImageFormat) -> PipelineResult<Cow<'_, [u8]>> {
        if self.format == Some(format) {
            if let Some(data) = self.encoded.get().filter(|d| !d.is_empty()) {
                return Ok(Cow::Borrowed(data.as_slice()));
            }
        }
        encode_grid(&self.grid, format).map(Cow::Owned)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format)
            .field("original_size", &self.original_size)
            .field("encoded", &self.encoded.get().map(Vec::len))
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

fn encode_grid(grid: &DynamicImage, format: ImageFormat) -> PipelineResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel
        ImageFormat::JPEG => {
            DynamicImage::ImageRgb8(grid.to_rgb8()).write_to(&mut buffer, format.to_codec())?
        }
        ImageFormat::PNG => grid.write_to(&mut buffer, format.to_codec())?,
        _ => DynamicImage::ImageRgba8(grid.to_rgba8()).write_to(&mut buffer, format.to_codec())?,
    }
    Ok(buffer.into_inner())
}
