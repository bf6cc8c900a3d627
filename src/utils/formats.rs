use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::utils::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    JPEG,
    PNG,
    WebP,
    AVIF,
    GIF,
}

impl ImageFormat {
    /// Short tag used by the task-chain DSL and the optimizer protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JPEG => "jpeg",
            Self::PNG => "png",
            Self::WebP => "webp",
            Self::AVIF => "avif",
            Self::GIF => "gif",
        }
    }

    /// Media type advertised in an `Accept` header for this format
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::JPEG => "image/jpeg",
            Self::PNG => "image/png",
            Self::WebP => "image/webp",
            Self::AVIF => "image/avif",
            Self::GIF => "image/gif",
        }
    }

    /// Maps a decoder-detected format, `None` for formats the pipeline does not carry.
    pub fn from_codec(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::JPEG),
            image::ImageFormat::Png => Some(Self::PNG),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Avif => Some(Self::AVIF),
            image::ImageFormat::Gif => Some(Self::GIF),
            _ => None,
        }
    }

    pub fn to_codec(self) -> image::ImageFormat {
        match self {
            Self::JPEG => image::ImageFormat::Jpeg,
            Self::PNG => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
            Self::AVIF => image::ImageFormat::Avif,
            Self::GIF => image::ImageFormat::Gif,
        }
    }

    /// Output format for the optimizer: unknown tags fall back to JPEG.
    pub fn output_or_jpeg(tag: &str) -> Self {
        match tag.parse::<Self>() {
            Ok(Self::GIF) | Err(_) => Self::JPEG,
            Ok(format) => format,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = PipelineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let tag = tag.to_lowercase();
        match tag.as_str() {
            "jpg" | "jpeg" => Ok(Self::JPEG),
            "png" => Ok(Self::PNG),
            "webp" => Ok(Self::WebP),
            "avif" => Ok(Self::AVIF),
            "gif" => Ok(Self::GIF),
            _ => Err(PipelineError::argument(format!(
                "Unsupported image format: {}", tag
            ))),
        }
    }
}

/// Picks the output format for `autoOptimize` from an `Accept`-style hint.
///
/// AVIF wins over WebP; when neither is accepted the current format is kept.
pub fn negotiate_format(accept: &str, current: Option<ImageFormat>) -> Option<ImageFormat> {
    if accept.contains(ImageFormat::AVIF.media_type()) {
        Some(ImageFormat::AVIF)
    } else if accept.contains(ImageFormat::WebP.media_type()) {
        Some(ImageFormat::WebP)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

    #[test]
    fn negotiation_prefers_avif_then_webp() {
        assert_eq!(negotiate_format(CHROME_ACCEPT, Some(ImageFormat::PNG)), Some(ImageFormat::AVIF));
        assert_eq!(
            negotiate_format("image/webp,*/*", Some(ImageFormat::PNG)),
            Some(ImageFormat::WebP)
        );
        assert_eq!(negotiate_format("*/*", Some(ImageFormat::PNG)), Some(ImageFormat::PNG));
        assert_eq!(negotiate_format("", None), None);
    }

    #[test]
    fn unknown_output_tags_default_to_jpeg() {
        assert_eq!(ImageFormat::output_or_jpeg("webp"), ImageFormat::WebP);
        assert_eq!(ImageFormat::output_or_jpeg("jpg"), ImageFormat::JPEG);
        assert_eq!(ImageFormat::output_or_jpeg("tiff"), ImageFormat::JPEG);
        assert_eq!(ImageFormat::output_or_jpeg("gif"), ImageFormat::JPEG);
    }

    #[test]
    fn parse_rejects_unknown_tags() {
        assert_eq!("PNG".parse::<ImageFormat>(), Ok(ImageFormat::PNG));
        assert!(matches!("bmp".parse::<ImageFormat>(), Err(PipelineError::Argument(_))));
    }
}
