//! Core pipeline types.
//!
//! - [`Image`]: the immutable image value threaded through a chain
//! - [`PipelineConfig`]: sources and timeouts for a pipeline process

mod config;
pub(crate) mod image;

pub use config::{PipelineConfig, SourceEntry};
pub use self::image::Image;
