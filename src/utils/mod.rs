pub mod error;
pub mod validation;
pub mod formats;
pub mod fs;

pub use error::{PipelineError, PipelineResult};
pub use validation::{int_or_zero, query_unescape, require_first, require_params};
pub use formats::{ImageFormat, negotiate_format};
pub use fs::{read_file, resolve_within};
