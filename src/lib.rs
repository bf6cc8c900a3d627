// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod sources;
pub mod pipeline;
pub mod processing;

// Public exports for external consumers
pub use self::core::{Image, PipelineConfig, SourceEntry};
pub use pipeline::{execute, execute_with_timeout, parse, parse_with, run, BoxedJob, Job};
pub use sources::{Source, SourceOptions, SourceRegistry};
pub use utils::{ImageFormat, PipelineError, PipelineResult};

// The command-line front end lives in main.rs and only uses the items above.
