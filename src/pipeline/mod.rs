//! Task-chain parsing and execution.

mod job;
mod parser;

pub use job::{execute, execute_with_timeout, from_fn, BoxedJob, FnJob, Job};
pub use parser::{
    parse, parse_with, run, TASK_AUTO_OPTIMIZE, TASK_FILL_RESIZE, TASK_FIT_RESIZE, TASK_OPTIMIZE,
    TASK_PROXY,
};
