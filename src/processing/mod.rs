//! Transform steps: fetch, resize, watermark and remote optimize.

mod connection;
mod fetch;
mod optimize;
mod resize;
mod watermark;

pub use connection::{ConnectionCache, Dialer};
pub use fetch::{FindJob, ProxyJob};
pub use optimize::{
    AutoOptimizeJob, GrpcDialer, GrpcOptimizer, OptimReply, OptimRequest, OptimizeJob, RemoteOptimizer,
    WireType,
};
pub use resize::{apply_resize, ResizeJob, ResizeMode, MAX_RESIZE_DIMENSION};
pub use watermark::{anchor, rotate, Position, WatermarkJob};
