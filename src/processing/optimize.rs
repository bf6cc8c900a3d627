//! Recompression through the remote optimizer service.
//!
//! The service speaks gRPC (`pb.Optim/DoOptim`). A request carries the image
//! as PNG plus the wanted output format and quality; the reply carries the
//! transcoded bytes. Channels are cached per address in a process-wide
//! [`ConnectionCache`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use lazy_static::lazy_static;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use super::connection::{ConnectionCache, Dialer};
use crate::core::Image;
use crate::pipeline::Job;
use crate::utils::{negotiate_format, ImageFormat, PipelineError, PipelineResult};

const DO_OPTIM_PATH: &str = "/pb.Optim/DoOptim";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Image type tag of the optimizer protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireType {
    Jpeg = 0,
    Png = 1,
    Webp = 2,
    Gif = 3,
    Avif = 4,
}

impl From<ImageFormat> for WireType {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::JPEG => Self::Jpeg,
            ImageFormat::PNG => Self::Png,
            ImageFormat::WebP => Self::Webp,
            ImageFormat::GIF => Self::Gif,
            ImageFormat::AVIF => Self::Avif,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OptimRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(enumeration = "WireType", tag = "2")]
    pub source: i32,
    #[prost(enumeration = "WireType", tag = "3")]
    pub output: i32,
    #[prost(uint32, tag = "4")]
    pub quality: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OptimReply {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

/// Opens plaintext HTTP/2 channels to optimizer addresses (`host:port`).
#[derive(Debug, Clone)]
pub struct GrpcDialer {
    connect_timeout: Duration,
}

impl Default for GrpcDialer {
    fn default() -> Self {
        Self { connect_timeout: CONNECT_TIMEOUT }
    }
}

#[async_trait]
impl Dialer for GrpcDialer {
    type Connection = Channel;

    async fn dial(&self, address: &str) -> PipelineResult<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{}", address))
            .map_err(|e| PipelineError::configuration(format!("Invalid optimizer address {}: {}", address, e)))?
            .connect_timeout(self.connect_timeout);
        endpoint
            .connect()
            .await
            .map_err(|e| PipelineError::backend(format!("Cannot connect to optimizer {}: {}", address, e)))
    }
}

lazy_static! {
    static ref CONNECTIONS: ConnectionCache<GrpcDialer> = ConnectionCache::new(GrpcDialer::default());
}

/// Sends one optimize request to the service at `address`.
#[async_trait]
pub trait RemoteOptimizer: Send + Sync {
    async fn optimize(&self, address: &str, request: OptimRequest) -> PipelineResult<Vec<u8>>;
}

/// [`RemoteOptimizer`] over gRPC, sharing the process-wide channel cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcOptimizer;

#[async_trait]
impl RemoteOptimizer for GrpcOptimizer {
    async fn optimize(&self, address: &str, request: OptimRequest) -> PipelineResult<Vec<u8>> {
        let channel = CONNECTIONS.get(address).await?;
        let mut client = tonic::client::Grpc::new(channel);
        client
            .ready()
            .await
            .map_err(|e| PipelineError::backend(format!("Optimizer {} not ready: {}", address, e)))?;

        let codec = ProstCodec::<OptimRequest, OptimReply>::default();
        let reply = client
            .unary(tonic::Request::new(request), PathAndQuery::from_static(DO_OPTIM_PATH), codec)
            .await
            .map_err(|status| {
                PipelineError::backend(format!("Optimizer {} failed: {}", address, status.message()))
            })?;
        Ok(reply.into_inner().data)
    }
}

fn default_optimizer() -> Arc<dyn RemoteOptimizer> {
    Arc::new(GrpcOptimizer)
}

/// Encodes `image` as PNG, sends it and keeps the reply as the encoded form.
async fn optimize_image(
    optimizer: &dyn RemoteOptimizer,
    address: &str,
    image: Arc<Image>,
    quality: u32,
    format: Option<ImageFormat>,
) -> PipelineResult<Arc<Image>> {
    let output = format.map_or(ImageFormat::JPEG, |f| ImageFormat::output_or_jpeg(f.as_str()));

    let source = Arc::clone(&image);
    let data = tokio::task::spawn_blocking(move || source.png().map(|png| png.into_owned())).await??;
    let input_size = data.len();

    let request = OptimRequest {
        data,
        source: WireType::Png as i32,
        output: WireType::from(output) as i32,
        quality,
    };
    let optimized = optimizer.optimize(address, request).await?;
    debug!(
        "Optimized to {} (quality {}): {} -> {} bytes",
        output,
        quality,
        input_size,
        optimized.len()
    );

    Ok(Arc::new(image.with_encoded(optimized, output)))
}

/// `optimize/<addr>[/<quality>][/<format>]`
pub struct OptimizeJob {
    address: String,
    quality: u32,
    format: Option<ImageFormat>,
    optimizer: Arc<dyn RemoteOptimizer>,
}

impl OptimizeJob {
    /// `format` of `None` keeps the image's current format.
    pub fn new(address: impl Into<String>, quality: u32, format: Option<ImageFormat>) -> Self {
        Self::with_optimizer(address, quality, format, default_optimizer())
    }

    pub fn with_optimizer(
        address: impl Into<String>,
        quality: u32,
        format: Option<ImageFormat>,
        optimizer: Arc<dyn RemoteOptimizer>,
    ) -> Self {
        Self {
            address: address.into(),
            quality,
            format,
            optimizer,
        }
    }
}

impl fmt::Debug for OptimizeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizeJob")
            .field("address", &self.address)
            .field("quality", &self.quality)
            .field("format", &self.format)
            .finish()
    }
}

#[async_trait]
impl Job for OptimizeJob {
    fn name(&self) -> &str {
        "optimize"
    }

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        let format = self.format.or(image.format());
        optimize_image(self.optimizer.as_ref(), &self.address, image, self.quality, format).await
    }
}

/// `autoOptimize/<addr>[/<quality>]`: output format picked from the accept hint.
pub struct AutoOptimizeJob {
    address: String,
    quality: u32,
    accept: String,
    optimizer: Arc<dyn RemoteOptimizer>,
}

impl AutoOptimizeJob {
    pub fn new(address: impl Into<String>, quality: u32, accept: impl Into<String>) -> Self {
        Self::with_optimizer(address, quality, accept, default_optimizer())
    }

    pub fn with_optimizer(
        address: impl Into<String>,
        quality: u32,
        accept: impl Into<String>,
        optimizer: Arc<dyn RemoteOptimizer>,
    ) -> Self {
        Self {
            address: address.into(),
            quality,
            accept: accept.into(),
            optimizer,
        }
    }
}

impl fmt::Debug for AutoOptimizeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoOptimizeJob")
            .field("address", &self.address)
            .field("quality", &self.quality)
            .field("accept", &self.accept)
            .finish()
    }
}

#[async_trait]
impl Job for AutoOptimizeJob {
    fn name(&self) -> &str {
        "autoOptimize"
    }

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        let current = image.format();
        let format = negotiate_format(&self.accept, current);
        // PNG sources converted to WebP use the optimizer's default quality
        let quality = if format == Some(ImageFormat::WebP) && current == Some(ImageFormat::PNG) {
            0
        } else {
            self.quality
        };
        optimize_image(self.optimizer.as_ref(), &self.address, image, quality, format).await
    }
}
