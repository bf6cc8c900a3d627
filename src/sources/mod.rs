//! Pluggable image sources and the registry that names them.
//!
//! # Architecture
//!
//! - [`Source`]: uniform `find`/`close` contract over every backend.
//! - [`SourceRegistry`]: process-wide name → source map ([`global`]).
//! - [`SourceRegistry::add_source`]: builds the variant selected by the URI
//!   scheme and registers it.
//!
//! | scheme | variant |
//! | --- | --- |
//! | `minio://` | [`MinioSource`] |
//! | `mongodb://` | [`GridFsSource`] |
//! | `aliyun://` | [`AliyunOssSource`] (rewritten to `https://`) |
//! | `http://`, `https://` | [`HttpSource`] |
//! | anything else | [`FileSource`] base directory |

mod fetch;
mod file;
mod gridfs;
mod http;
mod object_store;
mod registry;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tracing::info;

use crate::core::{Image, PipelineConfig};
use crate::utils::PipelineResult;

pub use fetch::fetch_image_from_url;
pub use file::FileSource;
pub use gridfs::{GridFsSource, DEFAULT_BUCKET};
pub use http::{HostStatus, HttpSource, StatusListener};
pub use object_store::{AliyunOssSource, MinioSource};
pub use registry::{global, SharedSource, SourceRegistry};

/// A backend that resolves lookup parameters to an image.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetches the image addressed by `params`; their meaning is backend specific.
    async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>>;

    /// Releases background resources held by the backend client.
    async fn close(&self) -> PipelineResult<()>;
}

const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Options used while building sources from URIs.
#[derive(Clone)]
pub struct SourceOptions {
    /// Interval between HTTP upstream health checks
    pub health_check_interval: Duration,
    /// Notified when an HTTP upstream host changes state
    pub on_status: Option<StatusListener>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            on_status: None,
        }
    }
}

impl SourceRegistry {
    /// Builds the source selected by the scheme of `uri` and registers it as `name`.
    pub async fn add_source(&self, name: &str, uri: &str) -> PipelineResult<()> {
        self.add_source_with(name, uri, &SourceOptions::default()).await
    }

    pub async fn add_source_with(
        &self,
        name: &str,
        uri: &str,
        options: &SourceOptions,
    ) -> PipelineResult<()> {
        if uri.starts_with("minio://") {
            return self.add_minio_source(name, uri);
        }
        if uri.starts_with("mongodb://") {
            return self.add_gridfs_source(name, uri).await;
        }
        if let Some(rest) = uri.strip_prefix("aliyun://") {
            return self.add_aliyun_oss_source(name, &format!("https://{}", rest));
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return self.add_http_source(name, uri, options).await;
        }
        self.add_file_source(name, uri);
        Ok(())
    }

    pub async fn add_http_source(
        &self,
        name: &str,
        uri: &str,
        options: &SourceOptions,
    ) -> PipelineResult<()> {
        let source =
            HttpSource::connect(uri, options.health_check_interval, options.on_status.clone()).await?;
        self.register(name, Arc::new(source));
        Ok(())
    }

    pub fn add_file_source(&self, name: &str, base_path: &str) {
        self.register(name, Arc::new(FileSource::new(base_path)));
    }

    pub fn add_minio_source(&self, name: &str, uri: &str) -> PipelineResult<()> {
        self.register(name, Arc::new(MinioSource::from_uri(uri)?));
        Ok(())
    }

    pub async fn add_gridfs_source(&self, name: &str, uri: &str) -> PipelineResult<()> {
        let source = GridFsSource::connect(uri).await?;
        self.register(name, Arc::new(source));
        Ok(())
    }

    pub fn add_aliyun_oss_source(&self, name: &str, uri: &str) -> PipelineResult<()> {
        self.register(name, Arc::new(AliyunOssSource::from_uri(uri)?));
        Ok(())
    }

    /// Registers every source listed in `config`, stopping at the first failure.
    pub async fn register_configured(&self, config: &PipelineConfig) -> PipelineResult<()> {
        let options = SourceOptions {
            health_check_interval: config.health_check_interval(),
            ..SourceOptions::default()
        };
        for entry in &config.sources {
            self.add_source_with(&entry.name, &entry.uri, &options).await?;
            info!("Registered source '{}'", entry.name);
        }
        Ok(())
    }
}
