//! Steps that replace the current image with freshly fetched bytes.

use std::sync::Arc;
use async_trait::async_trait;

use crate::core::Image;
use crate::pipeline::Job;
use crate::sources::{fetch_image_from_url, SharedSource};
use crate::utils::PipelineResult;

/// `proxy/<url>`: ignores its input and downloads `url`.
#[derive(Debug, Clone)]
pub struct ProxyJob {
    url: String,
}

impl ProxyJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Job for ProxyJob {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn run(&self, _image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        fetch_image_from_url(&self.url).await
    }
}

/// `<source>/<params...>`: ignores its input and asks a named source.
pub struct FindJob {
    name: String,
    source: SharedSource,
    params: Vec<String>,
}

impl FindJob {
    pub fn new(name: impl Into<String>, source: SharedSource, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source,
            params,
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

#[async_trait]
impl Job for FindJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        self.source.find(&self.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::png_data;
    use crate::sources::FileSource;
    use axum::routing::get;
    use axum::Router;

    #[tokio::test]
    async fn proxy_downloads_and_ignores_input() {
        let app = Router::new().route("/logo.png", get(|| async { png_data(12, 9) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let job = ProxyJob::new(format!("http://{}/logo.png", addr));
        let out = job.run(Arc::new(Image::blank())).await.unwrap();
        assert_eq!((out.width(), out.height()), (12, 9));
        assert!(out.previous().is_none());
    }

    #[tokio::test]
    async fn find_passes_params_to_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/a.png"), png_data(5, 4)).unwrap();

        let source: SharedSource = Arc::new(FileSource::new(dir.path()));
        let job = FindJob::new("local", source, vec!["nested/a.png".to_string()]);
        assert_eq!(job.name(), "local");
        let out = job.run(Arc::new(Image::blank())).await.unwrap();
        assert_eq!((out.width(), out.height()), (5, 4));
    }
}
