use std::sync::Arc;
use std::time::Duration;
use lazy_static::lazy_static;
use tracing::debug;

use crate::core::Image;
use crate::utils::{PipelineError, PipelineResult};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    /// Shared client so connections to upstreams are pooled across requests.
    pub(crate) static ref HTTP_CLIENT: reqwest::Client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
}

/// Downloads `url` and decodes the body as an image.
pub async fn fetch_image_from_url(url: &str) -> PipelineResult<Arc<Image>> {
    debug!("Fetching image from {}", url);
    let response = HTTP_CLIENT.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::backend(format!("GET {} returned {}", url, status)));
    }

    let body = response.bytes().await?;
    Image::decode(body.to_vec()).await
}
