//! S3-compatible object storage sources: MinIO and Aliyun OSS.
//!
//! Both take `[bucket, key]` lookup parameters. MinIO is addressed over plain
//! HTTP with path-style buckets; OSS over HTTPS with virtual-hosted buckets.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client;
use reqwest::Url;
use tracing::debug;

use super::Source;
use crate::core::Image;
use crate::utils::{require_params, PipelineError, PipelineResult};

const MINIO_REGION: &str = "us-east-1";
const CREDENTIALS_PROVIDER: &str = "image-pipeline";

/// Endpoint and credentials pulled from a source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoreEndpoint {
    host: String,
    port: Option<u16>,
    access_key: String,
    secret_key: String,
}

impl StoreEndpoint {
    fn parse(uri: &str) -> PipelineResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| PipelineError::configuration(format!("Invalid storage URI {}: {}", uri, e)))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| PipelineError::configuration(format!("Storage URI has no host: {}", uri)))?
            .to_string();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        Ok(Self {
            host,
            port: url.port(),
            access_key: query.get("accessKey").cloned().unwrap_or_default(),
            secret_key: query.get("secretKey").cloned().unwrap_or_default(),
        })
    }

    fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    fn client(&self, endpoint: String, region: String, path_style: bool) -> Client {
        let credentials = Credentials::new(
            &self.access_key,
            &self.secret_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .endpoint_url(endpoint)
            .force_path_style(path_style)
            .build();
        Client::from_conf(config)
    }
}

async fn get_object(client: &Client, params: &[String], kind: &str) -> PipelineResult<Arc<Image>> {
    require_params(params, 2, kind)?;
    let (bucket, key) = (&params[0], &params[1]);
    debug!("Fetching {} object {}/{}", kind, bucket, key);

    let response = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| PipelineError::backend(format!("{} get {}/{} failed: {}", kind, bucket, key, e)))?;
    let body = response
        .body
        .collect()
        .await
        .map_err(|e| PipelineError::backend(format!("{} read {}/{} failed: {}", kind, bucket, key, e)))?;

    Image::decode(body.into_bytes().to_vec()).await
}

/// Object storage A: a MinIO server, `minio://host:port/?accessKey=..&secretKey=..`.
pub struct MinioSource {
    client: Client,
}

impl MinioSource {
    pub fn from_uri(uri: &str) -> PipelineResult<Self> {
        let endpoint = StoreEndpoint::parse(uri)?;
        let client = endpoint.client(
            format!("http://{}", endpoint.authority()),
            MINIO_REGION.to_string(),
            true,
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl Source for MinioSource {
    async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>> {
        get_object(&self.client, params, "minio").await
    }

    async fn close(&self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Object storage B: Aliyun OSS, `https://oss-cn-beijing.aliyuncs.com?accessKey=..&secretKey=..`.
pub struct AliyunOssSource {
    client: Client,
}

impl AliyunOssSource {
    /// Both keys are required. The region is the first label of the host.
    pub fn from_uri(uri: &str) -> PipelineResult<Self> {
        let endpoint = StoreEndpoint::parse(uri)?;
        if endpoint.access_key.is_empty() || endpoint.secret_key.is_empty() {
            return Err(PipelineError::configuration(
                "access key and secret key can not be empty",
            ));
        }
        let region = endpoint.host.split('.').next().unwrap_or_default().to_string();
        let client = endpoint.client(format!("https://{}", endpoint.authority()), region, false);
        Ok(Self { client })
    }
}

#[async_trait]
impl Source for AliyunOssSource {
    async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>> {
        get_object(&self.client, params, "oss").await
    }

    async fn close(&self) -> PipelineResult<()> {
        Ok(())
    }
}
