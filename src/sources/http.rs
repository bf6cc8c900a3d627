//! HTTP-backed source: round-robin over health-checked upstream hosts.
//!
//! The source URI lists one or more hosts and the ping path used for health
//! checks, e.g. `http://10.0.0.1:3000,10.0.0.2:3000/ping`. Hosts start out
//! unhealthy, are checked once before the source is returned, and are then
//! re-checked by a background task until the source is closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetch::{fetch_image_from_url, HTTP_CLIENT};
use super::Source;
use crate::core::Image;
use crate::utils::{query_unescape, require_params, PipelineError, PipelineResult};

/// Health state reported to a [`StatusListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Healthy,
    Sick,
}

/// Called with the host base URL whenever a host changes state.
pub type StatusListener = Arc<dyn Fn(&str, HostStatus) + Send + Sync>;

struct UpstreamHost {
    base_url: String,
    healthy: AtomicBool,
}

struct Upstream {
    hosts: Vec<UpstreamHost>,
    ping: String,
    cursor: AtomicUsize,
    on_status: Option<StatusListener>,
}

impl Upstream {
    fn parse(uri: &str, on_status: Option<StatusListener>) -> PipelineResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| PipelineError::configuration(format!("Invalid upstream URI: {}", uri)))?;
        let (authority, path) = match rest.find(['/', '?']) {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let path = path.split('?').next().unwrap_or_default();

        let hosts: Vec<UpstreamHost> = authority
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| UpstreamHost {
                base_url: format!("{}://{}", scheme, host),
                healthy: AtomicBool::new(false),
            })
            .collect();
        if hosts.is_empty() {
            return Err(PipelineError::configuration(format!("No upstream hosts in {}", uri)));
        }

        Ok(Self {
            hosts,
            ping: if path.is_empty() { "/".to_string() } else { path.to_string() },
            cursor: AtomicUsize::new(0),
            on_status,
        })
    }

    async fn check_all(&self) {
        futures::future::join_all(self.hosts.iter().map(|host| self.check(host))).await;
    }

    async fn check(&self, host: &UpstreamHost) {
        let url = format!("{}{}", host.base_url, self.ping);
        let healthy = match HTTP_CLIENT.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ping {} failed: {}", url, e);
                false
            }
        };

        let was_healthy = host.healthy.swap(healthy, Ordering::AcqRel);
        if was_healthy == healthy {
            return;
        }
        let status = if healthy {
            info!("Upstream {} is healthy", host.base_url);
            HostStatus::Healthy
        } else {
            warn!("Upstream {} is sick", host.base_url);
            HostStatus::Sick
        };
        if let Some(listener) = &self.on_status {
            listener(&host.base_url, status);
        }
    }

    /// Next healthy host in rotation, `None` when every host is sick.
    fn round_robin(&self) -> Option<&UpstreamHost> {
        let healthy: Vec<&UpstreamHost> = self
            .hosts
            .iter()
            .filter(|host| host.healthy.load(Ordering::Acquire))
            .collect();
        if healthy.is_empty() {
            return None;
        }
        let next = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(healthy[next % healthy.len()])
    }
}

pub struct HttpSource {
    upstream: Arc<Upstream>,
    health_check: Mutex<Option<JoinHandle<()>>>,
}

impl HttpSource {
    /// Parses `uri`, runs a first health check and starts periodic checks.
    pub async fn connect(
        uri: &str,
        interval: Duration,
        on_status: Option<StatusListener>,
    ) -> PipelineResult<Self> {
        if interval.is_zero() {
            return Err(PipelineError::configuration("Health check interval must be positive"));
        }
        let upstream = Arc::new(Upstream::parse(uri, on_status)?);
        upstream.check_all().await;

        let checker = Arc::clone(&upstream);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the initial check already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                checker.check_all().await;
            }
        });

        Ok(Self {
            upstream,
            health_check: Mutex::new(Some(handle)),
        })
    }

    /// Base URLs of the hosts currently considered healthy.
    pub fn healthy_hosts(&self) -> Vec<String> {
        self.upstream
            .hosts
            .iter()
            .filter(|host| host.healthy.load(Ordering::Acquire))
            .map(|host| host.base_url.clone())
            .collect()
    }

    fn stop_health_check(&self) {
        let handle = self
            .health_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Health check stopped for {} host(s)", self.upstream.hosts.len());
        }
    }
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<&str> = self.upstream.hosts.iter().map(|h| h.base_url.as_str()).collect();
        f.debug_struct("HttpSource")
            .field("hosts", &hosts)
            .field("ping", &self.upstream.ping)
            .finish()
    }
}

#[async_trait]
impl Source for HttpSource {
    /// `params[0]` is a query-escaped request URI appended to the chosen host.
    async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>> {
        require_params(params, 1, "http")?;
        let request_uri = query_unescape(&params[0])?;
        let host = self
            .upstream
            .round_robin()
            .ok_or_else(|| PipelineError::backend("No healthy http upstream"))?;
        fetch_image_from_url(&format!("{}{}", host.base_url, request_uri)).await
    }

    async fn close(&self) -> PipelineResult<()> {
        self.stop_health_check();
        Ok(())
    }
}

impl Drop for HttpSource {
    fn drop(&mut self) {
        self.stop_health_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::png_data;
    use axum::routing::get;
    use axum::Router;

    async fn serve_upstream() -> String {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route("/image", get(|| async { png_data(829, 846) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    #[test]
    fn parses_hosts_and_ping_path() {
        let upstream = Upstream::parse("http://a:1,b:2/ping?x=1", None).unwrap();
        let urls: Vec<_> = upstream.hosts.iter().map(|h| h.base_url.as_str()).collect();
        assert_eq!(urls, vec!["http://a:1", "http://b:2"]);
        assert_eq!(upstream.ping, "/ping");

        assert_eq!(Upstream::parse("https://a", None).unwrap().ping, "/");
        assert!(matches!(
            Upstream::parse("http:///ping", None),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn round_robin_skips_sick_hosts() {
        let upstream = Upstream::parse("http://a,b,c", None).unwrap();
        assert!(upstream.round_robin().is_none());

        upstream.hosts[0].healthy.store(true, Ordering::Release);
        upstream.hosts[2].healthy.store(true, Ordering::Release);
        let picked: Vec<_> = (0..6)
            .map(|_| upstream.round_robin().unwrap().base_url.clone())
            .collect();
        assert_eq!(
            picked,
            vec!["http://a", "http://c", "http://a", "http://c", "http://a", "http://c"]
        );
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let err = HttpSource::connect("http://127.0.0.1:1/ping", Duration::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn fetches_through_healthy_upstream() {
        let addr = serve_upstream().await;
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&changes);
        let listener: StatusListener = Arc::new(move |host: &str, status: HostStatus| {
            recorded.lock().unwrap().push((host.to_string(), status));
        });

        let source = HttpSource::connect(
            &format!("http://{}/ping", addr),
            Duration::from_secs(60),
            Some(listener),
        )
        .await
        .unwrap();
        assert_eq!(source.healthy_hosts(), vec![format!("http://{}", addr)]);
        assert_eq!(
            changes.lock().unwrap().clone(),
            vec![(format!("http://{}", addr), HostStatus::Healthy)]
        );

        let img = source.find(&["%2Fimage".to_string()]).await.unwrap();
        assert_eq!((img.width(), img.height()), (829, 846));

        source.close().await.unwrap();
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_upstream_fails_find() {
        let source = HttpSource::connect("http://127.0.0.1:1/ping", Duration::from_secs(60), None)
            .await
            .unwrap();
        assert!(source.healthy_hosts().is_empty());
        assert!(matches!(
            source.find(&["/image".to_string()]).await,
            Err(PipelineError::Backend(_))
        ));
    }
}
