//! The executable step abstraction and the sequential executor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::core::Image;
use crate::utils::{PipelineError, PipelineResult};

/// One step of a chain: consumes the current image and produces the next.
///
/// Configuration is captured when the job is built; running a job never
/// changes it, so the same job may run in many chains at once.
#[async_trait]
pub trait Job: Send + Sync {
    /// Short name used in traces
    fn name(&self) -> &str;

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>>;
}

pub type BoxedJob = Box<dyn Job>;

type JobFn = dyn Fn(Arc<Image>) -> BoxFuture<'static, PipelineResult<Arc<Image>>> + Send + Sync;

/// A job backed by a closure, see [`from_fn`].
pub struct FnJob {
    name: String,
    func: Box<JobFn>,
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Job for FnJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, image: Arc<Image>) -> PipelineResult<Arc<Image>> {
        (self.func)(image).await
    }
}

/// Wraps an async closure as a [`BoxedJob`].
pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> BoxedJob
where
    F: Fn(Arc<Image>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineResult<Arc<Image>>> + Send + 'static,
{
    Box::new(FnJob {
        name: name.into(),
        func: Box::new(move |image| Box::pin(func(image))),
    })
}

/// Runs `jobs` in order, threading each output into the next job.
///
/// [`PipelineError::AbortNext`] stops the chain and returns the image produced
/// by the last successful job. Any other error is returned unchanged and no
/// image is produced.
pub async fn execute(initial: Arc<Image>, jobs: &[BoxedJob]) -> PipelineResult<Arc<Image>> {
    let mut current = initial;
    for (idx, job) in jobs.iter().enumerate() {
        let started = Instant::now();
        match job.run(Arc::clone(&current)).await {
            Ok(next) => {
                debug!(
                    "Job {}/{} '{}' finished in {:?} ({}×{})",
                    idx + 1,
                    jobs.len(),
                    job.name(),
                    started.elapsed(),
                    next.width(),
                    next.height()
                );
                current = next;
            }
            Err(PipelineError::AbortNext) => {
                debug!("Job '{}' aborted the chain after {} step(s)", job.name(), idx);
                return Ok(current);
            }
            Err(e) => {
                debug!("Job '{}' failed after {:?}: {}", job.name(), started.elapsed(), e);
                return Err(e);
            }
        }
    }
    Ok(current)
}

/// [`execute`] bounded by `timeout`; on expiry the running job is dropped,
/// cancelling its outstanding I/O.
pub async fn execute_with_timeout(
    initial: Arc<Image>,
    jobs: &[BoxedJob],
    timeout: Duration,
) -> PipelineResult<Arc<Image>> {
    tokio::time::timeout(timeout, execute(initial, jobs))
        .await
        .map_err(|_| PipelineError::Timeout(timeout))?
}
