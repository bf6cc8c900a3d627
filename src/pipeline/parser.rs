//! Compiles a task-chain string into jobs.
//!
//! ```text
//! local/cat.png|fitResize/800/600|autoOptimize/10.0.0.9:6002/80
//! ```
//!
//! Tasks are separated by `|` and arguments by `/`. The first token names the
//! task kind; an unknown kind is taken to be a registered source name and the
//! remaining tokens become that source's lookup parameters.

use std::sync::Arc;
use tracing::debug;

use super::job::{execute, BoxedJob};
use crate::core::Image;
use crate::processing::{AutoOptimizeJob, FindJob, OptimizeJob, ProxyJob, ResizeJob, MAX_RESIZE_DIMENSION};
use crate::sources::{self, SourceRegistry};
use crate::utils::{int_or_zero, query_unescape, require_first, ImageFormat, PipelineError, PipelineResult};

pub const TASK_PROXY: &str = "proxy";
pub const TASK_OPTIMIZE: &str = "optimize";
pub const TASK_AUTO_OPTIMIZE: &str = "autoOptimize";
pub const TASK_FIT_RESIZE: &str = "fitResize";
pub const TASK_FILL_RESIZE: &str = "fillResize";

/// Parses `task_chain` against the process-wide source registry.
pub fn parse(task_chain: &str, accept: &str) -> PipelineResult<Vec<BoxedJob>> {
    parse_with(sources::global(), task_chain, accept)
}

/// Parses `task_chain`, resolving source names in `registry`.
///
/// Fails on the first task that does not parse; no jobs are returned then.
pub fn parse_with(registry: &SourceRegistry, task_chain: &str, accept: &str) -> PipelineResult<Vec<BoxedJob>> {
    let jobs = task_chain
        .split('|')
        .map(|task| parse_task(registry, task, accept))
        .collect::<PipelineResult<Vec<_>>>()?;
    debug!("Parsed {} job(s) from {:?}", jobs.len(), task_chain);
    Ok(jobs)
}

/// Parses the chain against the global registry and runs it from a blank image.
pub async fn run(task_chain: &str, accept: &str) -> PipelineResult<Arc<Image>> {
    let jobs = parse(task_chain, accept)?;
    execute(Arc::new(Image::blank()), &jobs).await
}

fn parse_task(registry: &SourceRegistry, task: &str, accept: &str) -> PipelineResult<BoxedJob> {
    let tokens: Vec<String> = task.split('/').map(str::to_string).collect();
    let (kind, args) = tokens.split_first().map_or(("", &[][..]), |(k, a)| (k.as_str(), a));

    match kind {
        TASK_PROXY => parse_proxy(args),
        TASK_OPTIMIZE => parse_optimize(args),
        TASK_AUTO_OPTIMIZE => parse_auto_optimize(args, accept),
        TASK_FIT_RESIZE => parse_resize(args, TASK_FIT_RESIZE).map(|(w, h)| boxed(ResizeJob::fit(w, h))),
        TASK_FILL_RESIZE => parse_resize(args, TASK_FILL_RESIZE).map(|(w, h)| boxed(ResizeJob::fill(w, h))),
        _ => parse_find(registry, &tokens),
    }
}

fn boxed<J: super::Job + 'static>(job: J) -> BoxedJob {
    Box::new(job)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn quality_arg(args: &[String]) -> u32 {
    to_u32(int_or_zero(args.get(1)))
}

fn parse_proxy(args: &[String]) -> PipelineResult<BoxedJob> {
    let url = query_unescape(require_first(args, "proxy url")?)?;
    if url.is_empty() {
        return Err(PipelineError::argument("proxy url can not be empty"));
    }
    Ok(boxed(ProxyJob::new(url)))
}

fn parse_optimize(args: &[String]) -> PipelineResult<BoxedJob> {
    let address = require_first(args, "optimize addr")?;
    let format = args.get(2).map(|tag| ImageFormat::output_or_jpeg(tag));
    Ok(boxed(OptimizeJob::new(address, quality_arg(args), format)))
}

fn parse_auto_optimize(args: &[String], accept: &str) -> PipelineResult<BoxedJob> {
    let address = require_first(args, "optimize addr")?;
    Ok(boxed(AutoOptimizeJob::new(address, quality_arg(args), accept)))
}

fn parse_resize(args: &[String], kind: &str) -> PipelineResult<(u32, u32)> {
    if args.len() != 2 {
        return Err(PipelineError::argument(format!(
            "{} expects width and height, got {} argument(s)",
            kind,
            args.len()
        )));
    }
    let (width, height) = (to_u32(int_or_zero(args.first())), to_u32(int_or_zero(args.get(1))));
    if width > MAX_RESIZE_DIMENSION || height > MAX_RESIZE_DIMENSION {
        return Err(PipelineError::argument(format!(
            "{} {}×{} exceeds the {}px limit",
            kind, width, height, MAX_RESIZE_DIMENSION
        )));
    }
    Ok((width, height))
}

fn parse_find(registry: &SourceRegistry, tokens: &[String]) -> PipelineResult<BoxedJob> {
    let name = tokens.first().map_or("", String::as_str);
    let source = registry.lookup(name)?;
    Ok(boxed(FindJob::new(name, source, tokens[1..].to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::png_data;
    use crate::sources::Source;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records lookup parameters and answers with a fixed image.
    #[derive(Default)]
    struct RecordingSource {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Source for RecordingSource {
        async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>> {
            self.calls.lock().unwrap().push(params.to_vec());
            Ok(Arc::new(Image::from_bytes(png_data(400, 300))?))
        }

        async fn close(&self) -> PipelineResult<()> {
            Ok(())
        }
    }

    fn registry_with(name: &str) -> (SourceRegistry, Arc<RecordingSource>) {
        let registry = SourceRegistry::new();
        let source = Arc::new(RecordingSource::default());
        registry.register(name, source.clone());
        (registry, source)
    }

    fn parse_err(registry: &SourceRegistry, chain: &str) -> PipelineError {
        match parse_with(registry, chain, "") {
            Ok(jobs) => panic!("{:?} parsed into {} job(s)", chain, jobs.len()),
            Err(e) => e,
        }
    }

    #[tokio::test]
    async fn unknown_kind_falls_back_to_source() {
        let (registry, source) = registry_with("myBucket");
        let jobs = parse_with(&registry, "myBucket/key1/key2", "").unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name(), "myBucket");

        execute(Arc::new(Image::blank()), &jobs).await.unwrap();
        assert_eq!(
            source.calls.lock().unwrap().clone(),
            vec![vec!["key1".to_string(), "key2".to_string()]]
        );
    }

    #[tokio::test]
    async fn chains_run_in_order() {
        let (registry, _) = registry_with("local");
        let jobs = parse_with(&registry, "local/a.png|fitResize/200/200|fillResize/50/60", "").unwrap();
        let names: Vec<_> = jobs.iter().map(|job| job.name().to_string()).collect();
        assert_eq!(names, vec!["local", "fitResize/200/200", "fillResize/50/60"]);

        let out = execute(Arc::new(Image::blank()), &jobs).await.unwrap();
        assert_eq!((out.width(), out.height()), (50, 60));
        let fitted = out.previous().unwrap();
        assert_eq!((fitted.width(), fitted.height()), (200, 150));
    }

    #[test]
    fn arity_violations_are_argument_errors() {
        let (registry, source) = registry_with("local");
        for chain in [
            "local/a.png|fitResize/100",
            "fitResize/1/2/3",
            "fillResize",
            "proxy",
            "proxy/",
            "optimize",
            "optimize/",
            "autoOptimize",
            "proxy/%zz",
            "fillResize/4294967295/4294967295",
            "fitResize/16385/10",
        ] {
            assert!(
                matches!(parse_err(&registry, chain), PipelineError::Argument(_)),
                "{}",
                chain
            );
        }
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_sources_are_not_found() {
        let (registry, _) = registry_with("local");
        assert_eq!(
            parse_err(&registry, "fitResize/1/1|missing/x"),
            PipelineError::not_found("missing")
        );
        assert_eq!(parse_err(&registry, "local/a||fitResize/1/1"), PipelineError::not_found(""));
    }

    #[test]
    fn lenient_numbers_and_optional_args() {
        let registry = SourceRegistry::new();
        assert_eq!(parse_with(&registry, "fitResize/abc/-5", "").unwrap().len(), 1);
        assert_eq!(
            parse_with(
                &registry,
                "optimize/127.0.0.1:6002|optimize/127.0.0.1:6002/90/png|autoOptimize/127.0.0.1:6002/x",
                "image/avif,image/webp"
            )
            .unwrap()
            .len(),
            3
        );
        let jobs = parse_with(&registry, "proxy/http%3A%2F%2F127.0.0.1%3A1%2Fa.png", "").unwrap();
        assert_eq!(jobs[0].name(), "proxy");
    }

    #[tokio::test]
    async fn fill_after_empty_image_does_not_panic() {
        let registry = SourceRegistry::new();
        let jobs = parse_with(&registry, "fillResize/10/10", "").unwrap();
        let out = execute(Arc::new(Image::blank()), &jobs).await.unwrap();
        assert_eq!((out.width(), out.height()), (0, 0));

        let (registry, _) = registry_with("local");
        let jobs = parse_with(&registry, "local/a.png|fitResize/0/0|fillResize/10/10", "").unwrap();
        let out = execute(Arc::new(Image::blank()), &jobs).await.unwrap();
        assert_eq!((out.width(), out.height()), (0, 0));
    }

    #[test]
    fn resize_limit_is_inclusive() {
        let registry = SourceRegistry::new();
        let chain = format!("fillResize/{0}/{0}", MAX_RESIZE_DIMENSION);
        assert_eq!(parse_with(&registry, &chain, "").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn degenerate_resize_yields_empty_image() {
        let (registry, _) = registry_with("local");
        let jobs = parse_with(&registry, "local/a.png|fitResize/abc/100", "").unwrap();
        let out = execute(Arc::new(Image::blank()), &jobs).await.unwrap();
        assert_eq!((out.width(), out.height()), (0, 0));
    }
}
