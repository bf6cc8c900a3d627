use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;

use super::Source;
use crate::core::Image;
use crate::utils::{read_file, require_params, resolve_within, PipelineResult};

/// Reads images from a directory; lookups can not leave it.
#[derive(Debug, Clone)]
pub struct FileSource {
    base_path: PathBuf,
}

impl FileSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}

#[async_trait]
impl Source for FileSource {
    /// `params[0]` is the path relative to the base directory.
    async fn find(&self, params: &[String]) -> PipelineResult<Arc<Image>> {
        require_params(params, 1, "file")?;
        let path = resolve_within(&self.base_path, &params[0])?;
        debug!("Reading image file {}", path.display());
        let data = read_file(&path).await?;
        Image::decode(data).await
    }

    async fn close(&self) -> PipelineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::png_data;
    use crate::utils::PipelineError;

    #[tokio::test]
    async fn finds_files_under_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.png"), png_data(829, 846)).unwrap();

        let source = FileSource::new(dir.path());
        let img = source.find(&["/test.png".to_string()]).await.unwrap();
        assert_eq!((img.width(), img.height()), (829, 846));
    }

    #[tokio::test]
    async fn refuses_to_escape_base() {
        let outer = tempfile::tempdir().unwrap();
        let base = outer.path().join("images");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(outer.path().join("secret.png"), png_data(4, 4)).unwrap();

        let source = FileSource::new(&base);
        let err = source.find(&["../secret.png".to_string()]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
    }

    #[tokio::test]
    async fn missing_params_and_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert!(matches!(source.find(&[]).await, Err(PipelineError::Argument(_))));
        assert!(matches!(
            source.find(&["nope.png".to_string()]).await,
            Err(PipelineError::Backend(_))
        ));
    }
}
