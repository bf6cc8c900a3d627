use std::path::{Component, Path, PathBuf};
use tokio::fs;
use crate::utils::{PipelineError, PipelineResult};

/// Joins `relative` onto `base` lexically and refuses anything that leaves `base`.
///
/// A leading `/` in `relative` is treated as relative to `base`, the way a
/// request path is. `..` segments are resolved without touching the
/// filesystem; one that would climb above `base` is an error rather than
/// being clamped.
pub fn resolve_within(base: impl AsRef<Path>, relative: &str) -> PipelineResult<PathBuf> {
    let base = base.as_ref();
    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(PipelineError::argument(format!(
                        "File name is invalid: {} escapes {}", relative, base.display()
                    )));
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if segments.is_empty() {
        return Err(PipelineError::argument(format!("File name is invalid: {:?}", relative)));
    }

    let mut resolved = base.to_path_buf();
    resolved.extend(segments);
    Ok(resolved)
}

/// Reads a whole file into memory
pub async fn read_file(path: impl AsRef<Path>) -> PipelineResult<Vec<u8>> {
    fs::read(path.as_ref()).await.map_err(|e| {
        PipelineError::backend(format!("Failed to read {}: {}", path.as_ref().display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_like_a_request_path() {
        let base = Path::new("/srv/images");
        assert_eq!(resolve_within(base, "/a/b.png").unwrap(), base.join("a/b.png"));
        assert_eq!(resolve_within(base, "a/./c/../b.png").unwrap(), base.join("a/b.png"));
    }

    #[test]
    fn rejects_traversal() {
        let base = Path::new("/srv/images");
        assert!(matches!(
            resolve_within(base, "../etc/passwd"),
            Err(PipelineError::Argument(_))
        ));
        assert!(matches!(
            resolve_within(base, "/a/../../secret"),
            Err(PipelineError::Argument(_))
        ));
        assert!(resolve_within(base, "/").is_err());
    }
}
