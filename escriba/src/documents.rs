use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Load an externally converted document as opaque plain text.
///
/// Document conversion (PDF etc.) happens outside this system; by the time a
/// file reaches here it is UTF-8 text, shape-identical to extracted web text.
pub async fn load_document_text(path: &Path) -> Result<String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read document: {}", path.display()))?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        anyhow::bail!("document '{}' is empty", path.display());
    }

    info!(path = %path.display(), chars = trimmed.len(), "loaded document text");
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_and_trims_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.txt");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(b"\n  Converted document text.  \n").expect("write");

        let text = load_document_text(&path).await.expect("load");
        assert_eq!(text, "Converted document text.");
    }

    #[tokio::test]
    async fn empty_document_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.txt");
        std::fs::File::create(&path).expect("create");

        assert!(load_document_text(&path).await.is_err());
    }

    #[tokio::test]
    async fn missing_document_is_an_error() {
        assert!(load_document_text(Path::new("/no/such/file.txt")).await.is_err());
    }
}
