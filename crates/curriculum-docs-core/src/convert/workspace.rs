use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::Result;

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "out";
const PROFILE_DIR: &str = "profile";

/// Request-scoped scratch directory for one conversion.
///
/// The directory name starts with a digest of the input so it can be matched
/// to a request in logs; the random suffix keeps concurrent conversions of the
/// same content apart. Dropping the workspace removes it; [`Workspace::close`]
/// does the same and reports failures.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under the system temporary directory
    pub fn create(content: &[u8]) -> Result<Self> {
        Self::create_in(std::env::temp_dir(), content)
    }

    /// Create a workspace under `parent`
    pub fn create_in(parent: impl AsRef<Path>, content: &[u8]) -> Result<Self> {
        let digest = format!("{:x}", md5::compute(content));
        let dir = tempfile::Builder::new()
            .prefix(&format!("curriculum-docs-{}-", &digest[..12]))
            .tempdir_in(parent)?;

        for sub in [INPUT_DIR, OUTPUT_DIR, PROFILE_DIR] {
            std::fs::create_dir(dir.path().join(sub))?;
        }

        debug!("Created conversion workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join(INPUT_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_DIR)
    }

    /// Private LibreOffice user installation, so concurrent runs never share
    /// a profile lock
    pub fn profile_dir(&self) -> PathBuf {
        self.dir.path().join(PROFILE_DIR)
    }

    /// `file://` URL of the profile directory, as `-env:UserInstallation` expects
    pub fn profile_url(&self) -> String {
        let path = self.profile_dir();
        let encoded: Vec<String> = path
            .to_string_lossy()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("file://{}", encoded.join("/"))
    }

    /// Write the input document and return its path
    pub async fn write_input(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.input_dir().join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Empty the output directory between attempts
    pub async fn reset_output(&self) -> Result<()> {
        let out = self.output_dir();
        tokio::fs::remove_dir_all(&out).await?;
        tokio::fs::create_dir(&out).await?;
        Ok(())
    }

    /// The produced PDF: `<stem>.pdf` if present, else any PDF in the output
    /// directory.
    pub async fn find_pdf(&self, stem: &str) -> Result<Option<PathBuf>> {
        let out = self.output_dir();
        let expected = out.join(format!("{stem}.pdf"));
        if tokio::fs::try_exists(&expected).await? {
            return Ok(Some(expected));
        }

        let mut entries = tokio::fs::read_dir(&out).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if is_pdf {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Remove the workspace, logging instead of failing
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove conversion workspace {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_cleanup() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), b"docx bytes").unwrap();
        let root = workspace.path().to_path_buf();

        assert!(workspace.input_dir().is_dir());
        assert!(workspace.output_dir().is_dir());
        assert!(workspace.profile_dir().is_dir());
        let digest = format!("{:x}", md5::compute(b"docx bytes"));
        let name = root.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("curriculum-docs-{}-", &digest[..12])));

        workspace.close();
        assert!(!root.exists());
    }

    #[test]
    fn test_same_content_gets_distinct_directories() {
        let parent = tempfile::tempdir().unwrap();
        let a = Workspace::create_in(parent.path(), b"same").unwrap();
        let b = Workspace::create_in(parent.path(), b"same").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_profile_url_is_encoded() {
        let parent = tempfile::tempdir().unwrap();
        let spaced = parent.path().join("with space");
        std::fs::create_dir(&spaced).unwrap();
        let workspace = Workspace::create_in(&spaced, b"x").unwrap();

        let url = workspace.profile_url();
        assert!(url.starts_with("file:///"));
        assert!(url.contains("with%20space"));
        assert!(url.ends_with("/profile"));
    }

    #[tokio::test]
    async fn test_find_pdf_prefers_expected_name() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), b"x").unwrap();
        assert!(workspace.find_pdf("syllabus").await.unwrap().is_none());

        std::fs::write(workspace.output_dir().join("other.PDF"), b"%PDF").unwrap();
        let found = workspace.find_pdf("syllabus").await.unwrap().unwrap();
        assert!(found.ends_with("other.PDF"));

        std::fs::write(workspace.output_dir().join("syllabus.pdf"), b"%PDF").unwrap();
        let found = workspace.find_pdf("syllabus").await.unwrap().unwrap();
        assert!(found.ends_with("syllabus.pdf"));

        workspace.reset_output().await.unwrap();
        assert!(workspace.find_pdf("syllabus").await.unwrap().is_none());
    }
}
