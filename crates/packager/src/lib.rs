// Artifact assembly: one index.html in a staging directory, packaged as a zip

use sha2::{Digest, Sha256};
use sitedrop_core::PipelineError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Directory inside the staging dir holding the site files
pub const BUILD_DIR: &str = "build";
pub const INDEX_FILE: &str = "index.html";
/// Archive file name, written next to the build directory
pub const ARCHIVE_FILE: &str = "site.zip";

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to walk build directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("packaging task aborted: {0}")]
    Task(String),
}

impl From<PackagingError> for PipelineError {
    fn from(err: PackagingError) -> Self {
        PipelineError::Packaging(err.to_string())
    }
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> PackagingError {
    let path = path.to_path_buf();
    move |source| PackagingError::Io {
        action,
        path,
        source,
    }
}

/// Capability: compress a directory tree into a single archive file.
pub trait Archiver: Send + Sync {
    fn compress_dir(&self, src_dir: &Path, archive_path: &Path) -> Result<(), PackagingError>;
}

/// In-process deflate zip. Entries are relative to `src_dir`, so the
/// directory's own files end up at the archive root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    fn write_entries(&self, src_dir: &Path, file: File) -> Result<(), PackagingError> {
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for entry in WalkDir::new(src_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry_name(src_dir, path);
            zip.start_file(name, options)?;

            let mut f = File::open(path).map_err(io_err("open", path))?;
            io::copy(&mut f, &mut zip).map_err(io_err("compress", path))?;
        }

        zip.finish()?;
        Ok(())
    }
}

impl Archiver for ZipArchiver {
    fn compress_dir(&self, src_dir: &Path, archive_path: &Path) -> Result<(), PackagingError> {
        let file = File::create(archive_path).map_err(io_err("create", archive_path))?;

        let result = self.write_entries(src_dir, file);
        if result.is_err() {
            // Never leave a half-written archive behind
            let _ = fs::remove_file(archive_path);
        }
        result
    }
}

/// Zip entry name with forward slashes regardless of platform
fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A packaged site ready for upload
#[derive(Debug, Clone)]
pub struct Artifact {
    pub index_path: PathBuf,
    pub archive_path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the archive, for logs
    pub sha256: String,
}

/// Materializes HTML into a staging directory and packages it
#[derive(Clone)]
pub struct ArtifactBuilder {
    archiver: Arc<dyn Archiver>,
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        Self::new(Arc::new(ZipArchiver))
    }
}

impl ArtifactBuilder {
    pub fn new(archiver: Arc<dyn Archiver>) -> Self {
        Self { archiver }
    }

    /// Write `html` as `{staging}/build/index.html` and archive the build
    /// directory into `{staging}/site.zip`.
    ///
    /// Re-running against the same staging dir overwrites the page and
    /// replaces the archive; content never accumulates.
    pub fn build_blocking(&self, html: &str, staging_dir: &Path) -> Result<Artifact, PackagingError> {
        let build_dir = staging_dir.join(BUILD_DIR);
        fs::create_dir_all(&build_dir).map_err(io_err("create directory", &build_dir))?;

        let index_path = build_dir.join(INDEX_FILE);
        fs::write(&index_path, html.as_bytes()).map_err(io_err("write", &index_path))?;
        debug!(path = %index_path.display(), bytes = html.len(), "Wrote index.html");

        let archive_path = staging_dir.join(ARCHIVE_FILE);
        if archive_path.exists() {
            fs::remove_file(&archive_path).map_err(io_err("remove stale archive", &archive_path))?;
            debug!(path = %archive_path.display(), "Removed stale archive");
        }

        self.archiver.compress_dir(&build_dir, &archive_path)?;

        let (size, sha256) = digest(&archive_path)?;
        info!(
            path = %archive_path.display(),
            size,
            sha256 = %sha256,
            "Created site archive"
        );

        Ok(Artifact {
            index_path,
            archive_path,
            size,
            sha256,
        })
    }

    /// Async wrapper running [`Self::build_blocking`] on the blocking pool
    pub async fn build(&self, html: String, staging_dir: PathBuf) -> Result<Artifact, PackagingError> {
        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.build_blocking(&html, &staging_dir))
            .await
            .map_err(|e| PackagingError::Task(e.to_string()))?
    }
}

fn digest(path: &Path) -> Result<(u64, String), PackagingError> {
    let mut file = File::open(path).map_err(io_err("open", path))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).map_err(io_err("read", path))?;
    Ok((size, format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitedrop_core::Stage;
    use std::io::Read;

    fn read_archive(path: &Path) -> Vec<(String, String)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_build_single_index() {
        let staging = tempfile::tempdir().unwrap();
        let artifact = ArtifactBuilder::default()
            .build_blocking("<html>Hello</html>", staging.path())
            .unwrap();

        assert_eq!(artifact.archive_path, staging.path().join("site.zip"));
        assert_eq!(
            read_archive(&artifact.archive_path),
            vec![("index.html".to_string(), "<html>Hello</html>".to_string())]
        );
        assert_eq!(artifact.sha256.len(), 64);
        assert!(artifact.size > 0);
    }

    #[test]
    fn test_index_bytes_are_verbatim() {
        let html = "<!doctype html>\r\n<p>héllo — 世界 \u{1F680}</p>\n\n";
        let staging = tempfile::tempdir().unwrap();
        let artifact = ArtifactBuilder::default()
            .build_blocking(html, staging.path())
            .unwrap();

        assert_eq!(fs::read(&artifact.index_path).unwrap(), html.as_bytes());
        assert_eq!(read_archive(&artifact.archive_path)[0].1, html);
    }

    #[test]
    fn test_rebuild_overwrites() {
        let staging = tempfile::tempdir().unwrap();
        let builder = ArtifactBuilder::default();

        builder
            .build_blocking("<html>first, and a bit longer</html>", staging.path())
            .unwrap();
        let artifact = builder.build_blocking("<html>second</html>", staging.path()).unwrap();

        assert_eq!(
            fs::read_to_string(&artifact.index_path).unwrap(),
            "<html>second</html>"
        );
        assert_eq!(
            read_archive(&artifact.archive_path),
            vec![("index.html".to_string(), "<html>second</html>".to_string())]
        );
    }

    #[test]
    fn test_stale_archive_is_replaced() {
        let staging = tempfile::tempdir().unwrap();
        fs::write(staging.path().join(ARCHIVE_FILE), b"not a zip at all").unwrap();

        let artifact = ArtifactBuilder::default()
            .build_blocking("<p>fresh</p>", staging.path())
            .unwrap();
        assert_eq!(read_archive(&artifact.archive_path)[0].1, "<p>fresh</p>");
    }

    #[test]
    fn test_staging_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("nested").join("deeper");
        let artifact = ArtifactBuilder::default()
            .build_blocking("<p/>", &staging)
            .unwrap();
        assert!(artifact.index_path.starts_with(&staging));
    }

    #[test]
    fn test_unwritable_staging_is_packaging_error() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let err = ArtifactBuilder::default()
            .build_blocking("<p/>", &blocker)
            .unwrap_err();
        assert!(matches!(err, PackagingError::Io { .. }));
        assert_eq!(PipelineError::from(err).stage(), Stage::Packaging);
    }

    struct FailingArchiver;

    impl Archiver for FailingArchiver {
        fn compress_dir(&self, _src: &Path, archive_path: &Path) -> Result<(), PackagingError> {
            Err(PackagingError::Io {
                action: "create",
                path: archive_path.to_path_buf(),
                source: io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn test_archiver_failure_propagates() {
        let staging = tempfile::tempdir().unwrap();
        let err = ArtifactBuilder::new(Arc::new(FailingArchiver))
            .build_blocking("<p/>", staging.path())
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(!staging.path().join(ARCHIVE_FILE).exists());
    }

    #[test]
    fn test_entry_names_use_forward_slashes() {
        let root = Path::new("/tmp/build");
        assert_eq!(entry_name(root, &root.join("index.html")), "index.html");
        assert_eq!(entry_name(root, &root.join("a").join("b.css")), "a/b.css");
    }

    #[tokio::test]
    async fn test_async_build() {
        let staging = tempfile::tempdir().unwrap();
        let artifact = ArtifactBuilder::default()
            .build("<html>async</html>".to_string(), staging.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(read_archive(&artifact.archive_path)[0].1, "<html>async</html>");
    }
}
