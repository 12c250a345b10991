//! Upload ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::{FileError, FileResult};
use super::guard::{base_name, PathGuard};

/// Resolves upload destinations and writes incoming streams to disk.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    guard: PathGuard,
    default_dir: PathBuf,
}

impl UploadIngestor {
    /// `default_dir` receives uploads that name no target path.
    pub fn new(guard: PathGuard, default_dir: PathBuf) -> Self {
        Self { guard, default_dir }
    }

    /// Work out where an upload lands and make sure its directory exists.
    ///
    /// The directory is the parent of `target`, or the default upload
    /// directory. The file name comes from the multipart `file_name` when
    /// present, otherwise from the base name of `target`.
    pub fn prepare(&self, target: Option<&str>, file_name: Option<&str>) -> FileResult<PathBuf> {
        let target = target.filter(|t| !t.is_empty());

        let dir = match target {
            Some(target) => {
                let target_path = self.guard.check(target)?;
                let parent = target_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or(target_path);
                self.guard.check(&parent.to_string_lossy())?
            }
            None => self.guard.check(&self.default_dir.to_string_lossy())?,
        };

        let name = match file_name.filter(|n| !n.is_empty()) {
            Some(raw) => reduce_file_name(&fix_latin1(raw)),
            None => target.and_then(base_name),
        }
        .ok_or_else(|| FileError::InvalidRequest("Invalid file name".to_string()))?;

        if !dir.is_dir() {
            fs::create_dir_all(&dir).map_err(|e| FileError::io(&dir, e))?;
            debug!(path = %dir.display(), "Created upload directory");
        }

        Ok(dir.join(name))
    }

    /// Write `body` to `destination`, replacing any existing file.
    ///
    /// The body lands in a `.<name>.part` sibling first and is renamed over
    /// `destination` once complete, so a failed upload leaves any previous
    /// file untouched. Returns the number of bytes written.
    pub async fn persist<S, E>(&self, destination: &Path, body: S) -> FileResult<u64>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let part = part_path(destination);

        let written = match write_part(&part, body).await {
            Ok(written) => written,
            Err(e) => {
                discard_part(&part).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&part, destination).await {
            discard_part(&part).await;
            return Err(FileError::io(destination, e));
        }

        info!(path = %destination.display(), bytes = written, "Stored upload");
        Ok(written)
    }
}

async fn write_part<S, E>(part: &Path, body: S) -> FileResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| FileError::io(part, e))?;

    let mut written = 0u64;
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FileError::io(part, std::io::Error::other(e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| FileError::io(part, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| FileError::io(part, e))?;
    Ok(written)
}

async fn discard_part(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %part.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

/// Sibling of `destination` that receives the body while it streams in.
fn part_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.part"))
}

/// Re-decode a name whose UTF-8 bytes were read as one Latin-1 char each.
///
/// Returns the input unchanged when it is not such a mis-decoding.
pub fn fix_latin1(name: &str) -> String {
    if name.is_ascii() || name.chars().any(|c| c as u32 > 0xFF) {
        return name.to_string();
    }
    let bytes: Vec<u8> = name.chars().map(|c| c as u32 as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| name.to_string())
}

/// Keep only the final path component; reject empty, `.` and `..`.
fn reduce_file_name(name: &str) -> Option<String> {
    let unified = name.replace('\\', "/");
    match unified.rsplit('/').next() {
        None | Some("") | Some(".") | Some("..") => None,
        Some(last) => Some(last.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::TempDir;

    fn setup() -> (TempDir, UploadIngestor) {
        let temp_dir = TempDir::new().unwrap();
        let ingestor = UploadIngestor::new(
            PathGuard::new(Some(&temp_dir.path().to_string_lossy())),
            temp_dir.path().join("uploads"),
        );
        (temp_dir, ingestor)
    }

    #[test]
    fn test_fix_latin1() {
        // "café" sent as UTF-8 bytes, read back one char per byte.
        assert_eq!(fix_latin1("cafÃ©.txt"), "café.txt");
        assert_eq!(fix_latin1("plain.txt"), "plain.txt");
        // Genuine Latin-1 that is not valid UTF-8 stays untouched.
        assert_eq!(fix_latin1("naïve.txt"), "naïve.txt");
        // Already proper Unicode beyond Latin-1.
        assert_eq!(fix_latin1("文件.txt"), "文件.txt");
    }

    #[test]
    fn test_reduce_file_name() {
        assert_eq!(reduce_file_name("a/b/c.txt").as_deref(), Some("c.txt"));
        assert_eq!(reduce_file_name("..\\..\\evil.sh").as_deref(), Some("evil.sh"));
        assert_eq!(reduce_file_name(".."), None);
        assert_eq!(reduce_file_name("dir/"), None);
    }

    #[test]
    fn test_prepare_uses_target_parent() {
        let (temp_dir, ingestor) = setup();
        let target = temp_dir.path().join("new").join("photo.jpg");

        let destination = ingestor
            .prepare(Some(&target.to_string_lossy()), Some("IMG_001.jpg"))
            .unwrap();

        assert_eq!(destination, temp_dir.path().join("new").join("IMG_001.jpg"));
        assert!(temp_dir.path().join("new").is_dir());
    }

    #[test]
    fn test_prepare_falls_back_to_target_name() {
        let (temp_dir, ingestor) = setup();
        let target = temp_dir.path().join("photo.jpg");

        let destination = ingestor
            .prepare(Some(&target.to_string_lossy()), None)
            .unwrap();
        assert_eq!(destination, target);
    }

    #[test]
    fn test_prepare_default_dir() {
        let (temp_dir, ingestor) = setup();

        let destination = ingestor.prepare(None, Some("notes.md")).unwrap();
        assert_eq!(destination, temp_dir.path().join("uploads").join("notes.md"));
        assert!(temp_dir.path().join("uploads").is_dir());
    }

    #[test]
    fn test_prepare_rejections() {
        let (temp_dir, ingestor) = setup();

        assert!(matches!(
            ingestor.prepare(Some("/etc/passwd"), Some("x")),
            Err(FileError::NotSafe)
        ));
        // The root itself has a parent outside the root.
        assert!(matches!(
            ingestor.prepare(Some(&temp_dir.path().to_string_lossy()), Some("x")),
            Err(FileError::NotSafe)
        ));
        assert!(matches!(
            ingestor.prepare(None, Some("..")),
            Err(FileError::InvalidRequest(_))
        ));
        assert!(matches!(
            ingestor.prepare(None, None),
            Err(FileError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_overwrites() {
        let (temp_dir, ingestor) = setup();
        let destination = temp_dir.path().join("out.txt");
        fs::write(&destination, "old content that is longer").unwrap();

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let written = ingestor
            .persist(&destination, stream::iter(chunks))
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_persist_body_error() {
        let (temp_dir, ingestor) = setup();
        let destination = temp_dir.path().join("broken.bin");

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ];
        let result = ingestor.persist(&destination, stream::iter(chunks)).await;

        assert!(matches!(result, Err(FileError::Io { .. })));
        assert!(!destination.exists());
        assert!(!part_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_existing_file() {
        let (temp_dir, ingestor) = setup();
        let destination = temp_dir.path().join("thesis.docx");
        fs::write(&destination, "final draft").unwrap();

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"par")),
            Err(std::io::Error::other("client disconnected")),
        ];
        let result = ingestor.persist(&destination, stream::iter(chunks)).await;

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "final draft");
        assert!(!part_path(&destination).exists());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/srv/data/a.txt")),
            PathBuf::from("/srv/data/.a.txt.part")
        );
    }
}
