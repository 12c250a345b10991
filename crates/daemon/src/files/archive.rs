//! Streamed ZIP archives for multi-item and directory downloads.
//!
//! The archive is never materialized on disk. A blocking producer walks the
//! requested paths, compresses them into a [`ChannelWriter`] and the writer
//! forwards fixed-size chunks through a bounded channel to the response body.
//! A slow client applies backpressure through the channel; a client that goes
//! away drops the receiver, the next write fails and the producer stops.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::{FileError, FileResult};
use super::guard::{base_name, normalize, PathGuard};

/// Size of each chunk handed to the response body.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between producer and response body.
pub const CHANNEL_CAPACITY: usize = 8;

/// Deflate level used for every entry.
const COMPRESSION_LEVEL: i64 = 9;

/// One entry of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveItem {
    /// A regular file stored under `name`.
    File { source: PathBuf, name: String },
    /// An empty directory marker; `name` ends with `/`.
    EmptyDir { name: String },
}

impl ArchiveItem {
    pub fn name(&self) -> &str {
        match self {
            ArchiveItem::File { name, .. } | ArchiveItem::EmptyDir { name } => name,
        }
    }
}

/// Name offered to the client for an archive of `paths`, with `.zip`.
///
/// One path uses its own base name, several paths use the base name of the
/// first path's parent, and anything else falls back to `download`.
pub fn download_name(paths: &[String]) -> String {
    let stem = match paths {
        [] => None,
        [only] => base_name(only),
        [first, ..] => {
            let normalized = normalize(first);
            Path::new(&normalized)
                .parent()
                .and_then(|parent| base_name(&parent.to_string_lossy()))
        }
    };
    format!("{}.zip", stem.unwrap_or_else(|| "download".to_string()))
}

/// Builds and streams ZIP archives behind a [`PathGuard`].
#[derive(Debug, Clone)]
pub struct ArchiveStreamer {
    guard: PathGuard,
}

impl ArchiveStreamer {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// Validate `paths` and start streaming their archive.
    ///
    /// Must be called from within a Tokio runtime. Errors returned here
    /// happen before any byte is produced; later failures terminate the
    /// returned stream with an `Err` item.
    pub fn stream(
        &self,
        paths: Vec<String>,
    ) -> FileResult<impl Stream<Item = io::Result<Bytes>> + Send + 'static> {
        let (body, _producer) = self.spawn(paths)?;
        Ok(body)
    }

    /// Like [`stream`](Self::stream), also returning the producer task.
    fn spawn(
        &self,
        paths: Vec<String>,
    ) -> FileResult<(
        impl Stream<Item = io::Result<Bytes>> + Send + 'static,
        JoinHandle<()>,
    )> {
        if paths.is_empty() {
            return Err(FileError::InvalidRequest("No files to download".to_string()));
        }
        let sources = self.sources(&paths)?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let producer = tokio::task::spawn_blocking(move || produce(sources, tx));

        let body = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok((body, producer))
    }

    fn sources(&self, paths: &[String]) -> FileResult<Vec<PathBuf>> {
        paths.iter().map(|p| self.guard.check(p)).collect()
    }

    /// List what an archive of `paths` would contain, in write order.
    #[cfg(test)]
    fn plan(&self, paths: &[String]) -> FileResult<Vec<ArchiveItem>> {
        Ok(plan_items(&self.sources(paths)?))
    }
}

fn produce(sources: Vec<PathBuf>, tx: mpsc::Sender<io::Result<Bytes>>) {
    let items = plan_items(&sources);
    debug!(entries = items.len(), "Streaming archive");

    let mut writer = ChannelWriter::new(tx.clone());
    match write_archive(&items, &mut writer) {
        Ok(()) => {}
        Err(FileError::Io { source, .. }) if source.kind() == ErrorKind::BrokenPipe => {
            debug!("Client went away, archive aborted");
        }
        Err(e) => {
            warn!(error = %e, "Archive streaming failed");
            // The receiver may already be gone; nothing else to tell it.
            let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
        }
    }
}

/// Expand top-level sources into archive items.
///
/// Missing sources are skipped silently.
pub fn plan_items(sources: &[PathBuf]) -> Vec<ArchiveItem> {
    let mut items = Vec::new();
    for source in sources {
        let Some(name) = base_name(&source.to_string_lossy()) else {
            continue;
        };
        plan_path(source, name, &mut items);
    }
    items
}

fn plan_path(path: &Path, name: String, items: &mut Vec<ArchiveItem>) {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping missing archive source");
            return;
        }
    };

    if !metadata.is_dir() {
        items.push(ArchiveItem::File {
            source: path.to_path_buf(),
            name,
        });
        return;
    }

    let mut children: Vec<(PathBuf, String)> = match fs::read_dir(path) {
        Ok(read_dir) => read_dir
            .filter_map(|child| child.ok())
            .map(|child| {
                (
                    child.path(),
                    child.file_name().to_string_lossy().into_owned(),
                )
            })
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read directory for archive");
            Vec::new()
        }
    };

    if children.is_empty() {
        items.push(ArchiveItem::EmptyDir {
            name: format!("{name}/"),
        });
        return;
    }

    children.sort_by(|a, b| a.1.cmp(&b.1));
    for (child_path, child_name) in children {
        plan_path(&child_path, format!("{name}/{child_name}"), items);
    }
}

/// Write `items` as a streamed ZIP into `writer`.
pub fn write_archive<W: Write>(items: &[ArchiveItem], writer: W) -> FileResult<()> {
    let mut zip = ZipWriter::new_stream(writer);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    for item in items {
        match item {
            ArchiveItem::EmptyDir { name } => {
                zip.add_directory(name.as_str(), options)
                    .map_err(|e| zip_error(Path::new(name), e))?;
            }
            ArchiveItem::File { source, name } => {
                let mut file = match File::open(source) {
                    Ok(file) => file,
                    Err(e) => {
                        debug!(path = %source.display(), error = %e, "Skipping unreadable file");
                        continue;
                    }
                };
                let large = file
                    .metadata()
                    .map(|m| m.len() >= u32::MAX as u64)
                    .unwrap_or(false);

                zip.start_file(name.as_str(), options.large_file(large))
                    .map_err(|e| zip_error(source, e))?;
                io::copy(&mut file, &mut zip).map_err(|e| FileError::io(source, e))?;
            }
        }
    }

    let mut inner = zip
        .finish()
        .map_err(|e| zip_error(Path::new("archive"), e))?;
    inner
        .flush()
        .map_err(|e| FileError::io(Path::new("archive"), e))
}

fn zip_error(path: &Path, error: ZipError) -> FileError {
    let source = match error {
        ZipError::Io(e) => e,
        other => io::Error::other(other),
    };
    FileError::io(path, source)
}

/// A [`Write`] sink that forwards fixed-size chunks into a bounded channel.
///
/// Blocks when the channel is full. Once the receiver is dropped every write
/// fails with [`ErrorKind::BrokenPipe`].
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: BytesMut,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
        }
    }

    fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "archive receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(io::Error::new(
                ErrorKind::BrokenPipe,
                "archive receiver dropped",
            ));
        }
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= CHUNK_SIZE {
            let chunk = self.buffer.split_to(CHUNK_SIZE).freeze();
            self.send(chunk)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        self.send(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn s(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn streamer_for(temp_dir: &TempDir) -> ArchiveStreamer {
        ArchiveStreamer::new(PathGuard::new(Some(&s(temp_dir.path()))))
    }

    fn sample_tree(temp_dir: &TempDir) -> PathBuf {
        let dir = temp_dir.path().join("dirA");
        fs::create_dir_all(dir.join("empty")).unwrap();
        fs::write(dir.join("a.txt"), "alpha").unwrap();
        fs::write(dir.join("b.txt"), "bravo").unwrap();
        dir
    }

    async fn collect(stream: impl Stream<Item = io::Result<Bytes>>) -> Vec<u8> {
        let chunks: Vec<io::Result<Bytes>> = stream.collect().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name(&["/srv/data/photos".into()]), "photos.zip");
        assert_eq!(
            download_name(&["/srv/data/a.txt".into(), "/srv/data/b.txt".into()]),
            "data.zip"
        );
        assert_eq!(download_name(&["/".into()]), "download.zip");
        assert_eq!(download_name(&["/a".into(), "/b".into()]), "download.zip");
        assert_eq!(download_name(&[]), "download.zip");
    }

    #[test]
    fn test_plan_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = sample_tree(&temp_dir);

        let items = streamer_for(&temp_dir).plan(&[s(&dir)]).unwrap();
        let names: Vec<&str> = items.iter().map(ArchiveItem::name).collect();

        assert_eq!(names, vec!["dirA/a.txt", "dirA/b.txt", "dirA/empty/"]);
    }

    #[test]
    fn test_plan_skips_missing_and_marks_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("nothing");
        fs::create_dir(&empty).unwrap();

        let items = streamer_for(&temp_dir)
            .plan(&[s(&temp_dir.path().join("ghost")), s(&empty)])
            .unwrap();

        assert_eq!(
            items,
            vec![ArchiveItem::EmptyDir {
                name: "nothing/".to_string()
            }]
        );
    }

    #[test]
    fn test_plan_rejects_unsafe() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            streamer_for(&temp_dir).plan(&["/etc".to_string()]),
            Err(FileError::NotSafe)
        ));
    }

    #[test]
    fn test_write_archive_contents() {
        let temp_dir = TempDir::new().unwrap();
        let dir = sample_tree(&temp_dir);
        let items = plan_items(&[dir]);

        let mut buffer = Vec::new();
        write_archive(&items, &mut buffer).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(buffer)).unwrap();
        assert_eq!(archive.len(), 3);

        let mut contents = String::new();
        archive
            .by_name("dirA/a.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "alpha");

        let marker = archive.by_name("dirA/empty/").unwrap();
        assert!(marker.is_dir());
        assert_eq!(marker.size(), 0);
    }

    #[tokio::test]
    async fn test_stream_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = sample_tree(&temp_dir);

        let stream = streamer_for(&temp_dir).stream(vec![s(&dir)]).unwrap();
        let bytes = collect(stream).await;

        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);
    }

    #[tokio::test]
    async fn test_stream_large_file_in_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noise.bin");
        let data: Vec<u8> = (0..600_000u32).map(|i| (i * 31 % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let stream = streamer_for(&temp_dir).stream(vec![s(&path)]).unwrap();
        let chunks: Vec<io::Result<Bytes>> = stream.collect().await;
        assert!(chunks.iter().all(|c| c.as_ref().unwrap().len() <= CHUNK_SIZE));

        let bytes: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap()).collect();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut roundtrip = Vec::new();
        archive
            .by_name("noise.bin")
            .unwrap()
            .read_to_end(&mut roundtrip)
            .unwrap();
        assert_eq!(roundtrip, data);
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_producer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("random.bin");
        // Poorly compressible, so the archive outgrows the channel.
        let mut state = 0x2545_f491_u32;
        let data: Vec<u8> = (0..8 * 1024 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        fs::write(&path, &data).unwrap();

        let (body, producer) = streamer_for(&temp_dir).spawn(vec![s(&path)]).unwrap();
        let mut body = Box::pin(body);
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first.len(), CHUNK_SIZE);
        drop(body);

        tokio::time::timeout(std::time::Duration::from_secs(30), producer)
            .await
            .expect("producer did not stop after the body was dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_requires_paths() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            streamer_for(&temp_dir).stream(Vec::new()),
            Err(FileError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_channel_writer_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ChannelWriter::new(tx);

        let err = writer.write(b"data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_channel_writer_flushes_remainder() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut writer = ChannelWriter::new(tx);

        writer.write_all(&vec![1u8; CHUNK_SIZE + 10]).unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(rx.blocking_recv().unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(rx.blocking_recv().unwrap().unwrap().len(), 10);
        assert!(rx.blocking_recv().is_none());
    }
}
