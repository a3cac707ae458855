//! Infrastructure layer tests
//!
//! Tests for byte sources and artifact sinks.

use rstest::*;
use sigcarve::domain::entities::FileType;
use sigcarve::domain::repositories::{ArtifactSink, ByteSource, SinkError, SourceError};
use sigcarve::infrastructure::persistence::{LocalFileSink, MemorySink};
use sigcarve::infrastructure::source::{FileSource, MemorySource, MmapSource};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Byte Source Tests
// ============================================================================

#[fixture]
fn temp_file_with_data() -> (TempDir, PathBuf, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_device.img");
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let mut file = fs::File::create(&path).unwrap();
    file.write_all(&data).unwrap();
    file.sync_all().unwrap();

    (dir, path, data)
}

fn open_source(kind: &str, path: &Path, data: &[u8]) -> Box<dyn ByteSource> {
    match kind {
        "file" => Box::new(FileSource::open(path).unwrap()),
        "mmap" => Box::new(MmapSource::open(path).unwrap()),
        _ => Box::new(MemorySource::new(path.display().to_string(), data.to_vec())),
    }
}

#[rstest]
#[case("file")]
#[case("mmap")]
#[case("memory")]
fn test_sources_agree(temp_file_with_data: (TempDir, PathBuf, Vec<u8>), #[case] kind: &str) {
    let (_dir, path, data) = temp_file_with_data;
    let source = open_source(kind, &path, &data);

    assert_eq!(source.len(), 4096);
    assert_eq!(source.id(), path.display().to_string());
    assert_eq!(source.read_vec(256, 256).unwrap(), data[256..512]);
    // Clamped at the end of the source
    assert_eq!(source.read_vec(4000, 500).unwrap(), data[4000..]);
}

#[rstest]
#[case("file")]
#[case("mmap")]
#[case("memory")]
fn test_read_exact_past_end_fails(temp_file_with_data: (TempDir, PathBuf, Vec<u8>), #[case] kind: &str) {
    let (_dir, path, data) = temp_file_with_data;
    let source = open_source(kind, &path, &data);

    let mut buf = vec![0u8; 200];
    assert!(matches!(
        source.read_exact_at(4000, &mut buf),
        Err(SourceError::ReadError { offset: 4096, .. })
    ));
    assert!(matches!(
        source.read_vec(5000, 1),
        Err(SourceError::InvalidOffset { .. })
    ));
}

#[rstest]
fn test_missing_source() {
    assert!(matches!(
        FileSource::open("/nonexistent/path/device"),
        Err(SourceError::NotFound(_))
    ));
    assert!(MmapSource::open("/nonexistent/path/device").is_err());
}

// ============================================================================
// Artifact Sink Tests
// ============================================================================

fn write_artifact(sink: &dyn ArtifactSink, file_type: FileType, name: &str, data: &[u8]) -> PathBuf {
    let mut writer = sink.create(file_type, name).unwrap();
    writer.write_all(data).unwrap();
    writer.commit().unwrap()
}

fn read_artifact(sink: &dyn ArtifactSink, location: &Path) -> Vec<u8> {
    let mut data = Vec::new();
    sink.open(location).unwrap().read_to_end(&mut data).unwrap();
    data
}

#[rstest]
fn test_local_sink_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("nested").join("out");
    let sink = LocalFileSink::new(&root);

    sink.prepare().unwrap();
    assert!(root.is_dir());
    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
}

#[rstest]
fn test_local_sink_overwrites_on_rerun() {
    let dir = TempDir::new().unwrap();
    let sink = LocalFileSink::new(dir.path());
    sink.prepare().unwrap();

    let first = write_artifact(&sink, FileType::Gif, "carved_gif_000000000000.gif", b"first run");
    let second = write_artifact(&sink, FileType::Gif, "carved_gif_000000000000.gif", b"second");

    assert_eq!(first, second);
    assert_eq!(read_artifact(&sink, &second), b"second");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[rstest]
fn test_local_sink_open_missing() {
    let dir = TempDir::new().unwrap();
    let sink = LocalFileSink::new(dir.path());

    assert!(matches!(
        sink.open(&dir.path().join("nope.bin")),
        Err(SinkError::NotFound(_))
    ));
}

#[rstest]
fn test_memory_sink_discards_uncommitted() {
    let sink = MemorySink::new();
    let kept = write_artifact(&sink, FileType::Png, "kept.png", b"kept");

    let mut abandoned = sink.create(FileType::Png, "abandoned.png").unwrap();
    abandoned.write_all(b"half").unwrap();
    drop(abandoned);

    assert_eq!(sink.locations(), vec![kept.clone()]);
    assert_eq!(sink.get(&kept).unwrap(), b"kept");
    assert!(matches!(
        sink.open(Path::new("memory/abandoned.png")),
        Err(SinkError::NotFound(_))
    ));
}
