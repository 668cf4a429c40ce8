//! Unit tests for stream configuration, statistics and error classification

use sensorlog_stream::config::{DEFAULT_ARCHIVE_EXTENSION, DEFAULT_SEEK_CHUNK_SIZE};
use sensorlog_stream::prelude::*;
use sensorlog_stream::{prefer_compressed, set_prefer_compressed};
use std::io::SeekFrom;
use tempfile::TempDir;

fn must<T, E: std::fmt::Debug>(r: std::result::Result<T, E>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("unexpected Err: {e:?}"),
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_use_7z_command() {
        let config = StreamConfig::default();
        assert_eq!(config.archive_extension, DEFAULT_ARCHIVE_EXTENSION);
        assert_eq!(config.decompressor, Decompressor::command("7z", ["e", "-so"]));
        assert_eq!(config.effective_chunk_size(), DEFAULT_SEEK_CHUNK_SIZE);
    }

    #[test]
    fn test_gzip_preset() {
        let config = StreamConfig::gzip();
        assert_eq!(config.archive_extension, "gz");
        assert_eq!(config.decompressor.name(), "gzip");
    }

    #[test]
    fn test_archive_path_keeps_existing_extension() {
        let config = StreamConfig::default().with_archive_extension("zst");
        assert_eq!(
            config.archive_path(std::path::Path::new("cam0.log")),
            std::path::PathBuf::from("cam0.log.zst")
        );
    }

    #[test]
    fn test_process_wide_flag_is_followed_without_override() {
        let config = StreamConfig::default();
        let original = prefer_compressed();

        set_prefer_compressed(true);
        assert!(config.compressed_first());
        assert!(!config.clone().with_prefer_compressed(false).compressed_first());

        set_prefer_compressed(false);
        assert!(!config.compressed_first());
        assert!(config.with_prefer_compressed(true).compressed_first());

        set_prefer_compressed(original);
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = must(TempDir::new());
        let path = dir.path().join("stream.json");
        must(std::fs::write(
            &path,
            r#"{"archive_extension": "xz", "decompressor": {"kind": "command", "program": "xzcat"}, "seek_chunk_size": 4096}"#,
        ));

        let config = must(StreamConfig::from_json_file(&path));
        assert_eq!(config.archive_extension, "xz");
        assert_eq!(config.decompressor.name(), "xzcat");
        assert_eq!(config.seek_chunk_size, 4096);
        assert_eq!(config.prefer_compressed, None);
    }

    #[test]
    fn test_invalid_json_file_is_io_error() {
        let dir = must(TempDir::new());
        let path = dir.path().join("broken.json");
        must(std::fs::write(&path, "{ not json"));

        let err = match StreamConfig::from_json_file(&path) {
            Ok(config) => panic!("expected error, got {config:?}"),
            Err(e) => e,
        };
        assert_eq!(err.category(), StreamErrorCategory::Io);
    }
}

mod stats_tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_across_reopen() {
        let dir = must(TempDir::new());
        let path = dir.path().join("counted.bin");
        must(std::fs::write(&path, [7u8; 64]));

        let mut stream = must(ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default()));
        let mut buf = [0u8; 16];
        must(stream.read(&mut buf));
        must(stream.seek(SeekFrom::Start(0)));
        must(stream.close());
        must(stream.open(&path, OpenMode::Read));
        must(stream.read(&mut buf));

        let stats = stream.stats();
        assert_eq!(stats.bytes_read, 32);
        assert_eq!(stats.seeks, 1);
        assert_eq!(stats.restarts, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = StreamStats {
            bytes_read: 10,
            bytes_written: 0,
            seeks: 2,
            bytes_discarded: 5,
            restarts: 1,
        };
        assert_eq!(
            stats.to_string(),
            "read=10 written=0 seeks=2 discarded=5 restarts=1"
        );
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            StreamError::not_found("a").category(),
            StreamErrorCategory::Open
        );
        assert_eq!(
            StreamError::unsupported_seek(0, "end-relative seek on a pipe").category(),
            StreamErrorCategory::Position
        );
        assert_eq!(
            StreamError::WrongMode {
                operation: "write",
                mode: OpenMode::Read
            }
            .category(),
            StreamErrorCategory::State
        );
        assert_eq!(StreamErrorCategory::Io.to_string(), "IO");
    }

    #[test]
    fn test_recoverability() {
        assert!(StreamError::NotOpen.is_recoverable());
        assert!(!StreamError::not_found("a").is_recoverable());
        assert!(!StreamError::Io(std::io::Error::other("x")).is_recoverable());
    }

    #[test]
    fn test_read_on_writer_is_wrong_mode() {
        let dir = must(TempDir::new());
        let path = dir.path().join("w.bin");
        let mut stream = must(ByteStream::open_path(&path, OpenMode::Write, StreamConfig::default()));
        let mut line = Vec::new();
        match stream.read_line(&mut line) {
            Err(StreamError::WrongMode { operation, mode }) => {
                assert_eq!(operation, "read_line");
                assert_eq!(mode, OpenMode::Write);
            }
            other => panic!("expected WrongMode, got {other:?}"),
        }
    }
}
