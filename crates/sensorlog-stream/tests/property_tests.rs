//! Property-based tests for stream positioning

use flate2::{Compression, write::GzEncoder};
use proptest::prelude::*;
use sensorlog_stream::prelude::*;
use std::io::{SeekFrom, Write};
use tempfile::TempDir;

fn must<T, E: std::fmt::Debug>(r: std::result::Result<T, E>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("unexpected Err: {e:?}"),
    }
}

fn arb_data() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4096)
}

/// Write `data` both as a plain file and as the gzip sibling of a second path
fn fixtures(dir: &TempDir, data: &[u8]) -> (std::path::PathBuf, std::path::PathBuf) {
    let plain = dir.path().join("plain.bin");
    must(std::fs::write(&plain, data));

    let piped = dir.path().join("piped.bin");
    let archive = StreamConfig::gzip().archive_path(&piped);
    let mut encoder = GzEncoder::new(must(std::fs::File::create(archive)), Compression::fast());
    must(encoder.write_all(data));
    must(encoder.finish());
    (plain, piped)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_forward_seeks_match_plain_file(
        data in arb_data(),
        hops in prop::collection::vec(0u64..512, 1..8),
        chunk in 1usize..300,
    ) {
        let dir = must(TempDir::new());
        let (plain, piped) = fixtures(&dir, &data);
        let config = StreamConfig { seek_chunk_size: chunk, ..StreamConfig::gzip() };

        let mut file = must(ByteStream::open_path(&plain, OpenMode::Read, config.clone()));
        let mut pipe = must(ByteStream::open_path(&piped, OpenMode::Read, config));
        prop_assert!(pipe.is_pipe());

        let len = data.len() as u64;
        let mut target = 0u64;
        for hop in hops {
            target = (target + hop).min(len);
            prop_assert_eq!(must(pipe.seek(SeekFrom::Start(target))), target);
            prop_assert_eq!(must(file.seek(SeekFrom::Start(target))), target);

            let mut a = [0u8; 3];
            let mut b = [0u8; 3];
            let na = must(pipe.read(&mut a));
            let nb = must(file.read(&mut b));
            prop_assert_eq!(na, nb);
            prop_assert_eq!(&a[..na], &b[..nb]);
            target += na as u64;
            prop_assert_eq!(pipe.tell(), Some(target));
        }
    }

    #[test]
    fn prop_backward_pipe_seek_keeps_position(
        data in arb_data(),
        forward in 1u64..4096,
        back in 1u64..4096,
    ) {
        let dir = must(TempDir::new());
        let (_plain, piped) = fixtures(&dir, &data);
        let mut pipe = must(ByteStream::open_path(&piped, OpenMode::Read, StreamConfig::gzip()));

        let forward = forward.min(data.len() as u64);
        must(pipe.seek(SeekFrom::Start(forward)));
        let back = back.min(forward);

        let absolute = pipe.seek(SeekFrom::Start(forward - back));
        prop_assert!(
            matches!(absolute, Err(StreamError::UnsupportedSeek { .. })),
            "expected UnsupportedSeek, got {:?}",
            absolute
        );
        let relative = pipe.seek(SeekFrom::Current(-(back as i64)));
        prop_assert!(
            matches!(relative, Err(StreamError::UnsupportedSeek { .. })),
            "expected UnsupportedSeek, got {:?}",
            relative
        );
        prop_assert_eq!(pipe.tell(), Some(forward));
    }
}
