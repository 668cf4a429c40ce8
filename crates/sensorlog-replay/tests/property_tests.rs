//! Property-based tests for timestamp arithmetic and search

use proptest::prelude::*;
use sensorlog_replay::prelude::*;
use sensorlog_replay::parse_prefix;
use tempfile::TempDir;

fn must<T, E: std::fmt::Debug>(r: std::result::Result<T, E>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("unexpected Err: {e:?}"),
    }
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (-100_000i64..100_000, 0i64..1000).prop_map(|(s, ms)| Timestamp::new(s, ms))
}

/// Strictly increasing millisecond stamps with gaps of at least 2 ms
fn arb_increasing_stamps() -> impl Strategy<Value = Vec<i64>> {
    (0i64..10_000, prop::collection::vec(2i64..500, 1..40)).prop_map(|(start, gaps)| {
        let mut stamps = vec![start];
        let mut t = start;
        for gap in gaps {
            t += gap;
            stamps.push(t);
        }
        stamps
    })
}

fn write_log(dir: &TempDir, stamps: &[i64]) -> std::path::PathBuf {
    let text: String = stamps
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{} rec{i}\n", Timestamp::from_millis(*t)))
        .collect();
    let path = dir.path().join("prop.log");
    must(std::fs::write(&path, text));
    path
}

proptest! {
    #[test]
    fn prop_shift_difference_is_exact(a in arb_timestamp(), d in 0i64..10_000_000) {
        let b = a + d;
        prop_assert_eq!(b.diff_millis(&a), d);
        prop_assert_eq!(a.diff_millis(&b), -d);
        prop_assert!((0..1000).contains(&b.milliseconds()));
        prop_assert_eq!(b - d, a);
    }

    #[test]
    fn prop_negative_shift_borrows(a in arb_timestamp(), d in 0i64..10_000_000) {
        let b = a - d;
        prop_assert!((0..1000).contains(&b.milliseconds()));
        prop_assert_eq!(a.diff_millis(&b), d);
    }

    #[test]
    fn prop_display_parses_back(a in arb_timestamp()) {
        let line = format!("{a} payload");
        let parsed = parse_prefix(line.as_bytes()).map(|(ts, _)| ts);
        prop_assert_eq!(parsed, Some(a));
    }

    #[test]
    fn prop_parse_prefix_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        if let Some((_, payload)) = parse_prefix(&bytes) {
            prop_assert!(payload <= bytes.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_monotonic_replay(stamps in arb_increasing_stamps()) {
        let dir = must(TempDir::new());
        let path = write_log(&dir, &stamps);
        let mut view = TimestampRecordView::new(&path, LogConfig::default());

        for (i, t) in stamps.iter().enumerate() {
            let expected = format!("rec{i}");
            let found = view
                .data_for_timestamp(Timestamp::from_millis(*t), 0)
                .map(|p| String::from_utf8_lossy(p).into_owned());
            prop_assert_eq!(found, Some(expected));

            if i + 1 < stamps.len() {
                let between = view.data_for_timestamp(Timestamp::from_millis(t + 1), 0);
                prop_assert!(between.is_none());
            }
        }
    }

    #[test]
    fn prop_search_is_idempotent(
        stamps in arb_increasing_stamps(),
        offset in -100i64..600,
        tolerance in 0i64..120,
    ) {
        let dir = must(TempDir::new());
        let path = write_log(&dir, &stamps);
        let first_stamp = stamps.first().copied().unwrap_or_default();
        let target = Timestamp::from_millis(first_stamp + offset);

        let mut log = TimestampLog::new(&path, LogConfig::default());
        let first = log.search_for_timestamp(target, tolerance);
        let first_current = log.current();
        let second = log.search_for_timestamp(target, tolerance);
        prop_assert_eq!(first, second);
        if first {
            prop_assert_eq!(first_current, log.current());
        }
    }

    #[test]
    fn prop_match_never_from_future(
        stamps in arb_increasing_stamps(),
        offset in -100i64..600,
        tolerance in 0i64..120,
    ) {
        let dir = must(TempDir::new());
        let path = write_log(&dir, &stamps);
        let first_stamp = stamps.first().copied().unwrap_or_default();
        let target = Timestamp::from_millis(first_stamp + offset);

        let mut log = TimestampLog::new(&path, LogConfig::default());
        if log.search_for_timestamp(target, tolerance) {
            let current = log.current().map(|c| target.diff_millis(&c));
            prop_assert!(matches!(current, Some(lag) if lag >= 0));
        }
    }

    #[test]
    fn prop_sequential_frames_never_seek(count in 1usize..24, frame_size in 1usize..64, start in 0i64..1000) {
        let dir = must(TempDir::new());
        let text: String = (0..count)
            .map(|i| format!("{} {}\n", Timestamp::from_millis(i as i64 * 33), start + i as i64))
            .collect();
        let log = dir.path().join("cam.log");
        must(std::fs::write(&log, text));
        let raw = dir.path().join("cam.raw");
        let bytes: Vec<u8> = (0..count).flat_map(|i| std::iter::repeat_n(i as u8, frame_size)).collect();
        must(std::fs::write(&raw, bytes));

        let mut reader = must(FrameIndexedReader::open(&log, &raw, FrameLayout::single(frame_size), LogConfig::default()));
        for i in 0..count {
            prop_assert!(must(reader.load_frame(Timestamp::from_millis(i as i64 * 33), 0)));
            prop_assert_eq!(reader.frame_bytes().len(), frame_size);
            prop_assert_eq!(reader.frame_bytes().first(), Some(&(i as u8)));
        }
        prop_assert_eq!(reader.raw_stats().seeks, 0);
    }

    #[test]
    fn prop_constant_rate_spacing(end in 0i64..5000, rate in 1.0f64..240.0) {
        let generator = ConstantRateGenerator::from_bounds(Timestamp::ZERO, Timestamp::from_millis(end), rate);
        let step = generator.step_ms();
        let stamps: Vec<i64> = generator.map(|t| t.as_millis()).collect();
        prop_assert_eq!(stamps.first(), Some(&0));
        prop_assert!(stamps.iter().all(|t| *t <= end));
        prop_assert!(stamps.last().is_some_and(|last| last + step > end));
        prop_assert!(stamps.windows(2).all(|w| matches!(w, [a, b] if b - a == step)));
    }
}
