//! Stress tests for the shared stores
//!
//! Every published set carries one canary value on all of its channels. A
//! reader that ever sees two different values in one set has observed a
//! torn publish.

mod common;

use common::builders::RecordBuilder;
use chrono::Utc;
use gascal_rs::store::{CalibrationLedger, FileReadingStore, MemoryReadingStore, ReadingStore};
use gascal_rs::types::{ChannelReading, SampleSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const PUBLISHES: u32 = 300;
const READERS: usize = 3;

fn canary_set(value: f64) -> SampleSet {
    SampleSet::new(
        Utc::now(),
        (0..4u8)
            .map(|channel| ChannelReading::available(channel, value))
            .collect(),
    )
}

fn stress<S, F>(writer: Arc<S>, open_reader: F)
where
    S: ReadingStore + 'static,
    F: Fn() -> Arc<dyn ReadingStore>,
{
    writer.publish(&canary_set(0.0)).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let store = open_reader();
            let done = done.clone();
            thread::spawn(move || {
                let mut last: f64 = 0.0;
                let mut reads = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let set = store
                        .current()
                        .expect("read must not fail")
                        .expect("a set was published before readers started");
                    let first = set.readings[0].millivolts.unwrap();
                    for reading in &set.readings {
                        assert_eq!(reading.millivolts, Some(first), "torn read");
                    }
                    // Single writer, so values never go backwards
                    assert!(first >= last);
                    last = first;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for i in 1..=PUBLISHES {
        writer.publish(&canary_set(i as f64)).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        let reads = reader.join().expect("reader panicked");
        assert!(reads > 0);
    }
    assert_eq!(
        writer.current().unwrap().unwrap().readings[0].millivolts,
        Some(PUBLISHES as f64)
    );
}

#[test]
fn test_file_store_has_no_torn_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample_set.json");
    let writer = Arc::new(FileReadingStore::new(&path));

    // Readers use their own handles, as another process would
    stress(writer, || -> Arc<dyn ReadingStore> {
        Arc::new(FileReadingStore::new(&path))
    });
}

#[test]
fn test_memory_store_has_no_torn_reads() {
    let store = Arc::new(MemoryReadingStore::new());
    let shared = store.clone();
    stress(store, move || -> Arc<dyn ReadingStore> { shared.clone() });
}

#[test]
fn test_ledger_reads_during_appends_see_whole_records() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(CalibrationLedger::open(dir.path().join("calibration.jsonl")));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let path = ledger.path().to_path_buf();
        let done = done.clone();
        thread::spawn(move || {
            let ledger = CalibrationLedger::open(path);
            let mut seen = 0;
            while !done.load(Ordering::SeqCst) {
                let history = ledger.history().unwrap();
                assert!(history.len() >= seen, "records never disappear");
                seen = history.len();
                for record in &history {
                    assert_eq!(record.gains[0].gain, record.gains[1].gain);
                }
            }
        })
    };

    for i in 0..100 {
        let gain = 0.04 + i as f64 * 1e-4;
        ledger
            .append(&RecordBuilder::accepted().gain(0, gain).gain(3, gain).build())
            .unwrap();
    }
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    assert_eq!(ledger.len().unwrap(), 100);
}
