//! Inventory behavior against real directories.
//!
//! These tests drive the public API only: build an inventory from a spec,
//! mutate a temp directory, rescan, and check what the inventory reports.

use chrono::{TimeZone, Utc};
use datastock_inventory::{
    extract, ChangeReport, Enumerator, FileHandle, FileStream, Inventory, PartitionSpec, Partitioner,
    ProtoChoice, ScanTarget, TimeDuration, TriggerEvent, TriggerKind,
};
use filetime::{set_file_mtime, FileTime};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn create_test_file(dir: &Path, name: &str, mtime_secs: i64) {
    let path = dir.join(name);
    fs::write(&path, b"payload").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
}

fn nc_inventory(dir: &Path) -> Inventory {
    Inventory::builder("nc")
        .spec(&format!("{}/.*\\.nc", dir.display()))
        .build()
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

// =============================================================================
// RESCAN DIFF
// =============================================================================

mod diff {
    use super::*;

    #[test]
    fn test_noop_rescans_are_idempotent() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "f1.nc", 1_000_000);
        create_test_file(temp.path(), "f2.nc", 1_000_000);

        let inv = nc_inventory(temp.path());
        inv.scan().unwrap();
        let first = inv.snapshot().unwrap();

        let r1 = inv.rescan().unwrap();
        let r2 = inv.rescan().unwrap();
        assert!(!r1.is_changed());
        assert!(!r2.is_changed());
        assert!(Arc::ptr_eq(&first, &inv.snapshot().unwrap()));
    }

    #[test]
    fn test_unchanged_file_keeps_aux_info() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "f1.nc", 1_000_000);
        create_test_file(temp.path(), "f2.nc", 1_000_000);

        let inv = nc_inventory(temp.path());
        inv.scan().unwrap();
        let f1 = inv.files_sorted()[0].clone();
        f1.set_aux_info(Some(Arc::new("sentinel".to_string())));

        // change the other file so the snapshot is actually swapped
        set_file_mtime(temp.path().join("f2.nc"), FileTime::from_unix_time(2_000_000, 0)).unwrap();
        assert!(inv.rescan().unwrap().is_changed());

        let carried = inv.get_file(f1.path()).unwrap();
        assert!(Arc::ptr_eq(&f1, &carried));
        assert_eq!(
            carried.aux_info_as::<String>().as_deref().map(String::as_str),
            Some("sentinel")
        );
    }

    #[test]
    fn test_add_remove_modify_counts() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "f1.nc", 1_000_000);
        create_test_file(temp.path(), "f2.nc", 1_000_000);

        let inv = nc_inventory(temp.path());
        inv.scan().unwrap();

        set_file_mtime(temp.path().join("f1.nc"), FileTime::from_unix_time(1_000_500, 0)).unwrap();
        fs::remove_file(temp.path().join("f2.nc")).unwrap();
        create_test_file(temp.path(), "f3.nc", 1_000_000);

        let report = inv.rescan().unwrap();
        assert_eq!(
            report,
            ChangeReport {
                added: 1,
                modified: 1,
                removed: 1
            }
        );
        assert!(report.is_changed());

        let names: Vec<String> = inv.files_sorted().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["f1.nc", "f3.nc"]);
    }

    #[test]
    fn test_young_file_waits_until_aged() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "old.nc", 1_000_000);
        create_test_file(temp.path(), "young.nc", now_secs());

        let inv = Inventory::builder("aged")
            .spec(&format!("{}/.*\\.nc", temp.path().display()))
            .older_than("1 hour".parse::<TimeDuration>().unwrap())
            .build();
        inv.scan().unwrap();
        assert_eq!(inv.file_count(), 1);
        assert_eq!(inv.rescan().unwrap().added, 0);

        set_file_mtime(
            temp.path().join("young.nc"),
            FileTime::from_unix_time(now_secs() - 2 * 3600, 0),
        )
        .unwrap();
        assert_eq!(inv.rescan().unwrap().added, 1);
        assert_eq!(inv.file_count(), 2);
    }

    #[test]
    fn test_one_event_per_changed_rescan() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "f1.nc", 1_000_000);
        let inv = nc_inventory(temp.path());

        let seen: Arc<Mutex<Vec<TriggerEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        inv.add_event_listener(Arc::new(
            move |e: &TriggerEvent| -> Result<(), datastock_inventory::ListenerError> {
                sink.lock().unwrap().push(e.clone());
                Ok(())
            },
        ));
        inv.add_event_listener(Arc::new(
            |_: &TriggerEvent| -> Result<(), datastock_inventory::ListenerError> {
                Err("listener down".into())
            },
        ));

        inv.scan().unwrap();
        create_test_file(temp.path(), "f2.nc", 1_000_000);
        create_test_file(temp.path(), "f3.nc", 1_000_000);
        inv.rescan().unwrap();
        inv.rescan().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.kind == TriggerKind::Always));
        assert_eq!(seen[1].report.map(|r| r.added), Some(2));
        assert_eq!(inv.file_count(), 3);
    }
}

// =============================================================================
// DATES, PROTO, PARTITIONS
// =============================================================================

mod dating {
    use super::*;

    #[test]
    fn test_date_template_round_trip() {
        assert_eq!(
            extract("data_#yyyyMMdd_HHmm#.ext", "data_20230615_1230.ext"),
            Some(Utc.with_ymd_and_hms(2023, 6, 15, 12, 30, 0).unwrap())
        );
        assert_eq!(extract("data_#yyyyMMdd_HHmm#.ext", "data_20230615_1230.bad"), None);
    }

    #[test]
    fn test_proto_index_boundaries() {
        for choice in [
            ProtoChoice::First,
            ProtoChoice::Latest,
            ProtoChoice::Penultimate,
            ProtoChoice::Random,
        ] {
            assert_eq!(choice.index(0), 0);
            assert_eq!(choice.index(1), 0);
        }
        let inv = Inventory::builder("p").build();
        assert_eq!(inv.proto_index(5), 3);
    }

    #[test]
    fn test_day_partitions_cover_each_file_once() {
        let temp = TempDir::new().unwrap();
        for name in [
            "obs_20230601_0300.nc",
            "obs_20230601_2100.nc",
            "obs_20230603_0000.nc",
        ] {
            create_test_file(temp.path(), name, 1_000_000);
        }

        let inv = Inventory::builder("obs")
            .spec(&format!("{}/obs_#yyyyMMdd_HHmm#.nc", temp.path().display()))
            .build();
        inv.scan().unwrap();
        let parts = Partitioner::make_partitions(&inv, &PartitionSpec::daily()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].start, Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()));
        assert_eq!(parts[0].end, Some(Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap()));
        assert_eq!(parts[1].start, Some(Utc.with_ymd_and_hms(2023, 6, 3, 0, 0, 0).unwrap()));

        let mut seen = HashSet::new();
        for part in &parts {
            for file in part.inventory.file_iterator() {
                let date = inv.extract_date(&file).unwrap();
                assert!(part.contains(date));
                assert!(seen.insert(file.path().to_string()), "{} in two partitions", file.path());
            }
        }
        assert_eq!(seen.len(), 3);
    }
}

// =============================================================================
// CONCURRENCY
// =============================================================================

mod concurrency {
    use super::*;

    /// Alternates between two disjoint file sets on every enumeration.
    struct Flipping {
        flip: AtomicBool,
    }

    fn set_a() -> Vec<String> {
        (0..50).map(|i| format!("/a/file{:03}.nc", i)).collect()
    }

    fn set_b() -> Vec<String> {
        (0..30).map(|i| format!("/b/file{:03}.nc", i)).collect()
    }

    impl Enumerator for Flipping {
        fn enumerate(&self, _target: &ScanTarget) -> datastock_inventory::Result<FileStream> {
            let use_a = !self.flip.fetch_xor(true, Ordering::SeqCst);
            let paths = if use_a { set_a() } else { set_b() };
            Ok(Box::new(paths.into_iter().map(|p| {
                // widen the window in which a torn swap could be observed
                thread::yield_now();
                Ok(FileHandle::new(p, 1, 1, false))
            })))
        }

        fn kind(&self) -> &'static str {
            "flipping"
        }
    }

    #[test]
    fn test_concurrent_rescans_never_tear() {
        let inv = Arc::new(
            Inventory::builder("stress")
                .scan_target(ScanTarget::new("/", true, None))
                .enumerator(Arc::new(Flipping {
                    flip: AtomicBool::new(false),
                }))
                .build(),
        );
        inv.scan().unwrap();

        let a: HashSet<String> = set_a().into_iter().collect();
        let b: HashSet<String> = set_b().into_iter().collect();
        let observed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let inv = Arc::clone(&inv);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    inv.rescan().unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let inv = Arc::clone(&inv);
            let a = a.clone();
            let b = b.clone();
            let observed = Arc::clone(&observed);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let paths: HashSet<String> =
                        inv.file_iterator().map(|f| f.path().to_string()).collect();
                    assert!(paths == a || paths == b, "torn snapshot of {} files", paths.len());
                    let sorted = inv.files_sorted();
                    assert!(sorted.len() == a.len() || sorted.len() == b.len());
                    observed.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(observed.load(Ordering::Relaxed), 800);
        assert!(inv.last_scanned().is_some());
    }

    #[test]
    fn test_listener_sees_consistent_state() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "f1.nc", 1_000_000);
        let inv = Arc::new(nc_inventory(temp.path()));

        let counts = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&inv);
        let sink = Arc::clone(&counts);
        inv.add_event_listener(Arc::new(
            move |_: &TriggerEvent| -> Result<(), datastock_inventory::ListenerError> {
                if let Some(inv) = weak.upgrade() {
                    sink.lock().unwrap().push(inv.file_count());
                }
                Ok(())
            },
        ));

        inv.scan().unwrap();
        create_test_file(temp.path(), "f2.nc", 1_000_000);
        inv.rescan().unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    }
}
