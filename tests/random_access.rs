//! Random-access behavior over non-seekable archives: scan bounds, cache
//! bounds, ordering-violation detection, permissive absence.

use arktable::{
    MappedRandomAccessTableReader, RandomAccessTableReader, TableError, TableWriter,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

/// Route engine logging through the test harness so the `warn!` output from
/// permissive paths is visible on failure.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn archive_of(dir: &Path, name: &str, pairs: &[(&str, i32)]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = TableWriter::<i32>::new(&format!("ark:{}", path.display())).unwrap();
    for (key, value) in pairs {
        writer.write(key, value).unwrap();
    }
    writer.close().unwrap();
    path
}

#[test]
fn unordered_queries_without_options_buffer_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "x.ark", &[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark:{}", path.display())).unwrap();

    assert_eq!(*reader.value("d").unwrap(), 4);
    // Nothing is evicted, so earlier keys are still answerable...
    assert_eq!(*reader.value("a").unwrap(), 1);
    assert_eq!(*reader.value("c").unwrap(), 3);
    // ...at the cost of the whole archive sitting in memory.
    assert_eq!(reader.cache_size(), 4);
    assert!(!reader.has_key("zz").unwrap());
}

#[test]
fn sorted_option_bounds_the_scan_for_absent_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(
        dir.path(),
        "sorted.ark",
        &[("a", 1), ("c", 3), ("e", 5), ("g", 7)],
    );
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,s:{}", path.display())).unwrap();

    // "d" lies between "c" and "e": absence is declared at "e", without
    // draining the stream.
    assert!(!reader.has_key("d").unwrap());
    assert_eq!(reader.records_read(), 3);

    // The record that stopped the scan is still buffered and servable.
    assert_eq!(*reader.value("e").unwrap(), 5);
    assert_eq!(reader.records_read(), 3);

    // A key below the cursor resolves without reading anything further.
    assert!(!reader.has_key("b").unwrap());
    assert_eq!(reader.records_read(), 3);
}

#[test]
fn called_sorted_bounds_the_cache_to_the_query_gap() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(
        dir.path(),
        "x.ark",
        &[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)],
    );
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,cs:{}", path.display())).unwrap();

    assert_eq!(*reader.value("b").unwrap(), 2);
    assert!(reader.cache_size() <= 1);
    assert_eq!(*reader.value("e").unwrap(), 5);
    // Records a..d can never be requested again; only "e" is held.
    assert_eq!(reader.cache_size(), 1);
    assert_eq!(reader.records_read(), 5);
}

#[test]
fn once_discards_entries_after_they_are_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "x.ark", &[("a", 1), ("b", 2)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,o:{}", path.display())).unwrap();

    assert_eq!(*reader.value("a").unwrap(), 1);
    assert_eq!(*reader.value("b").unwrap(), 2);
    // The caller promised not to re-query; "a" is gone and the stream is
    // exhausted, so the answer is absence.
    assert!(!reader.has_key("a").unwrap());
}

#[test]
fn out_of_order_queries_under_called_sorted_abort() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "x.ark", &[("a", 1), ("b", 2)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,cs:{}", path.display())).unwrap();

    assert!(reader.has_key("b").unwrap());
    let err = reader.has_key("a").unwrap_err();
    assert!(matches!(err, TableError::OrderingViolation(_)));
}

#[test]
fn descending_archive_keys_under_sorted_abort() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "unsorted.ark", &[("b", 2), ("a", 1)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,s:{}", path.display())).unwrap();

    // Scanning for "c" passes "b" then the descending "a".
    let err = reader.has_key("c").unwrap_err();
    assert!(matches!(err, TableError::OrderingViolation(_)));
}

#[test]
fn value_for_absent_key_is_an_error_not_a_wrong_answer() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "x.ark", &[("a", 1)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark:{}", path.display())).unwrap();
    assert!(matches!(
        reader.value("zz"),
        Err(TableError::MissingKey(_))
    ));
}

#[test]
fn permissive_script_reader_treats_dead_paths_as_absent() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let scp = dir.path().join("dead.scp");
    std::fs::write(&scp, "x /nonexistent/path/value.bin\n").unwrap();

    let mut strict =
        RandomAccessTableReader::<i32>::new(&format!("scp:{}", scp.display())).unwrap();
    assert!(strict.has_key("x").unwrap());
    assert!(matches!(strict.value("x"), Err(TableError::Open { .. })));

    let mut permissive =
        RandomAccessTableReader::<i32>::new(&format!("scp,p:{}", scp.display())).unwrap();
    assert!(!permissive.has_key("x").unwrap());
}

#[test]
fn random_access_through_a_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let path = archive_of(dir.path(), "x.ark", &[("a", 1), ("b", 2), ("c", 3)]);
    let mut reader =
        RandomAccessTableReader::<i32>::new(&format!("ark,s,cs:cat {} |", path.display()))
            .unwrap();
    assert_eq!(*reader.value("a").unwrap(), 1);
    assert_eq!(*reader.value("c").unwrap(), 3);
    reader.close().unwrap();
}

#[test]
fn mapped_reader_translates_keys_through_a_secondary_table() {
    let dir = tempfile::tempdir().unwrap();
    let data = archive_of(dir.path(), "spk.ark", &[("spk1", 100), ("spk2", 200)]);

    let map = dir.path().join("utt2spk.ark");
    let mut writer =
        TableWriter::<String>::new(&format!("ark,t:{}", map.display())).unwrap();
    writer.write("utt1", &"spk1".to_string()).unwrap();
    writer.write("utt2", &"spk1".to_string()).unwrap();
    writer.write("utt3", &"spk2".to_string()).unwrap();
    writer.close().unwrap();

    let mut reader = MappedRandomAccessTableReader::<i32>::new(
        &format!("ark:{}", data.display()),
        &format!("ark:{}", map.display()),
    )
    .unwrap();
    assert_eq!(*reader.value("utt1").unwrap(), 100);
    assert_eq!(*reader.value("utt3").unwrap(), 200);
    assert!(!reader.has_key("utt9").unwrap());
    reader.close().unwrap();
}

#[test]
fn empty_map_specifier_degenerates_to_the_plain_reader() {
    let dir = tempfile::tempdir().unwrap();
    let data = archive_of(dir.path(), "x.ark", &[("a", 1)]);
    let mut reader =
        MappedRandomAccessTableReader::<i32>::new(&format!("ark:{}", data.display()), "")
            .unwrap();
    assert_eq!(*reader.value("a").unwrap(), 1);
    assert!(!reader.has_key("b").unwrap());
}
