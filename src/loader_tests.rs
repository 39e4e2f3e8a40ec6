use std::io::Write as _;
use std::sync::Arc;

use tempfile::{tempdir, NamedTempFile};

use super::*;
use crate::config::Config;
use crate::record::encode_record;

fn data_file(records: &[(&[u8], &[u8])]) -> std::fs::File {
    let mut tmp = NamedTempFile::new().unwrap();
    for (k, v) in records {
        tmp.write_all(&encode_record(k, v)).unwrap();
    }
    tmp.into_file()
}

#[test]
fn load_populates_the_index_from_every_record() {
    let records: Vec<(&[u8], &[u8])> = vec![
        (b"a", b"1"),
        (b"bb", b"22"),
        (b"ccc", b"333"),
        (b"dddd", b"4444"),
    ];
    let file = data_file(&records);
    let data_file_arc = Arc::new(file.try_clone().unwrap());

    let dir = tempdir().unwrap();
    let cfg = Config::for_test(2, 2, 1024 * 1024);
    let index = ShardedHashIndex::open(dir.path(), data_file_arc, 2, &cfg).unwrap();

    let stats = load(&file, &index, 4).unwrap();
    assert_eq!(stats.records, records.len() as u64);

    for (k, v) in &records {
        assert_eq!(&index.get_value(k).unwrap(), v);
    }
}

#[test]
fn load_on_an_empty_file_dispatches_nothing() {
    let file = data_file(&[]);
    let data_file_arc = Arc::new(file.try_clone().unwrap());
    let dir = tempdir().unwrap();
    let cfg = Config::for_test(2, 2, 1024 * 1024);
    let index = ShardedHashIndex::open(dir.path(), data_file_arc, 2, &cfg).unwrap();

    let stats = load(&file, &index, 4).unwrap();
    assert_eq!(stats.records, 0);
}
