use tempfile::tempdir;

use super::*;
use crate::config::Config;

fn data_file_with(records: &[(&[u8], &[u8])]) -> (std::sync::Arc<std::fs::File>, Vec<u64>) {
    let tmp = tempfile::tempfile().unwrap();
    let file = std::sync::Arc::new(tmp);
    let mut offsets = Vec::new();
    let mut offset = 0u64;
    for (k, v) in records {
        let bytes = crate::record::encode_record(k, v);
        std::os::unix::fs::FileExt::write_at(&*file, &bytes, offset).unwrap();
        offsets.push(offset);
        offset += bytes.len() as u64;
    }
    (file, offsets)
}

#[test]
fn routes_and_retrieves_keys_across_shards() {
    let dir = tempdir().unwrap();
    let records: Vec<(&[u8], &[u8])> = vec![
        (b"alpha", b"1"),
        (b"bravo", b"2"),
        (b"charlie", b"3"),
        (b"delta", b"4"),
    ];
    let (data_file, offsets) = data_file_with(&records);
    let cfg = Config::for_test(2, 4, 64 * 1024);
    let index = ShardedHashIndex::open(dir.path(), data_file, 4, &cfg).unwrap();

    for ((k, _v), off) in records.iter().zip(offsets.iter()) {
        index.set_offset(k, *off).unwrap();
    }
    for (k, v) in &records {
        assert_eq!(&index.get_value(k).unwrap(), v);
    }
}

#[test]
fn missing_key_returns_empty() {
    let dir = tempdir().unwrap();
    let (data_file, _) = data_file_with(&[]);
    let cfg = Config::for_test(2, 2, 64 * 1024);
    let index = ShardedHashIndex::open(dir.path(), data_file, 2, &cfg).unwrap();
    assert!(index.get_value(b"nope").unwrap().is_empty());
}

#[test]
fn each_shard_gets_its_own_index_file() {
    let dir = tempdir().unwrap();
    let (data_file, _) = data_file_with(&[]);
    let cfg = Config::for_test(1, 2, 64 * 1024);
    let _index = ShardedHashIndex::open(dir.path(), data_file, 2, &cfg).unwrap();
    assert!(dir.path().join("hash.0.idx").exists());
    assert!(dir.path().join("hash.1.idx").exists());
}
