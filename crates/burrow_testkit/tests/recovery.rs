//! Crash recovery: committed work survives, everything else is discarded.

use burrow_core::{EnvError, SequenceNumber, TxnFlags};
use burrow_testkit::prelude::*;
use burrow_testkit::scenarios::{populated_key, populated_table};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

#[test]
fn committed_work_survives_a_crash() {
    let test_env = TestEnv::new();
    {
        let db = populated_table(&test_env, "t", 10);
        let txn = test_env.txn_begin(None, TxnFlags::NONE).unwrap();
        db.put(Some(&txn), b"lost", b"never committed", PutFlags::NONE)
            .unwrap();
        txn.abort().unwrap();
    }

    let test_env = test_env.crash_and_reopen();
    let dump = dump_env(&test_env).unwrap();
    let t = dump.table("t").unwrap();
    assert_eq!(t.len(), 10);
    assert!(!t.contains_key(&b"lost"[..].to_vec()));
    assert!(test_env.recovery_report().commits > 0);
}

#[test]
fn truncated_table_file_is_rebuilt_from_the_log() {
    let test_env = TestEnv::new();
    let path = {
        let db = populated_table(&test_env, "t", 5);
        test_env.layout().table_path(db.iname().unwrap())
    };

    let test_env = test_env.crash_and_reopen_with(|_| {
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(0)
            .unwrap();
    });

    assert!(test_env.recovery_report().replayed >= 5);
    let db = test_env.table("t");
    for i in 0..5 {
        assert_eq!(db.get(None, &populated_key(i)).unwrap(), format!("value{i}").as_bytes());
    }
}

#[test]
fn clean_close_leaves_nothing_to_replay() {
    let test_env = TestEnv::new();
    drop(populated_table(&test_env, "t", 3));
    let test_env = test_env.reopen();
    let report = test_env.recovery_report();
    assert_eq!(report.replayed, 0);
    assert_eq!(report.discarded, 0);
    assert!(report.last_seq > SequenceNumber::ZERO);
}

#[test]
fn torn_log_tail_is_cut_off() {
    let test_env = TestEnv::new();
    drop(populated_table(&test_env, "t", 3));
    test_env.close().unwrap();

    let log_path = test_env.layout().log_path();
    let mut log = OpenOptions::new().append(true).open(&log_path).unwrap();
    log.write_all(b"BLOG\x01").unwrap();
    drop(log);

    let env = Environment::open(
        EnvDirs::new(test_env.path()),
        EnvFlags::TRANSACTIONAL,
        test_config(),
    )
    .unwrap();
    let db = open_table(&env, "t");
    assert_eq!(db.get(None, &populated_key(2)).unwrap(), b"value2");
    drop(db);
    env.close().unwrap();
}

#[test]
fn damaged_log_record_fails_open() {
    let test_env = TestEnv::new();
    test_env.close().unwrap();

    let log_path = test_env.layout().log_path();
    let mut log = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&log_path)
        .unwrap();
    let mut byte = [0u8; 1];
    log.seek(SeekFrom::Start(12)).unwrap();
    log.read_exact(&mut byte).unwrap();
    log.seek(SeekFrom::Start(12)).unwrap();
    log.write_all(&[byte[0] ^ 0xff]).unwrap();
    drop(log);

    let err = Environment::open(
        EnvDirs::new(test_env.path()),
        EnvFlags::TRANSACTIONAL,
        test_config(),
    )
    .unwrap_err();
    assert!(matches!(err, EnvError::LogCorruption { .. }), "{err}");
}

#[test]
fn removal_committed_before_crash_is_completed() {
    let test_env = TestEnv::new();
    let mut db = populated_table(&test_env, "doomed", 2);
    let iname = db.iname().unwrap().to_string();
    db.close().unwrap();
    test_env.dbremove(None, "doomed").unwrap();

    let test_env = test_env.crash_and_reopen();
    assert!(test_env.list_tables().unwrap().is_empty());
    assert!(!test_env.path().join(iname).exists());
}

#[test]
fn nested_work_follows_its_root() {
    let test_env = TestEnv::new();
    {
        let db = test_env.table("t");

        let root = test_env.txn_begin(None, TxnFlags::NONE).unwrap();
        let child = test_env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        db.put(Some(&child), b"kept", b"1", PutFlags::NONE).unwrap();
        child.commit(CommitFlags::NONE).unwrap();
        let child = test_env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        db.put(Some(&child), b"dropped", b"2", PutFlags::NONE).unwrap();
        child.abort().unwrap();
        root.commit(CommitFlags::SYNC).unwrap();
    }

    let test_env = test_env.crash_and_reopen();
    let t = dump_env(&test_env).unwrap().table("t").unwrap();
    assert_eq!(t.keys().cloned().collect::<Vec<_>>(), [b"kept".to_vec()]);
}

fn apply(env: &Environment, db: &Db, batch: &TxnBatch, model: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
    let txn = env.txn_begin(None, TxnFlags::NONE).unwrap();
    let mut pending = model.clone();
    for op in &batch.ops {
        match op {
            TableOp::Put(key, value) => {
                db.put(Some(&txn), key, value, PutFlags::NONE).unwrap();
                pending.insert(key.clone(), value.clone());
            }
            TableOp::Del(key) => match db.del(Some(&txn), key) {
                Ok(()) => {
                    pending.remove(key);
                }
                Err(EnvError::NotFound) => assert!(!pending.contains_key(key)),
                Err(err) => panic!("delete failed: {err}"),
            },
        }
    }
    if batch.commit {
        txn.commit(CommitFlags::NONE).unwrap();
        *model = pending;
    } else {
        txn.abort().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn crash_recovery_matches_model(batches in txn_batches_strategy(8)) {
        let test_env = TestEnv::new();
        let mut model = BTreeMap::new();
        {
            let db = test_env.table("t");
            for batch in &batches {
                apply(&test_env, &db, batch, &mut model);
            }
        }

        let test_env = test_env.crash_and_reopen();
        let recovered = dump_env(&test_env).unwrap().table("t").unwrap();
        prop_assert_eq!(recovered, model);
    }
}
