//! File system space admission.

use burrow_core::{status, EnvError, ErrCall};
use burrow_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn scripted_env() -> (TestEnv, Arc<ScriptedProbe>) {
    let probe = ScriptedProbe::new();
    let test_env = TestEnv::with_config(test_config().redzone_percent(5).space_probe(probe.clone()));
    (test_env, probe)
}

#[test]
fn critical_space_refuses_writes_but_not_reads() {
    let (test_env, probe) = scripted_env();
    let db = test_env.table("t");
    db.put(None, b"k", b"v", PutFlags::NONE).unwrap();

    probe.set_free_percent(2);
    assert_eq!(test_env.poll_space_now().unwrap(), SpaceState::Critical);

    let err = db.put(None, b"k2", b"v", PutFlags::NONE).unwrap_err();
    assert!(matches!(err, EnvError::NoSpace { .. }));
    assert_eq!(err.status(), status::ENOSPC);
    assert!(matches!(db.del(None, b"k"), Err(EnvError::NoSpace { .. })));
    assert!(matches!(
        test_env.dbremove(None, "t"),
        Err(EnvError::NoSpace { .. })
    ));
    assert_eq!(db.get(None, b"k").unwrap(), b"v");

    let mut fresh = Db::create(&test_env);
    assert!(matches!(
        fresh.open(None, "new", DbFlags::CREATE),
        Err(EnvError::NoSpace { .. })
    ));

    let space = test_env.space_status();
    assert_eq!(space.state, SpaceState::Critical);
    assert_eq!(space.rejected_while_critical, 4);
    assert_eq!(test_env.stats().rejected_while_critical, space.rejected_while_critical);

    probe.set_free_percent(50);
    assert_eq!(test_env.poll_space_now().unwrap(), SpaceState::Normal);
    db.put(None, b"k2", b"v", PutFlags::NONE).unwrap();
}

#[test]
fn caution_is_advisory() {
    let (test_env, probe) = scripted_env();
    let db = test_env.table("t");

    probe.set_free_percent(7);
    assert_eq!(test_env.poll_space_now().unwrap(), SpaceState::Caution);
    db.put(None, b"k", b"v", PutFlags::NONE).unwrap();
    assert_eq!(test_env.space_status().rejected_while_critical, 0);
}

#[test]
fn failed_samples_keep_the_last_level() {
    let (test_env, probe) = scripted_env();

    probe.set_free_percent(2);
    assert_eq!(test_env.poll_space_now().unwrap(), SpaceState::Critical);
    probe.fail();
    assert_eq!(test_env.poll_space_now().unwrap(), SpaceState::Critical);
    assert!(test_env.space_status().poll_count >= 2);
}

#[test]
fn entering_critical_is_reported() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let record = Arc::clone(&seen);
    let callback: ErrCall = Arc::new(move |_prefix: &str, message: &str| {
        record.lock().push(message.to_string());
    });
    let probe = ScriptedProbe::new();
    let test_env = TestEnv::with_config(
        test_config()
            .space_probe(probe.clone())
            .errcall(callback),
    );

    probe.set_free_percent(1);
    test_env.poll_space_now().unwrap();
    assert!(seen
        .lock()
        .iter()
        .any(|message| message.contains("critically low")));
}

#[test]
fn background_poller_tracks_the_probe() {
    let probe = ScriptedProbe::new();
    let test_env = TestEnv::with_config(
        test_config()
            .fs_poll_interval(Duration::from_millis(10))
            .space_probe(probe.clone()),
    );
    assert_eq!(test_env.space_state(), SpaceState::Normal);

    probe.set_free_percent(1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while test_env.space_state() != SpaceState::Critical {
        assert!(Instant::now() < deadline, "poller never saw critical space");
        thread::sleep(Duration::from_millis(5));
    }

    let test_env = test_env.reopen();
    assert!(test_env.space_status().poll_count >= 1);
}
