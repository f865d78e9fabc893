//! Integration tests for the control channel release handshake
//!
//! Children write the handshake to the descriptor named by
//! `LLBUILD_CONTROL_FD` and then block on a marker file that only the test's
//! release executor creates, so release provably happens before exit.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use common::{spawn, spawn_with_release, wait_for};
use kiln_process::{
    release, DeferredReap, Environment, ProcessAttributes, ProcessGroup, ProcessStatus,
};
use tempfile::TempDir;

const HANDSHAKE: &str = "printf 'llbuild.1\\n%s\\n' \"$LLBUILD_TASK_ID\" > /dev/fd/$LLBUILD_CONTROL_FD";

fn wait_for_marker_script(marker: &Path) -> String {
    format!(
        "printf 'before\\n'; {HANDSHAKE}; while [ ! -e '{}' ]; do sleep 0.02; done; printf 'after\\n'",
        marker.display()
    )
}

fn releasing_to(marker: PathBuf, tx: mpsc::Sender<DeferredReap>) -> kiln_process::ReleaseFn {
    Box::new(move |deferred| {
        fs::write(&marker, b"go").unwrap();
        tx.send(deferred).unwrap();
    })
}

#[test]
fn test_release_hands_off_before_exit() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("released");
    let (tx, rx) = mpsc::channel();

    let group = Arc::new(ProcessGroup::new());
    let script = wait_for_marker_script(&marker);
    let run = spawn_with_release(
        &group,
        0xbeef,
        &["/bin/sh", "-c", &script],
        Environment::inherit(),
        ProcessAttributes::new(),
        releasing_to(marker, tx),
    );

    // spawn_process returned at release time: nothing has been reaped yet.
    let deferred = rx.try_recv().unwrap();
    assert!(run.completion.lock().is_none());
    assert!(run.delegate.finished().is_empty());
    assert!(group.contains(deferred.pid()));
    assert_eq!(deferred.handle().task_id(), "beef");

    thread::spawn(move || deferred.run()).join().unwrap();

    let result = run.result();
    assert_eq!(result.status, ProcessStatus::Succeeded);
    assert_eq!(run.delegate.output_string(), "before\nafter\n");
    assert_eq!(run.delegate.finished(), vec![result]);
    assert!(run.delegate.errors().is_empty());
    assert!(group.is_empty());
}

#[test]
fn test_dropped_deferred_reap_still_reaps() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("released");
    let marker_for_release = marker.clone();

    let group = Arc::new(ProcessGroup::new());
    let script = wait_for_marker_script(&marker);
    let run = spawn_with_release(
        &group,
        1,
        &["/bin/sh", "-c", &script],
        Environment::inherit(),
        ProcessAttributes::new(),
        Box::new(move |deferred| {
            fs::write(&marker_for_release, b"go").unwrap();
            drop(deferred);
        }),
    );

    assert_eq!(run.result().status, ProcessStatus::Succeeded);
    assert_eq!(run.delegate.output_string(), "before\nafter\n");
    assert!(group.is_empty());
}

#[test]
fn test_detached_release_completes_in_background() {
    let group = Arc::new(ProcessGroup::new());
    let script = format!("{HANDSHAKE}; sleep 0.2; printf 'late\\n'");
    let run = spawn_with_release(
        &group,
        7,
        &["/bin/sh", "-c", &script],
        Environment::inherit(),
        ProcessAttributes::new(),
        release::detached("kiln-test-reap"),
    );

    wait_for("background reap", || run.completion.lock().is_some());
    assert_eq!(run.delegate.output_string(), "late\n");
    assert!(run.result().is_success());
    wait_for("registry drain", || group.is_empty());
}

fn run_without_release(script: &str, attributes: ProcessAttributes) -> common::Run {
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    let group = Arc::new(ProcessGroup::new());

    let run = spawn_with_release(
        &group,
        0x2a,
        &["/bin/sh", "-c", script],
        Environment::inherit(),
        attributes,
        Box::new(move |deferred| {
            flag.store(true, Ordering::SeqCst);
            deferred.run();
        }),
    );

    assert!(!released.load(Ordering::SeqCst), "unexpected release");
    assert!(group.is_empty());
    run
}

#[test]
fn test_bad_id_is_a_fault_not_a_release() {
    let run = run_without_release(
        "printf 'llbuild.1\\nnope\\n' > /dev/fd/$LLBUILD_CONTROL_FD; printf done",
        ProcessAttributes::new(),
    );

    assert_eq!(run.delegate.errors(), vec!["control protocol error: bad ID"]);
    assert_eq!(run.delegate.output_string(), "done");
    assert_eq!(run.result().status, ProcessStatus::Succeeded);
}

#[test]
fn test_wrong_version_is_a_fault() {
    let run = run_without_release(
        "printf 'llbuild.2\\n' > /dev/fd/$LLBUILD_CONTROL_FD; printf done",
        ProcessAttributes::new(),
    );

    assert_eq!(
        run.delegate.errors(),
        vec!["control protocol error: unsupported protocol: llbuild.2"]
    );
    assert_eq!(run.delegate.output_string(), "done");
    assert!(run.result().is_success());
}

#[test]
fn test_long_control_line_is_a_fault() {
    let run = run_without_release(
        "printf 'llbuild.1\\n0123456789abcdefXYZ\\n' > /dev/fd/$LLBUILD_CONTROL_FD; exit 3",
        ProcessAttributes::new(),
    );

    assert_eq!(
        run.delegate.errors(),
        vec!["control protocol error: excessive message length"]
    );
    assert_eq!(run.result().exit_code, 3);
}

#[test]
fn test_message_limit_is_configurable() {
    let run = run_without_release(
        "printf 'llbuild.1\\n' > /dev/fd/$LLBUILD_CONTROL_FD",
        ProcessAttributes::new().with_control_message_limit(4),
    );

    assert_eq!(
        run.delegate.errors(),
        vec!["control protocol error: excessive message length"]
    );
}

#[test]
fn test_silent_control_channel_completes_normally() {
    let group = Arc::new(ProcessGroup::new());
    let run = spawn(
        &group,
        1,
        &["/bin/sh", "-c", "printf quiet"],
        Environment::inherit(),
        ProcessAttributes::new(),
    );

    assert_eq!(run.delegate.output_string(), "quiet");
    assert!(run.delegate.errors().is_empty());
    assert!(run.result().is_success());
}

#[test]
fn test_release_after_output_closes() {
    // The child closes stdout and stderr before releasing, so the deferred
    // reap has no output left to drain.
    let group = Arc::new(ProcessGroup::new());
    let script = format!("printf x; exec >/dev/null 2>&1; {HANDSHAKE}; sleep 0.1");
    let (tx, rx) = mpsc::channel();

    let run = spawn_with_release(
        &group,
        9,
        &["/bin/sh", "-c", &script],
        Environment::inherit(),
        ProcessAttributes::new(),
        Box::new(move |deferred| tx.send(deferred).unwrap()),
    );

    let deferred = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    deferred.run();
    assert_eq!(run.delegate.output_string(), "x");
    assert!(run.result().is_success());
    assert!(group.is_empty());
}
