//! Shared helpers for spawning through the engine in tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kiln_process::{
    release, spawn_process, Environment, ProcessAttributes, ProcessDelegate, ProcessError,
    ProcessGroup, ProcessHandle, ProcessResult, ReleaseFn,
};
use parking_lot::Mutex;

/// One delegate callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(ProcessHandle),
    Output(Vec<u8>),
    Error(String),
    Finished(ProcessResult),
}

/// Delegate that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<Event>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn output(&self) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Output(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<ProcessResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Finished(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProcessDelegate<()> for RecordingDelegate {
    fn process_started(&self, _: &(), handle: ProcessHandle) {
        self.events.lock().push(Event::Started(handle));
    }

    fn process_had_output(&self, _: &(), _: ProcessHandle, data: &[u8]) {
        self.events.lock().push(Event::Output(data.to_vec()));
    }

    fn process_had_error(&self, _: &(), _: ProcessHandle, error: &ProcessError) {
        self.events.lock().push(Event::Error(error.to_string()));
    }

    fn process_finished(&self, _: &(), _: ProcessHandle, result: &ProcessResult) {
        self.events.lock().push(Event::Finished(result.clone()));
    }
}

/// Slot filled by the completion continuation
pub type CompletionSlot = Arc<Mutex<Option<ProcessResult>>>;

pub struct Run {
    pub delegate: Arc<RecordingDelegate>,
    pub completion: CompletionSlot,
}

impl Run {
    /// Result delivered to the completion continuation
    pub fn result(&self) -> ProcessResult {
        self.completion
            .lock()
            .clone()
            .expect("completion continuation was not called")
    }
}

/// Spawn with an explicit release executor and return once `spawn_process`
/// does
pub fn spawn_with_release(
    group: &Arc<ProcessGroup>,
    handle: u64,
    command_line: &[&str],
    environment: Environment,
    attributes: ProcessAttributes,
    on_release: ReleaseFn,
) -> Run {
    let delegate = Arc::new(RecordingDelegate::default());
    let completion: CompletionSlot = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&completion);

    spawn_process(
        Arc::clone(&delegate),
        (),
        Arc::clone(group),
        ProcessHandle(handle),
        command_line,
        environment,
        attributes,
        on_release,
        Box::new(move |result| {
            let previous = slot.lock().replace(result);
            assert!(previous.is_none(), "completion continuation called twice");
        }),
    );

    Run {
        delegate,
        completion,
    }
}

/// Spawn, reaping inline, and return once the process is gone
pub fn spawn(
    group: &Arc<ProcessGroup>,
    handle: u64,
    command_line: &[&str],
    environment: Environment,
    attributes: ProcessAttributes,
) -> Run {
    spawn_with_release(
        group,
        handle,
        command_line,
        environment,
        attributes,
        release::inline(),
    )
}

/// Run a shell script with the inherited environment and no control channel
pub fn sh(group: &Arc<ProcessGroup>, script: &str) -> Run {
    spawn(
        group,
        1,
        &["/bin/sh", "-c", script],
        Environment::inherit(),
        ProcessAttributes::new().with_control(false),
    )
}

/// Poll `condition` until it holds, failing the test after ten seconds
pub fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}
