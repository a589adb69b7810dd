//! Scripted in-memory `RemoteChannel` for tests.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::{RemoteChannel, TransportError, last_lines};

/// Scripted reply to a single `tail_latest` call.
#[derive(Debug, Clone)]
pub enum TailStep {
    Line(String),
    Fail,
}

#[derive(Default)]
struct Script {
    fail_delivery: bool,
    stall_tail: bool,
    tail_steps: VecDeque<TailStep>,
    response_log: Vec<String>,
    file: Option<Vec<u8>>,
    deliveries: Vec<(String, Vec<u8>)>,
    tail_calls: usize,
    fetch_calls: usize,
}

/// In-memory remote host.
///
/// `tail_latest` consumes scripted steps first, then reports the last line
/// of the response log (empty when the log is empty).
#[derive(Default)]
pub struct ScriptedChannel {
    script: Mutex<Script>,
}

impl ScriptedChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `deliver` fails with a connection error.
    #[must_use]
    pub fn failing_delivery(self) -> Self {
        self.script().fail_delivery = true;
        self
    }

    /// Every `tail_latest` hangs forever.
    #[must_use]
    pub fn stalled_tail(self) -> Self {
        self.script().stall_tail = true;
        self
    }

    /// Queue replies for upcoming `tail_latest` calls.
    #[must_use]
    pub fn with_tail_steps(self, steps: impl IntoIterator<Item = TailStep>) -> Self {
        self.script().tail_steps.extend(steps);
        self
    }

    /// Content served by `fetch_file`.
    #[must_use]
    pub fn with_file(self, contents: impl Into<Vec<u8>>) -> Self {
        self.script().file = Some(contents.into());
        self
    }

    /// Append a line to the response log.
    pub fn append_response(&self, line: impl Into<String>) {
        self.script().response_log.push(line.into());
    }

    /// Payloads delivered so far, with their remote paths.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(String, Vec<u8>)> {
        self.script().deliveries.clone()
    }

    #[must_use]
    pub fn tail_calls(&self) -> usize {
        self.script().tail_calls
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.script().fetch_calls
    }
}

fn scripted_failure(what: &str) -> TransportError {
    TransportError::Connection {
        host: "scripted".to_string(),
        message: format!("{what} refused"),
    }
}

#[async_trait]
impl RemoteChannel for ScriptedChannel {
    async fn deliver(&self, path: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut script = self.script();
        if script.fail_delivery {
            return Err(scripted_failure("deliver"));
        }
        script.deliveries.push((path.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn tail_latest(&self, _path: &str) -> Result<String, TransportError> {
        let stall = {
            let mut script = self.script();
            script.tail_calls += 1;
            script.stall_tail
        };
        if stall {
            return std::future::pending().await;
        }

        let mut script = self.script();
        match script.tail_steps.pop_front() {
            Some(TailStep::Line(line)) => Ok(line),
            Some(TailStep::Fail) => Err(scripted_failure("tail")),
            None => Ok(script.response_log.last().cloned().unwrap_or_default()),
        }
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes, TransportError> {
        let mut script = self.script();
        script.fetch_calls += 1;
        script.file.clone().map(Bytes::from).ok_or_else(|| TransportError::Remote {
            program: "cat".to_string(),
            code: Some(1),
            stderr: format!("cat: {path}: No such file or directory"),
        })
    }

    async fn tail_recent(&self, _path: &str, lines: usize) -> Result<Vec<String>, TransportError> {
        let mut script = self.script();
        script.tail_calls += 1;
        let log = script.response_log.join("\n");
        Ok(last_lines(log.as_bytes(), lines))
    }
}
