//! Test utilities: scripted serial links, port lists and openers
//!
//! Lets sessions, connections and exchanges be exercised without a device.
//! Everything here is deterministic apart from the (millisecond) read
//! timeouts that fire once a script runs dry.

use async_trait::async_trait;
use filascale_core::{FilaScaleError, LinkTiming, MessageType, Result};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::encode;
use crate::ports::PortEnumerator;
use crate::session::{PortOpener, SerialLink};

/// Timing with tiny timeouts and reset durations for tests
pub fn test_timing() -> LinkTiming {
    LinkTiming {
        read_timeout: Duration::from_millis(20),
        write_timeout: Duration::from_millis(50),
        retries: 3,
        reset_hold: Duration::from_millis(1),
        reset_settle: Duration::from_millis(1),
        debug_uart: true,
    }
}

/// One scripted read outcome
#[derive(Debug, Clone)]
enum Step {
    Bytes(Vec<u8>),
    /// Bytes that arrive only after a delay
    Delayed(Duration, Vec<u8>),
    Error(io::ErrorKind),
    Eof,
}

#[derive(Debug, Default)]
struct LinkState {
    /// What reads return right now
    script: VecDeque<Step>,
    /// Batches released into `script` by successive writes
    replies: VecDeque<Vec<Step>>,
    written: Vec<Vec<u8>>,
    write_error: Option<io::ErrorKind>,
    stall_writes: bool,
    reset_levels: Vec<bool>,
    read_calls: usize,
}

/// Scripted `SerialLink`.
///
/// Reads pop queued steps; a delayed step is consumed even if the read is
/// cancelled while waiting. When the script is empty a read never completes,
/// so the session's read timeout decides. Clones share state, so a test can
/// keep one handle and give another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    state: Arc<Mutex<LinkState>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes available immediately (stale input, or a stream with no request)
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.lock().script.push_back(Step::Bytes(bytes.to_vec()));
    }

    /// A read that fails with `kind`
    pub fn queue_error(&self, kind: io::ErrorKind) {
        self.lock().script.push_back(Step::Error(kind));
    }

    /// A read that returns end-of-file
    pub fn queue_eof(&self) {
        self.lock().script.push_back(Step::Eof);
    }

    /// Bytes that become readable after the next write
    pub fn reply_bytes(&self, bytes: &[u8]) {
        self.lock()
            .replies
            .push_back(vec![Step::Bytes(bytes.to_vec())]);
    }

    /// A well-formed frame that becomes readable after the next write
    pub fn reply_frame(&self, message_type: MessageType, payload: &[u8]) {
        self.reply_bytes(&encode(message_type, payload));
    }

    /// Bytes that trickle in one at a time, `delay` apart, after the next write
    pub fn reply_drip(&self, bytes: &[u8], delay: Duration) {
        let steps = bytes.iter().map(|&b| Step::Delayed(delay, vec![b])).collect();
        self.lock().replies.push_back(steps);
    }

    /// A read error that surfaces after the next write
    pub fn reply_error(&self, kind: io::ErrorKind) {
        self.lock().replies.push_back(vec![Step::Error(kind)]);
    }

    /// Every subsequent write fails with `kind`
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.lock().write_error = Some(kind);
    }

    /// Every subsequent write never completes
    pub fn stall_writes(&self) {
        self.lock().stall_writes = true;
    }

    /// Frames written so far, one entry per write call
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    /// Reset line levels in the order they were set
    pub fn reset_levels(&self) -> Vec<bool> {
        self.lock().reset_levels.clone()
    }

    /// Number of read calls made, including ones cut short by a timeout
    pub fn read_calls(&self) -> usize {
        self.lock().read_calls
    }

    /// Bytes currently readable
    pub fn pending(&self) -> usize {
        self.lock()
            .script
            .iter()
            .map(|step| match step {
                Step::Bytes(bytes) | Step::Delayed(_, bytes) => bytes.len(),
                _ => 0,
            })
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SerialLink for ScriptedLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let step = {
            let mut state = self.lock();
            state.read_calls += 1;
            state.script.pop_front()
        };

        match step {
            Some(Step::Bytes(mut bytes)) => {
                let count = bytes.len().min(buf.len());
                buf[..count].copy_from_slice(&bytes[..count]);
                if count < bytes.len() {
                    let rest = bytes.split_off(count);
                    self.lock().script.push_front(Step::Bytes(rest));
                }
                Ok(count)
            }
            Some(Step::Delayed(delay, bytes)) => {
                tokio::time::sleep(delay).await;
                let count = bytes.len().min(buf.len());
                buf[..count].copy_from_slice(&bytes[..count]);
                Ok(count)
            }
            Some(Step::Error(kind)) => Err(io::Error::new(kind, "scripted read error")),
            Some(Step::Eof) => Ok(0),
            None => std::future::pending().await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stalled = self.lock().stall_writes;
        if stalled {
            return std::future::pending().await;
        }

        let mut state = self.lock();
        if let Some(kind) = state.write_error {
            return Err(io::Error::new(kind, "scripted write error"));
        }
        state.written.push(buf.to_vec());
        if let Some(reply) = state.replies.pop_front() {
            state.script.extend(reply);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_reset_line(&mut self, level: bool) -> io::Result<()> {
        self.lock().reset_levels.push(level);
        Ok(())
    }

    fn bytes_pending(&self) -> io::Result<u32> {
        Ok(self.pending() as u32)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.lock()
            .script
            .retain(|step| !matches!(step, Step::Bytes(_) | Step::Delayed(..)));
        Ok(())
    }
}

/// Fixed port enumeration
#[derive(Debug, Clone, Default)]
pub struct StaticPorts {
    ports: Vec<String>,
    fail: bool,
}

impl StaticPorts {
    pub fn new(ports: &[&str]) -> Self {
        Self {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            fail: false,
        }
    }

    /// An enumerator whose every call fails
    pub fn failing() -> Self {
        Self {
            ports: Vec::new(),
            fail: true,
        }
    }
}

impl PortEnumerator for StaticPorts {
    fn enumerate(&self) -> Result<Vec<String>> {
        if self.fail {
            return Err(FilaScaleError::Serial("enumeration failed".to_string()));
        }
        Ok(self.ports.clone())
    }
}

#[derive(Debug, Clone)]
enum OpenOutcome {
    Link(ScriptedLink),
    Unavailable,
    Broken,
}

/// `PortOpener` with a scripted outcome per path.
///
/// Paths without an outcome behave as absent device nodes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOpener {
    outcomes: Arc<Mutex<HashMap<String, OpenOutcome>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening `path` succeeds with `link`
    pub fn with_link(self, path: &str, link: &ScriptedLink) -> Self {
        self.set(path, OpenOutcome::Link(link.clone()));
        self
    }

    /// Opening `path` fails as busy
    pub fn with_busy(self, path: &str) -> Self {
        self.set(path, OpenOutcome::Unavailable);
        self
    }

    /// Opening `path` fails with an unrecoverable error
    pub fn with_broken(self, path: &str) -> Self {
        self.set(path, OpenOutcome::Broken);
        self
    }

    /// Paths passed to `open`, in order
    pub fn attempts(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, path: &str, outcome: OpenOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), outcome);
    }
}

impl PortOpener for ScriptedOpener {
    fn open(&self, path: &str, _baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.to_string());

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned();

        match outcome {
            Some(OpenOutcome::Link(link)) => Ok(Box::new(link)),
            Some(OpenOutcome::Unavailable) => Err(FilaScaleError::PortUnavailable {
                port: path.to_string(),
                reason: "Device or resource busy".to_string(),
            }),
            Some(OpenOutcome::Broken) => Err(FilaScaleError::Serial(format!(
                "Failed to open serial port {}: Input/output error",
                path
            ))),
            None => Err(FilaScaleError::PortUnavailable {
                port: path.to_string(),
                reason: "No such file or directory".to_string(),
            }),
        }
    }
}
