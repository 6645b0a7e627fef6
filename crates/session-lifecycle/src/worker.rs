//! Stream worker loop
//!
//! A worker pulls frames from a [`FrameSource`] until the source ends, the
//! stop flag is cleared, or the frame handler asks it to stop. The flag is
//! checked once per frame boundary.

use camera_capture::{FrameSource, VideoFrame};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Why a worker loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// The source has no more frames
    Exhausted,
    /// The stop flag was cleared
    Cancelled,
    /// The session was persisted by someone else
    SessionClosed,
    /// Unrecoverable source error
    SourceFailed(String),
}

/// What a worker did before exiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub frames_read: u64,
    pub source_errors: u64,
    pub reason: StopReason,
}

/// Shared "should continue" flag for one stream
#[derive(Debug, Clone)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn should_continue(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive `source` until it ends or is stopped.
///
/// Frame-local source errors skip the frame; any other source error ends
/// the loop. The source is dropped when this returns.
pub fn drive<S>(
    mut source: S,
    flag: &StopFlag,
    mut on_frame: impl FnMut(VideoFrame) -> ControlFlow<()>,
) -> WorkerSummary
where
    S: FrameSource,
{
    let label = source.describe();
    let mut frames_read = 0;
    let mut source_errors = 0;

    let reason = loop {
        if !flag.should_continue() {
            break StopReason::Cancelled;
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                frames_read += 1;
                if on_frame(frame).is_break() {
                    break StopReason::SessionClosed;
                }
            }
            Ok(None) => break StopReason::Exhausted,
            Err(e) if e.is_frame_local() => {
                source_errors += 1;
                warn!("Skipping undecodable frame from {}: {}", label, e);
            }
            Err(e) => {
                error!("Source {} failed: {}", label, e);
                break StopReason::SourceFailed(e.to_string());
            }
        }
    };

    debug!("Worker on {} done after {} frames: {:?}", label, frames_read, reason);
    WorkerSummary {
        frames_read,
        source_errors,
        reason,
    }
}

/// Handle to a running stream.
///
/// Jobs driven on the caller's thread register an inline handle that only
/// carries the stop flag.
pub struct StreamHandle {
    pub flag: StopFlag,
    thread: Option<JoinHandle<WorkerSummary>>,
}

impl StreamHandle {
    pub fn inline(flag: StopFlag) -> Self {
        Self { flag, thread: None }
    }

    /// Ask the worker to stop at the next frame boundary
    pub fn stop(&self) {
        self.flag.stop();
    }

    /// Whether a spawned worker has exited (inline handles never report finished)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| t.is_finished())
    }

    /// Wait for a spawned worker to exit
    pub fn join(self) -> Option<WorkerSummary> {
        self.thread?.join().ok()
    }
}

/// Run `body` on a named thread
pub fn spawn_named(
    name: String,
    flag: StopFlag,
    body: impl FnOnce(StopFlag) -> WorkerSummary + Send + 'static,
) -> std::io::Result<StreamHandle> {
    info!("Spawning stream worker {}", name);
    let worker_flag = flag.clone();
    let thread = thread::Builder::new().name(name).spawn(move || body(worker_flag))?;
    Ok(StreamHandle {
        flag,
        thread: Some(thread),
    })
}
