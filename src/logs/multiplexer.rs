// src/logs/multiplexer.rs

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::events::{Event, EventBus};
use crate::logs::buffer::LogBuffer;
use crate::types::CommandId;

/// Flush period used when the caller has no preference.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(30);

const BATCH_CHANNEL_CAPACITY: usize = 256;

/// Lines of one command delivered together, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub command_id: CommandId,
    pub lines: Vec<String>,
}

#[derive(Debug)]
struct CommandLog {
    buffer: LogBuffer,
    /// Not yet delivered; capped like the buffer.
    pending: VecDeque<String>,
    batches: broadcast::Sender<LogBatch>,
}

impl CommandLog {
    fn new(limit: usize) -> Self {
        let (batches, _) = broadcast::channel(BATCH_CHANNEL_CAPACITY);
        Self {
            buffer: LogBuffer::new(limit),
            pending: VecDeque::new(),
            batches,
        }
    }
}

#[derive(Debug)]
struct Inner {
    logs: Mutex<HashMap<CommandId, CommandLog>>,
    line_limit: AtomicUsize,
    bus: EventBus,
}

/// Buffers output per command and fans it out in small batches.
///
/// Appending is cheap: the line goes into the command's ring buffer right
/// away (so [`lines`](Self::lines) is always current) and into a pending
/// queue. Pending lines are delivered by [`flush`](Self::flush), which the
/// background task started by [`spawn_flusher`](Self::spawn_flusher) calls
/// on a fixed interval. Per-command order is preserved on both the batch
/// stream and the event bus.
#[derive(Debug, Clone)]
pub struct LogMultiplexer {
    inner: Arc<Inner>,
}

impl LogMultiplexer {
    pub fn new(line_limit: usize, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                logs: Mutex::new(HashMap::new()),
                line_limit: AtomicUsize::new(line_limit.max(1)),
                bus,
            }),
        }
    }

    /// Start the periodic flush task.
    ///
    /// The task holds only a weak reference and ends once every
    /// `LogMultiplexer` handle is dropped.
    pub fn spawn_flusher(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("log multiplexer dropped; flusher exiting");
                    break;
                };
                LogMultiplexer { inner }.flush();
            }
        })
    }

    pub fn line_limit(&self) -> usize {
        self.inner.line_limit.load(Ordering::Relaxed)
    }

    /// Change the per-command cap; existing buffers are trimmed.
    pub fn set_line_limit(&self, limit: usize) {
        let limit = limit.max(1);
        self.inner.line_limit.store(limit, Ordering::Relaxed);
        let mut logs = self.inner.logs.lock();
        for log in logs.values_mut() {
            log.buffer.set_limit(limit);
            trim_pending(&mut log.pending, limit);
        }
    }

    pub fn append(&self, command_id: &str, line: String) {
        let limit = self.line_limit();
        let mut logs = self.inner.logs.lock();
        let log = logs
            .entry(command_id.to_string())
            .or_insert_with(|| CommandLog::new(limit));
        log.buffer.push(line.clone());
        log.pending.push_back(line);
        trim_pending(&mut log.pending, limit);
    }

    /// Receive future batches for one command.
    ///
    /// A receiver that falls more than a few hundred batches behind gets
    /// `RecvError::Lagged`; the buffered lines remain available through
    /// [`lines`](Self::lines).
    pub fn subscribe(&self, command_id: &str) -> broadcast::Receiver<LogBatch> {
        let limit = self.line_limit();
        let mut logs = self.inner.logs.lock();
        logs.entry(command_id.to_string())
            .or_insert_with(|| CommandLog::new(limit))
            .batches
            .subscribe()
    }

    /// Drop buffered and not yet delivered lines. Safe in any run state.
    pub fn clear(&self, command_id: &str) {
        let mut logs = self.inner.logs.lock();
        if let Some(log) = logs.get_mut(command_id) {
            log.buffer.clear();
            log.pending.clear();
        }
    }

    /// Drop the command's buffer and subscribers entirely.
    pub fn forget(&self, command_id: &str) {
        self.inner.logs.lock().remove(command_id);
    }

    /// Buffered lines, oldest first.
    pub fn lines(&self, command_id: &str) -> Vec<String> {
        self.inner
            .logs
            .lock()
            .get(command_id)
            .map(|log| log.buffer.lines())
            .unwrap_or_default()
    }

    /// Deliver every pending line of every command.
    pub fn flush(&self) {
        let mut logs = self.inner.logs.lock();
        for (id, log) in logs.iter_mut() {
            deliver(&self.inner.bus, id, log);
        }
    }

    /// Deliver pending lines of one command.
    pub fn flush_command(&self, command_id: &str) {
        let mut logs = self.inner.logs.lock();
        if let Some(log) = logs.get_mut(command_id) {
            deliver(&self.inner.bus, command_id, log);
        }
    }
}

// Lines dropped from the buffer are never delivered either.
fn trim_pending(pending: &mut VecDeque<String>, limit: usize) {
    while pending.len() > limit {
        pending.pop_front();
    }
}

// Called with the logs lock held so concurrent flushes cannot reorder lines.
fn deliver(bus: &EventBus, command_id: &str, log: &mut CommandLog) {
    if log.pending.is_empty() {
        return;
    }
    let lines = Vec::from(std::mem::take(&mut log.pending));
    trace!(command = %command_id, count = lines.len(), "flushing log batch");

    for line in &lines {
        bus.publish(Event::NewLogEntry {
            id: command_id.to_string(),
            line: line.clone(),
        });
    }
    // No receivers is fine.
    let _ = log.batches.send(LogBatch {
        command_id: command_id.to_string(),
        lines,
    });
}
