//! Execution timing side channel.
//!
//! Callers push one record per statement execution onto a bounded queue.
//! A single consumer task drains it and aggregates per-statement statistics.
//! Pushing never waits: a full queue drops the record with a warning.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Default bound of the record queue.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

#[derive(Debug)]
enum RecordMessage {
    Execution { id: String, elapsed: Duration },
    Close,
}

/// Aggregated timings of one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Number of recorded executions
    pub count: u64,
    /// Sum of elapsed times
    pub total: Duration,
    /// Slowest execution
    pub max: Duration,
}

impl ExecutionStats {
    fn add(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    /// Mean elapsed time, zero when nothing was recorded.
    pub fn average(&self) -> Duration {
        u32::try_from(self.count)
            .ok()
            .filter(|c| *c > 0)
            .map_or(Duration::ZERO, |c| self.total / c)
    }
}

/// Bounded queue of execution records with one consumer task.
#[derive(Debug)]
pub struct ExecutionRecorder {
    sender: mpsc::Sender<RecordMessage>,
    stats: Arc<DashMap<String, ExecutionStats>>,
    closed: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionRecorder {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn(queue_size: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel(queue_size.max(1));
        let stats: Arc<DashMap<String, ExecutionStats>> = Arc::new(DashMap::new());
        let sink = Arc::clone(&stats);

        let consumer = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    RecordMessage::Execution { id, elapsed } => {
                        sink.entry(id).or_default().add(elapsed);
                    }
                    RecordMessage::Close => {
                        tracing::debug!("execution recorder received close signal");
                        break;
                    }
                }
            }
        });

        Self {
            sender,
            stats,
            closed: AtomicBool::new(false),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Queue one execution of `id` that started at `start`.
    pub fn record(&self, id: &str, start: Instant) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let message = RecordMessage::Execution {
            id: id.to_uppercase(),
            elapsed: start.elapsed(),
        };
        if let Err(e) = self.sender.try_send(message) {
            tracing::warn!(statement = id, error = %e, "execution record dropped");
        }
    }

    pub fn stats(&self, id: &str) -> Option<ExecutionStats> {
        self.stats.get(&id.to_uppercase()).map(|entry| *entry.value())
    }

    pub fn snapshot(&self) -> HashMap<String, ExecutionStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send the close signal and wait until every queued record is drained.
    ///
    /// The recorder accepts no records afterwards.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.sender.send(RecordMessage::Close).await {
            tracing::debug!(error = %e, "execution recorder already stopped");
        }

        let consumer = self.consumer.lock().await.take();
        if let Some(handle) = consumer {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "execution recorder task failed");
            }
        }
    }
}
