//! Statement debug output and execution recording.

use super::recorder::ExecutionRecorder;
use std::sync::Arc;
use std::time::Instant;

/// Receives debug output and execution timings.
pub trait Debugger: Send + Sync {
    /// True when statement text and parameters should be printed.
    fn debug_enabled(&self) -> bool;

    fn debug_print(&self, message: &str);

    /// Record one execution of statement `id` that started at `start`.
    fn record_execution(&self, id: &str, start: Instant);
}

/// Debugger writing to `tracing` and feeding an optional recorder.
#[derive(Debug, Clone, Default)]
pub struct MapperDebugger {
    enabled: bool,
    recorder: Option<Arc<ExecutionRecorder>>,
}

impl MapperDebugger {
    pub fn new(enabled: bool, recorder: Option<Arc<ExecutionRecorder>>) -> Self {
        Self { enabled, recorder }
    }

    pub fn recorder(&self) -> Option<&Arc<ExecutionRecorder>> {
        self.recorder.as_ref()
    }
}

impl Debugger for MapperDebugger {
    fn debug_enabled(&self) -> bool {
        self.enabled
    }

    fn debug_print(&self, message: &str) {
        if self.enabled {
            tracing::debug!(target: "stmtmap::sql", "{}", message);
        }
    }

    fn record_execution(&self, id: &str, start: Instant) {
        if let Some(recorder) = &self.recorder {
            recorder.record(id, start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let debugger = MapperDebugger::default();
        assert!(!debugger.debug_enabled());
        assert!(debugger.recorder().is_none());
        // no recorder: recording is a no-op
        debugger.record_execution("findUser", Instant::now());
        debugger.debug_print("ignored");
    }

    #[tokio::test]
    async fn test_records_through_recorder() {
        let recorder = Arc::new(ExecutionRecorder::spawn(8));
        let debugger = MapperDebugger::new(true, Some(Arc::clone(&recorder)));
        debugger.record_execution("findUser", Instant::now());
        recorder.shutdown().await;
        assert_eq!(recorder.stats("findUser").map(|s| s.count), Some(1));
    }
}
