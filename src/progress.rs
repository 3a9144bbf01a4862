//! Progress reporting and cooperative cancellation for a decode run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A point-in-time view of a running decode, handed to the progress
/// callback. Estimates extrapolate from the chunks processed so far and
/// are exact once the run completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseProgress {
    pub chunks_processed: usize,
    pub total_chunks: usize,
    pub events_parsed: usize,
    pub estimated_total_events: usize,
    pub events_per_second: f64,
    pub estimated_seconds_remaining: f64,
    pub percent_done: f64,
}

/// Cancellation flag shared between the caller and a decode run. The run
/// polls it between chunk reads, so everything decoded before the flag
/// flipped is still returned.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Decides when a report is due and fills in the derived rate fields.
pub(crate) struct ProgressTracker {
    started: Instant,
    total_chunks: usize,
    event_interval: usize,
    events_at_last_report: usize,
}

impl ProgressTracker {
    pub(crate) fn new(total_chunks: usize, event_interval: usize) -> Self {
        ProgressTracker {
            started: Instant::now(),
            total_chunks,
            event_interval,
            events_at_last_report: 0,
        }
    }

    /// An interval of zero reports on every poll.
    pub(crate) fn is_report_due(&self, events_parsed: usize) -> bool {
        events_parsed - self.events_at_last_report >= self.event_interval
    }

    pub(crate) fn snapshot(
        &mut self,
        chunks_processed: usize,
        events_parsed: usize,
    ) -> ParseProgress {
        self.events_at_last_report = events_parsed;

        let elapsed = self.started.elapsed().as_secs_f64();
        let events_per_second = if elapsed > 0.0 {
            events_parsed as f64 / elapsed
        } else {
            0.0
        };

        let estimated_total_events = if chunks_processed == 0 {
            0
        } else if chunks_processed >= self.total_chunks {
            events_parsed
        } else {
            events_parsed * self.total_chunks / chunks_processed
        };

        let remaining_events = estimated_total_events.saturating_sub(events_parsed);
        let estimated_seconds_remaining = if events_per_second > 0.0 {
            remaining_events as f64 / events_per_second
        } else {
            0.0
        };

        let percent_done = if self.total_chunks == 0 {
            100.0
        } else {
            (chunks_processed.min(self.total_chunks) as f64 / self.total_chunks as f64) * 100.0
        };

        ParseProgress {
            chunks_processed,
            total_chunks: self.total_chunks,
            events_parsed,
            estimated_total_events,
            events_per_second,
            estimated_seconds_remaining,
            percent_done,
        }
    }
}
