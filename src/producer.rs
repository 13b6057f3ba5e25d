//! Producer of the sequential item stream.

use crate::buffer::{BroadcastBuffer, WriteOutcome};
use crate::error::{FlowError, Result};
use crate::types::Item;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Counters for one producer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub emitted: u64,
    pub accepted: u64,
    pub dropped: u64,
    /// True when the run was stopped before emitting everything.
    pub stopped_early: bool,
}

/// Emits `1..=count`, pausing `delay` between items.
#[derive(Clone, Copy, Debug)]
pub struct Producer {
    count: u64,
    delay: Duration,
}

impl Producer {
    pub fn new(count: u64, delay: Duration) -> Self {
        Self { count, delay }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The lazy item sequence. Consumes the producer, so it cannot restart.
    pub fn emit(self) -> Emission {
        Emission {
            next: 1,
            count: self.count,
            delay: self.delay,
            stop: None,
            stopped: false,
        }
    }

    /// Push every item into the buffer, then signal end-of-stream.
    pub fn run(self, buffer: &BroadcastBuffer) -> Result<ProducerStats> {
        Self::drive(self.emit(), buffer)
    }

    /// Run on a dedicated thread. The returned handle can stop it early.
    pub fn spawn(self, buffer: Arc<BroadcastBuffer>) -> Result<ProducerHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let emission = Emission {
            stop: Some(stop_rx),
            ..self.emit()
        };
        let thread = thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || Self::drive(emission, &buffer))?;
        Ok(ProducerHandle {
            stop: stop_tx,
            thread,
        })
    }

    fn drive(mut emission: Emission, buffer: &BroadcastBuffer) -> Result<ProducerStats> {
        let mut stats = ProducerStats::default();
        for item in emission.by_ref() {
            stats.emitted += 1;
            match buffer.write(item)? {
                WriteOutcome::Accepted(_) => stats.accepted += 1,
                WriteOutcome::Dropped => stats.dropped += 1,
            }
        }
        stats.stopped_early = emission.stopped;
        buffer.complete();
        info!(
            emitted = stats.emitted,
            accepted = stats.accepted,
            dropped = stats.dropped,
            "producer finished"
        );
        Ok(stats)
    }
}

/// Lazy, finite item sequence produced by [`Producer::emit`].
pub struct Emission {
    next: u64,
    count: u64,
    delay: Duration,
    stop: Option<Receiver<()>>,
    stopped: bool,
}

impl Emission {
    /// Sleep the inter-emission delay. Returns false when asked to stop.
    fn pace(&mut self) -> bool {
        if self.delay.is_zero() {
            return !self.stop_requested();
        }
        match &self.stop {
            Some(rx) => match rx.recv_timeout(self.delay) {
                Err(RecvTimeoutError::Timeout) => true,
                Ok(()) => false,
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop = None;
                    thread::sleep(self.delay);
                    true
                }
            },
            None => {
                thread::sleep(self.delay);
                true
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|rx| rx.try_recv().is_ok())
    }
}

impl Iterator for Emission {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.stopped || self.next > self.count {
            return None;
        }
        if self.next > 1 && !self.pace() {
            debug!(next = self.next, "producer stopped");
            self.stopped = true;
            return None;
        }
        let item = Item(self.next);
        self.next += 1;
        Some(item)
    }
}

/// A producer running on its own thread.
pub struct ProducerHandle {
    stop: Sender<()>,
    thread: JoinHandle<Result<ProducerStats>>,
}

impl ProducerHandle {
    /// Ask the producer to stop at its next pause.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<ProducerStats> {
        self.thread.join().map_err(|_| FlowError::ProducerPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferConfig, Next, StartFrom};
    use std::time::Instant;

    #[test]
    fn test_emits_sequence_in_order() {
        let items: Vec<Item> = Producer::new(5, Duration::ZERO).emit().collect();
        assert_eq!(items, vec![Item(1), Item(2), Item(3), Item(4), Item(5)]);
    }

    #[test]
    fn test_empty_producer() {
        assert_eq!(Producer::new(0, Duration::ZERO).emit().count(), 0);
    }

    #[test]
    fn test_paces_between_items() {
        let start = Instant::now();
        let items: Vec<Item> = Producer::new(3, Duration::from_millis(20)).emit().collect();
        assert_eq!(items.len(), 3);
        // Two pauses: none before the first item.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_run_completes_buffer() {
        let buffer = BroadcastBuffer::with_tracing(BufferConfig::with_capacity(8)).unwrap();
        let mut sub = buffer.subscribe(StartFrom::Oldest);

        let stats = Producer::new(3, Duration::ZERO).run(&buffer).unwrap();
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.accepted, 3);
        assert!(buffer.is_completed());

        for i in 1..=3 {
            assert_eq!(sub.next(), Next::Item { item: Item(i), skipped: 0 });
        }
        assert_eq!(sub.next(), Next::Completed { skipped: 0 });
    }

    #[test]
    fn test_run_counts_drops() {
        let buffer = BroadcastBuffer::with_tracing(BufferConfig::with_capacity(2)).unwrap();
        let _idle = buffer.subscribe(StartFrom::Oldest);

        let stats = Producer::new(5, Duration::ZERO).run(&buffer).unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_spawned_producer_finishes_on_its_own() {
        let buffer = BroadcastBuffer::with_tracing(BufferConfig::with_capacity(8)).unwrap();
        let producer = Producer::new(4, Duration::ZERO);
        assert_eq!(producer.count(), 4);

        let handle = producer.spawn(Arc::clone(&buffer)).unwrap();
        let start = Instant::now();
        while !handle.is_finished() {
            assert!(start.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(1));
        }

        let stats = handle.join().unwrap();
        assert_eq!(stats.accepted, 4);
        assert!(!stats.stopped_early);
        assert!(buffer.is_completed());
    }

    #[test]
    fn test_stop_ends_spawned_producer() {
        let buffer = BroadcastBuffer::with_tracing(BufferConfig::with_capacity(8)).unwrap();
        let handle = Producer::new(100, Duration::from_secs(10))
            .spawn(Arc::clone(&buffer))
            .unwrap();

        handle.stop();
        let stats = handle.join().unwrap();
        assert_eq!(stats.emitted, 1);
        assert!(stats.stopped_early);
        assert!(buffer.is_completed());
    }
}
