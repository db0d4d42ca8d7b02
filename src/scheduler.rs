use crossbeam_channel::{select, Receiver};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::event::{Category, ProcessedEvent};
use crate::log_error;
use crate::shutdown::Shutdown;
use crate::store::{self, BatchSummary, Store};

pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination of flushed batches, one per category.
pub trait BatchSink {
    type Error: std::error::Error + 'static;

    fn add_batch(&mut self, events: &[ProcessedEvent]) -> Result<BatchSummary, Self::Error>;

    fn close(self)
    where
        Self: Sized;
}

impl BatchSink for Store {
    type Error = store::Error;

    fn add_batch(&mut self, events: &[ProcessedEvent]) -> Result<BatchSummary, Self::Error> {
        Store::add_batch(self, events)
    }

    fn close(self) {
        Store::close(self);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Buffers processed events per category and hands them to the sinks in
/// batches.
pub struct Scheduler<S: BatchSink> {
    sinks: HashMap<Category, S>,
    buffers: HashMap<Category, Vec<ProcessedEvent>>,
    config: SchedulerConfig,
    last_flush: Instant,
}

impl<S: BatchSink> Scheduler<S> {
    #[must_use]
    pub fn new(sinks: HashMap<Category, S>, config: SchedulerConfig) -> Self {
        let buffers = sinks.keys().map(|c| (*c, Vec::new())).collect();
        Self {
            sinks,
            buffers,
            config: SchedulerConfig {
                batch_size: config.batch_size.max(1),
                ..config
            },
            last_flush: Instant::now(),
        }
    }

    /// Buffers `event`, flushing its category once the batch is full.
    pub fn push(&mut self, event: ProcessedEvent) {
        let category = event.category();
        let full = match self.buffers.get_mut(&category) {
            Some(buffer) => {
                buffer.push(event);
                buffer.len() >= self.config.batch_size
            }
            None => {
                log::warn!("no {} store; dropping event: {}", category, event.original);
                false
            }
        };
        if full {
            self.flush(category);
        }
    }

    /// Flushes every category if the flush interval has passed since the
    /// last timed flush.
    pub fn tick(&mut self, now: Instant) {
        if now.duration_since(self.last_flush) > self.config.flush_interval {
            self.flush_all();
            self.last_flush = now;
        }
    }

    /// Hands the buffer of `category` to its sink. The buffer is emptied
    /// whether or not the sink accepts it.
    pub fn flush(&mut self, category: Category) {
        let batch = match self.buffers.get_mut(&category) {
            Some(buffer) if !buffer.is_empty() => std::mem::take(buffer),
            _ => return,
        };
        let sink = match self.sinks.get_mut(&category) {
            Some(sink) => sink,
            None => return,
        };
        match sink.add_batch(&batch) {
            Ok(summary) => log::debug!(
                "{}: stored {} events ({} new templates)",
                category,
                summary.occurrences,
                summary.new_templates
            ),
            Err(e) => {
                log::error!("{}: dropped a batch of {} events", category, batch.len());
                log_error(&e);
            }
        }
    }

    pub fn flush_all(&mut self) {
        for category in Category::ALL.iter() {
            self.flush(*category);
        }
    }

    #[must_use]
    pub fn buffered(&self, category: Category) -> usize {
        self.buffers.get(&category).map_or(0, Vec::len)
    }

    /// Consumes events until shutdown or until the input closes, then
    /// flushes what is left and closes the sinks.
    pub fn run(mut self, input: &Receiver<ProcessedEvent>, shutdown: &Shutdown) {
        log::info!("scheduler started");
        loop {
            select! {
                recv(input) -> msg => match msg {
                    Ok(event) => self.push(event),
                    Err(_) => break,
                },
                recv(shutdown.receiver()) -> _ => break,
                default(self.config.poll_timeout) => {}
            }
            self.tick(Instant::now());
        }
        let mut drained = 0;
        while let Ok(event) = input.try_recv() {
            self.push(event);
            drained += 1;
        }
        if drained > 0 {
            log::info!("scheduler drained {} queued events", drained);
        }
        self.close();
    }

    /// Flushes all buffers and closes every sink.
    pub fn close(mut self) {
        self.flush_all();
        for (_, sink) in self.sinks.drain() {
            sink.close();
        }
        log::info!("scheduler stopped");
    }
}
