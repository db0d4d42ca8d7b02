use crossbeam_channel::bounded;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};

use crate::collector::Collector;
use crate::config::Config;
use crate::error::InitializeError;
use crate::event::Category;
use crate::normalizer::Normalizer;
use crate::notify::{DesktopNotifier, NoopNotifier, Notifier};
use crate::scheduler::Scheduler;
use crate::shutdown::Shutdown;
use crate::store::{Mode, Store};

const QUEUE_CAPACITY: usize = 10_000;

/// The running ingestion pipeline: collector, miner and scheduler threads
/// joined by bounded queues.
pub struct Engine {
    shutdown: Shutdown,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Engine {
    /// Opens every category store for writing and starts the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, the embedder or a store
    /// cannot be set up, or a thread cannot be spawned.
    pub fn start(config: &Config) -> Result<Self, InitializeError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| {
            InitializeError::DataDirectory {
                path: config.data_dir.display().to_string(),
                source,
            }
        })?;
        let embedder = config.embedder()?;
        let mut stores = HashMap::new();
        for category in Category::ALL.iter() {
            let store = Store::open(
                &config.data_dir,
                *category,
                Mode::Writer,
                embedder.clone(),
                config.search,
            )
            .map_err(|source| InitializeError::Store {
                category: *category,
                source,
            })?;
            stores.insert(*category, store);
        }
        let notifier: Box<dyn Notifier> = if config.notify {
            let desktop =
                DesktopNotifier::new().map_err(|e| InitializeError::Spawn("notifier", e))?;
            Box::new(desktop)
        } else {
            Box::new(NoopNotifier)
        };

        let shutdown = Shutdown::new();
        let (raw_tx, raw_rx) = bounded(QUEUE_CAPACITY);
        let (processed_tx, processed_rx) = bounded(QUEUE_CAPACITY);
        let mut workers = Vec::new();

        let collector = Collector::new(config.journal_command.clone(), config.restart_delay);
        let signal = shutdown.clone();
        workers.push(spawn("collector", move || {
            collector.run(&raw_tx, &signal);
        })?);

        let normalizer = Normalizer::new(config.similarity_threshold, notifier);
        let signal = shutdown.clone();
        let poll = config.scheduler.poll_timeout;
        workers.push(spawn("normalizer", move || {
            normalizer.run(&raw_rx, &processed_tx, &signal, poll);
        })?);

        let scheduler = Scheduler::new(stores, config.scheduler);
        let signal = shutdown.clone();
        workers.push(spawn("scheduler", move || {
            scheduler.run(&processed_rx, &signal);
        })?);

        log::info!(
            "engine active, writing to {}",
            config.data_dir.display()
        );
        Ok(Self { shutdown, workers })
    }

    /// A handle that stops the engine when triggered.
    #[must_use]
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Waits for every worker to finish.
    pub fn join(self) {
        for (name, handle) in self.workers {
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
        log::info!("engine stopped");
    }

    pub fn stop(self) {
        self.shutdown.trigger();
        self.join();
    }
}

fn spawn<F>(name: &'static str, work: F) -> Result<(&'static str, JoinHandle<()>), InitializeError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map(|handle| (name, handle))
        .map_err(|e| InitializeError::Spawn(name, e))
}
