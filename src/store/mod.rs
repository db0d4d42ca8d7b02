//! Per-category storage: an append-only vector file next to a SQLite
//! catalog of templates, occurrences and parameters.

mod search;
mod vector_file;

use chrono::Utc;
use diesel::Connection;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::path::Path;
use std::sync::Arc;

pub use self::search::{hydrate, Hydrated, SearchHit, SearchOutcome, Segment, EMPTY_STORE_MESSAGE};
pub use crate::database::Error;

use self::vector_file::VectorFile;
use crate::database::{self, Conn, Occurrence, Pool};
use crate::embed::{embed_checked, Embedder};
use crate::event::{Category, ProcessedEvent};

/// Spacing between the synthetic timestamps of one batch, in microseconds.
const EVENT_SPACING: i64 = 1_000;

pub const DEFAULT_COARSE_CANDIDATES: usize = 20;
pub const DEFAULT_RELEVANCE_FLOOR: f32 = 0.15;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchOptions {
    /// Number of template vectors kept by the coarse scan.
    pub coarse_candidates: usize,
    /// Minimum rerank score of a result when ordering by recency.
    pub relevance_floor: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            coarse_candidates: DEFAULT_COARSE_CANDIDATES,
            relevance_floor: DEFAULT_RELEVANCE_FLOOR,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// The single ingesting process. Repairs the vector file on open and
    /// keeps the template cache.
    Writer,
    /// Search only; may run while a writer is active.
    Reader,
}

#[derive(Clone, Copy, Debug)]
struct CachedTemplate {
    id: i32,
    vector_index: i64,
}

/// What one call to `add_batch` persisted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchSummary {
    pub occurrences: usize,
    pub new_templates: usize,
}

/// Catalog view of one template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateInfo {
    pub id: i32,
    pub text: String,
    pub vector_index: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub count: i64,
}

pub struct Store {
    category: Category,
    mode: Mode,
    dimension: usize,
    vectors: VectorFile,
    pool: Pool,
    embedder: Arc<dyn Embedder>,
    options: SearchOptions,
    cache: HashMap<String, CachedTemplate>,
    last_timestamp: i64,
}

impl Store {
    /// Opens (creating if needed) the `{category}.bin` and `{category}.sqlite`
    /// pair under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or catalog cannot be opened, or, in
    /// writer mode, if the vector file is missing committed records.
    pub fn open(
        dir: &Path,
        category: Category,
        mode: Mode,
        embedder: Arc<dyn Embedder>,
        options: SearchOptions,
    ) -> Result<Self, Error> {
        std::fs::create_dir_all(dir)?;
        let dimension = embedder.dimension();
        let vectors = VectorFile::new(&dir.join(format!("{}.bin", category)), dimension);
        let pool = database::connect(&dir.join(format!("{}.sqlite", category)), 4)?;
        let conn = pool.get()?;
        database::migrate(&conn)?;

        let mut store = Self {
            category,
            mode,
            dimension,
            vectors,
            pool,
            embedder,
            options,
            cache: HashMap::new(),
            last_timestamp: 0,
        };
        if mode == Mode::Writer {
            store.reconcile(&conn)?;
            store.cache = database::template_keys(&conn)?
                .into_iter()
                .map(|(text, id, vector_index)| (text, CachedTemplate { id, vector_index }))
                .collect();
            store.last_timestamp = database::last_timestamp(&conn)?.unwrap_or(0);
            info!(
                "{} store opened with {} templates",
                category,
                store.cache.len()
            );
        }
        Ok(store)
    }

    /// Brings the vector file back in line with the catalog after a crash.
    fn reconcile(&self, conn: &Conn) -> Result<(), Error> {
        if self.vectors.has_partial_tail()? {
            warn!("{}: dropping a partially written vector", self.category);
            self.vectors.truncate(self.vectors.len()?)?;
        }
        let templates = u64::try_from(database::template_count(conn)?).unwrap_or_default();
        let stored = self.vectors.len()?;
        if stored > templates {
            warn!(
                "{}: dropping {} vectors without a committed template",
                self.category,
                stored - templates
            );
            self.vectors.truncate(templates)?;
        } else if stored < templates {
            return Err(Error::Inconsistent(format!(
                "{} has {} templates but only {} vectors",
                self.category, templates, stored
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Persists a batch of mined events as one unit: either every
    /// occurrence is committed or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, the vector append, or the catalog
    /// transaction fails. The vector file is cut back in the latter cases.
    pub fn add_batch(&mut self, events: &[ProcessedEvent]) -> Result<BatchSummary, Error> {
        if events.is_empty() {
            return Ok(BatchSummary::default());
        }
        if self.mode == Mode::Reader {
            return Err(Error::ReadOnly);
        }
        let start = now_micros().max(self.last_timestamp + EVENT_SPACING);

        let mut seen = HashSet::new();
        let novel: Vec<&str> = events
            .iter()
            .map(|e| e.template.as_str())
            .filter(|t| !self.cache.contains_key(*t) && seen.insert(*t))
            .collect();
        let embeddings = embed_checked(self.embedder.as_ref(), &novel, self.dimension)?;

        let conn = self.pool.get()?;
        // a failed rollback may have left uncommitted vectors behind
        self.reconcile(&conn)?;
        let before = self.vectors.len()?;
        let first = match self.vectors.append(&embeddings) {
            Ok(first) => first,
            Err(e) => {
                self.rollback_vectors(before);
                return Err(e.into());
            }
        };
        let first = i64::try_from(first)
            .map_err(|_| Error::Inconsistent(format!("vector index {} out of range", first)))?;

        let cache = &self.cache;
        let committed = conn.transaction::<_, Error, _>(|| {
            let mut created = HashMap::new();
            for (offset, text) in novel.iter().enumerate() {
                let vector_index = first + offset as i64;
                let id = database::add_template(&conn, text, vector_index, start)?;
                created.insert(*text, CachedTemplate { id, vector_index });
            }
            let mut unseen: HashSet<&str> = novel.iter().copied().collect();
            for (i, event) in events.iter().enumerate() {
                let timestamp = start + i as i64 * EVENT_SPACING;
                let template = match cache.get(&event.template) {
                    Some(t) => *t,
                    None => *created.get(event.template.as_str()).ok_or_else(|| {
                        Error::Inconsistent(format!("template lost: {}", event.template))
                    })?,
                };
                if !unseen.remove(event.template.as_str()) {
                    database::touch_template(&conn, template.id, timestamp)?;
                }
                database::add_occurrence(
                    &conn,
                    &Occurrence {
                        id: timestamp,
                        template_id: template.id,
                        timestamp,
                        priority: i32::from(event.priority),
                    },
                )?;
                database::add_parameters(&conn, timestamp, &event.params)?;
            }
            Ok(created)
        });

        let created = match committed {
            Ok(created) => created,
            Err(e) => {
                self.rollback_vectors(before);
                return Err(e);
            }
        };
        let summary = BatchSummary {
            occurrences: events.len(),
            new_templates: created.len(),
        };
        for (text, template) in created {
            debug!(
                "{}: template #{} stored at vector {}: {}",
                self.category, template.id, template.vector_index, text
            );
            self.cache.insert(text.to_string(), template);
        }
        self.last_timestamp = start + (events.len() as i64 - 1) * EVENT_SPACING;
        Ok(summary)
    }

    fn rollback_vectors(&self, records: u64) {
        if let Err(e) = self.vectors.truncate(records) {
            warn!(
                "{}: could not cut the vector file back to {} records: {}",
                self.category, records, e
            );
        }
    }

    /// Number of complete vectors on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector file cannot be inspected.
    pub fn vector_count(&self) -> Result<u64, Error> {
        self.vectors.len().map_err(Into::into)
    }

    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn template_count(&self) -> Result<i64, Error> {
        database::template_count(&self.pool.get()?)
    }

    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn occurrence_count(&self) -> Result<i64, Error> {
        database::occurrence_count(&self.pool.get()?)
    }

    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn template(&self, text: &str) -> Result<Option<TemplateInfo>, Error> {
        let row = database::find_template(&self.pool.get()?, text)?;
        Ok(row.map(|row| TemplateInfo {
            id: row.id,
            text: row.text,
            vector_index: row.vector_index,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            count: row.count,
        }))
    }

    /// Releases the catalog connections.
    pub fn close(self) {
        info!("{} store closed", self.category);
    }
}

fn now_micros() -> i64 {
    let now = Utc::now();
    now.timestamp() * 1_000_000 + i64::from(now.timestamp_subsec_micros())
}
