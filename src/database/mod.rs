use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, PooledConnection};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod occurrence;
mod parameter;
mod schema;
mod template;

pub(crate) use self::occurrence::*;
pub(crate) use self::parameter::*;
pub(crate) use self::template::*;

pub(crate) type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub(crate) type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("connection error: {0}")]
    R2D2(#[from] r2d2::Error),
    #[error("migration error: {0}")]
    Migration(#[from] diesel_migrations::RunMigrationsError),
    #[error("vector file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embed::Error),
    #[error("vector has {found} dimensions, store expects {expected}")]
    Dimension { expected: usize, found: usize },
    #[error("store was opened read-only")]
    ReadOnly,
    #[error("catalog and vector file disagree: {0}")]
    Inconsistent(String),
}

embed_migrations!();

/// Pragmas applied to every pooled connection. WAL lets a search process
/// read while the ingest process commits.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub(crate) fn connect(path: &Path, max_size: u32) -> Result<Pool, Error> {
    let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout: BUSY_TIMEOUT,
        }))
        .build(manager)?;
    Ok(pool)
}

pub(crate) fn migrate(conn: &Conn) -> Result<(), Error> {
    embedded_migrations::run(conn)?;
    Ok(())
}
