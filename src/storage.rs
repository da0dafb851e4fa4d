// used for storage
use r2d2::{ManageConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, Row, params};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::compiler::PrerolledQuery;
use crate::corpus::{AUTHOR_ID_WIDTH, AuthorId, WorkId, is_author_id};
use crate::error::{Result, SearchError};

/// How long `acquire` waits for a free connection.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

// ------------- Lines -------------
pub const LINE_COLUMNS: &str = r#"wkuniversalid, "index", level_05_value, level_04_value, level_03_value, level_02_value, level_01_value, level_00_value, marked_up_line, accented_line, stripped_line, hyphenated_words, annotations"#;

/// Which text column a query matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchColumn {
    #[default]
    #[serde(rename = "stripped_line")]
    Stripped,
    #[serde(rename = "accented_line")]
    Accented,
    #[serde(rename = "marked_up_line")]
    MarkedUp,
}

impl SearchColumn {
    pub fn sql_name(&self) -> &'static str {
        match self {
            SearchColumn::Stripped => "stripped_line",
            SearchColumn::Accented => "accented_line",
            SearchColumn::MarkedUp => "marked_up_line",
        }
    }
}

/// Composite identity of one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LineKey {
    pub author: AuthorId,
    pub work: WorkId,
    pub index: i64,
}

/// One row of an author table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkLine {
    pub work: WorkId,
    pub index: i64,
    /// Citation levels, level_05 first.
    pub levels: [String; 6],
    pub marked_up: String,
    pub accented: String,
    pub stripped: String,
    pub hyphenated: String,
    pub annotations: String,
}

impl WorkLine {
    /// A plain line carrying the same text in every text column.
    pub fn new(work: &str, index: i64, text: &str) -> Self {
        Self {
            work: work.to_string(),
            index,
            marked_up: text.to_string(),
            accented: text.to_string(),
            stripped: text.to_string(),
            ..Default::default()
        }
    }
    pub fn author(&self) -> &str {
        self.work.get(..AUTHOR_ID_WIDTH).unwrap_or(&self.work)
    }
    pub fn key(&self) -> LineKey {
        LineKey {
            author: self.author().to_string(),
            work: self.work.clone(),
            index: self.index,
        }
    }
    pub fn text(&self, column: SearchColumn) -> &str {
        match column {
            SearchColumn::Stripped => &self.stripped,
            SearchColumn::Accented => &self.accented,
            SearchColumn::MarkedUp => &self.marked_up,
        }
    }
}

fn text(row: &Row, i: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(i)?.unwrap_or_default())
}

fn line_from_row(row: &Row) -> rusqlite::Result<WorkLine> {
    Ok(WorkLine {
        work: row.get(0)?,
        index: row.get(1)?,
        levels: [
            text(row, 2)?,
            text(row, 3)?,
            text(row, 4)?,
            text(row, 5)?,
            text(row, 6)?,
            text(row, 7)?,
        ],
        marked_up: text(row, 8)?,
        accented: text(row, 9)?,
        stripped: text(row, 10)?,
        hyphenated: text(row, 11)?,
        annotations: text(row, 12)?,
    })
}

// ------------- Seams -------------
/// A connection that runs prerolled queries.
pub trait LineConnection: Send + 'static {
    /// Run the optional DDL, then the query, on this one connection.
    fn fetch(&mut self, query: &PrerolledQuery) -> Result<Vec<WorkLine>>;
    fn line(&mut self, table: &str, index: i64) -> Result<Option<WorkLine>>;
}

pub trait LineStore: Send + Sync + 'static {
    type Connection: LineConnection;
    fn acquire(&self) -> Result<Self::Connection>;
}

// ------------- Pool -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Named shared-cache memory database, alive while the pool is.
    InMemory(String),
    File(PathBuf),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            // compiled once per statement
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            match ctx.get_raw(1).as_str_or_null() {
                Ok(Some(text)) => Ok(pattern.is_match(text)),
                Ok(None) => Ok(false),
                Err(e) => Err(rusqlite::Error::UserFunctionError(e.into())),
            }
        },
    )
}

fn manager(mode: &StorageMode) -> SqliteConnectionManager {
    let manager = match mode {
        StorageMode::InMemory(name) => {
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared")).with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        StorageMode::File(path) => SqliteConnectionManager::file(path),
    };
    manager.with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        register_regexp(conn)
    })
}

/// Pooled rusqlite connections over one database, at most `max_size` open
/// at a time.
#[derive(Clone)]
pub struct LinePool {
    pool: Pool<SqliteConnectionManager>,
    // keeps a memory database from vanishing between searches
    _anchor: Option<Arc<Mutex<Connection>>>,
}

impl LinePool {
    pub fn open(mode: StorageMode, max_size: usize) -> Result<Self> {
        let manager = manager(&mode);
        let anchor = match mode {
            StorageMode::InMemory(_) => Some(Arc::new(Mutex::new(manager.connect()?))),
            StorageMode::File(_) => None,
        };
        let pool = Pool::builder()
            .max_size(max_size.clamp(1, u32::MAX as usize) as u32)
            .min_idle(Some(1))
            .connection_timeout(ACQUIRE_TIMEOUT)
            .build(manager)?;
        debug!(max_size, "line pool opened");
        Ok(Self {
            pool,
            _anchor: anchor,
        })
    }

    pub fn in_memory(name: &str) -> Result<Self> {
        Self::open(StorageMode::InMemory(name.to_string()), 16)
    }

    pub fn idle_count(&self) -> usize {
        self.pool.state().idle_connections as usize
    }

    pub fn open_count(&self) -> usize {
        self.pool.state().connections as usize
    }

    pub fn create_author_table(&self, author: &str) -> Result<()> {
        checked_table(author)?;
        let mut pooled = self.acquire()?;
        pooled.connection().execute_batch(&format!(
            r#"
            create table if not exists {author} (
                "index" integer primary key,
                wkuniversalid text not null,
                level_05_value text,
                level_04_value text,
                level_03_value text,
                level_02_value text,
                level_01_value text,
                level_00_value text,
                marked_up_line text,
                accented_line text,
                stripped_line text,
                hyphenated_words text,
                annotations text
            );
            "#
        ))?;
        Ok(())
    }

    /// Load lines into an author table inside one transaction.
    pub fn insert_lines(&self, author: &str, lines: &[WorkLine]) -> Result<usize> {
        checked_table(author)?;
        let mut pooled = self.acquire()?;
        let tx = pooled.connection().transaction()?;
        {
            let mut insert = tx.prepare(&format!(
                r#"
                insert into {author} ({LINE_COLUMNS})
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#
            ))?;
            for line in lines {
                if line.author() != author {
                    return Err(SearchError::Storage(format!(
                        "line {} of {} does not belong in table {author}",
                        line.index, line.work
                    )));
                }
                insert.execute(params![
                    &line.work,
                    &line.index,
                    &line.levels[0],
                    &line.levels[1],
                    &line.levels[2],
                    &line.levels[3],
                    &line.levels[4],
                    &line.levels[5],
                    &line.marked_up,
                    &line.accented,
                    &line.stripped,
                    &line.hyphenated,
                    &line.annotations
                ])?;
            }
        }
        tx.commit()?;
        debug!(table = author, rows = lines.len(), "lines loaded");
        Ok(lines.len())
    }
}

impl LineStore for LinePool {
    type Connection = PooledConnection;

    /// Waits up to the acquire timeout when every connection is out.
    fn acquire(&self) -> Result<PooledConnection> {
        Ok(PooledConnection {
            conn: self.pool.get()?,
            temp_tables: Vec::new(),
        })
    }
}

fn checked_table(table: &str) -> Result<()> {
    if is_author_id(table) {
        Ok(())
    } else {
        Err(SearchError::MalformedSelection(format!(
            "'{table}' is not an author table"
        )))
    }
}

/// A connection on loan from the pool. Temp tables it created are dropped
/// before it goes back.
pub struct PooledConnection {
    conn: r2d2::PooledConnection<SqliteConnectionManager>,
    temp_tables: Vec<String>,
}

impl PooledConnection {
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn temp_tables(&self) -> &[String] {
        &self.temp_tables
    }
}

impl LineConnection for PooledConnection {
    fn fetch(&mut self, query: &PrerolledQuery) -> Result<Vec<WorkLine>> {
        if let Some(temp) = &query.temp_table {
            self.conn.execute_batch(&temp.ddl)?;
            self.temp_tables.push(temp.name.clone());
        }
        let mut statement = self.conn.prepare(&query.sql)?;
        let rows = match &query.bind {
            Some(pattern) => statement.query_map(params![pattern], line_from_row)?,
            None => statement.query_map([], line_from_row)?,
        };
        let lines = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    fn line(&mut self, table: &str, index: i64) -> Result<Option<WorkLine>> {
        checked_table(table)?;
        let mut statement = self.conn.prepare(&format!(
            r#"select {LINE_COLUMNS} from {table} where "index" = ?1"#
        ))?;
        let mut rows = statement.query_map(params![index], line_from_row)?;
        Ok(rows.next().transpose()?)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        for table in self.temp_tables.drain(..) {
            if let Err(e) = self
                .conn
                .execute_batch(&format!(r#"drop table if exists temp."{table}";"#))
            {
                warn!(table = %table, error = %e, "could not drop temp table");
            }
        }
    }
}
