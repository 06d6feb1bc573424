//! SQLite backend (spec §4.7.6): the five interning/statement tables
//! plus `spindex`/`uriindex`, and the `SQLITE_LOCKED` deferred-write
//! queue.
//!
//! This crate's streams are materialized eagerly before they are
//! handed back to a caller ([`super::SqlStorage::find`] collects a
//! `Vec<SqlRow>` up front) — there is no SQLite cursor left open once
//! `select_statements` returns. The deferred-write queue is therefore
//! drained at the end of that same call rather than on some later
//! "stream close" event: the two coincide here, since nothing in this
//! crate holds a SQLite read transaction open past the call that
//! produced it.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use rusqlite::{Connection, ErrorCode, OptionalExtension};

use super::pool::Pool;
use super::{InternedNode, NodeId, NodeKind, SqlBackend, SqlPatternIds, SqlRow};
use crate::storage::{StorageError, StorageOptions, StorageResult};

// `context_key` mirrors `context` but is NOT NULL (0 standing in for the
// default graph): SQLite's UNIQUE index treats every NULL as distinct,
// so a uniqueness constraint on the nullable `context` column alone
// would never dedup default-graph statements. `context_key` is the
// dedup key; `context` (still nullable) is what reads hand back.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Resources (id INTEGER PRIMARY KEY, uri BLOB NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS Bnodes (id INTEGER PRIMARY KEY, name BLOB NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS Literals (id INTEGER PRIMARY KEY, value BLOB NOT NULL, language TEXT, datatype BLOB);
CREATE TABLE IF NOT EXISTS Models (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS Statements (subject INTEGER NOT NULL, predicate INTEGER NOT NULL, object INTEGER NOT NULL, context INTEGER, context_key INTEGER NOT NULL DEFAULT 0);
CREATE UNIQUE INDEX IF NOT EXISTS stindex ON Statements(subject, predicate, object, context_key);
CREATE INDEX IF NOT EXISTS spindex ON Statements(subject, predicate);
CREATE INDEX IF NOT EXISTS uriindex ON Resources(uri);
";

enum PendingWrite {
    Insert {
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    },
    Delete {
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    },
    DeleteContext {
        c: NodeId,
    },
}

pub struct SqliteBackend {
    pool: RefCell<Pool<Connection>>,
    path: RefCell<Option<PathBuf>>,
    synchronous: RefCell<String>,
    deferred: RefCell<VecDeque<PendingWrite>>,
}

impl Default for SqliteBackend {
    fn default() -> Self {
        SqliteBackend {
            pool: RefCell::new(Pool::new()),
            path: RefCell::new(None),
            synchronous: RefCell::new("normal".to_string()),
            deferred: RefCell::new(VecDeque::new()),
        }
    }
}

pub type SqliteStorage = super::SqlStorage<SqliteBackend>;

impl SqliteBackend {
    fn connect(&self) -> StorageResult<Connection> {
        let path = self.path.borrow();
        let path = path
            .as_ref()
            .ok_or_else(|| StorageError::Backend("sqlite backend is not open".to_string()))?;
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.pragma_update(None, "synchronous", self.synchronous.borrow().as_str())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(conn)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StorageResult<T> {
        self.with_conn_raw(f)?
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn with_conn_raw<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<rusqlite::Result<T>> {
        let idx = {
            let mut pool = self.pool.borrow_mut();
            pool.get_handle(|| self.connect())?
        };
        let result = {
            let mut pool = self.pool.borrow_mut();
            let conn = pool.conn_mut(idx)?;
            f(conn)
        };
        self.pool.borrow_mut().release_handle(idx);
        Ok(result)
    }

    fn run_write(conn: &Connection, write: &PendingWrite) -> rusqlite::Result<()> {
        match write {
            PendingWrite::Insert { s, p, o, c } => conn
                .execute(
                    "INSERT OR IGNORE INTO Statements (subject, predicate, object, context, context_key) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![*s as i64, *p as i64, *o as i64, c.map(|v| v as i64), c.unwrap_or(0) as i64],
                )
                .map(|_| ()),
            PendingWrite::Delete { s, p, o, c } => conn
                .execute(
                    "DELETE FROM Statements WHERE subject = ?1 AND predicate = ?2 AND object = ?3 \
                     AND ((?4 IS NULL AND context IS NULL) OR context = ?4)",
                    rusqlite::params![*s as i64, *p as i64, *o as i64, c.map(|v| v as i64)],
                )
                .map(|_| ()),
            PendingWrite::DeleteContext { c } => conn
                .execute(
                    "DELETE FROM Statements WHERE context = ?1",
                    rusqlite::params![*c as i64],
                )
                .map(|_| ()),
        }
    }

    /// Runs `write` now; if it fails with `SQLITE_LOCKED` it is queued
    /// instead of erroring (spec §4.7.6).
    fn write_or_defer(&self, write: PendingWrite) -> StorageResult<()> {
        let outcome = self.with_conn_raw(|conn| Self::run_write(conn, &write))?;
        match outcome {
            Ok(()) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(ffi_err, _))
                if ffi_err.code == ErrorCode::DatabaseLocked =>
            {
                self.deferred.borrow_mut().push_back(write);
                Ok(())
            }
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    /// Drains the deferred queue, stopping (and leaving the remainder
    /// queued) at the first write that still can't go through.
    fn drain_deferred(&self) -> StorageResult<()> {
        while let Some(write) = self.deferred.borrow_mut().pop_front() {
            let outcome = self.with_conn_raw(|conn| Self::run_write(conn, &write))?;
            if let Err(e) = outcome {
                self.deferred.borrow_mut().push_front(write);
                return Err(StorageError::Backend(e.to_string()));
            }
        }
        Ok(())
    }

    fn resolve(&self, cache: &mut HashMap<i64, InternedNode>, id: i64) -> StorageResult<InternedNode> {
        if let Some(node) = cache.get(&id) {
            return Ok(node.clone());
        }
        let node = self.with_conn(|conn| {
            if let Some(uri) = conn
                .query_row("SELECT uri FROM Resources WHERE id = ?1", [id], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .optional()?
            {
                return Ok(Some(InternedNode::resource(uri)));
            }
            if let Some(name) = conn
                .query_row("SELECT name FROM Bnodes WHERE id = ?1", [id], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .optional()?
            {
                return Ok(Some(InternedNode::bnode(name)));
            }
            let literal = conn
                .query_row(
                    "SELECT value, language, datatype FROM Literals WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, Vec<u8>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<Vec<u8>>>(2)?,
                        ))
                    },
                )
                .optional()?;
            Ok(literal.map(|(value, language, datatype)| InternedNode::literal(value, language, datatype)))
        })?;
        let node = node.ok_or_else(|| StorageError::Backend(format!("no interned node with id {id}")))?;
        cache.insert(id, node.clone());
        Ok(node)
    }
}

impl SqlBackend for SqliteBackend {
    fn open(&self, options: &StorageOptions) -> StorageResult<()> {
        let path = options.get("path").ok_or_else(|| {
            StorageError::InvalidOptions("sqlite backend requires a 'path' option".to_string())
        })?;
        let new = options.get_bool("new", false);
        let synchronous = options.get("synchronous").unwrap_or("normal").to_string();
        if !["off", "normal", "full"].contains(&synchronous.as_str()) {
            return Err(StorageError::InvalidOptions(format!(
                "invalid synchronous mode {synchronous:?}"
            )));
        }
        if new && path != ":memory:" {
            let _ = std::fs::remove_file(path);
        }
        *self.path.borrow_mut() = Some(PathBuf::from(path));
        *self.synchronous.borrow_mut() = synchronous;
        self.with_conn(|_| Ok(()))?;

        if let Some(name) = options.get("name") {
            self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO Models (name) VALUES (?1)",
                    rusqlite::params![name],
                )
                .map(|_| ())
            })?;
        }
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.pool.borrow_mut().close_all();
        Ok(())
    }

    fn intern(&self, id: NodeId, node: &InternedNode) -> StorageResult<()> {
        match node.kind {
            NodeKind::Resource => self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO Resources (id, uri) VALUES (?1, ?2)",
                    rusqlite::params![id as i64, node.value],
                )
                .map(|_| ())
            }),
            NodeKind::Bnode => self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO Bnodes (id, name) VALUES (?1, ?2)",
                    rusqlite::params![id as i64, node.value],
                )
                .map(|_| ())
            }),
            NodeKind::Literal => self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO Literals (id, value, language, datatype) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id as i64, node.value, node.language, node.datatype],
                )
                .map(|_| ())
            }),
        }
    }

    fn insert_statement(
        &self,
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    ) -> StorageResult<()> {
        self.write_or_defer(PendingWrite::Insert { s, p, o, c })
    }

    fn delete_statement(
        &self,
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    ) -> StorageResult<()> {
        self.write_or_defer(PendingWrite::Delete { s, p, o, c })
    }

    fn delete_context(&self, context: NodeId) -> StorageResult<()> {
        self.write_or_defer(PendingWrite::DeleteContext { c: context })
    }

    fn count_statements(&self) -> StorageResult<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM Statements", [], |row| row.get(0)))
    }

    fn contains_triple(&self, s: NodeId, p: NodeId, o: NodeId) -> StorageResult<bool> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM Statements WHERE subject = ?1 AND predicate = ?2 AND object = ?3",
                rusqlite::params![s as i64, p as i64, o as i64],
                |row| row.get(0),
            )
        })?;
        Ok(count > 0)
    }

    fn select_statements(&self, pattern: &SqlPatternIds) -> StorageResult<Vec<SqlRow>> {
        let mut clauses = Vec::new();
        let mut params: Vec<i64> = Vec::new();
        if let Some(s) = pattern.subject {
            clauses.push("subject = ?".to_string());
            params.push(s as i64);
        }
        if let Some(p) = pattern.predicate {
            clauses.push("predicate = ?".to_string());
            params.push(p as i64);
        }
        if let Some(o) = pattern.object {
            clauses.push("object = ?".to_string());
            params.push(o as i64);
        }
        match pattern.context {
            None => {}
            Some(None) => clauses.push("context IS NULL".to_string()),
            Some(Some(c)) => {
                clauses.push("context = ?".to_string());
                params.push(c as i64);
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT subject, predicate, object, context FROM Statements{where_sql}");

        let raw_rows: Vec<(i64, i64, i64, Option<i64>)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut cache = HashMap::new();
        let mut out = Vec::with_capacity(raw_rows.len());
        for (s, p, o, c) in raw_rows {
            out.push(SqlRow {
                subject: self.resolve(&mut cache, s)?,
                predicate: self.resolve(&mut cache, p)?,
                object: self.resolve(&mut cache, o)?,
                context: c.map(|id| self.resolve(&mut cache, id)).transpose()?,
            });
        }
        self.drain_deferred()?;
        Ok(out)
    }

    fn select_contexts(&self) -> StorageResult<Vec<InternedNode>> {
        let ids: Vec<i64> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT context FROM Statements WHERE context IS NOT NULL")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        let mut cache = HashMap::new();
        ids.into_iter().map(|id| self.resolve(&mut cache, id)).collect()
    }

    fn begin_transaction(&self) -> StorageResult<()> {
        let idx = {
            let mut pool = self.pool.borrow_mut();
            pool.get_handle(|| self.connect())?
        };
        {
            let mut pool = self.pool.borrow_mut();
            let conn = pool.conn_mut(idx)?;
            conn.execute_batch("BEGIN")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        self.pool.borrow_mut().pin(idx)
    }

    fn commit_transaction(&self) -> StorageResult<()> {
        let idx = self
            .pool
            .borrow_mut()
            .unpin()
            .ok_or_else(|| StorageError::Concurrency("no transaction in progress".to_string()))?;
        {
            let mut pool = self.pool.borrow_mut();
            let conn = pool.conn_mut(idx)?;
            conn.execute_batch("COMMIT")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        self.pool.borrow_mut().release_handle(idx);
        Ok(())
    }

    fn rollback_transaction(&self) -> StorageResult<()> {
        let idx = self
            .pool
            .borrow_mut()
            .unpin()
            .ok_or_else(|| StorageError::Concurrency("no transaction in progress".to_string()))?;
        {
            let mut pool = self.pool.borrow_mut();
            let conn = pool.conn_mut(idx)?;
            conn.execute_batch("ROLLBACK")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        self.pool.borrow_mut().release_handle(idx);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::storage::Storage;
    use crate::stream::{GetMode, QuadStream};
    use crate::triple::{Pattern, Quad, Triple};

    fn iri(s: &str) -> Node {
        Node::new_iri(s).unwrap()
    }

    fn opened() -> SqliteStorage {
        let mut s = SqliteStorage::new();
        s.open(&StorageOptions::parse("path=':memory:',name='test'").unwrap())
            .unwrap();
        s
    }

    #[test]
    fn add_find_contains_round_trip() {
        let mut s = opened();
        s.add(&Quad::new(iri("s"), iri("p"), iri("o"), None)).unwrap();
        assert!(s.contains(&Triple::new(iri("s"), iri("p"), iri("o"))).unwrap());
        assert_eq!(s.size().unwrap(), 1);

        let mut stream = s.find(&Pattern::any().with_subject(iri("s"))).unwrap();
        assert!(!stream.end());
        let quad = stream.get(GetMode::Current).unwrap();
        assert_eq!(quad.object, iri("o"));
    }

    #[test]
    fn duplicate_add_does_not_grow_the_store() {
        let mut s = opened();
        let quad = Quad::new(iri("s"), iri("p"), iri("o"), None);
        s.add(&quad).unwrap();
        s.add(&quad).unwrap();
        assert_eq!(s.size().unwrap(), 1);
    }

    #[test]
    fn context_remove_all_is_isolated() {
        let mut s = opened();
        s.add(&Quad::new(iri("a"), iri("p"), iri("1"), Some(iri("g1"))))
            .unwrap();
        s.add(&Quad::new(iri("a"), iri("p"), iri("2"), Some(iri("g2"))))
            .unwrap();
        s.context_remove_all(&iri("g1")).unwrap();
        assert_eq!(s.size().unwrap(), 1);
        assert!(s.contains(&Triple::new(iri("a"), iri("p"), iri("2"))).unwrap());
    }

    #[test]
    fn transaction_commit_is_visible_after_commit() {
        let mut s = opened();
        s.transaction_start().unwrap();
        s.add(&Quad::new(iri("s"), iri("p"), iri("o"), None)).unwrap();
        s.transaction_commit().unwrap();
        assert_eq!(s.size().unwrap(), 1);
    }
}
