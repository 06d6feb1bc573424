//! SQL backends (spec §4.7): node-interning tables plus one
//! statements table per model, shared across SQLite/PostgreSQL/MySQL
//! behind one [`SqlBackend`] trait. [`SqlStorage`] owns the
//! id-computation and pattern-matching logic once; each concrete
//! backend module only has to speak its own client crate's dialect
//! and connection management.
//!
//! Every [`SqlBackend`] method takes `&self`: the connection pool each
//! backend wraps lives behind a `RefCell` internally, matching
//! [`crate::storage::Storage`]'s own split between `&self` reads
//! (`size`, `contains`, `find`) and `&mut self` writes (`add`,
//! `remove`) — a SQL round trip is a read-or-write either way, so the
//! pool's interior mutability is the only place that distinction
//! actually has to live.

pub mod intern;
pub mod pool;

#[cfg(feature = "mysql-backend")]
pub mod mysql;
#[cfg(feature = "postgres-backend")]
pub mod postgres;
#[cfg(feature = "sqlite-backend")]
pub mod sqlite;

use crate::node::Node;
use crate::storage::{Storage, StorageError, StorageOptions, StorageResult};
use crate::stream::{QuadStream, VecQuadStream};
use crate::triple::{Pattern, Quad, Triple};

use intern::{node_id, NodeId, NodeKind};

/// A node as recovered from the intern tables: enough to rebuild the
/// exact [`Node`] it was interned from.
#[derive(Debug, Clone)]
pub struct InternedNode {
    pub kind: NodeKind,
    pub value: Vec<u8>,
    pub language: Option<String>,
    pub datatype: Option<Vec<u8>>,
}

impl InternedNode {
    pub fn resource(uri: Vec<u8>) -> Self {
        InternedNode {
            kind: NodeKind::Resource,
            value: uri,
            language: None,
            datatype: None,
        }
    }

    pub fn bnode(name: Vec<u8>) -> Self {
        InternedNode {
            kind: NodeKind::Bnode,
            value: name,
            language: None,
            datatype: None,
        }
    }

    pub fn literal(value: Vec<u8>, language: Option<String>, datatype: Option<Vec<u8>>) -> Self {
        InternedNode {
            kind: NodeKind::Literal,
            value,
            language,
            datatype,
        }
    }

    fn into_node(self) -> StorageResult<Node> {
        match self.kind {
            NodeKind::Resource => {
                Node::new_iri(self.value).map_err(|e| StorageError::Backend(e.to_string()))
            }
            NodeKind::Bnode => Ok(Node::new_blank(Some(self.value))),
            NodeKind::Literal => Node::new_typed_literal(self.value, self.language, self.datatype)
                .map_err(|e| StorageError::Backend(e.to_string())),
        }
    }
}

/// One row recovered from `Statements<model_id>` joined back against
/// the intern tables (spec §4.7.3).
pub struct SqlRow {
    pub subject: InternedNode,
    pub predicate: InternedNode,
    pub object: InternedNode,
    pub context: Option<InternedNode>,
}

/// A `find`/`contains` pattern reduced to ids (spec §4.7.3: "for each
/// non-NULL pattern component, compute its id ... and AND a `column =
/// id` clause").
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlPatternIds {
    pub subject: Option<NodeId>,
    pub predicate: Option<NodeId>,
    pub object: Option<NodeId>,
    /// `None` = unconstrained; `Some(None)` = default graph only;
    /// `Some(Some(id))` = one named graph.
    pub context: Option<Option<NodeId>>,
}

/// What a concrete SQL client crate has to provide (spec §4.7): schema
/// setup, node interning, statement writes/reads, and transaction
/// pinning. [`SqlStorage`] drives this trait to implement [`Storage`].
pub trait SqlBackend {
    fn open(&self, options: &StorageOptions) -> StorageResult<()>;
    fn close(&self) -> StorageResult<()>;

    /// Interns a node if its id is not already present. Unique-key
    /// violations from a duplicate insert (SQL state `23505`/`1062`,
    /// spec §4.7.2) are swallowed here, not propagated.
    fn intern(&self, id: NodeId, node: &InternedNode) -> StorageResult<()>;

    /// Inserts one statement row. Must be idempotent: adding the same
    /// `(s, p, o, c)` twice leaves exactly one row (spec §4.7.2's
    /// "rely on a unique constraint to silently reject duplicates"),
    /// via a `UNIQUE`/`ON CONFLICT`/`INSERT IGNORE` mechanism on the
    /// `Statements` table rather than a pre-check in this trait.
    fn insert_statement(
        &self,
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    ) -> StorageResult<()>;
    fn delete_statement(
        &self,
        s: NodeId,
        p: NodeId,
        o: NodeId,
        c: Option<NodeId>,
    ) -> StorageResult<()>;
    fn delete_context(&self, context: NodeId) -> StorageResult<()>;

    fn count_statements(&self) -> StorageResult<i64>;
    fn contains_triple(&self, s: NodeId, p: NodeId, o: NodeId) -> StorageResult<bool>;
    fn select_statements(&self, pattern: &SqlPatternIds) -> StorageResult<Vec<SqlRow>>;
    fn select_contexts(&self) -> StorageResult<Vec<InternedNode>>;

    fn begin_transaction(&self) -> StorageResult<()>;
    fn commit_transaction(&self) -> StorageResult<()>;
    fn rollback_transaction(&self) -> StorageResult<()>;

    fn name(&self) -> &'static str;
}

/// The dialect-agnostic half of every SQL backend (spec §4.7):
/// computes ids, drives [`SqlBackend`], and reconstructs [`Quad`]s
/// from the rows it gets back.
#[derive(Default)]
pub struct SqlStorage<B> {
    backend: B,
    opened: bool,
}

impl<B: Default> SqlStorage<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

fn require_open(opened: bool) -> StorageResult<()> {
    if opened {
        Ok(())
    } else {
        Err(StorageError::Backend("storage is not open".to_string()))
    }
}

fn interned_of(node: &Node) -> InternedNode {
    match node {
        Node::Iri(uri) => InternedNode::resource(uri.clone()),
        Node::Blank(name) => InternedNode::bnode(name.clone()),
        Node::Literal(lit) => InternedNode::literal(
            lit.lexical().to_vec(),
            lit.language().map(str::to_string),
            lit.datatype().map(|d| d.to_vec()),
        ),
    }
}

impl<B: SqlBackend> SqlStorage<B> {
    fn intern_node(&self, node: &Node) -> StorageResult<NodeId> {
        let id = node_id(node);
        self.backend.intern(id, &interned_of(node))?;
        Ok(id)
    }
}

impl<B: SqlBackend> Storage for SqlStorage<B> {
    fn open(&mut self, options: &StorageOptions) -> StorageResult<()> {
        self.backend.open(options)?;
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.opened = false;
        self.backend.close()
    }

    fn size(&self) -> StorageResult<i64> {
        require_open(self.opened)?;
        self.backend.count_statements()
    }

    fn add(&mut self, quad: &Quad) -> StorageResult<()> {
        require_open(self.opened)?;
        let s = self.intern_node(&quad.subject)?;
        let p = self.intern_node(&quad.predicate)?;
        let o = self.intern_node(&quad.object)?;
        let c = quad.context.as_ref().map(|ctx| self.intern_node(ctx)).transpose()?;
        self.backend.insert_statement(s, p, o, c)
    }

    fn remove(&mut self, quad: &Quad) -> StorageResult<()> {
        require_open(self.opened)?;
        let s = node_id(&quad.subject);
        let p = node_id(&quad.predicate);
        let o = node_id(&quad.object);
        let c = quad.context.as_ref().map(node_id);
        self.backend.delete_statement(s, p, o, c)
    }

    fn contains(&self, triple: &Triple) -> StorageResult<bool> {
        require_open(self.opened)?;
        self.backend.contains_triple(
            node_id(&triple.subject),
            node_id(&triple.predicate),
            node_id(&triple.object),
        )
    }

    fn find<'a>(&'a self, pattern: &Pattern) -> StorageResult<Box<dyn QuadStream + 'a>> {
        require_open(self.opened)?;
        let ids = SqlPatternIds {
            subject: pattern.subject.as_ref().map(node_id),
            predicate: pattern.predicate.as_ref().map(node_id),
            object: pattern.object.as_ref().map(node_id),
            context: pattern.context.as_ref().map(|c| c.as_ref().map(node_id)),
        };
        let rows = self.backend.select_statements(&ids)?;
        let quads = rows
            .into_iter()
            .map(row_into_quad)
            .collect::<StorageResult<Vec<Quad>>>()?;
        Ok(Box::new(VecQuadStream::new(quads)))
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn supports_contexts(&self) -> bool {
        true
    }

    fn context_remove_all(&mut self, context: &Node) -> StorageResult<()> {
        require_open(self.opened)?;
        self.backend.delete_context(node_id(context))
    }

    fn get_contexts(&self) -> StorageResult<Vec<Node>> {
        require_open(self.opened)?;
        self.backend
            .select_contexts()?
            .into_iter()
            .map(InternedNode::into_node)
            .collect()
    }

    fn sync(&mut self) -> StorageResult<()> {
        // SQL backends write through on every statement (spec §4.7.2
        // issues the `INSERT` immediately); nothing is buffered here.
        Ok(())
    }

    fn transaction_start(&mut self) -> StorageResult<()> {
        require_open(self.opened)?;
        self.backend.begin_transaction()
    }

    fn transaction_commit(&mut self) -> StorageResult<()> {
        require_open(self.opened)?;
        self.backend.commit_transaction()
    }

    fn transaction_rollback(&mut self) -> StorageResult<()> {
        require_open(self.opened)?;
        self.backend.rollback_transaction()
    }
}

fn row_into_quad(row: SqlRow) -> StorageResult<Quad> {
    let context = row.context.map(InternedNode::into_node).transpose()?;
    Ok(Quad::new(
        row.subject.into_node()?,
        row.predicate.into_node()?,
        row.object.into_node()?,
        context,
    ))
}
