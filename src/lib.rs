//! `rdf-engine` — an embeddable RDF graph library's pluggable storage
//! core (spec §1).
//!
//! This crate owns the layer between the abstract graph model (the
//! [`Model`] façade: `add`/`remove`/`contains`/`find`/`size`/`sync`/
//! `contexts`/sub-models) and one of several interchangeable backends:
//! an in-memory or on-disk hash-indexed quad store ([`storage::hash`]),
//! SQL backends over node-interning tables ([`storage::sql`], feature
//! gated), and a SPARQL-over-ODBC backend for Virtuoso
//! ([`storage::odbc`], feature gated).
//!
//! Concrete RDF syntax parsing/serialization and SPARQL query
//! evaluation are explicitly out of scope (spec §1) — this crate only
//! defines the narrow interfaces those collaborators plug into:
//! [`parser::TripleSink`] and [`query::Query`]/[`query::QueryResults`].
//!
//! Every entry point in this crate is synchronous on the calling
//! thread (spec §5): there are no internal threads, async runtimes, or
//! event loops. Concurrent use from multiple threads requires external
//! mutual exclusion.

pub mod codec;
pub mod error;
pub mod log;
pub mod model;
pub mod node;
pub mod parser;
pub mod query;
pub mod storage;
pub mod stream;
pub mod triple;

pub use codec::{CodecError, CodecResult};
pub use error::{EngineError, EngineResult};
pub use model::{Model, ModelError, ModelResult};
pub use node::{Literal, Node, NodeError, NodeResult};
pub use query::{Query, QueryResults};
pub use storage::{Storage, StorageError, StorageOptions, StorageResult};
pub use stream::{GetMode, QuadStream, Stream};
pub use triple::{ComponentMask, Pattern, Quad, StatementBuilder, Triple};

/// Crate version, re-exported for diagnostics and the `rdfproc` CLI's
/// `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
