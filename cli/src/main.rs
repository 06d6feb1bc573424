//! `rdfproc` — a minimal command-line driver for the `rdf-engine`
//! storage core (spec §1: explicitly out of scope for the library
//! itself, specified here only as a thin shell around [`rdf_engine`]).
//!
//! Opens one backend by name plus an options string, then runs a
//! single operation against it. There is no concrete RDF syntax
//! parsing here (spec §1 Non-goals) — triples are given directly on
//! the command line as IRI/literal text, not loaded from a Turtle or
//! RDF/XML file.

use clap::{Parser, Subcommand};

use rdf_engine::storage::hash::HashStorage;
use rdf_engine::{Model, Node, Pattern, StorageOptions, Triple};

#[cfg(feature = "sqlite-backend")]
use rdf_engine::storage::sql::sqlite::SqliteStorage;

#[derive(Parser)]
#[command(name = "rdfproc", version, about = "Drive an rdf-engine storage backend from the shell")]
struct Cli {
    /// Backend name: "hashes" or (with the matching feature) "sqlite".
    #[arg(long, default_value = "hashes")]
    backend: String,

    /// Storage options, e.g. "hash-type='memory',contexts='yes'".
    #[arg(long, default_value = "hash-type='memory'")]
    options: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add one triple to the default graph.
    Add { subject: String, predicate: String, object: String },
    /// Remove one triple from the default graph.
    Remove { subject: String, predicate: String, object: String },
    /// Print 1 if the triple is present, 0 otherwise.
    Contains { subject: String, predicate: String, object: String },
    /// Find triples matching a pattern; use "-" for an unbound component.
    Find { subject: String, predicate: String, object: String },
    /// Print every quad in the store.
    Serialize,
    /// Print the number of quads in the store.
    Size,
    /// Print every distinct context (named graph) in the store.
    Contexts,
}

fn main() {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("rdfproc: {e}");
        std::process::exit(1);
    }
}

fn open_model(backend: &str, options: &str) -> Result<Model, Box<dyn std::error::Error>> {
    let options = StorageOptions::parse(options)?;
    let storage: Box<dyn rdf_engine::Storage> = match backend {
        "hashes" => Box::new(HashStorage::new()),
        #[cfg(feature = "sqlite-backend")]
        "sqlite" => Box::new(SqliteStorage::new()),
        other => return Err(format!("unknown or disabled backend {other:?}").into()),
    };
    Ok(Model::new(storage, &options)?)
}

/// Parses one CLI term into a [`Node`]: `_:name` is a blank node,
/// anything else is treated as an IRI. Literal objects are not
/// distinguished from IRI objects on this minimal command line — pass
/// an absolute IRI (or a `_:` blank id) for every position.
fn parse_node(term: &str) -> Result<Node, Box<dyn std::error::Error>> {
    if let Some(id) = term.strip_prefix("_:") {
        return Ok(Node::new_blank(Some(id)));
    }
    Ok(Node::new_iri(term)?)
}

fn parse_node_or_wildcard(term: &str) -> Result<Option<Node>, Box<dyn std::error::Error>> {
    if term == "-" {
        return Ok(None);
    }
    Ok(Some(parse_node(term)?))
}

fn print_triple(t: &Triple) {
    println!("{} {} {}", t.subject, t.predicate, t.object);
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let model = open_model(&cli.backend, &cli.options)?;

    match cli.command {
        Commands::Add { subject, predicate, object } => {
            model.add(parse_node(&subject)?, parse_node(&predicate)?, parse_node(&object)?)?;
        }
        Commands::Remove { subject, predicate, object } => {
            let triple = Triple::new(parse_node(&subject)?, parse_node(&predicate)?, parse_node(&object)?);
            model.remove(&triple)?;
        }
        Commands::Contains { subject, predicate, object } => {
            let triple = Triple::new(parse_node(&subject)?, parse_node(&predicate)?, parse_node(&object)?);
            println!("{}", if model.contains(&triple)? { 1 } else { 0 });
        }
        Commands::Find { subject, predicate, object } => {
            let mut pattern = Pattern::any();
            if let Some(n) = parse_node_or_wildcard(&subject)? {
                pattern = pattern.with_subject(n);
            }
            if let Some(n) = parse_node_or_wildcard(&predicate)? {
                pattern = pattern.with_predicate(n);
            }
            if let Some(n) = parse_node_or_wildcard(&object)? {
                pattern = pattern.with_object(n);
            }
            for quad in model.find(&pattern)? {
                print_triple(&quad.triple());
            }
        }
        Commands::Serialize => {
            for quad in model.serialize()? {
                print_triple(&quad.triple());
            }
        }
        Commands::Size => {
            println!("{}", model.size()?);
        }
        Commands::Contexts => {
            for ctx in model.contexts()? {
                println!("{ctx}");
            }
        }
    }

    Ok(())
}
