//! `knowgraph` command-line client.
//!
//! # Responsibility
//! - Drive `knowgraph_core` against a SQLite-backed ledger file.
//! - Print one line per node or report entry.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use knowgraph_core::{
    init_logging, ArchiveOutcome, CreateNodeRequest, EnvelopeTransform, NodeFilter, NodeKind,
    NodeRecord, NodeStats, NodeStatus, NodeStore, Session, SqliteLedger, StoreConfig,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "knowgraph", version, about = "Knowledge node store over a key-value ledger")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Ledger database file (env: KNOWGRAPH_DB)
    #[arg(long, global = true, env = "KNOWGRAPH_DB", default_value = "knowgraph.sqlite3")]
    db: PathBuf,

    /// Identity address used to sign writes (env: KNOWGRAPH_ADDRESS)
    #[arg(long, global = true, env = "KNOWGRAPH_ADDRESS")]
    address: Option<String>,

    /// Store config JSON file (env: KNOWGRAPH_CONFIG)
    #[arg(long, global = true, env = "KNOWGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Absolute directory for rotating log files (env: KNOWGRAPH_LOG_DIR)
    #[arg(long, global = true, env = "KNOWGRAPH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level used with --log-dir
    #[arg(long, global = true, default_value = knowgraph_core::default_log_level())]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check core linkage
    Ping,
    /// List nodes, newest first
    List(ListArgs),
    /// Show counts by status and kind
    Stats,
    /// Read one node by id, including orphans
    Get { id: String },
    /// Create a node
    Create(CreateArgs),
    /// Archive a node
    Archive { id: String },
    /// Report index entries without records, unreadable records and duplicates
    Audit,
    /// Append orphan records to the index
    Recover {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    kind: Option<String>,
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// concept, entity or relation
    #[arg(long, default_value = "concept")]
    kind: String,
    #[arg(long)]
    content: String,
    /// Related node id; repeatable
    #[arg(long = "relation")]
    relations: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Active,
    Archived,
}

impl From<StatusArg> for NodeStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => NodeStatus::Active,
            StatusArg::Archived => NodeStatus::Archived,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.opts.log_dir {
        let log_dir = log_dir.to_str().context("log dir must be valid UTF-8")?;
        if let Err(message) = init_logging(&cli.opts.log_level, log_dir) {
            bail!("failed to initialize logging: {message}");
        }
    }
    info!("event=cli_start module=cli status=ok command={:?}", cli.command);

    if let Command::Ping = cli.command {
        println!("knowgraph_core ping={}", knowgraph_core::ping());
        println!("knowgraph_core version={}", knowgraph_core::core_version());
        return Ok(());
    }

    let config = match &cli.opts.config {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::default(),
    };
    let ledger = SqliteLedger::open(&cli.opts.db, config.ledger_busy_timeout())
        .with_context(|| format!("failed to open ledger `{}`", cli.opts.db.display()))?;
    let store = NodeStore::new(ledger, EnvelopeTransform, config);
    let session = cli
        .opts
        .address
        .as_deref()
        .map(Session::connected)
        .unwrap_or_default();

    match cli.command {
        Command::Ping => {}
        Command::List(args) => {
            let nodes = store.list()?;
            let filter = NodeFilter {
                kind: args.kind.as_deref().map(NodeKind::parse),
                status: args.status.map(Into::into),
            };
            for node in filter.apply(&nodes) {
                print_node(node);
            }
        }
        Command::Stats => {
            let stats = NodeStats::from_nodes(&store.list()?);
            println!(
                "total={} active={} archived={} concept={} entity={} relation={} other={}",
                stats.total,
                stats.active,
                stats.archived,
                stats.concepts,
                stats.entities,
                stats.relations,
                stats.other_kinds
            );
        }
        Command::Get { id } => match store.get(&id)? {
            Some(node) => print_node(&node),
            None => bail!("node not found: {id}"),
        },
        Command::Create(args) => {
            let request = CreateNodeRequest::new(NodeKind::parse(&args.kind), args.content)
                .with_relations(args.relations);
            let node = store.create(&session, &request)?;
            println!("created {}", node.id);
        }
        Command::Archive { id } => match store.archive(&session, &id)? {
            ArchiveOutcome::Archived(node) => println!("archived {}", node.id),
            ArchiveOutcome::AlreadyArchived(node) => println!("already archived {}", node.id),
        },
        Command::Audit => {
            let audit = store.audit()?;
            println!(
                "indexed={} readable={} consistent={}",
                audit.indexed,
                audit.readable,
                audit.is_consistent()
            );
            for id in &audit.missing {
                println!("missing {id}");
            }
            for id in &audit.unreadable {
                println!("unreadable {id}");
            }
            for id in &audit.duplicates {
                println!("duplicate {id}");
            }
        }
        Command::Recover { ids } => {
            let report = store.recover(&session, &ids)?;
            for id in &report.adopted {
                println!("adopted {id}");
            }
            for id in &report.already_indexed {
                println!("already indexed {id}");
            }
            for id in &report.missing {
                println!("missing {id}");
            }
            for id in &report.unreadable {
                println!("unreadable {id}");
            }
        }
    }
    Ok(())
}

fn print_node(node: &NodeRecord) {
    println!(
        "{}\t{}\t{}\t{}\t{}\trelations={}",
        node.id,
        node.kind,
        node.status,
        node.created_at,
        node.owner,
        node.relations.join(",")
    );
}
