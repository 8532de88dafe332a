//! Delve CLI: explore a topic one segment at a time.
//!
//! Usage:
//!   delve search <query> [--db path] [--config path]
//!   delve expand <address> <n>
//!   delve more <address>
//!   delve open <address>
//!   delve history list|delete <address>|clear

use clap::{Parser, Subcommand};
use delve::snapshot;
use delve::{
    ExploreConfig, ExploreError, Explorer, ExplorerState, HttpClient, OpenStore, QueryRecord,
    QueryStore, RecordId, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::Level;

#[derive(Parser)]
#[command(name = "delve", version, about = "Recursive topic exploration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log request handling to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new exploration
    Search {
        /// What to explore
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Expand one segment of a stored answer
    Expand {
        /// Address (/q/<id>) or id of the stored answer
        address: String,
        /// Segment number as printed (starting at 1)
        n: usize,
    },
    /// Ask for more segments on a stored answer
    More {
        /// Address (/q/<id>) or id of the stored answer
        address: String,
    },
    /// Show a stored answer
    Open {
        /// Address (/q/<id>) or id of the stored answer
        address: String,
    },
    /// Manage stored answers
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored answers, newest first
    List,
    /// Delete one stored answer
    Delete {
        /// Address (/q/<id>) or id of the stored answer
        address: String,
    },
    /// Delete every stored answer
    Clear,
}

/// Get the default database path (~/.local/share/delve/delve.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let delve_dir = data_dir.join("delve");
    std::fs::create_dir_all(&delve_dir).ok();
    delve_dir.join("delve.db")
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ExploreConfig, String> {
    match path {
        Some(path) => ExploreConfig::load(&path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e)),
        None => Ok(ExploreConfig::default()),
    }
}

fn open_store(db: Option<PathBuf>, config: &ExploreConfig) -> Result<Arc<QueryStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let backend =
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(
        QueryStore::new(Arc::new(backend)).with_max_records(config.max_records),
    ))
}

fn open_explorer(store: Arc<QueryStore>, config: ExploreConfig) -> Result<Explorer, String> {
    let client = HttpClient::from_config(&config.llm)
        .map_err(|e| format!("Failed to set up completion client: {}", e))?;
    Ok(Explorer::new(Arc::new(client), store, config))
}

fn with_explorer(
    store: Arc<QueryStore>,
    config: ExploreConfig,
    run: impl FnOnce(&Explorer) -> i32,
) -> i32 {
    match open_explorer(store, config) {
        Ok(explorer) => run(&explorer),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Accept either a full address or a bare record id
fn parse_address(address: &str) -> Option<RecordId> {
    snapshot::decode(address).or_else(|| snapshot::decode(&format!("/q/{}", address)))
}

fn print_view(state: &ExplorerState) {
    println!("{}", snapshot::path_for(state.record_id));
    println!("{}", state.query);
    println!("{}", "-".repeat(72));
    for (i, segment) in state.segments.iter().enumerate() {
        println!("{:>3}. {}", i + 1, segment.title);
        println!("     {}", segment.content);
    }
}

fn report(result: Result<Vec<delve::Segment>, ExploreError>, explorer: &Explorer) -> i32 {
    match result {
        Ok(segments) if segments.is_empty() => {
            println!("Nothing more to show.");
            0
        }
        Ok(_) => {
            print_view(&explorer.state());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn runtime() -> Result<Runtime, String> {
    Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))
}

fn cmd_search(explorer: &Explorer, query: &str) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let result = rt.block_on(explorer.search(query));
    report(result, explorer)
}

fn cmd_expand(explorer: &Explorer, address: &str, n: usize) -> i32 {
    let Some(id) = parse_address(address) else {
        eprintln!("Error: '{}' is not an address", address);
        return 1;
    };
    if !explorer.restore(Some(id)) {
        eprintln!("Error: no stored answer at {}", snapshot::encode(id));
        return 1;
    }
    let state = explorer.state();
    let Some(segment) = n.checked_sub(1).and_then(|i| state.segments.get(i)) else {
        eprintln!(
            "Error: segment {} out of range (1-{})",
            n,
            state.segments.len()
        );
        return 1;
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let result = rt.block_on(explorer.expand(segment));
    report(result, explorer)
}

fn cmd_more(explorer: &Explorer, address: &str) -> i32 {
    let Some(id) = parse_address(address) else {
        eprintln!("Error: '{}' is not an address", address);
        return 1;
    };
    if !explorer.restore(Some(id)) {
        eprintln!("Error: no stored answer at {}", snapshot::encode(id));
        return 1;
    }
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let result = rt.block_on(explorer.extend());
    report(result, explorer)
}

fn cmd_open(store: &QueryStore, address: &str) -> i32 {
    let Some(id) = parse_address(address) else {
        eprintln!("Error: '{}' is not an address", address);
        return 1;
    };
    let Some(record) = store.get_by_id(id) else {
        eprintln!("Error: no stored answer at {}", snapshot::encode(id));
        return 1;
    };
    let ancestors: Vec<String> = store
        .lineage(id)
        .into_iter()
        .skip(1)
        .rev()
        .map(|r| r.query)
        .collect();
    if !ancestors.is_empty() {
        println!("Path: {}", ancestors.join(" > "));
    }
    print_view(&ExplorerState {
        query: record.query,
        segments: record.segments,
        record_id: Some(record.id),
        ..ExplorerState::default()
    });
    0
}

fn print_record_row(record: &QueryRecord) {
    let query: String = record.query.chars().take(40).collect();
    println!(
        "{:<39}  {:<16}  {:>4}  {}",
        snapshot::encode(record.id),
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.segments.len(),
        query
    );
}

fn cmd_history_list(store: &QueryStore) -> i32 {
    let records = store.list();
    if records.is_empty() {
        println!("No stored answers.");
        return 0;
    }
    println!("{:<39}  {:<16}  {:>4}  {}", "ADDRESS", "WHEN", "SEGS", "QUERY");
    println!("{}", "-".repeat(100));
    for record in &records {
        print_record_row(record);
    }
    0
}

fn cmd_history_delete(store: &QueryStore, address: &str) -> i32 {
    let Some(id) = parse_address(address) else {
        eprintln!("Error: '{}' is not an address", address);
        return 1;
    };
    if store.delete_by_id(id) {
        println!("Deleted {}", snapshot::encode(id));
        0
    } else {
        eprintln!("Error: no stored answer at {}", snapshot::encode(id));
        1
    }
}

fn cmd_history_clear(store: &QueryStore) -> i32 {
    let count = store.len();
    store.clear_all();
    println!("Deleted {} stored answers", count);
    0
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let store = match open_store(cli.db, &config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Open { address } => cmd_open(&store, &address),
        Commands::History { action } => match action {
            HistoryAction::List => cmd_history_list(&store),
            HistoryAction::Delete { address } => cmd_history_delete(&store, &address),
            HistoryAction::Clear => cmd_history_clear(&store),
        },
        Commands::Search { query } => {
            with_explorer(store, config, |e| cmd_search(e, &query.join(" ")))
        }
        Commands::Expand { address, n } => {
            with_explorer(store, config, |e| cmd_expand(e, &address, n))
        }
        Commands::More { address } => with_explorer(store, config, |e| cmd_more(e, &address)),
    };
    std::process::exit(code);
}
