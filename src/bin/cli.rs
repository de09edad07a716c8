//! litwatch CLI
//!
//! Direct searches, saved-search management and the alert scheduler.
//! Every command prints pretty JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use litwatch::{
    backends,
    error::{AppError, Result},
    models::{
        Backend, Config, Connective, Field, Frequency, NewSavedSearch, Query, QueryRequest,
        SaveSearchRequest, SearchTerm,
    },
    pipeline::{AlertScheduler, Aggregator, LogNotifier},
    storage::{LocalStore, ResultFilter, SavedSearchStore},
    translate,
};
use serde::Serialize;

/// litwatch - literature search across bibliographic backends, with alerts
#[derive(Parser, Debug)]
#[command(name = "litwatch", version, about = "Multi-backend literature search and alerts")]
struct Cli {
    /// Path to storage directory containing config.toml and store.json
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Search term as `[and:|or:|not:][field=]text`, repeatable and ordered
    #[arg(short, long = "term")]
    terms: Vec<String>,

    /// Backend to query (pubmed, arxiv, gim, scholar); repeatable, defaults to
    /// every backend that needs no API key
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// First publication year
    #[arg(long)]
    from_year: Option<i32>,

    /// Last publication year
    #[arg(long)]
    to_year: Option<i32>,

    /// Result cap per backend (clamped to 1..=1000)
    #[arg(short, long)]
    max_results: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query against its backends now
    Search(QueryArgs),

    /// Show the native query string for each backend
    Translate(QueryArgs),

    /// Save a query for periodic re-execution
    Save {
        /// Unique name (per contact)
        #[arg(short, long)]
        name: String,

        #[command(flatten)]
        query: QueryArgs,

        /// daily, weekly or monthly
        #[arg(short, long, default_value = "monthly")]
        frequency: Frequency,

        /// Where alerts for this search go
        #[arg(short, long)]
        contact: Option<String>,
    },

    /// List saved searches
    List,

    /// Show one saved search with its native queries
    Show { id: u64 },

    /// Activate or deactivate a saved search
    Toggle { id: u64 },

    /// Delete a saved search and its recorded results
    Delete { id: u64 },

    /// Run a saved search now
    Run { id: u64 },

    /// Dry-run a saved search against synthetic results
    Test { id: u64 },

    /// Run all due saved searches once
    Sweep {
        #[arg(short, long)]
        frequency: Option<Frequency>,
    },

    /// Sweep every poll interval until Ctrl-C
    Watch {
        #[arg(short, long)]
        frequency: Option<Frequency>,
    },

    /// List recorded results, newest first
    Results {
        /// Only results of this saved search
        #[arg(long = "search")]
        search_id: Option<u64>,

        #[arg(short, long)]
        backend: Option<Backend>,

        #[arg(short, long)]
        unread: bool,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Mark a recorded result as read
    MarkRead { id: u64 },

    /// Validate configuration file
    Validate,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `[and:|or:|not:][field=]text`.
fn parse_term(raw: &str) -> Result<SearchTerm> {
    let mut rest = raw.trim();

    let mut connective = None;
    if let Some((head, tail)) = rest.split_once(':') {
        if let Ok(parsed) = head.parse::<Connective>() {
            connective = Some(parsed);
            rest = tail;
        }
    }

    let mut field = Field::Any;
    if let Some((head, tail)) = rest.split_once('=') {
        let parsed = Field::parse(head);
        if parsed != Field::Any || head.trim().eq_ignore_ascii_case("any") {
            field = parsed;
            rest = tail;
        }
    }

    let text = rest.trim();
    if text.is_empty() {
        return Err(AppError::validation(format!("Empty search term '{raw}'")));
    }
    Ok(SearchTerm::new(text, field, connective))
}

impl QueryArgs {
    fn into_request(self) -> Result<QueryRequest> {
        let terms = self
            .terms
            .iter()
            .map(|t| parse_term(t))
            .collect::<Result<Vec<_>>>()?;
        let backends = if self.backends.is_empty() {
            Backend::ALL
                .iter()
                .filter(|b| !b.requires_api_key())
                .map(|b| b.id().to_string())
                .collect()
        } else {
            self.backends
        };

        Ok(QueryRequest {
            terms,
            backends,
            start_year: self.from_year,
            end_year: self.to_year,
            max_results: self.max_results,
        })
    }

    fn into_query(self) -> Result<Query> {
        Query::from_request(self.into_request()?)
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let loaded = Config::load(&config_path);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Ok(config) => {
            log::debug!("Loaded configuration from {}", config_path.display());
            config
        }
        Err(e) => {
            if matches!(cli.command, Command::Validate) && config_path.exists() {
                log::error!("Config load failed: {}", e);
                return Err(e);
            }
            Config::load_or_default(&config_path)
        }
    };

    let store = Arc::new(LocalStore::new(&cli.storage_dir));

    match cli.command {
        Command::Search(args) => {
            let query = args.into_query()?;
            let aggregator = build_aggregator(&config)?;
            let response = aggregator.aggregate(&query).await;
            log::info!("{} record(s) in total", response.total_records());
            print_json(&response)?;
        }

        Command::Translate(args) => {
            let query = args.into_query()?;
            print_json(&translate::translate_all(&query))?;
        }

        Command::Save {
            name,
            query,
            frequency,
            contact,
        } => {
            let request = SaveSearchRequest {
                name,
                query: query.into_request()?,
                frequency,
                owner_contact: contact,
            };
            let saved = store
                .create(NewSavedSearch::from_request(request)?, chrono::Utc::now())
                .await?;
            log::info!("Saved search {} '{}'", saved.id, saved.name);
            print_json(&saved)?;
        }

        Command::List => print_json(&store.list().await?)?,

        Command::Show { id } => {
            let search = store.get(id).await?;
            let native = search.native_queries();
            print_json(&serde_json::json!({
                "search": search,
                "native_queries": native,
            }))?;
        }

        Command::Toggle { id } => {
            let search = store.toggle(id).await?;
            log::info!(
                "Saved search {} is now {}",
                id,
                if search.active { "active" } else { "inactive" }
            );
            print_json(&search)?;
        }

        Command::Delete { id } => {
            store.delete(id).await?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }

        Command::Run { id } => {
            let scheduler = build_scheduler(&config, store)?;
            print_json(&scheduler.run_saved_search(id).await?)?;
        }

        Command::Test { id } => {
            let scheduler = build_scheduler(&config, store)?;
            print_json(&scheduler.test_alert(id).await?)?;
        }

        Command::Sweep { frequency } => {
            let scheduler = build_scheduler(&config, store)?;
            print_json(&scheduler.sweep(frequency).await?)?;
        }

        Command::Watch { frequency } => {
            let scheduler = build_scheduler(&config, store)?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
            };
            scheduler
                .watch(frequency, shutdown, |report| {
                    if let Err(e) = print_json(report) {
                        log::error!("Failed to print sweep report: {}", e);
                    }
                })
                .await?;
        }

        Command::Results {
            search_id,
            backend,
            unread,
            limit,
        } => {
            let filter = ResultFilter {
                saved_search_id: search_id,
                backend,
                unread_only: unread,
                limit,
            };
            print_json(&store.list_results(&filter).await?)?;
        }

        Command::MarkRead { id } => print_json(&store.mark_read(id).await?)?,

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            backends::build_clients(&config)?;
            log::info!("All validations passed!");
            print_json(&serde_json::json!({ "valid": true }))?;
        }
    }

    Ok(())
}

fn build_aggregator(config: &Config) -> Result<Aggregator> {
    let clients = backends::build_clients(config)?;
    Ok(Aggregator::new(
        clients,
        Duration::from_secs(config.aggregator.backend_timeout_secs),
    ))
}

fn build_scheduler(config: &Config, store: Arc<LocalStore>) -> Result<AlertScheduler> {
    Ok(AlertScheduler::new(
        store,
        build_aggregator(config)?,
        Arc::new(LogNotifier),
        &config.scheduler,
    ))
}
