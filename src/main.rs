//! CLI entry point for docseek.
//!
//! Builds a vector index from a document corpus, answers queries against it,
//! and serves newline-delimited queries over stdin/stdout.

use anyhow::{Context, Result, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use docseek::config::{SearchConfig, Settings};
use docseek::corpus::JsonCorpus;
use docseek::display::{
    EmbedProgress, THEME, TableBuilder, create_info_table, create_results_table, with_spinner,
};
use docseek::embedding::{Embedder, create_embedder};
use docseek::engine::{SearchEngine, build_from_corpus, resolve_hits};
use docseek::error::EngineError;
use docseek::io::{
    ExitCode, JsonResponse, OutputFormat, QueryRequest, ResponseMeta, parse_request_line,
};
use docseek::vector::{
    DocumentId, IndexBuilder, IndexVariant, Metric, SearchResult, fingerprint_ids, load_index,
    load_index_unchecked, save_index,
};
use docseek::watcher::IndexWatcher;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic document search
#[derive(Parser)]
#[command(
    name = "docseek",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over a document corpus",
    long_about = "Embed a document corpus, index it, and find the documents nearest to a query.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ docseek init\n  $ docseek build corpus.jsonl\n  $ docseek search \"how do I reset my password\""
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .docseek directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .docseek/settings.toml")]
    Config,

    /// Embed a corpus and write the index
    #[command(
        about = "Build the vector index from a corpus",
        after_help = "Examples:\n  docseek build corpus.jsonl\n  docseek build docs.json --variant partitioned --partitions 256 --probes 16\n  docseek build --force"
    )]
    Build {
        /// Corpus file (.json array or .jsonl); defaults to corpus_path
        corpus: Option<PathBuf>,

        /// Index structure: auto, flat or partitioned
        #[arg(long)]
        variant: Option<IndexVariant>,

        /// Number of partitions (partitioned variant)
        #[arg(long)]
        partitions: Option<usize>,

        /// Partitions probed per query (partitioned variant)
        #[arg(long)]
        probes: Option<usize>,

        /// Overwrite an existing index
        #[arg(short, long)]
        force: bool,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Query the index
    #[command(
        about = "Find documents nearest to a query",
        after_help = "Examples:\n  docseek search \"reset password\"\n  docseek search \"billing\" -k 20 --json | jq '.data.hits[].title'"
    )]
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    Info {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer queries from stdin
    #[command(
        about = "Serve newline-delimited queries on stdin",
        long_about = "Read one query per line from stdin (plain text or {\"query\": \"..\", \"k\": N}) and write one JSON response per line to stdout.",
        after_help = "Examples:\n  echo 'reset password' | docseek serve\n  docseek serve --watch-interval 10\n  docseek serve --no-watch"
    )]
    Serve {
        /// Reload the index when the file changes
        #[arg(long, conflicts_with = "no_watch")]
        watch: bool,

        /// Never reload the index, even if settings enable it
        #[arg(long)]
        no_watch: bool,

        /// Seconds between index file checks
        #[arg(long)]
        watch_interval: Option<u64>,
    },
}

/// One ranked hit as printed by `search --json` and `serve`.
#[derive(Debug, Serialize)]
struct HitOutput<'a> {
    rank: usize,
    id: DocumentId,
    distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    k: usize,
    hits: Vec<HitOutput<'a>>,
}

fn search_output<'a>(
    query: &'a str,
    k: usize,
    result: &SearchResult,
    corpus: Option<&'a JsonCorpus>,
) -> SearchOutput<'a> {
    let hits = match corpus {
        Some(corpus) => resolve_hits(result.hits(), corpus)
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| HitOutput {
                rank: rank + 1,
                id: hit.id,
                distance: hit.distance,
                title: Some(hit.document.title.as_str()),
                link: hit.document.link.as_deref(),
            })
            .collect(),
        None => result
            .iter()
            .enumerate()
            .map(|(rank, hit)| HitOutput {
                rank: rank + 1,
                id: hit.id,
                distance: hit.distance.get(),
                title: None,
                link: None,
            })
            .collect(),
    };
    SearchOutput { query, k, hits }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path).map_err(|e| (Some(path.clone()), e)),
        None => Settings::load().map_err(|e| (None, e)),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err((path, e)) => {
            let location = path.map(|p| format!(" loading from {}", p.display()));
            eprintln!(
                "{}",
                THEME.error_with_icon(&format!(
                    "Configuration error{}: {e}",
                    location.unwrap_or_default()
                ))
            );
            return ExitCode::ConfigError.into();
        }
    };

    init_logging(cli.debug || settings.debug);
    init_thread_pool(settings.parallel_threads);

    match run(cli.command, settings).await {
        Ok(code) => code.into(),
        Err(err) => {
            let code = err
                .downcast_ref::<EngineError>()
                .map(ExitCode::from_error)
                .unwrap_or(ExitCode::GeneralError);
            eprintln!("{}", THEME.error_with_icon(&format!("{err:#}")));
            code.into()
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the level.
fn init_logging(debug: bool) {
    let default_level = if debug { "docseek=debug" } else { "docseek=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn init_thread_pool(threads: usize) {
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build_global()
    {
        tracing::debug!("rayon pool already configured: {e}");
    }
}

async fn run(command: Commands, settings: Settings) -> Result<ExitCode> {
    match command {
        Commands::Init { force } => cmd_init(force),
        Commands::Config => cmd_config(&settings),
        Commands::Build {
            corpus,
            variant,
            partitions,
            probes,
            force,
            quiet,
        } => {
            let options = BuildOptions {
                corpus,
                variant,
                partitions,
                probes,
                force,
                quiet,
            };
            tokio::task::spawn_blocking(move || cmd_build(&settings, options)).await?
        }
        Commands::Search { query, k, json } => {
            let query = query.join(" ");
            let format = OutputFormat::from_json_flag(json);
            tokio::task::spawn_blocking(move || cmd_search(&settings, &query, k, format)).await?
        }
        Commands::Info { json } => cmd_info(&settings, OutputFormat::from_json_flag(json)),
        Commands::Serve {
            watch,
            no_watch,
            watch_interval,
        } => {
            let watch = match (watch, no_watch) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_serve(settings, watch, watch_interval).await
        }
    }
}

fn cmd_init(force: bool) -> Result<ExitCode> {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!(
                "{}",
                THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
            );
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&e.to_string()));
            Ok(ExitCode::ConfigError)
        }
    }
}

fn cmd_config(settings: &Settings) -> Result<ExitCode> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(ExitCode::Success)
}

struct BuildOptions {
    corpus: Option<PathBuf>,
    variant: Option<IndexVariant>,
    partitions: Option<usize>,
    probes: Option<usize>,
    force: bool,
    quiet: bool,
}

fn cmd_build(settings: &Settings, options: BuildOptions) -> Result<ExitCode> {
    let corpus_path = options
        .corpus
        .or_else(|| settings.corpus_file())
        .ok_or_else(|| anyhow!("No corpus given. Pass a file or set corpus_path in settings.toml"))?;
    let index_path = settings.index_file();

    if index_path.exists() && !options.force {
        eprintln!(
            "{}",
            THEME.warning_with_icon(&format!("Index already exists at: {}", index_path.display()))
        );
        eprintln!("Use --force to overwrite");
        return Ok(ExitCode::GeneralError);
    }

    let corpus = JsonCorpus::load(&corpus_path)?;
    let visible = !options.quiet && std::io::stderr().is_terminal();
    let embedder = with_spinner("loading embedding model", visible, || {
        create_embedder(&settings.embedding)
    })?;

    let mut builder = IndexBuilder::from_config(&settings.index, embedder.dimension())?;
    if let Some(variant) = options.variant {
        builder = builder.with_variant(variant);
    }
    if options.partitions.is_some() {
        builder = builder.with_partitions(options.partitions);
    }
    if options.probes.is_some() {
        builder = builder.with_probes(options.probes);
    }

    let documents = corpus.documents();
    let started = Instant::now();
    let progress = EmbedProgress::new(documents.len(), visible);
    let index = build_from_corpus(
        embedder.as_ref(),
        &documents,
        &builder,
        settings.embedding.batch_size,
        |done, total| progress.update(done, total),
    )?;
    progress.finish_with_message("embedded");

    save_index(&index, &index_path)?;

    println!(
        "{}",
        THEME.success_with_icon(&format!(
            "Indexed {} documents in {:.2?} -> {}",
            index.len(),
            started.elapsed(),
            index_path.display()
        ))
    );
    println!("{}", create_info_table(&index.info()));

    if settings.corpus_file().as_deref() != Some(corpus_path.as_path()) {
        println!(
            "{}",
            THEME.apply(
                &THEME.dim,
                format!(
                    "Set corpus_path = \"{}\" in settings.toml to show titles in search results.",
                    corpus_path.display()
                )
            )
        );
    }
    Ok(ExitCode::Success)
}

/// Loads the embedder and the index file and pairs them.
fn open_engine(settings: &Settings) -> Result<SearchEngine> {
    let metric: Metric = settings.index.metric.parse().map_err(EngineError::from)?;
    let embedder = create_embedder(&settings.embedding)?;
    let index_path = settings.index_file();
    let index = load_index(&index_path, embedder.dimension(), metric).with_context(|| {
        format!(
            "Could not load index at {}. Run 'docseek build' first",
            index_path.display()
        )
    })?;
    Ok(SearchEngine::new(embedder, index, metric)?)
}

/// Loads the configured corpus, if any, and checks it against the index.
fn open_corpus(settings: &Settings, engine: &SearchEngine) -> Result<Option<JsonCorpus>> {
    let Some(path) = settings.corpus_file() else {
        tracing::debug!("no corpus_path configured; results show ids only");
        return Ok(None);
    };
    let corpus = JsonCorpus::load(&path)?;
    engine.verify_corpus(&corpus.ids());
    Ok(Some(corpus))
}

fn cmd_search(
    settings: &Settings,
    query: &str,
    k: Option<usize>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let started = Instant::now();
    let engine = open_engine(settings)?;
    let corpus = open_corpus(settings, &engine)?;
    let k = settings.search.effective_limit(k);

    let result = engine.search(query, k)?;
    let output = search_output(query, k, &result, corpus.as_ref());
    let code = ExitCode::from_hit_count(output.hits.len());

    if format.is_json() {
        let message = format!("Found {} documents", output.hits.len());
        let response = JsonResponse::success(output)
            .with_message(message)
            .with_meta(ResponseMeta::timed(started.elapsed()));
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(code);
    }

    if output.hits.is_empty() {
        println!("No results found for: {query}");
        return Ok(code);
    }

    match &corpus {
        Some(corpus) => println!("{}", create_results_table(&resolve_hits(result.hits(), corpus))),
        None => {
            let table = output.hits.iter().fold(
                TableBuilder::new().set_headers(vec!["#", "Distance", "Id"]),
                |table, hit| {
                    table.add_row(vec![
                        hit.rank.to_string(),
                        format!("{:.4}", hit.distance),
                        hit.id.to_string(),
                    ])
                },
            );
            println!("{}", table.build());
        }
    }
    Ok(code)
}

fn cmd_info(settings: &Settings, format: OutputFormat) -> Result<ExitCode> {
    let index_path = settings.index_file();
    let index = load_index_unchecked(&index_path)
        .with_context(|| format!("Could not load index at {}", index_path.display()))?;
    let info = index.info();

    let corpus_in_sync = match settings.corpus_file() {
        Some(path) => {
            let corpus = JsonCorpus::load(&path)?;
            Some(*index.corpus_fingerprint() == fingerprint_ids(&corpus.ids()))
        }
        None => None,
    };

    if format.is_json() {
        let mut data = serde_json::to_value(&info)?;
        if let (Some(in_sync), Some(map)) = (corpus_in_sync, data.as_object_mut()) {
            map.insert("corpus_in_sync".into(), in_sync.into());
        }
        println!("{}", serde_json::to_string_pretty(&JsonResponse::success(data))?);
        return Ok(ExitCode::Success);
    }

    println!("Index: {}", THEME.apply(&THEME.path, index_path.display()));
    println!("{}", create_info_table(&info));
    match corpus_in_sync {
        Some(true) => println!("{}", THEME.success_with_icon("Index matches the configured corpus")),
        Some(false) => println!(
            "{}",
            THEME.warning_with_icon("Index was built from a different corpus. Run 'docseek build --force'")
        ),
        None => {}
    }
    Ok(ExitCode::Success)
}

async fn cmd_serve(
    settings: Settings,
    watch: Option<bool>,
    watch_interval: Option<u64>,
) -> Result<ExitCode> {
    let engine = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || -> Result<_> {
            let engine = open_engine(&settings)?;
            let corpus = open_corpus(&settings, &engine)?;
            Ok((Arc::new(engine), Arc::new(corpus)))
        })
        .await??
    };
    let (engine, corpus) = engine;

    if settings.server.watch_enabled(watch) {
        let interval = watch_interval.unwrap_or(settings.server.watch_interval).max(1);
        let watcher = IndexWatcher::new(
            engine.clone(),
            settings.index_file(),
            Duration::from_secs(interval),
        );
        tokio::spawn(watcher.watch());
    }

    tracing::info!(
        "serving {} documents; reading queries from stdin",
        engine.info().documents
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let request = match parse_request_line(&line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                let response =
                    JsonResponse::error(ExitCode::InvalidInput, &format!("Invalid request: {e}"));
                write_line(&mut stdout, &serde_json::to_string(&response)?).await?;
                continue;
            }
        };

        let engine = engine.clone();
        let corpus = corpus.clone();
        let limits = settings.search.clone();
        let response = tokio::task::spawn_blocking(move || {
            answer(&engine, (*corpus).as_ref(), &limits, request)
        })
        .await??;
        write_line(&mut stdout, &response).await?;
    }

    Ok(ExitCode::Success)
}

/// Runs one serve request and renders its JSON line.
fn answer(
    engine: &SearchEngine,
    corpus: Option<&JsonCorpus>,
    limits: &SearchConfig,
    request: QueryRequest,
) -> Result<String> {
    let started = Instant::now();
    let k = limits.effective_limit(request.k);
    let line = match engine.search(&request.query, k) {
        Ok(result) => {
            let output = search_output(&request.query, k, &result, corpus);
            serde_json::to_string(
                &JsonResponse::success(output).with_meta(ResponseMeta::timed(started.elapsed())),
            )?
        }
        Err(e) => {
            if !e.is_request_scoped() {
                tracing::error!("query failed: {e}");
            }
            serde_json::to_string(&JsonResponse::from_error(&e))?
        }
    };
    Ok(line)
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
