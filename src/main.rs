use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod app;
mod catalog;
mod cli;
mod config;
mod lock;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::{AppFactory, AppPaths};
use catalog::Category;
use cli::{Command, QueryArgs};
use config::Config;
use lock::FileLock;
use semantic::{SearchResponse, SemanticSearchService};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Take the data directory lock and load the persisted snapshot.
fn open_service(
    paths: &AppPaths,
    config: &Config,
) -> anyhow::Result<(FileLock, Arc<SemanticSearchService>)> {
    let lock = FileLock::try_acquire(&paths.base_path)
        .context("Failed to lock data directory, is the daemon running?")?;

    let service = AppFactory::create_search_service(paths, config);
    service.initialize()?;

    Ok((lock, service))
}

fn run_query(
    paths: &AppPaths,
    config: &Config,
    args: QueryArgs,
    recommend: bool,
) -> anyhow::Result<()> {
    let category = Category::parse_filter(args.category.as_deref())?;
    let (_lock, service) = open_service(paths, config)?;

    let results = if recommend {
        service.recommend(&args.query, args.limit, category)?
    } else {
        service.search(&args.query, args.limit, category)?
    };

    print_json(&SearchResponse::new(args.query, results))
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let paths = AppFactory::get_paths()?;
    let config = AppFactory::create_config(&paths)?;

    match args.command {
        Command::Daemon {} => {
            let (_lock, service) = open_service(&paths, &config)?;

            if config.semantic_search.preload_model {
                if let Err(e) = service.warm_up() {
                    log::warn!("Embedding model not loaded at startup: {}", e);
                }
            }

            web::start_daemon(service, &config.listen_addr)
        }

        Command::Index { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items = catalog::parse_catalog(&bytes)
                .with_context(|| format!("{} is not a valid catalog", file.display()))?;

            let (_lock, service) = open_service(&paths, &config)?;
            let result = service.build(items)?;

            if !result.persisted {
                log::warn!("Index is built but could not be saved to disk");
            }

            print_json(&result)
        }

        Command::Search { args } => run_query(&paths, &config, args, false),

        Command::Recommend { args } => run_query(&paths, &config, args, true),

        Command::Embed { text } => {
            let service = AppFactory::create_search_service(&paths, &config);
            let embedding = service.embed_probe(&text)?;

            print_json(&json!({
                "dimension": embedding.len(),
                "embedding": embedding,
            }))
        }

        Command::Status {} => {
            let (_lock, service) = open_service(&paths, &config)?;

            print_json(&json!({
                "base_path": paths.base_path,
                "models_path": paths.models_path,
                "model": config.semantic_search.model,
                "index_size": service.indexed_count(),
            }))
        }
    }
}
