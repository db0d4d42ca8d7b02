use anyhow::{Context, Result};

use kernolog::app::{self, Command};
use kernolog::config::Config;
use kernolog::engine::Engine;
use kernolog::error::InitializeError;
use kernolog::event::Category;
use kernolog::query::SearchRequest;
use kernolog::store::{Mode, SearchOutcome, Store, EMPTY_STORE_MESSAGE};

fn main() {
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = app::init().and_then(execute) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run(config) => run(&config),
        Command::Search {
            config,
            request,
            json,
        } => search(&config, &request, json),
        Command::Stats(config) => stats(&config),
    }
}

fn run(config: &Config) -> Result<()> {
    let engine = Engine::start(config).context("failed to start the engine")?;
    let shutdown = engine.shutdown();
    ctrlc::set_handler(move || shutdown.trigger()).map_err(InitializeError::from)?;
    engine.join();
    Ok(())
}

fn open_reader(config: &Config, category: Category) -> Result<Store> {
    Store::open(
        &config.data_dir,
        category,
        Mode::Reader,
        config.embedder()?,
        config.search,
    )
    .with_context(|| format!("could not open the {} store", category))
}

fn search(config: &Config, request: &SearchRequest, json: bool) -> Result<()> {
    let store = open_reader(config, request.category)?;
    let outcome = store
        .search_text(&request.text, request.k, request.recency_bias)
        .context("search failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(outcome.hits())?);
        return Ok(());
    }
    let mut header = format!("--- {} results", request.category.as_str().to_uppercase());
    if request.recency_bias {
        header.push_str(" (time prioritized)");
    }
    println!("{} ---", header);
    match outcome {
        SearchOutcome::Empty => println!("{}", EMPTY_STORE_MESSAGE),
        SearchOutcome::Hits(hits) if hits.is_empty() => println!("No matches found."),
        SearchOutcome::Hits(hits) => {
            for hit in hits {
                println!("{}", hit);
            }
        }
    }
    store.close();
    Ok(())
}

fn stats(config: &Config) -> Result<()> {
    for category in Category::ALL.iter() {
        let store = open_reader(config, *category)?;
        println!(
            "{:<8} templates: {:>6}  vectors: {:>6}  occurrences: {:>8}",
            category.as_str(),
            store.template_count()?,
            store.vector_count()?,
            store.occurrence_count()?
        );
        store.close();
    }
    Ok(())
}
