use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches, SubCommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::query::SearchRequest;

/// What the binary was asked to do.
#[derive(Debug)]
pub enum Command {
    /// Ingest the journal until interrupted.
    Run(Config),
    Search {
        config: Config,
        request: SearchRequest,
        json: bool,
    },
    /// Print per-category counts.
    Stats(Config),
}

fn create_app() -> App<'static, 'static> {
    App::new("kernolog")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Petabi, Inc.")
        .about("Mines system log templates and searches them semantically")
        .arg(
            Arg::with_name("data-dir")
                .short("d")
                .long("data-dir")
                .takes_value(true)
                .value_name("DIR")
                .global(true)
                .help("Directory holding the vector files and catalogs"),
        )
        .arg(
            Arg::with_name("embedder")
                .long("embedder")
                .takes_value(true)
                .possible_values(&["hash", "fastembed"])
                .global(true)
                .help("Embedding provider"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Follows the journal and indexes every event (default)")
                .arg(
                    Arg::with_name("batch-size")
                        .long("batch-size")
                        .takes_value(true)
                        .help("Events per category before a flush"),
                )
                .arg(
                    Arg::with_name("flush-interval")
                        .long("flush-interval")
                        .takes_value(true)
                        .value_name("SECONDS")
                        .help("Maximum time between flushes"),
                )
                .arg(
                    Arg::with_name("no-notify")
                        .long("no-notify")
                        .help("Disables desktop alerts"),
                ),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Searches one category")
                .arg(
                    Arg::with_name("category")
                        .required(true)
                        .possible_values(&["error", "warning", "debug"])
                        .help("Store to search"),
                )
                .arg(
                    Arg::with_name("query")
                        .multiple(true)
                        .help("Free text; 'latest' or 'now' orders by time"),
                )
                .arg(
                    Arg::with_name("k")
                        .short("k")
                        .takes_value(true)
                        .help("Number of results"),
                )
                .arg(
                    Arg::with_name("recent")
                        .long("recent")
                        .help("Orders results by time"),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Prints results as JSON"),
                ),
        )
        .subcommand(SubCommand::with_name("stats").about("Prints per-category counts"))
}

/// Parses the command line on top of `.env` and the environment.
///
/// # Errors
///
/// Returns an error if a setting or flag is invalid.
pub fn init() -> Result<Command> {
    dotenv::dotenv().ok();
    let matches = create_app().get_matches();
    command(&matches)
}

/// Parses `args` as if they were the command line.
///
/// # Errors
///
/// Returns an error if the arguments or the environment are invalid.
pub fn init_from<I, T>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = create_app().get_matches_from_safe(args)?;
    command(&matches)
}

fn command(matches: &ArgMatches) -> Result<Command> {
    let mut config = Config::from_env().context("invalid environment")?;
    let (name, sub) = matches.subcommand();
    let args = sub.unwrap_or(matches);
    if let Some(dir) = args.value_of("data-dir") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(embedder) = args.value_of("embedder") {
        config.embedder = embedder.parse()?;
    }

    match name {
        "search" => {
            let k = args
                .value_of("k")
                .map(|k| k.parse::<usize>().with_context(|| format!("invalid -k: {}", k)))
                .transpose()?;
            let query = args
                .values_of("query")
                .map(|words| words.collect::<Vec<_>>().join(" "))
                .unwrap_or_default();
            let request = SearchRequest::parse(
                args.value_of("category").unwrap_or_default(),
                &query,
                k,
                args.is_present("recent"),
            )?;
            Ok(Command::Search {
                config,
                request,
                json: args.is_present("json"),
            })
        }
        "stats" => Ok(Command::Stats(config)),
        _ => {
            if let Some(size) = args.value_of("batch-size") {
                config.scheduler.batch_size = size
                    .parse()
                    .with_context(|| format!("invalid --batch-size: {}", size))?;
            }
            if let Some(secs) = args.value_of("flush-interval") {
                config.scheduler.flush_interval = Duration::from_secs(
                    secs.parse()
                        .with_context(|| format!("invalid --flush-interval: {}", secs))?,
                );
            }
            if args.is_present("no-notify") {
                config.notify = false;
            }
            Ok(Command::Run(config))
        }
    }
}
