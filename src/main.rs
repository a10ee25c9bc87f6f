use std::path::PathBuf;

use arena_engage::{ArticleOptions, NewsOptions};
use clap::{Parser, Subcommand};

const ENV_HELP: &str = "Environment:
  ARENA_LOG            Write logs to this file (filter with RUST_LOG)
  ARENA_API__COOKIE    Session cookie header, e.g. \"sessionid=...; csrftoken=...\"";

#[derive(Parser, Debug)]
#[command(
    name = "arena-engage",
    about = "Arena Engage - article reactions, ratings and comments from the terminal.",
    version,
    after_help = ENV_HELP
)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the engagement view of one article.
    Article {
        /// Article identifier.
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        id: u64,
        /// Category offered in the subscribe control.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..), conflicts_with = "team")]
        category: Option<u64>,
        /// Team offered in the subscribe control.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        team: Option<u64>,
        /// The viewer is already subscribed to that category or team.
        #[arg(long)]
        subscribed: bool,
        /// Skip the status fetch even when a session cookie is configured.
        #[arg(long)]
        anonymous: bool,
    },
    /// Merge "load more" pages of a listing and print the card titles.
    News {
        /// Listing URL, absolute or relative to the configured base URL.
        url: String,
        /// Number of pages to merge.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    arena_engage::logging::init();

    let result = match cli.command {
        Command::Article {
            id,
            category,
            team,
            subscribed,
            anonymous,
        } => arena_engage::run_article(ArticleOptions {
            article_id: id,
            category_id: category,
            team_id: team,
            subscribed,
            anonymous,
            config_file: cli.config,
        }),
        Command::News { url, pages } => arena_engage::run_news(NewsOptions {
            url,
            pages,
            config_file: cli.config,
        }),
    };
    if let Err(err) = result {
        tracing::error!(error = ?err, "command failed");
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
