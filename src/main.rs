use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sift::config::SiftConfig;
use sift::logging::init_logging;
use sift::output;
use sift::query::{expand_tree, mark_query, parse_query, regex_finder};
use sift::session::Session;
use sift::source::{CommandSource, FsSource};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Rank files against a boolean/proximity query, no index required")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search query (when no subcommand is given)
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,

    /// Directory to search
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Result page, starting at 1
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Only match inside these document fields (name, path, extension)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Count matches with the configured external program
    #[arg(long = "command")]
    use_command: bool,

    /// Configuration file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the operator tree of a query
    Parse {
        #[arg(required = true)]
        query: Vec<String>,

        /// Show the tree after term expansion
        #[arg(short, long)]
        expanded: bool,
    },
    /// Print the lines of a file that a query highlights
    Mark {
        file: PathBuf,

        #[arg(required = true)]
        query: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SiftConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SiftConfig::load().context("failed to load config")?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);

    match &cli.command {
        Some(Commands::Parse { query, expanded }) => {
            let tree = parse_query(&query.join(" "))?;
            if *expanded {
                let tree = expand_tree(&tree, config.search.expand_terms)?;
                println!("{:#?}", tree);
            } else {
                println!("{:#?}", tree);
            }
        }
        Some(Commands::Mark { file, query }) => {
            let content = fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let marks = mark_query(
                &query.join(" "),
                config.search.expand_terms,
                regex_finder(&content),
            )?;
            output::print_marked(&content, &marks, !cli.no_color)?;
        }
        None => {
            if cli.query.is_empty() {
                bail!("no query given (try `sift --help`)");
            }
            search(&cli, config)?;
        }
    }

    Ok(())
}

fn search(cli: &Cli, config: SiftConfig) -> Result<()> {
    let query = cli.query.join(" ");
    let fs_source = FsSource::new(&cli.path, &config.fs)
        .with_context(|| format!("cannot search {}", cli.path.display()))?;

    let mut session = Session::new(config.clone());
    if cli.use_command {
        let source = CommandSource::new(fs_source, &config.command)
            .context("invalid [command] configuration")?;
        session.add_source(Arc::new(source));
    } else {
        session.add_source(Arc::new(fs_source));
    }

    let fields = (!cli.fields.is_empty()).then_some(cli.fields.as_slice());
    let results = session
        .search_fields(&query, cli.page.saturating_sub(1), fields)
        .with_context(|| format!("search for `{}` failed", query))?;
    tracing::debug!(stats = ?session.stats(), "session stats");

    if cli.json {
        output::print_json(&results)?;
    } else {
        output::print_results(&results, !cli.no_color)?;
    }
    Ok(())
}
