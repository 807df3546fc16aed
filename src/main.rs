mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quotabar", about = "Usage-threshold watcher for AI provider accounts", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch all accounts and notify on threshold crossings (until Ctrl-C)
    Run,
    /// Fetch and display current usage once
    Status,
    /// Manage watched accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Add an account
    Add {
        /// Display name for the account
        name: String,
        /// Provider id (claude|cursor|glm); interactive picker when omitted
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Remove an account by id or name
    Remove {
        /// Account id or display name
        id: String,
    },
    /// List accounts with their cached usage
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "quotabar=debug" } else { "quotabar=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_opts = cli::output::OutputOptions {
        format: if cli.json {
            cli::output::OutputFormat::Json
        } else {
            match cli.format.as_deref() {
                Some("json") => cli::output::OutputFormat::Json,
                _ => cli::output::OutputFormat::Text,
            }
        },
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color),
        verbose: cli.verbose,
    };

    match cli.command {
        None | Some(Commands::Status) => cli::status_cmd::run(&output_opts).await?,
        Some(Commands::Run) => cli::run_cmd::run().await?,
        Some(Commands::Account { action }) => match action {
            AccountAction::Add { name, provider } => {
                cli::account_cmd::add(name, provider, &output_opts)?
            }
            AccountAction::Remove { id } => cli::account_cmd::remove(&id)?,
            AccountAction::List => cli::account_cmd::list(&output_opts)?,
        },
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
        },
    }

    Ok(())
}
