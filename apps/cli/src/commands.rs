//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use sitechat_chat::{AnyProvider, CompletionParams};
use sitechat_core::{ChatSession, SessionOptions};
use sitechat_harvester::{HarvestProgress, Harvester};
use sitechat_server::SiteChatServer;
use sitechat_shared::{
    AppConfig, HarvestConfig, ProviderConfig, Source, init_config, load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteChat: ask questions about a few websites.
#[derive(Parser)]
#[command(
    name = "sitechat",
    version,
    about = "Harvest the visible text of a few websites and chat about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Harvest URLs and print what was extracted.
    Harvest {
        /// URLs to harvest.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print the per-URL records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Harvest URLs, then chat about them interactively.
    Chat {
        /// Name the assistant addresses you by (defaults to `defaults.user_name`).
        #[arg(short, long)]
        name: Option<String>,

        /// URLs to ground the conversation on.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Run the HTTP API.
    Serve {
        /// Address to bind (defaults to `server.bind`).
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (defaults to `server.port`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitechat=info",
        1 => "sitechat=debug",
        _ => "sitechat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Harvest { urls, json } => cmd_harvest(&urls, json).await,
        Command::Chat { name, urls } => cmd_chat(name.as_deref(), &urls).await,
        Command::Serve { bind, port } => cmd_serve(bind.as_deref(), port).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_harvest(urls: &[String], json: bool) -> Result<()> {
    let config = load_config()?;
    let harvester = Harvester::from_config(HarvestConfig::from(&config));

    info!(urls = urls.len(), engine = harvester.engine_name(), "harvesting");

    let progress = CliProgress::new();
    let report = harvester.harvest_with_progress(urls, &progress).await;
    progress.finish();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.records())?);
        return Ok(());
    }

    println!();
    for source in &report.sources {
        print_source(source);
    }
    println!();
    println!(
        "  {} fetched, {} failed in {:.1}s",
        report.succeeded(),
        report.failed(),
        report.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

async fn cmd_chat(name: Option<&str>, urls: &[String]) -> Result<()> {
    // Validate API key before harvesting anything
    let config = load_config()?;
    let api_key = validate_api_key(&config)?;

    let user_name = name
        .map(String::from)
        .or_else(|| config.defaults.user_name.clone())
        .ok_or_else(|| eyre!("no name given: pass --name or set defaults.user_name"))?;

    let provider_config = ProviderConfig::from_app(&config, api_key);
    let provider = AnyProvider::from_config(&provider_config)?;
    let harvester = Harvester::from_config(HarvestConfig::from(&config));
    let options = session_options(&config, &provider_config);

    info!(urls = urls.len(), engine = harvester.engine_name(), "starting chat");

    let progress = CliProgress::new();
    let session =
        ChatSession::start_with_progress(&harvester, urls, &user_name, options, &progress).await;
    progress.finish();
    let mut session = session?;

    println!();
    for source in session.sources() {
        print_source(source);
    }
    println!();
    if let Some(greeting) = session.history().first() {
        println!("{}", greeting.turn.content);
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/sources" => {
                for source in session.sources() {
                    print_source(source);
                }
                continue;
            }
            _ => {}
        }

        let mut stdout = std::io::stdout();
        let outcome = session
            .reply(&provider, message, |fragment| {
                // A closed stdout ends the loop on the next prompt flush
                let _ = stdout.write_all(fragment.as_bytes());
                let _ = stdout.flush();
            })
            .await;

        match outcome {
            Ok(outcome) => {
                println!();
                if let Some(e) = outcome.error {
                    println!("[reply interrupted: {e}]");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
        println!();
    }

    info!(turns = session.history().len(), "chat ended");
    Ok(())
}

async fn cmd_serve(bind: Option<&str>, port: Option<u16>) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config)?;

    let provider_config = ProviderConfig::from_app(&config, api_key);
    let provider = AnyProvider::from_config(&provider_config)?;
    let harvester = Harvester::from_config(HarvestConfig::from(&config));
    let options = session_options(&config, &provider_config);

    let bind = bind.unwrap_or(config.server.bind.as_str());
    let port = port.unwrap_or(config.server.port);

    let server = SiteChatServer::new(bind, port, harvester, provider)
        .with_max_body_size(config.server.max_body_size)
        .with_stream_options(options.stream);

    println!("Serving on http://{}", server.addr());
    server.serve().await?;
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn session_options(config: &AppConfig, provider: &ProviderConfig) -> SessionOptions {
    let mut options = SessionOptions::from(config);
    options.stream.params = CompletionParams::from(provider);
    options
}

fn print_source(source: &Source) {
    if source.is_fetched() {
        println!(
            "  ok      {} ({} chars)",
            source.url,
            source.rendered_text.chars().count()
        );
    } else {
        println!(
            "  failed  {}: {}",
            source.url,
            source.error.as_deref().unwrap_or("unknown error")
        );
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: AtomicUsize,
    done: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl HarvestProgress for CliProgress {
    fn started(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.spinner.set_message(format!("Harvesting {total} URL(s)"));
    }

    fn source_finished(&self, source: &Source) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        self.spinner
            .set_message(format!("Harvesting [{done}/{total}] {}", source.url));
    }
}
