//! signin-agent CLI
//!
//! Serves the agent to a host, either as an MCP server or as a line protocol
//! (one JSON request per stdin line, one JSON envelope per stdout line).

mod mcp;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use signin_agent::{Agent, LaunchOptions, PageDocument, Profile};

#[derive(Parser)]
#[command(name = "signin-agent")]
#[command(about = "Step-aware sign-in automation agent")]
#[command(version)]
struct Cli {
    /// Built-in profile name (zh-CN, en-US) or path to a profile YAML
    #[arg(short, long, default_value = "zh-CN", global = true)]
    profile: String,

    /// Run the browser headless
    #[arg(long, global = true)]
    headless: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// MCP server over stdio (default)
    Mcp,
    /// JSON line protocol on stdin/stdout against one page
    Lines {
        /// Sign-in page to open before reading requests
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol, so logs go to stderr.
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let profile = Profile::resolve(&cli.profile)
        .with_context(|| format!("loading profile '{}'", cli.profile))?;
    let launch = LaunchOptions {
        headless: cli.headless,
        ..Default::default()
    };

    match cli.command.unwrap_or(Command::Mcp) {
        Command::Mcp => mcp::run_server(profile, launch).await,
        Command::Lines { url } => run_lines(profile, launch, &url).await,
    }
}

async fn run_lines(profile: Profile, launch: LaunchOptions, url: &str) -> anyhow::Result<()> {
    let document = PageDocument::launch(launch).await?;
    document.goto(url).await?;
    let mut agent = Agent::new(document, profile);
    info!("ready: {}", url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = agent.call_json(&line).await;
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    agent.into_document().close().await?;
    Ok(())
}
