use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use signin_agent::profile::BUILTIN_PROFILES;
use signin_agent::Profile;
use signin_runner::{load_profile, Config, RunResult, Runner, Vars};

#[derive(Parser)]
#[command(name = "signin-runner", version, about = "Run a sign-in flow to completion")]
struct Cli {
    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with a flow config
    Run {
        #[command(flatten)]
        flow: FlowArgs,

        /// Run the browser headless regardless of the config
        #[arg(long)]
        headless: bool,
    },
    /// Load a flow config and its profile without opening a browser
    Check {
        #[command(flatten)]
        flow: FlowArgs,
    },
    /// List the built-in profiles
    Profiles,
}

#[derive(Args)]
struct FlowArgs {
    /// Flow config file
    config: PathBuf,

    /// Value for a variable the config declares
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,
}

impl FlowArgs {
    fn load(&self) -> signin_runner::Result<Config> {
        let vars = Vars::parse_pairs(&self.vars)?;
        Config::load(&self.config, &vars)
    }

    /// Profile paths in a config are relative to the config file.
    fn base_path(&self) -> &Path {
        self.config.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, _) => Level::DEBUG,
    };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Command::Run { flow, headless } => run(&flow, headless).await,
        Command::Check { flow } => check(&flow),
        Command::Profiles => list_profiles(),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(flow: &FlowArgs, headless: bool) -> signin_runner::Result<bool> {
    let mut config = flow.load()?;
    config.browser.headless |= headless;

    println!("Signing in: {} ({})", config.name, config.credentials.username);
    let mut runner = Runner::with_base_path(&config, flow.base_path()).await?;
    let result = runner.run(&config).await;
    runner.close().await?;

    let result = result?;
    print_result(&result);
    Ok(result.success)
}

fn print_result(result: &RunResult) {
    for (i, label) in result.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, label);
    }
    match (&result.error, result.success) {
        (_, true) => println!("Signed in after {} steps", result.steps.len()),
        (Some(error), false) => println!("Not signed in: {}", error),
        (None, false) => println!("Not signed in"),
    }
    let retries = match result.retries {
        0 => String::new(),
        n => format!(", {} retries", n),
    };
    println!("Took {}ms{}", result.duration_ms, retries);
}

fn check(flow: &FlowArgs) -> signin_runner::Result<bool> {
    let config = flow.load()?;
    let profile = load_profile(&config.profile, flow.base_path())?;

    println!("{}: ok", flow.config.display());
    println!("  start page: {}", config.target.url);
    println!("  account:    {}", config.credentials.username);
    println!(
        "  password:   {}",
        if config.credentials.password.is_empty() { "missing" } else { "set" }
    );
    describe(&profile);
    Ok(true)
}

fn list_profiles() -> signin_runner::Result<bool> {
    for name in BUILTIN_PROFILES {
        describe(&Profile::builtin(name)?);
    }
    Ok(true)
}

fn describe(profile: &Profile) {
    println!(
        "profile {} ({}), on_failure: {:?}",
        profile.name,
        profile.locale.as_deref().unwrap_or("no locale"),
        profile.on_failure
    );
    let mut steps: Vec<_> = profile.steps.iter().collect();
    steps.sort_by_key(|(_, step)| step.name());
    for (label, step) in steps {
        println!("  {:<50} -> {}", label, step);
    }
}
