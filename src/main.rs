// Entrypoint for the `pinpoint` CLI.
// - Parses arguments, sets up logging and builds the `Context`.
// - Maps errors to exit codes: clean cancellation exits 0, anything else
//   prints a single `Error: ` line and exits 1.

use clap::{builder::FalseyValueParser, Parser, Subcommand};
use pinpoint::context::{API_KEY_ENV, CI_ENV, DEFAULT_HOST, HOST_ENV};
use pinpoint::deploy::DeployOutcome;
use pinpoint::ui::{self, TerminalPrompter};
use pinpoint::{account, deploy, Context, PinpointError, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pinpoint", about = "Deploy your site to Pinpoint", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The api host
    #[arg(long, global = true, hide = true, env = HOST_ENV, default_value = DEFAULT_HOST)]
    host: String,

    /// Run the command but don't actually do anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Turn on verbose debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[arg(long, global = true, hide = true, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, hide = true, env = CI_ENV, value_parser = FalseyValueParser::new())]
    ci: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the site to Pinpoint
    Deploy,
    /// Login to Pinpoint
    Login,
    /// Logout of Pinpoint on this machine
    Logout {
        /// Only forget one account for the current host
        #[arg(long)]
        user: bool,
    },
    /// Signup for Pinpoint
    Signup,
    /// List the sites you can deploy to
    Sites,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cli.debug {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("warn")
            }
        }))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => {}
        Err(err) => match err.downcast_ref::<PinpointError>() {
            Some(e) if e.is_clean_exit() => std::process::exit(0),
            _ => {
                ui::error(&err.to_string());
                std::process::exit(1);
            }
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::new(std::env::current_dir()?);
    settings.host = cli.host;
    settings.api_key = cli.api_key.filter(|k| !k.is_empty());
    settings.ci = cli.ci;
    settings.dry_run = cli.dry_run;

    let ctx = Context::new(settings)?;
    let prompter = TerminalPrompter;

    match cli.command {
        Commands::Deploy => match deploy::run(&ctx, &prompter)? {
            DeployOutcome::Deployed { url, .. } => {
                ui::tick("Deployed ... 🚀");
                println!("{url}");
            }
            DeployOutcome::DryRun { files, bytes } => {
                println!("Dry run: {files} files ({}) would be deployed", ui::format_bytes(bytes));
            }
            DeployOutcome::Declined => {}
        },
        Commands::Login => account::login(&ctx, &prompter)?,
        Commands::Logout { user } => account::logout(&ctx, &prompter, user)?,
        Commands::Signup => account::signup(&ctx, &prompter)?,
        Commands::Sites => {
            for site in account::sites(&ctx, &prompter)? {
                println!("{:<25} {}", site.slug, site.name);
            }
        }
    }
    Ok(())
}
