use clap::Parser;
use console::style;
use sshbook::{AppContext, Cli, CommandHandler, Settings};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SSHBOOK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.global.settings.as_deref(), cli.global.overrides())?;
    let ctx = AppContext::open(settings)?;

    let mut handler = CommandHandler::new(ctx, cli.global.verbose);
    handler.handle_command(cli.command).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", style("✗").red().bold(), style(format!("{:#}", e)).red());
        std::process::exit(1);
    }
}
