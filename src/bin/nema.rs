use clap::Parser;
use nema_core::cli::{utils::output_error, Cli, Commands, OutputFormat};
use nema_core::config::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let output_format = OutputFormat::from_cli(&cli);
    // Commands other than serve stay quiet unless RUST_LOG says otherwise
    let level = match cli.command {
        Commands::Serve { .. } => config().log_level.as_str(),
        _ => "warn",
    };
    nema_core::server::init_tracing(level);

    if let Err(e) = nema_core::cli::run(cli).await {
        let message = match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => format!("{e:?}"),
            _ => e.to_string(),
        };
        output_error(&output_format, &message, None)?;
        std::process::exit(1);
    }

    Ok(())
}
