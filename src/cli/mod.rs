pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "nema")]
#[command(about = "Nema CLI - run and administer the requirements management API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP API server")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides API_PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Mint a mock-auth token pair for a development user")]
    Token {
        #[arg(help = "Mock username (admin, editor, viewer, test)")]
        username: String,
    },

    #[command(about = "Load demo data: organization, workspace, product and a requirement tree")]
    Seed(commands::seed::SeedArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port } => commands::serve::handle(port).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Token { username } => commands::token::handle(&username, output_format),
        Commands::Seed(args) => commands::seed::handle(args, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_output_flags() {
        let cli = Cli::try_parse_from(["nema", "--json", "token", "admin"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Token { ref username } if username == "admin"));

        let cli = Cli::try_parse_from(["nema", "migrate"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Text));
    }

    #[test]
    fn seed_defaults() {
        let cli = Cli::try_parse_from(["nema", "seed"]).unwrap();
        let Commands::Seed(args) = cli.command else {
            panic!("expected seed");
        };
        assert_eq!(args.user, "admin");
        assert_eq!(args.workspace, "Demo Workspace");
        assert_eq!(args.product, "Demo Product");
    }

    #[test]
    fn serve_port_override() {
        let cli = Cli::try_parse_from(["nema", "serve", "--port", "9100"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9100) }));
    }
}
