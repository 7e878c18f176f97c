use serde_json::json;

use crate::auth::MockAuthClient;
use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;

/// Print a token pair signed with the configured JWT secret, for curl against a mock-auth server
pub fn handle(username: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    if !config().auth.mock_auth_enabled {
        tracing::warn!("MOCK_AUTH_ENABLED is off; the server will not accept this token");
    }

    let tokens = MockAuthClient::from_config(config())
        .issue_for(username)
        .map_err(|_| anyhow::anyhow!("Unknown mock user '{}'", username))?;

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            &format!("Issued token for {}", username),
            Some(json!({
                "access_token": tokens.access_token,
                "refresh_token": tokens.refresh_token,
                "expires_in": tokens.expires_in,
            })),
        ),
        // Bare token so `$(nema token admin)` works in scripts
        OutputFormat::Text => {
            println!("{}", tokens.access_token);
            Ok(())
        }
    }
}
