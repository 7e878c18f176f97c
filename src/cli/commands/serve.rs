use crate::config::{config, AppConfig};
use crate::server;

pub async fn handle(port: Option<u16>) -> anyhow::Result<()> {
    let mut config: AppConfig = config().clone();
    if let Some(port) = port {
        config.api.port = port;
    }
    server::serve(&config).await
}
