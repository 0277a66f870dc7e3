//! HTTP server command: `afpi-crm serve`.

use anyhow::Result;
use std::path::PathBuf;

use afpi_crm::config::CrmConfig;
use afpi_crm::crm::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: &CrmConfig,
    port: Option<u16>,
    host: Option<String>,
    db_path: Option<PathBuf>,
    seed: bool,
) -> Result<()> {
    let mut server = ServerConfig::from_config(config);
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(db_path) = db_path {
        server.db_path = db_path;
    }
    server.seed |= seed;

    start_server(config, server).await
}
