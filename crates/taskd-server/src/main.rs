use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use taskd_server::{start_server, ServerConfig};

#[derive(Parser)]
#[command(name = "taskd", about = "taskd — todo CRUD service", version)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.taskd/config.toml")]
    config: String,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the REST port
    #[arg(long, short)]
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    storage: Option<StorageSection>,
    server: Option<ServerSection>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    bind_host: Option<String>,
    port: Option<u16>,
    cors_allowed_origins: Option<Vec<String>>,
}

fn load_server_config(config_path: &str) -> Result<ServerConfig> {
    let path = shellexpand(config_path);
    let mut config = ServerConfig::default();

    if std::path::Path::new(&path).exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let file_config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config {path}"))?;

        if let Some(storage) = file_config.storage {
            if let Some(data_dir) = storage.data_dir {
                config.engine_config.data_dir = shellexpand(&data_dir);
            }
        }

        if let Some(server) = file_config.server {
            if let Some(bind_host) = server.bind_host {
                config.bind_host = bind_host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(origins) = server.cors_allowed_origins {
                config.cors_allowed_origins = origins;
            }
        }
    }

    Ok(config)
}

fn shellexpand(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    s.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_server_config(&cli.config)?;
    if let Some(host) = cli.host {
        config.bind_host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    start_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
}
