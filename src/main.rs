//! stream-manager binary
//!
//! ```text
//! stream-manager --config /etc/stream-manager.toml
//! SERVER_IP=192.168.1.20 stream-manager --media-dir /streams --recordings-dir /recordings
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use stream_manager::server::{ServerConfig, StreamServer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream lifecycle manager for MediaMTX")]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Upload directory and default media root
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Directory MediaMTX writes recordings to
    #[arg(long)]
    recordings_dir: Option<PathBuf>,

    /// Host transcoders publish to and the MediaMTX API is reached on
    #[arg(long, env = "MEDIAMTX_HOST")]
    mediamtx_host: Option<String>,

    /// Host viewers use in playback URLs
    #[arg(long, env = "SERVER_IP")]
    public_host: Option<String>,

    /// Persisted stream state (default: <media-dir>/streams_config.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Serve the dashboard's static files from this directory
    #[arg(long)]
    web_root: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> stream_manager::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(addr) = self.bind {
            config = config.bind(addr);
        }
        if let Some(dir) = self.media_dir {
            config = config.media_dir(dir);
        }
        if let Some(dir) = self.recordings_dir {
            config = config.recordings_dir(dir);
        }
        if let Some(host) = self.mediamtx_host {
            config = config.mediamtx_host(host);
        }
        if let Some(host) = self.public_host {
            config = config.public_host(host);
        }
        if let Some(path) = self.state_file {
            config = config.state_file(path);
        }
        if let Some(dir) = self.web_root {
            config = config.web_root(dir);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_manager=info,tower_http=info".into()),
        )
        .init();

    let config = Args::parse().into_config()?;
    tracing::info!(
        bind = %config.bind_addr,
        media_dir = %config.media.upload_dir.display(),
        recordings_dir = %config.recordings_dir.display(),
        mediamtx = %config.mediamtx.api_url(),
        public_host = %config.registry.playback.public_host,
        "Starting stream manager"
    );

    let server = StreamServer::new(config)?;
    server.restore().await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Stream manager stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "stream-manager",
            "--bind",
            "127.0.0.1:8080",
            "--media-dir",
            "/data/streams",
            "--public-host",
            "10.1.1.1",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.media.upload_dir, PathBuf::from("/data/streams"));
        assert_eq!(config.state_path(), PathBuf::from("/data/streams/streams_config.json"));
        assert_eq!(config.registry.playback.public_host, "10.1.1.1");
        assert_eq!(config.recordings_dir, PathBuf::from("/recordings"));
    }
}
