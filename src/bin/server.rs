#![forbid(unsafe_code)]

//! Entry point for the ytproxy HTTP server.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ytproxy::{
    assets::AssetStore,
    config::{Overrides, resolve_settings},
    extractor::YtDlpExtractor,
    router::{AppState, router},
};

/// Serves video metadata as JSON by delegating to yt-dlp.
#[derive(Debug, Parser)]
#[command(name = "ytproxy", version, about)]
struct ServerArgs {
    /// Address to bind (YTPROXY_HOST)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (YTPROXY_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Directory holding index.html and style.css (WWW_ROOT)
    #[arg(long)]
    www_root: Option<PathBuf>,
    /// yt-dlp executable (YTDLP_BIN)
    #[arg(long)]
    ytdlp_bin: Option<PathBuf>,
    /// Netscape cookies file handed to yt-dlp (YTDLP_COOKIES)
    #[arg(long)]
    cookies: Option<PathBuf>,
    /// dotenv file read before the process environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl From<ServerArgs> for Overrides {
    fn from(args: ServerArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            www_root: args.www_root,
            ytdlp_bin: args.ytdlp_bin,
            cookies: args.cookies,
            env_path: args.env_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = resolve_settings(ServerArgs::parse().into()).context("resolving settings")?;

    let extractor = YtDlpExtractor::new(settings.ytdlp_bin.clone())
        .with_cookies(settings.cookies.clone());
    info!(
        ytdlp = %extractor.binary().display(),
        www_root = %settings.www_root.display(),
        "extractor configured"
    );

    let state = AppState::new(Arc::new(extractor), AssetStore::new(&settings.www_root));
    let app = router(state);

    let addr = settings.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running proxy server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still stops the process.
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_overrides() {
        let args = ServerArgs::try_parse_from([
            "ytproxy",
            "--port",
            "9000",
            "--host",
            "127.0.0.1",
            "--www-root",
            "/srv/www",
            "--ytdlp-bin",
            "/opt/yt-dlp",
        ])
        .unwrap();
        let overrides = Overrides::from(args);
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(overrides.www_root, Some(PathBuf::from("/srv/www")));
        assert_eq!(overrides.ytdlp_bin, Some(PathBuf::from("/opt/yt-dlp")));
        assert!(overrides.cookies.is_none());
        assert!(overrides.env_path.is_none());
    }

    #[test]
    fn args_default_to_none() {
        let overrides = Overrides::from(ServerArgs::try_parse_from(["ytproxy"]).unwrap());
        assert!(overrides.port.is_none());
        assert!(overrides.host.is_none());
    }

    #[test]
    fn args_reject_bad_port() {
        assert!(ServerArgs::try_parse_from(["ytproxy", "--port", "99999"]).is_err());
    }
}
