use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use boxfile::auth::HttpAuth;
use boxfile::cli::{Cli, Commands};
use boxfile::config::{AuthCredential, Config};
use boxfile::http::AppState;
use boxfile::streaming::SegmentCache;
use boxfile_common::Nonce;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "boxfile=trace,boxfile_media=debug,boxfile_rtsp=debug,boxfile_rtmp=debug,boxfile_rtp=debug,tower_http=debug".to_string()
        } else {
            "boxfile=info,tower_http=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .init();

    match cli.command {
        Commands::Serve {
            ports,
            root,
            segment,
            cache,
            basic,
            digest,
            keys,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config, ports, root, segment, cache, basic, digest, keys))
        }
        Commands::Probe { file, json } => probe(&file, json),
        Commands::Version => {
            println!("boxfile {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    config_path: Option<PathBuf>,
    ports: Option<Vec<u16>>,
    root: Option<PathBuf>,
    segment: Option<f64>,
    cache: bool,
    basic: Option<String>,
    digest: Option<String>,
    keys: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(config_path.as_deref());

    if let Some(ports) = ports {
        if ports.len() == 3 {
            config.ports.http = ports[0];
            config.ports.https = ports[1];
            config.ports.rtsp = ports[2];
        } else {
            tracing::warn!(count = ports.len(), "-p/--ports needs exactly http,https,rtsp; ignoring");
        }
    }
    if let Some(root) = root {
        config.root = root;
    }
    if let Some(segment) = segment {
        config.segment_seconds = segment;
    }
    if cache {
        config.cache = true;
    }
    if let Some(basic) = basic {
        match AuthCredential::parse_flag(&basic) {
            Some(cred) => config.basic = Some(cred),
            None => tracing::warn!("-b/--basic value must be user:pass@realm; ignoring"),
        }
    }
    if let Some(digest) = digest {
        match AuthCredential::parse_flag(&digest) {
            Some(cred) => config.digest = Some(cred),
            None => tracing::warn!("-d/--digest value must be user:pass@realm; ignoring"),
        }
    }
    if let Some(keys) = keys {
        config.keys = Some(keys);
    }

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }
    if config.keys.is_some() {
        tracing::warn!("--keys given but this build carries no TLS crate; the https port will not be bound");
    }

    let auth = HttpAuth::new(config.basic.clone(), config.digest.clone());
    let state = Arc::new(AppState {
        config: config.clone(),
        cache: SegmentCache::new(),
        auth,
        nonce: Nonce::new(),
    });

    let http_addr = format!("0.0.0.0:{}", config.ports.http);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!(addr = %http_addr, "HTTP listener bound");
    let http_router = boxfile::http::router(state);

    let rtsp_config = Arc::new(config);

    let http_task = tokio::spawn(async move { axum::serve(http_listener, http_router).await });
    let rtsp_task = tokio::spawn(async move { boxfile::listener::serve(rtsp_config).await });

    tokio::select! {
        result = http_task => { result??; }
        result = rtsp_task => { result??; }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }
    Ok(())
}

fn probe(file: &std::path::Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mp4 = boxfile_media::Mp4File::open(file)?;
    if json {
        let tracks: Vec<_> = mp4
            .tracks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "track_id": t.track_id,
                    "timescale": t.timescale,
                    "duration": t.duration,
                    "video": t.is_video(),
                    "audio": t.is_audio(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tracks)?);
    } else {
        println!("File: {}", file.display());
        println!("Duration: {:.3}s", mp4.media_duration_sec());
        for track in &mp4.tracks {
            let kind = if track.is_video() {
                "video"
            } else if track.is_audio() {
                "audio"
            } else {
                "other"
            };
            println!(
                "  track {} [{}] timescale={} duration={}",
                track.track_id, kind, track.timescale, track.duration
            );
        }
    }
    Ok(())
}
