use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "boxfile")]
#[command(author, version, about = "ISO-BMFF codec and streaming engine: fMP4/HLS/DASH, RTSP/RTP, RTMP ingest")]
pub struct Cli {
    /// Path to a config file; flags given explicitly always override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP/HLS/DASH listener plus the shared RTSP/RTMP listener.
    Serve {
        /// Listen ports as `http,https,rtsp`.
        #[arg(short, long, value_delimiter = ',')]
        ports: Option<Vec<u16>>,

        /// Directory stream names resolve against.
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Segment floor duration in seconds.
        #[arg(short, long)]
        segment: Option<f64>,

        /// Persist/consume a `<file>.cache` beside each served file.
        #[arg(short, long)]
        cache: bool,

        /// Basic auth credential as `user:pass@realm`.
        #[arg(short, long)]
        basic: Option<String>,

        /// Digest auth credential as `user:pass@realm`.
        #[arg(short, long)]
        digest: Option<String>,

        /// TLS key material directory for the `https` port.
        #[arg(short, long)]
        keys: Option<PathBuf>,
    },

    /// Print a file's track summary.
    Probe {
        file: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print version information.
    Version,
}
