//! FlashFT - A Minimal Single-File Transfer Server
//!
//! This is the command line entry point. `flashft serve` receives files,
//! `flashft send` uploads one.

use anyhow::Context;
use flashft::connection::DEFAULT_BUFFER_CAPACITY;
use flashft::server::{BlockingServer, Server, ServerConfig};
use flashft::storage::DirStorage;
use flashft::TransferStats;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// What the process was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Send,
}

/// Command line configuration
struct Config {
    command: Command,
    /// Host to bind to (serve) or connect to (send)
    host: String,
    /// Port to listen on or connect to
    port: u16,
    /// Directory received files are written into
    dir: PathBuf,
    /// Per-connection receive buffer size
    buffer_size: usize,
    /// Use the thread-per-connection server
    blocking: bool,
    /// File to upload
    file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: Command::Serve,
            host: flashft::DEFAULT_HOST.to_string(),
            port: flashft::DEFAULT_PORT,
            dir: PathBuf::from("."),
            buffer_size: DEFAULT_BUFFER_CAPACITY,
            blocking: false,
            file: None,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        match args.get(i).map(String::as_str) {
            Some("serve") => {
                config.command = Command::Serve;
                i += 1;
            }
            Some("send") => {
                config.command = Command::Send;
                i += 1;
            }
            Some("--help") | None => {
                print_help();
                std::process::exit(0);
            }
            Some("--version") | Some("-v") => {
                println!("FlashFT version {}", flashft::VERSION);
                std::process::exit(0);
            }
            Some(other) => {
                eprintln!("Unknown command: {}", other);
                print_help();
                std::process::exit(1);
            }
        }

        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = option_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = option_value(&args, i, "--port")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--dir" | "-d" if config.command == Command::Serve => {
                    config.dir = PathBuf::from(option_value(&args, i, "--dir"));
                    i += 2;
                }
                "--buffer-size" if config.command == Command::Serve => {
                    config.buffer_size = option_value(&args, i, "--buffer-size")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid buffer size");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--blocking" if config.command == Command::Serve => {
                    config.blocking = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg if config.command == Command::Send
                    && config.file.is_none()
                    && !arg.starts_with('-') =>
                {
                    config.file = Some(PathBuf::from(arg));
                    i += 1;
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        if config.command == Command::Send && config.file.is_none() {
            eprintln!("Error: send requires a file to upload");
            std::process::exit(1);
        }

        config
    }

    /// Returns the bind or connect address as a string
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Returns the value following the option at `i`, or exits.
fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", name);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
FlashFT - A Minimal Single-File Transfer Server

USAGE:
    flashft serve [OPTIONS]
    flashft send [OPTIONS] <FILE>

SERVE OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 7878)
    -d, --dir <DIR>            Directory to write received files into (default: .)
        --buffer-size <BYTES>  Per-connection buffer size (default: 65536, min: 256)
        --blocking             Use one thread per connection instead of the reactor

SEND OPTIONS:
    -h, --host <HOST>          Server host (default: 127.0.0.1)
    -p, --port <PORT>          Server port (default: 7878)

GLOBAL:
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    flashft serve --dir ./incoming         # Receive into ./incoming on 127.0.0.1:7878
    flashft serve --host 0.0.0.0 --blocking
    flashft send --host 10.0.0.5 photo.jpg # Upload photo.jpg

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=flashft=trace) to change verbosity.
"#
    );
}

fn print_banner(config: &Config, addr: SocketAddr) {
    let mode = if config.blocking {
        "thread-per-connection"
    } else {
        "single-threaded reactor"
    };
    println!(
        r#"
FlashFT v{} - Minimal Single-File Transfer Server
──────────────────────────────────────────────────
Mode:       {}
Listening:  {}
Saving to:  {}

Use Ctrl+C to shutdown gracefully.
"#,
        flashft::VERSION,
        mode,
        addr,
        config.dir.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match config.command {
        Command::Serve => serve(&config).await,
        Command::Send => send(&config).await,
    }
}

/// Resolves the configured host and port to one socket address
fn resolve(config: &Config) -> anyhow::Result<SocketAddr> {
    config
        .address()
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {}", config.address()))?
        .next()
        .with_context(|| format!("no address found for {}", config.address()))
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let addr = resolve(config)?;
    let server_config = ServerConfig::new(addr).with_buffer_capacity(config.buffer_size);
    let storage = DirStorage::new(&config.dir);
    let stats = std::sync::Arc::new(TransferStats::new());

    if config.blocking {
        let server = BlockingServer::bind(server_config, storage)
            .context("failed to start blocking server")?
            .with_stats(std::sync::Arc::clone(&stats));
        print_banner(config, server.local_addr()?);

        // The accept loop never returns; it is dropped with the process.
        thread::Builder::new()
            .name("flashft-accept".to_string())
            .spawn(move || server.run())
            .context("failed to spawn accept thread")?;

        signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")?;
        info!("Shutdown signal received, stopping server...");
    } else {
        let mut server = Server::bind(server_config, storage)
            .context("failed to start server")?
            .with_stats(std::sync::Arc::clone(&stats));
        print_banner(config, server.local_addr()?);

        let handle = server.shutdown_handle();
        let mut reactor = tokio::task::spawn_blocking(move || server.run());

        tokio::select! {
            result = &mut reactor => {
                result?.context("reactor failed")?;
            }
            interrupted = signal::ctrl_c() => {
                interrupted.context("failed to install Ctrl+C handler")?;
                info!("Shutdown signal received, stopping server...");
                handle.shutdown().context("failed to wake reactor")?;
                reactor.await?.context("reactor failed")?;
            }
        }
    }

    log_summary(&stats);
    info!("Server shutdown complete");
    Ok(())
}

async fn send(config: &Config) -> anyhow::Result<()> {
    let Some(file) = config.file.as_ref() else {
        anyhow::bail!("no file to send");
    };

    let summary = flashft::send_file(config.address(), file)
        .await
        .with_context(|| format!("failed to send {}", file.display()))?;

    info!(
        file = %summary.header,
        payload = summary.payload_bytes,
        total = summary.total_bytes(),
        "Transfer finished"
    );
    Ok(())
}

fn log_summary(stats: &TransferStats) {
    let failed = stats.transfers_failed.load(Ordering::Relaxed);
    info!(
        accepted = stats.connections_accepted.load(Ordering::Relaxed),
        completed = stats.transfers_completed.load(Ordering::Relaxed),
        failed,
        bytes = stats.bytes_written.load(Ordering::Relaxed),
        "Transfer summary"
    );
    if failed > 0 {
        warn!(failed, "Some transfers did not complete");
    }
}
