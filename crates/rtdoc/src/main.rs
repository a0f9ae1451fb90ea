use clap::{ArgAction, Parser};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rtdoc::server::{OomPolicy, Server, ServerConfig, DEFAULT_PORT};
use rtdoc::{client, DocumentStore, RtdocResult};

const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

#[derive(Parser, Debug)]
#[command(name = "rtdoc")]
#[command(version)]
#[command(about = "Networked JSON document store with collaborative editing sessions", long_about = None)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Run as an interactive client instead of a server
    #[arg(short, long)]
    client: bool,

    /// Port to listen on, or to connect to in client mode
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host to bind (server) or connect to (client)
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Append logs to this file instead of the terminal
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<PathBuf>,

    /// Number of worker threads serving clients
    #[arg(short = 'n', long = "max-clients", default_value_t = 8)]
    max_clients: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Close connections idle for this many seconds
    #[arg(short = 't', long = "idle-timeout")]
    idle_timeout: Option<u64>,

    /// Byte ceiling for stored documents
    #[arg(short = 'm', long = "memory-limit")]
    memory_limit: Option<usize>,

    /// Refuse writes over the memory limit instead of aborting
    #[arg(long)]
    reject_on_oom: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host.clone().unwrap_or(defaults.host),
            port: self.port,
            max_clients: self.max_clients,
            log_file: self.log_file.clone(),
            debug: self.debug,
            idle_timeout: self.idle_timeout.map(Duration::from_secs),
            memory_limit: self.memory_limit,
            oom_policy: if self.reject_on_oom {
                OomPolicy::Reject
            } else {
                OomPolicy::Abort
            },
            ..defaults
        }
    }
}

fn init_logging(cli: &Cli) -> RtdocResult<()> {
    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        // Client responses go to stdout, so its logs stay out of the way
        None if cli.client => builder.with_writer(io::stderr).init(),
        None => builder.init(),
    }
    Ok(())
}

fn run_client(cli: &Cli) -> RtdocResult<()> {
    let host = cli.host.as_deref().unwrap_or(DEFAULT_CLIENT_HOST);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(client::run(host, cli.port))
}

fn run_server(cli: &Cli) -> RtdocResult<()> {
    let config = cli.server_config();
    let store = Arc::new(DocumentStore::with_budget(config.memory_budget()));

    info!("Starting RTDoc server...");
    let server = Server::bind(config, store)?;

    #[cfg(unix)]
    rtdoc::server::signal::install_shutdown_listener(server.shutdown_handle()?)?;

    server.run()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("rtdoc: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = if cli.client {
        run_client(&cli)
    } else {
        run_server(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
