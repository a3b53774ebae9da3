use anyhow::Context;
use clap::{Parser, Subcommand};
use specter_debugger::config::{self, Config};
use specter_debugger::debugger::SessionRegistry;
use specter_debugger::rpc::{ClientOptions, DebuggerClient, DebuggerServer, DebuggerService};
use specter_debugger::ui::console::server::ServerApplication;
use specter_debugger::ui::console::ClientApplication;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ~/.config/specter/config.toml)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a debugger server controlled by an interactive shell
    Server {
        #[clap(long)]
        host: Option<String>,
        #[clap(long)]
        port: Option<u16>,
        /// Size of connection handling pool
        #[clap(long)]
        workers: Option<usize>,
        /// Start serving immediately
        #[clap(long)]
        autostart: bool,
    },
    /// Connect to a debugger server with an interactive shell
    Client {
        #[clap(long)]
        host: Option<String>,
        #[clap(long)]
        port: Option<u16>,
    },
}

fn load_config(path: Option<&std::path::Path>) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warning: {e:#}, default configuration is used");
            Config::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref());
    match &args.mode {
        Mode::Server {
            host,
            port,
            workers,
            ..
        } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(workers) = workers {
                config.server.workers = *workers;
            }
        }
        Mode::Client { host, port } => {
            if let Some(host) = host {
                config.client.host = host.clone();
            }
            if let Some(port) = port {
                config.client.port = *port;
            }
        }
    }

    config::set(config)?;
    let config = config::current();
    specter_debugger::log::init(&config.log)?;

    match args.mode {
        Mode::Server { autostart, .. } => {
            let registry = SessionRegistry::new(config.session.stack_size);
            let service = Arc::new(DebuggerService::new(
                registry,
                config.server.event_poll_interval(),
            ));
            let server =
                DebuggerServer::new(service, config.server.address(), config.server.workers);
            ServerApplication::new(server, autostart)?.run()
        }
        Mode::Client { .. } => {
            let options = ClientOptions {
                connect_timeout: config.client.connect_timeout(),
                request_timeout: config.client.request_timeout(),
                listener_join_timeout: config.client.listener_join_timeout(),
            };
            let address = config.client.address();
            let client = DebuggerClient::connect(address.as_str(), options)
                .with_context(|| format!("connect to {address}"))?;
            ClientApplication::new(client)?.run()
        }
    }
}
