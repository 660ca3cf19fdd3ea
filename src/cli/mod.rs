pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "injector")]
#[command(about = "Resolve service identifiers and forward requests to them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the resolver and invoke API
    Serve(ServeArgs),
    /// Register a service with a running injector
    Register(RegisterArgs),
    /// Resolve a service identifier against a running injector
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to config file (defaults to ./injector.toml, then the user config dir)
    #[arg(long, env = "INJECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:5000
    #[arg(long, env = "INJECTOR_LISTEN")]
    pub listen: Option<String>,

    /// Port to listen on (keeps the configured host)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of a remote injector to use as the registry
    #[arg(long, env = "REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Identifier invoked by POST / (repeatable; one is picked per request)
    #[arg(long = "target")]
    pub targets: Vec<String>,
}

impl ServeArgs {
    /// Layer command-line and environment overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(port) = self.port {
            config.listen = with_port(&config.listen, port);
        }
        if let Some(url) = &self.registry_url {
            config.registry_url = url.trim_end_matches('/').to_string();
        }
        if !self.targets.is_empty() {
            config.targets = self.targets.clone();
        }
    }
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// Service identifier
    pub id: String,

    /// Human-readable service name
    pub name: String,

    /// Address the service is reachable at
    pub address: String,

    /// Injector URL
    #[arg(long, env = "INJECTOR_URL", default_value = DEFAULT_SERVER_URL)]
    pub url: String,
}

#[derive(clap::Args)]
pub struct ResolveArgs {
    /// Service identifier
    pub id: String,

    /// Injector URL
    #[arg(long, env = "INJECTOR_URL", default_value = DEFAULT_SERVER_URL)]
    pub url: String,
}

/// Replace the port of a `host:port` listen address.
fn with_port(listen: &str, port: u16) -> String {
    let host = listen
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(listen);
    format!("{}:{}", host, port)
}
