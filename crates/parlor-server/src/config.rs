//! Configuration for the match server.
//!
//! The listening port comes from the command line (`-p <port>`,
//! required). The remaining knobs have defaults and can be overridden
//! via environment variables:
//!
//! - `PARLOR_BIND_ADDR`   (default: "0.0.0.0")
//! - `PARLOR_MAX_CLIENTS` (default: "64")

use std::env;
use std::process;
use std::str::FromStr;

use clap::Parser;

/// Default bound on simultaneously connected clients.
pub const DEFAULT_MAX_CLIENTS: usize = 64;

#[derive(Parser, Debug)]
#[clap(name = "parlor-server", disable_help_flag = true)]
struct Cli {
    /// TCP port to listen on.
    #[clap(short = 'p')]
    port: u16,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,
}

impl Config {
    /// Construct a `Config` from the command line plus environment
    /// overrides. A missing or malformed `-p <port>` (or any unknown
    /// flag) prints a usage line on standard output and exits.
    pub fn from_args_and_env() -> Config {
        let cli = Cli::try_parse().unwrap_or_else(|_| {
            println!("Usage: parlor-server -p <port>");
            process::exit(0);
        });
        let bind_addr = env::var("PARLOR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let max_clients = read_env_or_default("PARLOR_MAX_CLIENTS", DEFAULT_MAX_CLIENTS);

        Config {
            bind_addr,
            port: cli.port,
            max_clients,
        }
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
