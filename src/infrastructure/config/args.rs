use super::app_config::LogLevel;
use crate::domain::entities::EnvironmentMode;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "imgrelay",
    version,
    about = "Resilient remote image loading and a same-origin image relay",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Runtime environment.
    #[arg(long, value_enum, env = "IMGRELAY_ENVIRONMENT", global = true)]
    pub environment: Option<EnvironmentMode>,

    /// Origin of the page embedding the images.
    #[arg(long, value_name = "URL", env = "IMGRELAY_PAGE_ORIGIN", global = true)]
    pub page_origin: Option<String>,

    /// Allow-listed upstream host; repeat for several.
    #[arg(
        long = "allowed-host",
        value_name = "HOST",
        env = "IMGRELAY_ALLOWED_HOSTS",
        value_delimiter = ',',
        global = true
    )]
    pub allowed_hosts: Vec<String>,

    /// Per-attempt timeout in seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Retry rounds per load (at most 5).
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Concurrent loads per batch group.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the image relay.
    Serve {
        /// Listen address, overriding the configured one.
        #[arg(long, value_name = "ADDR", env = "IMGRELAY_BIND")]
        bind: Option<SocketAddr>,
    },
    /// Load references through the full pipeline and report the results.
    Fetch {
        /// References to load.
        #[arg(required = true)]
        references: Vec<String>,

        /// Directory to write payloads into.
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Bypass every cache.
        #[arg(long)]
        reload: bool,
    },
    /// Keep references fresh on the refresh interval until interrupted.
    Watch {
        /// References to keep fresh.
        #[arg(required = true)]
        references: Vec<String>,

        /// Directory to write refreshed payloads into.
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_command() {
        let args = CliArgs::parse_from([
            "imgrelay",
            "fetch",
            "https://storage.example/a.png",
            "https://storage.example/b.png",
            "--out",
            "/tmp/images",
            "--log-level",
            "debug",
        ]);

        assert_eq!(args.log_level, Some(LogLevel::Debug));
        let Command::Fetch {
            references,
            out,
            reload,
        } = args.command
        else {
            panic!("expected fetch command");
        };
        assert_eq!(references.len(), 2);
        assert_eq!(out, Some(PathBuf::from("/tmp/images")));
        assert!(!reload);
    }

    #[test]
    fn test_allowed_hosts_accept_comma_list() {
        let args = CliArgs::parse_from([
            "imgrelay",
            "--allowed-host",
            "a.example,b.example",
            "serve",
            "--bind",
            "127.0.0.1:9999",
        ]);

        assert_eq!(args.allowed_hosts, ["a.example", "b.example"]);
        assert!(matches!(args.command, Command::Serve { bind: Some(addr) } if addr.port() == 9999));
    }
}
