//!
//! csvdeck server configuration
//! ----------------------------
//! Resolves the listening address, upload folder and body size limit from
//! built-in defaults, `CSVDECK_*` environment variables and command-line flags.
//! CLI flags override environment values, which override defaults.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 5173;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 10;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5173";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub http_port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Resolve the configuration from the process environment and the given
    /// argument list (program name excluded).
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Resolution with an injectable environment lookup.
    pub fn resolve<F>(args: &[String], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let env_bind = lookup("CSVDECK_BIND").filter(|s| !s.trim().is_empty());
        let env_port = lookup("CSVDECK_HTTP_PORT").and_then(|v| v.parse::<u16>().ok());
        let env_dir = lookup("CSVDECK_UPLOAD_DIR").filter(|s| !s.trim().is_empty());
        let env_mb = lookup("CSVDECK_MAX_UPLOAD_MB").and_then(|v| v.parse::<usize>().ok());

        let arg_bind = flag_value(args, "--bind");
        let arg_port = flag_value(args, "--http-port").and_then(|v| v.parse::<u16>().ok());
        let arg_dir = flag_value(args, "--upload-dir");
        let arg_mb = flag_value(args, "--max-upload-mb").and_then(|v| v.parse::<usize>().ok());

        let max_upload_bytes = arg_mb
            .or(env_mb)
            .and_then(|mb| mb.checked_mul(1024 * 1024))
            .unwrap_or(defaults.max_upload_bytes);

        Self {
            bind_addr: arg_bind.or(env_bind).unwrap_or(defaults.bind_addr),
            http_port: arg_port.or(env_port).unwrap_or(defaults.http_port),
            upload_dir: arg_dir.or(env_dir).map(PathBuf::from).unwrap_or(defaults.upload_dir),
            max_upload_bytes,
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_addr
            .parse()
            .with_context(|| format!("invalid listen address {}", self.bind_addr))?;
        Ok(SocketAddr::new(ip, self.http_port))
    }
}

/// Server base URL for the terminal client: `--connect` flag, then `CSVDECK_URL`.
pub fn client_base_url(args: &[String]) -> String {
    flag_value(args, "--connect")
        .or_else(|| env::var("CSVDECK_URL").ok())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Value following `flag`, when present.
pub fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}
