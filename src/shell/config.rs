// Process configuration.
//
// Values come from `POS_SELFREG_*` environment variables, overridden by
// `--key=value` command-line arguments. The capability flags replace the
// framework annotations that used to switch scheduling and async support on.

use axum::http::HeaderValue;
use clap::builder::{BoolishValueParser, RangedU64ValueParser};
use clap::error::{ContextKind, ContextValue};
use clap::{ArgAction, CommandFactory, Parser};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const MAX_POOL_SIZE: u64 = 1024;
pub const MAX_QUEUE_CAPACITY: u64 = 1_000_000;
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl From<clap::Error> for ConfigError {
    fn from(error: clap::Error) -> Self {
        let context = |kind: ContextKind| match error.get(kind) {
            Some(ContextValue::String(value)) => value.clone(),
            _ => String::new(),
        };
        // Rendered as "--server.port <SERVER_PORT>".
        let key = context(ContextKind::InvalidArg)
            .trim_start_matches('-')
            .split_whitespace()
            .next()
            .unwrap_or("arguments")
            .to_string();
        let reason = std::error::Error::source(&error)
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                error
                    .kind()
                    .as_str()
                    .unwrap_or("invalid value")
                    .to_string()
            });
        ConfigError::Invalid {
            key,
            value: context(ContextKind::InvalidValue),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub application_name: String,
    pub server_host: IpAddr,
    pub server_port: u16,
    pub context_path: String,
    pub enable_scheduling: bool,
    pub enable_async: bool,
    pub scheduler_pool_size: usize,
    pub async_pool_size: usize,
    pub async_queue_capacity: usize,
    pub shutdown_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application_name: "pos-selfreg-backend".to_string(),
            server_host: IpAddr::from([0, 0, 0, 0]),
            server_port: 8080,
            context_path: "/api".to_string(),
            enable_scheduling: true,
            enable_async: true,
            scheduler_pool_size: 1,
            async_pool_size: 8,
            async_queue_capacity: 100,
            shutdown_timeout: Duration::from_secs(30),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "pos_selfreg",
    about = "Backend for point-of-sale self-registration",
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
struct ConfigArgs {
    #[arg(
        long = "application.name",
        visible_alias = "spring.application.name",
        env = "POS_SELFREG_APPLICATION_NAME",
        default_value = "pos-selfreg-backend",
        value_parser = application_name
    )]
    application_name: String,

    #[arg(
        long = "server.host",
        visible_alias = "server.address",
        env = "POS_SELFREG_SERVER_HOST",
        default_value = "0.0.0.0"
    )]
    server_host: IpAddr,

    #[arg(
        long = "server.port",
        env = "POS_SELFREG_SERVER_PORT",
        default_value_t = 8080,
        value_parser = clap::value_parser!(u16)
    )]
    server_port: u16,

    #[arg(
        long = "server.context-path",
        visible_alias = "server.servlet.context-path",
        env = "POS_SELFREG_CONTEXT_PATH",
        default_value = "/api",
        value_parser = context_path
    )]
    context_path: String,

    #[arg(
        long = "scheduling.enabled",
        env = "POS_SELFREG_SCHEDULING_ENABLED",
        action = ArgAction::Set,
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    enable_scheduling: bool,

    #[arg(
        long = "async.enabled",
        env = "POS_SELFREG_ASYNC_ENABLED",
        action = ArgAction::Set,
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    enable_async: bool,

    #[arg(
        long = "scheduling.pool-size",
        env = "POS_SELFREG_SCHEDULING_POOL_SIZE",
        default_value_t = 1,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_POOL_SIZE)
    )]
    scheduler_pool_size: usize,

    #[arg(
        long = "async.pool-size",
        env = "POS_SELFREG_ASYNC_POOL_SIZE",
        default_value_t = 8,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_POOL_SIZE)
    )]
    async_pool_size: usize,

    #[arg(
        long = "async.queue-capacity",
        env = "POS_SELFREG_ASYNC_QUEUE_CAPACITY",
        default_value_t = 100,
        value_parser = RangedU64ValueParser::<usize>::new().range(0..=MAX_QUEUE_CAPACITY)
    )]
    async_queue_capacity: usize,

    #[arg(
        long = "shutdown.timeout-secs",
        env = "POS_SELFREG_SHUTDOWN_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(0..=MAX_SHUTDOWN_TIMEOUT_SECS)
    )]
    shutdown_timeout_secs: u64,

    #[arg(
        long = "cors.allowed-origins",
        env = "POS_SELFREG_CORS_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000",
        value_parser = allowed_origin
    )]
    cors_allowed_origins: Vec<String>,
}

impl From<ConfigArgs> for AppConfig {
    fn from(args: ConfigArgs) -> Self {
        Self {
            application_name: args.application_name,
            server_host: args.server_host,
            server_port: args.server_port,
            context_path: args.context_path,
            enable_scheduling: args.enable_scheduling,
            enable_async: args.enable_async,
            scheduler_pool_size: args.scheduler_pool_size,
            async_pool_size: args.async_pool_size,
            async_queue_capacity: args.async_queue_capacity,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            cors_allowed_origins: args.cors_allowed_origins,
        }
    }
}

impl AppConfig {
    /// Reads the process environment and applies `arguments` on top.
    /// Arguments that are not configuration keys are ignored.
    pub fn load(arguments: &[String]) -> Result<Self, ConfigError> {
        let recognised = recognised_arguments(arguments);
        let args = ConfigArgs::try_parse_from(
            std::iter::once("pos_selfreg".to_string()).chain(recognised),
        )?;
        Ok(args.into())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_host, self.server_port)
    }
}

// Keeps `--key=value` and `--key value` pairs whose key is a known long name
// or alias, so unrelated launcher arguments do not fail startup.
fn recognised_arguments(arguments: &[String]) -> Vec<String> {
    let command = ConfigArgs::command();
    let known: HashSet<String> = command
        .get_arguments()
        .flat_map(|arg| {
            arg.get_long()
                .into_iter()
                .chain(arg.get_all_aliases().unwrap_or_default())
        })
        .map(str::to_string)
        .collect();

    let mut recognised = Vec::new();
    let mut expects_value = false;
    for argument in arguments {
        if expects_value {
            recognised.push(argument.clone());
            expects_value = false;
            continue;
        }
        let Some(flag) = argument.strip_prefix("--") else {
            debug!(%argument, "ignoring argument");
            continue;
        };
        let (key, inline_value) = match flag.split_once('=') {
            Some((key, _)) => (key, true),
            None => (flag, false),
        };
        if known.contains(key) {
            recognised.push(argument.clone());
            expects_value = !inline_value;
        } else {
            debug!(%argument, "ignoring argument");
        }
    }
    recognised
}

fn application_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(name.to_string())
}

// "/api/" -> "/api", "" and "/" -> "/".
fn context_path(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err("must start with '/'".to_string());
    }
    let without_trailing = trimmed.trim_end_matches('/');
    if without_trailing.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(without_trailing.to_string())
    }
}

fn allowed_origin(raw: &str) -> Result<String, String> {
    let origin = raw.trim();
    if origin.is_empty() {
        return Err("must not be empty".to_string());
    }
    HeaderValue::from_str(origin)
        .map(|_| origin.to_string())
        .map_err(|error| error.to_string())
}
