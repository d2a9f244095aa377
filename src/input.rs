//! Provides a means to read, parse and hold configuration options for scans.
use clap::{value_parser, Parser};
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;

/// Upper bound on concurrently open sockets per batch.
pub const MAX_BATCH_SIZE: u16 = 10_000;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "randsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nARGS:\n{positionals}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Probes random public IPv4 addresses for an open TCP port.
/// WARNING Only scan networks you are allowed to scan. Every run opens
/// connections to hosts you did not pick.
pub struct Opts {
    /// The TCP port to probe on every address (1 - 65535).
    #[arg(value_parser = value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// How many addresses to probe per batch (1 - 10000). Each one holds an
    /// open socket until its batch settles, so this is bounded by the open
    /// file limit of your OS.
    #[arg(short, long, default_value = "100", value_parser = value_parser!(u16).range(1..=10_000))]
    pub batch_size: u16,

    /// How many addresses to probe in total (min 1).
    #[arg(short = 'n', long, default_value = "100", value_parser = value_parser!(u32).range(1..))]
    pub total: u32,

    /// The time in milliseconds each batch waits for connections (min 1).
    #[arg(short, long, default_value = "5000", value_parser = value_parser!(u32).range(1..))]
    pub timeout: u32,

    /// Seed for the address generator. The same seed probes the same addresses.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// A list of comma separated CIDRs or IPs never to probe, on top of the
    /// built-in private and reserved ranges.
    #[arg(short = 'x', long = "exclude-addresses", value_delimiter = ',')]
    pub exclude_addresses: Option<Vec<String>>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// Greppable mode. Only output the addresses that replied.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Hide the banner
    #[arg(long)]
    pub no_banner: bool,
}

impl Opts {
    pub fn read() -> Self {
        Opts::parse()
    }

    /// Merge values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(batch_size, total, timeout, greppable, accessible);
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(port, seed, ulimit, exclude_addresses);
    }

    /// Checks values again after the config file had its say, since those
    /// never went through clap.
    pub fn validate(&self) -> Result<(), String> {
        match self.port {
            None => return Err(String::from("No target port given")),
            Some(port) if port < LOWEST_PORT_NUMBER => {
                return Err(format!(
                    "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}"
                ))
            }
            Some(_) => {}
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "Batch size {} must be between 1 and {MAX_BATCH_SIZE}",
                self.batch_size
            ));
        }
        if self.total == 0 {
            return Err(String::from("Total must be at least 1"));
        }
        if self.timeout == 0 {
            return Err(String::from("Timeout must be at least 1 millisecond"));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout))
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            port: None,
            batch_size: 0,
            total: 0,
            timeout: 0,
            seed: None,
            exclude_addresses: None,
            ulimit: None,
            greppable: true,
            accessible: false,
            no_config: true,
            config_path: None,
            no_banner: false,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Deserialize)]
pub struct Config {
    port: Option<u16>,
    batch_size: Option<u16>,
    total: Option<u32>,
    timeout: Option<u32>,
    seed: Option<u64>,
    exclude_addresses: Option<Vec<String>>,
    ulimit: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

#[allow(clippy::doc_link_with_quotes)]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing or unreadable file counts as empty.
    ///
    /// # Format
    ///
    /// port = 80
    /// batch_size = 500
    /// total = 10000
    /// timeout = 1500
    /// exclude_addresses = ["203.0.113.0/24"]
    /// greppable = true
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, toml::de::Error> {
        let content = custom_config_path
            .or_else(default_config_path)
            .filter(|path| path.exists())
            .and_then(|path| fs::read_to_string(path).ok())
            .unwrap_or_default();

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".randsweep.toml");
    Some(config_path)
}
