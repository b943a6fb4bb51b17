// Configuration: command line, configuration file, validation.
// SPDX-License-Identifier: GPL-3.0-or-later
//
// The command line is read first because it may relocate the config
// file; the file is read afterwards, and on any conflict the command
// line wins. Flags combine with OR since neither source can unset one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use crate::defaults;
use crate::helpers::{self, page_size, trunc_to_page};
use crate::{info, warn, GIB, KIB, MIB, TIB};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: syntax error: '{line}'", .path.display())]
    Syntax { path: PathBuf, line: String },
    #[error("configuration error: '{key}': {reason}")]
    BadValue { key: String, reason: String },
    #[error("configuration error: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn parse_size_arg(s: &str) -> std::result::Result<i64, String> {
    parse_size(s)
}

/// Parse a numeric argument with an optional k/m/g/t suffix (powers of
/// 1024, case-insensitive).
pub fn parse_size(s: &str) -> std::result::Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("requires a numeric argument".into());
    }
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, suffix) = body.split_at(digits_end);
    let value: i64 = digits
        .parse()
        .map_err(|_| "invalid numeric argument".to_string())?;
    let scale = match suffix {
        "" => 1,
        "k" | "K" => KIB,
        "m" | "M" => MIB,
        "g" | "G" => GIB,
        "t" | "T" => TIB,
        _ if suffix.len() == 1 => return Err("invalid unit letter".into()),
        _ => return Err("invalid numeric argument".into()),
    };
    let value = value
        .checked_mul(scale)
        .ok_or_else(|| "given value too large".to_string())?;
    Ok(if negative { -value } else { value })
}

/// Dynamic swap space manager for GNU/Linux.
#[derive(Parser, Debug)]
#[command(
    name = "swapspace",
    version,
    about = "Dynamic swap space manager for GNU/Linux"
)]
struct Cli {
    /// Consider n% of buffer memory to be "available"
    #[arg(short = 'B', long = "buffer_elasticity", value_name = "n", value_parser = parse_size_arg)]
    buffer_elasticity: Option<i64>,

    /// Consider n% of cache memory to be "available"
    #[arg(short = 'C', long = "cache_elasticity", value_name = "n", value_parser = parse_size_arg)]
    cache_elasticity: Option<i64>,

    /// Use configuration file s
    #[arg(short = 'c', long, value_name = "s")]
    configfile: Option<PathBuf>,

    /// Give allocation attempts n seconds to settle
    #[arg(short = 'a', long, value_name = "n", value_parser = parse_size_arg)]
    cooldown: Option<i64>,

    /// Run quietly in background
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Try to free up all swapfiles, then exit
    #[arg(short = 'e', long)]
    erase: bool,

    /// Aim for n% of available space
    #[arg(short = 'f', long, value_name = "n", value_parser = parse_size_arg)]
    freetarget: Option<i64>,

    /// Verify that configuration is okay, then exit
    #[arg(short = 'i', long)]
    inspect: bool,

    /// Try to keep at least n% of memory/swap available
    #[arg(short = 'l', long = "lower_freelimit", value_name = "n", value_parser = parse_size_arg)]
    lower_freelimit: Option<i64>,

    /// Restrict swapfiles to n bytes
    #[arg(short = 'M', long = "max_swapsize", value_name = "n", value_parser = parse_size_arg)]
    max_swapsize: Option<i64>,

    /// Don't create swapfiles smaller than n bytes
    #[arg(short = 'm', long = "min_swapsize", value_name = "n", value_parser = parse_size_arg)]
    min_swapsize: Option<i64>,

    /// Wipe disk space occupied by swapfiles after use
    #[arg(short = 'P', long)]
    paranoid: bool,

    /// Write process identifier to file s
    #[arg(
        short = 'p',
        long,
        value_name = "s",
        num_args = 0..=1,
        default_missing_value = defaults::PIDFILE
    )]
    pidfile: Option<PathBuf>,

    /// Suppress informational output
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Create swapfiles in secure directory s
    #[arg(short = 's', long, value_name = "s")]
    swappath: Option<PathBuf>,

    /// Reduce swapspace if more than n% is free
    #[arg(short = 'u', long = "upper_freelimit", value_name = "n", value_parser = parse_size_arg)]
    upper_freelimit: Option<i64>,

    /// Print lots of debug information
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Values picked up from the configuration file.
#[derive(Debug, Default)]
struct FileSettings {
    buffer_elasticity: Option<i64>,
    cache_elasticity: Option<i64>,
    cooldown: Option<i64>,
    daemon: bool,
    erase: bool,
    freetarget: Option<i64>,
    inspect: bool,
    lower_freelimit: Option<i64>,
    max_swapsize: Option<i64>,
    min_swapsize: Option<i64>,
    paranoid: bool,
    pidfile: Option<PathBuf>,
    quiet: bool,
    swappath: Option<PathBuf>,
    upper_freelimit: Option<i64>,
    verbose: bool,
}

fn bad_value(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::BadValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl FileSettings {
    fn apply(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        fn numeric(key: &str, value: Option<&str>) -> Result<i64> {
            let v = value.ok_or_else(|| bad_value(key, "requires an argument"))?;
            parse_size(v).map_err(|reason| bad_value(key, reason))
        }
        fn flag(key: &str, value: Option<&str>) -> Result<()> {
            if value.is_some() {
                Err(bad_value(key, "does not take an argument"))
            } else {
                Ok(())
            }
        }

        match key {
            "buffer_elasticity" => self.buffer_elasticity = Some(numeric(key, value)?),
            "cache_elasticity" => self.cache_elasticity = Some(numeric(key, value)?),
            "cooldown" => self.cooldown = Some(numeric(key, value)?),
            "freetarget" => self.freetarget = Some(numeric(key, value)?),
            "lower_freelimit" => self.lower_freelimit = Some(numeric(key, value)?),
            "upper_freelimit" => self.upper_freelimit = Some(numeric(key, value)?),
            "min_swapsize" => self.min_swapsize = Some(numeric(key, value)?),
            "max_swapsize" => self.max_swapsize = Some(numeric(key, value)?),
            "daemon" => {
                flag(key, value)?;
                self.daemon = true;
            }
            "erase" => {
                flag(key, value)?;
                self.erase = true;
            }
            "inspect" => {
                flag(key, value)?;
                self.inspect = true;
            }
            "paranoid" => {
                flag(key, value)?;
                self.paranoid = true;
            }
            "quiet" => {
                flag(key, value)?;
                self.quiet = true;
            }
            "verbose" => {
                flag(key, value)?;
                self.verbose = true;
            }
            "pidfile" => {
                // The path is optional; a bare "pidfile" enables the
                // default location.
                self.pidfile = Some(
                    value
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(defaults::PIDFILE)),
                );
            }
            "swappath" => {
                let v = value.ok_or_else(|| bad_value(key, "requires an argument"))?;
                self.swappath = Some(PathBuf::from(v));
            }
            // The file this very line came from; already consumed.
            "configfile" => {
                value.ok_or_else(|| bad_value(key, "requires an argument"))?;
            }
            _ => return Err(bad_value(key, "unknown configuration item")),
        }
        Ok(())
    }
}

fn is_config_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b == b'_')
}

/// Parse the configuration file: one entry per line, `key = value` or a
/// bare `key`, values optionally double-quoted, `#` starts a comment.
fn parse_file(content: &str, path: &Path) -> Result<FileSettings> {
    let mut settings = FileSettings::default();

    for raw in content.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let syntax_error = || ConfigError::Syntax {
            path: path.to_path_buf(),
            line: line.to_string(),
        };

        let (key, value) = match line.split_once('=') {
            Some((k, v)) => {
                let v = v.trim();
                let value = match v.strip_prefix('"') {
                    Some(quoted) => {
                        let inner = quoted.strip_suffix('"').ok_or_else(&syntax_error)?;
                        if inner.contains('"') {
                            return Err(syntax_error());
                        }
                        inner
                    }
                    None => {
                        if v.is_empty() || v.split_whitespace().count() != 1 {
                            return Err(syntax_error());
                        }
                        v
                    }
                };
                (k.trim(), Some(value))
            }
            None => (line, None),
        };

        if !is_config_key(key) {
            return Err(syntax_error());
        }
        settings.apply(key, value)?;
    }

    Ok(settings)
}

/// The validated, effectively read-only runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub buffer_elasticity: i64,
    pub cache_elasticity: i64,
    pub cooldown: i64,
    pub freetarget: i64,
    pub lower_freelimit: i64,
    pub upper_freelimit: i64,
    pub min_swapsize: i64,
    pub max_swapsize: i64,
    pub daemon: bool,
    pub erase: bool,
    pub inspect: bool,
    pub paranoid: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub pidfile: Option<PathBuf>,
    pub swappath: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_elasticity: defaults::BUFFER_ELASTICITY,
            cache_elasticity: defaults::CACHE_ELASTICITY,
            cooldown: defaults::COOLDOWN,
            freetarget: defaults::FREETARGET,
            lower_freelimit: defaults::LOWER_FREELIMIT,
            upper_freelimit: defaults::UPPER_FREELIMIT,
            min_swapsize: trunc_to_page(defaults::MIN_SWAPSIZE),
            max_swapsize: trunc_to_page(defaults::MAX_SWAPSIZE),
            daemon: false,
            erase: false,
            inspect: false,
            paranoid: false,
            quiet: false,
            verbose: false,
            pidfile: None,
            swappath: PathBuf::from(defaults::SWAPPATH),
        }
    }
}

impl Config {
    /// Load and validate the effective configuration.
    pub fn load() -> Result<Config> {
        Self::assemble(Cli::parse())
    }

    fn assemble(cli: Cli) -> Result<Config> {
        // Honor command-line verbosity right away so the notes below
        // respect an early -q.
        helpers::set_verbosity(cli.quiet, cli.verbose);

        let path = cli
            .configfile
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::CONFIGFILE));
        let file = match fs::read_to_string(&path) {
            Ok(content) => parse_file(&content, &path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if cli.configfile.is_some() {
                    warn!("Configuration file '{}' not found", path.display());
                } else {
                    info!("Using default configuration");
                }
                FileSettings::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        Self::merge(cli, file)
    }

    fn merge(cli: Cli, file: FileSettings) -> Result<Config> {
        let fallback = Config::default();
        let cfg = Config {
            buffer_elasticity: cli
                .buffer_elasticity
                .or(file.buffer_elasticity)
                .unwrap_or(fallback.buffer_elasticity),
            cache_elasticity: cli
                .cache_elasticity
                .or(file.cache_elasticity)
                .unwrap_or(fallback.cache_elasticity),
            cooldown: cli.cooldown.or(file.cooldown).unwrap_or(fallback.cooldown),
            freetarget: cli
                .freetarget
                .or(file.freetarget)
                .unwrap_or(fallback.freetarget),
            lower_freelimit: cli
                .lower_freelimit
                .or(file.lower_freelimit)
                .unwrap_or(fallback.lower_freelimit),
            upper_freelimit: cli
                .upper_freelimit
                .or(file.upper_freelimit)
                .unwrap_or(fallback.upper_freelimit),
            min_swapsize: trunc_to_page(
                cli.min_swapsize
                    .or(file.min_swapsize)
                    .unwrap_or(fallback.min_swapsize),
            ),
            max_swapsize: trunc_to_page(
                cli.max_swapsize
                    .or(file.max_swapsize)
                    .unwrap_or(fallback.max_swapsize),
            ),
            daemon: cli.daemon || file.daemon,
            erase: cli.erase || file.erase,
            inspect: cli.inspect || file.inspect,
            paranoid: cli.paranoid || file.paranoid,
            quiet: cli.quiet || file.quiet,
            verbose: cli.verbose || file.verbose,
            pidfile: cli.pidfile.or(file.pidfile),
            swappath: cli.swappath.or(file.swappath).unwrap_or(fallback.swappath),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        fn range(key: &str, value: i64, min: i64, max: i64) -> Result<()> {
            if value < min {
                let reason = match min {
                    0 => "argument may not be negative",
                    1 => "argument must be greater than zero",
                    _ => "given value too small",
                };
                return Err(bad_value(key, reason));
            }
            if value > max {
                return Err(bad_value(key, "given value too large"));
            }
            Ok(())
        }

        range("buffer_elasticity", self.buffer_elasticity, 0, 100)?;
        range("cache_elasticity", self.cache_elasticity, 0, 100)?;
        range("cooldown", self.cooldown, 0, i64::MAX)?;
        range("freetarget", self.freetarget, 2, 99)?;
        range("lower_freelimit", self.lower_freelimit, 0, 99)?;
        range("upper_freelimit", self.upper_freelimit, 0, 100)?;
        range("min_swapsize", self.min_swapsize, 8192, i64::MAX)?;
        range("max_swapsize", self.max_swapsize, 8192, i64::MAX)?;

        if self.quiet && self.verbose {
            return Err(ConfigError::Invalid(
                "the quiet and verbose options are mutually exclusive".into(),
            ));
        }
        if !(self.lower_freelimit < self.freetarget && self.freetarget < self.upper_freelimit) {
            return Err(ConfigError::Invalid(
                "free-space limits must satisfy lower_freelimit < freetarget < upper_freelimit"
                    .into(),
            ));
        }
        if self.min_swapsize > self.max_swapsize {
            return Err(ConfigError::Invalid(
                "min_swapsize exceeds max_swapsize".into(),
            ));
        }
        if self.min_swapsize < 10 * page_size() {
            return Err(ConfigError::Invalid(
                "min_swapsize must cover at least ten pages".into(),
            ));
        }
        if !self.swappath.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "swap path is not absolute (must start with '/'): '{}'",
                self.swappath.display()
            )));
        }
        if self
            .swappath
            .to_string_lossy()
            .chars()
            .any(char::is_whitespace)
        {
            return Err(ConfigError::Invalid(
                "not supported: swap path contains whitespace".into(),
            ));
        }
        Ok(())
    }
}
