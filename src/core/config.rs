//! Configuration management
//!
//! Every setting is resolved exactly once at startup. Sources are consulted in
//! a fixed order of precedence:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. The INI configuration file (`IO`, `EMAIL`/`NOTIFY`, `LOGGING` sections)
//! 4. Built-in defaults
//!
//! A setting only consults the sources its table entry allows.

use crate::core::{Error, Result};
use ini::Ini;
use lettre::message::Mailbox;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config directory
pub const APP_DIR: &str = "moisture-monitor";

/// Default directory for the rotating log file
pub const DEFAULT_LOG_DIR: &str = "/var/log/moisture-monitor";

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "moisture-monitor.log";

/// Setting names, as used on the command line and in `ResolvedConfig`
pub mod keys {
    pub const CHANNEL: &str = "channel";
    pub const ACQUISITION_PORT: &str = "acquisition-port";
    pub const ACQUISITION_DEVICE: &str = "acquisition-device";
    pub const POLLING_INTERVAL: &str = "polling-interval-seconds";
    pub const LOG_ENABLED: &str = "log-enabled";
    pub const LOG_MAX_SIZE_KB: &str = "log-max-size-kb";
    pub const LOG_PATH: &str = "log-path";
    pub const NOTIFICATION_SUBJECT: &str = "notification-subject";
    pub const NOTIFICATION_TEMPLATE: &str = "notification-template";
    pub const TRANSPORT_HOST: &str = "transport-host";
    pub const TRANSPORT_PORT: &str = "transport-port";
    pub const TRANSPORT_USER: &str = "transport-user";
    pub const TRANSPORT_SECRET: &str = "transport-secret";
    pub const TRANSPORT_FROM: &str = "transport-from";
    pub const TRANSPORT_TO: &str = "transport-to";
}

/// Declared type of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Float,
    Bool,
    Str,
}

impl Kind {
    /// Coerce raw text from any source into a typed value
    pub fn coerce(self, raw: &str) -> std::result::Result<Value, String> {
        let text = raw.trim();
        match self {
            Kind::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("expected an integer, got {:?}", raw)),
            Kind::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("expected a number, got {:?}", raw)),
            Kind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("expected a boolean, got {:?}", raw)),
            },
            Kind::Str => Ok(Value::Str(text.to_string())),
        }
    }
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Argument,
    Environment,
    File,
    Default,
}

/// Static declaration of one setting and the sources it may be read from
#[derive(Debug)]
pub struct Setting {
    pub name: &'static str,
    pub kind: Kind,
    /// Default as text, coerced like any other source. `None` = optional.
    pub default: Option<&'static str>,
    /// Accepted as an explicit command-line argument
    pub argument: bool,
    /// Environment variable name
    pub env: Option<&'static str>,
    /// INI (section, key) pairs, tried in order
    pub file: &'static [(&'static str, &'static str)],
}

/// Every setting the monitor understands
pub const SETTINGS: &[Setting] = &[
    Setting { name: keys::CHANNEL, kind: Kind::Int, default: Some("0"), argument: true, env: Some("CHANNEL"), file: &[("IO", "CHANNEL")] },
    Setting { name: keys::ACQUISITION_PORT, kind: Kind::Int, default: Some("0"), argument: true, env: Some("SPI_PORT"), file: &[("IO", "SPI_PORT")] },
    Setting { name: keys::ACQUISITION_DEVICE, kind: Kind::Int, default: Some("0"), argument: true, env: Some("SPI_DEVICE"), file: &[("IO", "SPI_DEVICE")] },
    Setting { name: keys::POLLING_INTERVAL, kind: Kind::Float, default: Some("5.0"), argument: true, env: Some("POLLING_RATE"), file: &[("IO", "POLLING_RATE")] },
    Setting { name: keys::LOG_ENABLED, kind: Kind::Bool, default: Some("true"), argument: true, env: Some("LOG_ENABLE"), file: &[("LOGGING", "ENABLE")] },
    Setting { name: keys::LOG_MAX_SIZE_KB, kind: Kind::Int, default: Some("100"), argument: true, env: Some("LOG_MAXSIZE"), file: &[("LOGGING", "MAXSIZE")] },
    Setting { name: keys::LOG_PATH, kind: Kind::Str, default: Some(DEFAULT_LOG_DIR), argument: true, env: Some("LOG_PATH"), file: &[("LOGGING", "PATH")] },
    Setting { name: keys::NOTIFICATION_SUBJECT, kind: Kind::Str, default: Some("Moisture loss detected"), argument: true, env: Some("EMAIL_SUBJECT"), file: &[("EMAIL", "SUBJECT"), ("NOTIFY", "SUBJECT")] },
    Setting { name: keys::NOTIFICATION_TEMPLATE, kind: Kind::Str, default: None, argument: true, env: Some("EMAIL_TMPL_FILENAME"), file: &[("EMAIL", "TEMPLATE"), ("NOTIFY", "TEMPLATE")] },
    Setting { name: keys::TRANSPORT_HOST, kind: Kind::Str, default: None, argument: true, env: Some("SMTP_HOST"), file: &[("EMAIL", "SMTP_HOST"), ("NOTIFY", "SMTP_HOST")] },
    Setting { name: keys::TRANSPORT_PORT, kind: Kind::Int, default: Some("587"), argument: true, env: Some("SMTP_PORT"), file: &[("EMAIL", "SMTP_PORT"), ("NOTIFY", "SMTP_PORT")] },
    Setting { name: keys::TRANSPORT_USER, kind: Kind::Str, default: None, argument: true, env: Some("SMTP_USER"), file: &[("EMAIL", "SMTP_USER"), ("NOTIFY", "SMTP_USER")] },
    // Never taken from the command line, where it would show up in process listings
    Setting { name: keys::TRANSPORT_SECRET, kind: Kind::Str, default: None, argument: false, env: Some("SMTP_PASS"), file: &[("EMAIL", "SMTP_PASS"), ("NOTIFY", "SMTP_PASS")] },
    Setting { name: keys::TRANSPORT_FROM, kind: Kind::Str, default: None, argument: true, env: Some("SMTP_FROM"), file: &[("EMAIL", "SMTP_FROM"), ("NOTIFY", "SMTP_FROM")] },
    Setting { name: keys::TRANSPORT_TO, kind: Kind::Str, default: None, argument: true, env: Some("SMTP_TO"), file: &[("EMAIL", "SMTP_TO"), ("NOTIFY", "SMTP_TO")] },
];

/// Look up a setting declaration by name
pub fn setting(name: &str) -> Option<&'static Setting> {
    SETTINGS.iter().find(|s| s.name == name)
}

/// Get the default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.ini"))
}

/// A message produced while resolving, logged once the log sink is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: log::Level,
    pub message: String,
}

/// One source of raw setting values
pub trait SourceLookup {
    /// Which source this is
    fn source(&self) -> Source;

    /// Raw text for `setting`, if this source has one
    fn lookup(&self, setting: &Setting) -> Option<String>;
}

/// Explicit command-line arguments, keyed by setting name
#[derive(Debug, Default)]
pub struct ArgumentSource {
    values: HashMap<String, String>,
}

impl ArgumentSource {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl SourceLookup for ArgumentSource {
    fn source(&self) -> Source {
        Source::Argument
    }

    fn lookup(&self, setting: &Setting) -> Option<String> {
        if !setting.argument {
            return None;
        }
        self.values.get(setting.name).cloned()
    }
}

/// Environment variables
pub struct EnvSource {
    var: Box<dyn Fn(&str) -> Option<String>>,
}

impl EnvSource {
    /// Read from the process environment
    pub fn process() -> Self {
        Self::with(|key| std::env::var(key).ok())
    }

    /// Read through a custom lookup function
    pub fn with(var: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self { var: Box::new(var) }
    }
}

impl SourceLookup for EnvSource {
    fn source(&self) -> Source {
        Source::Environment
    }

    fn lookup(&self, setting: &Setting) -> Option<String> {
        let key = setting.env?;
        (self.var)(key).filter(|v| !v.trim().is_empty())
    }
}

/// The INI configuration file.
///
/// A missing or unparsable file behaves as a file with no keys.
#[derive(Default)]
pub struct IniSource {
    ini: Option<Ini>,
    diagnostics: Vec<Diagnostic>,
}

impl IniSource {
    /// No file at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from disk, tolerating absence and parse errors
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::failed(
                log::Level::Debug,
                format!("No config file at {}, skipping file source", path.display()),
            );
        }

        match Ini::load_from_file(path) {
            Ok(ini) => Self {
                ini: Some(ini),
                diagnostics: vec![Diagnostic {
                    level: log::Level::Info,
                    message: format!("Loaded config file {}", path.display()),
                }],
            },
            Err(e) => Self::failed(
                log::Level::Warn,
                format!("Ignoring malformed config file {}: {}", path.display(), e),
            ),
        }
    }

    /// Parse from a string, tolerating parse errors
    pub fn parse(text: &str) -> Self {
        match Ini::load_from_str(text) {
            Ok(ini) => Self { ini: Some(ini), diagnostics: Vec::new() },
            Err(e) => Self::failed(log::Level::Warn, format!("Ignoring malformed config: {}", e)),
        }
    }

    fn failed(level: log::Level, message: String) -> Self {
        Self {
            ini: None,
            diagnostics: vec![Diagnostic { level, message }],
        }
    }

    /// Whether a file was successfully parsed
    pub fn is_loaded(&self) -> bool {
        self.ini.is_some()
    }
}

impl SourceLookup for IniSource {
    fn source(&self) -> Source {
        Source::File
    }

    fn lookup(&self, setting: &Setting) -> Option<String> {
        let ini = self.ini.as_ref()?;
        setting
            .file
            .iter()
            .filter_map(|(section, key)| ini.get_from(Some(*section), key))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Resolves settings against an ordered list of sources
pub struct ConfigResolver {
    sources: Vec<Box<dyn SourceLookup>>,
    diagnostics: Vec<Diagnostic>,
}

impl ConfigResolver {
    /// Build a resolver with the fixed precedence argument > environment > file
    pub fn new(arguments: ArgumentSource, environment: EnvSource, mut file: IniSource) -> Self {
        let diagnostics = std::mem::take(&mut file.diagnostics);
        Self {
            sources: vec![Box::new(arguments), Box::new(environment), Box::new(file)],
            diagnostics,
        }
    }

    /// Resolve one setting. `Ok(None)` means optional and unset.
    pub fn resolve(&self, setting: &Setting) -> Result<Option<(Value, Source)>> {
        for source in &self.sources {
            if let Some(raw) = source.lookup(setting) {
                let value = setting.kind.coerce(&raw).map_err(|e| {
                    Error::Config(format!(
                        "{} (from {:?}): {}",
                        setting.name,
                        source.source(),
                        e
                    ))
                })?;
                return Ok(Some((value, source.source())));
            }
        }

        match setting.default {
            Some(raw) => {
                let value = setting
                    .kind
                    .coerce(raw)
                    .map_err(|e| Error::Config(format!("{} (default): {}", setting.name, e)))?;
                Ok(Some((value, Source::Default)))
            }
            None => Ok(None),
        }
    }

    /// Resolve every setting and validate the typed views.
    ///
    /// Fails on the first setting that cannot be coerced, so the monitor never
    /// starts with a partially typed configuration.
    pub fn resolve_all(self) -> Result<ResolvedConfig> {
        let mut values = BTreeMap::new();
        for setting in SETTINGS {
            if let Some((value, source)) = self.resolve(setting)? {
                values.insert(setting.name, Resolved { value, source });
            }
        }

        let config = ResolvedConfig {
            values,
            diagnostics: self.diagnostics,
        };
        config.acquisition()?;
        config.logging()?;
        config.notification()?;
        Ok(config)
    }
}

/// A resolved value and its origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub value: Value,
    pub source: Source,
}

/// Immutable snapshot of every resolved setting
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    values: BTreeMap<&'static str, Resolved>,
    diagnostics: Vec<Diagnostic>,
}

impl ResolvedConfig {
    /// Resolved value of a setting, if set
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(|r| &r.value)
    }

    /// Origin of a setting's value, if set
    pub fn source(&self, name: &str) -> Option<Source> {
        self.values.get(name).map(|r| r.source)
    }

    /// Messages collected while resolving
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn int(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(Value::Int(v)) => Ok(*v),
            other => Err(type_mismatch(name, "an integer", other)),
        }
    }

    fn float(&self, name: &str) -> Result<f64> {
        match self.get(name) {
            Some(Value::Float(v)) => Ok(*v),
            other => Err(type_mismatch(name, "a number", other)),
        }
    }

    fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Some(Value::Bool(v)) => Ok(*v),
            other => Err(type_mismatch(name, "a boolean", other)),
        }
    }

    fn optional_string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            Some(Value::Str(v)) => Ok(Some(v.clone())),
            None => Ok(None),
            other => Err(type_mismatch(name, "a string", other)),
        }
    }

    fn string(&self, name: &str) -> Result<String> {
        self.optional_string(name)?
            .ok_or_else(|| Error::Config(format!("{} is required", name)))
    }

    fn ranged<T: TryFrom<i64>>(&self, name: &str) -> Result<T> {
        let v = self.int(name)?;
        T::try_from(v).map_err(|_| Error::Config(format!("{} is out of range: {}", name, v)))
    }

    fn mailbox(&self, name: &str) -> Result<String> {
        let address = self.string(name)?;
        address
            .parse::<Mailbox>()
            .map_err(|e| Error::Config(format!("{} is not a valid address {:?}: {}", name, address, e)))?;
        Ok(address)
    }

    /// Sensor acquisition settings
    pub fn acquisition(&self) -> Result<AcquisitionSettings> {
        let seconds = self.float(keys::POLLING_INTERVAL)?;
        if !(seconds > 0.0) {
            return Err(Error::Config(format!(
                "{} must be greater than zero, got {}",
                keys::POLLING_INTERVAL,
                seconds
            )));
        }
        let interval = Duration::try_from_secs_f64(seconds).map_err(|e| {
            Error::Config(format!("{} is invalid: {}", keys::POLLING_INTERVAL, e))
        })?;

        Ok(AcquisitionSettings {
            channel: self.ranged(keys::CHANNEL)?,
            port: self.ranged(keys::ACQUISITION_PORT)?,
            device: self.ranged(keys::ACQUISITION_DEVICE)?,
            interval,
        })
    }

    /// Log sink settings
    pub fn logging(&self) -> Result<LogSettings> {
        let max_size_kb: u64 = self.ranged(keys::LOG_MAX_SIZE_KB)?;
        if max_size_kb == 0 {
            return Err(Error::Config(format!("{} must be at least 1", keys::LOG_MAX_SIZE_KB)));
        }
        Ok(LogSettings {
            enabled: self.bool(keys::LOG_ENABLED)?,
            max_size_kb,
            directory: PathBuf::from(self.string(keys::LOG_PATH)?),
        })
    }

    /// Notification transport settings.
    ///
    /// `None` when no transport host is configured. Once a host is set, every
    /// other transport field is required.
    pub fn notification(&self) -> Result<Option<NotificationSettings>> {
        let host = match self.optional_string(keys::TRANSPORT_HOST)? {
            Some(host) => host,
            None => return Ok(None),
        };

        Ok(Some(NotificationSettings {
            host,
            port: self.ranged(keys::TRANSPORT_PORT)?,
            user: self.string(keys::TRANSPORT_USER)?,
            secret: self.string(keys::TRANSPORT_SECRET)?,
            from: self.mailbox(keys::TRANSPORT_FROM)?,
            to: self.mailbox(keys::TRANSPORT_TO)?,
            subject: self.string(keys::NOTIFICATION_SUBJECT)?,
            template: PathBuf::from(self.string(keys::NOTIFICATION_TEMPLATE)?),
        }))
    }

    /// Render the snapshot as TOML, secret redacted
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.values.clone();
        if let Some(secret) = redacted.get_mut(keys::TRANSPORT_SECRET) {
            secret.value = Value::Str("********".to_string());
        }
        toml::to_string_pretty(&redacted).map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn type_mismatch(name: &str, expected: &str, found: Option<&Value>) -> Error {
    match found {
        None => Error::Config(format!("{} is required", name)),
        Some(v) => Error::Config(format!("{} should be {}, found {:?}", name, expected, v)),
    }
}

/// Where and how often to sample
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    pub channel: u32,
    pub port: u32,
    pub device: u32,
    pub interval: Duration,
}

/// Rotating log file settings
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub enabled: bool,
    pub max_size_kb: u64,
    pub directory: PathBuf,
}

impl LogSettings {
    /// Full path of the active log file
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(LOG_FILE_NAME)
    }

    /// Rotation threshold in bytes
    pub fn max_bytes(&self) -> u64 {
        self.max_size_kb.saturating_mul(1024)
    }
}

/// SMTP transport and message settings
#[derive(Clone, PartialEq)]
pub struct NotificationSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub template: PathBuf,
}

impl std::fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"********")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("template", &self.template)
            .finish()
    }
}
