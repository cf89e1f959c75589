//! Command-line interface
//!
//! Every flag that maps to a setting is taken as raw text so that it goes
//! through the same coercion as environment and file values.

use crate::core::config::{self, keys, ArgumentSource, EnvSource, IniSource};
use crate::core::ConfigResolver;
use clap::Parser;
use std::path::PathBuf;

/// Moisture Monitor - polls an ADC channel and reports moisture gain/loss
#[derive(Parser, Debug, Default)]
#[command(name = "moisture-monitor")]
#[command(about = "Polls a soil moisture probe and reports moisture gain/loss")]
#[command(version)]
pub struct Cli {
    /// Path to the INI configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// ADC channel to sample
    #[arg(long, value_name = "N")]
    pub channel: Option<String>,

    /// SPI bus the ADC is attached to
    #[arg(long, value_name = "N")]
    pub acquisition_port: Option<String>,

    /// SPI chip select of the ADC
    #[arg(long, value_name = "N")]
    pub acquisition_device: Option<String>,

    /// Seconds between readings
    #[arg(long, value_name = "SECS")]
    pub polling_interval_seconds: Option<String>,

    /// Write the rotating log file (true/false)
    #[arg(long, value_name = "BOOL")]
    pub log_enabled: Option<String>,

    /// Rotate the log file at this size
    #[arg(long, value_name = "KB")]
    pub log_max_size_kb: Option<String>,

    /// Directory for the log file
    #[arg(long, value_name = "DIR")]
    pub log_path: Option<String>,

    /// Subject of the loss notification email
    #[arg(long, value_name = "TEXT")]
    pub notification_subject: Option<String>,

    /// HTML file sent as the notification body
    #[arg(long, value_name = "PATH")]
    pub notification_template: Option<String>,

    /// SMTP server
    #[arg(long, value_name = "HOST")]
    pub transport_host: Option<String>,

    /// SMTP port (STARTTLS)
    #[arg(long, value_name = "PORT")]
    pub transport_port: Option<String>,

    /// SMTP login
    #[arg(long, value_name = "USER")]
    pub transport_user: Option<String>,

    /// Sender address
    #[arg(long, value_name = "ADDR")]
    pub transport_from: Option<String>,

    /// Recipient address
    #[arg(long, value_name = "ADDR")]
    pub transport_to: Option<String>,
}

impl Cli {
    /// Settings given explicitly on the command line, keyed by setting name
    pub fn explicit_settings(&self) -> Vec<(&'static str, String)> {
        [
            (keys::CHANNEL, &self.channel),
            (keys::ACQUISITION_PORT, &self.acquisition_port),
            (keys::ACQUISITION_DEVICE, &self.acquisition_device),
            (keys::POLLING_INTERVAL, &self.polling_interval_seconds),
            (keys::LOG_ENABLED, &self.log_enabled),
            (keys::LOG_MAX_SIZE_KB, &self.log_max_size_kb),
            (keys::LOG_PATH, &self.log_path),
            (keys::NOTIFICATION_SUBJECT, &self.notification_subject),
            (keys::NOTIFICATION_TEMPLATE, &self.notification_template),
            (keys::TRANSPORT_HOST, &self.transport_host),
            (keys::TRANSPORT_PORT, &self.transport_port),
            (keys::TRANSPORT_USER, &self.transport_user),
            (keys::TRANSPORT_FROM, &self.transport_from),
            (keys::TRANSPORT_TO, &self.transport_to),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect()
    }

    /// `--config` if given, else the platform default location
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(config::default_config_path)
    }

    /// Resolver over these arguments, the process environment and the config file
    pub fn resolver(&self) -> ConfigResolver {
        let file = match self.config_path() {
            Some(path) => IniSource::load(&path),
            None => IniSource::empty(),
        };
        ConfigResolver::new(
            ArgumentSource::new(self.explicit_settings()),
            EnvSource::process(),
            file,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_settings_only_lists_given_flags() {
        let cli = Cli::try_parse_from([
            "moisture-monitor",
            "--channel",
            "2",
            "--polling-interval-seconds",
            "0.5",
        ])
        .unwrap();

        let mut explicit = cli.explicit_settings();
        explicit.sort();
        assert_eq!(
            explicit,
            vec![
                (keys::CHANNEL, "2".to_string()),
                (keys::POLLING_INTERVAL, "0.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_every_flag_names_an_argument_setting() {
        let cli = Cli {
            channel: Some("1".into()),
            acquisition_port: Some("1".into()),
            acquisition_device: Some("1".into()),
            polling_interval_seconds: Some("1".into()),
            log_enabled: Some("1".into()),
            log_max_size_kb: Some("1".into()),
            log_path: Some("1".into()),
            notification_subject: Some("1".into()),
            notification_template: Some("1".into()),
            transport_host: Some("1".into()),
            transport_port: Some("1".into()),
            transport_user: Some("1".into()),
            transport_from: Some("1".into()),
            transport_to: Some("1".into()),
            ..Default::default()
        };

        for (name, _) in cli.explicit_settings() {
            let setting = config::setting(name).unwrap();
            assert!(setting.argument, "{} is not accepted as an argument", name);
        }
    }

    #[test]
    fn test_secret_has_no_flag() {
        let result = Cli::try_parse_from(["moisture-monitor", "--transport-secret", "hunter2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let cli = Cli::try_parse_from(["moisture-monitor", "--config", "/etc/moisture.ini"]).unwrap();
        assert_eq!(cli.config_path(), Some(PathBuf::from("/etc/moisture.ini")));
    }
}
