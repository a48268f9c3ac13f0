//! Runtime configuration.
//!
//! Grounded on `config/cfg.rs`'s `KEY=value` line format; extended with the
//! session/timeout knobs the original config had no place for, and switched
//! from an all-or-nothing "minimum settings reached" gate to per-field
//! defaults, since every new field is optional where the original treated
//! a short file as a hard error.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

const TCP_PORT: &str = "TCP_PORT";
const LOG_DIRECTORY: &str = "LOG_DIRECTORY";
const DOWNLOAD_DIRECTORY: &str = "DOWNLOAD_DIRECTORY";
const READ_WRITE_SECONDS_TIMEOUT: &str = "READ_WRITE_SECONDS_TIMEOUT";
const MAX_INFLIGHT: &str = "MAX_INFLIGHT";
const MAX_PEERS_PER_TORRENT: &str = "MAX_PEERS_PER_TORRENT";
const CONNECT_TIMEOUT_SECONDS: &str = "CONNECT_TIMEOUT_SECONDS";

const DEFAULT_TCP_PORT: u16 = 6881;
const DEFAULT_LOG_DIRECTORY: &str = "./log";
const DEFAULT_DOWNLOAD_DIRECTORY: &str = "./download";
const DEFAULT_READ_WRITE_SECONDS_TIMEOUT: u64 = 10;
const DEFAULT_MAX_INFLIGHT: u32 = 16;
const DEFAULT_MAX_PEERS_PER_TORRENT: u32 = 50;
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Session and I/O tuning knobs, with sensible defaults so a config file is
/// entirely optional.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub tcp_port: u16,
    pub log_directory: String,
    pub download_directory: String,
    pub read_write_seconds_timeout: u64,
    pub max_inflight: u32,
    pub max_peers_per_torrent: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg {
            tcp_port: DEFAULT_TCP_PORT,
            log_directory: DEFAULT_LOG_DIRECTORY.to_string(),
            download_directory: DEFAULT_DOWNLOAD_DIRECTORY.to_string(),
            read_write_seconds_timeout: DEFAULT_READ_WRITE_SECONDS_TIMEOUT,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            max_peers_per_torrent: DEFAULT_MAX_PEERS_PER_TORRENT,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl Cfg {
    /// Loads a `KEY=value`-per-line config file, starting from
    /// [`Cfg::default`] and overriding only the settings present. Unknown
    /// setting names and malformed lines are hard errors.
    pub fn load(path: &str) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut cfg = Cfg::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '=');
            let (name, value) = match (parts.next(), parts.next()) {
                (Some(name), Some(value)) => (name, value),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("invalid config line: {line}"),
                    ))
                }
            };
            cfg.apply_setting(name, value)?;
        }

        Ok(cfg)
    }

    fn apply_setting(&mut self, name: &str, value: &str) -> io::Result<()> {
        match name {
            TCP_PORT => self.tcp_port = parse_field(name, value)?,
            LOG_DIRECTORY => self.log_directory = value.to_string(),
            DOWNLOAD_DIRECTORY => self.download_directory = value.to_string(),
            READ_WRITE_SECONDS_TIMEOUT => self.read_write_seconds_timeout = parse_field(name, value)?,
            MAX_INFLIGHT => self.max_inflight = parse_field(name, value)?,
            MAX_PEERS_PER_TORRENT => self.max_peers_per_torrent = parse_field(name, value)?,
            CONNECT_TIMEOUT_SECONDS => self.connect_timeout_seconds = parse_field(name, value)?,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown config setting: {other}"),
                ))
            }
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> io::Result<T> {
    value
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid value for {name}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(path: &str, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn defaults_apply_when_file_is_empty() {
        let path = "./test_cfg_defaults.txt";
        write_config(path, "");
        let cfg = Cfg::load(path).unwrap();
        assert_eq!(cfg.tcp_port, DEFAULT_TCP_PORT);
        assert_eq!(cfg.max_inflight, DEFAULT_MAX_INFLIGHT);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn overrides_only_the_settings_present() {
        let path = "./test_cfg_override.txt";
        write_config(path, "TCP_PORT=7000\nMAX_INFLIGHT=8");
        let cfg = Cfg::load(path).unwrap();
        assert_eq!(cfg.tcp_port, 7000);
        assert_eq!(cfg.max_inflight, 8);
        assert_eq!(cfg.download_directory, DEFAULT_DOWNLOAD_DIRECTORY);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_unknown_setting_name() {
        let path = "./test_cfg_unknown.txt";
        write_config(path, "NOT_A_REAL_SETTING=1");
        let result = Cfg::load(path);
        assert!(result.is_err());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_non_numeric_port() {
        let path = "./test_cfg_bad_port.txt";
        write_config(path, "TCP_PORT=notanumber");
        let result = Cfg::load(path);
        assert!(result.is_err());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Cfg::load("./does_not_exist.txt");
        assert!(result.is_err());
    }
}
