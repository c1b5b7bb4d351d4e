use chrono::{DateTime, Timelike, Utc};
use clap::Parser;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::obstruction_log::DEFAULT_MAX_ENTRIES;

/// UTC minute at which the set of fired resets is cleared for the new day.
pub const REARM_AT: ClockTime = ClockTime { hour: 0, minute: 1 };

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid clock time {0:?}, expected HH:MM")]
    InvalidClockTime(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("reset time {0} collides with the daily rearm point 00:01")]
    ResetAtRearm(ClockTime),
}

/// A UTC wall-clock minute, written `HH:MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn of(at: &DateTime<Utc>) -> Self {
        Self {
            hour: at.hour() as u8,
            minute: at.minute() as u8,
        }
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidClockTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "dish_monitor")]
#[command(about = "Satellite dish alignment monitor with keep-alive, scheduled obstruction map resets and obstruction logging", long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port for the dashboard and API
    #[arg(long, default_value = "8765")]
    pub port: u16,

    /// Dish gRPC endpoint
    #[arg(long, default_value = "192.168.100.1:9200")]
    pub dish_target: String,

    /// grpcurl executable used to reach the dish
    #[arg(long, default_value = "grpcurl")]
    pub grpcurl: PathBuf,

    /// Timeout for a single dish call, in seconds
    #[arg(long, default_value = "10")]
    pub dish_timeout_secs: u64,

    /// Keep-alive cadence in seconds
    #[arg(long, default_value = "120")]
    pub keepalive_secs: u64,

    /// Daily obstruction map reset instants (UTC, HH:MM, comma separated)
    #[arg(long, value_delimiter = ',', default_values = ["00:00", "12:00"])]
    pub reset_times: Vec<String>,

    /// Obstruction logging cadence in seconds
    #[arg(long, default_value = "300")]
    pub obstruction_log_secs: u64,

    /// File holding the rolling obstruction log
    #[arg(long, default_value = "obstruction_5min.json")]
    pub obstruction_log_path: PathBuf,

    /// Maximum samples kept in the obstruction log
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)]
    pub max_samples: usize,
}

/// Validated daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub dish_target: String,
    pub grpcurl: PathBuf,
    pub dish_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reset_times: Vec<ClockTime>,
    pub obstruction_interval: Duration,
    pub obstruction_log_path: PathBuf,
    pub max_samples: usize,
}

impl DaemonConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let mut reset_times = args
            .reset_times
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<ClockTime>())
            .collect::<Result<Vec<_>, _>>()?;
        reset_times.sort();
        reset_times.dedup();
        if let Some(clash) = reset_times.iter().find(|t| **t == REARM_AT) {
            return Err(ConfigError::ResetAtRearm(*clash));
        }
        if args.max_samples == 0 {
            return Err(ConfigError::Zero("max samples"));
        }

        Ok(Self {
            listen: SocketAddr::new(args.bind, args.port),
            dish_target: args.dish_target,
            grpcurl: args.grpcurl,
            dish_timeout: positive_secs(args.dish_timeout_secs, "dish timeout")?,
            keepalive_interval: positive_secs(args.keepalive_secs, "keep-alive interval")?,
            reset_times,
            obstruction_interval: positive_secs(args.obstruction_log_secs, "obstruction log interval")?,
            obstruction_log_path: args.obstruction_log_path,
            max_samples: args.max_samples,
        })
    }
}

fn positive_secs(secs: u64, what: &'static str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        Err(ConfigError::Zero(what))
    } else {
        Ok(Duration::from_secs(secs))
    }
}
