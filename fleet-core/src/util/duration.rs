use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfigDuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milliseconds: Option<u64>,
}

impl ConfigDuration {
    pub fn to_std_duration(&self) -> Duration {
        let minutes = self.minutes.unwrap_or(0);
        let seconds = self.seconds.unwrap_or(0);
        let milliseconds = self.milliseconds.unwrap_or(0);
        Duration::from_secs(minutes * 60 + seconds) + Duration::from_millis(milliseconds)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            minutes: None,
            seconds: None,
            milliseconds: Some(millis),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self {
            minutes: None,
            seconds: Some(secs),
            milliseconds: None,
        }
    }

    pub fn from_mins(mins: u64) -> Self {
        Self {
            minutes: Some(mins),
            seconds: None,
            milliseconds: None,
        }
    }
}

impl From<ConfigDuration> for Duration {
    fn from(value: ConfigDuration) -> Self {
        value.to_std_duration()
    }
}

impl From<Duration> for ConfigDuration {
    fn from(value: Duration) -> Self {
        if value.subsec_millis() == 0 {
            Self::from_secs(value.as_secs())
        } else {
            Self::from_millis(value.as_millis() as u64)
        }
    }
}
