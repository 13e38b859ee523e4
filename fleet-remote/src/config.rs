use std::time::Duration;

use anyhow::ensure;
use config::{File, FileFormat, Source};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};

use fleet_core::config::ConfigBuilder;
use fleet_core::util::duration::ConfigDuration;

use crate::REFERENCE;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Bytes requested from the socket per read.
    pub read_chunk: usize,
    /// Frames that may wait in a connection's outbound queue before senders are held back.
    pub outbound_capacity: usize,
    pub max_frame_length: usize,
    /// How long `close` lets queued frames drain before dropping them with the socket.
    pub close_timeout: ConfigDuration,
}

impl RemoteSettings {
    pub fn builder() -> RemoteSettingsBuilder {
        RemoteSettingsBuilder::default()
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout.to_std_duration()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.read_chunk > 0, "read_chunk must be > 0");
        ensure!(self.outbound_capacity > 0, "outbound_capacity must be > 0");
        ensure!(!self.close_timeout().is_zero(), "close_timeout must be > 0");
        ensure!(self.max_frame_length <= u32::MAX as usize, "max_frame_length {} does not fit the length prefix", self.max_frame_length);
        Ok(())
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            read_chunk: 8 * 1024,
            outbound_capacity: 10000,
            max_frame_length: 16 * 1024 * 1024,
            close_timeout: ConfigDuration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct RemoteSettingsBuilder {
    builder: config::ConfigBuilder<DefaultState>,
}

impl Default for RemoteSettingsBuilder {
    fn default() -> Self {
        let builder = config::Config::builder()
            .add_source(File::from_str(REFERENCE, FileFormat::Toml));
        Self { builder }
    }
}

impl ConfigBuilder for RemoteSettingsBuilder {
    type C = RemoteSettings;

    fn add_source<T>(self, source: T) -> anyhow::Result<Self> where T: Source + Send + Sync + 'static {
        Ok(Self { builder: self.builder.add_source(source) })
    }

    fn build(self) -> anyhow::Result<Self::C> {
        let settings: RemoteSettings = self.builder.build()?.get("remote")?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use config::{File, FileFormat};

    use fleet_core::config::ConfigBuilder;

    use crate::config::RemoteSettings;

    #[test]
    fn test_reference_matches_default() -> anyhow::Result<()> {
        assert_eq!(RemoteSettings::builder().build()?, RemoteSettings::default());
        Ok(())
    }

    #[test]
    fn test_override() -> anyhow::Result<()> {
        let settings = RemoteSettings::builder()
            .add_source(File::from_str("[remote]\nread_chunk = 16", FileFormat::Toml))?
            .build()?;
        assert_eq!(settings.read_chunk, 16);
        assert_eq!(settings.outbound_capacity, 10000);
        assert_eq!(settings.close_timeout(), std::time::Duration::from_secs(5));
        Ok(())
    }
}
