use std::time::Duration;

use anyhow::ensure;
use config::{File, FileFormat, Source};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};

use fleet_core::config::ConfigBuilder;
use fleet_core::util::duration::ConfigDuration;

use crate::REFERENCE;

/// Timing and layout of the membership pipeline, loaded from the `membership` table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MembershipSettings {
    /// Store directory every node publishes its record under.
    pub machine_path: String,
    /// Period of both the heartbeat publisher and the membership watcher.
    pub sync_member_time: ConfigDuration,
    /// A node that has not published for this long terminates itself.
    pub sync_timeout: ConfigDuration,
    /// Lease attached to every published record.
    pub member_ttl: ConfigDuration,
    /// Nodes younger than this are not eligible for weighted selection.
    pub start_time: ConfigDuration,
    /// Upper bound on a single store call.
    pub store_timeout: ConfigDuration,
}

impl MembershipSettings {
    pub fn builder() -> MembershipSettingsBuilder {
        MembershipSettingsBuilder::default()
    }

    pub fn sync_member_time(&self) -> Duration {
        self.sync_member_time.to_std_duration()
    }

    pub fn sync_timeout(&self) -> Duration {
        self.sync_timeout.to_std_duration()
    }

    pub fn member_ttl(&self) -> Duration {
        self.member_ttl.to_std_duration()
    }

    pub fn start_time(&self) -> Duration {
        self.start_time.to_std_duration()
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout.to_std_duration()
    }

    pub fn machine_key(&self, unique_id: &str) -> String {
        format!("{}/{}", self.machine_path.trim_end_matches('/'), unique_id)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.sync_member_time().is_zero(), "sync_member_time must be > 0");
        ensure!(self.member_ttl() >= Duration::from_secs(1), "member_ttl must be at least 1s, got {:?}", self.member_ttl());
        ensure!(
            self.sync_timeout() >= self.sync_member_time(),
            "sync_timeout {:?} must not be shorter than sync_member_time {:?}",
            self.sync_timeout(),
            self.sync_member_time(),
        );
        ensure!(self.machine_path.starts_with('/'), "machine_path {} must be absolute", self.machine_path);
        Ok(())
    }
}

impl Default for MembershipSettings {
    fn default() -> Self {
        Self {
            machine_path: "/machine".to_string(),
            sync_member_time: ConfigDuration::from_secs(5),
            sync_timeout: ConfigDuration::from_secs(15),
            member_ttl: ConfigDuration::from_secs(15),
            start_time: ConfigDuration::from_secs(15),
            store_timeout: ConfigDuration::from_secs(3),
        }
    }
}

#[derive(Debug)]
pub struct MembershipSettingsBuilder {
    builder: config::ConfigBuilder<DefaultState>,
}

impl Default for MembershipSettingsBuilder {
    fn default() -> Self {
        let builder = config::Config::builder()
            .add_source(File::from_str(REFERENCE, FileFormat::Toml));
        Self { builder }
    }
}

impl ConfigBuilder for MembershipSettingsBuilder {
    type C = MembershipSettings;

    fn add_source<T>(self, source: T) -> anyhow::Result<Self> where T: Source + Send + Sync + 'static {
        Ok(Self { builder: self.builder.add_source(source) })
    }

    fn build(self) -> anyhow::Result<Self::C> {
        let settings: MembershipSettings = self.builder.build()?.get("membership")?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::{File, FileFormat};

    use fleet_core::config::{ConfigBuilder, environment};
    use fleet_core::util::duration::ConfigDuration;

    use crate::config::MembershipSettings;

    #[test]
    fn test_reference_matches_default() -> anyhow::Result<()> {
        let settings = MembershipSettings::builder().build()?;
        assert_eq!(settings, MembershipSettings::default());
        assert_eq!(settings.sync_member_time(), Duration::from_secs(5));
        assert_eq!(settings.sync_timeout(), Duration::from_secs(15));
        assert_eq!(settings.member_ttl(), Duration::from_secs(15));
        assert_eq!(settings.start_time(), Duration::from_secs(15));
        Ok(())
    }

    #[test]
    fn test_override() -> anyhow::Result<()> {
        let user = r#"
            [membership]
            machine_path = "/game/machine/"
            sync_member_time = { milliseconds = 500 }
        "#;
        let settings = MembershipSettings::builder()
            .add_source(File::from_str(user, FileFormat::Toml))?
            .build()?;
        assert_eq!(settings.sync_member_time(), Duration::from_millis(500));
        assert_eq!(settings.sync_timeout(), Duration::from_secs(15));
        assert_eq!(settings.machine_key("a1"), "/game/machine/a1");
        Ok(())
    }

    #[test]
    fn test_environment_override() -> anyhow::Result<()> {
        let mut vars = config::Map::new();
        vars.insert("FLEET__MEMBERSHIP__MACHINE_PATH".to_string(), "/fleet/machine".to_string());
        vars.insert("FLEET__MEMBERSHIP__SYNC_MEMBER_TIME__SECONDS".to_string(), "2".to_string());
        vars.insert("OTHER__MEMBERSHIP__MACHINE_PATH".to_string(), "/other".to_string());
        let settings = MembershipSettings::builder()
            .add_source(environment().source(Some(vars)))?
            .build()?;
        assert_eq!(settings.machine_path, "/fleet/machine");
        assert_eq!(settings.sync_member_time(), Duration::from_secs(2));
        assert_eq!(settings.member_ttl(), Duration::from_secs(15));
        Ok(())
    }

    #[test]
    fn test_reject_timeout_shorter_than_period() {
        let mut settings = MembershipSettings::default();
        settings.sync_timeout = ConfigDuration::from_secs(1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_config() -> anyhow::Result<()> {
        let str = toml::to_string(&MembershipSettings::default())?;
        println!("{}", str);
        Ok(())
    }
}
