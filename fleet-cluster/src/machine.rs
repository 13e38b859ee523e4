use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use fleet_core::ext::unix_timestamp;

use crate::error::RecordError;

pub const RECORD_VERSION: u32 = 1;

/// Identity and load snapshot of one node, keyed by `unique_id` both in the store and in the
/// [`MembershipTable`](crate::member_table::MembershipTable).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MachineRecord {
    unique_id: String,
    pub server_id: i64,
    pub create_time: i64,
    pub player_count: u64,
    pub update_time: i64,
    pub address: Option<String>,
}

impl MachineRecord {
    pub fn new(unique_id: impl Into<String>, server_id: i64, address: Option<String>) -> Self {
        let now = unix_timestamp();
        Self {
            unique_id: unique_id.into(),
            server_id,
            create_time: now,
            player_count: 0,
            update_time: now,
            address,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn update_player_count(&mut self, player_count: u64) {
        self.player_count = player_count;
        self.update_time = unix_timestamp();
    }

    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let wire = MachineRecordWire {
            version: RECORD_VERSION,
            unique_id: self.unique_id.clone(),
            server_id: self.server_id,
            create_time: self.create_time,
            player_count: self.player_count,
            update_time: self.update_time,
            address: self.address.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let wire: MachineRecordWire = serde_json::from_slice(bytes)?;
        if wire.version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(wire.version));
        }
        let record = Self {
            unique_id: wire.unique_id,
            server_id: wire.server_id,
            create_time: wire.create_time,
            player_count: wire.player_count,
            update_time: wire.update_time,
            address: wire.address,
        };
        Ok(record)
    }
}

impl Display for MachineRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Machine(unique_id:{}, server_id:{}, address:{}, create_time:{}, player_count:{})",
            self.unique_id,
            self.server_id,
            self.address.as_deref().unwrap_or("-"),
            self.create_time,
            self.player_count,
        )
    }
}

// Records written before the version field existed carry none; they are version 1.
fn default_version() -> u32 {
    RECORD_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct MachineRecordWire {
    #[serde(default = "default_version")]
    version: u32,
    unique_id: String,
    server_id: i64,
    create_time: i64,
    player_count: u64,
    update_time: i64,
    #[serde(default)]
    address: Option<String>,
}
