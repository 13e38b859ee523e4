use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::HashSet;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::info;

use fleet_core::ext::unix_timestamp;

use crate::machine::MachineRecord;

/// Added to the highest eligible load so even the busiest node keeps a non-zero weight.
pub const LOAD_HEADROOM: u64 = 100;

pub type Members = BTreeMap<String, MachineRecord>;

/// Local view of the fleet, `unique_id -> MachineRecord`.
///
/// Readers load an immutable snapshot and never block. Mutations are serialized and publish a
/// new snapshot, so a reader sees either the whole reconciliation pass or none of it. Iteration
/// order is the `unique_id` order, which keeps weighted selection reproducible under a fixed
/// random source.
#[derive(Debug)]
pub struct MembershipTable {
    members: ArcSwap<Members>,
    write: Mutex<()>,
    start_time: Duration,
}

impl MembershipTable {
    /// `start_time` is the warm-up window during which a fresh node is not selectable.
    pub fn new(start_time: Duration) -> Self {
        Self {
            members: ArcSwap::from_pointee(Members::new()),
            write: Mutex::new(()),
            start_time,
        }
    }

    pub fn get(&self, unique_id: &str) -> Option<MachineRecord> {
        self.members.load().get(unique_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.members.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.load().is_empty()
    }

    pub fn snapshot(&self) -> Arc<Members> {
        self.members.load_full()
    }

    pub fn unique_ids(&self) -> Vec<String> {
        self.members.load().keys().cloned().collect()
    }

    pub fn add_machine(&self, record: MachineRecord) {
        self.add_machines([record]);
    }

    pub fn add_machines(&self, records: impl IntoIterator<Item=MachineRecord>) {
        let _guard = self.write.lock();
        let mut members = Members::clone(&self.members.load());
        for record in records {
            Self::upsert(&mut members, record);
        }
        self.members.store(Arc::new(members));
    }

    pub fn remove_machine(&self, unique_id: &str) -> Option<MachineRecord> {
        let _guard = self.write.lock();
        let mut members = Members::clone(&self.members.load());
        let removed = members.remove(unique_id);
        if let Some(record) = &removed {
            info!("remove machine {}", record);
            self.members.store(Arc::new(members));
        }
        removed
    }

    /// Drops every member whose id is not in `keys`.
    pub fn try_remove_machines(&self, keys: &HashSet<String>) {
        let _guard = self.write.lock();
        let mut members = Members::clone(&self.members.load());
        Self::retain(&mut members, keys);
        self.members.store(Arc::new(members));
    }

    /// Makes the table hold exactly `records`: ids missing from them are removed, the rest are
    /// added or replaced.
    pub fn reconcile(&self, records: Vec<MachineRecord>) {
        let keys: HashSet<String> = records.iter().map(|r| r.unique_id().to_string()).collect();
        let _guard = self.write.lock();
        let mut members = Members::clone(&self.members.load());
        Self::retain(&mut members, &keys);
        for record in records {
            Self::upsert(&mut members, record);
        }
        self.members.store(Arc::new(members));
    }

    fn upsert(members: &mut Members, record: MachineRecord) {
        if !members.contains_key(record.unique_id()) {
            info!("add machine {}", record);
        }
        members.insert(record.unique_id().to_string(), record);
    }

    fn retain(members: &mut Members, keys: &HashSet<String>) {
        members.retain(|unique_id, record| {
            let keep = keys.contains(unique_id);
            if !keep {
                info!("remove machine {}", record);
            }
            keep
        });
    }

    /// Picks a node for a new session with the thread rng and the current wall clock.
    pub fn random_machine(&self) -> Option<MachineRecord> {
        self.select_weighted(&mut rand::thread_rng(), unix_timestamp())
    }

    /// Load-biased random pick among members older than the warm-up window at `now` (epoch
    /// seconds). Returns `None` when no member is eligible.
    pub fn select_weighted<R>(&self, rng: &mut R, now: i64) -> Option<MachineRecord> where R: Rng + ?Sized {
        let cutoff = now.saturating_sub(self.start_time.as_secs() as i64);
        let members = self.members.load();
        let eligible = members
            .values()
            .filter(|record| record.create_time < cutoff)
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            return None;
        }
        let weights = weights(&eligible);
        let total = weights.iter().fold(0u64, |acc, w| acc.saturating_add(*w));
        let draw = rng.gen_range(0..=total);
        let mut accumulated = 0u64;
        for (record, weight) in eligible.iter().zip(weights) {
            accumulated = accumulated.saturating_add(weight);
            if draw <= accumulated {
                return Some((*record).clone());
            }
        }
        eligible.last().map(|record| (*record).clone())
    }
}

fn weights(eligible: &[&MachineRecord]) -> Vec<u64> {
    let max_count = eligible
        .iter()
        .map(|record| record.player_count)
        .max()
        .unwrap_or(0)
        .saturating_add(LOAD_HEADROOM);
    eligible.iter().map(|record| max_count - record.player_count).collect()
}
