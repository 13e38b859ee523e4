use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};

use fleet_core::ext::etcd_client::EtcdClient;

use crate::error::StoreError;
use crate::store::{check_path, CoordinationStore, dir_prefix, StoreNode};

#[derive(Debug, Clone)]
pub struct EtcdStore {
    client: EtcdClient,
}

impl EtcdStore {
    pub fn new(client: EtcdClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn write(&self, path: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        check_path(path)?;
        let lease = self.client.put_with_ttl(path, value, ttl).await?;
        trace!("put {} with lease {}", path, lease);
        Ok(())
    }

    async fn read(&self, path: &str, recursive: bool) -> Result<Vec<StoreNode>, StoreError> {
        check_path(path)?;
        let kvs = if recursive {
            self.client.get_prefix(&dir_prefix(path)).await?
        } else {
            self.client.get_key(path).await?
        };
        Ok(to_nodes(kvs.iter().map(|kv| (kv.key(), kv.value()))))
    }
}

/// Keys that are not utf8 cannot be membership paths; they are skipped so one foreign key
/// under the directory does not hide every other node.
fn to_nodes<'a>(kvs: impl Iterator<Item=(&'a [u8], &'a [u8])>) -> Vec<StoreNode> {
    kvs.filter_map(|(key, value)| match std::str::from_utf8(key) {
        Ok(key) => Some(StoreNode { key: key.to_string(), value: value.to_vec() }),
        Err(error) => {
            warn!("skip non utf8 key {:?} {}", key, error);
            None
        }
    }).collect()
}

#[cfg(test)]
mod tests {
    use crate::store::etcd::to_nodes;
    use crate::store::StoreNode;

    #[test]
    fn test_skip_non_utf8_key() {
        let invalid = [b'/', 0xff, 0xfe];
        let kvs: Vec<(&[u8], &[u8])> = vec![
            (&b"/machine/a"[..], &b"{}"[..]),
            (&invalid[..], &b"junk"[..]),
            (&b"/machine/b"[..], &b"{}"[..]),
        ];
        let nodes = to_nodes(kvs.into_iter());
        let keys = nodes.iter().map(|node| node.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["/machine/a", "/machine/b"]);
        assert_eq!(nodes[0], StoreNode { key: "/machine/a".to_string(), value: b"{}".to_vec() });
    }
}
