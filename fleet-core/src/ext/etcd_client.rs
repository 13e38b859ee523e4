use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::time::Duration;

use etcd_client::{Client, ConnectOptions, GetOptions, KeyValue, PutOptions};

/// Cheaply cloneable etcd handle; every clone shares the underlying channel, so the
/// publisher and the watcher can each hold one and issue calls concurrently.
#[derive(Clone)]
pub struct EtcdClient(Client);

impl EtcdClient {
    pub async fn connect<E, S>(endpoints: S, connect_timeout: Duration) -> anyhow::Result<Self>
        where
            E: AsRef<str>,
            S: AsRef<[E]>,
    {
        let options = ConnectOptions::new().with_connect_timeout(connect_timeout);
        let client = Client::connect(endpoints, Some(options)).await?;
        Ok(Self(client))
    }

    /// etcd v3 keys carry no ttl of their own: a fresh lease of `ttl` (at least one second) is
    /// granted and `key` attached to it. Whatever lease the key held before simply runs out.
    pub async fn put_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<i64, etcd_client::Error> {
        let mut client = self.0.clone();
        let ttl = ttl.as_secs().max(1) as i64;
        let lease = client.lease_grant(ttl, None).await?;
        let options = PutOptions::new().with_lease(lease.id());
        client.put(key, value, Some(options)).await?;
        Ok(lease.id())
    }

    pub async fn get_key(&self, key: &str) -> Result<Vec<KeyValue>, etcd_client::Error> {
        let mut client = self.0.clone();
        let mut resp = client.get(key, None).await?;
        Ok(resp.take_kvs())
    }

    pub async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, etcd_client::Error> {
        let mut client = self.0.clone();
        let mut resp = client.get(prefix, Some(GetOptions::new().with_prefix())).await?;
        Ok(resp.take_kvs())
    }
}

impl Deref for EtcdClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Debug for EtcdClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdClient")
            .finish_non_exhaustive()
    }
}

impl From<Client> for EtcdClient {
    fn from(value: Client) -> Self {
        EtcdClient(value)
    }
}
