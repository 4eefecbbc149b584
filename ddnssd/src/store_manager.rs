use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::{DnsRecord, StoredRecord};
use crate::container::Container;
use crate::container::lifecycle::{self, Lifecycle};
use crate::store::{hash, RecordQuery, RecordStore};

/// Commands sent to the store thread
pub enum StoreCommand {
    PublishHost(Vec<DnsRecord>, oneshot::Sender<Result<()>>),
    Reconcile(Arc<Container>, Lifecycle, oneshot::Sender<Result<()>>),
    Retire(Arc<Container>, oneshot::Sender<Result<()>>),
    Lookup(RecordQuery, oneshot::Sender<Result<Vec<StoredRecord>>>),
    Shutdown,
}

/// Handle to the thread that owns the record store.
///
/// Every backend call is blocking; one thread serialises them so async
/// tasks never wait on the database directly.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning `store`
    pub fn spawn(mut store: Box<dyn RecordStore>, digest_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        let recompute_digest = |store: &dyn RecordStore, digest_tx: &watch::Sender<String>| {
            match store.lookup(&RecordQuery::all()) {
                Ok(records) => {
                    let _ = digest_tx.send(hash::compute_digest(&records));
                }
                Err(e) => tracing::error!("Failed to read records for digest: {:#}", e),
            }
        };

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::PublishHost(records, reply) => {
                        let result = records.iter().try_for_each(|rr| store.publish(rr));
                        recompute_digest(store.as_ref(), &digest_tx);
                        let _ = reply.send(result);
                    }
                    StoreCommand::Reconcile(container, state, reply) => {
                        let result = lifecycle::reconcile(&container, state, store.as_mut());
                        // A failed reconcile may still have written some records
                        recompute_digest(store.as_ref(), &digest_tx);
                        let _ = reply.send(result);
                    }
                    StoreCommand::Retire(container, reply) => {
                        tracing::info!("Retiring records for {} ({})", container.name(), container.short_id());
                        let result = container.retire_records(store.as_mut());
                        recompute_digest(store.as_ref(), &digest_tx);
                        let _ = reply.send(result);
                    }
                    StoreCommand::Lookup(query, reply) => {
                        let result = store.lookup(&query);
                        let _ = reply.send(result);
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Publish the daemon's own host records. No container ever withdraws these.
    pub async fn publish_host_records(&self, records: Vec<DnsRecord>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::PublishHost(records, reply)).await?;
        rx.await?
    }

    /// Publish or suppress a container's records according to its lifecycle state
    pub async fn reconcile(&self, container: Arc<Container>, state: Lifecycle) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Reconcile(container, state, reply)).await?;
        rx.await?
    }

    /// Remove everything a destroyed container published
    pub async fn retire(&self, container: Arc<Container>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Retire(container, reply)).await?;
        rx.await?
    }

    pub async fn lookup(&self, query: RecordQuery) -> Result<Vec<StoredRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Lookup(query, reply)).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::types::RecordType;
    use crate::container::registry::ContainerRegistry;
    use crate::container::service_instance::host_records;
    use crate::container::tests::{snapshot, test_config};
    use crate::store::memory::MemoryStore;

    fn web_container() -> Arc<Container> {
        let registry = ContainerRegistry::new();
        let container = Container::new(
            &snapshot(json!({
                "Id": "handlehandlehandle",
                "Name": "/web",
                "Config": {
                    "Labels": { "org.discourse.service._http.port": "80" },
                    "ExposedPorts": { "80/tcp": {} }
                },
                "NetworkSettings": { "IPAddress": "192.0.2.80" }
            })),
            test_config(),
            &registry,
        )
        .unwrap();
        registry.insert(container)
    }

    #[tokio::test]
    async fn test_reconcile_through_handle() {
        let (digest_tx, mut digest_rx) = watch::channel(String::new());
        let handle = StoreHandle::spawn(Box::new(MemoryStore::new()), digest_tx);
        let container = web_container();

        handle.reconcile(Arc::clone(&container), Lifecycle::Observed).await.unwrap();
        assert!(digest_rx.has_changed().unwrap());
        let published = digest_rx.borrow_and_update().clone();
        assert_eq!(published.len(), 64);

        let rows = handle.lookup(RecordQuery::all()).await.unwrap();
        assert_eq!(rows.len(), 5);

        handle.reconcile(Arc::clone(&container), Lifecycle::Stopped).await.unwrap();
        let rows = handle.lookup(RecordQuery::all()).await.unwrap();
        assert!(rows.iter().all(|r| r.rtype.is_metadata()));
        assert_ne!(*digest_rx.borrow(), published);

        handle.retire(container).await.unwrap();
        assert!(handle.lookup(RecordQuery::all()).await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_host_records_outlive_containers() {
        let (digest_tx, _digest_rx) = watch::channel(String::new());
        let handle = StoreHandle::spawn(Box::new(MemoryStore::new()), digest_tx);
        handle
            .publish_host_records(host_records(&test_config()))
            .await
            .unwrap();

        let container = web_container();
        handle.reconcile(Arc::clone(&container), Lifecycle::Observed).await.unwrap();
        handle.retire(container).await.unwrap();

        let rows = handle.lookup(RecordQuery::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "speccy.sd.example.com");
        assert_eq!(rows[0].content, "192.0.2.1");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_by_type() {
        let (digest_tx, _digest_rx) = watch::channel(String::new());
        let handle = StoreHandle::spawn(Box::new(MemoryStore::new()), digest_tx);
        handle.reconcile(web_container(), Lifecycle::Observed).await.unwrap();

        let srv = handle
            .lookup(RecordQuery::all().with_type(RecordType::Srv))
            .await
            .unwrap();
        assert_eq!(srv.len(), 1);
        assert_eq!(srv[0].name, "web._http._tcp.sd.example.com");
        assert_eq!(srv[0].content, "0 0 80 handlehandle.speccy.sd.example.com");

        handle.shutdown().await.unwrap();
    }
}
