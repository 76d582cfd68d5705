//! Persisted index of download lifecycle records
//!
//! The whole index lives in memory as one immutable snapshot. Mutations clone
//! the snapshot, edit the clone and swap it in, then hand the serialized
//! result to a single writer task, so durable writes land in mutation order.

mod types;

pub use types::*;

use crate::content::DownloadableContent;
use crate::kv::KeyValueStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, OnceCell};
use tracing::{debug, info, warn};

/// Key under which the index blob is stored
pub const INDEX_STORAGE_KEY: &str = "offline.download-index";

type IndexMap = BTreeMap<String, DownloadIndexItem>;

/// Change notification emitted after every completed mutation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexEvent {
    Updated(DownloadIndexEntry),
    Removed { key: String },
}

enum WriteJob {
    Persist(String),
    Flush(oneshot::Sender<()>),
}

/// Download index backed by a key-value blob
pub struct DownloadIndex {
    kv: Arc<dyn KeyValueStore>,
    state: OnceCell<RwLock<Arc<IndexMap>>>,
    writer: mpsc::UnboundedSender<WriteJob>,
    events: broadcast::Sender<IndexEvent>,
}

impl DownloadIndex {
    /// Create the index and start its writer task.
    ///
    /// Must be called from within a Tokio runtime. Nothing is read from
    /// `kv` until the first access.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (writer, jobs) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&kv), jobs));
        let (events, _) = broadcast::channel(1000);

        Self {
            kv,
            state: OnceCell::new(),
            writer,
            events,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Every tracked record, ordered by key
    pub async fn list(&self) -> Vec<DownloadIndexEntry> {
        self.snapshot()
            .await
            .iter()
            .map(|(key, item)| DownloadIndexEntry {
                key: key.clone(),
                item: item.clone(),
            })
            .collect()
    }

    pub async fn get(&self, content: &DownloadableContent) -> Option<DownloadIndexEntry> {
        let key = content.key();
        self.snapshot().await.get(&key).map(|item| DownloadIndexEntry {
            key,
            item: item.clone(),
        })
    }

    /// Create or merge a record.
    ///
    /// A new record takes the patch status, or `queued` when none is given.
    pub async fn upsert(&self, content: &DownloadableContent, patch: IndexPatch) -> DownloadIndexEntry {
        let key = content.key();
        let now = now_millis();
        let content = *content;

        self.mutate(move |items| {
            let item = items.entry(key.clone()).or_insert_with(|| DownloadIndexItem {
                content,
                status: patch.status.unwrap_or(DownloadStatus::Queued),
                progress: None,
                error: None,
                created_at: now,
                updated_at: now,
            });
            if let Some(status) = patch.status {
                item.status = status;
            }
            patch.progress.apply(&mut item.progress);
            patch.error.apply(&mut item.error);
            item.updated_at = item.updated_at.max(now);

            let entry = DownloadIndexEntry {
                key,
                item: item.clone(),
            };
            (entry.clone(), vec![IndexEvent::Updated(entry)])
        })
        .await
    }

    pub async fn remove(&self, content: &DownloadableContent) {
        let key = content.key();
        self.mutate(move |items| match items.remove(&key) {
            Some(_) => ((), vec![IndexEvent::Removed { key }]),
            None => ((), Vec::new()),
        })
        .await;
    }

    /// Drop the error message of one record, or of all records.
    pub async fn clear_errors(&self, content: Option<&DownloadableContent>) {
        let only = content.map(DownloadableContent::key);
        let now = now_millis();

        self.mutate(move |items| {
            let events = items
                .iter_mut()
                .filter(|(key, item)| {
                    item.error.is_some() && only.as_ref().map_or(true, |only| only == *key)
                })
                .map(|(key, item)| {
                    item.error = None;
                    item.updated_at = item.updated_at.max(now);
                    IndexEvent::Updated(DownloadIndexEntry {
                        key: key.clone(),
                        item: item.clone(),
                    })
                })
                .collect();
            ((), events)
        })
        .await;
    }

    /// Mark every queued, downloading or deleting record as failed.
    ///
    /// Used at startup: such records were left behind by a process that
    /// exited mid-operation.
    pub async fn fail_in_flight(&self, message: &str) -> Vec<DownloadIndexEntry> {
        let now = now_millis();
        let message = message.to_string();

        self.mutate(move |items| {
            let mut failed = Vec::new();
            for (key, item) in items.iter_mut().filter(|(_, item)| item.status.is_in_flight()) {
                item.status = DownloadStatus::Failed;
                item.error = Some(message.clone());
                item.updated_at = item.updated_at.max(now);
                failed.push(DownloadIndexEntry {
                    key: key.clone(),
                    item: item.clone(),
                });
            }
            let events = failed.iter().cloned().map(IndexEvent::Updated).collect();
            (failed, events)
        })
        .await
    }

    /// Wait until every mutation made so far has been written out.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.writer.send(WriteJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    async fn snapshot(&self) -> Arc<IndexMap> {
        let snapshot = self.state().await.read().clone();
        snapshot
    }

    async fn state(&self) -> &RwLock<Arc<IndexMap>> {
        // Concurrent first callers all wait on the same load
        self.state
            .get_or_init(|| async {
                let items = match self.kv.get(INDEX_STORAGE_KEY).await {
                    Some(raw) => parse_index(&raw),
                    None => IndexMap::new(),
                };
                info!("Download index loaded with {} entries", items.len());
                RwLock::new(Arc::new(items))
            })
            .await
    }

    async fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut IndexMap) -> (R, Vec<IndexEvent>),
    {
        let state = self.state().await;
        self.apply(state, f)
    }

    fn apply<F, R>(&self, state: &RwLock<Arc<IndexMap>>, f: F) -> R
    where
        F: FnOnce(&mut IndexMap) -> (R, Vec<IndexEvent>),
    {
        let mut current = state.write();
        let mut next = IndexMap::clone(&current);
        let (output, events) = f(&mut next);
        if events.is_empty() {
            return output;
        }

        // Enqueue while still holding the lock so writes keep mutation order
        match serde_json::to_string(&next) {
            Ok(json) => {
                let _ = self.writer.send(WriteJob::Persist(json));
            }
            Err(e) => warn!("Failed to serialize download index: {}", e),
        }
        *current = Arc::new(next);
        drop(current);

        for event in events {
            let _ = self.events.send(event);
        }
        output
    }
}

async fn run_writer(kv: Arc<dyn KeyValueStore>, mut jobs: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = jobs.recv().await {
        match job {
            WriteJob::Persist(json) => kv.set(INDEX_STORAGE_KEY, json).await,
            WriteJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Download index writer stopped");
}

/// Parse a persisted index, dropping entries that are malformed or whose
/// content does not match their key.
fn parse_index(raw: &str) -> IndexMap {
    let entries: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Ignoring unreadable download index: {}", e);
            return IndexMap::new();
        }
    };

    let mut items = IndexMap::new();
    for (key, value) in entries {
        match serde_json::from_value::<DownloadIndexItem>(value) {
            Ok(item) if item.content.validate().is_ok() && item.content.key() == key => {
                items.insert(key, item);
            }
            Ok(item) => warn!(
                "Dropping download index entry {}: content {} does not match",
                key, item.content
            ),
            Err(e) => warn!("Dropping malformed download index entry {}: {}", key, e),
        }
    }
    items
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn index() -> (Arc<MemoryKeyValueStore>, DownloadIndex) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let index = DownloadIndex::new(kv.clone());
        (kv, index)
    }

    #[tokio::test]
    async fn upsert_creates_with_defaults() {
        let (_, index) = index();
        let content = DownloadableContent::translation(20);

        let entry = index.upsert(&content, IndexPatch::default()).await;
        assert_eq!(entry.key, "translation:20");
        assert_eq!(entry.item.status, DownloadStatus::Queued);
        assert_eq!(entry.item.created_at, entry.item.updated_at);
        assert_eq!(index.get(&content).await, Some(entry));
    }

    #[tokio::test]
    async fn upsert_merges_and_clears() {
        let (_, index) = index();
        let content = DownloadableContent::surah_audio(3, 2);

        let first = index
            .upsert(
                &content,
                IndexPatch::status(DownloadStatus::Downloading)
                    .with_progress(DownloadProgress::percent(10)),
            )
            .await;

        let failed = index.upsert(&content, IndexPatch::failed("boom", None)).await;
        assert_eq!(failed.item.status, DownloadStatus::Failed);
        assert_eq!(failed.item.progress, Some(DownloadProgress::percent(10)));
        assert_eq!(failed.item.error.as_deref(), Some("boom"));
        assert_eq!(failed.item.created_at, first.item.created_at);
        assert!(failed.item.updated_at >= first.item.updated_at);

        let installed = index.upsert(&content, IndexPatch::installed()).await;
        assert_eq!(installed.item.status, DownloadStatus::Installed);
        assert_eq!(installed.item.progress, None);
        assert_eq!(installed.item.error, None);
    }

    #[tokio::test]
    async fn repeated_patches_are_idempotent() {
        let (_, index) = index();
        let content = DownloadableContent::translation(5);
        let patch = IndexPatch::status(DownloadStatus::Downloading)
            .with_progress(DownloadProgress::items(4, 114));

        let mut a = index.upsert(&content, patch.clone()).await;
        let mut b = index.upsert(&content, patch).await;
        a.item.updated_at = 0;
        b.item.updated_at = 0;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn remove_forgets_the_record() {
        let (_, index) = index();
        let content = DownloadableContent::translation(5);
        let other = DownloadableContent::translation(6);
        index.upsert(&content, IndexPatch::default()).await;
        index.upsert(&other, IndexPatch::default()).await;

        index.remove(&content).await;
        index.remove(&content).await;

        assert_eq!(index.get(&content).await, None);
        let keys: Vec<_> = index.list().await.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["translation:6".to_string()]);
    }

    #[tokio::test]
    async fn clear_errors_leaves_status_and_progress() {
        let (_, index) = index();
        let a = DownloadableContent::translation(1);
        let b = DownloadableContent::translation(2);
        let progress = Some(DownloadProgress::items(3, 114));
        index.upsert(&a, IndexPatch::failed("a", progress)).await;
        index.upsert(&b, IndexPatch::failed("b", progress)).await;

        index.clear_errors(Some(&a)).await;
        let a_entry = index.get(&a).await.unwrap();
        assert_eq!(a_entry.item.error, None);
        assert_eq!(a_entry.item.status, DownloadStatus::Failed);
        assert_eq!(a_entry.item.progress, progress);
        assert_eq!(index.get(&b).await.unwrap().item.error.as_deref(), Some("b"));

        index.clear_errors(None).await;
        assert!(index.list().await.iter().all(|e| e.item.error.is_none()));
    }

    #[tokio::test]
    async fn fail_in_flight_marks_interrupted_records() {
        let (_, index) = index();
        let stuck = DownloadableContent::surah_audio(1, 1);
        let done = DownloadableContent::surah_audio(1, 2);
        index
            .upsert(&stuck, IndexPatch::status(DownloadStatus::Downloading))
            .await;
        index.upsert(&done, IndexPatch::installed()).await;

        let failed = index.fail_in_flight("interrupted").await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, "audio:1:surah:1");
        assert_eq!(
            index.get(&done).await.unwrap().item.status,
            DownloadStatus::Installed
        );
    }

    #[tokio::test]
    async fn mutations_are_persisted_in_order() {
        let (kv, index) = index();
        let content = DownloadableContent::translation(9);
        for completed in 0..=20 {
            index
                .upsert(&content, IndexPatch::progress(DownloadProgress::items(completed, 114)))
                .await;
        }
        index.flush().await;

        let raw = kv.snapshot(INDEX_STORAGE_KEY).unwrap();
        let stored = parse_index(&raw);
        assert_eq!(
            stored["translation:9"].progress,
            Some(DownloadProgress::items(20, 114))
        );
    }

    #[tokio::test]
    async fn concurrent_upserts_all_land() {
        let (kv, index) = index();
        let index = Arc::new(index);

        let tasks: Vec<_> = (1..=50)
            .map(|id| {
                let index = Arc::clone(&index);
                tokio::spawn(async move {
                    index
                        .upsert(&DownloadableContent::translation(id), IndexPatch::default())
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        index.flush().await;

        assert_eq!(index.list().await.len(), 50);
        assert_eq!(parse_index(&kv.snapshot(INDEX_STORAGE_KEY).unwrap()).len(), 50);
    }

    #[tokio::test]
    async fn corrupt_entries_are_dropped_on_load() {
        let raw = serde_json::json!({
            "translation:20": {
                "content": { "kind": "translation", "translationId": 20 },
                "status": "installed",
                "createdAt": 1,
                "updatedAt": 1
            },
            "translation:21": {
                "content": { "kind": "translation", "translationId": 99 },
                "status": "installed",
                "createdAt": 1,
                "updatedAt": 1
            },
            "audio:1:surah:1": { "status": "nonsense" }
        });
        let kv = Arc::new(MemoryKeyValueStore::new().with_value(INDEX_STORAGE_KEY, raw.to_string()));
        let index = DownloadIndex::new(kv);

        let keys: Vec<_> = index.list().await.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["translation:20".to_string()]);
    }

    #[tokio::test]
    async fn unreadable_blob_starts_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new().with_value(INDEX_STORAGE_KEY, "not json"));
        let index = DownloadIndex::new(kv);
        assert!(index.list().await.is_empty());
    }

    struct SlowStore {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for SlowStore {
        async fn get(&self, _key: &str) -> Option<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            None
        }
        async fn set(&self, _key: &str, _value: String) {}
        async fn remove(&self, _key: &str) {}
    }

    #[tokio::test]
    async fn first_load_is_shared() {
        let kv = Arc::new(SlowStore {
            reads: AtomicUsize::new(0),
        });
        let index = DownloadIndex::new(kv.clone());
        let one = DownloadableContent::translation(1);

        let (a, b, c) = tokio::join!(
            index.list(),
            index.get(&one),
            index.list()
        );
        assert!(a.is_empty() && b.is_none() && c.is_empty());
        assert_eq!(kv.reads.load(Ordering::SeqCst), 1);
    }
}
