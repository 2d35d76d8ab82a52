//! Sync Client
//!
//! Decides when to sync, snapshots the pending changes of a
//! [`SharedOutline`] into a batch, sends it through a [`SyncTransport`] and
//! settles the Mutation Tracker with the result.
//!
//! # Flight rules
//!
//! - At most one request per document is outstanding; a `save()` issued while
//!   one is in flight (from this client or another one sharing the store)
//!   returns [`SaveOutcome::AlreadyInFlight`] and its changes ride along with
//!   the next batch
//! - The store lock is held only to snapshot and to settle, never across the
//!   network call, so editing continues while a batch is in flight
//! - On failure the in-flight changes are merged back into the pending set;
//!   nothing is ever dropped without a confirmed sync
//! - After [`SyncClient::detach`] a late response is not reported as a sync;
//!   its batch is folded back into the pending set for whoever syncs next

use crate::config::SyncConfig;
use crate::sync::error::SyncError;
use crate::sync::transport::SyncTransport;
use crate::sync::wire::SyncRequest;
use crate::tree::{resolve_focus, OutlineStore, SharedOutline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Result of a [`SyncClient::save`] call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The batch was applied by the server
    Synced {
        at: DateTime<Utc>,
        mutation_count: usize,
    },
    /// No local changes since the last sync
    NothingToSync,
    /// Another save on this store is outstanding; these changes go with the
    /// next batch
    AlreadyInFlight,
    /// The client was detached before the save started
    Detached,
}

#[derive(Debug, Default)]
struct SyncStatus {
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<SyncError>,
}

/// Resets the in-flight flag however `save()` exits
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncClient {
    document_id: String,
    store: SharedOutline,
    transport: Arc<dyn SyncTransport>,
    config: SyncConfig,
    in_flight: AtomicBool,
    detached: watch::Sender<bool>,
    status: Mutex<SyncStatus>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("document_id", &self.document_id)
            .field("in_flight", &self.in_flight)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl SyncClient {
    pub fn new(
        document_id: impl Into<String>,
        store: SharedOutline,
        transport: Arc<dyn SyncTransport>,
        config: SyncConfig,
    ) -> Self {
        let (detached, _) = watch::channel(false);
        Self {
            document_id: document_id.into(),
            store,
            transport,
            config,
            in_flight: AtomicBool::new(false),
            detached,
            status: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn store(&self) -> &SharedOutline {
        &self.store
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_detached(&self) -> bool {
        *self.detached.borrow()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.lock_store()
            .map(|store| store.has_pending_changes())
            .unwrap_or(false)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.status.lock().ok().and_then(|s| s.last_synced_at)
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.status.lock().ok().and_then(|s| s.last_error.clone())
    }

    /// Stop syncing this document (the user navigated away)
    ///
    /// The idle saver exits. A response that arrives for a batch already in
    /// flight is discarded and the batch stays pending in the store.
    pub fn detach(&self) {
        self.detached.send_replace(true);
        debug!("Sync client for document {} detached", self.document_id);
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, OutlineStore>, SyncError> {
        self.store
            .lock()
            .map_err(|_| SyncError::LocalStateUnavailable)
    }

    fn record_status(&self, synced_at: Option<DateTime<Utc>>, error: Option<SyncError>) {
        if let Ok(mut status) = self.status.lock() {
            if synced_at.is_some() {
                status.last_synced_at = synced_at;
            }
            status.last_error = error;
        }
    }

    /// Send every pending change as one batch
    ///
    /// Explicit saves, the keyboard shortcut and the idle timer all end up
    /// here. A rejection or transport failure is returned as-is and the
    /// changes stay pending; nothing is retried automatically.
    #[instrument(skip(self), fields(document_id = %self.document_id))]
    pub async fn save(&self) -> Result<SaveOutcome, SyncError> {
        if self.is_detached() {
            return Ok(SaveOutcome::Detached);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Save requested while a batch is in flight");
            return Ok(SaveOutcome::AlreadyInFlight);
        }
        let _flight = FlightGuard(&self.in_flight);

        let batch = {
            let mut store = self.lock_store()?;
            match store.begin_sync() {
                Some(batch) => batch,
                None if store.is_syncing() => {
                    debug!("Store already has a batch in flight");
                    return Ok(SaveOutcome::AlreadyInFlight);
                }
                None => return Ok(SaveOutcome::NothingToSync),
            }
        };

        let mutation_count = batch.mutations.len();
        debug!(
            "Sending batch: {} mutation(s), {} child list(s)",
            mutation_count,
            batch.children.len()
        );

        let request = SyncRequest::new(self.document_id.clone(), batch);
        let timeout = self.config.request_timeout();
        let result = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::transport(format!(
                "request timed out after {} ms",
                self.config.request_timeout_ms
            ))),
        };

        let mut store = self.lock_store()?;
        if self.is_detached() {
            // The batch stays pending for whoever syncs this store next
            store.abort_sync();
            debug!("Discarding sync result for detached document");
            return Err(SyncError::Detached);
        }

        match result {
            Ok(()) => {
                let at = Utc::now();
                store.complete_sync(at);
                drop(store);
                self.record_status(Some(at), None);
                info!("✅ Synced {} mutation(s)", mutation_count);
                Ok(SaveOutcome::Synced { at, mutation_count })
            }
            Err(e) => {
                store.abort_sync();
                drop(store);
                warn!("Sync failed, changes kept pending: {}", e);
                self.record_status(None, Some(e.clone()));
                Err(e)
            }
        }
    }

    /// Save automatically once the store has been quiet for `idle_timeout`
    ///
    /// Every edit event restarts the quiet period. A failed save is not
    /// retried until the next edit. The task ends on [`SyncClient::detach`].
    pub fn spawn_idle_saver(self: &Arc<Self>) -> Result<JoinHandle<()>, SyncError> {
        let mut events = self.lock_store()?.subscribe();
        let mut detached = self.detached.subscribe();
        let client = Arc::clone(self);
        let idle = self.config.idle_timeout();

        Ok(tokio::spawn(async move {
            let mut dirty = client.has_pending_changes();
            loop {
                if client.is_detached() {
                    break;
                }

                if !dirty {
                    tokio::select! {
                        _ = detached.changed() => break,
                        received = events.recv() => match received {
                            Ok(event) => dirty = event.is_edit(),
                            Err(RecvError::Lagged(_)) => dirty = true,
                            Err(RecvError::Closed) => break,
                        },
                    }
                    continue;
                }

                tokio::select! {
                    _ = detached.changed() => break,
                    received = tokio::time::timeout(idle, events.recv()) => match received {
                        // Any activity restarts the quiet period
                        Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
                        Ok(Err(RecvError::Closed)) => break,
                        Err(_) => {
                            dirty = match client.save().await {
                                Ok(SaveOutcome::AlreadyInFlight) => true,
                                Ok(_) => client.has_pending_changes(),
                                Err(e) => {
                                    debug!("Idle save failed: {}", e);
                                    false
                                }
                            };
                        }
                    },
                }
            }
            debug!("Idle saver for document {} stopped", client.document_id);
        }))
    }

    /// Remember `node_id` as the focused node of this document
    pub fn remember_focus(&self, memory: &mut FocusMemory, node_id: impl Into<String>) {
        memory.record(self.document_id.clone(), node_id);
    }

    /// Node to focus when the document is shown again
    pub fn restore_focus(&self, memory: &FocusMemory) -> Result<Option<String>, SyncError> {
        let store = self.lock_store()?;
        Ok(resolve_focus(&store, memory.get(&self.document_id)))
    }
}

/// Last focused node per document
///
/// Owned by the caller and passed in explicitly; serializable so it can be
/// kept with the user's preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusMemory {
    #[serde(default)]
    last_focused: HashMap<String, String>,
}

impl FocusMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, document_id: impl Into<String>, node_id: impl Into<String>) {
        self.last_focused.insert(document_id.into(), node_id.into());
    }

    pub fn get(&self, document_id: &str) -> Option<&str> {
        self.last_focused.get(document_id).map(String::as_str)
    }

    pub fn forget(&mut self, document_id: &str) -> Option<String> {
        self.last_focused.remove(document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::SyncErrorKind;
    use crate::tree::ROOT_ID;
    use async_trait::async_trait;
    use std::time::Duration;

    /// In-memory transport; holding `gate` keeps requests in flight
    #[derive(Default)]
    struct MockTransport {
        requests: Mutex<Vec<SyncRequest>>,
        fail_with: Mutex<Option<SyncError>>,
        gate: tokio::sync::Mutex<()>,
    }

    impl MockTransport {
        fn sent(&self) -> Vec<SyncRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn fail_with(&self, error: SyncError) {
            *self.fail_with.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl SyncTransport for MockTransport {
        async fn send(&self, request: SyncRequest) -> Result<(), SyncError> {
            self.requests.lock().unwrap().push(request);
            let _gate = self.gate.lock().await;
            match self.fail_with.lock().unwrap().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    fn setup() -> (Arc<SyncClient>, Arc<MockTransport>, String) {
        let store = OutlineStore::new();
        let first = store.root_children()[0].clone();
        let shared: SharedOutline = Arc::new(Mutex::new(store));
        let transport = Arc::new(MockTransport::default());
        let client = Arc::new(SyncClient::new(
            "doc-1",
            shared,
            transport.clone(),
            SyncConfig::default(),
        ));
        (client, transport, first)
    }

    #[tokio::test]
    async fn test_save_sends_pending_batch() {
        let (client, transport, first) = setup();

        let outcome = client.save().await.unwrap();

        assert!(matches!(
            outcome,
            SaveOutcome::Synced {
                mutation_count: 1,
                ..
            }
        ));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].document_id, "doc-1");
        assert!(sent[0].batch.mutations.insert.contains_key(&first));
        assert_eq!(sent[0].batch.root_children().unwrap(), &[first]);
        assert!(!client.has_pending_changes());
        assert!(client.last_synced_at().is_some());

        assert_eq!(client.save().await.unwrap(), SaveOutcome::NothingToSync);
    }

    #[tokio::test]
    async fn test_second_save_during_flight_is_coalesced() {
        let (client, transport, first) = setup();
        let gate = transport.gate.lock().await;

        let background = Arc::clone(&client);
        let pending = tokio::spawn(async move { background.save().await });
        while !client.is_saving() || transport.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        // Edit while the first batch is outstanding
        client
            .store()
            .lock()
            .unwrap()
            .update_content(&first, "typed during flight")
            .unwrap();
        assert_eq!(client.save().await.unwrap(), SaveOutcome::AlreadyInFlight);

        drop(gate);
        assert!(matches!(
            pending.await.unwrap().unwrap(),
            SaveOutcome::Synced { .. }
        ));

        // The edit survived the first flight and goes out next
        assert!(client.has_pending_changes());
        client.save().await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].batch.mutations.update.get(&first).unwrap().content,
            "typed during flight"
        );
    }

    #[tokio::test]
    async fn test_rejection_keeps_changes_pending() {
        let (client, transport, first) = setup();
        transport.fail_with(SyncError::Rejected(SyncErrorKind::RootNodeEmpty));

        let err = client.save().await.unwrap_err();

        assert_eq!(err, SyncError::Rejected(SyncErrorKind::RootNodeEmpty));
        assert_eq!(client.last_error(), Some(err));
        assert!(client.has_pending_changes());
        assert!(!client.is_saving());

        let pending = client.store().lock().unwrap().pending_mutations();
        assert!(pending.insert.contains(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_aborts_flight() {
        let (client, transport, _) = setup();
        let _gate = transport.gate.lock().await;

        let err = client.save().await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert!(err.is_retryable());
        assert!(client.has_pending_changes());
        assert!(!client.store().lock().unwrap().is_syncing());
    }

    #[tokio::test]
    async fn test_detached_client_does_not_save() {
        let (client, transport, _) = setup();
        client.detach();

        assert_eq!(client.save().await.unwrap(), SaveOutcome::Detached);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_late_response_after_detach_is_discarded() {
        let (client, transport, _) = setup();
        let gate = transport.gate.lock().await;

        let background = Arc::clone(&client);
        let pending = tokio::spawn(async move { background.save().await });
        while transport.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        client.detach();
        drop(gate);

        assert_eq!(pending.await.unwrap(), Err(SyncError::Detached));
        assert!(client.last_synced_at().is_none());

        // The store is free for the next client and still holds the batch
        let store = client.store().clone();
        assert!(!store.lock().unwrap().is_syncing());
        assert!(store.lock().unwrap().has_pending_changes());

        let successor = SyncClient::new("doc-1", store, transport.clone(), SyncConfig::default());
        assert!(matches!(
            successor.save().await.unwrap(),
            SaveOutcome::Synced { mutation_count: 1, .. }
        ));
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_flight_held_by_another_client_is_not_nothing_to_sync() {
        let (client, transport, first) = setup();
        let other = SyncClient::new(
            "doc-1",
            client.store().clone(),
            transport.clone(),
            SyncConfig::default(),
        );
        let gate = transport.gate.lock().await;

        let background = Arc::clone(&client);
        let pending = tokio::spawn(async move { background.save().await });
        while transport.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        other
            .store()
            .lock()
            .unwrap()
            .update_content(&first, "second client")
            .unwrap();
        assert_eq!(other.save().await.unwrap(), SaveOutcome::AlreadyInFlight);
        assert!(other.has_pending_changes());

        drop(gate);
        pending.await.unwrap().unwrap();
        assert!(matches!(
            other.save().await.unwrap(),
            SaveOutcome::Synced { mutation_count: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_saver_fires_after_quiet_period() {
        let (client, transport, first) = setup();
        client.save().await.unwrap();

        let saver = client.spawn_idle_saver().unwrap();
        client
            .store()
            .lock()
            .unwrap()
            .update_content(&first, "a")
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.sent().len(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.sent().len(), 2);

        client.detach();
        saver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_saver_does_not_retry_rejection() {
        let (client, transport, first) = setup();
        transport.fail_with(SyncError::Rejected(SyncErrorKind::CycleDetected));

        let saver = client.spawn_idle_saver().unwrap();
        client
            .store()
            .lock()
            .unwrap()
            .toggle_completed(&first)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.sent().len(), 1);
        assert!(client.has_pending_changes());

        client.detach();
        saver.await.unwrap();
    }

    #[tokio::test]
    async fn test_focus_memory_restores_surviving_node() {
        let (client, _, first) = setup();
        let second = client
            .store()
            .lock()
            .unwrap()
            .add(ROOT_ID, Some(&first))
            .unwrap();

        let mut memory = FocusMemory::new();
        assert_eq!(client.restore_focus(&memory).unwrap(), Some(first.clone()));

        client.remember_focus(&mut memory, second.clone());
        assert_eq!(client.restore_focus(&memory).unwrap(), Some(second.clone()));

        client.store().lock().unwrap().delete(&second).unwrap();
        assert_eq!(client.restore_focus(&memory).unwrap(), Some(first));

        assert_eq!(memory.forget("doc-1"), Some(second));
    }
}
