//! The client-side state container for one realm's reconciliation session.
//! Owns the in-memory transaction and account lists, mediates every call to
//! the remote store, and keeps local state consistent under partial failure.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::core::{Account, Transaction, TransactionPatch, UserProfile};
use crate::demo::DEMO_REALM;
use crate::session::{Session, SessionStore};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] crate::backend::Error),
    #[error("session storage failed: {0}")]
    Session(#[from] anyhow::Error),
    #[error("no realm connected; run the link flow or enable demo mode")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Capability port for device feedback on a confirmed match. The CLI and
/// tests run with the no-op implementation.
pub trait HapticPort {
    fn success(&self);
}

pub struct NoopHaptics;

impl HapticPort for NoopHaptics {
    fn success(&self) {}
}

pub struct Workspace<B, S> {
    backend: B,
    store: S,
    session: Session,
    haptics: Box<dyn HapticPort + Send + Sync>,

    transactions: Vec<Transaction>,
    accounts: Vec<Account>,
    profile: Option<UserProfile>,
}

impl<B: Backend, S: SessionStore> Workspace<B, S> {
    pub fn new(backend: B, mut store: S) -> Result<Self> {
        let session = store.load()?;

        Ok(Self {
            backend,
            store,
            session,
            haptics: Box::new(NoopHaptics),
            transactions: vec![],
            accounts: vec![],
            profile: None,
        })
    }

    pub fn with_haptics(mut self, haptics: Box<dyn HapticPort + Send + Sync>) -> Self {
        self.haptics = haptics;
        self
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_demo(&self) -> bool {
        self.session.demo
    }

    pub fn realm(&self) -> Result<String> {
        if self.session.demo {
            return Ok(DEMO_REALM.to_string());
        }

        self.session.realm_id.clone().ok_or(Error::NotConnected)
    }

    /// Requests the authorization URL for the user. The caller is
    /// responsible for sending the user there.
    pub async fn connect(&self, user_id: &str) -> Result<String> {
        Ok(self.backend.authorize_url(user_id).await?)
    }

    /// Completes the OAuth return leg. Idempotent: a repeat invocation for
    /// an already-connected realm is a no-op returning `false`, so redirect
    /// handling cannot double-exchange the code.
    pub async fn handle_callback(&mut self, code: &str, state: &str, realm: &str) -> Result<bool> {
        if self.session.realm_id.as_deref() == Some(realm) {
            return Ok(false);
        }

        self.backend.exchange_code(code, state, realm).await?;

        self.complete_link(realm).await
    }

    /// Adopts a realm whose code exchange already happened elsewhere (the
    /// link server does it inside the redirect handler): persists the
    /// connection and pulls the initial account and transaction state.
    pub async fn complete_link(&mut self, realm: &str) -> Result<bool> {
        if self.session.realm_id.as_deref() == Some(realm) {
            return Ok(false);
        }

        self.session.realm_id = Some(realm.to_string());
        self.session.demo = false;
        self.session.new_connection = true;
        self.store.save(&self.session)?;

        info!(realm, "realm connected");

        self.refresh_accounts().await?;
        self.refresh_transactions().await?;

        Ok(true)
    }

    /// Switches to the network-free demo dataset and persists the flag so
    /// it survives restart.
    pub fn enable_demo(&mut self) -> Result<()> {
        self.session.demo = true;
        self.session.new_connection = false;
        self.store.save(&self.session)?;

        Ok(())
    }

    /// Clears the locally stored connection. Local only; nothing is
    /// disconnected server-side.
    pub fn reset(&mut self) -> Result<()> {
        self.session = Session::default();
        self.store.save(&self.session)?;
        self.transactions.clear();
        self.accounts.clear();

        Ok(())
    }

    pub fn set_account_filter(&mut self, account_ids: Vec<String>) -> Result<()> {
        self.session.active_account_ids = account_ids;
        self.session.new_connection = false;
        self.store.save(&self.session)?;

        Ok(())
    }

    pub async fn load_profile(&mut self, user_id: &str) {
        // Read path: a failed or partial fetch keeps the prior value.
        match self.backend.user(user_id).await {
            Ok(profile) => self.profile = Some(profile),
            Err(err) => warn!(%err, "profile fetch failed, keeping last known state"),
        }
    }

    pub async fn refresh_accounts(&mut self) -> Result<()> {
        let realm = self.realm()?;
        let accounts = self.backend.accounts(&realm).await?;
        if self.realm()? == realm {
            self.accounts = accounts;
        }

        Ok(())
    }

    pub async fn refresh_transactions(&mut self) -> Result<()> {
        let realm = self.realm()?;
        let filter = self.session.active_account_ids.clone();
        let transactions = self.backend.transactions(&realm, &filter).await?;
        self.apply_fetched(&realm, transactions);

        Ok(())
    }

    /// Replaces the in-memory list wholesale, unless the active realm has
    /// changed since the fetch was issued. A late response for a stale
    /// realm must not overwrite the new realm's state.
    fn apply_fetched(&mut self, fetched_realm: &str, transactions: Vec<Transaction>) {
        match self.realm() {
            Ok(current) if current == fetched_realm => self.transactions = transactions,
            _ => warn!(
                fetched_realm,
                "ignoring transaction fetch for inactive realm"
            ),
        }
    }

    /// Triggers a backend re-pull, then polls the transaction list until it
    /// changes or the attempt budget runs out. Returns whether fresh data
    /// was observed. The caller owns the "syncing" presentation for the
    /// bounded window this runs in.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&mut self, max_polls: u32, interval: Duration) -> Result<bool> {
        let realm = self.realm()?;
        let before = fingerprint(&self.transactions);

        self.backend.trigger_sync(&realm).await?;
        info!(realm, "sync triggered");

        for _ in 0..max_polls {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            self.refresh_transactions().await?;
            if fingerprint(&self.transactions) != before {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Confirms one match. The local removal only happens once the remote
    /// call has succeeded, so a failure leaves the list untouched. Calling
    /// this again for an id already gone is a no-op returning `false`.
    pub async fn approve(&mut self, txn_id: &str) -> Result<bool> {
        if !self.transactions.iter().any(|t| t.id == txn_id) {
            return Ok(false);
        }

        let realm = self.realm()?;
        self.backend.approve(&realm, txn_id).await?;

        self.transactions.retain(|t| t.id != txn_id);
        self.haptics.success();
        info!(txn_id, "match approved");

        Ok(true)
    }

    /// Batch form of `approve`. Eligibility is the caller's business; this
    /// is a dumb batch operation. Returns how many entries left the list.
    pub async fn bulk_approve(&mut self, txn_ids: &[String]) -> Result<usize> {
        if txn_ids.is_empty() {
            return Ok(0);
        }

        let realm = self.realm()?;
        self.backend.bulk_approve(&realm, txn_ids).await?;

        let before = self.transactions.len();
        self.transactions.retain(|t| !txn_ids.contains(&t.id));
        let removed = before - self.transactions.len();

        if removed > 0 {
            self.haptics.success();
        }
        info!(removed, "bulk approval applied");

        Ok(removed)
    }

    /// Uploads a receipt, then re-fetches the whole list rather than
    /// merging: server-side receipt processing may rewrite suggestions.
    pub async fn upload_receipt(
        &mut self,
        txn_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let realm = self.realm()?;
        self.backend
            .upload_receipt(&realm, txn_id, file_name, bytes)
            .await?;

        self.refresh_transactions().await
    }

    /// Optimistic field edit: the local copy updates first, the change is
    /// mirrored to the backend, and a failed mirror rolls the local copy
    /// back so the list never drifts from the system of record.
    pub async fn update_transaction(
        &mut self,
        txn_id: &str,
        patch: TransactionPatch,
    ) -> Result<()> {
        let realm = self.realm()?;
        let index = match self.transactions.iter().position(|t| t.id == txn_id) {
            Some(i) => i,
            None => return Ok(()),
        };

        let snapshot = self.transactions[index].clone();
        patch.apply(&mut self.transactions[index]);

        if let Err(err) = self.backend.update_transaction(&realm, txn_id, &patch).await {
            self.transactions[index] = snapshot;
            return Err(err.into());
        }

        Ok(())
    }
}

fn fingerprint(txns: &[Transaction]) -> Vec<(String, String, bool)> {
    let mut keys: Vec<(String, String, bool)> = txns
        .iter()
        .map(|t| (t.id.clone(), t.status.clone(), t.is_qbo_matched))
        .collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{self, Backend};
    use crate::core::{STATUS_APPROVED, STATUS_NEEDS_REVIEW};
    use crate::demo::DemoBackend;
    use crate::review;
    use crate::session::MemorySession;

    /// Scripted remote store: records every call, serves a configurable
    /// list, and fails on demand.
    #[derive(Default)]
    struct ScriptBackend {
        calls: Mutex<Vec<String>>,
        txns: Mutex<Vec<Transaction>>,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl ScriptBackend {
        fn with_txns(txns: Vec<Transaction>) -> Self {
            Self {
                txns: Mutex::new(txns),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) -> backend::Result<()> {
            self.calls.lock().unwrap().push(call.to_string());

            let failed = match call {
                "accounts" | "transactions" | "user" => self.fail_reads,
                _ => self.fail_writes,
            };
            if failed {
                return Err(backend::Error::Status {
                    status: 500,
                    message: "scripted failure".to_string(),
                });
            }

            Ok(())
        }
    }

    #[async_trait]
    impl<'a> Backend for &'a ScriptBackend {
        async fn authorize_url(&self, _user_id: &str) -> backend::Result<String> {
            self.record("authorize_url")?;
            Ok("https://example.com/authorize".to_string())
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _state: &str,
            _realm_id: &str,
        ) -> backend::Result<()> {
            self.record("exchange_code")
        }

        async fn accounts(&self, _realm_id: &str) -> backend::Result<Vec<Account>> {
            self.record("accounts")?;
            Ok(vec![])
        }

        async fn transactions(
            &self,
            _realm_id: &str,
            _account_ids: &[String],
        ) -> backend::Result<Vec<Transaction>> {
            self.record("transactions")?;
            Ok(self.txns.lock().unwrap().clone())
        }

        async fn trigger_sync(&self, _realm_id: &str) -> backend::Result<()> {
            self.record("trigger_sync")?;
            // Simulate the backend finishing its pull: flag the first
            // pending transaction as reconciled.
            if let Some(t) = self
                .txns
                .lock()
                .unwrap()
                .iter_mut()
                .find(|t| !t.is_qbo_matched)
            {
                t.is_qbo_matched = true;
            }
            Ok(())
        }

        async fn approve(&self, _realm_id: &str, _txn_id: &str) -> backend::Result<()> {
            self.record("approve")
        }

        async fn bulk_approve(
            &self,
            _realm_id: &str,
            _txn_ids: &[String],
        ) -> backend::Result<()> {
            self.record("bulk_approve")
        }

        async fn upload_receipt(
            &self,
            _realm_id: &str,
            _txn_id: &str,
            _file_name: &str,
            _bytes: Vec<u8>,
        ) -> backend::Result<()> {
            self.record("upload_receipt")?;
            // Receipt processing rewrites a suggestion server-side.
            if let Some(t) = self.txns.lock().unwrap().first_mut() {
                t.suggested_payee = Some("From Receipt LLC".to_string());
            }
            Ok(())
        }

        async fn update_transaction(
            &self,
            _realm_id: &str,
            _txn_id: &str,
            _patch: &TransactionPatch,
        ) -> backend::Result<()> {
            self.record("update_transaction")
        }

        async fn user(&self, user_id: &str) -> backend::Result<UserProfile> {
            self.record("user")?;
            Ok(UserProfile {
                id: user_id.to_string(),
                ..Default::default()
            })
        }
    }

    struct CountingHaptics(Arc<AtomicUsize>);

    impl HapticPort for CountingHaptics {
        fn success(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pending_txn(id: &str, confidence: f64) -> Transaction {
        Transaction {
            id: id.to_string(),
            status: STATUS_NEEDS_REVIEW.to_string(),
            confidence: Some(confidence),
            ..Default::default()
        }
    }

    fn connected_store() -> MemorySession {
        let mut store = MemorySession::default();
        store
            .save(&Session {
                realm_id: Some("realm-a".to_string()),
                ..Default::default()
            })
            .unwrap();
        store
    }

    async fn workspace_with(
        backend: &ScriptBackend,
    ) -> Workspace<&ScriptBackend, MemorySession> {
        let mut ws = Workspace::new(backend, connected_store()).unwrap();
        ws.refresh_transactions().await.unwrap();
        ws
    }

    #[tokio::test]
    async fn approve_removes_only_on_confirmed_success() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend)
            .await
            .with_haptics(Box::new(CountingHaptics(ticks.clone())));

        assert!(ws.approve("t1").await.unwrap());
        assert!(ws.transactions().is_empty());
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn approve_failure_leaves_list_untouched() {
        let backend = ScriptBackend {
            fail_writes: true,
            ..ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)])
        };
        let mut ws = workspace_with(&backend).await;

        assert!(ws.approve("t1").await.is_err());
        assert_eq!(ws.transactions().len(), 1);
    }

    #[tokio::test]
    async fn repeat_approve_is_a_quiet_no_op() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend).await;

        assert!(ws.approve("t1").await.unwrap());
        assert!(!ws.approve("t1").await.unwrap());

        // The second call never reaches the backend.
        let approvals = ws
            .backend
            .calls()
            .iter()
            .filter(|c| *c == "approve")
            .count();
        assert_eq!(approvals, 1);
    }

    #[tokio::test]
    async fn bulk_approve_removes_batch() {
        let backend = ScriptBackend::with_txns(vec![
            pending_txn("t1", 0.95),
            pending_txn("t2", 0.92),
            pending_txn("t3", 0.4),
        ]);
        let mut ws = workspace_with(&backend).await;

        let removed = ws
            .bulk_approve(&["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ws.transactions().len(), 1);
        assert_eq!(ws.transactions()[0].id, "t3");
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_known_state() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let failing = ScriptBackend {
            fail_reads: true,
            ..Default::default()
        };
        let mut ws = workspace_with(&backend).await;
        assert_eq!(ws.transactions().len(), 1);

        ws.backend = &failing;

        assert!(ws.refresh_transactions().await.is_err());
        assert_eq!(ws.transactions().len(), 1);
    }

    #[tokio::test]
    async fn stale_realm_fetch_is_ignored() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend).await;

        // A response for the old realm arrives after a switch to realm-b.
        ws.session.realm_id = Some("realm-b".to_string());
        ws.apply_fetched("realm-a", vec![]);

        assert_eq!(ws.transactions().len(), 1);

        ws.apply_fetched("realm-b", vec![]);
        assert!(ws.transactions().is_empty());
    }

    #[tokio::test]
    async fn update_rolls_back_on_mirror_failure() {
        let backend = ScriptBackend {
            fail_writes: true,
            ..ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)])
        };
        let mut ws = workspace_with(&backend).await;

        let patch = TransactionPatch {
            category_name: Some("Travel".to_string()),
            ..Default::default()
        };
        assert!(ws.update_transaction("t1", patch).await.is_err());
        assert!(ws.transactions()[0].category_name.is_none());
    }

    #[tokio::test]
    async fn update_applies_optimistically_on_success() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend).await;

        let patch = TransactionPatch {
            category_name: Some("Travel".to_string()),
            ..Default::default()
        };
        ws.update_transaction("t1", patch).await.unwrap();
        assert_eq!(
            ws.transactions()[0].category_name.as_deref(),
            Some("Travel")
        );
    }

    #[tokio::test]
    async fn receipt_upload_refetches_instead_of_merging() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend).await;

        ws.upload_receipt("t1", "receipt.jpg", vec![0xFF])
            .await
            .unwrap();

        assert_eq!(
            ws.transactions()[0].suggested_payee.as_deref(),
            Some("From Receipt LLC")
        );
        let calls = backend.calls();
        assert!(calls.windows(2).any(|w| w == ["upload_receipt", "transactions"]));
    }

    #[tokio::test]
    async fn sync_polls_until_data_changes() {
        let backend = ScriptBackend::with_txns(vec![pending_txn("t1", 0.95)]);
        let mut ws = workspace_with(&backend).await;

        let changed = ws.sync(3, Duration::ZERO).await.unwrap();
        assert!(changed);
        assert!(ws.transactions()[0].is_qbo_matched);
    }

    #[tokio::test]
    async fn sync_gives_up_after_poll_budget() {
        let backend = ScriptBackend::with_txns(vec![]);
        let mut ws = workspace_with(&backend).await;

        let changed = ws.sync(2, Duration::ZERO).await.unwrap();
        assert!(!changed);

        let polls = ws
            .backend
            .calls()
            .iter()
            .filter(|c| *c == "transactions")
            .count();
        // Initial load plus the two bounded polls.
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn callback_handling_is_idempotent() {
        let backend = ScriptBackend::default();
        let mut ws = Workspace::new(&backend, MemorySession::default()).unwrap();

        assert!(ws.handle_callback("code", "state", "realm-a").await.unwrap());
        assert!(!ws.handle_callback("code", "state", "realm-a").await.unwrap());

        let exchanges = ws
            .backend
            .calls()
            .iter()
            .filter(|c| *c == "exchange_code")
            .count();
        assert_eq!(exchanges, 1);
        assert!(ws.session().new_connection);
    }

    #[tokio::test]
    async fn demo_mode_state_transitions_without_network() {
        // The demo backend owns every byte of data it serves; the workspace
        // goes nowhere else, so these transitions are network-free.
        let backend = DemoBackend::with_delay(Duration::ZERO);
        let mut ws = Workspace::new(backend, MemorySession::default()).unwrap();
        ws.enable_demo().unwrap();

        ws.refresh_transactions().await.unwrap();
        assert_eq!(ws.transactions().len(), 6);

        assert!(ws.approve("demo-txn-1").await.unwrap());
        assert_eq!(ws.transactions().len(), 5);

        let eligible = review::bulk_eligible_ids(ws.transactions());
        let removed = ws.bulk_approve(&eligible).await.unwrap();
        assert_eq!(removed, eligible.len());

        ws.sync(1, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn demo_flag_survives_reload() {
        let backend = DemoBackend::with_delay(Duration::ZERO);
        let mut store = MemorySession::default();
        let mut ws = Workspace::new(backend, &mut store).unwrap();
        ws.enable_demo().unwrap();
        drop(ws);

        let reopened = Workspace::new(DemoBackend::with_delay(Duration::ZERO), &mut store).unwrap();
        assert!(reopened.is_demo());
        assert_eq!(reopened.realm().unwrap(), DEMO_REALM);
    }

    #[tokio::test]
    async fn dashboard_scenario_end_to_end() {
        let mut tx1 = pending_txn("tx1", 0.95);
        tx1.date = chrono::NaiveDate::from_ymd_opt(2026, 8, 20);
        let mut tx2 = Transaction {
            id: "tx2".to_string(),
            is_qbo_matched: true,
            ..Default::default()
        };
        tx2.status = STATUS_APPROVED.to_string();
        let tx3 = Transaction {
            id: "tx3".to_string(),
            is_excluded: true,
            ..Default::default()
        };

        let backend = ScriptBackend::with_txns(vec![tx1, tx2, tx3]);
        let mut ws = workspace_with(&backend).await;

        let (review_tab, matched, excluded) = review::partition(ws.transactions(), &[]);
        assert_eq!(review_tab.len(), 1);
        assert_eq!(review_tab[0].id, "tx1");
        assert_eq!(matched.len(), 1);
        assert_eq!(excluded.len(), 1);

        let eligible = review::bulk_eligible_ids(ws.transactions());
        assert_eq!(eligible, vec!["tx1".to_string()]);

        ws.bulk_approve(&eligible).await.unwrap();

        let (review_tab, _, _) = review::partition(ws.transactions(), &[]);
        assert!(review_tab.is_empty());
        assert_eq!(
            review::empty_state(review::Tab::Review),
            review::EmptyState::AllCaughtUp
        );
    }
}
