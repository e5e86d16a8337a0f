pub mod http;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::core::{Account, Transaction, TransactionPatch, UserProfile};

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Deserialize)]
pub struct AuthorizeResponse {
    pub auth_url: String,
}

/// The remote transaction store. All reads and writes against the product
/// backend go through this trait; the demo dataset and the scripted test
/// doubles implement it without touching the network.
#[async_trait]
pub trait Backend {
    /// Returns the URL the user must visit to authorize a QuickBooks realm.
    async fn authorize_url(&self, user_id: &str) -> Result<String>;

    /// Exchanges the authorization code from the OAuth redirect. One-shot.
    async fn exchange_code(&self, code: &str, state: &str, realm_id: &str) -> Result<()>;

    async fn accounts(&self, realm_id: &str) -> Result<Vec<Account>>;

    /// Lists transactions for the realm, optionally narrowed to the given
    /// account ids (comma-joined on the wire; empty slice means all).
    async fn transactions(&self, realm_id: &str, account_ids: &[String])
        -> Result<Vec<Transaction>>;

    /// Kicks off a backend-side re-pull from QuickBooks. Fire-and-forget
    /// from the client's point of view; completion is observed by polling
    /// `transactions`.
    async fn trigger_sync(&self, realm_id: &str) -> Result<()>;

    async fn approve(&self, realm_id: &str, txn_id: &str) -> Result<()>;

    async fn bulk_approve(&self, realm_id: &str, txn_ids: &[String]) -> Result<()>;

    /// Multipart upload of a receipt image. Server-side processing may alter
    /// suggested fields, so callers re-fetch rather than merge.
    async fn upload_receipt(
        &self,
        realm_id: &str,
        txn_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;

    /// Mirrors a field-level edit to the system of record.
    async fn update_transaction(
        &self,
        realm_id: &str,
        txn_id: &str,
        patch: &TransactionPatch,
    ) -> Result<()>;

    async fn user(&self, user_id: &str) -> Result<UserProfile>;
}
