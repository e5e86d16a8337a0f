use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::Deserialize;

use super::{AuthorizeResponse, Backend, Error, Result};
use crate::core::{Account, Transaction, TransactionPatch, UserProfile};

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// reqwest client for the versioned backend API. Paths and parameter names
/// follow the server's route table; every data call is scoped by realm.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        // A trailing slash keeps Url::join from eating the version segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self {
            base_url: Url::parse(&normalized)?,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

async fn into_error(res: Response) -> Error {
    let status = res.status().as_u16();
    let message = res
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| "unknown error".to_string());

    Error::Status { status, message }
}

async fn expect_ok(res: Response) -> Result<()> {
    if res.status().is_success() {
        return Ok(());
    }

    Err(into_error(res).await)
}

async fn decode<T: serde::de::DeserializeOwned>(res: Response) -> Result<T> {
    if !res.status().is_success() {
        return Err(into_error(res).await);
    }

    Ok(res.json::<T>().await?)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn authorize_url(&self, user_id: &str) -> Result<String> {
        let res = self
            .http
            .get(self.endpoint("qbo/authorize")?)
            .query(&[("user_id", user_id)])
            .send()
            .await?;

        Ok(decode::<AuthorizeResponse>(res).await?.auth_url)
    }

    async fn exchange_code(&self, code: &str, state: &str, realm_id: &str) -> Result<()> {
        let res = self
            .http
            .get(self.endpoint("qbo/callback")?)
            .query(&[("code", code), ("state", state), ("realmId", realm_id)])
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn accounts(&self, realm_id: &str) -> Result<Vec<Account>> {
        let res = self
            .http
            .get(self.endpoint("accounts/")?)
            .query(&[("realm_id", realm_id)])
            .send()
            .await?;

        decode(res).await
    }

    async fn transactions(
        &self,
        realm_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<Transaction>> {
        let mut req = self
            .http
            .get(self.endpoint("transactions/")?)
            .query(&[("realm_id", realm_id)]);

        if !account_ids.is_empty() {
            req = req.query(&[("account_ids", account_ids.join(","))]);
        }

        decode(req.send().await?).await
    }

    async fn trigger_sync(&self, realm_id: &str) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("transactions/sync")?)
            .query(&[("realm_id", realm_id)])
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn approve(&self, realm_id: &str, txn_id: &str) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint(&format!("transactions/{}/approve", txn_id))?)
            .query(&[("realm_id", realm_id)])
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn bulk_approve(&self, realm_id: &str, txn_ids: &[String]) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("transactions/bulk-approve")?)
            .query(&[("realm_id", realm_id)])
            .json(txn_ids)
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn upload_receipt(
        &self,
        realm_id: &str,
        txn_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let form = Form::new()
            .text("transaction_id", txn_id.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let res = self
            .http
            .post(self.endpoint("transactions/upload-receipt")?)
            .query(&[("realm_id", realm_id)])
            .multipart(form)
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn update_transaction(
        &self,
        realm_id: &str,
        txn_id: &str,
        patch: &TransactionPatch,
    ) -> Result<()> {
        let res = self
            .http
            .put(self.endpoint(&format!("transactions/{}", txn_id))?)
            .query(&[("realm_id", realm_id)])
            .json(patch)
            .send()
            .await?;

        expect_ok(res).await
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile> {
        let res = self
            .http
            .get(self.endpoint(&format!("users/{}", user_id))?)
            .send()
            .await?;

        decode(res).await
    }
}

// The link server defers the backend leg of the connect flow to us.
#[async_trait]
impl qbo_link::Authorizer for HttpBackend {
    async fn authorize_url(&self, user_id: &str) -> anyhow::Result<String> {
        Ok(<Self as Backend>::authorize_url(self, user_id).await?)
    }

    async fn exchange(&self, code: &str, state: &str, realm_id: &str) -> anyhow::Result<()> {
        Ok(self.exchange_code(code, state, realm_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_preserves_base_path() {
        let backend = HttpBackend::new("http://localhost:8000/api/v1").unwrap();
        let url = backend.endpoint("transactions/sync").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/transactions/sync");
    }
}
