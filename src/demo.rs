//! Network-free backend used for unauthenticated evaluation. Serves a fixed
//! synthetic dataset and answers every call after a simulated delay.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::backend::{Backend, Result};
use crate::core::{
    Account, Split, Transaction, TransactionPatch, UserProfile, STATUS_NEEDS_REVIEW,
};

pub const DEMO_REALM: &str = "demo";

pub struct DemoBackend {
    delay: Duration,
    approved: Mutex<HashSet<String>>,
    patched: Mutex<Vec<(String, TransactionPatch)>>,
}

impl DemoBackend {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(600))
    }

    /// Zero delay for tests.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            approved: Mutex::new(HashSet::new()),
            patched: Mutex::new(vec![]),
        }
    }

    async fn simulate(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn seed_txn(
    id: &str,
    account_id: &str,
    amount: f64,
    date: &str,
    payee: &str,
    category: &str,
    confidence: f64,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        account_id: Some(account_id.to_string()),
        amount,
        currency: "USD".to_string(),
        date: day(date),
        transaction_type: "Purchase".to_string(),
        suggested_category_id: Some(format!("cat-{}", category.to_lowercase().replace(' ', "-"))),
        suggested_category_name: Some(category.to_string()),
        suggested_payee: Some(payee.to_string()),
        status: STATUS_NEEDS_REVIEW.to_string(),
        confidence: Some(confidence),
        reasoning: Some(format!("Recurring charge from {}.", payee)),
        ..Default::default()
    }
}

/// Six example transactions: four straightforward single-category items at
/// varying confidence, one low-confidence unknown, and one split.
pub fn seed_transactions() -> Vec<Transaction> {
    let mut txns = vec![
        seed_txn(
            "demo-txn-1",
            "demo-checking",
            -54.99,
            "2026-08-24",
            "Adobe",
            "Software & Subscriptions",
            0.97,
        ),
        seed_txn(
            "demo-txn-2",
            "demo-checking",
            -149.0,
            "2026-08-22",
            "Delta Air Lines",
            "Travel",
            0.93,
        ),
        seed_txn(
            "demo-txn-3",
            "demo-card",
            -23.45,
            "2026-08-21",
            "Chipotle",
            "Meals & Entertainment",
            0.88,
        ),
        seed_txn(
            "demo-txn-4",
            "demo-card",
            -12.0,
            "2026-08-19",
            "USPS",
            "Postage & Shipping",
            0.91,
        ),
        seed_txn(
            "demo-txn-5",
            "demo-checking",
            -87.13,
            "2026-08-18",
            "SQ *UNKNOWN VENDOR",
            "Office Supplies",
            0.41,
        ),
    ];

    let mut split = seed_txn(
        "demo-txn-6",
        "demo-card",
        -230.0,
        "2026-08-16",
        "Amazon",
        "Office Supplies",
        0.76,
    );
    split.is_split = true;
    split.splits = vec![
        Split {
            category_name: "Office Supplies".to_string(),
            amount: -180.0,
            description: "Monitor arm".to_string(),
        },
        Split {
            category_name: "Software & Subscriptions".to_string(),
            amount: -50.0,
            description: "Gift card".to_string(),
        },
    ];
    txns.push(split);

    txns
}

pub fn seed_accounts() -> Vec<Account> {
    vec![
        Account {
            id: "demo-checking".to_string(),
            name: "Demo Checking".to_string(),
            balance: 4312.77,
            currency: "USD".to_string(),
            is_active: true,
        },
        Account {
            id: "demo-card".to_string(),
            name: "Demo Credit Card".to_string(),
            balance: -612.45,
            currency: "USD".to_string(),
            is_active: true,
        },
    ]
}

#[async_trait]
impl Backend for DemoBackend {
    async fn authorize_url(&self, _user_id: &str) -> Result<String> {
        Ok("https://example.com/demo-authorize".to_string())
    }

    async fn exchange_code(&self, _code: &str, _state: &str, _realm_id: &str) -> Result<()> {
        Ok(())
    }

    async fn accounts(&self, _realm_id: &str) -> Result<Vec<Account>> {
        self.simulate().await;
        Ok(seed_accounts())
    }

    async fn transactions(
        &self,
        _realm_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<Transaction>> {
        self.simulate().await;

        let approved = self.approved.lock().unwrap().clone();
        let patched = self.patched.lock().unwrap().clone();

        Ok(seed_transactions()
            .into_iter()
            .filter(|t| !approved.contains(&t.id))
            .filter(|t| {
                account_ids.is_empty()
                    || t.account_id
                        .as_ref()
                        .map(|id| account_ids.contains(id))
                        .unwrap_or(false)
            })
            .map(|mut t| {
                for (id, patch) in &patched {
                    if *id == t.id {
                        patch.apply(&mut t);
                    }
                }
                t
            })
            .collect())
    }

    async fn trigger_sync(&self, _realm_id: &str) -> Result<()> {
        self.simulate().await;
        Ok(())
    }

    async fn approve(&self, _realm_id: &str, txn_id: &str) -> Result<()> {
        self.simulate().await;
        self.approved.lock().unwrap().insert(txn_id.to_string());
        Ok(())
    }

    async fn bulk_approve(&self, _realm_id: &str, txn_ids: &[String]) -> Result<()> {
        self.simulate().await;
        let mut approved = self.approved.lock().unwrap();
        for id in txn_ids {
            approved.insert(id.clone());
        }
        Ok(())
    }

    async fn upload_receipt(
        &self,
        _realm_id: &str,
        _txn_id: &str,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<()> {
        self.simulate().await;
        Ok(())
    }

    async fn update_transaction(
        &self,
        _realm_id: &str,
        txn_id: &str,
        patch: &TransactionPatch,
    ) -> Result<()> {
        self.simulate().await;
        self.patched
            .lock()
            .unwrap()
            .push((txn_id.to_string(), patch.clone()));
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile> {
        Ok(UserProfile {
            id: user_id.to_string(),
            email: "demo@example.com".to_string(),
            subscription_tier: "trial".to_string(),
            subscription_status: "trialing".to_string(),
            days_remaining: Some(14),
            token_balance: 250,
            monthly_token_allowance: 500,
            auto_accept_enabled: false,
        })
    }
}

pub(crate) async fn run(
    matches: &clap::ArgMatches,
    settings: crate::settings::Settings,
) -> anyhow::Result<()> {
    use crate::review::{self, Tab};
    use crate::session::FileSession;
    use crate::workspace::Workspace;

    let store = FileSession::open(settings.session_file.clone().into())?;
    let mut ws = Workspace::new(DemoBackend::new(), store)?;

    if matches.subcommand_matches("off").is_some() {
        ws.reset()?;
        println!("Demo mode disabled.");
        return Ok(());
    }

    ws.enable_demo()?;
    ws.refresh_accounts().await?;
    ws.refresh_transactions().await?;

    println!("Demo mode enabled with {} sample transactions.\n", ws.transactions().len());

    let (review_tab, matched, excluded) = review::partition(ws.transactions(), &[]);
    for (tab, rows) in Tab::all().into_iter().zip([review_tab, matched, excluded]) {
        crate::display::print_tab(std::io::stdout(), tab, &rows)?;
        println!();
    }

    Ok(())
}
