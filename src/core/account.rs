use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Flat reference entity used by the category picker. No hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subscription_tier: String,
    #[serde(default)]
    pub subscription_status: String,
    #[serde(default)]
    pub days_remaining: Option<i64>,
    #[serde(default)]
    pub token_balance: i64,
    #[serde(default)]
    pub monthly_token_allowance: i64,
    #[serde(default)]
    pub auto_accept_enabled: bool,
}

impl UserProfile {
    /// Tier-based cap on simultaneously active accounts.
    pub fn account_limit(&self) -> usize {
        match self.subscription_tier.as_str() {
            "pro" | "business" => 10,
            "starter" => 3,
            _ => 1,
        }
    }
}
