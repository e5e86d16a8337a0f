use chrono::naive::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status value the backend sets once the user has confirmed a match.
pub const STATUS_APPROVED: &str = "approved";
/// Status value marking an unresolved item eligible for bulk approval.
pub const STATUS_NEEDS_REVIEW: &str = "NEEDS_REVIEW";

/// Confidence strictly above which a pending item qualifies for bulk approval.
pub const BULK_APPROVE_THRESHOLD: f64 = 0.9;

/// One line of a split transaction. Amounts across all lines must sum to the
/// parent transaction's amount; the split editor enforces that before save,
/// not the state container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub category_name: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub transaction_type: String,

    // AI-proposed classification, advisory until the user confirms.
    pub suggested_category_id: Option<String>,
    pub suggested_category_name: Option<String>,
    pub suggested_payee: Option<String>,
    // User-confirmed classification, authoritative once set.
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub payee: Option<String>,

    // Free-form state string; STATUS_APPROVED and STATUS_NEEDS_REVIEW are
    // the two values this client gives meaning to.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_qbo_matched: bool,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub forced_review: bool,

    pub confidence: Option<f64>,

    // Explainability strings from the categorizer. Display only, never parsed.
    pub reasoning: Option<String>,
    pub vendor_reasoning: Option<String>,
    pub category_reasoning: Option<String>,
    pub note_reasoning: Option<String>,
    pub tax_deduction_note: Option<String>,

    #[serde(default)]
    pub is_split: bool,
    #[serde(default)]
    pub splits: Vec<Split>,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub suggested_tags: Vec<String>,
    pub note: Option<String>,

    pub receipt_url: Option<String>,
}

impl Transaction {
    /// True once the system of record shows this transaction reconciled,
    /// either through a QBO-side link or an explicit user approval.
    pub fn is_matched(&self) -> bool {
        self.is_qbo_matched || self.status == STATUS_APPROVED
    }

    pub fn confidence_or_zero(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }

    /// Suggested tags not already confirmed, for display.
    pub fn display_suggested_tags(&self) -> Vec<&str> {
        self.suggested_tags
            .iter()
            .filter(|t| !self.tags.iter().any(|c| c == *t))
            .map(String::as_str)
            .collect()
    }

    /// Category to show, preferring the confirmed value over the suggestion.
    pub fn effective_category(&self) -> Option<&str> {
        self.category_name
            .as_deref()
            .or(self.suggested_category_name.as_deref())
    }

    pub fn effective_payee(&self) -> Option<&str> {
        self.payee.as_deref().or(self.suggested_payee.as_deref())
    }
}

/// Field-level edits the inline editors produce. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splits: Option<Vec<Split>>,
}

impl TransactionPatch {
    pub fn apply(&self, txn: &mut Transaction) {
        if let Some(id) = &self.category_id {
            txn.category_id = Some(id.clone());
        }
        if let Some(name) = &self.category_name {
            txn.category_name = Some(name.clone());
        }
        if let Some(payee) = &self.payee {
            txn.payee = Some(payee.clone());
        }
        if let Some(note) = &self.note {
            txn.note = Some(note.clone());
        }
        if let Some(tags) = &self.tags {
            txn.tags = tags.clone();
        }
        if let Some(splits) = &self.splits {
            txn.is_split = !splits.is_empty();
            txn.splits = splits.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_by_link_or_approval() {
        let mut txn = Transaction {
            is_qbo_matched: true,
            ..Default::default()
        };
        assert!(txn.is_matched());

        txn.is_qbo_matched = false;
        txn.status = STATUS_APPROVED.to_string();
        assert!(txn.is_matched());

        txn.status = STATUS_NEEDS_REVIEW.to_string();
        assert!(!txn.is_matched());
    }

    #[test]
    fn suggested_tags_exclude_confirmed() {
        let txn = Transaction {
            tags: vec!["travel".to_string()],
            suggested_tags: vec!["travel".to_string(), "client".to_string()],
            ..Default::default()
        };
        assert_eq!(txn.display_suggested_tags(), vec!["client"]);
    }

    #[test]
    fn patch_preserves_untouched_fields() {
        let mut txn = Transaction {
            payee: Some("Acme".to_string()),
            ..Default::default()
        };
        let patch = TransactionPatch {
            category_name: Some("Software".to_string()),
            ..Default::default()
        };
        patch.apply(&mut txn);

        assert_eq!(txn.category_name.as_deref(), Some("Software"));
        assert_eq!(txn.payee.as_deref(), Some("Acme"));
    }
}
