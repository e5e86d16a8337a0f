use crate::core::{Transaction, BULK_APPROVE_THRESHOLD, STATUS_NEEDS_REVIEW};

/// The three dashboard tabs. Every transaction in the filtered base list
/// lands in exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Review,
    Matched,
    Excluded,
}

impl Tab {
    pub fn all() -> [Tab; 3] {
        [Tab::Review, Tab::Matched, Tab::Excluded]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
    Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub dir: SortDir,
}

impl Default for Sort {
    fn default() -> Self {
        Sort {
            key: SortKey::Date,
            dir: SortDir::Desc,
        }
    }
}

impl Sort {
    /// Re-selecting the active key flips direction; switching keys resets
    /// to descending.
    pub fn toggle(self, key: SortKey) -> Sort {
        if self.key == key {
            let dir = match self.dir {
                SortDir::Asc => SortDir::Desc,
                SortDir::Desc => SortDir::Asc,
            };
            return Sort { key, dir };
        }

        Sort {
            key,
            dir: SortDir::Desc,
        }
    }
}

/// Assigns a transaction to its tab. Exclusion wins over everything;
/// matched (QBO-linked or approved) wins over review.
pub fn classify(txn: &Transaction) -> Tab {
    if txn.is_excluded {
        return Tab::Excluded;
    }

    if txn.is_matched() {
        return Tab::Matched;
    }

    Tab::Review
}

/// Narrows the base list by the account allow-list, then partitions into
/// the three tabs. Input order is preserved within each bucket.
pub fn partition<'a>(
    txns: &'a [Transaction],
    account_filter: &[String],
) -> (Vec<&'a Transaction>, Vec<&'a Transaction>, Vec<&'a Transaction>) {
    let mut review = vec![];
    let mut matched = vec![];
    let mut excluded = vec![];

    for txn in txns.iter().filter(|t| in_filter(t, account_filter)) {
        match classify(txn) {
            Tab::Review => review.push(txn),
            Tab::Matched => matched.push(txn),
            Tab::Excluded => excluded.push(txn),
        }
    }

    (review, matched, excluded)
}

fn in_filter(txn: &Transaction, account_filter: &[String]) -> bool {
    if account_filter.is_empty() {
        return true;
    }

    txn.account_id
        .as_ref()
        .map(|id| account_filter.contains(id))
        .unwrap_or(false)
}

/// Stable sort for the active tab. Missing dates sort before any real date;
/// missing confidence compares as 0.
pub fn sort_tab(txns: &mut [&Transaction], sort: Sort) {
    match sort.key {
        SortKey::Date => txns.sort_by_key(|t| t.date),
        SortKey::Confidence => {
            txns.sort_by(|a, b| {
                a.confidence_or_zero()
                    .partial_cmp(&b.confidence_or_zero())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    if sort.dir == SortDir::Desc {
        txns.reverse();
    }
}

/// Bulk-approve eligibility. Deliberately a different predicate from the
/// review-tab partition: it reads confidence and the pending-review status
/// marker, not the matched/excluded flags, so an eligible transaction can
/// sit outside the review tab and vice versa.
pub fn bulk_eligible(txn: &Transaction) -> bool {
    txn.confidence_or_zero() > BULK_APPROVE_THRESHOLD && txn.status == STATUS_NEEDS_REVIEW
}

pub fn bulk_eligible_ids(txns: &[Transaction]) -> Vec<String> {
    txns.iter()
        .filter(|t| bulk_eligible(t))
        .map(|t| t.id.clone())
        .collect()
}

/// Distinct empty state per tab when its partition is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// Review queue cleared. Worth celebrating.
    AllCaughtUp,
    /// Nothing matched yet.
    NoMatches,
    /// Nothing excluded.
    NoExclusions,
}

pub fn empty_state(tab: Tab) -> EmptyState {
    match tab {
        Tab::Review => EmptyState::AllCaughtUp,
        Tab::Matched => EmptyState::NoMatches,
        Tab::Excluded => EmptyState::NoExclusions,
    }
}
