mod account;
mod txn;

pub use account::{Account, Category, UserProfile, Vendor};
pub use txn::{
    Split, Transaction, TransactionPatch, BULK_APPROVE_THRESHOLD, STATUS_APPROVED,
    STATUS_NEEDS_REVIEW,
};
