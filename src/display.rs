use std::io::Write;

use anyhow::Result;
use tabwriter::TabWriter;

use crate::core::{Account, Transaction, UserProfile};
use crate::review::{empty_state, EmptyState, Tab};

pub fn tab_label(tab: Tab) -> &'static str {
    match tab {
        Tab::Review => "For Review",
        Tab::Matched => "Matched",
        Tab::Excluded => "Excluded",
    }
}

fn empty_message(state: EmptyState) -> &'static str {
    match state {
        EmptyState::AllCaughtUp => "You're all caught up! Nothing left to review.",
        EmptyState::NoMatches => "No matched transactions yet.",
        EmptyState::NoExclusions => "No excluded transactions.",
    }
}

pub fn print_tab<W: Write>(wr: W, tab: Tab, txns: &[&Transaction]) -> Result<()> {
    let mut tw = TabWriter::new(wr);
    writeln!(tw, "{} ({})", tab_label(tab), txns.len())?;

    if txns.is_empty() {
        writeln!(tw, "  {}", empty_message(empty_state(tab)))?;
        tw.flush()?;
        return Ok(());
    }

    writeln!(tw, "Date\tAmount\tPayee\tCategory\tConfidence\tID")?;
    for txn in txns {
        let date = txn
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let confidence = txn
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());

        writeln!(
            tw,
            "{}\t{:.2} {}\t{}\t{}\t{}\t{}",
            date,
            txn.amount,
            txn.currency,
            txn.effective_payee().unwrap_or("-"),
            txn.effective_category().unwrap_or("-"),
            confidence,
            txn.id,
        )?;
    }

    tw.flush()?;

    Ok(())
}

pub fn print_accounts<W: Write>(wr: W, accounts: &[Account], active: &[String]) -> Result<()> {
    let mut tw = TabWriter::new(wr);
    writeln!(tw, "Account\tAccount ID\tBalance\tActive")?;

    for account in accounts {
        let is_active = active.is_empty() || active.contains(&account.id);
        writeln!(
            tw,
            "{}\t{}\t{:.2} {}\t{}",
            account.name,
            account.id,
            account.balance,
            account.currency,
            if is_active { "yes" } else { "no" },
        )?;
    }

    tw.flush()?;

    Ok(())
}

pub fn print_detail<W: Write>(wr: W, txn: &Transaction) -> Result<()> {
    let mut tw = TabWriter::new(wr);

    writeln!(tw, "ID\t{}", txn.id)?;
    writeln!(tw, "Amount\t{:.2} {}", txn.amount, txn.currency)?;
    writeln!(tw, "Status\t{}", txn.status)?;
    if let Some(reason) = &txn.reasoning {
        writeln!(tw, "Reasoning\t{}", reason)?;
    }
    if let Some(note) = &txn.tax_deduction_note {
        writeln!(tw, "Tax note\t{}", note)?;
    }
    for tag in txn.display_suggested_tags() {
        writeln!(tw, "Suggested tag\t{}", tag)?;
    }
    if txn.is_split {
        for line in &txn.splits {
            writeln!(
                tw,
                "Split\t{}\t{:.2}\t{}",
                line.category_name, line.amount, line.description
            )?;
        }
    }
    if let Some(url) = &txn.receipt_url {
        writeln!(tw, "Receipt\t{}", url)?;
    }

    tw.flush()?;

    Ok(())
}

pub fn print_profile<W: Write>(wr: W, profile: &UserProfile) -> Result<()> {
    let mut tw = TabWriter::new(wr);

    writeln!(tw, "Email\t{}", profile.email)?;
    writeln!(
        tw,
        "Subscription\t{} ({})",
        profile.subscription_tier, profile.subscription_status
    )?;
    if let Some(days) = profile.days_remaining {
        writeln!(tw, "Trial days left\t{}", days)?;
    }
    writeln!(
        tw,
        "Tokens\t{} of {}",
        profile.token_balance, profile.monthly_token_allowance
    )?;

    tw.flush()?;

    Ok(())
}
