use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use tracing::info;

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::core::{Category, Split, TransactionPatch, Vendor};
use crate::demo::DemoBackend;
use crate::display;
use crate::picker::{self, Named, SplitDraft};
use crate::review::{self, Sort, SortKey, Tab};
use crate::session::{FileSession, SessionStore};
use crate::settings::Settings;
use crate::workspace::Workspace;

const SYNC_POLLS: u32 = 10;
const SYNC_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) async fn run(matches: &ArgMatches, settings: Settings) -> Result<()> {
    let mut store = FileSession::open(settings.session_file.clone().into())?;
    let session = store.load()?;

    if session.demo {
        go(matches, Workspace::new(DemoBackend::new(), store)?).await
    } else {
        let backend = HttpBackend::new(&settings.api_url)?;
        go(matches, Workspace::new(backend, store)?).await
    }
}

async fn go<B: Backend>(
    matches: &ArgMatches,
    mut ws: Workspace<B, FileSession>,
) -> Result<()> {
    match matches.subcommand() {
        Some(("sync", _)) => sync(&mut ws).await,
        Some(("list", list_matches)) => list(&mut ws, list_matches).await,
        Some(("show", show_matches)) => show(&mut ws, show_matches).await,
        Some(("approve", approve_matches)) => approve(&mut ws, approve_matches).await,
        Some(("bulk-approve", _)) => bulk_approve(&mut ws).await,
        Some(("set-category", set_matches)) => set_category(&mut ws, set_matches).await,
        Some(("set-vendor", set_matches)) => set_vendor(&mut ws, set_matches).await,
        Some(("split", split_matches)) => split(&mut ws, split_matches).await,
        Some(("upload-receipt", upload_matches)) => upload_receipt(&mut ws, upload_matches).await,
        None => unreachable!("subcommand is required"),
        _ => unreachable!(),
    }
}

#[tracing::instrument(skip(ws))]
async fn sync<B: Backend>(ws: &mut Workspace<B, FileSession>) -> Result<()> {
    ws.refresh_transactions().await?;

    println!("Syncing...");
    let changed = ws.sync(SYNC_POLLS, SYNC_INTERVAL).await?;
    if changed {
        println!("Sync finished; {} transactions.", ws.transactions().len());
    } else {
        println!("No new data yet. Run `matchbook transactions list` to check again later.");
    }

    Ok(())
}

async fn list<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let tab = match matches.value_of("tab") {
        Some("matched") => Tab::Matched,
        Some("excluded") => Tab::Excluded,
        Some("review") | None => Tab::Review,
        Some(other) => return Err(anyhow!("unknown tab {}", other)),
    };

    let mut sort = Sort::default();
    if let Some(key) = matches.value_of("sort") {
        sort.key = match key {
            "date" => SortKey::Date,
            "confidence" => SortKey::Confidence,
            other => return Err(anyhow!("unknown sort key {}", other)),
        };
    }
    if matches.is_present("asc") {
        sort = sort.toggle(sort.key);
    }

    let filter = ws.session().active_account_ids.clone();
    let (review_tab, matched, excluded) = review::partition(ws.transactions(), &filter);
    let mut rows = match tab {
        Tab::Review => review_tab,
        Tab::Matched => matched,
        Tab::Excluded => excluded,
    };
    review::sort_tab(&mut rows, sort);

    display::print_tab(std::io::stdout(), tab, &rows)?;

    Ok(())
}

async fn show<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    // SAFETY: positional argument, clap enforces presence.
    let id = matches.value_of("txn_id").unwrap();
    let txn = ws
        .transactions()
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| anyhow!("no pending transaction with id {}", id))?;

    display::print_detail(std::io::stdout(), txn)?;

    Ok(())
}

async fn approve<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let id = matches.value_of("txn_id").unwrap();
    if ws.approve(id).await? {
        println!("Approved {}.", id);
    } else {
        println!("{} is not in the pending list; nothing to do.", id);
    }

    Ok(())
}

async fn bulk_approve<B: Backend>(ws: &mut Workspace<B, FileSession>) -> Result<()> {
    ws.refresh_transactions().await?;

    // Eligibility lives here, with the caller: high confidence and still
    // marked for review.
    let eligible = review::bulk_eligible_ids(ws.transactions());
    if eligible.is_empty() {
        println!("No transactions qualify for bulk approval.");
        return Ok(());
    }

    let removed = ws.bulk_approve(&eligible).await?;
    println!("Approved {} transactions.", removed);

    let filter = ws.session().active_account_ids.clone();
    let (review_tab, _, _) = review::partition(ws.transactions(), &filter);
    display::print_tab(std::io::stdout(), Tab::Review, &review_tab)?;

    Ok(())
}

/// Distinct category names seen across the pending list, as picker
/// candidates. The backend owns the full chart; this is the working set.
fn known_categories(ws: &Workspace<impl Backend, FileSession>) -> Vec<Category> {
    let mut by_name: BTreeMap<String, Category> = BTreeMap::new();

    for txn in ws.transactions() {
        for (id, name) in [
            (&txn.category_id, &txn.category_name),
            (&txn.suggested_category_id, &txn.suggested_category_name),
        ] {
            if let Some(name) = name {
                by_name.entry(name.clone()).or_insert_with(|| Category {
                    id: id.clone().unwrap_or_default(),
                    name: name.clone(),
                });
            }
        }
    }

    by_name.into_values().collect()
}

fn known_vendors(ws: &Workspace<impl Backend, FileSession>) -> Vec<Vendor> {
    let mut by_name: BTreeMap<String, Vendor> = BTreeMap::new();

    for txn in ws.transactions() {
        for name in [&txn.payee, &txn.suggested_payee].into_iter().flatten() {
            by_name.entry(name.clone()).or_insert_with(|| Vendor {
                id: String::new(),
                name: name.clone(),
            });
        }
    }

    by_name.into_values().collect()
}

/// Resolves a free-text name against the candidates the picker would show:
/// the top-ranked exact match wins, otherwise the raw query becomes a new
/// entity for the backend to create.
fn resolve<T: Named + Clone>(candidates: &[T], query: &str) -> (Option<T>, String) {
    let ranked = picker::rank(candidates, query);
    match ranked.first() {
        Some(best) if best.name().eq_ignore_ascii_case(query) => {
            (Some((*best).clone()), best.name().to_string())
        }
        _ => (None, query.to_string()),
    }
}

async fn set_category<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let id = matches.value_of("txn_id").unwrap();
    let query = matches.value_of("name").unwrap();

    let candidates = known_categories(ws);
    let (existing, name) = resolve(&candidates, query);

    let patch = TransactionPatch {
        category_id: existing.as_ref().map(|c| c.id.clone()).filter(|s| !s.is_empty()),
        category_name: Some(name.clone()),
        ..Default::default()
    };
    ws.update_transaction(id, patch).await?;

    if existing.is_some() {
        println!("Categorized {} as {}.", id, name);
    } else {
        println!("Categorized {} as new category {}.", id, name);
    }

    Ok(())
}

async fn set_vendor<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let id = matches.value_of("txn_id").unwrap();
    let query = matches.value_of("name").unwrap();

    let candidates = known_vendors(ws);
    let (_, name) = resolve(&candidates, query);

    let patch = TransactionPatch {
        payee: Some(name.clone()),
        ..Default::default()
    };
    ws.update_transaction(id, patch).await?;

    println!("Set vendor for {} to {}.", id, name);

    Ok(())
}

/// `--line "Category:amount[:description]"`, repeatable. The draft must
/// balance against the transaction amount before anything is saved.
async fn split<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let id = matches.value_of("txn_id").unwrap();
    let total = ws
        .transactions()
        .iter()
        .find(|t| t.id == id)
        .map(|t| t.amount)
        .ok_or_else(|| anyhow!("no pending transaction with id {}", id))?;

    let mut draft = SplitDraft::new(total);
    draft.lines.clear();
    for raw in matches
        .values_of("line")
        .ok_or_else(|| anyhow!("at least one --line is required"))?
    {
        draft.lines.push(parse_split_line(raw)?);
    }

    if !draft.can_save() {
        return Err(anyhow!(
            "split lines sum to {:.2}, off by {:.2} from the transaction amount {:.2}",
            total - draft.remainder(),
            draft.remainder(),
            total
        ));
    }

    let patch = TransactionPatch {
        splits: Some(draft.lines.clone()),
        ..Default::default()
    };
    ws.update_transaction(id, patch).await?;

    info!(id, lines = draft.lines.len(), "split saved");
    println!("Split {} across {} lines.", id, draft.lines.len());

    Ok(())
}

fn parse_split_line(raw: &str) -> Result<Split> {
    let mut parts = raw.splitn(3, ':');
    let category = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("split line {:?} is missing a category", raw))?;
    let amount: f64 = parts
        .next()
        .ok_or_else(|| anyhow!("split line {:?} is missing an amount", raw))?
        .parse()
        .map_err(|_| anyhow!("split line {:?} has a non-numeric amount", raw))?;

    Ok(Split {
        category_name: category.to_string(),
        amount,
        description: parts.next().unwrap_or_default().to_string(),
    })
}

async fn upload_receipt<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_transactions().await?;

    let id = matches.value_of("txn_id").unwrap();
    let path = matches.value_of("file").unwrap();

    let bytes = std::fs::read(path)?;
    let file_name = std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("receipt")
        .to_string();

    ws.upload_receipt(id, &file_name, bytes).await?;
    println!("Uploaded {} for {}; suggestions refreshed.", file_name, id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_split_line_with_description() {
        let line = parse_split_line("Office Supplies:-180.00:Monitor arm").unwrap();
        assert_eq!(line.category_name, "Office Supplies");
        assert_eq!(line.amount, -180.0);
        assert_eq!(line.description, "Monitor arm");
    }

    #[test]
    fn rejects_malformed_split_line() {
        assert!(parse_split_line("Office Supplies").is_err());
        assert!(parse_split_line(":12.0").is_err());
        assert!(parse_split_line("Meals:abc").is_err());
    }
}
