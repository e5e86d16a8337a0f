use anyhow::{anyhow, Result};
use clap::ArgMatches;
use tracing::warn;

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::demo::DemoBackend;
use crate::display;
use crate::session::{FileSession, SessionStore};
use crate::settings::Settings;
use crate::workspace::Workspace;

pub(crate) async fn run(matches: &ArgMatches, settings: Settings) -> Result<()> {
    let mut store = FileSession::open(settings.session_file.clone().into())?;
    let session = store.load()?;

    if session.demo {
        go(matches, &settings, Workspace::new(DemoBackend::new(), store)?).await
    } else {
        let backend = HttpBackend::new(&settings.api_url)?;
        go(matches, &settings, Workspace::new(backend, store)?).await
    }
}

async fn go<B: Backend>(
    matches: &ArgMatches,
    settings: &Settings,
    mut ws: Workspace<B, FileSession>,
) -> Result<()> {
    match matches.subcommand() {
        Some(("select", select_matches)) => select(&mut ws, settings, select_matches).await,
        _ => print(&mut ws).await,
    }
}

async fn print<B: Backend>(ws: &mut Workspace<B, FileSession>) -> Result<()> {
    ws.refresh_accounts().await?;

    let active = ws.session().active_account_ids.clone();
    display::print_accounts(std::io::stdout(), ws.accounts(), &active)?;

    Ok(())
}

/// Sets the account allow-list used by listing and sync. The subscription
/// tier bounds how many accounts may be active at once.
async fn select<B: Backend>(
    ws: &mut Workspace<B, FileSession>,
    settings: &Settings,
    matches: &ArgMatches,
) -> Result<()> {
    ws.refresh_accounts().await?;

    let ids: Vec<String> = matches
        .values_of("ids")
        .map(|v| v.map(str::to_string).collect())
        .unwrap_or_default();

    for id in &ids {
        if !ws.accounts().iter().any(|a| &a.id == id) {
            return Err(anyhow!("unknown account id {}", id));
        }
    }

    if !settings.user_id.is_empty() {
        ws.load_profile(&settings.user_id).await;
    }
    if let Some(profile) = ws.profile() {
        let limit = profile.account_limit();
        if ids.len() > limit {
            return Err(anyhow!(
                "the {} tier allows {} active accounts, {} selected",
                profile.subscription_tier,
                limit,
                ids.len()
            ));
        }
    } else {
        warn!("no profile available, skipping account limit check");
    }

    ws.set_account_filter(ids.clone())?;

    if ids.is_empty() {
        println!("Tracking all accounts.");
    } else {
        println!("Tracking {} accounts.", ids.len());
    }

    Ok(())
}
