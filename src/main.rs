mod accounts;
mod backend;
mod core;
mod demo;
mod display;
mod init;
mod link;
mod picker;
mod review;
mod session;
mod settings;
mod txn;
mod workspace;

use anyhow::Result;
use clap::{arg, Command};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::settings::Settings;

static CLIENT_NAME: &str = "matchbook";

async fn run() -> Result<()> {
    let app = Command::new(CLIENT_NAME)
        .about("The matchbook utility reviews AI-matched QuickBooks transactions: \
         it connects a company realm, pulls pending matches from the backend, and \
         approves, categorizes, splits, or excludes them from the terminal.")
        .version("0.1.0")
        .subcommand_required(true)
        .allow_external_subcommands(false)
        .arg(arg!(CONFIG: -c --config [FILE] "Sets a custom config file"))
        .arg(arg!(verbose: -v --verbose [Boolean] "Sets the level of verbosity"))
        .subcommand(Command::new("init").about("Initialize CLI for use."))
        .subcommand(Command::new("link")
            .about("Connects a QuickBooks company realm.")
            .subcommand(Command::new("status").about("Displays the stored connection and subscription."))
            .subcommand(Command::new("reset").about("Clears the stored connection. Local only.")))
        .subcommand(Command::new("accounts")
            .about("Prints connected bank accounts to stdout.")
            .subcommand(Command::new("select")
                .about("Chooses which accounts to track; listing and sync honor the selection.")
                .arg(arg!(ids: [ACCOUNT_ID] "Account ids to keep active; none means all.")
                    .multiple_values(true))))
        .subcommand(Command::new("transactions")
            .subcommand_required(true)
            .about("Works the reconciliation queue.")
            .subcommand(Command::new("sync")
                .about("Triggers a backend re-pull from QuickBooks and waits a bounded time for fresh data."))
            .subcommand(Command::new("list")
                .about("Prints one dashboard tab of the pending transaction list.")
                .arg(arg!(tab: -t --tab [TAB] "Tab to print: review (default), matched, or excluded."))
                .arg(arg!(sort: -s --sort [KEY] "Sort key: date (default) or confidence."))
                .arg(arg!(asc: -a --asc "Sort ascending instead of descending.")))
            .subcommand(Command::new("show")
                .about("Prints one transaction with suggestions and reasoning.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction to show.")))
            .subcommand(Command::new("approve")
                .about("Confirms the suggested match for one transaction.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction to approve.")))
            .subcommand(Command::new("bulk-approve")
                .about("Approves every pending transaction with confidence above 90%."))
            .subcommand(Command::new("set-category")
                .about("Sets the category, creating it when no existing name matches.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction to categorize."))
                .arg(arg!(name: <NAME> "Category name or prefix.")))
            .subcommand(Command::new("set-vendor")
                .about("Sets the vendor, creating it when no existing name matches.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction to update."))
                .arg(arg!(name: <NAME> "Vendor name or prefix.")))
            .subcommand(Command::new("split")
                .about("Splits one transaction across categories. Lines must sum to the amount.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction to split."))
                .arg(arg!(line: -l --line <LINE> "A split line as CATEGORY:AMOUNT[:DESCRIPTION].")
                    .multiple_occurrences(true)))
            .subcommand(Command::new("upload-receipt")
                .about("Attaches a receipt image; backend processing may revise suggestions.")
                .arg(arg!(txn_id: <TXN_ID> "The transaction the receipt belongs to."))
                .arg(arg!(file: <FILE> "Path to the receipt image."))))
        .subcommand(Command::new("demo")
            .about("Enables the network-free demo dataset for evaluation.")
            .subcommand(Command::new("off").about("Disables demo mode.")));

    let matches = app.get_matches();

    if matches.value_of("verbose") == Some("true") {
        tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match matches.subcommand() {
        Some(("init", _init_matches)) => {
            init::run(matches.value_of("CONFIG")).await?;
        }
        Some(("link", link_matches)) => {
            let settings = Settings::new(matches.value_of("CONFIG"))?;
            link::run(link_matches, settings).await?;
        }
        Some(("accounts", account_matches)) => {
            let settings = Settings::new(matches.value_of("CONFIG"))?;
            accounts::run(account_matches, settings).await?;
        }
        Some(("transactions", txn_matches)) => {
            let settings = Settings::new(matches.value_of("CONFIG"))?;
            txn::run(txn_matches, settings).await?;
        }
        Some(("demo", demo_matches)) => {
            let settings = Settings::new(matches.value_of("CONFIG"))?;
            demo::run(demo_matches, settings).await?;
        }
        None => unreachable!("subcommand is required"),
        _ => unreachable!(),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        println!("{}", err);
        std::process::exit(1);
    }
}
