use anyhow::Result;
use clap::ArgMatches;
use qbo_link::{Connection, LinkServer, State};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::info;

use crate::backend::http::HttpBackend;
use crate::display;
use crate::session::FileSession;
use crate::settings::Settings;
use crate::workspace::Workspace;

async fn shutdown_signal(mut rx: broadcast::Receiver<Connection>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let exchanged = async {
        let _ = rx.recv().await;
    };

    let timeout = async {
        sleep_until(Instant::now() + Duration::from_secs(300)).await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = exchanged => {},
        _ = timeout => {},
    }

    info!("shutting down link server");
}

/// Runs the local redirect server until one realm is connected, a signal
/// arrives, or the five minute window lapses, then stores the connection.
async fn server(settings: Settings) -> Result<()> {
    let backend = HttpBackend::new(&settings.api_url)?;
    let link = LinkServer::new(backend.clone());

    let shutdown_rx = link.on_exchange();
    let mut result_rx = link.on_exchange();

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 4545));
    let router = link.start();
    let server = axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_rx));

    let state = State {
        user_id: settings.user_id.clone(),
        context: None,
    };
    println!(
        "Visit http://{}/link?state={} to connect your QuickBooks company.",
        addr,
        state.to_opaque()?
    );

    server.await?;

    match result_rx.try_recv() {
        Ok(connection) => {
            let store = FileSession::open(settings.session_file.clone().into())?;
            let mut ws = Workspace::new(backend, store)?;
            ws.complete_link(&connection.realm_id).await?;

            println!("Connected realm {}.", connection.realm_id);
            println!(
                "Pulled {} accounts and {} transactions.",
                ws.accounts().len(),
                ws.transactions().len()
            );
            println!("Run `matchbook accounts select` to choose which accounts to track.");
        }
        Err(_) => println!("No connection was completed."),
    }

    Ok(())
}

async fn status(settings: Settings) -> Result<()> {
    let store = FileSession::open(settings.session_file.clone().into())?;
    let backend = HttpBackend::new(&settings.api_url)?;
    let mut ws = Workspace::new(backend, store)?;

    let session = ws.session().clone();
    if !session.is_connected() {
        println!("Not connected. Run `matchbook link` to connect a company.");
    } else if session.demo {
        println!("Demo mode is enabled.");
    } else if let Some(realm) = &session.realm_id {
        println!("Connected to realm {}.", realm);
    }

    if !settings.user_id.is_empty() {
        ws.load_profile(&settings.user_id).await;
        if let Some(profile) = ws.profile() {
            display::print_profile(std::io::stdout(), profile)?;
        }
    }

    Ok(())
}

fn reset(settings: Settings) -> Result<()> {
    let store = FileSession::open(settings.session_file.clone().into())?;
    let backend = HttpBackend::new(&settings.api_url)?;
    let mut ws = Workspace::new(backend, store)?;
    ws.reset()?;

    println!("Cleared the stored connection. Nothing was changed server-side.");

    Ok(())
}

pub(crate) async fn run(matches: &ArgMatches, settings: Settings) -> Result<()> {
    match matches.subcommand() {
        Some(("status", _)) => status(settings).await,
        Some(("reset", _)) => reset(settings),
        _ => server(settings).await,
    }
}
