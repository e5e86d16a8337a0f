use std::sync::atomic::{AtomicUsize, Ordering};

use axum::async_trait;
use hyper::Client;
use qbo_link::{Authorizer, LinkServer, State};

#[derive(Default)]
struct MockAuthorizer {
    exchanges: AtomicUsize,
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn authorize_url(&self, user_id: &str) -> anyhow::Result<String> {
        Ok(format!("https://example.com/authorize?user={}", user_id))
    }

    async fn exchange(&self, code: &str, _state: &str, realm_id: &str) -> anyhow::Result<()> {
        if code.is_empty() || realm_id.is_empty() {
            anyhow::bail!("missing exchange parameters");
        }
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_state() -> State {
    State {
        user_id: "test-user".to_string(),
        context: None,
    }
}

#[tokio::test]
async fn can_execute_exchange_flow() -> Result<(), Box<dyn std::error::Error>> {
    let server = LinkServer::new(MockAuthorizer::default());
    let mut on_exchange = server.on_exchange();

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(server.start().into_make_service());
    let addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    let client = Client::new();
    let link_url = format!(
        "http://{}/link?state={}",
        addr,
        test_state().to_opaque().unwrap()
    )
    .parse()
    .unwrap();
    let resp = client.get(link_url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let callback_url = format!(
        "http://{}/callback?code=test-code&realmId=realm-42&state={}",
        addr,
        test_state().to_opaque().unwrap()
    )
    .parse()
    .unwrap();
    let resp = client.get(callback_url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let connection = on_exchange.recv().await.unwrap();
    assert_eq!(connection.realm_id, "realm-42");
    assert_eq!(connection.state.user_id, "test-user");

    Ok(())
}

#[tokio::test]
async fn callback_without_code_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let server = LinkServer::new(MockAuthorizer::default());
    let _keepalive = server.on_exchange();

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(server.start().into_make_service());
    let addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    let client = Client::new();
    let callback_url = format!("http://{}/callback?realmId=realm-42", addr)
        .parse()
        .unwrap();
    let resp = client.get(callback_url).await.unwrap();
    assert_eq!(resp.status(), 400);

    Ok(())
}
