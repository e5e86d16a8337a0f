//! One-shot local server for the QuickBooks-Online connect flow: serves the
//! page that sends the user to Intuit, receives the OAuth redirect, exchanges
//! the authorization code through a caller-provided [`Authorizer`], and hands
//! the resulting connection back over a broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{Extension, FromRequest, RequestParts},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

lazy_static! {
    // HACK: Url doesn't provide a good way to initialize a Url from a relative
    // path and axum uri returns only the path partial. __Do not depend on the host,
    // scheme, or any non path part of the Url constructed with this as a base.__
    static ref BASE_URL: Url = {
        Url::parse("http://localhost").unwrap()
    };
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("unable to parse argument")]
    ParseError(#[from] serde_json::Error),
    #[error("failed to decode base64 argument")]
    DecodeError(#[from] base64::DecodeError),
    #[error("invalid string source")]
    BadRequest(#[from] std::string::FromUtf8Error),
    #[error("authorization exchange failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        match self {
            LinkError::InvalidArgument(s) => (StatusCode::BAD_REQUEST, Html(s)),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("something really bad happened".into()),
            ),
        }
        .into_response()
    }
}

/// The backend leg of the connect flow. The link server itself never talks
/// to Intuit; it defers both the authorize URL and the code exchange to the
/// implementation the caller provides.
#[async_trait]
pub trait Authorizer {
    async fn authorize_url(&self, user_id: &str) -> anyhow::Result<String>;
    async fn exchange(&self, code: &str, state: &str, realm_id: &str) -> anyhow::Result<()>;
}

/// State can be used to curry data during the link flow lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    /// The user the connection is being created for.
    pub user_id: String,
    /// Arbitrary key value pairs containing metadata about the exchange request.
    pub context: Option<HashMap<String, String>>,
}

impl State {
    pub fn to_opaque(self) -> Result<String, serde_json::Error> {
        Ok(base64::encode_config(
            serde_json::to_string(&self)?.as_bytes(),
            base64::URL_SAFE,
        ))
    }

    pub fn from_opaque(token: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(&String::from_utf8(
            base64::decode_config(token.as_bytes(), base64::URL_SAFE)?,
        )?)?)
    }
}

#[async_trait]
impl<B> FromRequest<B> for State
where
    B: Send,
{
    type Rejection = LinkError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let url = Url::options()
            .base_url(Some(&BASE_URL))
            .parse(&req.uri().to_string())
            .map_err(|_| LinkError::InvalidArgument("invalid_uri".into()))?;

        let state = url
            .query_pairs()
            .find(|(key, value)| matches!((key.as_ref(), value), ("state", _)));

        match state {
            Some((_, token)) => State::from_opaque(token.as_ref()),
            None => Ok(Self {
                user_id: "".to_string(),
                context: None,
            }),
        }
    }
}

/// Query parameters Intuit sends back on the OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
    pub realm_id: String,
}

#[async_trait]
impl<B> FromRequest<B> for CallbackParams
where
    B: Send,
{
    type Rejection = LinkError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let url = Url::options()
            .base_url(Some(&BASE_URL))
            .parse(&req.uri().to_string())
            .map_err(|_| LinkError::InvalidArgument("invalid_uri".into()))?;

        let mut code = None;
        let mut state = None;
        let mut realm_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.to_string()),
                "state" => state = Some(value.to_string()),
                "realmId" => realm_id = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(CallbackParams {
            code: code
                .ok_or_else(|| LinkError::InvalidArgument("callback must include code".into()))?,
            state: state.unwrap_or_default(),
            realm_id: realm_id.ok_or_else(|| {
                LinkError::InvalidArgument("callback must include realmId".into())
            })?,
        })
    }
}

/// A freshly connected realm, delivered once the code exchange succeeds.
#[derive(Debug, Clone)]
pub struct Connection {
    pub realm_id: String,
    /// Link-flow state curried through the redirect.
    pub state: State,
}

pub struct LinkServer<A: Authorizer> {
    pub authorizer: A,
    link_channel: broadcast::Sender<Connection>,
}

impl<A: Authorizer + Send + Sync + 'static> LinkServer<A> {
    pub fn new(authorizer: A) -> Self {
        let (tx, _rx) = broadcast::channel(1);

        Self {
            authorizer,
            link_channel: tx,
        }
    }

    /// Subscribe before starting the server so the exchange cannot win the
    /// race against the listener.
    pub fn on_exchange(&self) -> broadcast::Receiver<Connection> {
        self.link_channel.subscribe()
    }

    pub fn start(self) -> Router {
        Router::new()
            .route("/link", get(initialize_link::<A>))
            .route("/callback", get(exchange_code::<A>))
            .layer(Extension(Arc::new(self.authorizer)))
            .layer(Extension(self.link_channel))
    }
}

async fn initialize_link<A: Authorizer + Send + Sync + 'static>(
    state: State,
    authorizer: Extension<Arc<A>>,
) -> Result<Html<String>, LinkError> {
    let auth_url = authorizer.authorize_url(&state.user_id).await?;

    // Meta refresh plus a plain link; no script needed for a plain redirect.
    Ok(Html(format!(
        r#"
                <!DOCTYPE html>
                <html>
                <head><meta http-equiv="refresh" content="0; url={0}"></head>
                <body><a href="{0}">Continue to Intuit to connect your company</a></body>
                </html>
                "#,
        auth_url
    )))
}

async fn exchange_code<A: Authorizer + Send + Sync + 'static>(
    params: CallbackParams,
    authorizer: Extension<Arc<A>>,
    on_exchange: Extension<broadcast::Sender<Connection>>,
) -> Result<Html<&'static str>, LinkError> {
    authorizer
        .exchange(&params.code, &params.state, &params.realm_id)
        .await?;

    let state = State::from_opaque(&params.state).unwrap_or(State {
        user_id: "".to_string(),
        context: None,
    });

    on_exchange
        .send(Connection {
            realm_id: params.realm_id,
            state,
        })
        .map_err(|_| LinkError::InvalidArgument("no listener for the connection".into()))?;

    Ok(Html("Connected. You can close this window."))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::RequestParts;
    use axum::http;

    fn request_parts_from_uri(uri: &str) -> RequestParts<()> {
        RequestParts::new(http::request::Request::builder().uri(uri).body(()).unwrap())
    }

    #[tokio::test]
    async fn extract_callback_params_from_query() {
        let mut req = request_parts_from_uri(
            "http://localhost:4000/callback?code=abc123&state=xyz&realmId=realm-9",
        );

        assert_eq!(
            CallbackParams::from_request(&mut req).await.unwrap(),
            CallbackParams {
                code: "abc123".to_string(),
                state: "xyz".to_string(),
                realm_id: "realm-9".to_string(),
            }
        )
    }

    #[tokio::test]
    async fn callback_rejects_missing_params() {
        let tests = vec![
            (
                "http://localhost:4000/callback?state=xyz&realmId=realm-9",
                "callback must include code",
            ),
            (
                "http://localhost:4000/callback?code=abc123&state=xyz",
                "callback must include realmId",
            ),
        ];

        for t in tests {
            let mut req = request_parts_from_uri(t.0);
            assert_eq!(
                CallbackParams::from_request(&mut req)
                    .await
                    .unwrap_err()
                    .to_string(),
                t.1
            )
        }
    }

    #[tokio::test]
    async fn extract_state_from_query_param() {
        let state = State {
            user_id: "foobar@tester.com".to_string(),
            context: None,
        };

        let mut req = request_parts_from_uri(&format!(
            "http://localhost:4000/link?state={}",
            state.clone().to_opaque().unwrap()
        ));
        assert_eq!(State::from_request(&mut req).await.unwrap(), state)
    }

    #[tokio::test]
    async fn init_without_state_params_provides_default() {
        let state = State {
            user_id: "".to_string(),
            context: None,
        };

        let mut req = request_parts_from_uri("http://localhost:4000/link");
        assert_eq!(State::from_request(&mut req).await.unwrap(), state)
    }
}
