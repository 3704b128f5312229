//! Authenticated Helix client and OAuth token endpoints.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use super::models::{
    ApiErrorBody, CreatedSubscription, DataList, HelixStream, HelixUser, SubscriptionRequest,
    UserRef,
};
use crate::auth::{
    AuthorizationState, IdentityProvider, RefreshOutcome, TokenGrant, TokenValidation,
    ValidationStatus,
};
use crate::credentials::Credentials;
use crate::error::{Error, Result};

pub const DEFAULT_AUTH_URL: &str = "https://id.twitch.tv/oauth2";
pub const DEFAULT_HELIX_URL: &str = "https://api.twitch.tv/helix";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// REST client for the Twitch identity service and the Helix API.
///
/// Requests are never retried; failures surface as [`Error::Upstream`] with
/// the provider's own message when it sends one.
#[derive(Debug, Clone)]
pub struct HelixClient {
    http: Client,
    auth_base: String,
    helix_base: String,
}

impl HelixClient {
    pub fn new() -> Result<Self> {
        install_rustls_provider();
        let http = Client::builder()
            .user_agent(concat!("open-when-live/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            auth_base: DEFAULT_AUTH_URL.to_string(),
            helix_base: DEFAULT_HELIX_URL.to_string(),
        })
    }

    /// Point the client at different identity and Helix roots.
    pub fn with_base_urls(mut self, auth_base: &str, helix_base: &str) -> Result<Self> {
        self.auth_base = normalize_base(auth_base)?;
        self.helix_base = normalize_base(helix_base)?;
        Ok(self)
    }

    /// Authenticated `GET {helix}/{path}`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let builder = self.http.get(self.helix_url(path)).query(query);
        self.send_authenticated(credentials, builder).await
    }

    /// Authenticated `POST {helix}/{path}` with a JSON body.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        credentials: &Credentials,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.http.post(self.helix_url(path)).json(body);
        self.send_authenticated(credentials, builder).await
    }

    /// Resolve a user by id or login. `None` when Twitch knows no such user.
    #[instrument(skip(self, credentials, user), fields(user = %user))]
    pub async fn lookup_user(
        &self,
        credentials: &Credentials,
        user: &UserRef,
    ) -> Result<Option<HelixUser>> {
        let list: DataList<HelixUser> = self
            .get_json(credentials, "users", &[user.query()])
            .await?;
        let found = list.data.into_iter().next();
        if let Some(user) = &found {
            debug!(id = %user.id, login = %user.login, "Found user {}", user.display_name);
        }
        Ok(found)
    }

    /// The user's current stream, if they are live right now.
    #[instrument(skip(self, credentials))]
    pub async fn current_stream(
        &self,
        credentials: &Credentials,
        user_id: &str,
    ) -> Result<Option<HelixStream>> {
        let list: DataList<HelixStream> = self
            .get_json(credentials, "streams", &[("user_id", user_id)])
            .await?;
        Ok(list.data.into_iter().next())
    }

    /// Register an EventSub subscription and return its id.
    #[instrument(skip(self, credentials, request), fields(kind = %request.kind, session_id = %request.transport.session_id))]
    pub async fn create_subscription(
        &self,
        credentials: &Credentials,
        request: &SubscriptionRequest,
    ) -> Result<String> {
        let list: DataList<CreatedSubscription> = self
            .post_json(credentials, "eventsub/subscriptions", request)
            .await?;
        let created = list
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::protocol("subscription response contained no entries"))?;
        debug!(id = %created.id, status = %created.status, "Subscription created");
        Ok(created.id)
    }

    fn helix_url(&self, path: &str) -> String {
        format!("{}/{}", self.helix_base, path.trim_start_matches('/'))
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/{}", self.auth_base, path)
    }

    async fn send_authenticated<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = builder
            .bearer_auth(&credentials.access_token)
            .header("Client-Id", &credentials.client_id)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Response> {
        Ok(self.http.post(self.auth_url("token")).form(form).send().await?)
    }
}

fn normalize_base(base: &str) -> Result<String> {
    let parsed = Url::parse(base).map_err(|e| Error::config(format!("invalid URL {base}: {e}")))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(upstream_error(response).await)
    }
}

async fn upstream_error(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.filter(|m| !m.is_empty()).or(b.error))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
    Error::upstream(status.as_u16(), message)
}

#[async_trait]
impl IdentityProvider for HelixClient {
    #[instrument(skip_all)]
    async fn validate(&self, access_token: &str) -> Result<ValidationStatus> {
        let response = self
            .http
            .get(self.auth_url("validate"))
            .bearer_auth(access_token)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected by validation endpoint");
            return Ok(ValidationStatus::Unauthorized);
        }
        let validation: TokenValidation = parse_json(response).await?;
        Ok(ValidationStatus::Valid(validation))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, client: &Credentials, refresh_token: &str) -> Result<RefreshOutcome> {
        let response = self
            .token_request(&[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(RefreshOutcome::Rejected);
        }
        Ok(RefreshOutcome::Refreshed(parse_json(response).await?))
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        client: &Credentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        let response = self
            .token_request(&[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        parse_json(response).await
    }

    #[instrument(skip_all)]
    async fn client_credentials(&self, client: &Credentials) -> Result<TokenGrant> {
        let response = self
            .token_request(&[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .await?;
        parse_json(response).await
    }

    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &AuthorizationState,
    ) -> Result<String> {
        let url = Url::parse_with_params(
            &self.auth_url("authorize"),
            [
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", ""),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| Error::config(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            access_token: "access".to_string(),
            refresh_token: Some("refresh/with+symbols".to_string()),
            token_expires: None,
        }
    }

    async fn client_for(server: &MockServer) -> HelixClient {
        HelixClient::new()
            .unwrap()
            .with_base_urls(
                &format!("{}/oauth2", server.uri()),
                &format!("{}/helix/", server.uri()),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_validate_valid_and_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "client-id",
                "login": "viewer",
                "user_id": "7",
                "scopes": [],
                "expires_in": 5000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": 401,
                "message": "invalid access token"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        match client.validate("good").await.unwrap() {
            ValidationStatus::Valid(v) => {
                assert_eq!(v.expires_in, 5000);
                assert_eq!(v.login.as_deref(), Some("viewer"));
            }
            other => panic!("expected valid, got {other:?}"),
        }
        assert_eq!(
            client.validate("stale").await.unwrap(),
            ValidationStatus::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_validate_other_status_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.validate("x").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_refresh_encodes_token_once_and_maps_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh%2Fwith%2Bsymbols"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 14000,
                "scope": [],
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let creds = credentials();
        match client
            .refresh(&creds, creds.refresh_token().unwrap())
            .await
            .unwrap()
        {
            RefreshOutcome::Refreshed(grant) => {
                assert_eq!(grant.access_token, "new-access");
                assert_eq!(grant.refresh_token.as_deref(), Some("new-refresh"));
            }
            RefreshOutcome::Rejected => panic!("expected a refreshed grant"),
        }

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": 401,
                "message": "Invalid refresh token"
            })))
            .mount(&server)
            .await;
        assert_eq!(
            client.refresh(&creds, "dead").await.unwrap(),
            RefreshOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn test_refresh_bad_request_is_upstream_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": 400,
                "message": "missing client secret"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .refresh(&credentials(), "r")
            .await
            .unwrap_err();
        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "missing client secret");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_and_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "user-access",
                "refresh_token": "user-refresh",
                "expires_in": 14000,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "app-access",
                "expires_in": 5000000,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let grant = client
            .exchange_code(&credentials(), "the-code", "http://localhost:8000")
            .await
            .unwrap();
        assert_eq!(grant.access_token, "user-access");

        let app = client.client_credentials(&credentials()).await.unwrap();
        assert_eq!(app.access_token, "app-access");
        assert_eq!(app.refresh_token, None);
        assert_eq!(app.expires_in, 5000000);
    }

    #[tokio::test]
    async fn test_lookup_user_by_login_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .and(query_param("login", "someone"))
            .and(header("client-id", "client-id"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "42",
                    "login": "someone",
                    "display_name": "SomeOne",
                    "type": "",
                    "broadcaster_type": "partner"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .and(query_param("id", "999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let user = client
            .lookup_user(&credentials(), &UserRef::parse("SomeOne"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.display_name, "SomeOne");

        assert_eq!(
            client
                .lookup_user(&credentials(), &UserRef::parse("999"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_current_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .and(query_param("user_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "s1",
                    "user_id": "42",
                    "user_login": "someone",
                    "user_name": "SomeOne",
                    "type": "live",
                    "title": "hello",
                    "started_at": "2026-01-01T00:00:00Z"
                }],
                "pagination": {}
            })))
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .await
            .current_stream(&credentials(), "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stream.channel_url(), "https://twitch.tv/someone");
    }

    #[tokio::test]
    async fn test_create_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .and(body_partial_json(json!({
                "type": "stream.online",
                "condition": { "broadcaster_user_id": "42" },
                "transport": { "method": "websocket", "session_id": "abc" }
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "data": [{
                    "id": "sub-1",
                    "status": "enabled",
                    "type": "stream.online",
                    "version": "1"
                }],
                "total": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .await
            .create_subscription(
                &credentials(),
                &SubscriptionRequest::stream_online("42", "abc"),
            )
            .await
            .unwrap();
        assert_eq!(id, "sub-1");
    }

    #[tokio::test]
    async fn test_create_subscription_conflict_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "Conflict",
                "status": 409,
                "message": "subscription already exists"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .create_subscription(
                &credentials(),
                &SubscriptionRequest::stream_online("42", "abc"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("subscription already exists"));
    }

    #[test]
    fn test_authorize_url() {
        let client = HelixClient::new().unwrap();
        let state = AuthorizationState::new();
        let url = client
            .authorize_url("my client", "http://localhost:8000", &state)
            .unwrap();
        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?client_id=my+client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000"));
        assert!(url.contains("response_type=code&scope=&"));

        let parsed = Url::parse(&url).unwrap();
        let query: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(query.contains(&("state".to_string(), state.to_string())));
        assert!(query.contains(&("client_id".to_string(), "my client".to_string())));
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HelixClient::new()
            .unwrap()
            .with_base_urls("not a url", DEFAULT_HELIX_URL)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
