pub mod callback;
pub mod flow;
pub mod secrets;
#[cfg(test)]
mod testing;
pub mod token_store;

use crate::config::Settings;
use crate::gmail_client::GmailClient;
use anyhow::Result;
use flow::{AuthorizationFlow, SystemBrowser, UserAgent};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RefreshToken, TokenUrl,
};
use secrets::ClientSecrets;
use token_store::{StoredToken, TokenStore, TokenStoreError};

/// Build the OAuth2 client for a registered application
pub fn oauth_client(secrets: &ClientSecrets) -> Result<BasicClient> {
    let client = BasicClient::new(
        ClientId::new(secrets.client_id.clone()),
        secrets.client_secret.clone().map(ClientSecret::new),
        AuthUrl::new(secrets.auth_uri.clone())?,
        Some(TokenUrl::new(secrets.token_uri.clone())?),
    )
    .set_auth_type(AuthType::RequestBody);
    Ok(client)
}

/// HTTP client for token endpoint requests. Redirects are not followed.
pub fn oauth_http_client() -> Result<reqwest::Client> {
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(http)
}

/// Send a token endpoint request built by `oauth2` through `http`
pub async fn send_oauth_request(
    http: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, oauth2::reqwest::Error<reqwest::Error>> {
    let mut builder = http
        .request(request.method, request.url.as_str())
        .body(request.body);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let response = builder.send().await.map_err(oauth2::reqwest::Error::Reqwest)?;
    let status_code = response.status();
    let headers = response.headers().to_owned();
    let body = response
        .bytes()
        .await
        .map_err(oauth2::reqwest::Error::Reqwest)?;

    Ok(HttpResponse {
        status_code,
        headers,
        body: body.to_vec(),
    })
}

/// Hands out a usable token, from disk, by refreshing, or by asking the user
pub struct Auth {
    client: BasicClient,
    http: reqwest::Client,
    flow: AuthorizationFlow,
    store: TokenStore,
    browser: Box<dyn UserAgent>,
}

impl Auth {
    pub fn new(settings: &Settings) -> Result<Self> {
        let secrets = ClientSecrets::load(&settings.credentials_path()?)?;
        let client = oauth_client(&secrets)?;
        let http = oauth_http_client()?;
        let flow = AuthorizationFlow::new(
            client.clone(),
            http.clone(),
            settings.callback_port,
            settings.auth_timeout()?,
        );
        let store = TokenStore::new(settings.token_path()?);

        Ok(Self {
            client,
            http,
            flow,
            store,
            browser: Box::new(SystemBrowser),
        })
    }

    /// Gmail client authenticated with a valid token
    pub async fn gmail_client(&self) -> Result<GmailClient> {
        let token = self.ensure_valid_token().await?;
        Ok(GmailClient::new(token.access_token))
    }

    /// Load the saved token, refreshing or re-authorizing when needed
    pub async fn ensure_valid_token(&self) -> Result<StoredToken> {
        let token = match self.store.load() {
            Ok(token) => token,
            Err(e @ (TokenStoreError::NotFound(_) | TokenStoreError::Decode { .. })) => {
                tracing::debug!("{}", e);
                return self.login().await;
            }
            Err(e) => return Err(e.into()),
        };

        if !token.is_expired() {
            return Ok(token);
        }

        let Some(refresh_token) = token.refresh_token.as_deref() else {
            tracing::info!("Saved token expired and cannot be refreshed");
            return self.login().await;
        };

        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.persist(&refreshed);
                Ok(refreshed)
            }
            Err(e) => {
                tracing::warn!("{}; re-authorizing", e);
                self.login().await
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        tracing::debug!("Refreshing expired access token");
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(|request| send_oauth_request(&self.http, request))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to refresh token: {}", e))?;

        let mut token = StoredToken::from_token_response(&response);
        // Google only returns a refresh token on the first exchange
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// Run the browser authorization flow and save the resulting token
    pub async fn login(&self) -> Result<StoredToken> {
        let token = self.flow.run(self.browser.as_ref()).await?;
        eprintln!("\nAuthentication successful!");
        self.persist(&token);
        Ok(token)
    }

    /// A failed save is not fatal, the token is still good for this session
    fn persist(&self, token: &StoredToken) {
        tracing::info!("Saving credentials to: {}", self.store.path().display());
        if let Err(e) = self.store.save(token) {
            tracing::warn!("Unable to save token: {}", e);
        }
    }
}

/// Logs out by removing the saved token
pub fn logout(store: &TokenStore) -> Result<()> {
    if store.remove()? {
        eprintln!("Successfully logged out");
    } else {
        eprintln!("Not logged in");
    }
    Ok(())
}

/// Report whether a token is saved and when it expires
pub fn status(store: &TokenStore) -> Result<()> {
    match store.load() {
        Ok(token) => {
            println!("Token: {}", store.path().display());
            match token.expiry {
                Some(expiry) if token.is_expired() => {
                    println!("Access token expired at {}", expiry.to_rfc3339())
                }
                Some(expiry) => println!("Access token valid until {}", expiry.to_rfc3339()),
                None => println!("Access token has no expiry"),
            }
            let refreshable = if token.refresh_token.is_some() { "yes" } else { "no" };
            println!("Refreshable: {}", refreshable);
            Ok(())
        }
        Err(TokenStoreError::NotFound(_)) => {
            println!("Not logged in");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use super::testing::{FakeBrowser, FakeTokenEndpoint, Reply, grant_abc, loopback_http};

    const LOGIN_REPLY: Reply = (
        200,
        r#"{"access_token":"from-login","token_type":"Bearer","expires_in":3600,"refresh_token":"r-login"}"#,
    );
    const REFRESH_REPLY: Reply = (
        200,
        r#"{"access_token":"refreshed","token_type":"Bearer","expires_in":3600}"#,
    );
    const REJECTED_REPLY: Reply = (400, r#"{"error":"invalid_grant"}"#);

    fn test_auth(token_path: &Path, endpoint: &FakeTokenEndpoint) -> Auth {
        let secrets = ClientSecrets {
            client_id: "abc".to_string(),
            client_secret: Some("shh".to_string()),
            auth_uri: secrets::GOOGLE_AUTH_URL.to_string(),
            token_uri: endpoint.url.clone(),
        };
        let client = oauth_client(&secrets).unwrap();
        let http = loopback_http();
        Auth {
            flow: AuthorizationFlow::new(
                client.clone(),
                http.clone(),
                0,
                Duration::from_secs(10),
            ),
            client,
            http,
            store: TokenStore::new(token_path.to_path_buf()),
            browser: Box::new(FakeBrowser::new(Some(grant_abc))),
        }
    }

    fn token(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> StoredToken {
        StoredToken {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expiry: Some(Utc::now() + chrono::Duration::seconds(expires_in)),
        }
    }

    #[tokio::test]
    async fn test_valid_saved_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&dir.path().join("token.json"), &endpoint);
        let saved = token("still-good", Some("r"), 3600);
        auth.store.save(&saved).unwrap();

        assert_eq!(auth.ensure_valid_token().await.unwrap(), saved);
        assert!(endpoint.grants().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_runs_flow_and_saves_result() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&dir.path().join("token.json"), &endpoint);

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "from-login");
        assert_eq!(token.refresh_token.as_deref(), Some("r-login"));
        assert_eq!(endpoint.grants(), ["authorization_code"]);
        assert_eq!(auth.store.load().unwrap(), token);
    }

    #[tokio::test]
    async fn test_undecodable_token_runs_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{ not json").unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&path, &endpoint);

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "from-login");
        assert_eq!(auth.store.load().unwrap(), token);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_token_for_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        // The temp file can't be created where a directory sits
        fs::create_dir(dir.path().join("token.json.tmp")).unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&path, &endpoint);

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "from-login");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&dir.path().join("token.json"), &endpoint);
        auth.store.save(&token("stale", Some("r-old"), -60)).unwrap();

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "refreshed");
        // The endpoint didn't send a new refresh token
        assert_eq!(token.refresh_token.as_deref(), Some("r-old"));
        assert_eq!(endpoint.grants(), ["refresh_token"]);
        assert_eq!(auth.store.load().unwrap(), token);
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_login() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REJECTED_REPLY).await;
        let auth = test_auth(&dir.path().join("token.json"), &endpoint);
        auth.store.save(&token("stale", Some("revoked"), -60)).unwrap();

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "from-login");
        assert_eq!(endpoint.grants(), ["refresh_token", "authorization_code"]);
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_runs_flow() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeTokenEndpoint::start(LOGIN_REPLY, REFRESH_REPLY).await;
        let auth = test_auth(&dir.path().join("token.json"), &endpoint);
        auth.store.save(&token("stale", None, -60)).unwrap();

        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token.access_token, "from-login");
        assert_eq!(endpoint.grants(), ["authorization_code"]);
    }

    #[test]
    fn test_logout_removes_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token("a", None, 3600)).unwrap();

        logout(&store).unwrap();
        assert!(!dir.path().join("token.json").exists());
        // Second logout is harmless
        logout(&store).unwrap();
    }

    #[test]
    fn test_status_without_token() {
        let dir = tempfile::tempdir().unwrap();
        assert!(status(&TokenStore::new(dir.path().join("token.json"))).is_ok());
    }

    #[test]
    fn test_oauth_client_rejects_bad_endpoint() {
        let secrets = ClientSecrets {
            client_id: "abc".to_string(),
            client_secret: None,
            auth_uri: "not a url".to_string(),
            token_uri: secrets::GOOGLE_TOKEN_URL.to_string(),
        };
        assert!(oauth_client(&secrets).is_err());
    }
}
