use super::callback::{CALLBACK_PATH, CallbackOutcome, CallbackServer};
use super::send_oauth_request;
use super::token_store::StoredToken;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{AuthorizationCode, CsrfToken, RedirectUrl, Scope};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Every capability the commands need, requested up front
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Upper bound on stopping the callback listener
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization was denied: {0}")]
    Denied(String),

    #[error("malformed authorization callback: {0}")]
    MalformedCallback(String),

    #[error("authorization callback state did not match the request")]
    StateMismatch,

    #[error("authentication timeout after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("unable to listen for the authorization callback on port {port}: {source}")]
    Listener {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("callback listener stopped before a response arrived")]
    ListenerClosed,

    #[error("invalid redirect URL: {0}")]
    RedirectUrl(String),

    #[error("unable to retrieve token from web: {0}")]
    Exchange(String),
}

/// Opens the authorization URL for the user
pub trait UserAgent: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// The platform's default browser
pub struct SystemBrowser;

impl UserAgent for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Parameters of one authorization attempt
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub redirect_url: RedirectUrl,
    pub state: String,
}

/// An authorization code together with the redirect it was issued for
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_url: RedirectUrl,
}

/// Interactive authorization-code flow with a loopback redirect
pub struct AuthorizationFlow {
    client: BasicClient,
    http: reqwest::Client,
    port: u16,
    timeout: Duration,
}

impl AuthorizationFlow {
    /// `http` is used for the code exchange and must not follow redirects
    pub fn new(client: BasicClient, http: reqwest::Client, port: u16, timeout: Duration) -> Self {
        Self {
            client,
            http,
            port,
            timeout,
        }
    }

    pub fn authorization_request(
        &self,
        port: u16,
        state: &str,
    ) -> Result<AuthorizationRequest, AuthError> {
        let redirect_url = RedirectUrl::new(format!("http://localhost:{}{}", port, CALLBACK_PATH))
            .map_err(|e| AuthError::RedirectUrl(e.to_string()))?;

        let (url, _) = self
            .client
            .clone()
            .set_redirect_uri(redirect_url.clone())
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .add_scopes(SCOPES.iter().map(|scope| Scope::new(scope.to_string())))
            .add_extra_param("access_type", "offline")
            .url();

        Ok(AuthorizationRequest {
            url,
            redirect_url,
            state: state.to_string(),
        })
    }

    /// Get an authorization code from the user.
    ///
    /// The listener is bound before the URL is shown and is stopped before
    /// this returns, whatever the outcome.
    pub async fn authorize(&self, agent: &dyn UserAgent) -> Result<AuthorizationGrant, AuthError> {
        let state = uuid::Uuid::new_v4().to_string();
        let mut server = CallbackServer::bind(self.port, state.clone())
            .await
            .map_err(|source| AuthError::Listener {
                port: self.port,
                source,
            })?;

        let request = match self.authorization_request(server.port(), &state) {
            Ok(request) => request,
            Err(e) => {
                server.shutdown(SHUTDOWN_GRACE).await;
                return Err(e);
            }
        };

        eprintln!("Opening browser for authentication...");
        eprintln!("If browser doesn't open, visit:\n{}\n", request.url);
        if let Err(e) = agent.open(request.url.as_str()) {
            tracing::warn!("Failed to open browser: {}", e);
        }

        let outcome = server.wait(self.timeout).await;
        server.shutdown(SHUTDOWN_GRACE).await;

        match outcome? {
            CallbackOutcome::Code(code) => Ok(AuthorizationGrant {
                code,
                redirect_url: request.redirect_url,
            }),
            CallbackOutcome::Denied(reason) => Err(AuthError::Denied(reason)),
            CallbackOutcome::StateMismatch => Err(AuthError::StateMismatch),
            CallbackOutcome::Malformed(reason) => Err(AuthError::MalformedCallback(reason)),
        }
    }

    /// Trade an authorization code for a token at the token endpoint
    pub async fn exchange(&self, grant: AuthorizationGrant) -> Result<StoredToken, AuthError> {
        let response = self
            .client
            .clone()
            .set_redirect_uri(grant.redirect_url)
            .exchange_code(AuthorizationCode::new(grant.code))
            .request_async(|request| send_oauth_request(&self.http, request))
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        Ok(StoredToken::from_token_response(&response))
    }

    /// Full flow: consent in the browser, then code exchange
    pub async fn run(&self, agent: &dyn UserAgent) -> Result<StoredToken, AuthError> {
        let grant = self.authorize(agent).await?;
        tracing::debug!("Received authorization code, exchanging for token");
        self.exchange(grant).await
    }
}
