use super::flow::AuthError;
use oauth2::url::Url;
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

pub const CALLBACK_PATH: &str = "/oauth2callback";

const MAX_REQUEST_HEAD: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// What the provider's redirect told us
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
    StateMismatch,
    Malformed(String),
}

/// Short-lived HTTP listener receiving the OAuth redirect on the loopback
/// interface.
///
/// The listener runs on its own task. The first callback to arrive is
/// handed to [`CallbackServer::wait`]; later ones are answered but dropped.
/// The task is stopped by [`CallbackServer::shutdown`], or aborted when the
/// server is dropped.
pub struct CallbackServer {
    addr: SocketAddr,
    outcomes: mpsc::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:<port>` and start serving. Port 0 picks a free port.
    pub async fn bind(port: u16, expected_state: String) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let addr = listener.local_addr()?;
        let (outcome_tx, outcomes) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(serve(
            listener,
            Arc::new(expected_state),
            outcome_tx,
            shutdown_rx,
        ));
        tracing::debug!(%addr, "Callback listener started");

        Ok(Self {
            addr,
            outcomes,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until a callback arrives or `timeout` elapses
    pub async fn wait(&mut self, timeout: Duration) -> Result<CallbackOutcome, AuthError> {
        match tokio::time::timeout(timeout, self.outcomes.recv()).await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(AuthError::ListenerClosed),
            Err(_) => Err(AuthError::Timeout(timeout)),
        }
    }

    /// Stop the listener, giving in-flight responses up to `grace` to finish
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                tracing::warn!("Callback listener did not stop within {:?}, aborting", grace);
                task.abort();
                let _ = task.await;
            }
        }
        tracing::debug!(addr = %self.addr, "Callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn serve(
    listener: TcpListener,
    expected_state: Arc<String>,
    outcomes: mpsc::Sender<CallbackOutcome>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    // Tells connections that haven't sent a request yet to give up
    let (stopping_tx, stopping) = watch::channel(false);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "Callback connection");
                    connections.spawn(handle_connection(
                        stream,
                        expected_state.clone(),
                        outcomes.clone(),
                        stopping.clone(),
                    ));
                }
                Err(e) => tracing::warn!("Failed to accept callback connection: {}", e),
            },
        }
    }

    // Stop accepting, drop idle sockets, then let responses already being
    // written go out
    drop(listener);
    let _ = stopping_tx.send(true);
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    mut stream: TcpStream,
    expected_state: Arc<String>,
    outcomes: mpsc::Sender<CallbackOutcome>,
    mut stopping: watch::Receiver<bool>,
) {
    let read = tokio::select! {
        biased;
        read = tokio::time::timeout(READ_TIMEOUT, read_request_target(&mut stream)) => read,
        _ = stopping.wait_for(|stopping| *stopping) => {
            // Browsers keep preconnected sockets open without sending anything
            tracing::debug!("Closing idle callback connection");
            return;
        }
    };

    let target = match read {
        Ok(Ok(target)) => target,
        Ok(Err(e)) => {
            tracing::debug!("Rejecting callback request: {}", e);
            let _ = write_response(&mut stream, "400 Bad Request", &page("Bad request", "")).await;
            return;
        }
        Err(_) => {
            tracing::debug!("Callback connection timed out");
            return;
        }
    };

    let Some(outcome) = parse_callback(&target, &expected_state) else {
        // Browsers also ask for /favicon.ico and the like
        let _ = write_response(&mut stream, "404 Not Found", &page("Not found", "")).await;
        return;
    };

    // Claim the single slot before answering so the first callback wins
    let permit = outcomes.try_reserve().ok();
    if permit.is_none() {
        tracing::debug!("Ignoring duplicate authorization callback");
    }

    let (status, body) = match &outcome {
        CallbackOutcome::Code(_) => (
            "200 OK",
            page(
                "Authentication successful!",
                "You can close this window and return to the terminal.",
            ),
        ),
        CallbackOutcome::Denied(reason) => (
            "400 Bad Request",
            page("Authentication failed", &format!("The provider reported: {}", reason)),
        ),
        CallbackOutcome::StateMismatch => (
            "400 Bad Request",
            page("Authentication failed", "The request state did not match."),
        ),
        CallbackOutcome::Malformed(reason) => {
            ("400 Bad Request", page("Authentication failed", reason))
        }
    };
    if let Err(e) = write_response(&mut stream, status, &body).await {
        tracing::warn!("Failed to answer the browser: {}", e);
    }

    if let Some(permit) = permit {
        permit.send(outcome);
    }
}

/// Read the request head and return the target of a GET request
async fn read_request_target(stream: &mut TcpStream) -> io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    let mut consumed = reader.read_line(&mut request_line).await?;

    // Drain the headers so closing the socket doesn't reset the connection
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        consumed += read;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if consumed > MAX_REQUEST_HEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }

    let mut fields = request_line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported request line: {:?}", request_line.trim_end()),
        )),
    }
}

/// Interpret a request target. Returns `None` for paths other than the
/// callback path.
pub fn parse_callback(target: &str, expected_state: &str) -> Option<CallbackOutcome> {
    if !target.starts_with('/') {
        return None;
    }
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(error) = params.get("error") {
        return Some(CallbackOutcome::Denied(error.clone()));
    }

    let Some(code) = params.get("code").filter(|code| !code.is_empty()) else {
        return Some(CallbackOutcome::Malformed(
            "no code in callback".to_string(),
        ));
    };

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Some(CallbackOutcome::StateMismatch);
    }

    Some(CallbackOutcome::Code(code.clone()))
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style='font-family: sans-serif; padding: 40px; text-align: center;'>\
         <h1>{}</h1><p>{}</p></body></html>",
        escape_html(title),
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
