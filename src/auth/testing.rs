//! Stand-ins for the browser and the provider's token endpoint.

use super::flow::UserAgent;
use oauth2::url::{Url, form_urlencoded};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub fn query_params(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

/// Client that talks to the loopback fakes directly, whatever the
/// environment's proxy settings
pub fn loopback_http() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Pretends to be the browser: records the callback port and, if told
/// to, follows the redirect with the given query.
pub struct FakeBrowser {
    // Builds the callback query from the request state
    respond: Option<fn(&str) -> String>,
    pub launch_fails: bool,
    port: Arc<Mutex<Option<u16>>>,
}

impl FakeBrowser {
    pub fn new(respond: Option<fn(&str) -> String>) -> Self {
        Self {
            respond,
            launch_fails: false,
            port: Arc::new(Mutex::new(None)),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.lock().unwrap().expect("browser was never opened")
    }
}

impl UserAgent for FakeBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        let params = query_params(url);
        let redirect = Url::parse(&params["redirect_uri"]).unwrap();
        let port = redirect.port().unwrap();
        *self.port.lock().unwrap() = Some(port);

        if let Some(respond) = self.respond {
            let callback = format!(
                "http://127.0.0.1:{}{}?{}",
                port,
                redirect.path(),
                respond(&params["state"])
            );
            tokio::spawn(async move {
                let _ = loopback_http().get(callback).send().await;
            });
        }

        if self.launch_fails {
            Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
        } else {
            Ok(())
        }
    }
}

pub fn grant_abc(state: &str) -> String {
    format!("code=ABC&state={}", state)
}

pub fn grant_xyz(state: &str) -> String {
    format!("code=XYZ&state={}", state)
}

pub fn forged_state(_state: &str) -> String {
    "code=ABC&state=forged".to_string()
}

pub fn deny(state: &str) -> String {
    format!("error=access_denied&state={}", state)
}

/// Canned HTTP status and JSON body
pub type Reply = (u16, &'static str);

/// Token endpoint on a loopback port. Answers authorization code grants
/// and refresh grants with separate canned replies and records the
/// `grant_type` of every request it sees.
pub struct FakeTokenEndpoint {
    pub url: String,
    grants: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeTokenEndpoint {
    pub async fn start(code_reply: Reply, refresh_reply: Reply) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        let grants = Arc::new(Mutex::new(Vec::new()));

        let seen = grants.clone();
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let grant_type = read_grant_type(&mut stream).await.unwrap_or_default();
                let (status, body) = if grant_type == "refresh_token" {
                    refresh_reply
                } else {
                    code_reply
                };
                seen.lock().unwrap().push(grant_type);

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, grants, task }
    }

    pub fn grants(&self) -> Vec<String> {
        self.grants.lock().unwrap().clone()
    }
}

impl Drop for FakeTokenEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_grant_type(stream: &mut TcpStream) -> io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await?;
    Ok(form_urlencoded::parse(&body)
        .find(|(name, _)| name == "grant_type")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default())
}
