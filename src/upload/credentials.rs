use crate::error::AuthError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Tokens within this margin of expiry are treated as expired so an upload
/// never starts with a token about to lapse.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth token set for one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub token_type: String,
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS),
            None => false,
        }
    }
}

/// The "installed app" client secret bundle as issued by the platform
/// console.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: ClientSecret,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, previous_refresh_token: Option<String>) -> Credential {
        Credential {
            access_token: self.access_token,
            // Refresh responses usually omit the refresh token; keep the one
            // we already hold.
            refresh_token: self.refresh_token.or(previous_refresh_token),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(|p| p.to_string()).collect())
                .unwrap_or_else(|| vec![UPLOAD_SCOPE.to_string()]),
        }
    }
}

/// Loads, refreshes, and persists per-channel credentials, falling back to an
/// interactive loopback authorization when nothing usable is on disk.
pub struct CredentialStore {
    credentials_dir: PathBuf,
    client_secret_path: PathBuf,
    http: reqwest::blocking::Client,
}

impl CredentialStore {
    pub fn new(credentials_dir: PathBuf, client_secret_path: PathBuf) -> Self {
        Self {
            credentials_dir,
            client_secret_path,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Produce a valid credential for `channel`: cached if still valid,
    /// refreshed if possible, interactively authorized otherwise. The result
    /// is re-persisted after any change; persistence failure is logged and
    /// the in-memory credential is still returned.
    pub fn obtain(&self, channel: &str) -> Result<Credential, AuthError> {
        let path = self.credential_path(channel);

        if let Some(cached) = load_cached(&path) {
            if !cached.is_expired() {
                log::info!("Using cached credentials for channel {}", channel);
                return Ok(cached);
            }

            if let Some(refresh_token) = cached.refresh_token.clone() {
                log::info!("Refreshing expired credentials for channel {}", channel);
                match self.refresh(&refresh_token) {
                    Ok(refreshed) => {
                        persist(&path, &refreshed);
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        log::warn!(
                            "Refresh failed for channel {}, falling back to interactive authorization: {}",
                            channel,
                            e
                        );
                    }
                }
            }
        }

        log::info!("Starting interactive authorization for channel {}", channel);
        let credential = self.authorize_interactively()?;
        persist(&path, &credential);
        Ok(credential)
    }

    pub fn credential_path(&self, channel: &str) -> PathBuf {
        self.credentials_dir
            .join(format!("{}_credentials.json", channel))
    }

    fn load_client_secret(&self) -> Result<ClientSecret, AuthError> {
        let content =
            std::fs::read_to_string(&self.client_secret_path).map_err(|e| AuthError::ClientSecret {
                path: self.client_secret_path.clone(),
                detail: e.to_string(),
            })?;
        let parsed: ClientSecretFile =
            serde_json::from_str(&content).map_err(|e| AuthError::ClientSecret {
                path: self.client_secret_path.clone(),
                detail: e.to_string(),
            })?;
        Ok(parsed.installed)
    }

    fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let secret = self.load_client_secret()?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &secret.client_id),
            ("client_secret", &secret.client_secret),
        ];

        let response = self
            .http
            .post(&secret.token_uri)
            .form(&params)
            .send()
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "refresh returned HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        Ok(token.into_credential(Some(refresh_token.to_string())))
    }

    fn authorize_interactively(&self) -> Result<Credential, AuthError> {
        let secret = self.load_client_secret()?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| AuthError::Flow(format!("could not open callback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Flow(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let state = uuid::Uuid::new_v4().to_string();

        let mut auth_url = url::Url::parse(&secret.auth_uri)
            .map_err(|e| AuthError::Flow(format!("bad auth_uri in client secret: {}", e)))?;
        auth_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &secret.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("scope", UPLOAD_SCOPE)
            .append_pair("state", &state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        println!("Authorize this app by visiting:\n{}", auth_url);
        log::info!("Waiting for authorization callback on {}", redirect_uri);
        open_in_browser(auth_url.as_str());

        let code = wait_for_callback(&listener, &state)?;
        self.exchange_code(&secret, &code, &redirect_uri)
    }

    fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &secret.client_id),
            ("client_secret", &secret.client_secret),
        ];

        let response = self
            .http
            .post(&secret.token_uri)
            .form(&params)
            .send()
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "code exchange returned HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        Ok(token.into_credential(None))
    }
}

/// A cached credential that fails to parse is treated as absent.
fn load_cached(path: &Path) -> Option<Credential> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Could not read credentials at {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(credential) => {
            log::info!("Loaded existing credentials from {}", path.display());
            Some(credential)
        }
        Err(e) => {
            log::warn!("Could not parse credentials at {}: {}", path.display(), e);
            None
        }
    }
}

fn persist(path: &Path, credential: &Credential) {
    let content = match serde_json::to_string_pretty(credential) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Could not serialize credentials: {}", e);
            return;
        }
    };
    if let Err(e) = std::fs::write(path, content) {
        log::warn!("Could not save credentials to {}: {}", path.display(), e);
    } else {
        log::info!("Credentials saved to {}", path.display());
    }
}

/// Block until the authorization redirect arrives. Stray requests (favicons
/// and the like) are answered and skipped; only a request carrying a code or
/// an explicit error ends the wait.
fn wait_for_callback(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    for stream in listener.incoming() {
        let mut stream =
            stream.map_err(|e| AuthError::Flow(format!("callback accept failed: {}", e)))?;
        let path = match read_request_path(&mut stream) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Ignoring malformed callback request: {}", e);
                continue;
            }
        };

        match parse_callback_query(&path) {
            Ok(Some((code, state))) => {
                if state != expected_state {
                    respond(&mut stream, "Authorization state mismatch.");
                    return Err(AuthError::Flow("state parameter mismatch".to_string()));
                }
                respond(&mut stream, "Authorization received. You can close this window.");
                return Ok(code);
            }
            Ok(None) => {
                respond(&mut stream, "Waiting for authorization...");
            }
            Err(reason) => {
                respond(&mut stream, "Authorization was denied.");
                return Err(AuthError::Flow(reason));
            }
        }
    }
    Err(AuthError::Flow("callback listener closed".to_string()))
}

fn read_request_path(stream: &mut TcpStream) -> Result<String, String> {
    let mut buf = [0u8; 4096];
    let read = stream.read(&mut buf).map_err(|e| e.to_string())?;
    let request = String::from_utf8_lossy(&buf[..read]);
    let first_line = request.lines().next().ok_or("empty request")?;
    // "GET /?code=...&state=... HTTP/1.1"
    let mut parts = first_line.split_whitespace();
    let _method = parts.next().ok_or("missing method")?;
    parts.next().map(|p| p.to_string()).ok_or_else(|| "missing path".to_string())
}

/// `Ok(Some((code, state)))` when the redirect carries an authorization code,
/// `Ok(None)` for unrelated requests, `Err` when the platform reported an
/// authorization error.
fn parse_callback_query(path: &str) -> Result<Option<(String, String)>, String> {
    let parsed = url::Url::parse(&format!("http://localhost{}", path))
        .map_err(|e| format!("unparseable callback path: {}", e))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => return Err(format!("authorization error: {}", value)),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(Some((code, state))),
        (Some(_), None) => Err("callback carried a code but no state".to_string()),
        _ => Ok(None),
    }
}

fn respond(stream: &mut TcpStream, message: &str) {
    let body = format!("<html><body><p>{}</p></body></html>", message);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        log::warn!("Could not answer callback request: {}", e);
    }
}

fn open_in_browser(url: &str) {
    let launcher = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    if let Err(e) = launcher {
        log::warn!("Could not open the browser automatically: {}", e);
    }
}
