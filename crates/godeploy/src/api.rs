//! # Deployment service API
//!
//! Blocking HTTP client for the authentication and deploy endpoints.
//!
//! Requests that time out are reported as [`ApiError::Timeout`] rather than a
//! generic transport error, since a timed out upload may still be processed
//! by the server.

use std::{io, path::PathBuf, time::Duration};

use derive_more::{Display, Error, From};
use reqwest::{
    blocking::{
        multipart::{Form, Part},
        Client, RequestBuilder, Response,
    },
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{commit::CommitMetadata, token::TokenPair};

/// API client errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ApiError {
    /// HTTP client error.
    Http(reqwest::Error),

    /// IO-related error.
    Io(io::Error),

    /// Malformed response body.
    #[display(fmt = "failed to parse response: {}", _0)]
    Decode(serde_json::Error),

    /// No response within the configured timeout.
    #[display(fmt = "request timed out after {:?} waiting for {}", timeout, url)]
    #[from(ignore)]
    Timeout {
        /// Requested URL.
        url: String,

        /// Applied timeout.
        timeout: Duration,
    },

    /// Error response with a readable message.
    #[display(fmt = "API error: {} (status {})", message, status)]
    #[from(ignore)]
    Api {
        /// HTTP status code.
        status: u16,

        /// Server-provided message.
        message: String,
    },

    /// Error response without a recognizable body.
    #[display(fmt = "API request failed with status {}: {}", status, body)]
    #[from(ignore)]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,

        /// Raw response body.
        body: String,
    },

    /// Successful HTTP exchange with an unsuccessful outcome.
    #[display(fmt = "{}", message)]
    #[from(ignore)]
    Rejected {
        /// Server-provided reason.
        message: String,
    },
}

impl ApiError {
    /// Whether the request timed out, leaving its outcome unknown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }
}

/// Deployment upload contents.
#[derive(Debug)]
pub(crate) struct DeployUpload {
    /// Project name.
    pub project: String,

    /// File name the SPA configuration is uploaded under.
    pub config_file_name: String,

    /// Raw SPA configuration file contents.
    pub spa_config: Vec<u8>,

    /// Built archive.
    pub archive_path: PathBuf,

    /// Commit the deployment was built from.
    pub commit: CommitMetadata,

    /// Ask the server to invalidate its CDN cache.
    pub clear_cache: bool,
}

/// Deployment service operations used by the deploy pipeline.
pub(crate) trait ApiClient {
    /// Exchange a refresh token for a new token pair.
    fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;

    /// Upload a deployment and return the deployed URL.
    fn deploy(&self, access_token: &str, upload: &DeployUpload) -> Result<String, ApiError>;
}

/// Authenticated session returned by sign-in and sign-up.
#[derive(Debug)]
pub(crate) struct Session {
    /// Issued token pair.
    pub tokens: TokenPair,

    /// Account email as reported by the server.
    pub email: String,
}

/// `POST /api/auth/refresh` body.
#[derive(Serialize)]
struct RefreshRequest<'a> {
    /// Saved refresh token.
    refresh_token: &'a str,
}

/// Token refresh response.
#[derive(Deserialize)]
struct RefreshResponse {
    /// New access token.
    token: String,

    /// Rotated refresh token, empty when not rotated.
    #[serde(default)]
    refresh_token: String,
}

/// Sign-in and sign-up body.
#[derive(Serialize)]
struct CredentialsRequest<'a> {
    /// Account email.
    email: &'a str,

    /// Account password.
    password: &'a str,
}

/// Sign-in and sign-up response.
#[derive(Deserialize)]
struct AuthResponse {
    /// Whether the server accepted the credentials.
    #[serde(default)]
    success: bool,

    /// Access token.
    #[serde(default)]
    token: String,

    /// Refresh token.
    #[serde(default)]
    refresh_token: String,

    /// Authenticated account.
    user: Option<AuthUser>,

    /// Rejection reason.
    #[serde(default)]
    error: String,
}

/// Account details of an authentication response.
#[derive(Deserialize)]
struct AuthUser {
    /// Account email.
    email: String,
}

/// Deploy endpoint response.
#[derive(Deserialize)]
struct DeployResponse {
    /// Whether the deployment was accepted.
    #[serde(default)]
    success: bool,

    /// Deployed site URL.
    #[serde(default)]
    url: String,

    /// Rejection reason.
    #[serde(default)]
    error: String,
}

/// Error body shape shared by all endpoints.
#[derive(Deserialize)]
struct ErrorBody {
    /// Error description.
    error: Option<String>,

    /// Alternative error description field.
    message: Option<String>,
}

/// [`ApiClient`] over blocking [`reqwest`].
pub(crate) struct HttpApiClient {
    /// Shared HTTP client.
    client: Client,

    /// Service base URL, without a trailing slash.
    base_url: String,

    /// Timeout for regular requests.
    request_timeout: Duration,

    /// Timeout for deploy uploads.
    upload_timeout: Duration,
}

impl HttpApiClient {
    /// Create a client for the service at `base_url`.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            request_timeout,
            upload_timeout,
        })
    }

    /// Sign in with an existing account.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        self.authenticate("signin", StatusCode::OK, email, password)
    }

    /// Create a new account.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        self.authenticate("signup", StatusCode::CREATED, email, password)
    }

    /// Post credentials to an auth endpoint and build a [`Session`].
    fn authenticate(
        &self,
        endpoint: &str,
        expected: StatusCode,
        email: &str,
        password: &str,
    ) -> Result<Session, ApiError> {
        let url = self.url(&format!("/api/auth/{endpoint}"));

        tracing::debug!(%url, %email, "authenticating");

        let response = self.send(
            self.client
                .post(&url)
                .json(&CredentialsRequest { email, password }),
            &url,
            self.request_timeout,
        )?;

        if response.status() != expected {
            return Err(error_from_response(response, &url, self.request_timeout));
        }

        let body: AuthResponse = read_json(response, &url, self.request_timeout)?;

        if !body.success {
            return Err(ApiError::Rejected {
                message: non_empty_or(body.error, "authentication failed"),
            });
        }

        Ok(Session {
            tokens: TokenPair {
                access_token: body.token,
                refresh_token: body.refresh_token,
            },
            email: body.user.map_or_else(|| email.to_owned(), |user| user.email),
        })
    }

    /// Absolute URL of an API path.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request, mapping transport errors.
    fn send(
        &self,
        request: RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, ApiError> {
        request
            .send()
            .map_err(|error| transport_error(error, url, timeout))
    }
}

impl ApiClient for HttpApiClient {
    fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = self.url("/api/auth/refresh");

        let response = self.send(
            self.client
                .post(&url)
                .json(&RefreshRequest { refresh_token }),
            &url,
            self.request_timeout,
        )?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &url, self.request_timeout));
        }

        let body: RefreshResponse = read_json(response, &url, self.request_timeout)?;

        Ok(TokenPair {
            access_token: body.token,
            refresh_token: body.refresh_token,
        })
    }

    fn deploy(&self, access_token: &str, upload: &DeployUpload) -> Result<String, ApiError> {
        let url = self.url("/api/deploy");

        let mut query = vec![("project", upload.project.as_str())];

        for (key, value) in [
            ("commit_sha", &upload.commit.sha),
            ("commit_branch", &upload.commit.branch),
            ("commit_message", &upload.commit.message),
            ("commit_url", &upload.commit.url),
        ] {
            if !value.is_empty() {
                query.push((key, value.as_str()));
            }
        }

        query.push((
            "clear_cache",
            if upload.clear_cache { "true" } else { "false" },
        ));

        let form = Form::new()
            .text("project", upload.project.clone())
            .part(
                "spa_config",
                Part::bytes(upload.spa_config.clone())
                    .file_name(upload.config_file_name.clone())
                    .mime_str("application/json")?,
            )
            .part(
                "archive",
                Part::file(&upload.archive_path)?
                    .file_name(format!("{}.zip", upload.project))
                    .mime_str("application/zip")?,
            );

        tracing::info!(%url, project = %upload.project, timeout = ?self.upload_timeout, "uploading deployment");

        let response = self.send(
            self.client
                .post(&url)
                .query(&query)
                .bearer_auth(access_token)
                .timeout(self.upload_timeout)
                .multipart(form),
            &url,
            self.upload_timeout,
        )?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &url, self.upload_timeout));
        }

        let body: DeployResponse = read_json(response, &url, self.upload_timeout)?;

        if !body.success {
            return Err(ApiError::Rejected {
                message: non_empty_or(body.error, "deployment failed"),
            });
        }

        Ok(body.url)
    }
}

/// Map a transport error, singling out timeouts.
fn transport_error(error: reqwest::Error, url: &str, timeout: Duration) -> ApiError {
    if error.is_timeout() {
        tracing::warn!(%url, ?timeout, "request timed out");

        ApiError::Timeout {
            url: url.to_owned(),
            timeout,
        }
    } else {
        ApiError::Http(error)
    }
}

/// Read and decode a JSON response body.
fn read_json<T: DeserializeOwned>(
    response: Response,
    url: &str,
    timeout: Duration,
) -> Result<T, ApiError> {
    let bytes = response
        .bytes()
        .map_err(|error| transport_error(error, url, timeout))?;

    Ok(serde_json::from_slice(&bytes)?)
}

/// Build an error from an unsuccessful response, preferring the `error` field of its body.
fn error_from_response(response: Response, url: &str, timeout: Duration) -> ApiError {
    let status = response.status().as_u16();

    let body = match response.text() {
        Ok(body) => body,
        Err(error) => return transport_error(error, url, timeout),
    };

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            error: Some(message),
            ..
        })
        | Ok(ErrorBody {
            message: Some(message),
            ..
        }) if !message.is_empty() => ApiError::Api { status, message },
        _ => ApiError::UnexpectedStatus { status, body },
    }
}

/// `message`, or `fallback` when it is empty.
fn non_empty_or(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_owned()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        path::Path,
        thread::{self, JoinHandle},
        time::Duration,
    };

    use super::{ApiClient, ApiError, DeployUpload, HttpApiClient};
    use crate::commit::CommitMetadata;

    /// Read one HTTP request, body included.
    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0; 8192];

        let mut read_more = |data: &mut Vec<u8>| {
            let n = stream.read(&mut buf).unwrap();
            data.extend_from_slice(&buf[..n]);
            n > 0
        };

        let header_end = loop {
            if let Some(position) = data.windows(4).position(|window| window == b"\r\n\r\n") {
                break position + 4;
            }

            if !read_more(&mut data) {
                return String::from_utf8_lossy(&data).into_owned();
            }
        };

        let head = String::from_utf8_lossy(&data[..header_end]).to_lowercase();

        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());

        match content_length {
            Some(length) => {
                while data.len() < header_end + length && read_more(&mut data) {}
            }
            None if head.contains("transfer-encoding: chunked") => {
                while !data.ends_with(b"0\r\n\r\n") && read_more(&mut data) {}
            }
            None => {}
        }

        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serve a single request with a canned response; the handle yields the received request.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);

            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();

            request
        });

        (base_url, handle)
    }

    fn client(base_url: &str, upload_timeout: Duration) -> HttpApiClient {
        HttpApiClient::new(base_url, Duration::from_secs(5), upload_timeout).unwrap()
    }

    fn upload(dir: &Path) -> DeployUpload {
        let archive_path = dir.join("site.zip");
        std::fs::write(&archive_path, b"PK\x05\x06 not really a zip").unwrap();

        DeployUpload {
            project: String::from("site"),
            config_file_name: String::from("godeploy.config.json"),
            spa_config: br#"{"apps":[]}"#.to_vec(),
            archive_path,
            commit: CommitMetadata {
                sha: String::from("abc123"),
                branch: String::from("main"),
                ..Default::default()
            },
            clear_cache: false,
        }
    }

    #[test]
    fn deploy_sends_bearer_token_and_multipart_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, handle) = serve_once(
            "200 OK",
            r#"{"success":true,"url":"https://site.spa.godeploy.app"}"#,
        );

        let url = client(&base_url, Duration::from_secs(5))
            .deploy("access-token", &upload(dir.path()))
            .unwrap();

        assert_eq!(url, "https://site.spa.godeploy.app");

        let request = handle.join().unwrap();

        assert!(request
            .starts_with("POST /api/deploy?project=site&commit_sha=abc123&commit_branch=main&clear_cache=false "));
        assert!(request
            .to_lowercase()
            .contains("authorization: bearer access-token"));
        assert!(request.contains(r#"name="project""#));
        assert!(request.contains(r#"name="spa_config"; filename="godeploy.config.json""#));
        assert!(request.contains(r#"name="archive"; filename="site.zip""#));
        assert!(request.contains("not really a zip"));
    }

    #[test]
    fn silent_server_yields_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let error = client(&base_url, Duration::from_millis(300))
            .deploy("access-token", &upload(dir.path()))
            .unwrap_err();

        assert!(error.is_timeout(), "unexpected error: {error}");
    }

    #[test]
    fn unsuccessful_deploy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, _handle) = serve_once("200 OK", r#"{"success":false,"error":"quota exceeded"}"#);

        let error = client(&base_url, Duration::from_secs(5))
            .deploy("access-token", &upload(dir.path()))
            .unwrap_err();

        assert!(matches!(error, ApiError::Rejected { ref message } if message == "quota exceeded"));
        assert!(!error.is_timeout());
    }

    #[test]
    fn error_body_message_is_surfaced() {
        let (base_url, _handle) = serve_once(
            "401 Unauthorized",
            r#"{"error":"invalid refresh token","status":401}"#,
        );

        let error = client(&base_url, Duration::from_secs(5))
            .refresh_token("stale")
            .unwrap_err();

        assert!(matches!(
            error,
            ApiError::Api { status: 401, ref message } if message == "invalid refresh token"
        ));
    }

    #[test]
    fn unparseable_error_body_keeps_status_and_body() {
        let (base_url, _handle) = serve_once("502 Bad Gateway", "upstream unavailable");

        let error = client(&base_url, Duration::from_secs(5))
            .refresh_token("stale")
            .unwrap_err();

        assert!(matches!(
            error,
            ApiError::UnexpectedStatus { status: 502, ref body } if body == "upstream unavailable"
        ));
    }

    #[test]
    fn refresh_returns_new_pair() {
        let (base_url, handle) = serve_once(
            "200 OK",
            r#"{"token":"new-access","refresh_token":"new-refresh"}"#,
        );

        let pair = client(&base_url, Duration::from_secs(5))
            .refresh_token("old-refresh")
            .unwrap();

        assert_eq!(pair.access_token, "new-access");
        assert_eq!(pair.refresh_token, "new-refresh");

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /api/auth/refresh "));
        assert!(request.contains(r#"{"refresh_token":"old-refresh"}"#));
    }

    #[test]
    fn sign_up_expects_created() {
        let body = r#"{"success":true,"token":"t","refresh_token":"r","user":{"email":"dev@example.com"}}"#;

        let (base_url, _handle) = serve_once("201 Created", body);
        let session = client(&base_url, Duration::from_secs(5))
            .sign_up("dev@example.com", "password123")
            .unwrap();

        assert_eq!(session.tokens.access_token, "t");
        assert_eq!(session.email, "dev@example.com");

        let (base_url, _handle) = serve_once("200 OK", body);
        let error = client(&base_url, Duration::from_secs(5))
            .sign_up("dev@example.com", "password123")
            .unwrap_err();

        assert!(matches!(error, ApiError::UnexpectedStatus { status: 200, .. }));
    }
}
