pub mod dashboard;
pub mod guard;
pub mod route;
pub mod session;
pub mod store;
pub mod types;

use crate::session::SessionManager;
use crate::types::{
    EnergyPoint, Identity, LoginRequest, LoginResponse, Period, RegisterForm, SignedIn,
    Statistics, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

pub use crate::types::Credential;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
/// Per-request timeout of a client built with [`WattsonClient::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TRANSPORT_MESSAGE: &str = "Unable to reach the server. Please check your connection.";
const TIMEOUT_MESSAGE: &str = "The server took too long to respond. Please try again.";
const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully!";

/// A failed gateway call. `Display` is the message meant for the user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never got a response.
    #[error("{message}")]
    Transport {
        message: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{message}")]
    Timeout { message: String },
    /// 4xx: the server refused the input.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// 5xx.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// The input failed client-side checks and was not sent.
    #[error("{0}")]
    Invalid(String),
    /// A 2xx response whose body could not be used.
    #[error("{message}")]
    Decode { message: String, detail: String },
}

impl Error {
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. }
            | Self::Timeout { message }
            | Self::Rejected { message, .. }
            | Self::Server { message, .. }
            | Self::Invalid(message)
            | Self::Decode { message, .. } => message,
        }
    }

    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(endpoint: Endpoint, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: TIMEOUT_MESSAGE.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode {
                message: endpoint.fallback.to_string(),
                detail: err.to_string(),
            }
        } else {
            Self::Transport {
                message: TRANSPORT_MESSAGE.to_string(),
                source: err,
            }
        }
    }

    fn from_status(endpoint: Endpoint, status: StatusCode, body: &str) -> Self {
        let status_code = status.as_u16();
        if status.is_server_error() {
            return Self::Server {
                status: status_code,
                message: endpoint.fallback.to_string(),
            };
        }
        let message = server_message(body, endpoint.error_key)
            .unwrap_or_else(|| endpoint.fallback.to_string());
        Self::Rejected {
            status: status_code,
            message,
        }
    }
}

/// Static description of one backend route.
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    path: &'static str,
    /// Key the backend uses for its error message on this route
    error_key: &'static str,
    fallback: &'static str,
    /// A 401 here means the stored credential is no longer valid
    requires_auth: bool,
}

const REGISTER: Endpoint = Endpoint {
    path: "register/",
    error_key: "message",
    fallback: "Registration failed. Please try again.",
    requires_auth: false,
};

const LOGIN: Endpoint = Endpoint {
    path: "login/",
    error_key: "detail",
    fallback: "Login failed. Please check your credentials.",
    requires_auth: false,
};

const UPLOAD_CSV: Endpoint = Endpoint {
    path: "upload-csv/",
    error_key: "error",
    fallback: "Failed to upload file. Please try again.",
    requires_auth: true,
};

const ENERGY_DATA: Endpoint = Endpoint {
    path: "energy-data/",
    error_key: "error",
    fallback: "Failed to load dashboard data. Please try again.",
    requires_auth: true,
};

const STATISTICS: Endpoint = Endpoint {
    path: "statistics/",
    error_key: "error",
    fallback: "Failed to load dashboard data. Please try again.",
    requires_auth: true,
};

/// Picks the user-facing message out of an error body.
///
/// Looks at `key` first, then at the first field error of a
/// `{"field": ["message", ...]}` body.
fn server_message(body: &str, key: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    if let Some(message) = object.get(key).and_then(first_text) {
        return Some(message);
    }
    object.values().find_map(first_text)
}

fn first_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

/// HTTP gateway to the energy-tracking backend.
///
/// Every request carries the current credential from the [`SessionManager`]
/// as a bearer token when one exists.
#[derive(Clone)]
pub struct WattsonClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    session: Arc<SessionManager>,
}

impl WattsonClient {
    async fn send(&self, endpoint: Endpoint, request: RequestBuilder) -> Result<Response, Error> {
        let credential = self.session.credential();
        let mut request = request.timeout(self.timeout);
        if let Some(credential) = &credential {
            request = request.bearer_auth(credential.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| Error::from_reqwest(endpoint, err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::debug!(path = endpoint.path, status = status.as_u16(), "request failed");
        if status == StatusCode::UNAUTHORIZED && endpoint.requires_auth {
            if let Some(credential) = &credential {
                self.session.invalidate(credential);
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::from_status(endpoint, status, &body))
    }

    async fn get<T, U>(&self, endpoint: Endpoint, query: &U) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
        U: serde::ser::Serialize + ?Sized,
    {
        let request = self.client.get(self.url(endpoint)).query(query);
        let response = self.send(endpoint, request).await?;
        response
            .json()
            .await
            .map_err(|err| Error::from_reqwest(endpoint, err))
    }

    async fn post<T, U>(&self, endpoint: Endpoint, body: &U) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
        U: serde::ser::Serialize + ?Sized,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        let response = self.send(endpoint, request).await?;
        response
            .json()
            .await
            .map_err(|err| Error::from_reqwest(endpoint, err))
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path)
    }

    /// Creates a client against [`DEFAULT_BASE_URL`] that reads its
    /// credential from `session`.
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            session,
        }
    }

    /// Sets the API base URL (the `/api/` prefix included).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    /// Fails any request that takes longer than `timeout` with
    /// [`Error::Timeout`]. Defaults to [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Creates an account. The form is validated before anything is sent.
    ///
    /// # Errors
    /// Returns [`Error::Invalid`] for a form that fails validation, or the
    /// mapped failure of the request.
    pub async fn register(&self, form: &RegisterForm) -> Result<(), Error> {
        form.validate().map_err(Error::Invalid)?;
        let request = self.client.post(self.url(REGISTER)).json(form);
        self.send(REGISTER, request).await?;
        tracing::info!(user = %form.username, "account registered");
        Ok(())
    }

    /// Exchanges username and password for a credential.
    ///
    /// This does not change the session; hand the result to
    /// [`SessionManager::login`].
    ///
    /// # Errors
    /// Returns an error if a field is empty, the request fails, or the
    /// response carries no access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<SignedIn, Error> {
        if username.trim().is_empty() {
            return Err(Error::Invalid("Username is required".to_string()));
        }
        if password.is_empty() {
            return Err(Error::Invalid("Password is required".to_string()));
        }

        let response: LoginResponse = self
            .post(LOGIN, &LoginRequest { username, password })
            .await?;
        match response.access {
            Some(access) if !access.is_empty() => Ok(SignedIn {
                credential: Credential::new(access),
                identity: Identity::new(username),
            }),
            _ => Err(Error::Decode {
                message: LOGIN.fallback.to_string(),
                detail: "response has no access token".to_string(),
            }),
        }
    }

    /// Uploads a CSV file of readings and returns the server's summary.
    ///
    /// # Errors
    /// Returns [`Error::Invalid`] if the file is not a non-empty `.csv`, or
    /// the mapped failure of the request.
    pub async fn upload_csv(&self, file_name: &str, contents: Vec<u8>) -> Result<String, Error> {
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(Error::Invalid("File must be a CSV".to_string()));
        }
        if contents.is_empty() {
            return Err(Error::Invalid("Please select a CSV file".to_string()));
        }

        let part = Part::bytes(contents).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let request = self.client.post(self.url(UPLOAD_CSV)).multipart(form);
        let response = self.send(UPLOAD_CSV, request).await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| Error::from_reqwest(UPLOAD_CSV, err))?;
        Ok(body
            .message
            .unwrap_or_else(|| UPLOAD_SUCCESS_MESSAGE.to_string()))
    }

    /// Retrieves the consumption series bucketed by `period`.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn get_energy_data(&self, period: Period) -> Result<Vec<EnergyPoint>, Error> {
        self.get(ENERGY_DATA, &[("period", period.as_str())]).await
    }

    /// Retrieves aggregate statistics over all uploaded readings.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn get_statistics(&self) -> Result<Statistics, Error> {
        self.get::<Statistics, [(&str, &str)]>(STATISTICS, &[]).await
    }
}
