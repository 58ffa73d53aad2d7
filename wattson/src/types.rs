use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use time::OffsetDateTime;

// =============================================================================
// SESSION TYPES
// =============================================================================

/// Opaque bearer token issued by the backend on login.
///
/// The client never inspects its contents; `Debug` is redacted so the token
/// does not end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Display identity paired with a [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Result of a successful `login/` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub credential: Credential,
    pub identity: Identity,
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("email pattern is valid")
});

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Body of `POST register/`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

impl RegisterForm {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        password2: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            password2: password2.into(),
        }
    }

    /// Checks the form the same way the registration page does before it
    /// submits anything.
    ///
    /// # Errors
    /// Returns the first failing rule as a user-facing message.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("Username is required".to_string());
        }
        if self.username.chars().count() < MIN_USERNAME_LEN {
            return Err(format!(
                "Username must be at least {MIN_USERNAME_LEN} characters"
            ));
        }
        if self.email.trim().is_empty() {
            return Err("Email is required".to_string());
        }
        if !EMAIL_PATTERN.is_match(&self.email) {
            return Err("Invalid email address".to_string());
        }
        if self.password.is_empty() {
            return Err("Password is required".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if self.password2.is_empty() {
            return Err("Please confirm your password".to_string());
        }
        if self.password2 != self.password {
            return Err("Passwords do not match".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

/// Token pair returned by `POST login/`. Only `access` is used.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Granularity of the energy series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    #[default]
    Monthly,
}

impl Period {
    pub const VALUES: [&'static str; 3] = ["hourly", "daily", "monthly"];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!(
                "invalid period '{other}', expected one of: {}",
                Self::VALUES.join(", ")
            )),
        }
    }
}

/// One bucket of the energy series.
///
/// Monthly and daily buckets carry a `name` label ("Jan", "01 Jan"), hourly
/// buckets an `hour` label ("13:00").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPoint {
    /// Consumption in kWh for the bucket
    pub consumption: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
}

impl EnergyPoint {
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.hour.as_deref())
            .unwrap_or_default()
    }
}

/// Highest single reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub value: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// Aggregate statistics returned by `GET statistics/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Total consumption in kWh
    pub total_consumption: f64,
    /// Average consumption per day in kWh
    pub average_daily: f64,
    pub peak_consumption: Peak,
    /// Total consumption priced at the backend's flat rate
    pub estimated_cost: f64,
}
