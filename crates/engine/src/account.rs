use std::fmt;

/// Bearer secret used to authorize report requests on behalf of one login.
///
/// The value never shows up in `Debug` output, so accounts can be logged
/// freely.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret, for building the authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// An advertising account, keyed by its login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub login: String,
    pub credential: Credential,
}

impl Account {
    pub fn new(login: impl Into<String>, credential: impl Into<Credential>) -> Self {
        Self {
            login: login.into(),
            credential: credential.into(),
        }
    }
}
