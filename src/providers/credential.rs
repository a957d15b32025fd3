//! Superficial credential checks: presence, length, vendor prefix.
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// What a well-formed credential looks like for one vendor.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRule {
    pub env_var: &'static str,
    pub prefix: Option<&'static str>,
    pub min_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFormat {
    Valid,
    Invalid,
    Missing,
    NotRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub format: CredentialFormat,
    pub issue: Option<String>,
}

impl CredentialStatus {
    pub fn not_required() -> Self {
        CredentialStatus { format: CredentialFormat::NotRequired, issue: None }
    }

    pub fn is_configured(&self) -> bool {
        self.format != CredentialFormat::Missing
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.format, CredentialFormat::Valid | CredentialFormat::NotRequired)
    }

    /// Gate run before any outbound generation call.
    pub fn require(&self) -> AppResult<()> {
        let issue = || self.issue.clone().unwrap_or_default();
        match self.format {
            CredentialFormat::Valid | CredentialFormat::NotRequired => Ok(()),
            CredentialFormat::Missing => Err(AppError::MissingCredential(issue())),
            CredentialFormat::Invalid => Err(AppError::InvalidCredential(issue())),
        }
    }
}

impl CredentialRule {
    pub fn check(&self, key: Option<&str>) -> CredentialStatus {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return CredentialStatus {
                format: CredentialFormat::Missing,
                issue: Some(format!("{} is not configured", self.env_var)),
            };
        };
        if let Some(prefix) = self.prefix {
            if !key.starts_with(prefix) {
                return CredentialStatus {
                    format: CredentialFormat::Invalid,
                    issue: Some(format!("{} should start with '{}'", self.env_var, prefix)),
                };
            }
        }
        if key.len() < self.min_len {
            return CredentialStatus {
                format: CredentialFormat::Invalid,
                issue: Some(format!(
                    "{} looks truncated ({} chars, expected at least {})",
                    self.env_var,
                    key.len(),
                    self.min_len
                )),
            };
        }
        CredentialStatus { format: CredentialFormat::Valid, issue: None }
    }
}
