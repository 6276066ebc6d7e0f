//! Project Identity
//!
//! The composite key that partitions all broadcast state: organization,
//! repository, review-request number and project name.
//!
//! The canonical string form is `org/repo/42/project`. It is what viewers see
//! on the log page and what the daemon logs as the `identity` field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building an [`Identity`] from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// A component was absent or empty
    #[error("missing `{0}` in identity")]
    MissingComponent(&'static str),

    /// The request number was not an unsigned integer
    #[error("invalid request number `{value}`: {reason}")]
    InvalidRequestNumber {
        /// The raw value that failed to parse
        value: String,
        /// Parser message
        reason: String,
    },

    /// The canonical form did not have exactly four segments
    #[error("expected `org/repo/number/project`, got `{0}`")]
    Malformed(String),
}

/// Identity of one project run inside a review request
///
/// Immutable once constructed. Equality and hashing cover all four
/// components, so two identities are the same key exactly when their
/// canonical strings are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "WireIdentity")]
pub struct Identity {
    #[serde(rename = "org")]
    organization: String,
    #[serde(rename = "repo")]
    repository: String,
    #[serde(rename = "pull")]
    request_number: u64,
    project: String,
}

impl Identity {
    /// Create an identity from already-validated parts
    pub fn new(
        organization: impl Into<String>,
        repository: impl Into<String>,
        request_number: u64,
        project: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            repository: repository.into(),
            request_number,
            project: project.into(),
        }
    }

    /// Build an identity from raw route parameters
    ///
    /// Every component must be non-empty and the request number must parse
    /// as an unsigned integer.
    pub fn from_parts(
        organization: &str,
        repository: &str,
        request_number: &str,
        project: &str,
    ) -> Result<Self, IdentityError> {
        let raw_number = require("pull", request_number)?;
        let request_number =
            raw_number
                .parse::<u64>()
                .map_err(|e| IdentityError::InvalidRequestNumber {
                    value: raw_number.to_string(),
                    reason: e.to_string(),
                })?;

        Self::checked(organization, repository, request_number, project)
    }

    /// Trim and validate the text components
    ///
    /// Route parameters and ingest events both go through here, so the same
    /// project always maps to the same key.
    fn checked(
        organization: &str,
        repository: &str,
        request_number: u64,
        project: &str,
    ) -> Result<Self, IdentityError> {
        Ok(Self::new(
            require("org", organization)?,
            require("repo", repository)?,
            request_number,
            require("project", project)?,
        ))
    }

    /// Organization (repository owner)
    #[must_use]
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Repository name
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// `owner/name` form of the repository
    #[must_use]
    pub fn repository_full_name(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }

    /// Review-request number
    #[must_use]
    pub fn request_number(&self) -> u64 {
        self.request_number
    }

    /// Project (sub-project) name
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

}

/// Unvalidated identity fields as they arrive on the ingest wire
#[derive(Deserialize)]
struct WireIdentity {
    org: String,
    repo: String,
    pull: u64,
    project: String,
}

impl TryFrom<WireIdentity> for Identity {
    type Error = IdentityError;

    fn try_from(wire: WireIdentity) -> Result<Self, Self::Error> {
        Self::checked(&wire.org, &wire.repo, wire.pull, &wire.project)
    }
}

fn require<'a>(name: &'static str, value: &'a str) -> Result<&'a str, IdentityError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IdentityError::MissingComponent(name));
    }
    Ok(value)
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.organization, self.repository, self.request_number, self.project
        )
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [org, repo, number, project] => Self::from_parts(org, repo, number, project),
            _ => Err(IdentityError::Malformed(s.to_string())),
        }
    }
}
