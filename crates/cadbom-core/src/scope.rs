//! Project scope: the namespace that partitions one BOM graph from another.

use crate::error::BomError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const FILE_STEM_MAX_CHARS: usize = 48;
const DIGEST_PREFIX_CHARS: usize = 12;

/// A project identity formed from project number and project name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ScopeRepr", into = "ScopeRepr")]
pub struct Scope {
    project_number: String,
    project_name: String,
}

impl Scope {
    /// Both parts are trimmed and must be non-empty.
    ///
    /// A part may not start or end with `:` or contain `::`, so that
    /// [`Scope::key`] splits back into exactly one pair. Path separators,
    /// control characters and the names `.` and `..` are refused because the
    /// project name doubles as a directory name.
    pub fn new(project_number: &str, project_name: &str) -> Result<Self, BomError> {
        let project_number = project_number.trim();
        let project_name = project_name.trim();
        if project_number.is_empty() || project_name.is_empty() {
            return Err(BomError::InvalidScope(
                "projectNumber and projectName are both required".to_string(),
            ));
        }
        check_part("projectNumber", project_number)?;
        check_part("projectName", project_name)?;
        Ok(Self {
            project_number: project_number.to_string(),
            project_name: project_name.to_string(),
        })
    }

    pub fn project_number(&self) -> &str {
        &self.project_number
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Stable identity string: `"{projectNumber}::{projectName}"`.
    pub fn key(&self) -> String {
        format!("{}::{}", self.project_number, self.project_name)
    }

    /// Filesystem-safe document stem.
    ///
    /// The readable prefix is lossy, so a digest of the full key keeps two
    /// scopes that sanitize alike from sharing a document.
    pub fn file_stem(&self) -> String {
        let readable: String = self
            .key()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .take(FILE_STEM_MAX_CHARS)
            .collect();
        let digest = Sha256::digest(self.key().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{readable}-{}", &hex[..DIGEST_PREFIX_CHARS])
    }
}

fn check_part(field: &str, value: &str) -> Result<(), BomError> {
    let invalid = |reason: &str| Err(BomError::InvalidScope(format!("{field} `{value}` {reason}")));
    if value.starts_with(':') || value.ends_with(':') || value.contains("::") {
        return invalid("may not start or end with `:` or contain `::`");
    }
    if value.contains(['/', '\\']) || value.chars().any(char::is_control) {
        return invalid("may not contain path separators or control characters");
    }
    if value == "." || value == ".." {
        return invalid("is not a usable name");
    }
    Ok(())
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.project_number, self.project_name)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeRepr {
    project_number: String,
    project_name: String,
}

impl TryFrom<ScopeRepr> for Scope {
    type Error = BomError;

    fn try_from(repr: ScopeRepr) -> Result<Self, Self::Error> {
        Scope::new(&repr.project_number, &repr.project_name)
    }
}

impl From<Scope> for ScopeRepr {
    fn from(scope: Scope) -> Self {
        Self {
            project_number: scope.project_number,
            project_name: scope.project_name,
        }
    }
}
