use semver::{Version, VersionReq};

use crate::error::QueryError;

/// What a query's version field turned out to be.
#[derive(Debug, Clone)]
pub enum VersionSpec {
    /// A single concrete version; treated as an exact key segment.
    Exact(Version),
    /// A range expression; drives the post-fetch constraint filter.
    Constraint(VersionConstraint),
}

impl VersionSpec {
    pub fn parse(raw: &str) -> Result<VersionSpec, QueryError> {
        if let Ok(version) = Version::parse(raw.trim()) {
            return Ok(VersionSpec::Exact(version));
        }
        VersionConstraint::parse(raw).map(VersionSpec::Constraint)
    }
}

/// A parsed version range.
///
/// Standard semver requirement syntax is accepted as-is. The pessimistic
/// operator `~>` is normalized before parsing: `~> X.Y` becomes
/// `>=X.Y, <X+1` and `~> X.Y.Z` becomes `>=X.Y.Z, <X.Y+1`.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    raw: String,
    req: VersionReq,
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<VersionConstraint, QueryError> {
        let normalized = normalize_pessimistic(raw)
            .ok_or_else(|| QueryError::BadConstraint(raw.to_string()))?;
        let req = VersionReq::parse(&normalized)
            .map_err(|_| QueryError::BadConstraint(raw.to_string()))?;
        Ok(VersionConstraint {
            raw: raw.to_string(),
            req,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// Whether a stored version string satisfies the constraint. Unparsable
    /// stored versions never match.
    pub fn admits(&self, stored: &str) -> bool {
        Version::parse(stored).map(|v| self.matches(&v)).unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Rewrite `~>` clauses into explicit ranges; other input passes through.
/// Returns `None` when a `~>` clause is malformed.
fn normalize_pessimistic(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("~>") else {
        return Some(trimmed.to_string());
    };

    let base = rest.trim();
    let parts: Vec<&str> = base.split('.').collect();
    let numbers: Option<Vec<u64>> = parts.iter().map(|p| p.parse().ok()).collect();
    let numbers = numbers?;

    match numbers[..] {
        [major, minor] => Some(format!(">={major}.{minor}, <{}", major + 1)),
        [major, minor, patch] => {
            Some(format!(">={major}.{minor}.{patch}, <{major}.{}", minor + 1))
        }
        _ => None,
    }
}
