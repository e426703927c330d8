use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::kite::Kite;
use crate::version::{VersionConstraint, VersionSpec};

/// A discovery query over the canonical kite key space.
///
/// Fields mirror the identity tuple; an empty string means "unset". The
/// populated fields must be a leading run in the canonical order: an
/// empty field followed by a populated one is an invalid query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KiteQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub id: String,
}

/// The storage-facing rendering of a valid query: a key prefix, an
/// optional version constraint, and the trailing fields the constraint
/// path truncated away (matched after the fetch).
#[derive(Debug, Clone)]
pub struct QueryPrefix {
    pub path: String,
    pub constraint: Option<VersionConstraint>,
    pub region: Option<String>,
    pub hostname: Option<String>,
    pub id: Option<String>,
}

impl QueryPrefix {
    /// Whether a stored kite satisfies the constraint and trailing fields.
    pub fn admits(&self, kite: &Kite) -> bool {
        if let Some(constraint) = &self.constraint {
            if !constraint.admits(&kite.version) {
                return false;
            }
        }
        let trailing = [
            (&self.region, &kite.region),
            (&self.hostname, &kite.hostname),
            (&self.id, &kite.id),
        ];
        trailing
            .iter()
            .all(|(want, have)| want.as_deref().map(|w| w == have.as_str()).unwrap_or(true))
    }
}

impl KiteQuery {
    /// Query by id alone.
    pub fn by_id(id: impl Into<String>) -> KiteQuery {
        KiteQuery {
            id: id.into(),
            ..KiteQuery::default()
        }
    }

    fn fields(&self) -> [(&'static str, &str); 7] {
        [
            ("username", &self.username),
            ("environment", &self.environment),
            ("name", &self.name),
            ("version", &self.version),
            ("region", &self.region),
            ("hostname", &self.hostname),
            ("id", &self.id),
        ]
    }

    /// True when only `id` is populated, the id-only fast path.
    pub fn is_id_only(&self) -> bool {
        !self.id.is_empty()
            && self
                .fields()
                .iter()
                .take(6)
                .all(|(_, value)| value.is_empty())
    }

    /// Build the storage prefix per the canonical field order.
    ///
    /// A version that parses as a range truncates the prefix at `name`;
    /// the constraint and any trailing populated fields are then matched
    /// post-fetch.
    pub fn prefix(&self) -> Result<QueryPrefix, QueryError> {
        self.check_gaps()?;
        if self.username.is_empty() {
            return Err(QueryError::MissingUsername);
        }

        let version_spec = if self.version.is_empty() {
            None
        } else {
            Some(VersionSpec::parse(&self.version)?)
        };

        let mut segments: Vec<&str> = Vec::new();
        let mut constraint = None;

        match version_spec {
            Some(VersionSpec::Constraint(c)) => {
                // Prefix stops before the version segment.
                for &(_, value) in self.fields().iter().take(3) {
                    segments.push(value);
                }
                constraint = Some(c);
            }
            _ => {
                for &(_, value) in self.fields().iter() {
                    if value.is_empty() {
                        break;
                    }
                    segments.push(value);
                }
            }
        }

        let trailing_active = constraint.is_some();
        let some_if = |active: bool, value: &str| {
            (active && !value.is_empty()).then(|| value.to_string())
        };

        Ok(QueryPrefix {
            path: format!("/{}", segments.join("/")),
            constraint,
            region: some_if(trailing_active, &self.region),
            hostname: some_if(trailing_active, &self.hostname),
            id: some_if(trailing_active, &self.id),
        })
    }

    fn check_gaps(&self) -> Result<(), QueryError> {
        let fields = self.fields();
        for (i, &(empty_name, value)) in fields.iter().enumerate() {
            if !value.is_empty() {
                continue;
            }
            if let Some(&(populated, _)) = fields[i + 1..].iter().find(|(_, v)| !v.is_empty()) {
                return Err(QueryError::Gap {
                    empty: empty_name,
                    populated,
                });
            }
            break;
        }
        for (name, value) in self.fields() {
            if value.contains('/') {
                return Err(QueryError::SeparatorInField(name));
            }
        }
        Ok(())
    }

    /// The coarsest token audience this query encodes: `/u`, `/u/e`, or
    /// `/u/e/n`.
    pub fn audience(&self) -> Result<String, QueryError> {
        if self.username.is_empty() {
            return Err(QueryError::MissingUsername);
        }
        let mut path = format!("/{}", self.username);
        if !self.environment.is_empty() {
            path.push('/');
            path.push_str(&self.environment);
            if !self.name.is_empty() {
                path.push('/');
                path.push_str(&self.name);
            }
        }
        Ok(path)
    }
}
