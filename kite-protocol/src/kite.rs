use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::query::KiteQuery;

/// The seven-tuple identity of a discoverable service instance.
///
/// All fields are required at registration and none may contain the path
/// separator `/`. The concatenation `/u/e/n/v/r/h/id` is the canonical
/// storage key; `id` alone also indexes the kite for id-only lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Kite {
    pub username: String,
    pub environment: String,
    pub name: String,
    pub version: String,
    pub region: String,
    pub hostname: String,
    pub id: String,
}

impl Kite {
    pub const FIELD_NAMES: [&'static str; 7] = [
        "username",
        "environment",
        "name",
        "version",
        "region",
        "hostname",
        "id",
    ];

    fn fields(&self) -> [&str; 7] {
        [
            &self.username,
            &self.environment,
            &self.name,
            &self.version,
            &self.region,
            &self.hostname,
            &self.id,
        ]
    }

    /// Enforce the identity rules: every field populated, no separators.
    pub fn validate(&self) -> Result<(), IdentityError> {
        for (value, name) in self.fields().iter().zip(Self::FIELD_NAMES) {
            if value.is_empty() {
                return Err(IdentityError::EmptyField(name));
            }
            if value.contains('/') {
                return Err(IdentityError::SeparatorInField(name));
            }
        }
        Ok(())
    }

    /// The canonical key, `/username/environment/name/version/region/hostname/id`.
    pub fn key(&self) -> String {
        format!("/{}", self.fields().join("/"))
    }

    /// An exact query matching only this kite.
    pub fn query(&self) -> KiteQuery {
        KiteQuery {
            username: self.username.clone(),
            environment: self.environment.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            region: self.region.clone(),
            hostname: self.hostname.clone(),
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for Kite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Kite {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('/').ok_or_else(|| IdentityError::MalformedPath(s.into()))?;
        let segs: Vec<&str> = trimmed.split('/').collect();
        let [username, environment, name, version, region, hostname, id] = segs[..] else {
            return Err(IdentityError::MalformedPath(s.into()));
        };

        let kite = Kite {
            username: username.into(),
            environment: environment.into(),
            name: name.into(),
            version: version.into(),
            region: region.into(),
            hostname: hostname.into(),
            id: id.into(),
        };
        kite.validate().map_err(|_| IdentityError::MalformedPath(s.into()))?;
        Ok(kite)
    }
}
