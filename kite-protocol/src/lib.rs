//! Registry-facing protocol types: the seven-tuple kite identity, the
//! discovery query with its prefix and version-constraint rules, and the
//! wire shapes exchanged with the registry.

pub mod error;
pub mod kite;
pub mod query;
pub mod version;
pub mod wire;

pub use error::{IdentityError, QueryError};
pub use kite::Kite;
pub use query::{KiteQuery, QueryPrefix};
pub use version::{VersionConstraint, VersionSpec};
pub use wire::{
    Authentication, GetKitesResult, KiteWithToken, RegisterArgs, RegisterMachineArgs,
    RegisterResult, RegisterValue,
};
