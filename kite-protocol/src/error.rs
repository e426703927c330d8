/// A kite identity failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A required field is empty.
    EmptyField(&'static str),
    /// A field contains the path separator `/`.
    SeparatorInField(&'static str),
    /// A canonical path string did not have seven segments.
    MalformedPath(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::EmptyField(field) => write!(f, "kite field '{field}' is empty"),
            IdentityError::SeparatorInField(field) => {
                write!(f, "kite field '{field}' contains '/'")
            }
            IdentityError::MalformedPath(path) => {
                write!(f, "'{path}' is not a kite path of seven segments")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// A discovery query is syntactically unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The username field is required for every non-id query.
    MissingUsername,
    /// An empty field is followed by a populated one.
    Gap { empty: &'static str, populated: &'static str },
    /// The version field parses as neither a version nor a constraint.
    BadConstraint(String),
    /// A populated field contains the path separator.
    SeparatorInField(&'static str),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::MissingUsername => f.write_str("query has no username"),
            QueryError::Gap { empty, populated } => {
                write!(f, "query field '{populated}' is set but '{empty}' before it is empty")
            }
            QueryError::BadConstraint(raw) => {
                write!(f, "'{raw}' is neither a version nor a version constraint")
            }
            QueryError::SeparatorInField(field) => {
                write!(f, "query field '{field}' contains '/'")
            }
        }
    }
}

impl std::error::Error for QueryError {}
