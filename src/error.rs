use std::fmt::{self, Display};

/// Failure categories raised by the query layer itself.
///
/// Everything the underlying provider raises passes through as a plain
/// [`crate::Error`] without being wrapped; these variants cover only the
/// conditions this crate detects. They travel inside [`crate::Error`] and can
/// be recovered with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The submitted query contains no entity-set marker node, so it was not
    /// built through the sanctioned entry point.
    InvalidQueryOrigin,
    /// Asynchronous execution was requested from a provider that cannot do it.
    AsyncUnsupported,
    /// The live context exposes no entity set under the requested name.
    UnknownEntitySet(String),
    /// A substitution or construction step produced an unexpected result.
    /// Always a defect in this crate or in a provider, never a usage error.
    Internal(&'static str),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidQueryOrigin => f.write_str(
                "The supplied query does not originate from an entity-set root and therefore does not come from a sanctioned query source",
            ),
            QueryError::AsyncUnsupported => {
                f.write_str("Cannot execute an async query on a non async query provider")
            }
            QueryError::UnknownEntitySet(name) => {
                write!(f, "The context exposes no entity set named `{}`", name)
            }
            QueryError::Internal(detail) => write!(f, "Internal invariant violated: {}", detail),
        }
    }
}

impl std::error::Error for QueryError {}
