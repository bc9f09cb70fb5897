use thiserror::Error;

/// Structural index errors: a corrupt or truncated index file. Fatal at
/// load time and never recoverable per query.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("malformed header length field {0:?}")]
    BadHeader(String),

    #[error("byte offset {0} is beyond the end of the index file")]
    OffsetBeyondEnd(u64),

    #[error("corrupt index data at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-query errors. Recovered at the session loop: the offending query
/// produces an empty result line and the session continues.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("wildcard pattern `*` would match every term")]
    BareWildcard,

    #[error("boolean expression error: {0}")]
    BadExpression(String),

    /// A structural failure surfaced while evaluating a query. Callers
    /// should treat this as fatal, unlike the other variants.
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = IndexError::BadHeader("12x".into());
        assert!(err.to_string().contains("12x"));
        let err = QueryError::BareWildcard;
        assert!(err.to_string().contains('*'));
    }
}
