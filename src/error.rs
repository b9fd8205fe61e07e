//! Error types for the query-execution pipeline.
//!
//! Only [`TrapiError::InvalidQueryGraph`] is meant to escape [`crate::engine::Engine::execute`];
//! every other variant is caught, logged, and folded into an empty response (see §7 of the
//! specification this crate implements).

/// Create an internal error.
///
/// # Example
/// ```
/// use trapi_query_engine::error::TrapiError;
/// use trapi_query_engine::internal_error;
///
/// fn example(found: Option<()>) -> Result<(), TrapiError> {
///     found.ok_or_else(|| internal_error!("expected a value, found none"))?;
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! internal_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::TrapiError::Internal { message: format!( $( $arg )+ ) }
    }
}

/// Break out of the current function, returning an internal error.
#[macro_export]
macro_rules! bail {
    ( $( $arg:tt )+ ) => {
        return Err($crate::internal_error!( $( $arg )+ ))
    }
}

/// An assertion that becomes an internal error (rather than a panic) in release builds.
#[macro_export]
macro_rules! ensure {
    ( $expr:expr, $( $arg:tt )+ ) => {
        if !$expr {
            $crate::bail!( $( $arg )+ );
        }
    }
}

/// The HTTP status code a boundary error should be reported with, per §6 "Errors at boundary".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

#[derive(Debug, Clone, thiserror::Error)]
pub enum TrapiError {
    /// Fatal: a structural problem with the client's query graph (§7a). The only variant
    /// that propagates out of the engine rather than degrading to an empty result.
    #[error("invalid query graph: {message}")]
    InvalidQueryGraph { message: String },

    /// Warning: no MetaKG operation matches an execution edge's (subject, predicate, object)
    /// triple (§7b). Short-circuits the remaining loop.
    #[error("no operations available for edge {qedge_id}")]
    NoOperationsAvailable { qedge_id: String },

    /// Warning: an edge (or the intersection of constraints across edges) produced zero
    /// surviving records (§7c). Short-circuits the remaining loop; not itself an error to the
    /// client, just a signal the engine loop reacts to.
    #[error("zero records survived for edge {qedge_id}")]
    ZeroRecords { qedge_id: String },

    /// A downstream API call failed (§7e). Logged and tallied, never aborts the query.
    #[error("downstream API {api} failed: {message}")]
    DownstreamApiError { api: String, message: String },

    /// Something that should be impossible happened; always a bug in this crate.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl TrapiError {
    pub fn invalid_query_graph(message: impl Into<String>) -> Self {
        TrapiError::InvalidQueryGraph {
            message: message.into(),
        }
    }

    /// Status code to report at the TRAPI HTTP boundary. Only [`TrapiError::InvalidQueryGraph`]
    /// is meant to be surfaced this way; other variants are handled internally by the engine.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TrapiError::InvalidQueryGraph { .. } => StatusCode(400),
            _ => StatusCode(500),
        }
    }

    /// A stable, machine-readable name for the error kind, independent of the display message.
    pub fn name(&self) -> &'static str {
        match self {
            TrapiError::InvalidQueryGraph { .. } => "InvalidQueryGraph",
            TrapiError::NoOperationsAvailable { .. } => "NoOperationsAvailable",
            TrapiError::ZeroRecords { .. } => "ZeroRecords",
            TrapiError::DownstreamApiError { .. } => "DownstreamApiError",
            TrapiError::Internal { .. } => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_query_graph_is_400() {
        let err = TrapiError::invalid_query_graph("edge e1 references unknown node n9");
        assert_eq!(err.status_code(), StatusCode(400));
        assert_eq!(err.name(), "InvalidQueryGraph");
    }

    #[test]
    fn other_kinds_are_500() {
        let err = TrapiError::ZeroRecords {
            qedge_id: "e01".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode(500));
    }

    #[test]
    fn internal_error_macro_builds_internal_variant() {
        let err: TrapiError = internal_error!("node {} missing", 3);
        assert!(matches!(err, TrapiError::Internal { .. }));
    }
}
