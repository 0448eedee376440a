//! Error types for unlayout library.

use std::io;
use thiserror::Error;

/// Result type alias for unlayout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while rebuilding document structure.
///
/// Messy input (NaN geometry, missing fonts, empty text) never produces an
/// error; it is normalised and counted in the QA report instead. The
/// structural variants at the bottom indicate a defect in the engine itself.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON input or output.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input is not recognized as a fragment document.
    #[error("Unknown input format: expected a fragment document, page array or JSON lines")]
    UnknownFormat,

    /// The input parsed but violates the extraction contract.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A threshold or option has an unusable value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Error during rendering (JSON, Markdown, outline).
    #[error("Rendering error: {0}")]
    Render(String),

    /// The container stack would drop below the book root.
    #[error("Container stack underflow: attempted to pop the book root")]
    StackUnderflow,

    /// Two nodes were assigned the same identifier.
    #[error("Duplicate node id: {0}")]
    DuplicateId(String),

    /// A node is reachable from itself through parent links.
    #[error("Cyclic parent reference at node {0}")]
    CyclicParent(usize),

    /// A non-root node has no parent, or its parent does not list it.
    #[error("Node {0} is not attached to exactly one parent")]
    OrphanNode(usize),

    /// A node index does not exist in the tree arena.
    #[error("Node {0} does not exist")]
    NodeNotFound(usize),

    /// A write-once layout slot was written twice.
    #[error("Fragment {fragment}: {slot} slot assigned twice")]
    SlotReassigned {
        /// Fragment id
        fragment: usize,
        /// Slot name (column, row, order, block)
        slot: &'static str,
    },
}

impl Error {
    /// Whether this error is an engine invariant violation rather than a
    /// problem with the caller's input or environment.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::StackUnderflow
                | Error::DuplicateId(_)
                | Error::CyclicParent(_)
                | Error::OrphanNode(_)
                | Error::NodeNotFound(_)
                | Error::SlotReassigned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::StackUnderflow;
        assert_eq!(
            err.to_string(),
            "Container stack underflow: attempted to pop the book root"
        );

        let err = Error::PageOutOfRange(10, 5);
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );

        let err = Error::SlotReassigned {
            fragment: 7,
            slot: "column",
        };
        assert_eq!(err.to_string(), "Fragment 7: column slot assigned twice");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_invariant_classification() {
        assert!(Error::DuplicateId("Ch0001".into()).is_invariant_violation());
        assert!(Error::CyclicParent(3).is_invariant_violation());
        assert!(!Error::InvalidInput("x".into()).is_invariant_violation());
        assert!(!Error::Config("x".into()).is_invariant_violation());
    }
}
