use std::fmt;

/// Machine-readable error codes shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnsupportedType,
    BadKeyType,
    NoSuchPath,
    EmptyPath,
    CannotDeleteRoot,
    IndexOutOfRange,
    UnsupportedHandler,
    MissingArgument,
    BadArgument,
    EventNotFound,
    BrokenChain,
    NoCommonAncestor,
    HashMismatch,
    BadPosition,
    IncompatibleCheckpoint,
    OracleFailure,
    MalformedDocument,
    MalformedMessage,
    InvalidUrl,
    Io,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnsupportedType => "E1001",
            Self::BadKeyType => "E1002",
            Self::NoSuchPath => "E1003",
            Self::EmptyPath => "E1004",
            Self::CannotDeleteRoot => "E1005",
            Self::IndexOutOfRange => "E1006",
            Self::UnsupportedHandler => "E2001",
            Self::MissingArgument => "E2002",
            Self::BadArgument => "E2003",
            Self::EventNotFound => "E3001",
            Self::BrokenChain => "E3002",
            Self::NoCommonAncestor => "E3003",
            Self::HashMismatch => "E3004",
            Self::BadPosition => "E4001",
            Self::IncompatibleCheckpoint => "E4002",
            Self::OracleFailure => "E4003",
            Self::MalformedDocument => "E5001",
            Self::MalformedMessage => "E5002",
            Self::InvalidUrl => "E5004",
            Self::Io => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::UnsupportedType => "Value cannot be stored in a container",
            Self::BadKeyType => "Path key does not match container kind",
            Self::NoSuchPath => "Path does not resolve",
            Self::EmptyPath => "Path must have at least one key",
            Self::CannotDeleteRoot => "Cannot delete the root container",
            Self::IndexOutOfRange => "List index too far past the end",
            Self::UnsupportedHandler => "Unsupported event handler",
            Self::MissingArgument => "Event argument missing",
            Self::BadArgument => "Event argument has the wrong shape",
            Self::EventNotFound => "Event not found",
            Self::BrokenChain => "Parent hash does not resolve",
            Self::NoCommonAncestor => "Events share no common ancestor",
            Self::HashMismatch => "Content hash mismatch",
            Self::BadPosition => "Checkpoint position out of range",
            Self::IncompatibleCheckpoint => "Checkpoint is not compatible with and ahead of tip",
            Self::OracleFailure => "Timestamp service failure",
            Self::MalformedDocument => "Malformed document file",
            Self::MalformedMessage => "Malformed protocol message",
            Self::InvalidUrl => "Invalid deje URL",
            Self::Io => "I/O failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NoSuchPath => Some("Set the parent container first, or set a larger value at a shorter path."),
            Self::BadKeyType => Some("Use string keys for maps and non-negative integers for lists."),
            Self::IndexOutOfRange => Some("Lists grow a bounded number of slots per set; append closer to the end."),
            Self::UnsupportedHandler => Some("Only the SET and DELETE builtin handlers are available."),
            Self::BrokenChain => Some("Fetch the missing ancestor events from a peer and retry."),
            Self::HashMismatch => Some("The file was edited by hand or corrupted; re-export it from a peer."),
            Self::OracleFailure => Some("Retry once the timestamp service is reachable."),
            Self::InvalidUrl => Some("Use deje://host[:port]/path."),
            Self::MalformedDocument => Some("Check that the file is a deje document in JSON form."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
