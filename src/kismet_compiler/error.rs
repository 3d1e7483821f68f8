// Compiler Error Handling

use crate::kismet_compiler::ast::SourceSpan;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompilerError {
    // Structural / semantic errors
    SemanticError(String, SourceSpan),
    UnexpectedNode {
        site: String,
        found: String,
        span: SourceSpan,
    },
    UnknownSymbol {
        name: String,
        span: SourceSpan,
    },
    DuplicateSymbol {
        name: String,
        span: SourceSpan,
    },
    DuplicateLabel {
        name: String,
        span: SourceSpan,
    },
    UnsupportedOperator {
        operator: String,
        left: String,
        right: String,
        span: SourceSpan,
    },
    UnsupportedCast {
        from: String,
        to: String,
        span: SourceSpan,
    },
    IntrinsicArgument {
        intrinsic: String,
        message: String,
        span: SourceSpan,
    },

    // Resolution errors
    NameNotFound {
        candidates: Vec<String>,
    },
    AmbiguousName {
        candidate: String,
        matches: Vec<String>,
    },
    AmbiguousMemberContext {
        member: String,
        classes: Vec<String>,
        span: SourceSpan,
    },

    // Invariant violations
    InternalError(String),

    // Driver errors
    ConfigError(String),
    IOError(String),
}

impl CompilerError {
    /// Source position of the offending node, when the error has one
    pub fn span(&self) -> Option<SourceSpan> {
        match self {
            CompilerError::SemanticError(_, span)
            | CompilerError::UnexpectedNode { span, .. }
            | CompilerError::UnknownSymbol { span, .. }
            | CompilerError::DuplicateSymbol { span, .. }
            | CompilerError::DuplicateLabel { span, .. }
            | CompilerError::UnsupportedOperator { span, .. }
            | CompilerError::UnsupportedCast { span, .. }
            | CompilerError::IntrinsicArgument { span, .. }
            | CompilerError::AmbiguousMemberContext { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub fn unexpected(site: &str, found: impl fmt::Debug, span: SourceSpan) -> Self {
        CompilerError::UnexpectedNode {
            site: site.to_string(),
            found: format!("{:?}", found),
            span,
        }
    }

    pub fn intrinsic(intrinsic: &str, message: impl Into<String>, span: SourceSpan) -> Self {
        CompilerError::IntrinsicArgument {
            intrinsic: intrinsic.to_string(),
            message: message.into(),
            span,
        }
    }

    pub fn bug(message: impl Into<String>) -> Self {
        CompilerError::InternalError(format!("COMPILER BUG: {}", message.into()))
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::SemanticError(msg, span) => {
                write!(f, "Semantic error at {}: {}", span, msg)
            }
            CompilerError::UnexpectedNode { site, found, span } => {
                write!(f, "Unexpected node at {} while compiling {}: {}", span, site, found)
            }
            CompilerError::UnknownSymbol { name, span } => {
                write!(f, "Unknown symbol '{}' at {}", name, span)
            }
            CompilerError::DuplicateSymbol { name, span } => {
                write!(f, "Duplicate symbol '{}' at {}", name, span)
            }
            CompilerError::DuplicateLabel { name, span } => {
                write!(f, "Duplicate label '{}' at {}", name, span)
            }
            CompilerError::UnsupportedOperator {
                operator,
                left,
                right,
                span,
            } => {
                write!(
                    f,
                    "Operator '{}' is not defined for {} and {} at {}",
                    operator, left, right, span
                )
            }
            CompilerError::UnsupportedCast { from, to, span } => {
                write!(f, "Cannot cast {} to {} at {}", from, to, span)
            }
            CompilerError::IntrinsicArgument {
                intrinsic,
                message,
                span,
            } => {
                write!(f, "Invalid arguments to {} at {}: {}", intrinsic, span, message)
            }
            CompilerError::NameNotFound { candidates } => {
                write!(f, "Name not found, tried: {}", candidates.join(", "))
            }
            CompilerError::AmbiguousName { candidate, matches } => {
                write!(
                    f,
                    "Ambiguous name '{}' matches {}",
                    candidate,
                    matches.join(", ")
                )
            }
            CompilerError::AmbiguousMemberContext {
                member,
                classes,
                span,
            } => {
                write!(
                    f,
                    "Member '{}' at {} is declared by several classes: {}",
                    member,
                    span,
                    classes.join(", ")
                )
            }
            CompilerError::InternalError(msg) => {
                write!(f, "Internal compiler error: {}", msg)
            }
            CompilerError::ConfigError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            CompilerError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::IOError(err.to_string())
    }
}

impl From<toml::de::Error> for CompilerError {
    fn from(err: toml::de::Error) -> Self {
        CompilerError::ConfigError(err.to_string())
    }
}
