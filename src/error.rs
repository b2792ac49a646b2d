//! Error types for the injection runtime.

use std::fmt;

/// Injection errors.
///
/// A single error kind covering the three failure categories of the runtime:
/// configuration errors (malformed bindings or descriptors), resolution
/// errors (missing or empty bindings, failing factories), and graph errors
/// (dependency cycles, collection ordering cycles, duplicate set values).
///
/// # Examples
///
/// ```rust
/// use bindery::{DiError, InjectorBuilder};
///
/// let injector = InjectorBuilder::new().build().unwrap();
/// match injector.get_instance::<String>() {
///     Err(DiError::NotFound(key)) => assert!(key.contains("String")),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// No binding for the key and dynamic bindings are disabled.
    NotFound(String),
    /// A provider produced no value where one was required.
    Absent(String),
    /// Malformed configuration: forbidden override, missing constructor,
    /// ambiguous qualifiers, or similar.
    Configuration(String),
    /// Circular dependency detected; carries the full key chain.
    Circular(Vec<String>),
    /// Ordering cycle inside a list binding; carries the unresolved elements.
    OrderingCycle(Vec<String>),
    /// A value equal to an existing one was contributed to a set binding.
    DuplicateElement(String),
    /// Type downcast failed while unwrapping an erased service value.
    TypeMismatch(&'static str),
    /// Any of the above, decorated with the injection trace captured while
    /// the failure unwound.
    Traced {
        source: Box<DiError>,
        trace: Vec<String>,
    },
}

impl DiError {
    /// Coarse failure category, matching the taxonomy above.
    pub fn category(&self) -> &'static str {
        match self {
            DiError::Configuration(_) => "configuration",
            DiError::NotFound(_) | DiError::Absent(_) | DiError::TypeMismatch(_) => "resolution",
            DiError::Circular(_) | DiError::OrderingCycle(_) | DiError::DuplicateElement(_) => {
                "graph"
            }
            DiError::Traced { source, .. } => source.category(),
        }
    }

    /// Wraps `self` with a captured injection trace. A no-op for an empty
    /// trace, and an existing trace is never replaced.
    pub(crate) fn with_trace(self, trace: Vec<String>) -> DiError {
        if trace.is_empty() || matches!(self, DiError::Traced { .. }) {
            return self;
        }
        DiError::Traced {
            source: Box::new(self),
            trace,
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotFound(key) => write!(f, "no binding for {}", key),
            DiError::Absent(key) => write!(f, "no value available for {}", key),
            DiError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            DiError::Circular(chain) => {
                write!(f, "circular dependency: {}", chain.join(" -> "))
            }
            DiError::OrderingCycle(keys) => {
                write!(f, "ordering cycle among list elements: {}", keys.join(", "))
            }
            DiError::DuplicateElement(value) => {
                write!(f, "duplicate value contributed to set binding: {}", value)
            }
            DiError::TypeMismatch(name) => write!(f, "type mismatch for {}", name),
            DiError::Traced { source, trace } => {
                write!(f, "{}", source)?;
                write!(f, "\n  injection trace:")?;
                for line in trace.iter().rev() {
                    write!(f, "\n    resolving {}", line)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for DiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiError::Traced { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for injection operations.
pub type DiResult<T> = Result<T, DiError>;
