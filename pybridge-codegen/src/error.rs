// Error types for the pybridge code generator.

use std::fmt;
use std::path::PathBuf;

/// Rich error type for wrapper generation.
///
/// A `GenError` aborts generation of the callable that triggered it, never
/// the whole run: the driver reports it and moves on to the next callable.
#[derive(Debug)]
pub enum GenError {
    /// A type string was registered twice in the same registry table.
    TypeConflict { table: &'static str, ctype: String },
    /// No handler (direct or via transformation) claims this type string.
    UnknownType { table: &'static str, ctype: String },
    /// The type's handler does not support the requested direction.
    UnsupportedDirection { ctype: String, direction: String },
    /// A declared variable base name contains illegal characters.
    InvalidVariableName(String),
    /// Some accumulator entries carry parameter names and some do not.
    MixedKeywords,
    /// A mandatory parameter follows an optional one.
    OptionalOrder(String),
    /// A conversion hook is not available for this type/direction pair.
    MissingConversion { ctype: String, conversion: &'static str },
    /// Contradictory per-type options (e.g. ownership given twice).
    TypeConfiguration(String),
    /// Overload candidates derived different calling-convention flags.
    InconsistentOverloadFlags(String),
    /// A value was routed into the outbound tuple of a value-less wrapper.
    UnexpectedReturnValues(String),
    /// The class has no usable constructor.
    CannotConstruct(String),
    /// Reading or writing a file failed.
    Io { path: PathBuf, message: String },
    /// A configuration or declaration file could not be parsed.
    Parse { path: PathBuf, message: String },
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::TypeConflict { table, ctype } => {
                write!(f, "{table} type {ctype:?} already registered")
            }
            GenError::UnknownType { table, ctype } => {
                write!(f, "no {table} handler for type {ctype:?}")
            }
            GenError::UnsupportedDirection { ctype, direction } => {
                write!(f, "type {ctype:?} does not support direction {direction}")
            }
            GenError::InvalidVariableName(name) => {
                write!(f, "invalid variable name: {name}")
            }
            GenError::MixedKeywords => {
                write!(f, "mixing parameters with and without keywords")
            }
            GenError::OptionalOrder(name) => {
                write!(f, "mandatory parameter {name:?} follows an optional parameter")
            }
            GenError::MissingConversion { ctype, conversion } => {
                write!(f, "{conversion} conversion not implemented for type {ctype:?}")
            }
            GenError::TypeConfiguration(msg) => {
                write!(f, "type configuration error: {msg}")
            }
            GenError::InconsistentOverloadFlags(name) => {
                write!(f, "overloads of {name:?} derived different method flags")
            }
            GenError::UnexpectedReturnValues(name) => {
                write!(f, "wrapper {name:?} is not supposed to return values")
            }
            GenError::CannotConstruct(class) => {
                write!(f, "class {class:?} cannot be constructed")
            }
            GenError::Io { path, message } => {
                write!(f, "{}: {message}", path.display())
            }
            GenError::Parse { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for GenError {}

/// Convenience alias used throughout the generation pipeline.
pub type GenResult<T> = Result<T, GenError>;

/// A non-fatal issue found while processing scanned declarations.
///
/// Warnings never abort a run; the driver logs them attributed to the
/// declaration's recorded source location.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl ScanWarning {
    pub fn new(message: impl Into<String>) -> Self {
        ScanWarning { file: None, line: None, message: message.into() }
    }

    pub fn at(message: impl Into<String>, file: &str, line: u32) -> Self {
        ScanWarning {
            file: Some(file.to_string()),
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_are_human_readable() {
        let err = GenError::UnknownType { table: "parameter", ctype: "Foo***".into() };
        assert_eq!(err.to_string(), "no parameter handler for type \"Foo***\"");

        let err = GenError::UnsupportedDirection {
            ctype: "int".into(),
            direction: "out".into(),
        };
        assert_eq!(err.to_string(), "type \"int\" does not support direction out");
    }

    #[test]
    fn warning_attribution() {
        let w = ScanWarning::at("unknown annotation key `frobnicate`", "api.h", 42);
        assert_eq!(w.to_string(), "api.h:42: unknown annotation key `frobnicate`");
        let w = ScanWarning::new("unparseable parameter type");
        assert_eq!(w.to_string(), "unparseable parameter type");
    }
}
