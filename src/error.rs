//! Common errors across the rrfs-smoke crate

/// Errors related to parsing forecast cycle identifiers
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Cycle '{0}' must be exactly 10 digits (YYYYMMDDHH)")]
    BadFormat(String),
    #[error("Cycle '{0}' is not a valid date and hour")]
    InvalidDateHour(String),
}

/// Errors related to reading and copying netCDF variables
#[derive(Debug, thiserror::Error)]
pub enum NcError {
    #[error("Missing expected variable '{varname}' in {}", .path.display())]
    MissingVariable {
        path: std::path::PathBuf,
        varname: String,
    },
    #[error("Variable '{0}' has a type that cannot be read as a numeric grid")]
    UnsupportedType(String),
    #[error("Variable '{varname}' has shape {actual:?}, expected {expected:?} after any time dimension")]
    ShapeMismatch {
        varname: String,
        expected: (usize, usize),
        actual: Vec<usize>,
    },
    #[error("An error occurred while {0}")]
    Context(String),
}

impl NcError {
    pub(crate) fn missing_variable<P: Into<std::path::PathBuf>, S: ToString>(
        path: P,
        varname: S,
    ) -> Self {
        Self::MissingVariable {
            path: path.into(),
            varname: varname.to_string(),
        }
    }

    pub(crate) fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}
