use thiserror::Error;

/// Errors raised by the hazard and risk core.
///
/// Configuration problems are fatal and surface before any heavy work
/// starts. Per-unit numerical failures are not errors: they show up as NaN
/// entries in the affected results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid configuration for `{param}`: {reason}")]
    Config { param: String, reason: String },

    #[error("ground-motion model {gsim} does not support IMT {imt}")]
    UnsupportedImt { gsim: String, imt: String },

    #[error("incompatible IMT: model expects {expected}, hazard provides {found}")]
    IncompatibleImt { expected: String, found: String },

    #[error("no ground-motion model mapped for tectonic region `{0}`")]
    UnknownTectonicRegion(String),

    #[error("calculation aborted")]
    Aborted,

    #[error("numerical error: {0}")]
    Numerical(String),
}

impl Error {
    pub fn config(param: &str, reason: impl Into<String>) -> Self {
        Error::Config {
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_parameter() {
        let err = Error::config("truncation_level", "must be non-negative");
        let msg = err.to_string();
        assert!(msg.contains("truncation_level"));
        assert!(msg.contains("non-negative"));
    }
}
