//! Analyses known to the `afw` binary, by name.

use std::sync::Arc;

use af_core::{Error, Result};
use af_pipeline::Analysis;

use crate::dilepton::Dilepton;

/// Registered analysis names.
pub const ANALYSES: &[&str] = &["dilepton"];

/// Instantiate the analysis called `name`, overlaying `signal` categories
/// (the analysis default when empty).
pub fn lookup(name: &str, signal: &[String]) -> Result<Arc<dyn Analysis>> {
    tracing::debug!(analysis = name, signal = ?signal, "looking up analysis");
    match name {
        "dilepton" if signal.is_empty() => Ok(Arc::new(Dilepton::default())),
        "dilepton" => Ok(Arc::new(Dilepton::new(signal.to_vec()))),
        other => Err(Error::Validation(format!(
            "unknown analysis '{other}' (available: {})",
            ANALYSES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown() {
        for name in ANALYSES {
            assert_eq!(lookup(name, &[]).unwrap().name(), *name);
        }
        let err = lookup("trilepton", &[]).err().unwrap();
        assert!(err.to_string().contains("available: dilepton"));
    }
}
