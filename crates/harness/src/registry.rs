//! Candidate registration.
//!
//! A candidate is a name paired with any [`BlockSparseAttention`]
//! implementation; the harness drives every candidate through that trait and
//! nothing else. Registration order is preserved and names must be unique.

use attention::{BlockSparseAttention, FusedBlockSparse};

use crate::config::HarnessError;

/// A named accelerated implementation under test.
pub struct Candidate {
    name: String,
    kernel: Box<dyn BlockSparseAttention>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, kernel: Box<dyn BlockSparseAttention>) -> Self {
        Self {
            name: name.into(),
            kernel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &dyn BlockSparseAttention {
        self.kernel.as_ref()
    }
}

/// Ordered name-to-kernel mapping.
#[derive(Default)]
pub struct CandidateRegistry {
    candidates: Vec<Candidate>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the kernels shipped in this workspace.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("fused", Box::new(FusedBlockSparse::new()))
            .expect("empty registry accepts the builtin name");
        registry
    }

    /// Register a candidate under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kernel: Box<dyn BlockSparseAttention>,
    ) -> Result<(), HarnessError> {
        let name = name.into();
        if self.candidates.iter().any(|c| c.name == name) {
            return Err(HarnessError::Validation(vec![format!(
                "candidate '{}' is already registered",
                name
            )]));
        }
        self.candidates.push(Candidate::new(name, kernel));
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.name.as_str()).collect()
    }

    /// Resolve the configured candidate list, in the listed order.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Candidate>, HarnessError> {
        let mut selected = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.candidates.iter().find(|c| &c.name == name) {
                Some(candidate) => selected.push(candidate),
                None => unknown.push(format!(
                    "unknown candidate '{}' (registered: {})",
                    name,
                    self.names().join(", ")
                )),
            }
        }
        if unknown.is_empty() {
            Ok(selected)
        } else {
            Err(HarnessError::Validation(unknown))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attention::ExactBlockSparse;

    #[test]
    fn builtins_include_the_fused_kernel() {
        let registry = CandidateRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["fused"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = CandidateRegistry::with_builtins();
        let err = registry
            .register("fused", Box::new(ExactBlockSparse::new()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
    }

    #[test]
    fn selection_preserves_listed_order() {
        let mut registry = CandidateRegistry::with_builtins();
        registry
            .register("echo", Box::new(ExactBlockSparse::new()))
            .unwrap();
        let selected = registry
            .select(&["echo".to_string(), "fused".to_string()])
            .unwrap();
        let names: Vec<&str> = selected.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["echo", "fused"]);
    }

    #[test]
    fn unknown_names_error() {
        let registry = CandidateRegistry::with_builtins();
        assert!(matches!(
            registry.select(&["missing".to_string()]),
            Err(HarnessError::Validation(_))
        ));
    }
}
