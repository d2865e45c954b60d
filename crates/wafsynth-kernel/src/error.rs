//! Error types for wafsynth kernel operations.

/// Errors arising while declaring, evaluating or synthesizing fragments.
///
/// Every variant is a synthesis-time failure: none are retried and each one
/// aborts the whole synthesis pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    /// A flag, input or value was referenced before it was declared.
    #[error("{fragment}: `{referrer}` references undeclared `{name}`")]
    UndeclaredReference {
        fragment: String,
        referrer: String,
        name: String,
    },

    /// Resolving a flag would require a flag that is not yet fully declared.
    #[error("{fragment}: flag `{flag}` depends on `{via}`, which is declared after it")]
    CyclicDependency {
        fragment: String,
        flag: String,
        via: String,
    },

    /// Parent and child compute different values for the same flag.
    #[error(
        "boundary {parent} -> {child}: flag `{flag}` drifted under {{{assignment}}} \
         (parent={parent_value}, child={child_value})"
    )]
    BoundaryDrift {
        parent: String,
        child: String,
        flag: String,
        assignment: String,
        parent_value: bool,
        child_value: bool,
    },

    /// A cross-field rule rejected the supplied inputs.
    #[error("{fragment}: rule `{rule}` failed: {description} [{inputs}]")]
    InvalidConfigCombination {
        fragment: String,
        rule: String,
        description: String,
        inputs: String,
    },

    /// An input value lies outside its declared domain, or is missing.
    #[error("{fragment}: input `{input}` rejects {value:?}: {reason}")]
    InvalidInputValue {
        fragment: String,
        input: String,
        value: String,
        reason: String,
    },

    /// A name was declared twice in one fragment.
    #[error("{fragment}: `{name}` is declared more than once")]
    DuplicateDeclaration { fragment: String, name: String },

    /// An emitted element points at a unit that is absent from the artifact.
    #[error("{fragment}: `{unit}` references absent unit `{target}`")]
    DanglingReference {
        fragment: String,
        unit: String,
        target: String,
    },
}

impl SynthError {
    /// Stable snake_case class name, used in JSON diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            SynthError::UndeclaredReference { .. } => "undeclared_reference",
            SynthError::CyclicDependency { .. } => "cyclic_dependency",
            SynthError::BoundaryDrift { .. } => "boundary_drift",
            SynthError::InvalidConfigCombination { .. } => "invalid_config_combination",
            SynthError::InvalidInputValue { .. } => "invalid_input_value",
            SynthError::DuplicateDeclaration { .. } => "duplicate_declaration",
            SynthError::DanglingReference { .. } => "dangling_reference",
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_message_names_flag_and_assignment() {
        let err = SynthError::BoundaryDrift {
            parent: "root".into(),
            child: "webacl".into(),
            flag: "HttpFloodProtectionActivated".into(),
            assignment: "Mode=no".into(),
            parent_value: true,
            child_value: false,
        };
        let text = err.to_string();
        assert!(text.contains("HttpFloodProtectionActivated"));
        assert!(text.contains("{Mode=no}"));
        assert_eq!(err.class(), "boundary_drift");
    }
}
