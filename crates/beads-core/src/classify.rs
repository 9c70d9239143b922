//! Dependency classification.
//!
//! Built-in kinds carry a fixed class (see [`DependencyType::builtin_class`]).
//! Custom kinds must be declared informational up front; anything else is
//! rejected so a typo never silently stops blocking work.

use std::collections::BTreeSet;

use crate::enums::{DependencyClass, DependencyType};

/// Errors from classifying a dependency kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("unknown dependency type '{0}' (declare it under dependencies.informational to allow it)")]
    UnknownDependencyType(String),
}

/// Maps dependency kinds to their readiness class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifier {
    informational: BTreeSet<String>,
}

impl Classifier {
    /// A classifier that knows only the built-in kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares additional custom kinds as informational.
    pub fn with_informational<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.informational
            .extend(kinds.into_iter().map(Into::into).filter(|k| !k.is_empty()));
        self
    }

    pub fn classify(&self, kind: &DependencyType) -> Result<DependencyClass, ClassifyError> {
        if let Some(class) = kind.builtin_class() {
            return Ok(class);
        }
        if self.informational.contains(kind.as_str()) {
            Ok(DependencyClass::Informational)
        } else {
            Err(ClassifyError::UnknownDependencyType(kind.as_str().to_owned()))
        }
    }

    /// Shorthand for `classify(kind)? == Blocking`.
    pub fn is_blocking(&self, kind: &DependencyType) -> Result<bool, ClassifyError> {
        Ok(self.classify(kind)? == DependencyClass::Blocking)
    }

    /// Custom kinds declared informational, in sorted order.
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.informational.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_classify_without_declaration() {
        let c = Classifier::new();
        assert_eq!(c.classify(&DependencyType::Blocks), Ok(DependencyClass::Blocking));
        assert_eq!(
            c.classify(&DependencyType::WaitsFor),
            Ok(DependencyClass::Blocking)
        );
        assert_eq!(
            c.classify(&DependencyType::ParentChild),
            Ok(DependencyClass::Containment)
        );
        assert_eq!(
            c.classify(&DependencyType::Tracks),
            Ok(DependencyClass::Informational)
        );
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let c = Classifier::new();
        let err = c.classify(&DependencyType::from("mentions")).unwrap_err();
        assert_eq!(err, ClassifyError::UnknownDependencyType("mentions".into()));
        assert!(c.is_blocking(&DependencyType::from("mentions")).is_err());
    }

    #[test]
    fn declared_kind_is_informational() {
        let c = Classifier::new().with_informational(["mentions", ""]);
        assert_eq!(
            c.classify(&DependencyType::from("mentions")),
            Ok(DependencyClass::Informational)
        );
        assert_eq!(c.is_blocking(&DependencyType::from("mentions")), Ok(false));
        assert_eq!(c.declared().collect::<Vec<_>>(), vec!["mentions"]);
    }

    #[test]
    fn declaring_a_builtin_does_not_change_its_class() {
        let c = Classifier::new().with_informational(["blocks"]);
        assert_eq!(c.is_blocking(&DependencyType::Blocks), Ok(true));
    }
}
