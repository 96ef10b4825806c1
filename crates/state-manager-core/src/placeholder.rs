//! Placeholder resolver (spec.md §4.1).
//!
//! A placeholder string is `head ("${{" identifier "." "outputs" "." field "}}" tail)*`.
//! Whitespace inside the braces is stripped. `parse` is pure and reentrant;
//! `DependentString::render` requires every dependent to have been assigned
//! a value before concatenating `head . value0 . tail0 . value1 . tail1 ...`.
//!
//! The identifier `store` is a reserved alias for the per-run Store — this
//! module does not special-case it; callers (the validator, the fan-out
//! engine) decide what `store` resolves against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("invalid syntax in string placeholder: '${{{{' not closed with '}}}}'")]
    Unclosed,
    #[error("invalid syntax in string placeholder: expected 'identifier.outputs.field'")]
    MalformedSegments,
    #[error("dependent value is not set for {identifier}.outputs.{field}")]
    ValueNotSet { identifier: String, field: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependent {
    pub identifier: String,
    pub field: String,
    pub tail: String,
    pub value: Option<String>,
}

/// An immutable AST over a placeholder string: a literal prefix followed by
/// an ordered sequence of (dependent, literal-tail) pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependentString {
    pub head: String,
    pub dependents: BTreeMap<u32, Dependent>,
}

impl DependentString {
    /// Parse a raw template string into its AST. Never fails on plain strings
    /// with no placeholders (`dependents` is empty, `head` is the whole string).
    pub fn parse(s: &str) -> Result<Self, PlaceholderError> {
        let mut splits = s.split("${{");
        let head = splits.next().unwrap_or_default().to_string();

        let mut dependents = BTreeMap::new();
        let mut order: u32 = 0;

        for split in splits {
            let Some((placeholder, tail)) = split.split_once("}}") else {
                return Err(PlaceholderError::Unclosed);
            };

            let parts: Vec<&str> = placeholder.split('.').map(str::trim).collect();
            if parts.len() != 3 || parts[1] != "outputs" {
                return Err(PlaceholderError::MalformedSegments);
            }

            dependents.insert(
                order,
                Dependent {
                    identifier: parts[0].to_string(),
                    field: parts[2].to_string(),
                    tail: tail.to_string(),
                    value: None,
                },
            );
            order += 1;
        }

        Ok(Self { head, dependents })
    }

    /// Unique `(identifier, field)` pairs referenced anywhere in this string.
    pub fn identifier_fields(&self) -> Vec<(String, String)> {
        let mut seen = Vec::new();
        for dep in self.dependents.values() {
            let key = (dep.identifier.clone(), dep.field.clone());
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen
    }

    /// Assign a value to every dependent matching `(identifier, field)`.
    pub fn set_value(&mut self, identifier: &str, field: &str, value: impl Into<String>) {
        let value = value.into();
        for dep in self.dependents.values_mut() {
            if dep.identifier == identifier && dep.field == field {
                dep.value = Some(value.clone());
            }
        }
    }

    /// Concatenate `head . value0 . tail0 . value1 . tail1 . ...`.
    /// Every dependent must have been assigned a value via `set_value` first.
    pub fn render(&self) -> Result<String, PlaceholderError> {
        let mut out = self.head.clone();
        for dep in self.dependents.values() {
            let value = dep.value.as_ref().ok_or_else(|| PlaceholderError::ValueNotSet {
                identifier: dep.identifier.clone(),
                field: dep.field.clone(),
            })?;
            out.push_str(value);
            out.push_str(&dep.tail);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders_returns_head_only() {
        let ds = DependentString::parse("plain string without placeholders").unwrap();
        assert_eq!(ds.head, "plain string without placeholders");
        assert!(ds.dependents.is_empty());
        assert!(ds.identifier_fields().is_empty());
    }

    #[test]
    fn single_placeholder_happy_path() {
        let mut ds = DependentString::parse("Hello ${{ step.outputs.foo }} world").unwrap();
        assert_eq!(ds.head, "Hello ");
        let dep = &ds.dependents[&0];
        assert_eq!(dep.identifier, "step");
        assert_eq!(dep.field, "foo");
        assert_eq!(dep.tail, " world");

        assert_eq!(
            ds.render(),
            Err(PlaceholderError::ValueNotSet {
                identifier: "step".into(),
                field: "foo".into(),
            })
        );

        ds.set_value("step", "foo", "BAR");
        assert_eq!(ds.render().unwrap(), "Hello BAR world");
    }

    #[test]
    fn placeholder_at_end_has_empty_tail() {
        let mut ds = DependentString::parse("Hi ${{ a.outputs.x }}").unwrap();
        assert_eq!(ds.dependents[&0].tail, "");
        ds.set_value("a", "x", "V");
        assert_eq!(ds.render().unwrap(), "Hi V");
    }

    #[test]
    fn multiple_placeholders_in_order() {
        let mut ds =
            DependentString::parse("Start ${{ a.outputs.x }} mid ${{ b.outputs.y }} end").unwrap();
        assert_eq!(ds.dependents[&0].identifier, "a");
        assert_eq!(ds.dependents[&1].identifier, "b");
        ds.set_value("a", "x", "AX");
        ds.set_value("b", "y", "BY");
        assert_eq!(ds.render().unwrap(), "Start AX mid BY end");
    }

    #[test]
    fn unclosed_placeholder_errors() {
        let err = DependentString::parse("Start ${{ a.outputs.x end").unwrap_err();
        assert_eq!(err, PlaceholderError::Unclosed);
    }

    #[test]
    fn wrong_segment_count_errors() {
        let err = DependentString::parse("Start ${{ a.outputs }} end").unwrap_err();
        assert_eq!(err, PlaceholderError::MalformedSegments);
    }

    #[test]
    fn wrong_middle_keyword_errors() {
        let err = DependentString::parse("Start ${{ a.outputz.x }} end").unwrap_err();
        assert_eq!(err, PlaceholderError::MalformedSegments);
    }

    #[test]
    fn extra_whitespace_is_stripped() {
        let mut ds = DependentString::parse("P ${{  step  .  outputs  .  foo  }} T").unwrap();
        assert_eq!(ds.dependents[&0].identifier, "step");
        assert_eq!(ds.dependents[&0].field, "foo");
        ds.set_value("step", "foo", "VAL");
        assert_eq!(ds.render().unwrap(), "P VAL T");
    }

    #[test]
    fn duplicate_dependents_all_receive_value() {
        let mut ds =
            DependentString::parse("A ${{ a.outputs.x }} B ${{ a.outputs.x }}").unwrap();
        assert_eq!(
            ds.identifier_fields(),
            vec![("a".to_string(), "x".to_string())]
        );
        ds.set_value("a", "x", "V");
        assert_eq!(ds.render().unwrap(), "A V B V");
    }
}
