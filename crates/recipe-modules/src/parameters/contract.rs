// Declarative parameter schema and its validator.

use super::bag::{ParameterBag, ParameterKey};
use super::value::Value;
use crate::error::{StringProblem, ValidationError};
use std::fmt;

/// How many parameters an operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityBounds {
    Exactly(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl ArityBounds {
    pub fn contains(&self, count: usize) -> bool {
        match *self {
            ArityBounds::Exactly(n) => count == n,
            ArityBounds::Between(min, max) => (min..=max).contains(&count),
            ArityBounds::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for ArityBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ArityBounds::Exactly(1) => f.write_str("Expected 1 parameter"),
            ArityBounds::Exactly(n) => write!(f, "Expected {n} parameters"),
            ArityBounds::Between(min, max) => {
                write!(f, "Expected between {min} and {max} parameters")
            }
            ArityBounds::AtLeast(1) => f.write_str("Expected at least 1 parameter"),
            ArityBounds::AtLeast(n) => write!(f, "Expected at least {n} parameters"),
        }
    }
}

/// Type constraint for an optional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    String,
    Integer,
    NonNegativeInteger,
}

impl ExpectedType {
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ExpectedType::String, Value::String(_)) => true,
            (ExpectedType::Integer, Value::Int(_)) => true,
            (ExpectedType::NonNegativeInteger, Value::Int(i)) => *i >= 0,
            _ => false,
        }
    }
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpectedType::String => "string",
            ExpectedType::Integer => "integer",
            ExpectedType::NonNegativeInteger => "non-negative integer",
        })
    }
}

/// A required string parameter, optionally reachable through a positional alias.
#[derive(Debug, Clone)]
struct StringRule {
    name: String,
    position: Option<usize>,
}

/// The schema a method's [`ParameterBag`] must satisfy.
///
/// Built once per operation with the builder methods below, then checked with
/// [`ParameterContract::validate`]. Checks run in a fixed order (arity, key
/// names, required strings, typed optionals) and the first violation wins.
#[derive(Debug, Clone)]
pub struct ParameterContract {
    arity: ArityBounds,
    allowed_keys: Option<Vec<ParameterKey>>,
    required_strings: Vec<StringRule>,
    typed_fields: Vec<(String, ExpectedType)>,
    all_values_are_strings: bool,
}

impl ParameterContract {
    fn with_arity(arity: ArityBounds) -> Self {
        Self {
            arity,
            allowed_keys: None,
            required_strings: Vec::new(),
            typed_fields: Vec::new(),
            all_values_are_strings: false,
        }
    }

    pub fn exactly(count: usize) -> Self {
        Self::with_arity(ArityBounds::Exactly(count))
    }

    /// # Panics
    ///
    /// When `min > max`.
    pub fn between(min: usize, max: usize) -> Self {
        assert!(min <= max, "arity bounds are inverted: {min} > {max}");
        Self::with_arity(ArityBounds::Between(min, max))
    }

    pub fn at_least(count: usize) -> Self {
        Self::with_arity(ArityBounds::AtLeast(count))
    }

    /// Restrict the bag to the given names. May be combined with [`Self::allow`].
    pub fn allow_names(self, names: &[&str]) -> Self {
        names
            .iter()
            .fold(self, |contract, name| contract.allow(*name))
    }

    pub fn allow(mut self, key: impl Into<ParameterKey>) -> Self {
        self.allowed_keys
            .get_or_insert_with(Vec::new)
            .push(key.into());
        self
    }

    /// `name` must be present and hold a string with non-whitespace content.
    pub fn non_empty_string(mut self, name: &str) -> Self {
        self.required_strings.push(StringRule {
            name: name.to_string(),
            position: None,
        });
        self
    }

    /// Like [`Self::non_empty_string`], also accepting the value at `position`.
    pub fn non_empty_string_at(mut self, name: &str, position: usize) -> Self {
        self.required_strings.push(StringRule {
            name: name.to_string(),
            position: Some(position),
        });
        self
    }

    /// When `name` is present its value must be of `expected` type.
    pub fn optional(mut self, name: &str, expected: ExpectedType) -> Self {
        self.typed_fields.push((name.to_string(), expected));
        self
    }

    /// Every value in the bag, whatever its key, must be a non-empty string.
    pub fn every_value_non_empty_string(mut self) -> Self {
        self.all_values_are_strings = true;
        self
    }

    pub fn arity(&self) -> ArityBounds {
        self.arity
    }

    /// Check `bag` against this contract. Pure: no I/O and no mutation.
    pub fn validate(&self, bag: &ParameterBag) -> Result<(), ValidationError> {
        if !self.arity.contains(bag.len()) {
            return Err(ValidationError::Arity {
                expected: self.arity,
                actual: bag.len(),
            });
        }

        if let Some(allowed) = &self.allowed_keys {
            if let Some(key) = bag.keys().find(|key| !allowed.contains(key)) {
                return Err(ValidationError::UnrecognizedParameter { key: key.clone() });
            }
        }

        for rule in &self.required_strings {
            let value = match rule.position {
                Some(position) => bag.get_name_or_position(&rule.name, position),
                None => bag.get_named(&rule.name),
            };
            check_non_empty_string(ParameterKey::from(rule.name.as_str()), value)?;
        }

        for (name, expected) in &self.typed_fields {
            if let Some(value) = bag.get_named(name) {
                if !expected.accepts(value) {
                    return Err(ValidationError::Type {
                        parameter: name.as_str().into(),
                        expected: *expected,
                        found: value.kind(),
                    });
                }
            }
        }

        if self.all_values_are_strings {
            for (key, value) in bag.iter() {
                check_non_empty_string(key.clone(), Some(value))?;
            }
        }

        Ok(())
    }
}

fn check_non_empty_string(
    parameter: ParameterKey,
    value: Option<&Value>,
) -> Result<(), ValidationError> {
    let problem = match value {
        None => StringProblem::Missing,
        Some(Value::String(s)) if s.trim().is_empty() => StringProblem::Blank,
        Some(Value::String(_)) => return Ok(()),
        Some(other) => StringProblem::NotAString(other.kind()),
    };
    Err(ValidationError::EmptyOrNonString { parameter, problem })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ValueKind;

    fn copy_contract() -> ParameterContract {
        ParameterContract::exactly(2)
            .allow_names(&["from", "to"])
            .non_empty_string("from")
            .non_empty_string("to")
    }

    #[test]
    fn arity_is_checked_first() {
        let bag = ParameterBag::new().with("bogus", 1);
        let err = copy_contract().validate(&bag).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Arity {
                expected: ArityBounds::Exactly(2),
                actual: 1
            }
        );
        assert_eq!(err.to_string(), "Expected 2 parameters. Found 1.");
    }

    #[test]
    fn unknown_key_is_rejected_even_when_values_are_valid() {
        let bag = ParameterBag::new().with("from", "a").with("too", "b");
        let err = copy_contract().validate(&bag).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnrecognizedParameter { key: "too".into() }
        );
    }

    #[test]
    fn names_are_checked_before_strings() {
        let bag = ParameterBag::new().with("from", "").with("other", 5);
        let err = copy_contract().validate(&bag).unwrap_err();
        assert!(matches!(err, ValidationError::UnrecognizedParameter { .. }));
    }

    #[test]
    fn blank_and_non_string_values() {
        let bag = ParameterBag::new().with("from", "a").with("to", "   ");
        assert_eq!(
            copy_contract().validate(&bag).unwrap_err(),
            ValidationError::EmptyOrNonString {
                parameter: "to".into(),
                problem: StringProblem::Blank
            }
        );

        let bag = ParameterBag::new().with("from", 3).with("to", "b");
        assert_eq!(
            copy_contract().validate(&bag).unwrap_err(),
            ValidationError::EmptyOrNonString {
                parameter: "from".into(),
                problem: StringProblem::NotAString(ValueKind::Int)
            }
        );
    }

    #[test]
    fn valid_bag_passes_and_validation_is_repeatable() {
        let bag = ParameterBag::new().with("from", "a").with("to", "b");
        let contract = copy_contract();
        assert!(contract.validate(&bag).is_ok());
        assert!(contract.validate(&bag).is_ok());
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn positional_alias_satisfies_required_string() {
        let contract = ParameterContract::exactly(1)
            .allow_names(&["filename"])
            .allow(0usize)
            .non_empty_string_at("filename", 0);
        assert!(contract
            .validate(&ParameterBag::from_positional(["/tmp/x"]))
            .is_ok());
        assert!(contract
            .validate(&ParameterBag::new().with("filename", "/tmp/x"))
            .is_ok());
        assert!(matches!(
            contract.validate(&ParameterBag::from_positional([""])),
            Err(ValidationError::EmptyOrNonString { .. })
        ));
    }

    #[test]
    fn typed_optional_field() {
        let contract = ParameterContract::between(1, 2)
            .allow_names(&["dir", "mode"])
            .optional("mode", ExpectedType::NonNegativeInteger);

        assert!(contract
            .validate(&ParameterBag::new().with("dir", "d"))
            .is_ok());
        assert!(contract
            .validate(&ParameterBag::new().with("dir", "d").with("mode", 0o755))
            .is_ok());

        let err = contract
            .validate(&ParameterBag::new().with("dir", "d").with("mode", "0755"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Type {
                parameter: "mode".into(),
                expected: ExpectedType::NonNegativeInteger,
                found: ValueKind::String
            }
        );

        let err = contract
            .validate(&ParameterBag::new().with("dir", "d").with("mode", -1))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Type { .. }));
    }

    #[test]
    fn every_value_must_be_a_string() {
        let contract = ParameterContract::at_least(1).every_value_non_empty_string();
        assert!(contract
            .validate(&ParameterBag::from_positional(["a", "b"]))
            .is_ok());

        let err = contract
            .validate(&ParameterBag::new().with(0usize, "a").with(1usize, 7))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyOrNonString {
                parameter: 1usize.into(),
                problem: StringProblem::NotAString(ValueKind::Int)
            }
        );

        let err = contract.validate(&ParameterBag::new()).unwrap_err();
        assert_eq!(err.to_string(), "Expected at least 1 parameter. Found 0.");
    }

    #[test]
    fn between_display() {
        assert_eq!(
            ArityBounds::Between(1, 3).to_string(),
            "Expected between 1 and 3 parameters"
        );
    }

    #[test]
    #[should_panic]
    fn inverted_bounds_panic() {
        let _ = ParameterContract::between(3, 1);
    }
}
