//! Per-form registry of field validators.

use std::fmt;
use std::rc::Rc;

use formstate_path::{deep_get, deep_set, Path};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FormError;
use crate::error_tree::normalize_validator_output;

/// Validates one field's value. `None` (or `null`) means "no error".
pub type FieldValidator = Rc<dyn Fn(Option<&Value>) -> Option<Value>>;

/// Registration token returned by [`ValidationRegistry::register`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ValidatorHandle {
    key: u64,
    path: Path,
}

impl ValidatorHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ordered validators per path.
///
/// Cloning is cheap and yields an independent snapshot of the current
/// registrations, which lets callers run validators without holding a
/// borrow of the registry.
#[derive(Clone, Default)]
pub struct ValidationRegistry {
    validators: IndexMap<Path, Vec<(u64, FieldValidator)>>,
    next_key: u64,
}

impl ValidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &Path, validator: FieldValidator) -> ValidatorHandle {
        self.next_key += 1;
        let key = self.next_key;
        self.validators
            .entry(path.clone())
            .or_default()
            .push((key, validator));
        debug!(path = %path, "validator registered");
        ValidatorHandle {
            key,
            path: path.clone(),
        }
    }

    /// Remove a validator. An unknown handle is a usage error.
    pub fn unregister(&mut self, handle: &ValidatorHandle) -> Result<(), FormError> {
        let validators = self
            .validators
            .get_mut(&handle.path)
            .ok_or(FormError::UnknownValidator)?;
        let before = validators.len();
        validators.retain(|(key, _)| *key != handle.key);
        if validators.len() == before {
            return Err(FormError::UnknownValidator);
        }
        if validators.is_empty() {
            self.validators.shift_remove(&handle.path);
        }
        debug!(path = %handle.path, "validator unregistered");
        Ok(())
    }

    pub fn has_validator(&self, path: &Path) -> bool {
        self.validators.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.validators.keys()
    }

    /// Run the validators of `path` in registration order and return the
    /// first non-empty output; later validators are not called.
    pub fn validate_field(&self, path: &Path, value: Option<&Value>) -> Option<Value> {
        self.validators
            .get(path)?
            .iter()
            .find_map(|(_, validator)| validator(value).filter(|output| !output.is_null()))
    }

    /// Validate every registered path against `values` and collect the
    /// outputs into one error tree.
    pub fn validate_all(&self, values: &Value) -> Value {
        let mut errors = Value::Object(Map::new());
        for path in self.validators.keys() {
            if let Some(output) = self.validate_field(path, deep_get(values, path)) {
                deep_set(&mut errors, path, normalize_validator_output(Some(output)));
            }
        }
        errors
    }
}

impl fmt::Debug for ValidationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.validators.iter().map(|(path, list)| (path.to_string(), list.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_path::path;
    use serde_json::json;
    use std::cell::Cell;

    fn required() -> FieldValidator {
        Rc::new(|value: Option<&Value>| match value {
            None | Some(Value::Null) => Some(json!("required")),
            Some(Value::String(s)) if s.is_empty() => Some(json!("required")),
            _ => None,
        })
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ValidationRegistry::new();
        let handle = registry.register(&path!["name"], required());
        assert!(registry.has_validator(&path!["name"]));
        assert_eq!(handle.path(), &path!["name"]);

        registry.unregister(&handle).unwrap();
        assert!(!registry.has_validator(&path!["name"]));
        assert_eq!(registry.unregister(&handle), Err(FormError::UnknownValidator));
    }

    #[test]
    fn test_lazy_first_error() {
        let mut registry = ValidationRegistry::new();
        let later_calls = Rc::new(Cell::new(0));
        let counter = later_calls.clone();

        registry.register(&path!["x"], Rc::new(|_: Option<&Value>| Some(Value::Null)));
        registry.register(&path!["x"], Rc::new(|_: Option<&Value>| Some(json!("first"))));
        registry.register(
            &path!["x"],
            Rc::new(move |_: Option<&Value>| {
                counter.set(counter.get() + 1);
                Some(json!("second"))
            }),
        );

        assert_eq!(registry.validate_field(&path!["x"], None), Some(json!("first")));
        assert_eq!(later_calls.get(), 0);
        assert_eq!(registry.validate_field(&path!["unknown"], None), None);
    }

    #[test]
    fn test_validate_all() {
        let mut registry = ValidationRegistry::new();
        registry.register(&path!["user", "name"], required());
        registry.register(&path!["user", "email"], required());
        registry.register(
            &path!["tags"],
            Rc::new(|_: Option<&Value>| Some(json!([null, {"$error": "dup"}]))),
        );

        let errors = registry.validate_all(&json!({"user": {"name": "", "email": "a@b"}}));
        assert_eq!(
            errors,
            json!({
                "user": {"name": {"$error": "required"}},
                "tags": [null, {"$error": "dup"}]
            })
        );
    }

    #[test]
    fn test_clone_is_snapshot() {
        let mut registry = ValidationRegistry::new();
        registry.register(&path!["a"], required());
        let snapshot = registry.clone();
        registry.register(&path!["b"], required());
        assert!(!snapshot.has_validator(&path!["b"]));
    }
}
