//! Form state composed from four stores.
//!
//! A [`Form`] keeps values, errors, touched flags and meta information in
//! separate [`Store`]s so each can be observed on its own. Validators are
//! attached per path; writing a value re-validates every field whose path
//! is related to the write.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use formstate_path::{deep_get, Path, SetAction};
use formstate_store::{MappingProxy, Store, StoreView, WatchHandle};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::FormError;
use crate::error_tree::{
    deep_remove_empty, exclude_overlaps, merge_errors, normalize_validator_output,
    set_nested_values, FieldErrorTree, TOUCHED_KEY,
};
use crate::validation::{FieldValidator, ValidationRegistry, ValidatorHandle};

/// Meta key: values differ from the initial values.
pub const META_DIRTY: &str = "dirty";
/// Meta key: the error tree holds no error.
pub const META_IS_VALID: &str = "isValid";
pub const META_SUBMIT_COUNT: &str = "submitCount";
pub const META_IS_SUBMITTING: &str = "isSubmitting";
pub const META_IS_VALIDATING: &str = "isValidating";

/// Receives the values of a successful submit.
pub type SubmitAction = Rc<dyn Fn(&Value)>;

/// Validates the whole value tree and returns an error tree.
pub type FormValidator = Rc<dyn Fn(&Value) -> Option<Value>>;

/// Schema-driven validation of the whole value tree.
pub trait SchemaValidator {
    /// Error tree for `values`, or `None` when they conform.
    fn validate(&self, values: &Value) -> Option<Value>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Value) -> Option<Value>,
{
    fn validate(&self, values: &Value) -> Option<Value> {
        self(values)
    }
}

/// Form configuration.
///
/// The initial trees and flags can be read from JSON; callbacks are set
/// with the `with_*` builders.
///
/// ```
/// use formstate::FormConfig;
/// use serde_json::json;
///
/// let config: FormConfig = serde_json::from_value(json!({
///     "initialValues": {"name": ""},
///     "disablePureFieldsValidation": true
/// }))
/// .unwrap();
/// assert!(config.disable_pure_fields_validation);
/// assert_eq!(config.initial_touched, json!({}));
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormConfig {
    pub initial_values: Value,
    pub initial_errors: Value,
    pub initial_touched: Value,
    /// Skip validators for fields still equal to their initial value.
    pub disable_pure_fields_validation: bool,
    #[serde(skip)]
    pub on_submit: Option<SubmitAction>,
    #[serde(skip)]
    pub validate_form: Option<FormValidator>,
    #[serde(skip)]
    pub schema: Option<Rc<dyn SchemaValidator>>,
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig {
            initial_values: Value::Object(Map::new()),
            initial_errors: Value::Object(Map::new()),
            initial_touched: Value::Object(Map::new()),
            disable_pure_fields_validation: false,
            on_submit: None,
            validate_form: None,
            schema: None,
        }
    }
}

impl FormConfig {
    pub fn new(initial_values: Value) -> Self {
        FormConfig {
            initial_values,
            ..Self::default()
        }
    }

    pub fn with_initial_errors(mut self, errors: Value) -> Self {
        self.initial_errors = errors;
        self
    }

    pub fn with_initial_touched(mut self, touched: Value) -> Self {
        self.initial_touched = touched;
        self
    }

    pub fn with_disable_pure_fields_validation(mut self, disable: bool) -> Self {
        self.disable_pure_fields_validation = disable;
        self
    }

    pub fn with_on_submit(mut self, action: impl Fn(&Value) + 'static) -> Self {
        self.on_submit = Some(Rc::new(action));
        self
    }

    pub fn with_validate_form(mut self, validate: impl Fn(&Value) -> Option<Value> + 'static) -> Self {
        self.validate_form = Some(Rc::new(validate));
        self
    }

    pub fn with_schema(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.schema = Some(Rc::new(schema));
        self
    }
}

impl fmt::Debug for FormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormConfig")
            .field("initial_values", &self.initial_values)
            .field("initial_errors", &self.initial_errors)
            .field("initial_touched", &self.initial_touched)
            .field(
                "disable_pure_fields_validation",
                &self.disable_pure_fields_validation,
            )
            .field("on_submit", &self.on_submit.is_some())
            .field("validate_form", &self.validate_form.is_some())
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

/// Overrides for [`Form::reset_form`]; `None` falls back to the
/// configured initial tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetConfig {
    pub initial_values: Option<Value>,
    pub initial_errors: Option<Value>,
    pub initial_touched: Option<Value>,
}

/// Router-wrapped stores of a form, seen through one proxy.
#[derive(Debug, Clone)]
pub struct FormView {
    pub values: StoreView,
    pub errors: StoreView,
    pub touched: StoreView,
}

struct FormInner {
    config: FormConfig,
    values: Store,
    errors: Store,
    touched: Store,
    meta: Store,
    registry: RefCell<ValidationRegistry>,
    /// One value watch per path that has validators.
    value_watches: RefCell<IndexMap<Path, WatchHandle>>,
}

/// Handle to one form. Cloning shares the state.
#[derive(Clone)]
pub struct Form {
    inner: Rc<FormInner>,
}

fn meta_path(key: &str) -> Path {
    Path::root().join(key)
}

impl Form {
    pub fn new(config: FormConfig) -> Self {
        let values = Store::new(config.initial_values.clone());
        let errors = Store::new(config.initial_errors.clone());
        let touched = Store::new(config.initial_touched.clone());
        let meta = Store::new(json!({
            META_DIRTY: false,
            META_IS_VALID: deep_remove_empty(&config.initial_errors).is_none(),
            META_SUBMIT_COUNT: 0,
            META_IS_SUBMITTING: false,
            META_IS_VALIDATING: false,
        }));

        let initial = config.initial_values.clone();
        let dirty_meta = meta.clone();
        values.watch_batch_updates(move |batch| {
            let dirty = batch.values != initial;
            dirty_meta.set_value(&meta_path(META_DIRTY), Value::Bool(dirty));
        });

        let valid_meta = meta.clone();
        errors.watch_batch_updates(move |batch| {
            let valid = deep_remove_empty(&batch.values).is_none();
            valid_meta.set_value(&meta_path(META_IS_VALID), Value::Bool(valid));
        });

        Form {
            inner: Rc::new(FormInner {
                config,
                values,
                errors,
                touched,
                meta,
                registry: RefCell::new(ValidationRegistry::new()),
                value_watches: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    pub fn values(&self) -> &Store {
        &self.inner.values
    }

    pub fn errors(&self) -> &Store {
        &self.inner.errors
    }

    pub fn touched(&self) -> &Store {
        &self.inner.touched
    }

    pub fn meta(&self) -> &Store {
        &self.inner.meta
    }

    // ── Validators ──────────────────────────────────────────────────────

    /// Attach `validator` to `path`.
    ///
    /// The first validator on a path also starts watching the value there,
    /// so any write at, above or below `path` re-validates the field.
    pub fn register_validator(&self, path: &Path, validator: FieldValidator) -> ValidatorHandle {
        let handle = self.inner.registry.borrow_mut().register(path, validator);

        let mut watches = self.inner.value_watches.borrow_mut();
        if !watches.contains_key(path) {
            let form = Rc::downgrade(&self.inner);
            let field = path.clone();
            let watch = self.inner.values.watch(path, move |value| {
                if let Some(inner) = form.upgrade() {
                    Form { inner }.validate_field(&field, value);
                }
            });
            watches.insert(path.clone(), watch);
        }
        handle
    }

    /// Detach a validator. The value watch goes away with the last
    /// validator of the path.
    pub fn unregister_validator(&self, handle: &ValidatorHandle) -> Result<(), FormError> {
        let last = {
            let mut registry = self.inner.registry.borrow_mut();
            registry.unregister(handle)?;
            !registry.has_validator(handle.path())
        };
        if last {
            let watch = self.inner.value_watches.borrow_mut().shift_remove(handle.path());
            if let Some(watch) = watch {
                self.inner.values.unwatch(watch)?;
            }
        }
        Ok(())
    }

    pub fn has_validator(&self, path: &Path) -> bool {
        self.inner.registry.borrow().has_validator(path)
    }

    /// Validate one field and write the outcome into the errors store.
    ///
    /// Returns the validator output. Paths without validators are left
    /// alone. A scalar output replaces the node's own `$error` and keeps
    /// the errors of its children; a tree output replaces the node.
    pub fn validate_field(&self, path: &Path, value: Option<&Value>) -> Option<Value> {
        let registry = self.inner.registry.borrow().clone();
        if !registry.has_validator(path) {
            return None;
        }

        let config = &self.inner.config;
        let output = if config.disable_pure_fields_validation
            && deep_get(&config.initial_values, path) == value
        {
            None
        } else {
            registry.validate_field(path, value)
        };
        self.write_field_error(path, output.clone());
        output
    }

    fn write_field_error(&self, path: &Path, output: Option<Value>) {
        let is_tree = matches!(output, Some(Value::Object(_) | Value::Array(_)));
        let node = normalize_validator_output(output);
        if is_tree {
            self.inner.errors.set_value(path, node);
            return;
        }

        let own = FieldErrorTree::from_value(&node);
        self.inner.errors.set_value(
            path,
            SetAction::update(move |current| match current {
                Some(current) => FieldErrorTree::from_value(current).merge(own).into_value(),
                None => own.into_value(),
            }),
        );
    }

    /// Full error tree for `values`: field validators, then the form
    /// validator, then the schema, merged in that order.
    ///
    /// Empty nodes are dropped; no error at all yields `{}`.
    pub fn validate_form(&self, values: &Value) -> Value {
        let registry = self.inner.registry.borrow().clone();
        let config = &self.inner.config;

        let mut errors = registry.validate_all(values);
        if let Some(form_errors) = config.validate_form.as_ref().and_then(|validate| validate(values)) {
            errors = merge_errors(&errors, &form_errors);
        }
        if let Some(schema_errors) = config.schema.as_ref().and_then(|schema| schema.validate(values)) {
            errors = merge_errors(&errors, &schema_errors);
        }
        if config.disable_pure_fields_validation {
            errors = exclude_overlaps(values, &config.initial_values, &errors);
        }
        deep_remove_empty(&errors).unwrap_or_else(|| Value::Object(Map::new()))
    }

    // ── Submit and reset ────────────────────────────────────────────────

    /// Validate the form, mark every value touched and run `action` (or
    /// the configured default) when no error remains.
    ///
    /// Returns whether the action ran.
    pub fn submit(&self, action: Option<SubmitAction>) -> Result<bool, FormError> {
        let action = action
            .or_else(|| self.inner.config.on_submit.clone())
            .ok_or(FormError::NoSubmitAction)?;

        let meta = &self.inner.meta;
        let count = self.submit_count();
        meta.set_value(&meta_path(META_SUBMIT_COUNT), json!(count + 1));
        meta.set_value(&meta_path(META_IS_SUBMITTING), Value::Bool(true));
        meta.set_value(&meta_path(META_IS_VALIDATING), Value::Bool(true));

        let values = self.inner.values.get_values();
        let errors = self.validate_form(&values);
        meta.set_value(&meta_path(META_IS_VALIDATING), Value::Bool(false));

        let valid = deep_remove_empty(&errors).is_none();
        self.inner.errors.set_values(errors);
        self.inner
            .touched
            .set_values(set_nested_values(&values, &json!({ TOUCHED_KEY: true })));

        if valid {
            action(&values);
        }
        meta.set_value(&meta_path(META_IS_SUBMITTING), Value::Bool(false));
        debug!(submit_count = count + 1, submitted = valid, "form submit");
        Ok(valid)
    }

    /// Restore values, touched flags and errors, in that order.
    pub fn reset_form(&self, reset: ResetConfig) {
        let config = &self.inner.config;
        self.inner
            .values
            .set_values(reset.initial_values.unwrap_or_else(|| config.initial_values.clone()));
        self.inner
            .touched
            .set_values(reset.initial_touched.unwrap_or_else(|| config.initial_touched.clone()));
        self.inner
            .errors
            .set_values(reset.initial_errors.unwrap_or_else(|| config.initial_errors.clone()));
        debug!("form reset");
    }

    // ── Field helpers ───────────────────────────────────────────────────

    pub fn get_values(&self) -> Value {
        self.inner.values.get_values()
    }

    pub fn set_values(&self, values: Value) {
        self.inner.values.set_values(values);
    }

    pub fn get_field_value(&self, path: &Path) -> Option<Value> {
        self.inner.values.get_value(path)
    }

    pub fn set_field_value(&self, path: &Path, action: impl Into<SetAction>) {
        self.inner.values.set_value(path, action);
    }

    /// Error node at `path`, own message and child errors included.
    pub fn get_field_error(&self, path: &Path) -> Option<Value> {
        self.inner.errors.get_value(path)
    }

    pub fn set_field_error(&self, path: &Path, error: Value) {
        self.inner.errors.set_value(path, error);
    }

    pub fn get_field_touched(&self, path: &Path) -> bool {
        self.inner
            .touched
            .with_value(&path.join(TOUCHED_KEY), |flag| {
                flag.and_then(Value::as_bool).unwrap_or(false)
            })
    }

    pub fn set_field_touched(&self, path: &Path, touched: bool) {
        self.inner
            .touched
            .set_value(path, json!({ TOUCHED_KEY: touched }));
    }

    // ── Meta ────────────────────────────────────────────────────────────

    fn meta_flag(&self, key: &str) -> bool {
        self.inner
            .meta
            .with_value(&meta_path(key), |flag| flag.and_then(Value::as_bool).unwrap_or(false))
    }

    pub fn is_dirty(&self) -> bool {
        self.meta_flag(META_DIRTY)
    }

    pub fn is_valid(&self) -> bool {
        self.meta_flag(META_IS_VALID)
    }

    pub fn is_submitting(&self) -> bool {
        self.meta_flag(META_IS_SUBMITTING)
    }

    pub fn is_validating(&self) -> bool {
        self.meta_flag(META_IS_VALIDATING)
    }

    pub fn submit_count(&self) -> u64 {
        self.inner
            .meta
            .with_value(&meta_path(META_SUBMIT_COUNT), |count| {
                count.and_then(Value::as_u64).unwrap_or(0)
            })
    }

    /// Values, errors and touched stores routed through `proxy`, which
    /// must be active.
    pub fn view(&self, proxy: Rc<MappingProxy>) -> Result<FormView, FormError> {
        Ok(FormView {
            values: StoreView::new(self.inner.values.clone(), Some(proxy.clone()))?,
            errors: StoreView::new(self.inner.errors.clone(), Some(proxy.clone()))?,
            touched: StoreView::new(self.inner.touched.clone(), Some(proxy))?,
        })
    }
}

impl Default for Form {
    fn default() -> Self {
        Form::new(FormConfig::default())
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("values", &self.inner.values.get_values())
            .field("errors", &self.inner.errors.get_values())
            .field("touched", &self.inner.touched.get_values())
            .field("meta", &self.inner.meta.get_values())
            .field("validators", &*self.inner.registry.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_path::path;
    use std::cell::Cell;

    fn not_empty() -> FieldValidator {
        Rc::new(|value: Option<&Value>| match value {
            Some(Value::String(s)) if !s.is_empty() => None,
            _ => Some(json!("required")),
        })
    }

    #[test]
    fn test_initial_meta() {
        let form = Form::new(FormConfig::new(json!({"a": 1})).with_initial_errors(json!({"a": {"$error": "x"}})));
        assert!(!form.is_dirty());
        assert!(!form.is_valid());
        assert_eq!(form.submit_count(), 0);
        assert!(!form.is_submitting());

        let clean = Form::default();
        assert!(clean.is_valid());
    }

    #[test]
    fn test_dirty_tracks_initial_values() {
        let form = Form::new(FormConfig::new(json!({"name": "a"})));
        form.set_field_value(&path!["name"], json!("b"));
        assert!(form.is_dirty());
        form.set_field_value(&path!["name"], json!("a"));
        assert!(!form.is_dirty());
    }

    #[test]
    fn test_write_triggers_validation() {
        let form = Form::new(FormConfig::new(json!({"name": "a"})));
        form.register_validator(&path!["name"], not_empty());

        form.set_field_value(&path!["name"], json!(""));
        assert_eq!(form.get_field_error(&path!["name"]), Some(json!({"$error": "required"})));
        assert!(!form.is_valid());

        form.set_field_value(&path!["name"], json!("ok"));
        assert_eq!(form.get_field_error(&path!["name"]), Some(json!({"$error": null})));
        assert!(form.is_valid());
    }

    #[test]
    fn test_ancestor_write_triggers_validation() {
        let form = Form::new(FormConfig::new(json!({"user": {"name": "a"}})));
        form.register_validator(&path!["user", "name"], not_empty());
        form.set_values(json!({"user": {"name": ""}}));
        assert_eq!(
            form.get_field_error(&path!["user", "name"]),
            Some(json!({"$error": "required"}))
        );
    }

    #[test]
    fn test_scalar_output_keeps_child_errors() {
        let form = Form::new(
            FormConfig::new(json!({"list": []}))
                .with_initial_errors(json!({"list": [null, {"$error": "bad item"}]})),
        );
        form.register_validator(
            &path!["list"],
            Rc::new(|_: Option<&Value>| Some(json!("too short"))),
        );
        form.set_field_value(&path!["list"], json!([1]));
        assert_eq!(
            form.get_field_error(&path!["list"]),
            Some(json!({"$error": "too short", "1": {"$error": "bad item"}}))
        );
    }

    #[test]
    fn test_unregister_drops_value_watch() {
        let form = Form::default();
        let before = form.values().observer_count();
        let first = form.register_validator(&path!["a"], not_empty());
        let second = form.register_validator(&path!["a"], not_empty());
        assert_eq!(form.values().observer_count(), before + 1);

        form.unregister_validator(&first).unwrap();
        assert_eq!(form.values().observer_count(), before + 1);
        form.unregister_validator(&second).unwrap();
        assert_eq!(form.values().observer_count(), before);
        assert!(!form.has_validator(&path!["a"]));
        assert_eq!(form.unregister_validator(&second), Err(FormError::UnknownValidator));
    }

    #[test]
    fn test_pure_field_skips_validators() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let form = Form::new(
            FormConfig::new(json!({"name": ""})).with_disable_pure_fields_validation(true),
        );
        form.register_validator(
            &path!["name"],
            Rc::new(move |_: Option<&Value>| {
                counter.set(counter.get() + 1);
                Some(json!("required"))
            }),
        );

        assert_eq!(form.validate_field(&path!["name"], Some(&json!(""))), None);
        assert_eq!(calls.get(), 0);
        assert_eq!(form.get_field_error(&path!["name"]), Some(json!({"$error": null})));

        assert_eq!(
            form.validate_field(&path!["name"], Some(&json!("x"))),
            Some(json!("required"))
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_field_touched() {
        let form = Form::default();
        assert!(!form.get_field_touched(&path!["a"]));
        form.set_field_touched(&path!["a"], true);
        assert!(form.get_field_touched(&path!["a"]));
        assert_eq!(form.touched().get_values(), json!({"a": {"$touched": true}}));
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: FormConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.initial_values, json!({}));
        assert!(!config.disable_pure_fields_validation);
        assert!(config.on_submit.is_none());

        let reset: ResetConfig =
            serde_json::from_value(json!({"initialValues": {"a": 1}})).unwrap();
        assert_eq!(reset.initial_values, Some(json!({"a": 1})));
        assert_eq!(reset.initial_errors, None);
    }
}
