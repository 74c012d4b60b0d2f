//! Reactive form state.
//!
//! A [`Form`] keeps values, errors, touched flags and meta information in
//! path-addressed [`Store`]s. Field validators run whenever a related value
//! is written; [`Form::submit`] validates everything and only calls the
//! submit action when the error tree is empty.
//!
//! The lower layers are re-exported: [`Path`] and the tree accessors from
//! `formstate-path`, and the store, difference engine and proxy from
//! `formstate-store`.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use formstate::{path, Form, FormConfig};
//! use serde_json::{json, Value};
//!
//! let form = Form::new(FormConfig::new(json!({"email": ""})));
//! form.register_validator(
//!     &path!["email"],
//!     Rc::new(|value: Option<&Value>| match value.and_then(Value::as_str) {
//!         Some(email) if email.contains('@') => None,
//!         _ => Some(json!("invalid email")),
//!     }),
//! );
//!
//! let sent = Rc::new(Cell::new(false));
//! let flag = sent.clone();
//! let submitted = form
//!     .submit(Some(Rc::new(move |_: &Value| flag.set(true))))
//!     .unwrap();
//! assert!(!submitted);
//! assert_eq!(form.get_field_error(&path!["email"]), Some(json!({"$error": "invalid email"})));
//!
//! form.set_field_value(&path!["email"], json!("me@example.com"));
//! assert!(form.is_valid());
//! ```

pub mod error;
pub mod error_tree;
pub mod form;
pub mod validation;

pub use error::FormError;
pub use error_tree::{
    deep_remove_empty, exclude_overlaps, merge_errors, normalize_validator_output,
    set_nested_values, FieldErrorTree, ERROR_KEY, TOUCHED_KEY,
};
pub use form::{
    Form, FormConfig, FormValidator, FormView, ResetConfig, SchemaValidator, SubmitAction,
    META_DIRTY, META_IS_SUBMITTING, META_IS_VALID, META_IS_VALIDATING, META_SUBMIT_COUNT,
};
pub use validation::{FieldValidator, ValidationRegistry, ValidatorHandle};

pub use formstate_path::{
    deep_get, deep_remove, deep_set, deep_update, path, Path, PathError, SetAction,
};
pub use formstate_store::{
    difference_map, BatchUpdate, DifferenceMap, MappingProxy, ProxyError, ProxyMapSource, Store,
    StoreError, StoreView, WatchHandle,
};
