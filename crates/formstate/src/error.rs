use formstate_store::{ProxyError, StoreError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("NO_SUBMIT_ACTION: no action passed to submit and no default action configured")]
    NoSubmitAction,
    #[error("UNKNOWN_VALIDATOR: validator handle is not registered")]
    UnknownValidator,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProxyError> for FormError {
    fn from(err: ProxyError) -> Self {
        FormError::Store(err.into())
    }
}
