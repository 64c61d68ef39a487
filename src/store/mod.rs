//! Remote key-value document holding the rack state
//!
//! The document is a flat JSON object: `"<index>"` keys map to spice names and
//! the reserved [`CURRENT_POSITION_KEY`] holds the selected index.

/// In-memory document store
pub mod memory;
/// Firebase-style REST document store
pub mod rest;

pub use memory::MemoryStore;
pub use rest::StoreHandle;

use serde_json::{Map, Value};
use thiserror::Error;

/// Flat key-value document at the store root
pub type Document = Map<String, Value>;

/// Reserved key holding the currently selected position
pub const CURRENT_POSITION_KEY: &str = "position";

/// Errors raised by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the store
    #[error("store request to {url} failed: {source}")]
    Request {
        /// Request URL (without credentials)
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// Store answered with a non-success status
    #[error("store returned status {status} for {url}")]
    Status {
        /// Request URL (without credentials)
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Response body was not valid JSON
    #[error("store returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Root value was neither an object, an array nor null
    #[error("store root is not a key-value document")]
    NotADocument,

    /// Store is unreachable or closed
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wraps a transport error, dropping the request URL it carries
    ///
    /// reqwest embeds the full URL, query string included, in its error text;
    /// the query holds the auth token.
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_owned(),
            source: source.without_url(),
        }
    }
}

/// Get/set access to the store's root document
///
/// Every call is a synchronous round trip; implementations do not batch or retry.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore {
    /// Fetch the whole root document (empty when nothing is stored)
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    fn fetch_root(&self) -> Result<Document, StoreError>;

    /// Overwrite a single top-level key
    ///
    /// # Errors
    /// Returns error if the write is not acknowledged
    fn set_child(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn fetch_root(&self) -> Result<Document, StoreError> {
        (**self).fetch_root()
    }

    fn set_child(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        (**self).set_child(key, value)
    }
}

/// Normalize a root value into a flat document
///
/// A root whose keys are all small integers may be returned as a JSON array with
/// `null` holes; those are folded back into string keys.
///
/// # Errors
/// Returns [`StoreError::NotADocument`] for scalar roots
pub fn into_document(root: Value) -> Result<Document, StoreError> {
    match root {
        Value::Null => Ok(Document::new()),
        Value::Object(map) => Ok(map),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value))
            .collect()),
        _ => Err(StoreError::NotADocument),
    }
}
