//! Named field projections used to address cached values.
//!
//! An [`Index`] is configured once, when a cache is built, from an
//! [`IndexConfig`]. Its name is the comma-separated list of the value fields
//! it projects, e.g. `"ID"` or `"AccountID,TargetAccountID"`. Value types
//! expose their fields through the [`Fields`] trait.
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::index::{Fields, Index, IndexConfig, Key, KeyPart};
//!
//! struct Follow {
//!     id: String,
//!     account_id: String,
//!     target_account_id: String,
//! }
//!
//! impl Fields for Follow {
//!     fn field(&self, name: &str) -> Option<KeyPart> {
//!         match name {
//!             "ID" => Some(self.id.as_str().into()),
//!             "AccountID" => Some(self.account_id.as_str().into()),
//!             "TargetAccountID" => Some(self.target_account_id.as_str().into()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let index = Index::new(&IndexConfig::new("AccountID,TargetAccountID")).unwrap();
//! let follow = Follow {
//!     id: "f1".into(),
//!     account_id: "a1".into(),
//!     target_account_id: "a2".into(),
//! };
//!
//! assert_eq!(index.key_of(&follow), Some(Key::from(("a1", "a2"))));
//! ```

mod key;

pub use key::{Key, KeyPart};

use crate::error::ConfigError;

/// Field access for cacheable value types.
///
/// `field` must return `Some` for every field named by a configured index.
/// Returning `None` for such a field is a programming error and panics when
/// the value is inserted.
pub trait Fields {
    fn field(&self, name: &str) -> Option<KeyPart>;
}

/// Declarative description of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Comma-separated field names; also the index name.
    pub fields: String,
    /// Index keys containing a zero value (`""`, `0`, `false`).
    pub allow_zero: bool,
    /// Allow many values under one key.
    pub multiple: bool,
}

impl IndexConfig {
    pub fn new(fields: impl Into<String>) -> Self {
        Self {
            fields: fields.into(),
            allow_zero: false,
            multiple: false,
        }
    }

    pub fn allow_zero(mut self) -> Self {
        self.allow_zero = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

impl From<&str> for IndexConfig {
    fn from(fields: &str) -> Self {
        Self::new(fields)
    }
}

impl From<String> for IndexConfig {
    fn from(fields: String) -> Self {
        Self::new(fields)
    }
}

/// A validated, immutable index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    name: String,
    fields: Box<[String]>,
    allow_zero: bool,
    multiple: bool,
}

impl Index {
    /// Validates `config`; every comma-separated field name must be non-empty.
    pub fn new(config: &IndexConfig) -> Result<Self, ConfigError> {
        let fields: Box<[String]> = config
            .fields
            .split(',')
            .map(|field| field.trim().to_owned())
            .collect();
        if fields.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyField(config.fields.clone()));
        }
        Ok(Self {
            name: fields.join(","),
            fields,
            allow_zero: config.allow_zero,
            multiple: config.multiple,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `true` if at most one value may occupy each key.
    pub fn is_unique(&self) -> bool {
        !self.multiple
    }

    pub fn allows_zero(&self) -> bool {
        self.allow_zero
    }

    /// Projects `value` into the key it occupies under this index.
    ///
    /// Returns `None` when the key contains a zero part and the index does
    /// not allow zero keys.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not expose one of the index fields.
    pub fn key_of<T: Fields>(&self, value: &T) -> Option<Key> {
        let parts: Vec<KeyPart> = self
            .fields
            .iter()
            .map(|field| match value.field(field) {
                Some(part) => part,
                None => panic!(
                    "cached value has no field {field:?} required by index {:?}",
                    self.name
                ),
            })
            .collect();
        let key = Key::new(parts);
        (self.allow_zero || !key.is_zero()).then_some(key)
    }

    /// Converts caller-supplied key parts into a key for this index.
    ///
    /// # Panics
    ///
    /// Panics if the number of parts differs from the number of fields.
    pub fn key(&self, key: impl Into<Key>) -> Key {
        let key = key.into();
        assert_eq!(
            key.len(),
            self.fields.len(),
            "index {:?} expects {} key parts, got {}",
            self.name,
            self.fields.len(),
            key.len()
        );
        key
    }

    /// Whether a lookup key can ever be present in this index.
    pub(crate) fn admits(&self, key: &Key) -> bool {
        self.allow_zero || !key.is_zero()
    }

    /// Per-key lock name for `key`, unique across indices.
    pub(crate) fn lock_name(&self, key: &Key) -> String {
        let mut out = String::with_capacity(self.name.len() + 16);
        out.push_str(&self.name);
        out.push('\0');
        key.encode_into(&mut out);
        out
    }
}
