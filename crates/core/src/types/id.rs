//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create opaque string-backed ID wrappers that
//! prevent accidentally mixing IDs from different entity types. Product IDs
//! take part in the cart line identity key and are interpolated into backend
//! URLs, so they get a validated type of their own.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Macro to define an opaque string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use ebasi_core::define_id;
/// define_id!(SessionId);
/// define_id!(DeviceId);
///
/// let session = SessionId::new("abc");
/// assert_eq!(session.as_str(), "abc");
///
/// // These are different types, so this won't compile:
/// // let _: SessionId = DeviceId::new("abc");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

define_id!(UserId);

/// Errors that can occur when parsing a [`ProductId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty.
    #[error("product id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("product id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside the allowed set.
    #[error("product id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A product identifier (e.g. `SKU-1`, or a numeric backend id such as `42`).
///
/// ## Constraints
///
/// - Length: 1-64 characters
/// - ASCII letters, digits, `-`, `_` and `.` only
///
/// The character set keeps the id safe to embed in a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Maximum length of a product id.
    pub const MAX_LENGTH: usize = 64;

    /// Parse and validate a product id.
    ///
    /// # Errors
    ///
    /// Returns [`ProductIdError`] if the id is empty, too long, or contains
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn parse(id: impl Into<String>) -> Result<Self, ProductIdError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ProductIdError::Empty);
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(ProductIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ProductIdError::InvalidCharacter(c));
        }

        Ok(Self(id))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = ProductIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for ProductId {
    type Error = ProductIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl core::str::FromStr for ProductId {
    type Err = ProductIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_accepts_skus_and_numbers() {
        assert_eq!(ProductId::parse("SKU-1").unwrap().as_str(), "SKU-1");
        assert_eq!(ProductId::parse("42").unwrap().to_string(), "42");
        assert!(ProductId::parse("saree_red.v2").is_ok());
    }

    #[test]
    fn test_product_id_rejects_empty() {
        assert_eq!(ProductId::parse(""), Err(ProductIdError::Empty));
    }

    #[test]
    fn test_product_id_rejects_path_characters() {
        assert_eq!(
            ProductId::parse("12/../admin"),
            Err(ProductIdError::InvalidCharacter('/'))
        );
        assert_eq!(
            ProductId::parse("SKU 1"),
            Err(ProductIdError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_product_id_rejects_too_long() {
        let long = "a".repeat(ProductId::MAX_LENGTH + 1);
        assert!(matches!(
            ProductId::parse(long),
            Err(ProductIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_product_id_deserialize_validates() {
        let ok: ProductId = serde_json::from_str("\"SKU-9\"").unwrap();
        assert_eq!(ok.as_str(), "SKU-9");

        let bad: Result<ProductId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_user_id_is_transparent() {
        let id = UserId::new("user-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-7\"");
        assert_eq!(id.to_string(), "user-7");
    }
}
