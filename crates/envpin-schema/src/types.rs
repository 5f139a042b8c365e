//! Newtype wrappers for string identifiers.
//!
//! All newtypes serialize/deserialize as plain strings so lock entries stay
//! readable on disk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Full 64-character blake3 hex digest of a normalized manifest.
    ///
    /// This is the only identity used downstream of the manifest model: lock
    /// entries are keyed by it and resolved environments carry it.
    ContentHash
);

string_newtype!(
    /// Truncated 12-character prefix of a [`ContentHash`], used for display.
    ShortHash
);

string_newtype!(
    /// Identifier of an auxiliary package requested by a manifest.
    PackageId
);

impl ContentHash {
    pub fn short(&self) -> ShortHash {
        ShortHash::new(self.0.chars().take(12).collect::<String>())
    }
}
