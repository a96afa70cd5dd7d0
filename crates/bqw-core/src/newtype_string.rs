//! Macro for defining validated string newtypes.
//!
//! Every warehouse identifier shares the same shape: a `String` that passed a
//! validation function, plus the same set of trait impls (Display, Deref,
//! AsRef, Borrow, TryFrom, PartialEq, Serialize, Deserialize).

/// Define a strongly-typed, validated string newtype.
///
/// The `validate` function returns `Err(reason)` for rejected input; the
/// reason ends up in [`CoreError::InvalidName`](crate::error::CoreError).
///
/// Generates:
/// - The struct with `Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize`
/// - Custom `Deserialize` (runs the validator)
/// - `try_new()`, `as_str()`, `into_inner()`
/// - `Display`, `AsRef<str>`, `Deref<Target=str>`, `Borrow<str>`
/// - `TryFrom<String>`, `TryFrom<&str>`
/// - `PartialEq<str>`, `PartialEq<&str>`
macro_rules! define_validated_name {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
        kind = $kind:literal;
        validate = $validate:path;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(s).map_err(serde::de::Error::custom)
            }
        }

        impl $Name {
            /// Validate and wrap a name.
            pub fn try_new(name: impl Into<String>) -> $crate::error::CoreResult<Self> {
                let s = name.into();
                match $validate(&s) {
                    Ok(()) => Ok(Self(s)),
                    Err(reason) => Err($crate::error::CoreError::InvalidName {
                        kind: $kind,
                        name: s,
                        reason,
                    }),
                }
            }

            /// Return the underlying name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str { &self.0 }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl TryFrom<String> for $Name {
            type Error = $crate::error::CoreError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::try_new(s)
            }
        }

        impl TryFrom<&str> for $Name {
            type Error = $crate::error::CoreError;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::try_new(s)
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
    };
}

pub(crate) use define_validated_name;
