//! Type-safe identifier wrappers.
//!
//! Registry keys (entities, devices, areas, floors) are opaque strings
//! assigned by the upstream automation platform, so they wrap [`String`].
//! The subscriber id handed out by the live stream is a [`Uuid`].
//!
//! All wrappers serialize transparently as their inner value, which keeps
//! them usable as JSON object keys.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key! {
    /// Stable key of a monitored entity (e.g. `sensor.kitchen_temperature`).
    EntityId
}

define_key! {
    /// Stable key of a physical device that owns one or more entities.
    DeviceId
}

define_key! {
    /// Stable key of an area (room or zone).
    AreaId
}

define_key! {
    /// Stable key of a floor.
    FloorId
}

/// Identifier the live stream assigns to this subscription.
///
/// Informational only: the core logs it but never routes on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Create a random subscriber id (used by test servers).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
