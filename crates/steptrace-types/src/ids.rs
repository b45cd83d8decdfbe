//! Identifier types.
//!
//! Runs get a time-ordered UUID v7 so output artifacts from consecutive
//! runs sort naturally. Volumes are identified by a [`VolumeHandle`], a
//! small interned integer handed out by the transport engine; it is stable
//! for the lifetime of the geometry and is the key of the classification
//! cache.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for one recording run (one open/close of a sink).
    RunId
}

/// Stable identity of a physical volume, as interned by the transport engine.
///
/// Two steps in the same volume instance always carry the same handle, so
/// the handle (not the display name) keys the classification cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeHandle(pub u32);

impl VolumeHandle {
    /// Return the raw handle value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_time_ordered() {
        let first = RunId::new();
        let second = RunId::new();
        assert!(first <= second);
        assert_ne!(first, second);
    }

    #[test]
    fn volume_handle_is_transparent_in_json() {
        let json = serde_json::to_string(&VolumeHandle(7)).unwrap_or_default();
        assert_eq!(json, "7");
    }
}
