//! Device identity: persisted app id and device id.

use tracing::{debug, info};
use watch_bus::token;

use crate::domain::{Identity, WatchError};
use crate::ports::IdentityStore;

/// Storage key for the app id.
pub const APP_ID_KEY: &str = "watch-app-id";

/// Storage key for the device id.
pub const DEVICE_ID_KEY: &str = "watch-device-id";

/// Length of a generated device id.
pub const DEVICE_ID_LENGTH: usize = 256;

/// Radix of a generated device id.
pub const DEVICE_ID_RADIX: u32 = 32;

impl Identity {
    /// Load the device identity from `store`, creating and persisting a
    /// device id on first use. The app id is always overwritten with the
    /// configured one.
    pub fn load_or_create(store: &dyn IdentityStore, app_id: &str) -> Result<Self, WatchError> {
        store.set(APP_ID_KEY, app_id)?;

        let device_id = match store.get(DEVICE_ID_KEY)? {
            Some(existing) if !existing.is_empty() => {
                debug!("Reusing persisted device id");
                existing
            }
            _ => {
                let generated = token(DEVICE_ID_LENGTH, DEVICE_ID_RADIX);
                store.set(DEVICE_ID_KEY, &generated)?;
                info!(device = %short(&generated), "Generated device id");
                generated
            }
        };

        Ok(Self {
            app_id: app_id.to_string(),
            device_id,
        })
    }

    /// Abbreviated device id for logs.
    #[must_use]
    pub fn short_device_id(&self) -> &str {
        short(&self.device_id)
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    #[test]
    fn test_device_id_generated_once() {
        let store = MemoryStore::new();
        let first = Identity::load_or_create(&store, "demo").unwrap();
        let second = Identity::load_or_create(&store, "demo").unwrap();

        assert_eq!(first.device_id.len(), DEVICE_ID_LENGTH);
        assert_eq!(first.device_id, second.device_id);
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap(), Some(first.device_id));
    }

    #[test]
    fn test_app_id_overwritten() {
        let store = MemoryStore::new();
        Identity::load_or_create(&store, "first").unwrap();
        let identity = Identity::load_or_create(&store, "second").unwrap();

        assert_eq!(identity.app_id, "second");
        assert_eq!(store.get(APP_ID_KEY).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_empty_device_id_regenerated() {
        let store = MemoryStore::new();
        store.set(DEVICE_ID_KEY, "").unwrap();
        let identity = Identity::load_or_create(&store, "demo").unwrap();
        assert_eq!(identity.device_id.len(), DEVICE_ID_LENGTH);
    }

    #[test]
    fn test_short_device_id() {
        let identity = Identity {
            app_id: "demo".to_string(),
            device_id: "abcdefghijkl".to_string(),
        };
        assert_eq!(identity.short_device_id(), "abcdefgh");
    }
}
