//! # Platform Notification Facility
//!
//! The seam between the deduplicator and whatever the host platform
//! offers. The engine only needs to open a notification and close it by
//! handle; click/close events flow back in through
//! [`super::NotificationHub`]. When the platform has no facility or no
//! permission, `show` returns `None` and the engine degrades silently.

/// Opaque handle to one live platform notification.
pub type HandleId = u64;

/// Platform notification facility.
pub trait NotificationBackend: Send + Sync {
    /// Open a notification. `None` means the facility is unavailable or
    /// permission was denied; the caller skips the notification silently.
    fn show(&self, title: &str, body: &str, icon: Option<&str>, tag: &str) -> Option<HandleId>;

    /// Close a notification by handle. Closing an already-closed handle
    /// must be harmless.
    fn close(&self, handle: HandleId);
}

/// Backend for platforms without a notification facility.
pub struct NullBackend;

impl NotificationBackend for NullBackend {
    fn show(&self, _title: &str, _body: &str, _icon: Option<&str>, _tag: &str) -> Option<HandleId> {
        None
    }

    fn close(&self, _handle: HandleId) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_degrades() {
        let backend = NullBackend;
        assert!(backend.show("t", "b", None, "tag").is_none());
        backend.close(7);
    }

    #[test]
    fn test_mock_backend_tracks_live_handles() {
        let backend = mock::MockBackend::new();
        let h1 = backend.show("a", "b", None, "t").unwrap();
        let h2 = backend.show("c", "d", None, "t").unwrap();
        assert_ne!(h1, h2);
        assert_eq!(backend.live_count(), 2);

        backend.close(h1);
        assert_eq!(backend.live_count(), 1);
        // Double close is harmless
        backend.close(h1);
        assert_eq!(backend.live_count(), 1);
    }
}
