//! Mount configuration for the FUSE filesystem.

use std::time::Duration;

/// Default kernel cache lifetime for attributes and entries.
///
/// Remote content does not change while mounted, so a long TTL is safe.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(60);

/// Configuration options for the FUSE filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live handed to the kernel for attributes and lookups.
    ///
    /// Default: 60 seconds.
    pub attr_ttl: Duration,

    /// Allow users other than the mounting user to access the mount.
    ///
    /// Requires `user_allow_other` in `/etc/fuse.conf`.
    pub allow_other: bool,

    /// Ask the kernel to unmount automatically when the process exits.
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            allow_other: false,
            auto_unmount: false,
        }
    }
}

impl MountConfig {
    /// Sets the kernel cache TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    #[must_use]
    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }

    #[must_use]
    pub fn auto_unmount(mut self, auto: bool) -> Self {
        self.auto_unmount = auto;
        self
    }
}
