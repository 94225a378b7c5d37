//! Common types used throughout OmniDrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a registered provider instance.
///
/// Stable for the adapter's lifetime; used as the map key in every
/// aggregate operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a new ProviderId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "ProviderId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage quota for a single provider, in bytes.
///
/// Always recomputed on demand from the backend, never cached across
/// calls, because backend-reported usage can change between accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Bytes currently used.
    pub used: u64,
    /// Total capacity in bytes.
    pub total: u64,
    /// Bytes still available. Never negative, even if `used > total`.
    pub available: u64,
}

impl Quota {
    /// Create a quota from used and total bytes.
    ///
    /// # Postconditions
    /// - `available == max(0, total - used)`
    pub fn new(used: u64, total: u64) -> Self {
        Self {
            used,
            total,
            available: total.saturating_sub(used),
        }
    }

    /// An empty quota (no capacity, nothing used).
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Utilization as a percentage of total capacity.
    ///
    /// Returns 0.0 when the provider reports no capacity at all.
    pub fn percent_used(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.used as f64 / self.total as f64) * 100.0
        }
    }

    /// Add another provider's quota into this one (for grand totals).
    pub fn accumulate(&mut self, other: &Quota) {
        self.used = self.used.saturating_add(other.used);
        self.total = self.total.saturating_add(other.total);
        self.available = self.total.saturating_sub(self.used);
    }
}

/// Metadata for a single raw entry as reported by one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Provider-native identifier for the entry.
    pub id: String,
    /// Name of the entry.
    pub name: String,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// MIME type reported by the backend.
    pub mime_type: String,
    /// Whether this is a folder.
    pub is_folder: bool,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Content hash, where the backend exposes one. Not guaranteed.
    pub content_hash: Option<String>,
}

/// Result of a successful upload to one provider.
///
/// A failed upload is reported through the error channel, not through
/// a flag on this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uploaded {
    /// Provider-native identifier of the created file.
    pub file_id: String,
    /// Public or API URL for the file, where the backend provides one.
    pub url: Option<String>,
    /// Size of the uploaded content in bytes.
    pub size: u64,
    /// MIME type the file was stored with.
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_provider_id_creation() {
        let id = ProviderId::new("gdrive-main").unwrap();
        assert_eq!(id.as_str(), "gdrive-main");
        assert_eq!(id.to_string(), "gdrive-main");
    }

    #[test]
    fn test_provider_id_empty_fails() {
        assert!(ProviderId::new("").is_err());
    }

    #[test]
    fn test_quota_available() {
        let q = Quota::new(30, 100);
        assert_eq!(q.available, 70);
    }

    #[test]
    fn test_quota_overused_saturates() {
        let q = Quota::new(150, 100);
        assert_eq!(q.available, 0);
    }

    #[test]
    fn test_quota_percent_used() {
        assert_eq!(Quota::new(80, 100).percent_used(), 80.0);
        assert_eq!(Quota::zero().percent_used(), 0.0);
    }

    #[test]
    fn test_quota_accumulate() {
        let mut total = Quota::zero();
        total.accumulate(&Quota::new(10, 100));
        total.accumulate(&Quota::new(50, 200));
        assert_eq!(total.used, 60);
        assert_eq!(total.total, 300);
        assert_eq!(total.available, 240);
    }

    proptest! {
        #[test]
        fn quota_available_never_negative(used in 0u64.., total in 0u64..) {
            let q = Quota::new(used, total);
            prop_assert_eq!(q.available, total.saturating_sub(used));
            prop_assert!(q.available <= total);
        }

        #[test]
        fn quota_accumulate_keeps_invariant(
            a in (0u64..1 << 40, 0u64..1 << 40),
            b in (0u64..1 << 40, 0u64..1 << 40),
        ) {
            let mut q = Quota::new(a.0, a.1);
            q.accumulate(&Quota::new(b.0, b.1));
            prop_assert_eq!(q.available, q.total.saturating_sub(q.used));
        }
    }
}
