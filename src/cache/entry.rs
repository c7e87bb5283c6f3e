//! Cache Entry Module
//!
//! Defines the element stored in the point table of a sorted set.

use chrono::Utc;

// == Element ==
/// A member with its score and payload.
///
/// For cache entries the score is the absolute Unix second at which the
/// entry disappears, never a relative TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<V> {
    /// Unique member identity
    pub member: String,
    /// Ordering score (expiration timestamp in seconds)
    pub score: i64,
    /// The stored value
    pub value: V,
    /// Version of the write that last placed this member in the index
    pub version: u64,
}

impl<V> Element<V> {
    // == Constructor ==
    /// Creates a new element.
    pub fn new(member: impl Into<String>, score: i64, value: V) -> Self {
        Self {
            member: member.into(),
            score,
            value,
            version: 0,
        }
    }

    /// Sets the index write version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    // == Is Expired ==
    /// Checks whether the score has been reached at `now`.
    ///
    /// Boundary condition: an element whose score equals the current second
    /// is already expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.score <= now
    }

    // == Time To Live ==
    /// Returns the remaining seconds at `now`, or None once expired.
    pub fn ttl_at(&self, now: i64) -> Option<i64> {
        if self.is_expired_at(now) {
            None
        } else {
            Some(self.score - now)
        }
    }
}

// == Utility Functions ==
/// Returns the current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_creation() {
        let element = Element::new("key", 100, "value");

        assert_eq!(element.member, "key");
        assert_eq!(element.score, 100);
        assert_eq!(element.value, "value");
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let element = Element::new("key", 100, ());

        assert!(!element.is_expired_at(99));
        assert!(element.is_expired_at(100), "Element should be expired at boundary");
        assert!(element.is_expired_at(101));
    }

    #[test]
    fn test_ttl_at() {
        let element = Element::new("key", 100, ());

        assert_eq!(element.ttl_at(90), Some(10));
        assert_eq!(element.ttl_at(99), Some(1));
        assert_eq!(element.ttl_at(100), None);
    }

    #[test]
    fn test_now_unix_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_unix() > 1_577_836_800);
    }
}
