//! Shared test utilities for domain testing
//!
//! - `TestMongo`: single-node MongoDB replica set container (feature: "mongo")
//! - `TestNats`: JetStream-enabled NATS container (feature: "nats")
//! - `TestDataBuilder`: deterministic test data (always available)
//!
//! # Features
//!
//! - `mongo` (default): MongoDB test infrastructure
//! - `nats`: NATS test infrastructure
//! - `all`: everything
//!
//! Container-backed tests need Docker and are usually marked `#[ignore]`:
//!
//! ```rust,no_run
//! use test_utils::{TestDataBuilder, TestMongo};
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_mongo_test() {
//!     let mongo = TestMongo::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_mongo_test");
//!
//!     let database = mongo.database_name("orders");
//!     let name = builder.name("order", "main");
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "mongo")]
mod mongo;

#[cfg(feature = "nats")]
mod nats;

#[cfg(feature = "mongo")]
pub use mongo::TestMongo;

#[cfg(feature = "nats")]
pub use nats::{StoredMessage, TestNats};

/// Builder for test data with deterministic randomization
///
/// The same seed always yields the same values, so failures reproduce.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed derived from the test name.
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_create_order");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic identifier for this seed.
    pub fn id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Unique name such as `test-order-12345-main`.
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// E.164 phone number: `+1` followed by ten digits.
    pub fn phone_number(&self) -> String {
        format!("+1{:010}", 2_000_000_000 + self.seed % 7_000_000_000)
    }

    /// Positive price with two decimals, below 1000.
    pub fn price(&self) -> f64 {
        (1 + self.seed % 99_999) as f64 / 100.0
    }
}

/// Test assertion helpers
pub mod assertions {
    use uuid::Uuid;

    /// Assert that two UUIDs are equal with a nice error message
    pub fn assert_uuid_eq(actual: Uuid, expected: Uuid, context: &str) {
        assert_eq!(
            actual, expected,
            "{}: expected UUID {}, got {}",
            context, expected, actual
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}
