//! Shared test utilities for the almacen workspace
//!
//! - `TestDatabase`: migrated PostgreSQL container with automatic cleanup
//! - `TestDataBuilder`: deterministic names and ids per test
//! - `assertions`: small assertion helpers
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let actor_id = builder.actor_id();
//!     let product_name = builder.name("product", "cement");
//! }
//! ```

use uuid::Uuid;

mod postgres;

pub use postgres::TestDatabase;

/// Builder for test data derived from a seed
///
/// Product and category names are unique in the schema, so every test builds
/// its names from its own seed.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from the test name
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_outbound_insufficient_stock");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic id for the actor credited with movements
    pub fn actor_id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Username matching [`Self::actor_id`]
    pub fn actor_name(&self) -> String {
        format!("warehouse-{}", self.seed % 10_000)
    }

    /// Unique name for a product, category or similar
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("my_test");
    /// let name = builder.name("product", "cement");
    /// assert!(name.starts_with("test-product-"));
    /// assert!(name.ends_with("-cement"));
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

pub mod assertions {
    use uuid::Uuid;

    /// Assert that two UUIDs are equal with context in the message
    pub fn assert_uuid_eq(actual: Uuid, expected: Uuid, context: &str) {
        assert_eq!(
            actual, expected,
            "{}: expected UUID {}, got {}",
            context, expected, actual
        );
    }

    /// Unwrap an option, panicking with context
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}
