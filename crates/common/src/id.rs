//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for entities and jobs.
///
/// Job ids must sort in insertion order; ULIDs are lexicographically
/// sortable and time-ordered, which is what the queue's oldest-first claim
/// relies on.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a new random UUID v4 (correlation ids, worker ids).
    #[must_use]
    pub fn generate_uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_ulids_sort_across_time() {
        let id_gen = IdGenerator::new();
        let earlier = id_gen.generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = id_gen.generate();
        assert!(earlier < later);
    }
}
