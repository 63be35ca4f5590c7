use snowflake::SnowflakeIdGenerator;
use std::sync::{Mutex, MutexGuard};

/// Machine 1, node 1; a single writer process per database.
static ID_GENERATOR: Mutex<Option<SnowflakeIdGenerator>> = Mutex::new(None);

fn lock_generator() -> MutexGuard<'static, Option<SnowflakeIdGenerator>> {
    ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generates a Snowflake ID in string form.
///
/// IDs produced by one process are strictly increasing, so rows persisted
/// later always sort after rows persisted earlier.
pub fn next_id() -> String {
    let mut gen = lock_generator();
    let generator = gen.get_or_insert_with(|| SnowflakeIdGenerator::new(1, 1));
    generator.real_time_generate().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_id_returns_unique_ids() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(!id.is_empty());
            assert!(ids.insert(id), "Duplicate ID generated");
        }
    }

    #[test]
    fn test_next_id_is_increasing() {
        let mut last = 0i64;
        for _ in 0..100 {
            let id: i64 = next_id().parse().expect("ID should be a valid i64");
            assert!(id > last);
            last = id;
        }
    }
}
