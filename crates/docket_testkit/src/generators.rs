//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for index and entity names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for entity ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9-]{1,12}").expect("Invalid regex")
}

/// Strategy for page sizes small enough to force many pages.
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..8
}

/// Strategy for one batch of index items. Items may repeat.
pub fn item_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::string::string_regex("[a-z]{1,3}").expect("Invalid regex"), 0..=max_len)
}

/// Strategy for a sequence of append batches.
pub fn batches_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(item_batch_strategy(10), 0..6)
}

/// One step of an index workload.
#[derive(Debug, Clone)]
pub enum IndexOp {
    /// Append these items.
    Add(Vec<String>),
    /// Remove these items.
    Remove(Vec<String>),
    /// Clear the index.
    Clear,
}

/// Strategy for an index workload mixing appends, removals and clears.
pub fn index_ops_strategy() -> impl Strategy<Value = Vec<IndexOp>> {
    let op = prop_oneof![
        6 => item_batch_strategy(8).prop_map(IndexOp::Add),
        3 => item_batch_strategy(3).prop_map(IndexOp::Remove),
        1 => Just(IndexOp::Clear),
    ];
    prop::collection::vec(op, 0..20)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn names_match_key_alphabet() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let name = name_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!name.is_empty());
            assert!(!name.contains(':'));
        }
    }

    #[test]
    fn page_sizes_are_positive() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let size = page_size_strategy().new_tree(&mut runner).unwrap().current();
            assert!(size >= 1);
        }
    }
}
