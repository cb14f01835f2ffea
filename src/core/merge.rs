//! Deep merge of configuration layers
//!
//! Tables merge key by key, recursively. Every other value (strings,
//! numbers, booleans and arrays) is replaced wholesale by the overriding
//! layer; arrays are never concatenated or merged element-wise.

use toml::value::Table;
use toml::Value;

/// Merge `override_table` into `base` in place.
pub fn merge_tables(base: &mut Table, override_table: &Table) {
    for (key, override_value) in override_table {
        match (base.get_mut(key), override_value) {
            (Some(Value::Table(base_table)), Value::Table(override_table)) => {
                merge_tables(base_table, override_table);
            }
            _ => {
                base.insert(key.clone(), override_value.clone());
            }
        }
    }
}

/// Return `base` with `override_table` merged on top.
pub fn deep_merge(base: &Table, override_table: &Table) -> Table {
    let mut merged = base.clone();
    merge_tables(&mut merged, override_table);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(src: &str) -> Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_disjoint_keys_union() {
        let merged = deep_merge(&table("a = 1"), &table("b = 2"));
        assert_eq!(merged, table("a = 1\nb = 2"));
    }

    #[test]
    fn test_scalar_override_wins() {
        let merged = deep_merge(&table("a = 1\nb = 'x'"), &table("a = 5"));
        assert_eq!(merged, table("a = 5\nb = 'x'"));
    }

    #[test]
    fn test_nested_tables_recurse() {
        let base = table(
            r#"
[build_args]
A = "1"
B = "2"
"#,
        );
        let over = table(
            r#"
[build_args]
B = "3"
C = "4"
"#,
        );
        let merged = deep_merge(&base, &over);
        assert_eq!(
            merged,
            table(
                r#"
[build_args]
A = "1"
B = "3"
C = "4"
"#
            )
        );
    }

    #[test]
    fn test_arrays_are_replaced_not_concatenated() {
        let merged = deep_merge(&table("tags = ['a', 'b']"), &table("tags = ['c']"));
        assert_eq!(merged, table("tags = ['c']"));
    }

    #[test]
    fn test_table_replaced_by_scalar() {
        let merged = deep_merge(&table("[x]\ny = 1"), &table("x = 'flat'"));
        assert_eq!(merged, table("x = 'flat'"));
    }

    fn flat_table() -> impl Strategy<Value = Table> {
        prop::collection::btree_map("[a-e]", 0i64..100, 0..5).prop_map(|m| {
            m.into_iter()
                .map(|(k, v)| (k, Value::Integer(v)))
                .collect::<Table>()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every key of either side survives, and overlapping keys take the override
        #[test]
        fn prop_merge_is_key_union_with_override_precedence(
            base in flat_table(),
            over in flat_table(),
        ) {
            let merged = deep_merge(&base, &over);
            for (k, v) in &over {
                prop_assert_eq!(merged.get(k), Some(v));
            }
            for (k, v) in &base {
                if !over.contains_key(k) {
                    prop_assert_eq!(merged.get(k), Some(v));
                }
            }
            prop_assert!(merged.keys().all(|k| base.contains_key(k) || over.contains_key(k)));
        }

        /// Merging a layer onto itself is a no-op
        #[test]
        fn prop_merge_idempotent(base in flat_table()) {
            prop_assert_eq!(deep_merge(&base, &base), base);
        }
    }
}
