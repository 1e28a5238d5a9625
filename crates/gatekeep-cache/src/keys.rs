//! Cache key construction.
//!
//! Key format: `check:{ns}:{obj}#{rel}@{utype}:{uid}`. The shape is chosen
//! so each purge pattern is a pure prefix or suffix match: per-object purges
//! match on the prefix up to `#`, per-subject purges on the suffix after
//! `@`, and per-relation purges on the prefix up to `@`.

/// Key for one check question.
pub fn check_key(
    namespace: &str,
    object_id: &str,
    relation: &str,
    user_type: &str,
    user_id: &str,
) -> String {
    format!("check:{}:{}#{}@{}:{}", namespace, object_id, relation, user_type, user_id)
}

/// Prefix matching every relation on one object.
pub fn object_prefix(namespace: &str, object_id: &str) -> String {
    format!("check:{}:{}#", namespace, object_id)
}

/// Suffix matching every decision referencing one subject.
pub fn subject_suffix(user_type: &str, user_id: &str) -> String {
    format!("@{}:{}", user_type, user_id)
}

/// Prefix matching every decision on one `(object, relation)`.
pub fn relation_prefix(namespace: &str, object_id: &str, relation: &str) -> String {
    format!("check:{}:{}#{}@", namespace, object_id, relation)
}
