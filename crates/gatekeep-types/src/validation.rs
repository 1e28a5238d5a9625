//! Input validation for identifiers and wire payloads.
//!
//! All identifiers must be non-empty printable UTF-8 of at most 256 bytes;
//! namespaces are further restricted to `[A-Za-z0-9_-]`.

use crate::{CheckRequest, EngineError, Subject, TupleFilter, TupleSpec};

/// Maximum byte length of any identifier field.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Validate a generic identifier field (object ids, relations, user ids).
pub fn validate_identifier(field: &str, value: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::Validation(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::Validation(format!(
            "{} exceeds {} bytes",
            field, MAX_IDENTIFIER_LEN
        )));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(EngineError::Validation(format!(
            "{} contains non-printable characters",
            field
        )));
    }
    Ok(())
}

/// Validate a namespace: identifier rules plus the restricted charset.
pub fn validate_namespace(value: &str) -> Result<(), EngineError> {
    validate_identifier("namespace", value)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(EngineError::Validation(format!(
            "namespace {:?} contains characters outside [A-Za-z0-9_-]",
            value
        )));
    }
    Ok(())
}

/// Validate a check request's identifier fields.
pub fn validate_check(request: &CheckRequest) -> Result<(), EngineError> {
    validate_namespace(&request.namespace)?;
    validate_identifier("object_id", &request.object_id)?;
    validate_identifier("relation", &request.relation)?;
    validate_identifier("user_type", request.user_type())?;
    validate_identifier("user_id", &request.user_id)?;
    Ok(())
}

/// Validate a wire tuple and convert it into its tagged subject form.
pub fn validate_tuple_spec(spec: &TupleSpec) -> Result<Subject, EngineError> {
    validate_namespace(&spec.namespace)?;
    validate_identifier("object_id", &spec.object_id)?;
    validate_identifier("relation", &spec.relation)?;
    validate_identifier("user_type", &spec.user_type)?;
    validate_identifier("user_id", &spec.user_id)?;
    Subject::from_parts(&spec.user_type, &spec.user_id)
}

/// Validate the populated fields of a read filter.
pub fn validate_filter(filter: &TupleFilter) -> Result<(), EngineError> {
    if let Some(namespace) = &filter.namespace {
        validate_namespace(namespace)?;
    }
    if let Some(object_id) = &filter.object_id {
        validate_identifier("object_id", object_id)?;
    }
    if let Some(relation) = &filter.relation {
        validate_identifier("relation", relation)?;
    }
    if let Some(user_type) = &filter.user_type {
        validate_identifier("user_type", user_type)?;
    }
    if let Some(user_id) = &filter.user_id {
        validate_identifier("user_id", user_id)?;
    }
    Ok(())
}
