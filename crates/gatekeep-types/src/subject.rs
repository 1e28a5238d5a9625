//! Tagged subject representation.
//!
//! The wire format carries subjects as a `user_type`/`user_id` string pair;
//! internally the two shapes are distinguished as a variant so userset
//! handling is explicit rather than a string discipline.

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Marker user_type that flags a userset subject on the wire.
pub const USERSET_TYPE: &str = "userset";

/// A reference to the set of subjects holding `relation` on
/// `namespace:object_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsersetRef {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
}

impl UsersetRef {
    /// Parse the `ns:obj#rel` encoding used in `user_id`.
    pub fn parse(encoded: &str) -> Option<Self> {
        let (namespace, rest) = encoded.split_once(':')?;
        let (object_id, relation) = rest.split_once('#')?;
        if namespace.is_empty() || object_id.is_empty() || relation.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!("{}:{}#{}", self.namespace, self.object_id, self.relation)
    }
}

/// A subject: either a concrete principal or a userset reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A concrete principal, e.g. `user:alice`
    Direct { kind: String, id: String },
    /// All members of `(namespace, object_id, relation)`
    Userset(UsersetRef),
}

impl Subject {
    pub fn direct(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Direct { kind: kind.into(), id: id.into() }
    }

    pub fn userset(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::Userset(UsersetRef {
            namespace: namespace.into(),
            object_id: object_id.into(),
            relation: relation.into(),
        })
    }

    /// Build a subject from the wire pair.
    ///
    /// Two userset encodings are accepted and normalized to the same variant:
    /// the explicit marker (`user_type = "userset"`, `user_id = "ns:obj#rel"`)
    /// and a namespace-as-group (`user_type = "team"`, `user_id = "obj#rel"`).
    /// A marker subject whose id does not parse is rejected.
    pub fn from_parts(user_type: &str, user_id: &str) -> Result<Self, EngineError> {
        if user_type == USERSET_TYPE {
            return UsersetRef::parse(user_id).map(Subject::Userset).ok_or_else(|| {
                EngineError::Validation(format!(
                    "userset subject must encode ns:obj#rel, got {:?}",
                    user_id
                ))
            });
        }

        if user_type != "user" {
            if let Some((object_id, relation)) = user_id.split_once('#') {
                if !object_id.is_empty() && !relation.is_empty() {
                    return Ok(Subject::Userset(UsersetRef {
                        namespace: user_type.to_string(),
                        object_id: object_id.to_string(),
                        relation: relation.to_string(),
                    }));
                }
                return Err(EngineError::Validation(format!(
                    "malformed userset reference {:?}",
                    user_id
                )));
            }
        }

        Ok(Subject::direct(user_type, user_id))
    }

    /// Render back to the canonical wire pair. Usersets always render with
    /// the explicit marker so both accepted encodings compare equal in
    /// storage.
    pub fn to_parts(&self) -> (String, String) {
        match self {
            Subject::Direct { kind, id } => (kind.clone(), id.clone()),
            Subject::Userset(userset) => (USERSET_TYPE.to_string(), userset.encode()),
        }
    }

    pub fn is_userset(&self) -> bool {
        matches!(self, Subject::Userset(_))
    }

    pub fn as_userset(&self) -> Option<&UsersetRef> {
        match self {
            Subject::Userset(userset) => Some(userset),
            Subject::Direct { .. } => None,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (user_type, user_id) = self.to_parts();
        write!(f, "{}:{}", user_type, user_id)
    }
}
