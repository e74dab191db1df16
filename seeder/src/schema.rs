//! Model metadata as read from a Prisma DMMF-shaped JSON document.
//!
//! This is the read-only input of the analyzer. Nothing here is persisted;
//! the analyzer turns it into a [`crate::config::SchemaConfig`].

use serde::Deserialize;

// ---------- datamodel ----------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Datamodel {
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub enums: Vec<EnumDef>,
    /// Composite types. Not seedable; the analyzer only warns about them.
    #[serde(default)]
    pub types: Vec<Model>,
}

impl Datamodel {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        // `prisma format --dmmf` wraps the datamodel; accept both shapes.
        match value.get("datamodel") {
            Some(inner) => serde_json::from_value(inner.clone()),
            None => serde_json::from_value(value),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumDef {
    pub name: String,
    #[serde(default)]
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumValue {
    pub name: String,
}

// ---------- fields ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    /// DMMF calls relation fields `object`.
    #[serde(rename = "object")]
    Relation,
    Enum,
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    /// Scalar type name, enum name, or related model name depending on `kind`.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub is_id: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_updated_at: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub relation_from_fields: Vec<String>,
    #[serde(default)]
    pub relation_to_fields: Vec<String>,
}

impl Field {
    /// Number of key columns this side of a relation names.
    pub fn relation_key_len(&self) -> usize {
        self.relation_from_fields.len() + self.relation_to_fields.len()
    }

    /// Name of the default-value function, e.g. `uuid` for `@default(uuid())`.
    pub fn default_function(&self) -> Option<&str> {
        self.default
            .as_ref()
            .and_then(|d| d.get("name"))
            .and_then(|n| n.as_str())
    }
}

// ---------- scalar types ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Json,
    BigInt,
    Bytes,
    Decimal,
    /// Enumerated values travel as their variant name.
    Enum,
}

impl ScalarType {
    pub fn from_prisma(type_name: &str) -> Option<Self> {
        match type_name {
            "String" => Some(Self::String),
            "Int" => Some(Self::Int),
            "Float" => Some(Self::Float),
            "Boolean" => Some(Self::Boolean),
            "DateTime" => Some(Self::DateTime),
            "Json" => Some(Self::Json),
            "BigInt" => Some(Self::BigInt),
            "Bytes" => Some(Self::Bytes),
            "Decimal" => Some(Self::Decimal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_dmmf_field() {
        let field: Field = serde_json::from_value(serde_json::json!({
            "name": "author",
            "kind": "object",
            "type": "Author",
            "isList": false,
            "relationName": "AuthorToBook",
            "relationFromFields": ["authorId"],
            "relationToFields": ["id"]
        }))
        .unwrap();

        assert_eq!(field.kind, FieldKind::Relation);
        assert_eq!(field.type_name, "Author");
        assert_eq!(field.relation_key_len(), 2);
        assert!(!field.is_id);
    }

    #[test]
    fn test_accepts_wrapped_datamodel() {
        let text = r#"{"datamodel": {"models": [{"name": "Tag", "fields": []}], "enums": []}}"#;
        let dm = Datamodel::from_json(text).unwrap();
        assert_eq!(dm.models.len(), 1);
        assert!(dm.types.is_empty());
    }

    #[test]
    fn test_default_function_name() {
        let field: Field = serde_json::from_value(serde_json::json!({
            "name": "id",
            "kind": "scalar",
            "type": "String",
            "isId": true,
            "hasDefaultValue": true,
            "default": { "name": "uuid", "args": [] }
        }))
        .unwrap();
        assert_eq!(field.default_function(), Some("uuid"));
    }

    #[test]
    fn test_unknown_scalar_type() {
        assert_eq!(ScalarType::from_prisma("Int"), Some(ScalarType::Int));
        assert_eq!(ScalarType::from_prisma("Geometry"), None);
    }
}
