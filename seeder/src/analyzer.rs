//! Relation and uniqueness analysis.
//!
//! Turns model metadata into a [`SchemaConfig`]: which fields are relations,
//! which side of each relation stores the foreign key, which field sets
//! identify a row, and each table's primary key.

use std::collections::{BTreeMap, HashSet};

use crate::config::{
    FieldRef, FieldShape, ForeignKey, Generated, RelationPair, RelationTarget, SchemaConfig,
};
use crate::schema::{Datamodel, Field, FieldKind, Model, ScalarType};

// ---------- errors ----------

/// Schema-authoring errors. None of these are recoverable at seeding time.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Unsupported field type: {table}.{field} ({type_name})")]
    UnsupportedField {
        table: String,
        field: String,
        type_name: String,
    },
    #[error("Unknown enum {enum_name} on {table}.{field}")]
    UnknownEnum {
        table: String,
        field: String,
        enum_name: String,
    },
    #[error("Relation field {table}.{field} has no relation name")]
    MissingRelationName { table: String, field: String },
    #[error(
        "Relation \"{relation}\" uses a composite key. Only single-column relation keys are supported."
    )]
    CompositeRelationKey { relation: String },
    #[error("Relation \"{relation}\" is declared by {count} field(s), expected exactly 2")]
    UnpairedRelation { relation: String, count: usize },
    #[error("Relation \"{relation}\" is ambiguous: {detail}")]
    AmbiguousRelation { relation: String, detail: String },
    #[error("Relation \"{relation}\" names no foreign key on either side")]
    MissingForeignKey { relation: String },
}

// ---------- analyzer ----------

pub struct Analyzer<'a> {
    models: &'a [Model],
    enums: HashSet<&'a str>,
}

/// A relation field together with the model that declares it.
#[derive(Clone, Copy)]
struct Side<'a> {
    model: &'a Model,
    field: &'a Field,
}

impl<'a> Analyzer<'a> {
    pub fn new(datamodel: &'a Datamodel) -> Self {
        if !datamodel.types.is_empty() {
            tracing::warn!(
                count = datamodel.types.len(),
                "composite types are not supported and will be ignored"
            );
        }
        Self {
            models: &datamodel.models,
            enums: datamodel.enums.iter().map(|e| e.name.as_str()).collect(),
        }
    }

    pub fn analyze(&self) -> Result<SchemaConfig, AnalyzeError> {
        let mut config = SchemaConfig::default();

        // Pass 1: index every field, validate kinds, capture primary keys.
        for model in self.models {
            let shapes = config.fields.entry(model.name.clone()).or_default();
            for field in &model.fields {
                if let Some(shape) = self.scalar_shape(model, field)? {
                    shapes.insert(field.name.clone(), shape);
                }
                if field.is_id {
                    config
                        .primary_keys
                        .insert(model.name.clone(), field.name.clone());
                }
            }
            let pretty = pretty_name(&model.name);
            config.pretty_names.insert(pretty, model.name.clone());
        }

        // Pass 2: pair relation fields by relation name.
        let pairs = self.pair_relations()?;
        let mut key_columns: HashSet<String> = HashSet::new();

        for (pair, owner, inverse) in &pairs {
            config.relational_fields.insert(
                SchemaConfig::field_key(&pair.owner.table, &pair.owner.field),
                SchemaConfig::field_key(&pair.inverse.table, &pair.references),
            );
            config.relational_fields.insert(
                SchemaConfig::field_key(&pair.inverse.table, &pair.inverse.field),
                SchemaConfig::field_key(&pair.owner.table, &pair.column),
            );

            link_models(&mut config.relational_models, &pair.owner.table, &pair.inverse.table);
            link_models(&mut config.relational_models, &pair.inverse.table, &pair.owner.table);

            let owner_target = RelationTarget {
                table: pair.inverse.table.clone(),
                foreign_key: ForeignKey::Local {
                    column: pair.column.clone(),
                    references: pair.references.clone(),
                },
            };
            let inverse_target = RelationTarget {
                table: pair.owner.table.clone(),
                foreign_key: ForeignKey::Remote {
                    column: pair.column.clone(),
                    references: pair.references.clone(),
                },
            };
            config
                .fields
                .entry(pair.owner.table.clone())
                .or_default()
                .insert(pair.owner.field.clone(), relation_shape(owner.field, owner_target));
            config
                .fields
                .entry(pair.inverse.table.clone())
                .or_default()
                .insert(
                    pair.inverse.field.clone(),
                    relation_shape(inverse.field, inverse_target),
                );

            key_columns.insert(SchemaConfig::field_key(&pair.owner.table, &pair.column));
        }

        // Pass 3: unique-identifying fields, foreign-key columns excluded.
        for model in self.models {
            let unique: Vec<String> = model
                .fields
                .iter()
                .filter(|f| f.kind != FieldKind::Relation)
                .filter(|f| f.is_unique || f.is_id)
                .filter(|f| !key_columns.contains(&SchemaConfig::field_key(&model.name, &f.name)))
                .map(|f| f.name.clone())
                .collect();
            if !unique.is_empty() {
                config.unique_fields.insert(model.name.clone(), unique);
            }
        }

        config.relations = pairs.into_iter().map(|(pair, _, _)| pair).collect();
        Ok(config)
    }

    fn scalar_shape(&self, model: &Model, field: &Field) -> Result<Option<FieldShape>, AnalyzeError> {
        let ty = match field.kind {
            FieldKind::Relation => return Ok(None),
            FieldKind::Unsupported => return Err(unsupported(model, field)),
            FieldKind::Enum => {
                if !self.enums.contains(field.type_name.as_str()) {
                    return Err(AnalyzeError::UnknownEnum {
                        table: model.name.clone(),
                        field: field.name.clone(),
                        enum_name: field.type_name.clone(),
                    });
                }
                ScalarType::Enum
            }
            FieldKind::Scalar => ScalarType::from_prisma(&field.type_name)
                .ok_or_else(|| unsupported(model, field))?,
        };

        let generated = match field.default_function() {
            Some("uuid") if ty == ScalarType::String => Some(Generated::Uuid),
            Some("now") => Some(Generated::Now),
            _ if field.is_updated_at => Some(Generated::Now),
            _ => None,
        };

        let enum_name = (ty == ScalarType::Enum).then(|| field.type_name.clone());

        Ok(Some(FieldShape::Scalar {
            ty,
            generated,
            enum_name,
        }))
    }

    /// Groups relation fields by name and decides, per pair, which side owns the key.
    fn pair_relations(&self) -> Result<Vec<(RelationPair, Side<'a>, Side<'a>)>, AnalyzeError> {
        let mut by_name: BTreeMap<&str, Vec<Side<'a>>> = BTreeMap::new();
        for model in self.models {
            for field in model.fields.iter().filter(|f| f.kind == FieldKind::Relation) {
                let name = field.relation_name.as_deref().ok_or_else(|| {
                    AnalyzeError::MissingRelationName {
                        table: model.name.clone(),
                        field: field.name.clone(),
                    }
                })?;
                by_name.entry(name).or_default().push(Side { model, field });
            }
        }

        let mut pairs = Vec::with_capacity(by_name.len());
        for (name, sides) in by_name {
            let &[first, second] = sides.as_slice() else {
                return Err(AnalyzeError::UnpairedRelation {
                    relation: name.to_string(),
                    count: sides.len(),
                });
            };

            for side in [first, second] {
                if side.field.relation_from_fields.len() > 1 || side.field.relation_to_fields.len() > 1 {
                    return Err(AnalyzeError::CompositeRelationKey {
                        relation: name.to_string(),
                    });
                }
            }

            if first.field.type_name != second.model.name || second.field.type_name != first.model.name {
                return Err(AnalyzeError::AmbiguousRelation {
                    relation: name.to_string(),
                    detail: format!(
                        "{}.{} and {}.{} do not point at each other",
                        first.model.name, first.field.name, second.model.name, second.field.name
                    ),
                });
            }

            // The side naming more key columns owns the foreign key; on a tie
            // the later declaration wins.
            let (owner, inverse) = if first.field.relation_key_len() > second.field.relation_key_len() {
                (first, second)
            } else {
                (second, first)
            };

            let (Some(column), Some(references)) = (
                owner.field.relation_from_fields.first(),
                owner.field.relation_to_fields.first(),
            ) else {
                return Err(AnalyzeError::MissingForeignKey {
                    relation: name.to_string(),
                });
            };

            let pair = RelationPair {
                name: name.to_string(),
                owner: FieldRef {
                    table: owner.model.name.clone(),
                    field: owner.field.name.clone(),
                },
                inverse: FieldRef {
                    table: inverse.model.name.clone(),
                    field: inverse.field.name.clone(),
                },
                column: column.clone(),
                references: references.clone(),
            };
            pairs.push((pair, owner, inverse));
        }

        Ok(pairs)
    }
}

/// Analyze a datamodel in one call.
pub fn analyze(datamodel: &Datamodel) -> Result<SchemaConfig, AnalyzeError> {
    Analyzer::new(datamodel).analyze()
}

/// `BlogPost` → `blogPost`.
pub fn pretty_name(table: &str) -> String {
    let mut chars = table.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn relation_shape(field: &Field, target: RelationTarget) -> FieldShape {
    if field.is_list {
        FieldShape::ToMany(target)
    } else {
        FieldShape::ToOne(target)
    }
}

fn link_models(models: &mut BTreeMap<String, Vec<String>>, from: &str, to: &str) {
    let related = models.entry(from.to_string()).or_default();
    if !related.iter().any(|t| t == to) {
        related.push(to.to_string());
    }
}

fn unsupported(model: &Model, field: &Field) -> AnalyzeError {
    AnalyzeError::UnsupportedField {
        table: model.name.clone(),
        field: field.name.clone(),
        type_name: field.type_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> Datamodel {
        serde_json::from_value(json!({
            "models": [
                {
                    "name": "Author",
                    "fields": [
                        { "name": "id", "kind": "scalar", "type": "Int", "isId": true },
                        { "name": "name", "kind": "scalar", "type": "String" },
                        { "name": "email", "kind": "scalar", "type": "String", "isUnique": true },
                        { "name": "books", "kind": "object", "type": "Book", "isList": true,
                          "relationName": "AuthorToBook" }
                    ]
                },
                {
                    "name": "Book",
                    "fields": [
                        { "name": "id", "kind": "scalar", "type": "Int", "isId": true },
                        { "name": "title", "kind": "scalar", "type": "String", "isUnique": true },
                        { "name": "genre", "kind": "enum", "type": "Genre" },
                        { "name": "authorId", "kind": "scalar", "type": "Int", "isUnique": true },
                        { "name": "author", "kind": "object", "type": "Author",
                          "relationName": "AuthorToBook",
                          "relationFromFields": ["authorId"], "relationToFields": ["id"] }
                    ]
                }
            ],
            "enums": [ { "name": "Genre", "values": [ { "name": "POETRY" } ] } ]
        }))
        .unwrap()
    }

    #[test]
    fn test_relational_fields_point_at_referencing_columns() {
        let config = analyze(&library()).unwrap();

        assert_eq!(config.relational_fields["Book#author"], "Author#id");
        assert_eq!(config.relational_fields["Author#books"], "Book#authorId");
        assert_eq!(config.relational_models["Author"], vec!["Book"]);
        assert_eq!(config.relational_models["Book"], vec!["Author"]);
    }

    #[test]
    fn test_field_shapes_are_tagged() {
        let config = analyze(&library()).unwrap();

        assert_eq!(
            config.fields["Author"]["books"],
            FieldShape::ToMany(RelationTarget {
                table: "Book".to_string(),
                foreign_key: ForeignKey::Remote {
                    column: "authorId".to_string(),
                    references: "id".to_string(),
                },
            })
        );
        assert_eq!(
            config.fields["Book"]["author"],
            FieldShape::ToOne(RelationTarget {
                table: "Author".to_string(),
                foreign_key: ForeignKey::Local {
                    column: "authorId".to_string(),
                    references: "id".to_string(),
                },
            })
        );
        assert_eq!(
            config.fields["Book"]["genre"],
            FieldShape::Scalar {
                ty: ScalarType::Enum,
                generated: None,
                enum_name: Some("Genre".to_string()),
            }
        );
    }

    #[test]
    fn test_unique_fields_skip_foreign_key_columns() {
        let config = analyze(&library()).unwrap();

        assert_eq!(config.unique_fields["Author"], vec!["id", "email"]);
        // authorId is unique but owned by the relation.
        assert_eq!(config.unique_fields["Book"], vec!["id", "title"]);
        assert_eq!(config.primary_keys["Book"], "id");
    }

    #[test]
    fn test_pretty_names() {
        let config = analyze(&library()).unwrap();
        assert_eq!(config.pretty_names["author"], "Author");
        assert_eq!(pretty_name("BlogPost"), "blogPost");
        assert_eq!(pretty_name(""), "");
    }

    #[test]
    fn test_pairing_is_stable_across_runs() {
        let dm = library();
        let first = analyze(&dm).unwrap();
        let second = analyze(&dm).unwrap();

        assert_eq!(first.relations.len(), 1);
        assert_eq!(first.relations, second.relations);
        let pair = &first.relations[0];
        assert_eq!(pair.owner.table, "Book");
        assert_eq!(pair.owner.field, "author");
        assert_eq!(pair.inverse.field, "books");
        assert_eq!(pair.column, "authorId");
    }

    #[test]
    fn test_self_relation() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [{
                "name": "Employee",
                "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true },
                    { "name": "managerId", "kind": "scalar", "type": "Int" },
                    { "name": "manager", "kind": "object", "type": "Employee",
                      "relationName": "Management",
                      "relationFromFields": ["managerId"], "relationToFields": ["id"] },
                    { "name": "reports", "kind": "object", "type": "Employee", "isList": true,
                      "relationName": "Management" }
                ]
            }]
        }))
        .unwrap();

        let config = analyze(&dm).unwrap();
        assert_eq!(config.relational_fields["Employee#manager"], "Employee#id");
        assert_eq!(config.relational_fields["Employee#reports"], "Employee#managerId");
        assert_eq!(config.relational_models["Employee"], vec!["Employee"]);
        assert!(matches!(config.fields["Employee"]["reports"], FieldShape::ToMany(_)));
    }

    #[test]
    fn test_composite_relation_key_fails() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [
                { "name": "A", "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true },
                    { "name": "bs", "kind": "object", "type": "B", "isList": true, "relationName": "AB" }
                ]},
                { "name": "B", "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true },
                    { "name": "a", "kind": "object", "type": "A", "relationName": "AB",
                      "relationFromFields": ["aId", "aTenant"], "relationToFields": ["id", "tenant"] }
                ]}
            ]
        }))
        .unwrap();

        let err = analyze(&dm).unwrap_err();
        assert!(matches!(err, AnalyzeError::CompositeRelationKey { ref relation } if relation == "AB"));
    }

    #[test]
    fn test_unsupported_field_fails() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [{ "name": "Place", "fields": [
                { "name": "shape", "kind": "unsupported", "type": "geometry" }
            ]}]
        }))
        .unwrap();

        let err = analyze(&dm).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported field type: Place.shape (geometry)");
    }

    #[test]
    fn test_unknown_enum_fails() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [{ "name": "Book", "fields": [
                { "name": "genre", "kind": "enum", "type": "Genre" }
            ]}]
        }))
        .unwrap();

        assert!(matches!(analyze(&dm), Err(AnalyzeError::UnknownEnum { .. })));
    }

    #[test]
    fn test_unpaired_relation_fails() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [{ "name": "Book", "fields": [
                { "name": "author", "kind": "object", "type": "Author", "relationName": "Lonely",
                  "relationFromFields": ["authorId"], "relationToFields": ["id"] }
            ]}]
        }))
        .unwrap();

        assert!(matches!(
            analyze(&dm),
            Err(AnalyzeError::UnpairedRelation { count: 1, .. })
        ));
    }

    #[test]
    fn test_generated_defaults() {
        let dm: Datamodel = serde_json::from_value(json!({
            "models": [{ "name": "Post", "fields": [
                { "name": "id", "kind": "scalar", "type": "String", "isId": true,
                  "default": { "name": "uuid", "args": [] } },
                { "name": "createdAt", "kind": "scalar", "type": "DateTime",
                  "default": { "name": "now", "args": [] } },
                { "name": "updatedAt", "kind": "scalar", "type": "DateTime", "isUpdatedAt": true }
            ]}]
        }))
        .unwrap();

        let config = analyze(&dm).unwrap();
        let shapes = &config.fields["Post"];
        assert!(matches!(shapes["id"], FieldShape::Scalar { generated: Some(Generated::Uuid), .. }));
        assert!(matches!(shapes["createdAt"], FieldShape::Scalar { generated: Some(Generated::Now), .. }));
        assert!(matches!(shapes["updatedAt"], FieldShape::Scalar { generated: Some(Generated::Now), .. }));
    }
}
