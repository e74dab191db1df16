//! Shared fixtures for unit tests.

use serde_json::json;

use crate::analyzer::analyze;
use crate::config::SchemaConfig;
use crate::schema::Datamodel;

/// Author 1-n Book n-1 Publisher, Author 1-n Note. Notes have no unique
/// field a seed would carry.
pub fn library() -> Datamodel {
    serde_json::from_value(json!({
        "models": [
            { "name": "Author", "fields": [
                { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "hasDefaultValue": true },
                { "name": "name", "kind": "scalar", "type": "String", "isUnique": true },
                { "name": "books", "kind": "object", "type": "Book", "isList": true, "relationName": "AuthorBooks" },
                { "name": "notes", "kind": "object", "type": "Note", "isList": true, "relationName": "AuthorNotes" }
            ]},
            { "name": "Book", "fields": [
                { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "hasDefaultValue": true },
                { "name": "title", "kind": "scalar", "type": "String", "isUnique": true },
                { "name": "authorId", "kind": "scalar", "type": "Int" },
                { "name": "author", "kind": "object", "type": "Author", "relationName": "AuthorBooks",
                  "relationFromFields": ["authorId"], "relationToFields": ["id"] },
                { "name": "publisherId", "kind": "scalar", "type": "Int" },
                { "name": "publisher", "kind": "object", "type": "Publisher", "relationName": "PublisherBooks",
                  "relationFromFields": ["publisherId"], "relationToFields": ["id"] }
            ]},
            { "name": "Publisher", "fields": [
                { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "hasDefaultValue": true },
                { "name": "name", "kind": "scalar", "type": "String", "isUnique": true },
                { "name": "books", "kind": "object", "type": "Book", "isList": true, "relationName": "PublisherBooks" }
            ]},
            { "name": "Note", "fields": [
                { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "hasDefaultValue": true },
                { "name": "body", "kind": "scalar", "type": "String" },
                { "name": "authorId", "kind": "scalar", "type": "Int" },
                { "name": "author", "kind": "object", "type": "Author", "relationName": "AuthorNotes",
                  "relationFromFields": ["authorId"], "relationToFields": ["id"] }
            ]}
        ]
    }))
    .unwrap()
}

pub fn library_config() -> SchemaConfig {
    analyze(&library()).unwrap()
}
