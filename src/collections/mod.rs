//! Content collection declarations and path-prefix routing.

mod trie;

pub use trie::CollectionPathTrie;

use crate::schema::{ExtraPolicy, FieldSchema, FieldType, Schema};
use serde::{Deserialize, Serialize};

/// A declared content collection: a schema applied to every page whose
/// path falls under `path_prefix`.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub path_prefix: String,
    pub schema: Schema,
    pub strict: bool,
}

/// Routes a content path to the collection with the deepest matching
/// `path_prefix`, building the trie once per run from all declared
/// collections (§4.2).
pub struct CollectionRouter {
    trie: CollectionPathTrie,
    collections: Vec<Collection>,
}

impl CollectionRouter {
    pub fn new(collections: Vec<Collection>) -> Self {
        let mut trie = CollectionPathTrie::new();
        for (i, collection) in collections.iter().enumerate() {
            trie.insert(&collection.path_prefix, i);
        }
        Self { trie, collections }
    }

    pub fn route(&self, path: &str) -> Option<&Collection> {
        self.trie.lookup(path).map(|i| &self.collections[i])
    }
}

/// A single field within a declared collection's frontmatter schema, as
/// written in `bengal.toml`'s `[[collections.fields]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// A `[[collections]]` table entry, the on-disk (TOML) shape of a
/// [`Collection`] declaration. Parsed by the ambient config layer, not
/// this module — collection declarations are content, config-file
/// parsing itself is out of scope (§1), but reading a table the host
/// config format already parsed into a typed shape is not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDecl {
    pub name: String,
    pub directory: String,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub allow_extra: bool,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl CollectionDecl {
    pub fn into_collection(self) -> Collection {
        let extra_policy = if self.strict {
            ExtraPolicy::Strict
        } else if self.allow_extra {
            ExtraPolicy::AllowExtra
        } else {
            ExtraPolicy::Ignore
        };
        let fields = self
            .fields
            .into_iter()
            .map(|f| {
                let field_type = parse_field_type(&f.field_type);
                match f.default {
                    Some(default) => FieldSchema::optional(f.name, field_type, default),
                    None if f.required => FieldSchema::required(f.name, field_type),
                    None => FieldSchema::optional(f.name, field_type, serde_json::Value::Null),
                }
            })
            .collect();
        Collection {
            path_prefix: self.directory.clone(),
            schema: Schema {
                name: self.name.clone(),
                fields,
                extra_policy,
            },
            strict: self.strict,
            name: self.name,
        }
    }
}

/// Parses the small type grammar a `[[collections.fields]]` entry can use:
/// `string`, `integer`, `float`, `bool`, `date`, `datetime`, `map`,
/// `list<T>`, `optional<T>`, and `a|b|c` unions of any of the above.
fn parse_field_type(raw: &str) -> FieldType {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("list<").and_then(|s| s.strip_suffix('>')) {
        return FieldType::List(Box::new(parse_field_type(rest)));
    }
    if let Some(rest) = raw
        .strip_prefix("optional<")
        .and_then(|s| s.strip_suffix('>'))
    {
        return FieldType::Optional(Box::new(parse_field_type(rest)));
    }
    if raw.contains('|') {
        return FieldType::Union(raw.split('|').map(parse_field_type).collect());
    }
    match raw {
        "string" | "str" => FieldType::String,
        "integer" | "int" => FieldType::Integer,
        "float" => FieldType::Float,
        "bool" | "boolean" => FieldType::Bool,
        "date" => FieldType::Date,
        "datetime" | "date-time" | "date_time" => FieldType::DateTime,
        "map" | "mapping" => FieldType::Map,
        other => FieldType::Nested(other.to_string()),
    }
}
