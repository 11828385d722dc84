//! Schema catalog.
//!
//! The read-only mapping from model name to attribute shape consulted by the
//! query compiler. A catalog is built once, validated, then shared behind an
//! `Arc` by every request.

use indexmap::IndexMap;
use nestql_common::types::ID_ATTR;
use nestql_common::utils::error::Error;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use thiserror::Error;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z][a-z0-9_]*$").expect("name pattern is valid"));

/// Errors raised while building a catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A model or attribute name is not lowercase snake case.
    #[error("invalid name '{0}': expected lowercase letters, digits and underscores")]
    InvalidName(String),

    /// Two models share a singular or plural name.
    #[error("model name '{0}' is declared twice")]
    DuplicateModel(String),

    /// A model's singular and plural names are equal.
    #[error("model '{0}' must have distinct singular and plural names")]
    AmbiguousPlural(String),

    /// A relation points to an undeclared model.
    #[error("attribute '{model}.{attribute}' targets unknown model '{target}'")]
    UnknownTarget {
        /// Declaring model.
        model: String,
        /// Relation attribute.
        attribute: String,
        /// Missing target.
        target: String,
    },

    /// A relation's inverse is not a scalar attribute of the target.
    #[error("attribute '{model}.{attribute}' has inverse '{inverse}' which is not a scalar of '{target}'")]
    InvalidInverse {
        /// Declaring model.
        model: String,
        /// Relation attribute.
        attribute: String,
        /// Target model.
        target: String,
        /// Declared inverse.
        inverse: String,
    },

    /// The JSON document could not be read.
    #[error("invalid catalog document: {0}")]
    Json(String),
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        Error::Internal(err.to_string())
    }
}

/// A relation to another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Target model (singular name).
    pub target: String,
    /// Whether the relation holds many rows.
    pub multiple: bool,
    /// Attribute of the target holding this model's id, when the target
    /// points back.
    pub inverse: Option<String>,
}

impl Relation {
    /// A to-one relation.
    pub fn one(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            multiple: false,
            inverse: None,
        }
    }

    /// A to-many relation.
    pub fn many(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            multiple: true,
            inverse: None,
        }
    }

    /// Sets the inverse attribute.
    #[must_use]
    pub fn inverse(mut self, attribute: impl Into<String>) -> Self {
        self.inverse = Some(attribute.into());
        self
    }
}

/// Shape of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// A plain value.
    Scalar,
    /// A link to rows of another model.
    Relation(Relation),
}

/// A model and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Singular name (`author`).
    pub name: String,
    /// Plural name (`authors`).
    pub plural: String,
    attributes: IndexMap<String, Attribute>,
}

impl Model {
    /// Creates a model with only the `id` attribute.
    pub fn new(name: impl Into<String>, plural: impl Into<String>) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert(ID_ATTR.to_string(), Attribute::Scalar);
        Self {
            name: name.into(),
            plural: plural.into(),
            attributes,
        }
    }

    /// Adds a scalar attribute.
    #[must_use]
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), Attribute::Scalar);
        self
    }

    /// Adds a relation attribute.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.attributes.insert(name.into(), Attribute::Relation(relation));
        self
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Looks up a relation attribute.
    #[must_use]
    pub fn relation_of(&self, name: &str) -> Option<&Relation> {
        match self.attributes.get(name) {
            Some(Attribute::Relation(relation)) => Some(relation),
            _ => None,
        }
    }

    /// Returns `true` if `name` is a scalar attribute (`id` included).
    #[must_use]
    pub fn is_scalar(&self, name: &str) -> bool {
        matches!(self.attributes.get(name), Some(Attribute::Scalar))
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(name, attr)| (name.as_str(), attr))
    }
}

/// The read-only schema of every model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    models: IndexMap<String, Model>,
    plurals: IndexMap<String, String>,
}

impl Catalog {
    /// Starts an empty catalog builder.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Reads a catalog from its JSON form:
    ///
    /// ```json
    /// { "models": { "author": { "plural": "authors", "attributes": {
    ///     "name": { "type": "string" },
    ///     "books": { "type": "book", "multiple": true, "inverse": "author_id" } } } } }
    /// ```
    ///
    /// An attribute whose `type` names a model is a relation; any other type
    /// is a scalar.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|e| CatalogError::Json(e.to_string()))?;

        let mut builder = Self::builder();
        for (name, spec) in &document.models {
            let plural = spec.plural.clone().unwrap_or_else(|| format!("{name}s"));
            let mut model = Model::new(name.clone(), plural);
            for (attribute, attr_spec) in &spec.attributes {
                if document.models.contains_key(&attr_spec.type_name) {
                    let relation = Relation {
                        target: attr_spec.type_name.clone(),
                        multiple: attr_spec.multiple,
                        inverse: attr_spec.inverse.clone(),
                    };
                    model = model.relation(attribute.clone(), relation);
                } else {
                    model = model.scalar(attribute.clone());
                }
            }
            builder = builder.model(model);
        }
        builder.build()
    }

    /// Looks up a model by singular name.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Resolves a singular or plural name, returning the model and whether
    /// the name was plural.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(&Model, bool)> {
        if let Some(model) = self.models.get(name) {
            return Some((model, false));
        }
        self.plurals
            .get(name)
            .and_then(|singular| self.models.get(singular))
            .map(|model| (model, true))
    }

    /// Models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns `true` when no model is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Builder validating a [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    models: Vec<Model>,
}

impl CatalogBuilder {
    /// Adds a model.
    #[must_use]
    pub fn model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    /// Validates names, relation targets and inverses.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();

        for model in self.models {
            for name in [&model.name, &model.plural] {
                check_name(name)?;
                if catalog.models.contains_key(name.as_str())
                    || catalog.plurals.contains_key(name.as_str())
                {
                    return Err(CatalogError::DuplicateModel(name.clone()));
                }
            }
            if model.name == model.plural {
                return Err(CatalogError::AmbiguousPlural(model.name));
            }
            for (attribute, _) in model.attributes() {
                check_name(attribute)?;
            }
            catalog
                .plurals
                .insert(model.plural.clone(), model.name.clone());
            catalog.models.insert(model.name.clone(), model);
        }

        for model in catalog.models.values() {
            for (attribute, attr) in model.attributes() {
                let Attribute::Relation(relation) = attr else {
                    continue;
                };
                let Some(target) = catalog.models.get(&relation.target) else {
                    return Err(CatalogError::UnknownTarget {
                        model: model.name.clone(),
                        attribute: attribute.to_string(),
                        target: relation.target.clone(),
                    });
                };
                if let Some(inverse) = &relation.inverse {
                    if !target.is_scalar(inverse) || inverse == ID_ATTR {
                        return Err(CatalogError::InvalidInverse {
                            model: model.name.clone(),
                            attribute: attribute.to_string(),
                            target: relation.target.clone(),
                            inverse: inverse.clone(),
                        });
                    }
                }
            }
        }

        Ok(catalog)
    }
}

fn check_name(name: &str) -> Result<(), CatalogError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(CatalogError::InvalidName(name.to_string()))
    }
}

#[derive(Deserialize)]
struct CatalogDocument {
    models: IndexMap<String, ModelSpec>,
}

#[derive(Deserialize)]
struct ModelSpec {
    #[serde(default)]
    plural: Option<String>,
    #[serde(default)]
    attributes: IndexMap<String, AttributeSpec>,
}

#[derive(Deserialize)]
struct AttributeSpec {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    multiple: bool,
    #[serde(default)]
    inverse: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Catalog {
        Catalog::builder()
            .model(
                Model::new("author", "authors")
                    .scalar("name")
                    .relation("books", Relation::many("book").inverse("author_id")),
            )
            .model(
                Model::new("book", "books")
                    .scalar("title")
                    .scalar("author_id")
                    .relation("author", Relation::one("author")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_singular_and_plural() {
        let catalog = library();
        let (model, plural) = catalog.resolve("author").unwrap();
        assert_eq!(model.name, "author");
        assert!(!plural);

        let (model, plural) = catalog.resolve("books").unwrap();
        assert_eq!(model.name, "book");
        assert!(plural);

        assert!(catalog.resolve("publisher").is_none());
    }

    #[test]
    fn test_attributes() {
        let catalog = library();
        let author = catalog.model("author").unwrap();
        assert!(author.is_scalar("id"));
        assert!(author.is_scalar("name"));
        assert!(!author.is_scalar("books"));
        assert_eq!(
            author.relation_of("books").unwrap().inverse.as_deref(),
            Some("author_id")
        );
        let names: Vec<_> = author.attributes().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["id", "name", "books"]);
    }

    #[test]
    fn test_rejects_unknown_target() {
        let err = Catalog::builder()
            .model(Model::new("author", "authors").relation("books", Relation::many("book")))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTarget { .. }));
    }

    #[test]
    fn test_rejects_bad_inverse() {
        let err = Catalog::builder()
            .model(
                Model::new("author", "authors")
                    .relation("books", Relation::many("book").inverse("writer_id")),
            )
            .model(Model::new("book", "books"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInverse { .. }));
    }

    #[test]
    fn test_rejects_bad_names() {
        let err = Catalog::builder()
            .model(Model::new("Author", "authors"))
            .build()
            .unwrap_err();
        assert_eq!(err, CatalogError::InvalidName("Author".to_string()));

        let err = Catalog::builder()
            .model(Model::new("sheep", "sheep"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::AmbiguousPlural(_)));

        let err = Catalog::builder()
            .model(Model::new("post", "posts"))
            .model(Model::new("posts", "postses"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateModel(_)));
    }

    #[test]
    fn test_from_json() {
        let catalog = Catalog::from_json(
            r#"{ "models": {
                "author": { "plural": "authors", "attributes": {
                    "name": { "type": "string" },
                    "books": { "type": "book", "multiple": true, "inverse": "author_id" }
                } },
                "book": { "attributes": {
                    "title": { "type": "string" },
                    "author_id": { "type": "string" }
                } }
            } }"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.resolve("books").unwrap().0.name, "book");
        let books = catalog.model("author").unwrap().relation_of("books").unwrap();
        assert!(books.multiple);
        assert_eq!(books.target, "book");

        assert!(matches!(
            Catalog::from_json("{ \"models\": 3 }"),
            Err(CatalogError::Json(_))
        ));
    }
}
