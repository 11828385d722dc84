//! GraphQL Abstract Syntax Tree.

use nestql_common::utils::error::SourceSpan;

/// A parsed executable document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Definitions in source order.
    pub definitions: Vec<Definition>,
}

impl Document {
    /// Operation definitions in source order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            Definition::Fragment(_) => None,
        })
    }

    /// Looks up a fragment by name.
    #[must_use]
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.definitions.iter().find_map(|definition| match definition {
            Definition::Fragment(fragment) if fragment.name == name => Some(fragment),
            _ => None,
        })
    }
}

/// A top-level definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// `query`, `mutation` or `subscription`.
    Operation(OperationDefinition),
    /// `fragment Name on Type { ... }`.
    Fragment(FragmentDefinition),
}

/// Kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read-only operation.
    Query,
    /// Write operation.
    Mutation,
    /// Event stream operation.
    Subscription,
}

impl OperationKind {
    /// Keyword of the operation kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// An operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    /// Operation kind (shorthand `{ ... }` is a query).
    pub kind: OperationKind,
    /// Optional operation name.
    pub name: Option<String>,
    /// Declared variables.
    pub variables: Vec<VariableDefinition>,
    /// Operation directives.
    pub directives: Vec<Directive>,
    /// Top-level selections.
    pub selection_set: SelectionSet,
    /// Source span.
    pub span: Option<SourceSpan>,
}

/// A variable declaration like `$id: ID! = 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// Name without the `$`.
    pub name: String,
    /// Declared type.
    pub var_type: TypeRef,
    /// Default value.
    pub default: Option<InputValue>,
}

/// A type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// `Name`
    Named(String),
    /// `[Type]`
    List(Box<TypeRef>),
    /// `Type!`
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Returns `true` for `Type!`.
    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

/// A `{ ... }` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionSet {
    /// Selections in source order.
    pub items: Vec<Selection>,
    /// Source span.
    pub span: Option<SourceSpan>,
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `alias: name(args) @dir { ... }`
    Field(Field),
    /// `...Name @dir`
    FragmentSpread(FragmentSpread),
    /// `... on Type @dir { ... }`
    InlineFragment(InlineFragment),
}

impl Selection {
    /// Directives attached to the selection.
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        match self {
            Self::Field(field) => &field.directives,
            Self::FragmentSpread(spread) => &spread.directives,
            Self::InlineFragment(fragment) => &fragment.directives,
        }
    }
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Response alias.
    pub alias: Option<String>,
    /// Field name.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<(String, InputValue)>,
    /// Directives.
    pub directives: Vec<Directive>,
    /// Sub-selections.
    pub selection_set: Option<SelectionSet>,
    /// Source span.
    pub span: Option<SourceSpan>,
}

impl Field {
    /// Key under which the field appears in the response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Looks up an argument by name.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

/// A named fragment spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    /// Fragment name.
    pub name: String,
    /// Directives.
    pub directives: Vec<Directive>,
    /// Source span.
    pub span: Option<SourceSpan>,
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    /// Optional `on Type`.
    pub type_condition: Option<String>,
    /// Directives.
    pub directives: Vec<Directive>,
    /// Selections.
    pub selection_set: SelectionSet,
    /// Source span.
    pub span: Option<SourceSpan>,
}

/// A fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    /// Fragment name.
    pub name: String,
    /// `on Type`.
    pub type_condition: String,
    /// Directives.
    pub directives: Vec<Directive>,
    /// Selections.
    pub selection_set: SelectionSet,
    /// Source span.
    pub span: Option<SourceSpan>,
}

/// A directive like `@skip(if: $flag)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Name without the `@`.
    pub name: String,
    /// Arguments.
    pub arguments: Vec<(String, InputValue)>,
    /// Source span.
    pub span: Option<SourceSpan>,
}

impl Directive {
    /// Looks up an argument by name.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

/// An argument or default value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// `$name`
    Variable(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal (block strings included).
    String(String),
    /// `true` / `false`.
    Boolean(bool),
    /// `null`.
    Null,
    /// Enum value.
    Enum(String),
    /// `[ ... ]`
    List(Vec<InputValue>),
    /// `{ key: value, ... }`
    Object(Vec<(String, InputValue)>),
}
