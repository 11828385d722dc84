//! Actions: collection-level operations compiled from a client query.
//!
//! Actions live in an [`ActionPlan`] arena. Parent links are back-references
//! by [`Path`], never ownership, so the plan stays a flat list in
//! declaration order.

use hashbrown::HashMap;
use nestql_common::types::{CommandType, Path, PathSegment, Row};
use nestql_common::utils::error::{Error, Result};
use nestql_core::request::SortKey;
use std::fmt;

/// Verb of a top-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Read rows.
    Find,
    /// Insert rows.
    Create,
    /// Patch rows.
    Update,
    /// Remove rows.
    Delete,
    /// Substitute whole rows.
    Replace,
}

impl ActionKind {
    /// Every kind, in field-prefix matching order.
    pub const ALL: [Self; 5] = [
        Self::Find,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Replace,
    ];

    /// Field name prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }

    /// Splits `create_authors` into `(Create, "authors")`.
    #[must_use]
    pub fn split_field(name: &str) -> Option<(Self, &str)> {
        Self::ALL.into_iter().find_map(|kind| {
            name.strip_prefix(kind.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|model| !model.is_empty())
                .map(|model| (kind, model))
        })
    }

    /// Returns `true` for everything but `Find`.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Find)
    }

    /// Command type of the action's final command.
    #[must_use]
    pub const fn command_type(self) -> CommandType {
        match self {
            Self::Find => CommandType::Read,
            Self::Create => CommandType::Create,
            Self::Update | Self::Replace => CommandType::Update,
            Self::Delete => CommandType::Delete,
        }
    }
}

/// Kind plus cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionFamily {
    /// Verb.
    pub kind: ActionKind,
    /// Whether the action targets many rows.
    pub multiple: bool,
}

impl ActionFamily {
    /// Creates a family.
    #[must_use]
    pub const fn new(kind: ActionKind, multiple: bool) -> Self {
        Self { kind, multiple }
    }
}

impl fmt::Display for ActionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cardinality = if self.multiple { "many" } else { "one" };
        write!(f, "{}_{cardinality}", self.kind.as_str())
    }
}

/// Index of an action in its [`ActionPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

/// How a child's rows relate to its parent's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationLink {
    /// `child[inverse]` holds the parent's id.
    Inverse(String),
    /// `parent[attribute]` holds the children's ids.
    Ids(String),
}

impl RelationLink {
    /// Child attribute filtered on when reading related rows.
    #[must_use]
    pub fn child_attribute(&self) -> &str {
        match self {
            Self::Inverse(inverse) => inverse,
            Self::Ids(_) => nestql_common::types::ID_ATTR,
        }
    }
}

/// How parent results feed an action's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentBinding {
    /// Top-level action.
    Root,
    /// The filter is narrowed to rows related to the parent's rows.
    Filter(RelationLink),
    /// Each data item receives the id of the parent row it was nested in.
    Data {
        /// Attribute receiving the parent id.
        inverse: String,
        /// For each data item, the index of its parent payload row.
        parent_indices: Vec<usize>,
    },
}

impl ParentBinding {
    /// Relation used to nest this action's rows under its parent's rows.
    #[must_use]
    pub fn link(&self) -> Option<RelationLink> {
        match self {
            Self::Root => None,
            Self::Filter(link) => Some(link.clone()),
            Self::Data { inverse, .. } => Some(RelationLink::Inverse(inverse.clone())),
        }
    }
}

/// One projected entry of an action's selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionItem {
    /// A scalar attribute.
    Attribute {
        /// Response key.
        key: String,
        /// Attribute name.
        attribute: String,
    },
    /// `__typename`.
    Typename {
        /// Response key.
        key: String,
    },
    /// A relation resolved by a child action.
    Relation {
        /// Response key.
        key: String,
        /// Relation attribute.
        attribute: String,
        /// Path of the child action.
        child: Path,
    },
}

impl SelectionItem {
    /// Response key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Attribute { key, .. } | Self::Typename { key } | Self::Relation { key, .. } => key,
        }
    }
}

/// Compiled arguments of an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    /// Equality filter, `id` argument included.
    pub filter: Option<Row>,
    /// Payload rows (a single patch row for updates).
    pub data: Vec<Row>,
    /// Sort keys.
    pub order_by: Vec<SortKey>,
    /// Whether the read is paginated.
    pub paginate: bool,
    /// Requested page.
    pub page: Option<u64>,
    /// Requested page size.
    pub page_size: Option<u64>,
}

/// One collection-level operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Arena index.
    pub id: ActionId,
    /// Position in the query; unique within a plan.
    pub path: Path,
    /// Target model.
    pub model: String,
    /// Verb and cardinality.
    pub family: ActionFamily,
    /// Projected fields, in declaration order.
    pub selection: Vec<SelectionItem>,
    /// Compiled arguments.
    pub args: ActionArgs,
    /// Path of the parent action.
    pub parent: Option<Path>,
    /// How the parent's results feed this action.
    pub binding: ParentBinding,
    /// Bookkeeping-only: never rendered.
    pub internal: bool,
    /// Declaration order.
    pub ordinal: usize,
}

impl Action {
    /// Schema field name of the action's node.
    #[must_use]
    pub fn field_name(&self) -> &str {
        match self.path.last() {
            Some(PathSegment::Field { name, .. }) => name,
            _ => "",
        }
    }

    /// Key of the action's node in the response.
    #[must_use]
    pub fn response_key(&self) -> String {
        match self.path.last() {
            Some(PathSegment::Field { name, alias }) => alias.clone().unwrap_or_else(|| name.clone()),
            Some(PathSegment::Index(index)) => index.to_string(),
            None => String::new(),
        }
    }
}

/// Arena of actions in declaration order, with lookup by path.
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    actions: Vec<Action>,
    by_path: HashMap<Path, ActionId>,
}

impl ActionPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action, assigning its id and ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn push(&mut self, mut action: Action) -> Result<ActionId> {
        if self.by_path.contains_key(&action.path) {
            return Err(Error::Internal(format!(
                "duplicate action path '{}'",
                action.path
            )));
        }
        let id = ActionId(self.actions.len());
        action.id = id;
        action.ordinal = id.0;
        self.by_path.insert(action.path.clone(), id);
        self.actions.push(action);
        Ok(id)
    }

    /// Returns an action by id.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        self.actions.get_mut(id.0)
    }

    /// Returns the action at `path`.
    #[must_use]
    pub fn by_path(&self, path: &Path) -> Option<&Action> {
        self.by_path.get(path).and_then(|id| self.get(*id))
    }

    /// Returns the id of the action at `path`.
    #[must_use]
    pub fn id_of(&self, path: &Path) -> Option<ActionId> {
        self.by_path.get(path).copied()
    }

    /// Returns the parent of an action.
    #[must_use]
    pub fn parent_of(&self, action: &Action) -> Option<&Action> {
        action.parent.as_ref().and_then(|path| self.by_path(path))
    }

    /// Actions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Top-level actions in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|action| action.parent.is_none())
    }

    /// Direct children of the action at `path`, in declaration order.
    pub fn children<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a Action> + 'a {
        self.actions
            .iter()
            .filter(move |action| action.parent.as_ref() == Some(path))
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if the plan holds no action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Compact rendering of the operation's action tree, used in logs:
    /// `create_authors{books},find_posts`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (i, root) in self.roots().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.write_summary(root, &mut out);
        }
        out
    }

    fn write_summary(&self, action: &Action, out: &mut String) {
        out.push_str(action.field_name());
        let mut children = self.children(&action.path).peekable();
        if children.peek().is_none() {
            return;
        }
        out.push('{');
        for (i, child) in children.enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.write_summary(child, out);
        }
        out.push('}');
    }
}
