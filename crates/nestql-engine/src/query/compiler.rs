//! GraphQL document to action plan compiler.
//!
//! Walks the selected operation depth-first and emits one [`Action`] per
//! command-capable selection node: every top-level field and every relation
//! selected below it. Fragments are inlined and `@skip`/`@include` evaluated
//! before anything is emitted.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use nestql_adapters::query::graphql::ast::{
    Directive, Document, Field, InputValue, OperationDefinition, OperationKind, Selection,
    SelectionSet,
};
use nestql_common::types::{ID_ATTR, Path, PathSegment, Row, Value, row_id, value_key};
use nestql_common::utils::error::{Error, Result};
use nestql_core::request::SortKey;

use super::action::{
    Action, ActionArgs, ActionFamily, ActionId, ActionKind, ActionPlan, ParentBinding,
    RelationLink, SelectionItem,
};
use crate::catalog::{Attribute, Catalog, Model, Relation};

/// Result of compiling one operation.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Kind of the selected operation.
    pub operation: OperationKind,
    /// Name of the selected operation.
    pub operation_name: Option<String>,
    /// Actions in declaration order.
    pub plan: ActionPlan,
}

impl CompiledQuery {
    /// Compact rendering of the action tree, for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        self.plan.summary()
    }
}

/// Compiles the selected operation of `document` into actions.
///
/// # Errors
///
/// - `SCHEMA_MISMATCH` for unknown fields or models, or verbs not allowed by
///   the operation kind.
/// - `INPUT_VALIDATION` for malformed arguments, variables, fragments or
///   operation selection.
pub fn compile(
    document: &Document,
    catalog: &Catalog,
    variables: &Row,
    operation_name: Option<&str>,
) -> Result<CompiledQuery> {
    let operation = select_operation(document, operation_name)?;
    if operation.kind == OperationKind::Subscription {
        return Err(Error::SchemaMismatch(
            "subscriptions are not supported".to_string(),
        ));
    }

    let bound = bind_variables(operation, variables)?;
    let mut compiler = QueryCompiler {
        catalog,
        document,
        variables: bound,
        plan: ActionPlan::new(),
    };
    compiler.compile_operation(operation)?;

    Ok(CompiledQuery {
        operation: operation.kind,
        operation_name: operation.name.clone(),
        plan: compiler.plan,
    })
}

fn select_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition> {
    if let Some(name) = operation_name {
        return document
            .operations()
            .find(|operation| operation.name.as_deref() == Some(name))
            .ok_or_else(|| Error::InputValidation(format!("Unknown operation named '{name}'")));
    }
    let mut operations = document.operations();
    match (operations.next(), operations.next()) {
        (Some(operation), None) => Ok(operation),
        (None, _) => Err(Error::InputValidation(
            "Document does not contain any operation".to_string(),
        )),
        (Some(_), Some(_)) => Err(Error::InputValidation(
            "Must provide operation name if query contains multiple operations".to_string(),
        )),
    }
}

fn bind_variables(operation: &OperationDefinition, provided: &Row) -> Result<Row> {
    let mut bound = Row::new();
    for definition in &operation.variables {
        let name = &definition.name;
        let value = match provided.get(name) {
            Some(value) => value.clone(),
            None => match &definition.default {
                Some(default) => const_value(default)?,
                None => Value::Null,
            },
        };
        if value.is_null() && definition.var_type.is_non_null() {
            return Err(Error::InputValidation(format!(
                "Variable '${name}' of non-null type must be provided"
            )));
        }
        bound.insert(name.clone(), value);
    }
    Ok(bound)
}

fn const_value(value: &InputValue) -> Result<Value> {
    convert_value(value, &|name| {
        Err(Error::InputValidation(format!(
            "Variable '${name}' is not allowed in a default value"
        )))
    })
}

fn convert_value(value: &InputValue, variable: &dyn Fn(&str) -> Result<Value>) -> Result<Value> {
    Ok(match value {
        InputValue::Variable(name) => variable(name)?,
        InputValue::Int(i) => Value::from(*i),
        InputValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| Error::InputValidation(format!("Invalid float value {f}")))?,
        InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
        InputValue::Boolean(b) => Value::Bool(*b),
        InputValue::Null => Value::Null,
        InputValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| convert_value(item, variable))
                .collect::<Result<_>>()?,
        ),
        InputValue::Object(fields) => {
            let mut object = Row::new();
            for (key, item) in fields {
                object.insert(key.clone(), convert_value(item, variable)?);
            }
            Value::Object(object)
        }
    })
}

/// Nested write payloads extracted from parent data, per relation.
type NestedData = IndexMap<String, Vec<(usize, Row)>>;

/// Where a child action sits and how it is bound to its parent.
struct ChildSpec<'d> {
    field: Option<&'d Field>,
    path: Path,
    model: String,
    family: ActionFamily,
    args: ActionArgs,
    parent: Path,
    binding: ParentBinding,
    internal: bool,
}

struct QueryCompiler<'a> {
    catalog: &'a Catalog,
    document: &'a Document,
    variables: Row,
    plan: ActionPlan,
}

impl<'a> QueryCompiler<'a> {
    fn compile_operation(&mut self, operation: &'a OperationDefinition) -> Result<()> {
        let fields = self.collect_fields(&operation.selection_set)?;
        let mut seen: HashSet<&str> = HashSet::new();

        for field in fields {
            if !seen.insert(field.response_key()) {
                return Err(Error::InputValidation(format!(
                    "Field '{}' is selected more than once",
                    field.response_key()
                )));
            }

            let catalog = self.catalog;
            let Some((kind, model_name)) = ActionKind::split_field(&field.name) else {
                return Err(unknown_root_field(&field.name));
            };
            let Some((model, multiple)) = catalog.resolve(model_name) else {
                return Err(unknown_root_field(&field.name));
            };

            match (operation.kind, kind) {
                (OperationKind::Query, ActionKind::Find)
                | (OperationKind::Mutation, ActionKind::Create)
                | (OperationKind::Mutation, ActionKind::Update)
                | (OperationKind::Mutation, ActionKind::Delete)
                | (OperationKind::Mutation, ActionKind::Replace) => {}
                (OperationKind::Mutation, ActionKind::Find) => {
                    return Err(Error::SchemaMismatch(format!(
                        "Field '{}' is a query field and cannot be used in a mutation",
                        field.name
                    )));
                }
                _ => {
                    return Err(Error::SchemaMismatch(format!(
                        "Field '{}' is a mutation field and cannot be used in a {}",
                        field.name,
                        operation.kind.as_str()
                    )));
                }
            }

            let family = ActionFamily::new(kind, multiple);
            let args = self.root_args(field, model, family)?;
            let path = Path::root().child(PathSegment::aliased(&field.name, field.alias.clone()));
            self.emit(
                Some(field),
                path,
                model,
                family,
                args,
                None,
                ParentBinding::Root,
                false,
            )?;
        }
        Ok(())
    }

    /// Emits an action and, depth-first, its children.
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        field: Option<&'a Field>,
        path: Path,
        model: &'a Model,
        family: ActionFamily,
        mut args: ActionArgs,
        parent: Option<Path>,
        binding: ParentBinding,
        internal: bool,
    ) -> Result<ActionId> {
        let mut nested = match family.kind {
            ActionKind::Create | ActionKind::Replace => split_nested(model, &mut args.data)?,
            _ => {
                reject_nested(model, &args.data)?;
                NestedData::new()
            }
        };

        let id = self.plan.push(Action {
            id: ActionId(0),
            path: path.clone(),
            model: model.name.clone(),
            family,
            selection: Vec::new(),
            args,
            parent,
            binding,
            internal,
            ordinal: 0,
        })?;

        let mut selection = Vec::new();
        if let Some(field) = field {
            let Some(selection_set) = &field.selection_set else {
                return Err(Error::InputValidation(format!(
                    "Field '{}' of model '{}' must have a selection of subfields",
                    field.name, model.name
                )));
            };
            let fields = self.collect_fields(selection_set)?;
            let mut seen: HashMap<&str, &str> = HashMap::new();
            let mut written: HashSet<&str> = HashSet::new();

            for sub in fields {
                let key = sub.response_key();
                if let Some(previous) = seen.get(key) {
                    let is_plain = *previous == sub.name
                        && sub.selection_set.is_none()
                        && !matches!(model.attribute(&sub.name), Some(Attribute::Relation(_)));
                    if is_plain {
                        continue;
                    }
                    return Err(Error::InputValidation(format!(
                        "Field '{key}' is selected more than once on model '{}'",
                        model.name
                    )));
                }
                seen.insert(key, &sub.name);

                if nested.contains_key(&sub.name) {
                    written.insert(sub.name.as_str());
                } else if written.contains(sub.name.as_str()) {
                    return Err(Error::InputValidation(format!(
                        "Relation '{}' on model '{}' is written by nested data and cannot be selected more than once",
                        sub.name, model.name
                    )));
                }

                let item = self.compile_selection(sub, model, family, &path, &mut nested, internal)?;
                selection.push(item);
            }
        }

        // Nested writes the client did not select still have to run.
        for (attribute, items) in std::mem::take(&mut nested) {
            let relation = relation_of(model, &attribute)?;
            let spec = self.nested_write_spec(None, model, &attribute, relation, family, &path, items)?;
            self.emit_child(spec)?;
        }

        if let Some(action) = self.plan.get_mut(id) {
            action.selection = selection;
        }
        Ok(id)
    }

    fn emit_child(&mut self, spec: ChildSpec<'a>) -> Result<ActionId> {
        let catalog = self.catalog;
        let model = catalog.model(&spec.model).ok_or_else(|| {
            Error::Internal(format!("relation targets unknown model '{}'", spec.model))
        })?;
        self.emit(
            spec.field,
            spec.path,
            model,
            spec.family,
            spec.args,
            Some(spec.parent),
            spec.binding,
            spec.internal,
        )
    }

    fn compile_selection(
        &mut self,
        field: &'a Field,
        model: &'a Model,
        family: ActionFamily,
        path: &Path,
        nested: &mut NestedData,
        internal: bool,
    ) -> Result<SelectionItem> {
        let key = field.response_key().to_string();

        if field.name == "__typename" {
            reject_arguments(field)?;
            return Ok(SelectionItem::Typename { key });
        }

        match model.attribute(&field.name) {
            None => Err(Error::SchemaMismatch(format!(
                "Unknown field '{}' on model '{}'",
                field.name, model.name
            ))),
            Some(Attribute::Scalar) => {
                reject_arguments(field)?;
                if field.selection_set.is_some() {
                    return Err(Error::InputValidation(format!(
                        "Field '{}' of model '{}' is a scalar and cannot have subfields",
                        field.name, model.name
                    )));
                }
                Ok(SelectionItem::Attribute {
                    key,
                    attribute: field.name.clone(),
                })
            }
            Some(Attribute::Relation(relation)) => {
                let spec = match (family.kind, nested.shift_remove(&field.name)) {
                    (ActionKind::Create | ActionKind::Replace, Some(items)) => {
                        reject_arguments(field)?;
                        self.nested_write_spec(
                            Some(field),
                            model,
                            &field.name,
                            relation,
                            family,
                            path,
                            items,
                        )?
                    }
                    (kind, _) => {
                        let child_kind = if kind == ActionKind::Delete {
                            ActionKind::Delete
                        } else {
                            ActionKind::Find
                        };
                        let args = self.nested_args(field, model, relation, child_kind)?;
                        ChildSpec {
                            field: Some(field),
                            path: path.child(PathSegment::aliased(&field.name, field.alias.clone())),
                            model: relation.target.clone(),
                            family: ActionFamily::new(child_kind, relation.multiple),
                            args,
                            parent: path.clone(),
                            binding: ParentBinding::Filter(link_of(&field.name, relation)),
                            internal,
                        }
                    }
                };
                let child = spec.path.clone();
                self.emit_child(spec)?;
                Ok(SelectionItem::Relation {
                    key,
                    attribute: field.name.clone(),
                    child,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn nested_write_spec(
        &self,
        field: Option<&'a Field>,
        model: &Model,
        attribute: &str,
        relation: &Relation,
        family: ActionFamily,
        path: &Path,
        items: Vec<(usize, Row)>,
    ) -> Result<ChildSpec<'a>> {
        let Some(inverse) = &relation.inverse else {
            return Err(Error::InputValidation(format!(
                "Nested write of '{attribute}' on model '{}' requires the relation to declare an inverse attribute",
                model.name
            )));
        };
        let (parent_indices, data): (Vec<usize>, Vec<Row>) = items.into_iter().unzip();
        if family.kind == ActionKind::Replace && data.iter().any(|row| row_id(row).is_none()) {
            return Err(Error::InputValidation(format!(
                "Nested replace of '{attribute}' on model '{}' requires an 'id' for every replaced row",
                model.name
            )));
        }
        let alias = field.and_then(|field| field.alias.clone());
        Ok(ChildSpec {
            field,
            path: path.child(PathSegment::aliased(attribute, alias)),
            model: relation.target.clone(),
            family: ActionFamily::new(family.kind, relation.multiple),
            args: ActionArgs {
                data,
                ..ActionArgs::default()
            },
            parent: path.clone(),
            binding: ParentBinding::Data {
                inverse: inverse.clone(),
                parent_indices,
            },
            internal: field.is_none(),
        })
    }

    fn root_args(&self, field: &Field, model: &Model, family: ActionFamily) -> Result<ActionArgs> {
        let allowed: &[&str] = match (family.kind, family.multiple) {
            (ActionKind::Find, false) => &["id", "filter"],
            (ActionKind::Find, true) => &["filter", "order_by", "page", "page_size"],
            (ActionKind::Create, _) => &["data"],
            (ActionKind::Update, false) => &["id", "data"],
            (ActionKind::Update, true) => &["filter", "data"],
            (ActionKind::Delete, false) => &["id"],
            (ActionKind::Delete, true) => &["filter"],
            (ActionKind::Replace, false) => &["id", "data"],
            (ActionKind::Replace, true) => &["data"],
        };
        let raw = self.arguments(field, allowed)?;
        let mut args = ActionArgs::default();

        if let Some(filter) = raw.get("filter") {
            args.filter = Some(filter_arg(model, &field.name, filter)?);
        }
        let id = raw.get("id").filter(|id| !id.is_null()).cloned();
        if let Some(id) = &id {
            if family.kind != ActionKind::Replace {
                args.filter
                    .get_or_insert_with(Row::new)
                    .insert(ID_ATTR.to_string(), id.clone());
            }
        }
        if let Some(order_by) = raw.get("order_by") {
            args.order_by = order_by_arg(model, &field.name, order_by)?;
        }
        args.page = raw.get("page").map(|v| page_arg("page", v)).transpose()?;
        args.page_size = raw
            .get("page_size")
            .map(|v| page_arg("page_size", v))
            .transpose()?;
        args.paginate = family.kind == ActionKind::Find && family.multiple;

        let requires_id = !family.multiple
            && matches!(family.kind, ActionKind::Update | ActionKind::Delete);
        if requires_id && id.is_none() {
            return Err(Error::InputValidation(format!(
                "Field '{}' requires an 'id' argument",
                field.name
            )));
        }
        if family.kind == ActionKind::Find && !family.multiple && args.filter.is_none() {
            return Err(Error::InputValidation(format!(
                "Field '{}' requires an 'id' or 'filter' argument",
                field.name
            )));
        }

        if family.kind.is_write() && family.kind != ActionKind::Delete {
            let Some(data) = raw.get("data") else {
                return Err(Error::InputValidation(format!(
                    "Field '{}' requires a 'data' argument",
                    field.name
                )));
            };
            let multiple_payload = family.multiple && family.kind != ActionKind::Update;
            args.data = data_arg(&field.name, data, multiple_payload)?;
        }

        if family.kind == ActionKind::Replace {
            if let Some(id) = id {
                let row = args.data.first_mut().ok_or_else(|| {
                    Error::InputValidation(format!("Field '{}' requires 'data'", field.name))
                })?;
                match row.get(ID_ATTR) {
                    Some(existing) if !existing.is_null() && *existing != id => {
                        return Err(Error::InputValidation(format!(
                            "Field '{}': 'id' argument and 'data.id' differ",
                            field.name
                        )));
                    }
                    _ => {
                        row.insert(ID_ATTR.to_string(), id);
                    }
                }
            }
            if args.data.iter().any(|row| row_id(row).is_none()) {
                return Err(Error::InputValidation(format!(
                    "Field '{}' requires an 'id' for every replaced row",
                    field.name
                )));
            }
        }
        Ok(args)
    }

    fn nested_args(
        &self,
        field: &Field,
        model: &Model,
        relation: &Relation,
        kind: ActionKind,
    ) -> Result<ActionArgs> {
        if field.argument("page").is_some() || field.argument("page_size").is_some() {
            return Err(Error::InputValidation(format!(
                "Pagination is only supported on top-level fields, not on '{}.{}'",
                model.name, field.name
            )));
        }
        let allowed: &[&str] = match kind {
            ActionKind::Find => &["filter", "order_by"],
            _ => &[],
        };
        let raw = self.arguments(field, allowed)?;
        let target = self.catalog.model(&relation.target).ok_or_else(|| {
            Error::Internal(format!("relation targets unknown model '{}'", relation.target))
        })?;

        let mut args = ActionArgs::default();
        if let Some(filter) = raw.get("filter") {
            args.filter = Some(filter_arg(target, &field.name, filter)?);
        }
        if let Some(order_by) = raw.get("order_by") {
            args.order_by = order_by_arg(target, &field.name, order_by)?;
        }
        Ok(args)
    }

    /// Resolves a field's arguments against the bound variables.
    fn arguments(&self, field: &Field, allowed: &[&str]) -> Result<Row> {
        let mut resolved = Row::new();
        for (name, value) in &field.arguments {
            if !allowed.contains(&name.as_str()) {
                return Err(Error::InputValidation(format!(
                    "Unknown argument '{name}' on field '{}'",
                    field.name
                )));
            }
            resolved.insert(name.clone(), self.value(value)?);
        }
        Ok(resolved)
    }

    fn value(&self, value: &InputValue) -> Result<Value> {
        convert_value(value, &|name| {
            self.variables.get(name).cloned().ok_or_else(|| {
                Error::InputValidation(format!("Variable '${name}' is not defined"))
            })
        })
    }

    fn collect_fields(&self, selection_set: &'a SelectionSet) -> Result<Vec<&'a Field>> {
        let mut fields = Vec::new();
        let mut visiting = Vec::new();
        self.collect_into(selection_set, &mut fields, &mut visiting)?;
        Ok(fields)
    }

    fn collect_into(
        &self,
        selection_set: &'a SelectionSet,
        fields: &mut Vec<&'a Field>,
        visiting: &mut Vec<&'a str>,
    ) -> Result<()> {
        for selection in &selection_set.items {
            if !self.is_included(selection.directives())? {
                continue;
            }
            match selection {
                Selection::Field(field) => fields.push(field),
                Selection::InlineFragment(fragment) => {
                    self.collect_into(&fragment.selection_set, fields, visiting)?;
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    if visiting.contains(&name) {
                        return Err(Error::InputValidation(format!(
                            "Cannot spread fragment '{name}' within itself"
                        )));
                    }
                    let document = self.document;
                    let fragment = document.fragment(name).ok_or_else(|| {
                        Error::InputValidation(format!("No fragment named '{name}'"))
                    })?;
                    if !self.is_included(&fragment.directives)? {
                        continue;
                    }
                    visiting.push(name);
                    self.collect_into(&fragment.selection_set, fields, visiting)?;
                    visiting.pop();
                }
            }
        }
        Ok(())
    }

    fn is_included(&self, directives: &[Directive]) -> Result<bool> {
        for directive in directives {
            let expected = match directive.name.as_str() {
                "skip" => false,
                "include" => true,
                _ => continue,
            };
            let condition = directive.argument("if").ok_or_else(|| {
                Error::InputValidation(format!(
                    "Directive '@{}' requires an 'if' argument",
                    directive.name
                ))
            })?;
            match self.value(condition)? {
                Value::Bool(flag) if flag != expected => return Ok(false),
                Value::Bool(_) => {}
                other => {
                    return Err(Error::InputValidation(format!(
                        "Directive '@{}' expects a boolean, got {other}",
                        directive.name
                    )));
                }
            }
        }
        Ok(true)
    }
}

fn unknown_root_field(name: &str) -> Error {
    Error::SchemaMismatch(format!("Unknown field '{name}'"))
}

fn relation_of<'m>(model: &'m Model, attribute: &str) -> Result<&'m Relation> {
    model.relation_of(attribute).ok_or_else(|| {
        Error::Internal(format!(
            "'{attribute}' is not a relation of model '{}'",
            model.name
        ))
    })
}

fn link_of(attribute: &str, relation: &Relation) -> RelationLink {
    match &relation.inverse {
        Some(inverse) => RelationLink::Inverse(inverse.clone()),
        None => RelationLink::Ids(attribute.to_string()),
    }
}

fn reject_arguments(field: &Field) -> Result<()> {
    match field.arguments.first() {
        Some((name, _)) => Err(Error::InputValidation(format!(
            "Unknown argument '{name}' on field '{}'",
            field.name
        ))),
        None => Ok(()),
    }
}

/// Returns `true` for a nested write payload: an object or a non-empty list
/// of objects.
fn is_nested_payload(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_object),
        _ => false,
    }
}

/// Moves nested relation payloads out of `data`, remembering which payload
/// row each nested item came from.
fn split_nested(model: &Model, data: &mut [Row]) -> Result<NestedData> {
    let mut nested = NestedData::new();
    for (index, row) in data.iter_mut().enumerate() {
        let keys: Vec<String> = row.keys().cloned().collect();
        for key in keys {
            let relation = match model.attribute(&key) {
                None => return Err(unknown_data_attribute(model, &key)),
                Some(Attribute::Scalar) => continue,
                Some(Attribute::Relation(relation)) => relation,
            };
            let is_nested = row.get(&key).is_some_and(is_nested_payload);
            if !is_nested {
                if row
                    .get(&key)
                    .and_then(Value::as_array)
                    .is_some_and(|items| items.iter().any(Value::is_object))
                {
                    return Err(Error::InputValidation(format!(
                        "'{}.{key}' mixes nested rows and identifiers",
                        model.name
                    )));
                }
                continue;
            }
            let Some(value) = row.remove(&key) else {
                continue;
            };
            let entry = nested.entry(key.clone()).or_default();
            match value {
                Value::Object(item) => entry.push((index, item)),
                Value::Array(items) => {
                    if !relation.multiple {
                        return Err(Error::InputValidation(format!(
                            "'{}.{key}' holds a single row, got a list",
                            model.name
                        )));
                    }
                    entry.extend(items.into_iter().filter_map(|item| match item {
                        Value::Object(item) => Some((index, item)),
                        _ => None,
                    }));
                }
                _ => {}
            }
        }
    }
    Ok(nested)
}

fn reject_nested(model: &Model, data: &[Row]) -> Result<()> {
    for row in data {
        for (key, value) in row {
            match model.attribute(key) {
                None => return Err(unknown_data_attribute(model, key)),
                Some(Attribute::Relation(_)) if is_nested_payload(value) => {
                    return Err(Error::InputValidation(format!(
                        "Nested writes of '{}.{key}' are only supported in create and replace",
                        model.name
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn unknown_data_attribute(model: &Model, key: &str) -> Error {
    Error::InputValidation(format!(
        "Unknown attribute '{key}' in 'data' of model '{}'",
        model.name
    ))
}

fn filter_arg(model: &Model, field: &str, value: &Value) -> Result<Row> {
    let Value::Object(filter) = value else {
        return Err(Error::InputValidation(format!(
            "Argument 'filter' on field '{field}' must be an object"
        )));
    };
    for key in filter.keys() {
        if model.attribute(key).is_none() {
            return Err(Error::InputValidation(format!(
                "Unknown attribute '{key}' in 'filter' of model '{}'",
                model.name
            )));
        }
    }
    Ok(filter.clone())
}

fn data_arg(field: &str, value: &Value, multiple: bool) -> Result<Vec<Row>> {
    match (value, multiple) {
        (Value::Object(row), false) => Ok(vec![row.clone()]),
        (Value::Array(items), true) => items
            .iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row.clone()),
                _ => Err(Error::InputValidation(format!(
                    "Argument 'data' on field '{field}' must be a list of objects"
                ))),
            })
            .collect(),
        (_, false) => Err(Error::InputValidation(format!(
            "Argument 'data' on field '{field}' must be an object"
        ))),
        (_, true) => Err(Error::InputValidation(format!(
            "Argument 'data' on field '{field}' must be a list of objects"
        ))),
    }
}

/// Parses `"name,-age"` (or a list of such strings) into sort keys.
fn order_by_arg(model: &Model, field: &str, value: &Value) -> Result<Vec<SortKey>> {
    let parts: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    Error::InputValidation(format!(
                        "Argument 'order_by' on field '{field}' must contain strings"
                    ))
                })
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(Error::InputValidation(format!(
                "Argument 'order_by' on field '{field}' must be a string"
            )));
        }
    };

    let mut keys: Vec<SortKey> = Vec::with_capacity(parts.len());
    let mut seen = HashSet::new();
    for part in parts {
        let part = part.trim();
        let key = if let Some(attribute) = part.strip_prefix('-') {
            SortKey::desc(attribute.trim())
        } else {
            SortKey::asc(part.strip_prefix('+').unwrap_or(part).trim())
        };
        if !model.is_scalar(&key.attribute) {
            return Err(Error::InputValidation(format!(
                "Argument 'order_by' on field '{field}': cannot sort on '{}'",
                key.attribute
            )));
        }
        if !seen.insert(key.attribute.clone()) {
            return Err(Error::InputValidation(format!(
                "Argument 'order_by' on field '{field}': '{}' is listed twice",
                key.attribute
            )));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn page_arg(name: &str, value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        Error::InputValidation(format!(
            "Argument '{name}' must be a non-negative integer, got {}",
            value_key(value)
        ))
    })
}
