//! Document rows exchanged with database adapters.

pub use serde_json::Value;

/// A stored document: attribute name to value, in insertion order.
pub type Row = serde_json::Map<String, Value>;

/// Name of the identifier attribute every model carries.
pub const ID_ATTR: &str = "id";

/// Returns the identifier of a row, if it has a non-null one.
#[must_use]
pub fn row_id(row: &Row) -> Option<&Value> {
    row.get(ID_ATTR).filter(|id| !id.is_null())
}

/// Canonical hashable key for a scalar value.
///
/// `serde_json::Value` is not `Hash`; identifiers are compared through their
/// JSON rendering so that `5` and `"5"` stay distinct.
#[must_use]
pub fn value_key(value: &Value) -> String {
    value.to_string()
}
