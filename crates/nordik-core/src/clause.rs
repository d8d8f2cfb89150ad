//! Filter clauses: one predicate each, joined to the previous clause by AND/OR.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{Catalog, FieldDescriptor, FieldType, OptionResolver, Operation, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClauseId(pub Uuid);

impl ClauseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClauseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClauseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Joiner {
    #[default]
    And,
    Or,
}

impl Joiner {
    pub fn as_str(self) -> &'static str {
        match self {
            Joiner::And => "AND",
            Joiner::Or => "OR",
        }
    }
}

/// Value shape of a clause. Exactly one shape exists at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClauseValue {
    #[default]
    None,
    Scalar(String),
    List(Vec<String>),
    Range { start: String, end: String },
}

impl ClauseValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ClauseValue::None => ValueKind::None,
            ClauseValue::Scalar(_) => ValueKind::Scalar,
            ClauseValue::List(_) => ValueKind::List,
            ClauseValue::Range { .. } => ValueKind::Range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireClause", try_from = "WireClause")]
pub struct Clause {
    pub id: ClauseId,
    pub joiner: Option<Joiner>,
    pub field: String,
    pub op: Operation,
    pub value: ClauseValue,
}

impl Clause {
    pub fn new(field: impl Into<String>, op: Operation, value: ClauseValue) -> Self {
        Self {
            id: ClauseId::new(),
            joiner: None,
            field: field.into(),
            op,
            value,
        }
    }

    pub fn joined(mut self, joiner: Joiner) -> Self {
        self.joiner = Some(joiner);
        self
    }

    /// True when both clauses express the same predicate and join, ignoring ids.
    pub fn same_predicate(&self, other: &Clause) -> bool {
        self.joiner == other.joiner
            && self.field == other.field
            && self.op == other.op
            && self.value == other.value
    }
}

/// Flat representation sent to and received from the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireClause {
    pub id: ClauseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joiner: Option<Joiner>,
    pub field: String,
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClauseShapeError {
    #[error("clause {0} populates more than one value shape")]
    Ambiguous(ClauseId),
    #[error("clause {0} has only one end of a range")]
    HalfRange(ClauseId),
}

impl From<Clause> for WireClause {
    fn from(clause: Clause) -> Self {
        let mut wire = WireClause {
            id: clause.id,
            joiner: clause.joiner,
            field: clause.field,
            op: clause.op,
            value: None,
            values: None,
            start: None,
            end: None,
        };
        match clause.value {
            ClauseValue::None => {}
            ClauseValue::Scalar(v) => wire.value = Some(v),
            ClauseValue::List(vs) => wire.values = Some(vs),
            ClauseValue::Range { start, end } => {
                wire.start = Some(start);
                wire.end = Some(end);
            }
        }
        wire
    }
}

impl TryFrom<WireClause> for Clause {
    type Error = ClauseShapeError;

    fn try_from(wire: WireClause) -> Result<Self, Self::Error> {
        let value = match (wire.value, wire.values, wire.start, wire.end) {
            (None, None, None, None) => ClauseValue::None,
            (Some(v), None, None, None) => ClauseValue::Scalar(v),
            (None, Some(vs), None, None) => ClauseValue::List(vs),
            (None, None, Some(start), Some(end)) => ClauseValue::Range { start, end },
            (None, None, Some(_), None) | (None, None, None, Some(_)) => {
                return Err(ClauseShapeError::HalfRange(wire.id))
            }
            _ => return Err(ClauseShapeError::Ambiguous(wire.id)),
        };
        Ok(Clause {
            id: wire.id,
            joiner: wire.joiner,
            field: wire.field,
            op: wire.op,
            value,
        })
    }
}

fn filled(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Whether `clause` is addable against `field`: the operator belongs to the
/// field type and the value shape matches the operator with non-empty content.
pub fn is_complete(clause: &Clause, field: &FieldDescriptor) -> bool {
    if clause.field != field.key || !field.field_type.allows(clause.op) {
        return false;
    }
    if clause.value.kind() != clause.op.value_kind() {
        return false;
    }
    match &clause.value {
        ClauseValue::None => true,
        ClauseValue::Scalar(v) => match field.field_type {
            FieldType::Number => v.trim().parse::<f64>().is_ok(),
            FieldType::Text | FieldType::Date | FieldType::Select => filled(v),
        },
        ClauseValue::List(vs) => !vs.is_empty() && vs.iter().all(|v| filled(v)),
        ClauseValue::Range { start, end } => filled(start) && filled(end),
    }
}

/// Display text of a clause, e.g. `Status is any of Approved, Rejected`.
///
/// Unknown field keys fall back to the raw key; option values missing from
/// the resolver fall back to the raw value.
pub fn label_for(clause: &Clause, catalog: &Catalog, options: &dyn OptionResolver) -> String {
    let field_label = catalog
        .field(&clause.field)
        .map(|f| f.label.as_str())
        .unwrap_or(clause.field.as_str());
    let op_label = clause.op.label();

    let value_text = match &clause.value {
        ClauseValue::None => return format!("{field_label} {op_label}"),
        ClauseValue::Scalar(v) => options.resolve_label(&clause.field, v).to_string(),
        ClauseValue::List(vs) => vs
            .iter()
            .map(|v| options.resolve_label(&clause.field, v))
            .collect::<Vec<_>>()
            .join(", "),
        ClauseValue::Range { start, end } => format!("{start} and {end}"),
    };
    format!("{field_label} {op_label} {value_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::activity()
    }

    fn sample_value(kind: ValueKind) -> ClauseValue {
        match kind {
            ValueKind::None => ClauseValue::None,
            ValueKind::Scalar => ClauseValue::Scalar("42".into()),
            ValueKind::List => ClauseValue::List(vec!["approved".into()]),
            ValueKind::Range => ClauseValue::Range {
                start: "2026-01-01".into(),
                end: "2026-01-31".into(),
            },
        }
    }

    #[test]
    fn operators_outside_the_type_table_are_never_complete() {
        let catalog = catalog();
        for field in catalog.common.iter().chain(catalog.detail.iter()) {
            for op in Operation::ALL {
                if field.field_type.allows(op) {
                    continue;
                }
                let clause = Clause::new(&field.key, op, sample_value(op.value_kind()));
                assert!(
                    !is_complete(&clause, field),
                    "{} {} must be rejected",
                    field.key,
                    op
                );
            }
        }
    }

    #[test]
    fn between_needs_both_ends() {
        let catalog = catalog();
        let field = catalog.field("created_at").unwrap();
        let mut clause = Clause::new(
            "created_at",
            Operation::Between,
            ClauseValue::Range {
                start: "2026-03-01".into(),
                end: String::new(),
            },
        );
        assert!(!is_complete(&clause, field));

        clause.value = ClauseValue::Range {
            start: "2026-03-01".into(),
            end: "2026-03-31".into(),
        };
        assert!(is_complete(&clause, field));
    }

    #[test]
    fn bare_date_operators_need_no_value() {
        let catalog = catalog();
        let field = catalog.field("created_at").unwrap();
        let clause = Clause::new("created_at", Operation::Last30, ClauseValue::None);
        assert!(is_complete(&clause, field));

        let with_value = Clause::new(
            "created_at",
            Operation::Last30,
            ClauseValue::Scalar("x".into()),
        );
        assert!(!is_complete(&with_value, field));
    }

    #[test]
    fn scalar_and_list_shapes_reject_blank_input() {
        let catalog = catalog();
        let name = catalog.field("firstname").unwrap();
        let blank = Clause::new("firstname", Operation::Contains, ClauseValue::Scalar("  ".into()));
        assert!(!is_complete(&blank, name));

        let status = catalog.field("status").unwrap();
        let empty_list = Clause::new("status", Operation::In, ClauseValue::List(vec![]));
        assert!(!is_complete(&empty_list, status));

        let file = catalog.field("file_id").unwrap();
        let not_a_number = Clause::new("file_id", Operation::Eq, ClauseValue::Scalar("abc".into()));
        assert!(!is_complete(&not_a_number, file));
        let number = Clause::new("file_id", Operation::Eq, ClauseValue::Scalar("17".into()));
        assert!(is_complete(&number, file));
    }

    #[test]
    fn labels_render_each_value_shape() {
        let catalog = catalog();
        let in_clause = Clause::new(
            "status",
            Operation::In,
            ClauseValue::List(vec!["approved".into(), "archived".into()]),
        );
        assert_eq!(
            label_for(&in_clause, &catalog, &catalog),
            "Status is any of Approved, archived"
        );

        let between = Clause::new(
            "created_at",
            Operation::Between,
            ClauseValue::Range {
                start: "2026-01-01".into(),
                end: "2026-02-01".into(),
            },
        );
        assert_eq!(
            label_for(&between, &catalog, &catalog),
            "Date between 2026-01-01 and 2026-02-01"
        );

        let bare = Clause::new("created_at", Operation::Last7, ClauseValue::None);
        assert_eq!(label_for(&bare, &catalog, &catalog), "Date last 7 days");

        let unknown = Clause::new("shoe_size", Operation::Eq, ClauseValue::Scalar("44".into()));
        assert_eq!(label_for(&unknown, &catalog, &catalog), "shoe_size equals 44");
    }

    #[test]
    fn wire_form_is_flat_and_rejects_mixed_shapes() {
        let clause = Clause::new(
            "created_at",
            Operation::Between,
            ClauseValue::Range {
                start: "2026-01-01".into(),
                end: "2026-01-02".into(),
            },
        )
        .joined(Joiner::Or);
        let json = serde_json::to_value(&clause).unwrap();
        assert_eq!(json["joiner"], "OR");
        assert_eq!(json["op"], "BETWEEN");
        assert_eq!(json["start"], "2026-01-01");
        assert!(json.get("value").is_none());
        assert!(json.get("values").is_none());

        let mixed = serde_json::json!({
            "id": clause.id,
            "field": "status",
            "op": "EQ",
            "value": "approved",
            "values": ["rejected"],
        });
        assert!(serde_json::from_value::<Clause>(mixed).is_err());
    }

    #[test]
    fn wire_range_needs_both_ends() {
        let id = ClauseId::new();
        let wire = |start: Option<&str>, end: Option<&str>| WireClause {
            id,
            joiner: None,
            field: "created_at".into(),
            op: Operation::Between,
            value: None,
            values: None,
            start: start.map(String::from),
            end: end.map(String::from),
        };
        assert_eq!(
            Clause::try_from(wire(Some("2026-01-01"), None)),
            Err(ClauseShapeError::HalfRange(id))
        );
        assert_eq!(
            Clause::try_from(wire(None, Some("2026-01-31"))),
            Err(ClauseShapeError::HalfRange(id))
        );

        let half = serde_json::json!({
            "id": id,
            "field": "created_at",
            "op": "BETWEEN",
            "start": "2026-01-01",
        });
        let err = serde_json::from_value::<Clause>(half).unwrap_err();
        assert!(err.to_string().contains("only one end of a range"));
    }
}
