//! Closed vocabulary of filterable fields and the operator-by-type table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key of the field whose presence in the committed clause list unlocks the
/// per-file detail fields.
pub const FILE_ID_FIELD: &str = "file_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
}

impl FieldType {
    /// Allowed operations for this type. The first entry is the default
    /// operator picked when a field is selected.
    pub fn operations(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            FieldType::Text => &[Contains, Eq, Neq],
            FieldType::Number => &[Eq, Neq],
            FieldType::Date => &[Last7, Last30, ThisMonth, LastMonth, AllTime, Between],
            FieldType::Select => &[Eq, In],
        }
    }

    pub fn allows(self, op: Operation) -> bool {
        self.operations().contains(&op)
    }
}

/// Table lookup of the operators a field type accepts.
pub fn operations_for(field_type: FieldType) -> &'static [Operation] {
    field_type.operations()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "NEQ")]
    Neq,
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "LAST_7")]
    Last7,
    #[serde(rename = "LAST_30")]
    Last30,
    #[serde(rename = "THIS_MONTH")]
    ThisMonth,
    #[serde(rename = "LAST_MONTH")]
    LastMonth,
    #[serde(rename = "ALL_TIME")]
    AllTime,
}

/// Shape of the value an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    None,
    Scalar,
    List,
    Range,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Eq,
        Operation::Neq,
        Operation::Contains,
        Operation::In,
        Operation::Between,
        Operation::Last7,
        Operation::Last30,
        Operation::ThisMonth,
        Operation::LastMonth,
        Operation::AllTime,
    ];

    pub fn value_kind(self) -> ValueKind {
        match self {
            Operation::Eq | Operation::Neq | Operation::Contains => ValueKind::Scalar,
            Operation::In => ValueKind::List,
            Operation::Between => ValueKind::Range,
            Operation::Last7
            | Operation::Last30
            | Operation::ThisMonth
            | Operation::LastMonth
            | Operation::AllTime => ValueKind::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::Eq => "equals",
            Operation::Neq => "does not equal",
            Operation::Contains => "contains",
            Operation::In => "is any of",
            Operation::Between => "between",
            Operation::Last7 => "last 7 days",
            Operation::Last30 => "last 30 days",
            Operation::ThisMonth => "this month",
            Operation::LastMonth => "last month",
            Operation::AllTime => "all time",
        }
    }

    /// Wire token, e.g. `LAST_7`.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Eq => "EQ",
            Operation::Neq => "NEQ",
            Operation::Contains => "CONTAINS",
            Operation::In => "IN",
            Operation::Between => "BETWEEN",
            Operation::Last7 => "LAST_7",
            Operation::Last30 => "LAST_30",
            Operation::ThisMonth => "THIS_MONTH",
            Operation::LastMonth => "LAST_MONTH",
            Operation::AllTime => "ALL_TIME",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(token))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl FieldDescriptor {
    pub fn new(key: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            field_type,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn default_operation(&self) -> Operation {
        // Every type has a non-empty operator table.
        self.field_type.operations()[0]
    }
}

/// Resolves the display label of a select option.
pub trait OptionResolver {
    fn options_for(&self, field_key: &str) -> Option<&[SelectOption]>;

    fn resolve_label<'a>(&'a self, field_key: &str, value: &'a str) -> &'a str {
        self.options_for(field_key)
            .and_then(|opts| opts.iter().find(|o| o.value == value))
            .map(|o| o.label.as_str())
            .unwrap_or(value)
    }
}

impl OptionResolver for BTreeMap<String, Vec<SelectOption>> {
    fn options_for(&self, field_key: &str) -> Option<&[SelectOption]> {
        self.get(field_key).map(Vec::as_slice)
    }
}

/// Field catalog: the common fields plus the detail fields that only become
/// filterable once a `file_id` clause has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub common: Vec<FieldDescriptor>,
    pub detail: Vec<FieldDescriptor>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::activity()
    }
}

impl Catalog {
    /// Catalog of the admin activity search.
    pub fn activity() -> Self {
        let common = vec![
            FieldDescriptor::new("created_at", "Date", FieldType::Date),
            FieldDescriptor::new("status", "Status", FieldType::Select).with_options(vec![
                SelectOption::new("approved", "Approved"),
                SelectOption::new("rejected", "Rejected"),
                SelectOption::new("pending", "Pending"),
            ]),
            FieldDescriptor::new("action", "Action", FieldType::Select).with_options(vec![
                SelectOption::new("CREATE", "Created"),
                SelectOption::new("UPDATE", "Updated"),
                SelectOption::new("DELETE", "Deleted"),
                SelectOption::new("UPLOAD", "Uploaded"),
            ]),
            FieldDescriptor::new("firstname", "First name", FieldType::Text),
            FieldDescriptor::new("lastname", "Last name", FieldType::Text),
            FieldDescriptor::new("email", "Email", FieldType::Text),
            FieldDescriptor::new("user_id", "User ID", FieldType::Number),
            FieldDescriptor::new("request_id", "Request ID", FieldType::Number),
            FieldDescriptor::new(FILE_ID_FIELD, "File ID", FieldType::Number),
        ];
        let detail = vec![
            FieldDescriptor::new("field_key", "Changed field", FieldType::Text),
            FieldDescriptor::new("old_value", "Old value", FieldType::Text),
            FieldDescriptor::new("new_value", "New value", FieldType::Text),
        ];
        Self { common, detail }
    }

    /// Looks a key up in the full vocabulary, regardless of activation.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.common
            .iter()
            .chain(self.detail.iter())
            .find(|f| f.key == key)
    }

    /// Fields available given whether a `file_id` clause is committed.
    pub fn active(&self, file_scoped: bool) -> Vec<&FieldDescriptor> {
        let detail: &[FieldDescriptor] = if file_scoped { &self.detail } else { &[] };
        self.common.iter().chain(detail.iter()).collect()
    }

    pub fn is_active(&self, key: &str, file_scoped: bool) -> bool {
        self.common.iter().any(|f| f.key == key)
            || (file_scoped && self.detail.iter().any(|f| f.key == key))
    }

    /// Replaces the option list of select fields named in `overrides`.
    pub fn apply_option_overrides(&mut self, overrides: &BTreeMap<String, Vec<SelectOption>>) {
        for field in self.common.iter_mut().chain(self.detail.iter_mut()) {
            if let Some(options) = overrides.get(&field.key) {
                field.options = options.clone();
            }
        }
    }
}

impl OptionResolver for Catalog {
    fn options_for(&self, field_key: &str) -> Option<&[SelectOption]> {
        self.field(field_key)
            .filter(|f| !f.options.is_empty())
            .map(|f| f.options.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table_matches_field_types() {
        assert_eq!(
            operations_for(FieldType::Text),
            &[Operation::Contains, Operation::Eq, Operation::Neq]
        );
        assert_eq!(operations_for(FieldType::Number), &[Operation::Eq, Operation::Neq]);
        assert_eq!(operations_for(FieldType::Select), &[Operation::Eq, Operation::In]);
        assert_eq!(operations_for(FieldType::Date)[0], Operation::Last7);
        assert!(FieldType::Date.allows(Operation::Between));
        assert!(!FieldType::Date.allows(Operation::Eq));
    }

    #[test]
    fn detail_fields_unlock_only_when_file_scoped() {
        let catalog = Catalog::activity();
        assert!(!catalog.is_active("old_value", false));
        assert!(catalog.is_active("old_value", true));
        assert!(catalog.is_active("status", false));
        assert_eq!(
            catalog.active(true).len(),
            catalog.common.len() + catalog.detail.len()
        );
    }

    #[test]
    fn operation_tokens_parse_case_insensitively() {
        assert_eq!(Operation::parse("last_7"), Some(Operation::Last7));
        assert_eq!(Operation::parse("BETWEEN"), Some(Operation::Between));
        assert_eq!(Operation::parse("LIKE"), None);
        assert_eq!(
            serde_json::to_string(&Operation::ThisMonth).unwrap(),
            "\"THIS_MONTH\""
        );
    }

    #[test]
    fn unknown_option_values_resolve_to_raw_value() {
        let catalog = Catalog::activity();
        assert_eq!(catalog.resolve_label("status", "approved"), "Approved");
        assert_eq!(catalog.resolve_label("status", "archived"), "archived");
        assert_eq!(catalog.resolve_label("firstname", "ann"), "ann");
    }
}
