//! Query builder state: the clause under construction plus the committed list.

use tracing::debug;

use crate::catalog::{Catalog, FieldDescriptor, Operation, ValueKind, FILE_ID_FIELD};
use crate::clause::{is_complete, Clause, ClauseId, ClauseValue, Joiner};

/// Raw input fields of the clause being built. Every input is kept
/// side by side; only the one matching the operator ends up in the clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingClause {
    pub field: Option<String>,
    pub op: Option<Operation>,
    pub value: String,
    pub values: Vec<String>,
    pub start: String,
    pub end: String,
}

impl PendingClause {
    fn clear_values(&mut self) {
        self.value.clear();
        self.values.clear();
        self.start.clear();
        self.end.clear();
    }

    /// Value shape demanded by `op`, taken from the matching input.
    pub fn value_for(&self, op: Operation) -> ClauseValue {
        match op.value_kind() {
            ValueKind::None => ClauseValue::None,
            ValueKind::Scalar => ClauseValue::Scalar(self.value.trim().to_string()),
            ValueKind::List => ClauseValue::List(
                self.values
                    .iter()
                    .map(|v| v.trim().to_string())
                    .collect(),
            ),
            ValueKind::Range => ClauseValue::Range {
                start: self.start.trim().to_string(),
                end: self.end.trim().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    catalog: Catalog,
    clauses: Vec<Clause>,
    pending: PendingClause,
    editing_id: Option<ClauseId>,
    next_joiner: Joiner,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(Catalog::activity())
    }
}

impl QueryBuilder {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            clauses: Vec::new(),
            pending: PendingClause::default(),
            editing_id: None,
            next_joiner: Joiner::And,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn pending(&self) -> &PendingClause {
        &self.pending
    }

    pub fn editing_id(&self) -> Option<ClauseId> {
        self.editing_id
    }

    pub fn next_joiner(&self) -> Joiner {
        self.next_joiner
    }

    /// Whether a committed clause targets `file_id`, unlocking detail fields.
    pub fn is_file_scoped(&self) -> bool {
        self.clauses.iter().any(|c| c.field == FILE_ID_FIELD)
    }

    pub fn active_fields(&self) -> Vec<&FieldDescriptor> {
        self.catalog.active(self.is_file_scoped())
    }

    /// File scope the pending input is validated against. The clause under
    /// edit is left out, since the edit may replace its `file_id` predicate.
    fn pending_scope(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| Some(c.id) != self.editing_id && c.field == FILE_ID_FIELD)
    }

    fn active_field(&self, key: &str) -> Option<&FieldDescriptor> {
        if self.catalog.is_active(key, self.pending_scope()) {
            self.catalog.field(key)
        } else {
            None
        }
    }

    /// Selects a field, resetting the operator to the type's default and
    /// clearing every value input.
    pub fn set_field(&mut self, key: &str) {
        let op = self.active_field(key).map(FieldDescriptor::default_operation);
        if op.is_none() {
            debug!(field = key, "selected field is not in the active catalog");
        }
        self.pending.field = Some(key.to_string());
        self.pending.op = op;
        self.pending.clear_values();
    }

    pub fn set_op(&mut self, op: Operation) {
        self.pending.op = Some(op);
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.pending.value = value.into();
    }

    pub fn set_values(&mut self, values: Vec<String>) {
        self.pending.values = values;
    }

    pub fn set_start(&mut self, start: impl Into<String>) {
        self.pending.start = start.into();
    }

    pub fn set_end(&mut self, end: impl Into<String>) {
        self.pending.end = end.into();
    }

    pub fn set_next_joiner(&mut self, joiner: Joiner) {
        self.next_joiner = joiner;
    }

    /// Clause the pending input would produce, if a field and operator are chosen.
    pub fn pending_clause(&self) -> Option<Clause> {
        let field = self.pending.field.as_ref()?;
        let op = self.pending.op?;
        Some(Clause::new(field.clone(), op, self.pending.value_for(op)))
    }

    /// Gate for the add/update action.
    pub fn is_pending_complete(&self) -> bool {
        let Some(clause) = self.pending_clause() else {
            return false;
        };
        self.active_field(&clause.field)
            .is_some_and(|field| is_complete(&clause, field))
    }

    /// Commits the pending clause: replaces the clause being edited in place,
    /// or appends a new one joined with `next_joiner`. Returns the id of the
    /// affected clause, or `None` when the pending input is incomplete.
    pub fn upsert(&mut self) -> Option<ClauseId> {
        if !self.is_pending_complete() {
            return None;
        }
        let candidate = self.pending_clause()?;

        let editing = self
            .editing_id
            .and_then(|id| self.clauses.iter_mut().find(|c| c.id == id));
        let id = match editing {
            Some(existing) => {
                existing.field = candidate.field;
                existing.op = candidate.op;
                existing.value = candidate.value;
                debug!(clause = %existing.id, "updated clause");
                let id = existing.id;
                self.prune_inactive();
                id
            }
            None => {
                let mut clause = candidate;
                if !self.clauses.is_empty() {
                    clause.joiner = Some(self.next_joiner);
                }
                let id = clause.id;
                debug!(clause = %id, joiner = ?clause.joiner, "appended clause");
                self.clauses.push(clause);
                id
            }
        };

        self.clear_builder();
        Some(id)
    }

    /// Deletes a clause. The new head clause, if any, becomes unjoined, and
    /// clauses on fields that are no longer active are dropped with it.
    pub fn remove(&mut self, id: ClauseId) -> bool {
        let before = self.clauses.len();
        self.clauses.retain(|c| c.id != id);
        if self.clauses.len() == before {
            return false;
        }
        self.prune_inactive();
        if self.editing_id.is_some_and(|editing| !self.clauses.iter().any(|c| c.id == editing)) {
            self.clear_builder();
        }
        true
    }

    /// Drops clauses on catalog fields outside the current scope and
    /// unjoins whichever clause ends up first.
    fn prune_inactive(&mut self) {
        let file_scoped = self.is_file_scoped();
        let catalog = &self.catalog;
        self.clauses.retain(|c| {
            let keep = catalog.field(&c.field).is_none() || catalog.is_active(&c.field, file_scoped);
            if !keep {
                debug!(clause = %c.id, field = %c.field, "dropping clause on deactivated field");
            }
            keep
        });
        if let Some(head) = self.clauses.first_mut() {
            head.joiner = None;
        }
    }

    /// Loads a committed clause back into the pending inputs; the next
    /// `upsert` updates it in place.
    pub fn load_for_edit(&mut self, id: ClauseId) -> bool {
        let Some(clause) = self.clauses.iter().find(|c| c.id == id) else {
            return false;
        };
        let mut pending = PendingClause {
            field: Some(clause.field.clone()),
            op: Some(clause.op),
            ..PendingClause::default()
        };
        match &clause.value {
            ClauseValue::None => {}
            ClauseValue::Scalar(v) => pending.value = v.clone(),
            ClauseValue::List(vs) => pending.values = vs.clone(),
            ClauseValue::Range { start, end } => {
                pending.start = start.clone();
                pending.end = end.clone();
            }
        }
        self.pending = pending;
        self.editing_id = Some(id);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.clear_builder();
    }

    pub fn clear_builder(&mut self) {
        self.pending = PendingClause::default();
        self.editing_id = None;
    }

    pub fn clear_all(&mut self) {
        self.clauses.clear();
        self.clear_builder();
        self.next_joiner = Joiner::And;
    }
}
