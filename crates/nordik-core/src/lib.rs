//! Core filter-clause model for the NordikDrive admin activity console.
//!
//! Everything here is pure: the field catalog, clause validation and
//! labelling, the builder state machine, request composition and the
//! response shapes it consumes.

pub mod builder;
pub mod catalog;
pub mod clause;
pub mod request;
pub mod response;
pub mod session;

pub use builder::{PendingClause, QueryBuilder};
pub use catalog::{
    operations_for, Catalog, FieldDescriptor, FieldType, OptionResolver, Operation, SelectOption,
    ValueKind, FILE_ID_FIELD,
};
pub use clause::{is_complete, label_for, Clause, ClauseId, ClauseShapeError, ClauseValue, Joiner, WireClause};
pub use request::{compose, DetailRequest, SearchMode, SearchRequest};
pub use response::{
    normalize_status, ActivityRow, AggregationBucket, ChangesResponse, Document, DocumentsResponse,
    FieldChange, Photo, PhotosResponse, RequestDetail, ReviewDecision, ReviewStatus, SearchResult,
    SearchSummary,
};
pub use session::{AdminUser, Role, Session, SessionStore};

pub const CRATE_NAME: &str = "nordik-core";
