//! Admin activity console: clause builder, paginated search and request details.

pub mod config;
pub mod remote;

use nordik_client::{ActivityApi, ApiError, DownloadStore, StoredDownload};
use nordik_core::{
    compose, QueryBuilder, RequestDetail, ReviewDecision, ReviewStatus, Role, SearchMode,
    SearchRequest, SearchResult, SearchSummary, SessionStore,
};
use thiserror::Error;
use tracing::{info, warn};

pub use config::{ConsoleConfig, ConsoleFile};
pub use remote::{DownloadTicket, DownloadTracker, Remote, Ticket};

pub const CRATE_NAME: &str = "nordik-console";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("not signed in")]
    SignedOut,
    #[error("role {0:?} cannot open the activity console")]
    Forbidden(Role),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("storing download: {0:#}")]
    Store(anyhow::Error),
}

pub struct ActivityConsole<A> {
    api: A,
    session: SessionStore,
    builder: QueryBuilder,
    mode: SearchMode,
    page: u32,
    page_size: u32,
    search: Remote<SearchResult>,
    detail: Remote<RequestDetail>,
    downloads: DownloadTracker,
    store: DownloadStore,
}

impl<A: ActivityApi> ActivityConsole<A> {
    pub fn new(
        api: A,
        session: SessionStore,
        builder: QueryBuilder,
        page_size: u32,
        store: DownloadStore,
    ) -> Self {
        Self {
            api,
            session,
            builder,
            mode: SearchMode::Changes,
            page: 1,
            page_size: page_size.max(1),
            search: Remote::default(),
            detail: Remote::default(),
            downloads: DownloadTracker::default(),
            store,
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut QueryBuilder {
        &mut self.builder
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Ends the session and forgets everything fetched under it.
    pub fn logout(&mut self) {
        self.session.logout();
        self.search.reset();
        self.detail.reset();
        self.builder.clear_all();
        self.page = 1;
    }

    pub fn search(&self) -> &Remote<SearchResult> {
        &self.search
    }

    pub fn detail(&self) -> &Remote<RequestDetail> {
        &self.detail
    }

    pub fn summary(&self) -> Option<SearchSummary> {
        SearchSummary::from_response(self.search.data())
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn token(&self) -> Result<String, ConsoleError> {
        let session = self.session.current().ok_or(ConsoleError::SignedOut)?;
        if !session.user.role.can_audit() {
            return Err(ConsoleError::Forbidden(session.user.role));
        }
        Ok(session.token.clone())
    }

    /// Starts a search for `page` and returns the request to send. Pair with
    /// [`finish_search`](Self::finish_search) when driving the transport
    /// from an external event loop.
    pub fn begin_search(&mut self, page: u32) -> (Ticket, SearchRequest) {
        self.page = page;
        let ticket = self.search.begin();
        let request = compose(self.mode, self.builder.clauses(), page, self.page_size);
        (ticket, request)
    }

    pub fn finish_search<E: std::fmt::Display>(
        &mut self,
        ticket: Ticket,
        result: Result<SearchResult, E>,
    ) -> bool {
        let served_page = result.as_ref().ok().map(|r| r.page).filter(|p| *p > 0);
        let applied = self.search.resolve(ticket, result);
        if applied {
            if let Some(page) = served_page {
                self.page = page;
            }
        }
        applied
    }

    async fn run_search(&mut self, page: u32) {
        let (ticket, request) = self.begin_search(page);
        let result = match self.token() {
            Ok(token) => self.api.search(&token, &request).await.map_err(ConsoleError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(error = %err, page, "activity search failed");
        } else {
            info!(page, clauses = request.clauses.len(), "activity search completed");
        }
        self.finish_search(ticket, result);
    }

    /// Runs the committed clauses from the first page.
    pub async fn apply(&mut self) {
        self.run_search(1).await;
    }

    /// Moves to `page`, clamped to the page range of the last response.
    pub async fn goto_page(&mut self, page: u32) {
        let last = self
            .summary()
            .map(|s| s.total_pages)
            .unwrap_or(1)
            .max(1);
        self.run_search(page.clamp(1, last)).await;
    }

    /// Re-runs the current page; the manual retry after a failure.
    pub async fn refresh(&mut self) {
        self.run_search(self.page.max(1)).await;
    }

    async fn fetch_detail(&self, request_id: i64) -> Result<RequestDetail, ConsoleError> {
        let token = self.token()?;
        let changes = self.api.request_changes(&token, request_id).await?;
        let mut detail = RequestDetail {
            request_id,
            changes,
            ..RequestDetail::default()
        };
        match self.api.request_photos(&token, request_id).await {
            Ok(photos) => detail.photos = photos,
            Err(err) => {
                warn!(error = %err, request_id, "request photos failed");
                detail.photos_error = Some(err.to_string());
            }
        }
        match self.api.request_documents(&token, request_id).await {
            Ok(documents) => detail.documents = documents,
            Err(err) => {
                warn!(error = %err, request_id, "request documents failed");
                detail.documents_error = Some(err.to_string());
            }
        }
        Ok(detail)
    }

    /// Loads changes, photos and documents of one request. Only a failure
    /// of the changes themselves fails the detail slot.
    pub async fn open_details(&mut self, request_id: i64) {
        let ticket = self.detail.begin();
        let result = self.fetch_detail(request_id).await;
        if let Err(err) = &result {
            warn!(error = %err, request_id, "request details failed");
        }
        self.detail.resolve(ticket, result);
    }

    pub fn close_details(&mut self) {
        self.detail.reset();
    }

    /// Records a review decision and mirrors it into the open detail view.
    pub async fn review_photo(
        &mut self,
        photo_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ConsoleError> {
        let token = self.token()?;
        self.api.review_photo(&token, photo_id, decision).await?;
        if let Some(detail) = self.detail.data_mut() {
            for photo in detail.photos.iter_mut().filter(|p| p.id == photo_id) {
                photo.status = ReviewStatus::from(decision);
            }
        }
        info!(photo_id, ?decision, "photo reviewed");
        Ok(())
    }

    pub async fn review_document(
        &mut self,
        document_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ConsoleError> {
        let token = self.token()?;
        self.api.review_document(&token, document_id, decision).await?;
        if let Some(detail) = self.detail.data_mut() {
            for doc in detail.documents.iter_mut().filter(|d| d.id == document_id) {
                doc.status = ReviewStatus::from(decision);
            }
        }
        info!(document_id, ?decision, "document reviewed");
        Ok(())
    }

    pub fn trigger_download(&mut self) -> DownloadTicket {
        self.downloads.trigger()
    }

    /// Fetches and stores a document; the blob is written only if no newer
    /// download was triggered meanwhile. Returns `None` when superseded.
    pub async fn finish_download(
        &mut self,
        ticket: DownloadTicket,
        document_id: i64,
    ) -> Result<Option<StoredDownload>, ConsoleError> {
        let token = self.token()?;
        let blob = self.api.download_document(&token, document_id).await?;
        if !self.downloads.claim(ticket) {
            warn!(document_id, "download superseded by a newer trigger");
            return Ok(None);
        }
        let stored = self
            .store
            .store(&blob)
            .await
            .map_err(ConsoleError::Store)?;
        info!(
            document_id,
            path = %stored.absolute_path.display(),
            deduplicated = stored.deduplicated,
            "document downloaded"
        );
        Ok(Some(stored))
    }

    pub async fn download_document(
        &mut self,
        document_id: i64,
    ) -> Result<Option<StoredDownload>, ConsoleError> {
        let ticket = self.trigger_download();
        self.finish_download(ticket, document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use nordik_client::DownloadedBlob;
    use nordik_core::{
        ActivityRow, AdminUser, Document, FieldChange, Joiner, Operation, Photo, Session,
    };
    use serde_json::json;

    #[derive(Default)]
    struct FakeApi {
        searches: Mutex<Vec<SearchRequest>>,
        total_pages: u32,
        fail_photos: bool,
        fail_changes: bool,
        fail_search: bool,
    }

    #[async_trait]
    impl ActivityApi for FakeApi {
        async fn search(
            &self,
            _token: &str,
            request: &SearchRequest,
        ) -> Result<SearchResult, ApiError> {
            self.searches.lock().unwrap().push(request.clone());
            if self.fail_search {
                return Err(ApiError::HttpStatus {
                    status: 502,
                    url: "http://api/search".into(),
                    message: None,
                });
            }
            let row: ActivityRow =
                serde_json::from_value(json!({"request_id": 10 + request.page})).unwrap();
            Ok(SearchResult {
                data: vec![row],
                page: request.page,
                total_pages: self.total_pages,
                total_rows: 3,
                total_changes: 9,
                ..SearchResult::default()
            })
        }

        async fn request_changes(
            &self,
            _token: &str,
            _request_id: i64,
        ) -> Result<Vec<FieldChange>, ApiError> {
            if self.fail_changes {
                return Err(ApiError::HttpStatus {
                    status: 503,
                    url: "http://api/details".into(),
                    message: None,
                });
            }
            Ok(vec![FieldChange {
                field: Some("title".into()),
                old_value: Some(json!("Draft")),
                new_value: Some(json!("Final")),
                ..FieldChange::default()
            }])
        }

        async fn request_photos(&self, _token: &str, request_id: i64) -> Result<Vec<Photo>, ApiError> {
            if self.fail_photos {
                return Err(ApiError::HttpStatus {
                    status: 500,
                    url: "http://api/photos".into(),
                    message: Some("storage offline".into()),
                });
            }
            Ok(vec![Photo {
                id: request_id * 100,
                ..Photo::default()
            }])
        }

        async fn request_documents(
            &self,
            _token: &str,
            _request_id: i64,
        ) -> Result<Vec<Document>, ApiError> {
            Ok(vec![Document {
                id: 5,
                status: ReviewStatus::Rejected,
                ..Document::default()
            }])
        }

        async fn review_photo(
            &self,
            _token: &str,
            _photo_id: i64,
            _decision: ReviewDecision,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn review_document(
            &self,
            _token: &str,
            _document_id: i64,
            _decision: ReviewDecision,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn download_document(
            &self,
            _token: &str,
            document_id: i64,
        ) -> Result<DownloadedBlob, ApiError> {
            Ok(DownloadedBlob {
                document_id,
                content_type: Some("text/plain".into()),
                file_name: None,
                bytes: b"signed contract".to_vec(),
            })
        }
    }

    fn session(role: Role) -> SessionStore {
        SessionStore::signed_in(Session {
            token: "tok".into(),
            user: AdminUser {
                id: 7,
                email: "ops@nordikdrive.test".into(),
                role,
            },
            signed_in_at: Utc::now(),
        })
    }

    fn console_with(api: FakeApi, role: Role, dir: &std::path::Path) -> ActivityConsole<FakeApi> {
        ActivityConsole::new(
            api,
            session(role),
            QueryBuilder::default(),
            25,
            DownloadStore::new(dir),
        )
    }

    fn add_status_clause(console: &mut ActivityConsole<FakeApi>) {
        let builder = console.builder_mut();
        builder.set_field("status");
        builder.set_value("approved");
        builder.upsert().expect("complete");
    }

    #[tokio::test]
    async fn apply_searches_first_page_with_committed_clauses() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            total_pages: 4,
            ..FakeApi::default()
        };
        let mut console = console_with(api, Role::Admin, dir.path());
        assert_eq!(console.summary(), None);

        add_status_clause(&mut console);
        console.builder_mut().set_next_joiner(Joiner::Or);
        console.builder_mut().set_field("created_at");
        console.builder_mut().upsert().expect("bare date clause");

        console.apply().await;
        let summary = console.summary().expect("results");
        assert_eq!(summary.page, 1);
        assert_eq!(summary.total_pages, 4);
        assert_eq!(console.search().data().unwrap().data[0].request_id(), Some(11));

        let sent = console.api.searches.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].page_size, 25);
        assert_eq!(sent[0].clauses.len(), 2);
        assert_eq!(sent[0].clauses[1].op, Operation::Last7);
        assert_eq!(sent[0].clauses[1].joiner, Some(Joiner::Or));
    }

    #[tokio::test]
    async fn page_changes_are_clamped_to_known_range() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            total_pages: 3,
            ..FakeApi::default()
        };
        let mut console = console_with(api, Role::Admin, dir.path());

        console.goto_page(5).await;
        assert_eq!(console.page(), 1);

        console.goto_page(9).await;
        assert_eq!(console.page(), 3);
        console.goto_page(0).await;
        assert_eq!(console.page(), 1);

        let pages: Vec<u32> = console
            .api
            .searches
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.page)
            .collect();
        assert_eq!(pages, vec![1, 3, 1]);
    }

    #[tokio::test]
    async fn signed_out_or_forbidden_searches_surface_passive_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console_with(FakeApi::default(), Role::Member, dir.path());
        console.apply().await;
        assert!(console.search().error().unwrap().contains("cannot open"));
        assert!(console.search().data().is_none());

        console.logout();
        console.apply().await;
        assert_eq!(console.search().error(), Some("not signed in"));
        assert!(console.api.searches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_search_keeps_builder_state_and_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            fail_search: true,
            ..FakeApi::default()
        };
        let mut console = console_with(api, Role::Reviewer, dir.path());
        add_status_clause(&mut console);

        console.apply().await;
        assert!(console.search().error().unwrap().contains("502"));
        assert!(!console.search().is_loading());
        assert_eq!(console.builder().clauses().len(), 1);

        console.refresh().await;
        assert_eq!(console.api.searches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_search_responses_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console_with(FakeApi::default(), Role::Admin, dir.path());
        let (old, _) = console.begin_search(1);
        let (new, request) = console.begin_search(2);
        assert_eq!(request.page, 2);

        let newer = SearchResult {
            page: 2,
            total_pages: 2,
            ..SearchResult::default()
        };
        assert!(console.finish_search::<ApiError>(new, Ok(newer)));
        assert!(!console.finish_search::<ApiError>(old, Ok(SearchResult::default())));
        assert_eq!(console.summary().unwrap().page, 2);
    }

    #[tokio::test]
    async fn details_combine_changes_photos_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console_with(FakeApi::default(), Role::Admin, dir.path());
        console.open_details(4).await;

        let detail = console.detail().data().expect("detail");
        assert_eq!(detail.request_id, 4);
        assert_eq!(detail.changes.len(), 1);
        assert_eq!(detail.photos[0].id, 400);
        assert_eq!(detail.pending_reviews(), 1);

        console.review_photo(400, ReviewDecision::Approved).await.unwrap();
        let detail = console.detail().data().unwrap();
        assert_eq!(detail.photos[0].status, ReviewStatus::Approved);
        assert_eq!(detail.pending_reviews(), 0);

        console.close_details();
        assert!(console.detail().data().is_none());
    }

    #[tokio::test]
    async fn detail_failures_do_not_touch_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            fail_photos: true,
            total_pages: 1,
            ..FakeApi::default()
        };
        let mut console = console_with(api, Role::Admin, dir.path());
        console.apply().await;
        console.open_details(4).await;

        assert!(console.detail().error().is_none());
        let detail = console.detail().data().expect("changes survive");
        assert_eq!(detail.changes.len(), 1);
        assert!(detail.photos.is_empty());
        assert!(detail.photos_error.as_deref().unwrap().contains("storage offline"));
        assert_eq!(detail.documents.len(), 1);
        assert_eq!(detail.documents_error, None);
        assert!(console.search().data().is_some());
        assert!(console.search().error().is_none());
    }

    #[tokio::test]
    async fn failed_changes_fail_the_detail_slot() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            fail_changes: true,
            ..FakeApi::default()
        };
        let mut console = console_with(api, Role::Admin, dir.path());
        console.open_details(4).await;

        assert!(console.detail().error().unwrap().contains("503"));
        assert!(console.detail().data().is_none());
        assert!(!console.detail().is_loading());
    }

    #[tokio::test]
    async fn superseded_downloads_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console_with(FakeApi::default(), Role::Admin, dir.path());

        let stale = console.trigger_download();
        let current = console.trigger_download();
        assert!(console.finish_download(stale, 5).await.unwrap().is_none());

        let stored = console
            .finish_download(current, 5)
            .await
            .unwrap()
            .expect("stored");
        assert!(stored.absolute_path.exists());
        assert_eq!(stored.relative_path.extension().unwrap(), "txt");
        assert!(console.finish_download(current, 5).await.unwrap().is_none());

        let again = console.download_document(5).await.unwrap().expect("stored");
        assert!(again.deduplicated);
    }
}
