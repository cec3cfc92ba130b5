//! Per-request listing state machine.
//!
//! ```text
//! Scanning <-> Yielded -> Rendering -> CacheWrite -> Done
//!     \___________\___________\____________\______-> Aborted
//! ```
//!
//! A task owns everything a listing holds between scheduler turns: the open
//! directory, the entry stores or streaming buffer, the cache tee and the
//! admission slot. All of it is released together when the task reaches
//! `Done` or `Aborted`, or when it is dropped.

use http::StatusCode;
use http::header;

use crate::config::ListingConfig;
use crate::listing::caching::{self, CacheFormat, CacheManager, CacheTee};
use crate::listing::reading::{ScanCursor, ScanStatus};
use crate::listing::streaming::{HtmlStream, JsonStream, StorePair};
use crate::render::{self, JSON_CONTENT_TYPE, Page, RowRenderer};
use crate::request::{Connection, Request};

use super::admission::AdmissionSlot;
use super::{ListingError, early_hint_links};

/// Stop pulling entries while this much output is queued and the client is not reading.
pub const BACKPRESSURE_BYTES: u64 = 65536 - 4096;

/// Buffered listings up to this many entries render into a single memory chunk.
pub const INMEMORY_ROWS: usize = 256;

/// Scratch buffer for rendering larger buffered listings before spilling.
pub const SPILL_BUFFER_SIZE: usize = 8192;

/// Spill the scratch buffer once less than this much room is left in it.
pub const ROW_HEADROOM: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    Scanning,
    Yielded,
    Rendering,
    CacheWrite,
    Done,
    Aborted,
}

impl ListingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ListingState::Done | ListingState::Aborted)
    }
}

/// Result of one [`ListingTask::resume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Call again on a later scheduler turn.
    Pending,
    /// The response is complete and the task has released its resources.
    Finished,
}

/// How entries turn into output, chosen once per request.
#[derive(Debug)]
enum RenderMode {
    /// Collect, sort, render everything at the end.
    Sorted(StorePair),
    /// Unsorted HTML rows streamed as they are read.
    Html(HtmlStream),
    /// JSON elements streamed as they are read.
    Json(JsonStream),
}

impl RenderMode {
    fn is_streaming(&self) -> bool {
        !matches!(self, RenderMode::Sorted(_))
    }

    /// Streamed output ready to move into the response.
    fn take_pending(&mut self, fin: bool) -> Option<Vec<u8>> {
        match self {
            RenderMode::Sorted(_) => None,
            RenderMode::Html(stream) => (fin || stream.should_flush()).then(|| stream.take_pending()),
            RenderMode::Json(stream) => (fin || stream.should_flush()).then(|| stream.take_pending()),
        }
    }
}

/// A listing in progress.
#[derive(Debug)]
pub struct ListingTask {
    state: ListingState,
    conf: ListingConfig,
    page: Page,
    cache: CacheManager,
    cursor: Option<ScanCursor>,
    mode: Option<RenderMode>,
    tee: CacheTee,
    slot: Option<AdmissionSlot>,
    turns: usize,
}

impl ListingTask {
    /// Sets up the render mode and, for streamed output, starts the response
    /// and the cache file.
    pub(crate) fn begin(
        r: &mut Request,
        conf: ListingConfig,
        cache: CacheManager,
        cursor: ScanCursor,
        slot: AdmissionSlot,
    ) -> Result<Self, ListingError> {
        let page = Page::from_request(r);
        let mode = if conf.json {
            r.set_header(header::CONTENT_TYPE, JSON_CONTENT_TYPE);
            RenderMode::Json(JsonStream::new())
        } else {
            if conf.auto_layout {
                early_hint_links(r, &conf);
            }
            if conf.sort {
                RenderMode::Sorted(StorePair::new())
            } else {
                r.set_header(header::CONTENT_TYPE, &render::content_type(conf.encoding.as_deref()));
                RenderMode::Html(HtmlStream::new(RowRenderer::from_request(r)))
            }
        };

        let mut task = Self {
            state: ListingState::Scanning,
            conf,
            page,
            cache,
            cursor: Some(cursor),
            mode: Some(mode),
            tee: CacheTee::default(),
            slot: Some(slot),
            turns: 0,
        };

        if task.mode.as_ref().is_some_and(RenderMode::is_streaming) {
            task.start_stream(r)?;
        }
        Ok(task)
    }

    fn start_stream(&mut self, r: &mut Request) -> Result<(), ListingError> {
        if self.cache.is_enabled() {
            let format = if self.conf.json { CacheFormat::Json } else { CacheFormat::Html };
            match self.cache.begin_write(&r.physical_path, format) {
                Ok(session) => self.tee = CacheTee::new(Some(session)),
                Err(e) => log::warn!("{}", e),
            }
        }
        if matches!(self.mode, Some(RenderMode::Html(_))) {
            let mut head = r.body.sibling();
            render::append_header(&mut head, &self.conf, &self.page).map_err(|e| self.fail_spill(e))?;
            self.tee.forward(r, head);
        }
        r.status = Some(StatusCode::OK);
        r.body_started = true;
        Ok(())
    }

    pub fn state(&self) -> ListingState {
        self.state
    }

    /// Scan batches that ended with more entries left.
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Runs one scheduler turn: at most one scan batch, or the final render.
    pub fn resume(&mut self, r: &mut Request, conn: &mut dyn Connection) -> Result<Step, ListingError> {
        if self.state.is_terminal() {
            return Ok(Step::Finished);
        }
        // The connection reschedules the request once the client drains the queue
        if r.conf.stream_response_bufmin && r.body.len() > BACKPRESSURE_BYTES && !conn.is_writable() {
            self.state = ListingState::Yielded;
            return Ok(Step::Pending);
        }

        self.state = ListingState::Scanning;
        let status = match (self.cursor.as_mut(), self.mode.as_mut()) {
            (Some(cursor), Some(RenderMode::Sorted(stores))) => cursor.resume(stores),
            (Some(cursor), Some(RenderMode::Html(stream))) => cursor.resume(stream),
            (Some(cursor), Some(RenderMode::Json(stream))) => cursor.resume(stream),
            _ => Ok(ScanStatus::Done),
        };

        match status {
            Err(e) => {
                log::error!("reading {}: {}", self.page.physical_path.display(), e);
                self.release(ListingState::Aborted);
                Err(ListingError::Scan(e))
            }
            Ok(ScanStatus::Progress(read)) => {
                self.turns += 1;
                log::debug!("{}: {} entries read, yielding (turn {})", self.page.uri_path, read, self.turns);
                self.flush_stream(r, false);
                self.state = ListingState::Yielded;
                conn.schedule_resume();
                Ok(Step::Pending)
            }
            Ok(ScanStatus::Done) => {
                self.finish(r, conn)?;
                Ok(Step::Finished)
            }
        }
    }

    /// Server-initiated teardown, for example after a client disconnect.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.release(ListingState::Aborted);
        }
    }

    fn flush_stream(&mut self, r: &mut Request, fin: bool) {
        if let Some(pending) = self.mode.as_mut().and_then(|m| m.take_pending(fin)) {
            self.tee.forward_bytes(r, pending);
        }
    }

    fn finish(&mut self, r: &mut Request, conn: &mut dyn Connection) -> Result<(), ListingError> {
        self.state = ListingState::Rendering;
        self.cursor = None;
        match self.mode.take() {
            Some(RenderMode::Sorted(stores)) => {
                self.render_sorted(r, stores)?;
                self.state = ListingState::CacheWrite;
                self.store_rendered(r, conn);
            }
            Some(mut mode) => {
                if let RenderMode::Json(stream) = &mut mode {
                    stream.finish();
                }
                if let Some(pending) = mode.take_pending(true) {
                    self.tee.forward_bytes(r, pending);
                }
                if matches!(mode, RenderMode::Html(_)) {
                    let mut foot = r.body.sibling();
                    render::append_footer(&mut foot, &self.conf, &self.page).map_err(|e| self.fail_spill(e))?;
                    self.tee.forward(r, foot);
                }
                self.state = ListingState::CacheWrite;
                self.commit_stream(r, conn);
            }
            None => {}
        }
        r.body_finished = true;
        self.release(ListingState::Done);
        Ok(())
    }

    /// Sorts both stores and renders the whole page into the response.
    fn render_sorted(&mut self, r: &mut Request, stores: StorePair) -> Result<(), ListingError> {
        let total = stores.len();
        let (dirs, files) = stores.into_sorted(true);
        let rows = RowRenderer::from_request(r);

        render::append_header(&mut r.body, &self.conf, &self.page).map_err(|e| self.fail_spill(e))?;
        let entries = dirs.iter().map(|e| (e, true)).chain(files.iter().map(|e| (e, false)));
        if total <= INMEMORY_ROWS {
            let mut out = Vec::with_capacity(total * 256);
            for (entry, is_dir) in entries {
                rows.row(&mut out, entry, is_dir);
            }
            r.body.append_buffer(out);
        } else {
            let mut scratch = Vec::with_capacity(SPILL_BUFFER_SIZE);
            for (entry, is_dir) in entries {
                rows.row(&mut scratch, entry, is_dir);
                if SPILL_BUFFER_SIZE.saturating_sub(scratch.len()) < ROW_HEADROOM {
                    r.body.append_mem_to_tempfile(&scratch).map_err(|e| self.fail_spill(e))?;
                    scratch.clear();
                }
            }
            r.body.append_mem_to_tempfile(&scratch).map_err(|e| self.fail_spill(e))?;
        }
        render::append_footer(&mut r.body, &self.conf, &self.page).map_err(|e| self.fail_spill(e))?;

        r.set_header(header::CONTENT_TYPE, &render::content_type(self.conf.encoding.as_deref()));
        r.status = Some(StatusCode::OK);
        Ok(())
    }

    /// Copies a complete buffered response into the cache.
    fn store_rendered(&mut self, r: &mut Request, conn: &mut dyn Connection) {
        let Some(max_age) = self.cache.max_age() else {
            return;
        };
        match self.cache.store_body(&r.physical_path, &r.body) {
            Ok(committed) => {
                log::debug!("cached listing at {}", committed.path.display());
                caching::apply_etag(r, &committed.metadata);
                conn.invalidate_stat_cache(&committed.path);
                caching::apply_cache_control(r, max_age);
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    /// Publishes the cache file filled by the streaming tee, if it survived.
    fn commit_stream(&mut self, r: &mut Request, conn: &mut dyn Connection) {
        let (Some(session), Some(max_age)) = (self.tee.take_session(), self.cache.max_age()) else {
            return;
        };
        // Headers may already be on the wire for a streamed response
        if !r.headers_sent
            && let Ok(metadata) = session.metadata()
        {
            caching::apply_etag(r, &metadata);
        }
        match session.commit() {
            Ok(committed) => {
                log::debug!("cached streamed listing at {}", committed.path.display());
                conn.invalidate_stat_cache(&committed.path);
                if !r.headers_sent {
                    caching::apply_cache_control(r, max_age);
                }
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    fn fail_spill(&mut self, e: std::io::Error) -> ListingError {
        log::error!("spilling listing of {}: {}", self.page.uri_path, e);
        self.release(ListingState::Aborted);
        ListingError::Spill(e)
    }

    fn release(&mut self, state: ListingState) {
        self.cursor = None;
        self.mode = None;
        if self.tee.is_attached() {
            self.tee.detach("listing aborted");
        }
        self.slot = None;
        self.state = state;
        log::debug!("{}: listing {:?} after {} turns", self.page.uri_path, state, self.turns);
    }
}

impl Drop for ListingTask {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.release(ListingState::Aborted);
        }
    }
}
