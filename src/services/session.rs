//! Import session state and its transitions.
//!
//! An `ImportSession` is the whole state of one import dialog: the phase, the
//! parsed candidates with their selection flags and titles, and the latest
//! error or progress report. Every user action is a method that either moves
//! the session to its next state or returns `InvalidTransition`.

use crate::error::ImportError;
use crate::models::{ImportBatchItem, ImportCandidate, Phase, Progress, RawChapter, SessionView};
use crate::services::conflict::screen_conflicts;
use crate::services::loader::{self, SourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSession {
    project_id: String,
    existing_chapter_numbers: HashSet<u32>,
    phase: Phase,
    file_name: Option<String>,
    candidates: Vec<ImportCandidate>,
    error: Option<String>,
    progress: Progress,
    skipped_count: usize,
}

impl ImportSession {
    pub fn new(project_id: impl Into<String>, existing_chapter_numbers: HashSet<u32>) -> Self {
        ImportSession {
            project_id: project_id.into(),
            existing_chapter_numbers,
            phase: Phase::Idle,
            file_name: None,
            candidates: Vec::new(),
            error: None,
            progress: Progress::default(),
            skipped_count: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn candidates(&self) -> &[ImportCandidate] {
        &self.candidates
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    pub fn selected_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.selected).count()
    }

    /// Start loading a newly picked file. Unsupported extensions go straight
    /// to the error phase without loading.
    pub fn begin_loading(&mut self, file_name: &str) -> Result<SourceKind, ImportError> {
        self.expect_phase(
            "pick a file",
            &[Phase::Idle, Phase::Error, Phase::Previewing],
        )?;
        self.clear_file();

        match SourceKind::from_file_name(file_name) {
            Ok(kind) => {
                self.phase = Phase::Loading;
                self.file_name = Some(file_name.to_string());
                debug!(file = %file_name, ?kind, "Session loading file");
                Ok(kind)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Apply the parser's outcome. Returns the number of candidates on success.
    pub fn finish_loading(
        &mut self,
        outcome: Result<Vec<RawChapter>, ImportError>,
    ) -> Result<usize, ImportError> {
        self.expect_phase("finish loading", &[Phase::Loading])?;

        match outcome {
            Ok(chapters) if !chapters.is_empty() => {
                self.candidates = chapters.into_iter().map(ImportCandidate::from).collect();
                self.phase = Phase::Previewing;
                info!(
                    project = %self.project_id,
                    candidates = self.candidates.len(),
                    "Chapters ready for review"
                );
                Ok(self.candidates.len())
            }
            Ok(_) => {
                let err = ImportError::no_chapters();
                self.fail(&err);
                Err(err)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Pick, parse and apply a file in one step.
    pub fn load_file(&mut self, file_name: &str, bytes: &[u8]) -> Result<usize, ImportError> {
        self.begin_loading(file_name)?;
        self.finish_loading(loader::load_chapters(file_name, bytes))
    }

    /// Return to idle, dropping the current file and any error.
    pub fn reset(&mut self) -> Result<(), ImportError> {
        self.expect_phase("reset", &[Phase::Idle, Phase::Error, Phase::Previewing])?;
        self.clear_file();
        self.phase = Phase::Idle;
        Ok(())
    }

    pub fn toggle(&mut self, index: usize) -> Result<(), ImportError> {
        self.expect_phase("toggle a chapter", &[Phase::Previewing])?;
        let candidate = self
            .candidates
            .get_mut(index)
            .ok_or(ImportError::NoSuchChapter { index })?;
        candidate.selected = !candidate.selected;
        Ok(())
    }

    /// Deselect everything when all are selected, otherwise select everything.
    pub fn toggle_all(&mut self) -> Result<(), ImportError> {
        self.expect_phase("toggle all chapters", &[Phase::Previewing])?;
        let select = !self.candidates.iter().all(|c| c.selected);
        for candidate in &mut self.candidates {
            candidate.selected = select;
        }
        Ok(())
    }

    /// Select exactly the 1-based inclusive range `start..=end`.
    ///
    /// Bounds that do not parse, `start < 1` or `end < start` leave the
    /// selection untouched.
    pub fn select_range(&mut self, start: &str, end: &str) -> Result<(), ImportError> {
        self.expect_phase("select a range", &[Phase::Previewing])?;
        let (Ok(start), Ok(end)) = (start.trim().parse::<i64>(), end.trim().parse::<i64>()) else {
            return Ok(());
        };
        if start < 1 || end < start {
            return Ok(());
        }
        for (idx, candidate) in self.candidates.iter_mut().enumerate() {
            let number = idx as i64 + 1;
            candidate.selected = (start..=end).contains(&number);
        }
        Ok(())
    }

    pub fn edit_title(&mut self, index: usize, title: impl Into<String>) -> Result<(), ImportError> {
        self.expect_phase("edit a title", &[Phase::Previewing])?;
        let candidate = self
            .candidates
            .get_mut(index)
            .ok_or(ImportError::NoSuchChapter { index })?;
        candidate.title = title.into();
        Ok(())
    }

    /// Screen the selection for conflicts and enter the importing phase.
    ///
    /// Returns the batch to hand to the importer. When every selected chapter
    /// conflicts the session stays in review with an error message.
    pub fn begin_import(&mut self) -> Result<Vec<ImportBatchItem>, ImportError> {
        self.expect_phase("import", &[Phase::Previewing])?;
        if self.selected_count() == 0 {
            return Err(ImportError::NothingSelected);
        }

        let batch = screen_conflicts(
            &self.candidates,
            &self.existing_chapter_numbers,
            &self.project_id,
        );
        self.skipped_count = batch.skipped_count;

        if batch.items.is_empty() {
            let err = ImportError::AllChaptersConflict;
            self.error = Some(err.to_string());
            warn!(
                project = %self.project_id,
                skipped = batch.skipped_count,
                "Every selected chapter already exists"
            );
            return Err(err);
        }

        self.phase = Phase::Importing;
        self.error = None;
        self.progress = Progress {
            current: 0,
            total: batch.items.len(),
        };
        info!(
            project = %self.project_id,
            chapters = batch.items.len(),
            skipped = batch.skipped_count,
            "Starting chapter import"
        );
        Ok(batch.items)
    }

    /// Record the importer's latest progress report. Ignored outside an import.
    pub fn report_progress(&mut self, current: usize, total: usize) {
        if self.phase == Phase::Importing {
            self.progress = Progress { current, total };
        }
    }

    /// The importer succeeded: the session is cleared back to idle.
    pub fn resolve_import(&mut self) -> Result<ImportSummary, ImportError> {
        self.expect_phase("complete an import", &[Phase::Importing])?;
        let summary = ImportSummary {
            imported: self.progress.total,
            skipped_count: self.skipped_count,
        };
        self.clear_file();
        self.phase = Phase::Idle;
        info!(
            project = %self.project_id,
            imported = summary.imported,
            skipped = summary.skipped_count,
            "Chapter import finished"
        );
        Ok(summary)
    }

    /// The importer failed: back to review with candidates untouched.
    pub fn reject_import(&mut self, err: &ImportError) -> Result<(), ImportError> {
        self.expect_phase("fail an import", &[Phase::Importing])?;
        warn!(project = %self.project_id, "Chapter import failed: {err}");
        self.phase = Phase::Previewing;
        self.error = Some(err.to_string());
        self.progress = Progress::default();
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            project_id: self.project_id.clone(),
            phase: self.phase,
            file_name: self.file_name.clone(),
            candidates: self.candidates.clone(),
            selected_count: self.selected_count(),
            error: self.error.clone(),
            progress: self.progress,
            skipped_count: self.skipped_count,
        }
    }

    fn expect_phase(&self, action: &'static str, allowed: &[Phase]) -> Result<(), ImportError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ImportError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    fn fail(&mut self, err: &ImportError) {
        debug!(project = %self.project_id, "Session error: {err}");
        self.candidates.clear();
        self.phase = Phase::Error;
        self.error = Some(err.to_string());
    }

    fn clear_file(&mut self) {
        self.file_name = None;
        self.candidates.clear();
        self.error = None;
        self.progress = Progress::default();
        self.skipped_count = 0;
    }
}

/// Open sessions keyed by id. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, ImportSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session: ImportSession) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id, session);
        debug!(session = %id, "Opened import session");
        id
    }

    pub fn close(&self, id: Uuid) -> Option<ImportSession> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            debug!(session = %id, "Closed import session");
        }
        removed
    }

    /// Parse an uploaded file into the session.
    ///
    /// Parsing runs on its own task, so the session still leaves `Loading`
    /// when the caller stops waiting.
    pub async fn load_upload(
        &self,
        id: Uuid,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<(usize, SessionView), ImportError> {
        self.with_session(id, |s| s.begin_loading(&file_name))??;

        let store = self.clone();
        let task = tokio::spawn(async move {
            let name = file_name.clone();
            let outcome = tokio::task::spawn_blocking(move || loader::load_chapters(&name, &bytes))
                .await
                .unwrap_or_else(|e| {
                    warn!(file = %file_name, "Chapter parser panicked: {e}");
                    Err(ImportError::parse("Failed to parse file"))
                });
            store
                .with_session(id, |s| s.finish_loading(outcome).map(|count| (count, s.view())))
                .and_then(|loaded| loaded)
        });

        task.await
            .unwrap_or_else(|e| Err(ImportError::parse(format!("Failed to parse file: {e}"))))
    }

    /// Run `f` against the session, failing if it does not exist.
    pub fn with_session<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ImportSession) -> R,
    ) -> Result<R, ImportError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id).ok_or(ImportError::SessionNotFound)?;
        Ok(f(session))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ImportSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn previewing(titles: &[&str]) -> ImportSession {
        let mut session = ImportSession::new("proj-1", HashSet::from([3]));
        session.begin_loading("book.txt").unwrap();
        let chapters = titles
            .iter()
            .map(|t| RawChapter::new(*t, format!("Body of {t}")))
            .collect();
        session.finish_loading(Ok(chapters)).unwrap();
        session
    }

    fn selection(session: &ImportSession) -> Vec<bool> {
        session.candidates().iter().map(|c| c.selected).collect()
    }

    #[test]
    fn loaded_candidates_start_selected() {
        let session = previewing(&["A", "B"]);
        assert_eq!(session.phase(), Phase::Previewing);
        assert_eq!(selection(&session), vec![true, true]);
        assert!(session.candidates().iter().all(|c| c.translated_text.is_empty()));
    }

    #[test]
    fn unsupported_file_goes_straight_to_error() {
        let mut session = ImportSession::new("p", HashSet::new());
        let err = session.begin_loading("cover.png").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFileType { .. }));
        assert_eq!(session.phase(), Phase::Error);
        assert_eq!(session.error(), Some(err.to_string().as_str()));

        session.reset().unwrap();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.error(), None);
    }

    #[test]
    fn parse_failure_leaves_no_partial_preview() {
        let mut session = ImportSession::new("p", HashSet::new());
        session.begin_loading("book.epub").unwrap();
        let err = session
            .finish_loading(Err(ImportError::parse("Failed to open EPUB")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to open EPUB");
        assert_eq!(session.phase(), Phase::Error);
        assert!(session.candidates().is_empty());
    }

    #[test]
    fn zero_chapters_is_an_error() {
        let mut session = ImportSession::new("p", HashSet::new());
        session.begin_loading("book.txt").unwrap();
        assert_eq!(
            session.finish_loading(Ok(Vec::new())),
            Err(ImportError::no_chapters())
        );
        assert_eq!(session.phase(), Phase::Error);
    }

    #[test]
    fn load_file_parses_text() {
        let mut session = ImportSession::new("p", HashSet::new());
        let count = session.load_file("notes.txt", b"a few words").unwrap();
        assert_eq!(count, 1);
        assert_eq!(session.phase(), Phase::Previewing);
    }

    #[test]
    fn toggle_flips_one_candidate() {
        let mut session = previewing(&["A", "B", "C"]);
        session.toggle(1).unwrap();
        assert_eq!(selection(&session), vec![true, false, true]);
        assert_eq!(session.selected_count(), 2);
        assert_eq!(
            session.toggle(9),
            Err(ImportError::NoSuchChapter { index: 9 })
        );
    }

    #[test]
    fn toggle_all_twice_restores_selection() {
        let mut session = previewing(&["A", "B", "C"]);
        session.toggle_all().unwrap();
        assert_eq!(selection(&session), vec![false, false, false]);
        session.toggle_all().unwrap();
        assert_eq!(selection(&session), vec![true, true, true]);
    }

    #[test]
    fn toggle_all_selects_everything_from_partial_selection() {
        let mut session = previewing(&["A", "B", "C"]);
        session.toggle(0).unwrap();
        session.toggle_all().unwrap();
        assert_eq!(selection(&session), vec![true, true, true]);
    }

    #[test]
    fn range_selects_exactly_the_range() {
        let mut session = previewing(&["1", "2", "3", "4", "5"]);
        session.select_range("2", "4").unwrap();
        assert_eq!(selection(&session), vec![false, true, true, true, false]);
    }

    #[test]
    fn invalid_ranges_are_ignored() {
        let mut session = previewing(&["1", "2", "3"]);
        session.toggle(0).unwrap();
        let before = selection(&session);
        for (start, end) in [("0", "2"), ("3", "2"), ("x", "2"), ("1", ""), ("-1", "2")] {
            session.select_range(start, end).unwrap();
            assert_eq!(selection(&session), before, "range {start:?}..{end:?}");
        }
    }

    #[test]
    fn range_past_the_end_selects_the_tail() {
        let mut session = previewing(&["1", "2", "3"]);
        session.select_range(" 2 ", "10").unwrap();
        assert_eq!(selection(&session), vec![false, true, true]);
    }

    #[test]
    fn edit_title_changes_only_the_title() {
        let mut session = previewing(&["Chapter 1"]);
        session.edit_title(0, "Chapter 1: Dawn").unwrap();
        let candidate = &session.candidates()[0];
        assert_eq!(candidate.title, "Chapter 1: Dawn");
        assert_eq!(candidate.original_text, "Body of Chapter 1");
    }

    #[test]
    fn import_screens_conflicts() {
        let mut session = previewing(&["Chapter 1", "Chapter 3", "Chapter 5"]);
        let batch = session.begin_import().unwrap();
        let titles: Vec<&str> = batch.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 5"]);
        assert_eq!(session.phase(), Phase::Importing);
        assert_eq!(session.view().skipped_count, 1);
        assert_eq!(session.progress(), Progress { current: 0, total: 2 });
    }

    #[test]
    fn all_conflicting_stays_in_review() {
        let mut session = previewing(&["Chapter 3", "Chapter 4"]);
        session.toggle(1).unwrap();
        assert_eq!(session.begin_import(), Err(ImportError::AllChaptersConflict));
        assert_eq!(session.phase(), Phase::Previewing);
        assert!(session.error().is_some());
        assert_eq!(session.candidates().len(), 2);
    }

    #[test]
    fn nothing_selected_cannot_import() {
        let mut session = previewing(&["A"]);
        session.toggle_all().unwrap();
        assert_eq!(session.begin_import(), Err(ImportError::NothingSelected));
        assert_eq!(session.phase(), Phase::Previewing);
    }

    #[test]
    fn edits_are_rejected_while_importing() {
        let mut session = previewing(&["A", "B"]);
        session.begin_import().unwrap();
        assert!(matches!(
            session.toggle(0),
            Err(ImportError::InvalidTransition { .. })
        ));
        assert!(matches!(
            session.begin_loading("other.txt"),
            Err(ImportError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn progress_reflects_latest_report() {
        let mut session = previewing(&["A", "B"]);
        session.report_progress(1, 2);
        assert_eq!(session.progress(), Progress::default());
        session.begin_import().unwrap();
        session.report_progress(1, 2);
        assert_eq!(session.progress(), Progress { current: 1, total: 2 });
    }

    #[test]
    fn successful_import_clears_the_session() {
        let mut session = previewing(&["Chapter 1", "Chapter 3", "Chapter 5"]);
        session.begin_import().unwrap();
        let summary = session.resolve_import().unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped_count: 1
            }
        );
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.candidates().is_empty());
    }

    #[test]
    fn failed_import_returns_to_review_intact() {
        let mut session = previewing(&["A", "B", "C"]);
        session.toggle(2).unwrap();
        session.edit_title(0, "Renamed").unwrap();
        session.begin_import().unwrap();
        session
            .reject_import(&ImportError::import_failure(Some("server down".into())))
            .unwrap();

        assert_eq!(session.phase(), Phase::Previewing);
        assert_eq!(session.error(), Some("server down"));
        assert_eq!(selection(&session), vec![true, true, false]);
        assert_eq!(session.candidates()[0].title, "Renamed");
    }

    #[test]
    fn picking_a_new_file_discards_candidates() {
        let mut session = previewing(&["A"]);
        session.begin_loading("next.epub").unwrap();
        assert_eq!(session.phase(), Phase::Loading);
        assert!(session.candidates().is_empty());
    }

    #[tokio::test]
    async fn upload_parses_into_the_stored_session() {
        let store = SessionStore::new();
        let id = store.open(ImportSession::new("p", HashSet::new()));
        let (count, view) = store
            .load_upload(id, "notes.txt".to_string(), b"a few words".to_vec())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(view.phase, Phase::Previewing);
    }

    #[tokio::test]
    async fn abandoned_upload_still_finishes_loading() {
        let store = SessionStore::new();
        let id = store.open(ImportSession::new("p", HashSet::new()));
        let text = format!("Chapter 1\n{}", "word ".repeat(5_000));

        let upload = store.load_upload(id, "book.txt".to_string(), text.into_bytes());
        let _ = tokio::time::timeout(Duration::ZERO, upload).await;

        let mut phase = store.with_session(id, |s| s.phase()).unwrap();
        for _ in 0..200 {
            if phase != Phase::Loading {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            phase = store.with_session(id, |s| s.phase()).unwrap();
        }
        assert_eq!(phase, Phase::Previewing);
        assert!(store.with_session(id, |s| s.reset()).unwrap().is_ok());
    }

    #[tokio::test]
    async fn upload_with_unsupported_type_never_loads() {
        let store = SessionStore::new();
        let id = store.open(ImportSession::new("p", HashSet::new()));
        let err = store
            .load_upload(id, "cover.png".to_string(), vec![0x89, b'P'])
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFileType { .. }));
        assert_eq!(store.with_session(id, |s| s.phase()), Ok(Phase::Error));
    }

    #[test]
    fn store_runs_actions_on_open_sessions() {
        let store = SessionStore::new();
        let id = store.open(ImportSession::new("p", HashSet::new()));
        let phase = store.with_session(id, |s| s.phase()).unwrap();
        assert_eq!(phase, Phase::Idle);

        assert!(store.close(id).is_some());
        assert_eq!(
            store.with_session(id, |s| s.phase()),
            Err(ImportError::SessionNotFound)
        );
    }
}
