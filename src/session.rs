//! Editing sessions: uploaded images, their linear edit history and the
//! transient selection state (active image, tab, crop rectangle, hotspot).

use crate::ai::FocusPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),
    #[error("image `{0}` not found in session")]
    ImageNotFound(Uuid),
    #[error("a request is already running for this image")]
    Busy,
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("{0}")]
    InvalidInput(String),
}

/// Immutable, content-addressed image bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    pub digest: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Arc<Self> {
        let digest = hex::encode(Sha256::digest(&bytes));
        Arc::new(Self {
            digest,
            content_type: content_type.into(),
            bytes,
        })
    }
}

/// Linear undo/redo history. `entries[0]` is the original upload and
/// `index < entries.len()` always holds.
#[derive(Debug, Clone)]
pub struct ImageHistory {
    entries: Vec<Arc<Artifact>>,
    index: usize,
    limit: usize,
}

impl ImageHistory {
    pub fn new(original: Arc<Artifact>, limit: usize) -> Self {
        Self {
            entries: vec![original],
            index: 0,
            limit: limit.max(2),
        }
    }

    /// Drops everything after the current entry, then appends. Past the limit
    /// the oldest edits go first; the original always stays.
    pub fn apply_edit(&mut self, artifact: Arc<Artifact>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(artifact);
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(1..1 + excess);
        }
        self.index = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Result<(), SessionError> {
        if self.index == 0 {
            return Err(SessionError::NothingToUndo);
        }
        self.index -= 1;
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), SessionError> {
        if self.index + 1 >= self.entries.len() {
            return Err(SessionError::NothingToRedo);
        }
        self.index += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn current(&self) -> &Arc<Artifact> {
        &self.entries[self.index]
    }

    pub fn original(&self) -> &Arc<Artifact> {
        &self.entries[0]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct EditableImage {
    pub id: Uuid,
    pub file_name: String,
    pub history: ImageHistory,
    pub generated_text: Option<String>,
    pub saved: bool,
    busy: Arc<AtomicBool>,
}

impl EditableImage {
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorTab {
    #[default]
    Edit,
    Describe,
    Crop,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    pub id: Uuid,
    pub images: Vec<EditableImage>,
    pub active_image: Option<Uuid>,
    pub tab: EditorTab,
    pub crop: Option<CropRect>,
    pub hotspot: Option<FocusPoint>,
    last_touched: Instant,
}

impl EditorSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            images: Vec::new(),
            active_image: None,
            tab: EditorTab::default(),
            crop: None,
            hotspot: None,
            last_touched: Instant::now(),
        }
    }

    fn is_working(&self) -> bool {
        self.images.iter().any(EditableImage::is_busy)
    }

    fn image(&self, image_id: Uuid) -> Result<&EditableImage, SessionError> {
        self.images
            .iter()
            .find(|image| image.id == image_id)
            .ok_or(SessionError::ImageNotFound(image_id))
    }

    fn image_mut(&mut self, image_id: Uuid) -> Result<&mut EditableImage, SessionError> {
        self.images
            .iter_mut()
            .find(|image| image.id == image_id)
            .ok_or(SessionError::ImageNotFound(image_id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionUpdate {
    #[serde(default)]
    pub active_image: Option<Uuid>,
    #[serde(default)]
    pub tab: Option<EditorTab>,
    /// `Some(None)` clears the crop rectangle.
    #[serde(default, with = "double_option")]
    pub crop: Option<Option<CropRect>>,
    #[serde(default, with = "double_option")]
    pub hotspot: Option<Option<FocusPoint>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub id: Uuid,
    pub file_name: String,
    pub history_len: usize,
    pub history_index: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub current_digest: String,
    pub content_type: String,
    pub generated_text: Option<String>,
    pub saved: bool,
    pub busy: bool,
}

impl From<&EditableImage> for ImageView {
    fn from(image: &EditableImage) -> Self {
        let current = image.history.current();
        Self {
            id: image.id,
            file_name: image.file_name.clone(),
            history_len: image.history.len(),
            history_index: image.history.index(),
            can_undo: image.history.can_undo(),
            can_redo: image.history.can_redo(),
            current_digest: current.digest.clone(),
            content_type: current.content_type.clone(),
            generated_text: image.generated_text.clone(),
            saved: image.saved,
            busy: image.is_busy(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub images: Vec<ImageView>,
    pub active_image: Option<Uuid>,
    pub tab: EditorTab,
    pub crop: Option<CropRect>,
    pub hotspot: Option<FocusPoint>,
}

impl From<&EditorSession> for SessionView {
    fn from(session: &EditorSession) -> Self {
        Self {
            id: session.id,
            images: session.images.iter().map(ImageView::from).collect(),
            active_image: session.active_image,
            tab: session.tab,
            crop: session.crop,
            hotspot: session.hotspot,
        }
    }
}

/// Holds an image's busy flag; clears it when dropped, so a cancelled
/// request cannot leave the image locked.
#[derive(Debug)]
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What an AI call needs, captured while the image is marked busy. The image
/// stays busy exactly as long as the ticket is alive.
#[derive(Debug)]
pub struct WorkTicket {
    pub session_id: Uuid,
    pub image_id: Uuid,
    pub current: Arc<Artifact>,
    pub hotspot: Option<FocusPoint>,
    _busy: BusyGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Undo,
    Redo,
    Reset,
}

/// All live sessions, keyed by id.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, EditorSession>>>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            history_limit,
        }
    }

    pub async fn create(&self) -> SessionView {
        let session = EditorSession::new();
        let view = SessionView::from(&session);
        self.sessions.lock().await.insert(session.id, session);
        debug!(target = "studio.session", session = %view.id, "session created");
        view
    }

    pub async fn view(&self, session_id: Uuid) -> Result<SessionView, SessionError> {
        let guard = self.sessions.lock().await;
        let session = guard
            .get(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;
        Ok(SessionView::from(session))
    }

    pub async fn remove(&self, session_id: Uuid) -> Result<(), SessionError> {
        self.sessions
            .lock()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    async fn with_session<T>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut EditorSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut guard = self.sessions.lock().await;
        let session = guard
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;
        session.last_touched = Instant::now();
        f(session)
    }

    /// Drops sessions untouched for at least `max_idle`. Sessions with a
    /// request in flight are kept. Returns how many were removed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut guard = self.sessions.lock().await;
        let before = guard.len();
        guard.retain(|_, session| {
            session.is_working() || session.last_touched.elapsed() < max_idle
        });
        let removed = before - guard.len();
        if removed > 0 {
            debug!(target = "studio.session", removed, "idle sessions expired");
        }
        removed
    }

    /// Runs [`sweep_idle`](Self::sweep_idle) every `every` until the runtime
    /// shuts down.
    pub fn spawn_sweeper(&self, max_idle: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.sweep_idle(max_idle).await;
            }
        })
    }

    /// Adds an upload as a new image and makes it the active one.
    pub async fn add_image(
        &self,
        session_id: Uuid,
        file_name: String,
        bytes: Vec<u8>,
        content_type: String,
    ) -> Result<ImageView, SessionError> {
        if bytes.is_empty() {
            return Err(SessionError::InvalidInput("image file is empty".into()));
        }
        let limit = self.history_limit;
        self.with_session(session_id, |session| {
            let image = EditableImage {
                id: Uuid::new_v4(),
                file_name,
                history: ImageHistory::new(Artifact::new(bytes, content_type), limit),
                generated_text: None,
                saved: false,
                busy: Arc::new(AtomicBool::new(false)),
            };
            let view = ImageView::from(&image);
            session.active_image = Some(image.id);
            session.images.push(image);
            Ok(view)
        })
        .await
    }

    pub async fn remove_image(&self, session_id: Uuid, image_id: Uuid) -> Result<(), SessionError> {
        self.with_session(session_id, |session| {
            let position = session
                .images
                .iter()
                .position(|image| image.id == image_id)
                .ok_or(SessionError::ImageNotFound(image_id))?;
            if session.images[position].is_busy() {
                return Err(SessionError::Busy);
            }
            session.images.remove(position);
            if session.active_image == Some(image_id) {
                session.active_image = session.images.last().map(|image| image.id);
            }
            Ok(())
        })
        .await
    }

    pub async fn update_selection(
        &self,
        session_id: Uuid,
        update: SelectionUpdate,
    ) -> Result<SessionView, SessionError> {
        self.with_session(session_id, |session| {
            if let Some(image_id) = update.active_image {
                session.image(image_id)?;
                session.active_image = Some(image_id);
            }
            if let Some(tab) = update.tab {
                session.tab = tab;
            }
            if let Some(crop) = update.crop {
                if let Some(rect) = crop
                    && (rect.width == 0 || rect.height == 0)
                {
                    return Err(SessionError::InvalidInput(
                        "crop rectangle must have a non-zero size".into(),
                    ));
                }
                session.crop = crop;
            }
            if let Some(hotspot) = update.hotspot {
                session.hotspot = hotspot;
            }
            Ok(SessionView::from(&*session))
        })
        .await
    }

    /// Marks the image busy and hands out its current artifact. The flag is
    /// cleared by [`complete_edit`](Self::complete_edit),
    /// [`complete_text`](Self::complete_text) or by dropping the ticket.
    pub async fn begin_work(
        &self,
        session_id: Uuid,
        image_id: Uuid,
    ) -> Result<WorkTicket, SessionError> {
        self.with_session(session_id, |session| {
            let hotspot = session.hotspot;
            let image = session.image_mut(image_id)?;
            if image
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(SessionError::Busy);
            }
            Ok(WorkTicket {
                session_id,
                image_id,
                current: image.history.current().clone(),
                hotspot,
                _busy: BusyGuard(image.busy.clone()),
            })
        })
        .await
    }

    pub async fn complete_edit(
        &self,
        ticket: WorkTicket,
        artifact: Arc<Artifact>,
    ) -> Result<ImageView, SessionError> {
        self.with_session(ticket.session_id, |session| {
            let image = session.image_mut(ticket.image_id)?;
            drop(ticket);
            image.history.apply_edit(artifact);
            image.saved = false;
            Ok(ImageView::from(&*image))
        })
        .await
    }

    pub async fn complete_text(
        &self,
        ticket: WorkTicket,
        text: String,
    ) -> Result<ImageView, SessionError> {
        self.with_session(ticket.session_id, |session| {
            let image = session.image_mut(ticket.image_id)?;
            drop(ticket);
            image.generated_text = Some(text);
            image.saved = false;
            Ok(ImageView::from(&*image))
        })
        .await
    }

    pub async fn navigate(
        &self,
        session_id: Uuid,
        image_id: Uuid,
        step: Navigation,
    ) -> Result<ImageView, SessionError> {
        self.with_session(session_id, |session| {
            let image = session.image_mut(image_id)?;
            match step {
                Navigation::Undo => image.history.undo()?,
                Navigation::Redo => image.history.redo()?,
                Navigation::Reset => image.history.reset(),
            }
            Ok(ImageView::from(&*image))
        })
        .await
    }

    pub async fn current(
        &self,
        session_id: Uuid,
        image_id: Uuid,
    ) -> Result<Arc<Artifact>, SessionError> {
        self.with_session(session_id, |session| {
            Ok(session.image(image_id)?.history.current().clone())
        })
        .await
    }

    pub async fn original(
        &self,
        session_id: Uuid,
        image_id: Uuid,
    ) -> Result<Arc<Artifact>, SessionError> {
        self.with_session(session_id, |session| {
            Ok(session.image(image_id)?.history.original().clone())
        })
        .await
    }

    /// Everything a save needs: current and original artifacts plus any
    /// generated text.
    pub async fn snapshot(
        &self,
        session_id: Uuid,
        image_id: Uuid,
    ) -> Result<(Arc<Artifact>, Arc<Artifact>, Option<String>), SessionError> {
        self.with_session(session_id, |session| {
            let image = session.image(image_id)?;
            Ok((
                image.history.current().clone(),
                image.history.original().clone(),
                image.generated_text.clone(),
            ))
        })
        .await
    }

    pub async fn mark_saved(&self, session_id: Uuid, image_id: Uuid) -> Result<(), SessionError> {
        self.with_session(session_id, |session| {
            session.image_mut(image_id)?.saved = true;
            Ok(())
        })
        .await
    }
}
