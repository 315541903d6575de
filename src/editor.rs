//! Editing of the legal pages. One editor holds one page, tracks whether the
//! local copy differs from the last save, and writes it back for an admin.
//! Saves are last-write-wins.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, Instant};

use crate::{
    context::AuthContext,
    error::{EditorError, GatewayError},
    gateway::Gateway,
    models::{PageType, StaticPage, StaticPagePatch},
};

/// How long a save confirmation stays visible.
pub const NOTICE_DISPLAY: Duration = Duration::from_secs(3);

pub const LEAVE_PROMPT: &str = "You have unsaved changes. Leave anyway?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Loading,
    NotFound,
    Clean,
    Dirty,
    Saving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Content,
}

/// Ways of leaving the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Navigate,
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Ask in-page before navigating.
    Prompt(&'static str),
    /// Ask the host (browser) before it closes the page.
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    posted_at: Instant,
}

pub struct PageEditor<G: Gateway> {
    gateway: Arc<G>,
    auth: Arc<AuthContext<G>>,
    state: EditorState,
    page: Option<StaticPage>,
    title: String,
    content: String,
    notice: Option<Notice>,
}

impl<G: Gateway + 'static> PageEditor<G> {
    pub fn new(gateway: Arc<G>, auth: Arc<AuthContext<G>>) -> Self {
        Self {
            gateway,
            auth,
            state: EditorState::Loading,
            page: None,
            title: String::new(),
            content: String::new(),
            notice: None,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn page(&self) -> Option<&StaticPage> {
        self.page.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, EditorState::Dirty | EditorState::Saving)
    }

    /// Success notices fade after [`NOTICE_DISPLAY`]; errors stay until the
    /// next load or save.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().filter(|notice| {
            notice.kind == NoticeKind::Error || notice.posted_at.elapsed() < NOTICE_DISPLAY
        })
    }

    /// `route_key` is the URL form, e.g. `privacy-policy`.
    pub async fn load(&mut self, route_key: &str) -> Result<&StaticPage, EditorError> {
        self.state = EditorState::Loading;
        self.page = None;
        self.title.clear();
        self.content.clear();
        self.notice = None;

        let Some(page_type) = PageType::from_route_key(route_key) else {
            self.state = EditorState::NotFound;
            return Err(EditorError::NotFound);
        };

        match self.gateway.find_static_page(page_type).await {
            Ok(Some(page)) => {
                self.title = page.title.clone();
                self.content = page.content.clone();
                self.state = EditorState::Clean;
                Ok(&*self.page.insert(page))
            }
            Ok(None) => {
                log::warn!("No stored page for {}", page_type.as_str());
                self.state = EditorState::NotFound;
                Err(EditorError::NotFound)
            }
            Err(err) => {
                log::error!("Error loading page {}: {err}", page_type.as_str());
                self.post(NoticeKind::Error, "Could not load the page.");
                Err(EditorError::Gateway(err))
            }
        }
    }

    pub fn edit(&mut self, field: EditField, value: impl Into<String>) -> Result<(), EditorError> {
        match self.state {
            EditorState::Clean | EditorState::Dirty => {}
            other => return Err(EditorError::NotReady(other)),
        }
        match field {
            EditField::Title => self.title = value.into(),
            EditField::Content => self.content = value.into(),
        }
        self.state = EditorState::Dirty;
        Ok(())
    }

    /// Writes the local title and content. Allowed while dirty and, as a
    /// forced re-save, while clean. A save interrupted mid-flight leaves the
    /// editor `Saving`, which may be saved again.
    pub async fn save(&mut self) -> Result<(), EditorError> {
        match self.state {
            EditorState::Clean | EditorState::Dirty | EditorState::Saving => {}
            other => return Err(EditorError::NotReady(other)),
        }
        let Some(page_id) = self.page.as_ref().map(|page| page.id.clone()) else {
            return Err(EditorError::NotReady(self.state));
        };

        let identity = match self.auth.identity() {
            Some(identity) if self.auth.is_admin() => identity,
            _ => {
                self.post(NoticeKind::Error, "Your administrator session has ended. Sign in again.");
                return Err(EditorError::Unauthorized);
            }
        };

        let patch = StaticPagePatch {
            title: self.title.clone(),
            content: self.content.clone(),
            updated_at: Utc::now(),
            updated_by: identity.id,
        };
        self.state = EditorState::Saving;
        self.notice = None;

        match self.gateway.update_static_page(&page_id, &patch).await {
            Ok(()) => {
                if let Some(page) = self.page.as_mut() {
                    page.title = patch.title;
                    page.content = patch.content;
                    page.updated_at = patch.updated_at;
                    page.updated_by = Some(patch.updated_by);
                }
                log::info!("Saved page {page_id} as {}", identity.email);
                self.state = EditorState::Clean;
                self.post(NoticeKind::Success, "Content saved.");
                Ok(())
            }
            Err(GatewayError::NotFound) => {
                log::warn!("Page {page_id} disappeared before it could be saved");
                self.state = EditorState::NotFound;
                self.page = None;
                self.post(NoticeKind::Error, "This page no longer exists.");
                Err(EditorError::NotFound)
            }
            Err(GatewayError::PermissionDenied) => {
                log::warn!("Gateway refused save of page {page_id} for {}", identity.email);
                self.state = EditorState::Dirty;
                self.post(NoticeKind::Error, "Your administrator session has ended. Sign in again.");
                Err(EditorError::Unauthorized)
            }
            Err(err) => {
                log::error!("Error saving page {page_id}: {err}");
                self.state = EditorState::Dirty;
                self.post(NoticeKind::Error, "Could not save. Please try again.");
                Err(EditorError::Gateway(err))
            }
        }
    }

    /// Whether leaving now needs confirmation, and of which kind.
    pub fn discard_guard(&self, exit: Exit) -> Option<Confirmation> {
        if !self.is_dirty() {
            return None;
        }
        Some(match exit {
            Exit::Navigate => Confirmation::Prompt(LEAVE_PROMPT),
            Exit::Unload => Confirmation::Native,
        })
    }

    fn post(&mut self, kind: NoticeKind, text: &str) {
        self.notice = Some(Notice {
            kind,
            text: text.to_string(),
            posted_at: Instant::now(),
        });
    }
}
