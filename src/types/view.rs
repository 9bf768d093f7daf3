use serde::Serialize;

use super::bookmark::Bookmark;
use super::session::Session;

/// Everything the view shows, owned by the view controller.
///
/// `bookmarks` is always a full snapshot of the current principal's rows as
/// last fetched from the backend. It is replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub session: Option<Session>,
    pub bookmarks: Vec<Bookmark>,
    /// Set while a create request is in flight.
    pub submitting: bool,
    /// Sequence number of the last snapshot written into `bookmarks`.
    pub applied_snapshot: u64,
}

/// State transitions. Every change to [`ViewState`] goes through [`ViewState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SessionRestored(Session),
    SignedOut,
    SnapshotLoaded {
        seq: u64,
        user_id: String,
        bookmarks: Vec<Bookmark>,
    },
    SubmitStarted,
    SubmitFinished,
}

impl ViewState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the signed-in principal, if any.
    pub fn principal_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Applies a message and reports whether the state changed.
    ///
    /// A snapshot is dropped when it belongs to a principal that is no longer
    /// signed in, or when a snapshot with a higher sequence number has
    /// already been applied.
    pub fn apply(&mut self, msg: Message) -> bool {
        match msg {
            Message::SessionRestored(session) => {
                if self.session.as_ref() == Some(&session) {
                    return false;
                }
                if self.principal_id() != Some(session.user_id.as_str()) {
                    self.bookmarks.clear();
                }
                self.session = Some(session);
                true
            }
            Message::SignedOut => {
                let cleared = ViewState {
                    applied_snapshot: self.applied_snapshot,
                    ..ViewState::default()
                };
                if *self == cleared {
                    return false;
                }
                *self = cleared;
                true
            }
            Message::SnapshotLoaded {
                seq,
                user_id,
                bookmarks,
            } => {
                if self.principal_id() != Some(user_id.as_str()) || seq <= self.applied_snapshot {
                    return false;
                }
                self.applied_snapshot = seq;
                self.bookmarks = bookmarks;
                true
            }
            Message::SubmitStarted => {
                if self.submitting {
                    return false;
                }
                self.submitting = true;
                true
            }
            Message::SubmitFinished => std::mem::replace(&mut self.submitting, false),
        }
    }
}

/// Why an operation did nothing.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyField,
    NoSession,
    InProgress,
    /// A newer snapshot was already applied, or the principal changed.
    Stale,
}

/// Result of a view controller operation. Backend failures are logged and
/// reported as `Failed`; they are never raised to the caller.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
    Failed,
}
