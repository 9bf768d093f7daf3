//! View Controller for SmartMark.
//!
//! Holds the signed-in principal and the bookmark snapshot, issues
//! create/delete requests and keeps the snapshot consistent with the backend
//! through two triggers: an explicit reload after each local mutation, and a
//! reload for every event on the principal's change feed.
//!
//! State lives in a `tokio::sync::watch` channel and only changes through
//! [`ViewState::apply`]. Reloads may overlap; each one takes a sequence
//! number and the reducer drops a response older than one already applied,
//! so the last issued reload wins whatever order responses arrive in.
//!
//! A call rejected for an expired or revoked token recovers the session once
//! through the backend and is retried with the renewed tokens. When recovery
//! fails the view drops to unauthenticated.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::backend::{Backend, SubscriptionId};
use crate::types::bookmark::NewBookmark;
use crate::types::errors::{BackendError, ControllerError};
use crate::types::event::ChangeFilter;
use crate::types::session::{OAuthCallback, Session};
use crate::types::settings::AuthSettings;
use crate::types::view::{Message, Outcome, SkipReason, ViewState};

/// A live change feed: the task relaying its events and the backend
/// subscription behind it. Dropping the guard releases both.
struct FeedGuard<B: Backend> {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
    backend: Arc<B>,
}

impl<B: Backend> Drop for FeedGuard<B> {
    fn drop(&mut self) {
        self.task.abort();
        self.backend.unsubscribe(self.subscription);
        debug!(id = self.subscription, "change feed closed");
    }
}

struct Inner<B: Backend> {
    backend: Arc<B>,
    auth: AuthSettings,
    state: watch::Sender<ViewState>,
    issued: AtomicU64,
    feed: Mutex<Option<FeedGuard<B>>>,
    renewing: tokio::sync::Mutex<()>,
}

fn is_token_rejection(err: &ControllerError) -> bool {
    matches!(
        err,
        ControllerError::Backend(BackendError::SessionExpired | BackendError::NotAuthenticated)
    )
}

impl<B: Backend> Inner<B> {
    /// Runs a blocking backend call off the async threads.
    async fn call<T, F>(&self, f: F) -> Result<T, ControllerError>
    where
        T: Send + 'static,
        F: FnOnce(&B) -> Result<T, BackendError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(&*backend))
            .await
            .map_err(|e| ControllerError::TaskFailed(e.to_string()))?
            .map_err(ControllerError::from)
    }

    fn dispatch(&self, msg: Message) -> bool {
        self.state.send_if_modified(|state| state.apply(msg))
    }

    fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    fn feed_slot(&self) -> MutexGuard<'_, Option<FeedGuard<B>>> {
        self.feed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_feed(&self) {
        let guard = self.feed_slot().take();
        drop(guard);
    }

    /// Runs a call on behalf of `session`. If the backend rejects its token,
    /// the session is renewed and the call runs once more.
    async fn call_as<T, F>(
        self: &Arc<Self>,
        session: Session,
        f: F,
    ) -> Result<T, ControllerError>
    where
        T: Send + 'static,
        F: Fn(&B, &Session) -> Result<T, BackendError> + Clone + Send + 'static,
    {
        let first = {
            let f = f.clone();
            let session = session.clone();
            self.call(move |b| f(b, &session)).await
        };
        match first {
            Err(e) if is_token_rejection(&e) => {
                debug!(error = %e, "token rejected, renewing session");
                let renewed = self.renew_session(&session).await?;
                self.call(move |b| f(b, &renewed)).await
            }
            other => other,
        }
    }

    /// Recovers the session after `rejected` stopped being accepted and reopens
    /// the change feed with the new tokens. Renewals are serialized; a caller
    /// that lost the race picks up the winner's session.
    ///
    /// Boxed because the feed task it starts reloads through this same path.
    fn renew_session<'a>(
        self: &'a Arc<Self>,
        rejected: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<Session, ControllerError>> + Send + 'a>> {
        Box::pin(async move {
            let _turn = self.renewing.lock().await;
            if let Some(current) = self.session() {
                if current.user_id == rejected.user_id
                    && current.access_token != rejected.access_token
                {
                    return Ok(current);
                }
            }

            match self.call(|b| b.current_session()).await {
                Ok(Some(session)) if session.user_id == rejected.user_id => {
                    info!(user_id = %session.user_id, "session renewed");
                    self.dispatch(Message::SessionRestored(session.clone()));
                    self.open_feed(&session).await;
                    Ok(session)
                }
                Ok(_) => {
                    warn!(user_id = %rejected.user_id, "session could not be renewed");
                    self.release_feed();
                    self.dispatch(Message::SignedOut);
                    Err(BackendError::SessionExpired.into())
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn load_snapshot(self: &Arc<Self>, user_id: &str) -> Outcome {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(session) = self.session() else {
            return Outcome::Skipped(SkipReason::NoSession);
        };

        let owner = user_id.to_string();
        let loaded = self
            .call_as(session, move |b, s| b.select_bookmarks(s, &owner))
            .await;
        let rows = match loaded {
            Ok(rows) => rows,
            Err(e) => {
                warn!(seq, error = %e, "snapshot load failed");
                return Outcome::Failed;
            }
        };

        let count = rows.len();
        let applied = self.dispatch(Message::SnapshotLoaded {
            seq,
            user_id: user_id.to_string(),
            bookmarks: rows,
        });
        if applied {
            debug!(seq, count, "snapshot applied");
            Outcome::Applied
        } else {
            debug!(seq, "stale snapshot discarded");
            Outcome::Skipped(SkipReason::Stale)
        }
    }

    /// Subscribes to the principal's rows; every event spawns a reload.
    async fn open_feed(self: &Arc<Self>, session: &Session) {
        let filter = ChangeFilter::bookmarks_of(&session.user_id);
        let owned = session.clone();
        let subscription = match self.call(move |b| b.subscribe(&owned, &filter)).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "change feed subscription failed");
                return;
            }
        };

        let id = subscription.id;
        let mut events = subscription.events;
        let weak: Weak<Self> = Arc::downgrade(self);
        let user_id = session.user_id.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                debug!(kind = ?event.kind, "change feed event");
                let user_id = user_id.clone();
                tokio::spawn(async move {
                    inner.load_snapshot(&user_id).await;
                });
            }
        });

        let previous = self.feed_slot().replace(FeedGuard {
            subscription: id,
            task,
            backend: Arc::clone(&self.backend),
        });
        drop(previous);
    }
}

/// The view controller. Cloning yields another handle to the same view.
pub struct ViewController<B: Backend> {
    inner: Arc<Inner<B>>,
}

impl<B: Backend> Clone for ViewController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> ViewController<B> {
    /// Creates an unauthenticated view over `backend`. Nothing is fetched until
    /// [`initialize`](Self::initialize) runs.
    pub fn new(backend: Arc<B>, auth: AuthSettings) -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                auth,
                state,
                issued: AtomicU64::new(0),
                feed: Mutex::new(None),
                renewing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    /// A copy of the current view state.
    pub fn state(&self) -> ViewState {
        self.inner.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ViewState> {
        self.inner.state.subscribe()
    }

    /// Whether a change feed subscription is currently held.
    pub fn has_live_feed(&self) -> bool {
        self.inner.feed_slot().is_some()
    }

    /// Recovers an existing session. When one exists, opens the change feed
    /// for the principal's rows and loads the snapshot; otherwise leaves the
    /// view unauthenticated. A previous feed is released first.
    pub async fn initialize(&self) -> Outcome {
        self.inner.release_feed();

        let session = match self.inner.call(|b| b.current_session()).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!("no existing session");
                self.inner.dispatch(Message::SignedOut);
                return Outcome::Skipped(SkipReason::NoSession);
            }
            Err(e) => {
                warn!(error = %e, "session recovery failed");
                return Outcome::Failed;
            }
        };

        info!(user_id = %session.user_id, "session recovered");
        self.inner.dispatch(Message::SessionRestored(session.clone()));
        self.inner.open_feed(&session).await;
        self.inner.load_snapshot(&session.user_id).await;
        Outcome::Applied
    }

    /// Returns the URL that starts the OAuth redirect flow. The view does not
    /// change until the redirect comes back through
    /// [`complete_sign_in`](Self::complete_sign_in).
    pub async fn sign_in(&self) -> Option<String> {
        let provider = self.inner.auth.provider.clone();
        let redirect_to = self.inner.auth.redirect_to.clone();
        match self.inner.call(move |b| b.authorize_url(&provider, &redirect_to)).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "could not build sign-in url");
                None
            }
        }
    }

    /// Hands the redirect tokens to the backend, then re-runs initialization.
    pub async fn complete_sign_in(&self, callback: OAuthCallback) -> Outcome {
        if let Err(e) = self.inner.call(move |b| b.exchange_callback(&callback)).await {
            warn!(error = %e, "sign-in callback rejected");
            return Outcome::Failed;
        }
        self.initialize().await
    }

    /// Ends the session with the backend and resets the view to unauthenticated.
    pub async fn sign_out(&self) -> Outcome {
        if let Err(e) = self.inner.call(|b| b.sign_out()).await {
            warn!(error = %e, "backend sign-out failed");
        }
        self.inner.release_feed();
        self.inner.dispatch(Message::SignedOut);
        info!("signed out");
        Outcome::Applied
    }

    /// Fetches every bookmark owned by `principal_id` and replaces the collection.
    pub async fn load_snapshot(&self, principal_id: &str) -> Outcome {
        self.inner.load_snapshot(principal_id).await
    }

    /// Reloads the snapshot of the signed-in principal.
    pub async fn refresh(&self) -> Outcome {
        match self.inner.session() {
            Some(session) => self.inner.load_snapshot(&session.user_id).await,
            None => Outcome::Skipped(SkipReason::NoSession),
        }
    }

    /// Submits a new bookmark for the signed-in principal, then reloads.
    ///
    /// Does nothing when either field is empty, nobody is signed in, or a
    /// previous submission is still in flight.
    pub async fn create_bookmark(&self, title: &str, url: &str) -> Outcome {
        if title.is_empty() || url.is_empty() {
            return Outcome::Skipped(SkipReason::EmptyField);
        }
        let Some(session) = self.inner.session() else {
            return Outcome::Skipped(SkipReason::NoSession);
        };
        if !self.inner.dispatch(Message::SubmitStarted) {
            return Outcome::Skipped(SkipReason::InProgress);
        }

        let user_id = session.user_id.clone();
        let row = NewBookmark::new(&user_id, title, url);
        let result = self
            .inner
            .call_as(session, move |b, s| b.insert_bookmark(s, &row))
            .await;
        self.inner.dispatch(Message::SubmitFinished);

        if let Err(e) = &result {
            warn!(error = %e, "create bookmark failed");
        }
        self.inner.load_snapshot(&user_id).await;

        if result.is_ok() {
            Outcome::Applied
        } else {
            Outcome::Failed
        }
    }

    /// Requests deletion of a bookmark by id, then reloads. Ownership is
    /// enforced by the backend.
    pub async fn delete_bookmark(&self, id: &str) -> Outcome {
        let Some(session) = self.inner.session() else {
            return Outcome::Skipped(SkipReason::NoSession);
        };

        let user_id = session.user_id.clone();
        let target = id.to_string();
        let result = self
            .inner
            .call_as(session, move |b, s| b.delete_bookmark(s, &target))
            .await;
        if let Err(e) = &result {
            warn!(error = %e, id, "delete bookmark failed");
        }
        self.inner.load_snapshot(&user_id).await;

        if result.is_ok() {
            Outcome::Applied
        } else {
            Outcome::Failed
        }
    }

    /// Tears the view down: releases the change feed. State is kept as is.
    pub fn shutdown(&self) {
        self.inner.release_feed();
    }
}
