//! Optimistic interaction commands against a local projection.
//!
//! A caller that keeps its own copy of the feed applies a like or a
//! comment immediately, then settles the command once the ledger
//! answers. For likes the feed keeps, per post, the last state the
//! ledger confirmed plus the toggles still in flight; the view is always
//! that base with the pending toggles replayed on top. A confirmation
//! moves the base forward, a failure drops its toggle, so any mix of
//! overlapping failures ends back at the confirmed state.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::models::{Comment, PostId, UserId};
use crate::ledger::{Ledger, LedgerError, LikeState};
use crate::projection::PostView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command {0}")]
    Unknown(CommandId),

    #[error("Command {0} already settled")]
    AlreadySettled(CommandId),

    #[error("Post {0} is not in this feed")]
    UnknownPost(PostId),

    /// The feed was closed; late results are dropped.
    #[error("Feed is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Like,
    Comment,
}

#[derive(Debug)]
struct Command {
    post_id: PostId,
    kind: Kind,
    generation: u64,
}

/// Like toggles in flight for one post, oldest first.
#[derive(Debug)]
struct PendingLikes {
    /// Last state the ledger confirmed, or the view before the first toggle.
    base: LikeState,
    commands: Vec<CommandId>,
}

impl PendingLikes {
    fn projected(&self) -> LikeState {
        self.commands.iter().fold(self.base, |state, _| flip(state))
    }
}

/// One toggle. A count already at zero stays there.
fn flip(state: LikeState) -> LikeState {
    if state.liked {
        LikeState {
            liked: false,
            count: state.count.saturating_sub(1),
        }
    } else {
        LikeState {
            liked: true,
            count: state.count.saturating_add(1),
        }
    }
}

/// A caller-side copy of projected posts plus the commands in flight.
///
/// Settled commands are forgotten; only pending ones are kept.
#[derive(Debug, Default)]
pub struct LocalFeed {
    views: Vec<PostView>,
    commands: HashMap<CommandId, Command>,
    likes: HashMap<PostId, PendingLikes>,
    next_id: u64,
    /// Bumped on every refresh; older commands no longer touch the views.
    generation: u64,
    closed: bool,
}

impl LocalFeed {
    pub fn new(views: Vec<PostView>) -> Self {
        Self {
            views,
            ..Self::default()
        }
    }

    pub fn views(&self) -> &[PostView] {
        &self.views
    }

    pub fn get(&self, post: &PostId) -> Option<&PostView> {
        self.views.iter().find(|v| &v.id == post)
    }

    /// `Pending` while the command is in flight. Settled commands are not
    /// kept; their final state is what the settling call returned.
    pub fn state(&self, id: CommandId) -> Option<CommandState> {
        self.commands.get(&id).map(|_| CommandState::Pending)
    }

    /// Number of commands still waiting for the ledger.
    pub fn pending(&self) -> usize {
        self.commands.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop accepting commands and settlements.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Replace the views with a fresh projection. Commands still pending
    /// no longer write to the view when they settle.
    pub fn refresh(&mut self, views: Vec<PostView>) {
        self.views = views;
        self.likes.clear();
        self.generation += 1;
    }

    fn view_mut(&mut self, post: &PostId) -> Result<&mut PostView, CommandError> {
        self.views
            .iter_mut()
            .find(|v| &v.id == post)
            .ok_or_else(|| CommandError::UnknownPost(post.clone()))
    }

    fn write_like(&mut self, post: &PostId, state: LikeState) {
        if let Ok(view) = self.view_mut(post) {
            view.liked_by_current_user = state.liked;
            view.like_count = state.count;
        }
    }

    /// Recompute a post's view from its pending likes, dropping the entry
    /// once nothing is in flight.
    fn replay_likes(&mut self, post: &PostId) {
        let Some(pending) = self.likes.get(post) else {
            return;
        };
        let state = pending.projected();
        if pending.commands.is_empty() {
            self.likes.remove(post);
        }
        self.write_like(post, state);
    }

    fn register(&mut self, post_id: PostId, kind: Kind) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        self.commands.insert(
            id,
            Command {
                post_id,
                kind,
                generation: self.generation,
            },
        );
        id
    }

    /// Flip the like locally, adjusting the count by one.
    pub fn begin_toggle_like(&mut self, post: &PostId) -> Result<CommandId, CommandError> {
        if self.closed {
            return Err(CommandError::Closed);
        }
        let view = self.view_mut(post)?;
        let current = LikeState {
            liked: view.liked_by_current_user,
            count: view.like_count,
        };

        let id = self.register(post.clone(), Kind::Like);
        self.likes
            .entry(post.clone())
            .or_insert(PendingLikes {
                base: current,
                commands: Vec::new(),
            })
            .commands
            .push(id);
        self.replay_likes(post);
        Ok(id)
    }

    /// Count the comment locally before the ledger accepts it.
    pub fn begin_add_comment(&mut self, post: &PostId) -> Result<CommandId, CommandError> {
        if self.closed {
            return Err(CommandError::Closed);
        }
        let view = self.view_mut(post)?;
        view.comment_count = view.comment_count.saturating_add(1);

        Ok(self.register(post.clone(), Kind::Comment))
    }

    /// Remove a pending command so it can be settled.
    fn take_pending(&mut self, id: CommandId) -> Result<Command, CommandError> {
        if self.closed {
            return Err(CommandError::Closed);
        }
        match self.commands.remove(&id) {
            Some(command) => Ok(command),
            // Ids are handed out in order, so a missing lower id was settled
            None if id.0 < self.next_id => Err(CommandError::AlreadySettled(id)),
            None => Err(CommandError::Unknown(id)),
        }
    }

    /// Settle a like toggle as accepted. Toggles issued before it are
    /// covered by the new base and stop affecting the view.
    fn accept_like(&mut self, id: CommandId, post: &PostId, server: Option<LikeState>) {
        let Some(pending) = self.likes.get_mut(post) else {
            return;
        };
        let Some(pos) = pending.commands.iter().position(|c| *c == id) else {
            return;
        };
        let accepted: Vec<CommandId> = pending.commands.drain(..=pos).collect();
        pending.base = match server {
            Some(state) => state,
            None => accepted.iter().fold(pending.base, |state, _| flip(state)),
        };
        self.replay_likes(post);
    }

    /// Settle a like command with the ledger's authoritative state.
    pub fn confirm_like(
        &mut self,
        id: CommandId,
        server: LikeState,
    ) -> Result<CommandState, CommandError> {
        let command = self.take_pending(id)?;
        if command.kind == Kind::Like {
            self.accept_like(id, &command.post_id, Some(server));
        }
        Ok(CommandState::Confirmed)
    }

    /// Settle a command without new ledger state; the optimistic change
    /// stands.
    pub fn confirm(&mut self, id: CommandId) -> Result<CommandState, CommandError> {
        let command = self.take_pending(id)?;
        if command.kind == Kind::Like {
            self.accept_like(id, &command.post_id, None);
        }
        Ok(CommandState::Confirmed)
    }

    /// Roll the optimistic change back.
    pub fn fail(&mut self, id: CommandId) -> Result<CommandState, CommandError> {
        let command = self.take_pending(id)?;
        let post = &command.post_id;
        match command.kind {
            Kind::Like => {
                if let Some(pending) = self.likes.get_mut(post) {
                    pending.commands.retain(|c| *c != id);
                }
                self.replay_likes(post);
            }
            // Comments add up independently, so any of them can be undone
            Kind::Comment if command.generation == self.generation => {
                if let Ok(view) = self.view_mut(post) {
                    view.comment_count = view.comment_count.saturating_sub(1);
                }
            }
            Kind::Comment => {}
        }
        tracing::debug!("{} on post {} rolled back", id, post);
        Ok(CommandState::Failed)
    }

    /// Overwrite a post's like state with values re-read from the ledger.
    /// Toggles still in flight are replayed on top.
    pub fn reconcile_like(&mut self, post: &PostId, state: LikeState) -> Result<(), CommandError> {
        if self.closed {
            return Err(CommandError::Closed);
        }
        match self.likes.get_mut(post) {
            Some(pending) => {
                pending.base = state;
                self.replay_likes(post);
            }
            None => self.write_like(post, state),
        }
        Ok(())
    }
}

/// Drive a like toggle end to end: apply locally, ask the ledger, settle.
///
/// The feed lock is never held across a ledger call, so the feed can be
/// closed while the call is in flight; the late result is then dropped.
/// A failed call may still have committed, so the post's like state is
/// re-read from the ledger afterwards.
pub async fn run_toggle_like(
    feed: &Arc<Mutex<LocalFeed>>,
    ledger: &dyn Ledger,
    user: &UserId,
    post: &PostId,
) -> Result<CommandState, CommandError> {
    let id = feed.lock().await.begin_toggle_like(post)?;

    let err = match ledger.toggle_like(user, post).await {
        Ok(state) => return feed.lock().await.confirm_like(id, state),
        Err(e) => e,
    };

    tracing::warn!("Like toggle on {} failed: {}", post, err);
    let settled = feed.lock().await.fail(id)?;

    match futures::try_join!(ledger.is_liked(user, post), ledger.count_likes(post)) {
        Ok((liked, count)) => feed
            .lock()
            .await
            .reconcile_like(post, LikeState { liked, count })?,
        Err(e) => tracing::warn!("Could not re-read likes on {}: {}", post, e),
    }
    Ok(settled)
}

/// Same as [`run_toggle_like`] for comments.
pub async fn run_add_comment(
    feed: &Arc<Mutex<LocalFeed>>,
    ledger: &dyn Ledger,
    user: &UserId,
    post: &PostId,
    text: &str,
) -> Result<Result<Comment, LedgerError>, CommandError> {
    let id = feed.lock().await.begin_add_comment(post)?;

    let outcome = ledger.add_comment(user, post, text).await;

    let mut feed = feed.lock().await;
    match &outcome {
        Ok(_) => feed.confirm(id)?,
        Err(_) => feed.fail(id)?,
    };
    Ok(outcome)
}
