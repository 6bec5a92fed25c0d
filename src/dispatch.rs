use std::sync::Arc;

use tracing::debug;

use crate::actions::ActionClient;
use crate::document::SharedDocument;
use crate::error::ActionError;

/// A user interaction, identified by what it targets rather than by the
/// element that received it.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LikeClicked { tweet_id: u64 },
    PinClicked { tweet_id: u64 },
    DeleteTweetClicked { tweet_id: u64 },
    CommentSubmitted { tweet_id: u64, text: String },
    DeleteCommentClicked { comment_id: u64, tweet_id: u64 },
    DeleteMediaClicked { media_id: u64 },
}

#[derive(Debug)]
pub enum Dispatch {
    /// The target is not on the page (any more).
    Ignored,
    Completed,
    Failed(ActionError),
}

impl Dispatch {
    pub fn is_completed(&self) -> bool {
        matches!(self, Dispatch::Completed)
    }
}

/// Single handler bound at the page level. Targets are looked up in the live
/// document on every event, so replacing a fragment never leaves stale
/// handlers behind.
#[derive(Clone)]
pub struct Dispatcher {
    document: SharedDocument,
    actions: Arc<ActionClient>,
}

impl Dispatcher {
    pub fn new(document: SharedDocument, actions: Arc<ActionClient>) -> Self {
        Self { document, actions }
    }

    pub async fn dispatch(&self, event: UiEvent) -> Dispatch {
        let target = {
            let document = self.document.lock().await;
            match &event {
                UiEvent::LikeClicked { tweet_id } => document
                    .like_button(*tweet_id)
                    .map(|_| Target::Like(*tweet_id)),
                UiEvent::PinClicked { tweet_id } => document
                    .pin_button(*tweet_id)
                    .map(|pin| Target::Pin(*tweet_id, !pin.pinned)),
                UiEvent::DeleteTweetClicked { tweet_id } => document
                    .can_delete_tweet(*tweet_id)
                    .then_some(Target::DeleteTweet(*tweet_id)),
                UiEvent::CommentSubmitted { tweet_id, text } => document
                    .has_tweet(*tweet_id)
                    .then(|| Target::Comment(*tweet_id, text.clone())),
                UiEvent::DeleteCommentClicked {
                    comment_id,
                    tweet_id,
                } => document
                    .has_comment(*comment_id)
                    .then_some(Target::DeleteComment(*comment_id, *tweet_id)),
                UiEvent::DeleteMediaClicked { media_id } => document
                    .has_media(*media_id)
                    .then_some(Target::DeleteMedia(*media_id)),
            }
        };

        let Some(target) = target else {
            debug!(?event, "event target not on page");
            return Dispatch::Ignored;
        };

        let result = match target {
            Target::Like(tweet_id) => self.actions.toggle_like(tweet_id).await.map(drop),
            Target::Pin(tweet_id, true) => self.actions.pin(tweet_id).await,
            Target::Pin(tweet_id, false) => self.actions.unpin(tweet_id).await,
            Target::DeleteTweet(tweet_id) => self.actions.delete_tweet(tweet_id).await,
            Target::Comment(tweet_id, text) => {
                self.actions.add_comment(tweet_id, &text).await.map(drop)
            }
            Target::DeleteComment(comment_id, tweet_id) => {
                self.actions.delete_comment(comment_id, tweet_id).await
            }
            Target::DeleteMedia(media_id) => self.actions.delete_media(media_id).await,
        };

        match result {
            Ok(()) => Dispatch::Completed,
            Err(err) => Dispatch::Failed(err),
        }
    }
}

enum Target {
    Like(u64),
    /// Tweet id and whether the click pins (true) or unpins.
    Pin(u64, bool),
    DeleteTweet(u64),
    Comment(u64, String),
    DeleteComment(u64, u64),
    DeleteMedia(u64),
}
