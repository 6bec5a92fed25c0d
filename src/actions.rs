use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::api::{Ack, ApiClient};
use crate::document::{CommentCard, LikeButton, MediaGallery, MediaItem};
use crate::error::{ActionError, GENERIC_FAILURE};
use crate::notify::{Level, Notification, Notifier, DEFAULT_TTL};

/// Interactive yes/no step in front of destructive requests.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Default, Deserialize)]
struct LikePayload {
    #[serde(default)]
    liked: bool,
    #[serde(default)]
    like_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CommentPayload {
    #[serde(default)]
    comment: Option<NewComment>,
    #[serde(default)]
    comment_count: u64,
}

#[derive(Debug, Deserialize)]
struct NewComment {
    id: u64,
    username: String,
    text: String,
    #[serde(default)]
    time_ago: Option<String>,
    #[serde(default)]
    can_delete: bool,
}

impl From<NewComment> for CommentCard {
    fn from(comment: NewComment) -> Self {
        CommentCard {
            id: comment.id,
            username: comment.username,
            text: comment.text,
            time_ago: comment
                .time_ago
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "just now".to_string()),
            can_delete: comment.can_delete,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CountPayload {
    #[serde(default)]
    comment_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MediaPayload {
    #[serde(default)]
    media: Vec<MediaItem>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaTweetsPayload {
    #[serde(default)]
    tweets: Vec<MediaTweet>,
}

/// A tweet that uses a given media item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaTweet {
    pub id: u64,
    pub text: String,
    pub username: String,
}

const CONFIRM_DELETE_TWEET: &str = "Are you sure you want to delete this tweet?";
const CONFIRM_DELETE_COMMENT: &str = "Are you sure you want to delete this comment?";
const CONFIRM_DELETE_MEDIA: &str =
    "Are you sure you want to delete this media? This will remove it from all associated tweets.";

/// One request per user action. The document changes only after the server
/// confirms; any failure is reported and leaves it as it was.
pub struct ActionClient {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    confirm: Arc<dyn Confirm>,
    ttl: Duration,
}

impl ActionClient {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            api,
            notifier,
            confirm,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn notify(&self, message: impl Into<String>, level: Level) {
        self.notifier
            .notify(Notification::new(message, level).lasting(self.ttl));
    }

    /// Logs and surfaces a failure; declined confirmations stay quiet.
    /// `failure` is shown when the server gave no reason of its own.
    fn report<T>(
        &self,
        action: &str,
        failure: &str,
        result: Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        if let Err(err) = &result {
            match err {
                ActionError::Cancelled => {}
                ActionError::InvalidInput(_) => self.notify(err.user_message(), Level::Warning),
                _ => {
                    error!("{action} failed: {err}");
                    self.notify(err.user_message_or(failure), Level::Error);
                }
            }
        }
        result
    }

    pub async fn toggle_like(&self, tweet_id: u64) -> Result<LikeButton, ActionError> {
        let result = self.request_like(tweet_id).await;
        if let Ok(like) = &result {
            let message = if like.liked { "Tweet liked" } else { "Like removed" };
            self.notify(message, Level::Success);
        }
        self.report("toggle like", GENERIC_FAILURE, result)
    }

    async fn request_like(&self, tweet_id: u64) -> Result<LikeButton, ActionError> {
        let payload: LikePayload = self
            .api
            .post(&format!("/tweet/{tweet_id}/like/"), None)
            .await?
            .into_result("Failed to update like")?;
        let like = LikeButton {
            liked: payload.liked,
            count: payload.like_count,
        };
        self.api.document().lock().await.set_like(tweet_id, like);
        Ok(like)
    }

    pub async fn pin(&self, tweet_id: u64) -> Result<(), ActionError> {
        let result = self
            .request_pin(tweet_id, "pin", "Failed to pin tweet", true)
            .await;
        if result.is_ok() {
            self.notify("Tweet pinned to your profile", Level::Success);
        }
        self.report("pin", "An error occurred while pinning the tweet", result)
    }

    pub async fn unpin(&self, tweet_id: u64) -> Result<(), ActionError> {
        let result = self
            .request_pin(tweet_id, "unpin", "Failed to unpin tweet", false)
            .await;
        if result.is_ok() {
            self.notify("Tweet unpinned from your profile", Level::Success);
        }
        self.report("unpin", "An error occurred while unpinning the tweet", result)
    }

    async fn request_pin(
        &self,
        tweet_id: u64,
        endpoint: &str,
        fallback: &str,
        pinned: bool,
    ) -> Result<(), ActionError> {
        self.api
            .post::<Ack>(&format!("/tweet/{tweet_id}/{endpoint}/"), None)
            .await?
            .into_result(fallback)?;
        self.api.document().lock().await.set_pinned(tweet_id, pinned);
        Ok(())
    }

    pub async fn add_comment(&self, tweet_id: u64, text: &str) -> Result<CommentCard, ActionError> {
        let result = self.request_add_comment(tweet_id, text).await;
        if result.is_ok() {
            self.notify("Comment added successfully!", Level::Success);
        }
        self.report("add comment", GENERIC_FAILURE, result)
    }

    async fn request_add_comment(&self, tweet_id: u64, text: &str) -> Result<CommentCard, ActionError> {
        if text.trim().is_empty() {
            return Err(ActionError::InvalidInput("Please enter a comment"));
        }
        let payload: CommentPayload = self
            .api
            .post(
                &format!("/tweet/{tweet_id}/comment/add/"),
                Some(json!({ "comment_text": text })),
            )
            .await?
            .into_result("Failed to add comment")?;
        let comment: CommentCard = payload
            .comment
            .ok_or_else(|| ActionError::Rejected("Failed to add comment".into()))?
            .into();

        let mut document = self.api.document().lock().await;
        if let Some(comments) = document.comments.as_mut() {
            comments.prepend(comment.clone());
        }
        document.set_comment_count(tweet_id, payload.comment_count);
        Ok(comment)
    }

    pub async fn delete_comment(&self, comment_id: u64, tweet_id: u64) -> Result<(), ActionError> {
        let result = self.request_delete_comment(comment_id, tweet_id).await;
        if result.is_ok() {
            self.notify("Comment deleted successfully!", Level::Success);
        }
        self.report("delete comment", GENERIC_FAILURE, result)
    }

    async fn request_delete_comment(&self, comment_id: u64, tweet_id: u64) -> Result<(), ActionError> {
        if !self.confirm.confirm(CONFIRM_DELETE_COMMENT) {
            return Err(ActionError::Cancelled);
        }
        let payload: CountPayload = self
            .api
            .post(&format!("/comment/delete/{comment_id}/"), None)
            .await?
            .into_result("Failed to delete comment")?;

        let mut document = self.api.document().lock().await;
        if let Some(comments) = document.comments.as_mut() {
            comments.remove(comment_id);
        }
        document.set_comment_count(tweet_id, payload.comment_count);
        Ok(())
    }

    pub async fn delete_tweet(&self, tweet_id: u64) -> Result<(), ActionError> {
        let result = self.request_delete_tweet(tweet_id).await;
        if result.is_ok() {
            self.notify("Tweet deleted successfully!", Level::Success);
        }
        self.report("delete tweet", GENERIC_FAILURE, result)
    }

    async fn request_delete_tweet(&self, tweet_id: u64) -> Result<(), ActionError> {
        if !self.confirm.confirm(CONFIRM_DELETE_TWEET) {
            return Err(ActionError::Cancelled);
        }
        self.api
            .post::<Ack>(&format!("/{tweet_id}/delete"), None)
            .await?
            .into_result("Failed to delete tweet")?;

        self.api.document().lock().await.remove_tweet(tweet_id);
        Ok(())
    }

    /// Fills the media gallery. Failures show in the gallery itself rather than
    /// as a notification.
    pub async fn load_media_gallery(&self) -> Result<usize, ActionError> {
        let result = self
            .api
            .get::<MediaPayload>("/media/user/")
            .await
            .and_then(|envelope| envelope.into_result("Error loading media gallery"))
            .map(|payload| payload.media);

        let mut document = self.api.document().lock().await;
        match result {
            Ok(media) => {
                let count = media.len();
                document.media = Some(if media.is_empty() {
                    MediaGallery::Empty
                } else {
                    MediaGallery::Items(media)
                });
                Ok(count)
            }
            Err(err) => {
                warn!("loading media gallery failed: {err}");
                document.media = Some(MediaGallery::Failed);
                Err(err)
            }
        }
    }

    pub async fn media_tweets(&self, media_id: u64) -> Result<Vec<MediaTweet>, ActionError> {
        let result = self
            .api
            .get::<MediaTweetsPayload>(&format!("/media/{media_id}/tweets/"))
            .await
            .and_then(|envelope| envelope.into_result("Error loading associated tweets"));
        match result {
            Ok(payload) => Ok(payload.tweets),
            Err(err) => {
                warn!("loading tweets for media {media_id} failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn delete_media(&self, media_id: u64) -> Result<(), ActionError> {
        if !self.confirm.confirm(CONFIRM_DELETE_MEDIA) {
            return Err(ActionError::Cancelled);
        }

        let result = self
            .api
            .post::<Ack>(&format!("/media/{media_id}/delete/"), None)
            .await
            .and_then(|envelope| envelope.into_result("Unknown error"));

        match result {
            Ok(_) => {}
            Err(ActionError::Rejected(reason)) => {
                error!("delete media {media_id} rejected: {reason}");
                self.notify(format!("Error deleting media: {reason}"), Level::Error);
                return Err(ActionError::Rejected(reason));
            }
            Err(err) => {
                error!("delete media {media_id} failed: {err}");
                self.notify("Error deleting media", Level::Error);
                return Err(err);
            }
        }

        self.notify("Media deleted successfully", Level::Success);
        if let Err(err) = self.load_media_gallery().await {
            warn!("reloading media gallery after delete failed: {err}");
        }
        Ok(())
    }
}
