//! Typed view model of the page the user is looking at.
//!
//! Everything the background refresh and the actions touch lives here. A region
//! the page does not render is `None`; mutations aimed at an absent region are
//! no-ops.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::theme::Theme;

pub type SharedDocument = Arc<Mutex<Document>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub path: String,
    pub csrf_field: Option<String>,
    pub tweets: Option<TweetGrid>,
    pub detail: Option<TweetDetail>,
    pub comments: Option<CommentList>,
    pub media: Option<MediaGallery>,
    pub composer: Option<Composer>,
    pub theme: Option<Theme>,
    pub theme_toggle: Option<ToggleControl>,
}

impl Document {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn fragment(&self, kind: FragmentKind) -> Option<Fragment> {
        match kind {
            FragmentKind::TweetsGrid => self.tweets.clone().map(Fragment::TweetsGrid),
            FragmentKind::CommentsList => self.comments.clone().map(Fragment::CommentsList),
            FragmentKind::LikeCount => self
                .detail
                .as_ref()
                .map(|detail| Fragment::LikeCount(detail.like.count)),
        }
    }

    /// Swaps in a fetched fragment. Returns false when the page has no such region.
    pub fn replace_fragment(&mut self, fragment: Fragment) -> bool {
        match fragment {
            Fragment::TweetsGrid(grid) => match self.tweets.as_mut() {
                Some(live) => {
                    *live = grid;
                    true
                }
                None => false,
            },
            Fragment::CommentsList(list) => match self.comments.as_mut() {
                Some(live) => {
                    *live = list;
                    true
                }
                None => false,
            },
            Fragment::LikeCount(count) => match self.detail.as_mut() {
                Some(detail) => {
                    detail.like.count = count;
                    true
                }
                None => false,
            },
        }
    }

    pub fn has_tweet(&self, tweet_id: u64) -> bool {
        self.card(tweet_id).is_some() || self.detail_for(tweet_id).is_some()
    }

    pub fn card(&self, tweet_id: u64) -> Option<&TweetCard> {
        self.tweets.as_ref()?.card(tweet_id)
    }

    fn detail_for(&self, tweet_id: u64) -> Option<&TweetDetail> {
        self.detail.as_ref().filter(|detail| detail.tweet_id == tweet_id)
    }

    pub fn has_comment(&self, comment_id: u64) -> bool {
        self.comments
            .as_ref()
            .is_some_and(|comments| comments.get(comment_id).is_some())
    }

    pub fn has_media(&self, media_id: u64) -> bool {
        matches!(&self.media, Some(MediaGallery::Items(items)) if items.iter().any(|m| m.id == media_id))
    }

    /// Current like button state for a tweet, wherever it is rendered.
    pub fn like_button(&self, tweet_id: u64) -> Option<LikeButton> {
        self.card(tweet_id)
            .map(|card| card.like)
            .or_else(|| self.detail_for(tweet_id).map(|detail| detail.like))
    }

    pub fn pin_button(&self, tweet_id: u64) -> Option<PinButton> {
        self.card(tweet_id)
            .and_then(|card| card.pin)
            .or_else(|| self.detail_for(tweet_id).and_then(|detail| detail.pin))
    }

    pub fn set_like(&mut self, tweet_id: u64, like: LikeButton) {
        if let Some(card) = self.tweets.as_mut().and_then(|grid| grid.card_mut(tweet_id)) {
            card.like = like;
        }
        if let Some(detail) = self.detail.as_mut().filter(|d| d.tweet_id == tweet_id) {
            detail.like = like;
        }
    }

    pub fn set_pinned(&mut self, tweet_id: u64, pinned: bool) {
        if let Some(card) = self.tweets.as_mut().and_then(|grid| grid.card_mut(tweet_id)) {
            if let Some(pin) = card.pin.as_mut() {
                pin.pinned = pinned;
            }
        }
        if let Some(detail) = self.detail.as_mut().filter(|d| d.tweet_id == tweet_id) {
            if let Some(pin) = detail.pin.as_mut() {
                pin.pinned = pinned;
            }
        }
    }

    /// Whether the page offers a delete control for the tweet.
    pub fn can_delete_tweet(&self, tweet_id: u64) -> bool {
        self.card(tweet_id).is_some_and(|card| card.can_delete)
            || self.detail_for(tweet_id).is_some_and(|detail| detail.can_delete)
    }

    /// Takes a deleted tweet off the page, as a card and as the detail view.
    pub fn remove_tweet(&mut self, tweet_id: u64) {
        if let Some(grid) = self.tweets.as_mut() {
            grid.remove(tweet_id);
        }
        if self.detail_for(tweet_id).is_some() {
            self.detail = None;
        }
    }

    pub fn set_comment_count(&mut self, tweet_id: u64, count: u64) {
        if let Some(card) = self.tweets.as_mut().and_then(|grid| grid.card_mut(tweet_id)) {
            card.comment_count = count;
        }
        if let Some(detail) = self.detail.as_mut().filter(|d| d.tweet_id == tweet_id) {
            detail.comment_count = count;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    TweetsGrid,
    CommentsList,
    LikeCount,
}

impl FragmentKind {
    pub fn selector(&self) -> &'static str {
        match self {
            FragmentKind::TweetsGrid => ".tweets-grid",
            FragmentKind::CommentsList => ".comments-list",
            FragmentKind::LikeCount => ".like-count",
        }
    }
}

/// The comparable content of one page region.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    TweetsGrid(TweetGrid),
    CommentsList(CommentList),
    LikeCount(u64),
}

impl Fragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            Fragment::TweetsGrid(_) => FragmentKind::TweetsGrid,
            Fragment::CommentsList(_) => FragmentKind::CommentsList,
            Fragment::LikeCount(_) => FragmentKind::LikeCount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TweetGrid {
    Cards(Vec<TweetCard>),
    /// "No tweets yet" placeholder.
    Empty,
}

impl TweetGrid {
    pub fn from_cards(cards: Vec<TweetCard>) -> Self {
        if cards.is_empty() {
            TweetGrid::Empty
        } else {
            TweetGrid::Cards(cards)
        }
    }

    pub fn cards(&self) -> &[TweetCard] {
        match self {
            TweetGrid::Cards(cards) => cards,
            TweetGrid::Empty => &[],
        }
    }

    pub fn card(&self, tweet_id: u64) -> Option<&TweetCard> {
        self.cards().iter().find(|card| card.id == tweet_id)
    }

    pub fn card_mut(&mut self, tweet_id: u64) -> Option<&mut TweetCard> {
        match self {
            TweetGrid::Cards(cards) => cards.iter_mut().find(|card| card.id == tweet_id),
            TweetGrid::Empty => None,
        }
    }

    /// Drops a card; the grid turns into the placeholder once the last one goes.
    pub fn remove(&mut self, tweet_id: u64) -> bool {
        let TweetGrid::Cards(cards) = self else {
            return false;
        };
        let before = cards.len();
        cards.retain(|card| card.id != tweet_id);
        let removed = cards.len() != before;
        if cards.is_empty() {
            *self = TweetGrid::Empty;
        }
        removed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TweetCard {
    pub id: u64,
    pub author: String,
    pub text: String,
    pub like: LikeButton,
    pub pin: Option<PinButton>,
    pub comment_count: u64,
    pub can_delete: bool,
}

/// Mirror of the server's like state for one tweet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeButton {
    pub liked: bool,
    pub count: u64,
}

impl LikeButton {
    pub fn icon(&self) -> &'static str {
        if self.liked {
            "bi-heart-fill"
        } else {
            "bi-heart"
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinButton {
    pub pinned: bool,
}

impl PinButton {
    pub fn class(&self) -> &'static str {
        if self.pinned {
            "unpin-btn"
        } else {
            "pin-btn"
        }
    }

    pub fn label(&self) -> &'static str {
        if self.pinned {
            "Unpin"
        } else {
            "Pin"
        }
    }

    pub fn title(&self) -> &'static str {
        if self.pinned {
            "Unpin from profile"
        } else {
            "Pin to profile"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TweetDetail {
    pub tweet_id: u64,
    pub like: LikeButton,
    pub pin: Option<PinButton>,
    pub comment_count: u64,
    pub can_delete: bool,
}

impl TweetDetail {
    pub fn comments_header(&self) -> String {
        format!("Comments ({})", self.comment_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentList {
    /// Most recent first.
    Items(Vec<CommentCard>),
    /// "No comments yet" placeholder.
    Empty,
}

impl CommentList {
    pub fn from_items(items: Vec<CommentCard>) -> Self {
        if items.is_empty() {
            CommentList::Empty
        } else {
            CommentList::Items(items)
        }
    }

    pub fn items(&self) -> &[CommentCard] {
        match self {
            CommentList::Items(items) => items,
            CommentList::Empty => &[],
        }
    }

    pub fn get(&self, comment_id: u64) -> Option<&CommentCard> {
        self.items().iter().find(|comment| comment.id == comment_id)
    }

    pub fn prepend(&mut self, comment: CommentCard) {
        match self {
            CommentList::Items(items) => items.insert(0, comment),
            CommentList::Empty => *self = CommentList::Items(vec![comment]),
        }
    }

    pub fn remove(&mut self, comment_id: u64) -> bool {
        let CommentList::Items(items) = self else {
            return false;
        };
        let before = items.len();
        items.retain(|comment| comment.id != comment_id);
        let removed = items.len() != before;
        if items.is_empty() {
            *self = CommentList::Empty;
        }
        removed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentCard {
    pub id: u64,
    pub username: String,
    pub text: String,
    pub time_ago: String,
    pub can_delete: bool,
}

impl CommentCard {
    pub fn avatar_initial(&self) -> Option<char> {
        self.username.chars().next().map(|c| c.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaGallery {
    Loading,
    Items(Vec<MediaItem>),
    Empty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MediaItem {
    pub id: u64,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// The tweet form's textarea plus whatever the draft coordinator shows above it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composer {
    pub text: String,
    pub media_ids: Vec<u64>,
    pub restore_prompt: Option<RestorePrompt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestorePrompt {
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToggleControl {
    pub icon: String,
    pub title: String,
}
