//! Pulls typed fragments out of server-rendered HTML.
//!
//! Selector contract: `.tweets-grid` holds `.tweet-card[data-tweet-id]`,
//! `.tweet-detail[data-tweet-id]` wraps a detail page, `.comments-list` holds
//! `.comment-card[data-comment-id]`, and the first `.like-count` is the
//! detail page's like counter.

use scraper::{ElementRef, Html, Selector};

use crate::csrf;
use crate::document::{
    CommentCard, CommentList, Composer, Document, Fragment, FragmentKind, LikeButton,
    MediaGallery, PinButton, ToggleControl, TweetCard, TweetDetail, TweetGrid,
};

/// Builds the document for a freshly loaded page.
pub fn document(path: &str, html: &str) -> Document {
    let page = Html::parse_document(html);
    let root = page.root_element();

    Document {
        path: path.to_string(),
        csrf_field: csrf::token_from_html(&page),
        tweets: first(root, ".tweets-grid").map(tweet_grid),
        detail: first(root, ".tweet-detail").and_then(tweet_detail),
        comments: first(root, ".comments-list").map(comment_list),
        media: first(root, "#media-gallery-container").map(|_| MediaGallery::Loading),
        composer: composer(root),
        theme: None,
        theme_toggle: first(root, "#themeToggle").map(|_| ToggleControl::default()),
    }
}

/// Extracts the requested fragments from a polled page. Regions the page does
/// not contain are simply left out.
pub fn fragments(html: &str, kinds: &[FragmentKind]) -> Vec<Fragment> {
    let page = Html::parse_document(html);
    let root = page.root_element();
    kinds
        .iter()
        .filter_map(|kind| fragment(root, *kind))
        .collect()
}

fn fragment(root: ElementRef<'_>, kind: FragmentKind) -> Option<Fragment> {
    let region = first(root, kind.selector())?;
    match kind {
        FragmentKind::TweetsGrid => Some(Fragment::TweetsGrid(tweet_grid(region))),
        FragmentKind::CommentsList => Some(Fragment::CommentsList(comment_list(region))),
        FragmentKind::LikeCount => number(&text(region)).map(Fragment::LikeCount),
    }
}

fn tweet_grid(grid: ElementRef<'_>) -> TweetGrid {
    let cards = all(grid, ".tweet-card")
        .into_iter()
        .filter_map(tweet_card)
        .collect();
    TweetGrid::from_cards(cards)
}

fn tweet_card(card: ElementRef<'_>) -> Option<TweetCard> {
    let id = id_attr(card, "data-tweet-id")?;
    Some(TweetCard {
        id,
        author: first_text(card, ".tweet-author").unwrap_or_default(),
        text: first_text(card, ".tweet-text").unwrap_or_default(),
        like: like_button(card),
        pin: pin_button(card),
        comment_count: first_text(card, ".comment-count")
            .and_then(|t| number(&t))
            .unwrap_or(0),
        can_delete: first(card, ".tweet-delete").is_some(),
    })
}

fn tweet_detail(detail: ElementRef<'_>) -> Option<TweetDetail> {
    Some(TweetDetail {
        tweet_id: id_attr(detail, "data-tweet-id")?,
        like: like_button(detail),
        pin: pin_button(detail),
        comment_count: first_text(detail, ".comment-count")
            .and_then(|t| number(&t))
            .unwrap_or(0),
        can_delete: first(detail, ".tweet-delete").is_some(),
    })
}

fn like_button(scope: ElementRef<'_>) -> LikeButton {
    let Some(button) = first(scope, ".like-btn") else {
        return LikeButton::default();
    };
    LikeButton {
        liked: has_class(button, "liked"),
        count: first_text(button, ".like-count")
            .and_then(|t| number(&t))
            .unwrap_or(0),
    }
}

fn pin_button(scope: ElementRef<'_>) -> Option<PinButton> {
    if first(scope, ".unpin-btn").is_some() {
        Some(PinButton { pinned: true })
    } else if first(scope, ".pin-btn").is_some() {
        Some(PinButton { pinned: false })
    } else {
        None
    }
}

fn comment_list(list: ElementRef<'_>) -> CommentList {
    let items = all(list, ".comment-card")
        .into_iter()
        .filter_map(|card| {
            Some(CommentCard {
                id: id_attr(card, "data-comment-id")?,
                username: first_text(card, ".comment-username").unwrap_or_default(),
                text: first_text(card, ".comment-text").unwrap_or_default(),
                time_ago: first_text(card, ".comment-time").unwrap_or_default(),
                can_delete: first(card, ".comment-delete").is_some(),
            })
        })
        .collect();
    CommentList::from_items(items)
}

fn composer(root: ElementRef<'_>) -> Option<Composer> {
    let form = first(root, r#"form[method="post"]"#)?;
    let textarea = first(form, r#"textarea[name="text"]"#)?;
    let media_ids = all(root, r#"input[name="media_ids[]"]"#)
        .into_iter()
        .filter_map(|input| input.value().attr("value").and_then(number))
        .collect();
    Some(Composer {
        text: textarea.text().collect(),
        media_ids,
        restore_prompt: None,
    })
}

fn first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    first(scope, css).map(text)
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn id_attr(element: ElementRef<'_>, name: &str) -> Option<u64> {
    element.value().attr(name).and_then(number)
}

fn number(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}
