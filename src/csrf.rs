//! Cross-site-request-forgery token lookup.
//!
//! The cookie wins; the form field embedded in the page is the fallback.

use scraper::{Html, Selector};

pub const FIELD_NAME: &str = "csrfmiddlewaretoken";

/// Finds `name` in a `Cookie`-style header (`a=1; b=2`) and percent-decodes it.
pub fn token_from_cookies(cookie_header: &str, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    let raw = cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))?;
    if raw.is_empty() {
        return None;
    }
    let value = urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(value)
}

/// Reads the hidden `csrfmiddlewaretoken` input of a rendered page.
pub fn token_from_html(document: &Html) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[name="{FIELD_NAME}"]"#)).ok()?;
    let value = document.select(&selector).next()?.value().attr("value")?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn resolve(cookie_header: Option<&str>, cookie_name: &str, embedded: Option<&str>) -> Option<String> {
    cookie_header
        .and_then(|header| token_from_cookies(header, cookie_name))
        .or_else(|| embedded.map(str::to_string))
}
