//! Input rules shared by the thread, reply and user services.
//!
//! Lengths are counted in characters after trimming.

use std::ops::RangeInclusive;

use sf_core::error::{AppError, Result};

pub const TITLE_CHARS: RangeInclusive<usize> = 5..=200;
pub const THREAD_CONTENT_CHARS: RangeInclusive<usize> = 10..=10_000;
pub const REPLY_CONTENT_CHARS: RangeInclusive<usize> = 5..=5_000;
pub const DISPLAY_NAME_CHARS: RangeInclusive<usize> = 1..=50;
pub const MAX_TAGS: usize = 5;
pub const MAX_TAG_CHARS: usize = 30;
pub const MAX_PAGE_LIMIT: u32 = 50;

fn bounded(field: &str, raw: &str, range: RangeInclusive<usize>) -> Result<String> {
    let value = raw.trim();
    let len = value.chars().count();
    if !range.contains(&len) {
        return Err(AppError::ValidationError(format!(
            "{field} must be between {} and {} characters",
            range.start(),
            range.end()
        )));
    }
    Ok(value.to_string())
}

pub fn title(raw: &str) -> Result<String> {
    bounded("Title", raw, TITLE_CHARS)
}

pub fn thread_content(raw: &str) -> Result<String> {
    bounded("Content", raw, THREAD_CONTENT_CHARS)
}

pub fn reply_content(raw: &str) -> Result<String> {
    bounded("Reply", raw, REPLY_CONTENT_CHARS)
}

pub fn display_name(raw: &str) -> Result<String> {
    bounded("Display name", raw, DISPLAY_NAME_CHARS)
}

/// Trims each tag and drops blanks before applying the count and length caps.
pub fn tags(raw: Vec<String>) -> Result<Vec<String>> {
    let tags: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tags.len() > MAX_TAGS {
        return Err(AppError::ValidationError(format!("Maximum {MAX_TAGS} tags allowed")));
    }
    if let Some(long) = tags.iter().find(|t| t.chars().count() > MAX_TAG_CHARS) {
        return Err(AppError::ValidationError(format!(
            "Tag '{long}' exceeds {MAX_TAG_CHARS} characters"
        )));
    }
    Ok(tags)
}

pub fn email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::ValidationError(format!("'{}' is not a valid email", raw.trim())));
    }
    Ok(email)
}

pub fn page(page: u32, limit: u32) -> Result<()> {
    if page == 0 {
        return Err(AppError::InvalidArgument("page must be at least 1".into()));
    }
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(AppError::InvalidArgument(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(())
}
