//! URL utilities for recognising channel links and building watch URLs

use crate::error::ChandlError;
use regex::Regex;
use std::sync::OnceLock;

/// A channel reference extracted from user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// `/channel/ID` - already a canonical channel identifier
    Id(String),
    /// `/c/NAME` - legacy custom URL
    Custom(String),
    /// `/@HANDLE`
    Handle(String),
    /// `/user/NAME` - legacy username URL
    User(String),
}

impl ChannelRef {
    /// The identifier or name carried by this reference
    pub fn value(&self) -> &str {
        match self {
            ChannelRef::Id(value)
            | ChannelRef::Custom(value)
            | ChannelRef::Handle(value)
            | ChannelRef::User(value) => value,
        }
    }

    /// Whether a search lookup is needed to obtain the canonical channel ID
    pub fn needs_lookup(&self) -> bool {
        !matches!(self, ChannelRef::Id(_))
    }
}

fn channel_patterns() -> &'static [(Regex, fn(String) -> ChannelRef)] {
    static PATTERNS: OnceLock<Vec<(Regex, fn(String) -> ChannelRef)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(&str, fn(String) -> ChannelRef); 4] = [
            (r"youtube\.com/channel/([A-Za-z0-9_-]+)", ChannelRef::Id),
            (r"youtube\.com/c/([A-Za-z0-9_-]+)", ChannelRef::Custom),
            (r"youtube\.com/@([A-Za-z0-9_.-]+)", ChannelRef::Handle),
            (r"youtube\.com/user/([A-Za-z0-9_-]+)", ChannelRef::User),
        ];
        table
            .into_iter()
            .map(|(pattern, build)| (Regex::new(pattern).expect("valid channel pattern"), build))
            .collect()
    })
}

/// Extract a channel reference from a channel URL or a bare handle/ID
pub fn extract_channel_ref(input: &str) -> Result<ChannelRef, ChandlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ChandlError::InvalidChannelUrl("empty channel URL".to_string()));
    }

    for (pattern, build) in channel_patterns() {
        if let Some(captures) = pattern.captures(input) {
            return Ok(build(captures[1].to_string()));
        }
    }

    // Bare forms: "@handle" or a raw "UC..." channel ID
    if let Some(handle) = input.strip_prefix('@') {
        if is_token(handle, true) {
            return Ok(ChannelRef::Handle(handle.to_string()));
        }
    }
    if input.len() == 24 && input.starts_with("UC") && is_token(input, false) {
        return Ok(ChannelRef::Id(input.to_string()));
    }

    Err(ChandlError::InvalidChannelUrl(input.to_string()))
}

fn is_token(value: &str, allow_dot: bool) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || (allow_dot && c == '.'))
}

/// Build the watch URL handed to the external downloader
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
