//! Notices: the per-invocation `errors` and `notices` channels.
//!
//! A [`NoticeCollector`] is created fresh for every service invocation. The
//! invocation is a success exactly when its errors channel is empty; the
//! notices channel is purely informational.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Underlying error attached to a notice.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Which of the two channels an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Failures. Any entry here makes the invocation a failure.
    Errors,
    /// Informational messages.
    Notices,
}

/// Why a message was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMessage {
    /// Message was empty or whitespace only.
    #[error("notice message must not be empty")]
    Empty,
    /// Message was a structured value, not text.
    #[error("notice message must be text, got {kind}")]
    NotText {
        /// JSON kind that was supplied instead.
        kind: &'static str,
    },
}

/// A validated, non-empty notice message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoticeMessage(String);

impl NoticeMessage {
    /// Borrow the message text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NoticeMessage {
    type Error = InvalidMessage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(InvalidMessage::Empty);
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for NoticeMessage {
    type Error = InvalidMessage;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl TryFrom<&String> for NoticeMessage {
    type Error = InvalidMessage;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<Value> for NoticeMessage {
    type Error = InvalidMessage;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = match value {
            Value::String(text) => return Self::try_from(text),
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Err(InvalidMessage::NotText { kind })
    }
}

impl AsRef<str> for NoticeMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoticeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a [`NoticeCollection`].
#[derive(Debug, Clone)]
pub struct Notice {
    message: NoticeMessage,
    cause: Option<Cause>,
}

impl Notice {
    /// The message text.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// The underlying error, if one was attached.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.cause.as_deref()
    }
}

/// Ordered sequence of notices for one channel.
#[derive(Debug, Clone, Default)]
pub struct NoticeCollection {
    entries: Vec<Notice>,
}

impl NoticeCollection {
    /// Append a message.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMessage`] if `message` is empty or not text.
    pub fn add<M>(&mut self, message: M) -> Result<(), InvalidMessage>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
    {
        self.push(message.try_into()?, None);
        Ok(())
    }

    /// Append a message together with the error that caused it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMessage`] if `message` is empty or not text.
    pub fn add_with_cause<M, E>(&mut self, message: M, cause: E) -> Result<(), InvalidMessage>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.push(message.try_into()?, Some(Arc::from(cause.into())));
        Ok(())
    }

    fn push(&mut self, message: NoticeMessage, cause: Option<Cause>) {
        self.entries.push(Notice { message, cause });
    }

    /// Append every entry of `other`, keeping its order, after our own.
    pub fn merge(&mut self, other: &NoticeCollection) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Whether at least one entry exists.
    #[must_use]
    pub fn any(&self) -> bool {
        !self.entries.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter()
    }

    /// Messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(Notice::message).collect()
    }

    /// Messages joined by newline, or `None` when empty.
    #[must_use]
    pub fn full_messages(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.messages().join("\n"))
    }
}

impl<'a> IntoIterator for &'a NoticeCollection {
    type Item = &'a Notice;
    type IntoIter = std::slice::Iter<'a, Notice>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Both channels of one invocation plus the success message to fall back on.
#[derive(Debug, Clone)]
pub struct NoticeCollector {
    errors: NoticeCollection,
    notices: NoticeCollection,
    success_notice: String,
}

impl NoticeCollector {
    /// Create an empty collector with an explicit success notice.
    #[must_use]
    pub fn new(success_notice: impl Into<String>) -> Self {
        Self {
            errors: NoticeCollection::default(),
            notices: NoticeCollection::default(),
            success_notice: success_notice.into(),
        }
    }

    /// Create an empty collector for the service `name`.
    ///
    /// Uses `configured` as the success notice when present, otherwise
    /// `"<Humanized name> succeeded"`.
    #[must_use]
    pub fn for_service(name: &str, configured: Option<&str>) -> Self {
        match configured {
            Some(notice) if !notice.trim().is_empty() => Self::new(notice),
            _ => Self::new(format!("{} succeeded", humanize(name))),
        }
    }

    /// Append a message to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMessage`] if `message` is empty or not text.
    pub fn add<M>(&mut self, channel: Channel, message: M) -> Result<(), InvalidMessage>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
    {
        self.channel_mut(channel).add(message)
    }

    /// Append a message with its cause to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMessage`] if `message` is empty or not text.
    pub fn add_with_cause<M, E>(
        &mut self,
        channel: Channel,
        message: M,
        cause: E,
    ) -> Result<(), InvalidMessage>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.channel_mut(channel).add_with_cause(message, cause)
    }

    #[must_use]
    pub fn channel(&self, channel: Channel) -> &NoticeCollection {
        match channel {
            Channel::Errors => &self.errors,
            Channel::Notices => &self.notices,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut NoticeCollection {
        match channel {
            Channel::Errors => &mut self.errors,
            Channel::Notices => &mut self.notices,
        }
    }

    #[must_use]
    pub fn errors(&self) -> &NoticeCollection {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut NoticeCollection {
        &mut self.errors
    }

    #[must_use]
    pub fn notices(&self) -> &NoticeCollection {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeCollection {
        &mut self.notices
    }

    #[must_use]
    pub fn any(&self, channel: Channel) -> bool {
        self.channel(channel).any()
    }

    #[must_use]
    pub fn full_messages(&self, channel: Channel) -> Option<String> {
        self.channel(channel).full_messages()
    }

    /// True iff the errors channel is empty.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.errors.any()
    }

    /// The single message that best describes the invocation.
    ///
    /// Errors win over notices, notices over the success notice.
    #[must_use]
    pub fn notice(&self) -> String {
        self.errors
            .full_messages()
            .or_else(|| self.notices.full_messages())
            .unwrap_or_else(|| self.success_notice.clone())
    }

    /// The configured or derived success notice.
    #[must_use]
    pub fn success_notice(&self) -> &str {
        &self.success_notice
    }

    /// Append `other`'s errors and notices after our own.
    pub fn merge(&mut self, other: &NoticeCollector) {
        self.errors.merge(&other.errors);
        self.notices.merge(&other.notices);
    }

    /// Split into `(errors, notices)`.
    #[must_use]
    pub fn into_parts(self) -> (NoticeCollection, NoticeCollection) {
        (self.errors, self.notices)
    }
}

/// Turn a type name into a sentence: `CreateUserService` → `Create user service`.
///
/// Module paths are stripped and `snake_case` is accepted as well.
#[must_use]
pub fn humanize(name: &str) -> String {
    let last = name.rsplit("::").next().unwrap_or(name);
    let mut words = String::with_capacity(last.len() + 4);
    let mut prev_lower = false;
    for ch in last.chars() {
        if ch == '_' || ch == '-' {
            if !words.ends_with(' ') && !words.is_empty() {
                words.push(' ');
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            words.push(' ');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        words.extend(ch.to_lowercase());
    }
    let words = words.trim();
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
