//! Registration keys and query filters.

use std::fmt;

use waypost_core::names::is_ephemeral;

/// Wildcard accepted by every [`Matcher`] field.
pub const ANY: &str = "*";

/// What a registration names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Topic,
    Channel,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Topic => "topic",
            Category::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "topic" => Some(Category::Topic),
            "channel" => Some(Category::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key: (category, topic, channel).
///
/// Topic registrations carry an empty channel. Ordering is lexicographic on
/// the three fields, which keeps query results stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Registration {
    pub category: Category,
    pub topic: String,
    pub channel: String,
}

impl Registration {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            category: Category::Topic,
            topic: topic.into(),
            channel: String::new(),
        }
    }

    pub fn channel(topic: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            category: Category::Channel,
            topic: topic.into(),
            channel: channel.into(),
        }
    }

    /// The topic registration a channel registration lives under.
    pub fn parent_topic(&self) -> Option<Registration> {
        match self.category {
            Category::Channel => Some(Registration::topic(self.topic.clone())),
            Category::Topic => None,
        }
    }

    /// Whether an explicit unregister may delete this entry once empty.
    ///
    /// Channels always qualify. Topics qualify only when ephemeral; other
    /// topics go away through administrative deletion alone.
    pub fn is_prunable(&self) -> bool {
        match self.category {
            Category::Channel => true,
            Category::Topic => is_ephemeral(&self.topic),
        }
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Category::Topic => write!(f, "topic:{}", self.topic),
            Category::Channel => write!(f, "channel:{}:{}", self.topic, self.channel),
        }
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// Match for a single key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Any,
    Exact(String),
}

impl Matcher {
    /// `*` becomes [`Matcher::Any`]; anything else matches exactly.
    pub fn parse(pattern: &str) -> Self {
        if pattern == ANY {
            Matcher::Any
        } else {
            Matcher::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(expected) => expected == value,
        }
    }

    fn exact(&self) -> Option<&str> {
        match self {
            Matcher::Any => None,
            Matcher::Exact(expected) => Some(expected),
        }
    }
}

/// Three independent field matchers over a [`Registration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFilter {
    pub category: Matcher,
    pub topic: Matcher,
    pub channel: Matcher,
}

impl RegistrationFilter {
    pub fn new(category: &str, topic: &str, channel: &str) -> Self {
        Self {
            category: Matcher::parse(category),
            topic: Matcher::parse(topic),
            channel: Matcher::parse(channel),
        }
    }

    pub fn matches(&self, key: &Registration) -> bool {
        self.category.matches(key.category.as_str())
            && self.topic.matches(&key.topic)
            && self.channel.matches(&key.channel)
    }

    /// The single key this filter can match, when no field is a wildcard
    /// and the category is known.
    pub fn exact_key(&self) -> Option<Registration> {
        let category = Category::parse(self.category.exact()?)?;
        Some(Registration {
            category,
            topic: self.topic.exact()?.to_string(),
            channel: self.channel.exact()?.to_string(),
        })
    }
}
