//! Topic and channel naming rules.
//!
//! A name is 1..=64 characters drawn from `[.a-zA-Z0-9_-]`, optionally
//! ending in `#ephemeral`. The suffix counts towards the length limit.

/// Maximum length of a topic or channel name, suffix included.
pub const MAX_NAME_LEN: usize = 64;

/// Suffix marking a topic or channel as ephemeral.
pub const EPHEMERAL_SUFFIX: &str = "#ephemeral";

pub fn is_valid_topic_name(name: &str) -> bool {
    is_valid_name(name)
}

pub fn is_valid_channel_name(name: &str) -> bool {
    is_valid_name(name)
}

/// Ephemeral registrations are pruned as soon as no producer announces them.
pub fn is_ephemeral(name: &str) -> bool {
    name.ends_with(EPHEMERAL_SUFFIX)
}

fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let base = name.strip_suffix(EPHEMERAL_SUFFIX).unwrap_or(name);
    !base.is_empty()
        && base
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
