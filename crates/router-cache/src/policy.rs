//! Cache policy derivation.
//!
//! Tier sets the base lifetime; a content tag, when present, overrides it.
//! Sensitive content is never cached.

use router_core::{CacheConfig, CachePolicy, QualityTier};
use std::fmt;

/// Classification of the cached content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTag {
    /// System prompt, shared and stable
    System,
    /// User prompt
    User,
    /// Content that must not be cached
    Sensitive,
    /// Anything else
    Other,
}

impl ContentTag {
    /// Classify a free-form tag, ignoring case
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "sensitive" => Self::Sensitive,
            _ => Self::Other,
        }
    }

    /// Tag name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Sensitive => "sensitive",
            Self::Other => "other",
        }
    }
}

impl From<&str> for ContentTag {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the policy for a tier and content tag
#[must_use]
pub fn derive_policy(
    config: &CacheConfig,
    tier: Option<QualityTier>,
    tag: Option<ContentTag>,
) -> CachePolicy {
    let mut policy = CachePolicy {
        enabled: config.enabled,
        ttl: config.default_ttl,
        privacy_level: config.default_privacy,
        ..CachePolicy::default()
    };

    if let Some(tier) = tier {
        policy.ttl = match tier {
            QualityTier::Gold => config.gold_ttl,
            QualityTier::Silver => config.silver_ttl,
            QualityTier::Bronze => config.bronze_ttl,
        };
    }

    match tag {
        Some(ContentTag::System) => policy.ttl = config.system_prompt_ttl,
        Some(ContentTag::User) => policy.ttl = config.user_prompt_ttl,
        Some(ContentTag::Sensitive) => policy.enabled = false,
        Some(ContentTag::Other) | None => {}
    }

    policy
}
