use serde::{Deserialize, Serialize};

use crate::descriptor::{essence, starts_with_ignore_case};

const DAY: u64 = 24 * 60 * 60;

/// Settings snapshot handed to a [`RangeResponder`](crate::RangeResponder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub cache: CacheConfig,
    /// Sent when a descriptor carries an empty content type.
    pub default_content_type: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        ResponderConfig {
            cache: CacheConfig::default(),
            default_content_type: "application/octet-stream".to_string(),
        }
    }
}

/// `Cache-Control` lifetimes in seconds, per [`CacheTier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub media_max_age: u64,
    pub image_max_age: u64,
    pub default_max_age: u64,
    pub immutable: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            media_max_age: 30 * DAY,
            image_max_age: 7 * DAY,
            default_max_age: DAY,
            immutable: true,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self, tier: CacheTier) -> u64 {
        match tier {
            CacheTier::Media => self.media_max_age,
            CacheTier::Image => self.image_max_age,
            CacheTier::Default => self.default_max_age,
        }
    }

    /// `Cache-Control` value for responses of the given tier.
    pub fn header_value(&self, tier: CacheTier) -> String {
        let max_age = self.max_age(tier);
        if self.immutable {
            format!("public, max-age={max_age}, immutable")
        } else {
            format!("public, max-age={max_age}")
        }
    }
}

/// Caching class of a resource, chosen by content type prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// `video/*` and `audio/*`
    Media,
    /// `image/*`
    Image,
    Default,
}

impl CacheTier {
    pub fn for_content_type(content_type: &str) -> Self {
        let essence = essence(content_type);
        if starts_with_ignore_case(essence, "video/") || starts_with_ignore_case(essence, "audio/") {
            CacheTier::Media
        } else if starts_with_ignore_case(essence, "image/") {
            CacheTier::Image
        } else {
            CacheTier::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_tiers() {
        assert_eq!(CacheTier::Media, CacheTier::for_content_type("video/mp4"));
        assert_eq!(CacheTier::Media, CacheTier::for_content_type("audio/ogg"));
        assert_eq!(CacheTier::Image, CacheTier::for_content_type("IMAGE/PNG"));
        assert_eq!(CacheTier::Default, CacheTier::for_content_type("application/pdf"));
        assert_eq!(CacheTier::Default, CacheTier::for_content_type("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_default_header_values() {
        let cache = CacheConfig::default();
        assert_eq!("public, max-age=2592000, immutable", cache.header_value(CacheTier::Media));
        assert_eq!("public, max-age=604800, immutable", cache.header_value(CacheTier::Image));
        assert_eq!("public, max-age=86400, immutable", cache.header_value(CacheTier::Default));
    }

    #[test]
    fn test_mutable_header_value() {
        let cache = CacheConfig { immutable: false, ..CacheConfig::default() };
        assert_eq!("public, max-age=86400", cache.header_value(CacheTier::Default));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ResponderConfig = serde_json::from_str(r#"{"cache": {"image_max_age": 60}}"#).unwrap();
        assert_eq!(60, config.cache.image_max_age);
        assert_eq!(30 * DAY, config.cache.media_max_age);
        assert!(config.cache.immutable);
        assert_eq!("application/octet-stream", config.default_content_type);

        let config: ResponderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(ResponderConfig::default(), config);
    }
}
