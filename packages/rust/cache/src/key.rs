//! Deterministic cache keys for logical requests.

use std::fmt;

use sha2::{Digest, Sha256};

use kwplanner_shared::Platform;

/// The kind of lookup a cache entry stores. Also the file-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Expansion,
    Metrics,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expansion => "expansion",
            Self::Metrics => "metrics",
        }
    }
}

/// Hash of the parameters that identify a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    digest: String,
}

impl CacheKey {
    /// Key for a seed's suggestion list.
    pub fn expansion(term: &str, platform: Platform, location_code: u32) -> Self {
        Self::new(
            CacheKind::Expansion,
            &[term, platform.as_str(), &location_code.to_string()],
        )
    }

    /// Key for one term's metrics.
    pub fn metrics(term: &str, platform: Platform) -> Self {
        Self::new(CacheKind::Metrics, &[term, platform.as_str()])
    }

    fn new(kind: CacheKind, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        for part in parts {
            // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
            hasher.update([0x1f]);
            hasher.update(part.as_bytes());
        }
        Self {
            kind,
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// `{kind}_{sha256}.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.kind.as_str(), self.digest)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        let a = CacheKey::expansion("plumber", Platform::GoogleAds, 2840);
        let b = CacheKey::expansion("plumber", Platform::GoogleAds, 2840);
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn keys_differ_by_parameters() {
        let base = CacheKey::expansion("plumber", Platform::GoogleAds, 2840);
        assert_ne!(base, CacheKey::expansion("plumber", Platform::BingAds, 2840));
        assert_ne!(base, CacheKey::expansion("plumber", Platform::GoogleAds, 2826));
        assert_ne!(base, CacheKey::expansion("plumbers", Platform::GoogleAds, 2840));
        assert_ne!(
            base.digest(),
            CacheKey::metrics("plumber", Platform::GoogleAds).digest()
        );
    }

    #[test]
    fn part_boundaries_matter() {
        let a = CacheKey::new(CacheKind::Metrics, &["ab", "c"]);
        let b = CacheKey::new(CacheKind::Metrics, &["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn file_name_carries_kind_prefix() {
        let key = CacheKey::metrics("plumber", Platform::BingAds);
        let name = key.file_name();
        assert!(name.starts_with("metrics_"));
        assert!(name.ends_with(".json"));
    }
}
