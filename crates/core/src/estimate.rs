//! Estimate keys and the bounds every learned duration lives in.

use serde::{Deserialize, Serialize};

/// Lower bound of any learned or defaulted estimate (5 seconds).
pub const MIN_ESTIMATE_MS: u64 = 5_000;

/// Upper bound of any learned or defaulted estimate (15 minutes).
pub const MAX_ESTIMATE_MS: u64 = 900_000;

/// Weight given to the newest observation when blending estimates.
pub const SMOOTHING_WEIGHT: f64 = 0.4;

/// Identifies an operation class whose duration is learned, e.g. `"eta-generate-zip"`.
///
/// Keys are opaque: the store never inspects their structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstimateKey(String);

impl EstimateKey {
    /// Wrap a caller-supplied key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build `"<prefix>-<name>"`.
    pub fn namespaced(prefix: &str, name: &str) -> Self {
        Self(format!("{}-{}", prefix, name))
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EstimateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EstimateKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EstimateKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EstimateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Inclusive range an estimate is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateBounds {
    /// Smallest allowed estimate in milliseconds
    pub min_ms: u64,
    /// Largest allowed estimate in milliseconds
    pub max_ms: u64,
}

impl Default for EstimateBounds {
    fn default() -> Self {
        Self {
            min_ms: MIN_ESTIMATE_MS,
            max_ms: MAX_ESTIMATE_MS,
        }
    }
}

impl EstimateBounds {
    /// Clamp a millisecond value into the bounds.
    ///
    /// Inverted bounds do not panic: the maximum wins.
    pub fn clamp(&self, ms: u64) -> u64 {
        ms.max(self.min_ms).min(self.max_ms)
    }

    /// Round and clamp a fractional value. Returns `None` for NaN or infinity.
    pub fn clamp_f64(&self, ms: f64) -> Option<u64> {
        if !ms.is_finite() {
            return None;
        }
        let rounded = ms.round();
        if rounded <= self.min_ms as f64 {
            Some(self.min_ms)
        } else if rounded >= self.max_ms as f64 {
            Some(self.max_ms)
        } else {
            Some(rounded as u64)
        }
    }

    /// Parse a persisted value: any finite decimal number, rounded and clamped.
    pub fn parse(&self, raw: &str) -> Option<u64> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse::<f64>().ok().and_then(|v| self.clamp_f64(v))
    }
}

/// Clamp into the default `[MIN_ESTIMATE_MS, MAX_ESTIMATE_MS]` range.
pub fn clamp_estimate(ms: u64) -> u64 {
    EstimateBounds::default().clamp(ms)
}

/// Parse a persisted value against the default bounds.
pub fn parse_estimate(raw: &str) -> Option<u64> {
    EstimateBounds::default().parse(raw)
}

/// Exponential moving average step: `round((1 - w) * previous + w * observed)`.
pub fn blend(previous: u64, observed: u64, weight: f64) -> f64 {
    ((1.0 - weight) * previous as f64 + weight * observed as f64).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_estimate() {
        assert_eq!(clamp_estimate(0), MIN_ESTIMATE_MS);
        assert_eq!(clamp_estimate(60_000), 60_000);
        assert_eq!(clamp_estimate(10_000_000), MAX_ESTIMATE_MS);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let bounds = EstimateBounds {
            min_ms: 10_000,
            max_ms: 5_000,
        };
        assert_eq!(bounds.clamp(60_000), 5_000);
        assert_eq!(bounds.clamp(1_000), 5_000);
        assert_eq!(bounds.clamp_f64(60_000.0), Some(5_000));
    }

    #[test]
    fn test_parse_estimate() {
        assert_eq!(parse_estimate("104000"), Some(104_000));
        assert_eq!(parse_estimate(" 12345.6 "), Some(12_346));
        assert_eq!(parse_estimate("1"), Some(MIN_ESTIMATE_MS));
        assert_eq!(parse_estimate("-50"), Some(MIN_ESTIMATE_MS));
        assert_eq!(parse_estimate("1e9"), Some(MAX_ESTIMATE_MS));
        assert_eq!(parse_estimate("abc"), None);
        assert_eq!(parse_estimate(""), None);
        assert_eq!(parse_estimate("NaN"), None);
        assert_eq!(parse_estimate("inf"), None);
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(10_000, 20_000, SMOOTHING_WEIGHT), 14_000.0);
        assert_eq!(blend(120_000, 80_000, SMOOTHING_WEIGHT), 104_000.0);
    }

    #[test]
    fn test_namespaced_key() {
        let key = EstimateKey::namespaced("eta", "generate-zip");
        assert_eq!(key.as_str(), "eta-generate-zip");
        assert_eq!(key.to_string(), "eta-generate-zip");
    }
}
