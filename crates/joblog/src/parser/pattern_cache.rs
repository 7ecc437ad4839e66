use std::sync::{Arc, OnceLock};

use moka::sync::Cache;
use regex::{Regex, RegexBuilder};

/// Upper bound on the size of one compiled pattern program.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

static GLOBAL: OnceLock<Arc<PatternCache>> = OnceLock::new();

/// Compiled regexes keyed by their literal pattern text.
///
/// The cache is never bounded by capacity and never evicts, so it grows with
/// the number of distinct patterns, not with record volume. Concurrent
/// requests for the same missing pattern are coalesced by moka; every caller
/// gets the same `Arc<Regex>`.
///
/// Matching uses the `regex` crate's automata engine, which runs in time
/// linear in the input; there is no backtracking to bound.
pub struct PatternCache {
    patterns: Cache<String, Arc<Regex>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self {
            patterns: Cache::builder().build(),
        }
    }

    /// Process-wide cache shared by every engine built with
    /// [`crate::parser::ParsingEngine::new`].
    pub fn global() -> Arc<PatternCache> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PatternCache::new())))
    }

    /// Returns the compiled pattern, compiling and inserting it if absent.
    pub fn get_or_compile(&self, pattern: &str) -> Result<Arc<Regex>, Arc<regex::Error>> {
        self.patterns.try_get_with(pattern.to_string(), || {
            RegexBuilder::new(pattern)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
                .map(Arc::new)
        })
    }

    /// Number of cached patterns.
    pub fn len(&self) -> u64 {
        self.patterns.run_pending_tasks();
        self.patterns.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_same_pattern_compiled_once() {
        let cache = PatternCache::new();
        let a = cache.get_or_compile(r"\bcliente\b").unwrap();
        let b = cache.get_or_compile(r"\bcliente\b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_error_and_not_cached() {
        let cache = PatternCache::new();
        assert!(cache.get_or_compile("[invalid").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_population() {
        let cache = Arc::new(PatternCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for j in 0..20 {
                        let pattern = format!(r"\bterm{}\b", (i + j) % 5);
                        let regex = cache.get_or_compile(&pattern).unwrap();
                        assert!(regex.is_match(&format!("x term{} y", (i + j) % 5)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 5);
    }
}
