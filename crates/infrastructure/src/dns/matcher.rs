use fancy_regex::Regex;
use glory_hole_domain::DomainError;
use rustc_hash::FxHashSet;
use tracing::debug;

/// A classified domain pattern.
///
/// Classification is by shape: a `*.` prefix makes a wildcard, the presence
/// of regex metacharacters makes a regex, anything else is an exact domain.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    /// Stored without the `*.` prefix.
    Wildcard(String),
    Regex(String),
}

impl Pattern {
    pub fn classify(raw: &str) -> Pattern {
        if let Some(suffix) = raw.strip_prefix("*.") {
            return Pattern::Wildcard(suffix.to_ascii_lowercase());
        }
        if looks_like_regex(raw) {
            return Pattern::Regex(raw.to_string());
        }
        Pattern::Exact(raw.to_ascii_lowercase())
    }
}

fn looks_like_regex(s: &str) -> bool {
    s.contains(".*")
        || s.contains(".+")
        || s.chars()
            .any(|c| matches!(c, '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' | '+' | '?'))
}

/// Three-tier domain matcher: exact set, wildcard suffixes, regexes.
///
/// Tiers are consulted in that order and the first hit wins. Matching is
/// case-insensitive; queries are expected lowercased and regexes compile
/// with the case-insensitive flag.
pub struct Matcher {
    exact: FxHashSet<String>,
    wildcards: Vec<String>,
    regexes: Vec<Regex>,
}

impl Matcher {
    /// Classify and compile `patterns`. Fails fast on the first invalid
    /// regex.
    pub fn new<I, S>(patterns: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = FxHashSet::default();
        let mut wildcards = Vec::new();
        let mut regexes = Vec::new();

        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match Pattern::classify(raw) {
                Pattern::Exact(domain) => {
                    exact.insert(domain);
                }
                Pattern::Wildcard(suffix) => wildcards.push(suffix),
                Pattern::Regex(source) => {
                    let compiled = Regex::new(&format!("(?i){}", source)).map_err(|e| {
                        DomainError::InvalidExpression(format!(
                            "Invalid pattern regex '{}': {}",
                            source, e
                        ))
                    })?;
                    regexes.push(compiled);
                }
            }
        }

        Ok(Self {
            exact,
            wildcards,
            regexes,
        })
    }

    pub fn empty() -> Self {
        Self {
            exact: FxHashSet::default(),
            wildcards: Vec::new(),
            regexes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty() && self.regexes.is_empty()
    }

    pub fn pattern_count(&self) -> usize {
        self.exact.len() + self.wildcards.len() + self.regexes.len()
    }

    /// First-hit-wins lookup. `domain` must already be lowercased.
    pub fn matches(&self, domain: &str) -> bool {
        if self.exact.contains(domain) {
            return true;
        }

        for suffix in &self.wildcards {
            // *.example.com matches x.example.com but not example.com itself
            if domain.len() > suffix.len() + 1
                && domain.ends_with(suffix.as_str())
                && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.'
            {
                return true;
            }
        }

        for regex in &self.regexes {
            match regex.is_match(domain) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    debug!(domain = %domain, error = %e, "Pattern regex runtime error; treated as no match");
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_shape() {
        assert!(matches!(Pattern::classify("ads.example.com"), Pattern::Exact(_)));
        assert!(matches!(Pattern::classify("*.example.com"), Pattern::Wildcard(_)));
        assert!(matches!(Pattern::classify("^ads[0-9]+\\."), Pattern::Regex(_)));
        assert!(matches!(Pattern::classify("track.*\\.net"), Pattern::Regex(_)));
    }

    #[test]
    fn exact_tier_is_case_normalized() {
        let m = Matcher::new(["Ads.Example.COM"]).unwrap();
        assert!(m.matches("ads.example.com"));
        assert!(!m.matches("ads.example.org"));
    }

    #[test]
    fn wildcard_matches_subdomains_only() {
        let m = Matcher::new(["*.example.com"]).unwrap();
        assert!(m.matches("x.example.com"));
        assert!(m.matches("x.y.example.com"));
        assert!(!m.matches("example.com"));
        assert!(!m.matches("badexample.com"));
    }

    #[test]
    fn regex_tier_matches_case_insensitively() {
        let m = Matcher::new([r"^ads[0-9]+\.example\.com$"]).unwrap();
        assert!(m.matches("ads42.example.com"));
        assert!(!m.matches("ads.example.com"));
    }

    #[test]
    fn invalid_regex_fails_construction() {
        assert!(Matcher::new(["[unclosed"]).is_err());
    }
}
