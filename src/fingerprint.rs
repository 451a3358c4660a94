//! Technology fingerprinting: an opaque capability the driver consumes.
//! Consumes response headers and page HTML, returns a set of technology
//! names. The rule table here is small and illustrative, not a maintained
//! fingerprint database — that database is explicitly out of scope.

use crate::result::HeaderEntry;
use std::collections::BTreeSet;

pub trait FingerprintEngine: Send + Sync {
    fn detect(&self, headers: &[HeaderEntry], html: &str) -> Vec<String>;
}

struct Rule {
    name: &'static str,
    header: Option<(&'static str, &'static str)>,
    html_needle: Option<&'static str>,
}

/// Small built-in rule table keyed on common header/HTML signatures.
pub struct BuiltinFingerprintEngine {
    rules: Vec<Rule>,
}

impl BuiltinFingerprintEngine {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule {
                    name: "nginx",
                    header: Some(("server", "nginx")),
                    html_needle: None,
                },
                Rule {
                    name: "Apache",
                    header: Some(("server", "apache")),
                    html_needle: None,
                },
                Rule {
                    name: "Cloudflare",
                    header: Some(("server", "cloudflare")),
                    html_needle: None,
                },
                Rule {
                    name: "Express",
                    header: Some(("x-powered-by", "express")),
                    html_needle: None,
                },
                Rule {
                    name: "PHP",
                    header: Some(("x-powered-by", "php")),
                    html_needle: None,
                },
                Rule {
                    name: "WordPress",
                    header: None,
                    html_needle: Some("wp-content"),
                },
                Rule {
                    name: "React",
                    header: None,
                    html_needle: Some("__react"),
                },
                Rule {
                    name: "Next.js",
                    header: None,
                    html_needle: Some("__next"),
                },
                Rule {
                    name: "Vue.js",
                    header: None,
                    html_needle: Some("data-v-"),
                },
                Rule {
                    name: "Bootstrap",
                    header: None,
                    html_needle: Some("bootstrap"),
                },
                Rule {
                    name: "jQuery",
                    header: None,
                    html_needle: Some("jquery"),
                },
            ],
        }
    }
}

impl Default for BuiltinFingerprintEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintEngine for BuiltinFingerprintEngine {
    fn detect(&self, headers: &[HeaderEntry], html: &str) -> Vec<String> {
        let html_lower = html.to_ascii_lowercase();
        let mut hits = BTreeSet::new();

        for rule in &self.rules {
            if let Some((name, needle)) = rule.header {
                if headers
                    .iter()
                    .any(|h| h.name.eq_ignore_ascii_case(name) && h.value.to_ascii_lowercase().contains(needle))
                {
                    hits.insert(rule.name.to_string());
                    continue;
                }
            }
            if let Some(needle) = rule.html_needle {
                if html_lower.contains(needle) {
                    hits.insert(rule.name.to_string());
                }
            }
        }

        hits.into_iter().collect()
    }
}
