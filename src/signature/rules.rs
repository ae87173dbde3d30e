// Static normalization rules, compiled once and shared by every caller
use super::error::RuleError;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// One substitution step of the normalizer.
///
/// `guard`, when present, is consulted for every match; matches it rejects
/// are left untouched. This stands in for look-around, which `regex` lacks.
pub struct NormalizationRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
    pub guard: Option<fn(&str) -> bool>,
}

/// Ordered rule set with lazy, one-time compilation.
///
/// A rule that fails to compile is logged and skipped; applying the set
/// never fails.
pub struct StaticRuleSet {
    rules: &'static [NormalizationRule],
    compiled: OnceLock<Vec<Option<Regex>>>,
}

impl StaticRuleSet {
    pub const fn new(rules: &'static [NormalizationRule]) -> Self {
        Self {
            rules,
            compiled: OnceLock::new(),
        }
    }

    fn compiled(&self) -> &[Option<Regex>] {
        self.compiled.get_or_init(|| {
            self.rules
                .iter()
                .map(|rule| match compile_rule(rule) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::error!("Skipping normalization rule: {}", e);
                        None
                    }
                })
                .collect()
        })
    }

    /// Runs every rule, in order, over `input`.
    pub fn apply(&self, input: String) -> String {
        let mut text = input;

        for (rule, regex) in self.rules.iter().zip(self.compiled()) {
            let Some(regex) = regex else {
                continue;
            };

            let replaced = match rule.guard {
                Some(guard) => regex
                    .replace_all(&text, |caps: &Captures<'_>| {
                        let matched = &caps[0];
                        if guard(matched) {
                            rule.replacement.to_string()
                        } else {
                            matched.to_string()
                        }
                    })
                    .into_owned(),
                None => regex.replace_all(&text, rule.replacement).into_owned(),
            };
            text = replaced;
        }

        text
    }

    /// Number of rules that compiled successfully.
    pub fn active_rules(&self) -> usize {
        self.compiled().iter().filter(|r| r.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }
}

fn compile_rule(rule: &NormalizationRule) -> Result<Regex, RuleError> {
    Regex::new(rule.pattern).map_err(|e| RuleError::CompilationFailed {
        pattern: rule.pattern.to_string(),
        name: rule.name.to_string(),
        source: e,
    })
}

/// Quoted values only count as opaque ids when they carry a digit.
fn looks_like_quoted_id(quoted: &str) -> bool {
    let inner = quoted.trim_matches(|c| c == '"' || c == '\'');
    inner.len() >= 8 && inner.bytes().any(|b| b.is_ascii_digit())
}

/// Long runs of plain letters are words, not tokens.
fn looks_like_token(token: &str) -> bool {
    token.bytes().any(|b| b.is_ascii_digit())
}

/// Hex ids mix digits and `a-f`; all-digit runs are left to the number rule.
fn looks_like_hex_id(hex: &str) -> bool {
    hex.bytes().any(|b| b.is_ascii_digit()) && hex.bytes().any(|b| matches!(b, b'a'..=b'f'))
}

/// Normalization rules, most specific first. The input is already
/// lower-cased, so patterns only deal with lower-case letters and emit
/// lower-case placeholders.
pub static MESSAGE_RULES: StaticRuleSet = StaticRuleSet::new(&[
    NormalizationRule {
        name: "uuid",
        pattern: r"\b(?:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|[0-9a-f]{32})\b",
        replacement: "uuid",
        guard: None,
    },
    NormalizationRule {
        name: "timestamp",
        pattern: r"\b\d{4}-\d{2}-\d{2}(?:[t ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:z|[+-]\d{2}:?\d{2})?)?\b|\b\d{2}:\d{2}:\d{2}(?:[.,]\d+)?\b",
        replacement: "timestamp",
        guard: None,
    },
    NormalizationRule {
        name: "ipv4",
        pattern: r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b",
        replacement: "ip",
        guard: None,
    },
    NormalizationRule {
        name: "email",
        pattern: r"\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
        replacement: "email",
        guard: None,
    },
    NormalizationRule {
        name: "url",
        pattern: r#"https?://[^\s"'<>]+"#,
        replacement: "url",
        guard: None,
    },
    NormalizationRule {
        name: "path",
        pattern: r"[a-z]:\\[^\s]+|/[^\s/]+(?:/[^\s/]*)+",
        replacement: "path",
        guard: None,
    },
    NormalizationRule {
        name: "labeled_id",
        pattern: r"\b((?:id|session|request|trace|span|user|correlation)(?:[_-]?id)?)\s*[:=]\s*[^\s,;]+",
        replacement: "${1}:placeholder",
        guard: None,
    },
    NormalizationRule {
        name: "template_var",
        pattern: r"\$\{[^}]*\}|\{[a-z_][a-z0-9_.]*\}",
        replacement: "var",
        guard: None,
    },
    NormalizationRule {
        name: "quoted_id",
        pattern: r#""[a-z0-9_.:\-]{8,}"|'[a-z0-9_.:\-]{8,}'"#,
        replacement: "\"id\"",
        guard: Some(looks_like_quoted_id),
    },
    NormalizationRule {
        name: "hex_hash",
        pattern: r"\b[0-9a-f]{40,}\b",
        replacement: "hash",
        guard: None,
    },
    NormalizationRule {
        name: "hex_id",
        pattern: r"\b[0-9a-f]{16,}\b",
        replacement: "hex",
        guard: Some(looks_like_hex_id),
    },
    NormalizationRule {
        name: "token",
        pattern: r"\b[a-z0-9][a-z0-9_\-]{19,}\b",
        replacement: "token",
        guard: Some(looks_like_token),
    },
    NormalizationRule {
        name: "prefixed_number",
        pattern: r"\b([a-z][a-z0-9_]*_)\d+",
        replacement: "${1}n",
        guard: None,
    },
    NormalizationRule {
        name: "number",
        pattern: r"\b\d+(?:\.\d+)?",
        replacement: "n",
        guard: None,
    },
    NormalizationRule {
        name: "whitespace",
        pattern: r"\s+",
        replacement: " ",
        guard: None,
    },
]);
