//! Glossary rules for consistent term translation.
//!
//! A glossary is written one rule per line as `source -> target`. Lines
//! starting with `#` are comments. Rules keep the order they were first
//! written in; a repeated source term replaces the earlier target in place.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token separating the source term from its translation.
pub const RULE_SEPARATOR: &str = "->";

/// First line of the rendered instruction block.
const INSTRUCTIONS_HEADER: &str =
    "Use this glossary. Always translate the terms on the left exactly as shown on the right:";

/// How glossary rules are applied to a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlossaryMode {
    /// Plain substring replacement before translation.
    #[default]
    Literal,
    /// Source terms are regular expressions, replaced before translation.
    Pattern,
    /// Text is left untouched; rules are injected into the prompt.
    Instructions,
}

impl std::str::FromStr for GlossaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "literal" => Ok(Self::Literal),
            "pattern" | "regex" => Ok(Self::Pattern),
            "instructions" | "prompt" => Ok(Self::Instructions),
            other => Err(format!(
                "unknown glossary mode '{}' (expected literal, pattern or instructions)",
                other
            )),
        }
    }
}

impl std::fmt::Display for GlossaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Literal => "literal",
            Self::Pattern => "pattern",
            Self::Instructions => "instructions",
        };
        f.write_str(name)
    }
}

/// A single source → target rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryRule {
    pub source: String,
    pub target: String,
}

/// A pattern rule that could not be compiled and was skipped.
#[derive(Debug, Clone)]
pub struct PatternWarning {
    pub pattern: String,
    pub message: String,
}

impl std::fmt::Display for PatternWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid pattern '{}': {}", self.pattern, self.message)
    }
}

/// Ordered glossary mapping.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    rules: Vec<GlossaryRule>,
}

impl Glossary {
    /// Parse glossary text. Malformed lines are skipped silently.
    pub fn parse(text: &str) -> Self {
        let mut glossary = Self::default();

        for line in text.lines() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            let Some((source, target)) = line.split_once(RULE_SEPARATOR) else {
                continue;
            };
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                continue;
            }
            glossary.insert(source, target);
        }

        glossary
    }

    /// Insert a rule, replacing the target of an existing source term in place.
    pub fn insert(&mut self, source: &str, target: &str) {
        match self.rules.iter_mut().find(|r| r.source == source) {
            Some(rule) => rule.target = target.to_string(),
            None => self.rules.push(GlossaryRule {
                source: source.to_string(),
                target: target.to_string(),
            }),
        }
    }

    pub fn rules(&self) -> &[GlossaryRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Render the rules as a prompt instruction block.
    ///
    /// Returns an empty string for an empty glossary.
    pub fn instructions(&self) -> String {
        if self.rules.is_empty() {
            return String::new();
        }

        let mut block = String::from(INSTRUCTIONS_HEADER);
        for rule in &self.rules {
            block.push_str(&format!("\n\"{}\" -> \"{}\"", rule.source, rule.target));
        }
        block
    }

    /// Replace every source term literally, in rule order.
    pub fn apply_literal(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| acc.replace(&rule.source, &rule.target))
    }

    /// Replace every source pattern, in rule order.
    ///
    /// Targets may reference capture groups (`$1`, `${name}`). Patterns
    /// that fail to compile are skipped and reported.
    pub fn apply_patterns(&self, text: &str) -> (String, Vec<PatternWarning>) {
        let mut result = text.to_string();
        let mut warnings = Vec::new();

        for rule in &self.rules {
            match Regex::new(&rule.source) {
                Ok(re) => {
                    result = re.replace_all(&result, rule.target.as_str()).into_owned();
                }
                Err(e) => warnings.push(PatternWarning {
                    pattern: rule.source.clone(),
                    message: e.to_string(),
                }),
            }
        }

        (result, warnings)
    }

    /// Apply the glossary to chapter text according to `mode`.
    pub fn prepare(&self, text: &str, mode: GlossaryMode) -> (String, Vec<PatternWarning>) {
        match mode {
            GlossaryMode::Literal => (self.apply_literal(text), Vec::new()),
            GlossaryMode::Pattern => self.apply_patterns(text),
            GlossaryMode::Instructions => (text.to_string(), Vec::new()),
        }
    }
}
