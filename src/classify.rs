//! Sensitivity classification.
//!
//! The engine consumes classifiers through the one-method [`Classifier`]
//! contract. [`KeywordClassifier`] is the built-in filename rule set:
//! a sensitive extension, or a sensitive keyword appearing in the basename
//! with no letter or digit directly around it.

use crate::backend::basename;
use crate::{Error, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sensitivity label attached to every logical file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sensitivity {
    Sensitive,
    Insensitive,
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensitivity::Sensitive => write!(f, "SENSITIVE"),
            Sensitivity::Insensitive => write!(f, "INSENSITIVE"),
        }
    }
}

/// Labels a file given its backend path.
///
/// Implementations must be side-effect free. An error aborts the run.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, path: &str) -> Result<Sensitivity>;
}

/// Keyword and extension lists for [`KeywordClassifier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub sensitive_extensions: Vec<String>,
    pub sensitive_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sensitive_extensions: [".pem", ".key", ".p12", ".pfx", ".kdbx", ".env"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sensitive_keywords: [
                "password",
                "passwd",
                "secret",
                "confidential",
                "private",
                "ssn",
                "passport",
                "salary",
                "payroll",
                "invoice",
                "bank",
                "iban",
                "tax",
                "medical",
                "diagnosis",
                "contract",
                "credentials",
                "api_key",
                "token",
                "id_rsa",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Filename-based classifier
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    extensions: HashSet<String>,
    patterns: Vec<Regex>,
}

impl KeywordClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let extensions = config
            .sensitive_extensions
            .iter()
            .map(|ext| {
                let ext = ext.to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        let patterns = config
            .sensitive_keywords
            .iter()
            .map(|keyword| {
                // The regex crate has no lookaround, so the boundary is
                // matched as a non-alphanumeric character or string edge.
                let pattern = format!(r"(?:^|[^A-Za-z0-9]){}(?:[^A-Za-z0-9]|$)", regex::escape(keyword));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Configuration {
                        reason: format!("invalid keyword '{}': {}", keyword, e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            extensions,
            patterns,
        })
    }

    pub fn classify_name(&self, path: &str) -> Sensitivity {
        let name = basename(path);
        let ext = name
            .rfind('.')
            .filter(|&i| i > 0)
            .map(|i| name[i..].to_lowercase());

        if ext.map_or(false, |ext| self.extensions.contains(&ext)) {
            return Sensitivity::Sensitive;
        }

        if self.patterns.iter().any(|re| re.is_match(name)) {
            return Sensitivity::Sensitive;
        }

        Sensitivity::Insensitive
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, path: &str) -> Result<Sensitivity> {
        Ok(self.classify_name(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_extension_rule() {
        let c = classifier();
        assert_eq!(c.classify_name("/hcs/server.PEM"), Sensitivity::Sensitive);
        assert_eq!(c.classify_name("HCS/notes.txt"), Sensitivity::Insensitive);
        // A dotfile has no extension
        assert_eq!(c.classify_name("HCS/.pem"), Sensitivity::Insensitive);
    }

    #[test]
    fn test_keyword_boundaries() {
        let c = classifier();
        assert_eq!(c.classify_name("HCS/SSN_list.csv"), Sensitivity::Sensitive);
        assert_eq!(c.classify_name("HCS/2024 Salary.xlsx"), Sensitivity::Sensitive);
        assert_eq!(c.classify_name("HCS/my-password.txt"), Sensitivity::Sensitive);
        // Embedded in a longer word does not count
        assert_eq!(c.classify_name("HCS/passportssn.txt"), Sensitivity::Insensitive);
        assert_eq!(c.classify_name("HCS/taxonomy.md"), Sensitivity::Insensitive);
    }

    #[test]
    fn test_only_basename_is_inspected() {
        let c = classifier();
        assert_eq!(c.classify_name("secret/holiday.jpg"), Sensitivity::Insensitive);
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Sensitivity::Sensitive).unwrap(), "\"SENSITIVE\"");
        assert_eq!(Sensitivity::Insensitive.to_string(), "INSENSITIVE");
    }

    #[tokio::test]
    async fn test_trait_dispatch() {
        let c: Box<dyn Classifier> = Box::new(classifier());
        assert_eq!(c.classify("HCS/bank statement.pdf").await.unwrap(), Sensitivity::Sensitive);
    }
}
