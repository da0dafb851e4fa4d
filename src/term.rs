//! Search terms and their expansion into per-query patterns.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corpus::OtherHasher;
use crate::error::{Result, SearchError};

lazy_static! {
    // a word, some space, another word
    static ref PHRASE: Regex = Regex::new(r"\w\s+\w").expect("phrase pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// A pattern typed by the user.
    Literal(String),
    /// A dictionary headword standing in for its inflected forms.
    Lemma(String),
    /// Matches every line.
    Everything,
}

impl Term {
    pub fn is_phrase(&self) -> bool {
        match self {
            Term::Literal(text) => is_phrase(text),
            _ => false,
        }
    }
}

pub fn is_phrase(text: &str) -> bool {
    PHRASE.is_match(text.trim())
}

/// Leading and trailing spaces mean word boundaries.
pub fn whitespace_anchored(literal: &str) -> String {
    let mut pattern = literal.to_string();
    if let Some(rest) = pattern.strip_prefix(' ') {
        pattern = format!(r"(^|\s){rest}");
    }
    if let Some(rest) = pattern.strip_suffix(' ') {
        pattern = format!(r"{rest}(\s|$)");
    }
    pattern
}

pub fn form_pattern(form: &str) -> String {
    format!(r"(^|\s){}(\s|$)", regex::escape(form))
}

pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SearchError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// What a single query looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    pub pattern: String,
    pub phrase: bool,
}

/// A term with its forms resolved; one query per form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedTerm {
    pub term: Term,
    pub forms: Vec<SearchForm>,
}

impl ExpandedTerm {
    pub fn expand(term: &Term, expander: &dyn TermExpander) -> Result<Self> {
        let forms = match term {
            Term::Literal(text) => vec![SearchForm {
                pattern: whitespace_anchored(text),
                phrase: is_phrase(text),
            }],
            Term::Lemma(key) => {
                let forms = expander
                    .forms(key)
                    .filter(|forms| !forms.is_empty())
                    .ok_or_else(|| SearchError::UnknownLemma(key.clone()))?;
                forms
                    .iter()
                    .map(|f| SearchForm {
                        pattern: form_pattern(f),
                        phrase: false,
                    })
                    .collect()
            }
            Term::Everything => vec![SearchForm {
                pattern: String::new(),
                phrase: false,
            }],
        };
        Ok(Self {
            term: term.clone(),
            forms,
        })
    }

    pub fn is_phrase(&self) -> bool {
        self.forms.iter().any(|f| f.phrase)
    }

    /// Every form as one alternation, for matching in memory.
    pub fn alternation(&self) -> String {
        match self.forms.as_slice() {
            [single] => single.pattern.clone(),
            forms => format!(
                "({})",
                forms
                    .iter()
                    .map(|f| f.pattern.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            ),
        }
    }

    pub fn matcher(&self) -> Result<Regex> {
        compile_pattern(&self.alternation())
    }

    /// Words of a literal phrase, in order.
    pub fn words(&self) -> Vec<String> {
        match &self.term {
            Term::Literal(text) => text.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

// ------------- Expansion -------------
pub trait TermExpander: Send + Sync {
    /// Surface forms of a lemma, in dictionary order.
    fn forms(&self, lemma: &str) -> Option<Vec<String>>;
}

#[derive(Debug, Default, Clone)]
pub struct LemmaMap {
    lemmata: HashMap<String, Vec<String>, OtherHasher>,
}

impl LemmaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lemma: &str, forms: &[&str]) {
        self.lemmata.insert(
            lemma.to_string(),
            forms.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// Parse `{"lemma": ["form", ...], ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self {
            lemmata: parsed.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.lemmata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lemmata.is_empty()
    }
}

impl TermExpander for LemmaMap {
    fn forms(&self, lemma: &str) -> Option<Vec<String>> {
        self.lemmata.get(lemma).cloned()
    }
}
