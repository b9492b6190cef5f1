//! Keyword extraction: free text → set of content words.
//!
//! Keeps tokens the tagger classifies as common noun, verb, proper noun or
//! adjective, in their surface form. No lemmatization: "shipped" and "ship"
//! are different keywords.

use std::sync::Arc;

use tracing::debug;

use crate::error::ExtractionError;
use crate::pipeline::tagger::{LexiconTagger, PosTagger};
use crate::pipeline::types::{Keyword, KeywordSet};

/// How keyword case is treated before comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeywordCase {
    /// Compare surface forms exactly as written.
    #[default]
    Preserve,
    /// Lowercase message and template keywords alike.
    Fold,
}

impl KeywordCase {
    pub fn from_flag(case_insensitive: bool) -> Self {
        if case_insensitive { Self::Fold } else { Self::Preserve }
    }

    /// Normalize one keyword.
    pub fn apply(self, word: &str) -> Keyword {
        match self {
            Self::Preserve => word.to_string(),
            Self::Fold => word.to_lowercase(),
        }
    }
}

/// Extracts keyword sets from message text with an injected tagger.
#[derive(Clone)]
pub struct KeywordExtractor {
    tagger: Arc<dyn PosTagger>,
    case: KeywordCase,
}

impl KeywordExtractor {
    pub fn new(tagger: Arc<dyn PosTagger>) -> Self {
        Self {
            tagger,
            case: KeywordCase::Preserve,
        }
    }

    /// Extractor backed by the built-in [`LexiconTagger`].
    pub fn lexicon() -> Self {
        Self::new(Arc::new(LexiconTagger::new()))
    }

    pub fn with_case(mut self, case: KeywordCase) -> Self {
        self.case = case;
        self
    }

    pub fn case(&self) -> KeywordCase {
        self.case
    }

    /// Extract the deduplicated content words of `text`.
    ///
    /// Empty text yields an empty set. Fails only if the tagger does.
    pub fn extract_keywords(&self, text: &str) -> Result<KeywordSet, ExtractionError> {
        let tokens = self.tagger.tag(text)?;

        let keywords: KeywordSet = tokens
            .into_iter()
            .filter(|t| t.category.is_content())
            .map(|t| self.case.apply(&t.text))
            .collect();

        debug!(
            tagger = self.tagger.name(),
            count = keywords.len(),
            "Extracted keywords"
        );
        Ok(keywords)
    }
}

impl std::fmt::Debug for KeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordExtractor")
            .field("tagger", &self.tagger.name())
            .field("case", &self.case)
            .finish()
    }
}
