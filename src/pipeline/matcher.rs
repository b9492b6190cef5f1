//! Template matching: keyword set → best canned response.
//!
//! A template's score is the fraction of its own required keywords present
//! in the message (`|K ∩ T| / |T|`), so smaller templates are easier to
//! satisfy. The best score wins, ties go to the earlier template, and
//! nothing is selected unless the best score is strictly above one half.

use std::cmp::Ordering;

use tracing::debug;

use crate::pipeline::templates::Template;
use crate::pipeline::types::KeywordSet;

/// Scores must be strictly greater than this to be selected.
pub const MATCH_THRESHOLD: Score = Score {
    matched: 1,
    required: 2,
};

/// An exact overlap ratio `matched / required`.
///
/// Compared by cross-multiplication so `1/2 == 2/4` and the threshold
/// boundary is never subject to floating-point rounding.
#[derive(Debug, Clone, Copy)]
pub struct Score {
    matched: usize,
    required: usize,
}

impl Score {
    pub const ZERO: Score = Score {
        matched: 0,
        required: 1,
    };

    /// `required` must be non-zero; the catalog guarantees it for templates.
    pub fn new(matched: usize, required: usize) -> Self {
        debug_assert!(required > 0, "score denominator must be non-zero");
        Self { matched, required }
    }

    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn as_f64(&self) -> f64 {
        self.matched as f64 / self.required as f64
    }

    /// Whether this score clears [`MATCH_THRESHOLD`] (strictly).
    pub fn exceeds_threshold(&self) -> bool {
        *self > MATCH_THRESHOLD
    }

    fn cross(&self, other: &Score) -> (u128, u128) {
        (
            self.matched as u128 * other.required as u128,
            other.matched as u128 * self.required as u128,
        )
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        let (lhs, rhs) = self.cross(other);
        lhs == rhs
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = self.cross(other);
        lhs.cmp(&rhs)
    }
}

/// Score one template against a keyword set.
pub fn score(keywords: &KeywordSet, template: &Template) -> Score {
    let required = template.required_keywords();
    let matched = required.iter().filter(|k| keywords.contains(*k)).count();
    Score::new(matched, required.len())
}

/// The selected template and how well it matched.
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch<'a> {
    /// Position of the template in the catalog.
    pub index: usize,
    pub template: &'a Template,
    pub score: Score,
}

impl<'a> TemplateMatch<'a> {
    pub fn response_text(&self) -> &'a str {
        self.template.response_text()
    }
}

/// Pick the best template for `keywords`, or `None` if nothing clears the
/// threshold.
///
/// Catalog order is significant: a later template only replaces the current
/// best with a strictly higher score.
pub fn find_best_template<'a>(
    keywords: &KeywordSet,
    catalog: &'a [Template],
) -> Option<TemplateMatch<'a>> {
    let mut best: Option<TemplateMatch<'a>> = None;
    let mut max_score = Score::ZERO;

    for (index, template) in catalog.iter().enumerate() {
        let score = score(keywords, template);
        if score > max_score {
            max_score = score;
            best = Some(TemplateMatch {
                index,
                template,
                score,
            });
        }
    }

    match best {
        Some(m) if m.score.exceeds_threshold() => {
            debug!(
                template = m.index,
                matched = m.score.matched(),
                required = m.score.required(),
                "Template selected"
            );
            Some(m)
        }
        Some(m) => {
            debug!(
                template = m.index,
                score = m.score.as_f64(),
                "Best template below threshold"
            );
            None
        }
        None => None,
    }
}
