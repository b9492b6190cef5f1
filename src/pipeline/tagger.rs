//! Part-of-speech tagging for keyword extraction.
//!
//! The extractor only needs to know which tokens are content words, so any
//! tagger that maps tokens onto [`PosCategory`] can be plugged in. The
//! built-in [`LexiconTagger`] is a deterministic rule-based English tagger:
//! closed-class words come from fixed lexicons, open-class words are
//! classified by a small lexicon, capitalization and suffix rules.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;

/// Coarse grammatical category of a token (Universal POS style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosCategory {
    Noun,
    ProperNoun,
    Verb,
    Adjective,
    Adverb,
    Auxiliary,
    Determiner,
    Pronoun,
    Adposition,
    Conjunction,
    Particle,
    Interjection,
    Numeral,
    Punctuation,
}

impl PosCategory {
    /// Categories kept as keywords: common noun, verb, proper noun, adjective.
    pub fn is_content(self) -> bool {
        matches!(
            self,
            Self::Noun | Self::ProperNoun | Self::Verb | Self::Adjective
        )
    }
}

/// A token in its surface form plus its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedToken {
    pub text: String,
    pub category: PosCategory,
}

impl TaggedToken {
    pub fn new(text: impl Into<String>, category: PosCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

/// Pluggable tagging capability: text → sequence of (token, category).
pub trait PosTagger: Send + Sync {
    /// Tagger name for logging and errors.
    fn name(&self) -> &str;

    /// Tokenize and tag `text`. Must be deterministic for a given input.
    fn tag(&self, text: &str) -> Result<Vec<TaggedToken>, ExtractionError>;
}

// ── Lexicons ────────────────────────────────────────────────────────

/// Words, punctuation runs, and nothing else. Internal hyphens and
/// apostrophes stay inside the word (`on-hold`, `e-transfer`, `don't`).
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*|[^\s\p{L}\p{N}]").unwrap()
});

static NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+\-]?\d+(?:[.,]\d+)*$").unwrap());

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:st|nd|rd|th)$").unwrap());

static DETERMINERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "a", "an", "the", "this", "that", "these", "those", "each", "every", "some", "any",
        "no", "all", "both", "either", "neither", "another", "such", "what", "which",
        "whose", "whatever", "whichever",
    ])
});

static PRONOUNS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "i", "me", "my", "mine", "myself", "you", "your", "yours", "yourself", "yourselves",
        "we", "us", "our", "ours", "ourselves", "he", "him", "his", "himself", "she", "her",
        "hers", "herself", "it", "its", "itself", "they", "them", "their", "theirs",
        "themselves", "who", "whom", "someone", "somebody", "something", "anyone",
        "anybody", "anything", "everyone", "everybody", "everything", "nobody", "nothing",
        "none", "one", "ones",
    ])
});

static ADPOSITIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "in", "on", "at", "by", "for", "with", "about", "from", "of", "into", "onto", "over",
        "under", "after", "before", "between", "through", "during", "without", "within",
        "across", "against", "along", "among", "around", "behind", "beyond", "near",
        "toward", "towards", "upon", "via", "per", "until", "till", "despite", "inside",
        "outside", "throughout", "regarding", "re",
    ])
});

static CONJUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "and", "or", "but", "nor", "so", "because", "although", "though", "if", "unless",
        "while", "whereas", "whether", "than", "as", "once", "since", "plus",
    ])
});

static AUXILIARIES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "having", "do", "does", "did", "will", "would", "shall", "should", "can", "could",
        "may", "might", "must", "cannot", "don't", "doesn't", "didn't", "isn't", "aren't",
        "wasn't", "weren't", "haven't", "hasn't", "hadn't", "won't", "wouldn't", "can't",
        "couldn't", "shouldn't", "mustn't", "i'm", "i've", "i'd", "i'll", "you're", "you've",
        "you'd", "you'll", "we're", "we've", "we'd", "we'll", "they're", "they've",
        "they'd", "they'll", "he's", "she's", "it's", "that's", "there's", "what's",
        "where's", "who's",
    ])
});

static PARTICLES: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| HashSet::from(["not", "to", "n't", "'s", "up", "off", "out", "down"]));

static ADVERBS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "where", "when", "why", "how", "here", "there", "now", "then", "still", "just",
        "also", "very", "too", "again", "already", "soon", "yet", "ever", "never", "always",
        "often", "only", "even", "back", "today", "tomorrow", "yesterday", "almost",
        "instead", "maybe", "perhaps", "rather", "quite", "much", "more", "most", "less",
        "least", "away", "ago", "anymore", "else", "together", "asap",
    ])
});

static INTERJECTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "hi", "hello", "hey", "please", "ok", "okay", "yes", "yeah", "oh", "thanks",
        "dear", "regards", "cheers",
    ])
});

static NUMBER_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "zero", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "twenty", "thirty", "forty", "fifty", "hundred", "thousand",
    ])
});

static VERBS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "get", "got", "gets", "receive", "receives", "send", "sent", "sends", "ship", "ships",
        "pay", "paid", "make", "made", "take", "took", "give", "gave", "go", "went", "gone",
        "come", "came", "see", "saw", "seen", "know", "knew", "known", "think", "thought",
        "want", "wants", "need", "needs", "help", "check", "accept", "arrive", "arrives",
        "wait", "let", "tell", "told", "say", "said", "ask", "find", "found", "buy", "bought",
        "put", "keep", "kept", "leave", "left", "show", "resend", "refund", "cancel",
        "confirm", "provide", "contact", "look", "hear", "heard", "understand", "try",
        "hope", "wonder", "appreciate", "fix", "change", "return", "deliver", "process",
    ])
});

static ADJECTIVES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "wrong", "late", "new", "old", "good", "bad", "great", "correct", "right", "same",
        "other", "different", "last", "next", "first", "second", "few", "many", "several",
        "own", "sure", "able", "small", "large", "big", "regular", "full", "empty", "open",
        "closed", "free", "available", "urgent", "recent", "current", "pending", "broken",
        "damaged", "missing", "long", "short", "whole", "incorrect", "unable",
    ])
});

/// `-ly` words that are not adverbs.
static LY_NOUNS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "reply", "supply", "apply", "rely", "family", "july", "italy", "ally", "fly", "belly",
        "assembly", "anomaly", "monopoly",
    ])
});

/// Suffix-shaped words that stay nouns (`thing`, `need`, ...).
static SUFFIX_NOUNS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "thing", "things", "king", "ring", "spring", "string", "morning", "evening",
        "bed", "feed", "seed", "speed", "shed", "hundred", "red", "archive", "olive",
        "music", "topic", "logic", "traffic", "public",
    ])
});

/// `-al` words that are nouns (`email`, `refund approval`, ...).
static AL_NOUNS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "email", "emails", "signal", "animal", "total", "rental", "arrival", "approval",
        "removal", "renewal", "referral", "proposal", "journal", "portal", "terminal",
        "capital", "hospital", "material", "metal", "pedal", "petal", "crystal", "festival",
        "interval", "manual", "medal", "rival", "tutorial", "withdrawal", "dismissal",
        "disposal", "survival", "trial", "denial", "principal", "official", "potential",
    ])
});

const VERB_SUFFIXES: &[&str] = &["ed", "ing"];
const ADJECTIVE_SUFFIXES: &[&str] = &["able", "ible", "ful", "ous", "ive", "less", "ic", "al"];

// ── Lexicon tagger ──────────────────────────────────────────────────

/// Rule-based English tagger with no model files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconTagger;

impl LexiconTagger {
    pub fn new() -> Self {
        Self
    }

    /// Classify a single word. `sentence_start` disables the proper-noun
    /// capitalization rule for the first word of a sentence.
    pub fn classify(&self, word: &str, sentence_start: bool) -> PosCategory {
        if !word.chars().any(char::is_alphanumeric) {
            return PosCategory::Punctuation;
        }

        let lower = word.to_lowercase().replace('’', "'");
        let lower = lower.as_str();

        if NUMERAL_RE.is_match(lower) || NUMBER_WORDS.contains(lower) {
            return PosCategory::Numeral;
        }
        if ORDINAL_RE.is_match(lower) {
            return PosCategory::Adjective;
        }

        if let Some(category) = closed_class(lower) {
            return category;
        }

        if VERBS.contains(lower) {
            return PosCategory::Verb;
        }
        if ADJECTIVES.contains(lower) {
            return PosCategory::Adjective;
        }

        if !sentence_start && word.chars().next().is_some_and(char::is_uppercase) {
            return PosCategory::ProperNoun;
        }

        classify_by_suffix(lower)
    }
}

impl PosTagger for LexiconTagger {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn tag(&self, text: &str) -> Result<Vec<TaggedToken>, ExtractionError> {
        let mut tokens = Vec::new();
        let mut sentence_start = true;
        let mut last_end = 0;

        for m in TOKEN_RE.find_iter(text) {
            if text[last_end..m.start()].contains('\n') {
                sentence_start = true;
            }
            last_end = m.end();

            let word = m.as_str();
            let category = self.classify(word, sentence_start);

            match category {
                PosCategory::Punctuation => {
                    if matches!(word, "." | "!" | "?" | ":") {
                        sentence_start = true;
                    }
                }
                _ => sentence_start = false,
            }

            tokens.push(TaggedToken::new(word, category));
        }

        Ok(tokens)
    }
}

fn closed_class(lower: &str) -> Option<PosCategory> {
    let category = if AUXILIARIES.contains(lower) {
        PosCategory::Auxiliary
    } else if DETERMINERS.contains(lower) {
        PosCategory::Determiner
    } else if PRONOUNS.contains(lower) {
        PosCategory::Pronoun
    } else if PARTICLES.contains(lower) {
        PosCategory::Particle
    } else if ADPOSITIONS.contains(lower) {
        PosCategory::Adposition
    } else if CONJUNCTIONS.contains(lower) {
        PosCategory::Conjunction
    } else if ADVERBS.contains(lower) {
        PosCategory::Adverb
    } else if INTERJECTIONS.contains(lower) {
        PosCategory::Interjection
    } else {
        return None;
    };
    Some(category)
}

fn classify_by_suffix(lower: &str) -> PosCategory {
    if SUFFIX_NOUNS.contains(lower) || lower.len() <= 4 {
        return PosCategory::Noun;
    }
    if lower.ends_with("ly") && !LY_NOUNS.contains(lower) {
        return PosCategory::Adverb;
    }
    if VERB_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return PosCategory::Verb;
    }
    if ADJECTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) && !AL_NOUNS.contains(lower) {
        return PosCategory::Adjective;
    }
    PosCategory::Noun
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(text: &str) -> Vec<(String, PosCategory)> {
        LexiconTagger::new()
            .tag(text)
            .unwrap()
            .into_iter()
            .map(|t| (t.text, t.category))
            .collect()
    }

    fn category_of(text: &str, word: &str) -> PosCategory {
        categories(text)
            .into_iter()
            .find(|(t, _)| t == word)
            .map(|(_, c)| c)
            .unwrap_or_else(|| panic!("token {word:?} not found in {text:?}"))
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(categories("").is_empty());
        assert!(categories("   \n\t ").is_empty());
    }

    #[test]
    fn function_words_are_not_content() {
        for (text, word) in [
            ("The order", "The"),
            ("my order", "my"),
            ("order on hold", "on"),
            ("it is not here", "not"),
            ("where is it", "where"),
            ("order and refund", "and"),
            ("has it shipped", "has"),
        ] {
            assert!(
                !category_of(text, word).is_content(),
                "{word:?} in {text:?} should not be a content word"
            );
        }
    }

    #[test]
    fn punctuation_and_numerals() {
        assert_eq!(category_of("order #1234 ?", "#"), PosCategory::Punctuation);
        assert_eq!(category_of("order #1234 ?", "1234"), PosCategory::Numeral);
        assert_eq!(category_of("order #1234 ?", "?"), PosCategory::Punctuation);
        assert_eq!(category_of("two items", "two"), PosCategory::Numeral);
        assert_eq!(category_of("my 2nd order", "2nd"), PosCategory::Adjective);
    }

    #[test]
    fn hyphenated_words_stay_whole() {
        let tokens = categories("My e-transfer is on-hold");
        assert!(tokens.iter().any(|(t, c)| t == "e-transfer" && c.is_content()));
        assert!(tokens.iter().any(|(t, c)| t == "on-hold" && c.is_content()));
    }

    #[test]
    fn suffix_rules() {
        assert_eq!(category_of("it was shipped", "shipped"), PosCategory::Verb);
        assert_eq!(category_of("it is updating", "updating"), PosCategory::Verb);
        assert_eq!(category_of("a helpful note", "helpful"), PosCategory::Adjective);
        assert_eq!(category_of("it arrived quickly", "quickly"), PosCategory::Adverb);
        assert_eq!(category_of("your reply", "reply"), PosCategory::Noun);
        assert_eq!(category_of("the tracking number", "number"), PosCategory::Noun);
    }

    #[test]
    fn al_suffix_is_adjective_unless_listed_noun() {
        assert_eq!(category_of("a seasonal sale", "seasonal"), PosCategory::Adjective);
        assert_eq!(category_of("an additional charge", "additional"), PosCategory::Adjective);
        assert_eq!(category_of("your refund approval", "approval"), PosCategory::Noun);
        assert_eq!(category_of("the order total", "total"), PosCategory::Noun);
        assert_eq!(category_of("no confirmation email", "email"), PosCategory::Noun);
    }

    #[test]
    fn capitalized_mid_sentence_is_proper_noun() {
        assert_eq!(
            category_of("I love my Lootly points", "Lootly"),
            PosCategory::ProperNoun
        );
    }

    #[test]
    fn sentence_start_is_not_proper_noun() {
        assert_eq!(category_of("Tracking not updated", "Tracking"), PosCategory::Verb);
        assert_eq!(category_of("Fine. Package arrived", "Package"), PosCategory::Noun);
        assert_eq!(category_of("hello\nPackage arrived", "Package"), PosCategory::Noun);
    }

    #[test]
    fn curly_apostrophe_contractions_are_auxiliaries() {
        assert_eq!(category_of("I don’t know", "don’t"), PosCategory::Auxiliary);
    }

    #[test]
    fn tagging_is_deterministic() {
        let text = "Where is my tracking number? The order shipped last week.";
        assert_eq!(categories(text), categories(text));
    }
}
