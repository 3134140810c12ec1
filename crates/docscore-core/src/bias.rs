//! Rule-based gender bias analysis.
//!
//! Counts gendered references in prose and separates three populations:
//!
//! - references attributed to a named person ("Mrs Curie ... she",
//!   "Albert Einstein ... he")
//! - generic references ("a physicist ... he")
//! - generic references that co-occur with a profession
//!
//! Only generic references contribute to the bias score. Pronouns that refer
//! to a specific named person are counted but never treated as bias.

use std::collections::BTreeMap;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

lazy_static! {
    static ref HONORIFIC_DOT: Regex = Regex::new(r"\b(Mr|Mrs|Ms|Dr|St)\.").unwrap();

    static ref SENTENCE_BOUNDARY: Regex = Regex::new(r"[.!?]+(?:\s+|$)|\n+").unwrap();

    static ref WORD: Regex = Regex::new(r"[A-Za-z']+").unwrap();

    static ref MALE_TITLED_NAME: Regex = Regex::new(
        r"\b(?:Mr|Sir|Lord|King|Prince|Father|Brother|Uncle)\s+[A-Z][\w'-]+"
    ).unwrap();

    static ref FEMALE_TITLED_NAME: Regex = Regex::new(
        r"\b(?:Mrs|Ms|Miss|Madam|Dame|Lady|Queen|Princess|Sister|Aunt)\s+[A-Z][\w'-]+"
    ).unwrap();

    /// Two or more adjacent capitalised words, e.g. "Albert Einstein".
    static ref CAPITALISED_RUN: Regex = Regex::new(
        r"\b[A-Z][a-z][\w'-]*(?:[ \t]+[A-Z][a-z][\w'-]*)+"
    ).unwrap();

    static ref NAME_WORD: Regex = Regex::new(r"[A-Z][a-z][\w'-]*").unwrap();

    static ref PROFESSION: Regex = Regex::new(
        r"(?i)\b(doctors?|nurses?|engineers?|scientists?|physicists?|chemists?|biologists?|mathematicians?|researchers?|professors?|teachers?|programmers?|developers?|lawyers?|judges?|pilots?|surgeons?|secretar(?:y|ies)|ceos?|executives?|managers?|leaders?|experts?|theorists?|astronauts?|architects?|founders?|presidents?|students?)\b"
    ).unwrap();
}

const MALE_PRONOUNS: &[&str] = &["he", "him", "his", "himself"];
const FEMALE_PRONOUNS: &[&str] = &["she", "her", "hers", "herself"];

const MALE_NOUNS: &[&str] = &[
    "man", "men", "boy", "boys", "father", "fathers", "son", "sons", "husband", "husbands",
    "gentleman", "gentlemen", "brother", "brothers",
];
const FEMALE_NOUNS: &[&str] = &[
    "woman", "women", "girl", "girls", "mother", "mothers", "daughter", "daughters", "wife",
    "wives", "lady", "ladies", "sister", "sisters",
];

/// Masculine words used for people in general.
const GENDERED_GENERIC_TERMS: &[&str] = &[
    "mankind", "manpower", "manmade", "chairman", "chairmen", "businessman", "businessmen",
    "fireman", "firemen", "policeman", "policemen", "spokesman", "spokesmen", "workman",
    "workmen", "layman", "laymen", "forefathers",
];

/// A capitalised run after one of these names a thing, not a person.
const DETERMINERS: &[&str] = &["the", "a", "an", "this", "that", "these", "those", "its", "their", "our"];

/// Capitalised only because they open the sentence.
const SENTENCE_OPENERS: &[&str] = &[
    "in", "on", "at", "for", "when", "while", "after", "before", "if", "although", "but", "and",
    "as", "since", "because", "then",
];

/// Named-person attribution lasts for the current and the next sentence.
const ATTRIBUTION_WINDOW: usize = 2;

const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference {
    Pronoun(Gender),
    Noun(Gender),
    GenericTerm,
}

fn is_one_of(word: &str, list: &[&str]) -> bool {
    list.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// Spans of untitled personal names in one sentence.
///
/// A run of capitalised words counts when it does not open the sentence, or
/// when it opens the sentence and a lowercase word follows it. Runs after a
/// determiner and runs overlapping a titled name are skipped.
fn untitled_names(sentence: &str, titled: &[Range<usize>]) -> Vec<Range<usize>> {
    CAPITALISED_RUN
        .find_iter(sentence)
        .filter_map(|run| {
            let words: Vec<_> = NAME_WORD.find_iter(run.as_str()).collect();
            let opens_sentence = run.start() == 0;
            if opens_sentence && is_one_of(words[0].as_str(), DETERMINERS) {
                return None;
            }
            let skip = usize::from(opens_sentence && is_one_of(words[0].as_str(), SENTENCE_OPENERS));
            if words.len() - skip < 2 {
                return None;
            }

            let span = run.start() + words[skip].start()..run.end();
            if span.start == 0 {
                let followed_by_lowercase = sentence[span.end..]
                    .trim_start()
                    .starts_with(|c: char| c.is_lowercase());
                if !followed_by_lowercase {
                    return None;
                }
            }
            let after_determiner = sentence[..span.start]
                .split_whitespace()
                .next_back()
                .is_some_and(|w| is_one_of(w, DETERMINERS));
            let overlaps_title = titled.iter().any(|t| t.start < span.end && span.start < t.end);
            (!after_determiner && !overlaps_title).then_some(span)
        })
        .collect()
}

fn classify(word: &str) -> Option<Reference> {
    let word = word.to_lowercase();
    let w = word.trim_matches('\'');
    if MALE_PRONOUNS.contains(&w) {
        Some(Reference::Pronoun(Gender::Male))
    } else if FEMALE_PRONOUNS.contains(&w) {
        Some(Reference::Pronoun(Gender::Female))
    } else if MALE_NOUNS.contains(&w) {
        Some(Reference::Noun(Gender::Male))
    } else if FEMALE_NOUNS.contains(&w) {
        Some(Reference::Noun(Gender::Female))
    } else if GENDERED_GENERIC_TERMS.contains(&w) {
        Some(Reference::GenericTerm)
    } else {
        None
    }
}

/// Counts from one pass over a text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysis {
    pub male_references: usize,
    pub female_references: usize,
    pub generic_male: usize,
    pub generic_female: usize,
    pub named_male_entities: usize,
    pub named_female_entities: usize,
    /// Names without a gendered title; their gender is taken from the pronoun.
    pub named_untitled_entities: usize,
    pub named_male_references: usize,
    pub named_female_references: usize,
    pub professional_male: usize,
    pub professional_female: usize,
    pub gendered_generic_terms: usize,
    /// Sentences where a generic pronoun was tied to a profession.
    pub examples: Vec<String>,
}

impl BiasAnalysis {
    pub fn analyze(text: &str) -> Self {
        let normalized = HONORIFIC_DOT.replace_all(text, "$1");
        let mut analysis = Self::default();
        let mut male_window = 0usize;
        let mut female_window = 0usize;
        let mut untitled_window = 0usize;

        for sentence in SENTENCE_BOUNDARY.split(&normalized) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            let mut title_spans = Vec::new();
            for m in MALE_TITLED_NAME.find_iter(sentence) {
                analysis.named_male_entities += 1;
                male_window = ATTRIBUTION_WINDOW;
                title_spans.push(m.range());
            }
            for m in FEMALE_TITLED_NAME.find_iter(sentence) {
                analysis.named_female_entities += 1;
                female_window = ATTRIBUTION_WINDOW;
                title_spans.push(m.range());
            }

            let untitled = untitled_names(sentence, &title_spans);
            if !untitled.is_empty() {
                analysis.named_untitled_entities += untitled.len();
                untitled_window = ATTRIBUTION_WINDOW;
            }
            title_spans.extend(untitled);

            let professional = PROFESSION.is_match(sentence);
            let mut tied_to_profession = false;

            for word in WORD.find_iter(sentence) {
                if title_spans.iter().any(|span| span.contains(&word.start())) {
                    continue;
                }
                let Some(reference) = classify(word.as_str()) else {
                    continue;
                };

                match reference {
                    Reference::GenericTerm => {
                        analysis.gendered_generic_terms += 1;
                        analysis.male_references += 1;
                        analysis.generic_male += 1;
                    }
                    Reference::Noun(gender) => {
                        analysis.count(gender);
                        analysis.count_generic(gender);
                    }
                    Reference::Pronoun(gender) => {
                        analysis.count(gender);
                        let attributed = untitled_window > 0
                            || match gender {
                                Gender::Male => male_window > 0,
                                Gender::Female => female_window > 0,
                            };
                        if attributed {
                            match gender {
                                Gender::Male => analysis.named_male_references += 1,
                                Gender::Female => analysis.named_female_references += 1,
                            }
                        } else {
                            analysis.count_generic(gender);
                            if professional {
                                tied_to_profession = true;
                                match gender {
                                    Gender::Male => analysis.professional_male += 1,
                                    Gender::Female => analysis.professional_female += 1,
                                }
                            }
                        }
                    }
                }
            }

            if tied_to_profession && analysis.examples.len() < MAX_EXAMPLES {
                analysis.examples.push(sentence.to_string());
            }

            male_window = male_window.saturating_sub(1);
            female_window = female_window.saturating_sub(1);
            untitled_window = untitled_window.saturating_sub(1);
        }

        analysis
    }

    fn count(&mut self, gender: Gender) {
        match gender {
            Gender::Male => self.male_references += 1,
            Gender::Female => self.female_references += 1,
        }
    }

    fn count_generic(&mut self, gender: Gender) {
        match gender {
            Gender::Male => self.generic_male += 1,
            Gender::Female => self.generic_female += 1,
        }
    }

    pub fn total_references(&self) -> usize {
        self.male_references + self.female_references
    }

    /// Share of generic references that are female.
    pub fn generic_representation_ratio(&self) -> Option<f64> {
        ratio(self.generic_female, self.generic_male + self.generic_female)
    }

    /// Share of profession-linked references that are female.
    pub fn professional_association_ratio(&self) -> Option<f64> {
        ratio(self.professional_female, self.professional_male + self.professional_female)
    }

    /// Bias value in `[0, 1]`; `0.0` when no generic gendered language is present.
    pub fn score(&self) -> f64 {
        let professional_skew = skew(self.professional_male, self.professional_female);
        let generic_skew = skew(self.generic_male, self.generic_female);
        let generic_terms_penalty = (0.1 * self.gendered_generic_terms as f64).min(0.3);

        (0.5 * professional_skew + 0.3 * generic_skew + generic_terms_penalty).clamp(0.0, 1.0)
    }

    pub fn statistics(&self) -> BTreeMap<String, Value> {
        let mut stats = BTreeMap::new();
        stats.insert("male_references".to_string(), json!(self.male_references));
        stats.insert("female_references".to_string(), json!(self.female_references));
        stats.insert(
            "generic_mentions".to_string(),
            json!({"male": self.generic_male, "female": self.generic_female}),
        );
        stats.insert(
            "named_entities".to_string(),
            json!({
                "male": self.named_male_entities,
                "female": self.named_female_entities,
                "untitled": self.named_untitled_entities,
                "male_references": self.named_male_references,
                "female_references": self.named_female_references,
            }),
        );
        stats.insert(
            "professional_associations".to_string(),
            json!({"male": self.professional_male, "female": self.professional_female}),
        );
        stats.insert("gendered_generic_terms".to_string(), json!(self.gendered_generic_terms));
        stats.insert(
            "generic_representation_ratio".to_string(),
            json!(self.generic_representation_ratio()),
        );
        stats.insert(
            "professional_association_ratio".to_string(),
            json!(self.professional_association_ratio()),
        );
        stats
    }
}

fn ratio(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

fn skew(a: usize, b: usize) -> f64 {
    let total = a + b;
    if total == 0 {
        0.0
    } else {
        (a as f64 - b as f64).abs() / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_gendered_language() {
        let analysis = BiasAnalysis::analyze(
            "String theory models particles as vibrating strings. It requires extra dimensions.",
        );
        assert_eq!(analysis.male_references, 0);
        assert_eq!(analysis.female_references, 0);
        assert_eq!(analysis.score(), 0.0);
        assert_eq!(analysis.generic_representation_ratio(), None);
        assert_eq!(analysis.statistics()["generic_representation_ratio"], Value::Null);
    }

    #[test]
    fn test_generic_professional_pronoun() {
        let analysis = BiasAnalysis::analyze("A physicist checks his equations before he publishes.");
        assert_eq!(analysis.male_references, 2);
        assert_eq!(analysis.professional_male, 2);
        assert_eq!(analysis.professional_association_ratio(), Some(0.0));
        assert!(analysis.score() > 0.7);
        assert_eq!(analysis.examples.len(), 1);
    }

    #[test]
    fn test_named_entity_pronouns_excluded() {
        let analysis = BiasAnalysis::analyze(
            "Mrs. Curie was a physicist. She won two Nobel prizes. Her notebooks are still radioactive.",
        );
        assert_eq!(analysis.named_female_entities, 1);
        assert_eq!(analysis.named_female_references, 1);
        assert_eq!(analysis.female_references, 2);
        // "Her" in the third sentence is outside the attribution window.
        assert_eq!(analysis.generic_female, 1);
        assert_eq!(analysis.professional_female, 0);
    }

    #[test]
    fn test_untitled_name_attributes_pronoun() {
        let named = BiasAnalysis::analyze("Albert Einstein was a physicist and he changed how we see time.");
        assert_eq!(named.named_untitled_entities, 1);
        assert_eq!(named.named_male_references, 1);
        assert_eq!(named.male_references, 1);
        assert_eq!(named.generic_male, 0);
        assert_eq!(named.professional_male, 0);
        assert!(named.examples.is_empty());

        let generic = BiasAnalysis::analyze("A physicist was there and he changed how we see time.");
        assert_eq!(generic.professional_male, 1);
        assert!(named.score() < generic.score());
    }

    #[test]
    fn test_untitled_name_mid_sentence() {
        let analysis = BiasAnalysis::analyze("The prize went to Marie Curie. Her notebooks are still radioactive.");
        assert_eq!(analysis.named_untitled_entities, 1);
        assert_eq!(analysis.named_female_references, 1);
        assert_eq!(analysis.generic_female, 0);
    }

    #[test]
    fn test_capitalised_things_are_not_names() {
        let analysis = BiasAnalysis::analyze(
            "The Standard Model is incomplete, so a physicist knows he must extend it. Quantum Gravity.",
        );
        assert_eq!(analysis.named_untitled_entities, 0);
        assert_eq!(analysis.professional_male, 1);
    }

    #[test]
    fn test_honorific_does_not_split_sentence() {
        let analysis = BiasAnalysis::analyze("Dr. Smith said Mr. Jones checked his data.");
        assert_eq!(analysis.named_male_entities, 1);
        assert_eq!(analysis.named_male_references, 1);
        assert_eq!(analysis.generic_male, 0);
        assert_eq!(analysis.score(), 0.0);
    }

    #[test]
    fn test_balanced_usage_scores_low() {
        let analysis = BiasAnalysis::analyze("Each researcher should check his or her results.");
        assert_eq!(analysis.professional_male, 1);
        assert_eq!(analysis.professional_female, 1);
        assert_eq!(analysis.score(), 0.0);
    }

    #[test]
    fn test_gendered_generic_terms() {
        let analysis = BiasAnalysis::analyze("Mankind has long asked the chairman of physics for answers.");
        assert_eq!(analysis.gendered_generic_terms, 2);
        assert!(analysis.score() > 0.0);
    }

    #[test]
    fn test_title_word_not_double_counted() {
        let analysis = BiasAnalysis::analyze("Sister Agnes taught mathematics.");
        assert_eq!(analysis.named_female_entities, 1);
        assert_eq!(analysis.female_references, 0);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let text = "The engineer said he would call the nurse once she arrived.";
        assert_eq!(BiasAnalysis::analyze(text), BiasAnalysis::analyze(text));
    }
}
