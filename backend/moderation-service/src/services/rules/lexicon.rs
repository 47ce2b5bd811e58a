//! Severity-weighted flagged-term lexicon used by the text engine.

use crate::error::{ModerationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

/// Cumulative lexicon score is capped here before flag rules apply.
const MAX_CUMULATIVE_SCORE: f64 = 2.0;
/// Extra penalty per critical term.
const CRITICAL_BONUS: f64 = 0.5;
/// Extra penalty when two or more high-severity terms co-occur.
const HIGH_PAIR_BONUS: f64 = 0.3;
/// Matched terms listed in a reason before the rest are summarized.
const REASON_TERM_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.7,
            Severity::Medium => 0.4,
            Severity::Low => 0.2,
        }
    }
}

impl FromStr for Severity {
    type Err = ModerationError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(ModerationError::Config(format!("Unknown severity: {}", other))),
        }
    }
}

use Severity::{Critical, High, Low, Medium};

const CRIMINAL_OFFENSES: &[(&str, Severity)] = &[
    ("murder", Critical), ("kill", Critical), ("homicide", Critical),
    ("manslaughter", High), ("assassinate", Critical), ("slaughter", Critical),
    ("rape", Critical), ("molest", Critical), ("molestation", Critical),
    ("sexual assault", Critical), ("incest", Critical), ("sodomy", High),
    ("assault", High), ("attack", High), ("beat", High), ("batter", High),
    ("abuse", High), ("torture", Critical), ("mutilate", Critical),
    ("theft", High), ("robbery", High), ("burglary", High), ("steal", High),
    ("loot", High), ("plunder", High), ("dacoity", Critical),
    ("fraud", High), ("cheat", High), ("scam", High), ("deceive", Medium),
    ("forgery", High), ("counterfeit", High), ("fake", Medium),
    ("drugs", High), ("narcotics", High), ("heroin", Critical),
    ("cocaine", Critical), ("meth", Critical), ("opium", High),
    ("terrorism", Critical), ("terrorist", Critical), ("bomb", Critical),
    ("explosive", Critical), ("organized crime", Critical), ("mafia", High),
    ("kidnapping", Critical), ("abduction", Critical), ("extortion", High),
    ("blackmail", High), ("defamation", Medium), ("slander", Medium),
];

const HATE_SPEECH: &[(&str, Severity)] = &[
    ("racist", Critical), ("nigger", Critical), ("chink", Critical),
    ("gook", Critical), ("spic", Critical), ("wetback", Critical),
    ("islamophobe", High), ("christianophobe", High), ("hinduphobe", High),
    ("antisemite", High), ("blasphemy", High),
    ("misogynist", High), ("sexist", High), ("homophobe", High),
    ("transphobe", High), ("patriarchy", Medium),
    ("hate", High), ("discrimination", Medium), ("prejudice", Medium),
    ("bigotry", High), ("intolerance", Medium),
];

const VIOLENCE: &[(&str, Severity)] = &[
    ("violent", High), ("violence", High), ("brutal", High),
    ("savage", High), ("barbaric", High), ("cruel", High),
    ("merciless", High), ("ruthless", High), ("vicious", High),
    ("aggressive", Medium), ("hostile", Medium), ("threatening", High),
    ("intimidate", High), ("menace", High), ("coerce", Medium),
];

const HARASSMENT: &[(&str, Severity)] = &[
    ("harassment", High), ("harass", High), ("stalk", High),
    ("stalking", High), ("bully", High), ("bullying", High),
    ("intimidation", High), ("threat", High),
    ("persecute", High), ("torment", High), ("annoy", Medium),
];

const PROFANITY: &[(&str, Severity)] = &[
    ("fuck", High), ("shit", Medium), ("damn", Low), ("hell", Low),
    ("asshole", High), ("bastard", High), ("bitch", High),
    ("cunt", Critical), ("motherfucker", Critical),
    ("dumb", Low), ("stupid", Low), ("idiot", Medium),
    ("moron", Medium), ("jerk", Medium),
];

const SPAM_INDICATORS: &[(&str, Severity)] = &[
    ("spam", High), ("bogus", Medium), ("phishing", High),
    ("malware", High), ("virus", High), ("hack", Medium),
    ("crack", Medium), ("pirate", Medium), ("torrent", Medium),
    ("advertisement", Medium), ("promo", Medium), ("marketing", Low),
    ("click here", Medium), ("buy now", Medium), ("limited time", Medium),
    ("free gift", Medium), ("win prize", Medium), ("lottery", High),
    ("casino", High), ("gambling", High), ("betting", High),
];

const ILLEGAL_ACTIVITIES: &[(&str, Severity)] = &[
    ("illegal", High), ("prohibited", High), ("banned", High),
    ("contraband", High), ("smuggle", High), ("traffick", Critical),
    ("corrupt", High), ("bribery", High), ("embezzle", High),
    ("launder", High), ("evade", High), ("tax evasion", High),
];

/// Outcome of scanning text against the lexicon
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconMatch {
    pub terms: Vec<String>,
    pub score: f64,
    pub flagged: bool,
}

impl LexiconMatch {
    pub fn reason(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }

        let shown = self
            .terms
            .iter()
            .take(REASON_TERM_LIMIT)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut reason = format!("Contains {} flagged words: {}", self.terms.len(), shown);
        if self.terms.len() > REASON_TERM_LIMIT {
            reason.push_str(&format!(
                " (and {} more)",
                self.terms.len() - REASON_TERM_LIMIT
            ));
        }
        Some(reason)
    }
}

/// Ordered, de-duplicated term table
#[derive(Debug, Clone)]
pub struct FlaggedTerms {
    terms: Vec<(String, Severity)>,
}

impl Default for FlaggedTerms {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FlaggedTerms {
    pub fn builtin() -> Self {
        let mut table = Self { terms: Vec::new() };
        for category in [
            CRIMINAL_OFFENSES,
            HATE_SPEECH,
            VIOLENCE,
            HARASSMENT,
            PROFANITY,
            SPAM_INDICATORS,
            ILLEGAL_ACTIVITIES,
        ] {
            table.extend(
                category
                    .iter()
                    .map(|(term, severity)| (term.to_string(), *severity)),
            );
        }
        table
    }

    /// Add terms; a term already present keeps its position but takes the
    /// new severity.
    pub fn extend(&mut self, terms: impl IntoIterator<Item = (String, Severity)>) {
        for (term, severity) in terms {
            let term = normalize_term(&term);
            if term.is_empty() {
                continue;
            }
            match self.terms.iter_mut().find(|(existing, _)| *existing == term) {
                Some(entry) => entry.1 = severity,
                None => self.terms.push((term, severity)),
            }
        }
    }

    /// Load `term` or `term,severity` lines; `#` comments and blank lines are
    /// skipped, missing severity means `high`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<(String, Severity)>> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ModerationError::Config(format!(
                "Failed to load sensitive words from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| -> Result<(String, Severity)> {
                match line.split_once(',') {
                    Some((term, severity)) => {
                        Ok((term.trim().to_lowercase(), severity.parse::<Severity>()?))
                    }
                    None => Ok((line.to_lowercase(), Severity::High)),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn severity_of(&self, term: &str) -> Option<Severity> {
        let term = normalize_term(term);
        self.terms
            .iter()
            .find(|(existing, _)| *existing == term)
            .map(|(_, severity)| *severity)
    }

    /// Whole-word (or whole-phrase) matching on Unicode word boundaries.
    pub fn scan(&self, text: &str) -> LexiconMatch {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized.unicode_words().collect();
        let word_set: HashSet<&str> = words.iter().copied().collect();
        let joined = format!(" {} ", words.join(" "));

        let mut terms = Vec::new();
        let mut score = 0.0;
        let mut critical_count = 0usize;
        let mut high_count = 0usize;

        for (term, severity) in &self.terms {
            let matched = if term.contains(' ') {
                joined.contains(&format!(" {} ", term))
            } else {
                word_set.contains(term.as_str())
            };
            if !matched {
                continue;
            }

            tracing::debug!(term = %term, severity = ?severity, "Flagged term matched");
            terms.push(term.clone());
            score += severity.weight();
            match severity {
                Severity::Critical => critical_count += 1,
                Severity::High => high_count += 1,
                _ => {}
            }
        }

        let mut score = f64::min(score, MAX_CUMULATIVE_SCORE);
        let mut flagged = false;
        if !terms.is_empty() {
            if critical_count >= 1 {
                score += critical_count as f64 * CRITICAL_BONUS;
                flagged = true;
            } else if high_count >= 2 {
                score += HIGH_PAIR_BONUS;
                flagged = true;
            } else if score >= 0.6 {
                flagged = true;
            }
        }
        if score >= 0.8 {
            flagged = true;
        }

        LexiconMatch {
            terms,
            score: score.min(1.0),
            flagged,
        }
    }
}

/// Lowercase and collapse inner whitespace so phrases compare word-by-word.
fn normalize_term(term: &str) -> String {
    term.to_lowercase()
        .unicode_words()
        .collect::<Vec<_>>()
        .join(" ")
}
