//! Task description analysis.
//!
//! [`analyze`] is total: every string, including the empty one, yields a valid
//! [`TaskAnalysis`]. Intent comes from the weighted rule table in
//! [`crate::core::rules`], code references from [`crate::core::code_refs`],
//! and complexity from word-count bands adjusted by structural signals.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::code_refs::{CodeRef, detect_code_refs};
use crate::core::rules::{rank_intents, score_intents};
use crate::core::types::{Complexity, Intent, LineRange};

/// Upper word-count bound (inclusive) for each tier below `Comprehensive`.
pub const MINIMAL_MAX_WORDS: usize = 15;
pub const STANDARD_MAX_WORDS: usize = 50;
pub const DETAILED_MAX_WORDS: usize = 150;

/// Structural signal counts that bump complexity by one tier.
pub const ENUMERATION_BUMP: usize = 3;
pub const REQUIREMENT_BUMP: usize = 3;

const MAX_KEYWORDS: usize = 24;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "because", "been", "before", "being", "below",
    "between", "both", "could", "does", "doing", "down", "during", "each", "either", "from",
    "have", "having", "here", "into", "just", "like", "make", "more", "most", "must", "need",
    "needs", "only", "other", "over", "please", "same", "should", "some", "such", "than", "that",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "under",
    "until", "very", "want", "were", "what", "when", "where", "which", "while", "will", "with",
    "within", "without", "would", "your",
];

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*+•]|\d{1,2}[.)])\s+\S").expect("list item pattern should be valid")
});

static INLINE_NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s,;:])\(?\d{1,2}\)\s+\S").expect("inline enumeration pattern should be valid")
});

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:must|should|shall|needs? to|has to|have to|required to)\b")
        .expect("requirement pattern should be valid")
});

static NON_FUNCTIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:performance|security|secure|scalab\w*|latency|throughput|availability|reliab\w*|compliance|accessib\w*|observab\w*|thread[- ]safe\w*|concurren\w*|gdpr|hipaa|sla|p99)\b",
    )
    .expect("non-functional pattern should be valid")
});

static ARCHITECTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\barchitecture\s*:|\barchitecture\s+(?:is|was|has\s+been)\s+(?:already\s+)?(?:decided|defined|fixed|settled|specified|agreed)\b|\barchitecture\s+decisions?\s+(?:are|were|have\s+been)\s+(?:made|final|documented|recorded)\b|\b(?:existing|current|agreed|established)\s+architecture\b",
    )
    .expect("architecture pattern should be valid")
});

static INTEGRATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:integrat\w*|consume|consuming|wrap|wrapping|connect\s+to|call(?:s|ing)?)\b")
        .expect("integration pattern should be valid")
});

static API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:apis?|sdks?|endpoints?|webhooks?)\b").expect("api pattern should be valid")
});

static API_SPEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:openapi|swagger|graphql\s+schema|api\s+(?:spec|specification|reference|docs|documentation|contract)|documented\s+(?:apis?|endpoints?)|(?:get|post|put|patch|delete)\s+/\S+)",
    )
    .expect("api specification pattern should be valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9_]*").expect("word pattern should be valid"));

/// Structural features of a description beyond its length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSignals {
    /// Bullet or numbered items.
    pub enumerated_items: usize,
    /// Sentences phrased as requirements ("must", "should", ...).
    pub requirement_statements: usize,
    /// Mentions a non-functional requirement (performance, security, ...).
    pub non_functional: bool,
    /// The description already records architecture decisions.
    pub architecture_specified: bool,
    /// The task integrates an external API whose contract is given.
    pub external_api_specified: bool,
}

impl StructuralSignals {
    /// True if these signals justify raising the word-count tier.
    pub fn bumps_complexity(&self) -> bool {
        self.enumerated_items >= ENUMERATION_BUMP
            || self.requirement_statements >= REQUIREMENT_BUMP
            || self.non_functional
    }
}

/// Immutable result of analyzing one task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub primary_intent: Intent,
    pub secondary_intents: Vec<Intent>,
    pub complexity: Complexity,
    pub existing_code_refs: Vec<CodeRef>,
    pub keywords: BTreeSet<String>,
    pub estimated_loc: u32,
    pub word_count: usize,
    pub intent_scores: BTreeMap<Intent, u32>,
    pub signals: StructuralSignals,
    /// Explicit line mentions that could not be tied to a file.
    pub line_mentions: Vec<LineRange>,
}

impl TaskAnalysis {
    /// Safe default for input with no words.
    pub fn degenerate() -> Self {
        Self {
            primary_intent: Intent::Explore,
            secondary_intents: Vec::new(),
            complexity: Complexity::Minimal,
            existing_code_refs: Vec::new(),
            keywords: BTreeSet::new(),
            estimated_loc: 0,
            word_count: 0,
            intent_scores: Intent::PRIORITY.into_iter().map(|intent| (intent, 0)).collect(),
            signals: StructuralSignals::default(),
            line_mentions: Vec::new(),
        }
    }

    pub fn references_existing_code(&self) -> bool {
        !self.existing_code_refs.is_empty()
    }
}

/// Classify a raw task description.
pub fn analyze(description: &str) -> TaskAnalysis {
    let word_count = description.split_whitespace().count();
    if word_count == 0 {
        return TaskAnalysis::degenerate();
    }

    let lowered = description.to_ascii_lowercase();
    let intent_scores = score_intents(&lowered);
    // No matched rule still yields refs and signals; only the intent falls back.
    let (primary_intent, secondary_intents) = rank_intents(&intent_scores);
    let scan = detect_code_refs(description);
    let signals = structural_signals(description, &lowered);
    let complexity = complexity_for(word_count, &signals);
    let estimated_loc = estimate_loc(complexity, primary_intent, &signals);

    TaskAnalysis {
        primary_intent,
        secondary_intents,
        complexity,
        existing_code_refs: scan.refs,
        keywords: extract_keywords(&lowered),
        estimated_loc,
        word_count,
        intent_scores,
        signals,
        line_mentions: scan.line_mentions,
    }
}

/// Word-count band, raised by at most one tier when signals warrant it.
pub fn complexity_for(word_count: usize, signals: &StructuralSignals) -> Complexity {
    let base = if word_count <= MINIMAL_MAX_WORDS {
        Complexity::Minimal
    } else if word_count <= STANDARD_MAX_WORDS {
        Complexity::Standard
    } else if word_count <= DETAILED_MAX_WORDS {
        Complexity::Detailed
    } else {
        Complexity::Comprehensive
    };
    if signals.bumps_complexity() {
        base.bumped()
    } else {
        base
    }
}

/// Coarse change-size estimate. Only the selector's risk rules read it.
pub fn estimate_loc(complexity: Complexity, intent: Intent, signals: &StructuralSignals) -> u32 {
    let base: u32 = match complexity {
        Complexity::Minimal => 20,
        Complexity::Standard => 80,
        Complexity::Detailed => 250,
        Complexity::Comprehensive => 600,
    };
    let percent: u32 = match intent {
        Intent::Fix => 50,
        Intent::Build => 150,
        Intent::Review => 20,
        Intent::Test => 80,
        Intent::Refactor => 120,
        Intent::Optimize => 80,
        Intent::Validate => 30,
        Intent::Explore => 10,
    };
    let items = u32::try_from(signals.enumerated_items).unwrap_or(u32::MAX);
    (base * percent / 100).saturating_add(items)
}

fn structural_signals(description: &str, lowered: &str) -> StructuralSignals {
    let list_items = LIST_ITEM_RE.find_iter(description).count();
    let inline_items = INLINE_NUMBERED_RE.find_iter(description).count();
    let external_api_specified = INTEGRATION_RE.is_match(lowered)
        && API_RE.is_match(lowered)
        && API_SPEC_RE.is_match(lowered);

    StructuralSignals {
        enumerated_items: list_items.max(inline_items),
        requirement_statements: REQUIREMENT_RE.find_iter(lowered).count(),
        non_functional: NON_FUNCTIONAL_RE.is_match(lowered),
        architecture_specified: ARCHITECTURE_RE.is_match(lowered),
        external_api_specified,
    }
}

fn extract_keywords(lowered: &str) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    for word in WORD_RE.find_iter(lowered).map(|found| found.as_str()) {
        if word.len() < 4 || STOP_WORDS.contains(&word) {
            continue;
        }
        keywords.insert(word.to_string());
    }
    // Keep a deterministic subset: the alphabetically first terms.
    keywords.into_iter().take(MAX_KEYWORDS).collect()
}
