use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};
use tracing::warn;

/// Searches at or above this value are `Easy`.
pub const EASY_THRESHOLD: u64 = 50_000_000;
/// Searches at or above this value (and below [`EASY_THRESHOLD`]) are `Medium`.
pub const MEDIUM_THRESHOLD: u64 = 5_000_000;
pub const TARGET_PER_DIFFICULTY: usize = 70;

const BUILTIN_CATALOG: &str = include_str!("../data/terms.json");

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] =
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn from_searches(searches: u64) -> Self {
        if searches >= EASY_THRESHOLD {
            Difficulty::Easy
        } else if searches >= MEDIUM_THRESHOLD {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }

    /// Contract-side encoding of the tier.
    pub fn ordinal(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    fn index(self) -> usize {
        self.ordinal() as usize
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

pub fn compute_difficulty(searches: u64) -> Difficulty {
    Difficulty::from_searches(searches)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Familiarity {
    Global,
    Popular,
    Niche,
}

/// Catalog entry as stored on disk; the tier is derived, never read.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    pub id: String,
    pub term: String,
    pub searches: u64,
    pub image_url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub familiarity: Option<Familiarity>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    #[serde(rename = "term")]
    pub label: String,
    pub searches: u64,
    pub image_url: String,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub familiarity: Option<Familiarity>,
}

impl From<TermRecord> for Term {
    fn from(record: TermRecord) -> Self {
        Self {
            difficulty: compute_difficulty(record.searches),
            id: record.id,
            label: record.term,
            searches: record.searches,
            image_url: record.image_url,
            source: record.source,
            tags: record.tags,
            familiarity: record.familiarity,
        }
    }
}

/// Matches `easy|medium|hard term N`, case-insensitive, the shape of unfilled catalog
/// slots.
pub fn is_placeholder_label(label: &str) -> bool {
    let tokens: Vec<&str> = label.split_whitespace().collect();
    let [tier, word, number] = tokens.as_slice() else {
        return false;
    };
    Difficulty::from_str(tier).is_ok()
        && word.eq_ignore_ascii_case("term")
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
}

/// Labels need two characters after trimming. Characters are Unicode scalar values,
/// so a lone emoji is too short.
pub fn is_valid_term(term: &Term) -> bool {
    let label = term.label.trim();
    if label.is_empty() || is_placeholder_label(label) {
        return false;
    }
    label.chars().count() >= 2
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read term catalog at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse term catalog JSON")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Fillers {
    #[serde(default)]
    pub easy: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub hard: Vec<String>,
}

impl Fillers {
    fn for_tier(&self, tier: Difficulty) -> &[String] {
        match tier {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct CatalogFile {
    terms: Vec<TermRecord>,
    #[serde(default)]
    fillers: Fillers,
}

/// Read-only term catalog, partitioned by difficulty.
///
/// `by_difficulty` keeps every entry of a tier (placeholders included) so callers
/// can apply their own validity rules; `terms` is the flat list of valid entries.
#[derive(Clone, Debug, Default)]
pub struct TermCatalog {
    terms: Vec<Term>,
    tiers: [Vec<Term>; 3],
}

impl TermCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Ok(Self::with_padding(
            file.terms,
            &file.fillers,
            TARGET_PER_DIFFICULTY,
        ))
    }

    /// Builds a catalog from the given records only.
    pub fn from_records(records: impl IntoIterator<Item = TermRecord>) -> Self {
        Self::from_terms(records.into_iter().map(Term::from).collect())
    }

    /// Builds a catalog, topping each tier up to `target` entries with synthesized
    /// filler terms.
    pub fn with_padding(
        records: Vec<TermRecord>,
        fillers: &Fillers,
        target: usize,
    ) -> Self {
        let mut terms: Vec<Term> = records.into_iter().map(Term::from).collect();
        let mut additions = Vec::new();
        for tier in Difficulty::ALL {
            let count = terms.iter().filter(|t| t.difficulty == tier).count();
            if count >= target {
                continue;
            }
            let needed = target - count;
            let names = fillers.for_tier(tier);
            additions.extend(filler_terms(&names[..needed.min(names.len())], tier));
        }
        terms.extend(additions);
        Self::from_terms(terms)
    }

    fn from_terms(terms: Vec<Term>) -> Self {
        let deduped: Vec<Term> = terms.into_iter().unique_by(|t| t.id.clone()).collect();
        let mut tiers: [Vec<Term>; 3] = Default::default();
        for term in &deduped {
            tiers[term.difficulty.index()].push(term.clone());
        }
        let before = deduped.len();
        let valid: Vec<Term> = deduped.into_iter().filter(is_valid_term).collect();
        if valid.len() != before {
            warn!(
                before,
                after = valid.len(),
                "filtered invalid placeholder entries from term catalog"
            );
        }
        Self {
            terms: valid,
            tiers,
        }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn by_difficulty(&self, tier: Difficulty) -> &[Term] {
        &self.tiers[tier.index()]
    }

    /// Entries of `tier` that pass [`is_valid_term`].
    pub fn playable(&self, tier: Difficulty) -> Vec<Term> {
        self.by_difficulty(tier)
            .iter()
            .filter(|t| is_valid_term(t))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Term> {
        self.tiers.iter().flatten().find(|t| t.id == id)
    }
}

struct FillerBand {
    start: u64,
    step: u64,
    min: u64,
    max: Option<u64>,
}

fn filler_band(tier: Difficulty) -> FillerBand {
    match tier {
        Difficulty::Easy => FillerBand {
            start: 150_000_000,
            step: 2_000_000,
            min: EASY_THRESHOLD + 2_000_000,
            max: None,
        },
        Difficulty::Medium => FillerBand {
            start: 42_000_000,
            step: 500_000,
            min: MEDIUM_THRESHOLD + 200_000,
            max: None,
        },
        Difficulty::Hard => FillerBand {
            start: 4_500_000,
            step: 70_000,
            min: 200_000,
            max: Some(MEDIUM_THRESHOLD - 100_000),
        },
    }
}

fn filler_terms(names: &[String], tier: Difficulty) -> Vec<Term> {
    let band = filler_band(tier);
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let raw = band.start.saturating_sub(idx as u64 * band.step);
            let searches = raw.max(band.min).min(band.max.unwrap_or(band.start));
            Term {
                id: format!("{}-{}", tier.key(), slug(name)),
                label: name.clone(),
                searches,
                image_url: format!(
                    "https://picsum.photos/seed/{}/900/1200",
                    encode_uri_component(name)
                ),
                difficulty: tier,
                source: None,
                tags: Vec::new(),
                familiarity: None,
            }
        })
        .collect()
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_gap = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            in_gap = false;
        } else if !in_gap {
            out.push('-');
            in_gap = true;
        }
    }
    out
}

fn encode_uri_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::test_helpers::record;
    use proptest::prelude::*;

    #[test]
    fn compute_difficulty__uses_inclusive_lower_bounds() {
        assert_eq!(compute_difficulty(50_000_000), Difficulty::Easy);
        assert_eq!(compute_difficulty(49_999_999), Difficulty::Medium);
        assert_eq!(compute_difficulty(5_000_000), Difficulty::Medium);
        assert_eq!(compute_difficulty(4_999_999), Difficulty::Hard);
        assert_eq!(compute_difficulty(0), Difficulty::Hard);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn compute_difficulty__bands_cover_all_magnitudes_without_overlap(searches in any::<u64>()) {
            let tier = compute_difficulty(searches);
            let in_easy = searches >= EASY_THRESHOLD;
            let in_medium = (MEDIUM_THRESHOLD..EASY_THRESHOLD).contains(&searches);
            let in_hard = searches < MEDIUM_THRESHOLD;
            prop_assert_eq!([in_easy, in_medium, in_hard].iter().filter(|b| **b).count(), 1);
            prop_assert_eq!(tier == Difficulty::Easy, in_easy);
            prop_assert_eq!(tier == Difficulty::Medium, in_medium);
            prop_assert_eq!(tier == Difficulty::Hard, in_hard);
        }

        #[test]
        fn by_difficulty__only_holds_terms_of_its_band(magnitudes in proptest::collection::vec(0u64..200_000_000, 1..40)) {
            let records = magnitudes
                .iter()
                .enumerate()
                .map(|(i, searches)| record(&format!("t{i}"), &format!("Term {i}"), *searches));
            let catalog = TermCatalog::from_records(records);
            for tier in Difficulty::ALL {
                for term in catalog.by_difficulty(tier) {
                    prop_assert_eq!(compute_difficulty(term.searches), tier);
                }
            }
            let total: usize = Difficulty::ALL.iter().map(|t| catalog.by_difficulty(*t).len()).sum();
            prop_assert_eq!(total, magnitudes.len());
        }
    }

    #[test]
    fn is_placeholder_label__matches_unfilled_slots_only() {
        assert!(is_placeholder_label("easy term 1"));
        assert!(is_placeholder_label("  Hard   TERM 42 "));
        assert!(!is_placeholder_label("hard term"));
        assert!(!is_placeholder_label("easy term 4b"));
        assert!(!is_placeholder_label("Google"));
    }

    #[test]
    fn is_valid_term__rejects_short_and_placeholder_labels() {
        let mut term = Term::from(record("a", "Google", 10));
        assert!(is_valid_term(&term));
        term.label = " X ".to_string();
        assert!(!is_valid_term(&term));
        term.label = "medium term 3".to_string();
        assert!(!is_valid_term(&term));
        term.label = String::new();
        assert!(!is_valid_term(&term));
    }

    #[test]
    fn is_valid_term__counts_characters_not_bytes_or_code_units() {
        let mut term = Term::from(record("a", "Google", 10));
        term.label = "🔥".to_string();
        assert!(!is_valid_term(&term));
        term.label = "é".to_string();
        assert!(!is_valid_term(&term));
        term.label = "日本".to_string();
        assert!(is_valid_term(&term));
    }

    #[test]
    fn catalog__when_placeholders_present_then_flat_list_excludes_them() {
        // given
        let records = vec![
            record("a", "Alpha", 60_000_000),
            record("b", "easy term 7", 61_000_000),
        ];

        // when
        let catalog = TermCatalog::from_records(records);

        // then
        assert_eq!(catalog.terms().len(), 1);
        assert_eq!(catalog.by_difficulty(Difficulty::Easy).len(), 2);
        assert_eq!(catalog.playable(Difficulty::Easy).len(), 1);
    }

    #[test]
    fn catalog__when_ids_repeat_then_first_entry_wins() {
        let catalog = TermCatalog::from_records(vec![
            record("dup", "First", 10),
            record("dup", "Second", 20),
        ]);
        assert_eq!(catalog.terms().len(), 1);
        assert_eq!(catalog.get("dup").map(|t| t.label.as_str()), Some("First"));
    }

    #[test]
    fn with_padding__when_tier_is_short_then_fillers_fill_the_band() {
        // given
        let records = vec![record("solo", "Solo", 1_000_000)];
        let fillers = Fillers {
            easy: vec![],
            medium: vec![],
            hard: vec!["Notion AI".to_string(), "FL Studio".to_string()],
        };

        // when
        let catalog = TermCatalog::with_padding(records, &fillers, 3);

        // then
        let hard = catalog.by_difficulty(Difficulty::Hard);
        assert_eq!(hard.len(), 3);
        let notion = catalog.get("hard-notion-ai").expect("filler present");
        assert_eq!(notion.searches, 4_500_000);
        assert_eq!(
            notion.image_url,
            "https://picsum.photos/seed/Notion%20AI/900/1200"
        );
        let fl = catalog.get("hard-fl-studio").expect("filler present");
        assert_eq!(fl.searches, 4_430_000);
        assert!(hard.iter().all(|t| t.difficulty == Difficulty::Hard));
    }

    #[test]
    fn builtin__fills_every_tier_to_target() {
        let catalog = TermCatalog::builtin().unwrap();
        for tier in Difficulty::ALL {
            let entries = catalog.by_difficulty(tier);
            assert!(entries.len() >= 30, "{tier} has {}", entries.len());
            assert!(
                entries
                    .iter()
                    .all(|t| compute_difficulty(t.searches) == tier)
            );
        }
        assert!(catalog.get("google").is_some());
    }
}
