use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use strsim::jaro_winkler;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use super::types::{EntitySet, ExtractionRules};
use crate::TARGET_ENTITY;

/// Only this much of the article body is scanned; extraction cost is
/// bounded regardless of article length.
const MAX_SCAN_CHARS: usize = 3000;

/// Articles shorter than this carry too little signal to extract from.
const MIN_TEXT_CHARS: usize = 50;

/// Two entity names at or above this jaro-winkler similarity are treated
/// as the same entity during dedup.
const DEDUP_SIMILARITY: f64 = 0.93;

lazy_static! {
    static ref PERSON_TITLE_RE: Regex = Regex::new(
        r"\b(?:President|Prime Minister|Minister|Chancellor|Senator|Governor|Mayor|General|CEO|Director|Pope|Dr\.?|Mr\.?|Mrs\.?|Ms\.?)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\b"
    )
    .unwrap();
    static ref PERSON_ATTRIBUTION_RE: Regex = Regex::new(
        r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\s+(?:said|announced|declared|stated|confirmed|told|warned)\b"
    )
    .unwrap();
    static ref ORG_SUFFIX_RE: Regex = Regex::new(
        r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\s+(?:Corporation|Corp|Company|Inc|Ltd|University|College|Hospital|Department|Ministry|Agency|Authority|Commission)\b"
    )
    .unwrap();
    static ref ORG_ACRONYM_RE: Regex =
        Regex::new(r"\b(NATO|EU|UN|FBI|CIA|NSA|WHO|NASA|IMF|WTO|OPEC|ECB|FAA|FDA|CDC)\b").unwrap();
    static ref IN_LOCATION_RE: Regex =
        Regex::new(r"\bin\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\b").unwrap();
    static ref CITY_STATE_RE: Regex =
        Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*),\s+([A-Z]{2})\b").unwrap();
    static ref MONTH_DATE_RE: Regex = Regex::new(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:,?\s+\d{4})?\b"
    )
    .unwrap();
    static ref NUMERIC_DATE_RE: Regex =
        Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap();
    static ref ISO_DATE_RE: Regex = Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap();
    static ref WEEKDAY_RE: Regex =
        Regex::new(r"\b(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday)\b").unwrap();
    static ref CAPITALIZED_WORD_RE: Regex = Regex::new(r"\b([A-Z][a-z]+)\b").unwrap();

    /// Well-known organizations that the suffix patterns miss.
    static ref KNOWN_ORGS: HashSet<&'static str> = [
        "Reuters", "Associated Press", "BBC", "CNN", "Al Jazeera", "Fox News",
        "Catholic Church", "White House", "Pentagon", "Kremlin", "Congress",
        "Senate", "Parliament", "Supreme Court", "World Bank", "Red Cross",
        "United Nations", "European Union",
    ]
    .into_iter()
    .collect();

    /// Major cities and countries; the positional patterns catch the rest.
    static ref KNOWN_LOCATIONS: HashSet<&'static str> = [
        "Washington", "London", "Paris", "Berlin", "Tokyo", "Beijing", "Moscow",
        "Rome", "Madrid", "Brussels", "Geneva", "Vienna", "Kyiv", "Warsaw",
        "Jerusalem", "Cairo", "Dubai", "Mumbai", "Delhi", "Seoul", "Singapore",
        "Sydney", "Toronto", "Ottawa", "Chicago", "Boston", "Ukraine", "Russia",
        "China", "France", "Germany", "Britain", "England", "Israel", "Iran",
        "Iraq", "Syria", "Turkey", "India", "Japan", "Canada", "Mexico",
        "Brazil", "Australia", "Egypt", "Taiwan", "Gaza", "Europe", "Africa",
        "America",
    ]
    .into_iter()
    .collect();

    /// Capitalized words that are not entities: function words, weekdays,
    /// months, newsroom boilerplate.
    static ref NON_ENTITIES: HashSet<&'static str> = [
        "The", "This", "That", "These", "Those", "There", "Here", "When",
        "Where", "What", "Who", "Why", "How", "Monday", "Tuesday", "Wednesday",
        "Thursday", "Friday", "Saturday", "Sunday", "January", "February",
        "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December", "New", "First", "Last", "Next",
        "Other", "Another", "Some", "Many", "Most", "Few", "All", "Both",
        "Each", "Every", "Any", "Several", "Following", "According", "However",
        "Meanwhile", "Moreover", "Furthermore", "Therefore", "View",
        "Comments", "Share", "Tweet", "Getty", "Images", "Photo", "Video",
        "More", "News", "Story", "Article", "Report", "Update", "Breaking",
        "Live", "Latest", "Today", "Yesterday", "Tomorrow", "Before", "After",
        "During", "While", "Since", "Until", "Through", "From", "Among",
        "Between", "Against", "About", "Above", "Below", "Again", "Once",
    ]
    .into_iter()
    .collect();
}

/// Extract entity sets from article text.
///
/// Pure pattern/heuristic extraction: title-prefixed person names,
/// attribution phrases, organization suffixes and lexicons, location
/// lexicons and positional patterns, and four date formats. Malformed or
/// empty text yields empty sets for all categories, never an error;
/// downstream degrades to title/time matching for such articles.
pub fn extract(text: &str, rules: &ExtractionRules) -> EntitySet {
    if text.len() < MIN_TEXT_CHARS {
        return EntitySet::default();
    }

    let scan = truncate_on_char_boundary(text, MAX_SCAN_CHARS);

    let mut persons = Vec::new();
    for caps in PERSON_TITLE_RE
        .captures_iter(scan)
        .chain(PERSON_ATTRIBUTION_RE.captures_iter(scan))
    {
        if let Some(m) = caps.get(1) {
            push_entity(&mut persons, m.as_str(), rules);
        }
    }

    let mut organizations = Vec::new();
    for caps in ORG_SUFFIX_RE.captures_iter(scan) {
        if let Some(m) = caps.get(0) {
            push_entity(&mut organizations, m.as_str(), rules);
        }
    }
    for caps in ORG_ACRONYM_RE.captures_iter(scan) {
        if let Some(m) = caps.get(1) {
            push_entity(&mut organizations, m.as_str(), rules);
        }
    }
    for org in KNOWN_ORGS.iter() {
        if scan.contains(org) {
            push_entity(&mut organizations, org, rules);
        }
    }

    let mut locations = Vec::new();
    for caps in IN_LOCATION_RE.captures_iter(scan) {
        if let Some(m) = caps.get(1) {
            if KNOWN_LOCATIONS.contains(m.as_str())
                || m.as_str().split_whitespace().count() > 1
            {
                push_entity(&mut locations, m.as_str(), rules);
            }
        }
    }
    for caps in CITY_STATE_RE.captures_iter(scan) {
        if let Some(m) = caps.get(1) {
            push_entity(&mut locations, m.as_str(), rules);
        }
    }
    for loc in KNOWN_LOCATIONS.iter() {
        if scan.contains(loc) {
            push_entity(&mut locations, loc, rules);
        }
    }

    let mut dates = Vec::new();
    for re in [&*MONTH_DATE_RE, &*NUMERIC_DATE_RE, &*ISO_DATE_RE, &*WEEKDAY_RE] {
        for m in re.find_iter(scan) {
            let date = m.as_str().trim().to_string();
            if !dates.contains(&date) {
                dates.push(date);
            }
        }
    }
    dates.truncate(rules.max_per_category);

    persons.truncate(rules.max_per_category);
    organizations.truncate(rules.max_per_category);
    locations.truncate(rules.max_per_category);

    let key_entities = extract_key_entities(scan, rules);

    let set = EntitySet {
        persons,
        organizations,
        locations,
        dates,
        key_entities,
    };

    debug!(
        target: TARGET_ENTITY,
        "Extracted {} entities: {} persons, {} orgs, {} locations, {} dates, {} key",
        set.total_count(),
        set.persons.len(),
        set.organizations.len(),
        set.locations.len(),
        set.dates.len(),
        set.key_entities.len()
    );

    set
}

/// Flat lowercase proper-noun set; the clustering engine's primary entity
/// universe.
fn extract_key_entities(scan: &str, rules: &ExtractionRules) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in CAPITALIZED_WORD_RE.captures_iter(scan) {
        let word = &caps[1];
        if word.len() <= rules.min_entity_length
            || word.len() > rules.max_entity_length
            || NON_ENTITIES.contains(word)
        {
            continue;
        }
        let lower = word.to_lowercase();
        if seen.insert(lower.clone()) {
            out.push(lower);
        }
    }
    out
}

/// Normalize an entity name for storage: NFKC, collapsed whitespace.
pub fn normalize_entity_name(name: &str) -> String {
    name.nfkc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_entity(bucket: &mut Vec<String>, raw: &str, rules: &ExtractionRules) {
    let name = normalize_entity_name(raw);
    if name.len() < rules.min_entity_length || name.len() > rules.max_entity_length {
        return;
    }
    let duplicate = bucket
        .iter()
        .any(|existing| jaro_winkler(&existing.to_lowercase(), &name.to_lowercase()) >= DEDUP_SIMILARITY);
    if !duplicate {
        bucket.push(name);
    }
}

fn truncate_on_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
