use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z]{3,}").unwrap();

    static ref STOP_WORDS: HashSet<&'static str> = [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had",
        "has", "have", "was", "were", "with", "this", "that", "these",
        "those", "from", "they", "them", "their", "its", "his", "her", "she",
        "him", "who", "what", "when", "where", "which", "will", "would",
        "could", "should", "been", "being", "into", "over", "under", "after",
        "before", "while", "about", "than", "then", "there", "here", "also",
        "more", "most", "some", "such", "said", "says", "one", "two", "new",
        "out", "our", "per", "via",
    ]
    .into_iter()
    .collect();
}

/// Lowercase, stop-word-filtered, stemmed token stream.
pub fn tokenize(text: &str) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(|t| stemmer.stem(t).to_string())
        .collect()
}

/// L2-normalized TF-IDF vectors for a document collection, using
/// smoothed inverse document frequency.
pub fn tfidf_vectors(documents: &[String]) -> Vec<HashMap<String, f64>> {
    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let n = tokenized.len() as f64;

    let mut document_frequency: HashMap<&str, f64> = HashMap::new();
    for tokens in &tokenized {
        let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
        for term in unique {
            *document_frequency.entry(term).or_insert(0.0) += 1.0;
        }
    }

    tokenized
        .iter()
        .map(|tokens| {
            if tokens.is_empty() {
                return HashMap::new();
            }
            let mut counts: HashMap<&str, f64> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_insert(0.0) += 1.0;
            }
            let len = tokens.len() as f64;
            let mut vector: HashMap<String, f64> = counts
                .into_iter()
                .map(|(term, count)| {
                    let df = document_frequency.get(term).copied().unwrap_or(0.0);
                    let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                    (term.to_string(), (count / len) * idf)
                })
                .collect();

            let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for value in vector.values_mut() {
                    *value /= norm;
                }
            }
            vector
        })
        .collect()
}

/// Cosine similarity of two normalized sparse vectors.
pub fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, va)| large.get(term).map(|vb| va * vb))
        .sum()
}

/// Mean pairwise cosine similarity over a document collection; `None`
/// when fewer than two documents have usable text.
pub fn mean_pairwise_similarity(documents: &[String]) -> Option<f64> {
    let usable: Vec<String> = documents
        .iter()
        .filter(|d| !d.trim().is_empty())
        .cloned()
        .collect();
    if usable.len() < 2 {
        return None;
    }

    let vectors = tfidf_vectors(&usable);
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            total += cosine(&vectors[i], &vectors[j]);
            pairs += 1;
        }
    }

    Some((total / pairs as f64).clamp(0.0, 1.0))
}
