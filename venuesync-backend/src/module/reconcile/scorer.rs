///! Geo-text similarity scoring
///!
///! Pure functions used by the matcher: venue name normalization,
///! fuzzy name similarity and great-circle distance.

use regex::Regex;
use std::sync::LazyLock;
use strsim::levenshtein;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Score returned when one normalized name contains the other
pub const CONTAINMENT_SIMILARITY: f64 = 0.9;

/// Venue-type words and articles that carry no identifying signal when they lead a name.
/// Matched after normalization, so accented forms are already folded.
const GENERIC_PREFIXES: &[&str] = &[
    "cafe", "bar", "pub", "bodega", "restaurant", "the", "den", "det",
];

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid punctuation pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Fold one lowercase character to its ASCII spelling, if it has one.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'æ' => "ae",
        'ø' | 'ö' | 'ó' | 'ò' | 'ô' | 'õ' => "o",
        'å' => "aa",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'ü' | 'ú' | 'ù' | 'û' => "u",
        'ä' | 'á' | 'à' | 'â' | 'ã' => "a",
        'í' | 'ì' | 'î' | 'ï' => "i",
        'ß' => "ss",
        'ç' => "c",
        'ñ' => "n",
        '&' | '+' => " and ",
        _ => return None,
    };
    Some(folded)
}

/// Normalize a venue name for comparison.
///
/// Lowercases, folds Nordic/Western European letters to ASCII
/// (`æ`→`ae`, `ø`→`o`, `å`→`aa`, ...), spells out `&`/`+` as `and`,
/// strips remaining punctuation and collapses whitespace.
pub fn normalize(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        match fold_char(c) {
            Some(s) => folded.push_str(s),
            None => folded.push(c),
        }
    }

    let stripped = PUNCTUATION.replace_all(&folded, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Remove one leading generic word ("cafe", "bar", "the", ...) from a normalized name.
///
/// A name that consists of nothing but the generic word is returned unchanged,
/// otherwise "Bar" and "Pub" would both reduce to the empty string and compare equal.
pub fn strip_generic_prefix(name: &str) -> &str {
    if let Some((first, rest)) = name.split_once(' ') {
        let rest = rest.trim_start();
        if !rest.is_empty() && GENERIC_PREFIXES.contains(&first) {
            return rest;
        }
    }
    name
}

/// Name similarity in `[0, 1]`, symmetric in its arguments.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let n1 = strip_generic_prefix(&a);
    let n2 = strip_generic_prefix(&b);

    if n1 == n2 {
        return 1.0;
    }
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }
    if n1.contains(n2) || n2.contains(n1) {
        return CONTAINMENT_SIMILARITY;
    }

    let max_len = n1.chars().count().max(n2.chars().count());
    let distance = levenshtein(n1, n2);
    (1.0 - distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Haversine distance between two coordinates, in meters.
pub fn great_circle_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}
