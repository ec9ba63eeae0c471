//! Travel entity extraction
//!
//! Regex-based extraction of the entities that must survive a language
//! switch: airport codes, origin/destination, ISO dates, cabin class and a
//! nonstop preference. Keywords cover en, es, fr, de, pt and it.
//!
//! ```ignore
//! let extractor = EntityExtractor::new();
//! let entities = extractor.extract("flights from JFK to LAX on 2025-03-14");
//! assert_eq!(entities.get(EntityKind::Origin), Some("JFK"));
//! assert_eq!(entities.get(EntityKind::Date), Some("2025-03-14"));
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use skyvoice_core::{EntityKind, PreservedEntities};

static AIRPORT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3}\b").unwrap());

/// "from X to Y" and its translations, origin first
static ROUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:\b(?:from|desde|de|von|ab|da|dal|du)\b)\s+([A-Z]{3})\b.*?(?i:\b(?:to|a|à|al|hacia|para|pour|vers|nach|até|per)\b)\s+([A-Z]{3})\b",
    )
    .unwrap()
});

static ORIGIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\b(?:from|desde|von|ab|dal|du)\b)\s+([A-Z]{3})\b").unwrap()
});

static DESTINATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\b(?:to|hacia|para|pour|vers|nach|até)\b)\s+([A-Z]{3})\b").unwrap()
});

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());

/// Checked in order: premium economy must win over economy
static CABIN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "premium_economy",
            Regex::new(r"(?i)\bpremium\s+econom(?:y|ía|ia|ie)\b|\b(?:econom[ií]a|économie|economia)\s+premium\b").unwrap(),
        ),
        (
            "first",
            Regex::new(r"(?i)\bfirst\s+class\b|\bprimera\s+clase\b|\bpremière\s+classe\b|\berste[rn]?\s+klasse\b|\bprimeira\s+classe\b|\bprima\s+classe\b").unwrap(),
        ),
        (
            "business",
            Regex::new(r"(?i)\bbusiness\b|\bejecutiva\b|\bnegocios\b|\baffaires\b|\bexecutiva\b").unwrap(),
        ),
        (
            "economy",
            Regex::new(r"(?i)\beconomy\b|\bturista\b|\becon[oóô]mica\b|\béconomique\b|\beconomy\s*klasse\b").unwrap(),
        ),
    ]
});

static NONSTOP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bnon-?stop\b|\bdirect(?:o|e)?\b|\bsin\s+escalas?\b|\bsans\s+escale\b|\bdirekt(?:flug)?\b|\bohne\s+(?:umsteigen|zwischenstopp)\b|\bdireto\b|\bsem\s+escalas?\b|\bdiretto\b|\bsenza\s+scal[oi]\b",
    )
    .unwrap()
});

/// Upper-case words that look like airport codes but are not
const CODE_STOPWORDS: &[&str] = &[
    "THE", "AND", "FOR", "YOU", "ARE", "NOT", "BUT", "CAN", "ALL", "ANY", "HOW", "WHO", "WHY",
    "YES", "OUI", "QUE", "POR", "UND", "DIE", "DER", "DAS", "VON", "CON", "SIN", "NON", "PER",
    "UNA", "UNO", "LES", "DES", "MIT", "EIN",
];

/// Extracts travel entities from user text
#[derive(Debug, Clone, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all recognized entities from one utterance
    pub fn extract(&self, text: &str) -> PreservedEntities {
        let mut entities = PreservedEntities::new();

        let codes = self.airport_codes(text);
        for code in &codes {
            entities.insert(EntityKind::AirportCode, code.clone());
        }

        let (origin, destination) = self.route(text, &codes);
        if let Some(origin) = origin {
            entities.insert(EntityKind::Origin, origin);
        }
        if let Some(destination) = destination {
            entities.insert(EntityKind::Destination, destination);
        }

        if let Some(date) = self.date(text) {
            entities.insert(EntityKind::Date, date);
        }

        if let Some(cabin) = self.cabin_class(text) {
            entities.insert(EntityKind::CabinClass, cabin);
        }

        if NONSTOP_PATTERN.is_match(text) {
            entities.insert(EntityKind::Nonstop, "true");
        }

        entities
    }

    /// Extract over several utterances, oldest first; newer values win
    pub fn extract_all<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> PreservedEntities {
        let mut merged = PreservedEntities::new();
        for text in texts {
            merged.merge(&self.extract(text));
        }
        merged
    }

    fn airport_codes(&self, text: &str) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for m in AIRPORT_PATTERN.find_iter(text) {
            let code = m.as_str();
            if CODE_STOPWORDS.contains(&code) || codes.iter().any(|c| c == code) {
                continue;
            }
            codes.push(code.to_string());
        }
        codes
    }

    fn route(&self, text: &str, codes: &[String]) -> (Option<String>, Option<String>) {
        let valid = |code: &str| codes.iter().any(|c| c == code);

        if let Some(caps) = ROUTE_PATTERN.captures(text) {
            let origin = caps.get(1).map(|m| m.as_str()).filter(|c| valid(*c));
            let destination = caps.get(2).map(|m| m.as_str()).filter(|c| valid(*c));
            if origin.is_some() && destination.is_some() {
                return (origin.map(str::to_string), destination.map(str::to_string));
            }
        }

        let origin = ORIGIN_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|c| valid(*c));
        let destination = DESTINATION_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|c| valid(*c));

        if origin.is_none() && destination.is_none() && codes.len() >= 2 {
            return (Some(codes[0].clone()), Some(codes[1].clone()));
        }

        (origin.map(str::to_string), destination.map(str::to_string))
    }

    fn date(&self, text: &str) -> Option<String> {
        DATE_PATTERN
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
            .map(str::to_string)
    }

    fn cabin_class(&self, text: &str) -> Option<&'static str> {
        CABIN_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_route() {
        let entities = EntityExtractor::new().extract("flights from JFK to LAX");
        assert_eq!(entities.get(EntityKind::Origin), Some("JFK"));
        assert_eq!(entities.get(EntityKind::Destination), Some("LAX"));
        assert_eq!(entities.values(EntityKind::AirportCode), ["JFK", "LAX"]);
    }

    #[test]
    fn test_translated_routes() {
        let extractor = EntityExtractor::new();
        for text in [
            "vuelos de MAD a BCN",
            "Flüge von MAD nach BCN",
            "un vol de MAD à BCN",
            "voos de MAD para BCN",
        ] {
            let entities = extractor.extract(text);
            assert_eq!(entities.get(EntityKind::Origin), Some("MAD"), "{}", text);
            assert_eq!(entities.get(EntityKind::Destination), Some("BCN"), "{}", text);
        }
    }

    #[test]
    fn test_positional_codes() {
        let entities = EntityExtractor::new().extract("SFO ORD tomorrow");
        assert_eq!(entities.get(EntityKind::Origin), Some("SFO"));
        assert_eq!(entities.get(EntityKind::Destination), Some("ORD"));
    }

    #[test]
    fn test_single_direction() {
        let entities = EntityExtractor::new().extract("I need to go to CDG");
        assert_eq!(entities.get(EntityKind::Origin), None);
        assert_eq!(entities.get(EntityKind::Destination), Some("CDG"));
    }

    #[test]
    fn test_stopwords_ignored() {
        let entities = EntityExtractor::new().extract("THE flight AND the hotel");
        assert!(entities.values(EntityKind::AirportCode).is_empty());
    }

    #[test]
    fn test_date_cabin_nonstop() {
        let entities = EntityExtractor::new()
            .extract("vuelo directo en clase ejecutiva el 2025-03-14, no 2025-13-45");
        assert_eq!(entities.get(EntityKind::Date), Some("2025-03-14"));
        assert_eq!(entities.get(EntityKind::CabinClass), Some("business"));
        assert_eq!(entities.get(EntityKind::Nonstop), Some("true"));
    }

    #[test]
    fn test_premium_economy_precedence() {
        let entities = EntityExtractor::new().extract("premium economy please");
        assert_eq!(entities.get(EntityKind::CabinClass), Some("premium_economy"));
    }

    #[test]
    fn test_extract_all_newest_wins() {
        let entities = EntityExtractor::new()
            .extract_all(["from JFK to LAX", "actually from EWR", "¿y el martes?"]);
        assert_eq!(entities.get(EntityKind::Origin), Some("EWR"));
        assert_eq!(entities.get(EntityKind::Destination), Some("LAX"));
        assert_eq!(entities.values(EntityKind::AirportCode), ["JFK", "LAX", "EWR"]);
    }
}
