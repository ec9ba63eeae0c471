//! Spoken response templates
//!
//! Short fixed phrases the orchestrator speaks itself, plus the instructions
//! it hands the language model for presenting search results. Unknown
//! languages fall back to English.

use skyvoice_core::{Language, PreservedEntities};
use skyvoice_tools::{SearchOutcome, SearchParams};

/// Quick response templates
pub struct ResponseTemplates;

impl ResponseTemplates {
    /// Acknowledge a committed language switch in the new language
    pub fn acknowledge_switch(language: &Language) -> String {
        match language.code() {
            "es" => "¡Claro! Seguimos en español.",
            "fr" => "Bien sûr, continuons en français.",
            "de" => "Natürlich, machen wir auf Deutsch weiter.",
            "pt" => "Claro, vamos continuar em português.",
            "it" => "Certo, continuiamo in italiano.",
            _ => "Sure, let's continue in English.",
        }
        .to_string()
    }

    /// Spoken when the STT/LLM/TTS pipeline fails
    pub fn apology(language: &Language) -> String {
        match language.code() {
            "es" => "Lo siento, tuve un problema. ¿Puede repetirlo?",
            "fr" => "Désolé, j'ai eu un problème. Pouvez-vous répéter ?",
            "de" => "Entschuldigung, da ist etwas schiefgelaufen. Können Sie das wiederholen?",
            "pt" => "Desculpe, tive um problema. Pode repetir?",
            "it" => "Mi scusi, c'è stato un problema. Può ripetere?",
            _ => "Sorry, something went wrong on my side. Could you say that again?",
        }
        .to_string()
    }

    /// Ask the user to confirm their language after an uncertain detection
    pub fn clarify_language(current: &Language) -> String {
        match current.code() {
            "es" => "Perdón, no le entendí bien. ¿En qué idioma prefiere hablar?",
            "fr" => "Pardon, je n'ai pas bien compris. Dans quelle langue préférez-vous parler ?",
            "de" => "Entschuldigung, das habe ich nicht verstanden. In welcher Sprache möchten Sie sprechen?",
            "pt" => "Desculpe, não entendi bem. Em que idioma prefere falar?",
            "it" => "Scusi, non ho capito bene. In che lingua preferisce parlare?",
            _ => "Sorry, I didn't quite catch that. Which language would you like to use?",
        }
        .to_string()
    }

    /// Ask for whichever route fields are still missing
    pub fn ask_route(language: &Language, missing: &[&str]) -> String {
        let origin = missing.contains(&"origin");
        let destination = missing.contains(&"destination");
        let text = match (language.code(), origin, destination) {
            ("es", true, false) => "¿Desde qué aeropuerto sale?",
            ("es", false, true) => "¿A qué aeropuerto quiere volar?",
            ("es", _, _) => "¿Desde dónde y hacia dónde quiere volar?",
            ("fr", true, false) => "De quel aéroport partez-vous ?",
            ("fr", false, true) => "Vers quel aéroport souhaitez-vous voler ?",
            ("fr", _, _) => "D'où partez-vous et où allez-vous ?",
            ("de", true, false) => "Von welchem Flughafen fliegen Sie ab?",
            ("de", false, true) => "Zu welchem Flughafen möchten Sie fliegen?",
            ("de", _, _) => "Von wo nach wo möchten Sie fliegen?",
            ("pt", true, false) => "De qual aeroporto você parte?",
            ("pt", false, true) => "Para qual aeroporto você quer voar?",
            ("pt", _, _) => "De onde e para onde você quer voar?",
            ("it", true, false) => "Da quale aeroporto parte?",
            ("it", false, true) => "In quale aeroporto vuole volare?",
            ("it", _, _) => "Da dove a dove vuole volare?",
            (_, true, false) => "Which airport are you flying from?",
            (_, false, true) => "Where would you like to fly to?",
            _ => "Where are you flying from, and where to?",
        };
        text.to_string()
    }

    /// Told to the user when the search timed out or failed
    pub fn results_unavailable(language: &Language) -> String {
        match language.code() {
            "es" => "La búsqueda está tardando demasiado. Los resultados que le muestro son aproximados.",
            "fr" => "La recherche prend trop de temps. Les résultats affichés sont approximatifs.",
            "de" => "Die Suche dauert zu lange. Die angezeigten Ergebnisse sind nur ungefähr.",
            "pt" => "A busca está demorando demais. Os resultados mostrados são aproximados.",
            "it" => "La ricerca sta impiegando troppo. I risultati mostrati sono approssimativi.",
            _ => "The search is taking too long. The results I'm showing are approximate.",
        }
        .to_string()
    }

    /// Short UI summary of a search outcome (always English, the UI localizes)
    pub fn results_summary(params: &SearchParams, outcome: &SearchOutcome) -> String {
        let route = format!("{} → {}", params.origin, params.destination);
        match outcome.cheapest() {
            Some(cheapest) => format!(
                "{} option(s) {}, from ${:.0} ({} {})",
                outcome.options.len(),
                route,
                cheapest.price_usd,
                cheapest.carrier,
                cheapest.flight_number
            ),
            None => format!("No flights found {}", route),
        }
    }

    /// Summary shown when no live result is available
    pub fn fallback_summary(entities: &PreservedEntities) -> String {
        use skyvoice_core::EntityKind;

        match (
            entities.get(EntityKind::Origin),
            entities.get(EntityKind::Destination),
        ) {
            (Some(origin), Some(destination)) => {
                format!("Live results unavailable for {} → {}", origin, destination)
            }
            _ => "Live results unavailable".to_string(),
        }
    }

    /// Instructions for the language model to present search results
    pub fn present_results(language: &Language, outcome: &SearchOutcome) -> String {
        let results = serde_json::to_string(&outcome.options).unwrap_or_else(|_| "[]".to_string());
        let mut instructions = format!(
            "Respond in {}. Briefly present these flight options, cheapest first, \
             and ask which one the user prefers: {}",
            language.display_name(),
            results
        );
        if outcome.approximate {
            instructions.push_str(" Mention that prices may be out of date.");
        }
        instructions
    }
}
