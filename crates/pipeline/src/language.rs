//! Language context manager
//!
//! Decides whether a detected utterance language commits a session-level
//! switch and carries the travel entities over when it does.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use skyvoice_config::LanguageConfig;
use skyvoice_core::{Language, PreservedEntities};

use crate::entities::EntityExtractor;

/// Session language state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageContext {
    pub current: Language,
    pub previous: Option<Language>,
    pub switch_count: u32,
    pub preserved_entities: PreservedEntities,
}

impl LanguageContext {
    pub fn new(current: Language) -> Self {
        Self {
            current,
            previous: None,
            switch_count: 0,
            preserved_entities: PreservedEntities::new(),
        }
    }
}

/// Outcome of one language observation
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageDecision {
    /// A switch was committed by this observation
    pub switched: bool,
    /// Active language after the observation
    pub language: Language,
    pub preserved_entities: PreservedEntities,
    /// Detection too uncertain; ask the user to clarify
    pub low_confidence: bool,
}

/// Tracks the active language of one session
#[derive(Debug)]
pub struct LanguageContextManager {
    config: LanguageConfig,
    context: LanguageContext,
    window: VecDeque<String>,
    extractor: EntityExtractor,
}

impl LanguageContextManager {
    pub fn new(config: LanguageConfig) -> Self {
        let context = LanguageContext::new(Language::new(&config.default_language));
        Self {
            config,
            context,
            window: VecDeque::new(),
            extractor: EntityExtractor::new(),
        }
    }

    pub fn context(&self) -> &LanguageContext {
        &self.context
    }

    pub fn current(&self) -> &Language {
        &self.context.current
    }

    pub fn preserved_entities(&self) -> &PreservedEntities {
        &self.context.preserved_entities
    }

    /// Remember a user fragment for entity extraction
    pub fn record_fragment(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.window.len() == self.config.entity_window {
            self.window.pop_front();
        }
        self.window.push_back(text.to_string());
    }

    /// Observe the detected language of a finalized user utterance
    pub fn observe(&mut self, detected: &Language, confidence: f32) -> LanguageDecision {
        let same = detected == &self.context.current;

        let (switched, low_confidence) = if same {
            (false, confidence < self.config.low_threshold)
        } else if confidence >= self.config.switch_threshold {
            self.commit_switch(detected.clone());
            (true, false)
        } else {
            (false, true)
        };

        if low_confidence {
            tracing::debug!(
                detected = %detected,
                current = %self.context.current,
                confidence,
                "Low-confidence language detection"
            );
        }

        LanguageDecision {
            switched,
            language: self.context.current.clone(),
            preserved_entities: self.context.preserved_entities.clone(),
            low_confidence,
        }
    }

    fn commit_switch(&mut self, detected: Language) {
        let previous = std::mem::replace(&mut self.context.current, detected);
        tracing::info!(
            from = %previous,
            to = %self.context.current,
            switch_count = self.context.switch_count + 1,
            "Language switch"
        );
        self.context.previous = Some(previous);
        self.context.switch_count += 1;

        let extracted = self
            .extractor
            .extract_all(self.window.iter().map(String::as_str));
        self.context.preserved_entities.merge(&extracted);
    }
}
