//! Per-respondent survey state.
//!
//! A [`SurveySession`] owns everything the form accumulates between two
//! submissions: the chosen language, the field currently being dictated,
//! whether the place map is in drawing mode, and the map annotations.
//! Annotations are opaque GeoJSON-like values produced by the map UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::payload::{FieldValue, SurveyPayload};

/// Payload field holding marker annotations of important places.
pub const PLACES_FIELD: &str = "important_places";
/// Payload field holding freehand drawings of important places.
pub const DRAWINGS_FIELD: &str = "important_drawings";
/// Payload field holding wildlife encounter markers.
pub const ENCOUNTERS_FIELD: &str = "wildlife_encounters";
/// Payload field holding the respondent's language.
pub const LANGUAGE_FIELD: &str = "language";

/// Consent questions every respondent must answer before submitting.
pub const CONSENT_FIELDS: [&str; 4] = ["consent1", "consent2", "consent3", "consent4"];

/// Survey language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    En,
    /// Polish.
    Pl,
}

impl Language {
    /// Short code sent with the payload.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Pl => "pl",
        }
    }

    /// Locale used for speech recognition.
    #[must_use]
    pub fn speech_locale(self) -> &'static str {
        match self {
            Self::En => "en-US",
            Self::Pl => "pl-PL",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "pl" => Ok(Self::Pl),
            other => Err(Error::parse(format!("unsupported language: {other}"))),
        }
    }
}

/// Application state for one respondent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveySession {
    language: Language,
    recording_field: Option<String>,
    drawing: bool,
    places: Vec<Value>,
    drawings: Vec<Value>,
    encounters: Vec<Value>,
}

impl SurveySession {
    /// Start an empty session in the given language.
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    /// Current language.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Switch language. Returns the new speech locale.
    pub fn set_language(&mut self, language: Language) -> &'static str {
        self.language = language;
        language.speech_locale()
    }

    /// Field currently receiving dictation, if any.
    #[must_use]
    pub fn recording_field(&self) -> Option<&str> {
        self.recording_field.as_deref()
    }

    /// Start dictating into `field`, replacing any active recording.
    /// Returns the field that was recording before.
    pub fn start_recording(&mut self, field: impl Into<String>) -> Option<String> {
        self.recording_field.replace(field.into())
    }

    /// Stop dictation.
    pub fn stop_recording(&mut self) -> Option<String> {
        self.recording_field.take()
    }

    /// Whether the place map is in drawing mode.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Enter or leave drawing mode.
    pub fn set_drawing(&mut self, drawing: bool) {
        self.drawing = drawing;
    }

    /// Add an important-place marker.
    pub fn add_place(&mut self, place: Value) {
        self.places.push(place);
    }

    /// Add an important-place drawing.
    pub fn add_drawing(&mut self, drawing: Value) {
        self.drawings.push(drawing);
    }

    /// Add a wildlife encounter marker.
    pub fn add_encounter(&mut self, encounter: Value) {
        self.encounters.push(encounter);
    }

    /// Collected important-place markers.
    #[must_use]
    pub fn places(&self) -> &[Value] {
        &self.places
    }

    /// Collected drawings.
    #[must_use]
    pub fn drawings(&self) -> &[Value] {
        &self.drawings
    }

    /// Collected wildlife encounters.
    #[must_use]
    pub fn encounters(&self) -> &[Value] {
        &self.encounters
    }

    /// Assemble the payload for submission from the form's answers.
    ///
    /// Each annotation list becomes a JSON-string field and the session
    /// language is added. These overwrite same-named form fields.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if an annotation cannot be serialized.
    pub fn collect(&self, mut fields: SurveyPayload) -> Result<SurveyPayload> {
        fields.insert_annotation(PLACES_FIELD, &self.places)?;
        fields.insert_annotation(DRAWINGS_FIELD, &self.drawings)?;
        fields.insert_annotation(ENCOUNTERS_FIELD, &self.encounters)?;
        fields.insert(LANGUAGE_FIELD, self.language.code());
        Ok(fields)
    }

    /// Check that every field in `required` has an answer. Blank text counts
    /// as unanswered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteSurvey`] naming the unanswered fields.
    pub fn validate(fields: &SurveyPayload, required: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| match fields.get(name) {
                Some(FieldValue::Text(text)) => text.trim().is_empty(),
                Some(FieldValue::Number(_)) => false,
                None => true,
            })
            .map(|name| (*name).to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::IncompleteSurvey { missing })
        }
    }

    /// Clear annotations and modes after a survey was submitted or saved.
    /// The language is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.language);
    }
}

/// Append a dictated transcript to existing text, inserting a space unless
/// the text is empty or already ends in whitespace.
#[must_use]
pub fn append_transcript(current: &str, transcript: &str) -> String {
    if transcript.is_empty() {
        return current.to_string();
    }
    let separator = if current.is_empty() || current.ends_with([' ', '\n']) {
        ""
    } else {
        " "
    };
    format!("{current}{separator}{transcript}")
}
