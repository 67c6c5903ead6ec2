use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::SummarizerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthClass {
    Short,
    #[default]
    Medium,
    Long,
}

impl LengthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthClass::Short => "short",
            LengthClass::Medium => "medium",
            LengthClass::Long => "long",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LengthClass::Short => "Short (1-2 sentences)",
            LengthClass::Medium => "Medium (2-4 sentences)",
            LengthClass::Long => "Long (4-8 sentences)",
        }
    }

    pub const ALL: [LengthClass; 3] = [LengthClass::Short, LengthClass::Medium, LengthClass::Long];

    /// Parse an optional form/JSON value, falling back to the default class when absent.
    pub fn parse_or_default(value: Option<&str>) -> Result<Self, SummarizerError> {
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.parse(),
            None => Ok(LengthClass::default()),
        }
    }
}

impl FromStr for LengthClass {
    type Err = SummarizerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(LengthClass::Short),
            "medium" => Ok(LengthClass::Medium),
            "long" => Ok(LengthClass::Long),
            other => Err(SummarizerError::validation(format!(
                "Unknown summary length `{other}`. Choose short, medium or long."
            ))),
        }
    }
}

impl fmt::Display for LengthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation bounds handed to the completion client. The sentence range is advisory and only
/// expressed in the prompt; `max_tokens` caps the provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    pub target_sentences_min: u32,
    pub target_sentences_max: u32,
    pub max_tokens: u32,
}

pub fn resolve(length_class: LengthClass) -> GenerationParams {
    match length_class {
        LengthClass::Short => GenerationParams {
            target_sentences_min: 1,
            target_sentences_max: 2,
            max_tokens: 150,
        },
        LengthClass::Medium => GenerationParams {
            target_sentences_min: 2,
            target_sentences_max: 4,
            max_tokens: 300,
        },
        LengthClass::Long => GenerationParams {
            target_sentences_min: 4,
            target_sentences_max: 8,
            max_tokens: 600,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sentence_bounds() {
        let bounds = LengthClass::ALL.map(|class| {
            let params = resolve(class);
            (params.target_sentences_min, params.target_sentences_max)
        });
        assert_eq!(bounds, [(1, 2), (2, 4), (4, 8)]);
    }

    #[test]
    fn unknown_length_is_rejected() {
        let err = "tiny".parse::<LengthClass>().unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
    }

    #[test]
    fn parsing_is_case_insensitive_and_defaults_to_medium() {
        assert_eq!(" LONG ".parse::<LengthClass>().unwrap(), LengthClass::Long);
        assert_eq!(LengthClass::parse_or_default(None).unwrap(), LengthClass::Medium);
        assert_eq!(LengthClass::parse_or_default(Some("  ")).unwrap(), LengthClass::Medium);
    }
}
