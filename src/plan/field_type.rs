use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{
    Analyzer, EasyAnalyzer, NormForm, Normalizer, PolyAnalyzer, RegexTokenizer, SnowballStemmer,
    StandardTokenizer,
};
use crate::core::error::Result;

/// The value container a field dispatches into at inversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveId {
    Text,
    Blob,
    I32,
    I64,
    F32,
    F64,
}

/// On-disk posting format for an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingVariant {
    /// Doc ids only.
    Match,
    /// Doc ids, frequencies and field-length norms.
    Score,
    /// Frequencies, norms, positions and offsets; required for phrase
    /// matching and highlighting.
    Rich,
}

impl PostingVariant {
    pub fn has_freq(&self) -> bool {
        !matches!(self, PostingVariant::Match)
    }

    pub fn has_positions(&self) -> bool {
        matches!(self, PostingVariant::Rich)
    }
}

/// Declarative recipe for an analyzer chain; the serializable face of the
/// `analysis` module, so schemas round-trip through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerSpec {
    Easy {
        language: String,
    },
    Tokenizer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// Unicode word-boundary segmentation instead of a token pattern.
    WordTokenizer,
    Normalizer {
        form: String,
        case_fold: bool,
        strip_accents: bool,
    },
    Stemmer {
        language: String,
    },
    Poly {
        analyzers: Vec<AnalyzerSpec>,
    },
}

impl AnalyzerSpec {
    pub fn build(&self) -> Result<Arc<dyn Analyzer>> {
        match self {
            AnalyzerSpec::Easy { language } => Ok(Arc::new(EasyAnalyzer::new(language)?)),
            AnalyzerSpec::Tokenizer { pattern } => {
                Ok(Arc::new(RegexTokenizer::new(pattern.as_deref())?))
            }
            AnalyzerSpec::WordTokenizer => Ok(Arc::new(StandardTokenizer)),
            AnalyzerSpec::Normalizer {
                form,
                case_fold,
                strip_accents,
            } => Ok(Arc::new(Normalizer::new(
                NormForm::parse(form)?,
                *case_fold,
                *strip_accents,
            ))),
            AnalyzerSpec::Stemmer { language } => Ok(Arc::new(SnowballStemmer::new(language)?)),
            AnalyzerSpec::Poly { analyzers } => {
                let built = analyzers
                    .iter()
                    .map(AnalyzerSpec::build)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(PolyAnalyzer::new(built)))
            }
        }
    }

    /// Tokenize + NFKC/casefold, no stemming.
    pub fn plain() -> Self {
        AnalyzerSpec::Poly {
            analyzers: vec![
                AnalyzerSpec::Tokenizer { pattern: None },
                AnalyzerSpec::Normalizer {
                    form: "NFKC".to_string(),
                    case_fold: true,
                    strip_accents: false,
                },
            ],
        }
    }
}

/// Determines whether a field is indexed, stored and highlightable, which
/// analyzer inverts it, and which posting codec serializes it. Frozen once
/// a segment has been written against the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text {
        indexed: bool,
        stored: bool,
        highlightable: bool,
        posting: PostingVariant,
        analyzer: AnalyzerSpec,
        boost: f32,
    },
    Blob {
        stored: bool,
    },
    I32 {
        indexed: bool,
        stored: bool,
    },
    I64 {
        indexed: bool,
        stored: bool,
    },
    F32 {
        indexed: bool,
        stored: bool,
    },
    F64 {
        indexed: bool,
        stored: bool,
    },
}

impl FieldType {
    /// Analyzed, stored, position-carrying text: the everyday field type.
    pub fn full_text(language: &str) -> Self {
        FieldType::Text {
            indexed: true,
            stored: true,
            highlightable: false,
            posting: PostingVariant::Rich,
            analyzer: AnalyzerSpec::Easy {
                language: language.to_string(),
            },
            boost: 1.0,
        }
    }

    /// Text run through tokenizer + normalizer only; no stemming.
    pub fn plain_text() -> Self {
        FieldType::Text {
            indexed: true,
            stored: true,
            highlightable: false,
            posting: PostingVariant::Rich,
            analyzer: AnalyzerSpec::plain(),
            boost: 1.0,
        }
    }

    pub fn blob() -> Self {
        FieldType::Blob { stored: true }
    }

    pub fn with_highlightable(mut self, value: bool) -> Self {
        if let FieldType::Text { highlightable, .. } = &mut self {
            *highlightable = value;
        }
        self
    }

    pub fn with_posting(mut self, variant: PostingVariant) -> Self {
        if let FieldType::Text { posting, .. } = &mut self {
            *posting = variant;
        }
        self
    }

    pub fn with_stored(mut self, value: bool) -> Self {
        match &mut self {
            FieldType::Text { stored, .. }
            | FieldType::Blob { stored }
            | FieldType::I32 { stored, .. }
            | FieldType::I64 { stored, .. }
            | FieldType::F32 { stored, .. }
            | FieldType::F64 { stored, .. } => *stored = value,
        }
        self
    }

    pub fn primitive_id(&self) -> PrimitiveId {
        match self {
            FieldType::Text { .. } => PrimitiveId::Text,
            FieldType::Blob { .. } => PrimitiveId::Blob,
            FieldType::I32 { .. } => PrimitiveId::I32,
            FieldType::I64 { .. } => PrimitiveId::I64,
            FieldType::F32 { .. } => PrimitiveId::F32,
            FieldType::F64 { .. } => PrimitiveId::F64,
        }
    }

    pub fn is_indexed(&self) -> bool {
        match self {
            FieldType::Text { indexed, .. }
            | FieldType::I32 { indexed, .. }
            | FieldType::I64 { indexed, .. }
            | FieldType::F32 { indexed, .. }
            | FieldType::F64 { indexed, .. } => *indexed,
            FieldType::Blob { .. } => false,
        }
    }

    pub fn is_stored(&self) -> bool {
        match self {
            FieldType::Text { stored, .. }
            | FieldType::Blob { stored }
            | FieldType::I32 { stored, .. }
            | FieldType::I64 { stored, .. }
            | FieldType::F32 { stored, .. }
            | FieldType::F64 { stored, .. } => *stored,
        }
    }

    pub fn is_highlightable(&self) -> bool {
        matches!(
            self,
            FieldType::Text {
                highlightable: true,
                ..
            }
        )
    }

    pub fn boost(&self) -> f32 {
        match self {
            FieldType::Text { boost, .. } => *boost,
            _ => 1.0,
        }
    }

    pub fn posting_variant(&self) -> PostingVariant {
        match self {
            FieldType::Text { posting, .. } => *posting,
            // Numeric terms carry no useful frequency signal.
            _ => PostingVariant::Match,
        }
    }

    pub fn analyzer_spec(&self) -> Option<&AnalyzerSpec> {
        match self {
            FieldType::Text { analyzer, .. } => Some(analyzer),
            _ => None,
        }
    }
}
