use rust_stemmers::{Algorithm, Stemmer};

use crate::analysis::analyzer::Analyzer;
use crate::analysis::inversion::Inversion;
use crate::core::error::{Error, Result};

/// Snowball stemming stage. Takes an ISO language code.
pub struct SnowballStemmer {
    stemmer: Stemmer,
    language: String,
}

impl SnowballStemmer {
    pub fn new(language: &str) -> Result<Self> {
        let algorithm = match language.to_ascii_lowercase().as_str() {
            "da" | "danish" => Algorithm::Danish,
            "de" | "german" => Algorithm::German,
            "en" | "english" => Algorithm::English,
            "es" | "spanish" => Algorithm::Spanish,
            "fi" | "finnish" => Algorithm::Finnish,
            "fr" | "french" => Algorithm::French,
            "hu" | "hungarian" => Algorithm::Hungarian,
            "it" | "italian" => Algorithm::Italian,
            "nl" | "dutch" => Algorithm::Dutch,
            "no" | "norwegian" => Algorithm::Norwegian,
            "pt" | "portuguese" => Algorithm::Portuguese,
            "ro" | "romanian" => Algorithm::Romanian,
            "ru" | "russian" => Algorithm::Russian,
            "sv" | "swedish" => Algorithm::Swedish,
            "tr" | "turkish" => Algorithm::Turkish,
            _ => {
                return Err(Error::bad_argument(format!(
                    "No stemmer for language '{}'",
                    language
                )));
            }
        };
        Ok(SnowballStemmer {
            stemmer: Stemmer::create(algorithm),
            language: language.to_string(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Analyzer for SnowballStemmer {
    fn transform(&self, mut inversion: Inversion) -> Result<Inversion> {
        inversion.reset();
        while let Some(token) = inversion.next_mut() {
            let stemmed = self.stemmer.stem(&token.text);
            if stemmed != token.text {
                token.text = stemmed.into_owned();
            }
        }
        inversion.reset();
        Ok(inversion)
    }
}
