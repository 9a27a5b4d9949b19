use std::sync::Arc;

use crate::analysis::inversion::Inversion;
use crate::analysis::normalizer::{NormForm, Normalizer};
use crate::analysis::stemmer::SnowballStemmer;
use crate::analysis::tokenizer::RegexTokenizer;
use crate::core::error::Result;

/// One stage of the analysis chain: token stream in, token stream out.
pub trait Analyzer: Send + Sync {
    fn transform(&self, inversion: Inversion) -> Result<Inversion>;

    /// Run raw field text through the chain.
    fn transform_text(&self, text: &str) -> Result<Inversion> {
        self.transform(Inversion::from_text(text))
    }

    /// Analyze text and collect the resulting token texts; used for query
    /// terms, which must pass through the same chain as indexed text.
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let mut inversion = self.transform_text(text)?;
        inversion.reset();
        let mut terms = Vec::new();
        while let Some(token) = inversion.next() {
            terms.push(token.text.clone());
        }
        Ok(terms)
    }
}

/// Sequential composition of analyzers.
pub struct PolyAnalyzer {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl PolyAnalyzer {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        PolyAnalyzer { analyzers }
    }
}

impl Analyzer for PolyAnalyzer {
    fn transform(&self, mut inversion: Inversion) -> Result<Inversion> {
        for analyzer in &self.analyzers {
            inversion = analyzer.transform(inversion)?;
        }
        Ok(inversion)
    }
}

/// The default chain: tokenize, NFKC-normalize with case folding, stem.
pub struct EasyAnalyzer {
    chain: PolyAnalyzer,
    language: String,
}

impl EasyAnalyzer {
    pub fn new(language: &str) -> Result<Self> {
        let chain = PolyAnalyzer::new(vec![
            Arc::new(RegexTokenizer::new(None)?),
            Arc::new(Normalizer::new(NormForm::Nfkc, true, false)),
            Arc::new(SnowballStemmer::new(language)?),
        ]);
        Ok(EasyAnalyzer {
            chain,
            language: language.to_string(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Analyzer for EasyAnalyzer {
    fn transform(&self, inversion: Inversion) -> Result<Inversion> {
        self.chain.transform(inversion)
    }
}
