pub mod analyzer;
pub mod inversion;
pub mod normalizer;
pub mod stemmer;
pub mod token;
pub mod tokenizer;

pub use analyzer::{Analyzer, EasyAnalyzer, PolyAnalyzer};
pub use inversion::Inversion;
pub use normalizer::{NormForm, Normalizer};
pub use stemmer::SnowballStemmer;
pub use token::Token;
pub use tokenizer::{RegexTokenizer, StandardTokenizer};
