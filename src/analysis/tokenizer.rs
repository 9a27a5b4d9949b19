use regex::Regex;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::inversion::Inversion;
use crate::analysis::token::Token;
use crate::core::error::{Error, Result};

/// Default token pattern: word characters, with embedded apostrophes kept
/// inside the token ("isn't" stays whole).
pub const DEFAULT_TOKEN_PATTERN: &str = r"\w+(?:'\w+)*";

/// Splits text into tokens along a regex, emitting code-point offsets into
/// the original text, unit position increments and a boost of 1.
pub struct RegexTokenizer {
    pattern: Regex,
    pattern_source: String,
}

impl RegexTokenizer {
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let source = pattern.unwrap_or(DEFAULT_TOKEN_PATTERN);
        let pattern = Regex::new(source)
            .map_err(|e| Error::bad_argument(format!("Invalid token pattern: {}", e)))?;
        Ok(RegexTokenizer {
            pattern,
            pattern_source: source.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern_source
    }

    fn tokenize_into(&self, text: &str, base_offset: u32, output: &mut Inversion) {
        // The regex reports byte offsets; map them to code-point offsets
        // with a single forward walk.
        let mut cp = 0u32;
        let mut walked = text.char_indices();
        let mut walked_byte = 0usize;
        let mut cp_at = |byte_target: usize, cp: &mut u32, walked_byte: &mut usize| {
            while *walked_byte < byte_target {
                match walked.next() {
                    Some((idx, ch)) => {
                        debug_assert_eq!(idx, *walked_byte);
                        *walked_byte += ch.len_utf8();
                        *cp += 1;
                    }
                    None => break,
                }
            }
            *cp
        };

        for found in self.pattern.find_iter(text) {
            let start_cp = cp_at(found.start(), &mut cp, &mut walked_byte);
            let end_cp = cp_at(found.end(), &mut cp, &mut walked_byte);
            output.append(Token::new(
                found.as_str(),
                base_offset + start_cp,
                base_offset + end_cp,
            ));
        }
    }
}

impl Analyzer for RegexTokenizer {
    fn transform(&self, mut inversion: Inversion) -> Result<Inversion> {
        let mut output = Inversion::new();
        inversion.reset();
        while let Some(token) = inversion.next() {
            self.tokenize_into(&token.text, token.start_offset, &mut output);
        }
        Ok(output)
    }
}

/// Splits along Unicode word boundaries instead of a pattern; handles
/// scripts where `\w+` runs fall short.
pub struct StandardTokenizer;

impl Analyzer for StandardTokenizer {
    fn transform(&self, mut inversion: Inversion) -> Result<Inversion> {
        use unicode_segmentation::UnicodeSegmentation;

        let mut output = Inversion::new();
        inversion.reset();
        while let Some(token) = inversion.next() {
            let mut cp = 0u32;
            let mut last_byte = 0usize;
            for (byte_start, word) in token.text.unicode_word_indices() {
                cp += token.text[last_byte..byte_start].chars().count() as u32;
                let word_cp_len = word.chars().count() as u32;
                output.append(Token::new(
                    word,
                    token.start_offset + cp,
                    token.start_offset + cp + word_cp_len,
                ));
                cp += word_cp_len;
                last_byte = byte_start + word.len();
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(mut inv: Inversion) -> Vec<(String, u32, u32)> {
        let mut out = Vec::new();
        inv.reset();
        while let Some(t) = inv.next() {
            out.push((t.text.clone(), t.start_offset, t.end_offset));
        }
        out
    }

    #[test]
    fn splits_on_word_boundaries() {
        let tokenizer = RegexTokenizer::new(None).unwrap();
        let inv = tokenizer.transform_text("Lorem ipsum, dolor!").unwrap();
        assert_eq!(
            texts(inv),
            vec![
                ("Lorem".to_string(), 0, 5),
                ("ipsum".to_string(), 6, 11),
                ("dolor".to_string(), 13, 18),
            ]
        );
    }

    #[test]
    fn keeps_inner_apostrophes() {
        let tokenizer = RegexTokenizer::new(None).unwrap();
        let inv = tokenizer.transform_text("isn't 'quoted'").unwrap();
        let tokens = texts(inv);
        assert_eq!(tokens[0].0, "isn't");
        assert_eq!(tokens[1].0, "quoted");
    }

    #[test]
    fn offsets_are_code_points_not_bytes() {
        let tokenizer = RegexTokenizer::new(None).unwrap();
        // "héllo wörld": é and ö are two bytes each, one code point each.
        let inv = tokenizer.transform_text("héllo wörld").unwrap();
        assert_eq!(
            texts(inv),
            vec![
                ("héllo".to_string(), 0, 5),
                ("wörld".to_string(), 6, 11),
            ]
        );
    }

    #[test]
    fn standard_tokenizer_follows_word_boundaries() {
        let inv = StandardTokenizer
            .transform_text("can't stop—won't stop")
            .unwrap();
        let tokens = texts(inv);
        // Word segmentation keeps contractions whole and splits on the
        // em dash.
        assert_eq!(tokens[0].0, "can't");
        assert_eq!(tokens[1], ("stop".to_string(), 6, 10));
        assert_eq!(tokens[2].0, "won't");
        assert_eq!(tokens[3].0, "stop");
    }

    #[test]
    fn custom_pattern() {
        let tokenizer = RegexTokenizer::new(Some(r"[0-9]+")).unwrap();
        let inv = tokenizer.transform_text("a1b22c333").unwrap();
        let tokens: Vec<String> = texts(inv).into_iter().map(|t| t.0).collect();
        assert_eq!(tokens, vec!["1", "22", "333"]);
    }
}
