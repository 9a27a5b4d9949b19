use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::inversion::Inversion;
use crate::core::error::{Error, Result};

const INITIAL_BUFSIZE: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormForm {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
}

impl NormForm {
    pub fn parse(name: &str) -> Result<NormForm> {
        match name.to_ascii_uppercase().as_str() {
            "NFC" => Ok(NormForm::Nfc),
            "NFD" => Ok(NormForm::Nfd),
            "NFKC" => Ok(NormForm::Nfkc),
            "NFKD" => Ok(NormForm::Nfkd),
            _ => Err(Error::bad_argument(format!(
                "Invalid normalization form '{}'",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NormForm::Nfc => "NFC",
            NormForm::Nfd => "NFD",
            NormForm::Nfkc => "NFKC",
            NormForm::Nfkd => "NFKD",
        }
    }

    fn compose(&self) -> bool {
        matches!(self, NormForm::Nfc | NormForm::Nfkc)
    }

    fn compat(&self) -> bool {
        matches!(self, NormForm::Nfkc | NormForm::Nfkd)
    }
}

/// Rewrites token text through a Unicode normalization form, optionally
/// case-folding and stripping combining marks. NFKC with case-folding is
/// the default used by [`EasyAnalyzer`](crate::analysis::EasyAnalyzer).
pub struct Normalizer {
    form: NormForm,
    case_fold: bool,
    strip_accents: bool,
}

impl Normalizer {
    pub fn new(form: NormForm, case_fold: bool, strip_accents: bool) -> Self {
        Normalizer {
            form,
            case_fold,
            strip_accents,
        }
    }

    pub fn form(&self) -> NormForm {
        self.form
    }

    pub fn case_fold(&self) -> bool {
        self.case_fold
    }

    pub fn strip_accents(&self) -> bool {
        self.strip_accents
    }

    fn normalize_into(&self, text: &str, scratch: &mut Vec<char>) -> String {
        // Decompose into the scratch buffer first; marks can only be
        // stripped from the decomposed sequence.
        scratch.clear();
        if self.form.compat() {
            scratch.extend(text.chars().nfkd());
        } else {
            scratch.extend(text.chars().nfd());
        }

        if self.strip_accents {
            scratch.retain(|&ch| !is_combining_mark(ch));
        }

        if self.case_fold {
            let folded: Vec<char> = scratch
                .iter()
                .flat_map(|ch| ch.to_lowercase())
                .collect();
            *scratch = folded;
        }

        if self.form.compose() {
            scratch.iter().copied().nfc().collect()
        } else {
            scratch.iter().collect()
        }
    }
}

impl Analyzer for Normalizer {
    fn transform(&self, mut inversion: Inversion) -> Result<Inversion> {
        // Reused across tokens; grows on demand past the initial 63 code
        // points and stays grown.
        let mut scratch: Vec<char> = Vec::with_capacity(INITIAL_BUFSIZE);
        inversion.reset();
        while let Some(token) = inversion.next_mut() {
            token.text = self.normalize_into(&token.text, &mut scratch);
        }
        inversion.reset();
        Ok(inversion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;

    fn normalize(norm: &Normalizer, text: &str) -> String {
        let mut inv = Inversion::new();
        inv.append(Token::new(text, 0, text.chars().count() as u32));
        let mut out = norm.transform(inv).unwrap();
        out.next().unwrap().text.clone()
    }

    #[test]
    fn nfc_composes_decomposed_input() {
        let norm = Normalizer::new(NormForm::Nfc, false, false);
        // "e" + combining acute -> "é"
        assert_eq!(normalize(&norm, "e\u{301}"), "é");
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        let norm = Normalizer::new(NormForm::Nfkc, true, false);
        // Ligature fi plus uppercase.
        assert_eq!(normalize(&norm, "ﬁRST"), "first");
    }

    #[test]
    fn strip_accents_drops_combining_marks() {
        let norm = Normalizer::new(NormForm::Nfkc, true, true);
        assert_eq!(normalize(&norm, "Über Café"), "uber cafe");
    }

    #[test]
    fn normalization_is_idempotent() {
        for form in [NormForm::Nfc, NormForm::Nfkc] {
            let norm = Normalizer::new(form, true, false);
            for text in ["Crème Brûlée", "ﬁn", "e\u{301}clair", "plain ascii"] {
                let once = normalize(&norm, text);
                let twice = normalize(&norm, &once);
                assert_eq!(once, twice, "form {:?} text {:?}", form, text);
            }
        }
    }

    #[test]
    fn form_names_round_trip() {
        for name in ["NFC", "NFD", "NFKC", "NFKD"] {
            assert_eq!(NormForm::parse(name).unwrap().name(), name);
        }
        assert_eq!(NormForm::parse("nfkc").unwrap(), NormForm::Nfkc);
        assert!(NormForm::parse("NFX").is_err());
    }
}
