use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// The target language may be given as an ISO 639-1 (2-letter) code, an
/// ISO 639-2 (3-letter) code or a plain language name. The prompt always gets
/// a name; output files get a short code.

/// ISO 639-2/B codes that differ from their ISO 639-2/T form
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Look up a language from an ISO 639-1 or ISO 639-2 code
fn language_from_code(code: &str) -> Option<Language> {
    let normalized_code = code.trim().to_lowercase();
    match normalized_code.len() {
        2 => Language::from_639_1(&normalized_code),
        3 => {
            let part2t = PART2B_TO_PART2T
                .iter()
                .find(|(part2b, _)| *part2b == normalized_code)
                .map(|(_, part2t)| *part2t)
                .unwrap_or(normalized_code.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let lang = language_from_code(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(|c| c.to_string())
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = language_from_code(code).ok_or_else(|| anyhow!("Failed to get language from code: {}", code))?;
    Ok(lang.to_name().to_string())
}

/// Name to substitute into the prompt.
///
/// Codes are resolved to their English name; anything else is taken as a
/// name already (e.g. "Brazilian Portuguese").
pub fn resolve_language_name(language: &str) -> Result<String> {
    let language = language.trim();
    if language.is_empty() {
        return Err(anyhow!("Target language cannot be empty"));
    }
    Ok(get_language_name(language).unwrap_or_else(|_| language.to_string()))
}

/// Short tag for output file names: an ISO code when one is known,
/// otherwise the lowercased name with spaces replaced by dashes.
pub fn language_slug(language: &str) -> String {
    let language = language.trim();
    if let Ok(code) = normalize_to_part1_or_part2t(language) {
        return code;
    }
    if let Some(lang) = Language::from_name(language) {
        return lang
            .to_639_1()
            .map(|c| c.to_string())
            .unwrap_or_else(|| lang.to_639_3().to_string());
    }
    language.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}
