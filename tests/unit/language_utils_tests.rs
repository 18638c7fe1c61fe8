/*!
 * Tests for ISO language code utilities
 */

use subtrans::language_utils::{
    get_language_name, language_slug, normalize_to_part1_or_part2t, resolve_language_name,
};

#[test]
fn test_normalize_to_part1_or_part2t_withPart1Code_shouldKeepIt() {
    assert_eq!(normalize_to_part1_or_part2t("EN").unwrap(), "en");
}

#[test]
fn test_normalize_to_part1_or_part2t_shouldPreferTwoLetters() {
    assert_eq!(normalize_to_part1_or_part2t("spa").unwrap(), "es");
    assert_eq!(normalize_to_part1_or_part2t("chi").unwrap(), "zh");
    assert!(normalize_to_part1_or_part2t("qqq").is_err());
}

#[test]
fn test_get_language_name_withCode_shouldReturnEnglishName() {
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
}

#[test]
fn test_resolve_language_name_shouldKeepFreeFormNames() {
    assert_eq!(resolve_language_name("deu").unwrap(), "German");
    assert_eq!(resolve_language_name(" Klingon ").unwrap(), "Klingon");
}

#[test]
fn test_language_slug_withNameOrCode_shouldReturnFileTag() {
    assert_eq!(language_slug("de"), "de");
    assert_eq!(language_slug("German"), "de");
    assert_eq!(language_slug("Simplified Chinese"), "simplified-chinese");
}
