/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use subtrans::file_utils::FileManager;

use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_file_exists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "test_file_exists.tmp", "test content")?;

    assert!(FileManager::file_exists(&test_file));
    assert!(!FileManager::dir_exists(&test_file));
    Ok(())
}

/// Test that file_exists returns false for non-existent files
#[test]
fn test_file_exists_withNonExistentFile_shouldReturnFalse() {
    assert!(!FileManager::file_exists("non_existent_file.tmp"));
}

/// Output lands next to the input with the language inserted
#[test]
fn test_generate_output_path_withValidInputs_shouldCreateCorrectPath() {
    let output_path = FileManager::generate_output_path(Path::new("/tmp/input/episode.srt"), "fr", "srt");
    assert_eq!(output_path, Path::new("/tmp/input/episode.fr.srt"));

    let partial_path = FileManager::generate_partial_output_path(Path::new("/tmp/input/episode.srt"), "fr", "srt");
    assert_eq!(partial_path, Path::new("/tmp/input/episode.fr.partial.srt"));
}

/// Nested subtitle files are found, other files are not
#[test]
fn test_find_files_withNestedDirs_shouldReturnSortedMatches() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("season1");
    fs::create_dir_all(&nested)?;

    common::create_test_subtitle(temp_dir.path(), "b.srt")?;
    common::create_test_subtitle(&nested, "a.SRT")?;
    common::create_test_file(temp_dir.path(), "notes.txt", "not a subtitle")?;

    let files = FileManager::find_files(temp_dir.path(), "srt")?;

    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.extension().is_some()));
    assert!(files.windows(2).all(|w| w[0] <= w[1]));
    Ok(())
}

/// Writing creates missing parent directories
#[test]
fn test_write_to_file_withMissingParent_shouldCreateIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("out").join("episode.fr.srt");

    FileManager::write_to_file(&path, "content")?;

    assert_eq!(FileManager::read_to_string(&path)?, "content");
    Ok(())
}

#[test]
fn test_read_to_string_withMissingFile_shouldFail() {
    assert!(FileManager::read_to_string("missing_subtitle.srt").is_err());
}
