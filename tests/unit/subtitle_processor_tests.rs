/*!
 * Tests for SRT parsing, tagging and restoration
 */

use anyhow::Result;
use subtrans::errors::SubtitleError;
use subtrans::subtitle_processor::SubtitleCollection;

use crate::common;

#[test]
fn test_parse_srt_file_withSampleFile_shouldLoadEntries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_subtitle(temp_dir.path(), "sample.srt")?;

    let collection = SubtitleCollection::parse_srt_file(&path)?;

    assert_eq!(collection.len(), 3);
    assert_eq!(collection.get(2).map(|e| e.text.as_str()), Some("bravo line"));
    assert_eq!(collection.source_file.as_deref(), Some(path.as_path()));
    Ok(())
}

#[test]
fn test_write_to_srt_thenParse_shouldKeepEntries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let collection = SubtitleCollection::parse_srt_string(common::SAMPLE_SRT)?;
    let path = temp_dir.path().join("nested").join("copy.srt");

    collection.write_to_srt(&path)?;
    let reloaded = SubtitleCollection::parse_srt_file(&path)?;

    assert_eq!(reloaded.entries, collection.entries);
    Ok(())
}

#[test]
fn test_parse_srt_string_withBom_shouldIgnoreIt() -> Result<()> {
    let content = format!("\u{feff}{}", common::SAMPLE_SRT);
    let collection = SubtitleCollection::parse_srt_string(&content)?;
    assert_eq!(collection.len(), 3);
    Ok(())
}

#[test]
fn test_parse_srt_string_withBadIndex_shouldReportLine() {
    let content = "1\n00:00:01,000 --> 00:00:02,000\nFirst\n\nabc\n00:00:03,000 --> 00:00:04,000\nSecond\n";
    match SubtitleCollection::parse_srt_string(content) {
        Err(SubtitleError::InvalidDocument { line, .. }) => assert_eq!(line, 5),
        other => panic!("expected an invalid document error, got {:?}", other),
    }
}

#[test]
fn test_restore_from_tagged_withPartialResponse_shouldKeepOnlyKnownBlocks() -> Result<()> {
    let collection = SubtitleCollection::parse_srt_string(common::SAMPLE_SRT)?;

    let restored = collection.restore_from_tagged("<3>ligne charlie</3>\n<7>invented</7>\n<1>ligne alpha</1>");

    assert_eq!(
        restored,
        "3\n00:00:10,000 --> 00:00:14,000\nligne charlie\n\n1\n00:00:01,000 --> 00:00:04,000\nligne alpha"
    );
    Ok(())
}
