use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SubtitleError;
use crate::translation::tags::{self, TaggedBlock};

// @module: Subtitle document model: parsing, tagging and restoring SRT content

// @const: Three or more consecutive newlines
static EXCESS_BLANK_LINES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("Invalid blank line regex"));

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Original numeric id
    pub id: u64,

    // @field: Timestamp range line, kept verbatim
    pub timestamp: String,

    // @field: Subtitle text, possibly multi-line
    pub text: String,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry
    pub fn new(id: u64, timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        SubtitleEntry {
            id,
            timestamp: timestamp.into(),
            text: text.into(),
        }
    }

    /// Tagged block carrying id and text, timestamp stripped
    pub fn to_tagged_block(&self) -> TaggedBlock {
        TaggedBlock::new(self.id, self.text.clone())
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.id)?;
        writeln!(f, "{}", self.timestamp)?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Collection of subtitle entries in document order
#[derive(Debug, Clone, Default)]
pub struct SubtitleCollection {
    /// Source filename, if the collection came from disk
    pub source_file: Option<PathBuf>,

    /// Entries in order of appearance
    pub entries: Vec<SubtitleEntry>,

    /// id -> position in `entries`
    index: HashMap<u64, usize>,
}

impl SubtitleCollection {
    /// Build a collection from already parsed entries
    pub fn from_entries(entries: Vec<SubtitleEntry>) -> Result<Self, SubtitleError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.id, position).is_some() {
                return Err(SubtitleError::DuplicateId(entry.id));
            }
        }

        Ok(SubtitleCollection {
            source_file: None,
            entries,
            index,
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its original id
    pub fn get(&self, id: u64) -> Option<&SubtitleEntry> {
        self.index.get(&id).map(|&position| &self.entries[position])
    }

    /// Parse an SRT file from disk
    pub fn parse_srt_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;

        let mut collection = Self::parse_srt_string(&content)
            .with_context(|| format!("Failed to parse subtitle file: {}", path.display()))?;
        collection.source_file = Some(path.to_path_buf());
        Ok(collection)
    }

    /// Parse SRT content.
    ///
    /// Each entry is an index line, a timestamp line and zero or more text
    /// lines, terminated by a blank line or the end of input. Blank-line
    /// padding between entries is tolerated. Ids are kept as written, even
    /// when they are not contiguous, and entries are never reordered.
    pub fn parse_srt_string(content: &str) -> Result<Self, SubtitleError> {
        let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let lines: Vec<&str> = normalized.trim().split('\n').collect();

        let mut entries = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].trim().is_empty() {
                i += 1;
                continue;
            }

            let line_number = i + 1;
            let index = lines[i].trim();
            let id = Some(index)
                .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&id| id > 0)
                .ok_or_else(|| SubtitleError::InvalidDocument {
                    line: line_number,
                    reason: format!("expected a positive subtitle index, found '{}'", index),
                })?;

            let timestamp = match lines.get(i + 1) {
                Some(line) if line.contains("-->") => line.trim().to_string(),
                Some(line) => {
                    return Err(SubtitleError::InvalidDocument {
                        line: line_number + 1,
                        reason: format!("expected a timestamp range for subtitle {}, found '{}'", id, line.trim()),
                    });
                }
                None => {
                    return Err(SubtitleError::InvalidDocument {
                        line: line_number,
                        reason: format!("subtitle {} is missing its timestamp line", id),
                    });
                }
            };

            i += 2;
            let mut text_lines = Vec::new();
            while i < lines.len() && !lines[i].trim().is_empty() {
                text_lines.push(lines[i].trim_end());
                i += 1;
            }

            if text_lines.is_empty() {
                debug!("Subtitle {} has no text", id);
            }

            entries.push(SubtitleEntry::new(id, timestamp, text_lines.join("\n")));
        }

        if entries.is_empty() {
            warn!("No valid subtitle entries found in content");
            return Err(SubtitleError::Empty);
        }

        Self::from_entries(entries)
    }

    /// Render every entry as a tagged block, in document order
    pub fn to_tagged_text(&self) -> String {
        let blocks: Vec<TaggedBlock> = self.entries.iter().map(SubtitleEntry::to_tagged_block).collect();
        tags::render_blocks(&blocks)
    }

    /// Turn tagged content back into SRT.
    ///
    /// Every block whose id belongs to this collection is re-emitted with its
    /// original timestamp; unknown or malformed blocks are dropped. The result
    /// has no runs of blank lines, no trailing bare angle brackets and no
    /// surrounding whitespace.
    pub fn restore_from_tagged(&self, content: &str) -> String {
        let mut restored = Vec::new();
        for block in tags::find_blocks(content) {
            match self.get(block.id) {
                Some(entry) => restored.push(format!("{}\n{}\n{}", block.id, entry.timestamp, block.text)),
                None => debug!("Dropping block with unknown subtitle id {}", block.id),
            }
        }

        let joined = restored.join("\n\n");
        let collapsed = EXCESS_BLANK_LINES_REGEX.replace_all(&joined, "\n\n");
        clean_text(collapsed.trim())
    }

    /// Write subtitles to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("Failed to create subtitle file: {}", path.display()))?;

        for entry in &self.entries {
            write!(file, "{}", entry)?;
        }

        Ok(())
    }
}

/// Strip trailing bare `<` and `>` from every line.
///
/// Some players reject subtitles with a stray bracket at the end of a line.
/// A trailing `>` that closes an inline tag opened on the same line, such as
/// `</i>`, is kept.
pub fn clean_text(text: &str) -> String {
    text.split('\n').map(clean_line).collect::<Vec<_>>().join("\n")
}

fn clean_line(line: &str) -> &str {
    let mut line = line;
    loop {
        let trimmed = line.trim_end_matches([' ', '\t']);
        if let Some(rest) = trimmed.strip_suffix('<') {
            line = rest;
        } else if let Some(rest) = trimmed.strip_suffix('>') {
            let closes_tag = match (rest.rfind('<'), rest.rfind('>')) {
                (Some(open), Some(close)) => open > close,
                (Some(_), None) => true,
                _ => false,
            };
            if closes_tag {
                return trimmed;
            }
            line = rest;
        } else {
            return trimmed;
        }
    }
}
