/*!
 * Prompt template for chunk translation.
 *
 * A template carries exactly two placeholders: `{target_language}` and
 * `{subtitles}`. Rendering is plain substitution.
 */

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

/// Placeholder for the target language name
pub const TARGET_LANGUAGE_PLACEHOLDER: &str = "{target_language}";

/// Placeholder for the tagged chunk text
pub const SUBTITLES_PLACEHOLDER: &str = "{subtitles}";

/// Prompt template for subtitle translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default prompt for tagged subtitle translation.
    pub const SUBTITLE_TRANSLATOR: &'static str = r#"You are a professional subtitle translator. Translate the subtitles below into {target_language}.

Each subtitle is wrapped in a numbered tag: <ID>text</ID>, where the same number opens and closes the subtitle.

Rules:
- Translate every subtitle, one output subtitle per input subtitle.
- Keep every number exactly as given, on both the opening and the closing tag.
- Never merge, split, skip or reorder subtitles, even when a sentence continues across several of them.
- Keep line breaks inside a subtitle and preserve inline formatting such as <i>italics</i>.
- Keep translations short enough to be read on screen.
- Output only the translated subtitles in the same tagged format, with no commentary before or after.

Subtitles:
{subtitles}"#;

    /// Create a template, checking both placeholders are present
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [TARGET_LANGUAGE_PLACEHOLDER, SUBTITLES_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(anyhow!("Prompt template is missing the {} placeholder", placeholder));
            }
        }
        Ok(Self { template })
    }

    /// Load a template from a text file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let template = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
        Self::new(template).with_context(|| format!("Invalid prompt template: {}", path.display()))
    }

    /// Built-in template
    pub fn subtitle_translator() -> Self {
        Self {
            template: Self::SUBTITLE_TRANSLATOR.to_string(),
        }
    }

    /// Render the prompt for one chunk. The chunk is trimmed first.
    pub fn render(&self, target_language: &str, chunk_text: &str) -> String {
        // Language first so chunk text is never scanned for placeholders
        self.template
            .replace(TARGET_LANGUAGE_PLACEHOLDER, target_language)
            .replace(SUBTITLES_PLACEHOLDER, chunk_text.trim())
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::subtitle_translator()
    }
}
