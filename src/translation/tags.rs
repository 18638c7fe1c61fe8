/*!
 * Tagged block wire protocol.
 *
 * Every subtitle entry travels to the model as `<id>text</id>`, with the
 * opening tag at the start of a line and the closing tag at the end of a line.
 * The identifier must be repeated verbatim at both ends; anything else in the
 * text is not a block and is ignored by the scanner.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening tag anchored at a line start
static OPEN_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^<(\d+)>").expect("Invalid open tag regex"));

/// One subtitle entry in transit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBlock {
    /// Identifier carried by both delimiters
    pub id: u64,
    /// Entry text, may span several lines
    pub text: String,
}

impl TaggedBlock {
    /// Create a new block
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self { id, text: text.into() }
    }

    /// Render as `<id>text</id>`
    pub fn render(&self) -> String {
        format!("<{id}>{text}</{id}>", id = self.id, text = self.text)
    }

    /// Same text under another identifier
    pub fn with_id(&self, id: u64) -> Self {
        Self { id, text: self.text.clone() }
    }
}

/// Find every well-formed block in `text`, in order of appearance.
///
/// For each opening tag the earliest matching closing tag that ends a line
/// wins. Openings without such a closing tag are skipped, and scanning resumes
/// right after them, so a broken block never swallows its neighbours.
pub fn find_blocks(text: &str) -> Vec<TaggedBlock> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = OPEN_TAG_REGEX.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(id_match)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let id_str = id_match.as_str();
        let body_start = whole.end();

        match (id_str.parse::<u64>(), find_close(text, body_start, id_str)) {
            (Ok(id), Some((body_end, block_end))) => {
                blocks.push(TaggedBlock::new(id, &text[body_start..body_end]));
                pos = block_end;
            }
            _ => {
                pos = body_start;
            }
        }
    }

    blocks
}

/// Earliest `</id>` after `from` that is followed by a line end.
/// Returns (start of closing tag, end of closing tag).
fn find_close(text: &str, from: usize, id: &str) -> Option<(usize, usize)> {
    let close = format!("</{}>", id);
    let mut search = from;

    while let Some(offset) = text[search..].find(&close) {
        let start = search + offset;
        let end = start + close.len();
        let rest = &text[end..];
        if rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n") {
            return Some((start, end));
        }
        search = end;
    }

    None
}

/// Render blocks one per line
pub fn render_blocks(blocks: &[TaggedBlock]) -> String {
    blocks.iter().map(TaggedBlock::render).collect::<Vec<_>>().join("\n")
}

/// Ids of every well-formed block, in order of appearance
pub fn block_ids(text: &str) -> Vec<u64> {
    find_blocks(text).into_iter().map(|b| b.id).collect()
}
