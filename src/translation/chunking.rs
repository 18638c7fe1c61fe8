/*!
 * Chunk planning.
 *
 * Splits the tagged document into token-budgeted chunks. Blocks are atomic:
 * a chunk boundary never falls inside a block, so a single oversized block is
 * emitted on its own rather than split.
 */

use log::{debug, warn};

use super::tags::{self, TaggedBlock};

/// A contiguous run of tagged blocks sent to the model in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Blocks rendered one per line
    pub text: String,

    /// Estimated token count, including joining newlines
    pub num_tokens: usize,

    /// Position of this chunk in the document
    pub index: usize,

    /// Number of blocks in the chunk
    pub block_count: usize,
}

impl Chunk {
    /// Blocks contained in this chunk
    pub fn blocks(&self) -> Vec<TaggedBlock> {
        tags::find_blocks(&self.text)
    }
}

/// Greedy single-pass chunk planner
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    token_budget: usize,
}

impl ChunkPlanner {
    /// Create a planner for the given per-chunk token budget
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    /// Split `text` into blocks and plan chunks over them
    pub fn plan_text<F>(&self, text: &str, estimate_tokens: F) -> Vec<Chunk>
    where
        F: Fn(&str) -> usize,
    {
        self.plan(&tags::find_blocks(text), estimate_tokens)
    }

    /// Pack blocks into chunks.
    ///
    /// A block joins the current chunk when `tokens(chunk) + tokens(block) + 1`
    /// stays within the budget (the `+ 1` is the joining newline); otherwise
    /// the current chunk is closed and the block starts a new one. The
    /// estimator is called once per block and the chunk total is kept as a
    /// running sum.
    pub fn plan<F>(&self, blocks: &[TaggedBlock], estimate_tokens: F) -> Vec<Chunk>
    where
        F: Fn(&str) -> usize,
    {
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0;

        for block in blocks {
            let rendered = block.render();
            let block_tokens = estimate_tokens(&rendered);

            if current.is_empty() {
                current_tokens = block_tokens;
                current.push(rendered);
                continue;
            }

            let candidate_tokens = current_tokens + block_tokens + 1;
            if candidate_tokens <= self.token_budget {
                current.push(rendered);
                current_tokens = candidate_tokens;
            } else {
                Self::close_chunk(&mut chunks, &mut current, current_tokens, self.token_budget);
                current_tokens = block_tokens;
                current.push(rendered);
            }
        }

        if !current.is_empty() {
            Self::close_chunk(&mut chunks, &mut current, current_tokens, self.token_budget);
        }

        debug!("Planned {} chunk(s) from {} block(s) with a budget of {} tokens", chunks.len(), blocks.len(), self.token_budget);
        chunks
    }

    fn close_chunk(chunks: &mut Vec<Chunk>, current: &mut Vec<String>, num_tokens: usize, budget: usize) {
        let index = chunks.len();
        if num_tokens > budget {
            warn!(
                "Chunk {} holds a single entry of {} tokens, over the budget of {} tokens",
                index + 1,
                num_tokens,
                budget
            );
        }

        let block_count = current.len();
        chunks.push(Chunk {
            text: current.join("\n"),
            num_tokens,
            index,
            block_count,
        });
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(count: u64, text: &str) -> Vec<TaggedBlock> {
        (1..=count).map(|id| TaggedBlock::new(id, text)).collect()
    }

    fn fixed_cost(_: &str) -> usize {
        10
    }

    #[test]
    fn test_plan_withLargeBudget_shouldProduceSingleChunk() {
        let chunks = ChunkPlanner::new(1000).plan(&blocks(5, "hi"), fixed_cost);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].block_count, 5);
        assert_eq!(chunks[0].num_tokens, 10 * 5 + 4);
        assert_eq!(chunks[0].text, "<1>hi</1>\n<2>hi</2>\n<3>hi</3>\n<4>hi</4>\n<5>hi</5>");
    }

    #[test]
    fn test_plan_withTightBudget_shouldCountJoiningNewline() {
        // Two blocks need 10 + 10 + 1 = 21 tokens
        let chunks = ChunkPlanner::new(20).plan(&blocks(3, "x"), fixed_cost);
        assert_eq!(chunks.len(), 3);

        let chunks = ChunkPlanner::new(21).plan(&blocks(3, "x"), fixed_cost);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].block_count, 2);
        assert_eq!(chunks[1].block_count, 1);
    }

    #[test]
    fn test_plan_withOversizedBlock_shouldEmitItAlone() {
        let mut input = blocks(2, "short");
        input.insert(1, TaggedBlock::new(99, "a very long entry"));
        let estimate = |s: &str| if s.contains("very long") { 500 } else { 10 };

        let chunks = ChunkPlanner::new(100).plan(&input, estimate);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "<99>a very long entry</99>");
        assert_eq!(chunks[1].num_tokens, 500);
    }

    #[test]
    fn test_plan_withOversizedFirstBlock_shouldNotEmitEmptyChunk() {
        let input = vec![TaggedBlock::new(1, "huge"), TaggedBlock::new(2, "small")];
        let estimate = |s: &str| if s.contains("huge") { 50 } else { 1 };

        let chunks = ChunkPlanner::new(10).plan(&input, estimate);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_plan_shouldAssignSequentialIndices() {
        let chunks = ChunkPlanner::new(10).plan(&blocks(4, "x"), fixed_cost);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_plan_shouldNeverSplitBlocks() {
        let input: Vec<TaggedBlock> = (1..=40)
            .map(|id| TaggedBlock::new(id, "word ".repeat((id % 7 + 1) as usize)))
            .collect();
        let estimate = |s: &str| s.len() / 4 + 1;
        let largest = input.iter().map(|b| estimate(&b.render())).max().unwrap();

        for budget in [largest, largest * 2, largest * 5] {
            let chunks = ChunkPlanner::new(budget).plan(&input, estimate);
            let rejoined: Vec<TaggedBlock> = chunks.iter().flat_map(|c| c.blocks()).collect();
            assert_eq!(rejoined, input);
        }
    }

    #[test]
    fn test_plan_withNoBlocks_shouldReturnNoChunks() {
        assert!(ChunkPlanner::new(100).plan(&[], fixed_cost).is_empty());
    }

    #[test]
    fn test_planText_shouldDiscardTextOutsideBlocks() {
        let chunks = ChunkPlanner::new(100).plan_text("junk\n<1>a</1>\n\n<2>b</2>\ntrailing", fixed_cost);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "<1>a</1>\n<2>b</2>");
    }
}
