/*!
 * Identifier obfuscation for chunks in transit.
 *
 * Models merge or skip neighbouring entries more often when the ids are
 * small consecutive integers. Before a chunk is sent its ids are rewritten,
 * and the reverse mapping restores them once the response comes back.
 */

use std::collections::{HashMap, HashSet};

use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;
use rand::seq::index;

use super::tags::{self, TaggedBlock};

/// How ids are rewritten for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObfuscationStrategy {
    /// Sequential ids `1..=k` in order of appearance
    Reindex,
    /// Distinct random ids drawn from `[1, 10k)`
    Randomize,
}

/// Reverse mapping from the id sent to the model to the original id.
/// Scoped to a single attempt on a single chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    reverse: HashMap<u64, u64>,
}

impl IdMapping {
    /// Original id for an id seen in model output
    pub fn original(&self, obfuscated: u64) -> Option<u64> {
        self.reverse.get(&obfuscated).copied()
    }

    /// Number of mapped ids
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    fn insert(&mut self, obfuscated: u64, original: u64) {
        self.reverse.insert(obfuscated, original);
    }
}

/// Rewrites and restores subtitle ids
pub struct IdObfuscator;

impl IdObfuscator {
    /// Rewrite ids with the given strategy using the thread-local RNG
    pub fn obfuscate(chunk_text: &str, strategy: ObfuscationStrategy) -> (String, IdMapping) {
        Self::obfuscate_with(chunk_text, strategy, &mut rand::rng())
    }

    /// Rewrite ids with the given strategy.
    ///
    /// Block order in the text is unchanged; only the ids move.
    pub fn obfuscate_with<R: Rng + ?Sized>(
        chunk_text: &str,
        strategy: ObfuscationStrategy,
        rng: &mut R,
    ) -> (String, IdMapping) {
        let blocks = tags::find_blocks(chunk_text);
        let new_ids = match strategy {
            ObfuscationStrategy::Reindex => (1..=blocks.len() as u64).collect(),
            ObfuscationStrategy::Randomize => Self::draw_random_ids(blocks.len(), rng),
        };

        let mut mapping = IdMapping::default();
        let rewritten: Vec<TaggedBlock> = blocks
            .iter()
            .zip(new_ids)
            .map(|(block, new_id)| {
                mapping.insert(new_id, block.id);
                block.with_id(new_id)
            })
            .collect();

        (tags::render_blocks(&rewritten), mapping)
    }

    /// `count` distinct ids from `[1, 10 * count)`, in random order
    fn draw_random_ids<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<u64> {
        if count == 0 {
            return Vec::new();
        }
        index::sample(rng, count * 10 - 1, count)
            .into_iter()
            .map(|i| i as u64 + 1)
            .collect()
    }

    /// Randomly permute block order using the thread-local RNG
    pub fn shuffle(chunk_text: &str) -> String {
        Self::shuffle_with(chunk_text, &mut rand::rng())
    }

    /// Randomly permute block order
    pub fn shuffle_with<R: Rng + ?Sized>(chunk_text: &str, rng: &mut R) -> String {
        let mut blocks = tags::find_blocks(chunk_text);
        blocks.shuffle(rng);
        tags::render_blocks(&blocks)
    }

    /// Map model output back to original ids.
    ///
    /// Blocks whose id is not in the mapping cannot be attributed to any
    /// source entry and are dropped. Only the first block for each original
    /// id is kept. The result is sorted by original id, which also undoes
    /// any shuffling.
    pub fn reconcile(response_text: &str, mapping: &IdMapping) -> String {
        let mut restored: Vec<TaggedBlock> = Vec::new();
        let mut seen = HashSet::new();
        for block in tags::find_blocks(response_text) {
            match mapping.original(block.id) {
                Some(original) if !seen.insert(original) => {
                    debug!("Discarding repeated block id {} from model output", block.id)
                }
                Some(original) => restored.push(block.with_id(original)),
                None => debug!("Discarding unmapped block id {} from model output", block.id),
            }
        }

        restored.sort_by_key(|block| block.id);
        tags::render_blocks(&restored)
    }
}
