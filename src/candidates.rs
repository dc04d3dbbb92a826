//! Continuation candidates, bucketed by the number of stones on the board.
//!
//! Shallow positions produce far more candidates than deep ones. Serving
//! the least-served bucket first spreads the search over all game phases.

use std::fmt;

use crate::mcts::MctsNode;

#[derive(Clone, Debug, Default)]
struct Bucket {
    served: u32,
    nodes: Vec<MctsNode>,
}

pub struct CandidateList {
    /// Indexed by stone count.
    buckets: Vec<Bucket>,
    rng: fastrand::Rng,
}

impl CandidateList {
    pub fn new(board_size: usize) -> Self {
        Self {
            buckets: vec![Bucket::default(); board_size * board_size + 1],
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn add(&mut self, nodes: impl IntoIterator<Item = MctsNode>) {
        let last = self.buckets.len() - 1;
        for node in nodes {
            let stones = node.value.board.stone_counts().stones();
            self.buckets[stones.min(last)].nodes.push(node);
        }
    }

    /// Take a random candidate from the non-empty bucket served least often
    /// (lowest stone count on ties).
    pub fn next_candidate(&mut self) -> Option<MctsNode> {
        let bucket = self
            .buckets
            .iter_mut()
            .filter(|b| !b.nodes.is_empty())
            .min_by_key(|b| b.served)?;
        let pick = self.rng.usize(..bucket.nodes.len());
        bucket.served += 1;
        Some(bucket.nodes.swap_remove(pick))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.nodes.is_empty())
    }

    /// Candidates waiting in all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.nodes.len()).sum()
    }

    /// How often each bucket has been served, by stone count.
    pub fn served(&self) -> Vec<u32> {
        self.buckets.iter().map(|b| b.served).collect()
    }

    /// Candidates waiting per bucket, by stone count.
    pub fn waiting(&self) -> Vec<usize> {
        self.buckets.iter().map(|b| b.nodes.len()).collect()
    }
}

impl fmt::Display for CandidateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stones    ")?;
        for i in 0..self.buckets.len() {
            write!(f, " {i:5}")?;
        }
        write!(f, "\nserved    ")?;
        for b in &self.buckets {
            write!(f, " {:5}", b.served)?;
        }
        write!(f, "\ncandidates")?;
        for b in &self.buckets {
            write!(f, " {:5}", b.nodes.len())?;
        }
        writeln!(f)
    }
}
