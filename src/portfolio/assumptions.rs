use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::portfolio::occurs::OccurVar;


// Random and Sequential walk all 2^n sign patterns; FewFirst and
// MoreFirst emit 2n sentinel-terminated prefixes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Strategy {
    Random,
    Sequential,
    FewFirst,
    MoreFirst,
}


// The stream of assumption vectors a run will dispatch, materialized up
// front so that pruning can erase arbitrary pending vectors and account
// for them in the limit. Vectors hold signed 1-based literals; a 0 entry
// terminates a Progressive vector early.
pub struct AssumptionGenerator {
    width: usize,
    limit: u64,
    queue: VecDeque<Vec<i32>>,
}

impl AssumptionGenerator {
    pub fn new(strategy: Strategy, branch: &[OccurVar]) -> AssumptionGenerator {
        AssumptionGenerator::with_seed(strategy, branch, time::precise_time_ns())
    }

    pub fn with_seed(strategy: Strategy, branch: &[OccurVar], seed: u64) -> AssumptionGenerator {
        let n = branch.len();
        assert!(n >= 1, "empty branch set");

        let mut queue = VecDeque::new();
        match strategy {
            Strategy::Random => {
                assert!(n < 64);
                let total = 1u64 << n;
                let mut values: Vec<u64> = (0..total).collect();
                values.shuffle(&mut StdRng::seed_from_u64(seed));
                for v in values {
                    queue.push_back(encode_equal(v, branch));
                }
            }
            Strategy::Sequential => {
                assert!(n < 64);
                let total = 1u64 << n;
                // Start from the integer spelled by the majority
                // polarities: bit j set iff branch[j] is mostly positive.
                let start = branch
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.polarity_max())
                    .fold(0u64, |acc, (j, _)| acc | (1u64 << j));
                let mut v = start;
                loop {
                    queue.push_back(encode_equal(v, branch));
                    v = (v + 1) % total;
                    if v == start {
                        break;
                    }
                }
            }
            Strategy::FewFirst => {
                for k in 1..=n {
                    push_progressive_pair(&mut queue, k, branch);
                }
            }
            Strategy::MoreFirst => {
                for k in (1..=n).rev() {
                    push_progressive_pair(&mut queue, k, branch);
                }
            }
        }

        AssumptionGenerator {
            width: n,
            limit: queue.len() as u64,
            queue,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn next(&mut self) -> Option<Vec<i32>> {
        self.queue.pop_front()
    }

    // Number of sub-problems the run must account for; shrinks when
    // pruning erases vectors.
    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    // Erases every remaining vector containing all of the conflict
    // literals: such an assumption would provably end UNSAT.
    pub fn remove_conflicts(&mut self, conflicts: &[i32]) -> u64 {
        let before = self.queue.len();
        self.queue.retain(|v| !contains_all(v, conflicts));
        let erased = (before - self.queue.len()) as u64;
        self.limit -= erased;
        erased
    }
}

fn contains_all(vector: &[i32], conflicts: &[i32]) -> bool {
    conflicts
        .iter()
        .all(|c| vector.iter().take_while(|&&x| x != 0).any(|&x| x == *c))
}

fn encode_equal(value: u64, branch: &[OccurVar]) -> Vec<i32> {
    (0..branch.len())
        .map(|j| {
            let id = branch[j].var().index() as i32 + 1;
            if (value >> j) & 1 == 1 {
                id
            } else {
                -id
            }
        })
        .collect()
}

// Majority polarity below position k - 1, minority polarity there,
// sentinel above.
fn encode_progressive(k: usize, branch: &[OccurVar]) -> Vec<i32> {
    let n = branch.len();
    let mut out = vec![0i32; n];
    for j in 0..k {
        let id = branch[j].var().index() as i32 + 1;
        let positive = if j == k - 1 {
            !branch[j].polarity_max()
        } else {
            branch[j].polarity_max()
        };
        out[j] = if positive { id } else { -id };
    }
    out
}

fn push_progressive_pair(queue: &mut VecDeque<Vec<i32>>, k: usize, branch: &[OccurVar]) {
    let first = encode_progressive(k, branch);
    let mut twin = first.clone();
    twin[0] = -twin[0];
    queue.push_back(first);
    queue.push_back(twin);
}
