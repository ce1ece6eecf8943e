//! Tabu memory over visit matrices: three independent Bloom-style bit
//! arrays addressed by three power-sum hashes. A state is tabu only when all
//! three arrays agree, which keeps the false-positive rate low while
//! membership stays O(1).

use crate::state::{Move, VisitMatrix};
use fixedbitset::FixedBitSet;

/// Hash triple identifying one visit matrix. Values are already reduced
/// modulo the bit-array size.
pub type HashTriple = [u64; 3];

/// Three bit arrays `H1..H3` with exponents `gamma1..gamma3`. Bits are set,
/// never cleared. The array size must be a power of two so that the
/// wrapping incremental updates agree with a full recomputation.
pub struct TabuMemory {
    bits: [FixedBitSet; 3],
    gammas: [f64; 3],
    mask: u64,
    node_num: usize,
    current: HashTriple,
}

impl TabuMemory {
    /// `bit_size` must be a power of two; `gammas` must be three distinct
    /// exponents in (0,1) or (1,2].
    pub fn new(bit_size: usize, gammas: [f64; 3], node_num: usize) -> Self {
        assert!(bit_size.is_power_of_two(), "tabu bit array size must be a power of two");
        TabuMemory {
            bits: [
                FixedBitSet::with_capacity(bit_size),
                FixedBitSet::with_capacity(bit_size),
                FixedBitSet::with_capacity(bit_size),
            ],
            gammas,
            mask: bit_size as u64 - 1,
            node_num,
            current: [0; 3],
        }
    }

    /// The hash term of one raised cell: `floor((p*N + n)^gamma)`.
    #[inline]
    fn term(&self, p: usize, n: usize, k: usize) -> u64 {
        ((p * self.node_num + n) as f64).powf(self.gammas[k]) as u64
    }

    /// Full recomputation of one hash: sum of terms over raised cells,
    /// reduced modulo the array size.
    fn hash(&self, visits: &VisitMatrix, k: usize) -> u64 {
        let mut sum: u64 = 0;
        for (p, n) in visits.ones() {
            sum = sum.wrapping_add(self.term(p, n, k));
        }
        sum & self.mask
    }

    /// Full hash triple of a visit matrix.
    pub fn hash_state(&self, visits: &VisitMatrix) -> HashTriple {
        [
            self.hash(visits, 0),
            self.hash(visits, 1),
            self.hash(visits, 2),
        ]
    }

    /// The hash triple of the state reached by applying `mv` to the state
    /// hashed by `from`. The deltas mirror `hash_state` exactly: because the
    /// array size divides 2^64, wrapping add/sub before reduction matches a
    /// full recomputation of the post-move matrix.
    pub fn shift(&self, from: HashTriple, mv: &Move) -> HashTriple {
        let mut out = [0u64; 3];
        for k in 0..3 {
            let shifted = match *mv {
                Move::Add { p, n } => from[k].wrapping_add(self.term(p, n, k)),
                Move::Del { p, n } => from[k].wrapping_sub(self.term(p, n, k)),
                Move::Mov { n, from: fp, to } => from[k]
                    .wrapping_add(self.term(to, n, k))
                    .wrapping_sub(self.term(fp, n, k)),
                Move::Swp { p1, n1, p2, n2 } => from[k]
                    .wrapping_sub(self.term(p1, n1, k))
                    .wrapping_sub(self.term(p2, n2, k))
                    .wrapping_add(self.term(p1, n2, k))
                    .wrapping_add(self.term(p2, n1, k)),
            };
            out[k] = shifted & self.mask;
        }
        out
    }

    fn triple_set(&self, triple: HashTriple) -> bool {
        (0..3).all(|k| self.bits[k].contains(triple[k] as usize))
    }

    /// Is the given matrix a visited state?
    pub fn is_tabu_state(&self, visits: &VisitMatrix) -> bool {
        self.triple_set(self.hash_state(visits))
    }

    /// Would applying `mv` to the tracked state land on a visited state?
    pub fn is_tabu_move(&self, mv: &Move) -> bool {
        self.triple_set(self.shift(self.current, mv))
    }

    /// Mark the state reached by `mv` from the tracked state without moving
    /// the tracked triple. Used while probing candidates.
    pub fn mark_move(&mut self, mv: &Move) {
        let triple = self.shift(self.current, mv);
        self.mark(triple);
    }

    fn mark(&mut self, triple: HashTriple) {
        for k in 0..3 {
            self.bits[k].insert(triple[k] as usize);
        }
    }

    /// Advance the tracked triple across an accepted move and mark the new
    /// state.
    pub fn commit_move(&mut self, mv: &Move) {
        self.current = self.shift(self.current, mv);
        let triple = self.current;
        self.mark(triple);
    }

    /// Re-anchor the tracked triple on a full matrix and mark it.
    pub fn commit_state(&mut self, visits: &VisitMatrix) {
        self.current = self.hash_state(visits);
        let triple = self.current;
        self.mark(triple);
    }

    /// The tracked hash triple of the current search state.
    pub fn current(&self) -> HashTriple {
        self.current
    }
}
