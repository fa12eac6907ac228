//! Maximum-likelihood tokenizer: a dynamic program over a symbol [`CharTrie`] and per-token
//! negative log-likelihood scores.

use dataloom_core::{Error, Result};

use crate::trie::CharTrie;

/// What to do when no valid tokenization covers the input, configured at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageFallback {
    /// Report [`Error::Coverage`] at the uncovered position.
    Strict,
    /// Fall back to a configured byte-level unknown token for each uncovered byte.
    ByteUnknown(u32),
}

/// Tokenizes input by minimizing total negative log-likelihood score over the token ids that
/// terminate at each position, with ties broken first by fewest tokens overall, then by
/// lowest token id.
pub struct MlTokenizer<'a> {
    trie: &'a CharTrie,
    scores: &'a [f64],
    fallback: CoverageFallback,
}

/// One relaxation state at a DP position: total score, token count, and the id of the token
/// that reaches this position — used to break ties in that priority order.
#[derive(Clone, Copy)]
struct State {
    cost: f64,
    num_tokens: usize,
    last_id: u32,
}

impl State {
    /// Whether `self` should replace `other` as the best way to reach a position, per the
    /// spec's tie-break order: lower cost, then fewer tokens, then lower token id.
    fn better_than(&self, other: &State) -> bool {
        const EPS: f64 = 1e-9;
        if self.cost + EPS < other.cost {
            return true;
        }
        if self.cost > other.cost + EPS {
            return false;
        }
        if self.num_tokens != other.num_tokens {
            return self.num_tokens < other.num_tokens;
        }
        self.last_id < other.last_id
    }
}

impl<'a> MlTokenizer<'a> {
    /// `scores` is indexed by token id; `scores[id]` is that token's negative log-likelihood.
    pub fn new(trie: &'a CharTrie, scores: &'a [f64], fallback: CoverageFallback) -> Self {
        Self {
            trie,
            scores,
            fallback,
        }
    }

    pub fn tokenize(&self, input: &[u8]) -> Result<Vec<u32>> {
        let n = input.len();
        let mut best: Vec<Option<State>> = vec![None; n + 1];
        let mut back: Vec<Option<(usize, u32)>> = vec![None; n + 1];
        best[0] = Some(State {
            cost: 0.0,
            num_tokens: 0,
            last_id: u32::MAX,
        });

        for i in 0..n {
            let Some(from) = best[i] else { continue };
            for (j, id) in self.trie.terminal_matches(input, i) {
                let Some(&score) = self.scores.get(id as usize) else {
                    continue;
                };
                let candidate = State {
                    cost: from.cost + score,
                    num_tokens: from.num_tokens + 1,
                    last_id: id,
                };
                let is_better = match best[j] {
                    Some(current) => candidate.better_than(&current),
                    None => true,
                };
                if is_better {
                    best[j] = Some(candidate);
                    back[j] = Some((i, id));
                }
            }
        }

        if best[n].is_none() {
            return self.fallback_tokenize(input);
        }

        let mut tokens = Vec::new();
        let mut i = n;
        while i > 0 {
            let (prev, id) = back[i].expect("reachable position always has a backpointer");
            tokens.push(id);
            i = prev;
        }
        tokens.reverse();
        Ok(tokens)
    }

    fn fallback_tokenize(&self, input: &[u8]) -> Result<Vec<u32>> {
        match self.fallback {
            CoverageFallback::Strict => Err(Error::Coverage(
                "no tokenization covers the input with known symbols".to_string(),
            )),
            CoverageFallback::ByteUnknown(unk) => Ok(vec![unk; input.len().max(1)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie_abc() -> CharTrie {
        let mut t = CharTrie::new();
        t.insert(b"a", Some(0));
        t.insert(b"b", Some(1));
        t.insert(b"c", Some(2));
        t.insert(b"ab", Some(3));
        t.insert(b"bc", Some(4));
        t
    }

    #[test]
    fn test_ml_tokenizer_tie_break_prefers_lower_last_token_id() {
        let trie = trie_abc();
        // "ab"(id 3) + "c"(id 2) = 0.1 + 1.0 = 1.1, vs "a"(id 0) + "bc"(id 4) = 1.0 + 0.1 =
        // 1.1 -- same cost and token count, so the segmentation ending in the lower token id
        // ("c", id 2) wins over the one ending in "bc" (id 4).
        let scores = vec![1.0, 1.0, 1.0, 0.1, 0.1];
        let tok = MlTokenizer::new(&trie, &scores, CoverageFallback::Strict);
        let ids = tok.tokenize(b"abc").unwrap();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_ml_tokenizer_picks_cheaper_segmentation() {
        let trie = trie_abc();
        // "ab"+"c" = 0.1 + 1.0 = 1.1 is strictly cheaper than "a"+"b"+"c" = 3.0.
        let scores = vec![1.0, 1.0, 1.0, 0.1, 5.0];
        let tok = MlTokenizer::new(&trie, &scores, CoverageFallback::Strict);
        let ids = tok.tokenize(b"abc").unwrap();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_ml_tokenizer_coverage_error_when_strict() {
        let trie = trie_abc();
        let scores = vec![1.0; 5];
        let tok = MlTokenizer::new(&trie, &scores, CoverageFallback::Strict);
        let err = tok.tokenize(b"abz").unwrap_err();
        assert!(matches!(err, Error::Coverage(_)));
    }

    #[test]
    fn test_ml_tokenizer_byte_unknown_fallback() {
        let trie = trie_abc();
        let scores = vec![1.0; 5];
        let tok = MlTokenizer::new(&trie, &scores, CoverageFallback::ByteUnknown(99));
        let ids = tok.tokenize(b"abz").unwrap();
        assert_eq!(ids, vec![99, 99, 99]);
    }

    #[test]
    fn test_ml_tokenizer_empty_input_yields_empty_output() {
        let trie = trie_abc();
        let scores = vec![1.0; 5];
        let tok = MlTokenizer::new(&trie, &scores, CoverageFallback::Strict);
        assert_eq!(tok.tokenize(b"").unwrap(), Vec::<u32>::new());
    }
}
