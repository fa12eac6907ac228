//! `CharTrie`, `BPEMerges`, and the maximum-likelihood / BPE tokenizers built on them.

pub mod bpe;
pub mod ml_tokenizer;
pub mod trie;

pub use bpe::{BPEMerges, BpeTokenizer};
pub use ml_tokenizer::{CoverageFallback, MlTokenizer};
pub use trie::CharTrie;
