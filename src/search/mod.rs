//! Retrieval pathways: lexical BM25, vector ANN, and their fusion.

pub mod fusion;
pub mod lexical;
pub mod vector;

pub use fusion::{fuse, FusionOptions};
pub use lexical::{lexical_search, tokenize_query, LexicalOptions};
pub use vector::{vector_search, VectorOptions};
