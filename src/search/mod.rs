//! Search callers built on the `Database` interface.

pub mod vector;

pub use vector::{
    MATCH_CODE_EXAMPLES, MATCH_CRAWLED_PAGES, SIMILARITY_THRESHOLD, ScoredRow, VectorSearch,
};
