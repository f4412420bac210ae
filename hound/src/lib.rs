//! Hound - product search engine for industrial catalogs
//!
//! This library implements the search core behind the product lookup service:
//! TF-IDF lexical retrieval over order codes and descriptions, fuzzy string
//! scoring, and a bagged-tree relevance model trained on confirmed
//! (customer query, order code) pairs.
//!
//! Wire types live in [`interface`]; [`SearchStore`] is the serving object.

pub(crate) mod candidate;
pub mod config;
pub mod database;
mod features;
pub mod fuzzy;
mod indexer;
pub mod interface;
mod model;
pub mod models;
pub mod normalize;
mod search;
mod store;

pub use interface::*;
pub use store::SearchStore;
