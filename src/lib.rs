pub mod api_connection;
pub mod breaker;
pub mod cache;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extractor;
pub mod fuzzy;
pub mod generation;
pub mod models;
pub mod normalize;
pub mod prompts;
pub mod recipe;
pub mod recommend;
pub mod retriever;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;
