pub mod analog;
pub mod catalyst;
pub mod config;
pub mod error;
pub mod features;
pub mod fetch;
pub mod filter;
pub mod indicator;
pub mod market;
pub mod model;
pub mod pipeline;
pub mod rank_store;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod source;
pub mod symbol_map;
