pub mod cache;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod layout;
pub mod npz;
pub mod output;
pub mod pad;
pub mod parse;
