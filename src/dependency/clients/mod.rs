//! Transport and source-control clients shared by the dependency sources

pub mod github;
pub mod web;
