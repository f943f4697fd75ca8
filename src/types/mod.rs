//! Tipos compartilhados do evalgate.

pub mod config;
pub mod errors;
pub mod requests;
pub mod responses;
