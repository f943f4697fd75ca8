//! Limitador de admissão.
//!
//! Decide se uma nova avaliação (não cacheada) pode começar. Acertos de
//! cache nunca passam por aqui.

mod bucket;

pub use bucket::TokenBucket;
