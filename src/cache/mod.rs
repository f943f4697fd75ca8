//! Cache LRU para resultados de avaliação.
//!
//! Este módulo implementa um cache Least Recently Used (LRU) com expiração
//! por entrada, evitando reexecutar o avaliador para corpos de requisição
//! idênticos.

mod lru;

pub use self::lru::{CacheEntry, ResultCache};
