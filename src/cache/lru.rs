//! Cache LRU para resultados de avaliação.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::clock::{Clock, SystemClock};
use crate::types::responses::EvaluationOutcome;

/// Entrada do cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resultado armazenado.
    pub outcome: EvaluationOutcome,

    /// Instante a partir do qual a entrada deixa de valer.
    ///
    /// `None` quando `now + ttl` não cabe num `Instant`: a entrada só sai
    /// por despejo LRU.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Verifica se a entrada expirou em `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache LRU de resultados, indexado pelos bytes exatos do corpo.
///
/// A chave é comparada byte a byte; nenhum digest substitui a chave.
/// Todas as operações seguram o mutex apenas durante a manipulação da
/// estrutura, e os valores são clonados para fora, de modo que um leitor
/// nunca observa uma entrada parcialmente escrita.
pub struct ResultCache {
    entries: Mutex<LruCache<Vec<u8>, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    /// Cria um novo cache com o relógio do sistema.
    ///
    /// # Argumentos
    /// - `capacity`: Número máximo de entradas (mínimo 1)
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Cria um cache com um relógio injetado.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<Vec<u8>, CacheEntry>> {
        // Nenhuma operação deixa o LRU inconsistente no meio, então um
        // mutex envenenado ainda guarda uma estrutura válida.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Busca no cache.
    ///
    /// Retorna `None` se não encontrado ou se expirado; uma entrada expirada
    /// é removida. Um acerto atualiza a posição LRU da entrada.
    pub fn get(&self, key: &[u8]) -> Option<EvaluationOutcome> {
        let now = self.clock.now();
        let mut entries = self.lock();

        // peek não altera a ordem LRU
        if entries.peek(key)?.is_expired(now) {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|e| e.outcome.clone())
    }

    /// Insere ou sobrescreve uma entrada, com expiração em `now + ttl`.
    ///
    /// Se o cache estiver cheio, a entrada menos recentemente usada sai.
    pub fn put(&self, key: Vec<u8>, outcome: EvaluationOutcome, ttl: Duration) {
        let expires_at = self.clock.now().checked_add(ttl);
        if expires_at.is_none() {
            tracing::debug!(?ttl, "TTL beyond the clock range, entry never expires");
        }
        self.lock().put(key, CacheEntry { outcome, expires_at });
    }

    /// Número atual de entradas (incluindo expiradas ainda não lidas).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Retorna `true` se o cache estiver vazio.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Capacidade máxima.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}
