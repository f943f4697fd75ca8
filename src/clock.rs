//! Fonte de tempo injetável.
//!
//! O limitador e o cache calculam reabastecimento e expiração a partir de
//! um [`Clock`], o que permite testes determinísticos com [`ManualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fonte de tempo monotônico.
pub trait Clock: Send + Sync {
    /// Instante atual.
    fn now(&self) -> Instant;
}

/// Relógio do sistema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Relógio controlado manualmente, para testes.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Cria um relógio parado no instante atual.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Avança o relógio.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_only_when_told() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));

        // Clones compartilham o mesmo deslocamento
        let other = clock.clone();
        other.advance(Duration::from_secs(1));
        assert_eq!(clock.now() - t0, Duration::from_millis(1250));
    }
}
