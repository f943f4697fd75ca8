//! Token bucket com reabastecimento preguiçoso.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::clock::{Clock, SystemClock};

#[derive(Debug)]
struct LimiterState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket de admissão.
///
/// Capacidade `burst`, reabastecido continuamente a `rate` tokens/segundo.
/// O reabastecimento é calculado a cada chamada a partir do tempo decorrido;
/// não há timer em segundo plano. O estado fica sob um mutex de seção
/// crítica curta, então dois chamadores nunca consomem o mesmo token.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<LimiterState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Cria um bucket cheio com o relógio do sistema.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::with_clock(rate, burst, Arc::new(SystemClock))
    }

    /// Cria um bucket cheio com um relógio injetado.
    pub fn with_clock(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        let burst = f64::from(burst);
        let now = clock.now();
        Self {
            rate: rate.max(0.0),
            burst,
            state: Mutex::new(LimiterState {
                tokens: burst,
                last_refill: now,
            }),
            clock,
        }
    }

    fn refilled(&self) -> MutexGuard<'_, LimiterState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Lido sob o lock para que last_refill nunca ande para trás
        let now = self.clock.now();

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        state.last_refill = now;
        state
    }

    /// Tenta admitir uma avaliação. Nunca bloqueia.
    ///
    /// Consome um token e retorna `true` se houver pelo menos um disponível;
    /// caso contrário retorna `false` sem consumir nada.
    pub fn try_admit(&self) -> bool {
        let mut state = self.refilled();
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens disponíveis agora (após reabastecer).
    pub fn available(&self) -> f64 {
        self.refilled().tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manual_bucket(rate: f64, burst: u32) -> (TokenBucket, ManualClock) {
        let clock = ManualClock::new();
        let bucket = TokenBucket::with_clock(rate, burst, Arc::new(clock.clone()));
        (bucket, clock)
    }

    #[test]
    fn test_starts_full() {
        let (bucket, _clock) = manual_bucket(1.0, 3);

        assert!(bucket.try_admit());
        assert!(bucket.try_admit());
        assert!(bucket.try_admit());
        assert!(!bucket.try_admit());
    }

    #[test]
    fn test_denial_consumes_nothing() {
        let (bucket, clock) = manual_bucket(2.0, 1);
        assert!(bucket.try_admit());

        // Várias recusas seguidas não deixam o saldo negativo
        for _ in 0..10 {
            assert!(!bucket.try_admit());
        }

        clock.advance(Duration::from_millis(500));
        assert!(bucket.try_admit());
    }

    #[test]
    fn test_lazy_refill_is_proportional() {
        let (bucket, clock) = manual_bucket(10.0, 5);
        for _ in 0..5 {
            assert!(bucket.try_admit());
        }
        assert!(bucket.available() < 1.0);

        clock.advance(Duration::from_millis(250));
        assert!((bucket.available() - 2.5).abs() < 1e-9);

        assert!(bucket.try_admit());
        assert!(bucket.try_admit());
        assert!(!bucket.try_admit());
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let (bucket, clock) = manual_bucket(100.0, 4);
        clock.advance(Duration::from_secs(60));

        assert_eq!(bucket.available(), 4.0);
    }

    #[test]
    fn test_rate_20_burst_30_denies_31st() {
        let (bucket, clock) = manual_bucket(20.0, 30);

        let mut admitted = 0;
        for _ in 0..31 {
            if bucket.try_admit() {
                admitted += 1;
            }
            // 31 requisições espalhadas em bem menos de 50 ms
            clock.advance(Duration::from_micros(100));
        }

        assert_eq!(admitted, 30);
    }

    #[test]
    fn test_concurrent_callers_never_share_a_token() {
        let bucket = Arc::new(TokenBucket::new(0.0, 50));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if bucket.try_admit() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
    }
}
