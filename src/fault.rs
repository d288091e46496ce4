//! Fault-injection gate: a single boolean switch that simulates crashing a
//! replica. Kept as one primitive rather than threaded through every
//! handler's logic (§9 re-architecture guidance).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Clone)]
pub struct FaultGate {
    alive: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl FaultGate {
    pub fn new(poll_interval: Duration) -> Self {
        FaultGate {
            alive: Arc::new(AtomicBool::new(true)),
            poll_interval,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Blocks (without holding any lock) until the gate is alive again.
    /// Every inbound RPC handler and every outbound-RPC-issuing driver
    /// awaits this first; `/turnon` and `/turnoff` are the only endpoints
    /// that skip it.
    pub async fn await_alive(&self) {
        while !self.is_alive() {
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_alive_returns_immediately_when_alive() {
        let gate = FaultGate::new(Duration::from_millis(10));
        gate.await_alive().await;
    }

    #[tokio::test]
    async fn set_alive_toggles_is_alive() {
        let gate = FaultGate::new(Duration::from_millis(5));
        gate.set_alive(false);
        assert!(!gate.is_alive());
        gate.set_alive(true);
        assert!(gate.is_alive());
    }

    #[tokio::test]
    async fn await_alive_unblocks_after_revival() {
        let gate = FaultGate::new(Duration::from_millis(5));
        gate.set_alive(false);
        let waiter = gate.clone();
        let handle = tokio::spawn(async move {
            waiter.await_alive().await;
        });
        sleep(Duration::from_millis(20)).await;
        gate.set_alive(true);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("await_alive should unblock after revival")
            .unwrap();
    }
}
