use std::future::pending;

use tokio::sync::watch;

/// Latched stop flag shared by every run of one invocation.
///
/// Once raised it stays raised, so a signal that lands between two runs is
/// still seen by the next one.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Raising side of an [`Interrupt`].
#[derive(Debug)]
pub struct InterruptTrigger(watch::Sender<bool>);

impl InterruptTrigger {
    pub fn raise(&self) {
        self.0.send_replace(true);
    }
}

impl Interrupt {
    pub fn new() -> (InterruptTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (InterruptTrigger(tx), Self { rx })
    }

    /// Raise on the first Ctrl-C. Must be called inside a tokio runtime.
    pub fn ctrl_c() -> Self {
        let (trigger, interrupt) = Self::new();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!(target: "icd10_import", event = "interrupt_received");
                    trigger.raise();
                }
                Err(err) => {
                    tracing::warn!(
                        target: "icd10_import",
                        event = "interrupt_unavailable",
                        error = %err
                    );
                    // Hold the trigger so waiters stay pending.
                    let _trigger = trigger;
                    pending::<()>().await;
                }
            }
        });
        interrupt
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once raised, immediately if it already is. Never resolves
    /// when the trigger is dropped without raising.
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            pending::<()>().await;
        }
    }
}
