//! Tier Orchestrator (spec §4.3): tracks consecutive LLM failures, selects the
//! active tier, and drives a background health probe that re-escalates to T1.
//! Single process-wide controller; state is single-writer under a lock per
//! the concurrency model in spec §5.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    T1 = 1,
    T2 = 2,
    T3 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Auto,
    ForceT1,
    ForceT2,
    ForceT3,
}

impl Mode {
    pub fn parse(s: &str) -> Self {
        match s {
            "force-t1" | "force_t1" => Mode::ForceT1,
            "force-t2" | "force_t2" => Mode::ForceT2,
            "force-t3" | "force_t3" => Mode::ForceT3,
            _ => Mode::Auto,
        }
    }
}

struct State {
    mode: Mode,
    tier: Tier,
    consecutive_failures: u32,
    cooldown_until: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    probe_handle: Option<JoinHandle<()>>,
}

pub struct TierOrchestrator {
    state: Mutex<State>,
    base_cooldown: Duration,
    health_probe_interval: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct TierStatus {
    pub mode: Mode,
    pub tier: Tier,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl TierOrchestrator {
    pub fn new(mode: Mode, base_cooldown: Duration, health_probe_interval: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                mode,
                tier: Tier::T1,
                consecutive_failures: 0,
                cooldown_until: None,
                last_success: None,
                last_failure: None,
                probe_handle: None,
            }),
            base_cooldown,
            health_probe_interval,
        }
    }

    /// Tier selection in auto mode (spec §4.3): if the cooldown has elapsed,
    /// optimistically reset to T1 and cancel the health probe, then return the
    /// current tier. Pure given `(now, cooldown_until, current_tier)`, per the
    /// testable property in spec §8.
    pub async fn current_tier(&self) -> Tier {
        let mut state = self.state.lock().await;
        match state.mode {
            Mode::ForceT1 => return Tier::T1,
            Mode::ForceT2 => return Tier::T2,
            Mode::ForceT3 => return Tier::T3,
            Mode::Auto => {}
        }

        if let Some(until) = state.cooldown_until {
            if Utc::now() > until {
                state.tier = Tier::T1;
                state.cooldown_until = None;
                if let Some(handle) = state.probe_handle.take() {
                    handle.abort();
                }
            }
        }
        state.tier
    }

    pub async fn status(&self) -> TierStatus {
        let state = self.state.lock().await;
        TierStatus {
            mode: state.mode,
            tier: state.tier,
            consecutive_failures: state.consecutive_failures,
            cooldown_until: state.cooldown_until,
        }
    }

    /// Any reported success resets tier to T1, consecutive=0, cooldown=None,
    /// and cancels the health probe.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        state.tier = Tier::T1;
        state.consecutive_failures = 0;
        state.cooldown_until = None;
        state.last_success = Some(Utc::now());
        if let Some(handle) = state.probe_handle.take() {
            handle.abort();
        }
    }

    /// Escalation policy (spec §4.3 table): 1-2 failures -> T2/baseCooldown;
    /// 3-9 -> T2/5min; >=10 -> T3/15min.
    pub async fn report_failure(self: &Arc<Self>, probe: impl Fn() -> ProbeFuture + Send + Sync + 'static) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        state.last_failure = Some(Utc::now());

        let (tier, cooldown) = match state.consecutive_failures {
            1..=2 => (Tier::T2, self.base_cooldown),
            3..=9 => (Tier::T2, Duration::from_secs(300)),
            _ => (Tier::T3, Duration::from_secs(900)),
        };
        state.tier = tier;
        state.cooldown_until = Some(Utc::now() + chrono::Duration::from_std(cooldown).unwrap());

        if state.probe_handle.is_none() {
            let this = self.clone();
            let interval = self.health_probe_interval;
            state.probe_handle = Some(tokio::spawn(async move {
                this.run_health_probe(interval, probe).await;
            }));
        }
    }

    async fn run_health_probe(
        self: Arc<Self>,
        interval: Duration,
        probe: impl Fn() -> ProbeFuture,
    ) {
        loop {
            tokio::time::sleep(interval).await;
            if probe().await.is_ok() {
                self.report_success().await;
                return;
            }
        }
    }

    /// The call-site contract (spec §4.3): in auto mode, the currently
    /// selected tier gates which implementation is attempted first, falling
    /// through t1 -> t2 -> t3 on error; `t3` must never fail. In forced modes,
    /// only the corresponding tier runs (falling back to `t3` if a forced
    /// non-T3 tier still errors, since the call site always needs a value).
    pub async fn with_fallback<T, E, T1, T2, T3, Fut1, Fut2>(
        self: &Arc<Self>,
        probe: impl Fn() -> ProbeFuture + Send + Sync + 'static,
        t1: T1,
        t2: T2,
        t3: T3,
    ) -> T
    where
        T1: FnOnce() -> Fut1,
        Fut1: Future<Output = Result<T, E>>,
        T2: FnOnce() -> Fut2,
        Fut2: Future<Output = Result<T, E>>,
        T3: FnOnce() -> T,
    {
        let mode = self.status().await.mode;

        match mode {
            Mode::ForceT1 => match t1().await {
                Ok(value) => {
                    self.report_success().await;
                    value
                }
                Err(_) => {
                    self.report_failure(probe).await;
                    t3()
                }
            },
            Mode::ForceT2 => match t2().await {
                Ok(value) => value,
                Err(_) => t3(),
            },
            Mode::ForceT3 => t3(),
            Mode::Auto => {
                let tier = self.current_tier().await;
                if matches!(tier, Tier::T1) {
                    match t1().await {
                        Ok(value) => {
                            self.report_success().await;
                            return value;
                        }
                        Err(_) => self.report_failure(probe).await,
                    }
                }
                if matches!(tier, Tier::T1 | Tier::T2) {
                    if let Ok(value) = t2().await {
                        return value;
                    }
                }
                t3()
            }
        }
    }
}

pub type ProbeFuture = std::pin::Pin<Box<dyn Future<Output = Result<(), ()>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn no_probe() -> ProbeFuture {
        Box::pin(async { Err(()) })
    }

    #[tokio::test]
    async fn escalates_to_t2_after_first_failure() {
        let orch = Arc::new(TierOrchestrator::new(
            Mode::Auto,
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));
        orch.report_failure(no_probe).await;
        let status = orch.status().await;
        assert_eq!(status.consecutive_failures, 1);
        assert!(matches!(status.tier, Tier::T2));
    }

    #[tokio::test]
    async fn escalates_to_t3_after_ten_failures() {
        let orch = Arc::new(TierOrchestrator::new(
            Mode::Auto,
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));
        for _ in 0..10 {
            orch.report_failure(no_probe).await;
        }
        let status = orch.status().await;
        assert!(matches!(status.tier, Tier::T3));
    }

    #[tokio::test]
    async fn success_resets_to_t1() {
        let orch = Arc::new(TierOrchestrator::new(
            Mode::Auto,
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));
        orch.report_failure(no_probe).await;
        orch.report_success().await;
        let status = orch.status().await;
        assert_eq!(status.consecutive_failures, 0);
        assert!(matches!(status.tier, Tier::T1));
    }

    #[tokio::test]
    async fn forced_mode_ignores_escalation() {
        let orch = Arc::new(TierOrchestrator::new(
            Mode::ForceT2,
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));
        assert!(matches!(orch.current_tier().await, Tier::T2));
    }
}
