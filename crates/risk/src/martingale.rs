use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Signal, TradeAction, TradeExecutor, TradeResult};

/// How many supporting rows are logged as trade rationale.
const RATIONALE_ROWS: usize = 5;

/// User-configurable ladder parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartingaleConfig {
    /// Stake of the first attempt.
    pub base_stake: f64,
    /// Maximum number of attempts in one ladder (>= 1).
    pub level_cap: u32,
    /// Option expiry in seconds, identical for every attempt.
    pub expiry_secs: u64,
}

impl Default for MartingaleConfig {
    fn default() -> Self {
        Self {
            base_stake: 1.0,
            level_cap: 3,
            expiry_secs: 60,
        }
    }
}

impl MartingaleConfig {
    /// Stake at 1-based `level`: `base_stake * 2^(level - 1)`.
    pub fn stake_for_level(&self, level: u32) -> f64 {
        self.base_stake * 2f64.powi(level.saturating_sub(1) as i32)
    }
}

/// Ladder state. `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LadderState {
    Active(u32),
    Won,
    Lost,
    Aborted,
}

impl std::fmt::Display for LadderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LadderState::Active(level) => write!(f, "active (level {level})"),
            LadderState::Won => write!(f, "won"),
            LadderState::Lost => write!(f, "lost"),
            LadderState::Aborted => write!(f, "aborted"),
        }
    }
}

/// One executor call within a ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub level: u32,
    pub stake: f64,
    pub trade_id: Option<String>,
    pub result: TradeResult,
}

/// Summary of a finished ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderReport {
    pub pair: String,
    pub action: TradeAction,
    pub state: LadderState,
    pub attempts: Vec<Attempt>,
}

impl LadderReport {
    pub fn stakes(&self) -> Vec<f64> {
        self.attempts.iter().map(|a| a.stake).collect()
    }

    pub fn total_staked(&self) -> f64 {
        self.attempts
            .iter()
            .filter(|a| a.result != TradeResult::PlacementFailed)
            .map(|a| a.stake)
            .sum()
    }
}

/// Mutable ladder state for one signal. Owned by a single `run` call.
#[derive(Debug, Clone)]
pub struct MartingaleSession {
    pub pair: String,
    pub action: TradeAction,
    pub level: u32,
    pub stake: f64,
    pub level_cap: u32,
}

impl MartingaleSession {
    fn open(signal: &Signal, config: &MartingaleConfig) -> Self {
        Self {
            pair: signal.pair.clone(),
            action: signal.action,
            level: 1,
            stake: config.base_stake,
            level_cap: config.level_cap.max(1),
        }
    }

    /// Apply one attempt result and return the next state.
    fn advance(&mut self, result: TradeResult) -> LadderState {
        match result {
            TradeResult::PlacementFailed => LadderState::Aborted,
            TradeResult::Win => LadderState::Won,
            TradeResult::Loss if self.level >= self.level_cap => LadderState::Lost,
            TradeResult::Loss => {
                self.level += 1;
                self.stake *= 2.0;
                LadderState::Active(self.level)
            }
        }
    }
}

/// Drives a martingale ladder of trade attempts for one signal.
///
/// Every loss below the cap doubles the stake and retries the same pair and
/// action. The ladder stops on the first win, on a placement failure, or
/// after `level_cap` losses. Nothing carries over to the next signal.
#[derive(Debug, Clone, Default)]
pub struct MartingaleController {
    config: MartingaleConfig,
}

impl MartingaleController {
    pub fn new(config: MartingaleConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, executor: &dyn TradeExecutor, signal: &Signal) -> LadderReport {
        self.log_rationale(signal);

        let mut session = MartingaleSession::open(signal, &self.config);
        let mut attempts = Vec::new();

        let state = loop {
            info!(
                pair = %session.pair,
                action = %session.action,
                level = session.level,
                stake = session.stake,
                "Placing martingale attempt"
            );
            let outcome = executor
                .execute(
                    session.stake,
                    &session.pair,
                    session.action,
                    self.config.expiry_secs,
                )
                .await;

            let (trade_id, result) = match outcome {
                Some(o) => (Some(o.trade_id), o.result),
                None => (None, TradeResult::PlacementFailed),
            };
            attempts.push(Attempt {
                level: session.level,
                stake: session.stake,
                trade_id,
                result,
            });

            match session.advance(result) {
                LadderState::Active(level) => {
                    info!(pair = %session.pair, next_level = level, next_stake = session.stake, "Loss, escalating stake");
                }
                terminal => break terminal,
            }
        };

        match state {
            LadderState::Won => info!(pair = %session.pair, level = session.level, "WIN, resetting to base stake"),
            LadderState::Lost => warn!(pair = %session.pair, levels = session.level, "LOSS, ladder exhausted, resetting"),
            LadderState::Aborted => warn!(pair = %session.pair, level = session.level, "Ladder aborted after placement failure"),
            LadderState::Active(_) => {}
        }

        LadderReport {
            pair: session.pair,
            action: session.action,
            state,
            attempts,
        }
    }

    fn log_rationale(&self, signal: &Signal) {
        let table = signal
            .tail(RATIONALE_ROWS)
            .iter()
            .map(|row| row.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        info!(pair = %signal.pair, action = %signal.action, "Data leading to trade decision:\n{table}");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::TradeOutcome;

    /// Executor that replays scripted results and records the stakes it saw.
    /// `None` in the script simulates a placement failure.
    struct ScriptedExecutor {
        script: Mutex<VecDeque<Option<TradeResult>>>,
        stakes: Mutex<Vec<f64>>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<Option<TradeResult>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                stakes: Mutex::new(Vec::new()),
            }
        }

        fn stakes(&self) -> Vec<f64> {
            self.stakes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            stake: f64,
            _pair: &str,
            _action: TradeAction,
            _expiry_secs: u64,
        ) -> Option<TradeOutcome> {
            let mut stakes = self.stakes.lock().unwrap();
            stakes.push(stake);
            let next = self.script.lock().unwrap().pop_front().flatten()?;
            Some(TradeOutcome {
                trade_id: format!("trade-{}", stakes.len()),
                result: next,
            })
        }
    }

    fn signal() -> Signal {
        Signal {
            pair: "EURUSD".into(),
            action: TradeAction::Call,
            supporting: Vec::new(),
        }
    }

    fn controller(level_cap: u32) -> MartingaleController {
        MartingaleController::new(MartingaleConfig {
            base_stake: 1.0,
            level_cap,
            expiry_secs: 60,
        })
    }

    #[tokio::test]
    async fn win_on_third_level() {
        use TradeResult::*;
        let executor = ScriptedExecutor::new(vec![Some(Loss), Some(Loss), Some(Win)]);

        let report = controller(3).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Won);
        assert_eq!(executor.stakes(), vec![1.0, 2.0, 4.0]);
        assert_eq!(report.stakes(), vec![1.0, 2.0, 4.0]);
        assert_eq!(report.attempts[2].trade_id.as_deref(), Some("trade-3"));
    }

    #[tokio::test]
    async fn exhausted_ladder_stops_at_cap() {
        use TradeResult::*;
        let executor = ScriptedExecutor::new(vec![Some(Loss), Some(Loss), Some(Loss), Some(Win)]);

        let report = controller(3).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Lost);
        assert_eq!(executor.stakes(), vec![1.0, 2.0, 4.0], "no 4th attempt");
        assert_eq!(report.total_staked(), 7.0);
    }

    #[tokio::test]
    async fn placement_failure_aborts_immediately() {
        let executor = ScriptedExecutor::new(vec![None, Some(TradeResult::Win)]);

        let report = controller(3).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Aborted);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].result, TradeResult::PlacementFailed);
        assert!(report.attempts[0].trade_id.is_none());
        assert_eq!(report.total_staked(), 0.0);
    }

    #[tokio::test]
    async fn placement_failure_mid_ladder_keeps_previous_attempts() {
        use TradeResult::*;
        let executor = ScriptedExecutor::new(vec![Some(Loss), None]);

        let report = controller(3).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Aborted);
        assert_eq!(report.stakes(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn first_win_stops_ladder() {
        let executor = ScriptedExecutor::new(vec![Some(TradeResult::Win)]);

        let report = controller(5).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Won);
        assert_eq!(executor.stakes(), vec![1.0]);
    }

    #[tokio::test]
    async fn cap_of_one_never_escalates() {
        let executor = ScriptedExecutor::new(vec![Some(TradeResult::Loss)]);

        let report = controller(1).run(&executor, &signal()).await;

        assert_eq!(report.state, LadderState::Lost);
        assert_eq!(executor.stakes(), vec![1.0]);
    }

    #[test]
    fn stake_for_level_doubles() {
        let cfg = MartingaleConfig {
            base_stake: 2.5,
            ..MartingaleConfig::default()
        };
        assert_eq!(cfg.stake_for_level(1), 2.5);
        assert_eq!(cfg.stake_for_level(2), 5.0);
        assert_eq!(cfg.stake_for_level(4), 20.0);
    }
}
