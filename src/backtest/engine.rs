use crate::backtest::draw::DrawHistory;
use crate::backtest::model::{BacktestOutcome, ContestOutcome, ContestRange, SimulationSummary};
use crate::backtest::predictor::{contest_seed, HitCategory, Predictor, Scorer};
use crate::backtest::recipe::Recipe;
use crate::error::{SimError, SimResult};
use anyhow::Context;
use log::debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Replays a recipe across a contest range.
#[derive(Clone)]
pub struct BacktestEngine {
    predictor: Arc<dyn Predictor>,
    scorer: Arc<dyn Scorer>,
}

impl BacktestEngine {
    pub fn new(predictor: Arc<dyn Predictor>, scorer: Arc<dyn Scorer>) -> Self {
        Self { predictor, scorer }
    }

    pub fn run(
        &self,
        recipe: &Recipe,
        range: ContestRange,
        history: &DrawHistory,
        job_seed: u64,
        cancel: &CancellationToken,
    ) -> SimResult<BacktestOutcome> {
        range.validate()?;

        let params = &recipe.parameters;
        let window_size = params.sim_prev_max as usize;
        let count = params.sim_preds as usize;

        let mut contests = Vec::new();
        let (mut quina, mut quadra, mut terno) = (0u32, 0u32, 0u32);

        for contest in range.contests() {
            if cancel.is_cancelled() {
                debug!("backtest cancelled before contest={}", contest);
                return Err(SimError::Cancelled);
            }

            let Some(actual) = history.get(contest) else {
                continue;
            };

            let window = history.window(contest, window_size);
            let seed = contest_seed(job_seed, contest);
            let predictions = self
                .predictor
                .generate_predictions(&window, params, count, seed)
                .with_context(|| format!("predictor failed at contest {contest}"))
                .map_err(|e| SimError::execution(&e))?;
            let card = self
                .scorer
                .score(&predictions, actual)
                .with_context(|| format!("scorer failed at contest {contest}"))
                .map_err(|e| SimError::execution(&e))?;

            let best = card.best();
            let best_hits = best.map_or(0, |(_, h)| h);
            match HitCategory::from_hits(best_hits) {
                Some(HitCategory::Quina) => quina += 1,
                Some(HitCategory::Quadra) => quadra += 1,
                Some(HitCategory::Terno) => terno += 1,
                None => {}
            }

            contests.push(ContestOutcome {
                contest,
                actual: actual.numbers.to_vec(),
                best_hits,
                best_prediction: best.and_then(|(i, _)| predictions.get(i).cloned()),
                predictions,
            });
        }

        let summary = SimulationSummary::finalize(contests.len() as u32, quina, quadra, terno);
        Ok(BacktestOutcome { summary, contests })
    }
}
