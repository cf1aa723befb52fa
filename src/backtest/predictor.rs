use crate::backtest::draw::{Draw, DRAW_SIZE, MAX_NUMBER};
use crate::backtest::model::Prediction;
use crate::backtest::recipe::RecipeParameters;
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces candidate predictions for one contest. Must be deterministic
/// for identical inputs.
pub trait Predictor: Send + Sync {
    fn generate_predictions(
        &self,
        history: &[Draw],
        params: &RecipeParameters,
        count: usize,
        seed: u64,
    ) -> Result<Vec<Prediction>>;
}

/// Counts matched numbers per candidate.
pub trait Scorer: Send + Sync {
    fn score(&self, predictions: &[Prediction], actual: &Draw) -> Result<ScoreCard>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreCard {
    pub hits: Vec<u8>,
}

impl ScoreCard {
    /// Index and hit count of the best candidate; first one wins ties.
    pub fn best(&self) -> Option<(usize, u8)> {
        self.hits
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, h)| match best {
                Some((_, bh)) if bh >= h => best,
                _ => Some((i, h)),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCategory {
    Quina,
    Quadra,
    Terno,
}

impl HitCategory {
    pub fn from_hits(hits: u8) -> Option<Self> {
        match hits {
            5..=u8::MAX => Some(HitCategory::Quina),
            4 => Some(HitCategory::Quadra),
            3 => Some(HitCategory::Terno),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HitScorer;

impl Scorer for HitScorer {
    fn score(&self, predictions: &[Prediction], actual: &Draw) -> Result<ScoreCard> {
        let hits = predictions
            .iter()
            .map(|p| p.numbers.iter().filter(|n| actual.numbers.contains(n)).count() as u8)
            .collect();
        Ok(ScoreCard { hits })
    }
}

/// Weighted sampling over number frequency, recency and gap statistics of
/// the window, perturbed by seeded noise. When `population` and
/// `generations` are set, candidates are refined by mutation against the
/// window before the best `count` are returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedFrequencyPredictor;

const POOL: usize = MAX_NUMBER as usize;

impl WeightedFrequencyPredictor {
    fn weights(history: &[Draw], params: &RecipeParameters) -> [f64; POOL] {
        let mut freq = [0.0f64; POOL];
        let mut recency = [0.0f64; POOL];
        let mut last_seen = [None::<usize>; POOL];
        let len = history.len();

        for (pos, draw) in history.iter().enumerate() {
            let age_weight = (pos + 1) as f64 / len as f64;
            for n in draw.numbers {
                let idx = usize::from(n) - 1;
                freq[idx] += 1.0;
                recency[idx] += age_weight;
                last_seen[idx] = Some(pos);
            }
        }

        let mut weights = [0.0f64; POOL];
        for idx in 0..POOL {
            let (f, r, gap) = if len == 0 {
                (0.0, 0.0, 1.0)
            } else {
                let gap = match last_seen[idx] {
                    Some(pos) => (len - 1 - pos) as f64 / len as f64,
                    None => 1.0,
                };
                (freq[idx] / len as f64, recency[idx] / len as f64, gap)
            };
            weights[idx] = params.alpha * f + params.beta * r + params.gamma * gap;
        }
        weights
    }

    fn sample(base: &[f64; POOL], delta: f64, rng: &mut StdRng) -> Prediction {
        let mut w: Vec<f64> = base
            .iter()
            .map(|b| (b + delta * rng.gen::<f64>()).max(0.0) + 1e-6)
            .collect();
        let mut picked = Vec::with_capacity(DRAW_SIZE);
        for _ in 0..DRAW_SIZE {
            let total: f64 = w.iter().sum();
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = POOL - 1;
            for (idx, weight) in w.iter().enumerate() {
                if *weight <= 0.0 {
                    continue;
                }
                if target < *weight {
                    chosen = idx;
                    break;
                }
                target -= weight;
            }
            if w[chosen] <= 0.0 {
                // float residue landed past the end: take the last open slot
                chosen = w.iter().rposition(|x| *x > 0.0).unwrap_or(chosen);
            }
            picked.push(chosen as u8 + 1);
            w[chosen] = 0.0;
        }
        Prediction::new(picked)
    }

    fn fitness(candidate: &Prediction, history: &[Draw]) -> usize {
        history
            .iter()
            .map(|d| {
                candidate
                    .numbers
                    .iter()
                    .filter(|n| d.numbers.contains(n))
                    .count()
            })
            .sum()
    }

    fn mutate(candidate: &Prediction, rate: f64, rng: &mut StdRng) -> Prediction {
        let mut numbers = candidate.numbers.clone();
        for i in 0..numbers.len() {
            if rng.gen::<f64>() < rate {
                let mut replacement = rng.gen_range(1..=MAX_NUMBER);
                while numbers.contains(&replacement) {
                    replacement = rng.gen_range(1..=MAX_NUMBER);
                }
                numbers[i] = replacement;
            }
        }
        Prediction::new(numbers)
    }
}

impl Predictor for WeightedFrequencyPredictor {
    fn generate_predictions(
        &self,
        history: &[Draw],
        params: &RecipeParameters,
        count: usize,
        seed: u64,
    ) -> Result<Vec<Prediction>> {
        if params.alpha < 0.0 || params.beta < 0.0 || params.gamma < 0.0 || params.delta < 0.0 {
            bail!("negative weights are not supported by the weighted predictor");
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let base = Self::weights(history, params);

        let population = params.population.map_or(count, |p| (p as usize).max(count));
        let mut candidates: Vec<Prediction> = (0..population)
            .map(|_| Self::sample(&base, params.delta, &mut rng))
            .collect();

        let generations = params.generations.unwrap_or(0);
        if generations > 0 && !history.is_empty() {
            let rate = params.mutation_rate.unwrap_or(0.2);
            for _ in 0..generations {
                for c in candidates.iter_mut() {
                    let child = Self::mutate(c, rate, &mut rng);
                    if Self::fitness(&child, history) > Self::fitness(c, history) {
                        *c = child;
                    }
                }
            }
            // stable sort keeps generation order among equal fitness
            candidates.sort_by_key(|c| std::cmp::Reverse(Self::fitness(c, history)));
        }

        candidates.truncate(count);
        Ok(candidates)
    }
}

/// Seed for one contest, mixed from a stable per-job value.
pub fn contest_seed(job_seed: u64, contest: i32) -> u64 {
    let mut z = job_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(contest as u32 as u64);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Draw> {
        (1..=30)
            .map(|c| {
                let b = (c * 7 % 70) as u8 + 1;
                Draw::new(c, [b, b + 2, b + 4, b + 6, b + 8]).unwrap()
            })
            .collect()
    }

    #[test]
    fn predictions_are_deterministic_for_a_seed() {
        let p = WeightedFrequencyPredictor;
        let params = RecipeParameters::default();
        let a = p.generate_predictions(&history(), &params, 8, 42).unwrap();
        let b = p.generate_predictions(&history(), &params, 8, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        for pred in &a {
            assert_eq!(pred.numbers.len(), DRAW_SIZE);
            assert!(pred.numbers.windows(2).all(|w| w[0] < w[1]));
            assert!(pred.numbers.iter().all(|n| (1..=MAX_NUMBER).contains(n)));
        }
    }

    #[test]
    fn empty_history_still_predicts() {
        let p = WeightedFrequencyPredictor;
        let out = p
            .generate_predictions(&[], &RecipeParameters::default(), 3, 7)
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn evolutionary_knobs_return_requested_count() {
        let p = WeightedFrequencyPredictor;
        let params = RecipeParameters {
            population: Some(20),
            generations: Some(5),
            mutation_rate: Some(0.4),
            ..RecipeParameters::default()
        };
        let out = p.generate_predictions(&history(), &params, 4, 9).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn negative_weights_fail() {
        let p = WeightedFrequencyPredictor;
        let params = RecipeParameters {
            alpha: -1.0,
            ..RecipeParameters::default()
        };
        assert!(p.generate_predictions(&history(), &params, 1, 1).is_err());
    }

    #[test]
    fn scorer_counts_intersections() {
        let actual = Draw::new(1, [1, 2, 3, 4, 5]).unwrap();
        let preds = vec![
            Prediction::new(vec![1, 2, 3, 70, 71]),
            Prediction::new(vec![1, 2, 3, 4, 72]),
            Prediction::new(vec![60, 61, 62, 63, 64]),
        ];
        let card = HitScorer.score(&preds, &actual).unwrap();
        assert_eq!(card.hits, vec![3, 4, 0]);
        assert_eq!(card.best(), Some((1, 4)));
        assert_eq!(HitCategory::from_hits(4), Some(HitCategory::Quadra));
        assert_eq!(HitCategory::from_hits(2), None);
    }

    #[test]
    fn contest_seed_varies_by_contest_and_job() {
        assert_eq!(contest_seed(1, 10), contest_seed(1, 10));
        assert_ne!(contest_seed(1, 10), contest_seed(1, 11));
        assert_ne!(contest_seed(1, 10), contest_seed(2, 10));
    }
}
