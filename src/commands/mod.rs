pub mod app_command;

pub use app_command::AppCommand;

use crate::backtest::draw::Draw;
use crate::backtest::model::{ContestRange, Page, Simulation};
use crate::backtest::recipe::Recipe;
use crate::backtest::service::SimulationService;
use crate::backtest::worker::JobEvent;
use crate::error::SimError;
use crate::ranking::LeaderboardFilter;
use crate::sweep::model::SweepConfig;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum AppEvent {
    Message(String),
    Error(String),
    Job(JobEvent),
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

fn one_line(sim: &Simulation) -> String {
    let avg = sim
        .summary
        .as_ref()
        .map(|s| format!("{:.4}", s.average_hits))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{} {} [{}..={}] {} avg_hits={}",
        sim.id, sim.recipe.name, sim.range.start, sim.range.end, sim.status, avg
    )
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid {}: {}", path.display(), e))
}

/// Handles one command. Long runs are spawned so the caller keeps reading input.
pub async fn dispatch(
    cmd: AppCommand,
    service: &Arc<SimulationService>,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let report = |res: Result<String, SimError>| {
        let _ = match res {
            Ok(msg) => tx.send(AppEvent::Message(msg)),
            Err(e) => tx.send(AppEvent::Error(e.to_string())),
        };
    };

    match cmd {
        AppCommand::Simulate {
            recipe_path,
            start,
            end,
            sync,
        } => {
            let recipe: Recipe = match read_json(&recipe_path).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(AppEvent::Error(e));
                    return;
                }
            };
            let range = ContestRange { start, end };
            if sync {
                let svc = service.clone();
                let txc = tx.clone();
                let _ = tx.send(AppEvent::Message(format!(
                    "running {} over {}..={}",
                    recipe.name, start, end
                )));
                tokio::spawn(async move {
                    let _ = match svc.create_simulation(recipe, range, false).await {
                        Ok(sim) => txc.send(AppEvent::Message(pretty(&sim))),
                        Err(e) => txc.send(AppEvent::Error(e.to_string())),
                    };
                });
            } else {
                report(
                    service
                        .create_simulation(recipe, range, true)
                        .await
                        .map(|sim| format!("queued {}", one_line(&sim))),
                );
            }
        }
        AppCommand::Run { id } => {
            let svc = service.clone();
            let txc = tx.clone();
            tokio::spawn(async move {
                let _ = match svc.execute_simulation(id).await {
                    Ok(sim) => txc.send(AppEvent::Message(one_line(&sim))),
                    Err(e) => txc.send(AppEvent::Error(e.to_string())),
                };
            });
        }
        AppCommand::Cancel { id } => report(
            service
                .cancel_simulation(id)
                .await
                .map(|sim| format!("cancelled {}", one_line(&sim))),
        ),
        AppCommand::Show { id } => report(service.get_simulation(id).await.map(|s| pretty(&s))),
        AppCommand::Results { id } => report(service.contest_results(id).await.map(|rows| {
            rows.iter()
                .map(|r| format!("contest {} actual {:?} best_hits {}", r.contest, r.actual, r.best_hits))
                .collect::<Vec<_>>()
                .join("\n")
        })),
        AppCommand::Delete { id } => report(
            service
                .delete_simulation(id)
                .await
                .map(|_| format!("deleted #{id}")),
        ),
        AppCommand::List { status, page } => {
            let page = Page {
                page,
                ..Page::default()
            };
            report(service.list_simulations(status, page).await.map(|sims| {
                if sims.is_empty() {
                    format!("no {status} simulations")
                } else {
                    sims.iter().map(one_line).collect::<Vec<_>>().join("\n")
                }
            }))
        }
        AppCommand::Stats => report(service.stats().await.map(|s| {
            format!(
                "total={} pending={} running={} completed={} failed={} cancelled={}",
                s.total, s.pending, s.running, s.completed, s.failed, s.cancelled
            )
        })),
        AppCommand::Sweep {
            config_path,
            start,
            end,
        } => {
            let config: SweepConfig = match read_json(&config_path).await {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(AppEvent::Error(e));
                    return;
                }
            };
            report(
                service
                    .create_sweep(config, ContestRange { start, end })
                    .await
                    .map(|s| {
                        format!(
                            "sweep #{} {} queued {} simulations",
                            s.id, s.name, s.total_combinations
                        )
                    }),
            )
        }
        AppCommand::SweepStatus { id } => report(service.update_sweep_progress(id).await.map(|r| {
            format!(
                "sweep #{} {} {:.1}% pending={} running={} completed={} failed={} cancelled={}",
                id,
                r.status,
                r.progress,
                r.counts.pending,
                r.counts.running,
                r.counts.completed,
                r.counts.failed,
                r.counts.cancelled
            )
        })),
        AppCommand::SweepBest { id, metric } => {
            report(service.find_best(id, metric).await.map(|b| pretty(&b)))
        }
        AppCommand::SweepResults { id, metric } => {
            report(service.sweep_results(id, metric).await.map(|points| pretty(&points)))
        }
        AppCommand::SweepList => report(service.list_sweeps().await.map(|sweeps| {
            sweeps
                .iter()
                .map(|s| format!("sweep #{} {} {} n={}", s.id, s.name, s.status, s.total_combinations))
                .collect::<Vec<_>>()
                .join("\n")
        })),
        AppCommand::Compare { metrics, ids } => {
            report(service.compare(&ids, &metrics).await.map(|c| pretty(&c)))
        }
        AppCommand::Leaderboard {
            metric,
            limit,
            recipe,
        } => {
            let filter = LeaderboardFilter {
                recipe_name: recipe,
                min_contests: None,
                limit: Some(limit),
            };
            report(service.get_leaderboard(metric, &filter).await.map(|rows| {
                rows.iter()
                    .map(|e| {
                        format!(
                            "{:>3}. #{} {} {}={:.4} p{:.1}",
                            e.rank, e.simulation_id, e.recipe_name, metric, e.value, e.percentile
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }))
        }
        AppCommand::DrawsLoad { path } => {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(t) => t,
                Err(e) => {
                    let _ = tx.send(AppEvent::Error(format!(
                        "cannot read {}: {}",
                        path.display(),
                        e
                    )));
                    return;
                }
            };
            match Draw::parse_many(&text) {
                Ok(draws) => report(
                    service
                        .import_draws(&draws)
                        .await
                        .map(|n| format!("imported {n} draws from {}", path.display())),
                ),
                Err(e) => report(Err(e)),
            }
        }
        AppCommand::DrawsCount => {
            report(service.draw_count().await.map(|n| format!("{n} draws stored")))
        }
        AppCommand::Help => {
            let _ = tx.send(AppEvent::Message(app_command::HELP.to_string()));
        }
        AppCommand::Quit => {
            let _ = tx.send(AppEvent::Message("shutting down".to_string()));
        }
        AppCommand::Unknown(msg) => {
            if !msg.is_empty() {
                let _ = tx.send(AppEvent::Error(msg));
            }
        }
    }
}
