use crate::backtest::model::JobStatus;
use crate::ranking::Metric;
use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

pub const HELP: &str = "commands: \
simulate <recipe.json> <start> <end> [sync] | run <id> | cancel <id> | show <id> | \
results <id> | delete <id> | list <status> [page] | stats | \
sweep <config.json> <start> <end> | sweep status <id> | sweep best <id> <metric> | \
sweep results <id> <metric> | sweep list | \
compare <metric[,metric]> <id>... | leaderboard <metric> [limit] [recipe] | \
draws load <file> | draws count | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Simulate {
        recipe_path: PathBuf,
        start: i32,
        end: i32,
        sync: bool,
    },
    Run {
        id: i32,
    },
    Cancel {
        id: i32,
    },
    Show {
        id: i32,
    },
    Results {
        id: i32,
    },
    Delete {
        id: i32,
    },
    List {
        status: JobStatus,
        page: u64,
    },
    Stats,
    Sweep {
        config_path: PathBuf,
        start: i32,
        end: i32,
    },
    SweepStatus {
        id: i32,
    },
    SweepBest {
        id: i32,
        metric: Metric,
    },
    SweepResults {
        id: i32,
        metric: Metric,
    },
    SweepList,
    Compare {
        metrics: Vec<Metric>,
        ids: Vec<i32>,
    },
    Leaderboard {
        metric: Metric,
        limit: usize,
        recipe: Option<String>,
    },
    DrawsLoad {
        path: PathBuf,
    },
    DrawsCount,
    Help,
    Quit,
    /// Carries the message to show instead.
    Unknown(String),
}

fn id_arg(parts: &[&str], idx: usize, usage: &str) -> Result<i32, AppCommand> {
    parts
        .get(idx)
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| AppCommand::Unknown(format!("usage: {usage}")))
}

fn metric_arg(parts: &[&str], idx: usize, usage: &str) -> Result<Metric, AppCommand> {
    match parts.get(idx) {
        Some(s) => s.parse().map_err(|e| AppCommand::Unknown(format!("{e}"))),
        None => Err(AppCommand::Unknown(format!("usage: {usage}"))),
    }
}

fn range_args(parts: &[&str], idx: usize, usage: &str) -> Result<(i32, i32), AppCommand> {
    Ok((id_arg(parts, idx, usage)?, id_arg(parts, idx + 1, usage)?))
}

fn parse_sweep(parts: &[&str]) -> Result<AppCommand, AppCommand> {
    match parts.get(1).copied() {
        Some("status") => Ok(AppCommand::SweepStatus {
            id: id_arg(parts, 2, "sweep status <id>")?,
        }),
        Some("best") => Ok(AppCommand::SweepBest {
            id: id_arg(parts, 2, "sweep best <id> <metric>")?,
            metric: metric_arg(parts, 3, "sweep best <id> <metric>")?,
        }),
        Some("results") => Ok(AppCommand::SweepResults {
            id: id_arg(parts, 2, "sweep results <id> <metric>")?,
            metric: metric_arg(parts, 3, "sweep results <id> <metric>")?,
        }),
        Some("list") => Ok(AppCommand::SweepList),
        Some(path) => {
            let (start, end) = range_args(parts, 2, "sweep <config.json> <start> <end>")?;
            Ok(AppCommand::Sweep {
                config_path: PathBuf::from(path),
                start,
                end,
            })
        }
        None => Err(AppCommand::Unknown(
            "usage: sweep <config.json> <start> <end> | sweep status|best|results|list ..."
                .to_string(),
        )),
    }
}

fn parse(parts: &[&str]) -> Result<AppCommand, AppCommand> {
    match parts[0] {
        "simulate" | "sim" => {
            let usage = "simulate <recipe.json> <start> <end> [sync]";
            let path = parts
                .get(1)
                .ok_or_else(|| AppCommand::Unknown(format!("usage: {usage}")))?;
            let (start, end) = range_args(parts, 2, usage)?;
            let sync = matches!(
                parts.get(4).map(|s| s.to_ascii_lowercase()).as_deref(),
                Some("sync" | "wait" | "true")
            );
            Ok(AppCommand::Simulate {
                recipe_path: PathBuf::from(path),
                start,
                end,
                sync,
            })
        }
        "run" => Ok(AppCommand::Run {
            id: id_arg(parts, 1, "run <id>")?,
        }),
        "cancel" => Ok(AppCommand::Cancel {
            id: id_arg(parts, 1, "cancel <id>")?,
        }),
        "show" => Ok(AppCommand::Show {
            id: id_arg(parts, 1, "show <id>")?,
        }),
        "results" => Ok(AppCommand::Results {
            id: id_arg(parts, 1, "results <id>")?,
        }),
        "delete" | "rm" => Ok(AppCommand::Delete {
            id: id_arg(parts, 1, "delete <id>")?,
        }),
        "list" | "ls" => {
            let status = match parts.get(1) {
                Some(s) => s
                    .parse::<JobStatus>()
                    .map_err(|e| AppCommand::Unknown(e.to_string()))?,
                None => JobStatus::Pending,
            };
            let page = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
            Ok(AppCommand::List { status, page })
        }
        "stats" => Ok(AppCommand::Stats),
        "sweep" => parse_sweep(parts),
        "compare" => {
            let usage = "compare <metric[,metric]> <id> <id>...";
            let metrics = match parts.get(1) {
                Some(s) => Metric::parse_list(s).map_err(|e| AppCommand::Unknown(e.to_string()))?,
                None => return Err(AppCommand::Unknown(format!("usage: {usage}"))),
            };
            let ids = parts[2..]
                .iter()
                .map(|s| s.parse::<i32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| AppCommand::Unknown(format!("usage: {usage}")))?;
            if ids.is_empty() {
                return Err(AppCommand::Unknown(format!("usage: {usage}")));
            }
            Ok(AppCommand::Compare { metrics, ids })
        }
        "leaderboard" | "top" => {
            let metric = metric_arg(parts, 1, "leaderboard <metric> [limit] [recipe]")?;
            let limit = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            let recipe = parts.get(3).map(|s| s.to_string());
            Ok(AppCommand::Leaderboard {
                metric,
                limit,
                recipe,
            })
        }
        "draws" => match (parts.get(1).copied(), parts.get(2)) {
            (Some("load"), Some(path)) => Ok(AppCommand::DrawsLoad {
                path: PathBuf::from(path),
            }),
            (Some("count"), _) => Ok(AppCommand::DrawsCount),
            _ => Err(AppCommand::Unknown(
                "usage: draws load <file> | draws count".to_string(),
            )),
        },
        "help" | "h" => Ok(AppCommand::Help),
        "quit" | "q" | "exit" => Ok(AppCommand::Quit),
        other => Err(AppCommand::Unknown(format!("unknown command: {other}"))),
    }
}

/// Never fails: bad input parses to `Unknown` carrying the usage text.
impl FromStr for AppCommand {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown(String::new()));
        }
        Ok(parse(&parts).unwrap_or_else(|usage| usage))
    }
}
