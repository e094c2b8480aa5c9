/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use timpani_rt::clock::RealtimeClock;
use timpani_rt::config::TaskSetConfig;
use timpani_rt::orchestrator::Orchestrator;
use timpani_rt::runtime::{RunOptions, ShutdownSignal, TracingSink};
use timpani_rt::sched::feasibility::{hyperperiod_us, utilization_by_cpu_set};
use timpani_rt::sched::{build_plan, OsSchedApplier, TaskPlan};
use timpani_rt::task::SchedPolicy;

// ── CLI argument definition ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// SCHED_FIFO
    Fifo,
    /// SCHED_RR
    Rr,
}

impl From<PolicyArg> for SchedPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Fifo => SchedPolicy::Fifo,
            PolicyArg::Rr => SchedPolicy::RoundRobin,
        }
    }
}

/// Timpani-RT periodic task executor.
///
/// Example:
///   sudo timpani-rt -c tasks.yaml
///   timpani-rt --check -p rr
#[derive(Debug, Parser)]
#[command(
    name = "timpani-rt",
    about = "Timpani-RT – periodic rate-monotonic task executor",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML task-set file (built-in three-task set if omitted).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the scheduling policy of the whole task set.
    #[arg(short = 'p', long = "policy", value_enum)]
    policy: Option<PolicyArg>,

    /// Stop every task after this many periods (runs forever if omitted).
    #[arg(short = 'n', long = "iterations")]
    iterations: Option<u64>,

    /// Validate the task set, log the plan and feasibility, then exit.
    #[arg(long = "check", default_value_t = false)]
    check: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Timpani-RT starting up...");

    let cli = Cli::parse();

    info!(
        config     = ?cli.config,
        policy     = ?cli.policy,
        iterations = ?cli.iterations,
        check      = cli.check,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load task set ─────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => TaskSetConfig::load_from_file(path)?,
        None => {
            warn!("No task-set file provided, using the built-in task set");
            TaskSetConfig::builtin()
        }
    };
    if let Some(policy) = cli.policy {
        config = config.with_policy(policy.into());
    }

    let plans = build_plan(&config).context("Invalid task set")?;
    log_feasibility(&plans);

    if cli.check {
        info!("Task set is valid, exiting (--check)");
        return Ok(());
    }

    // ── Launch ────────────────────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(
        Arc::new(RealtimeClock),
        Arc::new(OsSchedApplier),
        Arc::new(TracingSink),
    )
    .with_options(RunOptions {
        max_iterations: cli.iterations,
    });

    let shutdown = ShutdownSignal::new();
    let running = orchestrator
        .launch(plans, shutdown.clone())
        .context("Failed to start task set")?;

    let mut join = tokio::task::spawn_blocking(move || running.join());

    let summaries = tokio::select! {
        joined = &mut join => joined??,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping every task at its next release");
            shutdown.trigger();
            join.await??
        }
    };

    for s in summaries {
        info!(
            task        = s.task_id,
            iterations  = s.iterations,
            met         = s.met,
            missed      = s.missed,
            worst_ns    = s.worst_lateness_ns as i64,
            miss_streak = s.longest_miss_streak,
            "Task summary"
        );
    }
    Ok(())
}

/// Log hyperperiod and Liu & Layland utilisation for the planned set.
fn log_feasibility(plans: &[TaskPlan]) {
    match hyperperiod_us(plans) {
        Some(h) => info!(hyperperiod_us = h, "Task-set hyperperiod"),
        None => warn!("Hyperperiod overflows u64"),
    }

    for report in utilization_by_cpu_set(plans) {
        if report.within_bound() {
            info!(
                cpus        = %report.affinity,
                utilization = report.total,
                bound       = report.bound,
                tasks       = report.task_count,
                "CPU set is RM-schedulable (Liu & Layland)"
            );
        } else {
            warn!(
                cpus        = %report.affinity,
                utilization = report.total,
                bound       = report.bound,
                tasks       = report.task_count,
                "task set may not be RM-schedulable (utilization exceeds Liu & Layland bound)"
            );
        }
    }
}
