//! Task-set configuration loading.
//!
//! The task set is static: it is read once at startup, either from a YAML
//! file or from the built-in default, and never changes afterwards.
//!
//! The expected YAML structure is:
//! ```yaml
//! policy: fifo              # fifo | round_robin
//! cpus: [1]                 # default CPU set for every task
//! priorities:
//!   mode: rate_monotonic    # rate_monotonic | manual
//!   highest: 30
//!   step: 10
//! tasks:
//!   - id: 1
//!     period_us: 100000
//!     n1: 3000
//!     n2: 3000
//!     max_dmiss: 3          # optional
//!     wcet_us: 20000        # optional, feasibility hint only
//!     priority: 30          # optional override, required in manual mode
//!     cpus: [1]             # optional override
//! ```
//!
//! Loading only checks the file's *shape*; semantic validation (duplicate
//! ids, priority ordering, ...) happens in [`crate::sched::build_plan`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::sched::{PriorityAssignment, DEFAULT_HIGHEST_PRIORITY, DEFAULT_PRIORITY_STEP};
use crate::task::{SchedPolicy, TaskId, WorkloadShape};

/// CPU every task is pinned to unless the configuration says otherwise.
pub const DEFAULT_CPU: u32 = 1;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSetFile {
    #[serde(default)]
    policy: SchedPolicy,
    #[serde(default = "default_cpus")]
    cpus: Vec<u32>,
    #[serde(default)]
    priorities: PrioritiesEntry,
    tasks: Vec<TaskFileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum PrioritiesEntry {
    RateMonotonic {
        #[serde(default = "default_highest")]
        highest: i32,
        #[serde(default = "default_step")]
        step: i32,
    },
    Manual,
}

impl Default for PrioritiesEntry {
    fn default() -> Self {
        PrioritiesEntry::RateMonotonic {
            highest: DEFAULT_HIGHEST_PRIORITY,
            step: DEFAULT_PRIORITY_STEP,
        }
    }
}

/// Per-task fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskFileEntry {
    id: TaskId,
    period_us: u64,
    #[serde(default)]
    n1: u32,
    #[serde(default)]
    n2: u32,
    #[serde(default)]
    max_dmiss: u32,
    priority: Option<i32>,
    cpus: Option<Vec<u32>>,
    wcet_us: Option<u64>,
}

fn default_cpus() -> Vec<u32> {
    vec![DEFAULT_CPU]
}

fn default_highest() -> i32 {
    DEFAULT_HIGHEST_PRIORITY
}

fn default_step() -> i32 {
    DEFAULT_PRIORITY_STEP
}

// ── Public data structures ────────────────────────────────────────────────────

/// One task as configured (before validation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub task_id: TaskId,
    pub period_us: u64,
    pub workload: WorkloadShape,
    pub max_dmiss: u32,
    /// Explicit priority; overrides rate-monotonic derivation.
    pub priority: Option<i32>,
    /// CPU set override; `None` uses [`TaskSetConfig::cpus`].
    pub cpus: Option<Vec<u32>>,
    pub wcet_us: Option<u64>,
}

/// The whole static task set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSetConfig {
    /// Policy shared by every task of the set.
    pub policy: SchedPolicy,
    /// Default CPU set.
    pub cpus: Vec<u32>,
    pub priorities: PriorityAssignment,
    pub tasks: Vec<TaskEntry>,
}

impl TaskSetConfig {
    /// Built-in task set used when no file is given: three tasks at
    /// 100 / 200 / 300 ms, `SCHED_FIFO`, rate-monotonic priorities
    /// 30 / 20 / 10, all pinned to CPU [`DEFAULT_CPU`].
    pub fn builtin() -> Self {
        let task = |task_id, period_us, n1, n2| TaskEntry {
            task_id,
            period_us,
            workload: WorkloadShape::new(n1, n2),
            max_dmiss: 0,
            priority: None,
            cpus: None,
            wcet_us: None,
        };
        Self {
            policy: SchedPolicy::Fifo,
            cpus: default_cpus(),
            priorities: PriorityAssignment::default(),
            tasks: vec![
                task(1, 100_000, 3000, 3000),
                task(2, 200_000, 4000, 6000),
                task(3, 300_000, 4000, 8000),
            ],
        }
    }

    /// Parse a task set from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: TaskSetFile =
            serde_yaml::from_str(content).context("Failed to parse task-set YAML")?;
        Ok(Self::from_file(file))
    }

    /// Parse the task set at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading task set from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: TaskSetFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = Self::from_file(file);
        info!(
            policy = %config.policy,
            tasks  = config.tasks.len(),
            "Task set loaded"
        );
        Ok(config)
    }

    /// Replace the policy of the whole set.
    pub fn with_policy(self, policy: SchedPolicy) -> Self {
        Self { policy, ..self }
    }

    fn from_file(file: TaskSetFile) -> Self {
        let priorities = match file.priorities {
            PrioritiesEntry::RateMonotonic { highest, step } => {
                PriorityAssignment::RateMonotonic { highest, step }
            }
            PrioritiesEntry::Manual => PriorityAssignment::Manual,
        };

        let tasks = file
            .tasks
            .into_iter()
            .map(|t| {
                debug!(
                    "  Task: {} | period: {}µs | workload: {}x{}",
                    t.id, t.period_us, t.n1, t.n2
                );
                TaskEntry {
                    task_id: t.id,
                    period_us: t.period_us,
                    workload: WorkloadShape::new(t.n1, t.n2),
                    max_dmiss: t.max_dmiss,
                    priority: t.priority,
                    cpus: t.cpus,
                    wcet_us: t.wcet_us,
                }
            })
            .collect();

        Self {
            policy: file.policy,
            cpus: file.cpus,
            priorities,
            tasks,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::build_plan;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── builtin ───────────────────────────────────────────────────────────────

    #[test]
    fn builtin_set_has_three_tasks_on_cpu_1() {
        let cfg = TaskSetConfig::builtin();
        assert_eq!(cfg.policy, SchedPolicy::Fifo);
        assert_eq!(cfg.cpus, vec![1]);
        let periods: Vec<u64> = cfg.tasks.iter().map(|t| t.period_us).collect();
        assert_eq!(periods, vec![100_000, 200_000, 300_000]);
        assert_eq!(cfg.tasks[2].workload, WorkloadShape::new(4000, 8000));
    }

    #[test]
    fn builtin_set_plans_to_30_20_10() {
        let plans = build_plan(&TaskSetConfig::builtin()).unwrap();
        let prios: Vec<i32> = plans.iter().map(|p| p.sched.priority).collect();
        assert_eq!(prios, vec![30, 20, 10]);
    }

    #[test]
    fn with_policy_switches_the_whole_set() {
        let cfg = TaskSetConfig::builtin().with_policy(SchedPolicy::RoundRobin);
        let plans = build_plan(&cfg).unwrap();
        assert!(plans
            .iter()
            .all(|p| p.sched.policy == SchedPolicy::RoundRobin));
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
policy: round_robin
cpus: [2]
priorities:
  mode: rate_monotonic
  highest: 50
  step: 5
tasks:
  - id: 1
    period_us: 100000
    n1: 3000
    n2: 3000
    max_dmiss: 3
    wcet_us: 20000
  - id: 2
    period_us: 200000
    n1: 4000
    n2: 6000
    cpus: [2, 3]
"#;
        let f = yaml_tempfile(yaml);
        let cfg = TaskSetConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.policy, SchedPolicy::RoundRobin);
        assert_eq!(cfg.cpus, vec![2]);
        assert_eq!(
            cfg.priorities,
            PriorityAssignment::RateMonotonic {
                highest: 50,
                step: 5
            }
        );
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[0].max_dmiss, 3);
        assert_eq!(cfg.tasks[0].wcet_us, Some(20_000));
        assert_eq!(cfg.tasks[1].cpus, Some(vec![2, 3]));

        let plans = build_plan(&cfg).unwrap();
        assert_eq!(plans[0].sched.priority, 50);
        assert_eq!(plans[1].sched.priority, 45);
    }

    #[test]
    fn optional_fields_use_defaults_when_absent() {
        let yaml = "tasks:\n  - id: 9\n    period_us: 5000\n";
        let cfg = TaskSetConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(cfg.policy, SchedPolicy::Fifo);
        assert_eq!(cfg.cpus, vec![DEFAULT_CPU]);
        assert_eq!(cfg.priorities, PriorityAssignment::default());
        let t = &cfg.tasks[0];
        assert_eq!(t.workload, WorkloadShape::new(0, 0));
        assert_eq!(t.max_dmiss, 0);
        assert_eq!(t.priority, None);
        assert_eq!(t.cpus, None);
    }

    #[test]
    fn manual_mode_parses_and_uses_task_priorities() {
        let yaml = r#"
priorities:
  mode: manual
tasks:
  - { id: 1, period_us: 100, priority: 40 }
  - { id: 2, period_us: 200, priority: 35 }
"#;
        let cfg = TaskSetConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.priorities, PriorityAssignment::Manual);
        let plans = build_plan(&cfg).unwrap();
        assert_eq!(plans[0].sched.priority, 40);
        assert_eq!(plans[1].sched.priority, 35);
    }

    #[test]
    fn rate_monotonic_mode_fills_default_numbers() {
        let yaml = "priorities:\n  mode: rate_monotonic\ntasks: []\n";
        let cfg = TaskSetConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.priorities, PriorityAssignment::default());
    }

    #[test]
    fn unknown_task_field_is_an_error() {
        let yaml = "tasks:\n  - { id: 1, period_us: 100, perod: 5 }\n";
        assert!(TaskSetConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = TaskSetConfig::load_from_file(Path::new("/nonexistent/path/tasks.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(TaskSetConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn shipped_sample_file_plans_like_the_builtin_set() {
        let cfg = TaskSetConfig::from_yaml_str(include_str!("../../config/task_set.yaml")).unwrap();
        let plans = build_plan(&cfg).unwrap();
        let priorities: Vec<i32> = plans.iter().map(|p| p.sched.priority).collect();
        assert_eq!(priorities, vec![30, 20, 10]);
        assert!(plans.iter().all(|p| p.descriptor.max_dmiss == 3));
    }
}
