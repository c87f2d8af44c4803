//! Shell job files run through the scheduler
//!
//! A job file lists commands with optional per-job priority, retry and timeout
//! settings. Each command runs under `sh -c`; a non-zero exit is a failure.

use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TaskError;
use crate::scheduler::{Scheduler, TaskOptions};

/// Parsed job file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<JobSpec>,
}

/// One shell job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(default, rename = "max-retries", skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, rename = "retry-delay-ms", skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    #[serde(default, rename = "timeout-ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "JobFile::load: called");
        let content = std::fs::read_to_string(path).context(format!("Failed to read job file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(content).context("Failed to parse job file")?;
        if let Some(job) = file.jobs.iter().find(|j| j.command.trim().is_empty()) {
            return Err(eyre!("Job '{}' has an empty command", job.name));
        }
        Ok(file)
    }
}

impl JobSpec {
    /// Options for this job; unset fields use the scheduler defaults
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay_ms.map(Duration::from_millis),
            retry_if: None,
            timeout: self.timeout_ms.map(Duration::from_millis),
            priority: self.priority,
        }
    }
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub success: bool,
    /// Failed attempts
    pub attempts: u32,
    pub executions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one shell command, failing on a non-zero exit
pub async fn run_shell(command: &str) -> Result<String> {
    debug!(%command, "run_shell: called");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .context(format!("Failed to spawn: {}", command))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(eyre!(
            "exit status {}: {}",
            output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        ))
    }
}

/// Submit every job and wait for all of them, reporting in file order
pub async fn run_jobs(scheduler: &Scheduler, file: &JobFile) -> Vec<JobReport> {
    info!(jobs = file.jobs.len(), "Running job file");

    let handles: Vec<_> = file
        .jobs
        .iter()
        .map(|job| {
            let command = job.command.clone();
            let handle = scheduler.submit(
                move || {
                    let command = command.clone();
                    async move { run_shell(&command).await }
                },
                job.options(),
            );
            (job.name.clone(), handle)
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (name, mut handle) in handles {
        let outcome: std::result::Result<String, TaskError> = (&mut handle).await;
        let (success, stdout, error) = match outcome {
            Ok(stdout) => (true, Some(stdout), None),
            Err(e) => (false, None, Some(e.to_string())),
        };
        reports.push(JobReport {
            name,
            success,
            attempts: handle.attempts(),
            executions: handle.executions(),
            stdout,
            error,
        });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;

    #[test]
    fn test_parse_job_file() {
        let file = JobFile::parse(
            r#"
jobs:
  - name: build
    command: echo build
    priority: 5
  - name: flaky
    command: exit 1
    max-retries: 2
    retry-delay-ms: 0
    timeout-ms: 100
"#,
        )
        .unwrap();

        assert_eq!(file.jobs.len(), 2);
        assert_eq!(file.jobs[0].priority, Some(5));
        let options = file.jobs[1].options();
        assert_eq!(options.max_retries, Some(2));
        assert_eq!(options.retry_delay, Some(Duration::ZERO));
        assert_eq!(options.timeout, Some(Duration::from_millis(100)));
        assert_eq!(options.priority, None);
    }

    #[test]
    fn test_parse_rejects_empty_command() {
        let err = JobFile::parse("jobs:\n  - name: blank\n    command: '  '\n").unwrap_err();
        assert!(err.to_string().contains("blank"));
    }

    #[tokio::test]
    async fn test_run_shell_captures_stdout_and_failures() {
        assert_eq!(run_shell("echo hello").await.unwrap(), "hello");

        let err = run_shell("echo oops >&2; exit 3").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit status 3"));
        assert!(msg.contains("oops"));
    }

    #[tokio::test]
    async fn test_run_jobs_reports_in_file_order() {
        let scheduler = Scheduler::spawn(SchedulerConfig {
            concurrency: 2,
            retry_delay_ms: 0,
            ..Default::default()
        })
        .unwrap();
        let file = JobFile::parse(
            r#"
jobs:
  - name: low
    command: echo low
    priority: -1
  - name: broken
    command: exit 1
    max-retries: 1
  - name: high
    command: echo high
    priority: 9
"#,
        )
        .unwrap();

        let reports = run_jobs(&scheduler, &file).await;
        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["low", "broken", "high"]);

        assert!(reports[0].success);
        assert_eq!(reports[0].stdout.as_deref(), Some("low"));
        assert!(!reports[1].success);
        assert_eq!(reports[1].attempts, 2);
        assert_eq!(reports[1].executions, 2);
        assert_eq!(reports[2].stdout.as_deref(), Some("high"));
    }
}
