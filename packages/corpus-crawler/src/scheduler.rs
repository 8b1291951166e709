//! Forever-repeating passes.
//!
//! Each pass runs strictly sequentially with itself and concurrently with
//! every other pass. The first failure of any supervised task ends the crawl.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{CrawlError, Result};

/// Run `pass` forever, starting iterations at least `period` apart.
///
/// An iteration that overruns the period is followed immediately by the
/// next one. Returns only when an iteration fails.
pub async fn repeat<F, Fut>(name: &'static str, period: Duration, mut pass: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut iteration: u64 = 0;

    loop {
        iteration += 1;
        let started = Instant::now();
        tracing::debug!(pass = name, iteration, "Pass starting");

        pass().await?;

        let elapsed = started.elapsed();
        tracing::debug!(
            pass = name,
            iteration,
            elapsed_ms = elapsed.as_millis() as u64,
            "Pass finished"
        );

        if let Some(remaining) = period.checked_sub(elapsed) {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Supervises named long-running tasks: the repeating passes and the store
/// writer.
pub struct PassScheduler {
    period: Duration,
    tasks: JoinSet<(&'static str, Result<()>)>,
}

impl PassScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tasks: JoinSet::new(),
        }
    }

    /// Spawn a task whose failure (or panic) ends the crawl.
    pub fn supervise<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Spawn `pass` as an indefinitely repeating task with the scheduler's
    /// period.
    pub fn repeat<F, Fut>(&mut self, name: &'static str, pass: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let period = self.period;
        self.supervise(name, repeat(name, period, pass));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait on every task. Resolves with the first failure, after aborting
    /// the rest, or with `Ok` once all tasks have finished cleanly.
    pub async fn run(mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(task = name, "Task finished");
                }
                Ok((name, Err(e))) => {
                    tracing::error!(task = name, error = %e, "Task failed, stopping crawl");
                    self.tasks.abort_all();
                    return Err(CrawlError::PassFailed {
                        pass: name,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task panicked, stopping crawl");
                    self.tasks.abort_all();
                    return Err(CrawlError::Task(e.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn failure() -> CrawlError {
        CrawlError::network("test_pass", None, "stop")
    }

    #[tokio::test(start_paused = true)]
    async fn iterations_are_spaced_by_period() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let recorded = starts.clone();

        let result = repeat("spaced", Duration::from_secs(2), move || {
            let recorded = recorded.clone();
            async move {
                let mut starts = recorded.lock().unwrap();
                starts.push(Instant::now());
                if starts.len() == 3 {
                    return Err(failure());
                }
                Ok(())
            }
        })
        .await;

        assert!(result.is_err());
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], Duration::from_secs(2));
        assert_eq!(starts[2] - starts[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_pass_restarts_immediately() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let recorded = starts.clone();

        let result = repeat("slow", Duration::from_secs(2), move || {
            let recorded = recorded.clone();
            async move {
                let count = {
                    let mut starts = recorded.lock().unwrap();
                    starts.push(Instant::now());
                    starts.len()
                };
                if count == 3 {
                    return Err(failure());
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        assert!(result.is_err());
        let starts = starts.lock().unwrap();
        assert_eq!(starts[1] - starts[0], Duration::from_secs(5));
        assert_eq!(starts[2] - starts[1], Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_stops_every_task() {
        let mut scheduler = PassScheduler::new(Duration::from_secs(1));
        let healthy_runs = Arc::new(Mutex::new(0u32));

        let runs = healthy_runs.clone();
        scheduler.repeat("healthy", move || {
            let runs = runs.clone();
            async move {
                *runs.lock().unwrap() += 1;
                Ok(())
            }
        });

        let mut remaining = 3;
        scheduler.repeat("failing", move || {
            remaining -= 1;
            let fail = remaining == 0;
            async move {
                if fail {
                    Err(failure())
                } else {
                    Ok(())
                }
            }
        });
        assert_eq!(scheduler.len(), 2);

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, CrawlError::PassFailed { pass: "failing", .. }));
        assert!(*healthy_runs.lock().unwrap() >= 2);
    }

    #[tokio::test]
    async fn clean_exit_of_all_tasks_is_ok() {
        let mut scheduler = PassScheduler::new(Duration::from_secs(1));
        scheduler.supervise("one_shot", async { Ok(()) });
        assert!(scheduler.run().await.is_ok());
    }
}
