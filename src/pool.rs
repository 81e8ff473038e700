use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
};

use crossbeam_channel::bounded;
use miette::Result;
use tracing::error;

/// Run every job through `f` using at most `workers` concurrent invocations
/// and return the number of jobs that failed.
///
/// A dedicated producer feeds the queue and closes it once the job list is
/// drained. Failures are logged as they occur and counted; the batch never
/// short-circuits on a failed job. No ordering is guaranteed on job start or
/// completion.
pub fn run_all<J, F>(jobs: Vec<J>, workers: NonZeroUsize, f: F) -> usize
where
    J: Send,
    F: Fn(J) -> Result<()> + Sync,
{
    if jobs.is_empty() {
        return 0;
    }

    let failures = AtomicUsize::new(0);
    let (send, receive) = bounded(workers.get());

    std::thread::scope(|scope| {
        scope.spawn(move || {
            for job in jobs {
                if send.send(job).is_err() {
                    break;
                }
            }
            // Dropping the sender closes the queue
        });

        for _ in 0..workers.get() {
            let receive = receive.clone();
            let failures = &failures;
            let f = &f;
            scope.spawn(move || {
                for job in receive {
                    if let Err(report) = f(job) {
                        error!("{report:?}");
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
        drop(receive);
    });

    failures.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    use miette::miette;

    #[test]
    fn counts_failures_and_runs_every_job_once() {
        let invocations = AtomicUsize::new(0);
        let jobs: Vec<usize> = (0..25).collect();

        let failed = run_all(jobs, NonZeroUsize::new(4).unwrap(), |n| {
            invocations.fetch_add(1, Ordering::Relaxed);
            if n < 8 {
                Err(miette!("job {n} failed"))
            } else {
                Ok(())
            }
        });

        assert_eq!(failed, 8);
        assert_eq!(invocations.into_inner(), 25);
    }

    #[test]
    fn zero_jobs_return_immediately() {
        let failed = run_all(Vec::<u8>::new(), NonZeroUsize::new(4).unwrap(), |_| Ok(()));
        assert_eq!(failed, 0);
    }

    #[test]
    fn single_worker_drains_the_whole_queue() {
        let invocations = AtomicUsize::new(0);
        let jobs: Vec<usize> = (0..10).collect();

        let failed = run_all(jobs, NonZeroUsize::new(1).unwrap(), |_| {
            invocations.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        assert_eq!(failed, 0);
        assert_eq!(invocations.into_inner(), 10);
    }

    #[test]
    fn more_workers_than_jobs() {
        let failed = run_all(vec![1, 2], NonZeroUsize::new(16).unwrap(), |_| Ok(()));
        assert_eq!(failed, 0);
    }
}
