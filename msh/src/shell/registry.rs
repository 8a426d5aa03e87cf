use msh_types::{JobSignal, ShellError, ShellResult};
use nix::unistd::Pid;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::process::wait::reap;
use crate::process::{ExitInfo, Job, JobStatus};

/// The table of background and stopped jobs.
///
/// Ids start at 1 and are never reused within a session. A finished job is
/// evicted by the reconciliation pass that first sees it finished; its id is
/// then remembered as retired.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: BTreeMap<usize, Job>,
    next_id: usize,
    retired: BTreeSet<usize>,
    stragglers: Vec<Pid>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry {
            jobs: BTreeMap::new(),
            next_id: 1,
            retired: BTreeSet::new(),
            stragglers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Takes ownership of `job` and hands out the next id.
    pub fn register(&mut self, mut job: Job) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        job.id = id;
        debug!("registry: [{}] {} {} ({})", id, job.pgid, job.command, job.status);
        self.jobs.insert(id, job);
        id
    }

    /// Registers a foreground pipeline that was stopped while the shell waited on it.
    pub fn register_stopped(&mut self, mut job: Job) -> usize {
        job.apply(JobStatus::Stopped, None);
        self.register(job)
    }

    /// Parses `%N` or `N`.
    pub fn parse_id(spec: &str) -> ShellResult<usize> {
        let digits = spec.strip_prefix('%').unwrap_or(spec);
        digits
            .parse::<usize>()
            .map_err(|_| ShellError::JobNotFound(spec.to_string()))
    }

    fn check(&self, id: usize) -> ShellResult<()> {
        match self.jobs.get(&id) {
            Some(job) if job.is_finished() => Err(ShellError::JobAlreadyFinished(id)),
            Some(_) => Ok(()),
            None if self.retired.contains(&id) => Err(ShellError::JobAlreadyFinished(id)),
            None => Err(ShellError::JobNotFound(id.to_string())),
        }
    }

    /// A live job, or why there is none.
    pub fn lookup(&self, id: usize) -> ShellResult<&Job> {
        self.check(id)?;
        self.jobs
            .get(&id)
            .ok_or_else(|| ShellError::JobNotFound(id.to_string()))
    }

    pub(crate) fn lookup_mut(&mut self, id: usize) -> ShellResult<&mut Job> {
        self.check(id)?;
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| ShellError::JobNotFound(id.to_string()))
    }

    /// The one way a job's status changes outside of reconciliation.
    pub fn update(
        &mut self,
        id: usize,
        status: JobStatus,
        info: Option<ExitInfo>,
    ) -> ShellResult<bool> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ShellError::JobNotFound(id.to_string()))?;
        Ok(job.apply(status, info))
    }

    /// Pids of a finished foreground pipeline that have not been reaped yet.
    pub(crate) fn adopt_stragglers(&mut self, pids: &mut Vec<Pid>) {
        self.stragglers.append(pids);
    }

    pub(crate) fn mark_reported(&mut self, id: usize) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.reported = true;
        }
    }

    /// Refreshes every job from the OS, evicts the finished ones and returns
    /// those whose completion nobody has been told about yet, in id order.
    pub fn reconcile_all(&mut self) -> Vec<Job> {
        reap(&mut self.stragglers);
        for job in self.jobs.values_mut() {
            job.refresh();
        }

        let finished: Vec<usize> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut unreported = Vec::new();
        for id in finished {
            let Some(mut job) = self.jobs.remove(&id) else {
                continue;
            };
            debug!("registry: evicting [{}] {} ({})", id, job.command, job.status);
            self.retired.insert(id);
            reap(&mut job.pending);
            self.stragglers.append(&mut job.pending);
            if !job.reported {
                job.reported = true;
                unreported.push(job);
            }
        }
        unreported
    }

    /// Asks every remaining group to terminate. Each group is continued as
    /// well, since a stopped process only acts on SIGTERM once it runs and
    /// our last look at its status may be stale.
    pub fn terminate_all(&mut self) {
        for job in self.jobs.values_mut() {
            job.refresh();
            if job.is_finished() {
                continue;
            }
            debug!(
                "registry: terminating [{}] group {} ({})",
                job.id, job.pgid, job.status
            );
            let _ = job.signal(JobSignal::Terminate);
            let _ = job.signal(JobSignal::Continue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::process::launch::{LaunchOptions, launch};
    use crate::process::pipeline::Pipeline;
    use std::collections::HashMap;
    use std::time::Duration;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn start(line: &str) -> Job {
        let pipeline = Pipeline::compile(parse_line(line).unwrap(), &HashMap::new()).unwrap();
        let command = pipeline.command().to_string();
        let opts = LaunchOptions {
            foreground: false,
            capture_output: false,
            terminal: None,
        };
        Job::new(launch(pipeline, &opts).unwrap(), command)
    }

    fn reconcile_until_empty(registry: &mut JobRegistry) -> Vec<Job> {
        let mut seen = Vec::new();
        for _ in 0..250 {
            seen.extend(registry.reconcile_all());
            if registry.is_empty() {
                return seen;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("jobs never finished");
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        init();
        let mut registry = JobRegistry::new();
        assert_eq!(1, registry.register(start("true")));
        assert_eq!(2, registry.register(start("true")));
        reconcile_until_empty(&mut registry);
        assert_eq!(3, registry.register(start("true")));
        reconcile_until_empty(&mut registry);
    }

    #[test]
    fn finished_jobs_are_reported_once_then_retired() {
        init();
        let mut registry = JobRegistry::new();
        let id = registry.register(start("false"));
        let reported = reconcile_until_empty(&mut registry);
        assert_eq!(1, reported.len());
        assert_eq!(id, reported[0].id);
        assert_eq!(JobStatus::Terminated, reported[0].status);
        assert!(registry.reconcile_all().is_empty());

        assert!(matches!(
            registry.lookup(id),
            Err(ShellError::JobAlreadyFinished(1))
        ));
        assert!(matches!(registry.lookup(9), Err(ShellError::JobNotFound(_))));
    }

    #[test]
    fn reported_jobs_are_evicted_silently() {
        init();
        let mut registry = JobRegistry::new();
        let id = registry.register(start("true"));
        registry.mark_reported(id);
        assert!(reconcile_until_empty(&mut registry).is_empty());
    }

    #[test]
    fn update_moves_status_but_not_out_of_finished() {
        init();
        let mut registry = JobRegistry::new();
        let id = registry.register(start("sleep 30"));
        assert!(registry.update(id, JobStatus::Stopped, None).unwrap());
        assert_eq!(JobStatus::Stopped, registry.lookup(id).unwrap().status);

        registry.lookup(id).unwrap().signal(JobSignal::Kill).unwrap();
        let reported = reconcile_until_empty(&mut registry);
        assert_eq!(JobStatus::Terminated, reported[0].status);
        assert!(matches!(
            registry.update(id, JobStatus::Running, None),
            Err(ShellError::JobNotFound(_))
        ));
    }

    #[test]
    fn parse_job_ids() {
        assert_eq!(3, JobRegistry::parse_id("%3").unwrap());
        assert_eq!(12, JobRegistry::parse_id("12").unwrap());
        match JobRegistry::parse_id("abc") {
            Err(ShellError::JobNotFound(spec)) => assert_eq!("abc", spec),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn terminate_all_reaches_stopped_jobs() {
        init();
        let mut registry = JobRegistry::new();
        registry.register(start("sleep 30"));
        let stopped = registry.register(start("sleep 30 | sleep 30"));
        registry
            .lookup(stopped)
            .unwrap()
            .signal(JobSignal::Stop)
            .unwrap();
        registry.terminate_all();
        let reported = reconcile_until_empty(&mut registry);
        assert_eq!(2, reported.len());
        assert!(reported.iter().all(|job| job.status == JobStatus::Terminated));
    }
}
