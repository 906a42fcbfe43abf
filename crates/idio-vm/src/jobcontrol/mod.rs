// SPDX-License-Identifier: GPL-3.0-or-later

//! POSIX job control (spec.md §4.6).
//!
//! A [`Job`] is a pipeline of [`Process`] records launched as one process
//! group; the shell (this core's embedder) puts the group in the
//! foreground by handing it the controlling terminal via `tcsetpgrp`, and
//! takes it back when the job stops or finishes. `SIGCHLD` delivery is
//! turned into job-state transitions by [`do_job_notification`] — a
//! condition (`^rt-signal`) rather than a Unix signal handler callback,
//! since the rest of the VM has no notion of asynchronous interruption
//! outside the condition system (spec.md §4.3).

use idio_core::HostError;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::collections::HashMap;
use tracing::info;

/// One process within a [`Job`] (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub argv: Vec<String>,
    pub completed: bool,
    pub stopped: bool,
    /// Raw `waitpid` status, once known.
    pub status: Option<i32>,
}

impl Process {
    #[must_use]
    pub fn new(pid: Pid, argv: Vec<String>) -> Self {
        Self { pid, argv, completed: false, stopped: false, status: None }
    }
}

/// A pipeline: one process group, one or more [`Process`]es (spec.md
/// §4.6).
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u32,
    pub pgid: Pid,
    pub processes: Vec<Process>,
    pub notified: bool,
    pub command: String,
}

impl Job {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.processes.iter().all(|p| p.completed || p.stopped)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.completed)
    }

    /// Any process that exited with a nonzero status or was killed by a
    /// signal (spec.md §4.6's `job-failed`/`^rt-command-status-error`).
    #[must_use]
    pub fn failed(&self) -> bool {
        self.processes.iter().any(|p| p.completed && p.status.is_some_and(|s| s != 0))
    }

    #[must_use]
    pub fn status(&self) -> Option<i32> {
        self.processes.last().and_then(|p| p.status)
    }

    #[must_use]
    pub fn detail(&self) -> String {
        self.processes.iter().map(|p| p.argv.join(" ")).collect::<Vec<_>>().join(" | ")
    }
}

/// Table of known jobs, keyed by id (spec.md §4.6).
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<u32, Job>,
    next_id: u32,
    /// Whether this process is an interactive shell with a controlling
    /// terminal (spec.md §4.6's `%interactive?`).
    interactive: bool,
    terminal_fd: i32,
    shell_pgid: Pid,
}

impl JobTable {
    #[must_use]
    pub fn new(terminal_fd: i32) -> Self {
        let interactive = crate::sysglue::is_interactive(terminal_fd);
        let shell_pgid = Pid::from_raw(crate::sysglue::current_pid());
        Self { jobs: HashMap::new(), next_id: 1, interactive, terminal_fd, shell_pgid }
    }

    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn insert(&mut self, pgid: Pid, processes: Vec<Process>, command: String) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(id, Job { id, pgid, processes, notified: false, command });
        id
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    /// Every known job id, for broadcast operations like hangup-on-exit
    /// (spec.md §4.6).
    #[must_use]
    pub fn job_ids(&self) -> Vec<u32> {
        self.jobs.keys().copied().collect()
    }

    pub fn remove_completed(&mut self) -> Vec<Job> {
        let done: Vec<u32> = self.jobs.iter().filter(|(_, j)| j.is_completed()).map(|(&id, _)| id).collect();
        done.into_iter().filter_map(|id| self.jobs.remove(&id)).collect()
    }

    fn job_for_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.values_mut().find(|j| j.processes.iter().any(|p| p.pid == pid))
    }
}

/// Apply one `waitpid` status report to whichever job owns `pid` (spec.md
/// §4.6's `mark-process-status`).
pub fn mark_process_status(table: &mut JobTable, pid: Pid, status: &WaitStatus) {
    let Some(job) = table.job_for_pid_mut(pid) else { return };
    let Some(process) = job.processes.iter_mut().find(|p| p.pid == pid) else { return };
    match status {
        WaitStatus::Exited(_, code) => {
            process.completed = true;
            process.status = Some(*code);
        }
        WaitStatus::Signaled(_, sig, _) => {
            process.completed = true;
            process.status = Some(128 + *sig as i32);
        }
        WaitStatus::Stopped(_, _) => process.stopped = true,
        WaitStatus::Continued(_) => process.stopped = false,
        _ => {}
    }
}

/// `update-status` (spec.md §4.6): drain any pending `waitpid` reports
/// without blocking.
pub fn update_status(table: &mut JobTable) {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => {
                if let Some(pid) = status.pid() {
                    mark_process_status(table, pid, &status);
                }
            }
        }
    }
}

/// `wait-for-job` (spec.md §4.6): block until `job_id` is stopped or
/// completed.
pub fn wait_for_job(table: &mut JobTable, job_id: u32) {
    loop {
        {
            let Some(job) = table.get(job_id) else { return };
            if job.is_stopped() {
                return;
            }
        }
        match waitpid(None, Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => {
                if let Some(pid) = status.pid() {
                    mark_process_status(table, pid, &status);
                }
            }
            Err(_) => return,
        }
    }
}

/// `foreground-job` (spec.md §4.6): hand the controlling terminal to
/// `job_id`'s process group and wait for it.
///
/// # Errors
///
/// Returns [`HostError`] if `tcsetpgrp` fails.
pub fn foreground_job(table: &mut JobTable, job_id: u32) -> Result<(), HostError> {
    let Some(job) = table.get(job_id) else { return Ok(()) };
    let pgid = job.pgid;
    let terminal_fd = table.terminal_fd;
    if table.interactive {
        crate::sysglue::tcsetpgrp(terminal_fd, pgid.as_raw()).map_err(|_| HostError::last_os_error("tcsetpgrp"))?;
    }
    wait_for_job(table, job_id);
    if table.interactive {
        let shell_pgid = table.shell_pgid;
        crate::sysglue::tcsetpgrp(terminal_fd, shell_pgid.as_raw()).map_err(|_| HostError::last_os_error("tcsetpgrp"))?;
    }
    Ok(())
}

/// `background-job` (spec.md §4.6): optionally send `SIGCONT` and let the
/// job run without taking the terminal.
pub fn background_job(table: &mut JobTable, job_id: u32, continue_it: bool) {
    if continue_it {
        if let Some(job) = table.get(job_id) {
            let _ = nix::sys::signal::killpg(job.pgid, nix::sys::signal::Signal::SIGCONT);
        }
    }
}

/// `continue-job` (spec.md §4.6): resume a stopped job, foreground or
/// background.
///
/// # Errors
///
/// Returns [`HostError`] if foregrounding fails.
pub fn continue_job(table: &mut JobTable, job_id: u32, foreground: bool) -> Result<(), HostError> {
    if let Some(job) = table.get_mut(job_id) {
        for p in &mut job.processes {
            p.stopped = false;
        }
    }
    if foreground {
        foreground_job(table, job_id)
    } else {
        background_job(table, job_id, true);
        Ok(())
    }
}

/// `hangup-job` (spec.md §4.6): send `SIGHUP` to a job's process group,
/// e.g. when the controlling shell exits.
pub fn hangup_job(table: &JobTable, job_id: u32) {
    if let Some(job) = table.get(job_id) {
        let _ = nix::sys::signal::killpg(job.pgid, nix::sys::signal::Signal::SIGHUP);
    }
}

/// `do-job-notification` (spec.md §4.6): called after `update_status`,
/// reports on any job that just completed. Returns the completed jobs so
/// the caller (the VM, which owns condition-raising) can turn failures
/// into `^rt-command-status-error` conditions.
pub fn do_job_notification(table: &mut JobTable) -> Vec<Job> {
    update_status(table);
    let completed = table.remove_completed();
    for job in &completed {
        info!(target: "idio_vm::job_control", job = job.id, command = %job.command, status = ?job.status(), "job completed");
    }
    completed
}

/// `mark-job-as-running` (spec.md §4.6): clear every process's `stopped`
/// flag, e.g. right after `SIGCONT` is sent.
pub fn mark_job_as_running(table: &mut JobTable, job_id: u32) {
    if let Some(job) = table.get_mut(job_id) {
        for p in &mut job.processes {
            p.stopped = false;
        }
    }
}

/// `%prep-process` (spec.md §4.6, `original_source/src/job-control.c`'s
/// `idio_job_control_prep_process`): child-side setup done *after*
/// `fork` and *before* `execvp` — join the job's process group, wire up
/// the three standard streams, and, for a foreground job, take the
/// controlling terminal. Runs in the child, so any error here calls
/// `std::process::exit` rather than returning — there is no Idio
/// toplevel left to unwind to.
///
/// # Errors
///
/// Returns [`HostError`] if `setpgid`, `dup2`, or `tcsetpgrp` fails.
#[cfg(unix)]
pub fn prep_process(
    pgid: Pid,
    infile: std::os::fd::RawFd,
    outfile: std::os::fd::RawFd,
    errfile: std::os::fd::RawFd,
    foreground: bool,
    terminal_fd: std::os::fd::RawFd,
    interactive: bool,
) -> Result<(), HostError> {
    let pid = Pid::this();
    let pgid = if pgid.as_raw() == 0 { pid } else { pgid };
    if interactive {
        nix::unistd::setpgid(pid, pgid).map_err(|_| HostError::last_os_error("setpgid"))?;
        if foreground {
            crate::sysglue::tcsetpgrp(terminal_fd, pgid.as_raw()).map_err(|_| HostError::last_os_error("tcsetpgrp"))?;
        }
    }
    if infile != 0 {
        dup2_raw(infile, 0)?;
    }
    if outfile != 1 {
        dup2_raw(outfile, 1)?;
    }
    if errfile != 2 {
        dup2_raw(errfile, 2)?;
    }
    Ok(())
}

/// `dup2` over raw fds, matching `crate::sysglue`'s pattern of localizing
/// the `unsafe BorrowedFd::borrow_raw` needed to hand a bare fd to an
/// `AsFd`-based `nix` call.
#[cfg(unix)]
fn dup2_raw(oldfd: std::os::fd::RawFd, newfd: std::os::fd::RawFd) -> Result<(), HostError> {
    use std::os::fd::BorrowedFd;
    // SAFETY: `oldfd` is a pipe or inherited stdio fd still open in this
    // process at call time (it is only ever closed by this function's
    // caller afterward).
    let borrowed = unsafe { BorrowedFd::borrow_raw(oldfd) };
    nix::unistd::dup2(&borrowed, newfd).map_err(|_| HostError::last_os_error("dup2"))?;
    Ok(())
}

/// One stage of a pipeline to launch: the command and its stdio wiring is
/// resolved by the caller (module redirection syntax is out of scope,
/// `SPEC_FULL.md` §1's Non-goals) down to plain fds.
#[cfg(unix)]
pub struct PipelineStage {
    pub argv: Vec<String>,
    pub infile: std::os::fd::RawFd,
    pub outfile: std::os::fd::RawFd,
    pub errfile: std::os::fd::RawFd,
}

/// `%launch-pipeline` (spec.md §4.6,
/// `original_source/src/job-control.c`'s `idio_job_control_launch_job`):
/// fork one child per stage, piping stage `i`'s stdout into stage `i+1`'s
/// stdin, all sharing one process group (the first child's pid). The
/// parent closes every pipe fd it duped away and returns the new [`Job`]
/// immediately — callers foreground or background it via
/// [`foreground_job`]/[`background_job`].
///
/// # Errors
///
/// Returns [`HostError`] if `fork`, `pipe`, or `execvp` fails.
#[cfg(unix)]
pub fn launch_pipeline(
    table: &mut JobTable,
    stages: Vec<PipelineStage>,
    foreground: bool,
) -> Result<u32, HostError> {
    use nix::unistd::{ForkResult, execvp, fork, pipe};
    use std::ffi::CString;
    use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

    let command: String = stages.iter().map(|s| s.argv.join(" ")).collect::<Vec<_>>().join(" | ");
    let mut processes = Vec::with_capacity(stages.len());
    let mut job_pgid = Pid::from_raw(0);
    let terminal_fd = table.terminal_fd;
    let interactive = table.interactive;
    let n = stages.len();

    let close_raw = |fd: RawFd| {
        // SAFETY: `fd` was handed out by `pipe()` above and is closed at
        // most once per end, mirroring the parent/child fd-closing
        // discipline in `original_source/src/job-control.c`.
        let owned = unsafe { std::os::fd::OwnedFd::from_raw_fd(fd) };
        drop(owned);
    };

    let mut prev_read: Option<RawFd> = None;
    for (i, stage) in stages.into_iter().enumerate() {
        let is_last = i + 1 == n;
        let (pipe_read, pipe_write) = if is_last {
            (None, None)
        } else {
            let (r, w) = pipe().map_err(|_| HostError::last_os_error("pipe"))?;
            (Some(r.into_raw_fd()), Some(w.into_raw_fd()))
        };

        // SAFETY: fork duplicates the process; the child branch only
        // calls async-signal-safe functions (dup2/setpgid/execvp) before
        // either exec'ing or exiting, matching the original's own
        // fork-then-exec-or-bail discipline.
        match unsafe { fork() }.map_err(|_| HostError::last_os_error("fork"))? {
            ForkResult::Child => {
                let infile = prev_read.unwrap_or(stage.infile);
                let outfile = pipe_write.unwrap_or(stage.outfile);
                if prep_process(job_pgid, infile, outfile, stage.errfile, foreground, terminal_fd, interactive).is_err() {
                    std::process::exit(127);
                }
                if let Some(r) = prev_read {
                    close_raw(r);
                }
                if let Some(w) = pipe_write {
                    close_raw(w);
                }
                let prog = CString::new(stage.argv[0].clone()).unwrap_or_default();
                let args: Vec<CString> = stage.argv.iter().map(|a| CString::new(a.clone()).unwrap_or_default()).collect();
                let _ = execvp(&prog, &args);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                if job_pgid.as_raw() == 0 {
                    job_pgid = child;
                }
                if interactive {
                    let _ = nix::unistd::setpgid(child, job_pgid);
                }
                if let Some(r) = prev_read {
                    close_raw(r);
                }
                if let Some(w) = pipe_write {
                    close_raw(w);
                }
                processes.push(Process::new(child, stage.argv));
                prev_read = pipe_read;
            }
        }
    }

    Ok(table.insert(job_pgid, processes, command))
}

/// `%launch-job` (spec.md §4.6): launch a single-process job, a
/// one-stage [`launch_pipeline`].
///
/// # Errors
///
/// Returns [`HostError`] if the underlying `fork`/`execvp` fails.
#[cfg(unix)]
pub fn launch_job(table: &mut JobTable, stage: PipelineStage, foreground: bool) -> Result<u32, HostError> {
    launch_pipeline(table, vec![stage], foreground)
}

/// `format-job-info` (spec.md §4.6): a one-line human-readable summary.
#[must_use]
pub fn format_job_info(job: &Job) -> String {
    let state = if job.is_completed() {
        "Done"
    } else if job.is_stopped() {
        "Stopped"
    } else {
        "Running"
    };
    format!("[{}]  {}  {}", job.id, state, job.command)
}

#[cfg(test)]
mod jobcontrol_test {
    use super::*;

    fn fake_job(table: &mut JobTable, argv: &[&str]) -> u32 {
        let pid = Pid::from_raw(std::process::id() as i32);
        let process = Process::new(pid, argv.iter().map(ToString::to_string).collect());
        table.insert(pid, vec![process], argv.join(" "))
    }

    #[test]
    fn a_fresh_job_is_neither_stopped_nor_completed() {
        let mut table = JobTable::new(-1);
        let id = fake_job(&mut table, &["/bin/true"]);
        let job = table.get(id).unwrap();
        assert!(!job.is_completed());
    }

    #[test]
    fn marking_exit_status_completes_the_job() {
        let mut table = JobTable::new(-1);
        let id = fake_job(&mut table, &["/bin/true"]);
        let pid = table.get(id).unwrap().processes[0].pid;
        let status = WaitStatus::Exited(pid, 0);
        mark_process_status(&mut table, pid, &status);
        let job = table.get(id).unwrap();
        assert!(job.is_completed());
        assert!(!job.failed());
    }

    #[test]
    fn nonzero_exit_status_is_a_failure() {
        let mut table = JobTable::new(-1);
        let id = fake_job(&mut table, &["/bin/false"]);
        let pid = table.get(id).unwrap().processes[0].pid;
        mark_process_status(&mut table, pid, &WaitStatus::Exited(pid, 1));
        assert!(table.get(id).unwrap().failed());
    }

    #[test]
    fn format_job_info_reports_running_state_before_completion() {
        let mut table = JobTable::new(-1);
        let id = fake_job(&mut table, &["sleep", "1"]);
        let job = table.get(id).unwrap();
        assert!(format_job_info(job).contains("Running"));
    }

    #[test]
    fn format_job_info_reports_done_after_completion() {
        let mut table = JobTable::new(-1);
        let id = fake_job(&mut table, &["/bin/true"]);
        let pid = table.get(id).unwrap().processes[0].pid;
        mark_process_status(&mut table, pid, &WaitStatus::Exited(pid, 0));
        assert!(format_job_info(table.get(id).unwrap()).contains("Done"));
    }

    #[test]
    fn remove_completed_drains_only_finished_jobs() {
        let mut table = JobTable::new(-1);
        let running = fake_job(&mut table, &["sleep", "1"]);
        let done = fake_job(&mut table, &["/bin/true"]);
        let pid = table.get(done).unwrap().processes[0].pid;
        mark_process_status(&mut table, pid, &WaitStatus::Exited(pid, 0));
        let removed = table.remove_completed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, done);
        assert!(table.get(running).is_some());
        assert!(table.get(done).is_none());
    }

    #[cfg(unix)]
    fn stage(argv: &[&str]) -> PipelineStage {
        PipelineStage { argv: argv.iter().map(ToString::to_string).collect(), infile: 0, outfile: 1, errfile: 2 }
    }

    #[test]
    #[cfg(unix)]
    fn launch_job_runs_bin_true_to_completion() {
        let mut table = JobTable::new(-1);
        let id = launch_job(&mut table, stage(&["/bin/true"]), false).unwrap();
        wait_for_job(&mut table, id);
        let job = table.get(id).unwrap();
        assert!(job.is_completed());
        assert!(!job.failed());
    }

    #[test]
    #[cfg(unix)]
    fn launch_job_reports_bin_false_as_failed() {
        let mut table = JobTable::new(-1);
        let id = launch_job(&mut table, stage(&["/bin/false"]), false).unwrap();
        wait_for_job(&mut table, id);
        assert!(table.get(id).unwrap().failed());
    }

    #[test]
    #[cfg(unix)]
    fn launch_pipeline_links_stdout_to_stdin() {
        let mut table = JobTable::new(-1);
        let stages = vec![stage(&["/bin/echo", "hello"]), stage(&["/bin/sh", "-c", "cat > /dev/null"])];
        let id = launch_pipeline(&mut table, stages, false).unwrap();
        wait_for_job(&mut table, id);
        let job = table.get(id).unwrap();
        assert_eq!(job.processes.len(), 2);
        assert!(job.is_completed());
    }
}
