use std::io;
use std::process::{Child, ExitStatus};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `job` on a worker thread and wait at most `timeout` for it.
///
/// Returns `None` on timeout. The worker is detached and finishes on its own;
/// its result is dropped.
pub(crate) fn run_with_deadline<T, F>(timeout: Duration, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("triage-deadline".to_string())
        .spawn(move || {
            let _ = tx.send(job());
        });
    if let Err(e) = spawned {
        log::warn!("failed to spawn deadline worker: {}", e);
        return None;
    }
    rx.recv_timeout(timeout).ok()
}

/// Wait for `child` to exit, killing and reaping it once `timeout` passes.
///
/// Returns `None` when the child had to be killed.
pub(crate) fn wait_child(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            kill_child(child);
            return Ok(None);
        }
        thread::sleep(CHILD_POLL_INTERVAL.min(deadline - now));
    }
}

/// Kill `child` if it is still running and reap it.
pub(crate) fn kill_child(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.kill() {
        log::debug!("kill child {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        log::debug!("reap child {}: {}", child.id(), e);
    }
}
