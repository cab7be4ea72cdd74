//! Offload bridge.
//!
//! Lets the single-threaded HTTP dispatcher hand a blocking call to tokio's
//! blocking pool and await the result without stalling other requests. A fair
//! semaphore with [`OffloadPolicy::workers`] permits caps how many calls run at
//! the same time; calls waiting for a permit are admitted in submission order.

use log::{debug, error, warn};
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot, watch};
use uuid::Uuid;

pub const DEFAULT_WORKERS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffloadError {
    #[error("offload bridge is shut down")]
    Closed,

    #[error("offload bridge used outside of a tokio runtime")]
    NoRuntime,

    #[error("offloaded call did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("offloaded call panicked: {0}")]
    Panicked(String),

    #[error("offloaded call was dropped without a result")]
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffloadPolicy {
    /// Number of calls allowed to run at once. Values below 1 are treated as 1.
    pub workers: usize,
    /// How long [`OffloadBridge::run`] waits for a result. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for OffloadPolicy {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    /// The call returned an error or panicked.
    Failed,
    /// The handle went away before the call got a slot.
    Cancelled,
}

/// A submitted call. Await it with [`OffloadHandle::join`].
///
/// Dropping the handle while the call is still queued cancels it. A call that
/// is already running cannot be interrupted; its result is discarded.
#[derive(Debug)]
pub struct OffloadHandle<T> {
    state: watch::Receiver<JobState>,
    receiver: oneshot::Receiver<Result<T, OffloadError>>,
}

impl<T> OffloadHandle<T> {
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Watches state changes, including ones after the handle is gone.
    pub fn states(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub async fn join(self) -> Result<T, OffloadError> {
        self.receiver.await.unwrap_or(Err(OffloadError::Lost))
    }

    /// Like [`join`](Self::join) but gives up after `limit`, cancelling the
    /// call if it has not started yet.
    pub async fn join_within(mut self, limit: Duration) -> Result<T, OffloadError> {
        match tokio::time::timeout(limit, &mut self.receiver).await {
            Ok(result) => result.unwrap_or(Err(OffloadError::Lost)),
            Err(_) => Err(OffloadError::TimedOut(limit)),
        }
    }
}

/// Caps blocking calls at a fixed number of slots.
///
/// Constructed once at startup and shared by reference. Call
/// [`shutdown`](Self::shutdown) to let queued calls drain before exit.
pub struct OffloadBridge {
    policy: OffloadPolicy,
    slots: Arc<Semaphore>,
}

impl OffloadBridge {
    pub fn new(policy: OffloadPolicy) -> Self {
        let policy = OffloadPolicy {
            workers: policy.workers.max(1),
            ..policy
        };

        debug!("offload bridge started with {} slots", policy.workers);

        Self {
            slots: Arc::new(Semaphore::new(policy.workers)),
            policy,
        }
    }

    pub fn policy(&self) -> OffloadPolicy {
        self.policy
    }

    /// Queues `f` for a blocking thread. Whatever `f` returns counts as success.
    pub fn submit<F, T>(&self, f: F) -> Result<OffloadHandle<T>, OffloadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(f, |_| false)
    }

    /// Queues a fallible `f`. An `Err` marks the call [`JobState::Failed`] and
    /// is handed back unchanged.
    pub fn submit_fallible<F, T, E>(&self, f: F) -> Result<OffloadHandle<Result<T, E>>, OffloadError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.dispatch(f, Result::is_err)
    }

    /// Runs `f` on a blocking thread and returns whatever it returns, subject
    /// to the policy timeout.
    pub async fn run<F, T>(&self, f: F) -> Result<T, OffloadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.wait(self.submit(f)?).await
    }

    /// [`run`](Self::run) for a fallible `f`. The outer `Result` is the
    /// bridge's, the inner one is `f`'s, passed through as is.
    pub async fn run_fallible<F, T, E>(&self, f: F) -> Result<Result<T, E>, OffloadError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.wait(self.submit_fallible(f)?).await
    }

    /// Stops admitting new calls once everything already queued has finished.
    pub async fn shutdown(&self) {
        let all = self.policy.workers as u32;
        match self.slots.acquire_many(all).await {
            Ok(_drained) => {
                self.slots.close();
                debug!("offload bridge shut down");
            }
            Err(_) => debug!("offload bridge already shut down"),
        }
    }

    async fn wait<T>(&self, handle: OffloadHandle<T>) -> Result<T, OffloadError> {
        match self.policy.timeout {
            Some(limit) => handle.join_within(limit).await,
            None => handle.join().await,
        }
    }

    fn dispatch<F, T>(&self, f: F, failed: fn(&T) -> bool) -> Result<OffloadHandle<T>, OffloadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.slots.is_closed() {
            return Err(OffloadError::Closed);
        }
        let runtime = Handle::try_current().map_err(|_| OffloadError::NoRuntime)?;

        let id = Uuid::new_v4();
        let (state_sender, state) = watch::channel(JobState::Queued);
        let (mut result_sender, receiver) = oneshot::channel();

        // Join the semaphore queue now so admission follows submission order.
        let mut admission = Box::pin(self.slots.clone().acquire_owned());
        let early = admission
            .as_mut()
            .poll(&mut Context::from_waker(Waker::noop()));

        runtime.spawn(async move {
            let slot = match early {
                Poll::Ready(slot) => slot,
                Poll::Pending => tokio::select! {
                    biased;
                    _ = result_sender.closed() => {
                        state_sender.send_replace(JobState::Cancelled);
                        debug!("offloaded call {id} cancelled before it started");
                        return;
                    }
                    slot = &mut admission => slot,
                },
            };

            let Ok(_slot) = slot else {
                state_sender.send_replace(JobState::Cancelled);
                // The caller may have stopped waiting.
                let _ = result_sender.send(Err(OffloadError::Closed));
                return;
            };

            if result_sender.is_closed() {
                state_sender.send_replace(JobState::Cancelled);
                debug!("offloaded call {id} cancelled before it started");
                return;
            }

            state_sender.send_replace(JobState::Running);
            debug!("offloaded call {id} running");

            let result = match tokio::task::spawn_blocking(f).await {
                Ok(value) if failed(&value) => {
                    state_sender.send_replace(JobState::Failed);
                    Ok(value)
                }
                Ok(value) => {
                    state_sender.send_replace(JobState::Completed);
                    Ok(value)
                }
                Err(e) if e.is_panic() => {
                    error!("offloaded call {id} panicked: {e}");
                    state_sender.send_replace(JobState::Failed);
                    Err(OffloadError::Panicked(e.to_string()))
                }
                Err(e) => {
                    warn!("offloaded call {id} was aborted: {e}");
                    state_sender.send_replace(JobState::Failed);
                    Err(OffloadError::Lost)
                }
            };

            let _ = result_sender.send(result);
        });

        debug!("offloaded call {id} queued");

        Ok(OffloadHandle { state, receiver })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::thread;

    fn bridge(workers: usize) -> OffloadBridge {
        OffloadBridge::new(OffloadPolicy {
            workers,
            timeout: None,
        })
    }

    async fn reach(states: &mut watch::Receiver<JobState>, wanted: JobState) {
        tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached in time")
            .expect("state sender dropped");
    }

    #[tokio::test]
    async fn test_run_returns_function_output_unchanged() {
        let bridge = bridge(2);
        let question = "What is a for loop?".to_string();

        let answer = bridge.run(move || format!("echo: {question}")).await;

        assert_eq!(answer, Ok("echo: What is a for loop?".to_string()));
    }

    #[tokio::test]
    async fn test_at_most_two_calls_run_concurrently() {
        let bridge = bridge(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let calls = (0..6).map(|_| {
            let active = active.clone();
            let peak = peak.clone();
            let started = started.clone();
            let completed = completed.clone();
            bridge.run(move || {
                let order = started.fetch_add(1, Ordering::SeqCst);
                let completed_before = completed.load(Ordering::SeqCst);
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_active, Ordering::SeqCst);

                thread::sleep(Duration::from_millis(50));

                active.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
                (order, completed_before)
            })
        });

        let results = join_all(calls).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        for result in results {
            let (order, completed_before) = result.unwrap();
            if order >= 2 {
                // a slot only frees up when an earlier call has finished
                assert!(completed_before >= order - 1);
            }
        }
    }

    #[tokio::test]
    async fn test_calls_start_in_submission_order() {
        let bridge = bridge(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let calls = (0..5).map(|i| {
            let seen = seen.clone();
            bridge.run(move || seen.lock().unwrap().push(i))
        });
        join_all(calls).await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_state_moves_from_running_to_completed() {
        let bridge = bridge(1);
        let (gate_sender, gate) = std_mpsc::channel::<()>();

        let handle = bridge
            .submit_fallible(move || {
                let _ = gate.recv();
                Ok::<_, String>("done")
            })
            .unwrap();
        let mut states = handle.states();

        reach(&mut states, JobState::Running).await;
        assert_eq!(handle.state(), JobState::Running);

        gate_sender.send(()).unwrap();
        assert_eq!(handle.join().await, Ok(Ok("done")));
        assert_eq!(*states.borrow(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_returned_error_marks_failed_and_passes_through() {
        let bridge = bridge(2);

        let handle = bridge
            .submit_fallible(|| Err::<String, _>("backend unreachable".to_string()))
            .unwrap();
        let states = handle.states();

        assert_eq!(
            handle.join().await,
            Ok(Err("backend unreachable".to_string()))
        );
        assert_eq!(*states.borrow(), JobState::Failed);
    }

    #[tokio::test]
    async fn test_plain_run_treats_err_value_as_success() {
        let bridge = bridge(2);

        let handle = bridge.submit(|| Err::<(), _>("just data")).unwrap();
        let states = handle.states();

        assert_eq!(handle.join().await, Ok(Err("just data")));
        assert_eq!(*states.borrow(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_panic_marks_failed_and_is_reported() {
        let bridge = bridge(1);

        let handle = bridge.submit(|| -> () { panic!("model exploded") }).unwrap();
        let states = handle.states();

        match handle.join().await {
            Err(OffloadError::Panicked(message)) => assert!(message.contains("model exploded")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(*states.borrow(), JobState::Failed);

        // the slot is released and the bridge keeps serving
        assert_eq!(bridge.run(|| 7).await, Ok(7));
    }

    #[tokio::test]
    async fn test_timed_out_queued_call_is_cancelled() {
        let limit = Duration::from_millis(50);
        let bridge = OffloadBridge::new(OffloadPolicy {
            workers: 1,
            timeout: Some(limit),
        });
        let (gate_sender, gate) = std_mpsc::channel::<()>();
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = bridge
            .submit(move || {
                let _ = gate.recv();
            })
            .unwrap();
        let mut blocker_states = blocker.states();
        reach(&mut blocker_states, JobState::Running).await;

        let ran_clone = ran.clone();
        let queued = bridge
            .submit(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let mut queued_states = queued.states();
        assert_eq!(queued.state(), JobState::Queued);

        assert_eq!(
            queued.join_within(limit).await,
            Err(OffloadError::TimedOut(limit))
        );
        reach(&mut queued_states, JobState::Cancelled).await;

        gate_sender.send(()).unwrap();
        blocker.join().await.unwrap();
        bridge.shutdown().await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_times_out_with_policy() {
        let limit = Duration::from_millis(50);
        let bridge = OffloadBridge::new(OffloadPolicy {
            workers: 1,
            timeout: Some(limit),
        });

        let result = bridge
            .run(|| thread::sleep(Duration::from_millis(300)))
            .await;

        assert_eq!(result, Err(OffloadError::TimedOut(limit)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_calls_then_rejects() {
        let bridge = bridge(1);
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let done = done.clone();
                bridge
                    .submit(move || {
                        thread::sleep(Duration::from_millis(10));
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap()
            })
            .collect();

        bridge.shutdown().await;

        assert_eq!(done.load(Ordering::SeqCst), 3);
        for handle in handles {
            assert_eq!(handle.join().await, Ok(()));
        }
        assert_eq!(bridge.run(|| 1).await, Err(OffloadError::Closed));

        // a second shutdown is a no-op
        bridge.shutdown().await;
    }

    #[test]
    fn test_submit_outside_runtime_fails() {
        let bridge = bridge(1);

        assert!(matches!(
            bridge.submit(|| 1),
            Err(OffloadError::NoRuntime)
        ));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        assert_eq!(bridge(0).policy().workers, 1);
    }
}
