// Copyright 2026 The Warden Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The event reactor: a bounded task queue drained by a fixed pool of
//! worker threads, on which all plugin code runs.
//!
//! Each worker carries two thread locals: a flag marking it as a reactor
//! thread (plugin management must happen here) and the current plugin
//! scope, set for the duration of a listener call so the registration
//! facade can answer "which plugin is calling me right now?".

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::handle::ServerHandle;
use crate::info::Info;
use crate::plugins::registry::PluginRegistry;

/// Number of worker threads in the reactor pool.
pub const PLUGIN_THREAD_POOL_SIZE: usize = 4;
/// Capacity of the task queue; producers see an error beyond this.
pub const MAX_TASK_QUEUE_SIZE: usize = 2048;
/// Minimum interval between queue-full warnings; overflows in between are
/// logged at debug level.
pub const REACTOR_QUEUE_FULL_WARN_INTERVAL_SEC: u64 = 5;

/// A unit of work executed on a reactor worker.
pub type Task = Box<dyn FnOnce(&ServerHandle) + Send>;

/// The task queue was at capacity. Recoverable back-pressure, not a fatal
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueFull;

/// The identity a worker assumes while running one plugin's code.
#[derive(Clone)]
pub struct PluginScope {
    pub id: String,
    pub registry: Arc<Mutex<PluginRegistry>>,
}

thread_local! {
    static IS_REACTOR_THREAD: Cell<bool> = Cell::new(false);
    static CURRENT_PLUGIN: RefCell<Option<PluginScope>> = RefCell::new(None);
}

/// Whether the calling thread is one of the reactor workers.
pub fn is_reactor_thread() -> bool {
    IS_REACTOR_THREAD.with(|flag| flag.get())
}

/// The plugin scope active on the calling thread, if any.
pub fn current_plugin_scope() -> Option<PluginScope> {
    CURRENT_PLUGIN.with(|current| current.borrow().clone())
}

pub fn current_plugin_id() -> Option<String> {
    CURRENT_PLUGIN.with(|current| current.borrow().as_ref().map(|scope| scope.id.clone()))
}

/// Sets the current plugin scope for the lifetime of the returned guard.
/// The previous scope is restored on drop, panics included.
pub fn enter_plugin_scope(scope: PluginScope) -> PluginScopeGuard {
    let previous = CURRENT_PLUGIN.with(|current| current.replace(Some(scope)));
    PluginScopeGuard { previous }
}

pub struct PluginScopeGuard {
    previous: Option<PluginScope>,
}

impl Drop for PluginScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PLUGIN.with(|current| current.replace(previous));
    }
}

struct QueueState {
    tasks: VecDeque<Task>,
    shutting_down: bool,
}

/// The bounded FIFO queue and its worker pool.
pub struct TaskExecutor {
    state: Mutex<QueueState>,
    cvar: Condvar,
    capacity: usize,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl TaskExecutor {
    pub fn new(capacity: usize) -> Self {
        TaskExecutor {
            state: Mutex::new(QueueState { tasks: VecDeque::new(), shutting_down: false }),
            cvar: Condvar::new(),
            capacity,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Starts the worker pool. Called once during supervisor construction,
    /// after the handle exists.
    pub(crate) fn spawn_workers(executor: &Arc<TaskExecutor>, pool_size: usize, handle: ServerHandle) {
        let mut workers = executor.workers.lock().unwrap();
        for n in 0..pool_size {
            let executor = executor.clone();
            let handle = handle.clone();
            let worker = thread::Builder::new()
                .name(format!("plugin-worker-{}", n))
                .spawn(move || executor.worker_loop(&handle))
                .expect("failed to spawn reactor worker");
            workers.push(worker);
        }
    }

    fn worker_loop(&self, handle: &ServerHandle) {
        IS_REACTOR_THREAD.with(|flag| flag.set(true));
        loop {
            let task = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(task) = state.tasks.pop_front() {
                        break task;
                    }
                    if state.shutting_down {
                        return;
                    }
                    state = self.cvar.wait(state).unwrap();
                }
            };
            // wake producers blocked on a full queue
            self.cvar.notify_all();
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(handle)));
            if result.is_err() {
                error!("a reactor task panicked; the worker lives on");
            }
        }
    }

    /// Enqueues a task from the I/O pump. Fails fast when the queue is at
    /// capacity so the caller can apply back-pressure.
    pub fn add_info_task(&self, task: Task) -> Result<(), TaskQueueFull> {
        let mut state = self.state.lock().unwrap();
        if state.tasks.len() >= self.capacity {
            return Err(TaskQueueFull);
        }
        state.tasks.push_back(task);
        drop(state);
        self.cvar.notify_all();
        Ok(())
    }

    /// Runs the task inline when already on a reactor worker, otherwise
    /// enqueues it, waiting for room if the queue is full.
    pub fn execute_or_enqueue(&self, handle: &ServerHandle, task: Task) {
        if is_reactor_thread() {
            task(handle);
            return;
        }
        let mut state = self.state.lock().unwrap();
        while state.tasks.len() >= self.capacity && !state.shutting_down {
            state = self.cvar.wait(state).unwrap();
        }
        if state.shutting_down {
            debug!("dropping task enqueued during shutdown");
            return;
        }
        state.tasks.push_back(task);
        drop(state);
        self.cvar.notify_all();
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    /// Drains the queue until `deadline` elapses, then abandons whatever
    /// remains and joins the workers.
    pub fn shutdown(&self, deadline: Duration) {
        let abandon_at = Instant::now() + deadline;
        {
            let mut state = self.state.lock().unwrap();
            state.shutting_down = true;
            while !state.tasks.is_empty() {
                let now = Instant::now();
                if now >= abandon_at {
                    let abandoned = state.tasks.len();
                    if abandoned > 0 {
                        warn!("abandoning {} queued tasks at shutdown", abandoned);
                    }
                    state.tasks.clear();
                    break;
                }
                let (next, _) = self.cvar.wait_timeout(state, abandon_at - now).unwrap();
                state = next;
            }
        }
        self.cvar.notify_all();
        let workers = std::mem::replace(&mut *self.workers.lock().unwrap(), Vec::new());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

/// Receives `Info` records from the I/O pump and feeds them to the
/// reactor, converting queue overflow into a rate-limited warning.
pub struct InfoReactor {
    executor: Arc<TaskExecutor>,
    last_queue_full_warn: Mutex<Option<Instant>>,
}

impl InfoReactor {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        InfoReactor { executor, last_queue_full_warn: Mutex::new(None) }
    }

    pub fn put_info(&self, info: Info) {
        let task: Task = Box::new(move |handle| handle.process_info(&info));
        if self.executor.add_info_task(task).is_err() {
            let mut last_warn = self.last_queue_full_warn.lock().unwrap();
            let now = Instant::now();
            let warn_due = match *last_warn {
                None => true,
                Some(at) => now.duration_since(at).as_secs() >= REACTOR_QUEUE_FULL_WARN_INTERVAL_SEC,
            };
            if warn_due {
                *last_warn = Some(now);
                warn!("info queue is full, dropping info");
            } else {
                debug!("info queue is full, dropping info");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use super::*;
    use crate::test_support::test_supervisor;

    #[test]
    fn tasks_run_on_reactor_threads() {
        let supervisor = test_supervisor();
        let handle = supervisor.handle().clone();
        let (tx, rx) = mpsc::channel();
        handle.executor.execute_or_enqueue(
            &handle,
            Box::new(move |_| {
                tx.send(is_reactor_thread()).unwrap();
            }),
        );
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!is_reactor_thread());
    }

    #[test]
    fn execute_or_enqueue_runs_inline_on_worker() {
        let supervisor = test_supervisor();
        let handle = supervisor.handle().clone();
        let (tx, rx) = mpsc::channel();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_counter = counter.clone();
        handle.executor.execute_or_enqueue(
            &handle,
            Box::new(move |h| {
                // nested call runs inline, before this task returns
                let nested = inner_counter.clone();
                h.executor.execute_or_enqueue(
                    h,
                    Box::new(move |_| {
                        nested.store(1, Ordering::SeqCst);
                    }),
                );
                tx.send(inner_counter.load(Ordering::SeqCst)).unwrap();
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }

    #[test]
    fn add_info_task_fails_when_full() {
        let executor = Arc::new(TaskExecutor::new(2));
        // no workers are started, so tasks pile up
        assert!(executor.add_info_task(Box::new(|_| {})).is_ok());
        assert!(executor.add_info_task(Box::new(|_| {})).is_ok());
        assert_eq!(executor.add_info_task(Box::new(|_| {})), Err(TaskQueueFull));
        assert_eq!(executor.queue_len(), 2);
    }

    #[test]
    fn queue_full_warnings_are_rate_limited() {
        let executor = Arc::new(TaskExecutor::new(1));
        let info_reactor = InfoReactor::new(executor.clone());
        // no workers running, so one task saturates the queue
        executor.add_info_task(Box::new(|_| {})).unwrap();

        info_reactor.put_info(Info::console("one"));
        let first = *info_reactor.last_queue_full_warn.lock().unwrap();
        assert!(first.is_some());

        info_reactor.put_info(Info::console("two"));
        let second = *info_reactor.last_queue_full_warn.lock().unwrap();
        // the second overflow landed inside the warn interval, so the
        // warning (and its timestamp) did not repeat
        assert_eq!(first, second);
        assert_eq!(executor.queue_len(), 1);
    }

    #[test]
    fn plugin_scope_guard_restores_previous() {
        let registry = Arc::new(Mutex::new(PluginRegistry::default()));
        let outer = PluginScope { id: "outer".to_string(), registry: registry.clone() };
        let inner = PluginScope { id: "inner".to_string(), registry };

        assert!(current_plugin_id().is_none());
        {
            let _outer_guard = enter_plugin_scope(outer);
            assert_eq!(current_plugin_id().as_deref(), Some("outer"));
            {
                let _inner_guard = enter_plugin_scope(inner);
                assert_eq!(current_plugin_id().as_deref(), Some("inner"));
            }
            assert_eq!(current_plugin_id().as_deref(), Some("outer"));
        }
        assert!(current_plugin_id().is_none());
    }

    #[test]
    fn listener_panic_does_not_kill_worker() {
        let supervisor = test_supervisor();
        let handle = supervisor.handle().clone();
        handle
            .executor
            .execute_or_enqueue(&handle, Box::new(|_| panic!("deliberate")));
        let (tx, rx) = mpsc::channel();
        handle.executor.execute_or_enqueue(
            &handle,
            Box::new(move |_| {
                tx.send(()).unwrap();
            }),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
