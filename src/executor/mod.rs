//! Execution resources for consumer loops.
//!
//! The dispatcher does not own a thread pool. It hands its consumer loop to
//! an [`Executor`] and learns about completion through the loop itself, so
//! any executor that eventually runs the task will do.

use std::io;
use std::thread;

/// A unit of work that runs until its dispatcher stops it.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs long-lived tasks such as a stream's consumer loop.
///
/// The task blocks for its whole lifetime, so it must get a dedicated
/// thread (or a pool slot that is never reclaimed while it runs).
pub trait Executor: Send + Sync {
    fn execute(&self, name: &str, task: Task) -> io::Result<()>;
}

/// Spawns one named OS thread per task.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, name: &str, task: Task) -> io::Result<()> {
        thread::Builder::new().name(name.to_string()).spawn(task)?;
        Ok(())
    }
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn execute(&self, name: &str, task: Task) -> io::Result<()> {
        (**self).execute(name, task)
    }
}
