//! Thread construction for executors.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use log::debug;

/// Work run by a thread produced by a `ThreadFactory`.
pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Something that can start threads.
///
/// Executors take a factory instead of spawning threads themselves, so the
/// host decides naming, stack size and any other thread setup.
pub trait ThreadFactory: Send + Sync {
    /// Start a thread running `body`.
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>>;
}

/// Names threads `<group>-<n>` with a per-factory counter starting at 1.
pub struct GroupThreadFactory {
    name: String,
    ordinal: AtomicUsize,
    stack_size: Option<usize>,
}

impl GroupThreadFactory {
    /// Create a factory for the thread group `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: AtomicUsize::new(1),
            stack_size: None,
        }
    }

    /// Give every thread `stack_size` bytes of stack.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Name of the thread group.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ThreadFactory for GroupThreadFactory {
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        let ordinal = self.ordinal.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-{}", self.name, ordinal);

        let mut builder = thread::Builder::new().name(thread_name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        debug!("Starting thread {}", thread_name);
        builder.spawn(body)
    }
}

impl fmt::Debug for GroupThreadFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupThreadFactory")
            .field("name", &self.name)
            .field("next_ordinal", &self.ordinal.load(Ordering::Relaxed))
            .field("stack_size", &self.stack_size)
            .finish()
    }
}

impl<F> ThreadFactory for F
where
    F: Fn(ThreadBody) -> io::Result<JoinHandle<()>> + Send + Sync,
{
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        self(body)
    }
}
