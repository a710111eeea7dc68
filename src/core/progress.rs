//! Step counters and list logging for long-running queues

use std::fmt;

/// `[current/total]` counter prefixed to queue log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    current: usize,
    total: usize,
}

impl Progress {
    /// Start a counter for `total` steps
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    /// Move to the next step, never past `total`
    pub fn advance(&mut self) {
        if self.current < self.total {
            self.current += 1;
        }
    }

    /// Current step
    pub fn current(&self) -> usize {
        self.current
    }

    /// Total steps
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.current, self.total)
    }
}

/// Log each item as a tree leaf
pub fn print_list_tree<T: fmt::Display>(items: &[T]) {
    for item in items {
        tracing::info!("└─ {item}");
    }
}

/// Log each item as a tree leaf at warning level
pub fn warn_list_tree<T: fmt::Display>(items: &[T]) {
    for item in items {
        tracing::warn!("└─ {item}");
    }
}
