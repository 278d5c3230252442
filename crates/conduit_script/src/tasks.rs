// tasks.rs - Session-owned continuation queue
//
// Scripts push continuations through the hook global; the session drains
// them after each top-level execution. Each entry owns one engine
// reference until it is popped.

use rquickjs::{Function, Persistent};
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: RefCell<VecDeque<Persistent<Function<'static>>>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: Persistent<Function<'static>>) {
        self.tasks.borrow_mut().push_back(task);
    }

    /// Oldest task first.
    pub(crate) fn pop(&self) -> Option<Persistent<Function<'static>>> {
        self.tasks.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Release every queued reference without running anything.
    pub(crate) fn clear(&self) {
        if self.is_empty() {
            return;
        }
        let dropped = std::mem::take(&mut *self.tasks.borrow_mut());
        tracing::debug!(count = dropped.len(), "discarding queued tasks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let rt = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&rt).unwrap();
        let queue = TaskQueue::new();

        context.with(|ctx| {
            for n in 1..=3 {
                let task: Function = ctx.eval(format!("(() => {n})")).unwrap();
                queue.push(Persistent::save(&ctx, task));
            }
        });
        assert_eq!(queue.len(), 3);

        context.with(|ctx| {
            let mut seen = Vec::new();
            while let Some(task) = queue.pop() {
                let task = task.restore(&ctx).unwrap();
                seen.push(task.call::<_, i32>(()).unwrap());
            }
            assert_eq!(seen, vec![1, 2, 3]);
        });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_releases_entries() {
        let rt = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&rt).unwrap();
        let queue = TaskQueue::new();

        context.with(|ctx| {
            let task: Function = ctx.eval("(() => 0)").unwrap();
            queue.push(Persistent::save(&ctx, task));
        });
        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
