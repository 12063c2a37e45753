//! Per-thread work lists that flatten chains of futures.
//!
//! Completing a future runs its continuations, which may complete derived
//! futures, which run their own continuations, and so on. Likewise dropping a
//! pending future drops its continuations, which may hold the last handle to
//! a derived future. Both would recurse once per link. Instead, the outermost
//! call on a thread drains a queue and nested calls only enqueue.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::thread::LocalKey;

pub(crate) type Continuation = Box<dyn FnOnce()>;

thread_local! {
    static CONTINUATIONS: Trampoline<Continuation> = Trampoline::new();
    static GARBAGE: Trampoline<Box<dyn Any>> = Trampoline::new();
}

/// Runs the continuation batch now, or after the batch currently running on
/// this thread returns.
pub(crate) fn dispatch(job: Continuation) {
    drain(&CONTINUATIONS, job, |job| job());
}

/// Drops `garbage` without nesting the drops of anything it owns.
pub(crate) fn release(garbage: Box<dyn Any>) {
    drain(&GARBAGE, garbage, drop);
}

struct Trampoline<J> {
    pending: RefCell<Option<VecDeque<J>>>,
}

impl<J> Trampoline<J> {
    fn new() -> Trampoline<J> {
        Trampoline {
            pending: RefCell::new(None),
        }
    }

    // Hands the item back if nobody on this thread is draining yet, in which
    // case the caller becomes the drainer.
    fn enter(&self, item: J) -> Option<J> {
        let mut pending = self.pending.borrow_mut();

        if let Some(queue) = pending.as_mut() {
            queue.push_back(item);
            return None;
        }

        *pending = Some(VecDeque::new());
        Some(item)
    }

    fn next(&self) -> Option<J> {
        self.pending.borrow_mut().as_mut().and_then(|queue| queue.pop_front())
    }

    fn exit(&self) -> Option<VecDeque<J>> {
        self.pending.borrow_mut().take()
    }
}

struct Draining<J: 'static> {
    key: &'static LocalKey<Trampoline<J>>,
}

impl<J: 'static> Drop for Draining<J> {
    fn drop(&mut self) {
        // Only non-empty if `run` panicked
        let rest = self.key.try_with(|trampoline| trampoline.exit()).ok().flatten();
        drop(rest);
    }
}

fn drain<J: 'static>(key: &'static LocalKey<Trampoline<J>>, item: J, run: fn(J)) {
    let mut slot = Some(item);
    let entered = key.try_with(|trampoline| slot.take().and_then(|item| trampoline.enter(item)));

    let mut item = match (entered, slot) {
        (Ok(Some(item)), _) => item,
        (Ok(None), _) => return,
        // The thread is tearing down its locals, run in place
        (Err(_), Some(item)) => return run(item),
        (Err(_), None) => return,
    };

    let _draining = Draining { key };

    loop {
        run(item);

        item = match key.try_with(|trampoline| trampoline.next()) {
            Ok(Some(next)) => next,
            _ => break,
        };
    }
}
