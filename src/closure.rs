// cglib-winsys/src/closure.rs
//
//! Ordered lists of application callbacks.
//!
//! Dropping a registered callback is the destroy notification: anything the closure owns is
//! released when it is removed or when its list goes away.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identifies a callback registered on an onscreen, for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClosureHandle(u64);

struct ClosureEntry<F: ?Sized> {
    handle: ClosureHandle,
    removed: Cell<bool>,
    callback: RefCell<Box<F>>,
}

pub(crate) struct ClosureList<F: ?Sized> {
    entries: RefCell<Vec<Rc<ClosureEntry<F>>>>,
    next_handle: Cell<u64>,
}

impl<F: ?Sized> ClosureList<F> {
    pub(crate) fn new() -> ClosureList<F> {
        ClosureList { entries: RefCell::new(vec![]), next_handle: Cell::new(1) }
    }

    pub(crate) fn add(&self, callback: Box<F>) -> ClosureHandle {
        let handle = ClosureHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.entries.borrow_mut().push(Rc::new(ClosureEntry {
            handle,
            removed: Cell::new(false),
            callback: RefCell::new(callback),
        }));
        handle
    }

    /// Returns false if the handle wasn't registered on this list.
    pub(crate) fn remove(&self, handle: ClosureHandle) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|entry| entry.handle == handle) {
            Some(index) => {
                // An invocation in progress may still hold the entry; it must skip it.
                entries.remove(index).removed.set(true);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        let entries = self.entries.replace(vec![]);
        for entry in &entries {
            entry.removed.set(true);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Calls every registered callback in registration order.
    ///
    /// Callbacks may add or remove callbacks on the same list. Callbacks added during the
    /// invocation are not called until the next one, and a callback that is already running is
    /// never re-entered.
    pub(crate) fn invoke<C>(&self, mut call: C) where C: FnMut(&mut F) {
        let snapshot: Vec<_> = self.entries.borrow().clone();
        for entry in snapshot {
            if entry.removed.get() {
                continue;
            }
            if let Ok(mut callback) = entry.callback.try_borrow_mut() {
                call(&mut **callback);
            }
        }
    }
}
