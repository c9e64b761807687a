// File: src/heap.rs
//
// Mark-and-sweep garbage collector over the object heap. Non-moving,
// stop-the-world: a collection runs synchronously inline with
// whichever allocation tripped the threshold, and every component
// that can hold references into the heap (the VM, the in-progress
// compiler) implements `GcRoots` so the collector can find them
// without the heap needing to know about either one directly.

use std::cell::{Cell, RefCell};

use crate::value::{Obj, ObjFunction, ObjKind, ObjRef, ObjString, Value};

/// Anything that can hand the collector its live references. The VM
/// and the compiler each implement this over their own state (operand
/// stack, call frames, globals; or the in-progress chunk's constant
/// pool and its enclosing compilers) rather than the heap reaching
/// into either.
pub trait GcRoots {
    fn mark_roots(&self, heap: &Heap);
}

/// Collection runs on every growing allocation rather than only once
/// `next_gc_threshold` is exceeded; set via `DET_GC_STRESS=1`.
fn stress_mode() -> bool {
    std::env::var("DET_GC_STRESS").is_ok()
}

const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

pub struct Heap {
    head: Cell<*mut Obj>,
    bytes_allocated: Cell<usize>,
    next_gc_threshold: Cell<usize>,
    gray_stack: RefCell<Vec<ObjRef>>,
}

impl Default for Heap {
    fn default() -> Self {
        Heap {
            head: Cell::new(std::ptr::null_mut()),
            bytes_allocated: Cell::new(0),
            next_gc_threshold: Cell::new(INITIAL_GC_THRESHOLD),
            gray_stack: RefCell::new(Vec::new()),
        }
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    pub fn alloc_string(&self, bytes: Vec<u8>, roots: &dyn GcRoots) -> ObjRef {
        let size = std::mem::size_of::<Obj>() + bytes.len();
        self.maybe_collect(size, roots);
        self.link(ObjKind::Str(ObjString { bytes }))
    }

    pub fn alloc_function(&self, function: ObjFunction, roots: &dyn GcRoots) -> ObjRef {
        let size = std::mem::size_of::<Obj>() + function.heap_size();
        self.maybe_collect(size, roots);
        self.link(ObjKind::Function(function))
    }

    fn maybe_collect(&self, incoming_size: usize, roots: &dyn GcRoots) {
        self.bytes_allocated.set(self.bytes_allocated.get() + incoming_size);
        if self.bytes_allocated.get() > self.next_gc_threshold.get() || stress_mode() {
            self.collect_garbage(roots);
        }
    }

    fn link(&self, kind: ObjKind) -> ObjRef {
        let obj = Box::new(Obj { marked: Cell::new(false), next: Cell::new(self.head.get()), kind });
        let ptr = Box::into_raw(obj);
        self.head.set(ptr);
        ObjRef(ptr)
    }

    // --- marking ------------------------------------------------------

    pub fn mark_value(&self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&self, r: ObjRef) {
        let obj = unsafe { r.get() };
        if obj.marked.replace(true) {
            return; // already marked; idempotent
        }
        self.gray_stack.borrow_mut().push(r);
    }

    fn trace_references(&self) {
        loop {
            let next = self.gray_stack.borrow_mut().pop();
            let Some(r) = next else { break };
            let obj = unsafe { r.get() };
            match &obj.kind {
                ObjKind::Str(_) => {}
                ObjKind::Function(f) => {
                    if let Some(name) = f.name {
                        self.mark_object(name);
                    }
                    for c in &f.chunk.constants {
                        self.mark_value(*c);
                    }
                }
            }
        }
    }

    // --- sweep ----------------------------------------------------------

    fn sweep(&self) {
        let mut prev: *mut Obj = std::ptr::null_mut();
        let mut current = self.head.get();

        while !current.is_null() {
            let obj = unsafe { &*current };
            let next = obj.next.get();

            if obj.marked.get() {
                obj.marked.set(false);
                prev = current;
            } else {
                if prev.is_null() {
                    self.head.set(next);
                } else {
                    unsafe { (*prev).next.set(next) };
                }
                let freed_size = unsafe { object_size(current) };
                self.bytes_allocated.set(self.bytes_allocated.get().saturating_sub(freed_size));
                drop(unsafe { Box::from_raw(current) });
            }
            current = next;
        }
    }

    /// Runs a full mark-and-sweep cycle. `roots` supplies everything
    /// currently reachable from outside the heap.
    pub fn collect_garbage(&self, roots: &dyn GcRoots) {
        debug_assert!(self.gray_stack.borrow().is_empty());
        roots.mark_roots(self);
        self.trace_references();
        self.sweep();
        self.next_gc_threshold.set(self.bytes_allocated.get() * 2);
    }
}

unsafe fn object_size(ptr: *mut Obj) -> usize {
    let obj = &*ptr;
    std::mem::size_of::<Obj>()
        + match &obj.kind {
            ObjKind::Str(s) => s.bytes.len(),
            ObjKind::Function(f) => f.heap_size(),
        }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let mut current = self.head.get();
        while !current.is_null() {
            let next = unsafe { (*current).next.get() };
            drop(unsafe { Box::from_raw(current) });
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoRoots;
    impl GcRoots for NoRoots {
        fn mark_roots(&self, _heap: &Heap) {}
    }

    struct OneRoot(ObjRef);
    impl GcRoots for OneRoot {
        fn mark_roots(&self, heap: &Heap) {
            heap.mark_object(self.0);
        }
    }

    #[test]
    fn unrooted_string_is_collected() {
        let heap = Heap::new();
        heap.alloc_string(b"hello".to_vec(), &NoRoots);
        let before = heap.bytes_allocated();
        heap.collect_garbage(&NoRoots);
        assert!(heap.bytes_allocated() < before);
        assert!(heap.head.get().is_null());
    }

    #[test]
    fn rooted_string_survives_one_cycle() {
        let heap = Heap::new();
        let s = heap.alloc_string(b"hi".to_vec(), &NoRoots);
        let before = heap.bytes_allocated();
        heap.collect_garbage(&OneRoot(s));
        assert_eq!(heap.bytes_allocated(), before);
        assert!(!heap.head.get().is_null());

        heap.collect_garbage(&NoRoots);
        assert!(heap.head.get().is_null());
    }

    #[test]
    fn survivors_have_mark_bit_cleared_after_cycle() {
        let heap = Heap::new();
        let s = heap.alloc_string(b"x".to_vec(), &NoRoots);
        heap.collect_garbage(&OneRoot(s));
        assert!(!unsafe { s.get() }.marked.get());
    }
}
