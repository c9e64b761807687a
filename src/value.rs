// File: src/value.rs
//
// Runtime values and heap-allocated objects. `Value` is the tagged
// union the VM computes over; `Obj` is the heap header every
// variable-sized object shares, threaded onto a single intrusive
// linked list so the collector can walk every live allocation.
//
// Object references are raw pointers behind the `ObjRef` newtype. The
// garbage collector owns every object it allocates and mutates the
// intrusive list during sweep, which is exactly the case the design
// notes call out for keeping raw pointers instead of a safe handle.

use std::cell::Cell;
use std::fmt;

use crate::bytecode::Chunk;

/// A reference to a heap object. Copy, like a pointer: cloning an
/// `ObjRef` does not clone the object it points to.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(pub(crate) *mut Obj);

impl ObjRef {
    /// # Safety
    /// The pointee must still be alive (not yet swept).
    pub unsafe fn get(&self) -> &Obj {
        &*self.0
    }

    /// # Safety
    /// The pointee must still be alive and not aliased.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut Obj {
        &mut *self.0
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:p})", self.0)
    }
}

pub struct Obj {
    pub marked: Cell<bool>,
    pub next: Cell<*mut Obj>,
    pub kind: ObjKind,
}

pub enum ObjKind {
    Str(ObjString),
    Function(ObjFunction),
}

pub struct ObjString {
    pub bytes: Vec<u8>,
}

impl ObjString {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

pub struct ObjFunction {
    pub arity: u8,
    pub name: Option<ObjRef>, // -> ObjString, None for the synthetic top-level script
    pub chunk: Chunk,
}

impl ObjFunction {
    /// Approximate shallow size, used for `bytes_allocated` bookkeeping.
    pub fn heap_size(&self) -> usize {
        std::mem::size_of::<ObjFunction>()
            + self.chunk.code.len()
            + self.chunk.lines.len() * std::mem::size_of::<usize>()
            + self.chunk.constants.len() * std::mem::size_of::<Value>()
    }
}

/// The runtime's tagged union of first-class values.
#[derive(Clone, Copy)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Obj(ObjRef),
}

impl Value {
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    pub fn as_function(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => match unsafe { &r.get().kind } {
                ObjKind::Function(_) => Some(*r),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Obj(r) => match unsafe { &r.get().kind } {
                ObjKind::Str(s) => Some(&s.bytes),
                _ => None,
            },
            _ => None,
        }
    }

    /// Deep equality: same tag, same value/bytes. Cross-type comparisons
    /// (including cross-kind Obj comparisons) are always false.
    pub fn values_equal(a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Obj(x), Value::Obj(y)) => {
                if x.0 == y.0 {
                    return true;
                }
                let (ox, oy) = unsafe { (x.get(), y.get()) };
                match (&ox.kind, &oy.kind) {
                    (ObjKind::Str(s1), ObjKind::Str(s2)) => {
                        s1.bytes.len() == s2.bytes.len() && s1.bytes == s2.bytes
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Renders a value the way `OP_PRINT` writes it: no quotes on
    /// strings, no type prefixes, functions as `<fn NAME>`/`<script>`.
    pub fn print_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Obj(r) => match unsafe { &r.get().kind } {
                ObjKind::Str(s) => s.as_str().to_string(),
                ObjKind::Function(f) => match f.name {
                    Some(name_ref) => {
                        let name = unsafe { &name_ref.get().kind };
                        match name {
                            ObjKind::Str(s) => format!("<fn {}>", s.as_str()),
                            _ => "<fn ?>".to_string(),
                        }
                    }
                    None => "<script>".to_string(),
                },
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print_string())
    }
}
