use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::Spur;

use crate::bc::Prototype;
use crate::env::Environment;
use crate::interner::{intern, spur_bits, spur_from_bits, strings, with_resolved};
use crate::object::ObjectInner;
use crate::types::Type;

// Compile-time check: the packed-scalar layout reads the low bytes of the
// payload word in place, which assumes little-endian storage, and stores
// raw Rc pointers in a 64-bit payload.
#[cfg(not(target_pointer_width = "64"))]
compile_error!("riposte-core's tagged Value requires a 64-bit platform");
#[cfg(target_endian = "big")]
compile_error!("riposte-core's packed scalars assume a little-endian target");

// ── NA bit patterns ───────────────────────────────────────────────

/// Missing logical: neither 0 (FALSE) nor 1 (TRUE).
pub const NA_LOGICAL: u8 = 0xFF;

/// Missing integer.
pub const NA_INTEGER: i64 = i64::MIN;

/// Missing double: a quiet NaN with payload 1954, distinguishable from the
/// ordinary NaN produced by arithmetic.
pub const NA_REAL_BITS: u64 = 0x7FF8_0000_0000_07A2;

#[inline(always)]
pub fn na_real() -> f64 {
    f64::from_bits(NA_REAL_BITS)
}

#[inline(always)]
pub fn is_na_real(d: f64) -> bool {
    d.to_bits() == NA_REAL_BITS
}

#[inline(always)]
pub fn is_na_character(s: Spur) -> bool {
    s == strings().na
}

// ── Header encoding ───────────────────────────────────────────────

const TAG_MASK: u64 = 0xF;

#[inline(always)]
const fn make_header(tag: Type, length: i64) -> u64 {
    (tag as u64) | ((length as u64) << 4)
}

// ── Heap inner types ──────────────────────────────────────────────

/// A closure: compiled code plus its captured lexical environment.
#[derive(Debug, Clone)]
pub struct FunctionInner {
    pub prototype: Rc<Prototype>,
    /// The captured lexical environment (an Environment-tagged Value).
    pub env: Value,
}

impl FunctionInner {
    /// The thunk form of this closure: same code, same environment, but
    /// forced on first use instead of called.
    pub fn as_promise(&self) -> Value {
        Value::promise_expr(self.prototype.clone(), self.env.clone())
    }
}

/// What a promise evaluates when forced.
#[derive(Debug, Clone)]
pub enum PromiseKind {
    /// General expression promise: run the prototype in the captured env.
    Expression(Rc<Prototype>),
    /// Symbol promise: just look the name up in the captured env.
    Symbol(Spur),
    /// The binding of a formal parameter that received no actual and has
    /// no default. Forcing it is the "argument is missing" error.
    Missing(Spur),
}

/// A deferred computation, memoized on first force.
#[derive(Debug)]
pub struct PromiseInner {
    pub kind: PromiseKind,
    /// The environment to evaluate in (Null for Missing promises).
    pub env: Value,
    pub forced: RefCell<Option<Value>>,
}

/// Stable heap identity of a registered internal function. The value bound
/// in the base environment wraps one of these; the inline-cache guard
/// compares it by pointer identity, and the call protocol dispatches
/// through `index` into the interpreter's registry.
#[derive(Debug)]
pub struct InternalRef {
    pub name: Spur,
    pub index: usize,
    /// Expected parameter count, or -1 for variadic.
    pub params: i64,
}

// ── The tagged value ──────────────────────────────────────────────

/// A 16-byte tagged word: 4-bit type tag, 60-bit length, 64-bit payload.
///
/// The payload holds either an inline scalar (logical byte, i64, f64 bits,
/// interned string id, raw byte) or a raw `Rc` pointer to a heap object.
/// For the fixed-width vector tags, packedness is decided by the length
/// field alone: length 1 is packed, length 0 owns nothing, length > 1
/// points at an `Rc<Vec<Element>>`.
#[repr(C)]
pub struct Value {
    header: u64,
    payload: u64,
}

impl Value {
    pub const NIL: Value = Value {
        header: 0,
        payload: 0,
    };

    // -- Immediate constructors --

    #[inline(always)]
    pub fn nil() -> Value {
        Value::NIL
    }

    #[inline(always)]
    pub fn null() -> Value {
        Value {
            header: make_header(Type::Null, 0),
            payload: 0,
        }
    }

    #[inline(always)]
    pub fn logical(b: bool) -> Value {
        Value::logical_elem(u8::from(b))
    }

    #[inline(always)]
    pub fn logical_elem(e: u8) -> Value {
        Value {
            header: make_header(Type::Logical, 1),
            payload: e as u64,
        }
    }

    #[inline(always)]
    pub fn integer(n: i64) -> Value {
        Value {
            header: make_header(Type::Integer, 1),
            payload: n as u64,
        }
    }

    #[inline(always)]
    pub fn double(d: f64) -> Value {
        Value {
            header: make_header(Type::Double, 1),
            payload: d.to_bits(),
        }
    }

    #[inline(always)]
    pub fn character(s: Spur) -> Value {
        Value {
            header: make_header(Type::Character, 1),
            payload: spur_bits(s) as u64,
        }
    }

    pub fn character_str(s: &str) -> Value {
        Value::character(intern(s))
    }

    #[inline(always)]
    pub fn raw(b: u8) -> Value {
        Value {
            header: make_header(Type::Raw, 1),
            payload: b as u64,
        }
    }

    #[inline(always)]
    pub fn symbol(s: Spur) -> Value {
        // A symbol has the same shape as a 1-element character vector.
        Value {
            header: make_header(Type::Symbol, 1),
            payload: spur_bits(s) as u64,
        }
    }

    pub fn symbol_str(s: &str) -> Value {
        Value::symbol(intern(s))
    }

    // -- Vector constructors --

    fn from_rc<T>(tag: Type, length: i64, rc: Rc<T>) -> Value {
        Value {
            header: make_header(tag, length),
            payload: Rc::into_raw(rc) as u64,
        }
    }

    fn packed_vector(tag: Type, len: usize, scalar: u64) -> Value {
        debug_assert!(len <= 1);
        Value {
            header: make_header(tag, len as i64),
            payload: scalar,
        }
    }

    pub fn logicals(e: Vec<u8>) -> Value {
        match e.len() {
            0 => Value::packed_vector(Type::Logical, 0, 0),
            1 => Value::packed_vector(Type::Logical, 1, e[0] as u64),
            n => Value::from_rc(Type::Logical, n as i64, Rc::new(e)),
        }
    }

    pub fn integers(e: Vec<i64>) -> Value {
        match e.len() {
            0 => Value::packed_vector(Type::Integer, 0, 0),
            1 => Value::packed_vector(Type::Integer, 1, e[0] as u64),
            n => Value::from_rc(Type::Integer, n as i64, Rc::new(e)),
        }
    }

    pub fn doubles(e: Vec<f64>) -> Value {
        match e.len() {
            0 => Value::packed_vector(Type::Double, 0, 0),
            1 => Value::packed_vector(Type::Double, 1, e[0].to_bits()),
            n => Value::from_rc(Type::Double, n as i64, Rc::new(e)),
        }
    }

    pub fn characters(e: Vec<Spur>) -> Value {
        match e.len() {
            0 => Value::packed_vector(Type::Character, 0, 0),
            1 => Value::packed_vector(Type::Character, 1, spur_bits(e[0]) as u64),
            n => Value::from_rc(Type::Character, n as i64, Rc::new(e)),
        }
    }

    pub fn raws(e: Vec<u8>) -> Value {
        match e.len() {
            0 => Value::packed_vector(Type::Raw, 0, 0),
            1 => Value::packed_vector(Type::Raw, 1, e[0] as u64),
            n => Value::from_rc(Type::Raw, n as i64, Rc::new(e)),
        }
    }

    pub fn list(e: Vec<Value>) -> Value {
        if e.is_empty() {
            Value {
                header: make_header(Type::List, 0),
                payload: 0,
            }
        } else {
            let n = e.len() as i64;
            Value::from_rc(Type::List, n, Rc::new(e))
        }
    }

    // -- Heap constructors --

    pub fn function(inner: Rc<FunctionInner>) -> Value {
        Value::from_rc(Type::Function, 0, inner)
    }

    pub fn closure(prototype: Rc<Prototype>, env: Value) -> Value {
        Value::function(Rc::new(FunctionInner { prototype, env }))
    }

    pub fn promise(inner: Rc<PromiseInner>) -> Value {
        Value::from_rc(Type::Promise, 0, inner)
    }

    pub fn promise_expr(prototype: Rc<Prototype>, env: Value) -> Value {
        Value::promise(Rc::new(PromiseInner {
            kind: PromiseKind::Expression(prototype),
            env,
            forced: RefCell::new(None),
        }))
    }

    pub fn promise_symbol(name: Spur, env: Value) -> Value {
        Value::promise(Rc::new(PromiseInner {
            kind: PromiseKind::Symbol(name),
            env,
            forced: RefCell::new(None),
        }))
    }

    pub fn promise_missing(name: Spur) -> Value {
        Value::promise(Rc::new(PromiseInner {
            kind: PromiseKind::Missing(name),
            env: Value::null(),
            forced: RefCell::new(None),
        }))
    }

    pub fn environment(e: Rc<Environment>) -> Value {
        Value::from_rc(Type::Environment, 0, e)
    }

    pub fn object(o: Rc<ObjectInner>) -> Value {
        let n = o.attr_count() as i64;
        Value::from_rc(Type::Object, n, o)
    }

    pub fn code(p: Rc<Prototype>) -> Value {
        Value::from_rc(Type::Code, 0, p)
    }

    pub fn internal(r: Rc<InternalRef>) -> Value {
        Value::from_rc(Type::HeapObject, 0, r)
    }

    // -- Header access --

    #[inline(always)]
    pub fn tag(&self) -> Type {
        // SAFETY: the tag nibble is only ever written from a Type.
        unsafe { std::mem::transmute::<u8, Type>((self.header & TAG_MASK) as u8) }
    }

    #[inline(always)]
    pub fn len(&self) -> i64 {
        (self.header >> 4) as i64
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Predicates --

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.header == 0
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.tag() == Type::Null
    }

    #[inline(always)]
    pub fn is_logical(&self) -> bool {
        self.tag() == Type::Logical
    }

    #[inline(always)]
    pub fn is_integer(&self) -> bool {
        self.tag() == Type::Integer
    }

    #[inline(always)]
    pub fn is_double(&self) -> bool {
        self.tag() == Type::Double
    }

    #[inline(always)]
    pub fn is_character(&self) -> bool {
        self.tag() == Type::Character
    }

    #[inline(always)]
    pub fn is_logical1(&self) -> bool {
        self.header == make_header(Type::Logical, 1)
    }

    #[inline(always)]
    pub fn is_integer1(&self) -> bool {
        self.header == make_header(Type::Integer, 1)
    }

    #[inline(always)]
    pub fn is_double1(&self) -> bool {
        self.header == make_header(Type::Double, 1)
    }

    #[inline(always)]
    pub fn is_character1(&self) -> bool {
        self.header == make_header(Type::Character, 1)
    }

    #[inline(always)]
    pub fn is_list(&self) -> bool {
        self.tag() == Type::List
    }

    #[inline(always)]
    pub fn is_symbol(&self) -> bool {
        self.tag() == Type::Symbol
    }

    #[inline(always)]
    pub fn is_function(&self) -> bool {
        self.tag() == Type::Function
    }

    #[inline(always)]
    pub fn is_promise(&self) -> bool {
        self.tag() == Type::Promise
    }

    #[inline(always)]
    pub fn is_environment(&self) -> bool {
        self.tag() == Type::Environment
    }

    #[inline(always)]
    pub fn is_object(&self) -> bool {
        self.tag() == Type::Object
    }

    #[inline(always)]
    pub fn is_code(&self) -> bool {
        self.tag() == Type::Code
    }

    #[inline(always)]
    pub fn is_internal(&self) -> bool {
        self.tag() == Type::HeapObject
    }

    /// Coercible into arithmetic: logical, integer, or double.
    #[inline(always)]
    pub fn is_math_coerce(&self) -> bool {
        matches!(self.tag(), Type::Logical | Type::Integer | Type::Double)
    }

    #[inline(always)]
    pub fn is_vector(&self) -> bool {
        matches!(
            self.tag(),
            Type::Null
                | Type::Logical
                | Type::Integer
                | Type::Double
                | Type::Character
                | Type::Raw
                | Type::List
        )
    }

    /// Whether this value is a parsed call (an Object with class "Call").
    pub fn is_call(&self) -> bool {
        self.class_of() == Some(strings().call)
    }

    /// Whether this value is a parsed expression sequence.
    pub fn is_expression(&self) -> bool {
        self.class_of() == Some(strings().expression)
    }

    /// Symbols, calls, and expression sequences need compilation; all other
    /// values are constants.
    pub fn is_language(&self) -> bool {
        self.is_symbol() || self.is_call() || self.is_expression()
    }

    // -- Raw borrows --

    #[inline(always)]
    unsafe fn borrow_ref<T>(&self) -> &T {
        &*(self.payload as *const T)
    }

    #[inline(always)]
    unsafe fn get_rc<T>(&self) -> Rc<T> {
        let ptr = self.payload as *const T;
        Rc::increment_strong_count(ptr);
        Rc::from_raw(ptr)
    }

    /// Slice view of a packable vector: length-1 values read the payload
    /// word in place, longer ones borrow the heap buffer.
    ///
    /// SAFETY: caller must ensure the tag's element type is T.
    unsafe fn slice_of<T>(&self) -> &[T] {
        match self.len() {
            0 => &[],
            1 => std::slice::from_raw_parts(&self.payload as *const u64 as *const T, 1),
            _ => self.borrow_ref::<Vec<T>>().as_slice(),
        }
    }

    // -- Vector element access --

    pub fn logicals_ref(&self) -> Option<&[u8]> {
        if self.tag() == Type::Logical {
            Some(unsafe { self.slice_of::<u8>() })
        } else {
            None
        }
    }

    pub fn integers_ref(&self) -> Option<&[i64]> {
        if self.tag() == Type::Integer {
            Some(unsafe { self.slice_of::<i64>() })
        } else {
            None
        }
    }

    pub fn doubles_ref(&self) -> Option<&[f64]> {
        if self.tag() == Type::Double {
            Some(unsafe { self.slice_of::<f64>() })
        } else {
            None
        }
    }

    pub fn characters_ref(&self) -> Option<&[Spur]> {
        if self.tag() == Type::Character {
            Some(unsafe { self.slice_of::<Spur>() })
        } else {
            None
        }
    }

    pub fn raws_ref(&self) -> Option<&[u8]> {
        if self.tag() == Type::Raw {
            Some(unsafe { self.slice_of::<u8>() })
        } else {
            None
        }
    }

    pub fn list_ref(&self) -> Option<&[Value]> {
        if self.tag() != Type::List {
            return None;
        }
        if self.len() == 0 {
            Some(&[])
        } else {
            Some(unsafe { self.borrow_ref::<Vec<Value>>().as_slice() })
        }
    }

    // -- Scalar access --

    pub fn as_logical(&self) -> Option<u8> {
        if self.is_logical1() {
            Some(self.payload as u8)
        } else {
            None
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if self.is_integer1() {
            Some(self.payload as i64)
        } else {
            None
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        if self.is_double1() {
            Some(f64::from_bits(self.payload))
        } else {
            None
        }
    }

    pub fn as_character(&self) -> Option<Spur> {
        if self.is_character1() {
            Some(spur_from_bits(self.payload as u32))
        } else {
            None
        }
    }

    pub fn as_symbol(&self) -> Option<Spur> {
        if self.is_symbol() {
            Some(spur_from_bits(self.payload as u32))
        } else {
            None
        }
    }

    // -- Heap access --

    pub fn as_function(&self) -> Option<&FunctionInner> {
        if self.is_function() {
            Some(unsafe { self.borrow_ref::<FunctionInner>() })
        } else {
            None
        }
    }

    pub fn as_function_rc(&self) -> Option<Rc<FunctionInner>> {
        if self.is_function() {
            Some(unsafe { self.get_rc::<FunctionInner>() })
        } else {
            None
        }
    }

    pub fn as_promise(&self) -> Option<&PromiseInner> {
        if self.is_promise() {
            Some(unsafe { self.borrow_ref::<PromiseInner>() })
        } else {
            None
        }
    }

    pub fn as_promise_rc(&self) -> Option<Rc<PromiseInner>> {
        if self.is_promise() {
            Some(unsafe { self.get_rc::<PromiseInner>() })
        } else {
            None
        }
    }

    pub fn as_environment(&self) -> Option<&Environment> {
        if self.is_environment() {
            Some(unsafe { self.borrow_ref::<Environment>() })
        } else {
            None
        }
    }

    pub fn as_environment_rc(&self) -> Option<Rc<Environment>> {
        if self.is_environment() {
            Some(unsafe { self.get_rc::<Environment>() })
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&ObjectInner> {
        if self.is_object() {
            Some(unsafe { self.borrow_ref::<ObjectInner>() })
        } else {
            None
        }
    }

    pub fn as_object_rc(&self) -> Option<Rc<ObjectInner>> {
        if self.is_object() {
            Some(unsafe { self.get_rc::<ObjectInner>() })
        } else {
            None
        }
    }

    pub fn as_code(&self) -> Option<&Prototype> {
        if self.is_code() {
            Some(unsafe { self.borrow_ref::<Prototype>() })
        } else {
            None
        }
    }

    pub fn as_code_rc(&self) -> Option<Rc<Prototype>> {
        if self.is_code() {
            Some(unsafe { self.get_rc::<Prototype>() })
        } else {
            None
        }
    }

    pub fn as_internal(&self) -> Option<&InternalRef> {
        if self.is_internal() {
            Some(unsafe { self.borrow_ref::<InternalRef>() })
        } else {
            None
        }
    }

    pub fn as_internal_rc(&self) -> Option<Rc<InternalRef>> {
        if self.is_internal() {
            Some(unsafe { self.get_rc::<InternalRef>() })
        } else {
            None
        }
    }

    // -- Attribute / object helpers (see object.rs for the map itself) --

    /// The class attribute's first element, if any.
    pub fn class_of(&self) -> Option<Spur> {
        let obj = self.as_object()?;
        let class = obj.get_attribute(strings().class)?;
        class.characters_ref().and_then(|s| s.first().copied())
    }

    /// Unwrap an Object to its base; other values pass through.
    pub fn stripped(&self) -> Value {
        match self.as_object() {
            Some(obj) => obj.base().clone(),
            None => self.clone(),
        }
    }

    // -- First-element coercions (the numeric tower, scalar position) --

    pub fn as_double1(&self) -> Option<f64> {
        match self.tag() {
            Type::Double => self.doubles_ref().and_then(|s| s.first().copied()),
            Type::Integer => self.integers_ref().and_then(|s| s.first().copied()).map(|i| {
                if i == NA_INTEGER {
                    na_real()
                } else {
                    i as f64
                }
            }),
            Type::Logical => self.logicals_ref().and_then(|s| s.first().copied()).map(|b| {
                if b == NA_LOGICAL {
                    na_real()
                } else {
                    b as f64
                }
            }),
            Type::Object => self.as_object().unwrap().base().as_double1(),
            _ => None,
        }
    }

    pub fn as_integer1(&self) -> Option<i64> {
        match self.tag() {
            Type::Integer => self.integers_ref().and_then(|s| s.first().copied()),
            Type::Double => self.doubles_ref().and_then(|s| s.first().copied()).map(|d| {
                if is_na_real(d) || d.is_nan() {
                    NA_INTEGER
                } else {
                    d as i64
                }
            }),
            Type::Logical => self.logicals_ref().and_then(|s| s.first().copied()).map(|b| {
                if b == NA_LOGICAL {
                    NA_INTEGER
                } else {
                    b as i64
                }
            }),
            Type::Object => self.as_object().unwrap().base().as_integer1(),
            _ => None,
        }
    }

    pub fn as_logical1(&self) -> Option<u8> {
        match self.tag() {
            Type::Logical => self.logicals_ref().and_then(|s| s.first().copied()),
            Type::Integer => self.integers_ref().and_then(|s| s.first().copied()).map(|i| {
                if i == NA_INTEGER {
                    NA_LOGICAL
                } else {
                    u8::from(i != 0)
                }
            }),
            Type::Double => self.doubles_ref().and_then(|s| s.first().copied()).map(|d| {
                if is_na_real(d) || d.is_nan() {
                    NA_LOGICAL
                } else {
                    u8::from(d != 0.0)
                }
            }),
            Type::Object => self.as_object().unwrap().base().as_logical1(),
            _ => None,
        }
    }
}

// ── Clone / Drop (manual refcounting over the tag) ────────────────

impl Clone for Value {
    fn clone(&self) -> Self {
        unsafe {
            let ptr = self.payload as *const u8;
            match self.tag() {
                Type::Nil | Type::Null | Type::Symbol => {}
                Type::Logical | Type::Raw => {
                    if self.len() > 1 {
                        Rc::increment_strong_count(ptr as *const Vec<u8>);
                    }
                }
                Type::Integer => {
                    if self.len() > 1 {
                        Rc::increment_strong_count(ptr as *const Vec<i64>);
                    }
                }
                Type::Double => {
                    if self.len() > 1 {
                        Rc::increment_strong_count(ptr as *const Vec<f64>);
                    }
                }
                Type::Character => {
                    if self.len() > 1 {
                        Rc::increment_strong_count(ptr as *const Vec<Spur>);
                    }
                }
                Type::List => {
                    if self.len() > 0 {
                        Rc::increment_strong_count(ptr as *const Vec<Value>);
                    }
                }
                Type::Function => Rc::increment_strong_count(ptr as *const FunctionInner),
                Type::Promise => Rc::increment_strong_count(ptr as *const PromiseInner),
                Type::Environment => Rc::increment_strong_count(ptr as *const Environment),
                Type::Object => Rc::increment_strong_count(ptr as *const ObjectInner),
                Type::Code => Rc::increment_strong_count(ptr as *const Prototype),
                Type::HeapObject => Rc::increment_strong_count(ptr as *const InternalRef),
            }
        }
        Value {
            header: self.header,
            payload: self.payload,
        }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        unsafe {
            let ptr = self.payload as *const u8;
            match self.tag() {
                Type::Nil | Type::Null | Type::Symbol => {}
                Type::Logical | Type::Raw => {
                    if self.len() > 1 {
                        drop(Rc::from_raw(ptr as *const Vec<u8>));
                    }
                }
                Type::Integer => {
                    if self.len() > 1 {
                        drop(Rc::from_raw(ptr as *const Vec<i64>));
                    }
                }
                Type::Double => {
                    if self.len() > 1 {
                        drop(Rc::from_raw(ptr as *const Vec<f64>));
                    }
                }
                Type::Character => {
                    if self.len() > 1 {
                        drop(Rc::from_raw(ptr as *const Vec<Spur>));
                    }
                }
                Type::List => {
                    if self.len() > 0 {
                        drop(Rc::from_raw(ptr as *const Vec<Value>));
                    }
                }
                Type::Function => drop(Rc::from_raw(ptr as *const FunctionInner)),
                Type::Promise => drop(Rc::from_raw(ptr as *const PromiseInner)),
                Type::Environment => drop(Rc::from_raw(ptr as *const Environment)),
                Type::Object => drop(Rc::from_raw(ptr as *const ObjectInner)),
                Type::Code => drop(Rc::from_raw(ptr as *const Prototype)),
                Type::HeapObject => drop(Rc::from_raw(ptr as *const InternalRef)),
            }
        }
    }
}

// ── Equality (shallow: header and payload bits identical) ─────────

impl PartialEq for Value {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload == other.payload
    }
}

impl Eq for Value {}

// ── Display / Debug ───────────────────────────────────────────────

fn fmt_logical(e: u8) -> &'static str {
    match e {
        0 => "FALSE",
        NA_LOGICAL => "NA",
        _ => "TRUE",
    }
}

fn fmt_double(d: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if is_na_real(d) {
        write!(f, "NA")
    } else if d.is_nan() {
        write!(f, "NaN")
    } else if d == f64::INFINITY {
        write!(f, "Inf")
    } else if d == f64::NEG_INFINITY {
        write!(f, "-Inf")
    } else {
        write!(f, "{d}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Type::Nil => write!(f, "nil"),
            Type::Null => write!(f, "NULL"),
            Type::Logical => {
                let s = self.logicals_ref().unwrap();
                if s.len() == 1 {
                    write!(f, "{}", fmt_logical(s[0]))
                } else {
                    write!(f, "c(")?;
                    for (i, e) in s.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", fmt_logical(*e))?;
                    }
                    write!(f, ")")
                }
            }
            Type::Integer => {
                let s = self.integers_ref().unwrap();
                if s.len() == 1 {
                    if s[0] == NA_INTEGER {
                        write!(f, "NA")
                    } else {
                        write!(f, "{}L", s[0])
                    }
                } else {
                    write!(f, "c(")?;
                    for (i, e) in s.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        if *e == NA_INTEGER {
                            write!(f, "NA")?;
                        } else {
                            write!(f, "{e}L")?;
                        }
                    }
                    write!(f, ")")
                }
            }
            Type::Double => {
                let s = self.doubles_ref().unwrap();
                if s.len() == 1 {
                    fmt_double(s[0], f)
                } else {
                    write!(f, "c(")?;
                    for (i, e) in s.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        fmt_double(*e, f)?;
                    }
                    write!(f, ")")
                }
            }
            Type::Character => {
                let s = self.characters_ref().unwrap();
                if s.len() == 1 {
                    if is_na_character(s[0]) {
                        write!(f, "NA")
                    } else {
                        with_resolved(s[0], |name| write!(f, "\"{name}\""))
                    }
                } else {
                    write!(f, "c(")?;
                    for (i, e) in s.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        if is_na_character(*e) {
                            write!(f, "NA")?;
                        } else {
                            with_resolved(*e, |name| write!(f, "\"{name}\""))?;
                        }
                    }
                    write!(f, ")")
                }
            }
            Type::Raw => {
                let s = self.raws_ref().unwrap();
                for (i, e) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{e:02x}")?;
                }
                Ok(())
            }
            Type::List => {
                let s = self.list_ref().unwrap();
                write!(f, "list(")?;
                for (i, e) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Type::Symbol => with_resolved(self.as_symbol().unwrap(), |name| write!(f, "{name}")),
            Type::Function => write!(f, "<closure>"),
            Type::Promise => {
                let p = self.as_promise().unwrap();
                if p.forced.borrow().is_some() {
                    write!(f, "<promise (forced)>")
                } else {
                    write!(f, "<promise>")
                }
            }
            Type::Environment => write!(f, "<environment>"),
            Type::Object => {
                let obj = self.as_object().unwrap();
                match self.class_of() {
                    Some(c) => with_resolved(c, |name| write!(f, "<{name}>")),
                    None => write!(f, "{}", obj.base()),
                }
            }
            Type::Code => write!(f, "<bytecode>"),
            Type::HeapObject => match self.as_internal() {
                Some(i) => with_resolved(i.name, |name| write!(f, "<builtin {name}>")),
                None => write!(f, "<heap object>"),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]({})", self.tag().name(), self.len(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_value() {
        assert_eq!(std::mem::size_of::<Value>(), 16);
    }

    #[test]
    fn test_nil_is_all_zero() {
        let v = Value::nil();
        assert!(v.is_nil());
        assert_eq!(v.tag(), Type::Nil);
        assert_eq!(v.len(), 0);
    }

    #[test]
    fn test_packed_scalars() {
        assert_eq!(Value::integer(42).as_integer(), Some(42));
        assert_eq!(Value::integer(-7).as_integer(), Some(-7));
        assert_eq!(Value::double(1.5).as_double(), Some(1.5));
        assert_eq!(Value::logical(true).as_logical(), Some(1));
        assert_eq!(Value::logical(false).as_logical(), Some(0));
        let s = intern("hi");
        assert_eq!(Value::character(s).as_character(), Some(s));
    }

    #[test]
    fn test_scalar_vectors_are_packed() {
        // Length 1 of a packable tag must never heap-allocate: the length
        // field alone decides packedness.
        let v = Value::doubles(vec![2.5]);
        assert_eq!(v.len(), 1);
        assert_eq!(v.as_double(), Some(2.5));
        assert_eq!(v, Value::double(2.5));
    }

    #[test]
    fn test_heap_vector_access() {
        let v = Value::integers(vec![1, 2, 3]);
        assert_eq!(v.len(), 3);
        assert_eq!(v.integers_ref(), Some(&[1i64, 2, 3][..]));
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn test_empty_vectors_own_nothing() {
        let v = Value::doubles(vec![]);
        assert_eq!(v.len(), 0);
        assert_eq!(v.doubles_ref(), Some(&[][..]));
        let l = Value::list(vec![]);
        assert_eq!(l.list_ref(), Some(&[][..]));
    }

    #[test]
    fn test_element_types_are_stable() {
        // No tag confusion between packed and heap storage.
        for v in [
            Value::doubles(vec![1.0]),
            Value::doubles(vec![1.0, 2.0]),
            Value::doubles(vec![]),
        ] {
            let s = v.doubles_ref().unwrap();
            assert_eq!(s.len() as i64, v.len());
        }
    }

    #[test]
    fn test_clone_heap_vector() {
        let v = Value::doubles(vec![1.0, 2.0, 3.0, 4.0]);
        let w = v.clone();
        assert_eq!(v, w); // shallow equality: same buffer
        assert_eq!(w.doubles_ref().unwrap()[3], 4.0);
    }

    #[test]
    fn test_shallow_equality() {
        assert_eq!(Value::integer(1), Value::integer(1));
        assert_ne!(Value::integer(1), Value::double(1.0));
        // Two separately-built heap vectors are unequal even with the same
        // contents: equality is shallow by contract.
        let a = Value::integers(vec![1, 2]);
        let b = Value::integers(vec![1, 2]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_na_patterns() {
        assert!(is_na_real(na_real()));
        assert!(!is_na_real(f64::NAN));
        assert!(na_real().is_nan());
        assert_eq!(Value::integer(NA_INTEGER).as_integer(), Some(NA_INTEGER));
    }

    #[test]
    fn test_symbol_shape() {
        let v = Value::symbol_str("x");
        assert!(v.is_symbol());
        assert_eq!(v.len(), 1);
        assert_eq!(v.as_symbol(), Some(intern("x")));
    }

    #[test]
    fn test_list_recursion_drops() {
        for _ in 0..1000 {
            let _ = Value::list(vec![
                Value::integers(vec![1, 2, 3]),
                Value::list(vec![Value::character_str("deep")]),
            ]);
        }
    }

    #[test]
    fn test_coercion_tower_first_element() {
        assert_eq!(Value::logical(true).as_double1(), Some(1.0));
        assert_eq!(Value::integer(3).as_double1(), Some(3.0));
        assert_eq!(Value::double(2.5).as_integer1(), Some(2));
        assert_eq!(Value::integer(0).as_logical1(), Some(0));
        assert_eq!(Value::double(2.0).as_logical1(), Some(1));
        assert!(is_na_real(Value::integer(NA_INTEGER).as_double1().unwrap()));
        assert_eq!(Value::character_str("no").as_double1(), None);
    }

    #[test]
    fn test_closure_as_promise_thunk() {
        let proto = Rc::new(crate::bc::Prototype::new(
            Value::double(1.0),
            vec![],
            vec![],
            -1,
            1,
            vec![],
            vec![],
        ));
        let f = Value::closure(proto.clone(), Value::null());
        let thunk = f.as_function().unwrap().as_promise();
        assert!(thunk.is_promise());
        match &thunk.as_promise().unwrap().kind {
            PromiseKind::Expression(p) => assert!(Rc::ptr_eq(p, &proto)),
            other => panic!("unexpected promise kind {other:?}"),
        }
    }

    #[test]
    fn test_promise_forms() {
        let env = Value::null();
        let p = Value::promise_symbol(intern("x"), env);
        assert!(p.is_promise());
        assert!(matches!(
            p.as_promise().unwrap().kind,
            PromiseKind::Symbol(_)
        ));
        let m = Value::promise_missing(intern("a"));
        assert!(matches!(
            m.as_promise().unwrap().kind,
            PromiseKind::Missing(_)
        ));
    }
}
