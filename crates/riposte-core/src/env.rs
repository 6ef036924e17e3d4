use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use lasso::Spur;

use crate::error::RiposteError;
use crate::interner::{resolve, spur_bits, strings};
use crate::value::Value;

// One monotonic revision sequence per interpreter thread; every
// environment draws from it. Bumped on every delete and every rehash so
// that outstanding Pointers can detect slot movement.
thread_local! {
    static GLOBAL_REVISION: Cell<u64> = const { Cell::new(0) };
}

fn next_revision() -> u64 {
    GLOBAL_REVISION.with(|r| {
        let n = r.get() + 1;
        r.set(n);
        n
    })
}

pub const DEFAULT_ENV_SIZE: usize = 8;

#[derive(Clone)]
struct Slot {
    name: Spur,
    value: Value,
}

/// A lexical environment: an open-addressed table of (name, value) pairs
/// with a lexical parent link, a dynamic (caller) link, the reifying call,
/// and the names of the variadic arguments.
///
/// Invariant: a slot's name equals the reserved NA id iff the slot is
/// empty, and `load * 2 <= capacity` (restored by doubling).
pub struct Environment {
    slots: RefCell<Vec<Slot>>,
    load: Cell<usize>,
    revision: Cell<u64>,
    lexical: RefCell<Value>,
    dynamic: RefCell<Value>,
    call: RefCell<Value>,
    dots: RefCell<Vec<Spur>>,
}

/// A fast cursor into an environment binding, validated by revision
/// equality on dereference.
#[derive(Clone)]
pub struct Pointer {
    pub env: Value,
    pub name: Spur,
    pub revision: u64,
    pub index: usize,
}

impl Environment {
    pub fn new(lexical: Value, dynamic: Value, call: Value) -> Rc<Environment> {
        let empty = Slot {
            name: strings().na,
            value: Value::nil(),
        };
        Rc::new(Environment {
            slots: RefCell::new(vec![empty; DEFAULT_ENV_SIZE]),
            load: Cell::new(0),
            revision: Cell::new(next_revision()),
            lexical: RefCell::new(lexical),
            dynamic: RefCell::new(dynamic),
            call: RefCell::new(call),
            dots: RefCell::new(Vec::new()),
        })
    }

    pub fn to_value(self: &Rc<Self>) -> Value {
        Value::environment(self.clone())
    }

    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub fn load(&self) -> usize {
        self.load.get()
    }

    pub fn capacity(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn lexical(&self) -> Value {
        self.lexical.borrow().clone()
    }

    pub fn set_lexical(&self, env: Value) {
        *self.lexical.borrow_mut() = env;
    }

    pub fn dynamic(&self) -> Value {
        self.dynamic.borrow().clone()
    }

    pub fn call(&self) -> Value {
        self.call.borrow().clone()
    }

    pub fn dots(&self) -> Ref<'_, Vec<Spur>> {
        self.dots.borrow()
    }

    pub fn set_dots(&self, names: Vec<Spur>) {
        *self.dots.borrow_mut() = names;
    }

    // Linear probing with the interned id as the hash. Returns the location
    // of `name`, or the location at which it should be inserted.
    fn find(slots: &[Slot], name: Spur) -> usize {
        let na = strings().na;
        let mask = slots.len() - 1;
        let mut i = spur_bits(name) as usize & mask;
        while slots[i].name != name && slots[i].name != na {
            i = (i + 1) & mask;
        }
        i
    }

    /// Read the local slot for `name` without touching the parent chain.
    /// Returns Nil when unbound here. Promises come back unforced.
    pub fn get_raw(&self, name: Spur) -> Value {
        let slots = self.slots.borrow();
        let i = Self::find(&slots, name);
        if slots[i].name != strings().na {
            slots[i].value.clone()
        } else {
            Value::nil()
        }
    }

    /// Look `name` up through the lexical parent chain. Returns Nil when
    /// the chain ends without a binding. Promises come back unforced; the
    /// forcing lookup lives on the interpreter.
    pub fn get(&self, name: Spur) -> Value {
        let local = self.get_raw(name);
        if !local.is_nil() {
            return local;
        }
        let parent = self.lexical.borrow();
        match parent.as_environment() {
            Some(env) => env.get(name),
            None => Value::nil(),
        }
    }

    /// Bind `name` to `value` in this environment; a Nil value deletes the
    /// binding. Returns the slot index the binding landed in.
    pub fn assign(&self, name: Spur, value: Value) -> usize {
        let na = strings().na;
        if value.is_nil() {
            let mut slots = self.slots.borrow_mut();
            let i = Self::find(&slots, name);
            if slots[i].name != na {
                self.load.set(self.load.get() - 1);
                slots[i] = Slot {
                    name: na,
                    value: Value::nil(),
                };
                // Deleting a value changes the revision number.
                self.revision.set(next_revision());
            }
            return i;
        }

        let mut i = {
            let slots = self.slots.borrow();
            Self::find(&slots, name)
        };
        let occupied = self.slots.borrow()[i].name != na;
        if !occupied {
            self.load.set(self.load.get() + 1);
            if self.load.get() * 2 > self.capacity() {
                self.rehash(self.capacity() * 2);
                let slots = self.slots.borrow();
                i = Self::find(&slots, name);
            }
            self.slots.borrow_mut()[i] = Slot { name, value };
        } else {
            self.slots.borrow_mut()[i].value = value;
        }
        i
    }

    fn rehash(&self, new_size: usize) {
        let na = strings().na;
        let size = new_size.next_power_of_two();
        if size <= self.capacity() {
            return;
        }
        let old = std::mem::replace(
            &mut *self.slots.borrow_mut(),
            vec![
                Slot {
                    name: na,
                    value: Value::nil(),
                };
                size
            ],
        );
        {
            let mut slots = self.slots.borrow_mut();
            for slot in old {
                if slot.name != na {
                    let i = Self::find(&slots, slot.name);
                    slots[i] = slot;
                }
            }
        }
        // Growth moves slots, so outstanding pointers must fall back.
        self.revision.set(next_revision());
    }

    /// All bound names, in table order.
    pub fn bound_names(&self) -> Vec<Spur> {
        let na = strings().na;
        self.slots
            .borrow()
            .iter()
            .filter(|s| s.name != na)
            .map(|s| s.name)
            .collect()
    }

    fn slot_value(&self, index: usize) -> Value {
        self.slots.borrow()[index].value.clone()
    }

    fn set_slot_value(&self, index: usize, value: Value) {
        self.slots.borrow_mut()[index].value = value;
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<environment load={} capacity={} revision={}>",
            self.load(),
            self.capacity(),
            self.revision()
        )
    }
}

impl Environment {
    /// Build a fast-access cursor for an existing binding.
    pub fn make_pointer(env_value: &Value, name: Spur) -> Result<Pointer, RiposteError> {
        let env = env_value.as_environment().ok_or_else(|| {
            RiposteError::type_error("environment", env_value.tag().name())
        })?;
        let slots = env.slots.borrow();
        let i = Environment::find(&slots, name);
        if slots[i].name == strings().na {
            return Err(RiposteError::runtime(format!(
                "making pointer to non-existent variable '{}'",
                resolve(name)
            )));
        }
        Ok(Pointer {
            env: env_value.clone(),
            name,
            revision: env.revision(),
            index: i,
        })
    }

    /// Dereference: the direct slot when the revision still matches, the
    /// full lookup otherwise.
    pub fn deref_pointer(p: &Pointer) -> Value {
        let env = p.env.as_environment().expect("pointer envs are environments");
        if env.revision() == p.revision {
            env.slot_value(p.index)
        } else {
            env.get(p.name)
        }
    }

    /// Assign through a pointer, with the same revision-checked fast path.
    pub fn assign_pointer(p: &Pointer, value: Value) {
        let env = p.env.as_environment().expect("pointer envs are environments");
        if env.revision() == p.revision {
            env.set_slot_value(p.index, value);
        } else {
            env.assign(p.name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::intern;

    fn empty_env() -> Rc<Environment> {
        Environment::new(Value::null(), Value::null(), Value::null())
    }

    #[test]
    fn test_assign_get() {
        let env = empty_env();
        env.assign(intern("x"), Value::integer(1));
        assert_eq!(env.get(intern("x")), Value::integer(1));
        assert!(env.get(intern("y")).is_nil());
    }

    #[test]
    fn test_reassign_keeps_load() {
        let env = empty_env();
        env.assign(intern("x"), Value::integer(1));
        env.assign(intern("x"), Value::integer(2));
        assert_eq!(env.load(), 1);
        assert_eq!(env.get(intern("x")), Value::integer(2));
    }

    #[test]
    fn test_delete_bumps_revision() {
        let env = empty_env();
        env.assign(intern("x"), Value::integer(1));
        let before = env.revision();
        env.assign(intern("x"), Value::nil());
        assert!(env.revision() > before);
        assert!(env.get(intern("x")).is_nil());
        assert_eq!(env.load(), 0);
    }

    #[test]
    fn test_growth_rehash_bumps_revision() {
        let env = empty_env();
        let before = env.revision();
        for i in 0..32 {
            env.assign(intern(&format!("v{i}")), Value::integer(i));
        }
        assert!(env.capacity() >= 64);
        assert!(env.capacity().is_power_of_two());
        assert!(env.revision() > before);
        for i in 0..32 {
            assert_eq!(env.get(intern(&format!("v{i}"))), Value::integer(i));
        }
    }

    #[test]
    fn test_lexical_chain() {
        let parent = empty_env();
        parent.assign(intern("a"), Value::double(1.0));
        let child = Environment::new(parent.to_value(), Value::null(), Value::null());
        assert_eq!(child.get(intern("a")), Value::double(1.0));
        child.assign(intern("a"), Value::double(2.0));
        assert_eq!(child.get(intern("a")), Value::double(2.0));
        assert_eq!(parent.get(intern("a")), Value::double(1.0));
    }

    #[test]
    fn test_pointer_fast_path() {
        let env = empty_env();
        let ev = env.to_value();
        env.assign(intern("x"), Value::integer(10));
        let p = Environment::make_pointer(&ev, intern("x")).unwrap();
        assert_eq!(Environment::deref_pointer(&p), Value::integer(10));
        Environment::assign_pointer(&p, Value::integer(11));
        assert_eq!(env.get(intern("x")), Value::integer(11));
    }

    #[test]
    fn test_pointer_survives_rehash() {
        let env = empty_env();
        let ev = env.to_value();
        env.assign(intern("x"), Value::integer(10));
        let p = Environment::make_pointer(&ev, intern("x")).unwrap();
        for i in 0..64 {
            env.assign(intern(&format!("w{i}")), Value::integer(i));
        }
        // Revision mismatch forces the name-lookup fallback.
        assert_ne!(env.revision(), p.revision);
        assert_eq!(Environment::deref_pointer(&p), Value::integer(10));
        Environment::assign_pointer(&p, Value::integer(99));
        assert_eq!(env.get(intern("x")), Value::integer(99));
    }

    #[test]
    fn test_pointer_to_missing_is_an_error() {
        let env = empty_env();
        let ev = env.to_value();
        assert!(Environment::make_pointer(&ev, intern("nope")).is_err());
    }

    #[test]
    fn test_revision_is_globally_monotonic() {
        let a = empty_env();
        let b = empty_env();
        assert!(b.revision() > a.revision());
        a.assign(intern("x"), Value::integer(1));
        a.assign(intern("x"), Value::nil());
        assert!(a.revision() > b.revision());
    }
}
