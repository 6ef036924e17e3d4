use std::rc::Rc;

use lasso::Spur;

use crate::error::RiposteError;
use crate::interner::{spur_bits, strings};
use crate::value::Value;

const DEFAULT_ATTR_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
pub struct Pair {
    pub name: Spur,
    pub value: Value,
}

/// The heap half of an attributed Object: a non-Object base value plus a
/// small open-addressed name→value map. The map is persistent at the
/// language level: setting an attribute produces a structurally new Object.
#[derive(Debug)]
pub struct ObjectInner {
    base: Value,
    count: usize,
    attrs: Vec<Pair>,
}

impl ObjectInner {
    fn with_capacity(base: Value, count: usize, capacity: usize) -> ObjectInner {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(!base.is_object(), "object bases never nest");
        let empty = Pair {
            name: strings().na,
            value: Value::nil(),
        };
        ObjectInner {
            base,
            count,
            attrs: vec![empty; capacity],
        }
    }

    pub fn base(&self) -> &Value {
        &self.base
    }

    pub fn attr_count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.attrs.len()
    }

    fn find(&self, name: Spur) -> usize {
        let na = strings().na;
        let mask = self.attrs.len() - 1;
        let mut i = spur_bits(name) as usize & mask;
        while self.attrs[i].name != name && self.attrs[i].name != na {
            i = (i + 1) & mask;
        }
        i
    }

    pub fn has_attribute(&self, name: Spur) -> bool {
        self.attrs[self.find(name)].name != strings().na
    }

    pub fn get_attribute(&self, name: Spur) -> Option<&Value> {
        let i = self.find(name);
        if self.attrs[i].name != strings().na {
            Some(&self.attrs[i].value)
        } else {
            None
        }
    }

    pub fn required_attribute(&self, name: Spur) -> Result<&Value, RiposteError> {
        self.get_attribute(name)
            .ok_or_else(|| RiposteError::runtime("Subscript out of range"))
    }

    pub fn has_names(&self) -> bool {
        self.has_attribute(strings().names)
    }

    pub fn names(&self) -> Option<&Value> {
        self.get_attribute(strings().names)
    }

    pub fn class(&self) -> Option<&Value> {
        self.get_attribute(strings().class)
    }

    pub fn dim(&self) -> Option<&Value> {
        self.get_attribute(strings().dim)
    }

    /// Derive a new map with `name` set to `value` (Nil deletes). The base
    /// is shared; unrelated attributes are copied.
    pub fn set_attribute(&self, name: Spur, value: Value) -> ObjectInner {
        let na = strings().na;
        let present = self.has_attribute(name);
        let count = if !value.is_nil() && !present {
            self.count + 1
        } else if value.is_nil() && present {
            self.count - 1
        } else {
            self.count
        };

        let mut out = if count * 2 > self.capacity() {
            let capacity = (self.capacity() * 2).max(1);
            let mut grown = ObjectInner::with_capacity(self.base.clone(), count, capacity);
            for pair in &self.attrs {
                if pair.name != na {
                    let i = grown.find(pair.name);
                    grown.attrs[i] = pair.clone();
                }
            }
            grown
        } else {
            ObjectInner {
                base: self.base.clone(),
                count,
                attrs: self.attrs.clone(),
            }
        };

        let i = out.find(name);
        if value.is_nil() {
            out.attrs[i] = Pair {
                name: na,
                value: Value::nil(),
            };
        } else {
            out.attrs[i] = Pair { name, value };
        }
        out
    }

    /// Iterate the populated attribute pairs.
    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        let na = strings().na;
        self.attrs.iter().filter(move |p| p.name != na)
    }
}

impl Value {
    /// Install an attribute, producing a new Object value. Applied to a
    /// non-Object, the base is wrapped first; applied to an Object, its
    /// base is reused (bases never nest).
    pub fn set_attribute(&self, name: Spur, attr: Value) -> Value {
        let inner = match self.as_object() {
            Some(obj) => obj.set_attribute(name, attr),
            None => {
                let fresh =
                    ObjectInner::with_capacity(self.clone(), 0, DEFAULT_ATTR_CAPACITY);
                fresh.set_attribute(name, attr)
            }
        };
        Value::object(Rc::new(inner))
    }

    pub fn get_attribute(&self, name: Spur) -> Option<Value> {
        self.as_object()?.get_attribute(name).cloned()
    }

    pub fn has_attribute(&self, name: Spur) -> bool {
        self.as_object().map_or(false, |o| o.has_attribute(name))
    }

    pub fn set_names(&self, names: Value) -> Value {
        self.set_attribute(strings().names, names)
    }

    pub fn names_of(&self) -> Option<Value> {
        self.get_attribute(strings().names)
    }

    pub fn set_class(&self, class: Value) -> Value {
        self.set_attribute(strings().class, class)
    }

    pub fn set_dim(&self, dim: Value) -> Value {
        self.set_attribute(strings().dim, dim)
    }
}

/// Wrap a list of (function-expression, arg1, arg2, ...) as a parsed call.
/// `names` labels keyword arguments; the entry for the function position
/// and for positional arguments is the empty string.
pub fn create_call(items: Vec<Value>, names: Option<Vec<Spur>>) -> Value {
    let base = Value::list(items);
    let mut v = base.set_class(Value::characters(vec![strings().call]));
    if let Some(names) = names {
        v = v.set_names(Value::characters(names));
    }
    v
}

/// Wrap a list of statements as a parsed expression sequence.
pub fn create_expression(items: Vec<Value>) -> Value {
    Value::list(items).set_class(Value::characters(vec![strings().expression]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::intern;

    #[test]
    fn test_wrap_and_read() {
        let v = Value::integers(vec![1, 2]);
        let named = v.set_names(Value::characters(vec![intern("a"), intern("b")]));
        assert!(named.is_object());
        let names = named.names_of().unwrap();
        assert_eq!(names.characters_ref().unwrap()[1], intern("b"));
        // Base survives unwrapped.
        assert_eq!(
            named.as_object().unwrap().base().integers_ref().unwrap(),
            &[1, 2]
        );
    }

    #[test]
    fn test_set_is_persistent() {
        let v = Value::integer(1).set_names(Value::character_str("x"));
        let w = v.set_attribute(strings().dim, Value::integer(1));
        assert!(!v.has_attribute(strings().dim));
        assert!(w.has_attribute(strings().dim));
        assert!(w.has_attribute(strings().names));
    }

    #[test]
    fn test_nil_deletes_attribute() {
        let v = Value::integer(1).set_names(Value::character_str("x"));
        let stripped = v.set_names(Value::nil());
        assert!(stripped.names_of().is_none());
        assert_eq!(stripped.as_object().unwrap().attr_count(), 0);
    }

    #[test]
    fn test_growth_rehash() {
        let mut v = Value::integer(1);
        for i in 0..8 {
            v = v.set_attribute(intern(&format!("attr{i}")), Value::integer(i));
        }
        let obj = v.as_object().unwrap();
        assert_eq!(obj.attr_count(), 8);
        for i in 0..8 {
            assert_eq!(
                v.get_attribute(intern(&format!("attr{i}"))),
                Some(Value::integer(i))
            );
        }
    }

    #[test]
    fn test_bases_never_nest() {
        let inner = Value::integer(1).set_names(Value::character_str("x"));
        let outer = inner.set_class(Value::character_str("thing"));
        assert!(!outer.as_object().unwrap().base().is_object());
    }

    #[test]
    fn test_call_record() {
        let call = create_call(
            vec![Value::symbol_str("f"), Value::integer(1)],
            Some(vec![strings().empty, intern("x")]),
        );
        assert!(call.is_call());
        assert!(!call.is_expression());
        let names = call.names_of().unwrap();
        assert_eq!(names.characters_ref().unwrap()[1], intern("x"));
    }
}
