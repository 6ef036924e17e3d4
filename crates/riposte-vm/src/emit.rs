use std::rc::Rc;

use riposte_core::{Instruction, Op, Prototype, Spur, Value};

/// Builder for a Prototype's instruction stream and constant pool.
pub struct Emitter {
    code: Vec<Instruction>,
    constants: Vec<Value>,
    depth: i64,
    max_depth: i64,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            code: Vec::new(),
            constants: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    pub fn emit(&mut self, inst: Instruction) {
        let (pops, pushes) = inst.op.stack_effect(inst.a);
        self.depth -= pops;
        if self.depth < 0 {
            // Branch joins make the linear scan an approximation; clamp so
            // the high-water mark stays an upper bound.
            self.depth = 0;
        }
        self.depth += pushes;
        self.max_depth = self.max_depth.max(self.depth);
        self.code.push(inst);
    }

    pub fn emit_op(&mut self, op: Op) {
        self.emit(Instruction::op(op));
    }

    pub fn emit_a(&mut self, op: Op, a: i64) {
        self.emit(Instruction::with_a(op, a));
    }

    /// Add a constant to the pool, deduplicating by (shallow) value
    /// equality. Returns the pool index.
    pub fn add_const(&mut self, val: Value) -> i64 {
        for (i, existing) in self.constants.iter().enumerate() {
            if *existing == val {
                return i as i64;
            }
        }
        self.constants.push(val);
        (self.constants.len() - 1) as i64
    }

    /// Emit `kget` of a constant.
    pub fn emit_const(&mut self, val: Value) {
        let idx = self.add_const(val);
        self.emit_a(Op::Kget, idx);
    }

    pub fn current_pc(&self) -> i64 {
        self.code.len() as i64
    }

    /// Emit a branching instruction with a placeholder offset in `a`.
    /// Returns its position for later backpatching.
    pub fn emit_jump(&mut self, op: Op) -> usize {
        let at = self.code.len();
        self.emit(Instruction::with_a(op, 0));
        at
    }

    /// Point the branch at `at` to the current position. Offsets are
    /// relative instruction counts: the handler returns `a` and the
    /// dispatch loop adds it to the branch's own pc.
    pub fn patch_jump(&mut self, at: usize) {
        self.code[at].a = self.current_pc() - at as i64;
    }

    /// Point the branch at `at` to an explicit target pc.
    pub fn patch_jump_to(&mut self, at: usize, target: i64) {
        self.code[at].a = target - at as i64;
    }

    /// Set a non-branch operand after the fact (the fguard skip count).
    pub fn patch_c(&mut self, at: usize, c: i64) {
        self.code[at].c = c;
    }

    pub fn instruction_mut(&mut self, at: usize) -> &mut Instruction {
        &mut self.code[at]
    }

    /// Consume the emitter and freeze the Prototype.
    pub fn finish(
        self,
        expression: Value,
        parameters: Vec<Spur>,
        defaults: Vec<Value>,
        dots: i64,
    ) -> Rc<Prototype> {
        Rc::new(Prototype::new(
            expression,
            parameters,
            defaults,
            dots,
            self.max_depth,
            self.constants,
            self.code,
        ))
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_const_dedup() {
        let mut e = Emitter::new();
        e.emit_const(Value::integer(42));
        e.emit_const(Value::integer(42));
        e.emit_const(Value::integer(7));
        e.emit_op(Op::Ret);
        let p = e.finish(Value::nil(), vec![], vec![], -1);
        assert_eq!(p.constants.len(), 2);
        assert_eq!(p.code[0].a, p.code[1].a);
    }

    #[test]
    fn test_patch_jump() {
        let mut e = Emitter::new();
        e.emit_const(Value::logical(true)); // pc 0
        let j = e.emit_jump(Op::If1); // pc 1
        e.emit_const(Value::integer(1)); // pc 2
        e.emit_op(Op::Ret); // pc 3
        e.patch_jump(j); // if1 jumps to pc 4
        e.emit_op(Op::Null); // pc 4
        e.emit_op(Op::Ret);
        let p = e.finish(Value::nil(), vec![], vec![], -1);
        assert_eq!(p.code[1].a, 3); // 1 + 3 = 4
    }

    #[test]
    fn test_high_water_mark() {
        let mut e = Emitter::new();
        e.emit_const(Value::integer(1));
        e.emit_const(Value::integer(2));
        e.emit_op(Op::Add);
        e.emit_op(Op::Ret);
        let p = e.finish(Value::nil(), vec![], vec![], -1);
        assert_eq!(p.registers, 2);
    }
}
