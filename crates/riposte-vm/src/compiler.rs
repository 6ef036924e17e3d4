use std::rc::Rc;

use riposte_core::{
    spur_bits, strings, Instruction, Op, Prototype, RiposteError, Spur, Value,
};

use crate::emit::Emitter;

/// Maximum recursion depth for the compiler, guarding the native stack
/// against deeply nested expressions.
const MAX_COMPILE_DEPTH: usize = 256;

/// Compile a parsed expression (symbol, call, expression sequence, or
/// literal) into a Prototype. `base` is the base environment used to
/// resolve the guard constants of inline-cached primitive calls.
pub fn compile(expr: &Value, base: &Value) -> Result<Rc<Prototype>, RiposteError> {
    let mut c = Compiler::new(base);
    c.compile_expr(expr)?;
    c.emit.emit_op(Op::Ret);
    Ok(c.emit.finish(expr.clone(), vec![], vec![], -1))
}

enum LoopKind {
    For,
    While,
    Repeat,
}

struct LoopCtx {
    kind: LoopKind,
    break_jumps: Vec<usize>,
    next_jumps: Vec<usize>,
}

struct Compiler<'a> {
    base: &'a Value,
    emit: Emitter,
    loops: Vec<LoopCtx>,
    depth: usize,
}

/// The base-list items of a call or expression record.
fn record_items(expr: &Value) -> &[Value] {
    expr.as_object()
        .and_then(|o| o.base().list_ref())
        .unwrap_or(&[])
}

/// Keyword names of a call record's arguments (excluding the callee slot),
/// or an empty vector when the call is unnamed.
fn record_arg_names(expr: &Value, argc: usize) -> Vec<Spur> {
    match expr.names_of().as_ref().and_then(|n| n.characters_ref()) {
        Some(chars) if chars.len() == argc + 1 => chars[1..].to_vec(),
        _ => Vec::new(),
    }
}

fn primitive_op(head: Spur, argc: usize) -> Option<Op> {
    let s = strings();
    let op = if head == s.add {
        match argc {
            1 => Op::Pos,
            2 => Op::Add,
            _ => return None,
        }
    } else if head == s.sub {
        match argc {
            1 => Op::Neg,
            2 => Op::Sub,
            _ => return None,
        }
    } else {
        let (op, arity) = if head == s.mul {
            (Op::Mul, 2)
        } else if head == s.div {
            (Op::Div, 2)
        } else if head == s.idiv {
            (Op::IDiv, 2)
        } else if head == s.modulo {
            (Op::Mod, 2)
        } else if head == s.pow {
            (Op::Pow, 2)
        } else if head == s.eq {
            (Op::Eq, 2)
        } else if head == s.neq {
            (Op::Neq, 2)
        } else if head == s.lt {
            (Op::Lt, 2)
        } else if head == s.le {
            (Op::Le, 2)
        } else if head == s.gt {
            (Op::Gt, 2)
        } else if head == s.ge {
            (Op::Ge, 2)
        } else if head == s.lnot {
            (Op::LNeg, 1)
        } else if head == s.land {
            (Op::LAnd, 2)
        } else if head == s.lor {
            (Op::LOr, 2)
        } else if head == s.abs {
            (Op::Abs, 1)
        } else if head == s.sign {
            (Op::Sign, 1)
        } else if head == s.sqrt {
            (Op::Sqrt, 1)
        } else if head == s.floor {
            (Op::Floor, 1)
        } else if head == s.ceiling {
            (Op::Ceiling, 1)
        } else if head == s.trunc {
            (Op::Trunc, 1)
        } else if head == s.round {
            (Op::Round, 1)
        } else if head == s.signif {
            (Op::Signif, 1)
        } else if head == s.exp {
            (Op::Exp, 1)
        } else if head == s.log {
            (Op::Log, 1)
        } else if head == s.cos {
            (Op::Cos, 1)
        } else if head == s.sin {
            (Op::Sin, 1)
        } else if head == s.tan {
            (Op::Tan, 1)
        } else if head == s.acos {
            (Op::ACos, 1)
        } else if head == s.asin {
            (Op::ASin, 1)
        } else if head == s.atan {
            (Op::ATan, 1)
        } else {
            return None;
        };
        if argc != arity {
            return None;
        }
        op
    };
    Some(op)
}

impl<'a> Compiler<'a> {
    fn new(base: &'a Value) -> Compiler<'a> {
        Compiler {
            base,
            emit: Emitter::new(),
            loops: Vec::new(),
            depth: 0,
        }
    }

    fn compile_expr(&mut self, expr: &Value) -> Result<(), RiposteError> {
        self.depth += 1;
        if self.depth > MAX_COMPILE_DEPTH {
            self.depth -= 1;
            return Err(RiposteError::compile("maximum compilation depth exceeded"));
        }
        let result = self.compile_expr_inner(expr);
        self.depth -= 1;
        result
    }

    fn compile_expr_inner(&mut self, expr: &Value) -> Result<(), RiposteError> {
        if let Some(sym) = expr.as_symbol() {
            self.emit.emit_a(Op::Get, spur_bits(sym) as i64);
            Ok(())
        } else if expr.is_call() {
            self.compile_call_ic(expr)
        } else if expr.is_expression() {
            self.compile_sequence(expr)
        } else {
            self.emit.emit_const(expr.clone());
            Ok(())
        }
    }

    fn compile_sequence(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr);
        if items.is_empty() {
            self.emit.emit_op(Op::Null);
            return Ok(());
        }
        for (i, item) in items.iter().enumerate() {
            self.compile_expr(item)?;
            if i < items.len() - 1 {
                self.emit.emit_op(Op::Pop);
            }
        }
        Ok(())
    }

    /// Compile a call, inlining recognized structured forms and guarding
    /// recognized primitive operators.
    fn compile_call_ic(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr);
        if items.is_empty() {
            return Err(RiposteError::compile("call without a function"));
        }
        let argc = items.len() - 1;

        if let Some(head) = items[0].as_symbol() {
            let s = strings();
            if head == s.assign || head == s.assign_eq {
                return self.compile_assign(expr);
            } else if head == s.kw_if {
                return self.compile_if(expr);
            } else if head == s.kw_for {
                return self.compile_for(expr);
            } else if head == s.kw_while {
                return self.compile_while(expr);
            } else if head == s.kw_repeat {
                return self.compile_repeat(expr);
            } else if head == s.kw_break {
                return self.compile_break();
            } else if head == s.kw_next {
                return self.compile_next();
            } else if head == s.brace {
                return self.compile_block(expr);
            } else if head == s.paren {
                // parentheses are transparent
                let items = record_items(expr);
                if items.len() != 2 {
                    return Err(RiposteError::compile("malformed parenthesis"));
                }
                let inner = items[1].clone();
                return self.compile_expr(&inner);
            } else if head == s.kw_function {
                return self.compile_function(expr);
            }

            // Guarded inline path for primitive operators: unnamed
            // arguments of the expected arity only, and never across a
            // `...` expansion.
            let names = record_arg_names(expr, argc);
            let plain = names.iter().all(|n| *n == s.empty)
                && !items[1..].iter().any(|a| a.as_symbol() == Some(s.dots));
            if plain {
                if let Some(op) = primitive_op(head, argc) {
                    let guard = self
                        .base
                        .as_environment()
                        .map(|e| e.get(head))
                        .unwrap_or_else(Value::nil);
                    if !guard.is_nil() {
                        return self.compile_primitive(expr, head, op, guard);
                    }
                }
            }
        }

        self.compile_generic_call(expr)
    }

    /// The guard + specialized sequence + slow-path constant of an
    /// inline-cached primitive call.
    fn compile_primitive(
        &mut self,
        expr: &Value,
        head: Spur,
        op: Op,
        guard: Value,
    ) -> Result<(), RiposteError> {
        // Slow path: the generic call compiled into its own prototype.
        let slow = {
            let mut c = Compiler::new(self.base);
            c.compile_generic_call(expr)?;
            c.emit.emit_op(Op::Ret);
            c.emit.finish(expr.clone(), vec![], vec![], -1)
        };
        let exp_idx = self.emit.add_const(Value::code(slow));
        let spec_idx = self.emit.add_const(guard);

        // Push the current binding of the operator and check it against
        // the value seen at compile time.
        self.emit.emit_a(Op::Get, spur_bits(head) as i64);
        let fg = self.emit.emit_jump(Op::Fguard);
        self.emit.instruction_mut(fg).a = spec_idx;
        self.emit.instruction_mut(fg).b = exp_idx;

        let items = record_items(expr).to_vec();
        let argc = items.len() - 1;
        // Operands compile right-to-left so the left operand ends up on
        // top of the stack.
        for item in items[1..].iter().rev() {
            self.compile_expr(item)?;
        }
        self.emit.emit_a(op, argc as i64);

        let skip = self.emit.current_pc() - fg as i64;
        self.emit.patch_c(fg, skip);
        Ok(())
    }

    /// A plain call: delay language arguments into promises, evaluate the
    /// callee, and emit call (or dcall when `...` must be expanded).
    fn compile_generic_call(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        let argc = items.len() - 1;
        let dots = strings().dots;
        let mut has_dots = false;

        for arg in items[1..].iter().rev() {
            if let Some(sym) = arg.as_symbol() {
                if sym == dots {
                    // Placeholder expanded by dcall from the environment.
                    has_dots = true;
                    self.emit.emit_const(arg.clone());
                } else {
                    self.emit.emit_a(Op::SymDelay, spur_bits(sym) as i64);
                }
            } else if arg.is_call() || arg.is_expression() {
                let p = {
                    let mut c = Compiler::new(self.base);
                    c.compile_expr(arg)?;
                    c.emit.emit_op(Op::Ret);
                    c.emit.finish(arg.clone(), vec![], vec![], -1)
                };
                let idx = self.emit.add_const(Value::code(p));
                self.emit.emit_a(Op::Delay, idx);
            } else {
                self.compile_expr(arg)?;
            }
        }

        let callee = items[0].clone();
        self.compile_expr(&callee)?;

        let rec_idx = self.emit.add_const(expr.clone());
        let op = if has_dots { Op::DCall } else { Op::Call };
        self.emit.emit(Instruction::new(op, argc as i64, rec_idx, 0));
        Ok(())
    }

    fn compile_assign(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() != 3 {
            return Err(RiposteError::compile("malformed assignment"));
        }
        let target = &items[1];
        let rhs = items[2].clone();

        if let Some(sym) = target.as_symbol() {
            self.compile_expr(&rhs)?;
            self.emit.emit_a(Op::Assign, spur_bits(sym) as i64);
            return Ok(());
        }

        // Replacement forms: names(x) <- v, class(x) <- v, dim(x) <- v,
        // x[i] <- v.
        if target.is_call() {
            let t_items = record_items(target).to_vec();
            if let (Some(fun), Some(obj)) = (
                t_items.first().and_then(|f| f.as_symbol()),
                t_items.get(1).and_then(|o| o.as_symbol()),
            ) {
                let s = strings();
                if fun == s.names && t_items.len() == 2 {
                    self.compile_expr(&rhs)?;
                    self.emit.emit_a(Op::NamesAssign, spur_bits(obj) as i64);
                    return Ok(());
                }
                if fun == s.class && t_items.len() == 2 {
                    self.compile_expr(&rhs)?;
                    self.emit.emit_a(Op::ClassAssign, spur_bits(obj) as i64);
                    return Ok(());
                }
                if fun == s.dim && t_items.len() == 2 {
                    self.compile_expr(&rhs)?;
                    self.emit.emit_a(Op::DimAssign, spur_bits(obj) as i64);
                    return Ok(());
                }
                if fun == s.bracket && t_items.len() == 3 {
                    // value first, then the index: iassign pops them in
                    // reverse.
                    self.compile_expr(&rhs)?;
                    let index = t_items[2].clone();
                    self.compile_expr(&index)?;
                    self.emit.emit_a(Op::IAssign, spur_bits(obj) as i64);
                    return Ok(());
                }
            }
        }
        Err(RiposteError::compile("invalid assignment target"))
    }

    fn compile_if(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() != 3 && items.len() != 4 {
            return Err(RiposteError::compile("malformed if"));
        }
        self.compile_expr(&items[1])?;
        let to_else = self.emit.emit_jump(Op::If1);
        self.compile_expr(&items[2])?;
        let to_end = self.emit.emit_jump(Op::Jmp);
        self.emit.patch_jump(to_else);
        if items.len() == 4 {
            self.compile_expr(&items[3])?;
        } else {
            self.emit.emit_op(Op::Null);
        }
        self.emit.patch_jump(to_end);
        Ok(())
    }

    fn compile_for(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() != 4 {
            return Err(RiposteError::compile("malformed for loop"));
        }
        let var = items[1]
            .as_symbol()
            .ok_or_else(|| RiposteError::compile("for loop variable must be a symbol"))?;

        // The range must be a literal lo:hi form; the loop steps forward
        // through it without materializing the vector.
        if !items[2].is_call() {
            return Err(RiposteError::compile("for loop requires a range expression"));
        }
        let range = record_items(&items[2]).to_vec();
        if range.len() != 3 || range[0].as_symbol() != Some(strings().colon) {
            return Err(RiposteError::compile("for loop requires a range expression"));
        }

        self.compile_expr(&range[2])?; // upper
        self.compile_expr(&range[1])?; // lower
        self.emit.emit_const(Value::symbol(var));

        let fb = self.emit.emit_jump(Op::ForBegin);
        let body_start = self.emit.current_pc();
        self.loops.push(LoopCtx {
            kind: LoopKind::For,
            break_jumps: Vec::new(),
            next_jumps: Vec::new(),
        });
        let body = items[3].clone();
        self.compile_expr(&body)?;
        let ctx = self.loops.pop().expect("loop context pushed above");

        let fe = self.emit.current_pc();
        self.emit
            .emit(Instruction::with_a(Op::ForEnd, fe - body_start));
        self.emit.patch_jump(fb);

        let exit = self.emit.current_pc();
        for j in ctx.break_jumps {
            self.emit.patch_jump_to(j, exit);
        }
        for j in ctx.next_jumps {
            self.emit.patch_jump_to(j, fe);
        }
        Ok(())
    }

    fn compile_while(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() != 3 {
            return Err(RiposteError::compile("malformed while loop"));
        }
        let cond = items[1].clone();
        let body = items[2].clone();

        self.compile_expr(&cond)?;
        let wb = self.emit.emit_jump(Op::WhileBegin);
        let body_start = self.emit.current_pc();
        self.loops.push(LoopCtx {
            kind: LoopKind::While,
            break_jumps: Vec::new(),
            next_jumps: Vec::new(),
        });
        self.compile_expr(&body)?;
        let ctx = self.loops.pop().expect("loop context pushed above");

        // The condition is re-evaluated at the bottom of the loop.
        let cond_again = self.emit.current_pc();
        self.compile_expr(&cond)?;
        let we = self.emit.current_pc();
        self.emit
            .emit(Instruction::with_a(Op::WhileEnd, we - body_start));
        self.emit.patch_jump(wb);

        let exit = self.emit.current_pc();
        for j in ctx.break_jumps {
            self.emit.patch_jump_to(j, exit);
        }
        for j in ctx.next_jumps {
            self.emit.patch_jump_to(j, cond_again);
        }
        Ok(())
    }

    fn compile_repeat(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() != 2 {
            return Err(RiposteError::compile("malformed repeat loop"));
        }
        self.emit.emit_op(Op::RepeatBegin);
        let body_start = self.emit.current_pc();
        self.loops.push(LoopCtx {
            kind: LoopKind::Repeat,
            break_jumps: Vec::new(),
            next_jumps: Vec::new(),
        });
        let body = items[1].clone();
        self.compile_expr(&body)?;
        let ctx = self.loops.pop().expect("loop context pushed above");

        let re = self.emit.current_pc();
        self.emit
            .emit(Instruction::with_a(Op::RepeatEnd, re - body_start));

        let exit = self.emit.current_pc();
        for j in ctx.break_jumps {
            self.emit.patch_jump_to(j, exit);
        }
        for j in ctx.next_jumps {
            self.emit.patch_jump_to(j, re);
        }
        Ok(())
    }

    fn compile_break(&mut self) -> Result<(), RiposteError> {
        let Some(ctx) = self.loops.last() else {
            return Err(RiposteError::compile("no loop for break, jumping to top level"));
        };
        // A for loop keeps its iteration state on the stack; unwind it so
        // the exit point sees only the loop result slot.
        if matches!(ctx.kind, LoopKind::For) {
            for _ in 0..4 {
                self.emit.emit_op(Op::Pop);
            }
            self.emit.emit_op(Op::Null);
        }
        let j = self.emit.emit_jump(Op::Jmp);
        self.loops
            .last_mut()
            .expect("checked above")
            .break_jumps
            .push(j);
        Ok(())
    }

    fn compile_next(&mut self) -> Result<(), RiposteError> {
        if self.loops.is_empty() {
            return Err(RiposteError::compile("no loop for next, jumping to top level"));
        }
        // Substitute the body result the loop-end op expects, then branch
        // to it (for/repeat) or to the condition (while).
        self.emit.emit_op(Op::Null);
        let j = self.emit.emit_jump(Op::Jmp);
        self.loops
            .last_mut()
            .expect("checked above")
            .next_jumps
            .push(j);
        Ok(())
    }

    fn compile_block(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() == 1 {
            self.emit.emit_op(Op::Null);
            return Ok(());
        }
        for (i, item) in items[1..].iter().enumerate() {
            self.compile_expr(item)?;
            if i < items.len() - 2 {
                self.emit.emit_op(Op::Pop);
            }
        }
        Ok(())
    }

    /// function(formals, body): formals is a List of default expressions
    /// (Nil for none) whose names attribute holds the parameter names.
    fn compile_function(&mut self, expr: &Value) -> Result<(), RiposteError> {
        let items = record_items(expr).to_vec();
        if items.len() < 3 {
            return Err(RiposteError::compile("malformed function definition"));
        }
        let formals = &items[1];
        let body = items[2].clone();

        let (parameters, default_exprs): (Vec<Spur>, Vec<Value>) = if formals.is_null() {
            (Vec::new(), Vec::new())
        } else {
            let defaults = formals
                .as_object()
                .map(|o| o.base().clone())
                .unwrap_or_else(|| formals.clone());
            let defaults = defaults
                .list_ref()
                .ok_or_else(|| RiposteError::compile("malformed formals list"))?
                .to_vec();
            let names = formals
                .names_of()
                .and_then(|n| n.characters_ref().map(|c| c.to_vec()))
                .unwrap_or_default();
            if names.len() != defaults.len() {
                return Err(RiposteError::compile("formals list must be fully named"));
            }
            (names, defaults)
        };

        let dots = parameters
            .iter()
            .position(|p| *p == strings().dots)
            .map(|i| i as i64)
            .unwrap_or(-1);

        let mut defaults = Vec::with_capacity(default_exprs.len());
        for d in &default_exprs {
            if d.is_nil() {
                defaults.push(Value::nil());
            } else {
                let p = {
                    let mut c = Compiler::new(self.base);
                    c.compile_expr(d)?;
                    c.emit.emit_op(Op::Ret);
                    c.emit.finish(d.clone(), vec![], vec![], -1)
                };
                defaults.push(Value::code(p));
            }
        }

        let proto = {
            let mut c = Compiler::new(self.base);
            c.compile_expr(&body)?;
            c.emit.emit_op(Op::Ret);
            c.emit.finish(body.clone(), parameters, defaults, dots)
        };
        let idx = self.emit.add_const(Value::code(proto));
        self.emit.emit_a(Op::Function, idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riposte_core::{create_call, intern, Environment};

    fn base() -> Value {
        Environment::new(Value::null(), Value::null(), Value::null()).to_value()
    }

    fn call(items: Vec<Value>) -> Value {
        create_call(items, None)
    }

    #[test]
    fn test_literal_compiles_to_kget() {
        let p = compile(&Value::double(1.5), &base()).unwrap();
        assert_eq!(p.code[0].op, Op::Kget);
        assert_eq!(p.code[1].op, Op::Ret);
        assert_eq!(p.constants[0], Value::double(1.5));
    }

    #[test]
    fn test_symbol_compiles_to_get() {
        let p = compile(&Value::symbol_str("x"), &base()).unwrap();
        assert_eq!(p.code[0].op, Op::Get);
        assert_eq!(p.code[0].a, spur_bits(intern("x")) as i64);
    }

    #[test]
    fn test_assignment() {
        let expr = call(vec![
            Value::symbol_str("<-"),
            Value::symbol_str("x"),
            Value::double(2.0),
        ]);
        let p = compile(&expr, &base()).unwrap();
        assert_eq!(p.code[0].op, Op::Kget);
        assert_eq!(p.code[1].op, Op::Assign);
    }

    #[test]
    fn test_unguarded_add_without_base_binding() {
        // The base environment has no `+` here, so no guard can be
        // resolved and the call compiles generically.
        let expr = call(vec![
            Value::symbol_str("+"),
            Value::double(1.0),
            Value::double(2.0),
        ]);
        let p = compile(&expr, &base()).unwrap();
        assert!(p.code.iter().any(|i| i.op == Op::Call));
        assert!(!p.code.iter().any(|i| i.op == Op::Fguard));
    }

    #[test]
    fn test_guarded_add_with_base_binding() {
        let b = base();
        b.as_environment()
            .unwrap()
            .assign(intern("+"), Value::character_str("stand-in primitive"));
        let expr = call(vec![
            Value::symbol_str("+"),
            Value::double(1.0),
            Value::double(2.0),
        ]);
        let p = compile(&expr, &b).unwrap();
        let fg = p.code.iter().position(|i| i.op == Op::Fguard).unwrap();
        assert_eq!(p.code[fg - 1].op, Op::Get);
        // Specialized sequence follows the guard; the add carries arity.
        let add = p.code.iter().position(|i| i.op == Op::Add).unwrap();
        assert!(add > fg);
        assert_eq!(p.code[add].a, 2);
        // The skip offset lands just past the specialized sequence.
        assert_eq!(fg as i64 + p.code[fg].c, add as i64 + 1);
        // Slow path prototype lives in the pool.
        assert!(p.constants[p.code[fg].b as usize].is_code());
    }

    #[test]
    fn test_break_outside_loop_is_compile_error() {
        let expr = call(vec![Value::symbol_str("break")]);
        assert!(matches!(
            compile(&expr, &base()),
            Err(RiposteError::Compile(_))
        ));
    }

    #[test]
    fn test_call_arguments_delay() {
        // f(g(1), y) delays the call argument and symbol-delays the bare
        // symbol.
        let inner = call(vec![Value::symbol_str("g"), Value::double(1.0)]);
        let expr = call(vec![Value::symbol_str("f"), inner, Value::symbol_str("y")]);
        let p = compile(&expr, &base()).unwrap();
        assert!(p.code.iter().any(|i| i.op == Op::Delay));
        assert!(p.code.iter().any(|i| i.op == Op::SymDelay));
        let c = p.code.iter().find(|i| i.op == Op::Call).unwrap();
        assert_eq!(c.a, 2);
    }

    #[test]
    fn test_dots_forwarding_uses_dcall() {
        let expr = call(vec![Value::symbol_str("f"), Value::symbol_str("...")]);
        let p = compile(&expr, &base()).unwrap();
        assert!(p.code.iter().any(|i| i.op == Op::DCall));
    }
}
