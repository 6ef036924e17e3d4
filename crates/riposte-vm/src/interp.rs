use std::rc::Rc;

use hashbrown::HashMap;
use riposte_core::{
    resolve, spur_from_bits, strings, Environment, InternalRef, Op, PromiseKind, Prototype,
    RiposteError, Spur, Value, NA_INTEGER, NA_LOGICAL,
};

use crate::call;
use crate::compiler;
use crate::kernels::{self, ArithOp, CompareOp, MathOp};
use crate::trace::{ExitReason, Trace, TraceState, UnaryKind};

/// Recursive evaluation depth bound: calls and promise forcing both
/// recurse through the host stack.
const MAX_EVAL_DEPTH: usize = 500;

/// Forced argument values for an internal function, with their keyword
/// names (`names` is empty for an entirely positional call; the empty
/// string marks an unnamed position otherwise).
pub struct Arguments {
    pub values: Vec<Value>,
    pub names: Vec<Spur>,
}

impl Arguments {
    pub fn name_of(&self, i: usize) -> Spur {
        self.names.get(i).copied().unwrap_or_else(|| strings().empty)
    }
}

pub type InternalFnPtr = fn(&mut Interpreter, &Arguments) -> Result<Value, RiposteError>;

#[derive(Clone, Copy)]
pub struct InternalFunction {
    pub name: Spur,
    pub ptr: InternalFnPtr,
    /// Expected parameter count, or -1 for variadic.
    pub params: i64,
}

/// Dispatch discipline: the threaded stream is the canonical mode, the
/// opcode switch is the portable fallback. Both must agree observably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Threaded,
    Switch,
}

/// One rewritten instruction of the threaded stream: the opcode field
/// replaced by its handler, operands carried along.
pub(crate) struct ThreadedInstr {
    fun: OpFn,
    a: i64,
    b: i64,
    c: i64,
}

type OpFn = fn(&mut Interpreter, &Rc<Prototype>, i64, i64, i64) -> Result<i64, RiposteError>;

pub struct Interpreter {
    pub(crate) stack: Vec<Value>,
    pub(crate) env: Value,
    base: Value,
    global: Value,
    warnings: Vec<String>,
    pub(crate) internals: Vec<InternalFunction>,
    internal_index: HashMap<Spur, usize>,
    dispatch: Dispatch,
    pub(crate) depth: usize,
    pub trace: TraceState,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        let base = Environment::new(Value::null(), Value::null(), Value::null());
        let base_value = base.to_value();
        let global = Environment::new(base_value.clone(), Value::null(), Value::null());
        let global_value = global.to_value();
        let mut interp = Interpreter {
            stack: Vec::with_capacity(256),
            env: global_value.clone(),
            base: base_value,
            global: global_value,
            warnings: Vec::new(),
            internals: Vec::new(),
            internal_index: HashMap::new(),
            dispatch: Dispatch::Threaded,
            depth: 0,
            trace: TraceState::new(),
        };
        crate::builtins::register_all(&mut interp);
        interp
    }

    pub fn base_env(&self) -> &Value {
        &self.base
    }

    pub fn global_env(&self) -> &Value {
        &self.global
    }

    pub fn current_env(&self) -> &Value {
        &self.env
    }

    pub fn set_dispatch(&mut self, dispatch: Dispatch) {
        self.dispatch = dispatch;
    }

    /// Register an internal function: a registry slot plus a stable
    /// heap value bound under `name` in the base environment.
    pub fn register_internal(&mut self, name: &str, ptr: InternalFnPtr, params: i64) {
        let name = riposte_core::intern(name);
        let index = self.internals.len();
        self.internals.push(InternalFunction { name, ptr, params });
        self.internal_index.insert(name, index);
        let value = Value::internal(Rc::new(InternalRef {
            name,
            index,
            params,
        }));
        self.base
            .as_environment()
            .expect("base is an environment")
            .assign(name, value);
    }

    pub fn internal_index_of(&self, name: Spur) -> Option<usize> {
        self.internal_index.get(&name).copied()
    }

    // -- Warnings --

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Drain the buffered warning channel.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    // -- Trace recorder --

    pub fn begin_trace(&mut self) {
        self.trace.begin();
    }

    pub fn end_trace(&mut self) -> &Trace {
        self.trace.exit(ExitReason::Done);
        &self.trace.trace
    }

    // -- Entry points --

    pub fn compile(&self, expr: &Value) -> Result<Rc<Prototype>, RiposteError> {
        compiler::compile(expr, &self.base)
    }

    /// Compile and run a parsed expression in the current environment.
    pub fn eval_expr(&mut self, expr: &Value) -> Result<Value, RiposteError> {
        let proto = self.compile(expr)?;
        self.eval(&proto)
    }

    /// Run a prototype in the current environment.
    pub fn eval(&mut self, proto: &Rc<Prototype>) -> Result<Value, RiposteError> {
        self.run(proto)
    }

    /// Run a prototype with the current environment swapped out for the
    /// duration.
    pub fn eval_in(&mut self, proto: &Rc<Prototype>, env: Value) -> Result<Value, RiposteError> {
        let saved = std::mem::replace(&mut self.env, env);
        let result = self.run(proto);
        self.env = saved;
        result
    }

    /// Invoke a function value with no arguments.
    pub fn eval_function(&mut self, f: &Value) -> Result<Value, RiposteError> {
        match f.as_function_rc() {
            Some(inner) => call::apply_closure(self, inner, Vec::new(), Vec::new(), Value::null()),
            None => Err(RiposteError::type_error("function", f.tag().name())),
        }
    }

    // -- The dispatch loops --

    pub(crate) fn run(&mut self, proto: &Rc<Prototype>) -> Result<Value, RiposteError> {
        self.depth += 1;
        if self.depth > MAX_EVAL_DEPTH {
            self.depth -= 1;
            return Err(RiposteError::runtime("evaluation nested too deeply"));
        }
        let sp = self.stack.len();
        let result = match self.dispatch {
            Dispatch::Threaded => self.run_threaded(proto),
            Dispatch::Switch => self.run_switch(proto),
        };
        self.depth -= 1;
        match result {
            Ok(v) => {
                debug_assert_eq!(self.stack.len(), sp, "dispatch left stack unbalanced");
                Ok(v)
            }
            Err(e) => {
                // Unwind to the entry stack depth; the error keeps
                // propagating through the recursive frames to the single
                // top-level handler.
                self.stack.truncate(sp);
                Err(e)
            }
        }
    }

    fn run_threaded(&mut self, proto: &Rc<Prototype>) -> Result<Value, RiposteError> {
        let code = threaded_stream(proto);
        let mut pc: i64 = 0;
        loop {
            let inst = &code[pc as usize];
            let delta = (inst.fun)(self, proto, inst.a, inst.b, inst.c)?;
            if delta == 0 {
                break;
            }
            pc += delta;
        }
        Ok(self.stack.pop().unwrap_or_else(Value::nil))
    }

    fn run_switch(&mut self, proto: &Rc<Prototype>) -> Result<Value, RiposteError> {
        let mut pc: i64 = 0;
        loop {
            let inst = proto.code[pc as usize];
            let delta = handler_for(inst.op)(self, proto, inst.a, inst.b, inst.c)?;
            if delta == 0 {
                break;
            }
            pc += delta;
        }
        Ok(self.stack.pop().unwrap_or_else(Value::nil))
    }

    // -- Lookup and forcing --

    pub(crate) fn pop1(&mut self) -> Result<Value, RiposteError> {
        self.stack
            .pop()
            .ok_or_else(|| RiposteError::internal("value stack underflow"))
    }

    /// Find a binding along the lexical chain. Returns the raw stored
    /// value and the environment holding it.
    pub(crate) fn find_binding(env_value: &Value, name: Spur) -> Option<(Value, Value)> {
        let mut cur = env_value.clone();
        loop {
            let (v, next) = {
                let env = cur.as_environment()?;
                (env.get_raw(name), env.lexical())
            };
            if !v.is_nil() {
                return Some((v, cur));
            }
            cur = next;
        }
    }

    /// The lookup behind the `get` opcode: walk the lexical chain, force
    /// promises, and substitute the forced value at its binding.
    pub fn get_forced(&mut self, env_value: &Value, name: Spur) -> Result<Value, RiposteError> {
        let Some((v, holder)) = Self::find_binding(env_value, name) else {
            return Err(RiposteError::runtime(format!(
                "object '{}' not found",
                resolve(name)
            )));
        };
        if v.is_promise() {
            let forced = self.force_promise(&v)?;
            holder
                .as_environment()
                .expect("binding holders are environments")
                .assign(name, forced.clone());
            return Ok(forced);
        }
        Ok(v)
    }

    /// Force a promise (memoized). Non-promises pass through.
    pub fn force_promise(&mut self, v: &Value) -> Result<Value, RiposteError> {
        let Some(p) = v.as_promise_rc() else {
            return Ok(v.clone());
        };
        if let Some(cached) = p.forced.borrow().clone() {
            return Ok(cached);
        }
        let result = match &p.kind {
            PromiseKind::Expression(proto) => self.eval_in(proto, p.env.clone())?,
            PromiseKind::Symbol(name) => {
                let env = p.env.clone();
                self.get_forced(&env, *name)?
            }
            PromiseKind::Missing(name) => {
                return Err(RiposteError::runtime(format!(
                    "argument '{}' is missing, with no default",
                    resolve(*name)
                )));
            }
        };
        *p.forced.borrow_mut() = Some(result.clone());
        Ok(result)
    }

    /// The function-call protocol behind `call`/`dcall`.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        names: Vec<Spur>,
        record: Value,
    ) -> Result<Value, RiposteError> {
        if let Some(f) = callee.as_function_rc() {
            // The recorder cannot see through a closure body.
            self.trace.exit(ExitReason::Call);
            return call::apply_closure(self, f, args, names, record);
        }
        if let Some(internal) = callee.as_internal_rc() {
            // Internal builtins bypass the matching protocol; they receive
            // forced values directly.
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(self.force_promise(&a)?);
            }
            if internal.params >= 0 && values.len() as i64 != internal.params {
                return Err(RiposteError::match_error(format!(
                    "'{}' expects {} arguments, got {}",
                    resolve(internal.name),
                    internal.params,
                    values.len()
                )));
            }
            let f = self.internals[internal.index];
            return (f.ptr)(self, &Arguments { values, names });
        }
        Err(RiposteError::type_error("function", callee.tag().name()))
    }

    /// Coerce a scalar condition, rejecting NA.
    fn condition(v: &Value) -> Result<bool, RiposteError> {
        match v.as_logical1() {
            Some(NA_LOGICAL) => Err(RiposteError::runtime(
                "missing value where TRUE/FALSE needed",
            )),
            Some(x) => Ok(x != 0),
            None => {
                if v.is_math_coerce() {
                    Err(RiposteError::runtime("argument is of length zero"))
                } else {
                    Err(RiposteError::type_error("logical", v.tag().name()))
                }
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build or fetch the threaded-dispatch stream cached on the prototype:
/// each instruction's opcode rewritten into its handler pointer.
fn threaded_stream(proto: &Rc<Prototype>) -> Rc<Vec<ThreadedInstr>> {
    if let Some(cache) = proto.threaded_cache() {
        if let Ok(stream) = cache.downcast::<Vec<ThreadedInstr>>() {
            return stream;
        }
    }
    let stream: Vec<ThreadedInstr> = proto
        .code
        .iter()
        .map(|i| ThreadedInstr {
            fun: handler_for(i.op),
            a: i.a,
            b: i.b,
            c: i.c,
        })
        .collect();
    let rc = Rc::new(stream);
    proto.set_threaded_cache(rc.clone());
    rc
}

fn handler_for(op: Op) -> OpFn {
    match op {
        Op::Kget => op_kget,
        Op::Get => op_get,
        Op::Iget => op_iget,
        Op::Pop => op_pop,
        Op::Assign => op_assign,
        Op::ClassAssign => op_class_assign,
        Op::NamesAssign => op_names_assign,
        Op::DimAssign => op_dim_assign,
        Op::IAssign => op_iassign,
        Op::ForBegin => op_forbegin,
        Op::ForEnd => op_forend,
        Op::WhileBegin => op_whilebegin,
        Op::WhileEnd => op_whileend,
        Op::RepeatBegin => op_repeatbegin,
        Op::RepeatEnd => op_repeatend,
        Op::If1 => op_if1,
        Op::Jmp => op_jmp,
        Op::Add => op_add,
        Op::Sub => op_sub,
        Op::Mul => op_mul,
        Op::Div => op_div,
        Op::IDiv => op_idiv,
        Op::Mod => op_mod,
        Op::Pow => op_pow,
        Op::Pos => op_pos,
        Op::Neg => op_neg,
        Op::LNeg => op_lneg,
        Op::LAnd => op_land,
        Op::LOr => op_lor,
        Op::Eq => op_eq,
        Op::Neq => op_neq,
        Op::Lt => op_lt,
        Op::Le => op_le,
        Op::Gt => op_gt,
        Op::Ge => op_ge,
        Op::Abs => op_abs,
        Op::Sign => op_sign,
        Op::Sqrt => op_sqrt,
        Op::Floor => op_floor,
        Op::Ceiling => op_ceiling,
        Op::Trunc => op_trunc,
        Op::Round => op_round,
        Op::Signif => op_signif,
        Op::Exp => op_exp,
        Op::Log => op_log,
        Op::Cos => op_cos,
        Op::Sin => op_sin,
        Op::Tan => op_tan,
        Op::ACos => op_acos,
        Op::ASin => op_asin,
        Op::ATan => op_atan,
        Op::Delay => op_delay,
        Op::SymDelay => op_symdelay,
        Op::Call => op_call,
        Op::DCall => op_dcall,
        Op::Fguard => op_fguard,
        Op::Function => op_function,
        Op::Null => op_null,
        Op::Ret => op_ret,
    }
}

// ── Op handlers. Each returns the pc delta (0 terminates). ────────

fn op_kget(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let v = proto.constants[a as usize].clone();
    interp.trace.record_const(&v);
    interp.stack.push(v);
    Ok(1)
}

fn op_get(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let name = spur_from_bits(a as u32);
    let env = interp.env.clone();
    let v = interp.get_forced(&env, name)?;
    interp.trace.record_load(&v);
    interp.stack.push(v);
    Ok(1)
}

fn op_iget(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let name = spur_from_bits(a as u32);
    let base = interp.base.clone();
    let v = interp.get_forced(&base, name)?;
    interp.stack.push(v);
    Ok(1)
}

fn op_pop(interp: &mut Interpreter, _proto: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.pop1()?;
    Ok(1)
}

fn op_assign(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let name = spur_from_bits(a as u32);
    let v = interp.pop1()?;
    interp
        .env
        .as_environment()
        .expect("current env is an environment")
        .assign(name, v.clone());
    interp.trace.record_store(name, &v);
    interp.stack.push(v);
    Ok(1)
}

enum Attr {
    Class,
    Names,
    Dim,
}

fn attr_assign(interp: &mut Interpreter, a: i64, which: Attr) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Unsupported);
    let name = spur_from_bits(a as u32);
    let attr = interp
        .stack
        .last()
        .cloned()
        .ok_or_else(|| RiposteError::internal("value stack underflow"))?;
    let env = interp.env.clone();
    let current = interp.get_forced(&env, name)?;
    // NULL strips the attribute.
    let stored = if attr.is_null() { Value::nil() } else { attr };
    let key = match which {
        Attr::Class => strings().class,
        Attr::Names => strings().names,
        Attr::Dim => strings().dim,
    };
    let updated = current.set_attribute(key, stored);
    env.as_environment()
        .expect("current env is an environment")
        .assign(name, updated);
    Ok(1)
}

fn op_class_assign(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    attr_assign(interp, a, Attr::Class)
}

fn op_names_assign(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    attr_assign(interp, a, Attr::Names)
}

fn op_dim_assign(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    attr_assign(interp, a, Attr::Dim)
}

fn op_iassign(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Unsupported);
    let name = spur_from_bits(a as u32);
    let index = interp.pop1()?;
    let value = interp.pop1()?;
    let env = interp.env.clone();
    let current = interp.get_forced(&env, name)?;
    let updated = crate::builtins::sub_assign(&current, &index, &value)?;
    env.as_environment()
        .expect("current env is an environment")
        .assign(name, updated.clone());
    interp.stack.push(updated);
    Ok(1)
}

fn op_forbegin(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let name_v = interp.pop1()?;
    let lower_v = interp.pop1()?;
    let upper_v = interp.pop1()?;
    let name = name_v
        .as_symbol()
        .ok_or_else(|| RiposteError::internal("for loop variable is not a symbol"))?;
    let lower = lower_v
        .as_integer1()
        .filter(|i| *i != NA_INTEGER)
        .ok_or_else(|| RiposteError::runtime("invalid for() loop sequence"))?;
    let upper = upper_v
        .as_integer1()
        .filter(|i| *i != NA_INTEGER)
        .ok_or_else(|| RiposteError::runtime("invalid for() loop sequence"))?;

    let count = upper - lower;
    if count < 0 {
        // empty (forward-stepping) range: skip the body entirely
        interp.stack.push(Value::null());
        return Ok(a);
    }
    interp
        .env
        .as_environment()
        .expect("current env is an environment")
        .assign(name, Value::integer(lower));
    interp.stack.push(Value::symbol(name));
    interp.stack.push(Value::integer(lower));
    interp.stack.push(Value::integer(count));
    interp.stack.push(Value::null());
    Ok(1)
}

fn op_forend(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let _body = interp.pop1()?;
    let len = interp.stack.len();
    if len < 4 {
        return Err(RiposteError::internal("for loop state missing"));
    }
    let count = interp.stack[len - 2]
        .as_integer()
        .ok_or_else(|| RiposteError::internal("for loop counter corrupted"))?
        - 1;
    if count >= 0 {
        let current = interp.stack[len - 3]
            .as_integer()
            .ok_or_else(|| RiposteError::internal("for loop variable corrupted"))?
            + 1;
        let name = interp.stack[len - 4]
            .as_symbol()
            .ok_or_else(|| RiposteError::internal("for loop name corrupted"))?;
        interp.stack[len - 2] = Value::integer(count);
        interp.stack[len - 3] = Value::integer(current);
        interp
            .env
            .as_environment()
            .expect("current env is an environment")
            .assign(name, Value::integer(current));
        Ok(-a)
    } else {
        interp.stack.truncate(len - 4);
        interp.stack.push(Value::null());
        Ok(1)
    }
}

fn op_whilebegin(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let cond = interp.pop1()?;
    interp.stack.push(Value::null());
    if Interpreter::condition(&cond)? {
        Ok(1)
    } else {
        Ok(a)
    }
}

fn op_whileend(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let cond = interp.pop1()?;
    let _body = interp.pop1()?;
    if Interpreter::condition(&cond)? {
        Ok(-a)
    } else {
        Ok(1)
    }
}

fn op_repeatbegin(interp: &mut Interpreter, _proto: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    interp.stack.push(Value::null());
    Ok(1)
}

fn op_repeatend(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let _body = interp.pop1()?;
    Ok(-a)
}

fn op_if1(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    let cond = interp.pop1()?;
    if Interpreter::condition(&cond)? {
        Ok(1)
    } else {
        Ok(a)
    }
}

fn op_jmp(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.trace.exit(ExitReason::Branch);
    Ok(a)
}

fn binary_arith_op(interp: &mut Interpreter, op: ArithOp) -> Result<i64, RiposteError> {
    let left = interp.pop1()?;
    let right = interp.pop1()?;
    let r = kernels::binary_arith(op, &left, &right)?;
    interp.trace.record_binary(op, &left, &right, &r);
    interp.stack.push(r);
    Ok(1)
}

fn op_add(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Add)
}
fn op_sub(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Sub)
}
fn op_mul(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Mul)
}
fn op_div(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Div)
}
fn op_idiv(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::IDiv)
}
fn op_mod(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Mod)
}
fn op_pow(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_arith_op(i, ArithOp::Pow)
}

fn op_pos(interp: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let v = interp.pop1()?;
    let r = kernels::unary_arith(false, &v)?;
    interp.stack.push(r);
    Ok(1)
}

fn op_neg(interp: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let v = interp.pop1()?;
    let r = kernels::unary_arith(true, &v)?;
    interp.trace.record_unary(UnaryKind::Neg, &v, &r);
    interp.stack.push(r);
    Ok(1)
}

fn op_lneg(interp: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let v = interp.pop1()?;
    let r = kernels::unary_logical_not(&v)?;
    interp.trace.record_unary(UnaryKind::Not, &v, &r);
    interp.stack.push(r);
    Ok(1)
}

fn binary_logical_op(interp: &mut Interpreter, or: bool) -> Result<i64, RiposteError> {
    let left = interp.pop1()?;
    let right = interp.pop1()?;
    let r = kernels::binary_logical(or, &left, &right)?;
    interp.stack.push(r);
    Ok(1)
}

fn op_land(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_logical_op(i, false)
}
fn op_lor(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_logical_op(i, true)
}

fn binary_compare_op(interp: &mut Interpreter, op: CompareOp) -> Result<i64, RiposteError> {
    let left = interp.pop1()?;
    let right = interp.pop1()?;
    let r = kernels::binary_compare(op, &left, &right)?;
    interp.trace.record_compare(op, &left, &right, &r);
    interp.stack.push(r);
    Ok(1)
}

fn op_eq(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Eq)
}
fn op_neq(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Neq)
}
fn op_lt(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Lt)
}
fn op_le(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Le)
}
fn op_gt(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Gt)
}
fn op_ge(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    binary_compare_op(i, CompareOp::Ge)
}

fn unary_math_op(interp: &mut Interpreter, op: MathOp) -> Result<i64, RiposteError> {
    let v = interp.pop1()?;
    let r = kernels::unary_math(op, &v)?;
    interp.trace.record_unary(UnaryKind::Math(op), &v, &r);
    interp.stack.push(r);
    Ok(1)
}

fn op_abs(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Abs)
}
fn op_sign(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Sign)
}
fn op_sqrt(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Sqrt)
}
fn op_floor(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Floor)
}
fn op_ceiling(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Ceiling)
}
fn op_trunc(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Trunc)
}
fn op_round(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Round)
}
fn op_signif(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Signif)
}
fn op_exp(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Exp)
}
fn op_log(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Log)
}
fn op_cos(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Cos)
}
fn op_sin(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Sin)
}
fn op_tan(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::Tan)
}
fn op_acos(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::ACos)
}
fn op_asin(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::ASin)
}
fn op_atan(i: &mut Interpreter, _p: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    unary_math_op(i, MathOp::ATan)
}

fn op_delay(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let code = proto.constants[a as usize]
        .as_code_rc()
        .ok_or_else(|| RiposteError::internal("delay constant is not code"))?;
    interp
        .stack
        .push(Value::promise_expr(code, interp.env.clone()));
    Ok(1)
}

fn op_symdelay(interp: &mut Interpreter, _proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let name = spur_from_bits(a as u32);
    interp
        .stack
        .push(Value::promise_symbol(name, interp.env.clone()));
    Ok(1)
}

/// Keyword names of a call record's arguments, or empty when unnamed.
pub(crate) fn call_arg_names(record: &Value, argc: usize) -> Vec<Spur> {
    match record.names_of().as_ref().and_then(|n| n.characters_ref()) {
        Some(chars) if chars.len() == argc + 1 => chars[1..].to_vec(),
        _ => Vec::new(),
    }
}

fn op_call(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, b: i64, _c: i64) -> Result<i64, RiposteError> {
    let argc = a as usize;
    let callee = interp.pop1()?;
    let split = interp.stack.len() - argc;
    let mut args: Vec<Value> = interp.stack.drain(split..).collect();
    args.reverse();
    let record = proto.constants[b as usize].clone();
    let names = call_arg_names(&record, argc);
    let r = interp.call_value(callee, args, names, record)?;
    interp.stack.push(r);
    Ok(1)
}

fn op_dcall(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, b: i64, _c: i64) -> Result<i64, RiposteError> {
    let argc = a as usize;
    let callee = interp.pop1()?;
    let split = interp.stack.len() - argc;
    let mut args: Vec<Value> = interp.stack.drain(split..).collect();
    args.reverse();
    let record = proto.constants[b as usize].clone();
    let names = call_arg_names(&record, argc);

    // Expand each `...` marker from the dots of the environment that
    // binds it.
    let dots = strings().dots;
    let empty = strings().empty;
    let mut values = Vec::with_capacity(args.len());
    let mut expanded_names = Vec::with_capacity(args.len());
    for (i, arg) in args.into_iter().enumerate() {
        if arg.as_symbol() == Some(dots) {
            let Some((list, holder)) = Interpreter::find_binding(&interp.env, dots) else {
                return Err(RiposteError::runtime("'...' used in an incorrect context"));
            };
            let items = list
                .list_ref()
                .ok_or_else(|| RiposteError::internal("dots binding is not a list"))?
                .to_vec();
            let holder_env = holder
                .as_environment()
                .expect("binding holders are environments");
            let dot_names = holder_env.dots().clone();
            for (j, v) in items.into_iter().enumerate() {
                values.push(v);
                expanded_names.push(dot_names.get(j).copied().unwrap_or(empty));
            }
        } else {
            values.push(arg);
            expanded_names.push(if names.is_empty() { empty } else { names[i] });
        }
    }
    let expanded_names = if expanded_names.iter().all(|n| *n == empty) {
        Vec::new()
    } else {
        expanded_names
    };

    let r = interp.call_value(callee, values, expanded_names, record)?;
    interp.stack.push(r);
    Ok(1)
}

fn op_fguard(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, b: i64, c: i64) -> Result<i64, RiposteError> {
    let top = interp.pop1()?;
    if top == proto.constants[a as usize] {
        // Guard holds: the specialized sequence follows.
        Ok(1)
    } else {
        // The primitive was rebound; run the generic call and skip the
        // specialized code.
        let slow = proto.constants[b as usize]
            .as_code_rc()
            .ok_or_else(|| RiposteError::internal("fguard slow path is not code"))?;
        let v = interp.run(&slow)?;
        interp.stack.push(v);
        Ok(c)
    }
}

fn op_function(interp: &mut Interpreter, proto: &Rc<Prototype>, a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    let code = proto.constants[a as usize]
        .as_code_rc()
        .ok_or_else(|| RiposteError::internal("function constant is not code"))?;
    interp.stack.push(Value::closure(code, interp.env.clone()));
    Ok(1)
}

fn op_null(interp: &mut Interpreter, _proto: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    interp.stack.push(Value::null());
    Ok(1)
}

fn op_ret(_interp: &mut Interpreter, _proto: &Rc<Prototype>, _a: i64, _b: i64, _c: i64) -> Result<i64, RiposteError> {
    Ok(0)
}
