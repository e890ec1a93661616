//! The register VM (§4.5): loads a [`bytecode::Module`], dispatches its
//! instructions, and produces a single runtime [`Value`].
//!
//! Call frames are modeled directly on the Rust call stack: [`Vm::run`]
//! recurses once per `CallR`/default-thunk evaluation and returns the
//! callee's result to its caller, which is exactly the "unwrap Return at
//! frame exit" invariant (§3.2 invariant c, §8 I5) — there is no separate
//! `Value::Return` ever materialized, since a block's only way to finish
//! *is* `Terminator::Return`, and this function returning to its own
//! caller already is that unwrap. A switch over [`Opcode`] does the
//! actual dispatch; the spec treats this, a computed-goto table, and
//! tail-call chaining as observationally equivalent (§4.5).

mod host;
mod ops;
mod reader;

pub use host::HostValue;

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::rc::Rc;

use crate::bytecode::{self, decode_type_tag, BytecodeError, FunctionRecord, Module, Opcode};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::value::{child_env, Closure, Environment, EnvRef, Value};

use reader::CodeReader;

/// Default call-depth limit (§5 Resource limits): "Call depth is bounded
/// by an implementation-configurable limit (default 1024 frames)".
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// The default-value thunk functions `mir::build` synthesizes (one per
/// optional parameter) are named with this prefix and are never bound
/// into the global environment as callable utilities — only `CallR`
/// (resolved statically to a function index at assembly time) or this
/// VM's own parameter-binding logic ever invokes them.
fn is_default_thunk(name: &str) -> bool {
    name.starts_with("__default_")
}

enum ArgValue {
    Positional(Value),
    Named(String, Value),
}

/// A loaded module ready to execute (§6 VM surface: `load`, `setDebug`,
/// `execute`, `instructionCount`).
pub struct Vm {
    module: Module,
    debug: bool,
    instruction_count: u64,
    max_call_depth: usize,
    output: Box<dyn Write>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("module", &self.module.name)
            .field("debug", &self.debug)
            .field("instruction_count", &self.instruction_count)
            .finish()
    }
}

impl Vm {
    /// `load(bytes) -> module` (§6): verifies magic and version and
    /// returns a structured error on mismatch.
    pub fn load(bytes: &[u8]) -> Result<Vm, BytecodeError> {
        let module = bytecode::decode(bytes)?;
        Ok(Vm::from_module(module))
    }

    pub fn from_module(module: Module) -> Vm {
        Vm {
            module,
            debug: false,
            instruction_count: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            output: Box::new(std::io::stdout()),
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// `instructionCount() -> integer` (§6): total instructions dispatched
    /// by the most recent (or current) [`Vm::execute`] call.
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Redirects `Say` output away from stdout — primarily for tests that
    /// need to assert on printed lines.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// `execute() -> value` (§6): runs the module's top-level function to
    /// completion and returns its final value, or a tagged [`Value::Error`]
    /// if a runtime error propagated all the way out (§7 Propagation) —
    /// execute itself never panics or returns a `Result`.
    pub fn execute(&mut self) -> Value {
        self.instruction_count = 0;
        let root_env = Environment::new().into_ref();
        self.bind_utilities(&root_env);

        match self.run(0, self.module.top_level_register_count, root_env, 0) {
            Ok(value) => value,
            Err(err) => Value::Error(Rc::new(err)),
        }
    }

    /// Registers every non-thunk function as a [`Value::Function`] closure
    /// in the root environment before any statement runs, so forward
    /// references and mutual/self-recursion resolve (§9 "Recursive
    /// utilities", §3.3 "Forward references ... permitted because utility
    /// definitions are scanned before execution begins").
    fn bind_utilities(&self, root_env: &EnvRef) {
        for (idx, function) in self.module.functions.iter().enumerate() {
            if is_default_thunk(&function.name) {
                continue;
            }
            let closure = Value::Function(Rc::new(Closure {
                name: function.name.clone(),
                function_index: idx as u32,
                env: Rc::clone(root_env),
            }));
            root_env.borrow_mut().define(function.name.clone(), closure);
        }
    }

    /// Runs one activation record to completion: a fresh register file,
    /// a cursor over the shared instruction stream starting at
    /// `entry_offset`, and `env` as the frame's environment (§4.5 "each
    /// frame owns a register array ... an instruction pointer, and a
    /// pointer to the captured environment").
    fn run(
        &mut self,
        entry_offset: u32,
        register_count: u16,
        env: EnvRef,
        depth: usize,
    ) -> Result<Value, RuntimeError> {
        if depth >= self.max_call_depth {
            return Err(RuntimeError::new(RuntimeErrorKind::StackOverflow(self.max_call_depth)));
        }

        let mut registers: Vec<Value> = vec![Value::Empty; register_count as usize];
        let mut reader = CodeReader::new(&self.module.code, entry_offset);

        loop {
            self.instruction_count += 1;
            let pc = reader.pc();
            let opcode = reader.opcode()?;
            if self.debug {
                eprintln!("[vm] pc={pc} {opcode:?}");
            }

            match opcode {
                Opcode::LoadConstR => {
                    let dst = reader.u8()?;
                    let idx = reader.u16()?;
                    let value = self.const_value(idx)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::CopyR => {
                    let dst = reader.u8()?;
                    let src = reader.u8()?;
                    let value = get_reg(&registers, src)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::LoadNameR => {
                    let dst = reader.u8()?;
                    let idx = reader.u16()?;
                    let name = self.const_str(idx)?.to_string();
                    let value = env
                        .borrow()
                        .get(&name)
                        .ok_or(RuntimeError::new(RuntimeErrorKind::UnknownIdentifier(name)))?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::StoreNameR => {
                    let idx = reader.u16()?;
                    let src = reader.u8()?;
                    let name = self.const_str(idx)?.to_string();
                    let value = get_reg(&registers, src)?;
                    env.borrow_mut().set(name, value);
                }
                Opcode::AddR => self.binop(&mut reader, &mut registers, ops::add)?,
                Opcode::SubR => self.binop(&mut reader, &mut registers, ops::sub)?,
                Opcode::MulR => self.binop(&mut reader, &mut registers, ops::mul)?,
                Opcode::DivR => self.binop(&mut reader, &mut registers, ops::div)?,
                Opcode::EqR => {
                    let (dst, lhs, rhs) = self.binop_regs(&mut reader, &registers)?;
                    set_reg(&mut registers, dst, Value::Boolean(lhs.value_eq(&rhs)))?;
                }
                Opcode::StrictEqR => {
                    let (dst, lhs, rhs) = self.binop_regs(&mut reader, &registers)?;
                    set_reg(&mut registers, dst, Value::Boolean(lhs.strict_eq(&rhs)))?;
                }
                Opcode::StrictNeR => {
                    let (dst, lhs, rhs) = self.binop_regs(&mut reader, &registers)?;
                    set_reg(&mut registers, dst, Value::Boolean(!lhs.strict_eq(&rhs)))?;
                }
                Opcode::LtR => self.binop(&mut reader, &mut registers, ops::lt)?,
                Opcode::LeR => self.binop(&mut reader, &mut registers, ops::le)?,
                Opcode::GtR => self.binop(&mut reader, &mut registers, ops::gt)?,
                Opcode::GeR => self.binop(&mut reader, &mut registers, ops::ge)?,
                Opcode::NegR => {
                    let dst = reader.u8()?;
                    let src = reader.u8()?;
                    let value = ops::neg(&get_reg(&registers, src)?)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::NotR => {
                    let dst = reader.u8()?;
                    let src = reader.u8()?;
                    let value = ops::not(&get_reg(&registers, src)?)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::JumpR => {
                    let target = reader.i32()?;
                    reader.seek(target as u32);
                }
                Opcode::BranchIfTrueR => {
                    let cond = reader.u8()?;
                    let target = reader.i32()?;
                    if as_bool(&get_reg(&registers, cond)?)? {
                        reader.seek(target as u32);
                    }
                }
                Opcode::BranchIfFalseR => {
                    let cond = reader.u8()?;
                    let target = reader.i32()?;
                    if !as_bool(&get_reg(&registers, cond)?)? {
                        reader.seek(target as u32);
                    }
                }
                Opcode::CallR => {
                    self.dispatch_call(&mut reader, &mut registers, &env, depth)?;
                }
                Opcode::SayR => {
                    let src = reader.u8()?;
                    let value = get_reg(&registers, src)?;
                    // OQ2: flush immediately; `Say` has no value of its own.
                    let _ = writeln!(self.output, "{}", value.inspect());
                }
                Opcode::NewListR => {
                    let dst = reader.u8()?;
                    let tag = reader.u8()?;
                    let elem_ty = if tag == 0 {
                        None
                    } else {
                        Some(decode_type_tag(tag - 1).map_err(|e| malformed(e.to_string()))?)
                    };
                    set_reg(&mut registers, dst, Value::list(elem_ty))?;
                }
                Opcode::NewDictR => {
                    let dst = reader.u8()?;
                    set_reg(&mut registers, dst, Value::dict())?;
                }
                Opcode::ListAppendR => {
                    let list = reader.u8()?;
                    let value = reader.u8()?;
                    let list = get_reg(&registers, list)?;
                    let value = get_reg(&registers, value)?;
                    list_append(list, value)?;
                }
                Opcode::ListSetR => {
                    let list = reader.u8()?;
                    let index = reader.u8()?;
                    let value = reader.u8()?;
                    let list_v = get_reg(&registers, list)?;
                    let index_v = get_reg(&registers, index)?;
                    let value_v = get_reg(&registers, value)?;
                    list_set(list_v, index_v, value_v)?;
                }
                Opcode::ListGetR => {
                    let dst = reader.u8()?;
                    let list = reader.u8()?;
                    let index = reader.u8()?;
                    let list_v = get_reg(&registers, list)?;
                    let index_v = get_reg(&registers, index)?;
                    let value = list_get(list_v, index_v)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::ListInsertR => {
                    let list = reader.u8()?;
                    let index = reader.u8()?;
                    let value = reader.u8()?;
                    let list_v = get_reg(&registers, list)?;
                    let index_v = get_reg(&registers, index)?;
                    let value_v = get_reg(&registers, value)?;
                    list_insert(list_v, index_v, value_v)?;
                }
                Opcode::ListRemoveR => {
                    let list = reader.u8()?;
                    let value = reader.u8()?;
                    let list_v = get_reg(&registers, list)?;
                    let value_v = get_reg(&registers, value)?;
                    list_remove(list_v, value_v)?;
                }
                Opcode::ListLenR => {
                    let dst = reader.u8()?;
                    let list = reader.u8()?;
                    let list_v = get_reg(&registers, list)?;
                    let len = list_len(list_v)?;
                    set_reg(&mut registers, dst, Value::Integer(len as i64))?;
                }
                Opcode::DictSetR => {
                    let dict = reader.u8()?;
                    let key = reader.u8()?;
                    let value = reader.u8()?;
                    let dict_v = get_reg(&registers, dict)?;
                    let key_v = get_reg(&registers, key)?;
                    let value_v = get_reg(&registers, value)?;
                    dict_set(dict_v, key_v, value_v)?;
                }
                Opcode::DictGetR => {
                    let dst = reader.u8()?;
                    let dict = reader.u8()?;
                    let key = reader.u8()?;
                    let dict_v = get_reg(&registers, dict)?;
                    let key_v = get_reg(&registers, key)?;
                    let value = dict_get(dict_v, key_v)?;
                    set_reg(&mut registers, dst, value)?;
                }
                Opcode::ReturnR => {
                    let has_value = reader.u8()? != 0;
                    let src = reader.u8()?;
                    let value = if has_value { get_reg(&registers, src)? } else { Value::Empty };
                    return Ok(value);
                }
            }
        }
    }

    fn binop(
        &mut self,
        reader: &mut CodeReader<'_>,
        registers: &mut [Value],
        f: impl Fn(&Value, &Value) -> Result<Value, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let dst = reader.u8()?;
        let lhs = reader.u8()?;
        let rhs = reader.u8()?;
        let lhs = get_reg(registers, lhs)?;
        let rhs = get_reg(registers, rhs)?;
        let value = f(&lhs, &rhs)?;
        set_reg(registers, dst, value)
    }

    fn binop_regs(
        &mut self,
        reader: &mut CodeReader<'_>,
        registers: &[Value],
    ) -> Result<(u8, Value, Value), RuntimeError> {
        let dst = reader.u8()?;
        let lhs = reader.u8()?;
        let rhs = reader.u8()?;
        Ok((dst, get_reg(registers, lhs)?, get_reg(registers, rhs)?))
    }

    fn const_value(&self, idx: u16) -> Result<Value, RuntimeError> {
        let constant = self
            .module
            .constants
            .get(idx as usize)
            .ok_or_else(|| malformed(format!("constant index {idx} out of range")))?;
        Ok(match constant {
            bytecode::Constant::Integer(n) => Value::Integer(*n),
            bytecode::Constant::Float(x) => Value::Float(*x),
            bytecode::Constant::String(s) => Value::string(s.clone()),
            bytecode::Constant::Boolean(b) => Value::Boolean(*b),
            bytecode::Constant::Empty => Value::Empty,
        })
    }

    fn const_str(&self, idx: u16) -> Result<&str, RuntimeError> {
        match self.module.constants.get(idx as usize) {
            Some(bytecode::Constant::String(s)) => Ok(s.as_str()),
            Some(_) => Err(malformed(format!("constant {idx} is not a string"))),
            None => Err(malformed(format!("constant index {idx} out of range"))),
        }
    }

    /// `CallR`'s full call protocol (§4.5): evaluate argument registers
    /// left to right, bind parameters positionally/by-name/by-default, run
    /// the callee in a fresh frame opened off its *definition* environment,
    /// and write the unwrapped result into the caller's destination
    /// register.
    fn dispatch_call(
        &mut self,
        reader: &mut CodeReader<'_>,
        registers: &mut [Value],
        caller_env: &EnvRef,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        let has_dst = reader.u8()? != 0;
        let dst = reader.u8()?;
        let fn_idx = reader.u16()?;
        let argc = reader.u8()?;

        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            let kind_tag = reader.u8()?;
            let name_idx = reader.u16()?;
            let reg = reader.u8()?;
            let value = get_reg(registers, reg)?;
            if kind_tag == 0 {
                args.push(ArgValue::Positional(value));
            } else {
                let name = self.const_str(name_idx)?.to_string();
                args.push(ArgValue::Named(name, value));
            }
        }

        let record = self
            .module
            .functions
            .get(fn_idx as usize)
            .cloned()
            .ok_or_else(|| malformed(format!("call to unknown function index {fn_idx}")))?;

        // The utility's closure (bound at `bind_utilities`) carries its
        // definition environment; calling it opens a fresh child frame
        // whose parent is that captured environment, never the caller's
        // (§3.3 lexical capture, §9).
        let closure_env = self.closure_env_for(&record.name, caller_env);
        let call_env = child_env(&closure_env);

        self.bind_params(&record, args, &call_env, &closure_env, depth)?;

        let result = self.run(record.entry_offset, record.register_count, call_env, depth + 1)?;
        if has_dst {
            set_reg(registers, dst, result)?;
        }
        Ok(())
    }

    /// The environment a function's body should run against: the one
    /// captured in its global closure binding, falling back to the
    /// caller's environment for default-value thunks (never bound as a
    /// named closure, so they have no entry to look up).
    fn closure_env_for(&self, name: &str, caller_env: &EnvRef) -> EnvRef {
        if is_default_thunk(name) {
            return Rc::clone(caller_env);
        }
        // Every non-thunk function was bound into the root environment at
        // `bind_utilities`; walk from the caller up to find it (the root
        // is always reachable since every frame's env chains back to it).
        let mut env = Rc::clone(caller_env);
        loop {
            if let Some(Value::Function(c)) = env.borrow().get(name) {
                return c.env.clone();
            }
            let parent = env.borrow().parent();
            match parent {
                Some(p) => env = p,
                None => return Rc::clone(caller_env),
            }
        }
    }

    /// Binds a call's arguments to `record`'s parameters (§4.5 call
    /// protocol): a named argument wins regardless of position, then
    /// positional arguments fill remaining parameters left to right, then
    /// an unbound parameter with a default thunk has that thunk evaluated
    /// in the callee's *definition* environment, and finally an unbound
    /// required parameter raises `MissingRequiredParameter`. An unbound
    /// optional parameter with no default binds to `Empty`.
    fn bind_params(
        &mut self,
        record: &FunctionRecord,
        args: Vec<ArgValue>,
        call_env: &EnvRef,
        closure_env: &EnvRef,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        let mut named: HashMap<String, Value> = HashMap::new();
        let mut positional: VecDeque<Value> = VecDeque::new();
        for arg in args {
            match arg {
                ArgValue::Positional(v) => positional.push_back(v),
                ArgValue::Named(name, v) => {
                    named.insert(name, v);
                }
            }
        }

        for param in &record.params {
            let value = if let Some(v) = named.remove(&param.name) {
                v
            } else if let Some(v) = positional.pop_front() {
                v
            } else if let Some(default_idx) = param.default_fn {
                let thunk = self
                    .module
                    .functions
                    .get(default_idx as usize)
                    .cloned()
                    .ok_or_else(|| malformed(format!("default thunk index {default_idx} out of range")))?;
                self.run(thunk.entry_offset, thunk.register_count, Rc::clone(closure_env), depth + 1)?
            } else if param.required {
                return Err(RuntimeError::new(RuntimeErrorKind::MissingRequiredParameter(param.name.clone())));
            } else {
                Value::Empty
            };
            call_env.borrow_mut().define(param.name.clone(), value);
        }
        Ok(())
    }
}

fn malformed(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::MalformedBytecode(msg.into()))
}

fn not_a(kind: &str, value: &Value) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
        "expected {kind}, found {}",
        value.type_name()
    )))
}

fn get_reg(registers: &[Value], idx: u8) -> Result<Value, RuntimeError> {
    registers
        .get(idx as usize)
        .cloned()
        .ok_or_else(|| malformed(format!("register r{idx} out of range")))
}

fn set_reg(registers: &mut [Value], idx: u8, value: Value) -> Result<(), RuntimeError> {
    let slot = registers
        .get_mut(idx as usize)
        .ok_or_else(|| malformed(format!("register r{idx} out of range")))?;
    *slot = value;
    Ok(())
}

fn as_bool(value: &Value) -> Result<bool, RuntimeError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
            "branch condition must be Yes/No, found {}",
            other.type_name()
        )))),
    }
}

/// `Add x to L` (§4.5 Collections): checks the list's declared element
/// type, if any, before appending.
fn list_append(list: Value, value: Value) -> Result<(), RuntimeError> {
    match list {
        Value::List(l) => {
            l.borrow().check_elem(&value)?;
            l.borrow_mut().items.push(value);
            Ok(())
        }
        other => Err(not_a("List", &other)),
    }
}

fn list_set(list: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
    match list {
        Value::List(l) => {
            let idx = ops::list_index(&index, l.borrow().items.len())?;
            l.borrow().check_elem(&value)?;
            l.borrow_mut().items[idx] = value;
            Ok(())
        }
        other => Err(not_a("List", &other)),
    }
}

fn list_get(list: Value, index: Value) -> Result<Value, RuntimeError> {
    match list {
        Value::List(l) => {
            let idx = ops::list_index(&index, l.borrow().items.len())?;
            Ok(l.borrow().items[idx].clone())
        }
        other => Err(not_a("List", &other)),
    }
}

fn list_insert(list: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
    match list {
        Value::List(l) => {
            let idx = ops::insert_position(&index, l.borrow().items.len())?;
            l.borrow().check_elem(&value)?;
            l.borrow_mut().items.insert(idx, value);
            Ok(())
        }
        other => Err(not_a("List", &other)),
    }
}

/// `Remove x from L` (§4.5): removes the first element equal to `x` by
/// value equality, or raises `NotFound` if no element matches.
fn list_remove(list: Value, value: Value) -> Result<(), RuntimeError> {
    match list {
        Value::List(l) => {
            let mut list = l.borrow_mut();
            match list.items.iter().position(|v| v.value_eq(&value)) {
                Some(pos) => {
                    list.items.remove(pos);
                    Ok(())
                }
                None => Err(RuntimeError::new(RuntimeErrorKind::NotFound)),
            }
        }
        other => Err(not_a("List", &other)),
    }
}

fn list_len(list: Value) -> Result<usize, RuntimeError> {
    match list {
        Value::List(l) => Ok(l.borrow().items.len()),
        other => Err(not_a("List", &other)),
    }
}

fn dict_set(dict: Value, key: Value, value: Value) -> Result<(), RuntimeError> {
    match dict {
        Value::Dict(d) => {
            let key = ops::dict_key(&key)?;
            d.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(not_a("Named List", &other)),
    }
}

fn dict_get(dict: Value, key: Value) -> Result<Value, RuntimeError> {
    match dict {
        Value::Dict(d) => {
            let key = ops::dict_key(&key)?;
            d.borrow()
                .get(&key)
                .cloned()
                .ok_or(RuntimeError::new(RuntimeErrorKind::KeyNotFound(key)))
        }
        other => Err(not_a("Named List", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encode::InstrWriter;
    use crate::bytecode::{Constant, FunctionRecord, ParamRecord};

    fn top_level_module(constants: Vec<Constant>, w: InstrWriter, register_count: u16) -> Module {
        Module {
            version: bytecode::VERSION,
            flags: 0,
            name: "m".to_string(),
            constants,
            functions: vec![],
            code: w.code,
            top_level_register_count: register_count,
        }
    }

    #[test]
    fn arithmetic_and_return_round_trip_through_execute() {
        // r0 = 2, r1 = 3, r2 = r0 + r1, return r2
        let mut w = InstrWriter::new();
        w.load_const(0, 0);
        w.load_const(1, 1);
        w.add(2, 0, 1);
        w.ret(Some(2));
        let module = top_level_module(vec![Constant::Integer(2), Constant::Integer(3)], w, 3);
        let mut vm = Vm::from_module(module);
        assert!(matches!(vm.execute(), Value::Integer(5)));
    }

    #[test]
    fn division_always_yields_float() {
        let mut w = InstrWriter::new();
        w.load_const(0, 0);
        w.load_const(1, 1);
        w.div(2, 0, 1);
        w.ret(Some(2));
        let module = top_level_module(vec![Constant::Integer(10), Constant::Integer(4)], w, 3);
        let mut vm = Vm::from_module(module);
        assert!(matches!(vm.execute(), Value::Float(x) if x == 2.5));
    }

    #[test]
    fn store_and_load_name_round_trip_through_environment() {
        // r0 = 7, x := r0, r1 = x, return r1
        let mut w = InstrWriter::new();
        w.load_const(0, 0);
        w.store_name(1, 0);
        w.load_name(1, 1);
        w.ret(Some(1));
        let module = top_level_module(vec![Constant::Integer(7), Constant::String("x".into())], w, 2);
        let mut vm = Vm::from_module(module);
        assert!(matches!(vm.execute(), Value::Integer(7)));
    }

    #[test]
    fn unknown_identifier_surfaces_as_a_runtime_error_value() {
        let mut w = InstrWriter::new();
        w.load_name(0, 0);
        w.ret(Some(0));
        let module = top_level_module(vec![Constant::String("missing".into())], w, 1);
        let mut vm = Vm::from_module(module);
        match vm.execute() {
            Value::Error(e) => assert!(matches!(e.kind, RuntimeErrorKind::UnknownIdentifier(_))),
            other => panic!("expected an Error value, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_parameter_raises_runtime_error() {
        let record = FunctionRecord {
            name: "greet".into(),
            params: vec![ParamRecord {
                name: "name".into(),
                required: true,
                default_fn: None,
            }],
            output_ty: crate::ast::TypeAnn::Empty,
            register_count: 1,
            entry_offset: 0,
        };
        let mut w = InstrWriter::new();
        w.ret(None);
        let module = Module {
            version: bytecode::VERSION,
            flags: 0,
            name: "m".into(),
            constants: vec![],
            functions: vec![record.clone()],
            code: w.code,
            top_level_register_count: 0,
        };
        let mut vm = Vm::from_module(module);
        let env = Environment::new().into_ref();
        let err = vm.bind_params(&record, vec![], &env, &env, 0).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::MissingRequiredParameter("name".into()));
    }

    #[test]
    fn unbound_optional_parameter_defaults_to_empty() {
        let record = FunctionRecord {
            name: "greet".into(),
            params: vec![ParamRecord {
                name: "title".into(),
                required: false,
                default_fn: None,
            }],
            output_ty: crate::ast::TypeAnn::Empty,
            register_count: 0,
            entry_offset: 0,
        };
        let module = Module {
            version: bytecode::VERSION,
            flags: 0,
            name: "m".into(),
            constants: vec![],
            functions: vec![record.clone()],
            code: vec![],
            top_level_register_count: 0,
        };
        let mut vm = Vm::from_module(module);
        let env = Environment::new().into_ref();
        vm.bind_params(&record, vec![], &env, &env, 0).unwrap();
        assert!(matches!(env.borrow().get("title"), Some(Value::Empty)));
    }

    #[test]
    fn named_argument_binds_by_parameter_name_regardless_of_order() {
        let record = FunctionRecord {
            name: "greet".into(),
            params: vec![
                ParamRecord {
                    name: "greeting".into(),
                    required: true,
                    default_fn: None,
                },
                ParamRecord {
                    name: "name".into(),
                    required: true,
                    default_fn: None,
                },
            ],
            output_ty: crate::ast::TypeAnn::Empty,
            register_count: 0,
            entry_offset: 0,
        };
        let module = Module {
            version: bytecode::VERSION,
            flags: 0,
            name: "m".into(),
            constants: vec![],
            functions: vec![record.clone()],
            code: vec![],
            top_level_register_count: 0,
        };
        let mut vm = Vm::from_module(module);
        let env = Environment::new().into_ref();
        let args = vec![
            ArgValue::Named("name".into(), Value::string("Ada")),
            ArgValue::Named("greeting".into(), Value::string("Hi")),
        ];
        vm.bind_params(&record, args, &env, &env, 0).unwrap();
        assert!(matches!(env.borrow().get("name"), Some(Value::String(s)) if &*s == "Ada"));
        assert!(matches!(env.borrow().get("greeting"), Some(Value::String(s)) if &*s == "Hi"));
    }

    #[test]
    fn list_append_then_len_reflects_growth() {
        let list = Value::list(None);
        list_append(list.clone(), Value::Integer(1)).unwrap();
        list_append(list.clone(), Value::Integer(2)).unwrap();
        assert_eq!(list_len(list).unwrap(), 2);
    }

    #[test]
    fn list_remove_raises_not_found_when_absent() {
        let list = Value::list(None);
        let err = list_remove(list, Value::Integer(9)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::NotFound);
    }

    #[test]
    fn dict_get_missing_key_raises_key_not_found() {
        let dict = Value::dict();
        let err = dict_get(dict, Value::string("missing")).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::KeyNotFound(_)));
    }
}
