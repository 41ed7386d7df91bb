//! Method-body evaluator
//!
//! A synchronous stack machine over [`Instr`]. Thrown errors unwind to the
//! innermost exception scope covering the faulting instruction; the handler
//! receives the thrown value on the operand stack. Unhandled errors
//! propagate to the invoker.

use std::sync::Arc;

use crate::host::bytecode::{Const, Instr, MethodBody};
use crate::host::closure::ClosureInstance;
use crate::host::linker;
use crate::host::value::{Thrown, Value};
use crate::host::writer::GeneratedClass;
use crate::metadata::{ClosureMetadata, ReferenceKind};

/// Invoke a zero-argument method on a closure instance.
pub fn invoke(
    class: &GeneratedClass,
    method: &str,
    receiver: &Arc<ClosureInstance>,
) -> Result<Value, Thrown> {
    let body = class
        .methods
        .get(method)
        .ok_or_else(|| Thrown::internal(format!("no such method: {}.{}", class.name, method)))?;
    run(class, body, receiver)
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

/// Execute a method body against a receiver.
pub fn run(
    class: &GeneratedClass,
    body: &MethodBody,
    receiver: &Arc<ClosureInstance>,
) -> Result<Value, Thrown> {
    let mut pc = 0usize;
    let mut stack: Vec<Value> = Vec::new();
    let mut locals = vec![Value::Null; body.local_count as usize];

    loop {
        let instr = body
            .instrs
            .get(pc)
            .ok_or_else(|| Thrown::internal("execution fell off the end of the method"))?;

        match step(class, body, instr, &mut stack, &mut locals, receiver) {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(target)) => pc = target,
            Ok(Flow::Return(value)) => return Ok(value),
            Err(thrown) => match body.handler_for(pc) {
                Some(handler) => {
                    stack.clear();
                    stack.push(Value::Exception(thrown));
                    pc = handler;
                }
                None => return Err(thrown),
            },
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Thrown> {
    stack
        .pop()
        .ok_or_else(|| Thrown::internal("operand stack underflow"))
}

fn pop_str(stack: &mut Vec<Value>) -> Result<String, Thrown> {
    match pop(stack)? {
        Value::Str(s) => Ok(s),
        other => Err(Thrown::internal(format!("expected string, got {:?}", other))),
    }
}

fn step(
    class: &GeneratedClass,
    body: &MethodBody,
    instr: &Instr,
    stack: &mut Vec<Value>,
    locals: &mut [Value],
    receiver: &Arc<ClosureInstance>,
) -> Result<Flow, Thrown> {
    match instr {
        Instr::LoadSelf => stack.push(Value::Closure(receiver.clone())),
        Instr::ConstNull => stack.push(Value::Null),
        Instr::LoadLocal(slot) => {
            let value = locals
                .get(*slot as usize)
                .cloned()
                .ok_or_else(|| Thrown::internal(format!("load of unallocated slot {}", slot)))?;
            stack.push(value);
        }
        Instr::StoreLocal(slot) => {
            let value = pop(stack)?;
            let cell = locals
                .get_mut(*slot as usize)
                .ok_or_else(|| Thrown::internal(format!("store to unallocated slot {}", slot)))?;
            *cell = value;
        }
        Instr::LoadConst(idx) => match body.constants.get(*idx as usize) {
            Some(Const::Str(s)) => stack.push(Value::Str(s.clone())),
            Some(Const::Int(n)) => stack.push(Value::Int(*n)),
            _ => return Err(Thrown::internal(format!("bad constant index {}", idx))),
        },
        Instr::ResolveCallSite(idx) => {
            let cs = match body.constants.get(*idx as usize) {
                Some(Const::CallSite(cs)) => cs,
                _ => return Err(Thrown::internal(format!("bad call-site index {}", idx))),
            };
            let bound = cs.bind_with(|| match linker::lookup(&cs.symbol, class.scope) {
                Some(bootstrap) => bootstrap(&cs.args),
                None => Err(Thrown::no_def(&cs.symbol)),
            })?;
            stack.push(bound);
        }
        Instr::CallIndirect(argc) => {
            let mut args = vec![Value::Null; *argc as usize];
            for slot in args.iter_mut().rev() {
                *slot = pop(stack)?;
            }
            let callee = match pop(stack)? {
                Value::Fn(f) => f,
                other => {
                    return Err(Thrown::internal(format!(
                        "call target is not callable: {:?}",
                        other
                    )))
                }
            };
            stack.push(callee(&args)?);
        }
        Instr::NewMetadata => {
            let modifiers = match pop(stack)? {
                Value::Int(n) => n as u16,
                other => {
                    return Err(Thrown::internal(format!("bad modifiers operand: {:?}", other)))
                }
            };
            let kind_code = match pop(stack)? {
                Value::Int(n) => n,
                other => {
                    return Err(Thrown::internal(format!(
                        "bad reference-kind operand: {:?}",
                        other
                    )))
                }
            };
            let reference_kind = ReferenceKind::from_code(kind_code as u8)
                .ok_or_else(|| Thrown::internal(format!("bad reference kind {}", kind_code)))?;
            let signature = pop_str(stack)?;
            let member_name = pop_str(stack)?;
            let declaring_type = pop_str(stack)?;
            let target_type = pop_str(stack)?;
            stack.push(Value::Metadata(ClosureMetadata::new(
                target_type,
                declaring_type,
                member_name,
                signature,
                reference_kind,
                modifiers,
            )));
        }
        Instr::TypeName => match pop(stack)? {
            Value::Exception(t) => stack.push(Value::Str(t.type_name)),
            other => {
                return Err(Thrown::internal(format!(
                    "TypeName on non-exception: {:?}",
                    other
                )))
            }
        },
        Instr::StrEq => {
            let b = pop_str(stack)?;
            let a = pop_str(stack)?;
            stack.push(Value::Bool(a == b));
        }
        Instr::Jump(target) => return Ok(Flow::Jump(*target)),
        Instr::JumpIfFalse(target) => match pop(stack)? {
            Value::Bool(false) => return Ok(Flow::Jump(*target)),
            Value::Bool(true) => {}
            other => {
                return Err(Thrown::internal(format!(
                    "branch on non-boolean: {:?}",
                    other
                )))
            }
        },
        Instr::Throw => match pop(stack)? {
            Value::Exception(t) => return Err(t),
            other => {
                return Err(Thrown::internal(format!(
                    "throw of non-exception: {:?}",
                    other
                )))
            }
        },
        Instr::ReprSelf => match pop(stack)? {
            Value::Closure(c) => stack.push(Value::Str(c.default_repr())),
            other => {
                return Err(Thrown::internal(format!(
                    "ReprSelf on non-closure: {:?}",
                    other
                )))
            }
        },
        Instr::Return => return Ok(Flow::Return(pop(stack)?)),
    }
    Ok(Flow::Next)
}
