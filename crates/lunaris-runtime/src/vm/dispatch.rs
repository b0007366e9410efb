//! Instruction dispatch

use super::{FrameFlags, Handlers, Processor, StepOutcome};
use crate::bytecode::{ByteCode, Instruction, OpCode};
use crate::closure::{new_cell, ClosureRef, ValueCell};
use crate::error::{RuntimeError, RuntimeResult, ScriptError, ScriptErrorKind};
use crate::metamethod::Operator;
use crate::symbol::SymbolRef;
use crate::value::Value;
use std::rc::Rc;
use tracing::trace;

const FOR_OPERANDS: [&str; 3] = ["initial value", "limit", "step"];

impl Processor {
    /// Execute the instruction at `ip`
    pub(super) fn step(&mut self) -> RuntimeResult<StepOutcome> {
        let Some(code) = self.code.clone() else {
            return Err(RuntimeError::internal("no bytecode loaded"));
        };
        let at = self.ip;
        let Some(instruction) = code.instructions.get(at) else {
            return Err(RuntimeError::internal(format!("instruction pointer {} out of range", at)));
        };
        self.ip += 1;
        self.execute(&code, instruction).map_err(|err| match err {
            RuntimeError::Script(e) => RuntimeError::Script(e.with_location(code.location(at))),
            other => other,
        })
    }

    fn execute(&mut self, code: &Rc<ByteCode>, i: &Instruction) -> RuntimeResult<StepOutcome> {
        match i.op {
            // ===== Stack =====
            OpCode::Nop => {}
            OpCode::Pop => {
                self.pop_n(i.num_val)?;
            }
            OpCode::Copy => {
                let value = self.peek(i.num_val)?.clone();
                self.push(value);
            }
            OpCode::Swap => {
                let len = self.stack.len();
                let (Some(a), Some(b)) = (
                    len.checked_sub(i.num_val + 1),
                    len.checked_sub(i.num_val2 + 1),
                ) else {
                    return Err(RuntimeError::internal("value stack underflow"));
                };
                self.stack.swap(a, b);
            }
            OpCode::Literal => {
                let value = operand_value(i)?.clone();
                self.push(value);
            }
            OpCode::MkTuple => {
                let values = self.pop_n(i.num_val)?;
                self.push(Value::tuple(values));
            }
            OpCode::Scalar => {
                let value = self.pop()?;
                self.push(value.to_scalar());
            }

            // ===== Variables =====
            OpCode::Load => return self.exec_load(operand_symbol(i)?),
            OpCode::Store => {
                let value = self.peek(i.num_val)?.tuple_item(i.num_val2);
                return self.exec_store(operand_symbol(i)?, value);
            }
            OpCode::Clean => {
                let frame = self.top_frame_mut()?;
                let end = (i.num_val + i.num_val2).min(frame.locals.len());
                for slot in i.num_val..end {
                    frame.locals[slot] = new_cell(Value::Nil);
                }
            }

            // ===== Functions =====
            OpCode::Closure => self.exec_closure(code, i)?,
            OpCode::BeginFn => {
                let frame = self.top_frame_mut()?;
                frame.locals = (0..i.num_val).map(|_| new_cell(Value::Nil)).collect();
            }
            OpCode::Args => self.exec_args(i)?,
            OpCode::Call | OpCode::ThisCall => return self.exec_call_op(i),
            OpCode::Ret => {
                let value = if i.num_val == 1 { self.pop()? } else { Value::Void };
                let Some(frame) = self.frames.pop() else {
                    return Err(RuntimeError::internal("return without a frame"));
                };
                self.stack.truncate(frame.base_pointer);
                return self.finish_frame(frame, value);
            }

            // ===== Tables =====
            OpCode::NewTable => {
                let table = self.shared.new_table();
                self.push(Value::Table(table));
            }
            OpCode::TblInitN => {
                let value = self.pop()?;
                let key = self.pop()?;
                table_operand(self.peek(0)?)?.set(key.to_scalar(), value.to_storable())?;
            }
            OpCode::TblInitI => {
                let value = self.pop()?;
                let table = table_operand(self.peek(0)?)?.clone();
                let start = i.num_val as i64;
                match value {
                    Value::Tuple(items) if i.num_val2 == 1 => {
                        let mut table = table.borrow_mut();
                        for (offset, item) in items.iter().enumerate() {
                            table.set_int(start + offset as i64, item.to_storable());
                        }
                    }
                    other => table.borrow_mut().set_int(start, other.to_storable()),
                }
            }
            OpCode::Index => {
                let key = self.pop()?;
                let obj = self.pop()?;
                let resolved = self.resolve_index(obj, key.to_scalar())?;
                return self.push_resolved(resolved);
            }
            OpCode::IndexN => {
                let obj = self.pop()?;
                let resolved = self.resolve_index(obj, operand_value(i)?.clone())?;
                return self.push_resolved(resolved);
            }
            OpCode::IndexL => {
                let keys = self.pop()?;
                let obj = self.pop()?.to_scalar();
                let Value::UserData(data) = &obj else {
                    return Err(multi_key_error(&obj).into());
                };
                let value = data.descriptor().index(data, &keys)?;
                self.push(value);
            }
            OpCode::IndexSet => {
                let key = self.pop()?;
                let obj = self.pop()?;
                let value = self.peek(i.num_val)?.tuple_item(i.num_val2);
                return self.finish_new_index(obj, key.to_scalar(), value);
            }
            OpCode::IndexSetN => {
                let obj = self.pop()?;
                let value = self.peek(i.num_val)?.tuple_item(i.num_val2);
                return self.finish_new_index(obj, operand_value(i)?.clone(), value);
            }
            OpCode::IndexSetL => {
                let keys = self.pop()?;
                let obj = self.pop()?.to_scalar();
                let value = self.peek(i.num_val)?.tuple_item(i.num_val2);
                let Value::UserData(data) = &obj else {
                    return Err(multi_key_error(&obj).into());
                };
                data.descriptor().set_index(data, &keys, value)?;
            }

            // ===== Control flow =====
            OpCode::Jump => self.ip = i.num_val,
            OpCode::Jf => {
                if !self.pop()?.cast_to_bool() {
                    self.ip = i.num_val;
                }
            }
            OpCode::JNil => {
                if self.pop()?.to_scalar().is_nil() {
                    self.ip = i.num_val;
                }
            }
            OpCode::JtOrPop => {
                if self.peek(0)?.cast_to_bool() {
                    self.ip = i.num_val;
                } else {
                    self.pop()?;
                }
            }
            OpCode::JfOrPop => {
                if !self.peek(0)?.cast_to_bool() {
                    self.ip = i.num_val;
                } else {
                    self.pop()?;
                }
            }
            OpCode::JFor => {
                let (var, limit, step) = self.for_state()?;
                let done = if step > 0.0 { var > limit } else { var < limit };
                if done {
                    self.ip = i.num_val;
                }
            }
            OpCode::Incr => {
                let (var, _, step) = self.for_state()?;
                let slot = self.stack.len() - 3;
                self.stack[slot] = Value::Number(var + step);
            }
            OpCode::ToNum => {
                let value = self.pop()?;
                let Some(n) = value.cast_to_number() else {
                    let what = FOR_OPERANDS.get(i.num_val).copied().unwrap_or("value");
                    return Err(ScriptError::new(
                        ScriptErrorKind::Arithmetic,
                        format!("'for' {} must be a number", what),
                    )
                    .into());
                };
                self.push(Value::Number(n));
            }
            OpCode::ToBool => {
                let value = self.pop()?;
                self.push(Value::Boolean(value.cast_to_bool()));
            }
            OpCode::IterPrep => {
                let mut values = self.pop()?.into_values().into_iter();
                for _ in 0..3 {
                    let value = values.next().map_or(Value::Nil, |v| v.to_storable());
                    self.push(value);
                }
            }
            OpCode::IterUpd => {
                let results = self.pop()?;
                let Some(var) = self.stack.last_mut() else {
                    return Err(RuntimeError::internal("value stack underflow"));
                };
                *var = results.tuple_item(0);
            }

            // ===== Operators =====
            OpCode::Concat => {
                let (a, b) = self.pop_pair()?;
                let resolved = self.eval_concat(a, b)?;
                return self.push_resolved(resolved);
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
                let (a, b) = self.pop_pair()?;
                let resolved = self.eval_arith(arith_operator(i.op)?, a, b)?;
                return self.push_resolved(resolved);
            }
            OpCode::Neg => {
                let a = self.pop()?;
                let resolved = self.eval_negate(a)?;
                return self.push_resolved(resolved);
            }
            OpCode::Not => {
                let a = self.pop()?;
                self.push(Value::Boolean(!a.cast_to_bool()));
            }
            OpCode::Len => {
                let a = self.pop()?;
                let resolved = self.eval_length(a)?;
                return self.push_resolved(resolved);
            }
            OpCode::Eq => {
                let (a, b) = self.pop_pair()?;
                let resolved = self.eval_eq(a, b);
                return self.push_resolved(resolved);
            }
            OpCode::Less => {
                let (a, b) = self.pop_pair()?;
                let resolved = self.eval_less(a, b)?;
                return self.push_resolved(resolved);
            }
            OpCode::LessEq => {
                let (a, b) = self.pop_pair()?;
                let resolved = self.eval_less_eq(a, b)?;
                return self.push_resolved(resolved);
            }

            OpCode::Invalid => return Err(RuntimeError::internal("invalid opcode executed")),
        }
        Ok(StepOutcome::Continue)
    }

    fn pop_pair(&mut self) -> RuntimeResult<(Value, Value)> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    /// `[.., var, limit, step]` as numbers
    fn for_state(&self) -> RuntimeResult<(f64, f64, f64)> {
        let number = |offset| {
            self.peek(offset)?
                .as_number()
                .ok_or_else(|| RuntimeError::internal("numeric for state is not numeric"))
        };
        Ok((number(2)?, number(1)?, number(0)?))
    }

    fn finish_new_index(&mut self, obj: Value, key: Value, value: Value) -> RuntimeResult<StepOutcome> {
        match self.resolve_new_index(obj, key, value)? {
            Some(pending) => self.call_pending(pending),
            None => Ok(StepOutcome::Continue),
        }
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Cell behind a local or upvalue symbol
    fn symbol_cell(&self, symbol: &SymbolRef) -> RuntimeResult<ValueCell> {
        let frame = self.top_frame()?;
        match symbol {
            SymbolRef::Local { index, .. } => frame
                .locals
                .get(*index)
                .cloned()
                .ok_or_else(|| RuntimeError::internal(format!("{} out of range", symbol))),
            SymbolRef::Upvalue { index, .. } => frame
                .closure
                .as_ref()
                .and_then(|c| c.upvalue(*index))
                .cloned()
                .ok_or_else(|| RuntimeError::internal(format!("{} out of range", symbol))),
            SymbolRef::Global { .. } => Err(RuntimeError::internal(format!(
                "{} cannot be used as a variable cell",
                symbol
            ))),
        }
    }

    fn exec_load(&mut self, symbol: &SymbolRef) -> RuntimeResult<StepOutcome> {
        match symbol {
            SymbolRef::Global { name, env } => {
                let env = self.symbol_cell(env)?.borrow().clone();
                let resolved = self.resolve_index(env, Value::String(Rc::clone(name)))?;
                self.push_resolved(resolved)
            }
            cell_symbol => {
                let value = self.symbol_cell(cell_symbol)?.borrow().clone();
                self.push(value);
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn exec_store(&mut self, symbol: &SymbolRef, value: Value) -> RuntimeResult<StepOutcome> {
        match symbol {
            SymbolRef::Global { name, env } => {
                let env = self.symbol_cell(env)?.borrow().clone();
                self.finish_new_index(env, Value::String(Rc::clone(name)), value)
            }
            cell_symbol => {
                *self.symbol_cell(cell_symbol)?.borrow_mut() = value;
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn exec_closure(&mut self, code: &Rc<ByteCode>, i: &Instruction) -> RuntimeResult<()> {
        let captures = i.symbols.as_deref().unwrap_or(&[]);
        let mut upvalues = Vec::with_capacity(captures.len());
        let mut names = Vec::with_capacity(captures.len());
        for symbol in captures {
            upvalues.push(self.symbol_cell(symbol)?);
            names.push(Rc::from(symbol.name()));
        }
        let closure = ClosureRef::new(
            Rc::clone(code),
            i.num_val,
            upvalues,
            names,
            i.name.clone(),
            self.shared.ids(),
        );
        self.push(Value::Function(closure));
        Ok(())
    }

    fn exec_args(&mut self, i: &Instruction) -> RuntimeResult<()> {
        let frame = self.top_frame_mut()?;
        let args = std::mem::take(&mut frame.pending_args);
        let params = i.symbols.as_deref().unwrap_or(&[]);
        for (position, param) in params.iter().enumerate() {
            let SymbolRef::Local { index, .. } = param else {
                return Err(RuntimeError::internal(format!("parameter {} is not a local", param)));
            };
            let value = if param.is_varargs() {
                Value::tuple(args.get(position..).map(<[Value]>::to_vec).unwrap_or_default())
            } else {
                args.get(position).map_or(Value::Nil, Value::to_storable)
            };
            let Some(cell) = frame.locals.get(*index) else {
                return Err(RuntimeError::internal(format!("{} out of range", param)));
            };
            *cell.borrow_mut() = value;
        }
        Ok(())
    }

    fn exec_call_op(&mut self, i: &Instruction) -> RuntimeResult<StepOutcome> {
        let args = self.pop_n(i.num_val)?;
        let function = self.pop()?;
        let mut flags = if i.op == OpCode::ThisCall {
            FrameFlags::METHOD_CALL
        } else {
            FrameFlags::empty()
        };

        if self.can_tail_call() {
            let Some(caller) = self.frames.pop() else {
                return Err(RuntimeError::internal("tail call without a frame"));
            };
            self.stack.truncate(caller.base_pointer);
            flags |= (caller.flags & FrameFlags::ENTRY_POINT) | FrameFlags::TAIL_CALL;
            trace!(caller = caller.function_name(), "tail call reuses frame");
            return self.exec_call(function, args, flags, caller.return_address, Handlers::default());
        }

        self.exec_call(function, args, flags, self.ip, Handlers::default())
    }
}

fn operand_value(i: &Instruction) -> RuntimeResult<&Value> {
    i.value
        .as_ref()
        .ok_or_else(|| RuntimeError::internal(format!("{} without a value operand", i.op.mnemonic())))
}

fn operand_symbol(i: &Instruction) -> RuntimeResult<&SymbolRef> {
    i.symbol
        .as_ref()
        .ok_or_else(|| RuntimeError::internal(format!("{} without a symbol operand", i.op.mnemonic())))
}

fn table_operand(value: &Value) -> RuntimeResult<&crate::table::TableRef> {
    value
        .as_table()
        .ok_or_else(|| RuntimeError::internal("table constructor target is not a table"))
}

fn multi_key_error(obj: &Value) -> ScriptError {
    ScriptError::new(
        ScriptErrorKind::Index,
        format!("cannot index a {} value with multiple keys", obj.type_name()),
    )
}

fn arith_operator(op: OpCode) -> RuntimeResult<Operator> {
    Ok(match op {
        OpCode::Add => Operator::Add,
        OpCode::Sub => Operator::Sub,
        OpCode::Mul => Operator::Mul,
        OpCode::Div => Operator::Div,
        OpCode::Mod => Operator::Mod,
        OpCode::Pow => Operator::Pow,
        other => {
            return Err(RuntimeError::internal(format!(
                "{:?} is not an arithmetic opcode",
                other
            )))
        }
    })
}
