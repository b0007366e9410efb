//! Error propagation through the frame stack
//!
//! Script errors unwind to the nearest frame carrying an error handler,
//! stopping at the current loop's entry frame. Before anything is popped,
//! every message decorator between the top and the handling frame sees the
//! error value and may replace it. Contract, internal and termination errors
//! skip all handlers.

use super::{Processor, StepOutcome};
use crate::error::{RuntimeError, RuntimeResult, ScriptError, ScriptErrorKind};
use crate::value::Value;
use tracing::{trace, warn};

impl Processor {
    pub(super) fn unwind(&mut self, err: RuntimeError, floor: usize) -> RuntimeResult<StepOutcome> {
        let floor = floor.min(self.frames.len());
        let mut script = match err {
            RuntimeError::Script(script) => script.with_location(self.current_location()),
            other => {
                trace!(error = %other, "unwinding uncatchable error");
                self.frames.truncate(floor);
                return Err(other);
            }
        };
        if !script.has_traceback() {
            script.set_traceback(self.traceback(floor));
        }

        let region_start = self.frames[floor..]
            .iter()
            .rposition(|f| f.error_handler().is_some() || f.is_entry_point())
            .map_or(floor, |i| i + floor);
        let decorators: Vec<Value> = self.frames[region_start..]
            .iter()
            .rev()
            .filter_map(|f| f.handlers.before_unwind.clone())
            .collect();
        for decorator in decorators {
            script = self.decorate(decorator, script);
        }

        while self.frames.len() > floor {
            let Some(frame) = self.frames.pop() else {
                break;
            };
            if let Some(handler) = frame.handlers.error_handler.clone() {
                trace!(function = frame.function_name(), "error caught");
                self.stack.truncate(frame.base_pointer);
                return match self.call(Value::NativeFunction(handler), vec![script.error_value()]) {
                    Ok(value) => self.deliver(frame.flags, frame.return_address, Some(value)),
                    Err(err) => self.unwind(err, floor),
                };
            }
            if frame.is_entry_point() {
                break;
            }
        }
        Err(RuntimeError::Script(script))
    }

    /// Run a pre-unwind decorator over the propagating error
    pub(super) fn decorate(&mut self, decorator: Value, mut script: ScriptError) -> ScriptError {
        match self.call(decorator, vec![script.error_value()]) {
            Ok(value) => {
                script.replace_value(value.to_storable());
                script
            }
            Err(err) => {
                warn!(error = %err, "error message decorator failed");
                let mut replaced = ScriptError::new(ScriptErrorKind::User, "error in error handling");
                replaced.set_traceback(script.traceback().to_vec());
                replaced
            }
        }
    }

    /// One line per frame above `floor`, innermost first
    fn traceback(&self, floor: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut ip = self.ip.checked_sub(1);
        for frame in self.frames[floor..].iter().rev() {
            let line = match &frame.closure {
                Some(closure) => {
                    let location = ip
                        .and_then(|ip| closure.code().location(ip))
                        .map_or_else(|| format!("{}:?", closure.code().name), |l| l.to_string());
                    format!("{}: in function '{}'", location, closure.display_name())
                }
                None => format!("[native]: in function '{}'", frame.function_name()),
            };
            lines.push(line);
            ip = frame.return_address.checked_sub(1);
        }
        lines
    }
}
