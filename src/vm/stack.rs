//! Operand stack of the machine
//!
//! Values are popped through typed accessors so that an operand of the wrong
//! kind surfaces as a `RuntimeError` naming the instruction at fault.

use super::errors::RuntimeError;
use crate::typed::{Account, Allotment, Asset, Funding, Monetary, Portion, Value, ValueType};
use num_bigint::BigInt;

macro_rules! typed_pop {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Pop a value that must be of type `", stringify!($variant), "`")]
        pub fn $name(&mut self, op_name: &str) -> Result<$ty, RuntimeError> {
            match self.pop(op_name)? {
                Value::$variant(inner) => Ok(inner),
                other => Err(RuntimeError::UnexpectedType {
                    op_name: op_name.to_string(),
                    expected: ValueType::$variant,
                    found: other.value_type(),
                }),
            }
        }
    };
}

/// Stack of values manipulated by the instructions
#[derive(Debug, Clone, Default)]
pub struct VMStack {
    stack: Vec<Value>,
}

impl VMStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self, op_name: &str) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(|| RuntimeError::StackUnderflow {
            op_name: op_name.to_string(),
        })
    }

    typed_pop!(pop_account, Account, Account);
    typed_pop!(pop_asset, Asset, Asset);
    typed_pop!(pop_number, Number, BigInt);
    typed_pop!(pop_string, String, String);
    typed_pop!(pop_monetary, Monetary, Monetary);
    typed_pop!(pop_portion, Portion, Portion);
    typed_pop!(pop_allotment, Allotment, Allotment);
    typed_pop!(pop_funding, Funding, Funding);

    /// Move the value at `depth` (0 being the top) to the top of the stack
    pub fn bump(&mut self, depth: usize, op_name: &str) -> Result<(), RuntimeError> {
        if depth >= self.stack.len() {
            return Err(RuntimeError::StackUnderflow {
                op_name: op_name.to_string(),
            });
        }
        let index = self.stack.len() - depth - 1;
        let value = self.stack.remove(index);
        self.stack.push(value);
        Ok(())
    }

    pub fn top(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Format the stack for traces, bottom first
    pub fn format_stack(&self) -> String {
        let values: Vec<String> = self.stack.iter().map(|v| v.to_string()).collect();
        format!("[{}]", values.join(", "))
    }
}
