use crate::interpreter::value::Value;
use std::collections::HashMap;

/// One activation frame: a name-to-value map plus the pending return slot
/// a `Return` stashes before the frame is popped.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    ret: Option<Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    pub fn set_return(&mut self, value: Option<Value>) {
        self.ret = value;
    }

    pub fn take_return(&mut self) -> Option<Value> {
        self.ret.take()
    }

    pub fn vars(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}
