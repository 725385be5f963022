//! The namespace handed to the interpreter
//!
//! A [`Namespace`] is a set of [`CapabilityModule`]s keyed by name. Each
//! module holds plain host functions that take and return JSON values, so
//! nothing here knows which engine will eventually call them.

use crate::error::CapabilityError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Name of the root object scripts see
pub const ROOT: &str = "nexus";

type Handler = Arc<dyn Fn(&Args<'_>) -> Result<Value, CapabilityError> + Send + Sync>;

/// Positional arguments of one host call, with typed accessors
pub struct Args<'a> {
    function: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(function: &'a str, values: &'a [Value]) -> Self {
        Self { function, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`, `Null` when missing
    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }

    pub fn invalid(&self, message: impl Into<String>) -> CapabilityError {
        CapabilityError::invalid(self.function, message)
    }

    /// String argument. Numbers and booleans are accepted and stringified.
    pub fn string(&self, index: usize) -> Result<String, CapabilityError> {
        match self.value(index) {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err(self.invalid(format!("argument {} is required", index + 1))),
            other => Err(self.invalid(format!(
                "argument {} must be a string, got {}",
                index + 1,
                type_name(other)
            ))),
        }
    }

    pub fn opt_string(&self, index: usize) -> Result<Option<String>, CapabilityError> {
        match self.value(index) {
            Value::Null => Ok(None),
            _ => self.string(index).map(Some),
        }
    }

    /// Non-negative integer argument; whole floats are accepted
    pub fn u64(&self, index: usize) -> Result<u64, CapabilityError> {
        let value = self.value(index);
        value
            .as_u64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| {
                self.invalid(format!(
                    "argument {} must be a non-negative integer",
                    index + 1
                ))
            })
    }

    /// Text rendering of any argument, for display functions
    pub fn display(&self, index: usize) -> String {
        display_value(self.value(index))
    }
}

/// How a value prints: strings raw, unit empty, everything else as JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// One host function exposed to scripts
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    qualified: String,
    arity: RangeInclusive<usize>,
    method: bool,
    handler: Handler,
}

impl HostFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `nexus::<module>::<name>`
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    pub fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    /// Also callable as `value.name(...)` on its first argument
    pub fn is_method(&self) -> bool {
        self.method
    }

    pub fn call(&self, values: &[Value]) -> Result<Value, CapabilityError> {
        if !self.arity.contains(&values.len()) {
            return Err(CapabilityError::invalid(
                &self.qualified,
                format!(
                    "expected {}..={} arguments, got {}",
                    self.arity.start(),
                    self.arity.end(),
                    values.len()
                ),
            ));
        }
        (self.handler)(&Args::new(&self.qualified, values))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.qualified)
            .field("arity", &self.arity)
            .field("method", &self.method)
            .finish()
    }
}

/// Functions attached under one namespace key
#[derive(Debug, Clone)]
pub struct CapabilityModule {
    key: String,
    functions: BTreeMap<String, HostFunction>,
}

impl CapabilityModule {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            functions: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attach a function. Re-registering a name replaces it.
    pub fn function<F>(&mut self, name: &str, arity: RangeInclusive<usize>, handler: F) -> &mut Self
    where
        F: Fn(&Args<'_>) -> Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.insert(name, arity, false, Arc::new(handler))
    }

    /// Attach a function that is also callable in method style
    pub fn method<F>(&mut self, name: &str, arity: RangeInclusive<usize>, handler: F) -> &mut Self
    where
        F: Fn(&Args<'_>) -> Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.insert(name, arity, true, Arc::new(handler))
    }

    fn insert(
        &mut self,
        name: &str,
        arity: RangeInclusive<usize>,
        method: bool,
        handler: Handler,
    ) -> &mut Self {
        let function = HostFunction {
            name: name.to_string(),
            qualified: format!("{}::{}::{}", ROOT, self.key, name),
            arity,
            method,
            handler,
        };
        self.functions.insert(name.to_string(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &HostFunction> {
        self.functions.values()
    }
}

/// All capability modules, keyed by sub-key
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    modules: BTreeMap<String, CapabilityModule>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The module under `key`, created on first use
    pub fn module(&mut self, key: &str) -> &mut CapabilityModule {
        self.modules
            .entry(key.to_string())
            .or_insert_with(|| CapabilityModule::new(key))
    }

    pub fn get(&self, key: &str) -> Option<&CapabilityModule> {
        self.modules.get(key)
    }

    pub fn modules(&self) -> impl Iterator<Item = &CapabilityModule> {
        self.modules.values()
    }

    /// Look up `module::function`
    pub fn resolve(&self, module: &str, function: &str) -> Option<&HostFunction> {
        self.modules.get(module).and_then(|m| m.get(function))
    }
}
