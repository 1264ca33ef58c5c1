use crate::call::{Signature, Value};

/// Uniform invocation contract: ordered positional values plus ordered named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional-only arguments.
    pub fn from_values(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, v: impl Into<Value>) -> Self {
        self.positional.push(v.into());
        self
    }

    /// Set a named argument; a repeated name replaces the earlier value in place.
    pub fn named_arg(mut self, name: impl Into<String>, v: impl Into<Value>) -> Self {
        let name = name.into();
        let v = v.into();
        match self.named.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = v,
            None => self.named.push((name, v)),
        }
        self
    }

    /// JSON array → positional, object → named, anything else → one positional.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Array(items) => {
                Self::from_values(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => map
                .into_iter()
                .fold(Self::new(), |acc, (k, v)| acc.named_arg(k, Value::from(v))),
            other => Self::new().arg(Value::from(other)),
        }
    }

    /// Positional arguments in call order.
    pub fn positional_values(&self) -> &[Value] {
        &self.positional
    }

    /// Named arguments in insertion order.
    pub fn named_values(&self) -> &[(String, Value)] {
        &self.named
    }

    /// Positional argument at `index`; named bindings are not consulted.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Named argument by name.
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Value bound to the `index`-th declared parameter, positionally or by name.
    pub fn bound(&self, sig: &Signature, index: usize) -> Option<&Value> {
        if let Some(v) = self.positional.get(index) {
            return Some(v);
        }
        let param = sig.params().get(index)?;
        self.named(&param.name)
    }

    /// Total argument count, positional plus named.
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build positional `Args` from values convertible into `Value`.
///
/// ```
/// let a = wrapkit_core::args![1, "two", 3.0];
/// assert_eq!(a.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    ($($v:expr),* $(,)?) => {
        $crate::call::Args::from_values(vec![$($crate::call::Value::from($v)),*])
    };
}
