//! Declared identity and parameter shape of a callable.

use std::sync::Arc;

use crate::call::{Args, Value};
use crate::error::{Error, Result};

/// Coarse type hint for one declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Any,
    Bool,
    Int,
    Float,
    Str,
    List,
    Record,
    /// A `Principal`, or a record exposing a string `role` field.
    Principal,
}

impl ParamKind {
    /// Lowercase kind name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Any => "any",
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
            ParamKind::List => "list",
            ParamKind::Record => "record",
            ParamKind::Principal => "principal",
        }
    }

    /// Whether `v` can be bound to a parameter of this kind.
    pub fn accepts(self, v: &Value) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::Bool => matches!(v, Value::Bool(_)),
            ParamKind::Int => matches!(v, Value::Int(_)),
            ParamKind::Float => matches!(v, Value::Float(_) | Value::Int(_)),
            ParamKind::Str => matches!(v, Value::Str(_)),
            ParamKind::List => matches!(v, Value::List(_)),
            ParamKind::Record => matches!(v, Value::Record(_)),
            ParamKind::Principal => v.principal_role().is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

/// Name plus parameter list. Wrapping never changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: Arc<str>,
    params: Vec<Param>,
    variadic: bool,
}

impl Signature {
    /// Signature with no parameters.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            variadic: false,
        }
    }

    /// Append a declared parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
        });
        self
    }

    /// Accept extra positional and named arguments beyond the declared ones.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters in order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Position of a declared parameter.
    pub fn index_of(&self, param: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == param)
    }

    /// Validate binding and declared kinds of `args`.
    pub fn check(&self, args: &Args) -> Result<()> {
        let given = args.positional_values().len();
        if !self.variadic && given > self.params.len() {
            return Err(Error::argument(format!(
                "{}() takes {} positional arguments but {} were given",
                self.name,
                self.params.len(),
                given
            )));
        }

        for (key, _) in args.named_values() {
            match self.index_of(key) {
                Some(i) if i < given => {
                    return Err(Error::argument(format!(
                        "{}() got multiple values for argument `{key}`",
                        self.name
                    )));
                }
                Some(_) => {}
                None if self.variadic => {}
                None => {
                    return Err(Error::argument(format!(
                        "{}() got an unexpected keyword argument `{key}`",
                        self.name
                    )));
                }
            }
        }

        for (i, p) in self.params.iter().enumerate() {
            let v = args.bound(self, i).ok_or_else(|| {
                Error::argument(format!("{}() missing required argument `{}`", self.name, p.name))
            })?;
            if !p.kind.accepts(v) {
                return Err(Error::argument(format!(
                    "{}() argument `{}` expects {}, got {}",
                    self.name,
                    p.name,
                    p.kind.as_str(),
                    v.type_name()
                ))
                .with_field("param", p.name.as_str())
                .with_field("value", v.clone()));
            }
        }
        Ok(())
    }
}
