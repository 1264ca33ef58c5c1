use std::sync::Arc;

use async_trait::async_trait;

use wrapkit_core::call::{Args, ParamKind, Principal, Signature, Value};
use wrapkit_core::error::{Error, Result};

use crate::callable::Callable;
use crate::compose::Wrapper;

/// Narrow contract on the identity provider: expose a role, nothing else.
pub trait RoleSource {
    fn role(&self) -> Option<&str>;
}

impl RoleSource for Principal {
    fn role(&self) -> Option<&str> {
        Some(&self.role)
    }
}

impl RoleSource for Value {
    fn role(&self) -> Option<&str> {
        self.principal_role()
    }
}

/// Decision from a role check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Pass,
    Deny { actual: Option<String> },
}

/// Compiled exact-match role rule.
#[derive(Debug, Clone)]
pub struct RoleRule {
    required: String,
}

impl RoleRule {
    /// Compile a rule; the role must be non-empty.
    pub fn new(required: impl Into<String>) -> Result<Self> {
        let required = required.into();
        if required.trim().is_empty() {
            return Err(Error::configuration("require_role: role must not be empty"));
        }
        Ok(Self { required })
    }

    /// Role a caller must hold.
    pub fn required(&self) -> &str {
        &self.required
    }

    /// Exact-match check against whoever is bound as the principal.
    pub fn check<R: RoleSource + ?Sized>(&self, who: Option<&R>) -> PolicyDecision {
        match who.and_then(|w| w.role()) {
            Some(role) if role == self.required => PolicyDecision::Pass,
            other => PolicyDecision::Deny {
                actual: other.map(str::to_string),
            },
        }
    }
}

/// Parameterized factory: `require_role(role)`.
pub fn require_role(role: impl Into<String>) -> Result<RequireRole> {
    Ok(RequireRole {
        rule: RoleRule::new(role)?,
    })
}

pub struct RequireRole {
    rule: RoleRule,
}

impl RequireRole {
    /// Compiled rule used by this factory.
    pub fn rule(&self) -> &RoleRule {
        &self.rule
    }
}

impl Wrapper for RequireRole {
    fn name(&self) -> &str {
        "require_role"
    }

    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>> {
        let sig = inner.signature();
        match sig.params().first() {
            Some(p) if p.kind == ParamKind::Principal => {}
            Some(p) => {
                return Err(Error::configuration(format!(
                    "require_role({}) needs the first parameter of `{}` to be a principal, found `{}`: {}",
                    self.rule.required(),
                    sig.name(),
                    p.name,
                    p.kind.as_str()
                ))
                .with_field("function", sig.name()));
            }
            None => {
                return Err(Error::configuration(format!(
                    "require_role({}) cannot wrap `{}`: it declares no parameters",
                    self.rule.required(),
                    sig.name()
                ))
                .with_field("function", sig.name()));
            }
        }

        Ok(Arc::new(Guarded {
            inner,
            rule: self.rule.clone(),
        }))
    }
}

struct Guarded {
    inner: Arc<dyn Callable>,
    rule: RoleRule,
}

#[async_trait]
impl Callable for Guarded {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, args: Args) -> Result<Value> {
        let decision = self.rule.check(args.bound(self.signature(), 0));

        match decision {
            PolicyDecision::Pass => self.inner.call(args).await,
            PolicyDecision::Deny { actual } => {
                tracing::warn!(
                    function = %self.name(),
                    required = %self.rule.required(),
                    actual = ?actual,
                    "access denied"
                );
                Err(Error::access_denied(format!(
                    "`{}` requires role `{}`",
                    self.name(),
                    self.rule.required()
                ))
                .with_field("required", self.rule.required())
                .with_field("actual", actual))
            }
        }
    }
}
