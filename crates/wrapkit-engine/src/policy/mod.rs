//! Access control layer.
//!
//! `require_role(role)` compiles an exact-match role rule and checks the
//! composed callable's first parameter at wrap time, so a function without a
//! principal parameter is rejected before it can ever be invoked.

pub mod guard;

pub use guard::{require_role, PolicyDecision, RequireRole, RoleRule, RoleSource};
