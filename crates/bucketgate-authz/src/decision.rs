//! Policy verdicts.

use crate::config::UnevaluablePolicy;
use crate::error::AuthzError;

/// Outcome of one authorization check.
#[derive(Debug)]
pub enum AuthorizationDecision {
    /// The policy answered `true`.
    Allowed,
    /// The policy answered `false`, or left the decision undefined.
    Denied,
    /// No verdict could be obtained.
    Unevaluable(AuthzError),
}

impl AuthorizationDecision {
    /// Only an explicit `true` counts.
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the label used for metrics and logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Unevaluable(_) => "unevaluable",
        }
    }

    /// Collapses the decision into allow/deny under the given failure policy.
    ///
    /// With [`UnevaluablePolicy::Deny`] an unevaluable decision becomes
    /// `Ok(false)`; with [`UnevaluablePolicy::Error`] the reason is returned.
    pub fn resolve(self, policy: UnevaluablePolicy) -> Result<bool, AuthzError> {
        match (self, policy) {
            (Self::Allowed, _) => Ok(true),
            (Self::Denied, _) | (Self::Unevaluable(_), UnevaluablePolicy::Deny) => Ok(false),
            (Self::Unevaluable(err), UnevaluablePolicy::Error) => Err(err),
        }
    }
}
