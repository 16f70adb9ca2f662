//! Authentication gate for protected actions.
//!
//! Generating content and exporting require a signed-in user (or demo
//! mode). When neither is present the action is recorded as pending so
//! it can be resumed after sign-in, and nothing else changes.

use postwise_core::types::Timestamp;
use postwise_core::workflow::AuthContext;

/// An action the user attempted before being authorized.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub label: String,
    pub context: serde_json::Value,
    pub requested_at: Timestamp,
}

/// Result of an operation that may be held back by the auth gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Gated<T> {
    Proceed(T),
    AuthRequired(PendingAction),
}

impl<T> Gated<T> {
    pub fn proceeded(self) -> Option<T> {
        match self {
            Self::Proceed(value) => Some(value),
            Self::AuthRequired(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct AuthGate {
    pending: Option<PendingAction>,
}

impl AuthGate {
    /// Returns `true` if `auth` may perform `label`. Otherwise records the
    /// action as pending (replacing any earlier one) and returns `false`.
    pub fn require_auth(
        &mut self,
        auth: &AuthContext,
        label: &str,
        context: serde_json::Value,
    ) -> bool {
        if auth.is_authorized() {
            return true;
        }
        tracing::info!(action = label, "Authentication required");
        self.pending = Some(PendingAction {
            label: label.to_string(),
            context,
            requested_at: chrono::Utc::now(),
        });
        false
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use postwise_core::workflow::UserSession;

    use super::*;

    #[test]
    fn anonymous_user_is_held_back() {
        let mut gate = AuthGate::default();
        let allowed = gate.require_auth(
            &AuthContext::default(),
            "export",
            serde_json::json!({"format": "markdown"}),
        );
        assert!(!allowed);
        let pending = gate.pending().expect("pending action recorded");
        assert_eq!(pending.label, "export");
        assert_eq!(pending.context["format"], "markdown");
    }

    #[test]
    fn demo_mode_and_sessions_pass() {
        let mut gate = AuthGate::default();
        let demo = AuthContext {
            session: None,
            demo_mode: true,
        };
        assert!(gate.require_auth(&demo, "export", serde_json::Value::Null));

        let signed_in = AuthContext {
            session: Some(UserSession {
                user_id: "u1".to_string(),
                display_name: None,
            }),
            demo_mode: false,
        };
        assert!(gate.require_auth(&signed_in, "generate_content", serde_json::Value::Null));
        assert!(gate.pending().is_none());
    }

    #[test]
    fn take_pending_clears_it() {
        let mut gate = AuthGate::default();
        gate.require_auth(&AuthContext::default(), "export", serde_json::Value::Null);
        assert!(gate.take_pending().is_some());
        assert!(gate.pending().is_none());
    }
}
