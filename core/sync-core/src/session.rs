//! Session lifecycle.
//!
//! `Unknown -> {Anonymous, Authenticated}` on the one-shot check,
//! `Anonymous -> Authenticated` when an external login completes, and
//! `Authenticated -> Anonymous` on logout. Nothing ever returns to `Unknown`.
//! Every failure to confirm a session resolves to `Anonymous`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::AuthProvider;
use crate::config::SessionConfig;
use crate::error::{Result, SyncError};
use crate::types::{AuthUser, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// Outcome of the startup check. `None` means no usable session.
    Resolved(Option<AuthUser>),
    /// The provider redirected back with a confirmed session.
    LoginCompleted(AuthUser),
    Logout,
}

/// Returns the next session, or `None` when the transition does not apply.
pub fn next_session(current: &Session, transition: SessionTransition) -> Option<Session> {
    match (current, transition) {
        (Session::Unknown, SessionTransition::Resolved(user)) => Some(Session::from_user(user)),
        (_, SessionTransition::Resolved(_)) => None,
        (Session::Unknown | Session::Anonymous, SessionTransition::LoginCompleted(user)) => {
            Some(Session::from_user(Some(user)))
        }
        (Session::Authenticated { .. }, SessionTransition::LoginCompleted(_)) => None,
        (Session::Unknown | Session::Authenticated { .. }, SessionTransition::Logout) => {
            Some(Session::Anonymous)
        }
        (Session::Anonymous, SessionTransition::Logout) => None,
    }
}

pub struct SessionMonitor {
    auth: Arc<dyn AuthProvider>,
    config: SessionConfig,
    state: watch::Sender<Session>,
    checked: AtomicBool,
}

impl SessionMonitor {
    pub fn new(auth: Arc<dyn AuthProvider>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(Session::Unknown);
        Self {
            auth,
            config,
            state,
            checked: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Queries the auth collaborator once. Later calls return the current
    /// session without querying again.
    pub async fn check_existing_session(&self) -> Session {
        if self.checked.swap(true, Ordering::SeqCst) {
            debug!("Session check already performed");
            return self.current();
        }

        let user = match self.query_session().await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "Session check failed; treating as anonymous");
                None
            }
        };
        self.transition(SessionTransition::Resolved(user));
        self.current()
    }

    /// Starts the provider's redirect flow. State changes only when the
    /// redirect comes back through [`SessionMonitor::complete_login`].
    pub async fn login(&self) -> Result<()> {
        let redirect_url = self.config.redirect_url();
        info!(provider = %self.config.provider, redirect_url = %redirect_url, "Starting login");
        self.auth
            .sign_in_with_provider(&self.config.provider, &redirect_url)
            .await
            .map_err(|err| {
                warn!(error = %err, "Login could not be started");
                SyncError::Auth(err)
            })
    }

    /// Re-checks the collaborator after the login redirect returns.
    pub async fn complete_login(&self) -> Session {
        self.checked.store(true, Ordering::SeqCst);
        match self.query_session().await {
            Ok(Some(user)) => {
                self.transition(SessionTransition::LoginCompleted(user));
            }
            Ok(None) => {
                debug!("Login callback without a session");
                self.transition(SessionTransition::Resolved(None));
            }
            Err(err) => {
                warn!(error = %err, "Login completion check failed; treating as anonymous");
                self.transition(SessionTransition::Resolved(None));
            }
        }
        self.current()
    }

    /// Drops the local session first, then invalidates the remote one.
    pub async fn logout(&self) -> Session {
        self.checked.store(true, Ordering::SeqCst);
        self.transition(SessionTransition::Logout);
        if let Err(err) = self.auth.sign_out().await {
            warn!(error = %err, "Remote sign-out failed; local session already cleared");
        }
        self.current()
    }

    async fn query_session(&self) -> Result<Option<AuthUser>> {
        let timeout = self.config.check_timeout();
        match tokio::time::timeout(timeout, self.auth.get_current_session()).await {
            Ok(Ok(user)) => Ok(user),
            Ok(Err(err)) => Err(SyncError::Auth(err)),
            Err(_) => Err(SyncError::AuthTimeout(self.config.check_timeout_ms)),
        }
    }

    fn transition(&self, transition: SessionTransition) -> bool {
        let label = format!("{:?}", transition);
        let changed = self.state.send_if_modified(|current| {
            match next_session(current, transition) {
                Some(next) if next != *current => {
                    info!(from = current.as_str(), to = next.as_str(), "Session transition");
                    *current = next;
                    true
                }
                _ => false,
            }
        });
        if !changed {
            debug!(transition = %label, "Session transition ignored");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            user_id: "u-1".to_string(),
            email: Some("u1@example.test".to_string()),
        }
    }

    fn authenticated() -> Session {
        Session::from_user(Some(user()))
    }

    #[test]
    fn unknown_resolves_either_way() {
        assert_eq!(
            next_session(&Session::Unknown, SessionTransition::Resolved(None)),
            Some(Session::Anonymous)
        );
        assert_eq!(
            next_session(&Session::Unknown, SessionTransition::Resolved(Some(user()))),
            Some(authenticated())
        );
    }

    #[test]
    fn resolution_happens_once() {
        assert_eq!(
            next_session(&Session::Anonymous, SessionTransition::Resolved(Some(user()))),
            None
        );
        assert_eq!(
            next_session(&authenticated(), SessionTransition::Resolved(None)),
            None
        );
    }

    #[test]
    fn login_completion_from_anonymous() {
        assert_eq!(
            next_session(&Session::Anonymous, SessionTransition::LoginCompleted(user())),
            Some(authenticated())
        );
        assert_eq!(
            next_session(&authenticated(), SessionTransition::LoginCompleted(user())),
            None
        );
    }

    #[test]
    fn logout_goes_anonymous() {
        assert_eq!(
            next_session(&authenticated(), SessionTransition::Logout),
            Some(Session::Anonymous)
        );
        assert_eq!(
            next_session(&Session::Anonymous, SessionTransition::Logout),
            None
        );
    }

    #[test]
    fn no_transition_reenters_unknown() {
        let transitions = vec![
            SessionTransition::Resolved(None),
            SessionTransition::Resolved(Some(user())),
            SessionTransition::LoginCompleted(user()),
            SessionTransition::Logout,
        ];
        for state in [Session::Anonymous, authenticated()] {
            for transition in transitions.clone() {
                if let Some(next) = next_session(&state, transition) {
                    assert_ne!(next, Session::Unknown);
                }
            }
        }
    }
}
