//! Session controller
//!
//! Tracks who is logged in, drives login/register/logout, and ends the session
//! when the refresh token is rejected.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::events::{EventSender, NoticeLevel, SessionEvent, SessionObserver};
use super::jwt;
use super::tokens::{Credential, CredentialStore};
use crate::api::client::ApiClient;
use crate::api::envelope;
use crate::api::error::ErrorBody;
use crate::api::request::ApiResponse;
use crate::api::transport::Transport;
use crate::config::Settings;
use crate::models::User;

const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
const LOGGED_OUT: &str = "You have been logged out.";

/// New account details for `/auth/register`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Tokens and profile returned by login and register.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    user: User,
    access_token: String,
    refresh_token: String,
}

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_loading: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

struct SessionShared {
    state: Mutex<SessionState>,
    events: EventSender,
    login_route: String,
}

impl SessionShared {
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn become_anonymous(&self) {
        self.update(|s| {
            s.user = None;
            s.is_loading = false;
        });
    }
}

/// Holds the session in the loading state until dropped, so a cancelled
/// login can't leave it stuck.
struct Loading<'a>(&'a SessionShared);

impl<'a> Loading<'a> {
    fn start(shared: &'a SessionShared) -> Self {
        shared.update(|s| s.is_loading = true);
        Self(shared)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.update(|s| s.is_loading = false);
    }
}

impl SessionObserver for SessionShared {
    fn session_expired(&self) {
        tracing::info!("Session expired, signing out");
        self.become_anonymous();
        self.events.notice(NoticeLevel::Error, SESSION_EXPIRED);
        self.events.navigate(self.login_route.clone());
    }
}

/// Authentication state plus the client that acts on its behalf.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
    client: ApiClient,
}

impl Session {
    /// Build a session in the loading state. Events for the presentation
    /// layer arrive on the returned receiver.
    pub fn new(
        settings: Settings,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = EventSender::channel();
        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState {
                user: None,
                is_loading: true,
            }),
            events,
            login_route: settings.login_route.clone(),
        });
        let observer: Arc<dyn SessionObserver> = shared.clone();
        let client = ApiClient::new(settings, transport, store, observer);
        (Self { shared, client }, rx)
    }

    /// [`Session::new`] followed by [`Session::restore`].
    pub fn open(
        settings: Settings,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (session, rx) = Self::new(settings, store, transport);
        session.restore();
        (session, rx)
    }

    /// Pick up the cached user, if any, and leave the loading state.
    pub fn restore(&self) {
        let user = self.client.store().get_user::<User>();
        match user {
            Some(ref u) => tracing::debug!("Restored session for {}", u.email),
            None => tracing::debug!("No cached user, session is anonymous"),
        }
        self.shared.update(|s| {
            s.user = user;
            s.is_loading = false;
        });
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn state(&self) -> SessionState {
        self.shared.update(|s| s.clone())
    }

    pub fn current_user(&self) -> Option<User> {
        self.shared.update(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.update(|s| s.is_authenticated())
    }

    /// Log in with email and password. Failures are logged and reported as
    /// `false`; the session is left as it was.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let request = self
            .client
            .request(Method::POST, "/auth/login")
            .public()
            .json(&LoginRequest { email, password });

        let resp = {
            let _loading = Loading::start(&self.shared);
            self.client.execute(request).await
        };

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Login error: {}", e);
                return false;
            }
        };
        if !resp.is_success() {
            tracing::error!("Login error: {}", rejection(&resp));
            return false;
        }
        match resp.json().and_then(envelope::decode_lenient::<AuthPayload>) {
            Ok(payload) => {
                self.authenticate(payload);
                true
            }
            Err(e) => {
                tracing::error!("Login error: unexpected response: {}", e);
                false
            }
        }
    }

    /// Create an account. `true` when the server answered with data; when
    /// that data includes tokens the new user is logged in as well.
    pub async fn register(&self, registration: &Registration) -> bool {
        let request = self
            .client
            .request(Method::POST, "/auth/register")
            .public()
            .json(registration);

        let resp = {
            let _loading = Loading::start(&self.shared);
            self.client.execute(request).await
        };

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Registration error: {}", e);
                return false;
            }
        };
        if !resp.is_success() {
            tracing::error!("Registration error: {}", rejection(&resp));
            return false;
        }
        let body: serde_json::Value = match resp.json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Registration error: unexpected response: {}", e);
                return false;
            }
        };
        if body.get("data").map_or(true, |d| d.is_null()) {
            tracing::warn!("Registration response carried no data");
            return false;
        }
        match envelope::decode_lenient::<AuthPayload>(body) {
            Ok(payload) => self.authenticate(payload),
            Err(_) => self.shared.events.notice(
                NoticeLevel::Success,
                format!("Registered {}. You can now log in.", registration.email),
            ),
        }
        true
    }

    /// End the session. The server is told when there is a token to revoke,
    /// but nothing it answers can make this fail.
    pub async fn logout(&self) {
        if let Some(token) = self.client.store().access_token() {
            let request = self
                .client
                .request(Method::POST, "/auth/logout")
                .with_bearer(&token);
            match self.client.send(&request).await {
                Ok(resp) if !resp.is_success() => {
                    tracing::warn!("Logout request returned HTTP {}", resp.status.as_u16())
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Logout error: {}", e),
            }
        }

        self.client.store().clear();
        self.shared.become_anonymous();
        tracing::info!("Logged out");
        self.shared.events.notice(NoticeLevel::Info, LOGGED_OUT);
        self.shared.events.navigate(self.shared.login_route.clone());
    }

    /// Shallow-merge `patch` into the current user and persist it.
    ///
    /// Returns `false` without changing anything when nobody is logged in,
    /// `patch` is not an object, or the result is not a valid user.
    pub fn update_user(&self, patch: serde_json::Value) -> bool {
        let Some(user) = self.current_user() else {
            tracing::debug!("update_user ignored, no user");
            return false;
        };
        let serde_json::Value::Object(fields) = patch else {
            tracing::warn!("update_user expects an object");
            return false;
        };
        let Ok(serde_json::Value::Object(mut merged)) = serde_json::to_value(&user) else {
            return false;
        };
        merged.extend(fields);

        let updated: User = match serde_json::from_value(serde_json::Value::Object(merged)) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Rejected user update: {}", e);
                return false;
            }
        };
        self.client.store().set_user(&updated);
        self.shared.update(|s| s.user = Some(updated));
        true
    }

    fn authenticate(&self, payload: AuthPayload) {
        let store = self.client.store();
        store.set(&Credential::new(payload.access_token, payload.refresh_token));
        store.set_user(&payload.user);
        tracing::info!("Logged in as {}", payload.user.email);
        self.shared.events.notice(
            NoticeLevel::Success,
            format!(
                "Logged in as {} ({}).",
                payload.user.display_name(),
                payload.user.email
            ),
        );
        self.shared.update(|s| s.user = Some(payload.user));
    }
}

fn rejection(resp: &ApiResponse) -> String {
    let body = ErrorBody::from_response(resp);
    format!(
        "HTTP {}: {}",
        resp.status.as_u16(),
        body.message.unwrap_or_default()
    )
}

// -- CLI commands --

pub async fn login(session: &Session, email: &str, password: &str) -> Result<()> {
    if !session.login(email, password).await {
        bail!("Login failed. Check your email and password.");
    }
    Ok(())
}

pub async fn register(session: &Session, registration: &Registration) -> Result<()> {
    if !session.register(registration).await {
        bail!("Registration failed.");
    }
    Ok(())
}

pub async fn logout(session: &Session) -> Result<()> {
    session.logout().await;
    Ok(())
}

pub fn status(session: &Session) -> Result<()> {
    let store = session.client().store();
    let buffer = session.client().settings().token_expiry_buffer_secs;

    match store.access_token() {
        Some(token) if !jwt::is_expired(Some(token.as_str()), buffer) => {
            println!("Access token:  valid");
            println!("  expires in:  {}s", jwt::time_remaining(Some(token.as_str())));
        }
        Some(_) => println!("Access token:  expired"),
        None => println!("Access token:  none"),
    }

    match store.refresh_token() {
        Some(_) => println!("Refresh token: present"),
        None => println!("Refresh token: none"),
    }

    match session.current_user() {
        Some(user) => println!("User:          {} <{}>", user.username, user.email),
        None => println!("User:          not logged in"),
    }
    Ok(())
}

pub fn whoami(session: &Session) -> Result<()> {
    match session.current_user() {
        Some(user) => crate::api::users::print_user(&user),
        None => bail!("Not logged in. Run `adminctl login` first."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::api::transport::mock::MockTransport;
    use crate::auth::jwt::token_expiring_in;
    use crate::auth::refresh::INVALID_REFRESH_TOKEN;
    use crate::auth::MemoryStore;

    fn settings() -> Settings {
        Settings {
            api_url: "http://api.test/api".into(),
            ..Settings::default()
        }
    }

    fn user_json() -> serde_json::Value {
        json!({"id": "u1", "username": "ada", "email": "ada@example.com", "role": "admin"})
    }

    struct Fixture {
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        session: Session,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let (session, events) = Session::open(settings(), store.clone(), transport.clone());
        Fixture {
            transport,
            store,
            session,
            events,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn logged_in() -> Fixture {
        let fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/login",
            200,
            json!({"success": true, "message": "ok", "data": {
                "user": user_json(),
                "accessToken": token_expiring_in(3600),
                "refreshToken": "r1"
            }}),
        );
        assert!(fx.session.login("ada@example.com", "secret").await);
        fx
    }

    #[test]
    fn test_new_session_is_loading() {
        let (session, _rx) = Session::new(
            settings(),
            Arc::new(MemoryStore::new()),
            Arc::new(MockTransport::new()),
        );
        let state = session.state();
        assert!(state.is_loading);
        assert!(!state.is_authenticated());

        session.restore();
        assert!(!session.state().is_loading);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_restore_cached_user() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        store.set_user_value(&user_json());

        let (session, _rx) = Session::open(settings(), store, Arc::new(MockTransport::new()));

        assert!(session.is_authenticated());
        assert_eq!(session.current_user().unwrap().username, "ada");
    }

    #[test]
    fn test_restore_ignores_invalid_cached_user() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        store.set_user_value(&json!({"id": 1}));

        let (session, _rx) = Session::open(settings(), store, Arc::new(MockTransport::new()));

        assert!(!session.is_authenticated());
        assert!(!session.state().is_loading);
    }

    #[tokio::test]
    async fn test_login_wrapped_response() {
        let fx = logged_in().await;

        assert!(fx.session.is_authenticated());
        assert_eq!(fx.store.refresh_token().as_deref(), Some("r1"));
        let cached: serde_json::Value = fx.store.user_value().unwrap();
        assert_eq!(cached["email"], "ada@example.com");

        let sent = &fx.transport.requests()[0];
        assert!(sent.bearer().is_none());
        assert_eq!(
            sent.body,
            Some(json!({"email": "ada@example.com", "password": "secret"}))
        );
    }

    #[tokio::test]
    async fn test_login_flat_response() {
        let fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/login",
            200,
            json!({"user": user_json(), "accessToken": "a", "refreshToken": "r"}),
        );

        assert!(fx.session.login("ada@example.com", "secret").await);
        assert_eq!(fx.store.access_token().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_login_failure_returns_false() {
        let fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/login",
            401,
            json!({"success": false, "message": "Invalid credentials"}),
        );

        assert!(!fx.session.login("ada@example.com", "wrong").await);
        assert!(!fx.session.is_authenticated());
        assert!(fx.store.get().is_none());
        // A rejected login is not a refresh trigger.
        assert_eq!(fx.transport.count("/auth/refresh-token"), 0);
    }

    #[tokio::test]
    async fn test_login_announces_user() {
        let mut fx = logged_in().await;
        assert_eq!(
            drain(&mut fx.events),
            vec![SessionEvent::Notice {
                level: NoticeLevel::Success,
                message: "Logged in as ada (ada@example.com).".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_cancelled_login_leaves_loading() {
        let fx = fixture();
        fx.transport.on_delayed(
            Method::POST,
            "/auth/login",
            200,
            json!({"user": user_json(), "accessToken": "a", "refreshToken": "r"}),
            Duration::from_secs(5),
        );

        let login = fx.session.login("ada@example.com", "secret");
        let outcome = tokio::time::timeout(Duration::from_millis(20), login).await;

        assert!(outcome.is_err());
        assert!(!fx.session.state().is_loading);
        assert!(!fx.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_network_error_returns_false() {
        let fx = fixture();
        fx.transport.fail(Method::POST, "/auth/login", "connection refused");

        assert!(!fx.session.login("ada@example.com", "secret").await);
        assert!(!fx.session.state().is_loading);
    }

    #[tokio::test]
    async fn test_register_with_tokens_logs_in() {
        let fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/register",
            201,
            json!({"success": true, "message": "created", "data": {
                "user": user_json(),
                "accessToken": "a",
                "refreshToken": "r"
            }}),
        );
        let registration = Registration {
            email: "ada@example.com".into(),
            password: "secret".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };

        assert!(fx.session.register(&registration).await);
        assert!(fx.session.is_authenticated());
        assert_eq!(
            fx.transport.requests()[0].body.as_ref().unwrap()["firstName"],
            "Ada"
        );
    }

    #[tokio::test]
    async fn test_register_without_tokens() {
        let mut fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/register",
            201,
            json!({"success": true, "message": "created", "data": {"id": "u9"}}),
        );
        let registration = Registration {
            email: "new@example.com".into(),
            password: "secret".into(),
            first_name: "New".into(),
            last_name: "User".into(),
        };

        assert!(fx.session.register(&registration).await);
        assert!(!fx.session.is_authenticated());
        assert!(fx.store.get().is_none());
        assert_eq!(
            drain(&mut fx.events),
            vec![SessionEvent::Notice {
                level: NoticeLevel::Success,
                message: "Registered new@example.com. You can now log in.".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_register_rejected() {
        let fx = fixture();
        fx.transport.on(
            Method::POST,
            "/auth/register",
            409,
            json!({"success": false, "message": "Email taken"}),
        );
        let registration = Registration {
            email: "ada@example.com".into(),
            password: "secret".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };

        assert!(!fx.session.register(&registration).await);
    }

    #[tokio::test]
    async fn test_logout_clears_and_navigates() {
        let mut fx = logged_in().await;
        fx.transport.on(Method::POST, "/auth/logout", 200, json!({"success": true}));
        let token = fx.store.access_token().unwrap();

        fx.session.logout().await;

        assert!(!fx.session.is_authenticated());
        assert!(fx.store.get().is_none());
        assert!(fx.store.user_value().is_none());
        let sent = fx.transport.requests_to("/auth/logout");
        assert_eq!(sent[0].bearer(), Some(token.as_str()));
        assert_eq!(
            drain(&mut fx.events),
            vec![
                SessionEvent::Notice {
                    level: NoticeLevel::Info,
                    message: LOGGED_OUT.into(),
                },
                SessionEvent::Navigate("/login".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_logout_survives_server_failure() {
        let fx = logged_in().await;
        fx.transport.fail(Method::POST, "/auth/logout", "offline");

        fx.session.logout().await;

        assert!(!fx.session.is_authenticated());
        assert!(fx.store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let fx = fixture();

        fx.session.logout().await;
        fx.session.logout().await;

        assert!(!fx.session.is_authenticated());
        assert!(fx.store.get().is_none());
        // No token, nothing to revoke.
        assert_eq!(fx.transport.count("/auth/logout"), 0);
    }

    #[tokio::test]
    async fn test_invalid_refresh_token_ends_session() {
        let mut fx = logged_in().await;
        drain(&mut fx.events);
        fx.store
            .set(&Credential::new(token_expiring_in(-60), "revoked"));
        fx.transport.on(
            Method::POST,
            "/auth/refresh-token",
            401,
            json!({"success": false, "message": INVALID_REFRESH_TOKEN}),
        );

        let resp = fx
            .session
            .client()
            .execute(fx.session.client().request(Method::GET, "/items"))
            .await
            .unwrap();

        assert!(resp.is_unauthorized());
        assert!(fx.store.get().is_none());
        assert!(fx.store.user_value().is_none());
        assert!(!fx.session.is_authenticated());
        assert_eq!(
            drain(&mut fx.events),
            vec![
                SessionEvent::Notice {
                    level: NoticeLevel::Error,
                    message: SESSION_EXPIRED.into(),
                },
                SessionEvent::Navigate("/login".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_session() {
        let fx = logged_in().await;
        fx.store.set(&Credential::new(token_expiring_in(-60), "r1"));
        fx.transport.on_delayed(
            Method::POST,
            "/auth/refresh-token",
            503,
            json!({"message": "Service unavailable"}),
            Duration::from_millis(5),
        );

        let resp = fx
            .session
            .client()
            .execute(fx.session.client().request(Method::GET, "/items"))
            .await
            .unwrap();

        assert!(resp.is_unauthorized());
        assert!(fx.session.is_authenticated());
        assert_eq!(fx.store.refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_update_user_merges() {
        let fx = logged_in().await;

        assert!(fx.session.update_user(json!({"phoneNumber": "555-0100", "role": "manager"})));

        let user = fx.session.current_user().unwrap();
        assert_eq!(user.phone_number.as_deref(), Some("555-0100"));
        assert_eq!(user.role, crate::models::UserRole::Manager);
        assert_eq!(user.username, "ada");
        let cached: User = serde_json::from_value(fx.store.user_value().unwrap()).unwrap();
        assert_eq!(cached, user);
    }

    #[tokio::test]
    async fn test_update_user_rejects_invalid_merge() {
        let fx = logged_in().await;

        assert!(!fx.session.update_user(json!({"role": "root"})));
        assert!(!fx.session.update_user(json!("not an object")));
        assert_eq!(
            fx.session.current_user().unwrap().role,
            crate::models::UserRole::Admin
        );
    }

    #[test]
    fn test_update_user_anonymous_is_noop() {
        let fx = fixture();
        assert!(!fx.session.update_user(json!({"username": "ghost"})));
        assert!(fx.store.user_value().is_none());
    }
}
