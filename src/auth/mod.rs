//! Session credential storage for platform resolvers.
//!
//! Credentials are opaque, already-valid session material harvested outside
//! this crate. Resolvers attach them as headers or cookies and never parse,
//! validate, or refresh them; the only check performed here is the archive
//! platform's expiry timestamp.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::task::Platform;

/// Session material for the cursor-paged timeline platform.
#[derive(Debug, Clone)]
pub struct TwitterSession {
    /// CSRF token sent as the `x-csrf-token` header and `ct0` cookie.
    pub csrf_token: String,
    /// Auth token cookie.
    pub auth_token: String,
    /// Numeric account id used by the media timeline endpoint.
    pub user_id: u64,
}

impl TwitterSession {
    /// Cookie pairs attached to timeline requests and media transfers.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        vec![
            ("auth_token".to_string(), self.auth_token.clone()),
            ("ct0".to_string(), self.csrf_token.clone()),
        ]
    }
}

/// Session material for the timestamp-paged archive platform.
#[derive(Debug, Clone)]
pub struct LofterSession {
    /// Login cookie name.
    pub login_key: String,
    /// Login cookie value.
    pub login_value: String,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl LofterSession {
    /// Returns true once the session's expiry timestamp has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Cookie pair attached to archive requests.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        vec![(self.login_key.clone(), self.login_value.clone())]
    }
}

/// Single session id used by the single-shot platforms.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Per-platform credential holder shared across the pipeline.
///
/// Constructed once at process start and passed by handle; setters exist so
/// an external login flow can install fresh sessions while the pipeline is
/// running.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<Credentials>>,
}

#[derive(Debug, Default)]
struct Credentials {
    twitter: Option<TwitterSession>,
    lofter: Option<LofterSession>,
    pixiv: Option<SessionId>,
    weibo: Option<SessionId>,
    kuaikan: Option<SessionId>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the timeline session, if installed.
    #[must_use]
    pub fn twitter(&self) -> Option<TwitterSession> {
        self.inner.read().ok().and_then(|c| c.twitter.clone())
    }

    /// Returns the archive session, if installed and not expired.
    #[must_use]
    pub fn lofter(&self) -> Option<LofterSession> {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.lofter.clone())
            .filter(|session| !session.is_expired())
    }

    /// Returns the session id for a single-shot platform, if installed.
    #[must_use]
    pub fn session_id(&self, platform: Platform) -> Option<SessionId> {
        let guard = self.inner.read().ok()?;
        match platform {
            Platform::Pixiv => guard.pixiv.clone(),
            Platform::Weibo => guard.weibo.clone(),
            Platform::Kuaikan => guard.kuaikan.clone(),
            Platform::Twitter | Platform::Lofter => None,
        }
    }

    /// Installs a timeline session.
    pub fn set_twitter(&self, session: TwitterSession) {
        if let Ok(mut guard) = self.inner.write() {
            guard.twitter = Some(session);
        }
    }

    /// Installs an archive session.
    pub fn set_lofter(&self, session: LofterSession) {
        if let Ok(mut guard) = self.inner.write() {
            guard.lofter = Some(session);
        }
    }

    /// Installs a single-shot platform session id.
    ///
    /// Setting a session id for the timeline or archive platform is a no-op;
    /// those platforms carry structured sessions.
    pub fn set_session_id(&self, platform: Platform, session: SessionId) {
        if let Ok(mut guard) = self.inner.write() {
            match platform {
                Platform::Pixiv => guard.pixiv = Some(session),
                Platform::Weibo => guard.weibo = Some(session),
                Platform::Kuaikan => guard.kuaikan = Some(session),
                Platform::Twitter | Platform::Lofter => {}
            }
        }
    }
}
