//! Typed access to the values kept in the HTTP session.

use crate::core::access::SessionIdentity;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

const IDENTITY_KEY: &str = "identity";
const FLASH_KEY: &str = "flash";

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

/// Flash styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

fn session_error(e: tower_sessions::session::Error) -> Error {
    Error::Session {
        message: e.to_string(),
    }
}

/// The logged-in identity, if any.
pub async fn identity(session: &Session) -> Result<Option<SessionIdentity>> {
    session.get(IDENTITY_KEY).await.map_err(session_error)
}

/// Stores `identity` under a fresh session id.
pub async fn establish(session: &Session, identity: &SessionIdentity) -> Result<()> {
    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(IDENTITY_KEY, identity)
        .await
        .map_err(session_error)
}

/// Replaces the stored identity in place, keeping the session id.
pub async fn refresh(session: &Session, identity: &SessionIdentity) -> Result<()> {
    session
        .insert(IDENTITY_KEY, identity)
        .await
        .map_err(session_error)
}

/// Drops everything in the session and deletes its record.
pub async fn clear(session: &Session) -> Result<()> {
    session.flush().await.map_err(session_error)
}

/// Queues a flash message for the next page.
pub async fn set_flash(session: &Session, kind: FlashKind, message: impl Into<String>) -> Result<()> {
    let flash = Flash {
        kind,
        message: message.into(),
    };
    session.insert(FLASH_KEY, flash).await.map_err(session_error)
}

/// Removes and returns the pending flash message.
pub async fn take_flash(session: &Session) -> Result<Option<Flash>> {
    session.remove(FLASH_KEY).await.map_err(session_error)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    #[tokio::test]
    async fn test_flash_is_consumed_once() -> Result<()> {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        set_flash(&session, FlashKind::Error, "Nope").await?;
        let flash = take_flash(&session).await?.unwrap();
        assert_eq!(flash.kind, FlashKind::Error);
        assert_eq!(flash.message, "Nope");
        assert!(take_flash(&session).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_identity_round_trip_and_clear() -> Result<()> {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        assert!(identity(&session).await?.is_none());

        let who = SessionIdentity {
            user_id: 3,
            display_name: "Ada".to_string(),
            role_id: 4,
            role_name: "Student".to_string(),
        };
        establish(&session, &who).await?;
        assert_eq!(identity(&session).await?, Some(who));

        clear(&session).await?;
        assert!(identity(&session).await?.is_none());
        Ok(())
    }
}
