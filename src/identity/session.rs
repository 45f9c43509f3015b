use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{parse_timestamp, UserId};

/// Create a new session for an identity. Returns the token and its expiry.
pub fn create_session(
    conn: &Connection,
    identity_id: &UserId,
    hours: u64,
) -> Result<(String, DateTime<Utc>), rusqlite::Error> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let expires_at = Utc::now() + Duration::hours(hours as i64);

    conn.execute(
        "INSERT INTO sessions (id, identity_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            id,
            identity_id.as_str(),
            token,
            expires_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        ],
    )?;

    Ok((token, expires_at))
}

/// Delete a session by token, returning the identity it belonged to.
pub fn delete_session(conn: &Connection, token: &str) -> Result<Option<UserId>, rusqlite::Error> {
    let identity: Option<String> = conn
        .query_row(
            "DELETE FROM sessions WHERE token = ?1 RETURNING identity_id",
            params![token],
            |row| row.get(0),
        )
        .optional()?;

    Ok(identity.map(UserId::new))
}

/// Identity behind a live session, if any.
pub fn lookup_session(
    conn: &Connection,
    token: &str,
) -> Result<Option<(UserId, String)>, rusqlite::Error> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT a.id, a.email, s.expires_at FROM sessions s
             JOIN auth_identities a ON a.id = s.identity_id
             WHERE s.token = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(row.and_then(|(id, email, expires_at)| {
        if parse_timestamp(&expires_at) > Utc::now() {
            Some((UserId::new(id), email))
        } else {
            None
        }
    }))
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for (_, sql) in crate::db::MIGRATIONS {
            conn.execute_batch(sql).unwrap();
        }
        conn.execute(
            "INSERT INTO auth_identities (id, email, password_hash) VALUES ('u1', 'a@x.io', 'h')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_lifecycle() {
        let conn = test_conn();
        let id = UserId::new("u1");

        let (token, expires_at) = create_session(&conn, &id, 1).unwrap();
        assert!(expires_at > Utc::now());

        let found = lookup_session(&conn, &token).unwrap();
        assert_eq!(found, Some((id.clone(), "a@x.io".to_string())));

        assert_eq!(delete_session(&conn, &token).unwrap(), Some(id));
        assert_eq!(lookup_session(&conn, &token).unwrap(), None);
        assert_eq!(delete_session(&conn, &token).unwrap(), None);
    }

    #[test]
    fn expired_session_is_ignored() {
        let conn = test_conn();
        let (token, _) = create_session(&conn, &UserId::new("u1"), 0).unwrap();
        assert_eq!(lookup_session(&conn, &token).unwrap(), None);
    }
}
