//! Table definitions. Every statement is idempotent.

pub(crate) const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS oauth_apps (
        aid          BIGSERIAL PRIMARY KEY,
        name         TEXT NOT NULL DEFAULT '',
        client_id    TEXT NOT NULL UNIQUE,
        secret       TEXT NOT NULL DEFAULT '',
        redirect_uri TEXT NOT NULL DEFAULT '',
        url          TEXT NOT NULL DEFAULT '',
        extra        JSONB,
        call_count   BIGINT NOT NULL DEFAULT 0,
        state        INTEGER NOT NULL DEFAULT 0,
        ctime        BIGINT NOT NULL DEFAULT 0,
        utime        BIGINT NOT NULL DEFAULT 0,
        dtime        BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oauth_authorize (
        code                  TEXT PRIMARY KEY,
        client_id             TEXT NOT NULL,
        expires_in            BIGINT NOT NULL,
        scope                 TEXT NOT NULL DEFAULT '',
        redirect_uri          TEXT NOT NULL DEFAULT '',
        state                 TEXT NOT NULL DEFAULT '',
        ctime                 BIGINT NOT NULL,
        extra                 JSONB,
        code_challenge        TEXT,
        code_challenge_method TEXT,
        sso                   JSONB
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oauth_access (
        access_token   TEXT PRIMARY KEY,
        client_id      TEXT NOT NULL,
        authorize_code TEXT NOT NULL DEFAULT '',
        previous       TEXT NOT NULL DEFAULT '',
        refresh_token  TEXT NOT NULL DEFAULT '',
        expires_in     BIGINT NOT NULL,
        scope          TEXT NOT NULL DEFAULT '',
        redirect_uri   TEXT NOT NULL DEFAULT '',
        ctime          BIGINT NOT NULL,
        extra          JSONB,
        parent_token   TEXT,
        client_ip      TEXT NOT NULL DEFAULT '',
        user_agent     TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oauth_refresh (
        token        TEXT PRIMARY KEY,
        access_token TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oauth_expires (
        id         BIGSERIAL PRIMARY KEY,
        token      TEXT NOT NULL,
        expires_at BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS oauth_expires_token_idx ON oauth_expires (token)",
    "CREATE INDEX IF NOT EXISTS oauth_expires_at_idx ON oauth_expires (expires_at)",
];
