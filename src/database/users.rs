// ABOUTME: User persistence: registration, lookup, profile and password updates
// ABOUTME: Registration and federated creation are transactional with grant/binding rows
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{parse_uuid_column, Database};
use crate::errors::AppResult;
use crate::models::{RegisterSource, User, UserStatus};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Field set for inserting a user row
pub(crate) struct NewUser<'a> {
    pub uuid: Uuid,
    pub username: &'a str,
    pub password_hash: Option<&'a str>,
    pub email: Option<&'a str>,
    pub nickname: &'a str,
    pub avatar: &'a str,
    pub register_source: RegisterSource,
}

impl Database {
    pub(super) async fn migrate_users(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                password_hash TEXT,
                email TEXT UNIQUE,
                phone TEXT UNIQUE,
                nickname TEXT NOT NULL DEFAULT '',
                avatar TEXT NOT NULL DEFAULT '',
                address TEXT NOT NULL DEFAULT '',
                signature TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 1,
                register_source INTEGER NOT NULL DEFAULT 0,
                is_super_admin INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sso_users_email ON sso_users(email)")
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Fetch a user by email
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM sso_users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Fetch a user by its cross-system uuid
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_user_by_uuid(&self, uuid: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM sso_users WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Create a user together with its grant for the registering app,
    /// atomically. Registration on behalf of an app auto-grants that app.
    ///
    /// # Errors
    ///
    /// Returns an error if either insert fails; nothing is committed then.
    pub(crate) async fn create_user_with_grant(
        &self,
        user: &NewUser<'_>,
        app_id: i64,
    ) -> AppResult<User> {
        let mut tx = self.pool().begin().await?;
        let created = insert_user(&mut tx, user).await?;
        super::grants::insert_grant(&mut tx, created.uuid, app_id).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Create a federated user, its OAuth binding and its app grant in one
    /// transaction: all three rows or none.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed then.
    pub(crate) async fn create_federated_user(
        &self,
        user: &NewUser<'_>,
        provider: &str,
        open_id: &str,
        union_id: Option<&str>,
        app_id: i64,
    ) -> AppResult<User> {
        let mut tx = self.pool().begin().await?;
        let created = insert_user(&mut tx, user).await?;
        super::oauth_bindings::insert_binding(&mut tx, created.uuid, provider, open_id, union_id)
            .await?;
        super::grants::insert_grant(&mut tx, created.uuid, app_id).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Set the account status. Status is the only attribute an administrator
    /// mutates to revoke access.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_user_status(&self, uuid: Uuid, status: i64) -> AppResult<()> {
        sqlx::query("UPDATE sso_users SET status = ? WHERE uuid = ?")
            .bind(status)
            .bind(uuid.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Replace the stored password hash
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_user_password(&self, uuid: Uuid, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE sso_users SET password_hash = ? WHERE uuid = ?")
            .bind(password_hash)
            .bind(uuid.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Update the mutable profile fields that were provided
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_user_profile(
        &self,
        uuid: Uuid,
        nickname: Option<&str>,
        avatar: Option<&str>,
        address: Option<&str>,
        signature: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE sso_users SET
                nickname = COALESCE(?, nickname),
                avatar = COALESCE(?, avatar),
                address = COALESCE(?, address),
                signature = COALESCE(?, signature)
            WHERE uuid = ?
            ",
        )
        .bind(nickname)
        .bind(avatar)
        .bind(address)
        .bind(signature)
        .bind(uuid.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user: &NewUser<'_>,
) -> AppResult<User> {
    let now = Utc::now();
    let result = sqlx::query(
        r"
        INSERT INTO sso_users
            (uuid, username, password_hash, email, nickname, avatar, status,
             register_source, is_super_admin, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, 0, ?)
        ",
    )
    .bind(user.uuid.to_string())
    .bind(user.username)
    .bind(user.password_hash)
    .bind(user.email)
    .bind(user.nickname)
    .bind(user.avatar)
    .bind(user.register_source as i64)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        uuid: user.uuid,
        username: user.username.to_owned(),
        password_hash: user.password_hash.map(ToOwned::to_owned),
        email: user.email.map(ToOwned::to_owned),
        phone: None,
        nickname: user.nickname.to_owned(),
        avatar: user.avatar.to_owned(),
        address: String::new(),
        signature: String::new(),
        status: UserStatus::Active,
        register_source: user.register_source,
        is_super_admin: false,
        created_at: now,
    })
}

fn row_to_user(row: &SqliteRow) -> AppResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        uuid: parse_uuid_column(row.try_get("uuid")?)?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        nickname: row.try_get("nickname")?,
        avatar: row.try_get("avatar")?,
        address: row.try_get("address")?,
        signature: row.try_get("signature")?,
        status: UserStatus::from_i64(row.try_get("status")?),
        register_source: RegisterSource::from_i64(row.try_get("register_source")?),
        is_super_admin: row.try_get::<i64, _>("is_super_admin")? != 0,
        created_at: row.try_get("created_at")?,
    })
}
