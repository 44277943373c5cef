/// User Store
///
/// The authentication subsystem reads users and never mutates them except
/// through hashed-password output; profile mutation lives behind the
/// policy-checked user routes. Post listing exists for the
/// ownership-switched read path (owner/admin see private posts, everyone
/// else sees public ones).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, DatabaseError};
use crate::policy::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub public: bool,
}

/// Fields of a profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<User, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), AppError>;

    /// Posts owned by `user_id`; private posts only when the caller's
    /// policy decision allowed them.
    async fn posts_for(&self, user_id: Uuid, include_private: bool)
        -> Result<Vec<Post>, AppError>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    Role::from_str(raw).map_err(|e| AppError::Internal(format!("Corrupt role column: {}", e)))
}

type UserRow = (Uuid, String, String, String, String);

fn row_to_user(row: UserRow) -> Result<User, AppError> {
    let (id, name, email, password_hash, role) = row;
    Ok(User {
        id,
        name,
        email,
        password_hash,
        role: parse_role(&role)?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(id)
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET name = COALESCE($1, name),
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                updated_at = $4
            WHERE id = $5
            RETURNING id, name, email, password_hash, role
            "#,
        )
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.password_hash)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_user(row),
            None => Err(AppError::Database(DatabaseError::NotFound(format!(
                "User {}",
                id
            )))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "User {}",
                id
            ))));
        }
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET role = $1, updated_at = $2 WHERE id = $3")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "User {}",
                id
            ))));
        }
        Ok(())
    }

    async fn posts_for(
        &self,
        user_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, bool)>(
            r#"
            SELECT id, user_id, title, public
            FROM posts
            WHERE user_id = $1 AND (public = true OR $2)
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(include_private)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, title, public)| Post {
                id,
                user_id,
                title,
                public,
            })
            .collect())
    }
}

/// In-memory store for tests
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
    posts: Mutex<Vec<Post>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test seeding helper
    pub fn add_post(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(&id).cloned())
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!("User {}", id)))
        })?;

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        users.remove(&id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!("User {}", id)))
        })?;
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!("User {}", id)))
        })?;
        user.role = role;
        Ok(())
    }

    async fn posts_for(
        &self,
        user_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<Post>, AppError> {
        let posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .filter(|p| p.user_id == user_id && (p.public || include_private))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "$2b$12$hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();

        let result = store.create(new_user("a@example.com")).await;
        match result {
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_))) => {}
            other => panic!("Expected unique violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn patch_leaves_unset_fields_alone() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();

        let updated = store
            .update_profile(
                user.id,
                ProfilePatch {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email, "a@example.com");
        assert_eq!(updated.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn private_posts_stay_hidden_without_the_flag() {
        let store = MemoryUserStore::new();
        let owner = Uuid::new_v4();
        store.add_post(Post {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "public".to_string(),
            public: true,
        });
        store.add_post(Post {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "draft".to_string(),
            public: false,
        });

        let public_only = store.posts_for(owner, false).await.unwrap();
        assert_eq!(public_only.len(), 1);
        assert_eq!(public_only[0].title, "public");

        let all = store.posts_for(owner, true).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
