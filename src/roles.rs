/// Role and permission management
///
/// Permissions are power-of-two capability flags OR-ed into an integer
/// mask stored on each role. Users point at a role; a user whose role
/// was deleted (NULL role_id) fails every permission check.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Capability flags. Each variant is a distinct bit in the role mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Permission {
    Follow = 0x001,
    Like = 0x002,
    Bookmark = 0x004,
    Comment = 0x008,
    Write = 0x010,
    EditArticle = 0x020,
    DeleteArticle = 0x040,
    ModerateComments = 0x080,
    Admin = 0x100,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::Follow,
        Permission::Like,
        Permission::Bookmark,
        Permission::Comment,
        Permission::Write,
        Permission::EditArticle,
        Permission::DeleteArticle,
        Permission::ModerateComments,
        Permission::Admin,
    ];

    /// Bit value as stored in the database mask
    pub fn bit(self) -> i64 {
        self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Follow => "follow",
            Permission::Like => "like",
            Permission::Bookmark => "bookmark",
            Permission::Comment => "comment",
            Permission::Write => "write",
            Permission::EditArticle => "edit_article",
            Permission::DeleteArticle => "delete_article",
            Permission::ModerateComments => "moderate_comments",
            Permission::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "follow" => Ok(Permission::Follow),
            "like" => Ok(Permission::Like),
            "bookmark" => Ok(Permission::Bookmark),
            "comment" => Ok(Permission::Comment),
            "write" => Ok(Permission::Write),
            "edit_article" => Ok(Permission::EditArticle),
            "delete_article" => Ok(Permission::DeleteArticle),
            "moderate_comments" => Ok(Permission::ModerateComments),
            "admin" => Ok(Permission::Admin),
            _ => Err(AppError::Validation(format!("Invalid permission: {}", s))),
        }
    }
}

/// OR a list of permissions into a mask
pub fn mask_of(permissions: &[Permission]) -> i64 {
    permissions.iter().fold(0, |mask, p| mask | p.bit())
}

/// Role record in the database
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub permissions: i64,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// True when the permission bit is set on this role's mask
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions & permission.bit() == permission.bit()
    }

    /// Names of every permission on this role
    pub fn permission_names(&self) -> Vec<&'static str> {
        Permission::ALL
            .iter()
            .filter(|p| self.has(**p))
            .map(|p| p.as_str())
            .collect()
    }
}

/// Name of the role new users receive
pub const DEFAULT_ROLE_NAME: &str = "User";

/// Canonical roles seeded at startup: (name, is_default, permissions)
fn canonical_roles() -> Vec<(&'static str, bool, Vec<Permission>)> {
    let base = vec![
        Permission::Follow,
        Permission::Like,
        Permission::Bookmark,
        Permission::Comment,
    ];
    let mut author = base.clone();
    author.extend([
        Permission::Write,
        Permission::EditArticle,
        Permission::DeleteArticle,
    ]);
    let mut moderator = author.clone();
    moderator.push(Permission::ModerateComments);

    vec![
        (DEFAULT_ROLE_NAME, true, base),
        ("PremiumUser", false, author),
        ("Moderator", false, moderator),
        ("Administrator", false, Permission::ALL.to_vec()),
    ]
}

/// Role manager
#[derive(Clone)]
pub struct RoleManager {
    db: SqlitePool,
}

impl RoleManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new role with an empty permission mask
    pub async fn create_role(&self, name: &str) -> AppResult<Role> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO roles (name, is_default, permissions, created_at)
            VALUES (?, 0, 0, ?)
            "#,
        )
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(done) => Ok(Role {
                id: done.last_insert_rowid(),
                name: name.to_string(),
                is_default: false,
                permissions: 0,
                created_at: now,
            }),
            Err(e) if crate::error::is_unique_violation(&e) => Err(AppError::Conflict(format!(
                "Role already exists: {}",
                name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a role by id
    pub async fn get_role(&self, id: i64) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions, created_at FROM roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(role)
    }

    /// Get a role by name
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions, created_at FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(role)
    }

    /// List all roles
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions, created_at FROM roles ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(roles)
    }

    /// Set a permission bit on a role. Idempotent: adding a permission
    /// the role already has changes nothing.
    pub async fn add_permission(&self, role_id: i64, permission: Permission) -> AppResult<Role> {
        let result = sqlx::query("UPDATE roles SET permissions = permissions | ? WHERE id = ?")
            .bind(permission.bit())
            .bind(role_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No role with id {}", role_id)));
        }

        self.get_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No role with id {}", role_id)))
    }

    /// Clear a permission bit on a role. Idempotent: removing a
    /// permission the role lacks changes nothing.
    pub async fn remove_permission(&self, role_id: i64, permission: Permission) -> AppResult<Role> {
        let result = sqlx::query("UPDATE roles SET permissions = permissions & ~? WHERE id = ?")
            .bind(permission.bit())
            .bind(role_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No role with id {}", role_id)));
        }

        self.get_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No role with id {}", role_id)))
    }

    /// Clear the whole permission mask on a role
    pub async fn reset_permissions(&self, role_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE roles SET permissions = 0 WHERE id = ?")
            .bind(role_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Mark a role as the default, clearing the flag everywhere else
    pub async fn set_default(&self, role_id: i64) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE roles SET is_default = 0 WHERE id <> ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE roles SET is_default = 1 WHERE id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No role with id {}", role_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Seed the canonical roles. Idempotent: running it twice leaves the
    /// same masks. Each role is reset and re-granted inside one
    /// transaction so a concurrent reader never sees a half-applied
    /// mask.
    pub async fn seed_default_roles(&self) -> AppResult<()> {
        for (name, is_default, permissions) in canonical_roles() {
            let mut tx = self.db.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO roles (name, is_default, permissions, created_at)
                VALUES (?, ?, 0, ?)
                ON CONFLICT(name) DO NOTHING
                "#,
            )
            .bind(name)
            .bind(is_default)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE roles SET permissions = 0, is_default = ? WHERE name = ?")
                .bind(is_default)
                .bind(name)
                .execute(&mut *tx)
                .await?;

            for permission in &permissions {
                sqlx::query("UPDATE roles SET permissions = permissions | ? WHERE name = ?")
                    .bind(permission.bit())
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
        }

        // Exactly one default role
        sqlx::query("UPDATE roles SET is_default = 0 WHERE name <> ?")
            .bind(DEFAULT_ROLE_NAME)
            .execute(&self.db)
            .await?;

        tracing::info!("Seeded {} canonical roles", canonical_roles().len());
        Ok(())
    }

    /// Id of the default role, creating it if missing. The unique name
    /// constraint makes the create race safe: concurrent callers both
    /// reach the SELECT and read the single surviving row.
    pub async fn default_role_id(&self) -> AppResult<i64> {
        if let Some(role) = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions, created_at FROM roles WHERE is_default = 1 LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?
        {
            return Ok(role.id);
        }

        let (name, _, permissions) = canonical_roles().remove(0);

        sqlx::query(
            r#"
            INSERT INTO roles (name, is_default, permissions, created_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(mask_of(&permissions))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        sqlx::query("UPDATE roles SET is_default = 1 WHERE name = ?")
            .bind(name)
            .execute(&self.db)
            .await?;

        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions, created_at FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(role.id)
    }

    /// Delete a role. Users holding it fall back to NULL and deny all
    /// permission checks until reassigned.
    pub async fn delete_role(&self, role_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(role_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No role with id {}", role_id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqlitePool {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                is_default INTEGER NOT NULL DEFAULT 0,
                permissions INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        db
    }

    #[test]
    fn test_permission_bits_are_distinct() {
        let mut seen = 0i64;
        for p in Permission::ALL {
            assert_eq!(seen & p.bit(), 0, "{} overlaps another bit", p.as_str());
            seen |= p.bit();
        }
    }

    #[test]
    fn test_permission_from_str_roundtrip() {
        for p in Permission::ALL {
            assert_eq!(Permission::from_str(p.as_str()).unwrap(), p);
        }
        assert!(Permission::from_str("fly").is_err());
    }

    #[test]
    fn test_role_has() {
        let role = Role {
            id: 1,
            name: "Test".to_string(),
            is_default: false,
            permissions: mask_of(&[Permission::Like, Permission::Comment]),
            created_at: Utc::now(),
        };

        assert!(role.has(Permission::Like));
        assert!(role.has(Permission::Comment));
        assert!(!role.has(Permission::Write));
        assert!(!role.has(Permission::Admin));
    }

    #[tokio::test]
    async fn test_add_permission_is_idempotent() {
        let manager = RoleManager::new(test_db().await);
        let role = manager.create_role("Editors").await.unwrap();

        let once = manager
            .add_permission(role.id, Permission::Write)
            .await
            .unwrap();
        let twice = manager
            .add_permission(role.id, Permission::Write)
            .await
            .unwrap();

        assert_eq!(once.permissions, twice.permissions);
        assert!(twice.has(Permission::Write));
    }

    #[tokio::test]
    async fn test_remove_permission_is_idempotent() {
        let manager = RoleManager::new(test_db().await);
        let role = manager.create_role("Editors").await.unwrap();

        manager
            .add_permission(role.id, Permission::Write)
            .await
            .unwrap();
        let removed = manager
            .remove_permission(role.id, Permission::Write)
            .await
            .unwrap();
        let removed_again = manager
            .remove_permission(role.id, Permission::Write)
            .await
            .unwrap();

        assert!(!removed.has(Permission::Write));
        assert_eq!(removed.permissions, removed_again.permissions);
    }

    #[tokio::test]
    async fn test_remove_leaves_other_bits() {
        let manager = RoleManager::new(test_db().await);
        let role = manager.create_role("Editors").await.unwrap();

        manager
            .add_permission(role.id, Permission::Write)
            .await
            .unwrap();
        manager
            .add_permission(role.id, Permission::Like)
            .await
            .unwrap();
        let after = manager
            .remove_permission(role.id, Permission::Write)
            .await
            .unwrap();

        assert!(after.has(Permission::Like));
        assert!(!after.has(Permission::Write));
    }

    #[tokio::test]
    async fn test_duplicate_role_name_conflicts() {
        let manager = RoleManager::new(test_db().await);
        manager.create_role("Editors").await.unwrap();

        let err = manager.create_role("Editors").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let manager = RoleManager::new(test_db().await);

        manager.seed_default_roles().await.unwrap();
        let first: Vec<(String, i64, bool)> = manager
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.permissions, r.is_default))
            .collect();

        manager.seed_default_roles().await.unwrap();
        let second: Vec<(String, i64, bool)> = manager
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.permissions, r.is_default))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn test_seed_restores_drifted_mask() {
        let manager = RoleManager::new(test_db().await);
        manager.seed_default_roles().await.unwrap();

        let user_role = manager.find_by_name("User").await.unwrap().unwrap();
        manager
            .add_permission(user_role.id, Permission::Admin)
            .await
            .unwrap();

        manager.seed_default_roles().await.unwrap();
        let restored = manager.find_by_name("User").await.unwrap().unwrap();
        assert!(!restored.has(Permission::Admin));
        assert!(restored.has(Permission::Like));
    }

    #[tokio::test]
    async fn test_user_role_permissions() {
        let manager = RoleManager::new(test_db().await);
        manager.seed_default_roles().await.unwrap();

        let user = manager.find_by_name("User").await.unwrap().unwrap();
        assert!(user.has(Permission::Like));
        assert!(user.has(Permission::Comment));
        assert!(!user.has(Permission::Write));

        let admin = manager.find_by_name("Administrator").await.unwrap().unwrap();
        for p in Permission::ALL {
            assert!(admin.has(p), "Administrator missing {}", p.as_str());
        }
    }

    #[tokio::test]
    async fn test_default_role_created_on_demand() {
        let manager = RoleManager::new(test_db().await);

        let id = manager.default_role_id().await.unwrap();
        let again = manager.default_role_id().await.unwrap();
        assert_eq!(id, again);

        let role = manager.get_role(id).await.unwrap().unwrap();
        assert_eq!(role.name, DEFAULT_ROLE_NAME);
        assert!(role.is_default);
        assert!(role.has(Permission::Follow));
    }

    #[tokio::test]
    async fn test_default_role_create_race_converges() {
        let manager = RoleManager::new(test_db().await);

        // Simulate the loser of a concurrent first boot: the row already
        // exists when our insert runs. ON CONFLICT makes it a no-op and
        // both callers read the same id.
        sqlx::query(
            "INSERT INTO roles (name, is_default, permissions, created_at) VALUES (?, 1, 0, ?)",
        )
        .bind(DEFAULT_ROLE_NAME)
        .bind(Utc::now().to_rfc3339())
        .execute(&manager.db)
        .await
        .unwrap();

        let id = manager.default_role_id().await.unwrap();
        let roles = manager.list_roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, id);
    }

    #[tokio::test]
    async fn test_set_default_is_exclusive() {
        let manager = RoleManager::new(test_db().await);
        manager.seed_default_roles().await.unwrap();

        let moderator = manager.find_by_name("Moderator").await.unwrap().unwrap();
        manager.set_default(moderator.id).await.unwrap();

        let defaults: Vec<Role> = manager
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "Moderator");
    }

    #[tokio::test]
    async fn test_delete_role() {
        let manager = RoleManager::new(test_db().await);
        let role = manager.create_role("Doomed").await.unwrap();

        manager.delete_role(role.id).await.unwrap();
        assert!(manager.get_role(role.id).await.unwrap().is_none());

        let err = manager.delete_role(role.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
