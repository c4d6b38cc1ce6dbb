//! Favorite, shopping-cart and subscription markers.
//!
//! Conflicts are detected by the storage layer alone: `add` is an
//! insert-if-absent, and a unique violation raised underneath it is mapped to
//! the same `Conflict` outcome.

use sqlx::PgPool;
use tracing::info;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Favorite,
    ShoppingCart,
    Subscription,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Membership::Favorite => "favorites",
            Membership::ShoppingCart => "shopping_carts",
            Membership::Subscription => "subscriptions",
        }
    }

    fn target_column(self) -> &'static str {
        match self {
            Membership::Favorite | Membership::ShoppingCart => "recipe_id",
            Membership::Subscription => "author_id",
        }
    }

    pub fn already_member(self) -> &'static str {
        match self {
            Membership::Favorite => "Recipe is already in favorites.",
            Membership::ShoppingCart => "Recipe is already in the shopping cart.",
            Membership::Subscription => "You are already subscribed to this author.",
        }
    }

    pub fn not_member(self) -> &'static str {
        match self {
            Membership::Favorite => "Recipe is not in favorites.",
            Membership::ShoppingCart => "Recipe is not in the shopping cart.",
            Membership::Subscription => "You are not subscribed to this author.",
        }
    }

    fn insert_sql(self) -> String {
        format!(
            "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING id",
            self.table(),
            self.target_column()
        )
    }

    fn delete_sql(self) -> String {
        format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
            self.table(),
            self.target_column()
        )
    }

    fn exists_sql(self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND {} = $2)",
            self.table(),
            self.target_column()
        )
    }
}

/// Self-subscription is refused before storage is consulted.
pub fn check_pair(kind: Membership, subject: i64, target: i64) -> AppResult<()> {
    if kind == Membership::Subscription && subject == target {
        return Err(AppError::Conflict(
            "You cannot subscribe to yourself.".to_string(),
        ));
    }
    Ok(())
}

pub async fn add(db: &PgPool, kind: Membership, subject: i64, target: i64) -> AppResult<()> {
    check_pair(kind, subject, target)?;

    let inserted: Option<i64> = sqlx::query_scalar(&kind.insert_sql())
        .bind(subject)
        .bind(target)
        .fetch_optional(db)
        .await?;

    match inserted {
        Some(_) => {
            info!("{:?} added: user {} -> {}", kind, subject, target);
            Ok(())
        }
        None => Err(AppError::Conflict(kind.already_member().to_string())),
    }
}

pub async fn remove(db: &PgPool, kind: Membership, subject: i64, target: i64) -> AppResult<()> {
    let deleted = sqlx::query(&kind.delete_sql())
        .bind(subject)
        .bind(target)
        .execute(db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotMember(kind.not_member().to_string()));
    }
    info!("{:?} removed: user {} -> {}", kind, subject, target);
    Ok(())
}

pub async fn contains(db: &PgPool, kind: Membership, subject: i64, target: i64) -> AppResult<bool> {
    let exists = sqlx::query_scalar(&kind.exists_sql())
        .bind(subject)
        .bind(target)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_subscription_is_a_conflict() {
        let err = check_pair(Membership::Subscription, 7, 7).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(check_pair(Membership::Subscription, 7, 8).is_ok());
    }

    #[test]
    fn same_ids_are_fine_for_recipe_markers() {
        assert!(check_pair(Membership::Favorite, 3, 3).is_ok());
        assert!(check_pair(Membership::ShoppingCart, 3, 3).is_ok());
    }

    #[test]
    fn insert_is_conditional() {
        let sql = Membership::ShoppingCart.insert_sql();
        assert!(sql.starts_with("INSERT INTO shopping_carts (user_id, recipe_id)"));
        assert!(sql.contains("ON CONFLICT DO NOTHING RETURNING id"));
        assert!(Membership::Subscription.insert_sql().contains("(user_id, author_id)"));
    }

    #[test]
    fn delete_targets_exactly_one_pair() {
        assert_eq!(
            Membership::Favorite.delete_sql(),
            "DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2"
        );
    }

    #[test]
    fn outcome_messages_differ() {
        for kind in [
            Membership::Favorite,
            Membership::ShoppingCart,
            Membership::Subscription,
        ] {
            assert_ne!(kind.already_member(), kind.not_member());
        }
    }
}
