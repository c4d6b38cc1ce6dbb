pub mod pipeline;
pub mod shopping;
pub mod shortlink;
pub mod view;

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::Recipe;
use crate::pagination::Pager;

const RECIPE_COLUMNS: &str = "r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, r.pub_date";

pub async fn fetch(db: &PgPool, id: i64) -> AppResult<Recipe> {
    sqlx::query_as::<_, Recipe>(
        "SELECT id, author_id, name, image, text, cooking_time, pub_date FROM recipes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(AppError::not_found)
}

pub async fn exists(db: &PgPool, id: i64) -> AppResult<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM recipes WHERE id = $1)")
        .bind(id)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

/// Only the author may change or delete a recipe.
pub fn ensure_author(recipe: &Recipe, user_id: i64) -> AppResult<()> {
    if recipe.author_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub async fn delete(db: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Query string of `GET /recipes/`.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeFilters {
    pub author: Option<i64>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
}

fn truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

impl RecipeFilters {
    /// User whose favorites restrict the listing. Ignored for anonymous requests.
    pub fn favorited_by(&self, viewer: Option<i64>) -> Option<i64> {
        viewer.filter(|_| truthy(self.is_favorited.as_deref()))
    }

    pub fn in_cart_of(&self, viewer: Option<i64>) -> Option<i64> {
        viewer.filter(|_| truthy(self.is_in_shopping_cart.as_deref()))
    }

    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>, viewer: Option<i64>) {
        if let Some(author) = self.author {
            qb.push(" AND r.author_id = ").push_bind(author);
        }
        if let Some(user_id) = self.favorited_by(viewer) {
            qb.push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if let Some(user_id) = self.in_cart_of(viewer) {
            qb.push(" AND EXISTS (SELECT 1 FROM shopping_carts sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }

    pub async fn count(&self, db: &PgPool, viewer: Option<i64>) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
        self.push_conditions(&mut qb, viewer);
        let count = qb.build_query_scalar::<i64>().fetch_one(db).await?;
        Ok(count)
    }

    /// Newest first.
    pub async fn page(&self, db: &PgPool, viewer: Option<i64>, pager: Pager) -> AppResult<Vec<Recipe>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE TRUE"
        ));
        self.push_conditions(&mut qb, viewer);
        qb.push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(pager.limit())
            .push(" OFFSET ")
            .push_bind(pager.offset());
        let rows = qb.build_query_as::<Recipe>().fetch_all(db).await?;
        Ok(rows)
    }
}

/// Most recent recipes of one author, for subscription listings.
pub async fn latest_by_author(db: &PgPool, author_id: i64, limit: i64) -> AppResult<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, author_id, name, image, text, cooking_time, pub_date
        FROM recipes WHERE author_id = $1
        ORDER BY pub_date DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_author(db: &PgPool, author_id: i64) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}
