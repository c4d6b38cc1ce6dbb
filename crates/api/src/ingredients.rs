use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::Ingredient;

/// Query string of `GET /ingredients/`.
#[derive(Debug, Default, Deserialize)]
pub struct IngredientQuery {
    pub name: Option<String>,
    #[serde(rename = "name__istartswith")]
    pub name_istartswith: Option<String>,
    #[serde(rename = "name__icontains")]
    pub name_icontains: Option<String>,
}

/// Case-insensitive ingredient name filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    Prefix(String),
    Substring(String),
}

impl NameFilter {
    pub fn from_query(query: &IngredientQuery) -> Option<Self> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        present(&query.name)
            .or_else(|| present(&query.name_istartswith))
            .map(NameFilter::Prefix)
            .or_else(|| present(&query.name_icontains).map(NameFilter::Substring))
    }

    /// `LIKE` pattern with the user's `%`, `_` and `\` taken literally.
    pub fn like_pattern(&self) -> String {
        let escape = |raw: &str| {
            let mut out = String::with_capacity(raw.len());
            for c in raw.chars() {
                if matches!(c, '\\' | '%' | '_') {
                    out.push('\\');
                }
                out.push(c);
            }
            out
        };
        match self {
            NameFilter::Prefix(p) => format!("{}%", escape(p)),
            NameFilter::Substring(s) => format!("%{}%", escape(s)),
        }
    }
}

pub async fn search(db: &PgPool, filter: Option<&NameFilter>) -> AppResult<Vec<Ingredient>> {
    let rows = match filter {
        Some(filter) => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients WHERE LOWER(name) LIKE LOWER($1) ORDER BY name, id",
            )
            .bind(filter.like_pattern())
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients ORDER BY name, id",
            )
            .fetch_all(db)
            .await?
        }
    };
    Ok(rows)
}

pub async fn fetch(db: &PgPool, id: i64) -> AppResult<Ingredient> {
    sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(AppError::not_found)
}

#[derive(Debug, Deserialize)]
pub struct IngredientSeed {
    pub name: String,
    pub measurement_unit: String,
}

pub fn parse_seed(raw: &str) -> anyhow::Result<Vec<IngredientSeed>> {
    serde_json::from_str(raw).context("ingredient file is not a JSON array of {name, measurement_unit}")
}

/// Loads a JSON ingredient list, skipping pairs already present. Returns the
/// number of rows created.
pub async fn load_from_file(db: &PgPool, path: &Path) -> anyhow::Result<u64> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("File not found: {}", path.display()))?;
    let seeds = parse_seed(&raw)?;

    let (names, units): (Vec<String>, Vec<String>) = seeds
        .into_iter()
        .map(|s| (s.name, s.measurement_unit))
        .unzip();

    let created = sqlx::query(
        r#"
        INSERT INTO ingredients (name, measurement_unit)
        SELECT name, measurement_unit FROM UNNEST($1::VARCHAR[], $2::VARCHAR[]) AS t (name, measurement_unit)
        ON CONFLICT (name, measurement_unit) DO NOTHING
        "#,
    )
    .bind(names)
    .bind(units)
    .execute(db)
    .await?
    .rows_affected();

    info!("Loaded ingredients: {}", created);
    Ok(created)
}

pub async fn delete_all(db: &PgPool) -> anyhow::Result<u64> {
    let deleted = sqlx::query("DELETE FROM ingredients")
        .execute(db)
        .await?
        .rows_affected();
    info!("Deleted ingredients: {}", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_is_anchored_at_the_start() {
        assert_eq!(NameFilter::Prefix("egg".into()).like_pattern(), "egg%");
        assert_eq!(NameFilter::Substring("egg".into()).like_pattern(), "%egg%");
    }

    #[test]
    fn query_parameters_select_mode() {
        let q = IngredientQuery {
            name: Some("egg".into()),
            ..Default::default()
        };
        assert_eq!(NameFilter::from_query(&q), Some(NameFilter::Prefix("egg".into())));

        let q = IngredientQuery {
            name_icontains: Some("egg".into()),
            ..Default::default()
        };
        assert_eq!(NameFilter::from_query(&q), Some(NameFilter::Substring("egg".into())));

        let q = IngredientQuery {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(NameFilter::from_query(&q), None);
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(NameFilter::Prefix("50%_".into()).like_pattern(), r"50\%\_%");
        assert_eq!(NameFilter::Substring("a".into()).like_pattern(), "%a%");
    }

    #[test]
    fn seed_file_parses() {
        let seeds = parse_seed(r#"[{"name": "salt", "measurement_unit": "g"}]"#).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].measurement_unit, "g");
        assert!(parse_seed("{}").is_err());
    }
}
