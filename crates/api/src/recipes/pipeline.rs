//! Recipe write pipeline: validate a submission, then persist the recipe and
//! its ingredient set in one transaction.

use std::collections::HashSet;

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::info;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::images::{self, DecodedImage, MediaStore};
use crate::models::{Recipe, RecipeSubmission};
use crate::recipes::shortlink;
use crate::AppState;

pub const MIN_AMOUNT: i64 = 1;
pub const MAX_AMOUNT: i64 = 32000;
pub const MAX_NAME_LEN: usize = 256;
pub const RECIPE_IMAGE_FOLDER: &str = "recipes";

/// A submission that passed every check not requiring storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: DecodedImage,
    /// `(ingredient id, amount)` in submission order.
    pub ingredients: Vec<(i64, i32)>,
}

impl ValidatedRecipe {
    pub fn ingredient_ids(&self) -> Vec<i64> {
        self.ingredients.iter().map(|(id, _)| *id).collect()
    }
}

fn in_bounds(value: i64) -> bool {
    (MIN_AMOUNT..=MAX_AMOUNT).contains(&value)
}

/// Checks image, ingredient list and scalar fields. `current_image` is the
/// stored image of the recipe being revised, if any.
pub fn validate(payload: RecipeSubmission, current_image: Option<&str>) -> AppResult<ValidatedRecipe> {
    let mut errors = FieldErrors::new();

    let image = match images::decode("image", payload.image.as_deref(), current_image) {
        Ok(image) => Some(image),
        Err(AppError::Validation(e)) => {
            for msg in e.messages("image") {
                errors.add("image", msg.clone());
            }
            None
        }
        Err(other) => return Err(other),
    };

    if payload.ingredients.is_empty() {
        errors.add("ingredients", "At least one ingredient is required.");
    } else {
        let mut seen = HashSet::new();
        if payload.ingredients.iter().any(|item| !seen.insert(item.id)) {
            errors.add("ingredients", "Ingredients must not repeat.");
        }
        for item in payload.ingredients.iter().filter(|item| !in_bounds(item.amount)) {
            errors.add(
                "ingredients",
                format!(
                    "Amount for ingredient {} must be between {MIN_AMOUNT} and {MAX_AMOUNT}.",
                    item.id
                ),
            );
        }
    }

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.add(
            "name",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        );
    }

    if payload.text.trim().is_empty() {
        errors.add("text", "This field may not be blank.");
    }

    match payload.cooking_time {
        None => errors.add("cooking_time", "This field is required."),
        Some(t) if !in_bounds(t) => errors.add(
            "cooking_time",
            format!("Cooking time must be between {MIN_AMOUNT} and {MAX_AMOUNT} minutes."),
        ),
        Some(_) => {}
    }

    errors.into_result()?;

    Ok(ValidatedRecipe {
        name,
        text: payload.text,
        // bounds checked above
        cooking_time: payload.cooking_time.unwrap_or(MIN_AMOUNT) as i32,
        image: image.ok_or_else(|| AppError::field("image", "This field is required."))?,
        ingredients: payload
            .ingredients
            .iter()
            .map(|item| (item.id, item.amount as i32))
            .collect(),
    })
}

/// Requested ids with no row in `found`, in request order.
pub fn missing_ingredients(requested: &[i64], found: &[i64]) -> Vec<i64> {
    let found: HashSet<i64> = found.iter().copied().collect();
    requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect()
}

/// One set-membership query for the whole list, run inside the write
/// transaction. `FOR KEY SHARE` holds the rows until commit so a concurrent
/// delete cannot slip between the check and the insert.
async fn ensure_ingredients_exist(conn: &mut PgConnection, ids: &[i64]) -> AppResult<()> {
    let found: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM ingredients WHERE id = ANY($1) FOR KEY SHARE")
            .bind(ids.to_vec())
            .fetch_all(&mut *conn)
            .await?;

    let missing = missing_ingredients(ids, &found);
    if missing.is_empty() {
        return Ok(());
    }
    let listed = missing
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::field(
        "ingredients",
        format!("Ingredients do not exist: {listed}."),
    ))
}

struct StoredImage {
    path: String,
    fresh: bool,
}

async fn persist_image(media: &MediaStore, image: &DecodedImage) -> AppResult<StoredImage> {
    match image {
        DecodedImage::Fresh(data) => Ok(StoredImage {
            path: media.store(RECIPE_IMAGE_FOLDER, data).await?,
            fresh: true,
        }),
        DecodedImage::Existing(path) => Ok(StoredImage {
            path: path.clone(),
            fresh: false,
        }),
    }
}

/// Drops every association of the recipe and inserts the new set in one
/// batch statement.
async fn replace_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    ingredients: &[(i64, i32)],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    let (ids, amounts): (Vec<i64>, Vec<i32>) = ingredients.iter().copied().unzip();
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, ingredient_id, amount FROM UNNEST($2::BIGINT[], $3::INTEGER[]) AS t (ingredient_id, amount)
        "#,
    )
    .bind(recipe_id)
    .bind(ids)
    .bind(amounts)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_recipe(
    db: &PgPool,
    author_id: i64,
    recipe: &ValidatedRecipe,
    image: &str,
) -> AppResult<Recipe> {
    let mut tx = db.begin().await?;
    ensure_ingredients_exist(&mut *tx, &recipe.ingredient_ids()).await?;

    let row = sqlx::query_as::<_, Recipe>(
        r#"
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, author_id, name, image, text, cooking_time, pub_date
        "#,
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE recipes SET short_code = $2 WHERE id = $1")
        .bind(row.id)
        .bind(shortlink::short_code(row.id))
        .execute(&mut *tx)
        .await?;

    replace_ingredients(&mut tx, row.id, &recipe.ingredients).await?;
    tx.commit().await?;
    Ok(row)
}

async fn update_recipe(
    db: &PgPool,
    recipe_id: i64,
    recipe: &ValidatedRecipe,
    image: &str,
) -> AppResult<Recipe> {
    let mut tx = db.begin().await?;
    ensure_ingredients_exist(&mut *tx, &recipe.ingredient_ids()).await?;

    // pub_date is left untouched
    let row = sqlx::query_as::<_, Recipe>(
        r#"
        UPDATE recipes SET name = $2, image = $3, text = $4, cooking_time = $5
        WHERE id = $1
        RETURNING id, author_id, name, image, text, cooking_time, pub_date
        "#,
    )
    .bind(recipe_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    replace_ingredients(&mut tx, row.id, &recipe.ingredients).await?;
    tx.commit().await?;
    Ok(row)
}

/// Creates a recipe owned by `author_id`.
pub async fn submit(state: &AppState, author_id: i64, payload: RecipeSubmission) -> AppResult<Recipe> {
    let recipe = validate(payload, None)?;

    let image = persist_image(&state.media, &recipe.image).await?;
    match insert_recipe(&state.db, author_id, &recipe, &image.path).await {
        Ok(row) => {
            info!(
                "Recipe {} created by user {} with {} ingredients",
                row.id,
                author_id,
                recipe.ingredients.len()
            );
            Ok(row)
        }
        Err(e) => {
            if image.fresh {
                state.media.discard(&image.path).await;
            }
            Err(e)
        }
    }
}

/// Rewrites `existing` and replaces its whole ingredient set.
pub async fn revise(state: &AppState, existing: &Recipe, payload: RecipeSubmission) -> AppResult<Recipe> {
    let recipe = validate(payload, Some(&existing.image))?;

    let image = persist_image(&state.media, &recipe.image).await?;
    match update_recipe(&state.db, existing.id, &recipe, &image.path).await {
        Ok(row) => {
            if image.fresh && existing.image != row.image {
                state.media.discard(&existing.image).await;
            }
            info!("Recipe {} revised", row.id);
            Ok(row)
        }
        Err(e) => {
            if image.fresh {
                state.media.discard(&image.path).await;
            }
            Err(e)
        }
    }
}
