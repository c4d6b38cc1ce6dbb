use crate::error::AppResult;
use crate::extract::Origin;
use crate::membership::{self, Membership};
use crate::models::{Recipe, RecipeIngredientView, RecipeShortView, RecipeView};
use crate::users;
use crate::AppState;

pub async fn ingredients_of(state: &AppState, recipe_id: i64) -> AppResult<Vec<RecipeIngredientView>> {
    let rows = sqlx::query_as::<_, RecipeIngredientView>(
        r#"
        SELECT i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

/// Full read view of `recipe` as seen by `viewer`. Recomputed on every call.
pub async fn present(
    state: &AppState,
    recipe: &Recipe,
    viewer: Option<i64>,
    origin: &Origin,
) -> AppResult<RecipeView> {
    let ingredients = ingredients_of(state, recipe.id).await?;
    let author = users::fetch(&state.db, recipe.author_id).await?;
    let author = users::present(state, &author, viewer, origin).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(user_id) => (
            membership::contains(&state.db, Membership::Favorite, user_id, recipe.id).await?,
            membership::contains(&state.db, Membership::ShoppingCart, user_id, recipe.id).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        author,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name.clone(),
        image: state.media.encode(Some(&recipe.image), origin).await,
        text: recipe.text.clone(),
        cooking_time: recipe.cooking_time,
    })
}

pub async fn present_short(state: &AppState, recipe: &Recipe, origin: &Origin) -> RecipeShortView {
    RecipeShortView {
        id: recipe.id,
        name: recipe.name.clone(),
        image: state.media.encode(Some(&recipe.image), origin).await,
        cooking_time: recipe.cooking_time,
    }
}
