use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::extract::ValidQuery;
use crate::ingredients::{self, IngredientQuery, NameFilter};
use crate::models::Ingredient;
use crate::AppState;

pub async fn list_ingredients(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<IngredientQuery>,
) -> AppResult<Json<Vec<Ingredient>>> {
    let filter = NameFilter::from_query(&query);
    let rows = ingredients::search(&state.db, filter.as_ref()).await?;
    Ok(Json(rows))
}

pub async fn get_ingredient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Ingredient>> {
    Ok(Json(ingredients::fetch(&state.db, id).await?))
}
