use axum::{
    extract::{OriginalUri, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use std::sync::Arc;

use crate::auth::{AuthUser, MaybeUser};
use crate::error::{AppError, AppResult};
use crate::extract::{Origin, ValidJson, ValidQuery};
use crate::membership::{self, Membership};
use crate::models::{RecipeSubmission, RecipeView, ShortLinkView};
use crate::pagination::{Page, PageParams, PageUrl, Pager};
use crate::recipes::{self, pipeline, shopping, shortlink, view, RecipeFilters};
use crate::AppState;

pub async fn list_recipes(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    origin: Origin,
    OriginalUri(uri): OriginalUri,
    ValidQuery(params): ValidQuery<PageParams>,
    ValidQuery(filters): ValidQuery<RecipeFilters>,
) -> AppResult<Json<Page<RecipeView>>> {
    let pager = Pager::new(&params, state.config.page_size);
    let count = filters.count(&state.db, viewer.id()).await?;
    pager.check(count)?;

    let rows = filters.page(&state.db, viewer.id(), pager).await?;
    let mut results = Vec::with_capacity(rows.len());
    for recipe in &rows {
        results.push(view::present(&state, recipe, viewer.id(), &origin).await?);
    }

    let url = PageUrl::new(&origin, uri.path(), uri.query());
    Ok(Json(Page::new(pager, count, results, &url)))
}

pub async fn create_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    ValidJson(payload): ValidJson<RecipeSubmission>,
) -> AppResult<impl IntoResponse> {
    let recipe = pipeline::submit(&state, user.id, payload).await?;
    let body = view::present(&state, &recipe, Some(user.id), &origin).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn get_recipe(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    origin: Origin,
    Path(id): Path<i64>,
) -> AppResult<Json<RecipeView>> {
    let recipe = recipes::fetch(&state.db, id).await?;
    Ok(Json(view::present(&state, &recipe, viewer.id(), &origin).await?))
}

pub async fn update_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<RecipeSubmission>,
) -> AppResult<Json<RecipeView>> {
    let existing = recipes::fetch(&state.db, id).await?;
    recipes::ensure_author(&existing, user.id)?;

    let recipe = pipeline::revise(&state, &existing, payload).await?;
    Ok(Json(view::present(&state, &recipe, Some(user.id), &origin).await?))
}

pub async fn delete_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let existing = recipes::fetch(&state.db, id).await?;
    recipes::ensure_author(&existing, user.id)?;

    recipes::delete(&state.db, existing.id).await?;
    state.media.discard(&existing.image).await;
    tracing::info!("Recipe {} deleted by user {}", existing.id, user.id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to(
    state: &AppState,
    kind: Membership,
    user: &AuthUser,
    recipe_id: i64,
    origin: &Origin,
) -> AppResult<impl IntoResponse> {
    let recipe = recipes::fetch(&state.db, recipe_id).await?;
    membership::add(&state.db, kind, user.id, recipe.id).await?;
    let body = view::present_short(state, &recipe, origin).await;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn remove_from(
    state: &AppState,
    kind: Membership,
    user: &AuthUser,
    recipe_id: i64,
) -> AppResult<StatusCode> {
    let recipe = recipes::fetch(&state.db, recipe_id).await?;
    membership::remove(&state.db, kind, user.id, recipe.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn favorite(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    add_to(&state, Membership::Favorite, &user, id, &origin).await
}

pub async fn unfavorite(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    remove_from(&state, Membership::Favorite, &user, id).await
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    add_to(&state, Membership::ShoppingCart, &user, id, &origin).await
}

pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    remove_from(&state, Membership::ShoppingCart, &user, id).await
}

pub async fn download_shopping_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let lines = shopping::cart_lines(&state.db, user.id).await?;
    let items = shopping::aggregate(lines);
    tracing::info!("User {} downloaded a shopping list of {} items", user.id, items.len());

    let disposition = format!("attachment; filename=\"{}\"", shopping::SHOPPING_LIST_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        shopping::render(&items),
    ))
}

pub async fn get_link(
    State(state): State<Arc<AppState>>,
    origin: Origin,
    Path(id): Path<i64>,
) -> AppResult<Json<ShortLinkView>> {
    if !recipes::exists(&state.db, id).await? {
        return Err(AppError::not_found());
    }
    Ok(Json(ShortLinkView {
        short_link: shortlink::short_link(&origin, id),
    }))
}

/// `GET /s/:code` sends the browser to the recipe the code was issued for.
pub async fn follow_short_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Redirect> {
    let id = shortlink::resolve(&state.db, &code)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Redirect::to(&format!("/recipes/{id}/")))
}
