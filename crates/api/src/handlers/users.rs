use axum::{
    async_trait,
    extract::{FromRequest, Multipart, OriginalUri, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{hash_password, verify_password, AuthUser, MaybeUser};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::extract::{Origin, ValidJson, ValidQuery};
use crate::images::{self, ImageData};
use crate::membership::{self, Membership};
use crate::models::{
    AvatarRequest, AvatarView, RegisterRequest, RegisteredUser, SetPasswordRequest,
    SubscriptionView, UserView,
};
use crate::pagination::{Page, PageParams, PageUrl, Pager};
use crate::users::{self, AVATAR_FOLDER, DEFAULT_RECIPES_LIMIT};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimit {
    pub recipes_limit: Option<i64>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    origin: Origin,
    OriginalUri(uri): OriginalUri,
    ValidQuery(params): ValidQuery<PageParams>,
) -> AppResult<Json<Page<UserView>>> {
    let pager = Pager::new(&params, state.config.page_size);
    let count = users::count(&state.db).await?;
    pager.check(count)?;

    let rows = users::page(&state.db, pager.limit(), pager.offset()).await?;
    let mut results = Vec::with_capacity(rows.len());
    for user in &rows {
        results.push(users::present(&state, user, viewer.id(), &origin).await?);
    }

    let url = PageUrl::new(&origin, uri.path(), uri.query());
    Ok(Json(Page::new(pager, count, results, &url)))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let mut request = users::validate_registration(payload)?;
    let password_hash = hash_password(std::mem::take(&mut request.password)).await?;
    let user = users::insert(&state.db, &request, &password_hash).await?;

    tracing::info!("Registered user {} <{}>", user.id, user.email);
    Ok((StatusCode::CREATED, Json(RegisteredUser::from(user))))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    origin: Origin,
    Path(id): Path<i64>,
) -> AppResult<Json<UserView>> {
    let user = users::fetch(&state.db, id).await?;
    Ok(Json(users::present(&state, &user, viewer.id(), &origin).await?))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
) -> AppResult<Json<UserView>> {
    let row = users::fetch(&state.db, user.id).await?;
    Ok(Json(users::present(&state, &row, Some(user.id), &origin).await?))
}

pub async fn set_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidJson(payload): ValidJson<SetPasswordRequest>,
) -> AppResult<StatusCode> {
    let mut errors = FieldErrors::new();
    if payload.current_password.is_empty() {
        errors.add("current_password", "This field is required.");
    }
    users::validate_password("new_password", &payload.new_password, &mut errors);
    errors.into_result()?;

    let row = users::fetch(&state.db, user.id).await?;
    if !verify_password(payload.current_password, row.password_hash).await? {
        return Err(AppError::field("current_password", "Invalid password."));
    }

    let password_hash = hash_password(payload.new_password).await?;
    users::set_password_hash(&state.db, user.id, &password_hash).await?;
    tracing::info!("User {} changed password", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Avatar body: JSON `{"avatar": "data:image/..."}` or a multipart `avatar` file.
pub struct AvatarUpload(pub ImageData);

#[async_trait]
impl FromRequest<Arc<AppState>> for AvatarUpload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let ValidJson(body) = ValidJson::<AvatarRequest>::from_request(req, state).await?;
            let Some(payload) = body.avatar.filter(|a| !a.trim().is_empty()) else {
                return Err(AppError::field("avatar", "Avatar was not provided."));
            };
            return images::decode_data_uri("avatar", payload.trim()).map(AvatarUpload);
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::field("avatar", e.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::field("avatar", e.body_text()))?
        {
            if field.name() != Some("avatar") {
                continue;
            }
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::field("avatar", e.body_text()))?;
            return images::decode_upload(
                "avatar",
                file_name.as_deref(),
                content_type.as_deref(),
                bytes.to_vec(),
            )
            .map(AvatarUpload);
        }
        Err(AppError::field("avatar", "Avatar was not provided."))
    }
}

pub async fn get_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
) -> AppResult<Json<AvatarView>> {
    let row = users::fetch(&state.db, user.id).await?;
    Ok(Json(AvatarView {
        avatar: state.media.encode(row.avatar.as_deref(), &origin).await,
    }))
}

pub async fn put_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    AvatarUpload(image): AvatarUpload,
) -> AppResult<Json<AvatarView>> {
    let previous = users::fetch(&state.db, user.id).await?.avatar;
    let stored = state.media.store(AVATAR_FOLDER, &image).await?;

    if let Err(e) = users::set_avatar(&state.db, user.id, Some(&stored)).await {
        state.media.discard(&stored).await;
        return Err(e);
    }
    if let Some(previous) = previous {
        state.media.discard(&previous).await;
    }

    tracing::info!("User {} updated avatar", user.id);
    Ok(Json(AvatarView {
        avatar: state.media.encode(Some(&stored), &origin).await,
    }))
}

pub async fn delete_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<StatusCode> {
    let row = users::fetch(&state.db, user.id).await?;
    if let Some(avatar) = row.avatar {
        users::set_avatar(&state.db, user.id, None).await?;
        state.media.discard(&avatar).await;
        tracing::info!("User {} removed avatar", user.id);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscriptions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    OriginalUri(uri): OriginalUri,
    ValidQuery(params): ValidQuery<PageParams>,
    ValidQuery(limit): ValidQuery<RecipesLimit>,
) -> AppResult<Json<Page<SubscriptionView>>> {
    let pager = Pager::new(&params, state.config.page_size);
    let count = users::followed_count(&state.db, user.id).await?;
    pager.check(count)?;

    let recipes_limit = limit.recipes_limit.unwrap_or(DEFAULT_RECIPES_LIMIT);
    let authors = users::followed_page(&state.db, user.id, pager.limit(), pager.offset()).await?;
    let mut results = Vec::with_capacity(authors.len());
    for author in &authors {
        results.push(users::present_subscription(&state, author, recipes_limit, &origin).await?);
    }

    let url = PageUrl::new(&origin, uri.path(), uri.query());
    Ok(Json(Page::new(pager, count, results, &url)))
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    origin: Origin,
    Path(author_id): Path<i64>,
    ValidQuery(limit): ValidQuery<RecipesLimit>,
) -> AppResult<impl IntoResponse> {
    membership::check_pair(Membership::Subscription, user.id, author_id)?;
    let author = users::fetch(&state.db, author_id).await?;
    membership::add(&state.db, Membership::Subscription, user.id, author.id).await?;

    let recipes_limit = limit.recipes_limit.unwrap_or(DEFAULT_RECIPES_LIMIT);
    let card = users::present_subscription(&state, &author, recipes_limit, &origin).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(author_id): Path<i64>,
) -> AppResult<StatusCode> {
    let author = users::fetch(&state.db, author_id).await?;
    membership::remove(&state.db, Membership::Subscription, user.id, author.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
