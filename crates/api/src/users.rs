use sqlx::PgPool;

use crate::auth::{is_reasonable_email, normalize_email};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::extract::Origin;
use crate::membership::{self, Membership};
use crate::models::{RegisterRequest, SubscriptionView, User, UserView};
use crate::recipes::{self, view};
use crate::AppState;

pub const MAX_NAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const AVATAR_FOLDER: &str = "avatars";
pub const DEFAULT_RECIPES_LIMIT: i64 = 3;

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, avatar, password_hash, date_joined";

pub async fn fetch(db: &PgPool, id: i64) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(AppError::not_found)
}

pub async fn fetch_by_email(db: &PgPool, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn count(db: &PgPool) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn page(db: &PgPool, limit: i64, offset: i64) -> AppResult<Vec<User>> {
    let rows = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username, id LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert(db: &PgPool, request: &RegisterRequest, password_hash: &str) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, username, first_name, last_name, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&request.email)
    .bind(&request.username)
    .bind(&request.first_name)
    .bind(&request.last_name)
    .bind(password_hash)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn set_password_hash(db: &PgPool, id: i64, password_hash: &str) -> AppResult<()> {
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn set_avatar(db: &PgPool, id: i64, avatar: Option<&str>) -> AppResult<()> {
    sqlx::query("UPDATE users SET avatar = $2 WHERE id = $1")
        .bind(id)
        .bind(avatar)
        .execute(db)
        .await?;
    Ok(())
}

/// Authors followed by `subscriber`, most recent subscription first.
pub async fn followed_page(db: &PgPool, subscriber: i64, limit: i64, offset: i64) -> AppResult<Vec<User>> {
    let rows = sqlx::query_as::<_, User>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar, u.password_hash, u.date_joined
        FROM subscriptions s
        JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(subscriber)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn followed_count(db: &PgPool, subscriber: i64) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
        .bind(subscriber)
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn present(
    state: &AppState,
    user: &User,
    viewer: Option<i64>,
    origin: &Origin,
) -> AppResult<UserView> {
    let is_subscribed = match viewer {
        Some(viewer) => membership::contains(&state.db, Membership::Subscription, viewer, user.id).await?,
        None => false,
    };
    Ok(UserView {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        is_subscribed,
        avatar: state.media.encode(user.avatar.as_deref(), origin).await,
    })
}

/// Author card shown to a subscriber: the user view plus their latest recipes.
pub async fn present_subscription(
    state: &AppState,
    author: &User,
    recipes_limit: i64,
    origin: &Origin,
) -> AppResult<SubscriptionView> {
    let mut card = present(state, author, None, origin).await?;
    card.is_subscribed = true;

    let latest = recipes::latest_by_author(&state.db, author.id, recipes_limit.max(0)).await?;
    let mut recipes = Vec::with_capacity(latest.len());
    for recipe in &latest {
        recipes.push(view::present_short(state, recipe, origin).await);
    }

    Ok(SubscriptionView {
        author: card,
        recipes,
        recipes_count: recipes::count_by_author(&state.db, author.id).await?,
    })
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

pub fn validate_password(field: &str, password: &str, errors: &mut FieldErrors) {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN || len > MAX_PASSWORD_LEN {
        errors.add(
            field,
            format!("Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters."),
        );
    }
}

/// Normalizes and checks a registration request before it reaches storage.
pub fn validate_registration(mut request: RegisterRequest) -> AppResult<RegisterRequest> {
    let mut errors = FieldErrors::new();

    request.email = normalize_email(&request.email);
    if request.email.is_empty() {
        errors.add("email", "This field is required.");
    } else if !is_reasonable_email(&request.email) {
        errors.add("email", "Enter a valid email address.");
    }

    request.username = request.username.trim().to_string();
    if request.username.chars().count() > MAX_NAME_LEN {
        errors.add("username", format!("Ensure this field has no more than {MAX_NAME_LEN} characters."));
    } else if !is_valid_username(&request.username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    for (field, value) in [
        ("first_name", &mut request.first_name),
        ("last_name", &mut request.last_name),
    ] {
        *value = value.trim().to_string();
        if value.is_empty() {
            errors.add(field, "This field is required.");
        } else if value.chars().count() > MAX_NAME_LEN {
            errors.add(field, format!("Ensure this field has no more than {MAX_NAME_LEN} characters."));
        }
    }

    validate_password("password", &request.password, &mut errors);

    errors.into_result()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            email: " Vasya@Example.com ".into(),
            username: "vasya.pupkin".into(),
            first_name: "Vasya".into(),
            last_name: "Pupkin".into(),
            password: "Qwerty123!".into(),
        }
    }

    #[test]
    fn registration_normalizes_email() {
        let request = validate_registration(request()).unwrap();
        assert_eq!(request.email, "vasya@example.com");
    }

    #[test]
    fn registration_reports_each_bad_field() {
        let bad = RegisterRequest {
            email: "nope".into(),
            username: "bad name!".into(),
            first_name: String::new(),
            last_name: "x".repeat(MAX_NAME_LEN + 1),
            password: "short".into(),
        };
        let Err(AppError::Validation(errors)) = validate_registration(bad) else {
            panic!("expected validation errors");
        };
        for field in ["email", "username", "first_name", "last_name", "password"] {
            assert!(errors.contains(field), "{field}");
        }
    }

    #[test]
    fn usernames_allow_django_charset() {
        assert!(is_valid_username("chef_01+test@home.org-x"));
        assert!(!is_valid_username("two words"));
        assert!(!is_valid_username(""));
    }
}
