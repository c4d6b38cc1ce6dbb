use sha1::{Digest, Sha1};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::extract::Origin;

pub const SHORT_CODE_LEN: usize = 3;

/// Truncated SHA-1 of the decimal recipe id.
pub fn short_code(recipe_id: i64) -> String {
    let digest = Sha1::digest(recipe_id.to_string().as_bytes());
    let mut code = hex::encode(digest);
    code.truncate(SHORT_CODE_LEN);
    code
}

pub fn short_link(origin: &Origin, recipe_id: i64) -> String {
    origin.join(&format!("/s/{}", short_code(recipe_id)))
}

/// Oldest recipe whose code is `code`. Codes collide; the lowest id wins.
pub async fn resolve(db: &PgPool, code: &str) -> AppResult<Option<i64>> {
    if code.len() != SHORT_CODE_LEN || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(None);
    }
    let id = sqlx::query_scalar(
        "SELECT id FROM recipes WHERE short_code = $1 ORDER BY id LIMIT 1",
    )
    .bind(code.to_ascii_lowercase())
    .fetch_optional(db)
    .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_deterministic_hex_prefix() {
        assert_eq!(short_code(1), "356");
        assert_eq!(short_code(1), short_code(1));
        let code = short_code(123456);
        assert_eq!(code.len(), SHORT_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn link_uses_request_origin() {
        let origin = Origin("https://foodgram.example".into());
        assert_eq!(short_link(&origin, 1), "https://foodgram.example/s/356");
    }
}
