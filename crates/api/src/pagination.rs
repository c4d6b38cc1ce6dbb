use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extract::Origin;

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub page: u32,
    pub limit: u32,
}

impl Pager {
    pub fn new(params: &PageParams, default_size: u32) -> Self {
        Self {
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(default_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    /// A page beyond the last one is an error; page 1 of an empty set is not.
    pub fn check(&self, count: i64) -> AppResult<()> {
        if self.page > 1 && self.offset() >= count {
            return Err(AppError::InvalidPage);
        }
        Ok(())
    }

    fn has_next(&self, count: i64) -> bool {
        self.offset() + self.limit() < count
    }
}

/// Where a paginated listing lives, used to build `next`/`previous` links.
#[derive(Debug, Clone)]
pub struct PageUrl {
    pub base: String,
    pub query: Option<String>,
}

impl PageUrl {
    pub fn new(origin: &Origin, path: &str, query: Option<&str>) -> Self {
        Self {
            base: origin.join(path),
            query: query.map(str::to_string),
        }
    }

    /// Link to `page`, keeping every other query parameter. Page 1 drops
    /// the `page` parameter entirely.
    pub fn link(&self, page: u32) -> String {
        let mut params: Vec<String> = self
            .query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|p| !p.is_empty() && *p != "page" && !p.starts_with("page="))
            .map(str::to_string)
            .collect();
        if page > 1 {
            params.push(format!("page={page}"));
        }
        if params.is_empty() {
            self.base.clone()
        } else {
            format!("{}?{}", self.base, params.join("&"))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(pager: Pager, count: i64, results: Vec<T>, url: &PageUrl) -> Self {
        Self {
            count,
            next: pager.has_next(count).then(|| url.link(pager.page + 1)),
            previous: (pager.page > 1).then(|| url.link(pager.page - 1)),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(query: Option<&str>) -> PageUrl {
        PageUrl::new(&Origin("http://host".into()), "/recipes/", query)
    }

    #[test]
    fn limit_is_clamped() {
        let pager = Pager::new(&PageParams { page: Some(0), limit: Some(1000) }, 6);
        assert_eq!(pager, Pager { page: 1, limit: MAX_PAGE_SIZE });
        let pager = Pager::new(&PageParams::default(), 6);
        assert_eq!(pager.limit, 6);
        assert_eq!(pager.offset(), 0);
    }

    #[test]
    fn page_past_the_end_is_invalid() {
        let pager = Pager { page: 3, limit: 6 };
        assert_eq!(pager.offset(), 12);
        assert!(pager.check(12).is_err());
        assert!(pager.check(13).is_ok());
        assert!(Pager { page: 1, limit: 6 }.check(0).is_ok());
    }

    #[test]
    fn links_preserve_filters() {
        let u = url(Some("author=3&page=2&limit=6"));
        assert_eq!(u.link(3), "http://host/recipes/?author=3&limit=6&page=3");
        assert_eq!(u.link(1), "http://host/recipes/?author=3&limit=6");
        assert_eq!(url(None).link(1), "http://host/recipes/");
    }

    #[test]
    fn envelope_links() {
        let pager = Pager { page: 2, limit: 2 };
        let page = Page::new(pager, 5, vec![3, 4], &url(None));
        assert_eq!(page.next.as_deref(), Some("http://host/recipes/?page=3"));
        assert_eq!(page.previous.as_deref(), Some("http://host/recipes/"));

        let last = Page::new(Pager { page: 3, limit: 2 }, 5, vec![5], &url(None));
        assert!(last.next.is_none());
    }
}
