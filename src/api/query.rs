//! Pagination parameters and query-string guards.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};

use super::error::ApiError;
use crate::types::Pagination;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 10;

/// Parse a leading integer the way lenient query parsers do: `"5abc"` is 5,
/// `"abc"` is nothing.
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Page and page size, clamped to `page >= 1` and `1 <= limit <= MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page.and_then(parse_leading_int).unwrap_or(1).max(1);
        let limit = limit
            .and_then(parse_leading_int)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        Self { page, limit }
    }

    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self::parse(
            query.get("page").map(String::as_str),
            query.get("limit").map(String::as_str),
        )
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pagination(&self, total_items: i64) -> Pagination {
        Pagination {
            total_items,
            total_pages: (total_items + self.limit - 1) / self.limit,
            current_page: self.page,
            page_size: self.limit,
        }
    }
}

/// Lenient query-string map. Malformed strings become JSON `BadRequest` errors.
pub struct QueryMap(pub HashMap<String, String>);

impl<S: Send + Sync> FromRequestParts<S> for QueryMap {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(map)| QueryMap(map))
            .map_err(|_| ApiError::bad_request("Invalid query string"))
    }
}

/// Query-string map that only accepts scalar parameters.
///
/// Keys using bracket syntax (`filter[status]=new`) and repeated keys would be
/// objects or arrays under nested query parsers, so both are rejected.
pub struct ScalarQuery(pub HashMap<String, String>);

impl<S: Send + Sync> FromRequestParts<S> for ScalarQuery {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(query) = parts.uri.query() {
            if has_object_keys(query) {
                return Err(ApiError::bad_request("Query parameters cannot be objects"));
            }
        }
        let QueryMap(map) = QueryMap::from_request_parts(parts, state).await?;
        Ok(ScalarQuery(map))
    }
}

fn has_object_keys(query: &str) -> bool {
    let mut seen = HashSet::new();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split('=').next().unwrap_or(""))
        .any(|key| {
            key.contains('[') || key.to_ascii_lowercase().contains("%5b") || !seen.insert(key)
        })
}
