use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::config;
use crate::error::ApiError;
use crate::filter::{FilterData, SortDirection};

/// Sorting and search rules for one list endpoint
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    pub sortable: &'static [&'static str],
    pub default_sort: &'static str,
    pub default_order: SortDirection,
    /// Columns matched case-insensitively by `search`
    pub search_columns: &'static [&'static str],
}

impl ListSpec {
    pub const fn newest_first(search_columns: &'static [&'static str]) -> Self {
        Self {
            sortable: &["created_at", "name", "id"],
            default_sort: "created_at",
            default_order: SortDirection::Desc,
            search_columns,
        }
    }

    pub const fn by_name(search_columns: &'static [&'static str]) -> Self {
        Self {
            sortable: &["name", "created_at", "id"],
            default_sort: "name",
            default_order: SortDirection::Asc,
            search_columns,
        }
    }
}

/// `?page=&limit=&sort=&order=&search=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// Validated list request, ready for `Repository::select_page`
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub page: i64,
    pub limit: i64,
    pub filter: FilterData,
}

impl ListQuery {
    pub fn page(&self) -> Result<i64, ApiError> {
        match self.page {
            None => Ok(1),
            Some(page) if page >= 1 => Ok(page),
            Some(_) => Err(ApiError::invalid_field("page", "must be at least 1")),
        }
    }

    pub fn limit(&self) -> Result<i64, ApiError> {
        let api = &config().api;
        match self.limit {
            None => Ok(api.default_page_size),
            Some(limit) if (1..=api.max_page_size).contains(&limit) => Ok(limit),
            Some(_) => Err(ApiError::invalid_field(
                "limit",
                format!("must be between 1 and {}", api.max_page_size),
            )),
        }
    }

    /// Sort column from the allow-list; anything else falls back to the default
    fn order_by(&self, spec: &ListSpec) -> String {
        let column = self
            .sort
            .as_deref()
            .filter(|s| spec.sortable.contains(s))
            .unwrap_or(spec.default_sort);
        let direction = self
            .order
            .as_deref()
            .and_then(SortDirection::parse)
            .unwrap_or(spec.default_order);
        let direction = direction.to_sql().to_lowercase();
        if column == "id" {
            format!("id {}", direction)
        } else {
            format!("{} {}, id {}", column, direction, direction)
        }
    }

    /// Combine resource conditions with search, sort and paging
    pub fn into_request(self, spec: &ListSpec, mut conditions: Map<String, Value>) -> Result<ListRequest, ApiError> {
        let page = self.page()?;
        let limit = self.limit()?;
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| ApiError::invalid_field("page", "is out of range"))?;

        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", escape_like(term));
            let alternatives: Vec<Value> = spec
                .search_columns
                .iter()
                .map(|column| json!({ *column: { "$ilike": pattern } }))
                .collect();
            if !alternatives.is_empty() {
                conditions.insert("$or".to_string(), Value::Array(alternatives));
            }
        }

        Ok(ListRequest {
            page,
            limit,
            filter: FilterData {
                select: None,
                where_clause: Some(Value::Object(conditions)),
                order: Some(Value::String(self.order_by(spec))),
                limit: Some(limit),
                offset: Some(offset),
            },
        })
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Insert `key = value` when the query parameter was supplied
pub fn push_filter<V: Into<Value>>(conditions: &mut Map<String, Value>, key: &str, value: Option<V>) {
    if let Some(value) = value {
        conditions.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMED: ListSpec = ListSpec::newest_first(&["name", "description"]);

    fn workspace(id: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("workspace_id".to_string(), json!(id));
        map
    }

    #[test]
    fn defaults_apply() {
        let request = ListQuery::default().into_request(&NAMED, workspace(1)).unwrap();
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, 20);
        assert_eq!(request.filter.offset, Some(0));
        assert_eq!(request.filter.order, Some(json!("created_at desc, id desc")));
    }

    #[test]
    fn rejects_out_of_range_paging() {
        let query = ListQuery { page: Some(0), ..Default::default() };
        assert!(query.into_request(&NAMED, Map::new()).is_err());

        let query = ListQuery { limit: Some(101), ..Default::default() };
        assert!(query.into_request(&NAMED, Map::new()).is_err());

        let query = ListQuery { limit: Some(0), ..Default::default() };
        assert!(query.into_request(&NAMED, Map::new()).is_err());
    }

    #[test]
    fn offset_follows_page() {
        let query = ListQuery { page: Some(3), limit: Some(10), ..Default::default() };
        let request = query.into_request(&NAMED, Map::new()).unwrap();
        assert_eq!(request.filter.offset, Some(20));
        assert_eq!(request.filter.limit, Some(10));
    }

    #[test]
    fn huge_page_is_a_validation_error() {
        let query = ListQuery { page: Some(i64::MAX / 10), limit: Some(100), ..Default::default() };
        let err = query.into_request(&NAMED, Map::new()).err().unwrap();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);

        let query = ListQuery { page: Some(i64::MAX), limit: Some(1), ..Default::default() };
        let request = query.into_request(&NAMED, Map::new()).unwrap();
        assert_eq!(request.filter.offset, Some(i64::MAX - 1));
    }

    #[test]
    fn unknown_sort_falls_back_to_default() {
        let query = ListQuery {
            sort: Some("password".to_string()),
            order: Some("asc".to_string()),
            ..Default::default()
        };
        let request = query.into_request(&NAMED, Map::new()).unwrap();
        assert_eq!(request.filter.order, Some(json!("created_at asc, id asc")));

        let by_name = ListSpec::by_name(&["name"]);
        let request = ListQuery::default().into_request(&by_name, Map::new()).unwrap();
        assert_eq!(request.filter.order, Some(json!("name asc, id asc")));
    }

    #[test]
    fn search_becomes_or_of_ilike() {
        let query = ListQuery { search: Some(" pump_1 ".to_string()), ..Default::default() };
        let request = query.into_request(&NAMED, workspace(4)).unwrap();
        let where_clause = request.filter.where_clause.unwrap();
        assert_eq!(where_clause["workspace_id"], json!(4));
        assert_eq!(where_clause["$or"][0]["name"]["$ilike"], json!("%pump\\_1%"));
        assert_eq!(where_clause["$or"][1]["description"]["$ilike"], json!("%pump\\_1%"));
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = ListQuery { search: Some("   ".to_string()), ..Default::default() };
        let request = query.into_request(&NAMED, Map::new()).unwrap();
        assert!(request.filter.where_clause.unwrap().get("$or").is_none());
    }

    #[test]
    fn push_filter_skips_none() {
        let mut map = Map::new();
        push_filter(&mut map, "status", Some("draft"));
        push_filter::<i64>(&mut map, "owner_id", None);
        assert_eq!(map.len(), 1);
        assert_eq!(map["status"], json!("draft"));
    }
}
