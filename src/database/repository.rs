use serde_json::json;
use sqlx::{self, postgres::PgRow, FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::database::query_builder::QueryBuilder;
use crate::filter::FilterData;

/// Typed read access to one table through the JSON filter layer
pub struct Repository<T> {
    table_name: &'static str,
    entity: &'static str,
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(table_name: &'static str, entity: &'static str, pool: PgPool) -> Self {
        Self {
            table_name,
            entity,
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<T>, DatabaseError> {
        QueryBuilder::<T>::new(self.table_name)?
            .filter(filter_data)?
            .select_all(&self.pool)
            .await
    }

    pub async fn select_one(&self, filter_data: FilterData) -> Result<Option<T>, DatabaseError> {
        QueryBuilder::<T>::new(self.table_name)?
            .filter(filter_data)?
            .select_optional(&self.pool)
            .await
    }

    pub async fn select_404(&self, filter_data: FilterData) -> Result<T, DatabaseError> {
        self.select_one(filter_data)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} not found", self.entity)))
    }

    pub async fn count(&self, filter_data: FilterData) -> Result<i64, DatabaseError> {
        QueryBuilder::<T>::new(self.table_name)?
            .filter(filter_data)?
            .count(&self.pool)
            .await
    }

    /// Rows for one page plus the unpaginated total for the same predicate
    pub async fn select_page(&self, filter_data: FilterData) -> Result<(Vec<T>, i64), DatabaseError> {
        let count_filter = FilterData {
            where_clause: filter_data.where_clause.clone(),
            ..Default::default()
        };
        let total = self.count(count_filter).await?;
        let rows = self.select_any(filter_data).await?;
        Ok((rows, total))
    }

    /// Fetch a row by id inside a workspace; anything outside the workspace is reported as missing
    pub async fn find_in_workspace(&self, workspace_id: i64, id: i64) -> Result<T, DatabaseError> {
        self.select_404(FilterData {
            where_clause: Some(json!({ "id": id, "workspace_id": workspace_id })),
            ..Default::default()
        })
        .await
    }
}
