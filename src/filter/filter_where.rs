use serde_json::Value;

use super::error::FilterError;
use super::is_valid_identifier;
use super::types::{FilterOp, FilterWhereInfo};

/// Translates Mongo-style JSON conditions into a parameterised SQL predicate.
///
/// `{ "status": "draft", "priority": { "$in": ["high", "critical"] } }`
/// becomes `"priority" IN ($1, $2) AND "status" = $3`.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    sql_conditions: Vec<String>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            sql_conditions: vec![],
        }
    }

    /// Placeholders are numbered from `starting_param_index + 1`
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_data)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<(String, Vec<Value>), FilterError> {
        self.parse_where_data(where_data)?;

        let where_clause = if self.sql_conditions.is_empty() { "1=1".to_string() } else { self.sql_conditions.join(" AND ") };
        Ok((where_clause, std::mem::take(&mut self.param_values)))
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        self.parse_logical_operator(key, value)?;
                    } else {
                        self.parse_field_condition(key, value)?;
                    }
                }
                Ok(())
            }
            _ => Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    let neutral = if op == "$and" { "1=1" } else { "1=0" };
                    self.sql_conditions.push(neutral.to_string());
                    return Ok(());
                }
                let mut sql_parts = Vec::new();
                for v in arr {
                    sql_parts.push(format!("({})", self.nested(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                self.sql_conditions.push(format!("({})", sql_parts.join(joiner)));
                Ok(())
            }
            "$not" => {
                let sql = self.nested(value)?;
                self.sql_conditions.push(format!("NOT ({})", sql));
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    /// Render a sub-document, continuing this builder's placeholder numbering
    fn nested(&mut self, value: &Value) -> Result<String, FilterError> {
        let (sql, params) = Self::generate(value, self.param_index)?;
        self.param_index += params.len();
        self.param_values.extend(params);
        Ok(sql)
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = Self::map_operator(op_key)?;
                if operator == FilterOp::Between && op_val.as_array().map(|a| a.len()) != Some(2) {
                    return Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string()));
                }
                let sql = self.build_sql_condition(&FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() })?;
                self.sql_conditions.push(sql);
            }
        } else {
            // Implicit equality: { field: value }
            let sql = self.build_sql_condition(&FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() })?;
            self.sql_conditions.push(sql);
        }
        Ok(())
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = condition.data.clone();
        Ok(match condition.operator {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted_column),
            FilterOp::Eq => format!("{} = {}", quoted_column, self.param(data)),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted_column),
            FilterOp::Ne => format!("{} <> {}", quoted_column, self.param(data)),
            FilterOp::Gt => format!("{} > {}", quoted_column, self.param(data)),
            FilterOp::Gte => format!("{} >= {}", quoted_column, self.param(data)),
            FilterOp::Lt => format!("{} < {}", quoted_column, self.param(data)),
            FilterOp::Lte => format!("{} <= {}", quoted_column, self.param(data)),
            FilterOp::Like => format!("{} LIKE {}", quoted_column, self.param(data)),
            FilterOp::ILike => format!("{} ILIKE {}", quoted_column, self.param(data)),
            FilterOp::In | FilterOp::NIn => {
                let negate = condition.operator == FilterOp::NIn;
                match data {
                    Value::Array(values) if values.is_empty() => (if negate { "1=1" } else { "1=0" }).to_string(),
                    Value::Array(values) => {
                        let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                        let keyword = if negate { "NOT IN" } else { "IN" };
                        format!("{} {} ({})", quoted_column, keyword, params.join(", "))
                    }
                    single => {
                        let cmp = if negate { "<>" } else { "=" };
                        format!("{} {} {}", quoted_column, cmp, self.param(single))
                    }
                }
            }
            FilterOp::Between => match data {
                Value::Array(mut values) if values.len() == 2 => {
                    let hi = values.pop().unwrap_or(Value::Null);
                    let lo = values.pop().unwrap_or(Value::Null);
                    format!("{} BETWEEN {} AND {}", quoted_column, self.param(lo), self.param(hi))
                }
                _ => return Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
        })
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality_and_null() {
        let (sql, params) = FilterWhere::generate(&json!({ "owner_id": null, "workspace_id": 3 }), 0).unwrap();
        assert_eq!(sql, "\"owner_id\" IS NULL AND \"workspace_id\" = $1");
        assert_eq!(params, vec![json!(3)]);
    }

    #[test]
    fn nested_or_continues_numbering() {
        let where_data = json!({
            "$or": [
                { "name": { "$ilike": "%pump%" } },
                { "description": { "$ilike": "%pump%" } }
            ],
            "workspace_id": 9
        });
        let (sql, params) = FilterWhere::generate(&where_data, 0).unwrap();
        assert_eq!(sql, "((\"name\" ILIKE $1) OR (\"description\" ILIKE $2)) AND \"workspace_id\" = $3");
        assert_eq!(params, vec![json!("%pump%"), json!("%pump%"), json!(9)]);
    }

    #[test]
    fn in_expands_each_value() {
        let (sql, params) = FilterWhere::generate(&json!({ "id": { "$in": [1, 2, 3] } }), 0).unwrap();
        assert_eq!(sql, "\"id\" IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        let (sql, _) = FilterWhere::generate(&json!({ "id": { "$in": [] } }), 0).unwrap();
        assert_eq!(sql, "1=0");
    }

    #[test]
    fn not_and_between() {
        let (sql, params) =
            FilterWhere::generate(&json!({ "$not": { "draft": true }, "version_number": { "$between": [1, 4] } }), 0)
                .unwrap();
        assert_eq!(sql, "NOT (\"draft\" = $1) AND \"version_number\" BETWEEN $2 AND $3");
        assert_eq!(params, vec![json!(true), json!(1), json!(4)]);
    }

    #[test]
    fn rejects_unknown_operator_and_column() {
        assert!(FilterWhere::generate(&json!({ "name": { "$regex": "x" } }), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "na me": 1 }), 0).is_err());
    }
}
