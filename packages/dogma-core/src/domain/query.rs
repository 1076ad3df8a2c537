//! Queries (§3): a request for a single entry's content, optionally
//! projected through a JSONPath expression.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DogmaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// Return the entry's content unmodified.
    Identity,
    /// `Identity`, additionally asserting the entry is a text file.
    IdentityText,
    /// `Identity`, additionally asserting the entry is json/yaml.
    IdentityJson,
    /// One or more JSONPath expressions, applied in order to the entry's
    /// parsed tree; each expression's result feeds the next.
    JsonPath(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Query {
    pub path: String,
    pub query_type: QueryType,
}

impl Query {
    pub fn identity(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        super::path::validate_path(&path)?;
        Ok(Self {
            path,
            query_type: QueryType::Identity,
        })
    }

    pub fn identity_text(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        super::path::validate_path(&path)?;
        Ok(Self {
            path,
            query_type: QueryType::IdentityText,
        })
    }

    pub fn identity_json(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        super::path::validate_path(&path)?;
        Ok(Self {
            path,
            query_type: QueryType::IdentityJson,
        })
    }

    /// Build a JSONPath query, failing immediately if any expression does
    /// not compile rather than deferring the error to execution time.
    pub fn json_path(path: impl Into<String>, expressions: Vec<String>) -> Result<Self> {
        let path = path.into();
        super::path::validate_path(&path)?;
        if expressions.is_empty() {
            return Err(DogmaError::InvalidQuery(
                "jsonpath query requires at least one expression".into(),
            ));
        }
        for expr in &expressions {
            validate_json_path_expr(expr)?;
        }
        Ok(Self {
            path,
            query_type: QueryType::JsonPath(expressions),
        })
    }

    /// Apply this query's projection to an entry's parsed JSON tree.
    /// `Identity` queries are only valid against non-JSON content and are
    /// handled by the caller before reaching this path.
    pub fn apply_json(&self, value: &Value) -> Result<Value> {
        match &self.query_type {
            QueryType::Identity | QueryType::IdentityText | QueryType::IdentityJson => {
                Ok(value.clone())
            }
            QueryType::JsonPath(expressions) => {
                let mut current = value.clone();
                for expr in expressions {
                    current = eval_json_path(&current, expr)?;
                }
                Ok(current)
            }
        }
    }
}

fn validate_json_path_expr(expr: &str) -> Result<()> {
    // jsonpath-rust compiles the expression as part of evaluation; we
    // run it once against a throwaway value so a malformed expression is
    // rejected at query construction, not at apply time.
    eval_json_path(&Value::Null, expr).map(|_| ())
}

fn eval_json_path(value: &Value, expr: &str) -> Result<Value> {
    use jsonpath_rust::JsonPathQuery;
    value
        .clone()
        .path(expr)
        .map_err(|e| DogmaError::InvalidQuery(format!("{expr}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_a_valid_path() {
        assert!(Query::identity("/a.txt").is_ok());
        assert!(Query::identity("relative").is_err());
    }

    #[test]
    fn json_path_rejects_empty_expression_list() {
        assert!(Query::json_path("/a.json", vec![]).is_err());
    }

    #[test]
    fn json_path_accepts_well_formed_expression() {
        assert!(Query::json_path("/a.json", vec!["$.foo".into()]).is_ok());
    }
}
