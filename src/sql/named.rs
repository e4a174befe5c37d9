use crate::core::{PersistError, Result, Value};
use crate::model::Model;
use std::collections::BTreeMap;

/// A statement whose `:name` placeholders were rewritten to `$n`.
///
/// Repeated names share one position. `::type` casts and quoted text are
/// copied through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    sql: String,
    names: Vec<String>,
}

impl NamedStatement {
    pub fn parse(named_sql: &str) -> Self {
        let chars = named_sql.chars().collect::<Vec<_>>();
        let mut sql = String::with_capacity(named_sql.len());
        let mut names = Vec::<String>::new();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if let Some(open) = quote {
                sql.push(c);
                if c == open {
                    quote = None;
                }
                i += 1;
                continue;
            }

            match c {
                '\'' | '"' => {
                    quote = Some(c);
                    sql.push(c);
                    i += 1;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if chars
                    .get(i + 1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
                {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len()
                        && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                    {
                        end += 1;
                    }
                    let name = chars[start..end].iter().collect::<String>();
                    let position = match names.iter().position(|n| *n == name) {
                        Some(existing) => existing,
                        None => {
                            names.push(name);
                            names.len() - 1
                        }
                    };
                    sql.push('$');
                    sql.push_str(&(position + 1).to_string());
                    i = end;
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        Self { sql, names }
    }

    /// Positional SQL for the driver.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Values for each placeholder, read from the model's columns.
    pub fn bind<M: Model>(&self, model: &M) -> Result<Vec<Value>> {
        self.names
            .iter()
            .map(|name| {
                model.column_value(name).ok_or_else(|| {
                    PersistError::Statement(format!(
                        "{} has no column for named parameter :{}",
                        M::table_name(),
                        name
                    ))
                })
            })
            .collect()
    }

    pub fn bind_map(&self, params: &BTreeMap<String, Value>) -> Result<Vec<Value>> {
        self.names
            .iter()
            .map(|name| {
                params.get(name).cloned().ok_or_else(|| {
                    PersistError::Statement(format!("missing named parameter :{}", name))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_named_placeholders() {
        let stmt = NamedStatement::parse(
            "update categories set title = :title, slug = :slug where id = :id returning id",
        );
        assert_eq!(
            stmt.sql(),
            "update categories set title = $1, slug = $2 where id = $3 returning id"
        );
        assert_eq!(stmt.names(), &["title", "slug", "id"]);
    }

    #[test]
    fn test_repeated_names_share_position() {
        let stmt = NamedStatement::parse("select :id, :id + 1");
        assert_eq!(stmt.sql(), "select $1, $1 + 1");
        assert_eq!(stmt.names().len(), 1);
    }

    #[test]
    fn test_casts_and_literals_untouched() {
        let stmt = NamedStatement::parse("select ':skip', id::text from t where slug = :slug");
        assert_eq!(stmt.sql(), "select ':skip', id::text from t where slug = $1");
        assert_eq!(stmt.names(), &["slug"]);
    }

    #[test]
    fn test_bind_map_reports_missing() {
        let stmt = NamedStatement::parse("delete from t where id = :id");
        let params = BTreeMap::new();
        assert!(stmt.bind_map(&params).is_err());
    }
}
