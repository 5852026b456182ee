use crate::domain::SqlParam;
use crate::postgres::QuotedIdentifier;
use std::fmt::Write;

/// One column of a derived insert header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Time,
    Metric,
    Value,
    Metadata(QuotedIdentifier),
}

impl Column {
    pub fn sql(&self) -> &str {
        match self {
            Column::Time => "time",
            Column::Metric => "metric",
            Column::Value => "value",
            Column::Metadata(identifier) => identifier.as_str(),
        }
    }
}

/// A multi-row parameterized insert into one tenant table.
///
/// Every row has exactly `columns.len()` parameters, in column order. The first parameter
/// of each row is the epoch timestamp; the rendered statement converts it with
/// `to_timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub table: QuotedIdentifier,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<SqlParam>>,
}

impl InsertCommand {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::sql).collect()
    }

    /// Render the statement text. Only identifiers and `$n` placeholders appear in it.
    pub fn statement(&self) -> String {
        let header = self.column_names().join(", ");
        let width = self.columns.len();

        let mut sql = format!("INSERT INTO {} ({}) VALUES ", self.table, header);
        for row_index in 0..self.rows.len() {
            if row_index > 0 {
                sql.push_str(", ");
            }
            let base = row_index * width;
            sql.push('(');
            for column_index in 0..width {
                let placeholder = base + column_index + 1;
                if column_index == 0 {
                    let _ = write!(sql, "to_timestamp(${})", placeholder);
                } else {
                    let _ = write!(sql, ", ${}", placeholder);
                }
            }
            sql.push(')');
        }
        sql.push(';');
        sql
    }

    /// Row parameters flattened in placeholder order
    pub fn params(&self) -> Vec<SqlParam> {
        self.rows.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::quote_identifier;

    fn command(rows: usize) -> InsertCommand {
        InsertCommand {
            table: quote_identifier("acme").unwrap(),
            columns: vec![
                Column::Time,
                Column::Metric,
                Column::Value,
                Column::Metadata(quote_identifier("region").unwrap()),
            ],
            rows: (0..rows)
                .map(|i| {
                    vec![
                        SqlParam::from(1000_i64),
                        SqlParam::from("cpu"),
                        SqlParam::from(i as i64),
                        SqlParam::from("us"),
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn test_statement_single_row() {
        assert_eq!(
            command(1).statement(),
            "INSERT INTO \"acme\" (time, metric, value, \"region\") VALUES (to_timestamp($1), $2, $3, $4);"
        );
    }

    #[test]
    fn test_statement_numbers_placeholders_across_rows() {
        assert_eq!(
            command(2).statement(),
            "INSERT INTO \"acme\" (time, metric, value, \"region\") VALUES \
             (to_timestamp($1), $2, $3, $4), (to_timestamp($5), $6, $7, $8);"
        );
    }

    #[test]
    fn test_params_are_flattened_in_row_order() {
        let params = command(2).params();
        assert_eq!(params.len(), 8);
        assert_eq!(params[2], SqlParam::from(0_i64));
        assert_eq!(params[6], SqlParam::from(1_i64));
    }
}
