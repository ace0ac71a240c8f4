use crate::criteria::{Criteria, Operand, QueryOperator};
use crate::error::{DataError, Result};
use crate::schema::Table;
use crate::value::Value;

/// Translated WHERE-clause body and its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Lowers a [`Criteria`] tree against one table.
pub struct ExpressionTranslator<'a> {
    table: &'a Table,
}

impl<'a> ExpressionTranslator<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    pub fn translate(&self, criteria: &Criteria) -> Result<Predicate> {
        let mut predicate = Predicate {
            sql: String::new(),
            params: Vec::new(),
        };
        self.write(criteria, &mut predicate)?;
        Ok(predicate)
    }

    // Depth-first, left before right, so parameters line up with placeholders.
    fn write(&self, criteria: &Criteria, out: &mut Predicate) -> Result<()> {
        match criteria {
            Criteria::Combine { left, op, right } => {
                out.sql.push('(');
                self.write(left, out)?;
                out.sql.push_str(") ");
                out.sql.push_str(op.as_sql());
                out.sql.push_str(" (");
                self.write(right, out)?;
                out.sql.push(')');
                Ok(())
            }
            Criteria::Compare { column, operator } => self.write_comparison(column, operator, out),
        }
    }

    fn write_comparison(
        &self,
        column: &str,
        operator: &QueryOperator,
        out: &mut Predicate,
    ) -> Result<()> {
        let column = self.table.find_column(column)?;
        out.sql.push_str(column.quoted_name());

        let (symbol, operand) = match operator {
            QueryOperator::IsNull => {
                out.sql.push_str(" IS NULL");
                return Ok(());
            }
            QueryOperator::IsNotNull => {
                out.sql.push_str(" IS NOT NULL");
                return Ok(());
            }
            QueryOperator::In(values) => {
                if values.is_empty() {
                    return Err(DataError::InvalidCriteria(format!(
                        "IN list for column '{}' is empty",
                        column.name()
                    )));
                }
                out.sql.push_str(" IN (");
                out.sql.push_str(&vec!["?"; values.len()].join(","));
                out.sql.push(')');
                out.params.extend(values.iter().cloned());
                return Ok(());
            }
            QueryOperator::Like(pattern) => {
                out.sql.push_str(" LIKE ?");
                out.params.push(Value::Text(pattern.clone()));
                return Ok(());
            }
            QueryOperator::Equal(operand) => ("=", operand),
            QueryOperator::NotEqual(operand) => ("<>", operand),
            QueryOperator::GreaterThan(operand) => (">", operand),
            QueryOperator::GreaterThanOrEqual(operand) => (">=", operand),
            QueryOperator::LessThan(operand) => ("<", operand),
            QueryOperator::LessThanOrEqual(operand) => ("<=", operand),
        };

        out.sql.push(' ');
        out.sql.push_str(symbol);
        out.sql.push(' ');
        match operand {
            Operand::Value(value) => {
                out.sql.push('?');
                out.params.push(value.clone());
            }
            Operand::Column(other) => {
                out.sql.push_str(self.table.find_column(other)?.quoted_name());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::sample_snapshot;

    fn translate(criteria: &Criteria) -> Result<Predicate> {
        let snapshot = sample_snapshot();
        let table = snapshot.find_table("customers")?;
        ExpressionTranslator::new(table).translate(criteria)
    }

    #[test]
    fn single_comparisons_bind_one_parameter() {
        let cases = [
            (Criteria::eq("City", "NY"), "[City] = ?"),
            (Criteria::ne("City", "NY"), "[City] <> ?"),
            (Criteria::gt("Id", 3), "[Id] > ?"),
            (Criteria::ge("Id", 3), "[Id] >= ?"),
            (Criteria::lt("Id", 3), "[Id] < ?"),
            (Criteria::le("Id", 3), "[Id] <= ?"),
            (Criteria::like("Name", "Ac%"), "[Name] LIKE ?"),
        ];

        for (criteria, expected) in cases {
            let predicate = translate(&criteria).unwrap();
            assert_eq!(predicate.sql, expected);
            assert_eq!(predicate.sql.matches('?').count(), 1);
            assert_eq!(predicate.params.len(), 1);
        }

        let predicate = translate(&Criteria::gt("id", 3)).unwrap();
        assert_eq!(predicate.params, vec![Value::Integer(3)]);
    }

    #[test]
    fn null_tests_bind_nothing() {
        let predicate = translate(&Criteria::is_null("city")).unwrap();
        assert_eq!(predicate.sql, "[City] IS NULL");
        assert!(predicate.params.is_empty());

        let predicate = translate(&Criteria::is_not_null("City")).unwrap();
        assert_eq!(predicate.sql, "[City] IS NOT NULL");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn conjunction_scenario() {
        let criteria = Criteria::eq("City", "NY").and(Criteria::ne("Name", "Acme"));
        let predicate = translate(&criteria).unwrap();

        assert_eq!(predicate.sql, "([City] = ?) AND ([Name] <> ?)");
        assert_eq!(predicate.params, vec![Value::from("NY"), Value::from("Acme")]);
    }

    #[test]
    fn nesting_keeps_grouping_and_parameter_order() {
        let criteria = Criteria::eq("Name", "a")
            .and(Criteria::eq("City", "b"))
            .or(Criteria::in_list("Id", [1, 2]).and(Criteria::is_null("City")));
        let predicate = translate(&criteria).unwrap();

        assert_eq!(
            predicate.sql,
            "(([Name] = ?) AND ([City] = ?)) OR (([Id] IN (?,?)) AND ([City] IS NULL))"
        );
        assert_eq!(
            predicate.params,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::Integer(1),
                Value::Integer(2)
            ]
        );
        assert_eq!(criteria.combinator_count(), 3);
        // two per combinator, one for the IN list
        assert_eq!(predicate.sql.matches('(').count(), 2 * 3 + 1);
    }

    #[test]
    fn parentheses_grow_with_depth() {
        let mut criteria = Criteria::eq("Id", 0);
        for depth in 1..=4 {
            criteria = criteria.and(Criteria::eq("Id", depth));
            let predicate = translate(&criteria).unwrap();
            assert_eq!(predicate.sql.matches('(').count(), 2 * depth as usize);
            assert_eq!(predicate.params.len(), depth as usize + 1);
            assert_eq!(predicate.params.last(), Some(&Value::Integer(depth.into())));
        }
    }

    #[test]
    fn in_list_boundaries() {
        let predicate = translate(&Criteria::in_list("Id", [7])).unwrap();
        assert_eq!(predicate.sql, "[Id] IN (?)");
        assert_eq!(predicate.params, vec![Value::Integer(7)]);

        let err = translate(&Criteria::in_list("Id", Vec::<i64>::new())).unwrap_err();
        assert!(matches!(err, DataError::InvalidCriteria(_)));
    }

    #[test]
    fn column_operands_are_not_parameters() {
        let criteria = Criteria::compare("Name", QueryOperator::NotEqual(Operand::column("city")));
        let predicate = translate(&criteria).unwrap();

        assert_eq!(predicate.sql, "[Name] <> [City]");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn unknown_columns_are_schema_mismatches() {
        let criteria = Criteria::eq("City", "NY").and(Criteria::eq("Country", "US"));
        assert!(translate(&criteria).unwrap_err().is_schema_mismatch());

        let criteria = Criteria::compare("Name", QueryOperator::Equal(Operand::column("Nope")));
        assert!(translate(&criteria).unwrap_err().is_schema_mismatch());
    }
}
