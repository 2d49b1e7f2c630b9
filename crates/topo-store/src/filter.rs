//! Condition evaluation over flat records

use crate::error::StoreError;
use regex::Regex;
use std::cmp::Ordering;
use topo_model::{AttrValue, Clause, Condition, Operator, Record};

/// Whether `record` satisfies every clause of `condition`
///
/// # Errors
/// `UnsupportedOperator` for pass-through operators, `InvalidCondition` for
/// operands of the wrong shape
pub fn matches(record: &Record, condition: &Condition) -> Result<bool, StoreError> {
    for clause in condition.clauses() {
        if !clause_matches(record, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clause_matches(record: &Record, clause: &Clause) -> Result<bool, StoreError> {
    let Some(field) = record.get(&clause.field) else {
        // Absent fields only satisfy negative operators
        return match &clause.operator {
            Operator::Ne | Operator::Nin => Ok(true),
            Operator::Other(op) => Err(StoreError::UnsupportedOperator(op.clone())),
            _ => Ok(false),
        };
    };

    let operand = &clause.value;
    Ok(match &clause.operator {
        Operator::Eq => field.loose_eq(operand),
        Operator::Ne => !field.loose_eq(operand),
        Operator::In => list_operand(clause)?.iter().any(|v| field.loose_eq(v)),
        Operator::Nin => !list_operand(clause)?.iter().any(|v| field.loose_eq(v)),
        Operator::Lt => field.compare(operand) == Some(Ordering::Less),
        Operator::Lte => matches!(
            field.compare(operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => field.compare(operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            field.compare(operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Like => {
            let pattern = operand.as_str().map_err(|_| {
                StoreError::InvalidCondition(format!("{} expects a string pattern", clause.field))
            })?;
            let re = Regex::new(pattern)
                .map_err(|e| StoreError::InvalidCondition(format!("{}: {e}", clause.field)))?;
            field.as_str().is_ok_and(|s| re.is_match(s))
        }
        Operator::Other(op) => return Err(StoreError::UnsupportedOperator(op.clone())),
    })
}

fn list_operand(clause: &Clause) -> Result<&[AttrValue], StoreError> {
    clause.value.as_list().map_err(|_| {
        StoreError::InvalidCondition(format!(
            "{} on {} expects a list operand",
            clause.operator, clause.field
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Record {
        Record::new()
            .with("bk_inst_id", 5)
            .with("bk_inst_name", "core-sw-01")
            .with("bk_obj_id", "switch")
    }

    #[test]
    fn conjunction_of_clauses() {
        let cond = Condition::new()
            .eq("bk_obj_id", "switch")
            .is_in("bk_inst_id", vec![1_i64, 5]);
        assert_eq!(matches(&row(), &cond), Ok(true));

        let cond = cond.eq("bk_inst_name", "edge-sw");
        assert_eq!(matches(&row(), &cond), Ok(false));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let cond = Condition::new().is_in("bk_inst_id", Vec::<i64>::new());
        assert_eq!(matches(&row(), &cond), Ok(false));
    }

    #[test]
    fn missing_field_semantics() {
        assert_eq!(matches(&row(), &Condition::new().eq("rack", 1)), Ok(false));
        assert_eq!(matches(&row(), &Condition::new().ne("rack", 1)), Ok(true));
    }

    #[test]
    fn range_and_regex() {
        let cond = Condition::new()
            .op("bk_inst_id", Operator::Gte, 5)
            .op("bk_inst_name", Operator::Like, "^core-");
        assert_eq!(matches(&row(), &cond), Ok(true));
    }

    #[test]
    fn pass_through_operator_is_rejected() {
        let cond = Condition::new().op("bk_inst_id", Operator::Other("$exists".into()), true);
        assert_eq!(
            matches(&row(), &cond),
            Err(StoreError::UnsupportedOperator("$exists".into()))
        );
    }

    #[test]
    fn in_requires_list() {
        let cond = Condition::new().op("bk_inst_id", Operator::In, 5);
        assert!(matches!(
            matches(&row(), &cond),
            Err(StoreError::InvalidCondition(_))
        ));
    }
}
