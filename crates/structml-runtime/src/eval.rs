use structml_syntax::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use structml_syntax::parse_expression;

use crate::error::{EvalError, ValueError};
use crate::store::VariableStore;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, EvalError>;

/// Parse and evaluate `source` against `store`.
pub fn evaluate(source: &str, store: &VariableStore) -> Result<Value> {
    let expr = parse_expression(source)?;
    Evaluator::new(source, store).eval(&expr)
}

/// Tree-walking evaluator over a parsed expression.
///
/// Reads variables and nothing else: there are no built-in functions and
/// no way to reach the host.
pub struct Evaluator<'a> {
    source: &'a str,
    store: &'a VariableStore,
}

impl<'a> Evaluator<'a> {
    /// `source` is the text `Expr` ranges index into.
    pub fn new(source: &'a str, store: &'a VariableStore) -> Self {
        Self { source, store }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value> {
        let at = |err: ValueError| EvalError::at(err, expr.text(self.source));
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            ExprKind::Variable(name) => self
                .store
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.clone())),
            ExprKind::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            ExprKind::Map(entries) => {
                let mut pairs: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    match pairs.iter_mut().find(|(k, _)| k == key) {
                        Some(slot) => slot.1 = value,
                        None => pairs.push((key.clone(), value)),
                    }
                }
                Ok(Value::Map(pairs))
            }
            ExprKind::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                target.index_get(&index).map_err(at)
            }
            ExprKind::Field { target, name } => {
                let target = self.eval(target)?;
                target.field_get(name).map_err(at)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => value.neg().map_err(at),
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            ExprKind::Binary { left, op, right } => self.eval_binary(expr, left, *op, right),
        }
    }

    fn eval_binary(&self, expr: &Expr, left: &Expr, op: BinaryOp, right: &Expr) -> Result<Value> {
        let lhs = self.eval(left)?;
        let result = match op {
            BinaryOp::And => {
                return Ok(Value::Bool(lhs.is_truthy() && self.eval(right)?.is_truthy()))
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(lhs.is_truthy() || self.eval(right)?.is_truthy()))
            }
            BinaryOp::Add => lhs.add(&self.eval(right)?),
            BinaryOp::Sub => lhs.sub(&self.eval(right)?),
            BinaryOp::Mul => lhs.mul(&self.eval(right)?),
            BinaryOp::Div => lhs.div(&self.eval(right)?),
            BinaryOp::Eq => Ok(lhs.eq_val(&self.eval(right)?)),
            BinaryOp::Neq => Ok(lhs.neq_val(&self.eval(right)?)),
            BinaryOp::Lt => lhs.lt(&self.eval(right)?),
            BinaryOp::Gt => lhs.gt(&self.eval(right)?),
            BinaryOp::Lte => lhs.lte(&self.eval(right)?),
            BinaryOp::Gte => lhs.gte(&self.eval(right)?),
        };
        result.map_err(|err| EvalError::at(err, expr.text(self.source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store.set("n", Value::Int(3));
        store.set("name", Value::String("Ada".into()));
        store.set(
            "user",
            Value::Map(vec![
                ("name".into(), Value::String("Grace".into())),
                (
                    "tags".into(),
                    Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
                ),
            ]),
        );
        store.set("empty", Value::List(vec![]));
        store
    }

    fn eval(source: &str) -> Value {
        evaluate(source, &store()).unwrap_or_else(|e| panic!("eval '{}': {}", source, e))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval("n / 2"), Value::Int(1));
        assert_eq!(eval("n / 2.0"), Value::Float(1.5));
        assert_eq!(eval("-n + 1"), Value::Int(-2));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("n > 2 and name == \"Ada\""), Value::Bool(true));
        assert_eq!(eval("n < 2 || not empty"), Value::Bool(true));
        assert_eq!(eval("n == 3.0"), Value::Bool(true));
        assert_eq!(eval("name != 'Ada'"), Value::Bool(false));
    }

    #[test]
    fn logic_short_circuits_past_undefined() {
        assert_eq!(eval("false and missing"), Value::Bool(false));
        assert_eq!(eval("true or missing"), Value::Bool(true));
        assert_eq!(eval("n and name"), Value::Bool(true));
    }

    #[test]
    fn indexing_and_fields() {
        assert_eq!(eval("user[\"name\"]"), Value::String("Grace".into()));
        assert_eq!(eval("user.tags[-1]"), Value::String("b".into()));
        assert_eq!(eval("[10, 20, 30][n - 2]"), Value::Int(20));
        assert_eq!(eval("{\"a\": {\"b\": 2}}[\"a\"].b"), Value::Int(2));
    }

    #[test]
    fn duplicate_map_keys_keep_last() {
        assert_eq!(
            eval("{a: 1, a: 2}"),
            Value::Map(vec![("a".into(), Value::Int(2))])
        );
    }

    #[test]
    fn undefined_variable() {
        let err = evaluate("missing + 1", &store()).unwrap_err();
        assert_eq!(err, EvalError::Undefined("missing".into()));
    }

    #[test]
    fn type_error_names_sub_expression() {
        let err = evaluate("n + (empty - 1)", &store()).unwrap_err();
        match err {
            EvalError::Type { expr, .. } => assert_eq!(expr, "(empty - 1)"),
            other => panic!("expected type error, got {:?}", other),
        }
    }

    #[test]
    fn index_and_division_errors() {
        assert!(matches!(
            evaluate("user.tags[5]", &store()),
            Err(EvalError::Index { .. })
        ));
        assert!(matches!(
            evaluate("user[\"age\"]", &store()),
            Err(EvalError::Index { .. })
        ));
        assert_eq!(
            evaluate("n / 0", &store()).unwrap_err(),
            EvalError::DivisionByZero {
                expr: "n / 0".into()
            }
        );
    }

    #[test]
    fn overflow_is_an_evaluation_error() {
        assert_eq!(
            evaluate("9223372036854775807 + 1", &store()).unwrap_err(),
            EvalError::Overflow {
                expr: "9223372036854775807 + 1".into()
            }
        );
        assert!(matches!(
            evaluate("\"abc\" * 9223372036854775807", &store()),
            Err(EvalError::Overflow { .. })
        ));
    }

    #[test]
    fn syntax_error() {
        assert!(matches!(
            evaluate("1 +", &store()),
            Err(EvalError::Syntax(_))
        ));
    }
}
