//! Parsed SELECT statement model
//!
//! The engine does not parse query text. It consumes statements already
//! parsed into this form and reads two derived quantities from them: the
//! aggregate call list and the normalized GROUP BY dimensions.

use crate::error::{QueryError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A literal value inside an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Floating point number
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Duration in nanoseconds
    Duration(i64),
    /// Absolute instant
    Time(DateTime<Utc>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

/// An expression tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a field or tag by name
    VarRef(String),
    /// Function call
    Call(Call),
    /// Literal value
    Literal(Literal),
    /// Binary expression
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A function call descriptor. Immutable once constructed by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Function name, e.g. `count`, `sum`, `mean`
    pub name: String,
    /// Argument expressions
    pub args: Vec<Expr>,
}

impl Call {
    /// Create a call with explicit arguments
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Create a call over a single field reference, e.g. `sum(value)`
    pub fn on_field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, vec![Expr::VarRef(field.into())])
    }
}

/// Resolves names to literal values during expression reduction
pub trait Valuer {
    /// Return a literal for the given name, or None if unknown
    fn value(&self, name: &str) -> Option<Literal>;
}

/// Substitutes `now()` with a captured instant
pub struct NowValuer {
    pub now: DateTime<Utc>,
}

impl Valuer for NowValuer {
    fn value(&self, name: &str) -> Option<Literal> {
        (name == "now").then(|| Literal::Time(self.now))
    }
}

/// Reduce an expression by substituting names through the valuer and folding
/// constant time arithmetic. Unresolvable nodes are returned unchanged.
pub fn reduce(expr: Expr, valuer: &dyn Valuer) -> Expr {
    match expr {
        Expr::Call(call) if call.args.is_empty() => match valuer.value(&call.name) {
            Some(lit) => Expr::Literal(lit),
            None => Expr::Call(call),
        },
        Expr::Call(Call { name, args }) => Expr::Call(Call {
            name,
            args: args.into_iter().map(|a| reduce(a, valuer)).collect(),
        }),
        Expr::VarRef(name) => match valuer.value(&name) {
            Some(lit) => Expr::Literal(lit),
            None => Expr::VarRef(name),
        },
        Expr::Binary { op, lhs, rhs } => {
            let lhs = reduce(*lhs, valuer);
            let rhs = reduce(*rhs, valuer);
            fold_binary(op, lhs, rhs)
        }
        other => other,
    }
}

fn fold_binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    if let (Expr::Literal(a), Expr::Literal(b)) = (&lhs, &rhs) {
        match (op, a, b) {
            (BinaryOp::Sub, Literal::Time(t), Literal::Duration(d)) => {
                return Expr::Literal(Literal::Time(*t - Duration::nanoseconds(*d)));
            }
            (BinaryOp::Add, Literal::Time(t), Literal::Duration(d))
            | (BinaryOp::Add, Literal::Duration(d), Literal::Time(t)) => {
                return Expr::Literal(Literal::Time(*t + Duration::nanoseconds(*d)));
            }
            (BinaryOp::Add, Literal::Duration(x), Literal::Duration(y)) => {
                return Expr::Literal(Literal::Duration(x + y));
            }
            (BinaryOp::Sub, Literal::Duration(x), Literal::Duration(y)) => {
                return Expr::Literal(Literal::Duration(x - y));
            }
            _ => {}
        }
    }
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// One entry in the SELECT field list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Field {
    /// The name this field appears under in result columns
    pub fn name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expr::VarRef(name) => name.clone(),
            Expr::Call(call) => call.name.clone(),
            _ => String::new(),
        }
    }
}

/// The GROUP BY clause: a list of dimension expressions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions(pub Vec<Expr>);

impl Dimensions {
    /// Normalize the dimensions into a group-by interval in nanoseconds
    /// (zero when absent) and an ordered list of tag keys.
    pub fn normalize(&self) -> Result<(i64, Vec<String>)> {
        let mut interval = 0i64;
        let mut tag_keys = Vec::new();
        for dim in &self.0 {
            match dim {
                Expr::Call(call) if call.name == "time" => {
                    if interval != 0 {
                        return Err(QueryError::InvalidDimension(
                            "duplicate time dimension".to_string(),
                        ));
                    }
                    match call.args.as_slice() {
                        [Expr::Literal(Literal::Duration(ns))] if *ns > 0 => interval = *ns,
                        _ => {
                            return Err(QueryError::InvalidDimension(
                                "time dimension requires a single duration argument".to_string(),
                            ))
                        }
                    }
                }
                Expr::VarRef(name) => tag_keys.push(name.clone()),
                other => {
                    return Err(QueryError::InvalidDimension(format!(
                        "unsupported dimension expression: {other:?}"
                    )))
                }
            }
        }
        Ok((interval, tag_keys))
    }
}

/// A parsed SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// The measurement selected from
    pub source: String,
    /// The SELECT field list
    pub fields: Vec<Field>,
    /// The GROUP BY clause
    pub dimensions: Dimensions,
    /// The WHERE condition, if any
    pub condition: Option<Expr>,
}

impl SelectStatement {
    /// Create a statement selecting from a single measurement
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: Vec::new(),
            dimensions: Dimensions::default(),
            condition: None,
        }
    }

    /// Add a plain field reference to the SELECT list
    pub fn select_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(Field {
            expr: Expr::VarRef(name.into()),
            alias: None,
        });
        self
    }

    /// Add an aggregate call to the SELECT list
    pub fn select_call(mut self, call: Call) -> Self {
        self.fields.push(Field {
            expr: Expr::Call(call),
            alias: None,
        });
        self
    }

    /// Group by a time interval in nanoseconds
    pub fn group_by_time(mut self, interval_ns: i64) -> Self {
        self.dimensions.0.push(Expr::Call(Call::new(
            "time",
            vec![Expr::Literal(Literal::Duration(interval_ns))],
        )));
        self
    }

    /// Group by a tag key
    pub fn group_by_tag(mut self, key: impl Into<String>) -> Self {
        self.dimensions.0.push(Expr::VarRef(key.into()));
        self
    }

    /// Set the WHERE condition
    pub fn with_condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    /// The aggregate calls in the SELECT list, in statement order
    pub fn aggregate_calls(&self) -> Vec<Call> {
        self.fields
            .iter()
            .filter_map(|f| match &f.expr {
                Expr::Call(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// The column names the SELECT list asks for, in statement order
    pub fn names_in_select(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name()).collect()
    }

    /// A statement is raw iff it has no aggregate calls
    pub fn is_raw(&self) -> bool {
        self.aggregate_calls().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_aggregate_calls_and_raw() {
        let stmt = SelectStatement::new("cpu")
            .select_call(Call::on_field("sum", "value"))
            .select_call(Call::on_field("count", "value"));
        let calls = stmt.aggregate_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "sum");
        assert_eq!(calls[1].name, "count");
        assert!(!stmt.is_raw());

        let raw = SelectStatement::new("cpu").select_field("value");
        assert!(raw.is_raw());
    }

    #[test]
    fn test_names_in_select_honors_alias() {
        let mut stmt = SelectStatement::new("cpu").select_field("value");
        stmt.fields.push(Field {
            expr: Expr::Call(Call::on_field("mean", "value")),
            alias: Some("avg".to_string()),
        });
        assert_eq!(stmt.names_in_select(), vec!["value", "avg"]);
    }

    #[test]
    fn test_normalize_interval_and_tags() {
        let stmt = SelectStatement::new("cpu")
            .group_by_time(600_000_000_000)
            .group_by_tag("host")
            .group_by_tag("region");
        let (interval, tags) = stmt.dimensions.normalize().unwrap();
        assert_eq!(interval, 600_000_000_000);
        assert_eq!(tags, vec!["host", "region"]);
    }

    #[test]
    fn test_normalize_empty_dimensions() {
        let stmt = SelectStatement::new("cpu");
        let (interval, tags) = stmt.dimensions.normalize().unwrap();
        assert_eq!(interval, 0);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_normalize_rejects_bad_dimensions() {
        // time() with a non-duration argument
        let mut stmt = SelectStatement::new("cpu");
        stmt.dimensions.0.push(Expr::Call(Call::new(
            "time",
            vec![Expr::Literal(Literal::Number(5.0))],
        )));
        assert!(matches!(
            stmt.dimensions.normalize(),
            Err(QueryError::InvalidDimension(_))
        ));

        // duplicate time()
        let stmt = SelectStatement::new("cpu")
            .group_by_time(1_000)
            .group_by_time(2_000);
        assert!(stmt.dimensions.normalize().is_err());

        // a literal is not a dimension
        let mut stmt = SelectStatement::new("cpu");
        stmt.dimensions
            .0
            .push(Expr::Literal(Literal::String("host".to_string())));
        assert!(stmt.dimensions.normalize().is_err());
    }

    #[test]
    fn test_reduce_substitutes_now() {
        let now = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let one_hour = 3_600_000_000_000i64;
        let cond = Expr::Binary {
            op: BinaryOp::Gt,
            lhs: Box::new(Expr::VarRef("time".to_string())),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::Sub,
                lhs: Box::new(Expr::Call(Call::new("now", vec![]))),
                rhs: Box::new(Expr::Literal(Literal::Duration(one_hour))),
            }),
        };

        let reduced = reduce(cond, &NowValuer { now });
        assert_eq!(
            reduced,
            Expr::Binary {
                op: BinaryOp::Gt,
                lhs: Box::new(Expr::VarRef("time".to_string())),
                rhs: Box::new(Expr::Literal(Literal::Time(
                    now - Duration::nanoseconds(one_hour)
                ))),
            }
        );
    }

    #[test]
    fn test_reduce_folds_durations() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Literal(Literal::Duration(100))),
            rhs: Box::new(Expr::Literal(Literal::Duration(20))),
        };
        let reduced = reduce(expr, &NowValuer { now: Utc::now() });
        assert_eq!(reduced, Expr::Literal(Literal::Duration(120)));
    }

    #[test]
    fn test_reduce_leaves_unknown_names() {
        let expr = Expr::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Expr::VarRef("host".to_string())),
            rhs: Box::new(Expr::Literal(Literal::String("server01".to_string()))),
        };
        let reduced = reduce(expr.clone(), &NowValuer { now: Utc::now() });
        assert_eq!(reduced, expr);
    }
}
