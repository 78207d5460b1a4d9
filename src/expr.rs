use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpType {
    Negative,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Multiplication,
    Division,
    Remainder,
    Addition,
    Subtraction,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

/// Scalar expression appearing in filters, projections, ordering keys and
/// join conditions. An owned tree, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Value(Value),
    /// Column reference, resolved against row labels at evaluation time.
    /// Qualified names (`set.column`) address a specific side of a join.
    Column(String),
    Unary {
        op: UnaryOpType,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn val(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    fn binary(self, op: BinaryOpType, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Equal, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::NotEqual, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Less, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Greater, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::LessEqual, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::GreaterEqual, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Or, rhs)
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Addition, rhs)
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Subtraction, rhs)
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Multiplication, rhs)
    }

    pub fn div(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Division, rhs)
    }

    pub fn rem(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOpType::Remainder, rhs)
    }

    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOpType::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Self {
        Expr::Unary {
            op: UnaryOpType::Negative,
            expr: Box::new(self),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Value(value.into())
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Value(value.into())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Value(value.into())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Value(value.into())
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Value(value.into())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Value(value.into())
    }
}
