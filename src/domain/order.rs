//! Order intents emitted by the decision engine.

#[derive(Debug, Clone, PartialEq)]
pub enum OrderIntent {
    /// Buy (positive) or sell (negative) a number of whole shares.
    Shares { code: String, quantity: i64 },
    /// Rebalance the position to `fraction` of portfolio value.
    TargetPercent { code: String, fraction: f64 },
}

impl OrderIntent {
    pub fn shares(code: &str, quantity: i64) -> Self {
        OrderIntent::Shares {
            code: code.to_string(),
            quantity,
        }
    }

    pub fn target(code: &str, fraction: f64) -> Self {
        OrderIntent::TargetPercent {
            code: code.to_string(),
            fraction,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            OrderIntent::Shares { code, .. } | OrderIntent::TargetPercent { code, .. } => code,
        }
    }
}
