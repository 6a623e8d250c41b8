//! Arithmetic facts and the practice permutations derived from them.
//!
//! A commutative fact (addition, multiplication) is drilled in both operand
//! orders; each direction is a separate practice item with its own score.
//! Subtraction and division are drilled only as written.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(String);

impl FactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Addition => "+",
            Self::Subtraction => "-",
            Self::Multiplication => "×",
            Self::Division => "÷",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            Self::Addition => "add",
            Self::Subtraction => "sub",
            Self::Multiplication => "mul",
            Self::Division => "div",
        }
    }

    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::Addition | Self::Multiplication)
    }

    /// `None` when the result is not a whole number or would overflow.
    pub fn evaluate(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            Self::Addition => a.checked_add(b),
            Self::Subtraction => a.checked_sub(b),
            Self::Multiplication => a.checked_mul(b),
            Self::Division => {
                if b == 0 || a % b != 0 {
                    None
                } else {
                    Some(a / b)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub fact_id: FactId,
    pub operation: Operation,
    pub operand1: i64,
    pub operand2: i64,
    pub result: i64,
}

impl Fact {
    pub fn new(
        fact_id: impl Into<String>,
        operation: Operation,
        operand1: i64,
        operand2: i64,
        result: i64,
    ) -> Result<Self, EngineError> {
        let fact = Self {
            fact_id: FactId::new(fact_id),
            operation,
            operand1,
            operand2,
            result,
        };
        fact.validate()?;
        Ok(fact)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self.operation.evaluate(self.operand1, self.operand2) {
            Some(value) if value == self.result => Ok(()),
            Some(value) => Err(EngineError::InvalidFact {
                fact_id: self.fact_id.clone(),
                reason: format!(
                    "{} {} {} is {value}, not {}",
                    self.operand1,
                    self.operation.symbol(),
                    self.operand2,
                    self.result
                ),
            }),
            None => Err(EngineError::InvalidFact {
                fact_id: self.fact_id.clone(),
                reason: "operands have no whole-number result".to_string(),
            }),
        }
    }

    pub fn is_commutative(&self) -> bool {
        self.operation.is_commutative()
    }

    pub fn permutations(&self) -> Vec<Permutation> {
        let forward = Permutation {
            id: PermutationId::new(self.fact_id.clone(), Direction::Forward),
            operation: self.operation,
            operand1: self.operand1,
            operand2: self.operand2,
            result: self.result,
        };
        if !self.is_commutative() {
            return vec![forward];
        }
        let reversed = Permutation {
            id: forward.id.sibling(),
            operation: self.operation,
            operand1: self.operand2,
            operand2: self.operand1,
            result: self.result,
        };
        vec![forward, reversed]
    }

    /// Builds every fact of one operation over operands `0..=max_operand`.
    ///
    /// Commutative tracks keep one fact per unordered pair since both
    /// directions are drilled from it. Subtraction and division facts are
    /// the inverses of addition and multiplication, so their answers stay in
    /// range.
    pub fn track(operation: Operation, max_operand: i64) -> Vec<Fact> {
        let mut facts = Vec::new();
        for a in 0..=max_operand {
            for b in 0..=max_operand {
                let (operand1, operand2) = match operation {
                    Operation::Addition | Operation::Multiplication if a > b => continue,
                    Operation::Addition | Operation::Multiplication => (a, b),
                    Operation::Subtraction => (a + b, b),
                    Operation::Division if b == 0 => continue,
                    Operation::Division => (a * b, b),
                };
                let Some(result) = operation.evaluate(operand1, operand2) else {
                    continue;
                };
                facts.push(Fact {
                    fact_id: FactId::new(format!(
                        "{}-{operand1}-{operand2}",
                        operation.short_name()
                    )),
                    operation,
                    operand1,
                    operand2,
                    result,
                });
            }
        }
        facts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reversed,
}

impl Direction {
    pub fn flipped(&self) -> Self {
        match self {
            Self::Forward => Self::Reversed,
            Self::Reversed => Self::Forward,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Forward => "fwd",
            Self::Reversed => "rev",
        }
    }
}

/// Identity of one practice item: `<factId>:fwd` or `<factId>:rev`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PermutationId {
    pub fact_id: FactId,
    pub direction: Direction,
}

impl PermutationId {
    pub fn new(fact_id: FactId, direction: Direction) -> Self {
        Self { fact_id, direction }
    }

    /// The same fact in the opposite operand order.
    pub fn sibling(&self) -> Self {
        Self {
            fact_id: self.fact_id.clone(),
            direction: self.direction.flipped(),
        }
    }
}

impl fmt::Display for PermutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fact_id, self.direction.tag())
    }
}

impl From<PermutationId> for String {
    fn from(value: PermutationId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for PermutationId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (fact, tag) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("permutation id without direction: {value}"))?;
        let direction = match tag {
            "fwd" => Direction::Forward,
            "rev" => Direction::Reversed,
            other => return Err(format!("unknown direction tag: {other}")),
        };
        Ok(Self::new(FactId::new(fact), direction))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permutation {
    pub id: PermutationId,
    pub operation: Operation,
    pub operand1: i64,
    pub operand2: i64,
    pub result: i64,
}

impl Permutation {
    pub fn fact_id(&self) -> &FactId {
        &self.id.fact_id
    }

    pub fn sibling_id(&self) -> Option<PermutationId> {
        self.operation
            .is_commutative()
            .then(|| self.id.sibling())
    }

    pub fn prompt(&self) -> String {
        format!(
            "{} {} {} = ?",
            self.operand1,
            self.operation.symbol(),
            self.operand2
        )
    }

    pub fn is_correct(&self, answer: i64) -> bool {
        answer == self.result
    }
}

/// Expands facts into practice items, forward direction first, in input order.
pub fn generate_permutations<'a, I>(facts: I) -> Vec<Permutation>
where
    I: IntoIterator<Item = &'a Fact>,
{
    facts.into_iter().flat_map(Fact::permutations).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(id: &str, op: Operation, a: i64, b: i64, r: i64) -> Fact {
        Fact::new(id, op, a, b, r).unwrap()
    }

    #[test]
    fn test_commutative_fact_yields_swapped_pair() {
        let f = fact("add-3-4", Operation::Addition, 3, 4, 7);
        let perms = f.permutations();
        assert_eq!(perms.len(), 2);
        assert_ne!(perms[0].id, perms[1].id);
        assert_eq!((perms[0].operand1, perms[0].operand2), (3, 4));
        assert_eq!((perms[1].operand1, perms[1].operand2), (4, 3));
        assert_eq!(perms[0].result, 7);
        assert_eq!(perms[1].result, 7);
        assert_eq!(perms[0].sibling_id(), Some(perms[1].id.clone()));
        assert_eq!(perms[1].sibling_id(), Some(perms[0].id.clone()));
    }

    #[test]
    fn test_non_commutative_fact_yields_single_item() {
        let f = fact("sub-9-5", Operation::Subtraction, 9, 5, 4);
        let perms = f.permutations();
        assert_eq!(perms.len(), 1);
        assert_eq!((perms[0].operand1, perms[0].operand2), (9, 5));
        assert_eq!(perms[0].sibling_id(), None);
        assert_eq!(perms[0].prompt(), "9 - 5 = ?");
    }

    #[test]
    fn test_doubles_still_get_two_distinct_items() {
        let f = fact("mul-3-3", Operation::Multiplication, 3, 3, 9);
        let perms = f.permutations();
        assert_eq!(perms.len(), 2);
        assert_ne!(perms[0].id, perms[1].id);
    }

    #[test]
    fn test_generate_permutations_is_deterministic() {
        let facts = vec![
            fact("add-1-2", Operation::Addition, 1, 2, 3),
            fact("div-8-2", Operation::Division, 8, 2, 4),
        ];
        let first = generate_permutations(&facts);
        let second = generate_permutations(&facts);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].id.fact_id, FactId::from("div-8-2"));
    }

    #[test]
    fn test_fact_validation_rejects_wrong_result() {
        let err = Fact::new("bad", Operation::Addition, 2, 2, 5).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFact { .. }));
        assert!(Fact::new("inexact", Operation::Division, 7, 2, 3).is_err());
        assert!(Fact::new("zero", Operation::Division, 7, 0, 0).is_err());
    }

    #[test]
    fn test_permutation_id_string_form() {
        let id = PermutationId::new(FactId::from("add-3-4"), Direction::Reversed);
        let text: String = id.clone().into();
        assert_eq!(text, "add-3-4:rev");
        assert_eq!(PermutationId::try_from(text).unwrap(), id);
        assert!(PermutationId::try_from("add-3-4".to_string()).is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"add-3-4:rev\"");
    }

    #[test]
    fn test_track_builds_valid_facts() {
        let additions = Fact::track(Operation::Addition, 2);
        // unordered pairs over 0..=2
        assert_eq!(additions.len(), 6);
        for f in additions
            .iter()
            .chain(Fact::track(Operation::Subtraction, 3).iter())
            .chain(Fact::track(Operation::Division, 3).iter())
        {
            assert!(f.validate().is_ok(), "{f:?}");
        }
        assert!(Fact::track(Operation::Subtraction, 3).iter().all(|f| f.result >= 0));
    }
}
