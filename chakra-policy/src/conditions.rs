//! Access control conditions binding a wrapped key to one wallet and one
//! policy program.
//!
//! The network evaluates these at decryption time. The JSON shape is fixed by
//! the network; the condition set is also mixed into the ciphertext binding,
//! so the same `(owner, version)` must always serialize to the same bytes.

use crate::constants::SOLANA_CHAIN;
use crate::error::PolicyResult;
use crate::registry::{PolicyVersion, ProgramRegistry};
use serde::{Deserialize, Serialize};

/// Parameter resolved to the caller's wallet address.
pub const USER_ADDRESS_PARAM: &str = ":userAddress";

/// Parameter resolved to the content id of the executing program.
pub const CURRENT_ACTION_PARAM: &str = ":currentActionIpfsId";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdaInterface {
    pub offset: u64,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub key: String,
    pub comparator: String,
    pub value: String,
}

/// A single predicate clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlCondition {
    pub method: String,
    pub params: Vec<String>,
    pub pda_params: Vec<String>,
    pub pda_interface: PdaInterface,
    pub pda_key: String,
    pub chain: String,
    pub return_value_test: ReturnValueTest,
}

impl AccessControlCondition {
    /// Clause requiring `param` to resolve to exactly `value`.
    pub fn equals(param: &str, value: impl Into<String>) -> Self {
        Self {
            method: String::new(),
            params: vec![param.to_string()],
            pda_params: Vec::new(),
            pda_interface: PdaInterface::default(),
            pda_key: String::new(),
            chain: SOLANA_CHAIN.to_string(),
            return_value_test: ReturnValueTest {
                key: String::new(),
                comparator: "=".to_string(),
                value: value.into(),
            },
        }
    }

    fn holds(&self, user_address: &str, current_action_id: &str) -> bool {
        let resolved = match self.params.as_slice() {
            [p] if p == USER_ADDRESS_PARAM => user_address,
            [p] if p == CURRENT_ACTION_PARAM => current_action_id,
            _ => return false,
        };
        match self.return_value_test.comparator.as_str() {
            "=" => resolved == self.return_value_test.value,
            _ => false,
        }
    }
}

/// Boolean connective between clauses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionOperator {
    pub operator: String,
}

impl ConditionOperator {
    pub fn and() -> Self {
        Self {
            operator: "and".to_string(),
        }
    }
}

/// One element of a condition list: a clause or an operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionItem {
    Clause(AccessControlCondition),
    Operator(ConditionOperator),
}

/// Ordered condition list as sent to the network.
pub type SolRpcConditions = Vec<ConditionItem>;

/// Builds the two-clause condition for `(owner, version)`:
/// caller is `owner` AND executing program is `version`'s pinned program.
pub fn conditions_to_decrypt(
    owner: &str,
    version: PolicyVersion,
    registry: &ProgramRegistry,
) -> PolicyResult<SolRpcConditions> {
    let program_id = registry.pinned_id(version)?;
    Ok(vec![
        ConditionItem::Clause(AccessControlCondition::equals(USER_ADDRESS_PARAM, owner)),
        ConditionItem::Operator(ConditionOperator::and()),
        ConditionItem::Clause(AccessControlCondition::equals(
            CURRENT_ACTION_PARAM,
            program_id,
        )),
    ])
}

/// Evaluates a condition list left to right.
///
/// The list must alternate clause, operator, clause, ... Anything else,
/// an unknown operator, param or comparator evaluates to `false`.
pub fn evaluate(conditions: &[ConditionItem], user_address: &str, current_action_id: &str) -> bool {
    let mut items = conditions.iter();
    let mut acc = match items.next() {
        Some(ConditionItem::Clause(c)) => c.holds(user_address, current_action_id),
        _ => return false,
    };

    loop {
        let op = match items.next() {
            None => return acc,
            Some(ConditionItem::Operator(op)) => op.operator.to_ascii_lowercase(),
            Some(ConditionItem::Clause(_)) => return false,
        };
        let rhs = match items.next() {
            Some(ConditionItem::Clause(c)) => c.holds(user_address, current_action_id),
            _ => return false,
        };
        acc = match op.as_str() {
            "and" => acc && rhs,
            "or" => acc || rhs,
            _ => return false,
        };
    }
}
