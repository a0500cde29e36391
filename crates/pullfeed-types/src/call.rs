//! Batched-call entries.
//!
//! A [`Call`] is one entry of an aggregator request. Calls are never mutated
//! once built; the builder helpers consume `self` and return a new value.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// One entry in a batched simulate/execute request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Contract the call is sent to.
    pub target: Address,
    /// Whether a revert of this entry reverts the whole batch.
    pub require_success: bool,
    /// Native currency forwarded with the call, in wei.
    pub value: U256,
    /// Encoded call data.
    pub data: Bytes,
}

impl Call {
    /// Create a call that must succeed and carries no value.
    pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            target,
            require_success: true,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    /// Return a copy of this call carrying `value` wei.
    pub fn with_value(self, value: U256) -> Self {
        Self { value, ..self }
    }

    /// Return a copy of this call that is allowed to fail.
    pub fn allow_failure(self) -> Self {
        Self {
            require_success: false,
            ..self
        }
    }
}

/// Outcome of one [`Call`], in the same position as the submitted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Return data on success, revert data otherwise.
    pub return_data: Bytes,
}

/// Sum of the values attached to `calls`, saturating at `U256::MAX`.
pub fn total_value(calls: &[Call]) -> U256 {
    calls
        .iter()
        .fold(U256::ZERO, |acc, call| acc.saturating_add(call.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_call_defaults() {
        let call = Call::new(Address::repeat_byte(0x11), vec![0xde, 0xad]);
        assert!(call.require_success);
        assert_eq!(call.value, U256::ZERO);
        assert_eq!(call.data.as_ref(), &[0xde, 0xad]);
    }

    #[test]
    fn test_with_value_keeps_other_fields() {
        let call = Call::new(Address::repeat_byte(0x11), vec![0x01]);
        let paid = call.clone().with_value(U256::from(5));
        assert_eq!(paid.value, U256::from(5));
        assert_eq!(paid.target, call.target);
        assert_eq!(paid.data, call.data);
        assert_eq!(call.value, U256::ZERO);
    }

    #[test]
    fn test_total_value() {
        let calls = vec![
            Call::new(Address::ZERO, Bytes::new()).with_value(U256::from(2)),
            Call::new(Address::ZERO, Bytes::new()),
            Call::new(Address::ZERO, Bytes::new()).with_value(U256::from(40)),
        ];
        assert_eq!(total_value(&calls), U256::from(42));
        assert_eq!(total_value(&[]), U256::ZERO);
    }

    #[test]
    fn test_total_value_saturates() {
        let calls = vec![
            Call::new(Address::ZERO, Bytes::new()).with_value(U256::MAX),
            Call::new(Address::ZERO, Bytes::new()).with_value(U256::from(1)),
        ];
        assert_eq!(total_value(&calls), U256::MAX);
    }

    #[test]
    fn test_call_serialization() {
        let call = Call::new(Address::repeat_byte(0xaa), vec![0x12, 0x34]).allow_failure();
        let json = serde_json::to_value(&call).expect("serialize");
        assert_eq!(json["requireSuccess"], false);
        assert_eq!(json["data"], "0x1234");
        let back: Call = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, call);
    }
}
