//! Binary call codec.
//!
//! Calls are described by an [`alloy_json_abi::Function`], parsed either from
//! a human-readable signature such as
//! `function getPrice(bytes32 feed) returns (uint256, uint64)` or taken from a
//! JSON ABI. No reflection is involved: the function description alone drives
//! encoding and decoding.
//!
//! A function with exactly one declared output decodes to that value directly.
//! Any other arity decodes to a [`DynSolValue::Tuple`].

use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Bytes;

use crate::{AbiError, Result};

/// Parse a human-readable function signature.
pub fn parse_function(signature: &str) -> Result<Function> {
    Function::parse(signature.trim())
        .map_err(|e| AbiError::Signature(format!("{signature}: {e}")))
}

/// Extract the first function named `name` from a JSON ABI document.
pub fn function_from_abi(abi_json: &str, name: &str) -> Result<Function> {
    let abi: JsonAbi = serde_json::from_str(abi_json)
        .map_err(|e| AbiError::Signature(format!("invalid JSON ABI: {e}")))?;
    abi.function(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| AbiError::Signature(format!("function {name} not found in ABI")))
}

/// Encode a call to `function` with `args`, selector included.
///
/// # Errors
///
/// [`AbiError::Encoding`] when the argument count or any argument type does
/// not match the declared inputs.
pub fn encode(function: &Function, args: &[DynSolValue]) -> Result<Bytes> {
    if args.len() != function.inputs.len() {
        return Err(AbiError::Encoding(format!(
            "{} expects {} arguments, got {}",
            function.signature(),
            function.inputs.len(),
            args.len()
        )));
    }
    function
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| AbiError::Encoding(format!("{}: {e}", function.signature())))
}

/// Decode `data` returned by `function`.
///
/// # Errors
///
/// [`AbiError::Decoding`] when `data` does not have the shape of the declared
/// outputs.
pub fn decode(function: &Function, data: &[u8]) -> Result<DynSolValue> {
    let mut values = function
        .abi_decode_output(data)
        .map_err(|e| AbiError::Decoding(format!("{}: {e}", function.signature())))?;
    if values.len() == 1 {
        return Ok(values.remove(0));
    }
    Ok(DynSolValue::Tuple(values))
}

/// Coerce textual arguments into typed values for `function`'s inputs.
///
/// Accepts the usual Solidity literal forms (`123`, `0xabc...`, `true`,
/// `[1,2]`, `(1,0x..)`).
pub fn coerce_args(function: &Function, raw: &[String]) -> Result<Vec<DynSolValue>> {
    if raw.len() != function.inputs.len() {
        return Err(AbiError::Encoding(format!(
            "{} expects {} arguments, got {}",
            function.signature(),
            function.inputs.len(),
            raw.len()
        )));
    }
    function
        .inputs
        .iter()
        .zip(raw)
        .map(|(param, text)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| AbiError::Signature(format!("{}: {e}", param.ty)))?;
            ty.coerce_str(text).map_err(|e| {
                AbiError::Encoding(format!("argument {text:?} as {}: {e}", ty.sol_type_name()))
            })
        })
        .collect()
}

/// Render a decoded value for display.
pub fn render(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", hex::encode(&word.as_slice()[..(*size).min(32)]))
        }
        DynSolValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        DynSolValue::String(s) => format!("{s:?}"),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", inner.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("({})", inner.join(", "))
        }
        other => format!("{other:?}"),
    }
}
