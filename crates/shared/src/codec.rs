use serde_json::Value;
use tracing::debug;

use crate::{
    domain::{Address, CalculationInput, CalculationRecord, OperatorSymbol},
    protocol::{MoveCallRequest, ObjectContent, ObjectData, PureArgument},
};

pub const DEFAULT_MODULE: &str = "calc";
pub const DEFAULT_FUNCTION: &str = "calculate";

pub fn encode_operator(symbol: OperatorSymbol) -> u8 {
    symbol.code()
}

/// Total decoding: codes outside `1..=4` go through
/// [`unknown_operator_fallback`] instead of failing.
pub fn decode_operator(code: u64) -> OperatorSymbol {
    u8::try_from(code)
        .ok()
        .and_then(OperatorSymbol::from_code)
        .unwrap_or_else(|| unknown_operator_fallback(code))
}

/// Policy for operator codes the contract should never emit. Records are
/// still shown, with the operator read as addition.
pub fn unknown_operator_fallback(code: u64) -> OperatorSymbol {
    debug!(code, "codec: unknown operator code, falling back to add");
    OperatorSymbol::Add
}

/// Normalizes a user operand to the contract's `u64` domain.
pub fn clamp_operand(value: f64) -> u64 {
    if value.is_nan() {
        return 0;
    }
    // float-to-int casts saturate
    value.floor().max(0.0) as u64
}

/// Fully qualified `package::module::function` the calculator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTarget {
    pub package: String,
    pub module: String,
    pub function: String,
}

impl ContractTarget {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            module: DEFAULT_MODULE.to_string(),
            function: DEFAULT_FUNCTION.to_string(),
        }
    }
}

pub fn build_calculation_request(
    target: &ContractTarget,
    sender: Address,
    input: &CalculationInput,
) -> MoveCallRequest {
    MoveCallRequest {
        sender,
        package: target.package.clone(),
        module: target.module.clone(),
        function: target.function.clone(),
        type_arguments: Vec::new(),
        arguments: vec![
            PureArgument::u64(clamp_operand(input.a)),
            PureArgument::u64(clamp_operand(input.b)),
            PureArgument::u8(encode_operator(input.op)),
        ],
    }
}

/// Decodes a fetched object into a calculation record. Anything that does not
/// look like a complete record yields `None`.
///
/// Numeric fields must be a JSON unsigned integer or a decimal string of one.
/// A field that is present with any other value, such as `2.5`, `-1` or
/// `"abc"`, invalidates the whole record instead of being skipped.
pub fn decode_record(data: &ObjectData) -> Option<CalculationRecord> {
    let fields = match &data.content {
        Some(ObjectContent::MoveObject { fields, .. }) => fields,
        other => {
            debug!(
                object_id = %data.object_id,
                content = ?other.as_ref().map(content_kind),
                "codec: object is not a move object"
            );
            return None;
        }
    };

    let (Some(a), Some(b), Some(op), Some(result)) = (
        numeric_field(fields, "a"),
        numeric_field(fields, "b"),
        numeric_field(fields, "op"),
        numeric_field(fields, "result"),
    ) else {
        debug!(object_id = %data.object_id, "codec: calculation object is missing fields");
        return None;
    };

    let Some(owner) = data.owner.as_ref().and_then(resolve_owner) else {
        debug!(object_id = %data.object_id, "codec: owner not found on calculation object");
        return None;
    };

    Some(CalculationRecord {
        a,
        b,
        op: decode_operator(op),
        result,
        owner,
    })
}

/// Reads the owning identity out of an ownership descriptor: a plain string,
/// or the first value of a single-key object like `{"AddressOwner": "0x.."}`.
pub fn resolve_owner(owner: &Value) -> Option<String> {
    let resolved = match owner {
        Value::String(value) => value.clone(),
        Value::Object(map) => match map.values().next() {
            Some(Value::String(value)) => value.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        _ => String::new(),
    };
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// `None` for a missing field and for a value that is not a u64.
fn numeric_field(fields: &Value, name: &str) -> Option<u64> {
    match fields.get(name)? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn content_kind(content: &ObjectContent) -> &'static str {
    match content {
        ObjectContent::MoveObject { .. } => "moveObject",
        ObjectContent::Package { .. } => "package",
        ObjectContent::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::ObjectId;

    fn calculation_object(fields: Value, owner: Option<Value>) -> ObjectData {
        ObjectData {
            object_id: ObjectId::new("0xabc"),
            version: Some("7".into()),
            digest: None,
            type_: None,
            owner,
            content: Some(ObjectContent::MoveObject {
                type_: "0x79::calc::Calculation".into(),
                has_public_transfer: true,
                fields,
            }),
        }
    }

    fn full_fields() -> Value {
        json!({ "a": "6", "b": "3", "op": 4, "result": "2", "id": { "id": "0xabc" } })
    }

    #[test]
    fn operator_codes_round_trip() {
        for symbol in OperatorSymbol::ALL {
            assert_eq!(decode_operator(u64::from(encode_operator(symbol))), symbol);
        }
    }

    #[test]
    fn unknown_operator_codes_fall_back_to_add() {
        for code in [0, 5, 255, 256, u64::MAX] {
            assert_eq!(decode_operator(code), OperatorSymbol::Add);
        }
    }

    #[test]
    fn clamps_negative_and_fractional_operands() {
        assert_eq!(clamp_operand(-5.0), 0);
        assert_eq!(clamp_operand(2.9), 2);
        assert_eq!(clamp_operand(f64::NAN), 0);
        assert_eq!(clamp_operand(f64::INFINITY), u64::MAX);
    }

    #[test]
    fn builds_request_with_clamped_operands_and_operator_code() {
        let target = ContractTarget::new("0x79");
        let request = build_calculation_request(
            &target,
            Address::new("0xsender"),
            &CalculationInput::new(-5.0, 2.9, OperatorSymbol::Add),
        );

        assert_eq!(request.target(), "0x79::calc::calculate");
        assert_eq!(request.arguments[0], PureArgument::u64(0));
        assert_eq!(request.arguments[1], PureArgument::u64(2));
        assert_eq!(request.arguments[2], PureArgument::u8(1));
        assert_eq!(request.arguments[1].bcs_b64, "AgAAAAAAAAA=");
    }

    #[test]
    fn decodes_complete_record_with_structured_owner() {
        let data = calculation_object(full_fields(), Some(json!({ "AddressOwner": "0xowner" })));
        let record = decode_record(&data).expect("record");
        assert_eq!(
            record,
            CalculationRecord {
                a: 6,
                b: 3,
                op: OperatorSymbol::Divide,
                result: 2,
                owner: "0xowner".into(),
            }
        );
    }

    #[test]
    fn decodes_record_with_string_owner() {
        let data = calculation_object(full_fields(), Some(json!("Immutable")));
        assert_eq!(decode_record(&data).expect("record").owner, "Immutable");
    }

    #[test]
    fn rejects_missing_or_non_move_content() {
        let mut data = calculation_object(full_fields(), Some(json!({ "AddressOwner": "0x1" })));
        data.content = None;
        assert!(decode_record(&data).is_none());

        data.content = Some(ObjectContent::Package {
            disassembled: json!({}),
        });
        assert!(decode_record(&data).is_none());

        data.content = Some(ObjectContent::Unknown);
        assert!(decode_record(&data).is_none());
    }

    #[test]
    fn rejects_each_missing_required_field() {
        for missing in ["a", "b", "op", "result"] {
            let mut fields = full_fields();
            fields.as_object_mut().expect("object").remove(missing);
            let data = calculation_object(fields, Some(json!({ "AddressOwner": "0x1" })));
            assert!(decode_record(&data).is_none(), "field {missing} should be required");
        }
    }

    #[test]
    fn rejects_present_but_non_integer_fields() {
        for bad in [json!(2.5), json!(-1), json!("abc"), json!("-4"), json!(true)] {
            let mut fields = full_fields();
            fields["b"] = bad.clone();
            let object = calculation_object(fields, Some(json!("0xsender")));
            assert_eq!(decode_record(&object), None, "field b = {bad}");
        }
    }

    #[test]
    fn accepts_padded_decimal_strings() {
        let mut fields = full_fields();
        fields["a"] = json!(" 6 ");
        let object = calculation_object(fields, Some(json!("0xsender")));
        assert_eq!(decode_record(&object).map(|record| record.a), Some(6));
    }

    #[test]
    fn rejects_unresolvable_owner() {
        let owners = [
            None,
            Some(json!("")),
            Some(json!({})),
            Some(json!({ "AddressOwner": null })),
            Some(json!(42)),
        ];
        for owner in owners {
            let data = calculation_object(full_fields(), owner.clone());
            assert!(decode_record(&data).is_none(), "owner {owner:?} should be rejected");
        }
    }

    #[test]
    fn shared_owner_resolves_to_its_descriptor() {
        let owner = json!({ "Shared": { "initial_shared_version": 3 } });
        assert_eq!(
            resolve_owner(&owner).as_deref(),
            Some(r#"{"initial_shared_version":3}"#)
        );
    }

    #[test]
    fn object_content_deserializes_from_node_json() {
        let raw = json!({
            "objectId": "0xabc",
            "version": "12",
            "owner": { "AddressOwner": "0xowner" },
            "content": {
                "dataType": "moveObject",
                "type": "0x79::calc::Calculation",
                "hasPublicTransfer": true,
                "fields": { "a": "1", "b": "2", "op": 3, "result": "2" }
            }
        });
        let data: ObjectData = serde_json::from_value(raw).expect("object data");
        let record = decode_record(&data).expect("record");
        assert_eq!(record.op, OperatorSymbol::Multiply);
        assert_eq!(record.result, 2);
    }
}
