use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Address, ObjectId, TransactionDigest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDataOptions {
    pub show_content: bool,
    pub show_owner: bool,
    #[serde(default)]
    pub show_type: bool,
}

impl ObjectDataOptions {
    /// Options needed to decode a calculation record.
    pub fn content_and_owner() -> Self {
        Self {
            show_content: true,
            show_owner: true,
            show_type: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub object_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Ownership descriptor as returned by the node: either a bare string
    /// (`"Immutable"`) or a single-key object such as `{"AddressOwner": "0x.."}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ObjectContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType")]
pub enum ObjectContent {
    #[serde(rename = "moveObject")]
    MoveObject {
        #[serde(default, rename = "type")]
        type_: String,
        #[serde(default, rename = "hasPublicTransfer")]
        has_public_transfer: bool,
        #[serde(default)]
        fields: Value,
    },
    #[serde(rename = "package")]
    Package {
        #[serde(default)]
        disassembled: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectResponse {
    #[serde(default)]
    pub data: Option<ObjectData>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(default)]
    pub object_id: Option<ObjectId>,
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedObjectRef {
    #[serde(default)]
    pub owner: Option<Value>,
    #[serde(default)]
    pub reference: Option<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEffects {
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    #[serde(default)]
    pub created: Vec<OwnedObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBlockResponse {
    pub digest: TransactionDigest,
    #[serde(default)]
    pub effects: Option<TransactionEffects>,
}

/// One object created by a settled transaction. The id is optional because
/// nodes may omit the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub object_id: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEffects {
    pub digest: TransactionDigest,
    pub status: Option<ExecutionStatus>,
    pub created: Vec<CreatedRecord>,
}

impl From<TransactionBlockResponse> for SettlementEffects {
    fn from(value: TransactionBlockResponse) -> Self {
        let effects = value.effects.unwrap_or_default();
        Self {
            digest: value.digest,
            status: effects.status,
            created: effects
                .created
                .into_iter()
                .map(|created| CreatedRecord {
                    object_id: created.reference.and_then(|reference| reference.object_id),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PureType {
    U8,
    U64,
}

/// A pure move-call argument: the decimal value for display and its BCS
/// encoding (little-endian) for the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PureArgument {
    pub value_type: PureType,
    pub value: String,
    pub bcs_b64: String,
}

impl PureArgument {
    pub fn u8(value: u8) -> Self {
        Self {
            value_type: PureType::U8,
            value: value.to_string(),
            bcs_b64: STANDARD.encode([value]),
        }
    }

    pub fn u64(value: u64) -> Self {
        Self {
            value_type: PureType::U64,
            value: value.to_string(),
            bcs_b64: STANDARD.encode(value.to_le_bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCallRequest {
    pub sender: Address,
    pub package: String,
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    pub arguments: Vec<PureArgument>,
}

impl MoveCallRequest {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignAndExecuteRequest {
    pub sender: Address,
    pub transaction: MoveCallRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignAndExecuteResponse {
    pub digest: TransactionDigest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResponse {
    #[serde(default)]
    pub address: Option<Address>,
}
