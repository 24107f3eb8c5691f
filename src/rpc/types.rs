//! RPC response shapes
//!
//! Every response carries `success`. On the wire they are plain JSON objects:
//!
//! ```text
//! ping    {"success":true}
//! height  {"success":true,"height":12}
//! status  {"success":true,"height":12,"broadhash":"198f..."}
//! list    {"success":true,"peers":[...]}
//! failure {"success":false,"error":"...","code":"UnknownProcedure"}
//! ```

use serde::{Deserialize, Serialize};

use super::Procedure;
use crate::types::{BlockHeight, PeerRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeightResponse {
    pub success: bool,
    pub height: BlockHeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusResponse {
    pub success: bool,
    pub height: BlockHeight,
    pub broadhash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub success: bool,
    pub peers: Vec<PeerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// Any RPC result
///
/// Untagged: variants are tried in order, so the shapes with more required
/// fields come first and `Ping` (just `success`) comes last. The narrow shapes
/// deny unknown fields, so a body that fails its own shape is an error rather
/// than a smaller response with data dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Status(StatusResponse),
    Height(HeightResponse),
    List(ListResponse),
    Failure(FailureResponse),
    Ping(PingResponse),
}

impl RpcResponse {
    pub fn ping() -> Self {
        RpcResponse::Ping(PingResponse { success: true })
    }

    pub fn height(height: BlockHeight) -> Self {
        RpcResponse::Height(HeightResponse {
            success: true,
            height,
        })
    }

    pub fn status(height: BlockHeight, broadhash: String) -> Self {
        RpcResponse::Status(StatusResponse {
            success: true,
            height,
            broadhash,
        })
    }

    pub fn list(peers: Vec<PeerRecord>) -> Self {
        RpcResponse::List(ListResponse {
            success: true,
            peers,
        })
    }

    pub fn failure(code: &str, error: String) -> Self {
        RpcResponse::Failure(FailureResponse {
            success: false,
            error,
            code: code.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        match self {
            RpcResponse::Ping(r) => r.success,
            RpcResponse::Height(r) => r.success,
            RpcResponse::Status(r) => r.success,
            RpcResponse::List(r) => r.success,
            RpcResponse::Failure(r) => r.success,
        }
    }

    /// Whether this is a shape `procedure` may answer with
    ///
    /// A failure can answer any call.
    pub fn answers(&self, procedure: Procedure) -> bool {
        matches!(
            (self, procedure),
            (RpcResponse::Failure(_), _)
                | (RpcResponse::Ping(_), Procedure::Ping)
                | (RpcResponse::Height(_), Procedure::Height)
                | (RpcResponse::Status(_), Procedure::Status)
                | (RpcResponse::List(_), Procedure::List)
        )
    }

    /// Height carried by a `height` or `status` response
    pub fn height_value(&self) -> Option<BlockHeight> {
        match self {
            RpcResponse::Height(r) => Some(r.height),
            RpcResponse::Status(r) => Some(r.height),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(RpcResponse::ping()).unwrap(),
            serde_json::json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(RpcResponse::height(12)).unwrap(),
            serde_json::json!({"success": true, "height": 12})
        );
        assert_eq!(
            serde_json::to_value(RpcResponse::list(vec![])).unwrap(),
            serde_json::json!({"success": true, "peers": []})
        );

        let failure = serde_json::to_value(RpcResponse::failure("SessionNotReady", "x".into())).unwrap();
        assert_eq!(failure["success"], false);
        assert_eq!(failure["code"], "SessionNotReady");
    }

    #[test]
    fn test_untagged_decoding_picks_right_shape() {
        let decode = |v: serde_json::Value| serde_json::from_value::<RpcResponse>(v).unwrap();

        assert!(matches!(decode(serde_json::json!({"success": true})), RpcResponse::Ping(_)));
        assert!(matches!(
            decode(serde_json::json!({"success": true, "height": 3})),
            RpcResponse::Height(_)
        ));
        assert!(matches!(
            decode(serde_json::json!({"success": true, "height": 3, "broadhash": "ab"})),
            RpcResponse::Status(_)
        ));
        assert!(matches!(
            decode(serde_json::json!({"success": true, "peers": []})),
            RpcResponse::List(_)
        ));
        assert!(matches!(
            decode(serde_json::json!({"success": false, "error": "e", "code": "c"})),
            RpcResponse::Failure(_)
        ));
    }

    #[test]
    fn test_broken_list_is_not_read_as_ping() {
        // Peer with an unknown state code
        let body = serde_json::json!({
            "success": true,
            "peers": [{"ip": "1.2.3.4", "wsPort": 1, "state": 9}]
        });
        assert!(serde_json::from_value::<RpcResponse>(body).is_err());

        let extra = serde_json::json!({"success": true, "height": 3, "peers": "x"});
        assert!(serde_json::from_value::<RpcResponse>(extra).is_err());
    }

    #[test]
    fn test_answers_matches_procedure() {
        assert!(RpcResponse::ping().answers(Procedure::Ping));
        assert!(!RpcResponse::ping().answers(Procedure::List));
        assert!(RpcResponse::list(vec![]).answers(Procedure::List));
        assert!(!RpcResponse::height(1).answers(Procedure::Status));
        assert!(RpcResponse::failure("UnknownProcedure", "x".into()).answers(Procedure::Height));
    }
}
