//! Wire messages exchanged with the mobile and HMI peers.
//!
//! Every message is one JSON object per line with a `type` tag. Inbound
//! messages are read from stdin, outbound messages are written to stdout.

use crate::broker::error::Result;
use core::time::Duration;
use msgchain::{ConnectionKey, HmiCorrelationId, MobileCorrelationId, RequestCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a request, shared by HMI responses and mobile responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    Warnings,
    InvalidData,
    InvalidId,
    Rejected,
    Aborted,
    Disallowed,
    UnsupportedResource,
    TimedOut,
    GenericError,
}

impl ResultCode {
    /// Whether a mobile response with this code reports success.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Warnings)
    }

    const fn severity(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Warnings => 1,
            _ => 2,
        }
    }

    /// Whether `self` should replace `current` when folding leg results:
    /// warnings beat success, the first failure beats everything after it.
    pub const fn overrides(self, current: Self) -> bool {
        self.severity() > current.severity()
    }
}

/// Why an application was unregistered by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnregisterReason {
    TooManyRequests,
}

/// One HMI request a mobile request fans out to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmiLeg {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileRequest {
    pub connection_key: ConnectionKey,
    pub correlation_id: MobileCorrelationId,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub legs: Vec<HmiLeg>,
}

impl RequestCommand for MobileRequest {
    fn connection_key(&self) -> ConnectionKey {
        self.connection_key
    }

    fn correlation_id(&self) -> MobileCorrelationId {
        self.correlation_id
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmiResponse {
    pub correlation_id: HmiCorrelationId,
    pub result_code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Messages accepted on stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    MobileRequest(MobileRequest),
    HmiResponse(HmiResponse),
    Cancel {
        connection_key: ConnectionKey,
        correlation_id: MobileCorrelationId,
    },
    Unregister {
        connection_key: ConnectionKey,
    },
}

impl Inbound {
    /// Whether the message comes from the HMI side.
    pub const fn is_from_hmi(&self) -> bool {
        matches!(self, Self::HmiResponse(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileResponse {
    pub connection_key: ConnectionKey,
    pub correlation_id: MobileCorrelationId,
    pub function: String,
    pub success: bool,
    pub result_code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Messages written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    HmiRequest {
        correlation_id: HmiCorrelationId,
        method: String,
        params: Value,
    },
    MobileResponse(MobileResponse),
    AppUnregistered {
        connection_key: ConnectionKey,
        reason: UnregisterReason,
    },
}

/// Decodes one inbound line. The line is raw bytes, so input that is not
/// UTF-8 is reported like any other malformed message.
///
/// # Errors
///
/// Returns [`BrokerError::InvalidMessage`] if the line is not a known
/// message.
///
/// [`BrokerError::InvalidMessage`]: crate::broker::error::BrokerError::InvalidMessage
pub fn decode_inbound(line: impl AsRef<[u8]>) -> Result<Inbound> {
    Ok(serde_json::from_slice(line.as_ref())?)
}

/// Encodes one outbound message as a line, newline included.
///
/// # Errors
///
/// Returns [`BrokerError::InvalidMessage`] if the message cannot be
/// serialized.
///
/// [`BrokerError::InvalidMessage`]: crate::broker::error::BrokerError::InvalidMessage
pub fn encode_outbound(message: &Outbound) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::error::BrokerError;
    use serde_json::json;

    #[test]
    fn mobile_request_defaults_optional_fields() {
        let inbound = decode_inbound(
            r#"{"type":"mobile_request","connection_key":1,"correlation_id":7,"function":"Alert"}"#,
        )
        .unwrap();

        let request = match inbound {
            Inbound::MobileRequest(request) => request,
            other => panic!("expected a mobile request, got {other:?}"),
        };
        assert_eq!(request.function, "Alert");
        assert_eq!(request.timeout_ms, None);
        assert!(request.legs.is_empty());
        assert_eq!(request.timeout(), None);
    }

    #[test]
    fn mobile_request_carries_legs_and_timeout() {
        let line = json!({
            "type": "mobile_request",
            "connection_key": 1,
            "correlation_id": 7,
            "function": "Speak",
            "timeout_ms": 500,
            "legs": [
                {"method": "UI.Show", "params": {"text": "hi"}},
                {"method": "TTS.Speak"}
            ]
        })
        .to_string();

        let Inbound::MobileRequest(request) = decode_inbound(&line).unwrap() else {
            panic!("expected a mobile request");
        };
        assert_eq!(request.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(request.legs.len(), 2);
        assert_eq!(request.legs[0].params, json!({"text": "hi"}));
        assert_eq!(request.legs[1].params, Value::Null);
    }

    #[test]
    fn hmi_response_and_control_messages_decode() {
        assert_eq!(
            decode_inbound(r#"{"type":"hmi_response","correlation_id":3,"result_code":"TIMED_OUT"}"#)
                .unwrap(),
            Inbound::HmiResponse(HmiResponse {
                correlation_id: 3,
                result_code: ResultCode::TimedOut,
                info: None,
            })
        );
        assert_eq!(
            decode_inbound(r#"{"type":"cancel","connection_key":2,"correlation_id":9}"#).unwrap(),
            Inbound::Cancel {
                connection_key: 2,
                correlation_id: 9
            }
        );
        assert_eq!(
            decode_inbound(r#"{"type":"unregister","connection_key":2}"#).unwrap(),
            Inbound::Unregister { connection_key: 2 }
        );
    }

    #[test]
    fn garbage_is_an_invalid_message() {
        let lines: [&[u8]; 5] = [
            b"",
            b"not json",
            b"\xff\xfe",
            br#"{"type":"shutdown"}"#,
            br#"{"type":"cancel"}"#,
        ];
        for line in lines {
            assert!(matches!(
                decode_inbound(line),
                Err(BrokerError::InvalidMessage { .. })
            ));
        }
    }

    #[test]
    fn outbound_lines_are_tagged_and_terminated() {
        let line = encode_outbound(&Outbound::AppUnregistered {
            connection_key: 4,
            reason: UnregisterReason::TooManyRequests,
        })
        .unwrap();
        assert_eq!(
            line,
            b"{\"type\":\"app_unregistered\",\"connection_key\":4,\"reason\":\"TOO_MANY_REQUESTS\"}\n"
        );

        let line = encode_outbound(&Outbound::MobileResponse(MobileResponse {
            connection_key: 1,
            correlation_id: 2,
            function: "Alert".to_owned(),
            success: true,
            result_code: ResultCode::Success,
            info: None,
        }))
        .unwrap();
        let value: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["type"], "mobile_response");
        assert_eq!(value["result_code"], "SUCCESS");
        assert!(value.get("info").is_none());
    }

    #[test]
    fn first_failure_wins_when_folding() {
        assert!(ResultCode::Warnings.overrides(ResultCode::Success));
        assert!(ResultCode::Rejected.overrides(ResultCode::Warnings));
        assert!(!ResultCode::Aborted.overrides(ResultCode::Rejected));
        assert!(!ResultCode::Success.overrides(ResultCode::Warnings));
    }
}
