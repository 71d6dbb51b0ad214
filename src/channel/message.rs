//! Channel frames.
//!
//! Each frame on the wire is a JSON text frame `[event_name, payload]`.
//! `connect` and `disconnect` never travel on the wire; the transport
//! synthesizes them when the connection opens or drops.

use serde::Deserialize;
use serde_json::{json, Value};
use crate::core::{ImportError, ProgressSnapshot, Result, UploadId};

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_SUBSCRIBE: &str = "import:subscribe";
pub const EVENT_SUBSCRIBED: &str = "import:subscribed";
pub const EVENT_PROGRESS: &str = "import:progress";

/// Server to client events, plus the transport's connect/disconnect.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connect,
    Disconnect {
        reason: String,
    },
    Subscribed {
        upload_id: Option<UploadId>,
    },
    Progress(ProgressSnapshot),
    Other {
        name: String,
        payload: Value,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribedAck {
    upload_id: Option<UploadId>,
}

impl ChannelEvent {
    pub fn name(&self) -> &str {
        match self {
            ChannelEvent::Connect => EVENT_CONNECT,
            ChannelEvent::Disconnect { .. } => EVENT_DISCONNECT,
            ChannelEvent::Subscribed { .. } => EVENT_SUBSCRIBED,
            ChannelEvent::Progress(_) => EVENT_PROGRESS,
            ChannelEvent::Other { name, .. } => name,
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let frame: Value = serde_json::from_str(text)?;
        let mut parts = match frame {
            Value::Array(parts) => parts.into_iter(),
            _ => return Err(ImportError::Channel("frame is not an event array".to_string())),
        };

        let name = match parts.next() {
            Some(Value::String(name)) => name,
            _ => return Err(ImportError::Channel("frame has no event name".to_string())),
        };
        let payload = parts.next().unwrap_or(Value::Null);

        let event = match name.as_str() {
            EVENT_SUBSCRIBED => {
                // The ack carries no required fields; anything that is not an
                // object with an id is still a plain acknowledgement.
                let upload_id = serde_json::from_value::<SubscribedAck>(payload)
                    .ok()
                    .and_then(|ack| ack.upload_id);
                ChannelEvent::Subscribed { upload_id }
            }
            EVENT_PROGRESS => ChannelEvent::Progress(serde_json::from_value(payload)?),
            _ => ChannelEvent::Other { name, payload },
        };

        Ok(event)
    }
}

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Subscribe {
        upload_id: UploadId,
    },
}

impl OutboundMessage {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundMessage::Subscribe { .. } => EVENT_SUBSCRIBE,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let payload = match self {
            OutboundMessage::Subscribe { upload_id } => json!({ "uploadId": upload_id }),
        };
        Ok(serde_json::to_string(&json!([self.name(), payload]))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stage;

    #[test]
    fn test_subscribe_encodes_as_event_array() {
        let message = OutboundMessage::Subscribe {
            upload_id: UploadId::from("abc123"),
        };
        let text = message.encode().unwrap();
        assert_eq!(text, r#"["import:subscribe",{"uploadId":"abc123"}]"#);
    }

    #[test]
    fn test_decode_progress() {
        let text = r#"["import:progress",{"uploadId":"abc123","total":500,"processed":250,
            "percentage":50,"inserted":240,"duplicates":8,"errors":2,"remaining":250,"stage":"inserting"}]"#;
        let event = ChannelEvent::decode(text).unwrap();
        match event {
            ChannelEvent::Progress(snapshot) => {
                assert_eq!(snapshot.upload_id, Some(UploadId::from("abc123")));
                assert_eq!(snapshot.stage, Stage::Inserting);
                assert_eq!(snapshot.processed, 250);
                assert_eq!(snapshot.percentage, 50.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_progress_without_upload_id() {
        let text = r#"["import:progress",{"total":10,"processed":0,"percentage":0,
            "inserted":0,"duplicates":0,"errors":0,"remaining":10,"stage":"parsing"}]"#;
        match ChannelEvent::decode(text).unwrap() {
            ChannelEvent::Progress(snapshot) => assert!(snapshot.upload_id.is_none()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_subscribed_ack_variants() {
        let with_id = ChannelEvent::decode(r#"["import:subscribed",{"uploadId":"abc123"}]"#).unwrap();
        assert_eq!(with_id, ChannelEvent::Subscribed { upload_id: Some(UploadId::from("abc123")) });

        let bare = ChannelEvent::decode(r#"["import:subscribed"]"#).unwrap();
        assert_eq!(bare, ChannelEvent::Subscribed { upload_id: None });

        let flag = ChannelEvent::decode(r#"["import:subscribed",true]"#).unwrap();
        assert_eq!(flag, ChannelEvent::Subscribed { upload_id: None });
    }

    #[test]
    fn test_decode_unknown_event_is_kept() {
        let event = ChannelEvent::decode(r#"["lead:assigned",{"id":7}]"#).unwrap();
        assert_eq!(event.name(), "lead:assigned");
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(ChannelEvent::decode("not json").is_err());
        assert!(ChannelEvent::decode(r#"{"event":"import:progress"}"#).is_err());
        assert!(ChannelEvent::decode(r#"[42]"#).is_err());
        assert!(ChannelEvent::decode(r#"["import:progress",{"stage":"exploding"}]"#).is_err());
    }
}
