//! Judge-worker wire protocol
//!
//! Frames are JSON arrays `[tag, payload?]` sent as text messages over the
//! worker's streaming session. This module owns encoding of outbound command
//! frames and decoding/classification of inbound ones.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::tags;
use crate::models::{CompilerRef, JudgeMode, LangRef, Limit, StatusCode, TestType};

/// Session parameters sent in `command.init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeSession {
    pub submission_id: String,
    pub lang: LangRef,
    pub compiler: CompilerRef,
    /// Inclusive 1-based testcase range judged by this worker
    pub test_range: (u32, u32),
    /// Input and output file names of each testcase
    pub test_file: (String, String),
    pub test_type: TestType,
    pub judge_mode: JudgeMode,
    /// Points awarded per accepted testcase
    pub point: f64,
    pub limit: Limit,
}

/// Outbound frames of the judge session
#[derive(Debug, Clone)]
pub enum ClientFrame {
    DeclareLanguage(String),
    DeclareCompiler(String),
    DeclareLoad,
    Status,
    Start,
    Init(Box<JudgeSession>),
    Code(String),
    Testcase {
        index: u32,
        input: String,
        output: String,
    },
    Judger(String),
    Judge,
    Abort,
}

impl ClientFrame {
    /// Encode the frame as wire text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let value = match self {
            Self::DeclareLanguage(payload) => json!(["declare.language", [payload, "false"]]),
            Self::DeclareCompiler(payload) => json!(["declare.compiler", [payload, "false"]]),
            Self::DeclareLoad => json!(["declare.load", []]),
            Self::Status => json!(["command.status"]),
            Self::Start => json!(["command.start", null]),
            Self::Init(session) => json!(["command.init", session]),
            Self::Code(source) => json!(["command.code", [source]]),
            Self::Testcase {
                index,
                input,
                output,
            } => json!(["command.testcase", [index, input, output]]),
            Self::Judger(source) => json!(["command.judger", source]),
            Self::Judge => json!(["command.judge", null]),
            Self::Abort => json!(["command.abort"]),
        };
        serde_json::to_string(&value)
    }
}

/// Demultiplexing class of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Status,
    Judge,
    Other,
}

/// An inbound frame, decoded but not yet interpreted
#[derive(Debug, Clone)]
pub struct ServerFrame {
    pub tag: String,
    pub payload: Option<Value>,
}

impl ServerFrame {
    /// Decode wire text into a frame. Fails on anything that is not a JSON
    /// array starting with a string tag.
    pub fn decode(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("invalid frame json: {e}"))?;
        let Value::Array(mut parts) = value else {
            return Err("frame is not an array".to_string());
        };
        if parts.is_empty() {
            return Err("frame is empty".to_string());
        }

        let payload = if parts.len() > 1 {
            Some(parts.remove(1))
        } else {
            None
        };
        match parts.remove(0) {
            Value::String(tag) => Ok(Self { tag, payload }),
            other => Err(format!("frame tag is not a string: {other}")),
        }
    }

    /// Which inbound channel this frame belongs to
    pub fn class(&self) -> FrameClass {
        if self.tag == tags::STATUS {
            FrameClass::Status
        } else if self.tag.starts_with(tags::JUDGE_PREFIX) {
            FrameClass::Judge
        } else {
            FrameClass::Other
        }
    }

    /// Local sentinel injected when a connection dies
    pub fn closed_sentinel() -> Self {
        Self {
            tag: tags::CLOSED.to_string(),
            payload: None,
        }
    }
}

/// Acknowledgement payload of `judge.init` and `judge.write:*` frames.
/// `status == 0` means the step succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteAck {
    pub status: i64,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WriteAck {
    pub fn ok(&self) -> bool {
        self.status == 0
    }
}

/// One testcase verdict reported by a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVerdict {
    pub index: u32,
    pub status: StatusCode,
    /// Wall time in seconds
    pub time: f64,
    /// `(average_kb, peak_kb)`
    pub memory: (f64, f64),
    pub point: f64,
}

/// An interpreted `judge.*` frame
#[derive(Debug, Clone)]
pub enum JudgeReply {
    Init(WriteAck),
    WriteCode(WriteAck),
    WriteTestcase(WriteAck),
    WriteJudger(WriteAck),
    Compiler(String),
    Result(TestVerdict),
    Overall(StatusCode),
    CompileError(String),
    SystemError(String),
    Aborted,
    Done,
    /// The connection-local sentinel for a dead transport
    ConnectionClosed,
    Unknown {
        tag: String,
        payload: Option<Value>,
    },
}

impl JudgeReply {
    /// Interpret a demultiplexed judge frame
    pub fn decode(frame: ServerFrame) -> Self {
        if frame.tag == tags::CLOSED {
            return Self::ConnectionClosed;
        }

        let Some(tag) = frame
            .tag
            .strip_prefix(tags::JUDGE_PREFIX)
            .map(str::to_string)
        else {
            return Self::Unknown {
                tag: frame.tag,
                payload: frame.payload,
            };
        };

        match tag.as_str() {
            "init" => decode_ack(frame.payload, Self::Init),
            "write:code" => decode_ack(frame.payload, Self::WriteCode),
            "write:testcase" => decode_ack(frame.payload, Self::WriteTestcase),
            "write:judger" => decode_ack(frame.payload, Self::WriteJudger),
            "compiler" => Self::Compiler(text_payload(frame.payload)),
            "result" => match frame
                .payload
                .clone()
                .map(serde_json::from_value::<TestVerdict>)
            {
                Some(Ok(verdict)) => Self::Result(verdict),
                _ => Self::Unknown {
                    tag: frame.tag,
                    payload: frame.payload,
                },
            },
            "overall" => match frame
                .payload
                .clone()
                .map(serde_json::from_value::<StatusCode>)
            {
                Some(Ok(status)) => Self::Overall(status),
                _ => Self::Unknown {
                    tag: frame.tag,
                    payload: frame.payload,
                },
            },
            "error:compiler" => Self::CompileError(text_payload(frame.payload)),
            "error:system" => Self::SystemError(text_payload(frame.payload)),
            "aborted" => Self::Aborted,
            "done" => Self::Done,
            _ => Self::Unknown {
                tag: frame.tag,
                payload: frame.payload,
            },
        }
    }
}

fn decode_ack(payload: Option<Value>, build: impl Fn(WriteAck) -> JudgeReply) -> JudgeReply {
    match payload.clone().map(serde_json::from_value::<WriteAck>) {
        Some(Ok(ack)) => build(ack),
        _ => JudgeReply::Unknown {
            tag: "malformed-ack".to_string(),
            payload,
        },
    }
}

fn text_payload(payload: Option<Value>) -> String {
    match payload {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_command_has_no_payload_slot() {
        assert_eq!(ClientFrame::Status.encode().unwrap(), r#"["command.status"]"#);
    }

    #[test]
    fn declare_frames_carry_the_raw_document() {
        let frame = ClientFrame::DeclareLanguage("[{\"name\":\"python\"}]".to_string());
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value[0], "declare.language");
        assert_eq!(value[1][1], "false");
    }

    #[test]
    fn frames_demultiplex_by_tag() {
        let status = ServerFrame::decode(r#"["status", {"status": "idle"}]"#).unwrap();
        assert_eq!(status.class(), FrameClass::Status);

        let judge = ServerFrame::decode(r#"["judge.result", {"index": 1, "status": 0, "time": 0.1, "memory": [1.0, 2.0], "point": 1.0}]"#)
            .unwrap();
        assert_eq!(judge.class(), FrameClass::Judge);

        let other = ServerFrame::decode(r#"["hello"]"#).unwrap();
        assert_eq!(other.class(), FrameClass::Other);
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"tag": "status"}"#).is_err());
        assert!(ServerFrame::decode("[]").is_err());
    }

    #[test]
    fn judge_replies_decode_by_suffix() {
        let frame = ServerFrame::decode(r#"["judge.write:testcase", {"status": 0, "index": 3}]"#)
            .unwrap();
        match JudgeReply::decode(frame) {
            JudgeReply::WriteTestcase(ack) => {
                assert!(ack.ok());
                assert_eq!(ack.index, Some(3));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let overall = ServerFrame::decode(r#"["judge.overall", 1]"#).unwrap();
        assert!(matches!(
            JudgeReply::decode(overall),
            JudgeReply::Overall(StatusCode::WrongAnswer)
        ));

        let unknown = ServerFrame::decode(r#"["judge.progress", 42]"#).unwrap();
        assert!(matches!(JudgeReply::decode(unknown), JudgeReply::Unknown { .. }));
    }
}
