// protocol.rs - Request/response envelopes and the method names the embedding host answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Hello,
    Shutdown,
    Release,
    Similarity,
    LoadModel,
    Encode,
    Compare,
    LoadStatic,
    EncodeBatch,
    CompareStatic,
}

impl Method {
    pub const ALL: [Method; 10] = [
        Method::Hello,
        Method::Shutdown,
        Method::Release,
        Method::Similarity,
        Method::LoadModel,
        Method::Encode,
        Method::Compare,
        Method::LoadStatic,
        Method::EncodeBatch,
        Method::CompareStatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Shutdown => "shutdown",
            Self::Release => "release",
            Self::Similarity => "similarity",
            Self::LoadModel => "loadModel",
            Self::Encode => "encode",
            Self::Compare => "compare",
            Self::LoadStatic => "loadStatic",
            Self::EncodeBatch => "encodeBatch",
            Self::CompareStatic => "compareStatic",
        }
    }

    /// Method names are case-sensitive on the wire.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Methods that run a tokenizer or a forward pass and report `inferenceTimeMs`.
    pub fn is_inference(self) -> bool {
        matches!(
            self,
            Self::Encode | Self::Compare | Self::EncodeBatch | Self::CompareStatic
        )
    }
}

/// `{id, result}` on success, `{id, error}` on failure.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { id: String, result: Value },
    Err { id: String, error: String },
}

impl Response {
    pub fn from_outcome(id: String, outcome: anyhow::Result<Value>) -> Self {
        match outcome {
            Ok(result) => Self::Ok { id, result },
            Err(e) => Self::Err {
                id,
                error: format!("{e}"),
            },
        }
    }
}
