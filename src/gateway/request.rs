//! Gateway request DTOs

use serde::Deserialize;
use validator::Validate;

/// Register a judge server
#[derive(Debug, Deserialize, Validate)]
pub struct AddServerRequest {
    /// Server id; assigned by the registry when omitted
    pub id: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub name: String,

    /// WebSocket endpoint of the worker
    #[validate(length(min = 1, max = 512))]
    pub uri: String,
}
