//! Gateway response DTOs

use serde::Serialize;

/// Response to a judge admission
#[derive(Debug, Serialize)]
pub struct AdmitResponse {
    /// `<submission_id>:<run_id>`; subscribe to it over the judge socket
    pub queue_id: String,
    pub message: String,
}

/// Response to a server registration
#[derive(Debug, Serialize)]
pub struct ServerAddedResponse {
    pub id: String,
    pub name: String,
    pub uri: String,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
