// src/hub/protocol.rs

//! Wire messages exchanged with the dashboard hub.
//!
//! Each frame is one JSON object tagged by `method`, mirroring the hub
//! method names the dashboard already implements.

use serde::{Deserialize, Serialize};

/// Messages sent by the engine to the dashboard. Fire-and-forget:
/// nothing here ever blocks or fails the dispatch path.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    SendSystemStatusUpdate { state: String, message: String },

    #[serde(rename_all = "camelCase")]
    SendJobUpdate {
        job_id: String,
        status: String,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    SendQueueUpdate { payload: serde_json::Value },

    #[serde(rename_all = "camelCase")]
    SendLogUpdate { line: String },
}

impl OutboundMessage {
    pub fn system_status(state: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundMessage::SendSystemStatusUpdate {
            state: state.into(),
            message: message.into(),
        }
    }

    pub fn job_update(
        job_id: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        OutboundMessage::SendJobUpdate {
            job_id: job_id.into(),
            status: status.into(),
            message: message.into(),
        }
    }

    pub fn queue_update(payload: serde_json::Value) -> Self {
        OutboundMessage::SendQueueUpdate { payload }
    }

    pub fn log_update(line: impl Into<String>) -> Self {
        OutboundMessage::SendLogUpdate { line: line.into() }
    }
}

/// Commands received from the dashboard.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method")]
pub enum InboundMessage {
    #[serde(rename_all = "camelCase")]
    ReceiveRetryJobCommand { job_id: String },
}
