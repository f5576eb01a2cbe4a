// src/models.rs
use rust_decimal::Decimal;
use serde::Serialize;

/// Label of the synthetic node collecting sub-threshold outgoing value
pub const OTHER_SENT: &str = "Other Sent";
/// Label of the synthetic node collecting sub-threshold incoming value
pub const OTHER_RECEIVED: &str = "Other Received";

/// A single mosaic transfer pulled out of the transaction store
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal, // already scaled by divisibility
    pub hash: String,    // hex encoded transaction hash
}

impl TransferRecord {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: Decimal,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            hash: hash.into(),
        }
    }
}

/// An address (or overflow bucket) in the flow graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowNode {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub received: Decimal,
}

impl FlowNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Decimal::ZERO,
            received: Decimal::ZERO,
        }
    }
}

/// A directed edge between two node indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdge {
    pub source: usize,
    pub target: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>, // None for overflow edges
}

/// Response body consumed by the chart client. Edges go out as `links`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    #[serde(rename = "links")]
    pub edges: Vec<FlowEdge>,
}
