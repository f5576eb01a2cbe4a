// src/pipeline.rs
use std::str::FromStr;

use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiResult, InputValidationError};
use crate::extractor::RecordExtractor;
use crate::graph::FlowGraphBuilder;
use crate::models::FlowGraph;

/// Highest divisibility a mosaic can be defined with
pub const MAX_DIVISIBILITY: u8 = 6;
const ADDRESS_LEN: usize = 39;

/// Raw `/data` query string
#[derive(Debug, Default, Deserialize)]
pub struct FlowParams {
    pub address: Option<String>,
    pub depth: Option<String>,
    #[serde(rename = "minAmount")]
    pub min_amount: Option<String>,
    pub mosaic: Option<String>,
    pub divisibility: Option<String>,
}

/// A validated flow query
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRequest {
    pub addresses: Vec<String>,
    /// Comma-joined address set; names the main node
    pub queried: String,
    /// Accepted for compatibility, never used for aggregation
    pub depth: u32,
    pub min_amount: Decimal,
    pub mosaic_id: u64,
    pub divisibility: u8,
}

fn required<'a>(
    value: &'a Option<String>,
    param: &'static str,
) -> Result<&'a str, InputValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(InputValidationError::Missing(param)),
    }
}

fn invalid(param: &'static str, reason: impl Into<String>) -> InputValidationError {
    InputValidationError::Invalid {
        param,
        reason: reason.into(),
    }
}

/// Normalise one address to its 39-character base32 form
fn parse_address(raw: &str) -> Result<String, InputValidationError> {
    let address: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if address.is_empty() {
        return Err(invalid("address", "empty entry in address list"));
    }
    if address.len() != ADDRESS_LEN {
        return Err(invalid(
            "address",
            format!("{} is not {} characters long", raw.trim(), ADDRESS_LEN),
        ));
    }
    if !address.chars().all(|c| matches!(c, 'A'..='Z' | '2'..='7')) {
        return Err(invalid("address", format!("{} is not base32", raw.trim())));
    }
    Ok(address)
}

/// Parse a hex mosaic id, with or without `0x`
pub fn parse_mosaic_id(raw: &str) -> Result<u64, InputValidationError> {
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if hex.is_empty() || hex.len() > 16 {
        return Err(invalid("mosaic", "expected 1 to 16 hex digits"));
    }
    u64::from_str_radix(hex, 16).map_err(|e| invalid("mosaic", e.to_string()))
}

/// Plain decimal, or exponent notation as JS prints very small/large numbers
fn parse_amount(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(raw).or_else(|e| {
        if raw.contains(['e', 'E']) {
            Decimal::from_scientific(raw)
        } else {
            Err(e)
        }
    })
}

impl FlowRequest {
    pub fn parse(params: &FlowParams) -> Result<Self, InputValidationError> {
        let addresses = required(&params.address, "address")?
            .split(',')
            .map(parse_address)
            .collect::<Result<Vec<_>, _>>()?;

        let depth = required(&params.depth, "depth")?
            .parse::<u32>()
            .map_err(|e| invalid("depth", e.to_string()))?;

        let min_amount = parse_amount(required(&params.min_amount, "minAmount")?)
            .map_err(|e| invalid("minAmount", e.to_string()))?;
        if min_amount < Decimal::ZERO {
            return Err(invalid("minAmount", "must not be negative"));
        }

        let mosaic_id = parse_mosaic_id(required(&params.mosaic, "mosaic")?)?;

        let divisibility = match params.divisibility.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<u8>()
                .map_err(|e| invalid("divisibility", e.to_string()))?,
        };
        if divisibility > MAX_DIVISIBILITY {
            return Err(invalid(
                "divisibility",
                format!("must be at most {}", MAX_DIVISIBILITY),
            ));
        }

        Ok(Self {
            queried: addresses.join(","),
            addresses,
            depth,
            min_amount,
            mosaic_id,
            divisibility,
        })
    }
}

/// Pull the matching transfers and fold them into a flow graph. Any extraction
/// or aggregation error aborts the whole request.
pub async fn run(extractor: &dyn RecordExtractor, request: &FlowRequest) -> ApiResult<FlowGraph> {
    info!(
        "Flow request: addresses {:?}, depth {}, minAmount {}, mosaic {:016X}, divisibility {}",
        request.addresses, request.depth, request.min_amount, request.mosaic_id, request.divisibility
    );

    let mut records = extractor
        .query_transfers(&request.addresses, request.mosaic_id, request.divisibility)
        .await?;

    let mut builder = FlowGraphBuilder::new(&request.queried, request.min_amount);
    while let Some(record) = records.next().await {
        builder.push(record?)?;
    }

    let processed = builder.processed();
    let graph = builder.finish();
    info!(
        "Built flow graph for {}: {} transfers → {} nodes, {} links",
        request.queried,
        processed,
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(graph)
}
