// src/graph.rs
use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::AggregationError;
use crate::models::{FlowEdge, FlowGraph, FlowNode, TransferRecord, OTHER_RECEIVED, OTHER_SENT};

/// Incremental fold of transfer records into a flow graph.
///
/// The queried address is seeded as the first node. Every record gets a node
/// for its sender and recipient; records at or above `min_amount` become
/// direct edges, smaller ones touching the queried address are pooled into the
/// "Other Sent" / "Other Received" buckets emitted by [`finish`].
///
/// Dropping a builder before `finish` discards the partial graph.
///
/// [`finish`]: FlowGraphBuilder::finish
pub struct FlowGraphBuilder {
    queried: String,
    min_amount: Decimal,
    main_index: usize,
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
    index: HashMap<String, usize>,
    other_sent: Decimal,
    other_received: Decimal,
    processed: usize,
}

impl FlowGraphBuilder {
    pub fn new(queried: impl Into<String>, min_amount: Decimal) -> Self {
        let queried = queried.into();
        let mut builder = Self {
            queried: queried.clone(),
            min_amount,
            main_index: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
            index: HashMap::new(),
            other_sent: Decimal::ZERO,
            other_received: Decimal::ZERO,
            processed: 0,
        };
        builder.main_index = builder.node_index(&queried);
        builder
    }

    fn node_index(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        debug!("Creating new node for {}", name);
        let idx = self.nodes.len();
        self.nodes.push(FlowNode::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Fold one record in. Malformed records abort the build.
    pub fn push(&mut self, record: TransferRecord) -> Result<(), AggregationError> {
        let position = self.processed;
        validate(position, &record)?;
        self.processed += 1;

        debug!(
            "Processing transfer #{}: {} -> {} ({})",
            position + 1,
            record.sender,
            record.recipient,
            record.amount
        );

        let sender = self.node_index(&record.sender);
        let recipient = self.node_index(&record.recipient);

        if record.amount >= self.min_amount {
            self.nodes[sender].sent += record.amount;
            self.nodes[recipient].received += record.amount;
            self.edges.push(FlowEdge {
                source: sender,
                target: recipient,
                value: record.amount,
                hash: Some(record.hash),
            });
            return Ok(());
        }

        if record.sender == self.queried {
            self.other_sent += record.amount;
        }
        if record.recipient == self.queried {
            self.other_received += record.amount;
        }
        Ok(())
    }

    /// Number of records folded so far
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Append the overflow buckets and hand back the finished graph
    pub fn finish(mut self) -> FlowGraph {
        if self.other_sent > Decimal::ZERO {
            let idx = self.nodes.len();
            self.nodes.push(FlowNode {
                name: OTHER_SENT.to_string(),
                sent: self.other_sent,
                received: Decimal::ZERO,
            });
            self.edges.push(FlowEdge {
                source: self.main_index,
                target: idx,
                value: self.other_sent,
                hash: None,
            });
        }

        if self.other_received > Decimal::ZERO {
            let idx = self.nodes.len();
            self.nodes.push(FlowNode {
                name: OTHER_RECEIVED.to_string(),
                sent: Decimal::ZERO,
                received: self.other_received,
            });
            self.edges.push(FlowEdge {
                source: idx,
                target: self.main_index,
                value: self.other_received,
                hash: None,
            });
        }

        FlowGraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

fn validate(index: usize, record: &TransferRecord) -> Result<(), AggregationError> {
    if record.sender.is_empty() {
        return Err(AggregationError::EmptyAddress {
            index,
            hash: record.hash.clone(),
            field: "sender",
        });
    }
    if record.recipient.is_empty() {
        return Err(AggregationError::EmptyAddress {
            index,
            hash: record.hash.clone(),
            field: "recipient",
        });
    }
    if record.amount < Decimal::ZERO {
        return Err(AggregationError::NegativeAmount {
            index,
            hash: record.hash.clone(),
            amount: record.amount.to_string(),
        });
    }
    Ok(())
}

/// Build a flow graph from an already materialized record sequence
pub fn build_flow_graph<I>(
    queried: &str,
    records: I,
    min_amount: Decimal,
) -> Result<FlowGraph, AggregationError>
where
    I: IntoIterator<Item = TransferRecord>,
{
    let mut builder = FlowGraphBuilder::new(queried, min_amount);
    for record in records {
        builder.push(record)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn rec(sender: &str, recipient: &str, amount: i64, hash: &str) -> TransferRecord {
        TransferRecord::new(sender, recipient, dec(amount), hash)
    }

    fn edge(source: usize, target: usize, value: i64, hash: Option<&str>) -> FlowEdge {
        FlowEdge {
            source,
            target,
            value: dec(value),
            hash: hash.map(str::to_string),
        }
    }

    fn names(graph: &FlowGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_only_the_main_node() {
        let graph = build_flow_graph("A", Vec::<TransferRecord>::new(), dec(10)).unwrap();
        assert_eq!(graph.nodes, vec![FlowNode::new("A")]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn sub_threshold_receipt_goes_to_other_received() {
        let records = vec![
            rec("A", "B", 15, "h1"),
            rec("B", "A", 3, "h2"),
            rec("A", "C", 20, "h3"),
        ];
        let graph = build_flow_graph("A", records, dec(10)).unwrap();

        assert_eq!(names(&graph), vec!["A", "B", "C", OTHER_RECEIVED]);
        assert_eq!(
            graph.edges,
            vec![
                edge(0, 1, 15, Some("h1")),
                edge(0, 2, 20, Some("h3")),
                edge(3, 0, 3, None),
            ]
        );
        assert_eq!(graph.nodes[0].sent, dec(35));
        assert_eq!(graph.nodes[0].received, Decimal::ZERO);
        assert_eq!(graph.nodes[3].received, dec(3));
        assert_eq!(graph.nodes[3].sent, Decimal::ZERO);
    }

    #[test]
    fn sub_threshold_sends_go_to_other_sent() {
        let records = vec![rec("A", "B", 2, "h1"), rec("A", "C", 4, "h2")];
        let graph = build_flow_graph("A", records, dec(5)).unwrap();

        assert_eq!(names(&graph), vec!["A", "B", "C", OTHER_SENT]);
        assert_eq!(graph.edges, vec![edge(0, 3, 6, None)]);
        assert_eq!(graph.nodes[3].sent, dec(6));
        // counterparties still get nodes, but no totals
        assert_eq!(graph.nodes[1], FlowNode::new("B"));
    }

    #[test]
    fn small_transfers_between_counterparties_are_dropped() {
        let records = vec![rec("B", "C", 1, "h1")];
        let graph = build_flow_graph("A", records, dec(5)).unwrap();

        assert_eq!(names(&graph), vec!["A", "B", "C"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn zero_threshold_never_creates_overflow_nodes() {
        let records = vec![rec("A", "B", 0, "h1"), rec("B", "A", 1, "h2")];
        let graph = build_flow_graph("A", records, Decimal::ZERO).unwrap();

        assert_eq!(names(&graph), vec!["A", "B"]);
        assert_eq!(
            graph.edges,
            vec![edge(0, 1, 0, Some("h1")), edge(1, 0, 1, Some("h2"))]
        );
    }

    #[test]
    fn self_transfer_below_threshold_counts_on_both_sides() {
        let graph = build_flow_graph("A", vec![rec("A", "A", 2, "h1")], dec(5)).unwrap();

        assert_eq!(names(&graph), vec!["A", OTHER_SENT, OTHER_RECEIVED]);
        assert_eq!(graph.edges, vec![edge(0, 1, 2, None), edge(2, 0, 2, None)]);
    }

    #[test]
    fn self_loop_above_threshold_is_kept() {
        let graph = build_flow_graph("A", vec![rec("A", "A", 7, "h1")], dec(5)).unwrap();

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].sent, dec(7));
        assert_eq!(graph.nodes[0].received, dec(7));
        assert_eq!(graph.edges, vec![edge(0, 0, 7, Some("h1"))]);
    }

    #[test]
    fn repeated_hash_produces_one_edge_per_record() {
        let records = vec![rec("A", "B", 10, "h1"), rec("A", "B", 12, "h1")];
        let graph = build_flow_graph("A", records, dec(1)).unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.nodes[1].received, dec(22));
    }

    #[test]
    fn totals_match_edge_sums_for_address_nodes() {
        let records = vec![
            rec("A", "B", 15, "h1"),
            rec("B", "C", 11, "h2"),
            rec("C", "A", 30, "h3"),
            rec("B", "A", 4, "h4"),
            rec("A", "D", 1, "h5"),
            rec("D", "B", 50, "h6"),
        ];
        let graph = build_flow_graph("A", records, dec(10)).unwrap();

        for (idx, node) in graph.nodes.iter().enumerate() {
            if node.name == OTHER_SENT || node.name == OTHER_RECEIVED {
                continue;
            }
            let direct = graph.edges.iter().filter(|e| e.hash.is_some());
            let out: Decimal = direct.clone().filter(|e| e.source == idx).map(|e| e.value).sum();
            let inc: Decimal = direct.filter(|e| e.target == idx).map(|e| e.value).sum();
            assert_eq!(out, node.sent, "sent mismatch for {}", node.name);
            assert_eq!(inc, node.received, "received mismatch for {}", node.name);
        }
    }

    #[test]
    fn each_record_lands_in_exactly_one_place() {
        let records = vec![
            rec("A", "B", 15, "h1"),
            rec("B", "A", 3, "h2"),
            rec("A", "C", 9, "h3"),
            rec("C", "B", 2, "h4"),
        ];
        let graph = build_flow_graph("A", records.clone(), dec(10)).unwrap();

        let direct: Vec<&str> = graph
            .edges
            .iter()
            .filter_map(|e| e.hash.as_deref())
            .collect();
        assert_eq!(direct, vec!["h1"]);

        let other = |name: &str| {
            graph
                .nodes
                .iter()
                .find(|n| n.name == name)
                .map(|n| n.sent + n.received)
                .unwrap_or_default()
        };
        assert_eq!(other(OTHER_SENT), dec(9));
        assert_eq!(other(OTHER_RECEIVED), dec(3));
    }

    #[test]
    fn rebuilding_the_same_input_is_identical() {
        let records = vec![
            rec("A", "B", 15, "h1"),
            rec("C", "A", 1, "h2"),
            rec("B", "C", 20, "h3"),
        ];
        let first = build_flow_graph("A", records.clone(), dec(10)).unwrap();
        let second = build_flow_graph("A", records, dec(10)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn totals_do_not_depend_on_record_order() {
        let records = vec![
            rec("A", "B", 15, "h1"),
            rec("B", "A", 3, "h2"),
            rec("A", "C", 20, "h3"),
            rec("C", "B", 12, "h4"),
            rec("A", "B", 1, "h5"),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let forward = build_flow_graph("A", records, dec(10)).unwrap();
        let backward = build_flow_graph("A", reversed, dec(10)).unwrap();

        let totals = |graph: &FlowGraph| {
            let mut all: Vec<(String, Decimal, Decimal)> = graph
                .nodes
                .iter()
                .map(|n| (n.name.clone(), n.sent, n.received))
                .collect();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            all
        };
        assert_eq!(totals(&forward), totals(&backward));
    }

    #[test]
    fn fractional_amounts_sum_exactly() {
        let records = vec![
            TransferRecord::new("A", "B", Decimal::new(1, 1), "h1"),
            TransferRecord::new("A", "B", Decimal::new(2, 1), "h2"),
        ];
        let graph = build_flow_graph("A", records, dec(1)).unwrap();

        assert_eq!(graph.nodes[2].name, OTHER_SENT);
        assert_eq!(graph.nodes[2].sent, Decimal::new(3, 1));
    }

    #[test]
    fn malformed_records_fail_fast() {
        let records = vec![rec("A", "B", 15, "h1"), rec("", "A", 3, "h2")];
        let err = build_flow_graph("A", records, dec(10)).unwrap_err();
        assert_eq!(
            err,
            AggregationError::EmptyAddress {
                index: 1,
                hash: "h2".into(),
                field: "sender"
            }
        );

        let err = build_flow_graph("A", vec![rec("A", "B", -1, "h3")], dec(10)).unwrap_err();
        assert!(matches!(err, AggregationError::NegativeAmount { index: 0, .. }));

        let err = build_flow_graph("A", vec![rec("A", "", 1, "h4")], dec(10)).unwrap_err();
        assert!(matches!(err, AggregationError::EmptyAddress { field: "recipient", .. }));
    }

    #[test]
    fn builder_counts_processed_records() {
        let mut builder = FlowGraphBuilder::new("A", dec(10));
        builder.push(rec("A", "B", 15, "h1")).unwrap();
        builder.push(rec("B", "A", 1, "h2")).unwrap();
        assert_eq!(builder.processed(), 2);
        assert_eq!(builder.finish().nodes.len(), 3);
    }
}
