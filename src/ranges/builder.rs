//! Stack-based flattening of nested CIDR rows.

use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::net::Ipv6Addr;

use super::IpNode;
use crate::config::MAX_BAD_RECORDS;
use crate::error::{Error, Result};
use crate::ip::{checked_next, checked_prev, cidr_bounds, prev_ip};

/// Number of malformed rows reported at `warn` level per file.
const LOGGED_BAD_RECORDS: usize = 5;

/// Per-format row handling plugged into [`build_nodes`].
///
/// The builder owns the stack and the output list; a parser only knows how
/// to read one row of its format.
pub trait RecordParser {
    /// Payload carried by every interval of the format.
    type Payload: Clone + PartialEq;

    /// Adjust the CSV reader (delimiter, header row, quoting).
    fn configure_reader(&self, builder: &mut ReaderBuilder) {
        builder.has_headers(true);
    }

    /// Reject structurally invalid rows before any other work.
    fn validate_record(&self, record: &StringRecord) -> Result<()>;

    /// The CIDR string of the row.
    fn extract_cidr(&self, record: &StringRecord) -> Result<String>;

    /// Build the payload for the row.
    fn make_payload(&mut self, record: &StringRecord) -> Result<Self::Payload>;
}

/// Build limits.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Abort once more than this many rows failed to parse.
    pub max_bad_records: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_bad_records: MAX_BAD_RECORDS,
        }
    }
}

/// Output list of the builder. Appends merge adjacent equal payloads.
#[derive(Debug)]
pub struct NodeList<P> {
    nodes: Vec<IpNode<P>>,
}

impl<P: Clone + PartialEq> Default for NodeList<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + PartialEq> NodeList<P> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node, extending the last one instead when the two touch and
    /// carry equal payloads. Empty intervals (`high < low`) are dropped.
    pub fn append_node(&mut self, node: IpNode<P>) {
        if node.high < node.low {
            return;
        }
        if let Some(last) = self.nodes.last_mut() {
            if last.high >= prev_ip(node.low) && last.payload == node.payload {
                if node.high > last.high {
                    last.high = node.high;
                }
                return;
            }
        }
        self.nodes.push(node);
    }

    /// The most recently appended node.
    pub fn last_node_mut(&mut self) -> Option<&mut IpNode<P>> {
        self.nodes.last_mut()
    }

    /// End the last node right before `low`, dropping it if nothing is left.
    fn clip_last(&mut self, low: Ipv6Addr) {
        let Some(last) = self.last_node_mut() else {
            return;
        };
        if last.high < low {
            return;
        }
        match checked_prev(low) {
            Some(high) if high >= last.low => last.high = high,
            _ => {
                self.nodes.pop();
            }
        }
    }

    /// Emit the part of `parent` after `child`, up to `until` (exclusive)
    /// or to the end of the parent.
    fn append_tail(&mut self, child: &IpNode<P>, parent: &IpNode<P>, until: Option<Ipv6Addr>) {
        let Some(low) = checked_next(child.high) else {
            return;
        };
        let high = match until {
            Some(next_low) => match checked_prev(next_low) {
                Some(high) => high.min(parent.high),
                None => return,
            },
            None => parent.high,
        };
        self.append_node(IpNode::new(low, high, parent.payload.clone()));
    }

    pub fn into_nodes(self) -> Vec<IpNode<P>> {
        self.nodes
    }
}

/// Stream `reader` through `parser` and return sorted, disjoint intervals.
///
/// Nested CIDRs are handled when a more specific range follows its
/// enclosing range, which is how MaxMind and RouteViews files are ordered.
pub fn build_nodes<R, T>(
    reader: R,
    parser: &mut T,
    options: &BuildOptions,
) -> Result<Vec<IpNode<T::Payload>>>
where
    R: Read,
    T: RecordParser,
{
    let mut builder = ReaderBuilder::new();
    parser.configure_reader(&mut builder);
    let mut csv_reader = builder.from_reader(reader);

    let mut list = NodeList::new();
    let mut stack: Vec<IpNode<T::Payload>> = Vec::new();
    let mut record = StringRecord::new();
    let mut bad_records = 0usize;

    loop {
        let row = match csv_reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => parse_row(parser, &record),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => Err(Error::BadRecord(e.to_string())),
        };

        let node = match row {
            Ok(node) => node,
            Err(e) => {
                bad_records += 1;
                if bad_records <= LOGGED_BAD_RECORDS {
                    log::warn!("Skipping record {:?}: {}", record.position(), e);
                }
                if bad_records > options.max_bad_records {
                    return Err(Error::TooManyBadRecords {
                        count: bad_records,
                        last: e.to_string(),
                    });
                }
                continue;
            }
        };

        push_node(&mut stack, &mut list, node);
    }

    // Close whatever is still open; each parent contributes its suffix.
    while let Some(popped) = stack.pop() {
        if let Some(parent) = stack.last() {
            list.append_tail(&popped, parent, None);
        }
    }

    if bad_records > 0 {
        log::info!("Built {} intervals, skipped {} bad records", list.len(), bad_records);
    }

    Ok(list.into_nodes())
}

fn parse_row<T: RecordParser>(parser: &mut T, record: &StringRecord) -> Result<IpNode<T::Payload>> {
    parser.validate_record(record)?;
    let cidr = parser.extract_cidr(record)?;
    let (low, high) = cidr_bounds(&cidr)?;
    let payload = parser.make_payload(record)?;
    Ok(IpNode::new(low, high, payload))
}

fn push_node<P: Clone + PartialEq>(stack: &mut Vec<IpNode<P>>, list: &mut NodeList<P>, node: IpNode<P>) {
    match stack.last() {
        Some(top) if top.high < node.low => close_enclosing(stack, list, node.low),
        Some(_) => list.clip_last(node.low),
        None => {}
    }
    stack.push(node.clone());
    list.append_node(node);
}

/// Pop every open interval that ends before `next_low`, emitting the gaps
/// of their parents.
fn close_enclosing<P: Clone + PartialEq>(
    stack: &mut Vec<IpNode<P>>,
    list: &mut NodeList<P>,
    next_low: Ipv6Addr,
) {
    let Some(mut popped) = stack.pop() else {
        return;
    };
    while let Some(parent) = stack.last() {
        if next_low <= parent.high {
            list.append_tail(&popped, parent, Some(next_low));
            break;
        }
        list.append_tail(&popped, parent, None);
        popped = match stack.pop() {
            Some(node) => node,
            None => break,
        };
    }
}
