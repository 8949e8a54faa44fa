//! The Process Roster: the static list of processes a coordinator keeps alive.
//!
//! The roster file is a header-less CSV of `name,address` rows shared by every
//! node. Each node drops its own row on load.

use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use thiserror::Error;

use crate::election::NodeId;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid roster entry on line {line}: {reason}")]
    InvalidEntry { line: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub address: String,
}

impl RosterEntry {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    /// The entry's address as `host:port`, using `port` if the roster did not
    /// name one.
    pub fn endpoint(&self, port: u16) -> String {
        with_default_port(&self.address, port)
    }
}

pub fn with_default_port(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => return format!("[{ip}]:{port}"),
        Ok(IpAddr::V4(ip)) => return format!("{ip}:{port}"),
        Err(_) => {}
    }

    let has_port = address
        .rsplit_once(':')
        .map(|(_, p)| p.parse::<u16>().is_ok())
        .unwrap_or(false);

    if has_port {
        address.to_string()
    } else {
        format!("{address}:{port}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    /// Load the roster file, skipping the row named `self_name`.
    pub fn load<P: AsRef<Path>>(path: P, self_name: &str) -> Result<Self, RosterError> {
        let file = File::open(path)?;
        Self::from_reader(file, self_name)
    }

    pub fn from_reader<R: Read>(reader: R, self_name: &str) -> Result<Self, RosterError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record?;
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(idx as u64 + 1);

            if record.len() != 2 {
                return Err(RosterError::InvalidEntry {
                    line,
                    reason: format!("expected 2 fields, found {}", record.len()),
                });
            }

            let name = &record[0];
            let address = &record[1];
            if name.is_empty() || address.is_empty() {
                return Err(RosterError::InvalidEntry {
                    line,
                    reason: "name and address must not be empty".to_string(),
                });
            }

            if name == self_name {
                continue;
            }
            entries.push(RosterEntry::new(name, address));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries named `<prefix>-<id>`, i.e. the other coordination nodes.
    pub fn revivers<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (NodeId, &'a RosterEntry)> + 'a {
        self.entries.iter().filter_map(move |entry| {
            let id = entry
                .name
                .strip_prefix(prefix)?
                .strip_prefix('-')?
                .parse::<NodeId>()
                .ok()?;
            (id > 0).then_some((id, entry))
        })
    }
}
