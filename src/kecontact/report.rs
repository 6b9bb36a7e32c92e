use std::fmt;

use serde_json::{Map, Value};

use crate::kecontact::ParseError;

/// One parsed report: field name to JSON value.
pub type Report = Map<String, Value>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReportId {
    R1 = 1,
    R2 = 2,
    R3 = 3,
}

impl ReportId {
    /// In lookup precedence order.
    pub const ALL: [ReportId; 3] = [ReportId::R1, ReportId::R2, ReportId::R3];

    /// Request text asking the device for this report.
    pub fn request(&self) -> String {
        format!("report {}", *self as u8)
    }

    fn slot(&self) -> usize {
        *self as usize - 1
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Parse a report datagram. Only a JSON object is a report.
pub fn parse_report(data: &[u8]) -> Result<Report, ParseError> {
    match serde_json::from_slice::<Value>(data)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

/// The latest report per number. A new report replaces the slot wholesale.
#[derive(Debug, Default, Clone)]
pub struct ReportStore {
    slots: [Option<Report>; 3],
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report` in slot `id`, or clear the slot with `None`.
    pub fn set_report(&mut self, id: ReportId, report: Option<Report>) {
        self.slots[id.slot()] = report;
    }

    /// First hit over reports 1, 2, 3.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.slots
            .iter()
            .flatten()
            .find_map(|report| report.get(name))
    }

    pub fn all_reports_present(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}
