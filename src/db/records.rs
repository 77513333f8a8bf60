//! Immutable row snapshots returned by the table accessors, plus the input
//! structs callers fill in for inserts and updates.

use chrono::NaiveDateTime;
use rusqlite::Row;
use serde::Serialize;

/// Risk ordinal stored in `alert.risk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Info,
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn from_ordinal(value: i32) -> Option<Self> {
        match value {
            0 => Some(Risk::Info),
            1 => Some(Risk::Low),
            2 => Some(Risk::Medium),
            3 => Some(Risk::High),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i32 {
        match self {
            Risk::Info => 0,
            Risk::Low => 1,
            Risk::Medium => 2,
            Risk::High => 3,
        }
    }
}

/// Confidence ordinal stored in `alert.confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    FalsePositive,
    Low,
    Medium,
    High,
    UserConfirmed,
}

impl Confidence {
    pub fn from_ordinal(value: i32) -> Option<Self> {
        match value {
            0 => Some(Confidence::FalsePositive),
            1 => Some(Confidence::Low),
            2 => Some(Confidence::Medium),
            3 => Some(Confidence::High),
            4 => Some(Confidence::UserConfirmed),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i32 {
        match self {
            Confidence::FalsePositive => 0,
            Confidence::Low => 1,
            Confidence::Medium => 2,
            Confidence::High => 3,
            Confidence::UserConfirmed => 4,
        }
    }
}

/// A single finding raised against a scanned message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRecord {
    pub alert_id: i64,
    pub scan_id: i64,
    pub plugin_id: i64,
    pub name: String,
    pub risk: i32,
    pub confidence: i32,
    pub description: String,
    pub uri: String,
    pub param: String,
    pub attack: String,
    pub other_info: String,
    pub solution: String,
    pub reference: String,
    pub evidence: String,
    pub cwe_id: i32,
    pub wasc_id: i32,
    /// Message the alert was raised on.
    pub history_id: i64,
    /// Message that triggered the scan which raised the alert.
    pub source_history_id: i64,
    /// Component that raised the alert (active, passive, manual, ...).
    pub source_id: i32,
    pub alert_ref: String,
    pub input_vector: String,
}

impl AlertRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            alert_id: row.get(0)?,
            scan_id: row.get(1)?,
            plugin_id: row.get(2)?,
            name: row.get(3)?,
            risk: row.get(4)?,
            confidence: row.get(5)?,
            description: row.get(6)?,
            uri: row.get(7)?,
            param: row.get(8)?,
            attack: row.get(9)?,
            other_info: row.get(10)?,
            solution: row.get(11)?,
            reference: row.get(12)?,
            evidence: row.get(13)?,
            cwe_id: row.get(14)?,
            wasc_id: row.get(15)?,
            history_id: row.get(16)?,
            source_history_id: row.get(17)?,
            source_id: row.get(18)?,
            alert_ref: row.get(19)?,
            input_vector: row.get(20)?,
        })
    }

    pub fn risk_level(&self) -> Option<Risk> {
        Risk::from_ordinal(self.risk)
    }

    pub fn confidence_level(&self) -> Option<Confidence> {
        Confidence::from_ordinal(self.confidence)
    }
}

/// Field values for a new alert; the id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub scan_id: i64,
    pub plugin_id: i64,
    pub name: String,
    pub risk: i32,
    pub confidence: i32,
    pub description: String,
    pub uri: String,
    pub param: String,
    pub attack: String,
    pub other_info: String,
    pub solution: String,
    pub reference: String,
    pub evidence: String,
    pub cwe_id: i32,
    pub wasc_id: i32,
    pub history_id: i64,
    pub source_history_id: i64,
    pub source_id: i32,
    pub alert_ref: String,
    pub input_vector: String,
}

impl Default for NewAlert {
    fn default() -> Self {
        Self {
            scan_id: 0,
            plugin_id: 0,
            name: String::new(),
            risk: Risk::Info.ordinal(),
            confidence: Confidence::Medium.ordinal(),
            description: String::new(),
            uri: String::new(),
            param: String::new(),
            attack: String::new(),
            other_info: String::new(),
            solution: String::new(),
            reference: String::new(),
            evidence: String::new(),
            cwe_id: -1,
            wasc_id: -1,
            history_id: 0,
            source_history_id: 0,
            source_id: 0,
            alert_ref: String::new(),
            input_vector: String::new(),
        }
    }
}

/// Columns rewritten by an alert update. Every field is supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertUpdate {
    pub name: String,
    pub risk: i32,
    pub confidence: i32,
    pub description: String,
    pub uri: String,
    pub param: String,
    pub attack: String,
    pub other_info: String,
    pub solution: String,
    pub reference: String,
    pub evidence: String,
    pub cwe_id: i32,
    pub wasc_id: i32,
    pub source_history_id: i64,
    pub input_vector: String,
}

impl From<&AlertRecord> for AlertUpdate {
    fn from(alert: &AlertRecord) -> Self {
        Self {
            name: alert.name.clone(),
            risk: alert.risk,
            confidence: alert.confidence,
            description: alert.description.clone(),
            uri: alert.uri.clone(),
            param: alert.param.clone(),
            attack: alert.attack.clone(),
            other_info: alert.other_info.clone(),
            solution: alert.solution.clone(),
            reference: alert.reference.clone(),
            evidence: alert.evidence.clone(),
            cwe_id: alert.cwe_id,
            wasc_id: alert.wasc_id,
            source_history_id: alert.source_history_id,
            input_vector: alert.input_vector.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMetadataRecord {
    pub metadata_id: i64,
    pub alert_id: i64,
    pub metadata_type: String,
    pub data: String,
}

impl AlertMetadataRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            metadata_id: row.get(0)?,
            alert_id: row.get(1)?,
            metadata_type: row.get(2)?,
            data: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertTagRecord {
    pub tag_id: i64,
    pub alert_id: i64,
    pub key: String,
    pub value: String,
}

impl AlertTagRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tag_id: row.get(0)?,
            alert_id: row.get(1)?,
            key: row.get(2)?,
            value: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    pub scan_id: i64,
    pub session_id: i64,
    pub scan_name: String,
    /// Assigned by the store clock (UTC) when the scan row is inserted.
    pub scan_time: NaiveDateTime,
}

impl ScanRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            scan_id: row.get(0)?,
            session_id: row.get(1)?,
            scan_name: row.get(2)?,
            scan_time: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: i64,
    pub session_name: String,
    pub last_access: NaiveDateTime,
}

impl SessionRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            session_name: row.get(1)?,
            last_access: row.get(2)?,
        })
    }
}

/// Aggregated usage of one parameter on one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamRecord {
    pub param_id: i64,
    pub site: String,
    pub param_type: String,
    pub name: String,
    pub used: i64,
    pub flags: String,
    pub values: String,
}

impl ParamRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            param_id: row.get(0)?,
            site: row.get(1)?,
            param_type: row.get(2)?,
            name: row.get(3)?,
            used: row.get(4)?,
            flags: row.get(5)?,
            values: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewParam {
    pub site: String,
    pub param_type: String,
    pub name: String,
    pub used: i64,
    pub flags: String,
    pub values: String,
}

/// Well known `history.history_type` values.
pub mod history_type {
    pub const TEMPORARY: i32 = 0;
    pub const PROXIED: i32 = 1;
    pub const MANUAL: i32 = 2;
    pub const SPIDER: i32 = 3;
    pub const SCANNER: i32 = 4;
    pub const BRUTE_FORCE: i32 = 7;
    pub const FUZZER: i32 = 8;
    pub const SCANNER_TEMPORARY: i32 = 12;

    /// Types purged when a store is closed with cleanup.
    pub const TRANSIENT: [i32; 2] = [TEMPORARY, SCANNER_TEMPORARY];
}

/// One message exchange recorded by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub history_id: i64,
    pub session_id: i64,
    pub history_type: i32,
    pub method: String,
    pub uri: String,
    pub status_code: i32,
    pub time_sent_millis: i64,
    pub time_elapsed_millis: i64,
    pub note: String,
}

impl HistoryRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            history_id: row.get(0)?,
            session_id: row.get(1)?,
            history_type: row.get(2)?,
            method: row.get(3)?,
            uri: row.get(4)?,
            status_code: row.get(5)?,
            time_sent_millis: row.get(6)?,
            time_elapsed_millis: row.get(7)?,
            note: row.get(8)?,
        })
    }

    pub fn is_transient(&self) -> bool {
        history_type::TRANSIENT.contains(&self.history_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistory {
    pub session_id: i64,
    pub history_type: i32,
    pub method: String,
    pub uri: String,
    pub status_code: i32,
    pub time_sent_millis: i64,
    pub time_elapsed_millis: i64,
    pub note: String,
}

impl Default for NewHistory {
    fn default() -> Self {
        Self {
            session_id: 0,
            history_type: history_type::PROXIED,
            method: "GET".to_string(),
            uri: String::new(),
            status_code: 0,
            time_sent_millis: 0,
            time_elapsed_millis: 0,
            note: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_ordinals_round_trip() {
        for risk in [Risk::Info, Risk::Low, Risk::Medium, Risk::High] {
            assert_eq!(Risk::from_ordinal(risk.ordinal()), Some(risk));
        }
        assert_eq!(Risk::from_ordinal(7), None);
    }

    #[test]
    fn test_confidence_unknown_ordinal() {
        assert_eq!(Confidence::from_ordinal(-1), None);
        assert_eq!(Confidence::from_ordinal(4), Some(Confidence::UserConfirmed));
    }

    #[test]
    fn test_new_alert_defaults_match_column_defaults() {
        let alert = NewAlert::default();
        assert_eq!(alert.cwe_id, -1);
        assert_eq!(alert.wasc_id, -1);
        assert_eq!(alert.confidence, 2);
    }

    #[test]
    fn test_history_transient_types() {
        let mut history = HistoryRecord {
            history_id: 1,
            session_id: 1,
            history_type: history_type::SCANNER_TEMPORARY,
            method: "GET".into(),
            uri: "http://example.com/".into(),
            status_code: 200,
            time_sent_millis: 0,
            time_elapsed_millis: 0,
            note: String::new(),
        };
        assert!(history.is_transient());
        history.history_type = history_type::PROXIED;
        assert!(!history.is_transient());
    }
}
