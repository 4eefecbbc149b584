use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Resource record kinds this system manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Srv,
    Txt,
    Ptr,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Ptr => "PTR",
        }
    }

    /// Metadata and reverse records are left in place by a plain suppress
    pub fn is_metadata(&self) -> bool {
        matches!(self, RecordType::Txt | RecordType::Ptr)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRecordType(pub String);

impl fmt::Display for UnknownRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown record type: {}", self.0)
    }
}

impl std::error::Error for UnknownRecordType {}

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "SRV" => Ok(RecordType::Srv),
            "TXT" => Ok(RecordType::Txt),
            "PTR" => Ok(RecordType::Ptr),
            _ => Err(UnknownRecordType(s.to_string())),
        }
    }
}

/// A DNS record descriptor derived from a container.
/// Identity for add/remove purposes is (name, rtype, content); ttl is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Owner name, e.g. "web._http._tcp.sd.example.com"
    pub name: String,

    /// TTL in seconds
    pub ttl: u32,

    #[serde(rename = "type")]
    pub rtype: RecordType,

    /// Type-specific value, in zone-file presentation form
    pub content: String,
}

impl DnsRecord {
    pub fn new(name: impl Into<String>, ttl: u32, rtype: RecordType, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl,
            rtype,
            content: content.into(),
        }
    }

    /// Name as written to a store: lowercase, no trailing dot
    pub fn canonical_name(&self) -> String {
        canonicalize_name(&self.name)
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.ttl, self.rtype, self.content)
    }
}

pub fn canonicalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// A record as persisted by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Backend-internal key
    pub id: i64,

    pub name: String,

    pub ttl: u32,

    #[serde(rename = "type")]
    pub rtype: RecordType,

    pub content: String,

    /// Last time the row was written
    pub changed_at: Option<DateTime<Utc>>,
}
