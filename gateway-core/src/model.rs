//! Canonical data model (spec §3).
//!
//! Establishments and executives are value-owned by a `BusinessEntity`;
//! there are no cyclic or pointer graphs in this model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyFlag {
    Open,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    Micro,
    Small,
    Medium,
    Large,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalForm {
    pub code: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKind {
    Natural,
    Legal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executive {
    pub role: String,
    pub surname: String,
    pub given_name: Option<String>,
    /// Month-precision date string `YYYY-MM`; invariant enforced by the
    /// privacy redactor, never stored with day precision for natural persons.
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub person_kind: PersonKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub postal_code: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPointEq>,
}

/// `f64`-free geo wrapper so `Address` can derive `Eq` for dedup comparisons;
/// coordinates are stable 6-decimal-fixed values, not arbitrary floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPointEq {
    pub lat_e6: i64,
    pub lon_e6: i64,
}

impl From<GeoPoint> for GeoPointEq {
    fn from(g: GeoPoint) -> Self {
        GeoPointEq {
            lat_e6: (g.lat * 1_000_000.0).round() as i64,
            lon_e6: (g.lon * 1_000_000.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub establishment_key: String,
    pub headquarters: bool,
    pub address: Address,
    pub size_bucket: SizeBucket,
    pub activity_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    Sale,
    Creation,
    CollectiveProcedure,
    AccountsFiling,
    Correction,
}

impl AnnouncementKind {
    /// Single-letter upstream tag mapping fixed by spec §4.8:
    /// A=sale, B=creation, C=collective-procedure, D=accounts-filing, P=correction.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'A' => Some(Self::Sale),
            'B' => Some(Self::Creation),
            'C' => Some(Self::CollectiveProcedure),
            'D' => Some(Self::AccountsFiling),
            'P' => Some(Self::Correction),
            _ => None,
        }
    }

    pub fn tag(&self) -> char {
        match self {
            Self::Sale => 'A',
            Self::Creation => 'B',
            Self::CollectiveProcedure => 'C',
            Self::AccountsFiling => 'D',
            Self::Correction => 'P',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub announcement_id: String,
    pub kind: AnnouncementKind,
    pub publication_date: NaiveDate,
    pub court: Option<String>,
    pub business_key: Option<String>,
    pub title: String,
    pub free_text: String,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationDomain {
    Environmental,
    Quality,
    Social,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub code: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub type_tag: String,
    pub code: String,
    pub name: String,
    pub issuer: String,
    pub validity_end: NaiveDate,
    pub domain: CertificationDomain,
    pub competencies: Vec<Competency>,
}

impl Certification {
    /// Valid iff the end date is strictly in the future relative to `now` (spec §4.8).
    pub fn is_valid(&self, now: NaiveDate) -> bool {
        self.validity_end > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Act,
    Accounts,
    Statutes,
    Extract,
    FiscalCert,
    SocialCert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentPayload {
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Url { url: String, expires_at: DateTime<Utc> },
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub business_key: String,
    pub kind: DocumentKind,
    pub year: Option<i32>,
    pub payload: DocumentPayload,
    pub size_bytes: u64,
    pub mime_type: String,
    pub origin_provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Financials {
    pub revenue: Option<f64>,
    pub fiscal_year: Option<i32>,
    pub headcount: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessEntity {
    pub business_key: String,
    pub establishment_key: Option<String>,
    pub display_name: String,
    pub legal_form: Option<LegalForm>,
    pub activity_code: Option<String>,
    pub size_bucket: SizeBucket,
    pub creation_date: Option<NaiveDate>,
    pub cessation_date: Option<NaiveDate>,
    pub active: bool,
    pub privacy: PrivacyFlag,
    pub executives: Vec<Executive>,
    pub establishments: Vec<Establishment>,
    pub financials: Financials,
    pub certifications: Vec<Certification>,
    pub sources: HashSet<String>,
    pub last_update: DateTime<Utc>,
}

impl BusinessEntity {
    /// Spec §3 invariant: at most one establishment with `headquarters=true`.
    pub fn has_valid_headquarters_invariant(&self) -> bool {
        self.establishments.iter().filter(|e| e.headquarters).count() <= 1
    }

    /// Spec §3 invariant: if privacy=protected, street/geo MUST be absent
    /// after redaction.
    pub fn has_valid_privacy_invariant(&self) -> bool {
        if self.privacy != PrivacyFlag::Protected {
            return true;
        }
        self.establishments.iter().all(|e| {
            e.address.street.is_none() && e.address.geo.is_none()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    ClientCredentials,
    PasswordBearer,
    StaticBearer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    #[serde(skip_serializing)]
    pub value: secrecy::SecretString,
    pub expiry: Option<DateTime<Utc>>,
    pub kind: TokenKind,
    pub refresh_token: Option<secrecy::SecretString>,
}

impl Token {
    /// `expired = now >= expiry - skew`.
    pub fn expired(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - skew,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub String);

#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub counter: u32,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub operation: String,
    pub business_key: Option<String>,
    pub caller_id: String,
    pub ip: Option<String>,
    pub response_time_ms: u64,
    pub status_code: u16,
    pub metadata: serde_json::Value,
}
