use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Warehouse as served by the WB supplies API. Field casing differs between API
/// revisions, so both spellings of the key and QR fields are accepted.
/// `acceptsQR` keeps a present `null` as `Some(Value::Null)`, unlike the other fields.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawWarehouse {
    #[serde(rename = "ID")]
    pub id_upper: Option<Value>,
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub address: Option<Value>,
    #[serde(rename = "workTime")]
    pub work_time: Option<Value>,
    #[serde(default, rename = "acceptsQR", deserialize_with = "present")]
    pub accepts_qr_upper: Option<Value>,
    #[serde(rename = "acceptsQr")]
    pub accepts_qr: Option<Value>,
    #[serde(rename = "isActive")]
    pub is_active: Option<Value>,
    #[serde(rename = "isTransitActive")]
    pub is_transit_active: Option<Value>,
}

/// Row of the destination table. Every field is always serialized, absent ones as `null`.
/// Values are passed through as received.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Warehouse {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub address: Option<Value>,
    pub work_time: Option<Value>,
    pub accepts_qr: Option<Value>,
    pub is_active: Option<Value>,
    pub is_transit_active: Option<Value>,
}

impl From<RawWarehouse> for Warehouse {
    fn from(raw: RawWarehouse) -> Self {
        Self {
            id: raw.id_upper.or(raw.id),
            name: raw.name,
            address: raw.address,
            work_time: raw.work_time,
            accepts_qr: match raw.accepts_qr_upper {
                // `acceptsQr` only counts when `acceptsQR` is missing altogether.
                Some(Value::Null) => None,
                Some(value) => Some(value),
                None => raw.accepts_qr,
            },
            is_active: raw.is_active,
            is_transit_active: raw.is_transit_active,
        }
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
