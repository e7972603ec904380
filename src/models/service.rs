use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub slug: String,
    pub name: String,
    /// Base price in whole rupees; paise conversion happens in pricing.
    pub price_min: i64,
    pub category: ServiceCategory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceCategory {
    Inspection,
    Maintenance,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Inspection => "INSPECTION",
            ServiceCategory::Maintenance => "MAINTENANCE",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "INSPECTION" => ServiceCategory::Inspection,
            _ => ServiceCategory::Maintenance,
        }
    }
}
