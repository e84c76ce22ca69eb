// Extended squitter type code categories

use serde::{Serialize, Serializer};

/// Broad meaning of an ADS-B type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCodeCategory {
    /// TC 1-4
    Identification,
    /// TC 5-8
    SurfacePosition,
    /// TC 9-18
    AirbornePositionBaro,
    /// TC 19
    AirborneVelocity,
    /// TC 20-22
    AirbornePositionGnss,
    /// TC 28
    Status,
    /// TC 0, the decoder produced no type code
    NotDecoded,
    /// No type code in the log
    Unknown,
    Other(i64),
}

impl TypeCodeCategory {
    /// Stable label used in enriched output
    pub fn label(&self) -> String {
        match self {
            TypeCodeCategory::Identification => "ID_TC1-4".to_string(),
            TypeCodeCategory::SurfacePosition => "SurfacePos_TC5-8".to_string(),
            TypeCodeCategory::AirbornePositionBaro => "AirbornePos_Baro_TC9-18".to_string(),
            TypeCodeCategory::AirborneVelocity => "Velocity_TC19".to_string(),
            TypeCodeCategory::AirbornePositionGnss => "AirbornePos_GNSS_TC20-22".to_string(),
            TypeCodeCategory::Status => "Status_TC28".to_string(),
            TypeCodeCategory::NotDecoded => "TC0_or_not_decoded".to_string(),
            TypeCodeCategory::Unknown => "TC_unknown".to_string(),
            TypeCodeCategory::Other(tc) => format!("Other_TC{}", tc),
        }
    }
}

impl std::fmt::Display for TypeCodeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for TypeCodeCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Bucket a logged type code. Fractional codes truncate toward zero.
pub fn categorize(type_code: Option<f64>) -> TypeCodeCategory {
    let tc = match type_code {
        Some(tc) if tc.is_finite() => tc.trunc() as i64,
        _ => return TypeCodeCategory::Unknown,
    };
    match tc {
        0 => TypeCodeCategory::NotDecoded,
        1..=4 => TypeCodeCategory::Identification,
        5..=8 => TypeCodeCategory::SurfacePosition,
        9..=18 => TypeCodeCategory::AirbornePositionBaro,
        19 => TypeCodeCategory::AirborneVelocity,
        20..=22 => TypeCodeCategory::AirbornePositionGnss,
        28 => TypeCodeCategory::Status,
        _ => TypeCodeCategory::Other(tc),
    }
}
