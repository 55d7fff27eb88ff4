use serde::{Deserialize, Serialize};

/// Intensity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Below 4.0.
    Critical,
    /// 4.0 to 5.5.
    Active,
    /// 5.5 to 6.5.
    Balanced,
    /// 6.5 to 7.5.
    Neutral,
    /// 7.5 and above.
    Dormant,
}

/// Allocation policy attached to a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZonePolicy {
    /// Largest share of the pool a non-critical request may claim.
    pub max_fraction_per_request: f64,
    /// Added to request priority before scoring.
    pub priority_boost: i8,
    /// Share of each resource held back from allocation.
    pub reservation_fraction: f64,
}

impl Zone {
    /// Zone containing `intensity`. Lower bounds are inclusive.
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < 4.0 {
            Self::Critical
        } else if intensity < 5.5 {
            Self::Active
        } else if intensity < 6.5 {
            Self::Balanced
        } else if intensity < 7.5 {
            Self::Neutral
        } else {
            Self::Dormant
        }
    }

    pub fn policy(&self) -> ZonePolicy {
        let (max_fraction_per_request, priority_boost, reservation_fraction) = match self {
            Self::Critical => (0.4, 2, 0.30),
            Self::Active => (0.6, 1, 0.20),
            Self::Balanced => (0.8, 0, 0.15),
            Self::Neutral => (0.7, 0, 0.10),
            Self::Dormant => (0.5, -1, 0.25),
        };
        ZonePolicy {
            max_fraction_per_request,
            priority_boost,
            reservation_fraction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Active => "active",
            Self::Balanced => "balanced",
            Self::Neutral => "neutral",
            Self::Dormant => "dormant",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
