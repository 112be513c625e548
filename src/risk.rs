use std::fmt;
use std::str::FromStr;

use crate::models::PredictionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Critical => "Critical",
            Tier::High => "High",
            Tier::Medium => "Medium",
            Tier::Low => "Low",
        }
    }

    fn default_colour(self) -> Colour {
        match self {
            Tier::Critical => Colour::Red,
            Tier::High => Colour::Orange,
            Tier::Medium => Colour::Yellow,
            Tier::Low => Colour::Green,
        }
    }
}

impl FromStr for Tier {
    type Err = TierTableError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Tier::Critical),
            "high" => Ok(Tier::High),
            "medium" => Ok(Tier::Medium),
            "low" => Ok(Tier::Low),
            other => Err(TierTableError::UnknownTier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Orange,
    Yellow,
    Green,
}

impl Colour {
    pub fn as_str(self) -> &'static str {
        match self {
            Colour::Red => "red",
            Colour::Orange => "orange",
            Colour::Yellow => "yellow",
            Colour::Green => "green",
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colour {
    type Err = TierTableError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Colour::Red),
            "orange" => Ok(Colour::Orange),
            "yellow" => Ok(Colour::Yellow),
            "green" => Ok(Colour::Green),
            other => Err(TierTableError::UnknownColour(other.to_string())),
        }
    }
}

/// One bucket of a tier table: `above < risk <= up_to`, `None` meaning unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierBand {
    pub tier: Tier,
    pub above: Option<f64>,
    pub up_to: Option<f64>,
    pub colour: Colour,
}

impl TierBand {
    fn contains(&self, risk: f64) -> bool {
        self.above.map_or(true, |low| risk > low) && self.up_to.map_or(true, |high| risk <= high)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TierTableError {
    #[error("tier table has no bands")]
    Empty,
    #[error("top band {0:?} must have no upper bound")]
    BoundedTop(Tier),
    #[error("bottom band {0:?} must have no lower bound")]
    BoundedBottom(Tier),
    #[error("bands {upper:?} and {lower:?} do not meet at a shared bound")]
    Gap { upper: Tier, lower: Tier },
    #[error("band {lower:?} must sit strictly below band {upper:?}")]
    NotDescending { upper: Tier, lower: Tier },
    #[error("unknown tier name: {0}")]
    UnknownTier(String),
    #[error("unknown colour: {0}")]
    UnknownColour(String),
    #[error("invalid tier bound: {0}")]
    BadBound(String),
}

/// Ordered bands evaluated top-down; the first band containing the risk wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl TierTable {
    /// Build a table, rejecting any layout that leaves gaps or overlaps.
    pub fn new(bands: Vec<TierBand>) -> Result<Self, TierTableError> {
        let first = bands.first().ok_or(TierTableError::Empty)?;
        if first.up_to.is_some() {
            return Err(TierTableError::BoundedTop(first.tier));
        }
        if let Some(last) = bands.last() {
            if last.above.is_some() {
                return Err(TierTableError::BoundedBottom(last.tier));
            }
        }
        for pair in bands.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            let shared = match (upper.above, lower.up_to) {
                (Some(a), Some(b)) if a == b => a,
                _ => {
                    return Err(TierTableError::Gap {
                        upper: upper.tier,
                        lower: lower.tier,
                    })
                }
            };
            if lower.above.is_some_and(|low| low >= shared) {
                return Err(TierTableError::NotDescending {
                    upper: upper.tier,
                    lower: lower.tier,
                });
            }
        }
        Ok(Self { bands })
    }

    /// Table used by the at-risk view, which only sees pre-filtered customers.
    pub fn at_risk() -> Self {
        Self {
            bands: vec![
                band(Tier::Critical, Some(0.8), None, Colour::Red),
                band(Tier::High, Some(0.7), Some(0.8), Colour::Orange),
                band(Tier::Medium, None, Some(0.7), Colour::Yellow),
            ],
        }
    }

    /// Table used by the full prediction results view.
    pub fn results() -> Self {
        Self {
            bands: vec![
                band(Tier::High, Some(0.7), None, Colour::Red),
                band(Tier::Medium, Some(0.5), Some(0.7), Colour::Yellow),
                band(Tier::Low, None, Some(0.5), Colour::Green),
            ],
        }
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }

    pub fn classify(&self, risk: f64) -> Option<&TierBand> {
        self.bands.iter().find(|band| band.contains(risk))
    }
}

/// Parses `Critical>0.8:red,High>0.7:orange,Medium:yellow`: each band is
/// `Name>lower_bound:colour`, the last one unbounded, upper bounds taken from
/// the band above. A band without `:colour` uses its tier's usual colour.
impl FromStr for TierTable {
    type Err = TierTableError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut bands = Vec::new();
        let mut up_to = None;
        for item in value.split(',').filter(|item| !item.trim().is_empty()) {
            let (item, colour) = match item.split_once(':') {
                Some((item, colour)) => (item, Some(colour.parse::<Colour>()?)),
                None => (item, None),
            };
            let (name, above) = match item.split_once('>') {
                Some((name, bound)) => {
                    let bound = bound.trim();
                    let parsed = bound
                        .parse::<f64>()
                        .ok()
                        .filter(|value| value.is_finite())
                        .ok_or_else(|| TierTableError::BadBound(bound.to_string()))?;
                    (name, Some(parsed))
                }
                None => (item, None),
            };
            let tier: Tier = name.parse()?;
            let colour = colour.unwrap_or_else(|| tier.default_colour());
            bands.push(band(tier, above, up_to, colour));
            up_to = above;
        }
        Self::new(bands)
    }
}

impl fmt::Display for TierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, band) in self.bands().iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            f.write_str(band.tier.as_str())?;
            if let Some(above) = band.above {
                write!(f, ">{above}")?;
            }
            write!(f, ":{}", band.colour)?;
        }
        Ok(())
    }
}

fn band(tier: Tier, above: Option<f64>, up_to: Option<f64>, colour: Colour) -> TierBand {
    TierBand {
        tier,
        above,
        up_to,
        colour,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAnnotation {
    pub composite_risk: f64,
    pub tier: Tier,
    pub colour: Colour,
}

pub fn composite_risk(logistic_regression: f64, random_forest: f64) -> f64 {
    (logistic_regression + random_forest) / 2.0
}

/// Score a record against a tier table. Records missing a probability get no annotation.
pub fn annotate(record: &PredictionRecord, table: &TierTable) -> Option<RiskAnnotation> {
    let (a, b) = record.probabilities()?;
    let risk = composite_risk(a, b);
    let band = table.classify(risk)?;
    Some(RiskAnnotation {
        composite_risk: risk,
        tier: band.tier,
        colour: band.colour,
    })
}

/// A record prepared for display: its key, the record, and its annotation if scorable.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRow<'a> {
    pub key: String,
    pub record: &'a PredictionRecord,
    pub annotation: Option<RiskAnnotation>,
}

/// Annotate a window of records; `first_index` is the position of the first one
/// in the full result set and backs the display key when a customer id is missing.
pub fn annotate_rows<'a>(
    records: &'a [PredictionRecord],
    first_index: usize,
    table: &TierTable,
) -> Vec<AnnotatedRow<'a>> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| AnnotatedRow {
            key: record.display_key(first_index + idx),
            record,
            annotation: annotate(record, table),
        })
        .collect()
}

/// Records with a composite risk, highest first, keeping their original position.
pub fn rank_by_composite(records: &[PredictionRecord]) -> Vec<(usize, &PredictionRecord, f64)> {
    let mut ranked: Vec<(usize, &PredictionRecord, f64)> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            record
                .probabilities()
                .map(|(a, b)| (idx, record, composite_risk(a, b)))
        })
        .collect();
    ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
