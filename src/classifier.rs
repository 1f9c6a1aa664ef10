//! # Reading Interpretation
//!
//! Human-readable descriptions of a calibrated reading. These are informational
//! only: they are logged next to each accepted reading and never affect delivery.
//!
//! ## Quality Scale Inversion
//!
//! The board reports `quality` as a turbidity-derived score where **higher numbers
//! mean murkier water**: 95 is poor, 10 is excellent. The clarity percentage used
//! for recommendations is therefore `100 - quality`.

use crate::CalibratedReading;

/// Intended use for water at the given pH.
///
/// Domestic is checked first over a closed range, so 6.5 and 8.5 are domestic.
pub fn water_use(ph: f64) -> &'static str {
    if (6.5..=8.5).contains(&ph) {
        "Domestic Household Use"
    } else if (5.5..6.5).contains(&ph) || (ph > 8.5 && ph <= 9.0) {
        "Plant Irrigation"
    } else {
        "Non-potable Applications"
    }
}

/// Quality label for the (inverted) quality score.
pub fn quality_description(quality: f64) -> &'static str {
    if quality >= 90.0 {
        "Poor"
    } else if quality >= 70.0 {
        "Fair"
    } else if quality >= 40.0 {
        "Good"
    } else {
        "Excellent"
    }
}

/// Turbidity label; same thresholds as [`quality_description`].
pub fn turbidity_description(quality: f64) -> &'static str {
    if quality >= 90.0 {
        "Very High Turbidity"
    } else if quality >= 70.0 {
        "High Turbidity"
    } else if quality >= 40.0 {
        "Moderate Turbidity"
    } else {
        "Low Turbidity"
    }
}

/// Usage advice based on clarity (`100 - quality`).
pub fn turbidity_recommendation(quality: f64) -> &'static str {
    let clarity = 100.0 - quality;
    if clarity >= 90.0 {
        "Clear water, suitable for drinking after standard treatment"
    } else if clarity >= 80.0 {
        "Slightly cloudy, filter before drinking"
    } else if clarity >= 70.0 {
        "Cloudy, suitable for bathing and washing"
    } else if clarity >= 60.0 {
        "Noticeably turbid, suitable for cleaning and laundry"
    } else if clarity >= 50.0 {
        "Turbid, use for toilet flushing or irrigation only"
    } else if clarity >= 40.0 {
        "Highly turbid, use for irrigation of non-food crops only"
    } else {
        "Very turbid, not recommended for any household use"
    }
}

/// pH band boundaries paired with advice; each band is `[lower, next lower)`.
const PH_BANDS: [(f64, &str); 9] = [
    (0.0, "Extremely acidic, hazardous, do not use"),
    (3.0, "Strongly acidic, neutralise before any use"),
    (5.0, "Acidic, corrosive to pipes, treat before use"),
    (6.0, "Slightly acidic, suitable for acid-loving plants"),
    (6.5, "Neutral, ideal for drinking and household use"),
    (7.5, "Slightly alkaline, safe for household use"),
    (8.5, "Alkaline, may cause scaling, treat for drinking"),
    (9.5, "Strongly alkaline, unsuitable for drinking"),
    (11.0, "Extremely alkaline, hazardous, do not use"),
];

/// Advisory text for a pH value; the last band runs to 14 inclusive.
pub fn ph_recommendation(ph: f64) -> &'static str {
    PH_BANDS
        .iter()
        .rev()
        .find(|(lower, _)| ph >= *lower)
        .map(|(_, advice)| *advice)
        .unwrap_or(PH_BANDS[0].1)
}

/// All interpretations of one reading, for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assessment {
    pub water_use: &'static str,
    pub quality: &'static str,
    pub turbidity: &'static str,
    pub turbidity_advice: &'static str,
    pub ph_advice: &'static str,
}

impl Assessment {
    pub fn of(reading: &CalibratedReading) -> Self {
        Assessment {
            water_use: water_use(reading.ph),
            quality: quality_description(reading.quality),
            turbidity: turbidity_description(reading.quality),
            turbidity_advice: turbidity_recommendation(reading.quality),
            ph_advice: ph_recommendation(reading.ph),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_use_buckets() {
        assert_eq!(water_use(7.0), "Domestic Household Use");
        assert_eq!(water_use(6.0), "Plant Irrigation");
        assert_eq!(water_use(2.0), "Non-potable Applications");
        assert_eq!(water_use(8.8), "Plant Irrigation");
        assert_eq!(water_use(9.5), "Non-potable Applications");
    }

    #[test]
    fn water_use_boundaries() {
        assert_eq!(water_use(6.5), "Domestic Household Use");
        assert_eq!(water_use(8.5), "Domestic Household Use");
        assert_eq!(water_use(5.5), "Plant Irrigation");
        assert_eq!(water_use(9.0), "Plant Irrigation");
        assert_eq!(water_use(5.49), "Non-potable Applications");
    }

    #[test]
    fn quality_scale_is_inverted() {
        assert_eq!(quality_description(95.0), "Poor");
        assert_eq!(quality_description(90.0), "Poor");
        assert_eq!(quality_description(75.0), "Fair");
        assert_eq!(quality_description(40.0), "Good");
        assert_eq!(quality_description(5.0), "Excellent");
        assert_eq!(turbidity_description(95.0), "Very High Turbidity");
        assert_eq!(turbidity_description(5.0), "Low Turbidity");
    }

    #[test]
    fn turbidity_recommendation_uses_clarity() {
        assert!(turbidity_recommendation(5.0).starts_with("Clear water"));
        assert!(turbidity_recommendation(10.0).starts_with("Clear water"));
        assert!(turbidity_recommendation(15.0).starts_with("Slightly cloudy"));
        assert!(turbidity_recommendation(55.0).starts_with("Highly turbid"));
        assert!(turbidity_recommendation(61.0).starts_with("Very turbid"));
    }

    #[test]
    fn ph_bands_first_match_wins() {
        assert!(ph_recommendation(0.0).starts_with("Extremely acidic"));
        assert!(ph_recommendation(2.99).starts_with("Extremely acidic"));
        assert!(ph_recommendation(3.0).starts_with("Strongly acidic"));
        assert!(ph_recommendation(6.5).starts_with("Neutral"));
        assert!(ph_recommendation(7.49).starts_with("Neutral"));
        assert!(ph_recommendation(7.5).starts_with("Slightly alkaline"));
        assert!(ph_recommendation(14.0).starts_with("Extremely alkaline"));
        assert!(ph_recommendation(-1.0).starts_with("Extremely acidic"));
    }

    #[test]
    fn assessment_bundles_everything() {
        let reading = CalibratedReading {
            temperature: 25.0,
            ph: 7.2,
            quality: 45.0,
        };
        let a = Assessment::of(&reading);
        assert_eq!(a.water_use, "Domestic Household Use");
        assert_eq!(a.quality, "Good");
        assert_eq!(a.turbidity, "Moderate Turbidity");
    }
}
