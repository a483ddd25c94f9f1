use crate::SignalProducer;
use crate::error::AnalystError;
use crate::fundamentals::Fundamentals;
use crate::params::ParamMap;
use crate::sentiment::Sentiment;
use crate::technicals::Technicals;
use core_types::AnalystId;

/// Creates a new analyst instance based on the provided ID and parameters.
///
/// The match is exhaustive, so adding an `AnalystId` without handling it here is a
/// compile error.
pub fn create_analyst(
    id: AnalystId,
    params: &ParamMap,
) -> Result<Box<dyn SignalProducer>, AnalystError> {
    match id {
        AnalystId::Technicals => Ok(Box::new(Technicals::new(params.clone())?)),
        AnalystId::Fundamentals => {
            if !params.is_empty() {
                tracing::warn!(analyst = %id, "Fundamentals takes no parameters; ignoring them.");
            }
            Ok(Box::new(Fundamentals))
        }
        AnalystId::Sentiment => Ok(Box::new(Sentiment::new(params.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn factory_builds_each_analyst_under_its_id() {
        for id in [AnalystId::Technicals, AnalystId::Fundamentals, AnalystId::Sentiment] {
            let analyst = create_analyst(id, &ParamMap::new()).unwrap();
            assert_eq!(analyst.id(), id.as_str());
            assert!(!analyst.requirements().fields.is_empty());
        }
    }

    #[test]
    fn factory_surfaces_invalid_parameters() {
        let params = ParamMap::from([("rsi_period".to_string(), dec!(0))]);
        let result = create_analyst(AnalystId::Technicals, &params);
        assert!(matches!(result, Err(AnalystError::InvalidParameters(_))));
    }
}
