//! Ordered model fallback roster
//!
//! The roster is built once from configuration and never mutated. Insertion
//! order is fallback priority: the primary model first, then each fallback
//! in the order it was configured.

use crate::error::{AppError, AppResult};

/// Ordered, immutable list of model identifiers to try.
///
/// Fields are private to enforce the construction invariants (non-empty,
/// no blank identifiers). Shared read-only across concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoster {
    models: Vec<String>,
}

impl ModelRoster {
    /// Build a roster from a primary model and ordered fallbacks.
    ///
    /// # Errors
    /// Returns a config error if the primary or any fallback identifier is
    /// blank. Duplicate identifiers are allowed (a model may legitimately
    /// appear twice, e.g. as a last-resort repeat) but logged as unusual.
    pub fn new(
        primary: impl Into<String>,
        fallbacks: impl IntoIterator<Item = String>,
    ) -> AppResult<Self> {
        let primary = primary.into();
        if primary.trim().is_empty() {
            return Err(AppError::Config(
                "models.primary must not be blank".to_string(),
            ));
        }

        let mut models = vec![primary];
        for (idx, fallback) in fallbacks.into_iter().enumerate() {
            if fallback.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "models.fallbacks[{}] must not be blank",
                    idx
                )));
            }
            if models.contains(&fallback) {
                tracing::warn!(model = %fallback, "Duplicate model identifier in roster");
            }
            models.push(fallback);
        }

        Ok(Self { models })
    }

    /// The first model to try.
    pub fn primary(&self) -> &str {
        &self.models[0]
    }

    /// Iterate models in fallback priority order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    /// Number of models in the roster (always >= 1).
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_preserves_order() {
        let roster = ModelRoster::new(
            "relay-pro",
            vec!["relay-flash".to_string(), "relay-lite".to_string()],
        )
        .expect("valid roster");

        let models: Vec<&str> = roster.iter().collect();
        assert_eq!(models, vec!["relay-pro", "relay-flash", "relay-lite"]);
        assert_eq!(roster.primary(), "relay-pro");
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_roster_primary_only() {
        let roster = ModelRoster::new("relay-pro", vec![]).expect("valid roster");
        assert_eq!(roster.len(), 1);
        assert!(!roster.is_empty());
    }

    #[test]
    fn test_roster_rejects_blank_primary() {
        let result = ModelRoster::new("   ", vec![]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("primary"));
    }

    #[test]
    fn test_roster_rejects_blank_fallback() {
        let result = ModelRoster::new("relay-pro", vec!["".to_string()]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("fallbacks[0]"));
    }

    #[test]
    fn test_roster_allows_duplicates() {
        let roster = ModelRoster::new(
            "relay-pro",
            vec!["relay-flash".to_string(), "relay-pro".to_string()],
        )
        .expect("duplicates are allowed");
        assert_eq!(roster.len(), 3);
    }
}
