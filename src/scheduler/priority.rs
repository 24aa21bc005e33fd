use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use utoipa::ToSchema;

/// Importance tag shared by satellite scheduling and delegated tasks.
///
/// Declaration order is the ranking order, so `Ord` compares importance.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_importance() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(
            [Priority::High, Priority::Low, Priority::Critical]
                .into_iter()
                .max(),
            Some(Priority::Critical)
        );
    }

    #[test]
    fn names() {
        assert_eq!(Priority::Critical.to_string(), "CRITICAL");
        let name: &'static str = Priority::Low.into();
        assert_eq!(name, "LOW");

        let parsed: Priority = serde_yaml::from_str("high").unwrap();
        assert_eq!(parsed, Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
