/// Shared enumerations for requirement, parameter and test records.
///
/// Columns store these as TEXT; request payloads deserialize into the enums so
/// unknown values are rejected before they reach the database.
use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Decomposition depth, L0 being the system level
    ReqLevel { L0 => "L0", L1 => "L1", L2 => "L2", L3 => "L3", L4 => "L4", L5 => "L5" }
);

text_enum!(Priority { Critical => "critical", High => "high", Medium => "medium", Low => "low" });

text_enum!(ReqStatus { Draft => "draft", Approved => "approved", Rejected => "rejected", Deprecated => "deprecated" });

text_enum!(ValidationMethod {
    Inspection => "inspection",
    Analysis => "analysis",
    Demonstration => "demonstration",
    Test => "test",
});

text_enum!(ParamType { String => "string", Number => "number", Boolean => "boolean", Array => "array", Object => "object" });

text_enum!(TestMethod { Manual => "manual", Automated => "automated", Hybrid => "hybrid" });

text_enum!(ExecutionMode { Interactive => "interactive", Batch => "batch" });

text_enum!(TestResult { Passed => "passed", Failed => "failed", Blocked => "blocked", Skipped => "skipped" });

impl ParamType {
    /// Whether a JSON value is acceptable for a parameter of this type
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (_, Value::Null) => true,
            (ParamType::String, Value::String(_)) => true,
            (ParamType::Number, Value::Number(_)) => true,
            (ParamType::Boolean, Value::Bool(_)) => true,
            (ParamType::Array, Value::Array(_)) => true,
            (ParamType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_enums_round_trip_through_serde() {
        let level: ReqLevel = serde_json::from_value(json!("L3")).unwrap();
        assert_eq!(level, ReqLevel::L3);
        assert_eq!(serde_json::to_value(Priority::Critical).unwrap(), json!("critical"));
        assert!(serde_json::from_value::<ReqStatus>(json!("archived")).is_err());
    }

    #[test]
    fn parse_matches_stored_text() {
        assert_eq!(ValidationMethod::parse("demonstration"), Some(ValidationMethod::Demonstration));
        assert_eq!(TestResult::parse("PASSED"), None);
    }

    #[test]
    fn param_type_checks_value_shape() {
        assert!(ParamType::Number.accepts(&json!(3.5)));
        assert!(ParamType::Object.accepts(&json!({ "unit": "m" })));
        assert!(!ParamType::Boolean.accepts(&json!("yes")));
        assert!(ParamType::String.accepts(&json!(null)));
    }
}
