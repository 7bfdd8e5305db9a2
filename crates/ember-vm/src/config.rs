use serde::{Deserialize, Serialize};

/// Sizes of the fixed-capacity runtime structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub stack_capacity: usize,
    /// Minimum number of local slots; scripts needing more get more.
    pub locals_capacity: usize,
    pub reference_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_capacity: 256,
            locals_capacity: 64,
            reference_capacity: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{ "stack_capacity": 16 }"#).unwrap();
        assert_eq!(config.stack_capacity, 16);
        assert_eq!(config.locals_capacity, 64);
        assert_eq!(config.reference_capacity, 4096);
    }
}
