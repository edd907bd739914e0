//! Deployment environments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RegistryError;

/// One of the two statically isolated deployment contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    /// Every environment, in container-number order.
    pub const ALL: [Environment; 2] = [Environment::Staging, Environment::Production];

    /// Canonical lowercase label, as used in the `X-Environment` header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Offset added to `slot + 1` to form the container number.
    pub const fn container_offset(self) -> u32 {
        match self {
            Environment::Staging => 0,
            Environment::Production => 3,
        }
    }

    /// Host port of slot 0.
    pub const fn base_port(self) -> u16 {
        match self {
            Environment::Staging => 30000,
            Environment::Production => 30100,
        }
    }

    /// Whether `number` falls inside this environment's container range.
    pub(crate) fn owns_number(self, number: u32) -> bool {
        let first = self.container_offset() + 1;
        let last = self.container_offset() + crate::SLOTS_PER_ENVIRONMENT as u32;
        (first..=last).contains(&number)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(RegistryError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for env in Environment::ALL {
            let parsed: Environment = env.as_str().parse().unwrap();
            assert_eq!(parsed, env);
            assert_eq!(env.to_string(), env.as_str());
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("Staging".parse::<Environment>().is_err());
        assert!("PRODUCTION".parse::<Environment>().is_err());
        assert!("".parse::<Environment>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let json = serde_json::to_string(&Environment::Production).unwrap();
        assert_eq!(json, "\"production\"");

        let env: Environment = serde_json::from_str("\"staging\"").unwrap();
        assert_eq!(env, Environment::Staging);
    }

    #[test]
    fn test_ranges_are_disjoint() {
        for number in 0..=10 {
            let owners = Environment::ALL
                .iter()
                .filter(|env| env.owns_number(number))
                .count();
            assert!(owners <= 1, "container number {number} has {owners} owners");
        }
    }
}
