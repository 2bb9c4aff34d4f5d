use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tensor::TensorError;

pub const ENV_DEVICE: &str = "DTENSOR_GPU_DEVICE";
pub const ENV_WORKERS: &str = "DTENSOR_GPU_WORKERS";
pub const ENV_SEED: &str = "DTENSOR_GPU_SEED";

pub const DEFAULT_SEED: u64 = 1234;

/// Settings for binding the process-wide GPU handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub device_ordinal: usize,
    /// Number of worker streams forked from the default stream.
    pub num_workers: usize,
    /// Seed of the device random generator.
    pub seed: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            device_ordinal: 0,
            num_workers: 1,
            seed: DEFAULT_SEED,
        }
    }
}

impl GpuConfig {
    pub fn new(device_ordinal: usize, num_workers: usize) -> Self {
        Self {
            device_ordinal,
            num_workers,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reads `DTENSOR_GPU_DEVICE`, `DTENSOR_GPU_WORKERS` and
    /// `DTENSOR_GPU_SEED`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, TensorError> {
        Self::from_lookup(|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, TensorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults: GpuConfig = Self::default();
        let config: GpuConfig = Self {
            device_ordinal: parse_var(ENV_DEVICE, lookup(ENV_DEVICE), defaults.device_ordinal)?,
            num_workers: parse_var(ENV_WORKERS, lookup(ENV_WORKERS), defaults.num_workers)?,
            seed: parse_var(ENV_SEED, lookup(ENV_SEED), defaults.seed)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        if self.num_workers == 0 {
            return Err(TensorError::NoWorkers);
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, TensorError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| TensorError::InvalidConfig { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v): &(&str, &str)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config: GpuConfig = GpuConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, GpuConfig::default());
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn test_reads_all_variables() {
        let config: GpuConfig = GpuConfig::from_lookup(lookup_from(&[
            (ENV_DEVICE, "2"),
            (ENV_WORKERS, " 4 "),
            (ENV_SEED, "99"),
        ]))
        .unwrap();
        assert_eq!(config, GpuConfig::new(2, 4).with_seed(99));
    }

    #[test]
    fn test_invalid_value() {
        let result = GpuConfig::from_lookup(lookup_from(&[(ENV_WORKERS, "many")]));
        match result {
            Err(TensorError::InvalidConfig { key, value }) => {
                assert_eq!(key, ENV_WORKERS);
                assert_eq!(value, "many");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = GpuConfig::from_lookup(lookup_from(&[(ENV_WORKERS, "0")]));
        assert!(matches!(result, Err(TensorError::NoWorkers)));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GpuConfig = serde_json::from_str(r#"{"num_workers": 3}"#).unwrap();
        assert_eq!(config.device_ordinal, 0);
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.seed, DEFAULT_SEED);
    }
}
