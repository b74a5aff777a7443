use crate::protocol::{NATIVE_TO_SERVICE_CAP, SERVICE_TO_NATIVE_CAP};

pub const SID_ENV: &str = "APPLET_HOST_SID";
pub const OUTBOUND_QUEUE_CAP_ENV: &str = "APPLET_HOST_OUTBOUND_QUEUE_CAP";

const DEFAULT_SID: &str = "S1";
const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub sid: String,
    pub outbound_queue_cap: usize,
    pub inbound_frame_cap: usize,
    pub outbound_frame_cap: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sid: DEFAULT_SID.to_string(),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            inbound_frame_cap: NATIVE_TO_SERVICE_CAP,
            outbound_frame_cap: SERVICE_TO_NATIVE_CAP,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`; unset or invalid values keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            sid: lookup(SID_ENV)
                .filter(|sid| !sid.is_empty())
                .unwrap_or(defaults.sid),
            outbound_queue_cap: lookup(OUTBOUND_QUEUE_CAP_ENV)
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.outbound_queue_cap),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(HostConfig::from_lookup(lookup(&[])), HostConfig::default());
    }

    #[test]
    fn reads_sid_and_queue_cap() {
        let config = HostConfig::from_lookup(lookup(&[
            (SID_ENV, "S42"),
            (OUTBOUND_QUEUE_CAP_ENV, "8"),
        ]));
        assert_eq!(config.sid, "S42");
        assert_eq!(config.outbound_queue_cap, 8);
    }

    #[test]
    fn invalid_queue_cap_falls_back() {
        for raw in ["0", "-1", "lots"] {
            let config = HostConfig::from_lookup(lookup(&[(OUTBOUND_QUEUE_CAP_ENV, raw)]));
            assert_eq!(config.outbound_queue_cap, DEFAULT_OUTBOUND_QUEUE_CAP);
        }
    }
}
