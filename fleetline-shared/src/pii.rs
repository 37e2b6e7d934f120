use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps sensitive values so `Debug`/`Display` never print them in full.
/// Serialization still emits the real value; the gateway needs it.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

/// Push-notification device token of a driver or passenger.
pub type DeviceToken = Masked<String>;

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: fmt::Display> Masked<T> {
    // Keeps the last four characters so log lines stay correlatable.
    fn redacted(&self) -> String {
        let raw = self.0.to_string();
        let count = raw.chars().count();
        if count <= 8 {
            return "********".to_string();
        }
        let tail: String = raw.chars().skip(count - 4).collect();
        format!("****{}", tail)
    }
}

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let token = DeviceToken::new("fcm-token-abcdef123456".to_string());
        assert_eq!(format!("{:?}", token), "****3456");
        assert_eq!(format!("{}", DeviceToken::new("short".to_string())), "********");
    }

    #[test]
    fn test_serializes_real_value() {
        let token = DeviceToken::new("fcm-token-abcdef123456".to_string());
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"fcm-token-abcdef123456\"");
    }
}
