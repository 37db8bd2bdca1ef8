use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an identifier handed in from outside (e.g. a discovery
            /// directory) without altering it.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(ParticipantId, "part");
branded_id!(MessageId, "msg");
branded_id!(SubscriptionId, "sub");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_has_prefix() {
        let id = ParticipantId::new();
        assert!(id.as_str().starts_with("part_"), "got: {id}");
    }

    #[test]
    fn message_id_has_prefix() {
        let id = MessageId::new();
        assert!(id.as_str().starts_with("msg_"), "got: {id}");
    }

    #[test]
    fn subscription_id_has_prefix() {
        let id = SubscriptionId::new();
        assert!(id.as_str().starts_with("sub_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_preserves_external_identifier() {
        let id = ParticipantId::from_raw("provider.vehicle.gps");
        assert_eq!(id.as_str(), "provider.vehicle.gps");
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = SubscriptionId::new();
        let parsed: SubscriptionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_roundtrip() {
        let id = ParticipantId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
