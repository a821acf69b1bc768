//! Callback payloads carried by choice buttons.
//!
//! A payload only names the choice and the pending key; everything else is
//! looked up server-side in the pending cache.
//!
//! ```text
//! classify:<category id>:<key>
//! wallet_type:<cash|bank|credit|mobile>:<key>
//! wallet_confirm:<yes|no>:<key>
//! cancel:<key>
//! ```

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::WalletType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackPayload {
    Classify { category_id: String, key: String },
    WalletType { wallet_type: WalletType, key: String },
    WalletConfirm { accept: bool, key: String },
    Cancel { key: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("unknown callback action: {0}")]
    UnknownAction(String),
    #[error("malformed callback payload: {0}")]
    Malformed(String),
}

impl CallbackPayload {
    /// Pending key the payload refers to.
    pub fn key(&self) -> &str {
        match self {
            CallbackPayload::Classify { key, .. }
            | CallbackPayload::WalletType { key, .. }
            | CallbackPayload::WalletConfirm { key, .. }
            | CallbackPayload::Cancel { key } => key,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackPayload::Classify { category_id, key } => {
                write!(f, "classify:{category_id}:{key}")
            }
            CallbackPayload::WalletType { wallet_type, key } => {
                write!(f, "wallet_type:{wallet_type}:{key}")
            }
            CallbackPayload::WalletConfirm { accept, key } => {
                let answer = if *accept { "yes" } else { "no" };
                write!(f, "wallet_confirm:{answer}:{key}")
            }
            CallbackPayload::Cancel { key } => write!(f, "cancel:{key}"),
        }
    }
}

impl FromStr for CallbackPayload {
    type Err = CallbackError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || CallbackError::Malformed(raw.to_string());
        let parts: Vec<&str> = raw.trim().split(':').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(malformed());
        }
        match parts.as_slice() {
            ["classify", category_id, key] => Ok(CallbackPayload::Classify {
                category_id: category_id.to_string(),
                key: key.to_string(),
            }),
            ["wallet_type", wallet_type, key] => Ok(CallbackPayload::WalletType {
                wallet_type: wallet_type.parse().map_err(|_| malformed())?,
                key: key.to_string(),
            }),
            ["wallet_confirm", answer, key] => {
                let accept = match *answer {
                    "yes" => true,
                    "no" => false,
                    _ => return Err(malformed()),
                };
                Ok(CallbackPayload::WalletConfirm {
                    accept,
                    key: key.to_string(),
                })
            }
            ["cancel", key] => Ok(CallbackPayload::Cancel {
                key: key.to_string(),
            }),
            ["classify" | "wallet_type" | "wallet_confirm" | "cancel", ..] => Err(malformed()),
            [action, ..] => Err(CallbackError::UnknownAction(action.to_string())),
            [] => Err(malformed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_action() {
        assert_eq!(
            "classify:c-42:AbC_d-1".parse::<CallbackPayload>().unwrap(),
            CallbackPayload::Classify {
                category_id: "c-42".to_string(),
                key: "AbC_d-1".to_string(),
            }
        );
        assert_eq!(
            "wallet_type:bank:k1".parse::<CallbackPayload>().unwrap(),
            CallbackPayload::WalletType {
                wallet_type: WalletType::Bank,
                key: "k1".to_string(),
            }
        );
        assert_eq!(
            "wallet_confirm:no:k1".parse::<CallbackPayload>().unwrap(),
            CallbackPayload::WalletConfirm {
                accept: false,
                key: "k1".to_string(),
            }
        );
        assert_eq!(
            "cancel:k1".parse::<CallbackPayload>().unwrap(),
            CallbackPayload::Cancel {
                key: "k1".to_string()
            }
        );
    }

    #[test]
    fn encoding_matches_grammar() {
        let payload = CallbackPayload::WalletConfirm {
            accept: true,
            key: "k9".to_string(),
        };
        assert_eq!(payload.encode(), "wallet_confirm:yes:k9");
        assert_eq!(payload.encode().parse::<CallbackPayload>().unwrap(), payload);
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(
            "void:k1".parse::<CallbackPayload>().unwrap_err(),
            CallbackError::UnknownAction("void".to_string())
        );
        for raw in [
            "",
            "classify:k1",
            "classify::k1",
            "wallet_type:gold:k1",
            "wallet_confirm:maybe:k1",
            "cancel:k1:extra",
        ] {
            assert!(
                matches!(raw.parse::<CallbackPayload>(), Err(CallbackError::Malformed(_))),
                "{raw}"
            );
        }
    }
}
