//! The module contains the errors the engine can return.
//!
//! [`EngineError`] is what the pipeline returns; [`ErrorKind`] classifies it
//! into the user-facing taxonomy. Only [`ErrorKind::user_message`] and parse
//! messages ever reach a reply, raw store errors are logged instead.
use std::fmt;

use thiserror::Error;

use crate::{LookupError, ParseError, StoreError, retry::Exhausted};

/// Stable error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Validation,
    /// Not an error for the caller: it starts the category menu.
    CategoryUnresolved,
    /// Not an error for the caller: it starts the wallet menu.
    WalletUnresolved,
    PendingExpired,
    Storage,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Parse => "PARSE_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::CategoryUnresolved => "CATEGORY_UNRESOLVED",
            Self::WalletUnresolved => "WALLET_UNRESOLVED",
            Self::PendingExpired => "PENDING_EXPIRED",
            Self::Storage => "STORAGE_ERROR",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Parse => "格式錯誤，請輸入「品項金額付款方式」，例如：午餐120現金",
            Self::Validation => "資料不完整或金額無效",
            Self::CategoryUnresolved => "找不到對應的科目",
            Self::WalletUnresolved => "找不到對應的支付方式",
            Self::PendingExpired => "操作已逾時，請重新輸入",
            Self::Storage => "系統忙碌中，資料未寫入，請稍後再試",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("pending entry \"{0}\" expired")]
    PendingExpired(String),
    #[error("storage failed after {attempts} attempt(s): {source}")]
    Storage {
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("registry error: {0}")]
    Registry(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(err) if err.is_validation() => ErrorKind::Validation,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Validation(_) | Self::Registry(_) | Self::Config(_) => ErrorKind::Validation,
            Self::PendingExpired(_) => ErrorKind::PendingExpired,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Reason line shown to the user.
    pub fn user_reason(&self) -> String {
        match self {
            Self::Parse(err) => format!("{}（{err}）", self.kind().user_message()),
            Self::Validation(detail) | Self::Registry(detail) => {
                format!("{}（{detail}）", self.kind().user_message())
            }
            _ => self.kind().user_message().to_string(),
        }
    }
}

impl From<Exhausted<StoreError>> for EngineError {
    fn from(exhausted: Exhausted<StoreError>) -> Self {
        Self::Storage {
            attempts: exhausted.attempts,
            source: exhausted.error,
        }
    }
}

/// Registry access outside the writer is not retried.
impl From<StoreError> for EngineError {
    fn from(source: StoreError) -> Self {
        Self::Storage {
            attempts: 1,
            source,
        }
    }
}

impl From<LookupError> for EngineError {
    fn from(err: LookupError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_split_into_parse_and_validation() {
        assert_eq!(
            EngineError::from(ParseError::MissingAmount).kind(),
            ErrorKind::Parse
        );
        assert_eq!(
            EngineError::from(ParseError::NonPositive).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn storage_reason_hides_backend_details() {
        let err = EngineError::Storage {
            attempts: 3,
            source: StoreError::Backend("disk I/O error at page 7".into()),
        };
        assert_eq!(err.kind().code(), "STORAGE_ERROR");
        assert!(!err.user_reason().contains("disk"));
    }

    #[test]
    fn parse_reason_names_the_problem() {
        let err = EngineError::from(ParseError::UnsupportedCurrency("美金".into()));
        assert!(err.user_reason().contains("美金"));
    }
}
