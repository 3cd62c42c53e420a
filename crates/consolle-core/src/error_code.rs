//! The wire-level error-code taxonomy (spec.md section 6).
//!
//! Internal crates raise their own `thiserror` error types; the socket
//! layer maps those onto one of these variants before they ever reach a
//! client, so refactoring an internal error type never changes the wire
//! contract.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ExecutionTimeout,
    RequestTimeout,
    SocketTimeout,
    ServerUnhealthy,
    SyntaxError,
    LoadError,
    NameError,
    NoMethodError,
    ArgumentError,
    TypeError,
    ZeroDivisionError,
    RuntimeError,
    StandardError,
    Exception,
    MissingParameter,
    UnknownAction,
    UnknownError,
}

impl ErrorCode {
    /// Map a child-process exception class name (e.g. `"ZeroDivisionError"`)
    /// to the wire taxonomy. Unrecognized classes ending in `Error` or
    /// `Exception` fall back to `StandardError`/`Exception` respectively;
    /// anything else becomes `UnknownError`.
    pub fn from_class_name(class_name: &str) -> Self {
        // Strip module qualification, e.g. "Foo::BarError" -> "BarError".
        let simple = class_name.rsplit("::").next().unwrap_or(class_name);
        match simple {
            "SyntaxError" => ErrorCode::SyntaxError,
            "LoadError" => ErrorCode::LoadError,
            "NameError" => ErrorCode::NameError,
            "NoMethodError" => ErrorCode::NoMethodError,
            "ArgumentError" => ErrorCode::ArgumentError,
            "TypeError" => ErrorCode::TypeError,
            "ZeroDivisionError" => ErrorCode::ZeroDivisionError,
            "RuntimeError" => ErrorCode::RuntimeError,
            "Exception" => ErrorCode::Exception,
            _ if simple.ends_with("Error") => ErrorCode::StandardError,
            _ if simple.ends_with("Exception") => ErrorCode::Exception,
            _ => ErrorCode::UnknownError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ExecutionTimeout => "EXECUTION_TIMEOUT",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::SocketTimeout => "SOCKET_TIMEOUT",
            ErrorCode::ServerUnhealthy => "SERVER_UNHEALTHY",
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::LoadError => "LOAD_ERROR",
            ErrorCode::NameError => "NAME_ERROR",
            ErrorCode::NoMethodError => "NO_METHOD_ERROR",
            ErrorCode::ArgumentError => "ARGUMENT_ERROR",
            ErrorCode::TypeError => "TYPE_ERROR",
            ErrorCode::ZeroDivisionError => "ZERO_DIVISION_ERROR",
            ErrorCode::RuntimeError => "RUNTIME_ERROR",
            ErrorCode::StandardError => "STANDARD_ERROR",
            ErrorCode::Exception => "EXCEPTION",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::UnknownAction => "UNKNOWN_ACTION",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_ruby_exception_classes() {
        assert_eq!(
            ErrorCode::from_class_name("ZeroDivisionError"),
            ErrorCode::ZeroDivisionError
        );
        assert_eq!(
            ErrorCode::from_class_name("NoMethodError"),
            ErrorCode::NoMethodError
        );
        assert_eq!(ErrorCode::from_class_name("SyntaxError"), ErrorCode::SyntaxError);
    }

    #[test]
    fn falls_back_for_unknown_error_subclasses() {
        assert_eq!(
            ErrorCode::from_class_name("MyApp::WeirdError"),
            ErrorCode::StandardError
        );
        assert_eq!(
            ErrorCode::from_class_name("MyApp::WeirdException"),
            ErrorCode::Exception
        );
        assert_eq!(ErrorCode::from_class_name("Symbol"), ErrorCode::UnknownError);
    }

    #[test]
    fn wire_strings_match_spec_table() {
        assert_eq!(ErrorCode::ExecutionTimeout.as_str(), "EXECUTION_TIMEOUT");
        assert_eq!(ErrorCode::ServerUnhealthy.as_str(), "SERVER_UNHEALTHY");
        assert_eq!(ErrorCode::UnknownAction.as_str(), "UNKNOWN_ACTION");
    }
}
