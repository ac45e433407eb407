use std::borrow::Cow;

use kb_core::bridge::BridgeError;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Bad arguments are the caller's problem; anything that reached the KB CLI is
/// reported as an internal error carrying the full diagnostic.
pub(crate) fn map_err(err: BridgeError) -> ErrorData {
    match err {
        BridgeError::Invalid(err) => mcp_err(ErrorCode::INVALID_PARAMS, err.to_string()),
        BridgeError::Run(err) => mcp_err(ErrorCode::INTERNAL_ERROR, err.to_string()),
    }
}
