//! Result type alias for MedBridge
//!
//! A convenient Result type alias that uses `MedbridgeError` as the error type.

use super::errors::MedbridgeError;

/// Result type alias for MedBridge operations
///
/// # Examples
///
/// ```
/// use medbridge::domain::result::Result;
/// use medbridge::domain::errors::MedbridgeError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(MedbridgeError::InvalidInput("sourceData must be an object".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, MedbridgeError>;
