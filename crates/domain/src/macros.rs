//! Macro for implementing Display and FromStr for tag enums
//!
//! Queue rows store operation and entity kinds as lowercase text. This macro
//! keeps the storage representation and the parser in one place.
//!
//! # Example
//!
//! ```rust
//! use fintrack_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum SyncDirection {
//!     Push,
//!     Pull,
//! }
//!
//! impl_domain_status_conversions!(SyncDirection {
//!     Push => "push",
//!     Pull => "pull",
//! });
//!
//! assert_eq!(SyncDirection::Push.to_string(), "push");
//! assert_eq!("PULL".parse::<SyncDirection>().unwrap(), SyncDirection::Pull);
//! ```

/// Implements Display and FromStr traits for tag enums
///
/// - Display writes the mapped lowercase string
/// - FromStr parses case-insensitively and names the enum in its error
///
/// The mapped strings must be lowercase for parsing to round-trip.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
