//! Domain types and models

pub mod connectivity;
pub mod finance;
pub mod session;
pub mod sync;

pub use connectivity::ConnectionState;
pub use finance::{Category, CategoryType, Transaction, TransactionDetails, TransactionFilter};
pub use session::{
    Credentials, LoginResponse, RegisterRequest, RegisterResponse, SessionIdentity, SessionToken,
    UserSummary,
};
pub use sync::{
    DeadLetter, DeadLetterReason, EntityKind, EntityRef, NewOperation, OperationKind,
    QueuedOperation,
};
