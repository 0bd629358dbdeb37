//! Read-only storage driver interface for blob stores.

mod driver;
mod error;

pub use driver::Driver;
pub use driver::Metadata;
pub use error::StorageError;
pub use error::StorageErrorBuilder;
pub use error::StorageErrorKind;
