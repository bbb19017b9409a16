pub mod contact;
pub mod error;
pub mod ids;
pub mod timestamp;
pub mod view;

pub use contact::{Contact, LinkPrecedence, NewContact};
pub use error::CoreError;
pub use ids::ContactId;
pub use timestamp::{Timestamp, TimestampClock};
pub use view::{ConsolidatedContact, IdentifyRequest, IdentifyResponse};
