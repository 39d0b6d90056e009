//! Protocol-level value types.
//!
//! [`Message`], [`PayloadItem`] and [`PayloadSize`] form the vocabulary the
//! codec speaks over a framed stream; [`RequestHead`] and [`ResponseHead`]
//! are the wire-facing halves of the user-visible [`Request`] and
//! [`Response`] types.

mod message;
pub use message::BodyFraming;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::Body;
pub use request::Credentials;
pub use request::Request;
pub use request::RequestHead;

mod response;
pub use response::Response;
pub use response::ResponseHead;
pub use response::ResponseSource;

mod error;
pub use error::ParseError;
pub use error::SendError;

pub mod headers;
