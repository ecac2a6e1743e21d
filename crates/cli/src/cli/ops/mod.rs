pub mod identity;
pub mod init;
pub mod invite;
pub mod key;
pub mod phrase;
pub mod request;
pub mod version;

pub use identity::Identity;
pub use init::Init;
pub use invite::Invite;
pub use key::Key;
pub use phrase::Phrase;
pub use request::Request;
pub use version::Version;
