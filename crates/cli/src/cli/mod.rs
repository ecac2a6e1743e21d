pub mod args;
pub mod input;
pub mod op;
pub mod ops;

pub use ops::{Identity, Init, Invite, Key, Phrase, Request, Version};
