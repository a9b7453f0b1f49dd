pub mod completion;
pub mod responder;

pub use completion::{ChatMessage, CompletionBackend, CompletionClient};
pub use responder::ResponderEngine;
