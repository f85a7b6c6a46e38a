pub mod chat;
pub mod coordinator;
pub mod format;

pub use chat::{ChatContext, FollowUpAnswer, ask_follow_up};
pub use coordinator::{SynthesisRequest, synthesize};
pub use format::{build_prompt, format_event};
