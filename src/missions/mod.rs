//! Missions: lifecycle, completion recording and verifiers

mod completion;
pub mod instagram;
mod lifecycle;
pub mod verifier;

pub use completion::{check_completable, CompletionReceipt, CompletionRecorder, MissionGuard};
pub use instagram::{
    ExternalMentionVerifier, InstagramConfig, InstagramGraphProvider, ProviderError,
    SocialFeedProvider, UnconfiguredFeedProvider, DEFAULT_MENTION_MARKER,
};
pub use lifecycle::MissionLifecycle;
pub use verifier::{CompletionVerifier, Verdict, VerifierRegistry};
