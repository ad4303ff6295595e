//! Cross-domain access policy hook.
//!
//! The façade asks the policy once per operation, after the message is built
//! and before anything leaves the process. Rules themselves live outside this
//! crate.

use xdrpc::Kind;
use xdrpc::Message;

pub trait Policy: Send + Sync + 'static {
    fn can_perform(&self, operation: Kind, message: &Message) -> bool;
}

/// Permits every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Policy for AllowAll {
    fn can_perform(&self, _operation: Kind, _message: &Message) -> bool {
        true
    }
}

impl<F> Policy for F
where
    F: Fn(Kind, &Message) -> bool + Send + Sync + 'static,
{
    fn can_perform(&self, operation: Kind, message: &Message) -> bool {
        self(operation, message)
    }
}
