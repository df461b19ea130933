//! Dialog identification and the `Dialog` capability (§1, §4.7). Full dialog lifecycle
//! and media/SDP negotiation are out of scope; the core only needs to correlate
//! messages to a dialog and invoke an application-supplied implementation's callbacks.

use std::fmt;

use async_trait::async_trait;

/// `(Call-ID, local-tag, remote-tag)` — the correlation key for a confirmed dialog
/// (§3 "Dialog correlation key").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: impl Into<String>) -> Self {
        DialogId {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// An early dialog is known only by Call-ID plus the one tag observed so far (the
/// glossary's "Early dialog").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EarlyDialogId {
    pub call_id: String,
    pub tag: String,
}

/// Where a dialog sits in its own lifecycle. Owned and advanced by the dialog
/// implementation itself; the core only reads it to decide whether a response
/// confirms, fails, or merely progresses a pending INVITE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// Created from an INVITE, awaiting a 1xx/2xx.
    Waiting,
    /// A 1xx with a remote tag was seen.
    Early,
    /// A 2xx was seen and acknowledged.
    Confirmed,
    /// Terminated by BYE, CANCEL, or failure.
    Closed,
}

/// Per-session state an application plugs in. The core holds dialogs behind this
/// capability so it never needs to know about media/SDP; it only asks for the
/// correlation key and forwards lifecycle notifications.
#[async_trait]
pub trait Dialog: Send + Sync {
    fn call_id(&self) -> &str;

    fn state(&self) -> DialogState;

    /// Called once a 2xx response confirms the dialog, handing the dialog its final
    /// `(Call-ID, local-tag, remote-tag)` identity.
    async fn on_confirmed(&self, id: DialogId);

    /// Called when the dialog's INVITE fails or the dialog is otherwise torn down.
    async fn on_closed(&self);
}

/// Supplies application-specific [`Dialog`] implementations for dialogs the core
/// observes starting, either as the UAC (`for_client_invite`) or the UAS
/// (`for_server_invite`) side of the initiating INVITE.
#[async_trait]
pub trait DialogFactory: Send + Sync {
    async fn for_client_invite(&self, call_id: &str) -> std::sync::Arc<dyn Dialog>;

    async fn for_server_invite(&self, call_id: &str) -> std::sync::Arc<dyn Dialog>;
}
