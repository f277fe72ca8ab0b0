//! Unsolicited events pushed by the device.

use companion_opack::Value;
use tokio::sync::mpsc;

/// An event frame (`_t == 1`) received outside any request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionEvent {
    /// Event identifier (`_i`), e.g. `"_iMC"` or `"TVProviderInfoEvent"`.
    pub name: String,
    /// Event body (`_c`); `Value::Null` when the frame carried none.
    pub body: Value,
}

/// Receiving side of the event channel handed out by a session.
pub type EventReceiver = mpsc::UnboundedReceiver<CompanionEvent>;

pub(crate) type EventSender = mpsc::UnboundedSender<CompanionEvent>;
