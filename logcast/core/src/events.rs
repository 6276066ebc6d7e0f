//! Log Events
//!
//! The unit of work produced by running jobs and consumed by the
//! [`Dispatcher`](crate::dispatcher::Dispatcher).
//!
//! On the wire (the daemon's ingest socket) an event is one JSON object per
//! line:
//!
//! ```json
//! {"org":"acme","repo":"infra","pull":42,"project":"prod","line":"Plan: 1 to add","reset_before":false}
//! ```

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// One line of job output plus buffer-reset markers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Which project run produced the line
    #[serde(flatten)]
    pub identity: Identity,

    /// The output line, without a trailing newline
    pub line: String,

    /// Clear the identity's history before appending this line
    ///
    /// Producers set this on the first line of a new run so viewers that
    /// connect later do not see the previous run's output.
    #[serde(default)]
    pub reset_before: bool,

    /// Clear the identity's history after appending this line
    ///
    /// Set on a terminal line to release the buffer once the run is over.
    #[serde(default)]
    pub reset_after: bool,
}

impl LogEvent {
    /// A plain output line
    pub fn line(identity: Identity, line: impl Into<String>) -> Self {
        Self {
            identity,
            line: line.into(),
            reset_before: false,
            reset_after: false,
        }
    }

    /// Mark this event as the start of a new run
    #[must_use]
    pub fn with_reset_before(mut self) -> Self {
        self.reset_before = true;
        self
    }

    /// Mark this event as the end of a run
    #[must_use]
    pub fn with_reset_after(mut self) -> Self {
        self.reset_after = true;
        self
    }
}
