use serde::{Deserialize, Serialize};

/// Closed set of participant roles with an explicit capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Provider,
    Observer,
}

impl Role {
    /// May this role submit audio into the session stream?
    pub fn can_stream_audio(&self) -> bool {
        matches!(self, Self::Patient | Self::Provider)
    }

    /// May this role end an active session?
    pub fn can_end_session(&self) -> bool {
        matches!(self, Self::Patient | Self::Provider)
    }

    /// May this role write clinical notes?
    pub fn can_write_notes(&self) -> bool {
        matches!(self, Self::Provider)
    }

    /// May this role hand the consultation to another provider?
    pub fn can_transfer_session(&self) -> bool {
        matches!(self, Self::Provider)
    }

    /// May this role read the decrypted consultation record?
    pub fn can_view_record(&self) -> bool {
        matches!(self, Self::Patient | Self::Provider)
    }
}
